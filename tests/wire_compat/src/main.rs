fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use blobsend_protocol::{ResumeStateRecord, UploadEvent};
    use blobsend_resume::{FileStateStore, StateStore};
    use blobsend_upload::UploadConfig;

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Deserializes a fixture value into a Rust type, re-serializes it, and
    /// compares the JSON values.
    fn roundtrip_value<T>(name: &str, fixture: serde_json::Value)
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  rust:    {reserialized}"
        );
    }

    fn roundtrip_test<T>(name: &str)
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        roundtrip_value::<T>(name, load_fixture(name));
    }

    /// Copies a fixture to a scratch state file and loads it through the store.
    async fn load_through_store(name: &str) -> Option<ResumeStateRecord> {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        fs::write(&path, read_fixture(name)).unwrap();
        FileStateStore::new(path).load().await
    }

    // --- Resume state ---

    #[test]
    fn fixture_resume_state() {
        roundtrip_test::<ResumeStateRecord>("resume_state.json");
    }

    #[test]
    fn fixture_resume_state_minimal() {
        roundtrip_test::<ResumeStateRecord>("resume_state_minimal.json");

        let record: ResumeStateRecord = serde_json::from_value(load_fixture("resume_state_minimal.json")).unwrap();
        assert!(record.bucket.is_none());
        let order: Vec<u32> = record.sorted_parts().iter().map(|p| p.part_number).collect();
        assert_eq!(order, vec![1, 3]);
    }

    #[test]
    fn fixture_resume_state_legacy_keys() {
        let record: ResumeStateRecord =
            serde_json::from_value(load_fixture("resume_state_legacy.json")).unwrap();
        assert!(record.session_id.starts_with("VXBsb2Fk"));
        assert_eq!(record.parts.len(), 2);
        assert_eq!(record.parts[0].part_number, 1);
        assert_eq!(record.parts[0].token, "\"7778aef83f66abc1fa1e8477f296d394\"");

        // Saved back in the current spelling.
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("session_id").is_some());
        assert!(json.get("UploadId").is_none());
        assert_eq!(json["parts"][1]["part_number"], 2);
    }

    #[test]
    fn fixture_resume_state_destination_is_checked() {
        let record: ResumeStateRecord =
            serde_json::from_value(load_fixture("resume_state.json")).unwrap();
        assert!(
            record
                .validate_for("backups", "nightly/db.dump", 104_857_600, 367_001_600)
                .is_ok()
        );
        assert!(
            record
                .validate_for("backups", "nightly/other.dump", 104_857_600, 367_001_600)
                .is_err()
        );
    }

    #[tokio::test]
    async fn store_loads_every_valid_fixture() {
        for name in [
            "resume_state.json",
            "resume_state_minimal.json",
            "resume_state_legacy.json",
        ] {
            assert!(
                load_through_store(name).await.is_some(),
                "{name} should load"
            );
        }
    }

    #[tokio::test]
    async fn store_treats_truncated_fixture_as_absent() {
        assert!(load_through_store("resume_state_truncated.json").await.is_none());
    }

    // --- Events ---

    #[test]
    fn fixture_upload_events() {
        let fixture = load_fixture("upload_events.json");
        let events = fixture.as_array().expect("fixture is an array");
        assert!(!events.is_empty());
        for (i, event) in events.iter().enumerate() {
            roundtrip_value::<UploadEvent>(&format!("upload_events.json[{i}]"), event.clone());
        }
    }

    // --- Config ---

    #[test]
    fn fixture_upload_config_matches_defaults() {
        roundtrip_test::<UploadConfig>("upload_config.json");
        let config: UploadConfig = serde_json::from_value(load_fixture("upload_config.json")).unwrap();
        assert_eq!(config, UploadConfig::default());
    }
}
