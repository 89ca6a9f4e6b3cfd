//! Progress events emitted while an upload runs.

use serde::{Deserialize, Serialize};

/// Lifecycle phase of one upload call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadPhase {
    #[serde(rename = "opening")]
    Opening,
    #[serde(rename = "uploading")]
    Uploading,
    #[serde(rename = "completing")]
    Completing,
    #[serde(rename = "verifying")]
    Verifying,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "aborted")]
    Aborted,
}

/// Event emitted by the uploader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UploadEvent {
    /// Whole payload sent in one request.
    SinglePut { bytes: u64 },
    /// A new multipart session was opened.
    SessionOpened {
        session_id: String,
        total_parts: u32,
    },
    /// A resume-state record was trusted.
    SessionResumed {
        session_id: String,
        completed: u32,
        total_parts: u32,
    },
    /// Part already acknowledged in an earlier run.
    PartSkipped { part_number: u32 },
    /// Part acknowledged and recorded.
    PartUploaded {
        part_number: u32,
        completed: u32,
        total_parts: u32,
        bytes: u64,
    },
    /// Part attempt failed; another attempt follows after `delay_ms`.
    PartRetrying {
        part_number: u32,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    /// Phase transition.
    Phase { phase: UploadPhase },
    /// Integrity check finished.
    Verified {
        verified: bool,
        local_digest: String,
        remote_digest: Option<String>,
    },
}

impl UploadEvent {
    /// Fraction of parts done, when the event carries part progress.
    pub fn fraction(&self) -> Option<f64> {
        match self {
            Self::PartUploaded {
                completed,
                total_parts,
                ..
            }
            | Self::SessionResumed {
                completed,
                total_parts,
                ..
            } if *total_parts > 0 => Some(f64::from(*completed) / f64::from(*total_parts)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_serialization() {
        assert_eq!(
            serde_json::to_string(&UploadPhase::Completing).unwrap(),
            "\"completing\""
        );
    }

    #[test]
    fn event_is_tagged() {
        let json = serde_json::to_value(UploadEvent::PartSkipped { part_number: 2 }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "part_skipped", "part_number": 2})
        );
    }

    #[test]
    fn resumed_fraction() {
        let e = UploadEvent::SessionResumed {
            session_id: "u".into(),
            completed: 2,
            total_parts: 4,
        };
        assert_eq!(e.fraction(), Some(0.5));

        let e = UploadEvent::PartUploaded {
            part_number: 4,
            completed: 4,
            total_parts: 4,
            bytes: 50,
        };
        assert_eq!(e.fraction(), Some(1.0));
        assert_eq!(UploadEvent::PartSkipped { part_number: 1 }.fraction(), None);
    }
}
