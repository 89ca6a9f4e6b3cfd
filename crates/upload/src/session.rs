//! In-memory view of one multipart session.

use std::collections::BTreeMap;

use blobsend_protocol::{CompletedPart, RecordError, ResumeStateRecord};
use blobsend_transfer::PartPlan;

/// A multipart session owned by a single upload call.
///
/// Always rebuilt from the resume-state record on start; the record is the
/// source of truth across restarts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub session_id: String,
    pub bucket: String,
    pub key: String,
    pub part_size: u64,
    pub total_size: u64,
    completed: BTreeMap<u32, String>,
}

impl UploadSession {
    /// A freshly opened session with no parts yet.
    pub fn new(session_id: String, bucket: &str, key: &str, plan: &PartPlan) -> Self {
        Self {
            session_id,
            bucket: bucket.to_string(),
            key: key.to_string(),
            part_size: plan.part_size(),
            total_size: plan.total_size(),
            completed: BTreeMap::new(),
        }
    }

    /// Rebuilds a session from a stored record, if it fits this upload.
    pub fn resume(
        record: &ResumeStateRecord,
        bucket: &str,
        key: &str,
        plan: &PartPlan,
    ) -> Result<Self, RecordError> {
        record.validate_for(bucket, key, plan.part_size(), plan.total_size())?;
        let mut session = Self::new(record.session_id.clone(), bucket, key, plan);
        for part in &record.parts {
            session.completed.insert(part.part_number, part.token.clone());
        }
        Ok(session)
    }

    pub fn contains(&self, part_number: u32) -> bool {
        self.completed.contains_key(&part_number)
    }

    /// Records an acknowledged part.
    pub fn mark_uploaded(&mut self, part_number: u32, token: String) {
        self.completed.insert(part_number, token);
    }

    pub fn completed_count(&self) -> u32 {
        self.completed.len() as u32
    }

    /// True once every part in `[1, total_parts]` is acknowledged.
    pub fn is_complete(&self, total_parts: u32) -> bool {
        (1..=total_parts).all(|n| self.completed.contains_key(&n))
    }

    /// Acknowledged parts in ascending part order.
    pub fn completed_parts(&self) -> Vec<CompletedPart> {
        self.completed
            .iter()
            .map(|(n, token)| CompletedPart::new(*n, token.clone()))
            .collect()
    }

    /// The durable mirror of this session.
    pub fn to_record(&self) -> ResumeStateRecord {
        let mut record = ResumeStateRecord::new(self.session_id.clone()).with_destination(
            &self.bucket,
            &self.key,
            self.part_size,
            self.total_size,
        );
        record.parts = self.completed_parts();
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> PartPlan {
        PartPlan::new(350, 100).unwrap()
    }

    #[test]
    fn record_roundtrip_keeps_parts_sorted() {
        let mut session = UploadSession::new("s1".into(), "b", "k", &plan());
        session.mark_uploaded(2, "t2".into());
        session.mark_uploaded(1, "t1".into());

        let record = session.to_record();
        assert_eq!(record.parts[0].part_number, 1);
        assert_eq!(record.parts[1].part_number, 2);
        assert_eq!(record.key.as_deref(), Some("k"));

        let resumed = UploadSession::resume(&record, "b", "k", &plan()).unwrap();
        assert_eq!(resumed, session);
    }

    #[test]
    fn legacy_record_without_destination_resumes() {
        let mut record = ResumeStateRecord::new("s1");
        record.parts.push(CompletedPart::new(3, "t3"));
        let session = UploadSession::resume(&record, "b", "k", &plan()).unwrap();
        assert!(session.contains(3));
        assert!(!session.contains(1));
    }

    #[test]
    fn stale_record_is_rejected() {
        let record = ResumeStateRecord::new("s1").with_destination("b", "other", 100, 350);
        assert!(UploadSession::resume(&record, "b", "k", &plan()).is_err());
    }

    #[test]
    fn completeness() {
        let mut session = UploadSession::new("s1".into(), "b", "k", &plan());
        for n in 1..=3 {
            session.mark_uploaded(n, format!("t{n}"));
        }
        assert!(!session.is_complete(4));
        session.mark_uploaded(4, "t4".into());
        assert!(session.is_complete(4));
        assert_eq!(session.completed_count(), 4);
    }
}
