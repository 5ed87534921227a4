use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::core::db::patient::{PatientRef, SupplementRef};
use crate::models::ReconciledRecord;

/// Identifier assigned at commit time; never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommittedRecordId(pub Uuid);

impl fmt::Display for CommittedRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommittedRecord {
    pub id: CommittedRecordId,
    pub patient: PatientRef,
    pub supplement: SupplementRef,
    #[serde(flatten)]
    pub record: ReconciledRecord,
    #[serde(with = "time::serde::rfc3339")]
    pub committed_at: OffsetDateTime,
}

/// Query filter; `None` fields match everything. Time bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub patient: Option<PatientRef>,
    pub supplement: Option<SupplementRef>,
    pub since: Option<OffsetDateTime>,
    pub until: Option<OffsetDateTime>,
}

pub trait RecordRepository {
    /// Store the record atomically and return its new identifier
    fn commit(
        &self,
        record: &ReconciledRecord,
        patient: PatientRef,
        supplement: SupplementRef,
    ) -> impl Future<Output = anyhow::Result<CommittedRecordId>>;
    fn get_record(&self, id: CommittedRecordId) -> impl Future<Output = anyhow::Result<Option<CommittedRecord>>>;
    /// Matching records, newest first
    fn query(&self, filter: &RecordFilter) -> impl Future<Output = anyhow::Result<Vec<CommittedRecord>>>;
}
