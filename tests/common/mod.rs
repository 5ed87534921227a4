mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from pillcount for tests
pub use pillcount::core::db::{
    CommittedRecord, CommittedRecordId, NewPatient, NewSupplement, Patient, PatientRef,
    PatientRepository, PillDb, RecordFilter, RecordRepository, Supplement, SupplementRef,
};
pub use pillcount::{
    AggregatedResult, BoundingBox, Detection, ManualOverride, PipelineError, Provenance,
    ReconciledRecord,
};
