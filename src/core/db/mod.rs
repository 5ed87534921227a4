mod patient;
mod record;
mod state;

use std::{path::Path, sync::Arc};

use sqlx::Connection;
use state::DbState;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{Provenance, ReconciledRecord};

pub use patient::{
    NewPatient, NewSupplement, Patient, PatientRef, PatientRepository, Supplement, SupplementRef,
};
pub use record::{CommittedRecord, CommittedRecordId, RecordFilter, RecordRepository};

/// SQLite-backed store for patients, supplements and committed pill counts
#[derive(Debug, Clone)]
pub struct PillDb {
    state: Arc<DbState>,
}

impl PillDb {
    pub async fn open<P: AsRef<Path>>(db_file: P) -> anyhow::Result<Self> {
        Ok(Self {
            state: Arc::new(DbState::open(db_file).await?),
        })
    }

    /// Checkpoint and close; further calls on any clone will fail.
    pub async fn close(&self) -> anyhow::Result<()> {
        self.state.close().await
    }
}

fn to_micros(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000) as i64
}

fn from_micros(micros: i64) -> anyhow::Result<OffsetDateTime> {
    Ok(OffsetDateTime::from_unix_timestamp_nanos(
        micros as i128 * 1_000,
    )?)
}

struct RecordRow {
    id: String,
    patient_id: i64,
    supplement_id: i64,
    final_count: i64,
    final_confidence: Option<f64>,
    provenance: String,
    ai_count: Option<i64>,
    manual_reason: Option<String>,
    committed_at: i64,
}

impl TryFrom<RecordRow> for CommittedRecord {
    type Error = anyhow::Error;

    fn try_from(row: RecordRow) -> anyhow::Result<Self> {
        Ok(CommittedRecord {
            id: CommittedRecordId(Uuid::parse_str(&row.id)?),
            patient: PatientRef(row.patient_id),
            supplement: SupplementRef(row.supplement_id),
            record: ReconciledRecord {
                final_count: u32::try_from(row.final_count)?,
                final_confidence: row.final_confidence,
                provenance: row.provenance.parse::<Provenance>()?,
                ai_count: row.ai_count.map(u32::try_from).transpose()?,
                manual_reason: row.manual_reason,
            },
            committed_at: from_micros(row.committed_at)?,
        })
    }
}

impl RecordRepository for PillDb {
    async fn commit(
        &self,
        record: &ReconciledRecord,
        patient: PatientRef,
        supplement: SupplementRef,
    ) -> anyhow::Result<CommittedRecordId> {
        let mut conn = self.state.conn().await?;
        let mut tx = conn.begin().await?;

        let owner = sqlx::query_scalar!(
            r#"SELECT patient_id as "patient_id!: i64" FROM supplement WHERE id = $1"#,
            supplement.0
        )
        .fetch_optional(&mut *tx)
        .await?;
        match owner {
            None => anyhow::bail!("Supplement {} not found", supplement),
            Some(owner) if owner != patient.0 => anyhow::bail!(
                "Supplement {} belongs to patient {}, not {}",
                supplement,
                owner,
                patient
            ),
            Some(_) => {}
        }

        let id = CommittedRecordId(Uuid::new_v4());
        let id_text = id.0.to_string();
        let final_count = i64::from(record.final_count);
        let provenance = record.provenance.as_str();
        let ai_count = record.ai_count.map(i64::from);
        let manual_reason = record.manual_reason.as_deref();
        let committed_at = to_micros(OffsetDateTime::now_utc());
        sqlx::query!(
            r#"INSERT INTO record
            (id, patient_id, supplement_id, final_count, final_confidence,
             provenance, ai_count, manual_reason, committed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
            id_text,
            patient.0,
            supplement.0,
            final_count,
            record.final_confidence,
            provenance,
            ai_count,
            manual_reason,
            committed_at
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn get_record(&self, id: CommittedRecordId) -> anyhow::Result<Option<CommittedRecord>> {
        let mut conn = self.state.conn().await?;
        let id_text = id.0.to_string();
        sqlx::query_as!(
            RecordRow,
            r#"SELECT
                id as "id!: String",
                patient_id as "patient_id!: i64",
                supplement_id as "supplement_id!: i64",
                final_count as "final_count!: i64",
                final_confidence as "final_confidence?: f64",
                provenance as "provenance!: String",
                ai_count as "ai_count?: i64",
                manual_reason as "manual_reason?: String",
                committed_at as "committed_at!: i64"
            FROM record WHERE id = $1"#,
            id_text
        )
        .fetch_optional(&mut *conn)
        .await?
        .map(CommittedRecord::try_from)
        .transpose()
    }

    async fn query(&self, filter: &RecordFilter) -> anyhow::Result<Vec<CommittedRecord>> {
        let mut conn = self.state.conn().await?;
        let patient = filter.patient.map(|p| p.0);
        let supplement = filter.supplement.map(|s| s.0);
        let since = filter.since.map(to_micros);
        let until = filter.until.map(to_micros);
        sqlx::query_as!(
            RecordRow,
            r#"SELECT
                id as "id!: String",
                patient_id as "patient_id!: i64",
                supplement_id as "supplement_id!: i64",
                final_count as "final_count!: i64",
                final_confidence as "final_confidence?: f64",
                provenance as "provenance!: String",
                ai_count as "ai_count?: i64",
                manual_reason as "manual_reason?: String",
                committed_at as "committed_at!: i64"
            FROM record
            WHERE ($1 IS NULL OR patient_id = $1)
            AND ($2 IS NULL OR supplement_id = $2)
            AND ($3 IS NULL OR committed_at >= $3)
            AND ($4 IS NULL OR committed_at <= $4)
            ORDER BY committed_at DESC, rowid DESC"#,
            patient,
            supplement,
            since,
            until
        )
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(CommittedRecord::try_from)
        .collect()
    }
}

impl PatientRepository for PillDb {
    async fn add_patient(&self, patient: &NewPatient) -> anyhow::Result<Patient> {
        let mut conn = self.state.conn().await?;
        let metadata = patient.metadata.as_deref();
        let created_at = to_micros(OffsetDateTime::now_utc());
        let id = sqlx::query_scalar!(
            r#"INSERT INTO patient (name, metadata, created_at) VALUES ($1, $2, $3)
            RETURNING id as "id!: i64""#,
            patient.name,
            metadata,
            created_at
        )
        .fetch_one(&mut *conn)
        .await?;
        Ok(Patient {
            id: PatientRef(id),
            name: patient.name.clone(),
            metadata: patient.metadata.clone(),
            _guard: (),
        })
    }

    async fn get_patients(&self) -> anyhow::Result<Vec<Patient>> {
        let mut conn = self.state.conn().await?;
        let patients = sqlx::query!(
            r#"SELECT id as "id!: i64", name as "name!: String", metadata as "metadata?: String"
            FROM patient ORDER BY id ASC"#
        )
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|row| Patient {
            id: PatientRef(row.id),
            name: row.name,
            metadata: row.metadata,
            _guard: (),
        })
        .collect();
        Ok(patients)
    }

    async fn get_patient_by_id(&self, id: PatientRef) -> anyhow::Result<Option<Patient>> {
        let mut conn = self.state.conn().await?;
        let patient = sqlx::query!(
            r#"SELECT id as "id!: i64", name as "name!: String", metadata as "metadata?: String"
            FROM patient WHERE id = $1"#,
            id.0
        )
        .fetch_optional(&mut *conn)
        .await?
        .map(|row| Patient {
            id: PatientRef(row.id),
            name: row.name,
            metadata: row.metadata,
            _guard: (),
        });
        Ok(patient)
    }

    async fn add_supplement(&self, supplement: &NewSupplement) -> anyhow::Result<Supplement> {
        let mut conn = self.state.conn().await?;
        let created_at = to_micros(OffsetDateTime::now_utc());
        let id = sqlx::query_scalar!(
            r#"INSERT INTO supplement (barcode, patient_id, kind, created_at)
            VALUES ($1, $2, $3, $4) RETURNING id as "id!: i64""#,
            supplement.barcode,
            supplement.patient.0,
            supplement.kind,
            created_at
        )
        .fetch_one(&mut *conn)
        .await?;
        Ok(Supplement {
            id: SupplementRef(id),
            barcode: supplement.barcode.clone(),
            patient: supplement.patient,
            kind: supplement.kind.clone(),
            _guard: (),
        })
    }

    async fn find_supplement_by_barcode(&self, barcode: &str) -> anyhow::Result<Option<Supplement>> {
        let mut conn = self.state.conn().await?;
        let supplement = sqlx::query!(
            r#"SELECT id as "id!: i64", barcode as "barcode!: String",
                patient_id as "patient_id!: i64", kind as "kind!: String"
            FROM supplement WHERE barcode = $1"#,
            barcode
        )
        .fetch_optional(&mut *conn)
        .await?
        .map(|row| Supplement {
            id: SupplementRef(row.id),
            barcode: row.barcode,
            patient: PatientRef(row.patient_id),
            kind: row.kind,
            _guard: (),
        });
        Ok(supplement)
    }
}
