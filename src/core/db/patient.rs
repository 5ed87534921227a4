use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatientRef(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SupplementRef(pub i64);

impl fmt::Display for PatientRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for SupplementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Patient {
    pub id: PatientRef,
    pub name: String,
    pub metadata: Option<String>,
    #[serde(skip)]
    pub(super) _guard: (),
}

#[derive(Debug, Clone)]
pub struct NewPatient {
    pub name: String,
    /// Free-form JSON kept alongside the patient
    pub metadata: Option<String>,
}

/// A supplement bottle, identified in the field by its barcode
#[derive(Debug, Clone, Serialize)]
pub struct Supplement {
    pub id: SupplementRef,
    pub barcode: String,
    pub patient: PatientRef,
    pub kind: String,
    #[serde(skip)]
    pub(super) _guard: (),
}

#[derive(Debug, Clone)]
pub struct NewSupplement {
    pub barcode: String,
    pub patient: PatientRef,
    pub kind: String,
}

pub trait PatientRepository {
    fn add_patient(&self, patient: &NewPatient) -> impl Future<Output = anyhow::Result<Patient>>;
    fn get_patients(&self) -> impl Future<Output = anyhow::Result<Vec<Patient>>>;
    fn get_patient_by_id(&self, id: PatientRef) -> impl Future<Output = anyhow::Result<Option<Patient>>>;
    fn add_supplement(&self, supplement: &NewSupplement) -> impl Future<Output = anyhow::Result<Supplement>>;
    fn find_supplement_by_barcode(&self, barcode: &str) -> impl Future<Output = anyhow::Result<Option<Supplement>>>;
}
