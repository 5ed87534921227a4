use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;
use tracing_subscriber::EnvFilter;

use pillcount::core::db::{
    NewPatient, NewSupplement, PatientRef, PatientRepository, PillDb, RecordFilter,
    RecordRepository, SupplementRef,
};
use pillcount::detection::visualize;
use pillcount::reconcile::{override_from_json, parse_manual_count};
use pillcount::{BlobBackend, Config, ManualOverride, Pipeline, Submission};

#[derive(Parser)]
#[command(name = "pillcount")]
#[command(about = "Count pills in a bottle photo and record the reconciled count")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database file (overrides the configured path)
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the automated count on a photo without storing anything
    Count {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Minimum per-pill confidence to be counted
        #[arg(long)]
        floor: Option<f64>,

        /// Write the normalized photo with detection boxes drawn on it
        #[arg(long, value_name = "PNG")]
        annotate: Option<PathBuf>,

        /// Save debug outputs to directory (must be empty)
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,
    },
    /// Count (photo, manual, or both) and commit one record
    Submit {
        #[arg(long)]
        patient: i64,

        #[arg(long)]
        supplement: i64,

        #[arg(long, value_name = "IMAGE")]
        image: Option<PathBuf>,

        /// Count entered by the health worker
        #[arg(long, allow_hyphen_values = true)]
        manual_count: Option<String>,

        /// Why the manual count was entered
        #[arg(long, requires = "manual_count")]
        reason: Option<String>,

        /// Override as JSON, e.g. '{"manual_count": 30, "reason": "AI undercount"}'
        #[arg(long, value_name = "JSON", conflicts_with_all = ["manual_count", "reason"])]
        override_json: Option<String>,
    },
    /// List committed records, newest first
    Records {
        #[arg(long)]
        patient: Option<i64>,

        #[arg(long)]
        supplement: Option<i64>,

        /// Inclusive lower bound (RFC 3339)
        #[arg(long)]
        since: Option<String>,

        /// Inclusive upper bound (RFC 3339)
        #[arg(long)]
        until: Option<String>,
    },
    /// Export all records as CSV
    Export {
        /// Output file; stdout when omitted
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// List registered patients
    Patients,
    /// Register a patient
    PatientAdd {
        name: String,

        /// Extra patient details as JSON text
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Register a supplement bottle for a patient
    SupplementAdd {
        #[arg(long)]
        patient: i64,

        #[arg(long)]
        barcode: String,

        #[arg(long)]
        kind: String,
    },
    /// Look up a supplement bottle by its barcode
    Scan { barcode: String },
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }

    match cli.command {
        Command::Count {
            image,
            floor,
            annotate,
            debug_out,
        } => {
            let mut pipeline = build_pipeline(&config);
            if let Some(floor) = floor {
                if !(0.0..=1.0).contains(&floor) {
                    anyhow::bail!("--floor must lie in [0, 1], got {}", floor);
                }
                pipeline = pipeline.with_confidence_floor(floor);
            }
            if let Some(dir) = debug_out {
                pipeline = pipeline.with_debug(dir)?;
            }

            let bytes = read_image(&image)?;
            let analysis = pipeline.analyze(&bytes).await?;
            if let Some(path) = annotate {
                visualize::annotate(&analysis.normalized, &analysis.result.detections)
                    .save(&path)
                    .with_context(|| format!("Failed to write annotated image {:?}", path))?;
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "backend": pipeline.backend_name(),
                    "result": analysis.result,
                }))?
            );
        }
        Command::Submit {
            patient,
            supplement,
            image,
            manual_count,
            reason,
            override_json,
        } => {
            let manual = match (manual_count, override_json) {
                (Some(raw), _) => {
                    let count = parse_manual_count(&raw)?;
                    Some(ManualOverride::new(count, reason.unwrap_or_default()))
                }
                (None, Some(raw)) => {
                    let payload: serde_json::Value = serde_json::from_str(&raw)
                        .context("--override-json must be valid JSON")?;
                    Some(override_from_json(&payload)?)
                }
                (None, None) => None,
            };
            let image = image.as_deref().map(read_image).transpose()?;

            let db = PillDb::open(&config.database.path).await?;
            let pipeline = build_pipeline(&config);
            let outcome = pipeline
                .submit_and_commit(
                    &db,
                    Submission { image, manual },
                    PatientRef(patient),
                    SupplementRef(supplement),
                )
                .await;
            db.close().await?;
            let outcome = outcome?;

            println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                "id": outcome.id,
                "record": outcome.record,
            }))?);
        }
        Command::Records {
            patient,
            supplement,
            since,
            until,
        } => {
            let filter = RecordFilter {
                patient: patient.map(PatientRef),
                supplement: supplement.map(SupplementRef),
                since: since.as_deref().map(parse_timestamp).transpose()?,
                until: until.as_deref().map(parse_timestamp).transpose()?,
            };
            let db = PillDb::open(&config.database.path).await?;
            let records = db.query(&filter).await;
            db.close().await?;
            println!("{}", serde_json::to_string_pretty(&records?)?);
        }
        Command::Export { out } => {
            let db = PillDb::open(&config.database.path).await?;
            let records = db.query(&RecordFilter::default()).await;
            db.close().await?;
            let records = records?;
            match out {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("Failed to create {:?}", path))?;
                    pillcount::export::write_csv(&records, std::io::BufWriter::new(file))?;
                }
                None => pillcount::export::write_csv(&records, std::io::stdout().lock())?,
            }
        }
        Command::Patients => {
            let db = PillDb::open(&config.database.path).await?;
            let patients = db.get_patients().await;
            db.close().await?;
            println!("{}", serde_json::to_string_pretty(&patients?)?);
        }
        Command::PatientAdd { name, metadata } => {
            if let Some(metadata) = &metadata {
                serde_json::from_str::<serde_json::Value>(metadata)
                    .context("--metadata must be valid JSON")?;
            }
            let db = PillDb::open(&config.database.path).await?;
            let patient = db.add_patient(&NewPatient { name, metadata }).await;
            db.close().await?;
            println!("{}", serde_json::to_string_pretty(&patient?)?);
        }
        Command::SupplementAdd {
            patient,
            barcode,
            kind,
        } => {
            let db = PillDb::open(&config.database.path).await?;
            let supplement = db
                .add_supplement(&NewSupplement {
                    barcode,
                    patient: PatientRef(patient),
                    kind,
                })
                .await;
            db.close().await?;
            println!("{}", serde_json::to_string_pretty(&supplement?)?);
        }
        Command::Scan { barcode } => {
            let db = PillDb::open(&config.database.path).await?;
            let found = scan(&db, &barcode).await;
            db.close().await?;
            println!("{}", serde_json::to_string_pretty(&found?)?);
        }
    }

    Ok(())
}

fn build_pipeline(config: &Config) -> Pipeline {
    let backend = Arc::new(BlobBackend::from_config(&config.blob));
    Pipeline::from_config(config, backend)
}

fn read_image(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read image {:?}", path))
}

fn parse_timestamp(raw: &str) -> anyhow::Result<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339)
        .with_context(|| format!("Invalid RFC 3339 timestamp: {}", raw))
}

/// Supplement plus owning patient, as shown after scanning a bottle
async fn scan(db: &PillDb, barcode: &str) -> anyhow::Result<serde_json::Value> {
    let supplement = db
        .find_supplement_by_barcode(barcode)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Supplement not found for barcode {}", barcode))?;
    let patient = db
        .get_patient_by_id(supplement.patient)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Patient {} not found", supplement.patient))?;
    Ok(serde_json::json!({
        "supplement": supplement,
        "patient": patient,
    }))
}
