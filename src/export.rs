use std::io::Write;

use anyhow::Context;
use time::format_description::well_known::Rfc3339;

use crate::core::db::CommittedRecord;

pub const CSV_HEADER: &str = "id,patient_id,supplement_id,final_count,provenance,final_confidence,ai_count,manual_reason,committed_at";

/// Render committed records as CSV, one row per record in the given order
pub fn write_csv<W: Write>(records: &[CommittedRecord], mut out: W) -> anyhow::Result<()> {
    writeln!(out, "{}", CSV_HEADER)?;
    for committed in records {
        let record = &committed.record;
        let confidence = record
            .final_confidence
            .map(|c| format!("{:.4}", c))
            .unwrap_or_default();
        let ai_count = record.ai_count.map(|c| c.to_string()).unwrap_or_default();
        let reason = record.manual_reason.as_deref().map(csv_field).unwrap_or_default();
        let committed_at = committed
            .committed_at
            .format(&Rfc3339)
            .context("Failed to format commit time")?;

        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{}",
            committed.id,
            committed.patient,
            committed.supplement,
            record.final_count,
            record.provenance,
            confidence,
            ai_count,
            reason,
            committed_at
        )?;
    }
    out.flush()?;
    Ok(())
}

pub fn to_csv_string(records: &[CommittedRecord]) -> anyhow::Result<String> {
    let mut buf = Vec::new();
    write_csv(records, &mut buf)?;
    Ok(String::from_utf8(buf)?)
}

/// Quote a free-text cell when it contains a delimiter, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::csv_field;

    #[test]
    fn quotes_only_when_needed() {
        assert_eq!(csv_field("AI undercount"), "AI undercount");
        assert_eq!(csv_field("bottle tipped, recounted"), "\"bottle tipped, recounted\"");
        assert_eq!(csv_field("said \"30\""), "\"said \"\"30\"\"\"");
    }
}
