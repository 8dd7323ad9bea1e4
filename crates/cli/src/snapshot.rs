//! Offline snapshots: JSON arrays of source or target records read from disk
//! in place of the live loaders.

use std::path::{Path, PathBuf};

use leadsync_recon::model::check_unique_target_ids;
use leadsync_recon::{SourceRecord, TargetRecord};
use serde::de::DeserializeOwned;

use crate::exit_codes;
use crate::CliError;

fn read_records<T: DeserializeOwned>(path: &Path, kind: &str) -> Result<Vec<T>, CliError> {
    let path = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).to_string());
    let content = std::fs::read_to_string(&path).map_err(|e| CliError {
        code: exit_codes::EXIT_IO,
        message: format!("cannot read {} snapshot {}: {}", kind, path.display(), e),
        hint: None,
    })?;
    let records: Vec<T> = serde_json::from_str(content.trim_start_matches('\u{feff}'))
        .map_err(|e| CliError {
            code: exit_codes::EXIT_SNAPSHOT,
            message: format!("invalid {} snapshot {}: {}", kind, path.display(), e),
            hint: Some("expected a JSON array of lead records".to_string()),
        })?;
    log::info!("read {} {} records from {}", records.len(), kind, path.display());
    Ok(records)
}

pub fn read_source(path: &Path) -> Result<Vec<SourceRecord>, CliError> {
    read_records(path, "source")
}

/// Target snapshots must keep the unique-id guarantee of the live loader.
pub fn read_target(path: &Path) -> Result<Vec<TargetRecord>, CliError> {
    let records = read_records(path, "target")?;
    check_unique_target_ids(&records).map_err(|e| CliError {
        code: exit_codes::EXIT_SNAPSHOT,
        message: format!("{}: {}", path.display(), e),
        hint: None,
    })?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn reads_source_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "source.json",
            r#"[{"id":"z-1","name":"Dana Levi","phone":"050-123-4567","status":"meeting_set",
                "status_raw":"נקבעה שיחה","created_at":"2026-01-12T10:00:00+02:00"}]"#,
        );
        let records = read_source(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, "meeting_set");
        assert_eq!(records[0].email, None);
        assert_eq!(records[0].notes, None);
    }

    #[test]
    fn source_status_follows_the_crm_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "source.json",
            r#"[{"id":"z-1","name":"A","status":"","status_raw":"נקבעה שיחה",
                 "created_at":"2026-01-12T10:00:00+02:00"},
                {"id":"z-2","name":"B","status":"signed","status_raw":"אין מענה",
                 "created_at":"2026-01-12T10:00:00+02:00"},
                {"id":"z-3","name":"C","status_raw":"נוצר קשר",
                 "created_at":"2026-01-12T10:00:00+02:00"}]"#,
        );
        let records = read_source(&path).unwrap();
        assert_eq!(records[0].status, "meeting_set");
        assert_eq!(records[1].status, "no_answer");
        assert_eq!(records[2].status, "contacted");
    }

    #[test]
    fn bom_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "target.json", "\u{feff}[]");
        assert!(read_target(&path).unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_source(Path::new("/nonexistent/source.json")).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_IO);
    }

    #[test]
    fn malformed_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "target.json", r#"{"id":"s-1"}"#);
        let err = read_target(&path).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_SNAPSHOT);
        assert!(err.hint.is_some());
    }

    #[test]
    fn duplicate_target_ids_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "target.json",
            r#"[{"id":"s-1","name":"A","status":"contacted","created_at":"2026-01-01T00:00:00Z"},
                {"id":"s-1","name":"B","status":"signed","created_at":"2026-01-02T00:00:00Z"}]"#,
        );
        let err = read_target(&path).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_SNAPSHOT);
        assert!(err.message.contains("duplicate target id 's-1'"));
    }
}
