//! Output writing: one JSON file per source document, written atomically.
//!
//! The registry verdict is deliberately not part of [`ExtractionRecord`] —
//! it describes a moment-in-time lookup, not the invoice. It is merged into
//! the serialised output here, as a `vat_status` field, only when a lookup
//! actually ran.
//!
//! Writes go to a `.tmp` sibling followed by an atomic rename, so a crash or
//! full disk never leaves a half-written JSON file for a downstream importer
//! to trip over.

use crate::error::ExtractError;
use crate::record::ExtractionRecord;
use crate::vat::VatStatus;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where the JSON for `input` belongs: `<stem>.json`, next to the source
/// unless an output directory is given.
pub fn output_path_for(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let file_name = match input.file_stem() {
        Some(stem) => {
            let mut name = stem.to_os_string();
            name.push(".json");
            PathBuf::from(name)
        }
        None => PathBuf::from("output.json"),
    };

    match output_dir {
        Some(dir) => dir.join(file_name),
        None => input
            .parent()
            .map(|p| p.join(&file_name))
            .unwrap_or(file_name),
    }
}

/// Serialise the record (merging the registry verdict, when present) and
/// write it atomically to `path`.
pub async fn write_record(
    record: &ExtractionRecord,
    vat_status: Option<VatStatus>,
    path: &Path,
) -> Result<(), ExtractError> {
    let mut value = serde_json::to_value(record)
        .map_err(|e| ExtractError::Internal(format!("record serialisation: {e}")))?;

    if let (Value::Object(map), Some(status)) = (&mut value, vat_status) {
        map.insert(
            "vat_status".to_string(),
            serde_json::to_value(status)
                .map_err(|e| ExtractError::Internal(format!("status serialisation: {e}")))?,
        );
    }

    let mut json = serde_json::to_string_pretty(&value)
        .map_err(|e| ExtractError::Internal(format!("record serialisation: {e}")))?;
    json.push('\n');

    let write_failed = |source: std::io::Error| ExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
        }
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)?;

    debug!("Wrote {} ({} bytes)", path.display(), json.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::parse::parse_response;

    #[test]
    fn output_named_after_source_stem() {
        assert_eq!(
            output_path_for(Path::new("/in/invoice1.pdf"), None),
            PathBuf::from("/in/invoice1.json")
        );
        assert_eq!(
            output_path_for(Path::new("/in/scan.v2.png"), None),
            PathBuf::from("/in/scan.v2.json")
        );
        assert_eq!(
            output_path_for(Path::new("/in/invoice1.pdf"), Some(Path::new("/out"))),
            PathBuf::from("/out/invoice1.json")
        );
    }

    #[tokio::test]
    async fn written_file_contains_exactly_the_extracted_fields() {
        let record = parse_response(
            r#"{"issuer":"ACME s.r.o.","vat_id":"CZ12345678","total":1500.0,"currency":"CZK","line_items":[]}"#,
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = output_path_for(&dir.path().join("invoice1.pdf"), None);
        write_record(&record, None, &path).await.unwrap();

        assert_eq!(path.file_name().unwrap(), "invoice1.json");
        let value: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj["issuer"], "ACME s.r.o.");
        assert_eq!(obj["vat_id"], "CZ12345678");
        assert_eq!(obj["total"], 1500.0);
        assert_eq!(obj["currency"], "CZK");
        assert_eq!(obj["line_items"], serde_json::json!([]));
        // Exactly the extracted fields, nothing invented.
        // serde_json's Map is ordered by key.
        let keys: Vec<&String> = obj.keys().collect();
        assert_eq!(keys, ["currency", "issuer", "line_items", "total", "vat_id"]);
    }

    #[tokio::test]
    async fn vat_status_merged_only_when_supplied() {
        let record = parse_response(r#"{"issuer":"A","total":1}"#).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let without = dir.path().join("without.json");
        write_record(&record, None, &without).await.unwrap();
        let value: Value =
            serde_json::from_str(&std::fs::read_to_string(&without).unwrap()).unwrap();
        assert!(value.get("vat_status").is_none());

        let with = dir.path().join("with.json");
        write_record(&record, Some(VatStatus::Unavailable), &with)
            .await
            .unwrap();
        let value: Value =
            serde_json::from_str(&std::fs::read_to_string(&with).unwrap()).unwrap();
        assert_eq!(value["vat_status"], "unavailable");
    }

    #[tokio::test]
    async fn no_tmp_file_left_behind() {
        let record = parse_response(r#"{"issuer":"A","total":1}"#).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        write_record(&record, None, &path).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["out.json"]);
    }

    #[tokio::test]
    async fn missing_output_directory_is_created() {
        let record = parse_response(r#"{"issuer":"A","total":1}"#).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.json");

        write_record(&record, None, &path).await.unwrap();
        assert!(path.exists());
    }
}
