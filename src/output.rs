use serde::Deserialize;
use serde_json::Value;

use crate::error::OutputError;

/// One record of the code generator's structured (JSON) output stream.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenRecord {
    /// Diagnostic message, logged, no state change.
    Info { info: String },
    /// Diagnostic error. Visible to the user but does not by itself fail
    /// the task; the process exit code is authoritative.
    Error { error: String },
    /// A file the generator produced under the build output tree.
    GeneratedFile {
        file_name: String,
        should_be_added_to_build: bool,
    },
    /// A dependency file discovered while the generator ran; changes to it
    /// must force a re-run even though it is not part of the static scan.
    DependencyFile { file_name: String },
}

const KNOWN_TYPES: &[&str] = &["info", "error", "generated_file", "dependency_file"];

/// Decode the generator's output into typed records.
///
/// Non-JSON input means the external tool errored before entering its
/// generation phase, so the offending raw text is carried verbatim. An
/// unknown `type` discriminator is a fatal parse error for this invocation.
pub(crate) fn parse_records(text: &str) -> Result<Vec<GenRecord>, OutputError> {
    let values: Vec<Value> = serde_json::from_str(text).map_err(|err| OutputError::Malformed {
        error: err.to_string(),
        raw: text.to_string(),
    })?;

    let mut records = Vec::with_capacity(values.len());

    for value in values {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("<missing>")
            .to_string();

        if !KNOWN_TYPES.contains(&kind.as_str()) {
            return Err(OutputError::UnknownType { kind });
        }

        let record =
            serde_json::from_value(value).map_err(|err| OutputError::Record {
                kind: kind.clone(),
                error: err.to_string(),
            })?;

        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_record_types() {
        let text = r#"[
            {"type":"info","info":"scanning"},
            {"type":"error","error":"bad tag"},
            {"type":"generated_file","file_name":"/bld/a.cpp","should_be_added_to_build":true},
            {"type":"dependency_file","file_name":"/src/dep.py"}
        ]"#;

        let records = parse_records(text).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(
            records[2],
            GenRecord::GeneratedFile {
                file_name: "/bld/a.cpp".into(),
                should_be_added_to_build: true,
            }
        );
    }

    #[test]
    fn empty_stream_is_fine() {
        assert!(parse_records("[]").unwrap().is_empty());
    }

    #[test]
    fn non_json_surfaces_raw_text() {
        let err = parse_records("clang: error: no input files").unwrap_err();
        match err {
            OutputError::Malformed { raw, .. } => {
                assert!(raw.contains("no input files"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_type_is_fatal() {
        let err = parse_records(r#"[{"type":"telemetry","data":1}]"#).unwrap_err();
        assert!(matches!(err, OutputError::UnknownType { kind } if kind == "telemetry"));
    }

    #[test]
    fn known_type_with_missing_fields_is_a_record_error() {
        let err = parse_records(r#"[{"type":"generated_file"}]"#).unwrap_err();
        assert!(matches!(err, OutputError::Record { kind, .. } if kind == "generated_file"));
    }
}
