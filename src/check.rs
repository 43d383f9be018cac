use anyhow::{anyhow, Result};
use jsonschema::JSONSchema;
use serde_json::{json, Value};

use crate::catalog::json_kind;
use crate::classify::{classify, Kind};

/// Findings of a catalog lint.
#[derive(Debug, Default)]
pub(crate) struct CheckReport {
    pub(crate) entries: usize,
    /// Entries whose value does not describe a method.
    pub(crate) violations: Vec<String>,
    /// Entries explicitly mapped to `null`; they never match.
    pub(crate) null_entries: Vec<String>,
    /// Keys that can never be classified as bridge exports.
    pub(crate) unreachable: Vec<String>,
}

impl CheckReport {
    pub(crate) fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

fn descriptor_schema() -> Value {
    json!({
        "type": "object",
        "required": ["returnType", "isStatic", "argumentTypes"],
        "properties": {
            "returnType": {"type": "string", "minLength": 1},
            "isStatic": {"type": "boolean"},
            "argumentTypes": {
                "type": "array",
                "items": {"type": "string", "minLength": 1}
            }
        }
    })
}

/// Lint a catalog document, reporting every malformed entry.
pub(crate) fn check_catalog(document: &Value) -> Result<CheckReport> {
    let Value::Object(entries) = document else {
        return Ok(CheckReport {
            violations: vec![format!(
                "catalog must be a JSON object, found {}",
                json_kind(document)
            )],
            ..CheckReport::default()
        });
    };

    let schema = descriptor_schema();
    let compiled =
        JSONSchema::compile(&schema).map_err(|err| anyhow!("invalid descriptor schema: {err}"))?;

    let mut report = CheckReport {
        entries: entries.len(),
        ..CheckReport::default()
    };
    for (name, value) in entries {
        if classify(name) != Kind::BridgeExport {
            report.unreachable.push(name.clone());
        }
        if value.is_null() {
            report.null_entries.push(name.clone());
            continue;
        }
        if let Err(errors) = compiled.validate(value) {
            for error in errors {
                report
                    .violations
                    .push(format!("{name}{}: {error}", error.instance_path));
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_accepts_well_formed_catalog() {
        let document = json!({
            "Java_A_b": {"returnType": "jint", "isStatic": true, "argumentTypes": ["jstring"]},
            "Java_A_c": {"returnType": "void", "isStatic": false, "argumentTypes": []}
        });

        let report = check_catalog(&document).expect("check catalog");

        assert!(report.is_valid());
        assert_eq!(2, report.entries);
        assert!(report.null_entries.is_empty());
        assert!(report.unreachable.is_empty());
    }

    #[test]
    fn check_reports_each_malformed_entry() {
        let document = json!({
            "Java_A_b": {"returnType": "jint", "isStatic": "yes", "argumentTypes": []},
            "Java_A_c": {"returnType": "jint", "isStatic": true, "argumentTypes": [1]},
            "Java_A_d": {"isStatic": true, "argumentTypes": []},
            "Java_A_e": {"returnType": "jint", "isStatic": true, "argumentTypes": []}
        });

        let report = check_catalog(&document).expect("check catalog");

        assert!(!report.is_valid());
        assert_eq!(3, report.violations.len());
        assert!(report.violations[0].starts_with("Java_A_b/isStatic"));
        assert!(report.violations[1].starts_with("Java_A_c/argumentTypes/0"));
        assert!(report.violations[2].starts_with("Java_A_d:"));
    }

    #[test]
    fn check_flags_null_and_unreachable_entries() {
        let document = json!({
            "Java_A_b": null,
            "nativeInit": {"returnType": "void", "isStatic": true, "argumentTypes": []}
        });

        let report = check_catalog(&document).expect("check catalog");

        assert!(report.is_valid());
        assert_eq!(vec!["Java_A_b".to_string()], report.null_entries);
        assert_eq!(vec!["nativeInit".to_string()], report.unreachable);
    }

    #[test]
    fn check_rejects_non_object_documents() {
        let report = check_catalog(&json!([{"Java_A_b": null}])).expect("check catalog");

        assert_eq!(
            vec!["catalog must be a JSON object, found an array".to_string()],
            report.violations
        );
    }
}
