//! Checks applied to resolved input values before a node executes.

use canvascore::{FieldKind, InputPort, ValidationError, Value};
use std::collections::HashMap;

/// Validate `values` against the port schema, in schema order.
///
/// Structured fields given as text are parsed in place, so the executor
/// receives `Value::Json` for them.
pub fn validate_inputs(
    ports: &[InputPort],
    values: &mut HashMap<String, Value>,
) -> Result<(), ValidationError> {
    for port in ports {
        if let Some(value) = values.get_mut(&port.name) {
            check_field(port, value)?;
        }

        let filled = values.get(&port.name).map_or(false, |v| !v.is_empty());
        if port.required && !filled {
            return Err(ValidationError::Required {
                field: port.name.clone(),
            });
        }
    }
    Ok(())
}

fn check_field(port: &InputPort, value: &mut Value) -> Result<(), ValidationError> {
    match port.kind {
        FieldKind::Json => {
            if let Some(parsed) = parse_structured(&port.name, value)? {
                *value = Value::Json(parsed);
            }
        }
        FieldKind::MultiSelect => {
            let actual = value.count();
            if let Some(max) = port.max.filter(|max| actual > *max) {
                return Err(ValidationError::TooManySelections {
                    field: port.name.clone(),
                    max,
                    actual,
                });
            }
            if let Some(min) = port.min.filter(|min| actual > 0 && actual < *min) {
                return Err(ValidationError::TooFewSelections {
                    field: port.name.clone(),
                    min,
                    actual,
                });
            }
        }
        FieldKind::File => {
            let actual = value.count();
            if let Some(max) = port.max.filter(|max| actual > *max) {
                return Err(ValidationError::TooManyFiles {
                    field: port.name.clone(),
                    max,
                    actual,
                });
            }
            if let Some(min) = port.min.filter(|min| actual > 0 && actual < *min) {
                return Err(ValidationError::TooFewFiles {
                    field: port.name.clone(),
                    min,
                    actual,
                });
            }
        }
        FieldKind::Any | FieldKind::Text | FieldKind::Number | FieldKind::Boolean => {}
    }
    Ok(())
}

/// Returns the parsed document for textual values, `None` when the value is
/// already structured or blank.
fn parse_structured(
    field: &str,
    value: &Value,
) -> Result<Option<serde_json::Value>, ValidationError> {
    let parse_error = |e: serde_json::Error| ValidationError::Parse {
        field: field.to_string(),
        message: e.to_string(),
    };

    match value {
        Value::String(text) if !text.trim().is_empty() => {
            serde_json::from_str(text).map(Some).map_err(parse_error)
        }
        Value::Bytes(bytes) if !bytes.is_empty() => {
            serde_json::from_slice(bytes).map(Some).map_err(parse_error)
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn structured_text_is_parsed() {
        let ports = [InputPort::new("config", FieldKind::Json)];
        let mut input = values(&[("config", Value::from(r#"{"retries": 3}"#))]);

        validate_inputs(&ports, &mut input).unwrap();
        assert_eq!(input["config"], Value::Json(json!({"retries": 3})));
    }

    #[test]
    fn malformed_structured_text_is_a_parse_error() {
        let ports = [InputPort::new("config", FieldKind::Json)];
        let mut input = values(&[("config", Value::from("{not json"))]);

        let err = validate_inputs(&ports, &mut input).unwrap_err();
        assert!(matches!(err, ValidationError::Parse { ref field, .. } if field == "config"));
    }

    #[test]
    fn selection_and_file_limits() {
        let ports = [
            InputPort::new("tags", FieldKind::MultiSelect).with_max(2),
            InputPort::new("files", FieldKind::File).with_max(1),
        ];

        let mut input = values(&[(
            "tags",
            Value::Array(vec!["a".into(), "b".into(), "c".into()]),
        )]);
        assert_eq!(
            validate_inputs(&ports, &mut input),
            Err(ValidationError::TooManySelections {
                field: "tags".into(),
                max: 2,
                actual: 3
            })
        );

        let mut input = values(&[
            ("tags", Value::Array(vec!["a".into()])),
            ("files", Value::Array(vec!["x.txt".into(), "y.txt".into()])),
        ]);
        assert_eq!(
            validate_inputs(&ports, &mut input),
            Err(ValidationError::TooManyFiles {
                field: "files".into(),
                max: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn minimum_selection_applies_only_when_something_is_selected() {
        let ports = [InputPort::new("tags", FieldKind::MultiSelect).with_min(2)];

        let mut empty = values(&[("tags", Value::Array(vec![]))]);
        assert!(validate_inputs(&ports, &mut empty).is_ok());

        let mut one = values(&[("tags", Value::Array(vec!["a".into()]))]);
        assert!(matches!(
            validate_inputs(&ports, &mut one),
            Err(ValidationError::TooFewSelections { min: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn required_fields_must_be_filled() {
        let ports = [InputPort::new("name", FieldKind::Text).required()];

        let mut missing = HashMap::new();
        assert_eq!(
            validate_inputs(&ports, &mut missing),
            Err(ValidationError::Required {
                field: "name".into()
            })
        );

        let mut blank = values(&[("name", Value::from(""))]);
        assert!(validate_inputs(&ports, &mut blank).is_err());

        let mut filled = values(&[("name", Value::from("ada"))]);
        assert!(validate_inputs(&ports, &mut filled).is_ok());
    }
}
