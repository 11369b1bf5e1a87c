//! Checks for feedback field definitions and submitted response values.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};

use ufb_db::models::NewField;
use ufb_types::api::{FieldInput, FieldView};
use ufb_types::models::FieldFormat;

use crate::error::ApiError;

pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Validate a field list and turn it into rows ready for storage.
pub fn validate_fields(fields: &[FieldInput]) -> Result<Vec<NewField>, ApiError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(fields.len());

    for field in fields {
        if !is_valid_key(&field.key) {
            return Err(ApiError::bad_request(format!(
                "field key '{}' may only contain letters, digits and '_'",
                field.key
            )));
        }
        if !seen.insert(field.key.as_str()) {
            return Err(ApiError::bad_request(format!("duplicate field key '{}'", field.key)));
        }
        let name = field.name.trim();
        if name.is_empty() {
            return Err(ApiError::bad_request(format!("field '{}' needs a name", field.key)));
        }

        if field.format.has_options() {
            if field.options.is_empty() {
                return Err(ApiError::bad_request(format!(
                    "field '{}' of format {} needs options",
                    field.key,
                    field.format.as_str()
                )));
            }
            let mut distinct = HashSet::new();
            for option in &field.options {
                if option.trim().is_empty() || !distinct.insert(option.as_str()) {
                    return Err(ApiError::bad_request(format!(
                        "field '{}' has an empty or duplicate option",
                        field.key
                    )));
                }
            }
        } else if !field.options.is_empty() {
            return Err(ApiError::bad_request(format!(
                "field '{}' of format {} cannot have options",
                field.key,
                field.format.as_str()
            )));
        }

        out.push(NewField {
            key: field.key.clone(),
            name: name.to_string(),
            description: field.description.clone(),
            format: field.format.as_str().to_string(),
            options: serde_json::to_string(&field.options).map_err(anyhow::Error::from)?,
            is_required: field.required,
        });
    }

    Ok(out)
}

/// An existing key keeps its format; stored values would no longer match.
pub fn check_format_changes(existing: &[FieldView], incoming: &[FieldInput]) -> Result<(), ApiError> {
    for field in incoming {
        if let Some(current) = existing.iter().find(|f| f.key == field.key) {
            if current.format != field.format {
                return Err(ApiError::bad_request(format!(
                    "field '{}' cannot change format from {} to {}",
                    field.key,
                    current.format.as_str(),
                    field.format.as_str()
                )));
            }
        }
    }
    Ok(())
}

fn is_date(s: &str) -> bool {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() || DateTime::parse_from_rfc3339(s).is_ok()
}

fn check_value(field: &FieldView, value: &Value) -> Result<(), String> {
    let ok = match field.format {
        FieldFormat::Text | FieldFormat::Keyword => value.is_string(),
        FieldFormat::Number => value.is_number(),
        FieldFormat::Boolean => value.is_boolean(),
        FieldFormat::Date => value.as_str().is_some_and(is_date),
        FieldFormat::Select => {
            let Some(choice) = value.as_str() else {
                return Err(format!("field '{}' expects one option", field.key));
            };
            if !field.options.iter().any(|o| o == choice) {
                return Err(format!("'{}' is not an option of field '{}'", choice, field.key));
            }
            true
        }
        FieldFormat::MultiSelect => {
            let Some(choices) = value.as_array() else {
                return Err(format!("field '{}' expects a list of options", field.key));
            };
            for choice in choices {
                let Some(choice) = choice.as_str() else {
                    return Err(format!("field '{}' expects a list of options", field.key));
                };
                if !field.options.iter().any(|o| o == choice) {
                    return Err(format!("'{}' is not an option of field '{}'", choice, field.key));
                }
            }
            true
        }
    };

    if ok {
        Ok(())
    } else {
        Err(format!("field '{}' expects a {} value", field.key, field.format.as_str()))
    }
}

/// Validate submitted values against the feedback's fields and return
/// `(field_id, json)` pairs to store. Nulls count as absent.
pub fn validate_response(fields: &[FieldView], values: &Map<String, Value>) -> Result<Vec<(i64, String)>, ApiError> {
    for key in values.keys() {
        if !fields.iter().any(|f| &f.key == key) {
            return Err(ApiError::bad_request(format!("unknown field '{}'", key)));
        }
    }

    let mut out = Vec::new();
    for field in fields {
        match values.get(&field.key) {
            None | Some(Value::Null) => {
                if field.required {
                    return Err(ApiError::bad_request(format!("field '{}' is required", field.key)));
                }
            }
            Some(value) => {
                check_value(field, value).map_err(ApiError::BadRequest)?;
                out.push((field.id, value.to_string()));
            }
        }
    }
    Ok(out)
}
