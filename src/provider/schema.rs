//! Structured-output schema descriptors.
//!
//! Agents declare their response shape as an explicit list of named fields;
//! the LLM client is the only component expected to know how to realise a
//! descriptor (structured decoding or post-parse validation). The validator
//! here is the post-parse side of that contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The type of a declared output field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free-form prose.
    Text,
    /// A list of short strings.
    TextList,
    /// A number, optionally bounded inclusively.
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    /// One of a closed set of lowercase labels.
    Enumeration(Vec<String>),
}

/// A single named field in an output schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub description: String,
    pub kind: FieldKind,
    pub required: bool,
}

/// An explicit schema descriptor: the target shape of one structured response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

/// Why a candidate value failed validation.
#[derive(Debug, Error)]
pub enum SchemaViolation {
    #[error("expected a JSON object for schema '{0}'")]
    NotAnObject(String),
    #[error("missing required field '{0}'")]
    MissingField(String),
    #[error("field '{field}' has the wrong type: expected {expected}")]
    WrongType { field: String, expected: String },
    #[error("field '{field}' is {value}, outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("field '{field}' has label '{label}', not one of {allowed:?}")]
    UnknownLabel {
        field: String,
        label: String,
        allowed: Vec<String>,
    },
}

impl SchemaDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(
        mut self,
        name: &str,
        description: &str,
        kind: FieldKind,
        required: bool,
    ) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            required,
        });
        self
    }

    /// Validate a parsed response object against this descriptor.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaViolation> {
        let object = value
            .as_object()
            .ok_or_else(|| SchemaViolation::NotAnObject(self.name.clone()))?;

        for field in &self.fields {
            let Some(candidate) = object.get(&field.name) else {
                if field.required {
                    return Err(SchemaViolation::MissingField(field.name.clone()));
                }
                continue;
            };

            match &field.kind {
                FieldKind::Text => {
                    if !candidate.is_string() {
                        return Err(SchemaViolation::WrongType {
                            field: field.name.clone(),
                            expected: "string".to_string(),
                        });
                    }
                }
                FieldKind::TextList => {
                    let ok = candidate
                        .as_array()
                        .is_some_and(|items| items.iter().all(Value::is_string));
                    if !ok {
                        return Err(SchemaViolation::WrongType {
                            field: field.name.clone(),
                            expected: "array of strings".to_string(),
                        });
                    }
                }
                FieldKind::Number { min, max } => {
                    let Some(number) = candidate.as_f64() else {
                        return Err(SchemaViolation::WrongType {
                            field: field.name.clone(),
                            expected: "number".to_string(),
                        });
                    };
                    let lo = min.unwrap_or(f64::NEG_INFINITY);
                    let hi = max.unwrap_or(f64::INFINITY);
                    if number < lo || number > hi {
                        return Err(SchemaViolation::OutOfRange {
                            field: field.name.clone(),
                            value: number,
                            min: lo,
                            max: hi,
                        });
                    }
                }
                FieldKind::Enumeration(allowed) => {
                    let Some(label) = candidate.as_str() else {
                        return Err(SchemaViolation::WrongType {
                            field: field.name.clone(),
                            expected: "string label".to_string(),
                        });
                    };
                    if !allowed.iter().any(|a| a == label) {
                        return Err(SchemaViolation::UnknownLabel {
                            field: field.name.clone(),
                            label: label.to_string(),
                            allowed: allowed.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Render prompt instructions describing the expected JSON shape.
    pub fn instructions(&self) -> String {
        let mut out = String::from(
            "Respond with a single JSON object containing exactly these fields:\n",
        );
        for field in &self.fields {
            let kind = match &field.kind {
                FieldKind::Text => "string".to_string(),
                FieldKind::TextList => "array of strings".to_string(),
                FieldKind::Number { min, max } => match (min, max) {
                    (Some(lo), Some(hi)) => format!("number between {lo} and {hi}"),
                    _ => "number".to_string(),
                },
                FieldKind::Enumeration(allowed) => format!("one of {}", allowed.join(" | ")),
            };
            let optional = if field.required { "" } else { " (optional)" };
            out.push_str(&format!(
                "- \"{}\": {kind}{optional} — {}\n",
                field.name, field.description
            ));
        }
        out
    }
}
