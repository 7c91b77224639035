//! Team-configured wrap-up forms and their validation.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{InboxError, Result};

/// Input control of a wrap-up field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    #[serde(rename = "textarea")]
    TextArea,
    Select { options: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapUpField {
    pub id: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
}

impl WrapUpField {
    pub fn text(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: FieldKind::Text,
            required: false,
        }
    }

    pub fn select(id: impl Into<String>, label: impl Into<String>, options: &[&str]) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: FieldKind::Select {
                options: options.iter().map(|o| o.to_string()).collect(),
            },
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A team's wrap-up form
///
/// When `mandatory` is set every `required` field must be filled and the
/// skip path is closed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapUpForm {
    #[serde(default)]
    pub mandatory: bool,
    pub fields: Vec<WrapUpField>,
}

impl WrapUpForm {
    /// Check the form definition itself
    pub fn validate_definition(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.id.trim().is_empty() {
                return Err(InboxError::validation("wrap-up field id cannot be empty"));
            }
            if !seen.insert(field.id.as_str()) {
                return Err(InboxError::validation(format!("duplicate wrap-up field id '{}'", field.id)));
            }
            if let FieldKind::Select { options } = &field.kind {
                if options.is_empty() {
                    return Err(InboxError::validation(format!(
                        "select field '{}' needs at least one option",
                        field.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Whether "skip & resolve" is offered
    pub fn allows_skip(&self) -> bool {
        !self.mandatory
    }

    /// Validate submitted values against the form
    ///
    /// Returns the trimmed, non-empty values keyed by field id.
    pub fn validate_submission(&self, values: &HashMap<String, String>) -> Result<BTreeMap<String, String>> {
        if let Some(unknown) = values.keys().find(|id| !self.fields.iter().any(|f| &f.id == *id)) {
            return Err(InboxError::validation(format!("unknown wrap-up field '{}'", unknown)));
        }

        let mut accepted = BTreeMap::new();
        for field in &self.fields {
            let value = values.get(&field.id).map(|v| v.trim()).unwrap_or_default();

            if value.is_empty() {
                if self.mandatory && field.required {
                    return Err(InboxError::validation(format!("field '{}' is required", field.label)));
                }
                continue;
            }

            match &field.kind {
                FieldKind::Text | FieldKind::TextArea => {}
                FieldKind::Select { options } => {
                    if !options.iter().any(|o| o == value) {
                        return Err(InboxError::validation(format!(
                            "'{}' is not an option of field '{}'",
                            value, field.label
                        )));
                    }
                }
            }

            accepted.insert(field.id.clone(), value.to_string());
        }

        Ok(accepted)
    }
}
