//! Generic form field model shared by extraction, editing and filling

use crate::error::{Error, Result};
use crate::form::classify;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic kind of a generic field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Checkbox,
    Radio,
    Dropdown,
    /// Reserved for custom fields; extraction never produces it
    Signature,
    Date,
    Number,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Radio => "radio",
            FieldKind::Dropdown => "dropdown",
            FieldKind::Signature => "signature",
            FieldKind::Date => "date",
            FieldKind::Number => "number",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current value of a field: boolean for checkboxes, string for everything else
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FieldValue {
    Checked(bool),
    Text(String),
}

impl FieldValue {
    /// Truthiness used when a value lands in a checkbox.
    /// Any non-empty string counts as checked.
    pub fn is_truthy(&self) -> bool {
        match self {
            FieldValue::Checked(checked) => *checked,
            FieldValue::Text(text) => !text.is_empty(),
        }
    }

    /// String form written into text-like native fields
    pub fn to_text(&self) -> String {
        match self {
            FieldValue::Checked(checked) => checked.to_string(),
            FieldValue::Text(text) => text.clone(),
        }
    }
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::Text(String::new())
    }
}

impl From<bool> for FieldValue {
    fn from(checked: bool) -> Self {
        FieldValue::Checked(checked)
    }
}

impl From<&str> for FieldValue {
    fn from(text: &str) -> Self {
        FieldValue::Text(text.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(text: String) -> Self {
        FieldValue::Text(text)
    }
}

/// Generic representation of one form field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Field {
    /// Unique name; equals the native field's fully qualified name
    pub name: String,
    /// Semantic kind
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// Current value (boolean for checkbox, string otherwise)
    pub value: FieldValue,
    /// Always false for extracted fields
    #[serde(default)]
    pub required: bool,
    /// Legal values for dropdown/radio fields taken from the document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    /// Advisory input hint
    #[serde(default)]
    pub placeholder: String,
    /// Maximum text length from the native field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    /// Page of the first widget (1-indexed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
}

impl Field {
    /// Create a user-added field with no native counterpart
    pub fn custom(name: &str, kind: FieldKind, required: bool) -> Self {
        let value = if kind == FieldKind::Checkbox {
            FieldValue::Checked(false)
        } else {
            FieldValue::default()
        };

        Self {
            name: name.to_string(),
            kind,
            value,
            required,
            options: None,
            placeholder: classify::generic_placeholder(name),
            max_length: None,
            page: None,
            x: None,
            y: None,
            width: None,
            height: None,
        }
    }

    /// Fields carrying document options came from the PDF and stay put
    pub fn is_removable(&self) -> bool {
        self.options.is_none()
    }

    /// Checkboxes always count as answered; everything else needs a non-empty value
    pub fn is_completed(&self) -> bool {
        match self.kind {
            FieldKind::Checkbox => true,
            _ => self.value.is_truthy(),
        }
    }

    /// Check that `value` is legal for this field
    pub fn accepts(&self, value: &FieldValue) -> std::result::Result<(), String> {
        match (self.kind, value) {
            (FieldKind::Checkbox, FieldValue::Checked(_)) => Ok(()),
            (FieldKind::Checkbox, FieldValue::Text(_)) => {
                Err("checkbox fields take a boolean value".to_string())
            }
            (_, FieldValue::Checked(_)) => {
                Err(format!("{} fields take a string value", self.kind))
            }
            (_, FieldValue::Text(text)) => {
                if let Some(max_length) = self.max_length {
                    let length = text.chars().count();
                    if length > max_length as usize {
                        return Err(format!(
                            "{} characters exceed the field's maximum length of {}",
                            length, max_length
                        ));
                    }
                }
                match &self.options {
                    Some(options) if !text.is_empty() && !options.contains(text) => Err(format!(
                        "\"{}\" is not one of the field's options",
                        text
                    )),
                    _ => Ok(()),
                }
            }
        }
    }
}

/// Result of loading a document
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct FormData {
    pub fields: Vec<Field>,
    pub file_name: String,
    pub page_count: u32,
    pub fillable_fields_count: usize,
}

/// How much of the form has been answered
#[derive(Debug, Clone, Copy, PartialEq, Serialize, JsonSchema)]
pub struct FormProgress {
    pub total_fields: usize,
    pub completed_fields: usize,
    /// 0.0 - 100.0
    pub percentage: f64,
}

impl FormProgress {
    pub fn of(fields: &[Field]) -> Self {
        let total_fields = fields.len();
        let completed_fields = fields.iter().filter(|f| f.is_completed()).count();
        let percentage = if total_fields > 0 {
            completed_fields as f64 / total_fields as f64 * 100.0
        } else {
            0.0
        };

        Self {
            total_fields,
            completed_fields,
            percentage,
        }
    }
}

/// Append a custom field after validating its name
pub fn add_custom_field<'a>(
    fields: &'a mut Vec<Field>,
    name: &str,
    kind: FieldKind,
    required: bool,
) -> Result<&'a Field> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidField {
            name: String::new(),
            reason: "field name is required".to_string(),
        });
    }
    if fields.iter().any(|f| f.name == name) {
        return Err(Error::InvalidField {
            name: name.to_string(),
            reason: "field name already exists".to_string(),
        });
    }

    fields.push(Field::custom(name, kind, required));
    Ok(&fields[fields.len() - 1])
}

/// Replace the value of one field in place
pub fn update_value(fields: &mut [Field], name: &str, value: FieldValue) -> Result<()> {
    let field = fields
        .iter_mut()
        .find(|f| f.name == name)
        .ok_or_else(|| Error::InvalidField {
            name: name.to_string(),
            reason: "no such field".to_string(),
        })?;

    field.accepts(&value).map_err(|reason| Error::InvalidField {
        name: name.to_string(),
        reason,
    })?;

    field.value = value;
    Ok(())
}

/// Remove a field; fields that came with document options cannot be removed
pub fn remove_field(fields: &mut Vec<Field>, name: &str) -> Result<Field> {
    let index = fields
        .iter()
        .position(|f| f.name == name)
        .ok_or_else(|| Error::InvalidField {
            name: name.to_string(),
            reason: "no such field".to_string(),
        })?;

    if !fields[index].is_removable() {
        return Err(Error::InvalidField {
            name: name.to_string(),
            reason: "fields from the PDF cannot be removed".to_string(),
        });
    }

    Ok(fields.remove(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dropdown(name: &str, options: &[&str], value: &str) -> Field {
        Field {
            options: Some(options.iter().map(|s| s.to_string()).collect()),
            value: FieldValue::from(value),
            ..Field::custom(name, FieldKind::Dropdown, false)
        }
    }

    #[test]
    fn test_value_serializes_untagged() {
        assert_eq!(serde_json::to_string(&FieldValue::Checked(true)).unwrap(), "true");
        assert_eq!(serde_json::to_string(&FieldValue::from("abc")).unwrap(), "\"abc\"");

        let value: FieldValue = serde_json::from_str("false").unwrap();
        assert_eq!(value, FieldValue::Checked(false));
    }

    #[test]
    fn test_field_serializes_kind_as_type() {
        let json = serde_json::to_value(Field::custom("notes", FieldKind::Text, false)).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["value"], "");
        assert!(json.get("options").is_none());
    }

    #[test]
    fn test_truthiness() {
        assert!(FieldValue::Checked(true).is_truthy());
        assert!(!FieldValue::Checked(false).is_truthy());
        assert!(FieldValue::from("x").is_truthy());
        assert!(!FieldValue::from("").is_truthy());
        assert_eq!(FieldValue::Checked(true).to_text(), "true");
    }

    #[test]
    fn test_custom_field_defaults() {
        let field = Field::custom("Emergency-Contact_Name", FieldKind::Text, true);
        assert_eq!(field.value, FieldValue::default());
        assert_eq!(field.placeholder, "Enter emergency contact name");
        assert!(field.required);
        assert!(field.is_removable());

        let field = Field::custom("agree", FieldKind::Checkbox, false);
        assert_eq!(field.value, FieldValue::Checked(false));
    }

    #[test]
    fn test_add_custom_field_rejects_empty_and_duplicates() {
        let mut fields = vec![Field::custom("city", FieldKind::Text, false)];

        assert!(add_custom_field(&mut fields, "   ", FieldKind::Text, false).is_err());
        assert!(add_custom_field(&mut fields, "city", FieldKind::Text, false).is_err());

        let added = add_custom_field(&mut fields, " notes ", FieldKind::Text, false).unwrap();
        assert_eq!(added.name, "notes");
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_update_value_checks_kind_and_options() {
        let mut fields = vec![
            Field::custom("agree", FieldKind::Checkbox, false),
            dropdown("color", &["Red", "Blue"], ""),
        ];

        assert!(update_value(&mut fields, "agree", FieldValue::from("yes")).is_err());
        update_value(&mut fields, "agree", FieldValue::Checked(true)).unwrap();
        assert_eq!(fields[0].value, FieldValue::Checked(true));

        assert!(update_value(&mut fields, "color", FieldValue::from("Green")).is_err());
        update_value(&mut fields, "color", FieldValue::from("Blue")).unwrap();
        update_value(&mut fields, "color", FieldValue::from("")).unwrap();

        assert!(update_value(&mut fields, "missing", FieldValue::from("x")).is_err());
    }

    #[test]
    fn test_update_value_respects_max_length() {
        let mut fields = vec![Field {
            max_length: Some(5),
            ..Field::custom("zip", FieldKind::Text, false)
        }];

        let err = update_value(&mut fields, "zip", FieldValue::from("1234567890")).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidField { ref reason, .. } if reason.contains("maximum length of 5")
        ));
        assert_eq!(fields[0].value, FieldValue::from(""));

        update_value(&mut fields, "zip", FieldValue::from("Z\u{fc}ric")).unwrap();
    }

    #[test]
    fn test_remove_field_keeps_document_fields() {
        let mut fields = vec![
            dropdown("color", &["Red"], "Red"),
            Field::custom("notes", FieldKind::Text, false),
        ];

        assert!(remove_field(&mut fields, "color").is_err());
        let removed = remove_field(&mut fields, "notes").unwrap();
        assert_eq!(removed.name, "notes");
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn test_progress() {
        assert_eq!(FormProgress::of(&[]).percentage, 0.0);

        let mut name = Field::custom("name", FieldKind::Text, false);
        let city = Field::custom("city", FieldKind::Text, false);
        let agree = Field::custom("agree", FieldKind::Checkbox, false);
        name.value = FieldValue::from("Ada");

        let progress = FormProgress::of(&[name, city, agree]);
        assert_eq!(progress.total_fields, 3);
        assert_eq!(progress.completed_fields, 2);
        assert!((progress.percentage - 66.666).abs() < 0.01);
    }
}
