//! Debug snapshot of an extracted form

use crate::form::{Field, FieldValue};
use schemars::JsonSchema;
use serde::Serialize;
use std::collections::BTreeMap;

/// Widget geometry of a field, when the document has it
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DebugPosition {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DebugField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: FieldValue,
    pub options: Option<Vec<String>>,
    pub position: DebugPosition,
}

/// Everything a human needs to see why a form extracted the way it did
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DebugSnapshot {
    pub file_name: String,
    pub page_count: u32,
    pub fields_detected: usize,
    /// Kind name to count, ordered by kind name
    pub field_types: BTreeMap<String, usize>,
    pub fields_with_options: usize,
    pub fields: Vec<DebugField>,
}

impl DebugSnapshot {
    pub fn capture(file_name: &str, page_count: u32, fields: &[Field]) -> Self {
        let mut field_types = BTreeMap::new();
        for field in fields {
            *field_types.entry(field.kind.to_string()).or_insert(0) += 1;
        }

        Self {
            file_name: file_name.to_string(),
            page_count,
            fields_detected: fields.len(),
            field_types,
            fields_with_options: fields.iter().filter(|f| f.options.is_some()).count(),
            fields: fields
                .iter()
                .map(|field| DebugField {
                    name: field.name.clone(),
                    kind: field.kind.to_string(),
                    value: field.value.clone(),
                    options: field.options.clone(),
                    position: DebugPosition {
                        x: field.x,
                        y: field.y,
                        width: field.width,
                        height: field.height,
                        page: field.page,
                    },
                })
                .collect(),
        }
    }
}
