//! Name-based kind inference and placeholder hints
//!
//! Text fields in a PDF carry no semantic type, so the field name is the only
//! signal. Rules are evaluated in table order and the first match wins.

use crate::form::FieldKind;

const DATE_KEYWORDS: &[&str] = &[
    "date", "birth", "dob", "expiry", "expires", "created", "modified",
];

const NUMBER_KEYWORDS: &[&str] = &[
    "number", "phone", "zip", "postal", "amount", "price", "cost", "age", "year",
];

/// Ordered (keywords, kind) rules for native text fields. Date before number.
const TEXT_KIND_RULES: &[(&[&str], FieldKind)] = &[
    (DATE_KEYWORDS, FieldKind::Date),
    (NUMBER_KEYWORDS, FieldKind::Number),
];

/// Canned hints keyed by a name fragment, checked in order
const PLACEHOLDER_HINTS: &[(&str, &str)] = &[
    ("name", "Enter your name"),
    ("email", "Enter email address"),
    ("phone", "Enter phone number"),
    ("address", "Enter address"),
    ("city", "Enter city"),
    ("state", "Enter state"),
    ("zip", "Enter ZIP code"),
];

/// Kind for a native text field with the given name
pub fn infer_text_kind(name: &str) -> FieldKind {
    let lower = name.to_lowercase();

    TEXT_KIND_RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(_, kind)| *kind)
        .unwrap_or(FieldKind::Text)
}

/// Advisory input hint for an extracted field
pub fn placeholder(name: &str, kind: FieldKind) -> String {
    match kind {
        FieldKind::Date => return "MM/DD/YYYY".to_string(),
        FieldKind::Number => return "Enter number".to_string(),
        _ => {}
    }

    let lower = name.to_lowercase();
    PLACEHOLDER_HINTS
        .iter()
        .find(|(fragment, _)| lower.contains(fragment))
        .map(|(_, hint)| hint.to_string())
        .unwrap_or_else(|| generic_placeholder(name))
}

/// "Enter " followed by the name with `_`/`-` turned into spaces, lowercased
pub fn generic_placeholder(name: &str) -> String {
    format!("Enter {}", name.replace(['_', '-'], " ").to_lowercase())
}
