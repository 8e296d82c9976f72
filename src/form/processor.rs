//! Form field processor: load, classify, fill, preview, download

use crate::error::{Error, FieldApplyError, Result};
use crate::form::download::{filled_file_name, SaveTarget};
use crate::form::native::{self, NativeField, NativeKind};
use crate::form::preview::PreviewHandle;
use crate::form::{classify, Field, FieldKind, FieldValue, FormData};
use crate::source::resolver::ensure_pdf_header;
use crate::source::PreviewStore;
use lopdf::Document;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Default upload limit (50 MB)
pub const DEFAULT_MAX_INPUT_BYTES: u64 = 50 * 1024 * 1024;

struct LoadedForm {
    document: Document,
    native: Vec<NativeField>,
    file_name: String,
    page_count: u32,
}

/// Result of writing generic values into a copy of the loaded document
#[derive(Debug, Default)]
pub struct FillOutcome {
    /// Serialized filled PDF
    pub bytes: Vec<u8>,
    /// Native fields whose value was written
    pub applied: usize,
    /// Fields with no native counterpart
    pub skipped: Vec<String>,
    pub failures: Vec<FieldApplyError>,
}

/// A stored preview plus the per-field report of the fill behind it
#[derive(Debug)]
pub struct Preview {
    pub handle: PreviewHandle,
    pub size_bytes: usize,
    pub applied: usize,
    pub skipped: Vec<String>,
    pub failures: Vec<FieldApplyError>,
}

enum Applied {
    Written { regenerate: bool },
    Unchanged,
}

/// Maps a PDF AcroForm onto generic [`Field`]s and back.
///
/// Holds at most one loaded document. `load` replaces it; `fill` never
/// mutates it.
pub struct FormFieldProcessor {
    loaded: Option<LoadedForm>,
    max_input_bytes: u64,
}

impl Default for FormFieldProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl FormFieldProcessor {
    pub fn new() -> Self {
        Self::with_max_input_bytes(DEFAULT_MAX_INPUT_BYTES)
    }

    pub fn with_max_input_bytes(max_input_bytes: u64) -> Self {
        Self {
            loaded: None,
            max_input_bytes,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// File name given at load time
    pub fn file_name(&self) -> Option<&str> {
        self.loaded.as_ref().map(|l| l.file_name.as_str())
    }

    pub fn page_count(&self) -> Option<u32> {
        self.loaded.as_ref().map(|l| l.page_count)
    }

    /// Drop the loaded document
    pub fn reset(&mut self) {
        self.loaded = None;
    }

    /// Parse `data` and extract one generic field per terminal native field.
    ///
    /// Any previously loaded document is dropped first, also on failure.
    pub fn load(&mut self, data: &[u8], file_name: &str) -> Result<FormData> {
        self.loaded = None;

        let size = data.len() as u64;
        if size > self.max_input_bytes {
            return Err(Error::FileTooLarge {
                size,
                max_size: self.max_input_bytes,
            });
        }
        ensure_pdf_header(data, "Upload")?;

        let document = Document::load_mem(data).map_err(|e| Error::InvalidPdf {
            reason: e.to_string(),
        })?;
        let native = native::read_fields(&document)?;
        let page_count = document.get_pages().len() as u32;

        let fields: Vec<Field> = native.iter().map(to_generic).collect();
        for field in &fields {
            tracing::debug!(name = %field.name, kind = %field.kind, "Extracted field");
        }
        tracing::info!(
            file_name,
            page_count,
            fields = fields.len(),
            "Loaded PDF form"
        );

        self.loaded = Some(LoadedForm {
            document,
            native,
            file_name: file_name.to_string(),
            page_count,
        });

        Ok(FormData {
            fillable_fields_count: fields.len(),
            fields,
            file_name: file_name.to_string(),
            page_count,
        })
    }

    /// Write `fields` into a copy of the loaded document and serialize it.
    ///
    /// Per-field problems end up in [`FillOutcome::failures`]; only a missing
    /// document or a serialization failure is an error.
    pub fn fill(&self, fields: &[Field]) -> Result<FillOutcome> {
        let loaded = self.loaded.as_ref().ok_or(Error::NoDocumentLoaded)?;

        let mut by_name: HashMap<&str, &NativeField> = HashMap::new();
        for native in &loaded.native {
            by_name.entry(native.name.as_str()).or_insert(native);
        }

        let mut document = loaded.document.clone();
        let mut outcome = FillOutcome::default();
        let mut regenerate = false;

        for field in fields {
            let Some(native) = by_name.get(field.name.as_str()) else {
                outcome.skipped.push(field.name.clone());
                continue;
            };

            match apply(&mut document, native, &field.value) {
                Ok(Applied::Written { regenerate: r }) => {
                    outcome.applied += 1;
                    regenerate |= r;
                }
                Ok(Applied::Unchanged) => {}
                Err(reason) => {
                    tracing::warn!(field = %field.name, reason = %reason, "Failed to fill field");
                    outcome.failures.push(FieldApplyError {
                        name: field.name.clone(),
                        reason,
                    });
                }
            }
        }

        if regenerate {
            native::request_appearance_regeneration(&mut document)?;
        }

        document
            .save_to(&mut outcome.bytes)
            .map_err(|e| Error::Pdf {
                reason: e.to_string(),
            })?;

        tracing::info!(
            file_name = %loaded.file_name,
            applied = outcome.applied,
            skipped = outcome.skipped.len(),
            failures = outcome.failures.len(),
            bytes = outcome.bytes.len(),
            "Filled PDF form"
        );
        Ok(outcome)
    }

    /// Fill and park the bytes in `store` behind a fresh handle
    pub fn preview(&self, fields: &[Field], store: &Arc<PreviewStore>) -> Result<Preview> {
        let FillOutcome {
            bytes,
            applied,
            skipped,
            failures,
        } = self.fill(fields)?;

        let size_bytes = bytes.len();
        let key = store.insert(bytes)?;
        tracing::debug!(key = %key, "Stored preview");

        Ok(Preview {
            handle: PreviewHandle::new(Arc::clone(store), key),
            size_bytes,
            applied,
            skipped,
            failures,
        })
    }

    /// Hand filled bytes to `target` as `<stem>_filled.pdf`
    pub fn download(
        &self,
        bytes: Vec<u8>,
        suggested_name: &str,
        target: &dyn SaveTarget,
    ) -> Result<PathBuf> {
        let file_name = filled_file_name(suggested_name);
        target.save(&file_name, &bytes)
    }
}

fn to_generic(native: &NativeField) -> Field {
    let non_empty = |options: &[String]| (!options.is_empty()).then(|| options.to_vec());

    let (kind, value, options) = match &native.kind {
        NativeKind::CheckBox { checked, .. } => {
            (FieldKind::Checkbox, FieldValue::Checked(*checked), None)
        }
        NativeKind::Dropdown {
            selected, options, ..
        } => (
            FieldKind::Dropdown,
            FieldValue::Text(selected.clone().unwrap_or_default()),
            non_empty(options),
        ),
        NativeKind::RadioGroup {
            selected, options, ..
        } => (
            FieldKind::Radio,
            FieldValue::Text(selected.clone().unwrap_or_default()),
            non_empty(options),
        ),
        NativeKind::Text { value } => (
            classify::infer_text_kind(&native.name),
            FieldValue::Text(value.clone()),
            None,
        ),
        NativeKind::Unsupported { field_type } => {
            tracing::debug!(
                name = %native.name,
                field_type = field_type.as_deref().unwrap_or("none"),
                "Unsupported field type, exposing as text"
            );
            (FieldKind::Text, FieldValue::default(), None)
        }
    };

    Field {
        placeholder: classify::placeholder(&native.name, kind),
        name: native.name.clone(),
        kind,
        value,
        required: false,
        options,
        max_length: native.max_length,
        page: native.page,
        x: native.rect.map(|r| r.x),
        y: native.rect.map(|r| r.y),
        width: native.rect.map(|r| r.width),
        height: native.rect.map(|r| r.height),
    }
}

/// Index of the option `value` names; `None` for an empty value, which
/// leaves the selection alone
fn chosen_option(
    options: &[String],
    value: &FieldValue,
) -> std::result::Result<Option<usize>, String> {
    let text = value.to_text();
    if text.is_empty() {
        return Ok(None);
    }
    options
        .iter()
        .position(|option| *option == text)
        .map(Some)
        .ok_or_else(|| not_an_option(&text))
}

fn not_an_option(text: &str) -> String {
    format!("\"{}\" is not one of the field's options", text)
}

fn apply(
    doc: &mut Document,
    field: &NativeField,
    value: &FieldValue,
) -> std::result::Result<Applied, String> {
    let written = |result: Result<()>, regenerate: bool| {
        result
            .map(|_| Applied::Written { regenerate })
            .map_err(|e| e.to_string())
    };

    match &field.kind {
        NativeKind::Text { .. } => {
            let text = value.to_text();
            if let Some(max_length) = field.max_length {
                let length = text.chars().count();
                if length > max_length as usize {
                    return Err(format!(
                        "{} characters exceed the field's maximum length of {}",
                        length, max_length
                    ));
                }
            }
            written(native::write_text(doc, field, &text), true)
        }
        NativeKind::CheckBox { on_state, .. } => written(
            native::write_checked(doc, field, on_state, value.is_truthy()),
            false,
        ),
        NativeKind::Dropdown {
            options,
            exports,
            editable,
            ..
        } => {
            let text = value.to_text();
            let export = match chosen_option(options, value) {
                Ok(None) => return Ok(Applied::Unchanged),
                Ok(Some(index)) => exports.get(index).cloned().unwrap_or(text),
                Err(_) if *editable => text,
                Err(reason) => return Err(reason),
            };
            written(native::write_choice(doc, field, &export), true)
        }
        NativeKind::RadioGroup {
            options, states, ..
        } => match chosen_option(options, value)? {
            Some(index) => match states.get(index) {
                Some(state) => written(native::write_radio(doc, field, state), false),
                None => Err(not_an_option(&value.to_text())),
            },
            None => Ok(Applied::Unchanged),
        },
        NativeKind::Unsupported { .. } => Ok(Applied::Unchanged),
    }
}
