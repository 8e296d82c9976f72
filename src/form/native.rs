//! Native AcroForm access via lopdf
//!
//! Reads the document's `/AcroForm /Fields` tree into a flat list of terminal
//! fields (depth-first, document order) and writes values back into the
//! field and widget dictionaries.

use crate::error::{Error, Result};
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use std::collections::{HashMap, HashSet};

/// Field flag bits (`/Ff`) that matter for classification
mod flags {
    pub const RADIO: i64 = 1 << 15;
    pub const PUSH_BUTTON: i64 = 1 << 16;
    pub const COMBO: i64 = 1 << 17;
    pub const EDIT: i64 = 1 << 18;
}

const OFF_STATE: &[u8] = b"Off";
const DEFAULT_ON_STATE: &str = "Yes";

/// Native field kinds with the state read at load time
#[derive(Debug, Clone, PartialEq)]
pub enum NativeKind {
    Text {
        value: String,
    },
    CheckBox {
        checked: bool,
        /// Appearance state name used when checked
        on_state: String,
    },
    /// Combo box
    Dropdown {
        /// Display text of the selected option, or the raw value of an edited combo
        selected: Option<String>,
        /// Display texts in `/Opt` order
        options: Vec<String>,
        /// Export value written for each option
        exports: Vec<String>,
        /// Accepts values outside `options`
        editable: bool,
    },
    RadioGroup {
        selected: Option<String>,
        /// `/Opt` export values when present, else the widgets' on states
        options: Vec<String>,
        /// Appearance state selected by each option
        states: Vec<String>,
    },
    /// Push buttons, signatures, list boxes, fields without `/FT`
    Unsupported {
        field_type: Option<String>,
    },
}

/// Widget rectangle in PDF user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WidgetRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A terminal field of the document's form
#[derive(Debug, Clone)]
pub struct NativeField {
    /// Fully qualified name (`parent.child`)
    pub name: String,
    /// Field dictionary
    pub id: ObjectId,
    pub kind: NativeKind,
    /// Widget annotations; the field itself when field and widget are merged
    pub widgets: Vec<ObjectId>,
    pub max_length: Option<u32>,
    /// Page of the first widget (1-indexed)
    pub page: Option<u32>,
    pub rect: Option<WidgetRect>,
}

/// Attributes a field inherits from its ancestors
#[derive(Debug, Clone, Default)]
struct Inherited {
    field_type: Option<Vec<u8>>,
    flags: i64,
    value: Option<Object>,
    max_length: Option<u32>,
}

fn pdf_error(e: lopdf::Error) -> Error {
    Error::Pdf {
        reason: e.to_string(),
    }
}

/// Follow references until a direct object is reached
fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    doc.dereference(obj).ok().map(|(_, o)| o)
}

fn resolve_key<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    dict.get(key).ok().and_then(|obj| resolve(doc, obj))
}

/// Decode a PDF text string: UTF-16BE with BOM, else UTF-8, else Latin-1
fn decode_text(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Encode a text string, using UTF-16BE only when ASCII will not do
fn encode_text(text: &str) -> Object {
    if text.is_ascii() {
        return Object::String(text.as_bytes().to_vec(), StringFormat::Literal);
    }

    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

fn object_text(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(decode_text(bytes)),
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

fn object_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(f) => Some(*f as f32),
        _ => None,
    }
}

fn is_off(name: &[u8]) -> bool {
    name == OFF_STATE
}

/// Locate the AcroForm dictionary, if the document has one
fn acroform<'a>(doc: &'a Document) -> Result<Option<&'a Dictionary>> {
    let catalog = doc.catalog().map_err(|e| Error::InvalidPdf {
        reason: format!("Missing document catalog: {}", e),
    })?;

    Ok(resolve_key(doc, catalog, b"AcroForm").and_then(|obj| obj.as_dict().ok()))
}

/// Map every annotation id listed in a page's `/Annots` to its page number
fn annotation_pages(doc: &Document) -> HashMap<ObjectId, u32> {
    let mut pages = HashMap::new();

    for (page_num, page_id) in doc.get_pages() {
        let Ok(page) = doc.get_dictionary(page_id) else {
            continue;
        };
        let Some(Object::Array(annots)) = resolve_key(doc, page, b"Annots") else {
            continue;
        };
        for annot in annots {
            if let Object::Reference(id) = annot {
                pages.entry(*id).or_insert(page_num);
            }
        }
    }

    pages
}

/// Enumerate the terminal fields of the document's form.
///
/// A document without a form yields an empty list.
pub fn read_fields(doc: &Document) -> Result<Vec<NativeField>> {
    let Some(form) = acroform(doc)? else {
        return Ok(Vec::new());
    };
    let Some(Object::Array(roots)) = resolve_key(doc, form, b"Fields") else {
        return Ok(Vec::new());
    };

    let page_index: HashMap<ObjectId, u32> = annotation_pages(doc);
    let page_ids: HashMap<ObjectId, u32> = doc
        .get_pages()
        .into_iter()
        .map(|(num, id)| (id, num))
        .collect();

    let mut walker = FieldWalker {
        doc,
        page_index,
        page_ids,
        visited: HashSet::new(),
        fields: Vec::new(),
    };
    for root in roots {
        walker.walk(root, "", &Inherited::default());
    }

    tracing::debug!(count = walker.fields.len(), "Read native form fields");
    Ok(walker.fields)
}

struct FieldWalker<'a> {
    doc: &'a Document,
    page_index: HashMap<ObjectId, u32>,
    page_ids: HashMap<ObjectId, u32>,
    visited: HashSet<ObjectId>,
    fields: Vec<NativeField>,
}

impl<'a> FieldWalker<'a> {
    fn walk(&mut self, entry: &Object, parent_name: &str, parent: &Inherited) {
        let doc = self.doc;
        let Object::Reference(id) = entry else {
            tracing::warn!("Skipping form field that is not an indirect object");
            return;
        };
        if !self.visited.insert(*id) {
            tracing::warn!(id = ?id, "Skipping form field cycle");
            return;
        }
        let Ok(dict) = doc.get_dictionary(*id) else {
            tracing::warn!(id = ?id, "Skipping form field that is not a dictionary");
            return;
        };

        let partial = resolve_key(doc, dict, b"T").and_then(object_text);
        let name = match (parent_name.is_empty(), partial) {
            (_, None) => parent_name.to_string(),
            (true, Some(partial)) => partial,
            (false, Some(partial)) => format!("{}.{}", parent_name, partial),
        };

        let inherited = self.inherit(dict, parent);

        // Kids with their own /T are child fields; kids without are widgets
        let kids: Vec<ObjectId> = match resolve_key(doc, dict, b"Kids") {
            Some(Object::Array(kids)) => kids
                .iter()
                .filter_map(|kid| kid.as_reference().ok())
                .collect(),
            _ => Vec::new(),
        };
        let (child_fields, widgets): (Vec<ObjectId>, Vec<ObjectId>) =
            kids.into_iter().partition(|kid| {
                doc.get_dictionary(*kid)
                    .map(|d| d.has(b"T"))
                    .unwrap_or(false)
            });

        if !child_fields.is_empty() {
            for child in child_fields {
                self.walk(&Object::Reference(child), &name, &inherited);
            }
            return;
        }

        let widgets = if widgets.is_empty() { vec![*id] } else { widgets };
        let field = self.terminal_field(*id, name, &inherited, widgets);
        self.fields.push(field);
    }

    fn inherit(&self, dict: &Dictionary, parent: &Inherited) -> Inherited {
        Inherited {
            field_type: match resolve_key(self.doc, dict, b"FT") {
                Some(Object::Name(ft)) => Some(ft.clone()),
                _ => parent.field_type.clone(),
            },
            flags: resolve_key(self.doc, dict, b"Ff")
                .and_then(|obj| obj.as_i64().ok())
                .unwrap_or(parent.flags),
            value: resolve_key(self.doc, dict, b"V")
                .cloned()
                .or_else(|| parent.value.clone()),
            max_length: resolve_key(self.doc, dict, b"MaxLen")
                .and_then(|obj| obj.as_i64().ok())
                .and_then(|n| u32::try_from(n).ok())
                .or(parent.max_length),
        }
    }

    fn terminal_field(
        &self,
        id: ObjectId,
        name: String,
        inherited: &Inherited,
        widgets: Vec<ObjectId>,
    ) -> NativeField {
        let kind = self.classify(id, inherited, &widgets);
        let first_widget = widgets.first().copied();

        NativeField {
            name,
            id,
            kind,
            max_length: inherited.max_length,
            page: first_widget.and_then(|w| self.widget_page(w)),
            rect: first_widget.and_then(|w| self.widget_rect(w)),
            widgets,
        }
    }

    fn classify(&self, id: ObjectId, inherited: &Inherited, widgets: &[ObjectId]) -> NativeKind {
        let value = inherited.value.as_ref();

        match inherited.field_type.as_deref() {
            Some(b"Tx") => NativeKind::Text {
                value: value.and_then(object_text).unwrap_or_default(),
            },
            Some(b"Btn") if inherited.flags & flags::PUSH_BUTTON != 0 => {
                NativeKind::Unsupported {
                    field_type: Some("Btn".to_string()),
                }
            }
            Some(b"Btn") if inherited.flags & flags::RADIO != 0 => {
                let (options, states) = self.radio_options(id, widgets);
                let state = match value {
                    Some(Object::Name(v)) if !is_off(v) => {
                        Some(String::from_utf8_lossy(v).into_owned())
                    }
                    _ => widgets.iter().find_map(|w| self.current_state(*w)),
                };
                let selected = state.map(|state| match states.iter().position(|s| *s == state) {
                    Some(index) => options[index].clone(),
                    None => state,
                });
                NativeKind::RadioGroup {
                    selected,
                    options,
                    states,
                }
            }
            Some(b"Btn") => {
                let checked = match value {
                    Some(Object::Name(v)) => !is_off(v),
                    _ => widgets.iter().any(|w| self.current_state(*w).is_some()),
                };
                let on_state = widgets
                    .iter()
                    .find_map(|w| self.on_state(*w))
                    .unwrap_or_else(|| DEFAULT_ON_STATE.to_string());
                NativeKind::CheckBox { checked, on_state }
            }
            Some(b"Ch") if inherited.flags & flags::COMBO == 0 => NativeKind::Unsupported {
                field_type: Some("Ch".to_string()),
            },
            Some(b"Ch") => {
                let (options, exports) = self.choice_options(id);
                let selected = match value {
                    Some(Object::Array(values)) => values
                        .iter()
                        .filter_map(|v| resolve(self.doc, v))
                        .find_map(object_text),
                    Some(obj) => object_text(obj),
                    None => None,
                }
                .filter(|s| !s.is_empty())
                .map(|v| match exports.iter().position(|e| *e == v) {
                    Some(index) => options[index].clone(),
                    None => v,
                });
                NativeKind::Dropdown {
                    selected,
                    options,
                    exports,
                    editable: inherited.flags & flags::EDIT != 0,
                }
            }
            other => NativeKind::Unsupported {
                field_type: other.map(|ft| String::from_utf8_lossy(ft).into_owned()),
            },
        }
    }

    /// `/Opt` entries as (display texts, export values).
    /// A plain entry is both; an `[export display]` pair shows its display text.
    fn choice_options(&self, id: ObjectId) -> (Vec<String>, Vec<String>) {
        let Some(Object::Array(entries)) = self.field_key(id, b"Opt") else {
            return (Vec::new(), Vec::new());
        };

        entries
            .iter()
            .filter_map(|entry| match resolve(self.doc, entry)? {
                Object::Array(pair) => {
                    let text = |i: usize| {
                        pair.get(i)
                            .and_then(|v| resolve(self.doc, v))
                            .and_then(object_text)
                    };
                    let export = text(0)?;
                    let display = text(1).unwrap_or_else(|| export.clone());
                    Some((display, export))
                }
                other => object_text(other).map(|text| (text.clone(), text)),
            })
            .unzip()
    }

    /// Radio options with the appearance state each one selects.
    ///
    /// `/Opt` holds one export value per widget; without it (or when it does
    /// not line up with the widgets) the on-state names are the options.
    fn radio_options(&self, id: ObjectId, widgets: &[ObjectId]) -> (Vec<String>, Vec<String>) {
        let widget_states: Vec<Option<String>> =
            widgets.iter().map(|w| self.on_state(*w)).collect();

        let exports: Vec<String> = match self.field_key(id, b"Opt") {
            Some(Object::Array(entries)) => entries
                .iter()
                .filter_map(|entry| resolve(self.doc, entry).and_then(object_text))
                .collect(),
            _ => Vec::new(),
        };

        let mut options: Vec<String> = Vec::new();
        let mut states: Vec<String> = Vec::new();
        if !exports.is_empty() && exports.len() == widgets.len() {
            for (export, state) in exports.into_iter().zip(widget_states) {
                if let Some(state) = state {
                    if !options.contains(&export) {
                        options.push(export);
                        states.push(state);
                    }
                }
            }
        } else {
            for state in widget_states.into_iter().flatten() {
                if !states.contains(&state) {
                    options.push(state.clone());
                    states.push(state);
                }
            }
        }
        (options, states)
    }

    fn field_key(&self, id: ObjectId, key: &[u8]) -> Option<&'a Object> {
        let doc = self.doc;
        let dict = doc.get_dictionary(id).ok()?;
        resolve_key(doc, dict, key)
    }

    /// First non-Off appearance state of a widget
    fn on_state(&self, widget: ObjectId) -> Option<String> {
        appearance_states(self.doc, widget).into_iter().next()
    }

    /// Current `/AS` of a widget unless it is Off
    fn current_state(&self, widget: ObjectId) -> Option<String> {
        let dict = self.doc.get_dictionary(widget).ok()?;
        match resolve_key(self.doc, dict, b"AS")? {
            Object::Name(state) if !is_off(state) => {
                Some(String::from_utf8_lossy(state).into_owned())
            }
            _ => None,
        }
    }

    fn widget_page(&self, widget: ObjectId) -> Option<u32> {
        if let Some(page) = self.page_index.get(&widget) {
            return Some(*page);
        }
        let dict = self.doc.get_dictionary(widget).ok()?;
        let page_id = dict.get(b"P").ok()?.as_reference().ok()?;
        self.page_ids.get(&page_id).copied()
    }

    fn widget_rect(&self, widget: ObjectId) -> Option<WidgetRect> {
        let dict = self.doc.get_dictionary(widget).ok()?;
        let Some(Object::Array(coords)) = resolve_key(self.doc, dict, b"Rect") else {
            return None;
        };
        if coords.len() != 4 {
            return None;
        }
        let coords: Vec<f32> = coords.iter().filter_map(object_number).collect();
        if coords.len() != 4 {
            return None;
        }

        Some(WidgetRect {
            x: coords[0].min(coords[2]),
            y: coords[1].min(coords[3]),
            width: (coords[2] - coords[0]).abs(),
            height: (coords[3] - coords[1]).abs(),
        })
    }
}

/// Non-Off state names from a widget's normal appearance dictionary
fn appearance_states(doc: &Document, widget: ObjectId) -> Vec<String> {
    let Ok(dict) = doc.get_dictionary(widget) else {
        return Vec::new();
    };
    let Some(Object::Dictionary(ap)) = resolve_key(doc, dict, b"AP") else {
        return Vec::new();
    };
    let Some(Object::Dictionary(normal)) = resolve_key(doc, ap, b"N") else {
        return Vec::new();
    };

    normal
        .iter()
        .filter(|(state, _)| !is_off(state))
        .map(|(state, _)| String::from_utf8_lossy(state).into_owned())
        .collect()
}

/// Set `/V` on the field and drop the now stale widget appearances
pub fn write_text(doc: &mut Document, field: &NativeField, text: &str) -> Result<()> {
    doc.get_dictionary_mut(field.id)
        .map_err(pdf_error)?
        .set("V", encode_text(text));

    for widget in &field.widgets {
        doc.get_dictionary_mut(*widget)
            .map_err(pdf_error)?
            .remove(b"AP");
    }
    Ok(())
}

/// Check or uncheck a checkbox, keeping `/V` and every widget `/AS` in step
pub fn write_checked(
    doc: &mut Document,
    field: &NativeField,
    on_state: &str,
    checked: bool,
) -> Result<()> {
    let state: &[u8] = if checked { on_state.as_bytes() } else { OFF_STATE };
    select_state(doc, field, state)
}

/// Select one radio option by its appearance state name
pub fn write_radio(doc: &mut Document, field: &NativeField, state: &str) -> Result<()> {
    select_state(doc, field, state.as_bytes())
}

fn select_state(doc: &mut Document, field: &NativeField, state: &[u8]) -> Result<()> {
    doc.get_dictionary_mut(field.id)
        .map_err(pdf_error)?
        .set("V", Object::Name(state.to_vec()));

    for widget in &field.widgets {
        let has_state = !is_off(state)
            && appearance_states(doc, *widget)
                .iter()
                .any(|s| s.as_bytes() == state);
        let widget_state = if has_state { state } else { OFF_STATE };
        doc.get_dictionary_mut(*widget)
            .map_err(pdf_error)?
            .set("AS", Object::Name(widget_state.to_vec()));
    }
    Ok(())
}

/// Set a choice field's value (an export value, or free text for editable combos)
pub fn write_choice(doc: &mut Document, field: &NativeField, value: &str) -> Result<()> {
    doc.get_dictionary_mut(field.id)
        .map_err(pdf_error)?
        .set("V", encode_text(value));

    for widget in &field.widgets {
        doc.get_dictionary_mut(*widget)
            .map_err(pdf_error)?
            .remove(b"AP");
    }
    Ok(())
}

/// Ask viewers to rebuild field appearances from the new values
pub fn request_appearance_regeneration(doc: &mut Document) -> Result<()> {
    let root_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(pdf_error)?;

    let acroform = doc
        .get_dictionary(root_id)
        .map_err(pdf_error)?
        .get(b"AcroForm")
        .ok()
        .cloned();

    match acroform {
        Some(Object::Reference(id)) => {
            doc.get_dictionary_mut(id)
                .map_err(pdf_error)?
                .set("NeedAppearances", Object::Boolean(true));
        }
        Some(Object::Dictionary(_)) => {
            let catalog = doc.get_dictionary_mut(root_id).map_err(pdf_error)?;
            if let Ok(Object::Dictionary(form)) = catalog.get_mut(b"AcroForm") {
                form.set("NeedAppearances", Object::Boolean(true));
            }
        }
        _ => {}
    }
    Ok(())
}
