//! In-memory fillable PDFs for tests and benchmarks

#![allow(dead_code)]

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

const COMBO: i64 = 1 << 17;
const EDIT: i64 = 1 << 18;

/// Description of one field to put into a generated form
#[derive(Debug, Clone)]
pub enum FixtureField {
    Text {
        name: String,
        value: Option<String>,
        max_length: Option<u32>,
    },
    Checkbox {
        name: String,
        checked: bool,
    },
    /// `/Ch` field; `labels` turns `/Opt` entries into `[export display]` pairs
    Choice {
        name: String,
        options: Vec<String>,
        labels: Vec<String>,
        selected: Option<String>,
        flags: i64,
    },
    /// One widget per state; `labels` become the group's `/Opt`
    Radio {
        name: String,
        options: Vec<String>,
        labels: Vec<String>,
        selected: Option<String>,
    },
    Signature {
        name: String,
    },
    /// Non-terminal field whose children get qualified names
    Group {
        name: String,
        children: Vec<FixtureField>,
    },
}

impl FixtureField {
    pub fn text(name: &str, value: Option<&str>) -> Self {
        FixtureField::Text {
            name: name.to_string(),
            value: value.map(str::to_string),
            max_length: None,
        }
    }

    pub fn limited_text(name: &str, max_length: u32) -> Self {
        FixtureField::Text {
            name: name.to_string(),
            value: None,
            max_length: Some(max_length),
        }
    }

    pub fn checkbox(name: &str, checked: bool) -> Self {
        FixtureField::Checkbox {
            name: name.to_string(),
            checked,
        }
    }

    fn choice(name: &str, options: &[&str], selected: Option<&str>, flags: i64) -> Self {
        FixtureField::Choice {
            name: name.to_string(),
            options: strings(options),
            labels: Vec::new(),
            selected: selected.map(str::to_string),
            flags,
        }
    }

    pub fn dropdown(name: &str, options: &[&str], selected: Option<&str>) -> Self {
        Self::choice(name, options, selected, COMBO)
    }

    pub fn editable_dropdown(name: &str, options: &[&str], selected: Option<&str>) -> Self {
        Self::choice(name, options, selected, COMBO | EDIT)
    }

    pub fn list_box(name: &str, options: &[&str], selected: Option<&str>) -> Self {
        Self::choice(name, options, selected, 0)
    }

    /// Dropdown of `(export, display)` pairs; `selected` is an export value
    pub fn labeled_dropdown(name: &str, pairs: &[(&str, &str)], selected: Option<&str>) -> Self {
        FixtureField::Choice {
            name: name.to_string(),
            options: pairs.iter().map(|(export, _)| export.to_string()).collect(),
            labels: pairs.iter().map(|(_, label)| label.to_string()).collect(),
            selected: selected.map(str::to_string),
            flags: COMBO,
        }
    }

    pub fn radio(name: &str, options: &[&str], selected: Option<&str>) -> Self {
        FixtureField::Radio {
            name: name.to_string(),
            options: strings(options),
            labels: Vec::new(),
            selected: selected.map(str::to_string),
        }
    }

    /// Radio group of `(state, export)` pairs; `selected` is a state name
    pub fn labeled_radio(name: &str, pairs: &[(&str, &str)], selected: Option<&str>) -> Self {
        FixtureField::Radio {
            name: name.to_string(),
            options: pairs.iter().map(|(state, _)| state.to_string()).collect(),
            labels: pairs.iter().map(|(_, label)| label.to_string()).collect(),
            selected: selected.map(str::to_string),
        }
    }

    pub fn signature(name: &str) -> Self {
        FixtureField::Signature {
            name: name.to_string(),
        }
    }

    pub fn group(name: &str, children: Vec<FixtureField>) -> Self {
        FixtureField::Group {
            name: name.to_string(),
            children,
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn new_document(page_count: u32) -> (Document, Vec<ObjectId>) {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let page_ids: Vec<ObjectId> = (0..page_count)
        .map(|_| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            })
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => page_count as i64,
        }),
    );

    (doc, page_ids)
}

fn finish(mut doc: Document, catalog: Dictionary) -> Vec<u8> {
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("Failed to serialize fixture PDF");
    buffer
}

/// A PDF with `page_count` empty pages and no form
pub fn plain_pdf(page_count: u32) -> Vec<u8> {
    let (doc, page_ids) = new_document(page_count);
    let pages_id = doc
        .get_dictionary(page_ids[0])
        .and_then(|page| page.get(b"Parent"))
        .and_then(Object::as_reference)
        .expect("Fixture page has no parent");

    finish(
        doc,
        dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        },
    )
}

/// A one-page PDF whose AcroForm holds `fields` in the given order
pub fn form_pdf(fields: &[FixtureField]) -> Vec<u8> {
    let (doc, page_ids) = new_document(1);
    let page_id = page_ids[0];

    let mut builder = FormBuilder {
        doc,
        page_id,
        widgets: Vec::new(),
        next_y: 740,
    };

    let roots: Vec<Object> = fields
        .iter()
        .map(|field| Object::Reference(builder.add_field(field, None)))
        .collect();

    let FormBuilder { mut doc, widgets, .. } = builder;

    if let Ok(page) = doc.get_dictionary_mut(page_id) {
        page.set("Annots", widgets);
    }

    let acroform_id = doc.add_object(dictionary! {
        "Fields" => roots,
        "DA" => Object::string_literal("/Helv 0 Tf 0 g"),
    });
    let pages_id = doc
        .get_dictionary(page_id)
        .and_then(|page| page.get(b"Parent"))
        .and_then(Object::as_reference)
        .expect("Fixture page has no parent");

    finish(
        doc,
        dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "AcroForm" => acroform_id,
        },
    )
}

struct FormBuilder {
    doc: Document,
    page_id: ObjectId,
    widgets: Vec<Object>,
    next_y: i64,
}

impl FormBuilder {
    fn next_rect(&mut self) -> Vec<Object> {
        let y = self.next_y;
        self.next_y -= 30;
        vec![72.into(), (y - 20).into(), 300.into(), y.into()]
    }

    fn widget(&mut self, mut dict: Dictionary, parent: Option<ObjectId>) -> ObjectId {
        dict.set("Type", "Annot");
        dict.set("Subtype", "Widget");
        dict.set("Rect", self.next_rect());
        dict.set("P", self.page_id);
        if let Some(parent) = parent {
            dict.set("Parent", parent);
        }

        let id = self.doc.add_object(dict);
        self.widgets.push(Object::Reference(id));
        id
    }

    fn appearance(&mut self, on_state: &str) -> Dictionary {
        let on = self.doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let off = self.doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let mut normal = Dictionary::new();
        normal.set(on_state, on);
        normal.set("Off", off);
        dictionary! { "N" => normal }
    }

    fn add_field(&mut self, field: &FixtureField, parent: Option<ObjectId>) -> ObjectId {
        match field {
            FixtureField::Text {
                name,
                value,
                max_length,
            } => {
                let mut dict = dictionary! {
                    "FT" => "Tx",
                    "T" => Object::string_literal(name.as_str()),
                };
                if let Some(value) = value {
                    dict.set("V", Object::string_literal(value.as_str()));
                }
                if let Some(max_length) = max_length {
                    dict.set("MaxLen", *max_length as i64);
                }
                self.widget(dict, parent)
            }
            FixtureField::Checkbox { name, checked } => {
                let state = if *checked { "Yes" } else { "Off" };
                let dict = dictionary! {
                    "FT" => "Btn",
                    "T" => Object::string_literal(name.as_str()),
                    "V" => state,
                    "AS" => state,
                    "AP" => self.appearance("Yes"),
                };
                self.widget(dict, parent)
            }
            FixtureField::Choice {
                name,
                options,
                labels,
                selected,
                flags,
            } => {
                let opt: Vec<Object> = options
                    .iter()
                    .enumerate()
                    .map(|(i, option)| match labels.get(i) {
                        Some(label) => Object::Array(vec![
                            Object::string_literal(option.as_str()),
                            Object::string_literal(label.as_str()),
                        ]),
                        None => Object::string_literal(option.as_str()),
                    })
                    .collect();
                let mut dict = dictionary! {
                    "FT" => "Ch",
                    "Ff" => *flags,
                    "T" => Object::string_literal(name.as_str()),
                    "Opt" => opt,
                };
                if let Some(selected) = selected {
                    dict.set("V", Object::string_literal(selected.as_str()));
                }
                self.widget(dict, parent)
            }
            FixtureField::Radio {
                name,
                options,
                labels,
                selected,
            } => {
                let group_id = self.doc.new_object_id();
                let kids: Vec<Object> = options
                    .iter()
                    .map(|option| {
                        let state = if selected.as_deref() == Some(option.as_str()) {
                            option.as_str()
                        } else {
                            "Off"
                        };
                        let dict = dictionary! {
                            "AS" => state,
                            "AP" => self.appearance(option),
                        };
                        Object::Reference(self.widget(dict, Some(group_id)))
                    })
                    .collect();

                let mut dict = dictionary! {
                    "FT" => "Btn",
                    "Ff" => 1i64 << 15,
                    "T" => Object::string_literal(name.as_str()),
                    "V" => selected.as_deref().unwrap_or("Off"),
                    "Kids" => kids,
                };
                if !labels.is_empty() {
                    let opt: Vec<Object> = labels
                        .iter()
                        .map(|label| Object::string_literal(label.as_str()))
                        .collect();
                    dict.set("Opt", opt);
                }
                if let Some(parent) = parent {
                    dict.set("Parent", parent);
                }
                self.doc.objects.insert(group_id, Object::Dictionary(dict));
                group_id
            }
            FixtureField::Signature { name } => {
                let dict = dictionary! {
                    "FT" => "Sig",
                    "T" => Object::string_literal(name.as_str()),
                };
                self.widget(dict, parent)
            }
            FixtureField::Group { name, children } => {
                let group_id = self.doc.new_object_id();
                let kids: Vec<Object> = children
                    .iter()
                    .map(|child| Object::Reference(self.add_field(child, Some(group_id))))
                    .collect();

                let mut dict = dictionary! {
                    "T" => Object::string_literal(name.as_str()),
                    "Kids" => kids,
                };
                if let Some(parent) = parent {
                    dict.set("Parent", parent);
                }
                self.doc.objects.insert(group_id, Object::Dictionary(dict));
                group_id
            }
        }
    }
}
