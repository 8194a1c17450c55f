//! # Fields
//!
//! Fields are the editable (or decorative) values shown on a block: labels, text
//! inputs, checkboxes and so on. The set of kinds is closed, so they are modelled
//! as a plain enum and constructed from block-definition JSON by their type tag.

use crate::error::{BlockError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single field on an input row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field id, unique within a block when present. Labels are usually unnamed.
    pub name: Option<String>,
    pub kind: FieldKind,
}

/// One entry of a dropdown: the text shown to the user and the value stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DropdownOption {
    pub display: String,
    pub value: String,
}

/// The known field kinds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    Label { text: String },
    Input { text: String },
    Checkbox { checked: bool },
    Colour { colour: String },
    Date { date: String },
    Variable { variable: String },
    Dropdown { options: Vec<DropdownOption>, selected: usize },
    Image { src: String, width: f32, height: f32, alt: String },
}

const KNOWN_TAGS: [&str; 8] = [
    "field_label",
    "field_input",
    "field_checkbox",
    "field_colour",
    "field_date",
    "field_variable",
    "field_dropdown",
    "field_image",
];

#[derive(Deserialize)]
#[serde(tag = "type")]
enum FieldJson {
    #[serde(rename = "field_label")]
    Label {
        name: Option<String>,
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "field_input")]
    Input {
        name: Option<String>,
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "field_checkbox")]
    Checkbox {
        name: Option<String>,
        #[serde(default)]
        checked: bool,
    },
    #[serde(rename = "field_colour")]
    Colour {
        name: Option<String>,
        #[serde(default = "default_colour")]
        colour: String,
    },
    #[serde(rename = "field_date")]
    Date {
        name: Option<String>,
        #[serde(default = "default_date")]
        date: String,
    },
    #[serde(rename = "field_variable")]
    Variable {
        name: Option<String>,
        #[serde(default = "default_variable")]
        variable: String,
    },
    #[serde(rename = "field_dropdown")]
    Dropdown {
        name: Option<String>,
        options: Vec<(String, String)>,
    },
    #[serde(rename = "field_image")]
    Image {
        name: Option<String>,
        src: String,
        #[serde(default = "default_image_size")]
        width: f32,
        #[serde(default = "default_image_size")]
        height: f32,
        #[serde(default)]
        alt: String,
    },
}

fn default_colour() -> String {
    "#ff0000".to_string()
}

fn default_date() -> String {
    "1970-01-01".to_string()
}

fn default_variable() -> String {
    "item".to_string()
}

fn default_image_size() -> f32 {
    15.0
}

/// Returns true if `tag` names a field (as opposed to an input) in definition JSON.
pub fn is_field_tag(tag: &str) -> bool {
    tag.starts_with("field_")
}

impl Field {
    pub fn new(name: Option<&str>, kind: FieldKind) -> Self {
        Self {
            name: name.map(str::to_string),
            kind,
        }
    }

    pub fn label(text: &str) -> Self {
        Self::new(
            None,
            FieldKind::Label {
                text: text.to_string(),
            },
        )
    }

    pub fn text_input(name: &str, text: &str) -> Self {
        Self::new(
            Some(name),
            FieldKind::Input {
                text: text.to_string(),
            },
        )
    }

    pub fn variable(name: &str, variable: &str) -> Self {
        Self::new(
            Some(name),
            FieldKind::Variable {
                variable: variable.to_string(),
            },
        )
    }

    /// Builds a field from a block-definition argument such as
    /// `{"type": "field_input", "name": "NAME", "text": "foo"}`.
    ///
    /// An unknown tag falls back to the argument's `alt` definition when one is given.
    pub fn from_json(json: &Value) -> Result<Self> {
        let tag = json.get("type").and_then(Value::as_str).unwrap_or_default();
        if !KNOWN_TAGS.contains(&tag) {
            return match json.get("alt") {
                Some(alt) => Self::from_json(alt),
                None => Err(BlockError::UnknownFieldType(tag.to_string())),
            };
        }

        let parsed: FieldJson = serde_json::from_value(json.clone())?;
        let field = match parsed {
            FieldJson::Label { name, text } => Field {
                name,
                kind: FieldKind::Label { text },
            },
            FieldJson::Input { name, text } => Field {
                name,
                kind: FieldKind::Input { text },
            },
            FieldJson::Checkbox { name, checked } => Field {
                name,
                kind: FieldKind::Checkbox { checked },
            },
            FieldJson::Colour { name, colour } => Field {
                name,
                kind: FieldKind::Colour { colour },
            },
            FieldJson::Date { name, date } => Field {
                name,
                kind: FieldKind::Date { date },
            },
            FieldJson::Variable { name, variable } => Field {
                name,
                kind: FieldKind::Variable { variable },
            },
            FieldJson::Dropdown { name, options } => {
                if options.is_empty() {
                    // The factory fills in the block type when it rethrows.
                    return Err(BlockError::MalformedDefinition {
                        block_type: String::new(),
                        message: format!(
                            "dropdown field '{}' has no options",
                            name.unwrap_or_default()
                        ),
                    });
                }
                Field {
                    name,
                    kind: FieldKind::Dropdown {
                        options: options
                            .into_iter()
                            .map(|(display, value)| DropdownOption { display, value })
                            .collect(),
                        selected: 0,
                    },
                }
            }
            FieldJson::Image {
                name,
                src,
                width,
                height,
                alt,
            } => Field {
                name,
                kind: FieldKind::Image {
                    src,
                    width,
                    height,
                    alt,
                },
            },
        };
        Ok(field)
    }

    /// The serialized value of the field, or `None` for decorative kinds.
    pub fn value(&self) -> Option<String> {
        match &self.kind {
            FieldKind::Label { .. } | FieldKind::Image { .. } => None,
            FieldKind::Input { text } => Some(text.clone()),
            FieldKind::Checkbox { checked } => {
                Some(if *checked { "TRUE" } else { "FALSE" }.to_string())
            }
            FieldKind::Colour { colour } => Some(colour.clone()),
            FieldKind::Date { date } => Some(date.clone()),
            FieldKind::Variable { variable } => Some(variable.clone()),
            FieldKind::Dropdown { options, selected } => {
                options.get(*selected).map(|o| o.value.clone())
            }
        }
    }

    /// Sets the field from its serialized value. Returns false if the value is not
    /// valid for this kind; the field is left unchanged in that case.
    pub fn set_value(&mut self, value: &str) -> bool {
        match &mut self.kind {
            FieldKind::Label { .. } | FieldKind::Image { .. } => false,
            FieldKind::Input { text } => {
                *text = value.to_string();
                true
            }
            FieldKind::Checkbox { checked } => match value.to_ascii_uppercase().as_str() {
                "TRUE" => {
                    *checked = true;
                    true
                }
                "FALSE" => {
                    *checked = false;
                    true
                }
                _ => false,
            },
            FieldKind::Colour { colour } => {
                let valid = value.len() == 7
                    && value.starts_with('#')
                    && value[1..].chars().all(|c| c.is_ascii_hexdigit());
                if valid {
                    *colour = value.to_ascii_lowercase();
                }
                valid
            }
            FieldKind::Date { date } => {
                *date = value.to_string();
                true
            }
            FieldKind::Variable { variable } => {
                if value.is_empty() {
                    return false;
                }
                *variable = value.to_string();
                true
            }
            FieldKind::Dropdown { options, selected } => {
                match options.iter().position(|o| o.value == value) {
                    Some(idx) => {
                        *selected = idx;
                        true
                    }
                    None => false,
                }
            }
        }
    }

    /// The variable name, if this is a variable field.
    pub fn variable_name(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Variable { variable } => Some(variable),
            _ => None,
        }
    }
}
