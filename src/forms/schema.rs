//! `.beanhub/forms.yaml` models and their validation.
//!
//! The document is checked as a YAML value first so every problem is
//! reported with its location, not just the first one serde runs into.

use std::{fmt::Display, path::Path};

use anyhow::{bail, Context as _, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};

pub const FORM_DOC_PATH: &str = ".beanhub/forms.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormDoc {
    pub forms: Vec<FormSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormSchema {
    pub name: String,
    pub display_name: Option<String>,
    pub fields: Vec<FormField>,
    pub operations: Vec<Operation>,
}

impl FormSchema {
    pub fn title(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub display_name: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, deserialize_with = "scalar_string")]
    pub default: Option<String>,
}

/// Numbers and booleans are accepted as defaults and kept as text
fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(value)) => Some(value),
        Some(Value::Number(value)) => Some(value.to_string()),
        Some(Value::Bool(value)) => Some(value.to_string()),
        _ => None,
    })
}

impl FormField {
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Str,
    Text,
    Number,
    Date,
    Account,
    Currency,
    File,
}

const FIELD_TYPES: [&str; 7] = ["str", "text", "number", "date", "account", "currency", "file"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    /// Template of the path relative to the beancount dir
    pub file: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Append,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocItem {
    Key(String),
    Index(usize),
}

/// `forms[0].fields[1].type`
pub fn format_loc(loc: &[LocItem]) -> String {
    let mut output = String::new();
    for item in loc {
        match item {
            LocItem::Index(index) => output.push_str(&format!("[{index}]")),
            LocItem::Key(key) => {
                if !output.is_empty() {
                    output.push('.');
                }
                output.push_str(key);
            }
        }
    }
    output
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub loc: Vec<LocItem>,
    pub msg: String,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.loc.is_empty() {
            write!(f, "{}", self.msg)
        } else {
            write!(f, "{}: {}", format_loc(&self.loc), self.msg)
        }
    }
}

/// Parses and validates a form document, collecting every error
pub fn parse_form_doc(content: &str) -> Result<FormDoc, Vec<ValidationError>> {
    let value: Value = serde_yaml::from_str(content).map_err(|err| {
        vec![ValidationError {
            loc: Vec::new(),
            msg: err.to_string(),
        }]
    })?;
    let mut validator = Validator::default();
    validator.doc(&value);
    if !validator.errors.is_empty() {
        return Err(validator.errors);
    }
    serde_yaml::from_value(value).map_err(|err| {
        vec![ValidationError {
            loc: Vec::new(),
            msg: err.to_string(),
        }]
    })
}

/// `None` when there is no document at `path`
pub fn read_form_doc(path: &Path) -> Result<Option<Result<FormDoc, Vec<ValidationError>>>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read form document {}", path.display()))?;
    Ok(Some(parse_form_doc(&content)))
}

/// Like [`read_form_doc`], but a missing document is an error
pub fn validate_doc(path: &Path) -> Result<Result<FormDoc, Vec<ValidationError>>> {
    match read_form_doc(path)? {
        Some(result) => Ok(result),
        None => bail!("Form document at {} does not exist", path.display()),
    }
}

#[derive(Default)]
struct Validator {
    loc: Vec<LocItem>,
    errors: Vec<ValidationError>,
}

impl Validator {
    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(ValidationError {
            loc: self.loc.clone(),
            msg: msg.into(),
        });
    }

    fn at<R>(&mut self, item: LocItem, check: impl FnOnce(&mut Self) -> R) -> R {
        self.loc.push(item);
        let result = check(self);
        self.loc.pop();
        result
    }

    fn doc(&mut self, value: &Value) {
        let Some(mapping) = self.mapping(value) else {
            return;
        };
        self.unknown_keys(mapping, &["forms"]);
        if let Some(forms) = self.required(mapping, "forms") {
            self.at(LocItem::Key("forms".to_string()), |v| v.list(forms, Self::form));
        }
    }

    fn form(&mut self, value: &Value) {
        let Some(mapping) = self.mapping(value) else {
            return;
        };
        self.unknown_keys(mapping, &["name", "display_name", "fields", "operations"]);
        self.required_string(mapping, "name");
        self.optional_string(mapping, "display_name");
        if let Some(fields) = self.required(mapping, "fields") {
            self.at(LocItem::Key("fields".to_string()), |v| v.list(fields, Self::field));
        }
        if let Some(operations) = self.required(mapping, "operations") {
            self.at(LocItem::Key("operations".to_string()), |v| {
                v.list(operations, Self::operation)
            });
        }
    }

    fn field(&mut self, value: &Value) {
        let Some(mapping) = self.mapping(value) else {
            return;
        };
        self.unknown_keys(
            mapping,
            &["name", "type", "display_name", "required", "default"],
        );
        self.required_string(mapping, "name");
        if let Some(field_type) = self.required_string(mapping, "type") {
            if !FIELD_TYPES.contains(&field_type) {
                self.at(LocItem::Key("type".to_string()), |v| {
                    v.error(format!(
                        "Input should be {}",
                        FIELD_TYPES.map(|name| format!("'{name}'")).join(", ")
                    ))
                });
            }
        }
        self.optional_string(mapping, "display_name");
        if let Some(required) = mapping.get("required") {
            if !required.is_bool() {
                self.at(LocItem::Key("required".to_string()), |v| {
                    v.error("Input should be a valid boolean")
                });
            }
        }
        if let Some(default) = mapping.get("default") {
            if !(default.is_string() || default.is_number() || default.is_bool() || default.is_null()) {
                self.at(LocItem::Key("default".to_string()), |v| {
                    v.error("Input should be a valid string")
                });
            }
        }
    }

    fn operation(&mut self, value: &Value) {
        let Some(mapping) = self.mapping(value) else {
            return;
        };
        self.unknown_keys(mapping, &["type", "file", "content"]);
        if let Some(operation_type) = self.required_string(mapping, "type") {
            if operation_type != "append" {
                self.at(LocItem::Key("type".to_string()), |v| {
                    v.error("Input should be 'append'")
                });
            }
        }
        self.required_string(mapping, "file");
        self.required_string(mapping, "content");
    }

    fn mapping<'a>(&mut self, value: &'a Value) -> Option<&'a Mapping> {
        let mapping = value.as_mapping();
        if mapping.is_none() {
            self.error("Input should be a valid dictionary");
        }
        mapping
    }

    fn list(&mut self, value: &Value, check: fn(&mut Self, &Value)) {
        let Some(items) = value.as_sequence() else {
            self.error("Input should be a valid list");
            return;
        };
        for (index, item) in items.iter().enumerate() {
            self.at(LocItem::Index(index), |v| check(v, item));
        }
    }

    fn unknown_keys(&mut self, mapping: &Mapping, known: &[&str]) {
        for key in mapping.keys() {
            let name = key.as_str().map(str::to_string).unwrap_or_else(|| format!("{key:?}"));
            if !known.contains(&name.as_str()) {
                self.at(LocItem::Key(name), |v| v.error("Extra inputs are not permitted"));
            }
        }
    }

    fn required<'a>(&mut self, mapping: &'a Mapping, key: &str) -> Option<&'a Value> {
        let value = mapping.get(key);
        if value.is_none() {
            self.at(LocItem::Key(key.to_string()), |v| v.error("Field required"));
        }
        value
    }

    fn required_string<'a>(&mut self, mapping: &'a Mapping, key: &str) -> Option<&'a str> {
        let value = self.required(mapping, key)?;
        self.string(key, value)
    }

    fn optional_string(&mut self, mapping: &Mapping, key: &str) {
        if let Some(value) = mapping.get(key).filter(|value| !value.is_null()) {
            self.string(key, value);
        }
    }

    fn string<'a>(&mut self, key: &str, value: &'a Value) -> Option<&'a str> {
        let string = value.as_str();
        if string.is_none() {
            self.at(LocItem::Key(key.to_string()), |v| {
                v.error("Input should be a valid string")
            });
        }
        string
    }
}
