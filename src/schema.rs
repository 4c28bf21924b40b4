//! Declarative column layouts for the tab-delimited publication files.

use std::collections::HashMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TAB: char = '\t';

/// What to do with a data line that does not match its layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Log the line and keep going.
    #[default]
    Skip,
    /// Abort the batch.
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Integer,
    List { separator: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub position: usize,
    pub kind: FieldKind,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl FieldSpec {
    pub fn text(name: &str, position: usize) -> Self {
        Self {
            name: name.to_string(),
            position,
            kind: FieldKind::Text,
            required: true,
        }
    }

    pub fn integer(name: &str, position: usize) -> Self {
        Self {
            kind: FieldKind::Integer,
            ..Self::text(name, position)
        }
    }

    pub fn list(name: &str, position: usize, separator: &str) -> Self {
        Self {
            kind: FieldKind::List {
                separator: separator.to_string(),
            },
            ..Self::text(name, position)
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Columns that repeat every `stride` positions from `start` to the end of
/// the line, e.g. up to 24 (file, label) pairs per specimen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatGroup {
    pub start: usize,
    pub stride: usize,
    /// Field name and offset within one group.
    pub fields: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("missing field `{name}` at column {position}")]
    MissingField { name: String, position: usize },

    #[error("field `{name}` is not an integer: {value:?}")]
    InvalidInteger { name: String, value: String },

    #[error("repeat group stride must be positive")]
    ZeroStride,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    List(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub line_number: usize,
    values: HashMap<String, FieldValue>,
    groups: Vec<HashMap<String, String>>,
}

impl Record {
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(FieldValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(FieldValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> &[String] {
        match self.values.get(name) {
            Some(FieldValue::List(values)) => values,
            _ => &[],
        }
    }

    /// Repeated column groups, in line order.
    pub fn groups(&self) -> &[HashMap<String, String>] {
        &self.groups
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    #[serde(default)]
    pub header: bool,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub repeat: Option<RepeatGroup>,
}

impl RecordSchema {
    pub fn new(header: bool, fields: Vec<FieldSpec>) -> Self {
        Self {
            header,
            fields,
            repeat: None,
        }
    }

    pub fn with_repeat(mut self, repeat: RepeatGroup) -> Self {
        self.repeat = Some(repeat);
        self
    }

    /// Splits one line (trailing newline already removed) into a [`Record`].
    pub fn decode(&self, line_number: usize, line: &str) -> Result<Record, DecodeError> {
        let tokens = line.split(TAB).collect::<Vec<_>>();
        let mut record = Record {
            line_number,
            ..Record::default()
        };

        for field in &self.fields {
            let raw = match tokens.get(field.position) {
                Some(raw) => raw.trim(),
                None if field.required => {
                    return Err(DecodeError::MissingField {
                        name: field.name.clone(),
                        position: field.position,
                    });
                }
                None => continue,
            };
            let value = match &field.kind {
                FieldKind::Text => FieldValue::Text(raw.to_string()),
                FieldKind::Integer => {
                    let parsed = raw.parse::<i64>().map_err(|_| DecodeError::InvalidInteger {
                        name: field.name.clone(),
                        value: raw.to_string(),
                    })?;
                    FieldValue::Integer(parsed)
                }
                FieldKind::List { separator } => FieldValue::List(
                    raw.split(separator.as_str())
                        .map(str::trim)
                        .filter(|item| !item.is_empty())
                        .map(str::to_string)
                        .collect(),
                ),
            };
            record.values.insert(field.name.clone(), value);
        }

        if let Some(repeat) = &self.repeat {
            if repeat.stride == 0 {
                return Err(DecodeError::ZeroStride);
            }
            let mut index = repeat.start;
            while index < tokens.len() {
                let group = repeat
                    .fields
                    .iter()
                    .map(|(name, offset)| {
                        let value = tokens.get(index + offset).copied().unwrap_or("");
                        (name.clone(), value.to_string())
                    })
                    .collect();
                record.groups.push(group);
                index += repeat.stride;
            }
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn decodes_typed_fields() {
        let schema = RecordSchema::new(
            false,
            vec![
                FieldSpec::integer("result", 0),
                FieldSpec::text("label", 1),
                FieldSpec::list("files", 2, "; "),
            ],
        );
        let record = schema.decode(3, "5001\tFig3A\ta.jpg; b.jpg").unwrap();
        assert_eq!(record.line_number, 3);
        assert_eq!(record.integer("result"), Some(5001));
        assert_eq!(record.text("label"), Some("Fig3A"));
        assert_eq!(record.list("files"), ["a.jpg", "b.jpg"]);
    }

    #[test]
    fn missing_and_bad_fields() {
        let schema = RecordSchema::new(
            false,
            vec![FieldSpec::integer("result", 0), FieldSpec::text("label", 1)],
        );
        assert_matches!(
            schema.decode(1, "5001"),
            Err(DecodeError::MissingField { position: 1, .. })
        );
        assert_matches!(
            schema.decode(1, "abc\tFig1"),
            Err(DecodeError::InvalidInteger { .. })
        );
    }

    #[test]
    fn optional_field_may_be_absent() {
        let schema = RecordSchema::new(
            false,
            vec![FieldSpec::text("id", 0), FieldSpec::text("class", 4).optional()],
        );
        let record = schema.decode(1, "x").unwrap();
        assert_eq!(record.text("class"), None);
    }

    #[test]
    fn repeat_groups_walk_the_line() {
        let schema = RecordSchema::new(true, vec![FieldSpec::text("marker", 0)]).with_repeat(
            RepeatGroup {
                start: 1,
                stride: 2,
                fields: vec![("file".to_string(), 0), ("label".to_string(), 1)],
            },
        );
        let record = schema.decode(2, "MGI:1\ta.jpg\tA\t\t\tc.jpg").unwrap();
        let files = record
            .groups()
            .iter()
            .map(|g| g["file"].as_str())
            .collect::<Vec<_>>();
        assert_eq!(files, ["a.jpg", "", "c.jpg"]);
        assert_eq!(record.groups()[2]["label"], "");
    }
}
