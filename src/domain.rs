use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::NaiveDate;
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::GxdError;

/// Prefix that turns a pixel DB number into a durable accession.
pub const PIX_PREFIX: &str = "PIX:";

/// Prefix of the MGI accession IDs assigned to new images.
pub const MGI_PREFIX: &str = "MGI:";

/// MGI type of the objects pixel accessions point at.
pub const IMAGE_MGI_TYPE: &str = "Image";

/// Date format the bulk loader expects in creation/modification columns.
pub const BCP_DATE_FORMAT: &str = "%m/%d/%Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    Load,
    Preview,
}

impl ProcessingMode {
    pub fn submits(&self) -> bool {
        matches!(self, ProcessingMode::Load)
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingMode::Load => write!(f, "load"),
            ProcessingMode::Preview => write!(f, "preview"),
        }
    }
}

impl FromStr for ProcessingMode {
    type Err = GxdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "load" => Ok(ProcessingMode::Load),
            "preview" => Ok(ProcessingMode::Preview),
            _ => Err(GxdError::InvalidMode(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageType {
    #[serde(rename = "Full Size")]
    FullSize,
    #[serde(rename = "Thumbnail")]
    Thumbnail,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixId(String);

impl PixId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn accession(&self) -> Accession {
        Accession(format!("{PIX_PREFIX}{}", self.0))
    }
}

impl fmt::Display for PixId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PixId {
    type Err = GxdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid =
            !normalized.is_empty() && normalized.chars().all(|ch| ch.is_ascii_alphanumeric());
        if !is_valid {
            return Err(GxdError::InvalidPixId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// A prefixed accession string such as `PIX:00123`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Accession(String);

impl Accession {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImagePaneKey(pub i64);

impl fmt::Display for ImagePaneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultKey(pub i64);

impl fmt::Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResultKey {
    type Err = GxdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .trim()
            .parse::<i64>()
            .map(ResultKey)
            .map_err(|_| GxdError::InvalidResultKey(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JNumber(String);

impl JNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn jnumber_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^J:[0-9]+$").expect("valid J-number regex"))
}

impl FromStr for JNumber {
    type Err = GxdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if !jnumber_regex().is_match(normalized) {
            return Err(GxdError::InvalidJNumber(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// "This assay result is illustrated by this image pane."
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssociationRecord {
    pub result_key: ResultKey,
    pub image_pane_key: ImagePaneKey,
    pub created: NaiveDate,
    pub modified: NaiveDate,
}

impl AssociationRecord {
    pub fn new(result_key: ResultKey, image_pane_key: ImagePaneKey, date: NaiveDate) -> Self {
        Self {
            result_key,
            image_pane_key,
            created: date,
            modified: date,
        }
    }

    pub fn fields(&self) -> [String; 4] {
        [
            self.result_key.to_string(),
            self.image_pane_key.to_string(),
            bcp_date(self.created),
            bcp_date(self.modified),
        ]
    }
}

/// Accession ID carried by a figure label such as `g12_lowres`: the part
/// before the first `_`, upper-cased and split into prefix and numeric parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAccessionId {
    pub acc_id: String,
    pub prefix_part: String,
    pub numeric_part: String,
}

impl ImageAccessionId {
    pub fn new(prefix_part: &str, numeric_part: impl fmt::Display) -> Self {
        let numeric_part = numeric_part.to_string();
        Self {
            acc_id: format!("{prefix_part}{numeric_part}"),
            prefix_part: prefix_part.to_string(),
            numeric_part,
        }
    }

    pub fn from_figure_label(label: &str) -> Option<Self> {
        let acc_id = label.split('_').next()?.trim().to_uppercase();
        let mut chars = acc_id.chars();
        let prefix_part = chars.next()?.to_string();
        let numeric_part = chars.as_str().to_string();
        Some(Self {
            acc_id,
            prefix_part,
            numeric_part,
        })
    }
}

pub fn bcp_date(date: NaiveDate) -> String {
    date.format(BCP_DATE_FORMAT).to_string()
}
