use std::path::PathBuf;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

use crate::loader::LoadError;

#[derive(Debug, Error, Diagnostic)]
pub enum GxdError {
    #[error("invalid pixel ID: {0:?}")]
    InvalidPixId(String),

    #[error("invalid J-number: {0}")]
    InvalidJNumber(String),

    #[error("invalid result key: {0}")]
    InvalidResultKey(String),

    #[error("Invalid Processing Mode: {0}")]
    InvalidMode(String),

    #[error("missing config file gxd-imgload.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    #[error("config has no `{0}` section")]
    MissingSection(&'static str),

    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("Cannot open input file: {0}")]
    InputOpen(Utf8PathBuf),

    #[error("Cannot open output file: {0}")]
    OutputOpen(Utf8PathBuf),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("Invalid Line ({line}) in {path}: {reason}")]
    MalformedLine {
        path: Utf8PathBuf,
        line: usize,
        reason: String,
    },

    #[error("failed to read store snapshot: {0}")]
    StoreRead(String),

    #[error("failed to parse store snapshot: {0}")]
    StoreParse(String),

    #[error("Could not find reference: {0}")]
    ReferenceNotFound(String),

    #[error("Could not find user: {0}")]
    UserNotFound(String),

    #[error("Fullsize image missing for figure label: {0}")]
    FullSizeImageMissing(String),

    #[error("no accession maximum recorded for prefix {0}")]
    AccessionMaxMissing(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Load(#[from] LoadError),
}
