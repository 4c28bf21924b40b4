use std::collections::HashMap;
use std::io::BufRead;

use camino::Utf8Path;
use tracing::{debug, warn};

use crate::domain::PixId;
use crate::error::GxdError;
use crate::fs_util;
use crate::schema::{MalformedPolicy, TAB};

/// Image file name to pixel DB number, as listed by the pixel DB intake.
#[derive(Debug, Clone, Default)]
pub struct PixelMapping {
    entries: HashMap<String, PixId>,
}

impl PixelMapping {
    pub fn load(path: &Utf8Path, policy: MalformedPolicy) -> Result<Self, GxdError> {
        let reader = fs_util::open_input(path)?;
        let mapping = Self::from_reader(reader, path, policy)?;
        debug!(%path, entries = mapping.len(), "loaded pixel mapping");
        Ok(mapping)
    }

    /// Reads `fileName<TAB>pixelID` lines. A repeated file name replaces the
    /// earlier entry.
    pub fn from_reader<R: BufRead>(
        reader: R,
        source: &Utf8Path,
        policy: MalformedPolicy,
    ) -> Result<Self, GxdError> {
        let mut entries = HashMap::new();
        for (index, line) in reader.lines().enumerate() {
            let line_number = index + 1;
            let line = line.map_err(|err| GxdError::Filesystem(format!("{source}: {err}")))?;
            if line.is_empty() {
                continue;
            }
            match parse_line(&line) {
                Ok((file_name, pix_id)) => {
                    entries.insert(file_name, pix_id);
                }
                Err(reason) => match policy {
                    MalformedPolicy::Skip => {
                        warn!(%source, line = line_number, %reason, "skipping pixel mapping line");
                    }
                    MalformedPolicy::Fail => {
                        return Err(GxdError::MalformedLine {
                            path: source.to_path_buf(),
                            line: line_number,
                            reason,
                        });
                    }
                },
            }
        }
        Ok(Self { entries })
    }

    pub fn get(&self, file_name: &str) -> Option<&PixId> {
        self.entries.get(file_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_line(line: &str) -> Result<(String, PixId), String> {
    let mut tokens = line.split(TAB);
    let file_name = tokens.next().unwrap_or_default();
    let pix = tokens
        .next()
        .ok_or_else(|| format!("expected 2 tab-separated fields: {line:?}"))?;
    let pix_id = pix.parse::<PixId>().map_err(|err| err.to_string())?;
    Ok((file_name.to_string(), pix_id))
}
