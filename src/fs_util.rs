use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::NamedTempFile;

use crate::error::GxdError;

pub fn open_input(path: &Utf8Path) -> Result<BufReader<fs::File>, GxdError> {
    let file =
        fs::File::open(path.as_std_path()).map_err(|_| GxdError::InputOpen(path.to_path_buf()))?;
    Ok(BufReader::new(file))
}

/// All lines of an input file, newline terminators removed.
pub fn read_lines(path: &Utf8Path) -> Result<Vec<String>, GxdError> {
    open_input(path)?
        .lines()
        .collect::<io::Result<Vec<_>>>()
        .map_err(|err| GxdError::Filesystem(format!("read {path}: {err}")))
}

pub fn image_dimensions(path: &Utf8Path) -> Result<(u32, u32), GxdError> {
    image::image_dimensions(path.as_std_path())
        .map_err(|err| GxdError::Filesystem(format!("read dimensions of {path}: {err}")))
}

/// Tab-delimited output written to a temp file next to its destination and
/// renamed into place on [`TsvWriter::finish`].
pub struct TsvWriter {
    path: Utf8PathBuf,
    inner: BufWriter<NamedTempFile>,
    rows: usize,
}

impl TsvWriter {
    pub fn create(path: &Utf8Path) -> Result<Self, GxdError> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        fs::create_dir_all(parent.as_std_path())
            .map_err(|_| GxdError::OutputOpen(path.to_path_buf()))?;
        let temp = tempfile::Builder::new()
            .prefix(".gxd-imgload")
            .tempfile_in(parent.as_std_path())
            .map_err(|_| GxdError::OutputOpen(path.to_path_buf()))?;
        Ok(Self {
            path: path.to_path_buf(),
            inner: BufWriter::new(temp),
            rows: 0,
        })
    }

    pub fn write_row<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<(), GxdError> {
        let mut first = true;
        for field in fields {
            if !first {
                self.inner.write_all(b"\t").map_err(|err| self.io_error(err))?;
            }
            self.inner
                .write_all(field.as_ref().as_bytes())
                .map_err(|err| self.io_error(err))?;
            first = false;
        }
        self.inner.write_all(b"\n").map_err(|err| self.io_error(err))?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(self) -> Result<Utf8PathBuf, GxdError> {
        let path = self.path;
        let temp = self
            .inner
            .into_inner()
            .map_err(|err| GxdError::Filesystem(format!("flush {path}: {err}")))?;
        temp.persist(path.as_std_path())
            .map_err(|err| GxdError::Filesystem(format!("persist {path}: {err}")))?;
        Ok(path)
    }

    fn io_error(&self, err: io::Error) -> GxdError {
        GxdError::Filesystem(format!("write {}: {err}", self.path))
    }
}
