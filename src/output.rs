use std::fs::{self, File};
use std::io::{self, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::info;

use crate::app::{ProgressEvent, ProgressSink, RunSummary};
use crate::error::GxdError;

const STAMP_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Reports progress through `tracing` and prints a plain summary.
pub struct TextOutput;

impl TextOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{} ({})", summary.operation, summary.mode)?;
        writeln!(stdout, "  records read:  {}", summary.records_read)?;
        writeln!(stdout, "  rows written:  {}", summary.rows_written)?;
        writeln!(stdout, "  skipped:       {}", summary.skipped)?;
        writeln!(stdout, "  unresolved:    {}", summary.unresolved)?;
        for output in &summary.outputs {
            writeln!(stdout, "  output:        {output}")?;
        }
        for load in &summary.loads {
            writeln!(
                stdout,
                "  loaded:        {} <- {} ({} records)",
                load.table, load.file, load.records.0
            )?;
        }
        Ok(())
    }
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

/// The per-run error file, `<log dir>/<command>.<MMDDYYYY>.error`, framed by
/// start and end timestamps.
pub struct ErrorFile {
    path: Utf8PathBuf,
    inner: BufWriter<File>,
}

impl ErrorFile {
    pub fn create(log_dir: &Utf8Path, command: &str, now: NaiveDateTime) -> Result<Self, GxdError> {
        let path = log_dir.join(format!("{command}.{}.error", now.format("%m%d%Y")));
        fs::create_dir_all(log_dir.as_std_path())
            .map_err(|_| GxdError::OutputOpen(path.clone()))?;
        let file = File::create(path.as_std_path()).map_err(|_| GxdError::OutputOpen(path.clone()))?;
        let mut error_file = Self {
            path,
            inner: BufWriter::new(file),
        };
        let stamp = now.format(STAMP_FORMAT).to_string();
        error_file.stamp("Start Date/Time", &stamp)?;
        Ok(error_file)
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn writer(&mut self) -> &mut dyn Write {
        &mut self.inner
    }

    pub fn finish(mut self, now: NaiveDateTime) -> Result<Utf8PathBuf, GxdError> {
        let stamp = now.format(STAMP_FORMAT).to_string();
        self.stamp("\nEnd Date/Time", &stamp)?;
        self.inner
            .flush()
            .map_err(|err| GxdError::Filesystem(format!("flush {}: {err}", self.path)))?;
        Ok(self.path)
    }

    fn stamp(&mut self, label: &str, stamp: &str) -> Result<(), GxdError> {
        writeln!(self.inner, "{label}: {stamp}\n")
            .map_err(|err| GxdError::Filesystem(format!("write {}: {err}", self.path)))
    }
}
