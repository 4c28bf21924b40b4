use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use camino::{Utf8Path, Utf8PathBuf};
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RecordCount(pub usize);

#[derive(Debug, Error, Diagnostic)]
pub enum LoadError {
    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("missing connection setting: {0}")]
    MissingSetting(&'static str),

    #[error("cannot read {path}: {message}")]
    Input { path: Utf8PathBuf, message: String },

    #[error("bulk load of {table} failed: {message}")]
    BulkCopy { table: String, message: String },

    #[error("statement failed ({statement}): {message}")]
    Statement { statement: String, message: String },
}

/// The external bulk-load collaborator.
pub trait BulkLoader {
    /// Loads a tab-delimited file whose columns match `table`.
    fn submit_batch(&self, table: &str, rows: &Utf8Path) -> Result<RecordCount, LoadError>;

    fn run_statement(&self, statement: &str) -> Result<(), LoadError>;
}

impl<T: BulkLoader + ?Sized> BulkLoader for &T {
    fn submit_batch(&self, table: &str, rows: &Utf8Path) -> Result<RecordCount, LoadError> {
        (**self).submit_batch(table, rows)
    }

    fn run_statement(&self, statement: &str) -> Result<(), LoadError> {
        (**self).run_statement(statement)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionSettings {
    pub server: Option<String>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password_file: Option<Utf8PathBuf>,
}

impl ConnectionSettings {
    /// Fails on the first setting a load cannot run without.
    pub fn require_complete(&self) -> Result<(), LoadError> {
        if self.server.is_none() {
            return Err(LoadError::MissingSetting("server (-S)"));
        }
        if self.database.is_none() {
            return Err(LoadError::MissingSetting("database (-D)"));
        }
        if self.user.is_none() {
            return Err(LoadError::MissingSetting("user (-U)"));
        }
        if self.password_file.is_none() {
            return Err(LoadError::MissingSetting("password file (-P)"));
        }
        Ok(())
    }

    fn get<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, LoadError> {
        value.as_deref().ok_or(LoadError::MissingSetting(name))
    }
}

/// Drives `bcp` and `isql`, feeding the password file on stdin.
#[derive(Debug, Clone)]
pub struct CommandLoader {
    settings: ConnectionSettings,
    bcp: Option<PathBuf>,
    isql: Option<PathBuf>,
    delimiter: String,
}

impl CommandLoader {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self::with_programs(settings, "bcp", "isql")
    }

    pub fn with_programs(settings: ConnectionSettings, bcp: &str, isql: &str) -> Self {
        Self {
            settings,
            bcp: find_program(bcp),
            isql: find_program(isql),
            delimiter: "\t".to_string(),
        }
    }

    pub fn bcp_args(&self, table: &str, rows: &Utf8Path) -> Result<Vec<String>, LoadError> {
        let database = ConnectionSettings::get(&self.settings.database, "database (-D)")?;
        let server = ConnectionSettings::get(&self.settings.server, "server (-S)")?;
        let user = ConnectionSettings::get(&self.settings.user, "user (-U)")?;
        Ok(vec![
            format!("{database}..{table}"),
            "in".to_string(),
            rows.to_string(),
            "-c".to_string(),
            format!("-t{}", self.delimiter),
            format!("-S{server}"),
            format!("-U{user}"),
        ])
    }

    fn password(&self) -> Result<Vec<u8>, LoadError> {
        let path = self
            .settings
            .password_file
            .as_ref()
            .ok_or(LoadError::MissingSetting("password file (-P)"))?;
        fs::read(path.as_std_path()).map_err(|err| LoadError::Input {
            path: path.clone(),
            message: err.to_string(),
        })
    }

    fn run(&self, program: &Path, args: &[String], stdin: &[u8]) -> Result<(), String> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| err.to_string())?;
        if let Some(mut input) = child.stdin.take() {
            input.write_all(stdin).map_err(|err| err.to_string())?;
        }
        let output = child.wait_with_output().map_err(|err| err.to_string())?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.is_empty() {
            Err(format!("command failed: {}", program.display()))
        } else {
            Err(stderr)
        }
    }
}

impl BulkLoader for CommandLoader {
    fn submit_batch(&self, table: &str, rows: &Utf8Path) -> Result<RecordCount, LoadError> {
        let bcp = self
            .bcp
            .as_ref()
            .ok_or_else(|| LoadError::MissingTool("bcp".to_string()))?;
        let count = count_rows(rows)?;
        let args = self.bcp_args(table, rows)?;
        info!(program = %bcp.display(), args = %args.join(" "), "bulk copy");
        self.run(bcp, &args, &self.password()?)
            .map_err(|message| LoadError::BulkCopy {
                table: table.to_string(),
                message,
            })?;
        Ok(count)
    }

    fn run_statement(&self, statement: &str) -> Result<(), LoadError> {
        let isql = self
            .isql
            .as_ref()
            .ok_or_else(|| LoadError::MissingTool("isql".to_string()))?;
        let server = ConnectionSettings::get(&self.settings.server, "server (-S)")?;
        let database = ConnectionSettings::get(&self.settings.database, "database (-D)")?;
        let user = ConnectionSettings::get(&self.settings.user, "user (-U)")?;
        let args = vec![
            format!("-S{server}"),
            format!("-D{database}"),
            format!("-U{user}"),
        ];
        let mut input = self.password()?;
        if !input.ends_with(b"\n") {
            input.push(b'\n');
        }
        input.extend_from_slice(format!("{statement}\ngo\n").as_bytes());
        info!(%statement, "maintenance statement");
        self.run(isql, &args, &input)
            .map_err(|message| LoadError::Statement {
                statement: statement.to_string(),
                message,
            })
    }
}

pub fn count_rows(rows: &Utf8Path) -> Result<RecordCount, LoadError> {
    let content = fs::read(rows.as_std_path()).map_err(|err| LoadError::Input {
        path: rows.to_path_buf(),
        message: err.to_string(),
    })?;
    Ok(RecordCount(
        content.iter().filter(|byte| **byte == b'\n').count(),
    ))
}

fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            server: Some("DEV_MGI".to_string()),
            database: Some("mgd".to_string()),
            user: Some("mgd_dbo".to_string()),
            password_file: Some(Utf8PathBuf::from("/tmp/pw")),
        }
    }

    #[test]
    fn bcp_arguments_follow_table_layout() {
        let loader = CommandLoader::new(settings());
        let args = loader
            .bcp_args("GXD_InSituResultImage", Utf8Path::new("/data/out.bcp"))
            .unwrap();
        assert_eq!(
            args,
            [
                "mgd..GXD_InSituResultImage",
                "in",
                "/data/out.bcp",
                "-c",
                "-t\t",
                "-SDEV_MGI",
                "-Umgd_dbo"
            ]
        );
    }

    #[test]
    fn incomplete_settings_are_rejected() {
        let mut partial = settings();
        partial.user = None;
        assert_matches!(
            partial.require_complete(),
            Err(LoadError::MissingSetting("user (-U)"))
        );
        assert!(settings().require_complete().is_ok());
    }

    #[test]
    fn missing_tool_is_an_error() {
        let loader = CommandLoader::with_programs(
            settings(),
            "/nonexistent/bcp",
            "/nonexistent/isql",
        );
        let err = loader
            .submit_batch("ACC_Accession", Utf8Path::new("/tmp/none.bcp"))
            .unwrap_err();
        assert_matches!(err, LoadError::MissingTool(_));
    }

    #[test]
    fn counts_rows_by_newline() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("rows.bcp")).unwrap();
        fs::write(path.as_std_path(), "1\t2\n3\t4\n").unwrap();
        assert_eq!(count_rows(&path).unwrap(), RecordCount(2));
    }
}
