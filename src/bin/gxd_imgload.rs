use std::process::ExitCode;

use camino::Utf8PathBuf;
use chrono::Local;
use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gxd_imgload::app::{App, ProgressSink, RunSummary};
use gxd_imgload::config::{ConfigLoader, Directories, ResolvedConfig};
use gxd_imgload::domain::ProcessingMode;
use gxd_imgload::error::GxdError;
use gxd_imgload::loader::{BulkLoader, CommandLoader, ConnectionSettings};
use gxd_imgload::output::{ErrorFile, JsonOutput, OutputMode, TextOutput};
use gxd_imgload::schema::MalformedPolicy;
use gxd_imgload::store::{ImageStore, SnapshotStore};

#[derive(Parser)]
#[command(name = "gxd-imgload")]
#[command(about = "Prepare GXD image loads and associate image panes with assay results")]
#[command(version)]
struct Cli {
    #[arg(short = 'S', long, env = "MGD_DBSERVER")]
    server: Option<String>,

    #[arg(short = 'D', long, env = "MGD_DBNAME")]
    database: Option<String>,

    #[arg(short = 'U', long, env = "MGD_DBUSER")]
    user: Option<String>,

    #[arg(short = 'P', long, env = "MGD_DBPASSWORDFILE")]
    password_file: Option<Utf8PathBuf>,

    #[arg(short = 'M', long, env = "LOADMODE", value_enum, default_value_t = ProcessingMode::Load)]
    mode: ProcessingMode,

    #[arg(long, env = "GXD_IMGLOAD_CONFIG")]
    config: Option<Utf8PathBuf>,

    #[arg(long, env = "DATADIR", default_value = ".")]
    data_dir: Utf8PathBuf,

    #[arg(long, env = "PIXELDBDATA", default_value = ".")]
    pixel_dir: Utf8PathBuf,

    #[arg(long, env = "LOGDIR", default_value = ".")]
    log_dir: Utf8PathBuf,

    #[arg(long, env = "GXD_STORE_SNAPSHOT")]
    store: Option<Utf8PathBuf>,

    #[arg(long, env = "CREATEDBY")]
    created_by: Option<String>,

    /// Overrides the profile's handling of malformed input lines.
    #[arg(long, env = "GXD_MALFORMED", value_enum)]
    malformed: Option<MalformedPolicy>,

    #[arg(long, default_value = "bcp")]
    bcp: String,

    #[arg(long, default_value = "isql")]
    isql: String,

    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    #[command(about = "Write the image and image pane load files")]
    Prep,
    #[command(about = "Associate image panes with results by assay and specimen")]
    AssocSpecimens,
    #[command(about = "Associate image panes with results by probe")]
    AssocProbes,
    #[command(about = "Associate results with image panes by figure label")]
    AssocFigures,
    #[command(about = "Create accession IDs for full size images")]
    Accessions,
    #[command(about = "Load the prepared image and image pane files")]
    LoadImages,
}

impl Command {
    fn name(self) -> &'static str {
        match self {
            Command::Prep => "prep",
            Command::AssocSpecimens => "assoc-specimens",
            Command::AssocProbes => "assoc-probes",
            Command::AssocFigures => "assoc-figures",
            Command::Accessions => "accessions",
            Command::LoadImages => "load-images",
        }
    }

    fn publishes(self) -> bool {
        !matches!(self, Command::Prep)
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(map_usage_exit_code(&err));
        }
    };
    if let Err(report) = run(cli) {
        eprintln!("{report:?}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

/// Usage errors, an invalid `-M` included, exit 1. `--help` and `--version`
/// exit 0.
fn map_usage_exit_code(error: &clap::Error) -> u8 {
    if error.use_stderr() { 1 } else { 0 }
}

fn run(cli: Cli) -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let dirs = Directories {
        data_dir: cli.data_dir.clone(),
        pixel_dir: cli.pixel_dir.clone(),
    };
    let resolved = ConfigLoader::resolve(cli.config.as_deref(), &dirs)?;

    let settings = ConnectionSettings {
        server: cli.server.clone(),
        database: cli.database.clone(),
        user: cli.user.clone(),
        password_file: cli.password_file.clone(),
    };
    if cli.mode.submits() && cli.command.publishes() {
        settings.require_complete().map_err(GxdError::from)?;
    }

    let store = match &cli.store {
        Some(path) => SnapshotStore::load(path)?,
        None => {
            warn!("no store snapshot given; every store lookup will miss");
            SnapshotStore::default()
        }
    };
    let app = App::new(
        store,
        CommandLoader::with_programs(settings, &cli.bcp, &cli.isql),
        cli.mode,
    )
    .with_malformed_policy(cli.malformed.unwrap_or(resolved.malformed));

    info!(
        command = cli.command.name(),
        mode = %cli.mode,
        reference = %resolved.reference,
        "starting"
    );
    let summary = match output_mode {
        OutputMode::Json => run_command(&cli, &app, &resolved, &JsonOutput)?,
        OutputMode::Text => run_command(&cli, &app, &resolved, &TextOutput)?,
    };

    match output_mode {
        OutputMode::Json => JsonOutput::print_summary(&summary).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_summary(&summary).into_diagnostic()?,
    }
    Ok(())
}

fn run_command<S: ImageStore, L: BulkLoader>(
    cli: &Cli,
    app: &App<S, L>,
    resolved: &ResolvedConfig,
    sink: &dyn ProgressSink,
) -> miette::Result<RunSummary> {
    let mut error_file = ErrorFile::create(
        &cli.log_dir,
        cli.command.name(),
        Local::now().naive_local(),
    )?;
    let errors = Some(error_file.writer());

    let result = match cli.command {
        Command::Prep => resolved
            .prep
            .as_ref()
            .ok_or(GxdError::MissingSection("prep"))
            .and_then(|job| app.prepare_images(job, errors, sink)),
        Command::AssocSpecimens => resolved
            .specimen_assoc
            .as_ref()
            .ok_or(GxdError::MissingSection("specimen_assoc"))
            .and_then(|job| app.associate_specimens(job, errors, sink)),
        Command::AssocProbes => resolved
            .probe_assoc
            .as_ref()
            .ok_or(GxdError::MissingSection("probe_assoc"))
            .and_then(|job| app.associate_probes(job, errors, sink)),
        Command::AssocFigures => resolved
            .figure_assoc
            .as_ref()
            .ok_or(GxdError::MissingSection("figure_assoc"))
            .and_then(|job| app.associate_figures(job, errors, sink)),
        Command::Accessions => resolved
            .accessions
            .clone()
            .ok_or(GxdError::MissingSection("accessions"))
            .and_then(|mut job| {
                if let Some(login) = &cli.created_by {
                    job.created_by = Some(login.clone());
                }
                app.create_image_accessions(&job, errors, sink)
            }),
        Command::LoadImages => resolved
            .load_images
            .clone()
            .ok_or(GxdError::MissingSection("load_images"))
            .and_then(|mut job| {
                if let Some(login) = &cli.created_by {
                    job.created_by = Some(login.clone());
                }
                app.load_images(&job, errors, sink)
            }),
    };

    let error_path = error_file.finish(Local::now().naive_local())?;
    info!(error_file = %error_path, "error file closed");
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;

    use super::*;

    #[test]
    fn invalid_mode_is_a_usage_error() {
        let err = Cli::try_parse_from(["gxd-imgload", "-M", "dry", "prep"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
        assert_eq!(map_usage_exit_code(&err), 1);
    }

    #[test]
    fn missing_subcommand_is_a_usage_error() {
        let err = Cli::try_parse_from(["gxd-imgload", "-M", "preview"])
            .err()
            .unwrap();
        assert_eq!(map_usage_exit_code(&err), 1);
    }

    #[test]
    fn help_exits_cleanly() {
        let err = Cli::try_parse_from(["gxd-imgload", "--help"]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        assert_eq!(map_usage_exit_code(&err), 0);
    }

    #[test]
    fn malformed_flag_overrides_profile() {
        let cli = Cli::try_parse_from([
            "gxd-imgload",
            "-M",
            "preview",
            "--malformed",
            "fail",
            "load-images",
        ])
        .unwrap();
        assert_eq!(cli.mode, ProcessingMode::Preview);
        assert_eq!(cli.malformed, Some(MalformedPolicy::Fail));
        assert_eq!(cli.command.name(), "load-images");
        assert!(cli.command.publishes());
    }
}
