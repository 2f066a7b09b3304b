use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use clap::Parser;
use env_logger::{Env, Target};
use rowscope_adapters::http::{HttpBackend, HttpBackendError};
use rowscope_core::audit_trail::{FileAuditTrail, AUDIT_FILE_NAME};
use rowscope_core::config::{default_config_dir, ClientConfig, ConfigError};
use rowscope_core::preferences::{
    FilePreferencesStore, PreferenceStore, PreferencesError, PREFERENCES_FILE_NAME,
};
use rowscope_core::session::BrowserSession;
use rowscope_tui::TuiError;
use thiserror::Error;

const LOG_FILE_NAME: &str = "rowscope.log";

#[derive(Debug, Parser)]
#[command(author, version, about = "Browse and edit database tables through a REST backend")]
struct Cli {
    /// Backend base URL, e.g. http://localhost:8080
    #[arg(long, env = "ROWSCOPE_BASE_URL")]
    base_url: Option<String>,

    /// Rows per page (1-1000)
    #[arg(long)]
    page_limit: Option<u32>,

    /// Config file to read instead of the default one
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not record writes and queries in the audit trail
    #[arg(long)]
    no_audit: bool,

    /// Log to stderr instead of the log file
    #[arg(long)]
    log_stderr: bool,
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Backend(#[from] HttpBackendError),
    #[error(transparent)]
    Preferences(#[from] PreferencesError),
    #[error("failed to open log file at {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to install logger: {0}")]
    Logger(#[from] log::SetLoggerError),
    #[error(transparent)]
    Tui(#[from] TuiError),
}

fn resolve_config(cli: &Cli) -> Result<ClientConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load_from_path(path)?,
        None => ClientConfig::load_default()?,
    };
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url.clone());
    }
    if let Some(page_limit) = cli.page_limit {
        config = config.with_page_limit(page_limit);
    }
    if cli.no_audit {
        config.audit_enabled = false;
    }
    Ok(config)
}

/// The terminal belongs to the TUI, so logs go to a file unless asked
/// otherwise. An unopenable log file falls back to stderr.
fn init_logging(log_stderr: bool, config_dir: &Path) -> Result<(), AppError> {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();

    let mut fallback = None;
    if !log_stderr {
        let path = config_dir.join(LOG_FILE_NAME);
        match open_log_file(&path) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(source) => fallback = Some(AppError::LogFile { path, source }),
        }
    }

    builder.try_init()?;
    if let Some(error) = fallback {
        log::warn!("{error}; logging to stderr");
    }
    Ok(())
}

fn open_log_file(path: &Path) -> std::io::Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn run_app(
    config: &ClientConfig,
    config_dir: &Path,
    run_tui: impl FnOnce(
        BrowserSession<HttpBackend>,
        Box<dyn PreferenceStore>,
    ) -> Result<(), TuiError>,
) -> Result<(), AppError> {
    let backend = HttpBackend::new(&config.base_url)?;
    log::info!(
        "using backend at {} ({} rows per page)",
        backend.base_url(),
        config.page_limit
    );

    let mut session = BrowserSession::new(backend, config.page_limit);
    if config.audit_enabled {
        session = session.with_audit(FileAuditTrail::from_path(
            config_dir.join(AUDIT_FILE_NAME),
        ));
    }
    let preferences =
        FilePreferencesStore::load_from_path(config_dir.join(PREFERENCES_FILE_NAME))?;

    run_tui(session, Box::new(preferences))?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config_dir = default_config_dir()?;
    init_logging(cli.log_stderr, &config_dir)?;
    let config = resolve_config(&cli)?;

    run_app(&config, &config_dir, rowscope_tui::run)?;
    Ok(())
}
