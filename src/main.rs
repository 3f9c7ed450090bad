mod app;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use schoolhub::config::Config;

#[derive(Parser, Debug)]
#[command(name = "schoolhub")]
#[command(about = "Attendance, feedback and notifications for SchoolHub")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/schoolhub/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Write logs here instead of the data directory
  #[arg(long)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: app::Command,
}

/// Log to a file so command output on stdout stays clean.
fn init_logging(log_file: Option<&Path>) -> Result<WorkerGuard> {
  let path = match log_file {
    Some(p) => p.to_path_buf(),
    None => dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?
      .join("schoolhub")
      .join("schoolhub.log"),
  };

  let dir = path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or_else(|| Path::new("."));
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
  let file_name = path
    .file_name()
    .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
  let filter = EnvFilter::try_from_env("SCHOOLHUB_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging(args.log_file.as_deref())?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  let mut app = app::App::new(config)?;
  app.run(args.command).await?;

  Ok(())
}
