//! Command-line front end for the shoebox importer.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use shoebox_config::{Config, ConfigStore};
use shoebox_drive::DriveClient;
use shoebox_engine::{Coordinator, ImportEvent, Phase, RemoteArchive, RunOutcome};
use shoebox_ingest::IngestClient;
use shoebox_state::{CheckpointStore, default_checkpoint_path};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("not configured: run `shoebox setup` first")]
    NotConfigured,

    #[error("no source access token: run `shoebox auth` first")]
    NotAuthenticated,

    #[error("no archives matched the selection")]
    EmptySelection,

    #[error(transparent)]
    Config(#[from] shoebox_config::ConfigError),

    #[error(transparent)]
    State(#[from] shoebox_state::StateError),

    #[error(transparent)]
    Drive(#[from] shoebox_drive::DriveError),

    #[error(transparent)]
    Ingest(#[from] shoebox_ingest::IngestError),

    #[error(transparent)]
    Engine(#[from] shoebox_engine::EngineError),
}

/// Resumable archive importer for the media server.
#[derive(Parser, Debug)]
#[command(name = "shoebox", version, about, arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch server credentials with a one-time setup token.
    Setup {
        /// Media server URL, e.g. https://photos.example
        server_url: String,
        /// Setup token issued by the server.
        token: String,
    },
    /// Store source-store OAuth tokens obtained out of band.
    Auth {
        /// OAuth access token for the source store.
        #[arg(long, env = "SHOEBOX_ACCESS_TOKEN")]
        access_token: String,
        /// Optional refresh token.
        #[arg(long)]
        refresh_token: Option<String>,
    },
    /// List the archive exports available in the source store.
    List,
    /// Download the selected archives and import their media.
    Import {
        /// Archive names to import; use --all for everything listed.
        names: Vec<String>,
        /// Import every archive the listing returns.
        #[arg(long)]
        all: bool,
        /// Checkpoint after this many uploaded entries.
        #[arg(long, default_value_t = shoebox_engine::DEFAULT_CHECKPOINT_EVERY)]
        checkpoint_every: u64,
    },
    /// Resume the persisted job from wherever it stopped.
    Resume,
    /// Show the persisted job state.
    Status,
    /// Discard the persisted job state.
    Reset,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Setup { server_url, token } => setup(&server_url, &token).await,
        Commands::Auth {
            access_token,
            refresh_token,
        } => auth(access_token, refresh_token),
        Commands::List => list().await,
        Commands::Import {
            names,
            all,
            checkpoint_every,
        } => import(names, all, checkpoint_every).await,
        Commands::Resume => resume().await,
        Commands::Status => status(),
        Commands::Reset => reset(),
    }
}

fn config_store() -> Result<ConfigStore, CliError> {
    Ok(ConfigStore::default_location()?)
}

fn checkpoint_store() -> Result<CheckpointStore, CliError> {
    let path = default_checkpoint_path().ok_or(shoebox_state::StateError::NoDataDir)?;
    Ok(CheckpointStore::new(path))
}

fn load_config() -> Result<Config, CliError> {
    config_store()?.load()?.ok_or(CliError::NotConfigured)
}

fn drive_client(config: &Config) -> Result<DriveClient, CliError> {
    let token = config
        .source_access_token
        .as_deref()
        .ok_or(CliError::NotAuthenticated)?;
    Ok(DriveClient::new(token)?)
}

async fn setup(server_url: &str, token: &str) -> Result<(), CliError> {
    let store = config_store()?;
    let mut config = shoebox_config::fetch_from_server(server_url, token).await?;
    // Keep tokens from a previous auth if the server record has none.
    if let Some(existing) = store.load()?
        && config.source_access_token.is_none()
    {
        config.source_access_token = existing.source_access_token;
        config.source_refresh_token = existing.source_refresh_token;
        config.source_token_expiry = existing.source_token_expiry;
    }
    store.save(&config)?;
    println!("configured for {}", config.server_url);
    Ok(())
}

fn auth(access_token: String, refresh_token: Option<String>) -> Result<(), CliError> {
    let store = config_store()?;
    let mut config = store.load()?.ok_or(CliError::NotConfigured)?;
    config.source_access_token = Some(access_token);
    config.source_refresh_token = refresh_token;
    config.source_token_expiry = None;
    store.save(&config)?;
    println!("source tokens stored");
    Ok(())
}

async fn list() -> Result<(), CliError> {
    let config = load_config()?;
    let archives = drive_client(&config)?.list_takeout_archives().await?;
    if archives.is_empty() {
        println!("no archive exports found");
        return Ok(());
    }
    for file in &archives {
        println!("{:>12}  {}", human_size(file.size), file.name);
    }
    println!("{} archive(s)", archives.len());
    Ok(())
}

async fn import(names: Vec<String>, all: bool, checkpoint_every: u64) -> Result<(), CliError> {
    let config = load_config()?;
    let drive = drive_client(&config)?;

    let listed = drive.list_takeout_archives().await?;
    let selection: Vec<RemoteArchive> = listed
        .into_iter()
        .filter(|f| all || names.iter().any(|n| n == &f.name))
        .map(|f| RemoteArchive {
            source_id: f.id,
            name: f.name,
            size: f.size,
        })
        .collect();
    if selection.is_empty() {
        return Err(CliError::EmptySelection);
    }
    info!(archives = selection.len(), "selection resolved");

    let coordinator = build_coordinator(&config, drive)?.with_checkpoint_every(checkpoint_every);
    run_to_end(coordinator, |c| async move { c.start(&selection).await }).await
}

async fn resume() -> Result<(), CliError> {
    let config = load_config()?;
    let drive = drive_client(&config)?;
    let coordinator = build_coordinator(&config, drive)?;
    run_to_end(coordinator, |c| async move { c.resume().await }).await
}

fn build_coordinator(config: &Config, drive: DriveClient) -> Result<Coordinator, CliError> {
    let ingest = IngestClient::new(&config.server_url, &config.api_key)?;
    let checkpoint = checkpoint_store()?;
    let download_dir = shoebox_config::download_dir()?;
    Ok(Coordinator::new(
        Arc::new(drive),
        Arc::new(ingest),
        checkpoint,
        download_dir,
    ))
}

/// Runs one coordinator entry point with Ctrl-C wired to cancellation
/// and progress events mirrored to the terminal.
async fn run_to_end<F, Fut>(mut coordinator: Coordinator, go: F) -> Result<(), CliError>
where
    F: FnOnce(Arc<Coordinator>) -> Fut,
    Fut: Future<Output = Result<RunOutcome, shoebox_engine::EngineError>>,
{
    let mut events = coordinator
        .take_events()
        .unwrap_or_else(|| unreachable!("events taken once per coordinator"));
    let cancel = coordinator.cancel_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing the current chunk");
            cancel.cancel();
        }
    });
    let reporter = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ImportEvent::Progress {
                    phase,
                    completed,
                    total,
                    current_item,
                } => {
                    let verb = match phase {
                        Phase::Downloading => "downloading",
                        Phase::Uploading => "uploading",
                    };
                    println!("[{completed}/{total}] {verb} {current_item}");
                }
                ImportEvent::Completed => println!("import complete"),
                ImportEvent::Failed { error } => println!("import failed: {error}"),
            }
        }
    });

    let outcome = go(Arc::new(coordinator)).await?;
    reporter.abort();
    match outcome {
        RunOutcome::Complete => println!("done"),
        RunOutcome::Cancelled => println!("cancelled; run `shoebox resume` to continue"),
    }
    Ok(())
}

fn status() -> Result<(), CliError> {
    let Some(job) = checkpoint_store()?.load()? else {
        println!("no job");
        return Ok(());
    };
    println!("job {}", job.id);
    println!("  status:   {:?}", job.status);
    println!("  updated:  {}", job.updated_at.to_rfc3339());
    println!(
        "  download: {:.1}% ({} file(s))",
        job.download_progress(),
        job.files.len()
    );
    if let Some(ledger) = &job.upload_progress {
        println!(
            "  upload:   {:.1}% ({}/{} entries)",
            job.upload_progress_pct(),
            ledger.completed_entries,
            ledger.total_entries
        );
    }
    if let Some(err) = &job.last_error {
        println!("  last error: {err}");
    }
    Ok(())
}

fn reset() -> Result<(), CliError> {
    checkpoint_store()?.clear()?;
    println!("job state cleared");
    Ok(())
}

fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_size_formats() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KiB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn cli_parses_import_selection() {
        let cli = Cli::parse_from(["shoebox", "import", "takeout-001.zip", "--checkpoint-every", "50"]);
        match cli.command {
            Commands::Import {
                names,
                all,
                checkpoint_every,
            } => {
                assert_eq!(names, vec!["takeout-001.zip"]);
                assert!(!all);
                assert_eq!(checkpoint_every, 50);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_resume_and_status() {
        assert!(matches!(
            Cli::parse_from(["shoebox", "resume"]).command,
            Commands::Resume
        ));
        assert!(matches!(
            Cli::parse_from(["shoebox", "status"]).command,
            Commands::Status
        ));
    }
}
