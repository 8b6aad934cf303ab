/// # archive-upload CLI Interface (Module)
///
/// This module implements the CLI for archive-upload: command parsing, client
/// construction, interrupt handling and the final report.
///
/// All run semantics (listing, dispatch, retries, progress, sharing) live in the
/// [`archive-upload-core`] crate; this module only wires concrete clients into it.
///
/// ## Commands
/// - `run`: upload the archive directory into today's remote folder and share it.
/// - `check`: load config and credentials and print the target folder name,
///   without any network call.
///
/// ## Exit codes
/// [`exit_code`] maps a failed [`run`] onto the process exit status: the
/// [`RunError::exit_code`] of a run error, `1` for anything else (config,
/// credentials, client construction).
///
/// [`archive-upload-core`]: ../../archive-upload-core/
use crate::dav::DavClient;
use crate::load_config::{load_config, load_credentials, CliConfig};
use crate::share::ShareApiClient;
use crate::token_store::PgTokenStore;
use anyhow::Result;
use archive_upload_core::error::RunError;
use archive_upload_core::session::{run_session, Collaborators, SessionOptions, SessionReport};
use clap::{Parser, Subcommand};
use indicatif::HumanBytes;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// CLI for archive-upload: push a local archive directory to WebDAV and share it.
#[derive(Parser)]
#[clap(
    name = "archive-upload",
    version,
    about = "Upload an archive directory to a dated WebDAV folder and share it with recipients"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload every file of the archive directory, then share the folder
    Run {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Number of parallel transfers (overrides config and environment)
        #[clap(long)]
        concurrency: Option<usize>,
        /// Disable the per-second progress display
        #[clap(long)]
        no_progress: bool,
    },
    /// Validate config and credentials and print the target folder name
    Check {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Process exit status for an error returned by [`run`].
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<RunError>()
        .map(RunError::exit_code)
        .unwrap_or(1)
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Run {
            config,
            concurrency,
            no_progress,
        } => {
            let mut config = load_config(config)?;
            if let Some(n) = concurrency {
                anyhow::ensure!(n > 0, "--concurrency must be at least 1");
                config.session.concurrency = n;
            }
            tracing::info!(command = "run", concurrency = config.session.concurrency, "Starting archive upload");
            upload(config, !no_progress).await
        }
        Commands::Check { config } => {
            let config = load_config(config)?;
            load_credentials(&config.credentials)?;
            let folder = config
                .session
                .folder_name(chrono::Local::now().date_naive());
            tracing::info!(command = "check", folder = %folder, "Configuration is valid");
            println!("{folder}");
            Ok(())
        }
    }
}

async fn upload(config: CliConfig, show_progress: bool) -> Result<()> {
    let credentials = load_credentials(&config.credentials)?;
    let timeouts = config.http.timeouts();
    let dav = DavClient::new(
        &config.dav_url,
        &credentials.dav_user,
        &credentials.dav_password,
        config.session.concurrency,
        timeouts,
    )?;
    let share = ShareApiClient::new(
        &config.api_url,
        &config.token_url,
        &credentials.client_id,
        &credentials.client_secret,
        timeouts,
    )?;
    let store = PgTokenStore::connect_lazy(&config.database, &credentials.db_password);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("[RUN] interrupt received, aborting transfers");
            interrupt.cancel();
        }
    });

    let collab = Collaborators {
        transport: &dav,
        storage: &dav,
        tokens: &share,
        credentials: &store,
        share: &share,
    };
    let mut options = SessionOptions::today(cancel);
    options.show_progress = show_progress;

    match run_session(&config.session, &collab, options).await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            tracing::error!(command = "run", error = %e, exit_code = e.exit_code(), "Archive upload failed");
            Err(anyhow::Error::new(e))
        }
    }
}

fn print_report(report: &SessionReport) {
    let run = &report.run;
    println!(
        "Uploaded {} file(s), {} in {}s to {}",
        run.uploaded.len(),
        HumanBytes(run.bytes_uploaded),
        run.elapsed.as_secs(),
        report.target.name
    );
    for file in &run.abandoned {
        println!(
            "NOT uploaded after {} attempts: {}",
            file.attempts, file.filename
        );
    }
    if let Some(link) = &report.target.share_link {
        println!("Share link: {link}");
    }
}
