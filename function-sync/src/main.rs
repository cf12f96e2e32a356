//! function-sync - Main entry point
//!
//! Maps a deployed function's code onto a local directory and pushes local
//! changes back.

use anyhow::Result;
use clap::Parser;
use function_sync::daemon::shutdown::ShutdownCoordinator;
use function_sync::engine::package::PackageReference;
use function_sync::remote::LambdaClient;
use function_sync::watcher::EventWatcher;
use function_sync::{utils, Config, RetryPolicy, SyncEngine, SyncError};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Name or ARN of the function
    #[arg(short, long)]
    function: String,

    /// Local directory holding the function's code
    #[arg(short = 'd', long, value_name = "DIR", default_value = ".")]
    local_dir: PathBuf,

    /// Credential profile (overrides config)
    #[arg(short, long)]
    profile: Option<String>,

    /// Upload the local directory once and exit
    #[arg(long, conflicts_with = "watch")]
    push: bool,

    /// Watch the local directory and upload on every change
    #[arg(short, long)]
    watch: bool,

    /// Download the deployed package, overwriting local files
    #[arg(long = "clone")]
    force_clone: bool,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };
    let mut config = config.with_env_overrides();
    if let Some(profile) = &args.profile {
        config.remote.profile = Some(profile.clone());
    }

    // Initialize logging
    utils::logger::init(utils::logger::level_for_verbosity(args.verbose, &config.log.level))?;

    info!(
        "Starting function-sync v{} (function: {})",
        env!("CARGO_PKG_VERSION"),
        args.function
    );

    let local_root = args.local_dir.canonicalize().map_err(|e| {
        SyncError::Config(format!("Local dir {} does not exist: {}", args.local_dir.display(), e))
    })?;
    let package = PackageReference::new(&local_root, args.function.as_str(), &config.sync.scratch_dir);

    let client = LambdaClient::connect(&config.remote).await?;
    let mut engine = SyncEngine::new(package, client, RetryPolicy::from(&config.sync));

    // Cloning clobbers local files, so only do it implicitly into an empty directory.
    if args.force_clone || utils::fs::is_empty_dir(&local_root)? {
        if !utils::fs::is_empty_dir(&local_root)? {
            warn!(
                "Overwriting files in {} with the deployed package of {}",
                local_root.display(),
                args.function
            );
        }
        engine.initial_clone().await?;
    } else {
        engine.resume().map_err(|e| match e {
            SyncError::Config(msg) => SyncError::Config(format!("{msg} (use --clone to download it)")),
            other => other,
        })?;
    }

    if args.watch {
        let shutdown = ShutdownCoordinator::new();
        let signals = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { shutdown.wait_for_signal().await }
        });

        let watcher = EventWatcher::watch(&local_root)?;
        let result = engine.watch(watcher, shutdown.token()).await;

        signals.abort();
        result?;
        info!("Shutdown complete");
    } else if args.push {
        engine.upload().await?;
    }

    Ok(())
}
