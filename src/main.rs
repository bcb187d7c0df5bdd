use anyhow::{bail, Context};
use clap::Parser;
use ratchet::cli::{self, Cli, Commands};
use ratchet::config::{AppConfig, LoggingConfig};
use ratchet::coordination::{install_signal_handlers, GracefulShutdown};
use ratchet::exchange::{build_collaborators, ExecutionMode};
use ratchet::strategy::CycleOrchestrator;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config_dir).with_context(|| {
        format!(
            "failed to load configuration from {}",
            cli.config_dir.display()
        )
    })?;
    init_logging(&config.logging);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("Invalid configuration: {}", e);
        }
        bail!("configuration rejected with {} error(s)", errors.len());
    }

    let mode = ExecutionMode::from_execute_flag(cli.execute);
    let collaborators =
        build_collaborators(&config, mode).context("failed to set up collaborators")?;

    match cli.command {
        Commands::Run { cycles } => {
            cli::log_startup_banner(&config, mode);

            let shutdown = Arc::new(GracefulShutdown::new());
            install_signal_handlers(shutdown.clone());

            let mut orchestrator =
                CycleOrchestrator::new(&config, collaborators).with_shutdown(shutdown);
            orchestrator.run(cycles).await;
            info!("Ratchet stopped after {} cycles", orchestrator.cycles());
        }
        Commands::Check => {
            let failures = cli::check_connectivity(&config, &collaborators).await;
            if failures > 0 {
                bail!("{} collaborator read(s) failed", failures);
            }
        }
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let default_directive = if logging.level.eq_ignore_ascii_case("info") {
        "info,ratchet=debug".to_string()
    } else {
        logging.level.clone()
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // File logging only when RATCHET_LOG_DIR is set and writable.
    //
    // `tracing_appender::rolling::daily` panics if it can't create the initial
    // log file, so writability is checked first.
    let log_dir = std::env::var("RATCHET_LOG_DIR").ok();
    let file_layer = log_dir.as_deref().and_then(|dir| {
        let writable = std::fs::create_dir_all(dir).is_ok() && {
            let probe = std::path::Path::new(dir).join(".ratchet_write_test");
            let ok = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&probe)
                .is_ok();
            let _ = std::fs::remove_file(&probe);
            ok
        };

        if !writable {
            eprintln!(
                "Warning: Could not write to log directory {}, file logging disabled",
                dir
            );
            return None;
        }

        let file_appender = tracing_appender::rolling::daily(dir, "ratchet.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // The guard must outlive the process to flush buffered lines.
        Box::leak(Box::new(guard));

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
    });

    let json_layer = logging
        .json
        .then(|| tracing_subscriber::fmt::layer().json().with_target(true));
    let console_layer = (!logging.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, log_dir) {
        eprintln!("Logging to: {}/ratchet.log", dir);
    }
}
