//! Graceful shutdown handling
//!
//! The cycle loop checks [`GracefulShutdown::is_shutdown_requested`] between
//! symbols and waits on [`GracefulShutdown::subscribe`] between ticks, so a
//! signal never interrupts a symbol halfway through its order flow.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Finish the current symbol, then stop (SIGTERM, SIGINT)
    Graceful,
    /// Repeated signal or SIGQUIT
    Urgent,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Graceful => write!(f, "graceful"),
            ShutdownSignal::Urgent => write!(f, "urgent"),
        }
    }
}

/// Shutdown coordinator shared by the signal handlers and the cycle loop
pub struct GracefulShutdown {
    shutdown_requested: AtomicBool,
    signal_tx: broadcast::Sender<ShutdownSignal>,
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (signal_tx, _) = broadcast::channel(8);
        Self {
            shutdown_requested: AtomicBool::new(false),
            signal_tx,
        }
    }

    /// Subscribe to shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.signal_tx.subscribe()
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Request shutdown with specified signal type
    pub fn request_shutdown(&self, signal: ShutdownSignal) {
        if self.shutdown_requested.swap(true, Ordering::SeqCst) && signal == ShutdownSignal::Graceful
        {
            warn!("Shutdown already requested, ignoring duplicate signal: {}", signal);
            return;
        }

        info!("Shutdown requested: {}", signal);
        let _ = self.signal_tx.send(signal);
    }
}

/// Helper to install OS signal handlers
pub fn install_signal_handlers(shutdown: Arc<GracefulShutdown>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        for (kind, name, level) in [
            (SignalKind::terminate(), "SIGTERM", ShutdownSignal::Graceful),
            (SignalKind::interrupt(), "SIGINT", ShutdownSignal::Graceful),
            (SignalKind::quit(), "SIGQUIT", ShutdownSignal::Urgent),
        ] {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut stream = match signal(kind) {
                    Ok(stream) => stream,
                    Err(e) => {
                        error!("Failed to install {} handler: {}", name, e);
                        return;
                    }
                };
                while stream.recv().await.is_some() {
                    info!("Received {}", name);
                    let signal = if shutdown.is_shutdown_requested() {
                        ShutdownSignal::Urgent
                    } else {
                        level
                    };
                    shutdown.request_shutdown(signal);
                }
            });
        }
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C");
                    shutdown.request_shutdown(ShutdownSignal::Graceful);
                }
                Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
            }
        });
    }
}
