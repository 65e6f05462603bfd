//! Signal handling for the download phase.
//!
//! The first SIGINT or SIGTERM cancels the returned token; the scheduler
//! commits the batch in flight, marks the run interrupted and returns. A
//! second signal exits immediately with status 130.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Exit status used when a second signal arrives.
const FORCE_EXIT_STATUS: i32 = 130;

/// Handle one delivered signal. Returns `true` when the process should exit.
fn on_signal(token: &CancellationToken, seen: &AtomicBool) -> bool {
    if seen.swap(true, Ordering::SeqCst) {
        tracing::warn!("Second signal received, exiting without committing");
        return true;
    }
    tracing::info!("Received shutdown signal, finishing current batch...");
    tracing::info!("Press Ctrl+C again to exit immediately");
    token.cancel();
    false
}

/// Spawn the signal listener and return the token it cancels.
pub(crate) fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let seen = Arc::new(AtomicBool::new(false));

    let handler_token = token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!("Could not listen for SIGTERM: {}", e);
                    None
                }
            }
        };

        loop {
            #[cfg(unix)]
            {
                let term = async {
                    match sigterm.as_mut() {
                        Some(s) => {
                            s.recv().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                };
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if let Err(e) = res {
                            tracing::warn!("Could not listen for Ctrl+C: {}", e);
                            return;
                        }
                    }
                    _ = term => {}
                }
            }

            #[cfg(not(unix))]
            {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("Could not listen for Ctrl+C: {}", e);
                    return;
                }
            }

            if on_signal(&handler_token, &seen) {
                std::process::exit(FORCE_EXIT_STATUS);
            }
        }
    });

    token
}
