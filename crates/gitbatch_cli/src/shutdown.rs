use console::Term;
use gitbatch::CancellationFlag;

/// Set up the Ctrl+C handler for graceful shutdown.
///
/// The first Ctrl+C sets `cancel`: no new repository is started and the ones
/// in flight finish. The second one exits with 130.
pub(crate) fn setup_shutdown_handler(cancel: CancellationFlag) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            return;
        }

        let is_tty = Term::stdout().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, finishing current operations...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, finishing current operations");
        }

        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }

        if is_tty {
            eprintln!("Force quit!");
        }
        std::process::exit(130);
    });
}
