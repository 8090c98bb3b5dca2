use std::io::IsTerminal;
use std::sync::Arc;

use console::Term;
use gitbatch::ProtocolMismatch;
use gitbatch::reconcile::SwitchPrompter;

use crate::progress::ProgressReporter;

/// Asks on the terminal whether to switch a working copy's protocol.
///
/// Declines without asking when stdin is not a terminal.
pub struct ConsolePrompter {
    term: Term,
    reporter: Arc<ProgressReporter>,
}

impl ConsolePrompter {
    pub fn new(reporter: Arc<ProgressReporter>) -> Self {
        Self {
            term: Term::stderr(),
            reporter,
        }
    }

    fn ask(&self, question: &str) -> bool {
        if self.term.write_str(question).is_err() {
            return false;
        }
        match self.term.read_line() {
            Ok(answer) => is_yes(&answer),
            Err(e) => {
                tracing::debug!("Prompt failed: {}", e);
                false
            }
        }
    }
}

impl SwitchPrompter for ConsolePrompter {
    fn confirm_switch(&self, mismatch: &ProtocolMismatch) -> bool {
        if !std::io::stdin().is_terminal() {
            tracing::info!(
                repo = %mismatch.repository,
                "No terminal to ask on, keeping existing protocol"
            );
            return false;
        }

        let question = format!(
            "{} uses {}; switch origin to {}? [y/N] ",
            mismatch.repository, mismatch.current, mismatch.desired
        );
        // Called from the async reconcile step; the read blocks this worker thread.
        tokio::task::block_in_place(|| self.reporter.suspend(|| self.ask(&question)))
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
