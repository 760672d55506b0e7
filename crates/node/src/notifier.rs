//! Host-side notification of completed locks.

use txlock_types::LockRequest;

/// Receives one notification per completed transaction lock.
///
/// Runners invoke this when executing `Action::EmitTransactionLocked`.
/// Implementations must not block; anything slow belongs on the host's
/// own threads.
pub trait LockNotifier: Send + Sync {
    /// A candidate completed: every input is locked.
    fn transaction_locked(&self, request: &LockRequest);
}

/// Runs a configured shell command once per completed lock, with `%s`
/// replaced by the transaction hash hex. Fire and forget: the spawned
/// process is never waited on and failures are only logged.
pub struct ShellNotifier {
    /// Command template, e.g. `notify-merchant.sh %s`.
    command_template: String,
}

impl ShellNotifier {
    /// Create a notifier from a command template.
    pub fn new(command_template: impl Into<String>) -> Self {
        Self {
            command_template: command_template.into(),
        }
    }

    /// The command line that would run for a given hash, for logging and
    /// tests.
    fn command_for(&self, tx_hash_hex: &str) -> String {
        self.command_template.replace("%s", tx_hash_hex)
    }
}

impl LockNotifier for ShellNotifier {
    fn transaction_locked(&self, request: &LockRequest) {
        let command = self.command_for(&request.hash().to_hex());
        tracing::debug!(%command, "running lock notification command");
        match std::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .spawn()
        {
            Ok(_child) => {}
            Err(error) => {
                tracing::warn!(%command, %error, "lock notification command failed to start");
            }
        }
    }
}
