//! Asynchronous execution handle. Exposes only the read-only parameters
//! finalized at `start` time; `stdout`/`stderr` aren't available until
//! `join()` completes.

use runner_core::{CommandResult, RunnerError};

use crate::runner::SharedRun;

pub struct Promise {
    command: String,
    pty: bool,
    encoding: String,
    shell: String,
    shared: Option<SharedRun>,
}

impl Promise {
    pub(crate) fn new(command: String, pty: bool, encoding: String, shell: String, shared: SharedRun) -> Self {
        Self {
            command,
            pty,
            encoding,
            shell,
            shared: Some(shared),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn pty(&self) -> bool {
        self.pty
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Wait, stop the backend, and decide the final outcome. A `Promise`
    /// that is never joined leaks its running workers/timer until the
    /// process exits — there is no `Drop`-triggered join.
    pub fn join(mut self) -> Result<CommandResult, RunnerError> {
        let shared = self
            .shared
            .take()
            .expect("Promise::join called more than once");
        shared.join()
    }
}
