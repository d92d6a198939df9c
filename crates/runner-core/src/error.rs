use std::fmt;

use crate::result::{fmt_exited, tail, CommandResult};

/// Raised by a `StreamWatcher::submit` implementation to signal a failed
/// expectation. Carries the watcher's own message.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct WatcherError(pub String);

impl WatcherError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Base failure: the command "did not succeed" for some definition. Raised
/// directly when a watcher aborts the run; `UnexpectedExit` and
/// `CommandTimedOut` are siblings in the same taxonomy rather than Rust
/// subtypes (Rust has no struct inheritance), grouped together under
/// `RunnerError`.
#[derive(Debug, Clone)]
pub struct Failure {
    pub result: CommandResult,
    pub reason: Option<WatcherError>,
}

impl Failure {
    pub fn repr(&self) -> String {
        format!("<Failure: cmd='{}'>", self.result.command)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(
                f,
                "Encountered a watcher error while running a command!\nCommand: '{}'\nReason: {}",
                self.result.command, reason
            ),
            None => write!(f, "Command did not succeed: '{}'", self.result.command),
        }
    }
}

impl std::error::Error for Failure {}

/// Non-zero exit, `warn=false`.
#[derive(Debug, Clone)]
pub struct UnexpectedExit {
    pub result: CommandResult,
}

impl UnexpectedExit {
    pub fn repr(&self) -> String {
        format!(
            "<UnexpectedExit: cmd='{}' exited={}>",
            self.result.command,
            fmt_exited(self.result.exited)
        )
    }

    fn stream_section(&self, name: &str, content: &str, hidden: bool) -> String {
        if hidden {
            format!("{name}:{}", tail(content, 10))
        } else {
            format!("{name}: already printed")
        }
    }
}

impl fmt::Display for UnexpectedExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Encountered a bad command exit code!")?;
        writeln!(f)?;
        writeln!(f, "Command: '{}'", self.result.command)?;
        writeln!(f)?;
        writeln!(f, "Exit code: {}", fmt_exited(self.result.exited))?;
        writeln!(f)?;
        writeln!(
            f,
            "{}",
            self.stream_section("Stdout", &self.result.stdout, self.result.hide.hides_stdout())
        )?;
        writeln!(f)?;
        if self.result.pty {
            write!(f, "Stderr: n/a (PTYs have no stderr)")
        } else {
            write!(
                f,
                "{}",
                self.stream_section("Stderr", &self.result.stderr, self.result.hide.hides_stderr())
            )
        }
    }
}

impl std::error::Error for UnexpectedExit {}

/// Raised when a command-level timer fires before the child exits.
#[derive(Debug, Clone)]
pub struct CommandTimedOut {
    pub timeout: u64,
    pub result: CommandResult,
}

impl CommandTimedOut {
    pub fn repr(&self) -> String {
        format!(
            "<CommandTimedOut: cmd='{}' timeout={}>",
            self.result.command, self.timeout
        )
    }

    fn stream_section(&self, name: &str, content: &str, hidden: bool) -> String {
        if hidden {
            format!("{name}:{}", tail(content, 10))
        } else {
            format!("{name}: already printed")
        }
    }
}

impl fmt::Display for CommandTimedOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Command did not complete within {} seconds!",
            self.timeout
        )?;
        writeln!(f)?;
        writeln!(f, "Command: '{}'", self.result.command)?;
        writeln!(f)?;
        writeln!(
            f,
            "{}",
            self.stream_section("Stdout", &self.result.stdout, self.result.hide.hides_stdout())
        )?;
        writeln!(f)?;
        if self.result.pty {
            write!(f, "Stderr: n/a (PTYs have no stderr)")
        } else {
            write!(
                f,
                "{}",
                self.stream_section("Stderr", &self.result.stderr, self.result.hide.hides_stderr())
            )
        }
    }
}

impl std::error::Error for CommandTimedOut {}

/// Which worker pump captured an exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    Stdout,
    Stderr,
    Stdin,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerKind::Stdout => "stdout",
            WorkerKind::Stderr => "stderr",
            WorkerKind::Stdin => "stdin",
        };
        write!(f, "{name}")
    }
}

/// A single worker's captured failure: which stream it belonged to, and a
/// message carrying whatever detail the panic payload provided.
#[derive(Debug, Clone)]
pub struct WorkerFailure {
    pub worker: WorkerKind,
    pub message: String,
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} worker: {}", self.worker, self.message)
    }
}

/// Aggregate of worker failures surfaced after `join`.
#[derive(Debug, Clone)]
pub struct ThreadException {
    pub exceptions: Vec<WorkerFailure>,
}

impl fmt::Display for ThreadException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Encountered {} worker exception(s):", self.exceptions.len())?;
        for (i, exc) in self.exceptions.iter().enumerate() {
            writeln!(f, "  {}. {exc}", i + 1)?;
        }
        Ok(())
    }
}

impl std::error::Error for ThreadException {}

/// Raised when the caller invokes `close_proc_stdin` while `pty=true`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot close the stdin of a PTY-driven process")]
pub struct SubprocessPipeError;

/// Top-level error returned by `Runner::run` / `Local::run`.
#[derive(thiserror::Error, Debug)]
pub enum RunnerError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error(transparent)]
    UnexpectedExit(#[from] UnexpectedExitError),
    #[error(transparent)]
    CommandTimedOut(#[from] CommandTimedOutError),
    #[error(transparent)]
    WatcherFailed(#[from] FailureError),
    #[error(transparent)]
    ThreadException(#[from] ThreadExceptionError),
    #[error(transparent)]
    SubprocessPipe(#[from] SubprocessPipeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// thiserror requires each transparent variant's payload to itself implement
// std::error::Error; wrap the plain structs above so Display/Error both hold
// without giving every data carrier an unwanted blanket `Error` impl.
macro_rules! error_wrapper {
    ($wrapper:ident, $inner:ty) => {
        #[derive(Debug, Clone)]
        pub struct $wrapper(pub $inner);

        impl fmt::Display for $wrapper {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl std::error::Error for $wrapper {}

        impl From<$inner> for $wrapper {
            fn from(inner: $inner) -> Self {
                $wrapper(inner)
            }
        }
    };
}

error_wrapper!(UnexpectedExitError, UnexpectedExit);
error_wrapper!(CommandTimedOutError, CommandTimedOut);
error_wrapper!(FailureError, Failure);
error_wrapper!(ThreadExceptionError, ThreadException);

impl RunnerError {
    pub fn unexpected_exit(result: CommandResult) -> Self {
        RunnerError::UnexpectedExit(UnexpectedExitError(UnexpectedExit { result }))
    }

    pub fn timed_out(timeout: u64, result: CommandResult) -> Self {
        RunnerError::CommandTimedOut(CommandTimedOutError(CommandTimedOut { timeout, result }))
    }

    pub fn watcher_failed(result: CommandResult, reason: WatcherError) -> Self {
        RunnerError::WatcherFailed(FailureError(Failure {
            result,
            reason: Some(reason),
        }))
    }

    pub fn thread_exception(exceptions: Vec<WorkerFailure>) -> Self {
        RunnerError::ThreadException(ThreadExceptionError(ThreadException { exceptions }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opts::HideStream;
    use std::collections::BTreeMap;

    fn sample_result(exited: Option<i32>, pty: bool, hide: HideStream) -> CommandResult {
        CommandResult {
            command: "nope".into(),
            shell: "bash".into(),
            env: BTreeMap::new(),
            stdout: "some\nstdout\nhere".into(),
            stderr: "some\nstderr\nhere".into(),
            exited,
            pty,
            hide,
            encoding: "utf-8".into(),
        }
    }

    #[test]
    fn unexpected_exit_repr_has_command_and_exit_code() {
        let err = UnexpectedExit {
            result: sample_result(Some(23), false, HideStream::None),
        };
        assert_eq!(err.repr(), "<UnexpectedExit: cmd='nope' exited=23>");
    }

    #[test]
    fn unexpected_exit_display_contains_required_sections_in_order() {
        let err = UnexpectedExit {
            result: sample_result(Some(1), false, HideStream::None),
        };
        let text = err.to_string();
        let bad_exit = text.find("Encountered a bad command exit code!").unwrap();
        let command = text.find("Command: 'nope'").unwrap();
        let exit_code = text.find("Exit code: 1").unwrap();
        let stdout = text.find("Stdout:").unwrap();
        let stderr = text.find("Stderr:").unwrap();
        assert!(bad_exit < command);
        assert!(command < exit_code);
        assert!(exit_code < stdout);
        assert!(stdout < stderr);
        assert!(text.contains("Stdout: already printed"));
        assert!(text.contains("Stderr: already printed"));
    }

    #[test]
    fn unexpected_exit_shows_tail_when_hidden() {
        let err = UnexpectedExit {
            result: sample_result(Some(1), false, HideStream::Both),
        };
        let text = err.to_string();
        assert!(text.contains("some\nstdout\nhere"));
        assert!(text.contains("some\nstderr\nhere"));
        assert!(!text.contains("already printed"));
    }

    #[test]
    fn unexpected_exit_pty_stderr_section_wins_over_hidden_tail() {
        let err = UnexpectedExit {
            result: sample_result(Some(1), true, HideStream::Both),
        };
        assert!(err.to_string().contains("n/a (PTYs have no stderr)"));
    }

    #[test]
    fn command_timed_out_display_and_repr() {
        let err = CommandTimedOut {
            timeout: 7,
            result: sample_result(None, false, HideStream::None),
        };
        assert_eq!(err.repr(), "<CommandTimedOut: cmd='nope' timeout=7>");
        assert!(
            err.to_string()
                .starts_with("Command did not complete within 7 seconds!")
        );
    }

    #[test]
    fn failure_repr_has_command() {
        let failure = Failure {
            result: sample_result(None, false, HideStream::None),
            reason: Some(WatcherError::new("meh")),
        };
        assert_eq!(failure.repr(), "<Failure: cmd='nope'>");
    }

    #[test]
    fn runner_error_invalid_argument_round_trips_message() {
        let err = RunnerError::InvalidArgument("wat?".to_string());
        assert_eq!(err.to_string(), "wat?");
    }

    #[test]
    fn runner_error_constructors_produce_matching_variants() {
        assert!(matches!(
            RunnerError::unexpected_exit(sample_result(Some(1), false, HideStream::None)),
            RunnerError::UnexpectedExit(_)
        ));
        assert!(matches!(
            RunnerError::timed_out(7, sample_result(None, false, HideStream::None)),
            RunnerError::CommandTimedOut(_)
        ));
        assert!(matches!(
            RunnerError::watcher_failed(sample_result(None, false, HideStream::None), WatcherError::new("x")),
            RunnerError::WatcherFailed(_)
        ));
        assert!(matches!(
            RunnerError::thread_exception(vec![WorkerFailure {
                worker: WorkerKind::Stdin,
                message: "EPIPE".into(),
            }]),
            RunnerError::ThreadException(_)
        ));
    }
}
