//! Data model, error taxonomy, stream watchers, and config surface shared by
//! the command-execution engine in the `runner` crate.

pub mod config;
pub mod error;
pub mod opts;
pub mod result;
pub mod watcher;

pub use config::{RunSection, RunnerConfig, TimeoutsSection};
pub use error::{
    CommandTimedOut, CommandTimedOutError, Failure, FailureError, RunnerError, SubprocessPipeError,
    ThreadException, ThreadExceptionError, UnexpectedExit, UnexpectedExitError, WatcherError,
    WorkerFailure, WorkerKind,
};
pub use opts::{HideArg, HideStream, PartialRunOpts, RunOpts};
pub use result::{tail, CommandResult};
pub use watcher::{RegexResponder, Responder, StreamWatcher};
