//! Command-execution engine: spawns a subprocess (pty or pipe), pumps its
//! output through sinks while capturing it, mirrors stdin, watches output
//! for patterns, enforces timeouts, and yields a `CommandResult` —
//! optionally asynchronously via a `Promise`.

pub mod decoder;
mod interrupt;
pub mod local;
pub mod promise;
pub mod runner;
pub mod spawn;
pub mod terminal;
pub mod worker;

pub use local::Local;
pub use promise::Promise;
pub use runner::{ErrSink, OutSink, RunOutcome, Runner, Sinks};
pub use spawn::pipe::PipeBackend;
pub use spawn::pty::PtyBackend;
pub use spawn::{ExitStatus, SpawnBackend, StartSpec};
