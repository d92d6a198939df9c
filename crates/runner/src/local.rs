//! Binds the generic `Runner` to this host's two spawn backends, deciding
//! pty vs. pipe (and the pty-unavailable fallback) behind one entry point.

use runner_core::{PartialRunOpts, RunOpts, RunnerConfig, RunnerError, StreamWatcher};

use crate::runner::{RunOutcome, Runner, Sinks};
use crate::spawn::pipe::PipeBackend;
use crate::spawn::pty::PtyBackend;
use crate::terminal::Terminal;

pub struct Local;

impl Local {
    /// Resolve `explicit` against `config`, pick a backend, and run
    /// `command` to completion (or hand back a `Promise`, for asynchronous
    /// runs).
    pub fn run(
        command: &str,
        explicit: PartialRunOpts,
        config: &RunnerConfig,
        watchers: Vec<Box<dyn StreamWatcher>>,
        sinks: Sinks,
    ) -> Result<RunOutcome, RunnerError> {
        let mut opts = RunOpts::resolve(explicit, config)?;

        if opts.pty && !Terminal::is_tty(libc::STDIN_FILENO) {
            if opts.fallback {
                opts.pty = false;
            }
            // else: caller asked for a pty without a fallback; proceed anyway
            // and let the pty backend surface whatever error results.
        }

        if opts.pty {
            Runner::new(PtyBackend::new()).run(command, opts, watchers, sinks)
        } else {
            Runner::new(PipeBackend::new()).run(command, opts, watchers, sinks)
        }
    }
}
