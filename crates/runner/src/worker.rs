//! A supervised OS thread whose body never lets a failure escape the thread
//! boundary; failures are recorded for the orchestrator to collect after
//! `join`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use runner_core::{WorkerFailure, WorkerKind};

/// Shared sink every worker appends to; the orchestrator drains it once all
/// workers have joined (single reader, single mutex-guarded list of
/// writers).
pub type FailureSink = Arc<Mutex<Vec<WorkerFailure>>>;

pub fn new_failure_sink() -> FailureSink {
    Arc::new(Mutex::new(Vec::new()))
}

/// A single pump thread (stdout, stderr, or stdin).
pub struct Worker {
    kind: WorkerKind,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn `body` on a dedicated thread named after `kind`. Any panic
    /// raised by `body` is caught and recorded into `sink` rather than
    /// propagated, so one worker's crash never takes down the others or
    /// the thread that joins them.
    pub fn spawn<F>(kind: WorkerKind, sink: FailureSink, body: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = std::thread::Builder::new()
            .name(format!("runner-{kind}"))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(body));
                if let Err(payload) = result {
                    let message = panic_message(&payload);
                    if let Ok(mut guard) = sink.lock() {
                        guard.push(WorkerFailure { worker: kind, message });
                    }
                }
            })
            .expect("failed to spawn worker thread");

        Self {
            kind,
            handle: Some(handle),
        }
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    /// Block until the worker thread exits. A worker's body never panics
    /// past `catch_unwind`, so this only returns an error if the OS thread
    /// itself was poisoned (can't happen with the `catch_unwind` wrapper
    /// above, but `join()`'s signature still reports it).
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_records_panic_into_shared_sink() {
        let sink = new_failure_sink();
        let mut worker = Worker::spawn(WorkerKind::Stdout, Arc::clone(&sink), || {
            panic!("boom");
        });
        worker.join();
        let failures = sink.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].worker, WorkerKind::Stdout);
        assert!(failures[0].message.contains("boom"));
    }

    #[test]
    fn worker_with_no_failure_leaves_sink_empty() {
        let sink = new_failure_sink();
        let mut worker = Worker::spawn(WorkerKind::Stdin, Arc::clone(&sink), || {});
        worker.join();
        assert!(sink.lock().unwrap().is_empty());
    }
}
