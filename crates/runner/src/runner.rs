//! The orchestrator: validate → echo → start → launch workers → timer →
//! wait → join → stop → decide outcome. Built on plain OS threads rather
//! than an async runtime — one worker per stream, coordinated through a
//! shared mutex rather than a `select!` loop.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use runner_core::{
    CommandResult, HideStream, RunOpts, RunnerError, StreamWatcher, WatcherError, WorkerFailure,
    WorkerKind,
};

use crate::decoder::IncrementalDecoder;
use crate::spawn::{SpawnBackend, StartSpec};
use crate::terminal::Terminal;
use crate::worker::{new_failure_sink, FailureSink, Worker};

const INPUT_SLEEP: Duration = Duration::from_millis(10);
const READ_CHUNK_SIZE: usize = 4096;

/// Where the user-visible copy of a stream goes. `Default` means "the
/// process's own stdout/stderr"; an overridden sink always receives output
/// even when the stream is nominally hidden.
pub enum OutSink {
    Default,
    Overridden(Box<dyn Write + Send>),
}

impl OutSink {
    fn write_all(&mut self, text: &str) {
        match self {
            OutSink::Default => {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            OutSink::Overridden(w) => {
                let _ = w.write_all(text.as_bytes());
                let _ = w.flush();
            }
        }
    }

    fn is_overridden(&self) -> bool {
        matches!(self, OutSink::Overridden(_))
    }
}

pub enum ErrSink {
    Default,
    Overridden(Box<dyn Write + Send>),
}

impl ErrSink {
    fn write_all(&mut self, text: &str) {
        match self {
            ErrSink::Default => {
                eprint!("{text}");
                let _ = std::io::stderr().flush();
            }
            ErrSink::Overridden(w) => {
                let _ = w.write_all(text.as_bytes());
                let _ = w.flush();
            }
        }
    }

    fn is_overridden(&self) -> bool {
        matches!(self, ErrSink::Overridden(_))
    }
}

/// Caller-facing I/O collaborators for one run. `in_stream: None` models
/// "read the process's real stdin"; `Some` is an explicit override (never a
/// tty, so the stdin pump always falls back to one-byte reads for it).
pub struct Sinks {
    pub out: OutSink,
    pub err: ErrSink,
    pub in_stream: Option<Box<dyn Read + Send>>,
}

impl Default for Sinks {
    fn default() -> Self {
        Self {
            out: OutSink::Default,
            err: ErrSink::Default,
            in_stream: None,
        }
    }
}

/// A single one-shot delayed callback thread.
struct Timer {
    cancel: Arc<AtomicBool>,
    fired: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Timer {
    fn start(seconds: u64, on_fire: impl FnOnce() + Send + 'static) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let fired = Arc::new(AtomicBool::new(false));
        let cancel_clone = Arc::clone(&cancel);
        let fired_clone = Arc::clone(&fired);
        let handle = std::thread::Builder::new()
            .name("runner-timer".to_string())
            .spawn(move || {
                let deadline = Duration::from_secs(seconds);
                let poll = Duration::from_millis(50);
                let mut waited = Duration::ZERO;
                while waited < deadline {
                    if cancel_clone.load(Ordering::Relaxed) {
                        return;
                    }
                    std::thread::sleep(poll);
                    waited += poll;
                }
                if !cancel_clone.load(Ordering::Relaxed) {
                    fired_clone.store(true, Ordering::Relaxed);
                    on_fire();
                }
            })
            .expect("failed to spawn timer thread");
        Self {
            cancel,
            fired,
            handle: Some(handle),
        }
    }

    /// Cancel the timer unconditionally; safe to call whether or not it
    /// already fired.
    fn cancel_and_join(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn timed_out(&self) -> bool {
        self.fired.load(Ordering::Relaxed)
    }
}

/// Outcome of calling [`Runner::run`]: either a finished result, a handle to
/// join later, or nothing at all when the caller disowned the process.
pub enum RunOutcome {
    Done(CommandResult),
    Async(crate::promise::Promise),
    Disowned,
}

impl std::fmt::Debug for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Done(result) => f.debug_tuple("Done").field(result).finish(),
            RunOutcome::Async(_) => f.debug_tuple("Async").finish(),
            RunOutcome::Disowned => write!(f, "Disowned"),
        }
    }
}

/// State shared across the stdout/stderr/stdin worker threads and the main
/// orchestrator thread for one invocation.
pub(crate) struct SharedRun {
    pub(crate) backend: Arc<Mutex<Box<dyn SpawnBackend>>>,
    pub(crate) command: String,
    pub(crate) opts: RunOpts,
    pub(crate) out_capture: Arc<Mutex<String>>,
    pub(crate) err_capture: Arc<Mutex<String>>,
    pub(crate) watcher_failure: Arc<Mutex<Option<WatcherError>>>,
    pub(crate) failure_sink: FailureSink,
    timer: Option<Timer>,
    workers: Vec<Worker>,
    cbreak_guard: Option<crate::terminal::CbreakGuard>,
}

impl SharedRun {
    fn is_pty(&self) -> bool {
        self.backend.lock().unwrap_or_else(|e| e.into_inner()).is_pty()
    }

    /// Wait for the child, join every worker thread, stop the backend, and
    /// decide the final outcome — always, even on a timeout or failure.
    pub(crate) fn join(mut self) -> Result<CommandResult, RunnerError> {
        crate::interrupt::arm(&self.backend);
        let wait_result = self
            .backend
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .wait();
        crate::interrupt::disarm();

        for worker in &mut self.workers {
            worker.join();
        }

        if let Some(timer) = self.timer.as_mut() {
            timer.cancel_and_join();
        }
        self.backend.lock().unwrap_or_else(|e| e.into_inner()).stop();
        if let Some(guard) = self.cbreak_guard.take() {
            guard.restore();
        }

        let timed_out = self.timer.as_ref().is_some_and(Timer::timed_out);
        let failures = std::mem::take(&mut *self.failure_sink.lock().unwrap_or_else(|e| e.into_inner()));
        let watcher_err = self.watcher_failure.lock().unwrap_or_else(|e| e.into_inner()).take();

        let exited = match wait_result {
            Ok(status) if watcher_err.is_none() => Some(status.0),
            _ => None,
        };

        let result = CommandResult {
            command: self.command.clone(),
            shell: self.opts.shell.clone(),
            env: self.opts.env.clone(),
            stdout: std::mem::take(&mut *self.out_capture.lock().unwrap_or_else(|e| e.into_inner())),
            stderr: std::mem::take(&mut *self.err_capture.lock().unwrap_or_else(|e| e.into_inner())),
            exited,
            pty: self.is_pty(),
            hide: self.opts.hide,
            encoding: self.opts.encoding.clone().unwrap_or_else(|| "utf-8".to_string()),
        };

        if !failures.is_empty() {
            warn!(count = failures.len(), "worker thread(s) raised during run");
            return Err(RunnerError::thread_exception(failures));
        }
        if timed_out {
            let timeout = self.opts.timeout.unwrap_or(0);
            return Err(RunnerError::timed_out(timeout, result));
        }
        if let Some(reason) = watcher_err {
            return Err(RunnerError::watcher_failed(result, reason));
        }
        if !result.ok() {
            if self.opts.warn {
                return Ok(result);
            }
            return Err(RunnerError::unexpected_exit(result));
        }
        Ok(result)
    }
}

pub struct Runner<B: SpawnBackend + 'static> {
    backend: B,
}

impl<B: SpawnBackend + 'static> Runner<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn run(
        self,
        command: &str,
        mut opts: RunOpts,
        watchers: Vec<Box<dyn StreamWatcher>>,
        mut sinks: Sinks,
    ) -> Result<RunOutcome, RunnerError> {
        if opts.dry {
            opts.echo = true;
        }

        if opts.echo && !opts.hide.hides_stdout() {
            let rendered = opts.echo_format.replace("{command}", command);
            sinks.out.write_all(&rendered);
            sinks.out.write_all("\n");
        }

        if opts.dry {
            debug!(command, "dry run, skipping spawn");
            return Ok(RunOutcome::Done(CommandResult {
                command: command.to_string(),
                shell: opts.shell.clone(),
                env: opts.env.clone(),
                stdout: String::new(),
                stderr: String::new(),
                exited: Some(0),
                pty: false,
                hide: opts.hide,
                encoding: opts.encoding.unwrap_or_else(|| "utf-8".to_string()),
            }));
        }

        if opts.asynchronous {
            opts.hide = HideStream::Both;
            opts.in_stream = false;
        }

        let mut backend: Box<dyn SpawnBackend> = Box::new(self.backend);
        debug!(command, shell = %opts.shell, pty = backend.is_pty(), "starting command");
        backend
            .start(StartSpec {
                command,
                shell: &opts.shell,
                env: &opts.env,
                replace_env: opts.replace_env,
            })
            .map_err(RunnerError::from)?;

        if opts.disown {
            debug!(command, "disowned, returning without waiting");
            return Ok(RunOutcome::Disowned);
        }

        let is_pty = backend.is_pty();
        let backend = Arc::new(Mutex::new(backend));

        let cbreak_guard = if opts.in_stream && sinks.in_stream.is_none() {
            Terminal::set_cbreak(libc::STDIN_FILENO)
        } else {
            None
        };

        let mut shared = SharedRun {
            backend: Arc::clone(&backend),
            command: command.to_string(),
            opts: opts.clone(),
            out_capture: Arc::new(Mutex::new(String::new())),
            err_capture: Arc::new(Mutex::new(String::new())),
            watcher_failure: Arc::new(Mutex::new(None)),
            failure_sink: new_failure_sink(),
            timer: None,
            workers: Vec::new(),
            cbreak_guard,
        };

        launch_workers(&mut shared, watchers, sinks, is_pty, &opts);

        if let Some(timeout) = opts.timeout {
            let backend_for_timer = Arc::clone(&backend);
            shared.timer = Some(Timer::start(timeout, move || {
                warn!(timeout, "command timed out, killing child");
                backend_for_timer.lock().unwrap_or_else(|e| e.into_inner()).kill();
            }));
        }

        if opts.asynchronous {
            return Ok(RunOutcome::Async(crate::promise::Promise::new(
                command.to_string(),
                is_pty,
                opts.encoding.clone().unwrap_or_else(|| "utf-8".to_string()),
                opts.shell.clone(),
                shared,
            )));
        }

        shared.join().map(RunOutcome::Done)
    }
}

fn launch_workers(
    shared: &mut SharedRun,
    watchers: Vec<Box<dyn StreamWatcher>>,
    sinks: Sinks,
    is_pty: bool,
    opts: &RunOpts,
) {
    let watchers = Arc::new(Mutex::new(watchers));

    // stdout pump
    {
        let backend = Arc::clone(&shared.backend);
        let capture = Arc::clone(&shared.out_capture);
        let watcher_failure = Arc::clone(&shared.watcher_failure);
        let watchers = Arc::clone(&watchers);
        let mut sink = sinks.out;
        let hide_stdout = opts.hide.hides_stdout();
        shared.workers.push(Worker::spawn(
            WorkerKind::Stdout,
            Arc::clone(&shared.failure_sink),
            {
                let failure_sink = Arc::clone(&shared.failure_sink);
                move || {
                    pump_stream(
                        &backend,
                        &capture,
                        &watcher_failure,
                        &watchers,
                        &failure_sink,
                        move |text| {
                            if !hide_stdout || sink.is_overridden() {
                                sink.write_all(text);
                            }
                        },
                        WorkerKind::Stdout,
                    );
                }
            },
        ));
    }

    // stderr pump (never started for pty: stderr is merged into stdout)
    if !is_pty {
        let backend = Arc::clone(&shared.backend);
        let capture = Arc::clone(&shared.err_capture);
        let watcher_failure = Arc::clone(&shared.watcher_failure);
        let watchers = Arc::clone(&watchers);
        let mut sink = sinks.err;
        let hide_stderr = opts.hide.hides_stderr();
        shared.workers.push(Worker::spawn(
            WorkerKind::Stderr,
            Arc::clone(&shared.failure_sink),
            {
                let failure_sink = Arc::clone(&shared.failure_sink);
                move || {
                    pump_stream(
                        &backend,
                        &capture,
                        &watcher_failure,
                        &watchers,
                        &failure_sink,
                        move |text| {
                            if !hide_stderr || sink.is_overridden() {
                                sink.write_all(text);
                            }
                        },
                        WorkerKind::Stderr,
                    );
                }
            },
        ));
    }

    // stdin pump: mirrors real stdin into the child and echoes it back out
    if opts.in_stream {
        let backend = Arc::clone(&shared.backend);
        let reader = sinks.in_stream;
        let mirror = should_echo_stdin(opts, reader.is_none(), is_pty);
        let failure_sink = Arc::clone(&shared.failure_sink);
        shared.workers.push(Worker::spawn(
            WorkerKind::Stdin,
            Arc::clone(&shared.failure_sink),
            move || pump_stdin(&backend, reader, mirror, is_pty, &failure_sink),
        ));
    }
}

fn pump_stream(
    backend: &Arc<Mutex<Box<dyn SpawnBackend>>>,
    capture: &Arc<Mutex<String>>,
    watcher_failure: &Arc<Mutex<Option<WatcherError>>>,
    watchers: &Arc<Mutex<Vec<Box<dyn StreamWatcher>>>>,
    failure_sink: &FailureSink,
    mut emit: impl FnMut(&str),
    kind: WorkerKind,
) {
    let mut decoder = IncrementalDecoder::new();
    loop {
        let read = {
            let mut guard = backend.lock().unwrap_or_else(|e| e.into_inner());
            match kind {
                WorkerKind::Stdout => guard.read_out(READ_CHUNK_SIZE),
                WorkerKind::Stderr => guard.read_err(READ_CHUNK_SIZE),
                WorkerKind::Stdin => unreachable!("pump_stream is never used for stdin"),
            }
        };
        match read {
            Ok(bytes) if bytes.is_empty() => break,
            Ok(bytes) => {
                let text = decoder.decode(&bytes);
                if !text.is_empty() {
                    let snapshot = {
                        let mut guard = capture.lock().unwrap_or_else(|e| e.into_inner());
                        guard.push_str(&text);
                        guard.clone()
                    };
                    emit(&text);

                    let mut responses = Vec::new();
                    {
                        let mut guard = watchers.lock().unwrap_or_else(|e| e.into_inner());
                        for watcher in guard.iter_mut() {
                            match watcher.submit(&snapshot) {
                                Ok(rs) => responses.extend(rs),
                                Err(e) => {
                                    *watcher_failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(e);
                                }
                            }
                        }
                    }
                    if watcher_failure.lock().unwrap_or_else(|e| e.into_inner()).is_some() {
                        return;
                    }
                    for response in responses {
                        let mut guard = backend.lock().unwrap_or_else(|e| e.into_inner());
                        let _ = guard.write_in(response.as_bytes());
                    }
                }
            }
            Err(e) if e.raw_os_error() == Some(libc::EBADF) => break,
            Err(e) => {
                failure_sink
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(WorkerFailure {
                        worker: kind,
                        message: e.to_string(),
                    });
                return;
            }
        }
        std::thread::sleep(INPUT_SLEEP);
    }
    let tail = decoder.finish();
    if !tail.is_empty() {
        capture.lock().unwrap_or_else(|e| e.into_inner()).push_str(&tail);
        emit(&tail);
    }
}

/// Decides whether keystrokes read from stdin should also be echoed to the
/// terminal, applying the tri-state `echo_stdin` override on top of the
/// default "only echo real, non-pty stdin" rule.
fn should_echo_stdin(opts: &RunOpts, reads_real_stdin: bool, pty: bool) -> bool {
    if let Some(forced) = opts.echo_stdin {
        return forced;
    }
    if !reads_real_stdin {
        return false;
    }
    Terminal::is_tty(libc::STDIN_FILENO) && Terminal::is_tty(libc::STDOUT_FILENO) && !pty
}

/// Result of one stdin read attempt. `Eof` covers both a genuine zero-byte
/// read and `EBADF` (the fd was closed out from under us, e.g. stdin
/// redirected from `/dev/null` or closed by the parent) — both mean "stop
/// pumping", not "something went wrong". Any other `Err` is a real failure.
enum ReadOutcome {
    Data(Vec<u8>),
    Eof,
    Err(io::Error),
}

fn pump_stdin(
    backend: &Arc<Mutex<Box<dyn SpawnBackend>>>,
    mut reader: Option<Box<dyn Read + Send>>,
    mirror: bool,
    pty: bool,
    failure_sink: &FailureSink,
) {
    loop {
        let outcome = match reader.as_mut() {
            Some(r) => read_one_byte(r.as_mut()),
            None => {
                let real_tty =
                    Terminal::is_tty(libc::STDIN_FILENO) && Terminal::is_foreground(libc::STDIN_FILENO);
                if real_tty {
                    let n = Terminal::available_bytes(libc::STDIN_FILENO).max(1);
                    read_n_from_stdin(n)
                } else {
                    read_one_byte_from_stdin()
                }
            }
        };

        let bytes = match outcome {
            ReadOutcome::Data(bytes) => bytes,
            ReadOutcome::Eof => {
                if !pty {
                    let mut guard = backend.lock().unwrap_or_else(|e| e.into_inner());
                    let _ = guard.close_in();
                }
                return;
            }
            ReadOutcome::Err(e) => {
                failure_sink
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(WorkerFailure {
                        worker: WorkerKind::Stdin,
                        message: e.to_string(),
                    });
                return;
            }
        };

        {
            let mut guard = backend.lock().unwrap_or_else(|e| e.into_inner());
            if guard.write_in(&bytes).is_err() {
                return;
            }
        }
        if mirror {
            print!("{}", String::from_utf8_lossy(&bytes));
            let _ = std::io::stdout().flush();
        }
        std::thread::sleep(INPUT_SLEEP);
    }
}

fn read_one_byte(reader: &mut dyn Read) -> ReadOutcome {
    let mut buf = [0u8; 1];
    match reader.read(&mut buf) {
        Ok(0) => ReadOutcome::Eof,
        Ok(_) => ReadOutcome::Data(buf.to_vec()),
        Err(e) if e.raw_os_error() == Some(libc::EBADF) => ReadOutcome::Eof,
        Err(e) => ReadOutcome::Err(e),
    }
}

fn read_one_byte_from_stdin() -> ReadOutcome {
    read_one_byte(&mut std::io::stdin())
}

fn read_n_from_stdin(n: usize) -> ReadOutcome {
    let mut buf = vec![0u8; n];
    match std::io::stdin().read(&mut buf) {
        Ok(0) => ReadOutcome::Eof,
        Ok(read) => {
            buf.truncate(read);
            ReadOutcome::Data(buf)
        }
        Err(e) if e.raw_os_error() == Some(libc::EBADF) => ReadOutcome::Eof,
        Err(e) => ReadOutcome::Err(e),
    }
}
