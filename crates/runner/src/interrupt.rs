//! Process-wide SIGINT forwarding: routes a caller's Ctrl-C into the
//! currently-running child's stdin as ETX (`\x03`) rather than letting the
//! default handler kill our own process.
//!
//! Only one OS-level handler can be installed per process, so this keeps a
//! single "currently armed" slot that each run points at itself for the
//! duration of its wait, rather than installing and tearing down a handler
//! per invocation.

use std::sync::{Arc, Mutex, Once, OnceLock};

use crate::spawn::SpawnBackend;

type Target = Arc<Mutex<Box<dyn SpawnBackend>>>;

static INTERRUPT_TARGET: OnceLock<Mutex<Option<Target>>> = OnceLock::new();
static HANDLER_INSTALLED: Once = Once::new();

fn target_slot() -> &'static Mutex<Option<Target>> {
    INTERRUPT_TARGET.get_or_init(|| Mutex::new(None))
}

/// Forward a SIGINT to whichever backend is currently armed, if any. Split
/// out from handler registration so it can be driven directly in tests
/// without raising a real signal.
fn forward() {
    if let Some(backend) = target_slot().lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
        backend.lock().unwrap_or_else(|e| e.into_inner()).send_interrupt();
    }
}

/// Point the process-wide SIGINT handler at `backend`, installing the
/// handler itself on first use.
pub(crate) fn arm(backend: &Target) {
    HANDLER_INSTALLED.call_once(|| {
        let _ = ctrlc::set_handler(forward);
    });
    *target_slot().lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(backend));
}

/// Unarm interrupt forwarding once a run's wait has finished; a SIGINT
/// after this point falls through to whatever the next armed run is, or is
/// dropped on the floor if nothing is running.
pub(crate) fn disarm() {
    *target_slot().lock().unwrap_or_else(|e| e.into_inner()) = None;
}
