//! Controlling-TTY introspection and cbreak mode, hand-rolled via `nix`
//! and `libc` directly rather than a higher-level terminal crate.

use std::os::unix::io::RawFd;
use std::sync::Mutex;

use nix::sys::termios::{self, SetArg, Termios};
use nix::unistd::{isatty, tcgetpgrp};

/// Serializes terminal-attribute save/restore across concurrent runners on
/// the same TTY.
static TERMINAL_LOCK: Mutex<()> = Mutex::new(());

/// Saved terminal state, restored exactly once on every exit path.
pub struct CbreakGuard {
    fd: RawFd,
    saved: Termios,
}

impl CbreakGuard {
    pub fn restore(self) {
        let _lock = TERMINAL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _ = termios::tcsetattr(unsafe { borrow_fd(self.fd) }, SetArg::TCSADRAIN, &self.saved);
    }
}

/// Host-TTY capability used by the orchestrator around `start`/`stop`.
pub struct Terminal;

impl Terminal {
    pub fn is_tty(fd: RawFd) -> bool {
        isatty(fd).unwrap_or(false)
    }

    /// True iff `fd`'s owning process group is the controlling terminal's
    /// foreground process group.
    pub fn is_foreground(fd: RawFd) -> bool {
        let Ok(tty_pgrp) = tcgetpgrp(unsafe { borrow_fd(fd) }) else {
            return false;
        };
        tty_pgrp == nix::unistd::getpgrp()
    }

    /// Bytes currently available to read on `fd` via `FIONREAD`.
    pub fn available_bytes(fd: RawFd) -> usize {
        let mut n: libc::c_int = 0;
        let rc = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut n as *mut libc::c_int) };
        if rc == -1 { 0 } else { n.max(0) as usize }
    }

    /// Rows/cols of the controlling terminal, falling back to a sane
    /// default when not attached to one (e.g. in tests or CI).
    pub fn window_size(fd: RawFd) -> (u16, u16) {
        let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut ws as *mut libc::winsize) };
        if rc == -1 || ws.ws_row == 0 || ws.ws_col == 0 {
            (24, 80)
        } else {
            (ws.ws_row, ws.ws_col)
        }
    }

    /// True iff `termios` already looks cbreak-like: no echo/canonical
    /// processing and one-byte/no-timeout reads.
    fn looks_already_cbreak(attrs: &Termios) -> bool {
        use nix::sys::termios::LocalFlags;
        let echo_icanon_off = !attrs
            .local_flags
            .intersects(LocalFlags::ECHO | LocalFlags::ICANON);
        let vmin = attrs.control_chars[nix::sys::termios::SpecialCharacterIndices::VMIN as usize];
        let vtime = attrs.control_chars[nix::sys::termios::SpecialCharacterIndices::VTIME as usize];
        echo_icanon_off && vmin == 1 && vtime == 0
    }

    /// Put `fd` into cbreak mode if it is a foregrounded controlling TTY and
    /// is not already cbreak-like; returns the guard to restore it, or
    /// `None` if nothing needed doing.
    pub fn set_cbreak(fd: RawFd) -> Option<CbreakGuard> {
        if !Self::is_tty(fd) || !Self::is_foreground(fd) {
            return None;
        }
        let borrowed = unsafe { borrow_fd(fd) };
        let saved = termios::tcgetattr(borrowed).ok()?;
        if Self::looks_already_cbreak(&saved) {
            return None;
        }
        let mut cbreak = saved.clone();
        termios::cfmakeraw(&mut cbreak);
        cbreak.control_chars[nix::sys::termios::SpecialCharacterIndices::VMIN as usize] = 1;
        cbreak.control_chars[nix::sys::termios::SpecialCharacterIndices::VTIME as usize] = 0;
        let _lock = TERMINAL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        termios::tcsetattr(borrowed, SetArg::TCSADRAIN, &cbreak).ok()?;
        Some(CbreakGuard { fd, saved })
    }
}

/// `nix`'s termios/tcgetpgrp APIs take a borrowing fd wrapper; process-owned
/// standard descriptors outlive any call made through this helper.
unsafe fn borrow_fd(fd: RawFd) -> std::os::fd::BorrowedFd<'static> {
    unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_bytes_is_zero_on_bad_fd() {
        assert_eq!(Terminal::available_bytes(-1), 0);
    }

    #[test]
    fn window_size_falls_back_when_not_a_tty() {
        let (rows, cols) = Terminal::window_size(-1);
        assert_eq!((rows, cols), (24, 80));
    }

    #[test]
    fn set_cbreak_is_noop_on_non_tty_fd() {
        // /dev/null is never a tty, so this must be a no-op with no guard
        // to restore.
        let file = std::fs::File::open("/dev/null").unwrap();
        use std::os::fd::AsRawFd;
        assert!(Terminal::set_cbreak(file.as_raw_fd()).is_none());
    }
}
