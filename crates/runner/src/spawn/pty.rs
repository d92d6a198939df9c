//! PTY-fork spawn backend: one combined read/write fd, child attached to a
//! slave pty as its controlling terminal.
//!
//! `openpty` + `dup` the slave three ways + `setsid`/`TIOCSCTTY` in
//! `pre_exec`, forking the resolved shell running an arbitrary command
//! line.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};

use nix::pty::{openpty, Winsize};
use nix::unistd::{dup, setsid};

use super::{ExitStatus, SpawnBackend, StartSpec};
use crate::terminal::Terminal;

pub struct PtyBackend {
    child: Option<Child>,
    master: Option<File>,
}

impl PtyBackend {
    pub fn new() -> Self {
        Self {
            child: None,
            master: None,
        }
    }
}

impl Default for PtyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SpawnBackend for PtyBackend {
    fn start(&mut self, spec: StartSpec<'_>) -> io::Result<()> {
        let (rows, cols) = Terminal::window_size(libc::STDIN_FILENO);
        let pty = openpty(
            Some(&Winsize {
                ws_row: rows,
                ws_col: cols,
                ws_xpixel: 0,
                ws_ypixel: 0,
            }),
            None,
        )
        .map_err(nix_to_io)?;

        let slave_fd_raw = pty.slave.as_raw_fd();
        let stdin_fd = dup(slave_fd_raw).map_err(nix_to_io)?;
        let stdout_fd = dup(slave_fd_raw).map_err(nix_to_io)?;
        let stderr_fd = dup(slave_fd_raw).map_err(nix_to_io)?;

        let mut cmd = Command::new(spec.shell);
        cmd.arg("-c").arg(spec.command);
        if spec.replace_env {
            cmd.env_clear();
        }
        cmd.envs(spec.env.iter());
        cmd.stdin(Stdio::from(File::from(raw_fd_to_owned(stdin_fd))))
            .stdout(Stdio::from(File::from(raw_fd_to_owned(stdout_fd))))
            .stderr(Stdio::from(File::from(raw_fd_to_owned(stderr_fd))));

        // SAFETY: `pre_exec` runs in the forked child before `exec`; only
        // async-signal-safe calls (`setsid`, `ioctl(TIOCSCTTY)`) are made.
        unsafe {
            cmd.pre_exec(move || {
                setsid().map_err(nix_to_io)?;
                let rc = libc::ioctl(slave_fd_raw, libc::TIOCSCTTY as _, 0);
                if rc == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = cmd.spawn()?;
        drop(pty.slave);
        self.master = Some(File::from(pty.master));
        self.child = Some(child);
        Ok(())
    }

    fn read_out(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let Some(master) = self.master.as_mut() else {
            return Ok(Vec::new());
        };
        let mut buf = vec![0u8; n.max(1)];
        match master.read(&mut buf) {
            Ok(read) => {
                buf.truncate(read);
                Ok(buf)
            }
            // A pty master read fails with EIO once the slave side has no
            // more writers; this is EOF, not a real error.
            Err(e) if e.raw_os_error() == Some(libc::EIO) => Ok(Vec::new()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn read_err(&mut self, _n: usize) -> io::Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn write_in(&mut self, bytes: &[u8]) -> io::Result<()> {
        let Some(master) = self.master.as_mut() else {
            return Ok(());
        };
        master.write_all(bytes)
    }

    fn close_in(&mut self) -> io::Result<()> {
        Err(io::Error::other(
            "cannot close stdin of a PTY-driven process",
        ))
    }

    fn wait(&mut self) -> io::Result<ExitStatus> {
        let Some(child) = self.child.as_mut() else {
            return Ok(ExitStatus(0));
        };
        let status = child.wait()?;
        Ok(decode_exit(status))
    }

    fn kill(&mut self) {
        if let Some(child) = &self.child {
            let pid = child.id() as i32;
            if pid > 0 {
                // SAFETY: kill(2) with a negative pid targets the process
                // group; async-signal-safe, no shared state touched.
                unsafe {
                    libc::kill(-pid, libc::SIGKILL);
                }
            }
        }
    }

    fn stop(&mut self) {
        // Close the master fd by dropping it; tolerate any error implicitly
        // (File's Drop never panics on close failure).
        self.master.take();
        if let Some(child) = self.child.as_mut() {
            let _ = child.wait();
        }
    }

    fn window_size(&self) -> (u16, u16) {
        self.master
            .as_ref()
            .map(|m| Terminal::window_size(m.as_raw_fd()))
            .unwrap_or((24, 80))
    }

    fn is_pty(&self) -> bool {
        true
    }
}

fn decode_exit(status: std::process::ExitStatus) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => ExitStatus::from_exited(code),
        None => ExitStatus::from_signaled(status.signal().unwrap_or(0)),
    }
}

fn nix_to_io(errno: nix::errno::Errno) -> io::Error {
    io::Error::from_raw_os_error(errno as i32)
}

fn raw_fd_to_owned(raw_fd: i32) -> OwnedFd {
    // SAFETY: `raw_fd` comes from a successful `dup(2)` and is not owned
    // elsewhere.
    unsafe { OwnedFd::from_raw_fd(raw_fd) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn runs_a_command_and_captures_exit_code() {
        let mut backend = PtyBackend::new();
        let env = BTreeMap::new();
        backend
            .start(StartSpec {
                command: "exit 7",
                shell: "bash",
                env: &env,
                replace_env: false,
            })
            .unwrap();

        let mut out = Vec::new();
        loop {
            let chunk = backend.read_out(4096).unwrap();
            if chunk.is_empty() {
                break;
            }
            out.extend_from_slice(&chunk);
        }
        let status = backend.wait().unwrap();
        backend.stop();
        assert_eq!(status.0, 7);
    }

    #[test]
    fn close_in_always_errors_on_pty() {
        let mut backend = PtyBackend::new();
        assert!(backend.close_in().is_err());
    }

    #[test]
    fn read_err_is_always_empty() {
        let mut backend = PtyBackend::new();
        assert!(backend.read_err(16).unwrap().is_empty());
    }
}
