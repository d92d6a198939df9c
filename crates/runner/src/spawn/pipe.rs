//! Pipe spawn backend: three ordinary pipes, the child detached into its
//! own process group via `setsid` in `pre_exec`. Built on `std::process`
//! rather than an async runtime — this engine pumps streams with plain
//! OS threads (see `runner::runner`).

use std::io::{self, Read, Write};
use std::os::unix::process::CommandExt;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use super::{ExitStatus, SpawnBackend, StartSpec};

pub struct PipeBackend {
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr: Option<std::process::ChildStderr>,
    stdin: Option<ChildStdin>,
}

impl PipeBackend {
    pub fn new() -> Self {
        Self {
            child: None,
            stdout: None,
            stderr: None,
            stdin: None,
        }
    }
}

impl Default for PipeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SpawnBackend for PipeBackend {
    fn start(&mut self, spec: StartSpec<'_>) -> io::Result<()> {
        let mut cmd = Command::new(spec.shell);
        cmd.arg("-c").arg(spec.command);
        if spec.replace_env {
            cmd.env_clear();
        }
        cmd.envs(spec.env.iter());
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // SAFETY: setsid() is async-signal-safe and runs before exec.
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let mut child = cmd.spawn()?;
        self.stdout = child.stdout.take();
        self.stderr = child.stderr.take();
        self.stdin = child.stdin.take();
        self.child = Some(child);
        Ok(())
    }

    fn read_out(&mut self, n: usize) -> io::Result<Vec<u8>> {
        read_available(&mut self.stdout, n)
    }

    fn read_err(&mut self, n: usize) -> io::Result<Vec<u8>> {
        read_available(&mut self.stderr, n)
    }

    fn write_in(&mut self, bytes: &[u8]) -> io::Result<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Ok(());
        };
        stdin.write_all(bytes)
    }

    fn close_in(&mut self) -> io::Result<()> {
        self.stdin.take();
        Ok(())
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
                // SAFETY: kill(2) with negative pid targets the process
                // group this child was placed into via setsid().
                unsafe {
                    libc::kill(-pid, libc::SIGKILL);
                }
            }
        }
    }

    fn stop(&mut self) {
        self.stdin.take();
        self.stdout.take();
        self.stderr.take();
        if let Some(child) = self.child.as_mut() {
            let _ = child.wait();
        }
    }

    fn window_size(&self) -> (u16, u16) {
        (24, 80)
    }

    fn is_pty(&self) -> bool {
        false
    }
}

fn read_available<R: Read>(stream: &mut Option<R>, n: usize) -> io::Result<Vec<u8>> {
    let Some(reader) = stream.as_mut() else {
        return Ok(Vec::new());
    };
    let mut buf = vec![0u8; n.max(1)];
    let read = reader.read(&mut buf)?;
    buf.truncate(read);
    Ok(buf)
}

fn decode_exit(status: std::process::ExitStatus) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => ExitStatus::from_exited(code),
        None => ExitStatus::from_signaled(status.signal().unwrap_or(0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn runs_a_command_and_captures_stdout() {
        let mut backend = PipeBackend::new();
        let env = BTreeMap::new();
        backend
            .start(StartSpec {
                command: "echo hi",
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
        assert_eq!(String::from_utf8(out).unwrap(), "hi\n");
        assert_eq!(status.0, 0);
    }

    #[test]
    fn nonzero_exit_is_captured() {
        let mut backend = PipeBackend::new();
        let env = BTreeMap::new();
        backend
            .start(StartSpec {
                command: "exit 3",
                shell: "bash",
                env: &env,
                replace_env: false,
            })
            .unwrap();
        while !backend.read_out(4096).unwrap().is_empty() {}
        let status = backend.wait().unwrap();
        backend.stop();
        assert_eq!(status.0, 3);
    }

    #[test]
    fn close_in_is_idempotent() {
        let mut backend = PipeBackend::new();
        backend.close_in().unwrap();
        backend.close_in().unwrap();
    }
}
