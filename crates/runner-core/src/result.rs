use std::collections::BTreeMap;
use std::fmt;

use crate::opts::HideStream;

/// Outcome of a completed (or aborted) command invocation.
///
/// Named `CommandResult` rather than `Result` to avoid shadowing
/// `std::result::Result` at every call site; the type this corresponds to in
/// the originating design is called `Result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub command: String,
    pub shell: String,
    pub env: BTreeMap<String, String>,
    pub stdout: String,
    pub stderr: String,
    /// Absent if the command was aborted (e.g. by a watcher error) before exit.
    pub exited: Option<i32>,
    pub pty: bool,
    pub hide: HideStream,
    pub encoding: String,
}

impl CommandResult {
    pub fn ok(&self) -> bool {
        self.exited == Some(0)
    }

    pub fn failed(&self) -> bool {
        !self.ok()
    }

    /// `<CommandResult cmd='<cmd>' exited=<n>>`-style rendering for diagnostics.
    pub fn repr(&self) -> String {
        format!(
            "<CommandResult cmd='{}' exited={}>",
            self.command,
            fmt_exited(self.exited)
        )
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exited {
            Some(code) => write!(f, "Command exited with status {code}."),
            None => write!(f, "Command was not fully executed due to watcher error."),
        }
    }
}

pub(crate) fn fmt_exited(exited: Option<i32>) -> String {
    match exited {
        Some(code) => code.to_string(),
        None => "None".to_string(),
    }
}

/// Returns two leading blank lines followed by the last `count` lines of
/// `stream`, with no trailing newline. Used to render the tail of a hidden
/// stream inside failure messages.
pub fn tail(stream: &str, count: usize) -> String {
    let lines: Vec<&str> = stream.lines().collect();
    let start = lines.len().saturating_sub(count);
    let mut out = String::from("\n\n");
    out.push_str(&lines[start..].join("\n"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(exited: Option<i32>) -> CommandResult {
        CommandResult {
            command: "echo hi".into(),
            shell: "bash".into(),
            env: BTreeMap::new(),
            stdout: "hi\n".into(),
            stderr: String::new(),
            exited,
            pty: false,
            hide: HideStream::None,
            encoding: "utf-8".into(),
        }
    }

    #[test]
    fn ok_iff_exit_zero() {
        assert!(sample(Some(0)).ok());
        assert!(!sample(Some(0)).failed());
        assert!(!sample(Some(1)).ok());
        assert!(sample(Some(1)).failed());
        assert!(sample(None).failed());
    }

    #[test]
    fn repr_matches_expected_format() {
        assert_eq!(sample(Some(1)).repr(), "<CommandResult cmd='echo hi' exited=1>");
        assert_eq!(sample(None).repr(), "<CommandResult cmd='echo hi' exited=None>");
    }

    #[test]
    fn display_distinguishes_aborted_from_exited() {
        assert_eq!(sample(Some(0)).to_string(), "Command exited with status 0.");
        assert_eq!(
            sample(None).to_string(),
            "Command was not fully executed due to watcher error."
        );
    }

    #[test]
    fn tail_returns_last_n_lines_with_two_leading_blanks_no_trailing_newline() {
        let stream = (1..=15).map(|n| format!("line{n}")).collect::<Vec<_>>().join("\n");
        let result = tail(&stream, 10);
        assert!(result.starts_with("\n\n"));
        assert!(!result.ends_with('\n'));
        let expected_body = (6..=15).map(|n| format!("line{n}")).collect::<Vec<_>>().join("\n");
        assert_eq!(result, format!("\n\n{expected_body}"));
    }

    #[test]
    fn tail_handles_fewer_lines_than_count() {
        let result = tail("only one line", 10);
        assert_eq!(result, "\n\nonly one line");
    }
}
