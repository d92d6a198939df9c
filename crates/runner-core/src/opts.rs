use std::collections::BTreeMap;

use crate::config::RunnerConfig;
use crate::error::RunnerError;

/// Which output streams are suppressed from the user-visible sink.
///
/// Captured output on `CommandResult` is unaffected by this setting; it only
/// controls what the caller sees live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HideStream {
    #[default]
    None,
    Stdout,
    Stderr,
    Both,
}

impl HideStream {
    pub fn hides_stdout(self) -> bool {
        matches!(self, HideStream::Stdout | HideStream::Both)
    }

    pub fn hides_stderr(self) -> bool {
        matches!(self, HideStream::Stderr | HideStream::Both)
    }
}

/// Raw caller-facing form of the `hide` argument, prior to normalization.
///
/// Mirrors the original's dynamically-typed `hide` kwarg (`True`, `False`,
/// `None`, or one of a handful of strings).
#[derive(Debug, Clone)]
pub enum HideArg {
    Bool(bool),
    Str(String),
    Unset,
}

impl Default for HideArg {
    fn default() -> Self {
        HideArg::Unset
    }
}

/// Normalize a caller-supplied `hide` argument into a concrete `HideStream`.
pub fn normalize_hide(arg: HideArg) -> Result<HideStream, RunnerError> {
    match arg {
        HideArg::Unset => Ok(HideStream::None),
        HideArg::Bool(true) => Ok(HideStream::Both),
        HideArg::Bool(false) => Ok(HideStream::None),
        HideArg::Str(s) => match s.as_str() {
            "both" => Ok(HideStream::Both),
            "out" | "stdout" => Ok(HideStream::Stdout),
            "err" | "stderr" => Ok(HideStream::Stderr),
            other => Err(RunnerError::InvalidArgument(format!(
                "Expected one of 'both', 'out', 'stdout', 'err', 'stderr', true, false or none for 'hide'; got {other:?} instead!"
            ))),
        },
    }
}

/// Fully-resolved, immutable configuration for one `run()` invocation.
#[derive(Debug, Clone)]
pub struct RunOpts {
    pub pty: bool,
    pub fallback: bool,
    pub hide: HideStream,
    pub warn: bool,
    pub echo: bool,
    pub echo_format: String,
    /// `None` = auto-detect via `should_echo_stdin`.
    pub echo_stdin: Option<bool>,
    pub encoding: Option<String>,
    pub env: BTreeMap<String, String>,
    pub replace_env: bool,
    pub shell: String,
    /// `false` disables stdin entirely; `true` reads from the process's real stdin.
    pub in_stream: bool,
    pub timeout: Option<u64>,
    pub asynchronous: bool,
    pub disown: bool,
    pub dry: bool,
}

pub const DEFAULT_ECHO_FORMAT: &str = "\x1b[1;37m{command}\x1b[0m";

#[cfg(target_family = "unix")]
pub const DEFAULT_SHELL: &str = "bash";
#[cfg(not(target_family = "unix"))]
pub const DEFAULT_SHELL: &str = "cmd.exe";

impl Default for RunOpts {
    fn default() -> Self {
        Self {
            pty: false,
            fallback: true,
            hide: HideStream::None,
            warn: false,
            echo: false,
            echo_format: DEFAULT_ECHO_FORMAT.to_string(),
            echo_stdin: None,
            encoding: None,
            env: BTreeMap::new(),
            replace_env: false,
            shell: DEFAULT_SHELL.to_string(),
            in_stream: true,
            timeout: None,
            asynchronous: false,
            disown: false,
            dry: false,
        }
    }
}

/// Caller-supplied overrides; every field left `None` falls through to
/// config, then to the built-in default.
#[derive(Debug, Clone, Default)]
pub struct PartialRunOpts {
    pub pty: Option<bool>,
    pub fallback: Option<bool>,
    pub hide: HideArg,
    pub warn: Option<bool>,
    pub echo: Option<bool>,
    pub echo_format: Option<String>,
    pub echo_stdin: Option<bool>,
    pub encoding: Option<String>,
    pub env: BTreeMap<String, String>,
    pub replace_env: Option<bool>,
    pub shell: Option<String>,
    pub in_stream: Option<bool>,
    pub timeout: Option<u64>,
    pub asynchronous: Option<bool>,
    pub disown: Option<bool>,
    pub dry: Option<bool>,
}

impl RunOpts {
    /// Resolve explicit overrides against config defaults and built-in
    /// defaults (explicit > config > default), validating mutual exclusions.
    pub fn resolve(explicit: PartialRunOpts, config: &RunnerConfig) -> Result<RunOpts, RunnerError> {
        // `asynchronous`/`disown` are not part of the recognized config
        // namespace — explicit-only.
        let asynchronous = explicit.asynchronous.unwrap_or(false);
        let disown = explicit.disown.unwrap_or(false);
        if asynchronous && disown {
            return Err(RunnerError::InvalidArgument(
                "Cannot give both 'asynchronous' and 'disown'".to_string(),
            ));
        }

        let hide_arg = match explicit.hide {
            HideArg::Unset => config
                .run
                .hide
                .clone()
                .map(HideArg::Str)
                .unwrap_or(HideArg::Unset),
            explicit => explicit,
        };
        let hide = normalize_hide(hide_arg)?;

        let mut env = config.run.env.clone();
        env.extend(explicit.env);

        Ok(RunOpts {
            pty: explicit.pty.or(config.run.pty).unwrap_or(false),
            fallback: explicit.fallback.or(config.run.fallback).unwrap_or(true),
            hide,
            warn: explicit.warn.or(config.run.warn).unwrap_or(false),
            echo: explicit.echo.or(config.run.echo).unwrap_or(false),
            echo_format: explicit
                .echo_format
                .or_else(|| config.run.echo_format.clone())
                .unwrap_or_else(|| DEFAULT_ECHO_FORMAT.to_string()),
            echo_stdin: explicit.echo_stdin.or(config.run.echo_stdin),
            encoding: explicit.encoding.or_else(|| config.run.encoding.clone()),
            env,
            replace_env: explicit.replace_env.or(config.run.replace_env).unwrap_or(false),
            shell: explicit
                .shell
                .or_else(|| config.run.shell.clone())
                .unwrap_or_else(|| DEFAULT_SHELL.to_string()),
            in_stream: explicit.in_stream.or(config.run.in_stream).unwrap_or(true),
            timeout: explicit.timeout.or(config.timeouts.command),
            asynchronous,
            disown,
            dry: explicit.dry.unwrap_or(false),
        })
    }
}
