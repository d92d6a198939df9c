use std::collections::BTreeMap;

use serde::Deserialize;

/// Shape of the `run.*` / `timeouts.*` configuration namespace.
///
/// This models only the *value* a hierarchical config loader would hand to
/// `RunOpts::resolve` — it does not discover or merge files from disk. File
/// discovery, profile layering, and env-var overlays are out of scope for
/// this crate.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub timeouts: TimeoutsSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunSection {
    pub warn: Option<bool>,
    pub hide: Option<String>,
    pub pty: Option<bool>,
    pub fallback: Option<bool>,
    pub echo: Option<bool>,
    pub echo_format: Option<String>,
    pub echo_stdin: Option<bool>,
    pub encoding: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub replace_env: Option<bool>,
    pub shell: Option<String>,
    pub in_stream: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeoutsSection {
    pub command: Option<u64>,
}

impl RunnerConfig {
    /// Parse a TOML document into a `RunnerConfig`. Unknown keys are ignored
    /// (matching the original's permissive settings merge); malformed values
    /// for recognized keys are rejected.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recognized_keys_from_both_namespaces() {
        let config = RunnerConfig::from_toml(
            r#"
            [run]
            warn = true
            hide = "both"
            shell = "zsh"

            [timeouts]
            command = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.run.warn, Some(true));
        assert_eq!(config.run.hide.as_deref(), Some("both"));
        assert_eq!(config.run.shell.as_deref(), Some("zsh"));
        assert_eq!(config.timeouts.command, Some(30));
    }

    #[test]
    fn missing_sections_default_to_all_unset() {
        let config = RunnerConfig::from_toml("").unwrap();
        assert_eq!(config.run.warn, None);
        assert_eq!(config.timeouts.command, None);
    }

    #[test]
    fn parses_config_loaded_from_a_real_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runner.toml");
        std::fs::write(&path, "[run]\nwarn = true\nshell = \"fish\"\n").unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let config = RunnerConfig::from_toml(&text).unwrap();

        assert_eq!(config.run.warn, Some(true));
        assert_eq!(config.run.shell.as_deref(), Some("fish"));
    }

    #[test]
    fn run_env_map_accumulates_entries() {
        let config = RunnerConfig::from_toml(
            r#"
            [run.env]
            FOO = "bar"
            BAZ = "qux"
            "#,
        )
        .unwrap();
        assert_eq!(config.run.env.get("FOO"), Some(&"bar".to_string()));
        assert_eq!(config.run.env.get("BAZ"), Some(&"qux".to_string()));
    }
}
