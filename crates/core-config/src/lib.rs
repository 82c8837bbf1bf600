//! Configuration loading and parsing.
//!
//! Reads `oxvim.toml` (or an override path provided by the binary). Three
//! sections are understood:
//!
//! ```toml
//! [input]
//! timeout = true       # wait for ambiguous mapping prefixes
//! timeoutlen = 1000    # milliseconds
//! maxmapdepth = 1000   # nested mapping expansions before E223
//!
//! [script]
//! maxfuncdepth = 100
//! ignorecase = false
//!
//! [leader]
//! key = "\\"           # value of g:mapleader
//! ```
//!
//! Unknown fields are ignored. A missing file or a parse error yields the
//! defaults; the parse error is logged, never fatal. Depth limits of zero are
//! raised to one by [`Config::normalize`] so a session can always make
//! progress.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub script: ScriptConfig,
    #[serde(default)]
    pub leader: LeaderConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub raw: Option<String>, // original file string (optional)
    pub file: ConfigFile,    // parsed (or default) data
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct InputConfig {
    #[serde(default = "InputConfig::default_timeout")] // Vim default: enabled
    pub timeout: bool,
    #[serde(default = "InputConfig::default_timeoutlen")]
    pub timeoutlen: u32,
    #[serde(default = "InputConfig::default_maxmapdepth")]
    pub maxmapdepth: u32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            timeout: Self::default_timeout(),
            timeoutlen: Self::default_timeoutlen(),
            maxmapdepth: Self::default_maxmapdepth(),
        }
    }
}

impl InputConfig {
    const fn default_timeout() -> bool {
        true
    }
    const fn default_timeoutlen() -> u32 {
        1000
    }
    const fn default_maxmapdepth() -> u32 {
        1000
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ScriptConfig {
    #[serde(default = "ScriptConfig::default_maxfuncdepth")]
    pub maxfuncdepth: u32,
    #[serde(default)]
    pub ignorecase: bool,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            maxfuncdepth: Self::default_maxfuncdepth(),
            ignorecase: false,
        }
    }
}

impl ScriptConfig {
    const fn default_maxfuncdepth() -> u32 {
        100
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LeaderConfig {
    #[serde(default = "LeaderConfig::default_key")]
    pub key: String,
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            key: Self::default_key(),
        }
    }
}

impl LeaderConfig {
    fn default_key() -> String {
        "\\".to_string()
    }
}

/// Best-effort config path following platform conventions (XDG / AppData Roaming).
pub fn discover() -> PathBuf {
    // The working directory wins over the platform config dir.
    let local = PathBuf::from("oxvim.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("oxvim").join("oxvim.toml");
    }
    PathBuf::from("oxvim.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    let Ok(content) = fs::read_to_string(&path) else {
        info!(target: "config", path = %path.display(), "config_missing_using_defaults");
        return Ok(Config::default());
    };
    match parse(&content) {
        Ok(file) => {
            let mut cfg = Config {
                raw: Some(content),
                file,
            };
            cfg.normalize();
            info!(target: "config", path = %path.display(), "config_loaded");
            Ok(cfg)
        }
        Err(e) => {
            warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed");
            Ok(Config::default())
        }
    }
}

fn parse(content: &str) -> Result<ConfigFile> {
    toml::from_str::<ConfigFile>(content).context("invalid oxvim.toml")
}

impl Config {
    /// Parse configuration text directly.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut cfg = Self {
            raw: Some(content.to_string()),
            file: parse(content)?,
        };
        cfg.normalize();
        Ok(cfg)
    }

    /// Raise zero depth limits to one. Returns true when anything changed.
    pub fn normalize(&mut self) -> bool {
        let mut changed = false;
        if self.file.input.maxmapdepth == 0 {
            info!(target: "config", field = "maxmapdepth", raw = 0, clamped = 1, "config_value_clamped");
            self.file.input.maxmapdepth = 1;
            changed = true;
        }
        if self.file.script.maxfuncdepth == 0 {
            info!(target: "config", field = "maxfuncdepth", raw = 0, clamped = 1, "config_value_clamped");
            self.file.script.maxfuncdepth = 1;
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex, MutexGuard};
    use tracing::Level;
    use tracing::subscriber::with_default;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct BufferWriter {
        inner: Arc<Mutex<Vec<u8>>>,
    }

    impl BufferWriter {
        fn new() -> (Self, Arc<Mutex<Vec<u8>>>) {
            let buf = Arc::new(Mutex::new(Vec::new()));
            (Self { inner: buf.clone() }, buf)
        }
    }

    struct LockedWriter<'a> {
        guard: MutexGuard<'a, Vec<u8>>,
    }

    impl<'a> Write for LockedWriter<'a> {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.guard.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for BufferWriter {
        type Writer = LockedWriter<'a>;

        fn make_writer(&'a self) -> Self::Writer {
            LockedWriter {
                guard: self.inner.lock().expect("log buffer poisoned"),
            }
        }
    }

    #[test]
    fn default_config_when_missing_file() {
        let cfg = load_from(Some(PathBuf::from("__nonexistent_hopefully__.toml"))).unwrap();
        assert_eq!(cfg.file, ConfigFile::default());
        assert!(cfg.raw.is_none());
    }

    #[test]
    fn input_defaults_present() {
        let cfg = load_from(Some(PathBuf::from("__nonexistent_timeouts__.toml"))).unwrap();
        assert!(cfg.file.input.timeout);
        assert_eq!(cfg.file.input.timeoutlen, 1000);
        assert_eq!(cfg.file.input.maxmapdepth, 1000);
        assert_eq!(cfg.file.script.maxfuncdepth, 100);
        assert_eq!(cfg.file.leader.key, "\\");
    }

    #[test]
    fn parses_all_sections() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "[input]\ntimeout = false\ntimeoutlen = 250\n\n[script]\nmaxfuncdepth = 20\nignorecase = true\n\n[leader]\nkey = \",\"\n",
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert!(!cfg.file.input.timeout);
        assert_eq!(cfg.file.input.timeoutlen, 250);
        assert_eq!(cfg.file.input.maxmapdepth, 1000);
        assert_eq!(cfg.file.script.maxfuncdepth, 20);
        assert!(cfg.file.script.ignorecase);
        assert_eq!(cfg.file.leader.key, ",");
    }

    #[test]
    fn parse_error_falls_back_to_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[input\ntimeout = ").unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.file, ConfigFile::default());
        assert!(Config::from_toml("[input\n").is_err());
    }

    #[test]
    fn zero_depths_are_clamped_and_logged() {
        let (writer, buffer) = BufferWriter::new();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_target(true)
            .with_ansi(false)
            .without_time()
            .with_writer(writer)
            .finish();

        let cfg = with_default(subscriber, || {
            Config::from_toml("[input]\nmaxmapdepth = 0\n[script]\nmaxfuncdepth = 0\n").unwrap()
        });

        let log_output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(log_output.contains("INFO config:"));
        assert!(log_output.contains("config_value_clamped"));
        assert_eq!(cfg.file.input.maxmapdepth, 1);
        assert_eq!(cfg.file.script.maxfuncdepth, 1);
    }
}
