//! Driver configuration.
//!
//! `ccfront.toml` is discovered in the working directory; every field has a
//! default so a missing or malformed file degrades to defaults rather than
//! failing startup. The long-standing environment variables override the
//! file, since they are what CI wrappers and bug reports use.

use serde::Deserialize;
use std::path::PathBuf;
use std::{env, fs};
use tracing::info;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct OutputConfig {
    /// Write the lowered C to this path as well as the normal output.
    #[serde(default)]
    pub dump_lowered: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct DebugConfig {
    /// Dump the host parser's stub stream (CC_DEBUG_TCC_NODES).
    #[serde(default)]
    pub stub_nodes: bool,
    /// Dump the async statement IR (CC_DEBUG_ASYNC_AST).
    #[serde(default)]
    pub async_ir: bool,
    /// Keep temporary preprocessed files (CC_KEEP_PP).
    #[serde(default)]
    pub keep_preprocessed: bool,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

#[derive(Debug, Default, Clone)]
pub struct Config {
    pub file: ConfigFile,
}

/// Best-effort config path: working-directory `ccfront.toml`.
pub fn discover() -> PathBuf {
    PathBuf::from("ccfront.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Config {
    let path = path.unwrap_or_else(discover);
    let mut config = match fs::read_to_string(&path) {
        Ok(content) => match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => Config { file },
            Err(e) => {
                info!(target: "config", path = %path.display(), error = %e, "config parse failed; using defaults");
                Config::default()
            }
        },
        Err(_) => Config::default(),
    };
    config.apply_env();
    config
}

impl Config {
    /// Environment variables override the file.
    pub fn apply_env(&mut self) {
        if env_flag("CC_DEBUG_TCC_NODES") {
            self.file.debug.stub_nodes = true;
        }
        if env_flag("CC_DEBUG_ASYNC_AST") {
            self.file.debug.async_ir = true;
        }
        if env_flag("CC_KEEP_PP") {
            self.file.debug.keep_preprocessed = true;
        }
        if let Ok(path) = env::var("CC_DUMP_LOWERED")
            && !path.is_empty()
        {
            self.file.output.dump_lowered = Some(PathBuf::from(path));
        }
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name).map(|v| !v.is_empty() && v != "0").unwrap_or(false)
}
