use crate::error::{GhostError, Result};
use crate::util::{parse_bool_str, parse_extension_list};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "http://localhost:11434";
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 16;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_IMAGE_TYPES: &[&str] = &["png", "jpg", "jpeg", "webp"];

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub model: String,
    pub vision_model: String,
    pub data_dir: PathBuf,
    pub think: bool,
    pub max_tool_rounds: usize,
    pub request_timeout: Duration,
    pub image_types: Vec<String>,
    pub tavily_api_key: Option<String>,
    pub workspace_dir: PathBuf,
}

/// Values given on the command line. They win over everything else.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub host: Option<String>,
    pub model: Option<String>,
    pub vision_model: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub think: Option<bool>,
}

/// Shape of `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub model: Option<String>,
    pub vision_model: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub think: Option<bool>,
    pub max_tool_rounds: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub image_types: Option<Vec<String>>,
    pub tavily_api_key: Option<String>,
}

impl FileConfig {
    pub fn parse(text: &str, origin: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|e| {
            GhostError::InvalidConfig(format!("{}: {}", origin.display(), e.message()))
        })
    }

    /// Read the file at `path`. A missing file is only an error when the
    /// path was given explicitly.
    pub fn load(path: &Path, explicit: bool) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => Ok(Self::default()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(GhostError::InvalidConfig(
                format!("config file {} does not exist", path.display()),
            )),
            Err(e) => Err(GhostError::io(
                format!("reading config file {}", path.display()),
                e,
            )),
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ghost").join("config.toml"))
}

pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("ghost"))
}

impl Config {
    /// Resolve from flags, the process environment, and the config file.
    pub fn load(overrides: ConfigOverrides) -> Result<Self> {
        let file = match overrides.config_path.as_deref() {
            Some(path) => FileConfig::load(path, true)?,
            None => match default_config_path() {
                Some(path) => FileConfig::load(&path, false)?,
                None => FileConfig::default(),
            },
        };
        let workspace_dir = std::env::current_dir()
            .map_err(|e| GhostError::io("resolving current directory", e))?;
        Self::resolve(overrides, |key| std::env::var(key).ok(), file, workspace_dir)
    }

    /// Flag > environment > file > default.
    pub fn resolve<F>(
        overrides: ConfigOverrides,
        env: F,
        file: FileConfig,
        workspace_dir: PathBuf,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = overrides
            .host
            .or_else(|| env("GHOST_HOST"))
            .or(file.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let host = host.trim().trim_end_matches('/').to_string();

        let model = overrides
            .model
            .or_else(|| env("GHOST_MODEL"))
            .or(file.model)
            .ok_or(GhostError::ConfigMissing(
                "model (pass --model or set GHOST_MODEL)",
            ))?;

        let vision_model = overrides
            .vision_model
            .or_else(|| env("GHOST_VISION_MODEL"))
            .or(file.vision_model)
            .unwrap_or_else(|| model.clone());

        let data_dir = overrides
            .data_dir
            .or_else(|| env("GHOST_DATA_DIR").map(PathBuf::from))
            .or(file.data_dir)
            .or_else(default_data_dir)
            .ok_or(GhostError::ConfigMissing(
                "data directory (pass --data-dir or set GHOST_DATA_DIR)",
            ))?;

        let think = match overrides.think {
            Some(think) => think,
            None => match env("GHOST_THINK") {
                Some(raw) => parse_bool_str(&raw).ok_or_else(|| {
                    GhostError::InvalidConfig(format!("GHOST_THINK='{raw}' is not a boolean"))
                })?,
                None => file.think.unwrap_or(false),
            },
        };

        let max_tool_rounds = match env("GHOST_MAX_TOOL_ROUNDS") {
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                GhostError::InvalidConfig(format!(
                    "GHOST_MAX_TOOL_ROUNDS='{raw}' is not a non-negative integer"
                ))
            })?,
            None => file.max_tool_rounds.unwrap_or(DEFAULT_MAX_TOOL_ROUNDS),
        };

        let image_types = match env("GHOST_IMAGE_TYPES") {
            Some(raw) => parse_extension_list(&raw),
            None => match file.image_types {
                Some(list) => parse_extension_list(&list.join(",")),
                None => DEFAULT_IMAGE_TYPES.iter().map(|s| s.to_string()).collect(),
            },
        };

        let request_timeout = file
            .request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let tavily_api_key = env("TAVILY_API_KEY").or(file
            .tavily_api_key
            .filter(|key| !key.trim().is_empty()));

        Ok(Self {
            host,
            model: model.trim().to_string(),
            vision_model: vision_model.trim().to_string(),
            data_dir,
            think,
            max_tool_rounds,
            request_timeout,
            image_types,
            tavily_api_key,
            workspace_dir,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.host.starts_with("http://") && !self.host.starts_with("https://") {
            return Err(GhostError::InvalidConfig(format!(
                "host '{}': expected an http:// or https:// URL",
                self.host
            )));
        }
        if self.model.is_empty() {
            return Err(GhostError::ConfigMissing("model"));
        }
        if self.vision_model.is_empty() {
            return Err(GhostError::InvalidConfig(
                "vision model must not be empty".to_string(),
            ));
        }
        if self.max_tool_rounds == 0 {
            return Err(GhostError::InvalidConfig(
                "max_tool_rounds must be at least 1".to_string(),
            ));
        }
        if self.image_types.is_empty() {
            return Err(GhostError::InvalidConfig(
                "image_types must list at least one extension".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(GhostError::InvalidConfig(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.host)
    }
}
