use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 指定配置文件路径的环境变量。
pub const CONFIG_ENV: &str = "VEDIT_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub editor: EditorConfig,
    #[serde(default)]
    pub demo: DemoConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `VEDIT_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MidpointStrategy {
    #[default]
    Auto,
    Manual,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditorConfig {
    #[serde(default)]
    pub midpoints: MidpointStrategy,
    /// 撤销栈上限，0 表示不限制。
    #[serde(default)]
    pub history_depth: usize,
}

impl EditorConfig {
    pub fn history_limit(&self) -> Option<usize> {
        (self.history_depth > 0).then_some(self.history_depth)
    }
}

/// CLI 演示使用的初始几何。闭合时 `points` 需以首点收尾。
#[derive(Debug, Clone, Deserialize)]
pub struct DemoConfig {
    #[serde(default = "DemoConfig::default_close")]
    pub close_geometry: bool,
    #[serde(default = "DemoConfig::default_points")]
    pub points: Vec<[f64; 2]>,
}

impl DemoConfig {
    fn default_close() -> bool {
        true
    }

    fn default_points() -> Vec<[f64; 2]> {
        vec![
            [31.2304, 121.4737],
            [31.2304, 121.4837],
            [31.2404, 121.4837],
            [31.2404, 121.4737],
            [31.2304, 121.4737],
        ]
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            close_geometry: Self::default_close(),
            points: Self::default_points(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
