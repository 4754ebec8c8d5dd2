use std::path::{Path, PathBuf};

use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use vedit_config::{AppConfig, CONFIG_ENV, ConfigError};
use vedit_engine::session::MidpointMode;

mod demo;

fn main() {
    let mut args = std::env::args().skip(1);
    let mut override_midpoints: Option<MidpointMode> = None;
    let mut config_override: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--auto" => override_midpoints = Some(MidpointMode::Auto),
            "--manual" => override_midpoints = Some(MidpointMode::Manual),
            "--config" => {
                let Some(path) = args.next() else {
                    eprintln!("`--config` 需要提供配置文件路径");
                    std::process::exit(1);
                };
                config_override = Some(PathBuf::from(path));
            }
            other => {
                eprintln!("未知参数：{other}");
                std::process::exit(1);
            }
        }
    }

    let (config, config_error) = load_configuration(config_override.as_deref());
    init_logging(&config);
    if let Some(err) = config_error {
        report_config_error(&err);
    }
    info!("启动顶点编辑演示");

    let settings = demo::session_settings(&config, override_midpoints);
    info!(midpoints = ?settings.midpoints, history_depth = ?settings.history_depth, "编辑会话设置");
    if let Err(err) = demo::run(&config, settings) {
        error!(error = %err, "顶点编辑演示中止");
        std::process::exit(1);
    }
}

/// 命令行指定的文件优先，否则按 `VEDIT_CONFIG`、`config/default.toml` 查找。
/// 失败时回退到内建默认值，错误留待日志初始化后再报告。
fn load_configuration(override_path: Option<&Path>) -> (AppConfig, Option<ConfigError>) {
    let loaded = match override_path {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::discover(),
    };
    match loaded {
        Ok(config) => (config, None),
        Err(err) => (AppConfig::default(), Some(err)),
    }
}

fn report_config_error(err: &ConfigError) {
    match err {
        ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
            warn!(path = %path.display(), env = CONFIG_ENV, error = %err, "编辑器配置不可用，回退到内建默认值");
        }
        ConfigError::Context { .. } => {
            warn!(error = %err, "无法定位编辑器配置，回退到内建默认值");
        }
    }
}

/// `RUST_LOG` 优先于配置中的日志级别；级别无法解析时退回 info 并提示。
fn init_logging(config: &AppConfig) {
    let level = config.logging.level.as_str();
    let (filter, rejected) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, false),
        Err(_) => match EnvFilter::try_new(level) {
            Ok(filter) => (filter, false),
            Err(_) => (EnvFilter::new("info"), true),
        },
    };
    if fmt().with_env_filter(filter).with_target(false).try_init().is_err() {
        return;
    }
    if rejected {
        warn!(level, "无法解析日志级别，改用 info");
    }
}
