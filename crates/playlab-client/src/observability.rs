use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const ENABLED_VAR: &str = "PLAYLAB_OBSERVABILITY_ENABLED";
const LEVEL_VAR: &str = "PLAYLAB_LOG_LEVEL";
const JSON_PATH_VAR: &str = "PLAYLAB_JSON_LOG_PATH";
const DEFAULT_LOG_FILE: &str = "playlab.logs.jsonl";

static INIT: OnceCell<()> = OnceCell::new();

/// Where log records are written.
#[derive(Debug, PartialEq, Eq)]
enum LogSink {
    Off,
    /// Compact lines on stderr, keeping stdout for chat output.
    Stderr,
    /// JSON lines appended to `dir/file_name`.
    JsonFile { dir: PathBuf, file_name: String },
}

impl LogSink {
    fn resolve(enabled: Option<&str>, json_path: Option<&str>) -> Self {
        if enabled.and_then(parse_flag) == Some(false) {
            return Self::Off;
        }
        let Some(raw) = json_path.filter(|p| !p.trim().is_empty()) else {
            return Self::Stderr;
        };
        let path = Path::new(raw);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_LOG_FILE)
            .to_string();
        Self::JsonFile { dir, file_name }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn env_filter() -> EnvFilter {
    std::env::var(LEVEL_VAR)
        .ok()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

/// Installs the process-wide tracing subscriber once.
///
/// Environment variables:
/// - `PLAYLAB_OBSERVABILITY_ENABLED`: set to `0`/`false`/`off` to install nothing.
/// - `PLAYLAB_LOG_LEVEL`: filter directive (`info`, `playlab_client=debug`, ...).
/// - `PLAYLAB_JSON_LOG_PATH`: write JSON lines to this file instead of stderr.
/// - `RUST_LOG`: used when `PLAYLAB_LOG_LEVEL` is unset. The fallback is `warn`.
///
/// A subscriber installed earlier by the application wins.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let sink = LogSink::resolve(
            std::env::var(ENABLED_VAR).ok().as_deref(),
            std::env::var(JSON_PATH_VAR).ok().as_deref(),
        );
        let registry = tracing_subscriber::registry().with(env_filter());
        match sink {
            LogSink::Off => {}
            LogSink::Stderr => {
                let layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = registry.with(layer).try_init();
            }
            LogSink::JsonFile { dir, file_name } => {
                let _ = std::fs::create_dir_all(&dir);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(false)
                    .with_writer(tracing_appender::rolling::never(dir, file_name));
                let _ = registry.with(layer).try_init();
            }
        }
    });
}
