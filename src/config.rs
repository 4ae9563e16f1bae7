//! Task configuration: YAML loading, validation, printing and the demo config.
//!
//! A config file is an ordered list of tasks:
//!
//! ```yaml
//! tasks:
//!   - connections: 10
//!     interval: 10ms
//!     url: http://localhost:10101/index/equipment/query
//!     body: TopN(model, n=5)
//! ```
//!
//! `delay` and `query` are accepted as aliases for `interval` and `body`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tokio::time::Duration;
use tracing::info;

use crate::utils::{format_duration, parse_duration_string};

const DEMO_URL: &str = "http://localhost:10101/index/equipment/query";
const DEMO_BODY: &str = "TopN(model, n=5)";

/// Longest accepted task interval (one year).
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Errors that can occur when loading or parsing the task configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Duration format for YAML (e.g., "10ms", "1s", or a bare number of seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum YamlDuration {
    Seconds(u64),
    String(String),
}

impl YamlDuration {
    pub fn to_std_duration(&self) -> Result<Duration, String> {
        match self {
            YamlDuration::Seconds(s) => Ok(Duration::from_secs(*s)),
            YamlDuration::String(s) => parse_duration_string(s),
        }
    }
}

/// One task as written in the file, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlTask {
    pub connections: i64,

    #[serde(alias = "delay")]
    pub interval: YamlDuration,

    pub url: String,

    #[serde(alias = "query", default)]
    pub body: String,
}

/// Root of the YAML document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YamlConfig {
    #[serde(default)]
    pub tasks: Vec<YamlTask>,
}

/// One validated workload: `connections` independent request loops POSTing
/// `body` to `url` once per `interval`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub connections: usize,
    pub interval: Duration,
    pub url: String,
    pub body: String,
}

impl TaskDescriptor {
    pub fn new(
        connections: usize,
        interval: Duration,
        url: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            connections,
            interval,
            url: url.into(),
            body: body.into(),
        }
    }

    fn to_yaml_task(&self) -> YamlTask {
        YamlTask {
            connections: self.connections as i64,
            interval: YamlDuration::String(format_duration(self.interval)),
            url: self.url.clone(),
            body: self.body.clone(),
        }
    }
}

/// Loaded task list. Order only matters for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub tasks: Vec<TaskDescriptor>,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string.
    ///
    /// An empty document, or one without tasks, is valid here; running it is not.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: YamlConfig = serde_yaml::from_str(content)?;
        Self::from_yaml(raw)
    }

    /// Validate a raw document, collecting every field error.
    pub fn from_yaml(raw: YamlConfig) -> Result<Self, ConfigError> {
        let mut ctx = ValidationContext::new();
        let mut tasks = Vec::with_capacity(raw.tasks.len());

        for (idx, task) in raw.tasks.iter().enumerate() {
            ctx.enter(&format!("tasks[{}]", idx));
            let before = ctx.error_count();

            ctx.enter("connections");
            if task.connections < 1 {
                ctx.field_error(format!(
                    "must be at least 1, got: {}",
                    task.connections
                ));
            }
            ctx.exit();

            ctx.enter("interval");
            let interval = match task.interval.to_std_duration() {
                Ok(d) if d.is_zero() => {
                    ctx.field_error("must be greater than zero".to_string());
                    None
                }
                Ok(d) if d > MAX_INTERVAL => {
                    ctx.field_error(format!(
                        "must be at most {}, got: {}s",
                        format_duration(MAX_INTERVAL),
                        d.as_secs()
                    ));
                    None
                }
                Ok(d) => Some(d),
                Err(e) => {
                    ctx.field_error(e);
                    None
                }
            };
            ctx.exit();

            ctx.enter("url");
            if let Err(message) = validate_url(&task.url) {
                ctx.field_error(message);
            }
            ctx.exit();

            ctx.exit();

            match interval {
                Some(interval) if ctx.error_count() == before => tasks.push(TaskDescriptor {
                    connections: task.connections as usize,
                    interval,
                    url: task.url.clone(),
                    body: task.body.clone(),
                }),
                _ => {}
            }
        }

        ctx.into_result()?;
        Ok(Config { tasks })
    }

    /// The two-task sample printed when no configuration was provided.
    pub fn demo() -> Self {
        Config {
            tasks: vec![
                TaskDescriptor::new(10, Duration::from_millis(10), DEMO_URL, DEMO_BODY),
                TaskDescriptor::new(1, Duration::from_secs(1), DEMO_URL, DEMO_BODY),
            ],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Render the configuration in the file format accepted by [`Config::from_str`].
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        let raw = YamlConfig {
            tasks: self.tasks.iter().map(TaskDescriptor::to_yaml_task).collect(),
        };
        Ok(serde_yaml::to_string(&raw)?)
    }

    /// Logs one line per task.
    pub fn log_summary(&self) {
        for (idx, task) in self.tasks.iter().enumerate() {
            info!(
                task = idx,
                connections = task.connections,
                interval = %format_duration(task.interval),
                url = %task.url,
                body = %task.body,
                "Task configured"
            );
        }
    }
}

fn validate_url(url: &str) -> Result<(), String> {
    if url.is_empty() {
        return Err("URL cannot be empty".to_string());
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(format!(
            "URL must start with http:// or https://, got: {}",
            url
        ));
    }
    if url.contains(' ') {
        return Err("URL cannot contain spaces".to_string());
    }
    Ok(())
}

/// Tracks the field path while validating so errors read `tasks[1].interval: ...`.
struct ValidationContext {
    field_path: Vec<String>,
    errors: Vec<String>,
}

impl ValidationContext {
    fn new() -> Self {
        Self {
            field_path: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn enter(&mut self, field: &str) {
        self.field_path.push(field.to_string());
    }

    fn exit(&mut self) {
        self.field_path.pop();
    }

    fn field_error(&mut self, message: String) {
        self.errors
            .push(format!("Field '{}': {}", self.field_path.join("."), message));
    }

    fn error_count(&self) -> usize {
        self.errors.len()
    }

    fn into_result(self) -> Result<(), ConfigError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(self.errors.join("; ")))
        }
    }
}
