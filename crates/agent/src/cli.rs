use clap::{Parser, ValueEnum};
use regex::Regex;
use url::Url;

const API_KEY_PATTERN: &str = r"^agnt_[a-f0-9]{32}$";

fn parse_api_key(input: &str) -> Result<String, String> {
    let re = Regex::new(API_KEY_PATTERN).expect("API_KEY_PATTERN must compile");
    if re.is_match(input) {
        Ok(input.to_string())
    } else {
        Err(format!(
            "ADNO_API_KEY must match {API_KEY_PATTERN} (got a value of the wrong shape)"
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

/// The process's entire configuration surface: environment variables only,
/// read once at startup. Unlike an interactive CLI, there are no positional
/// arguments or short flags meant for a human to type.
#[derive(Debug, Clone, Parser)]
#[command(name = "adno-agent", version, about = "Agent Runtime worker process")]
pub struct AgentEnv {
    #[arg(long, env = "ADNO_API_KEY", value_parser = parse_api_key, hide_env_values = true)]
    pub api_key: String,

    #[arg(long, env = "ADNO_API_URL")]
    pub api_url: Url,

    #[arg(
        long,
        env = "POLL_INTERVAL_MS",
        default_value_t = 30_000,
        value_parser = clap::value_parser!(u64).range(5_000..=300_000)
    )]
    pub poll_interval_ms: u64,

    #[arg(
        long,
        env = "HEARTBEAT_INTERVAL_MS",
        default_value_t = 60_000,
        value_parser = clap::value_parser!(u64).range(10_000..=600_000)
    )]
    pub heartbeat_interval_ms: u64,

    #[arg(
        long,
        env = "MAX_CONCURRENT_TASKS",
        default_value_t = 3,
        value_parser = clap::value_parser!(u8).range(1..=10)
    )]
    pub max_concurrent_tasks: u8,

    #[arg(long, env = "LOG_LEVEL", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Passed through to handlers untouched; never interpreted by the runtime.
    #[arg(long, env = "SOURCE_SYSTEM_ORG")]
    pub source_system_org: Option<String>,
    #[arg(long, env = "SOURCE_SYSTEM_PROJECT")]
    pub source_system_project: Option<String>,
    #[arg(long, env = "SOURCE_SYSTEM_TOKEN", hide_env_values = true)]
    pub source_system_token: Option<String>,
    #[arg(long, env = "AI_ENDPOINT")]
    pub ai_endpoint: Option<String>,
    #[arg(long, env = "AI_KEY", hide_env_values = true)]
    pub ai_key: Option<String>,
    #[arg(long, env = "AI_DEPLOYMENT")]
    pub ai_deployment: Option<String>,
}

impl AgentEnv {
    /// The handler-visible credential passthrough, forwarded into
    /// `WorkspaceConfig`-adjacent context and otherwise opaque to the runtime.
    pub fn passthrough_fields(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut fields = serde_json::Map::new();
        let mut insert = |key: &str, value: &Option<String>| {
            if let Some(value) = value {
                fields.insert(key.to_string(), serde_json::Value::String(value.clone()));
            }
        };
        insert("source_system_org", &self.source_system_org);
        insert("source_system_project", &self.source_system_project);
        insert("source_system_token", &self.source_system_token);
        insert("ai_endpoint", &self.ai_endpoint);
        insert("ai_key", &self.ai_key);
        insert("ai_deployment", &self.ai_deployment);
        fields
    }
}
