//! Configuration loading.
//!
//! Configuration is layered with figment. Later sources override earlier ones:
//! 1. Default values (compiled in)
//! 2. Config file: `/var/task/gateway.toml`, or the path in
//!    `LAMBDA_GATEWAY_CONFIG` (optional)
//! 3. The standard Lambda environment variables
//! 4. Gateway-specific variables with the `LAMBDA_GATEWAY_` prefix
//!
//! # Standard Environment Variables
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `AWS_LAMBDA_FUNCTION_NAME` | `function_name` | `test` |
//! | `AWS_LAMBDA_FUNCTION_VERSION` | `function_version` | `$LATEST` |
//! | `AWS_LAMBDA_FUNCTION_MEMORY_SIZE` | `memory_size_mb` | `1536` |
//! | `AWS_LAMBDA_FUNCTION_TIMEOUT` | `timeout_secs` | `300` |
//! | `AWS_REGION`, then `AWS_DEFAULT_REGION` | `region` | `us-east-1` |
//! | `AWS_ACCOUNT_ID` | `account_id` | random 12 digits |
//! | `AWS_ACCESS_KEY_ID` | `access_key_id` | `SOME_ACCESS_KEY_ID` |
//! | `AWS_SECRET_ACCESS_KEY` | `secret_access_key` | `SOME_SECRET_ACCESS_KEY` |
//! | `AWS_SESSION_TOKEN` | `session_token` | unset |
//! | `HANDLER` | `handler` | `index.handler` |
//! | `QUEUE_LIMIT` | `queue_limit` | unlimited |
//! | `PORT` | `port` | `8080` |
//! | `RUNTIME_API_PORT` | `runtime_api_port` | disabled |

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/var/task/gateway.toml";
const CONFIG_PATH_VAR: &str = "LAMBDA_GATEWAY_CONFIG";
const ENV_PREFIX: &str = "LAMBDA_GATEWAY_";

/// Configuration for the gateway and the function it hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Function name.
    pub function_name: String,

    /// Function version.
    pub function_version: String,

    /// Function memory size in MB.
    pub memory_size_mb: u32,

    /// Invocation timeout in seconds.
    pub timeout_secs: u64,

    /// AWS region.
    pub region: String,

    /// AWS account ID used for the function ARN.
    pub account_id: String,

    /// Access key handed to the function.
    pub access_key_id: String,

    /// Secret key handed to the function.
    pub secret_access_key: String,

    /// Optional session token handed to the function.
    pub session_token: Option<String>,

    /// Handler entry point (e.g. "index.handler").
    pub handler: String,

    /// Maximum number of queued invocations before new requests are rejected.
    pub queue_limit: Option<usize>,

    /// Address the HTTP front door listens on.
    pub host: IpAddr,

    /// Port for the HTTP front door. `0` picks a random free port.
    pub port: u16,

    /// Port for the Lambda Runtime API. The API is not served when unset.
    pub runtime_api_port: Option<u16>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            function_name: "test".to_string(),
            function_version: "$LATEST".to_string(),
            memory_size_mb: 1536,
            timeout_secs: 300,
            region: "us-east-1".to_string(),
            account_id: random_account_id(),
            access_key_id: "SOME_ACCESS_KEY_ID".to_string(),
            secret_access_key: "SOME_SECRET_ACCESS_KEY".to_string(),
            session_token: None,
            handler: "index.handler".to_string(),
            queue_limit: None,
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            runtime_api_port: None,
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if a source contains values of the wrong type.
    #[allow(clippy::result_large_err)]
    pub fn load() -> Result<Self, figment::Error> {
        let path = std::env::var_os(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from_path(path)
    }

    /// Loads configuration using a custom config file path.
    ///
    /// # Errors
    ///
    /// Returns an error if a source contains values of the wrong type.
    #[allow(clippy::result_large_err)]
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(GatewayConfig::default()));

        if config_path.as_ref().exists() {
            figment = figment.merge(Toml::file(config_path));
        }

        figment = figment.merge(standard_lambda_env());
        figment = figment.merge(Env::prefixed(ENV_PREFIX));

        figment.extract()
    }

    /// The invocation timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The invocation timeout in milliseconds.
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_secs.saturating_mul(1000)
    }
}

/// Only the fields actually present in the environment, so that absent
/// variables leave lower layers untouched.
#[derive(Debug, Default, Serialize)]
struct PartialConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    function_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memory_size_mb: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    handler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue_limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    runtime_api_port: Option<u16>,
}

fn standard_lambda_env() -> Serialized<PartialConfig> {
    let config = PartialConfig {
        function_name: env_string("AWS_LAMBDA_FUNCTION_NAME"),
        function_version: env_string("AWS_LAMBDA_FUNCTION_VERSION"),
        memory_size_mb: env_parsed("AWS_LAMBDA_FUNCTION_MEMORY_SIZE"),
        timeout_secs: env_parsed("AWS_LAMBDA_FUNCTION_TIMEOUT"),
        region: env_string("AWS_REGION").or_else(|| env_string("AWS_DEFAULT_REGION")),
        account_id: env_string("AWS_ACCOUNT_ID"),
        access_key_id: env_string("AWS_ACCESS_KEY_ID"),
        secret_access_key: env_string("AWS_SECRET_ACCESS_KEY"),
        session_token: env_string("AWS_SESSION_TOKEN"),
        handler: env_string("HANDLER"),
        queue_limit: env_parsed("QUEUE_LIMIT"),
        port: env_parsed("PORT"),
        runtime_api_port: env_parsed("RUNTIME_API_PORT"),
    };

    Serialized::defaults(config)
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_parsed<T: FromStr>(name: &str) -> Option<T> {
    let raw = env_string(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparsable environment value");
            None
        }
    }
}

/// A random 12-digit account ID.
fn random_account_id() -> String {
    format!("{:012}", uuid::Uuid::new_v4().as_u128() % 1_000_000_000_000)
}
