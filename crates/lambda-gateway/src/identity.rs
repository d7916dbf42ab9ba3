//! Function identity shared by every invocation.

use crate::config::GatewayConfig;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Fake credentials handed to the hosted function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    /// Access key ID.
    pub key: String,
    /// Secret access key.
    pub secret: String,
    /// Session token, if any.
    pub session: Option<String>,
}

/// The immutable context template shared by all invocations.
///
/// Established once when the gateway starts and read-only afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseContext {
    /// Reserved invocation ID of the initialization pseudo-invocation.
    pub init_invoke_id: String,
    /// Whether the runtime should skip reporting its init phase.
    pub suppress_init: bool,
    /// Handler entry point.
    pub handler: String,
    /// Credentials exposed to the function.
    pub credentials: Credentials,
    /// ARN of the hosted function.
    pub invoked_function_arn: String,
    /// Function name.
    pub function_name: String,
    /// Function version.
    pub function_version: String,
    /// Memory size in MB.
    pub memory_size_mb: u32,
    /// Configured timeout.
    #[serde(skip)]
    pub timeout: Duration,
    /// AWS region.
    pub region: String,
    /// AWS account ID.
    pub account_id: String,
    /// CloudWatch log group name.
    pub log_group_name: String,
    /// CloudWatch log stream name.
    pub log_stream_name: String,
}

impl BaseContext {
    /// Resolves the function identity from configuration.
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            init_invoke_id: invoke_id(),
            suppress_init: true,
            handler: config.handler.clone(),
            credentials: Credentials {
                key: config.access_key_id.clone(),
                secret: config.secret_access_key.clone(),
                session: config.session_token.clone(),
            },
            invoked_function_arn: function_arn(
                &config.region,
                &config.account_id,
                &config.function_name,
            ),
            function_name: config.function_name.clone(),
            function_version: config.function_version.clone(),
            memory_size_mb: config.memory_size_mb,
            timeout: config.timeout(),
            region: config.region.clone(),
            account_id: config.account_id.clone(),
            log_group_name: format!("/aws/lambda/{}", config.function_name),
            log_stream_name: log_stream_name(&config.function_version),
        }
    }

    /// The configured timeout in milliseconds.
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// Returns the environment a Lambda runtime process expects.
    ///
    /// Use this when spawning an out-of-process runtime against the Runtime
    /// API. `runtime_api` is the `host:port` of that API, if it is served.
    #[must_use]
    pub fn lambda_env_vars(&self, runtime_api: Option<&str>) -> HashMap<String, String> {
        let mut env = HashMap::new();

        env.insert(
            "AWS_LAMBDA_FUNCTION_NAME".to_string(),
            self.function_name.clone(),
        );
        env.insert(
            "AWS_LAMBDA_FUNCTION_VERSION".to_string(),
            self.function_version.clone(),
        );
        env.insert(
            "AWS_LAMBDA_FUNCTION_MEMORY_SIZE".to_string(),
            self.memory_size_mb.to_string(),
        );
        env.insert(
            "AWS_LAMBDA_LOG_GROUP_NAME".to_string(),
            self.log_group_name.clone(),
        );
        env.insert(
            "AWS_LAMBDA_LOG_STREAM_NAME".to_string(),
            self.log_stream_name.clone(),
        );
        env.insert("AWS_REGION".to_string(), self.region.clone());
        env.insert("AWS_DEFAULT_REGION".to_string(), self.region.clone());
        env.insert(
            "AWS_ACCESS_KEY_ID".to_string(),
            self.credentials.key.clone(),
        );
        env.insert(
            "AWS_SECRET_ACCESS_KEY".to_string(),
            self.credentials.secret.clone(),
        );
        if let Some(session) = &self.credentials.session {
            env.insert("AWS_SESSION_TOKEN".to_string(), session.clone());
        }
        env.insert("_HANDLER".to_string(), self.handler.clone());

        if let Some(runtime_api) = runtime_api {
            env.insert("AWS_LAMBDA_RUNTIME_API".to_string(), runtime_api.to_string());
        }

        env
    }
}

/// Generates an invocation ID that looks like a v1 UUID.
///
/// The third group always starts with `1`, the version nibble of a
/// time-based UUID.
pub fn invoke_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-1{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[13..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Builds a function ARN, keeping only the digits of the account ID.
pub fn function_arn(region: &str, account_id: &str, function_name: &str) -> String {
    let account: String = account_id.chars().filter(char::is_ascii_digit).collect();
    format!("arn:aws:lambda:{region}:{account}:function:{function_name}")
}

/// Builds a log stream name of the form `YYYY/MM/DD/[version]<32 hex>`.
fn log_stream_name(version: &str) -> String {
    format!(
        "{}/[{}]{}",
        Utc::now().format("%Y/%m/%d"),
        version,
        Uuid::new_v4().simple()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_function_arn_strips_non_digits() {
        let arn = function_arn("eu-west-1", "1234.5678e9", "orders");
        assert_eq!(arn, "arn:aws:lambda:eu-west-1:123456789:function:orders");
    }

    #[test]
    fn test_base_context_from_config() {
        let config = GatewayConfig {
            function_name: "orders".to_string(),
            account_id: "123456789012".to_string(),
            session_token: Some("session".to_string()),
            ..GatewayConfig::default()
        };

        let base = BaseContext::from_config(&config);

        assert_eq!(
            base.invoked_function_arn,
            "arn:aws:lambda:us-east-1:123456789012:function:orders"
        );
        assert_eq!(base.log_group_name, "/aws/lambda/orders");
        assert!(base.log_stream_name.contains("/[$LATEST]"));
        assert_eq!(base.timeout_ms(), 300_000);
        assert_eq!(base.credentials.session.as_deref(), Some("session"));
        assert!(base.suppress_init);
    }

    #[test]
    fn test_lambda_env_vars() {
        let base = BaseContext::from_config(&GatewayConfig::default());

        let env = base.lambda_env_vars(Some("127.0.0.1:9001"));
        assert_eq!(env["AWS_LAMBDA_FUNCTION_NAME"], "test");
        assert_eq!(env["AWS_LAMBDA_FUNCTION_MEMORY_SIZE"], "1536");
        assert_eq!(env["AWS_LAMBDA_RUNTIME_API"], "127.0.0.1:9001");
        assert_eq!(env["_HANDLER"], "index.handler");
        assert!(!env.contains_key("AWS_SESSION_TOKEN"));

        let env = base.lambda_env_vars(None);
        assert!(!env.contains_key("AWS_LAMBDA_RUNTIME_API"));
    }

    proptest! {
        #[test]
        fn invoke_id_looks_like_v1_uuid(_seed in 0u8..32) {
            let id = invoke_id();
            let parts: Vec<_> = id.split('-').collect();

            prop_assert_eq!(parts.len(), 5);
            prop_assert_eq!(parts[0].len(), 8);
            prop_assert_eq!(parts[1].len(), 4);
            prop_assert_eq!(parts[2].len(), 4);
            prop_assert_eq!(parts[3].len(), 4);
            prop_assert_eq!(parts[4].len(), 12);
            prop_assert!(parts[2].starts_with('1'));
            prop_assert!(id.chars().all(|c| c == '-' || c.is_ascii_hexdigit()));
        }
    }
}
