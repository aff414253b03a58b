//! Language model client used for decision routing and change summaries.

pub mod openai;
pub mod types;

pub use openai::OpenAiClient;
pub use types::{CompletionRequest, Content, ContentPart, ImageUrl, LlmChat, LlmError, Message, Role};

use std::time::Duration;

use crate::config::LlmConfig;

/// Build the OpenAI-compatible client, reading the API key from the
/// environment variable named in the config.
pub fn client_from_config(config: &LlmConfig) -> Result<OpenAiClient, LlmError> {
    let api_key = std::env::var(&config.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| LlmError::MissingApiKey {
            var: config.api_key_env.clone(),
        })?;
    OpenAiClient::new(
        api_key,
        Some(&config.base_url),
        &config.model,
        Duration::from_secs(config.request_timeout_secs),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_reported_with_var_name() {
        let config = LlmConfig {
            api_key_env: "SITESMITH_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..LlmConfig::default()
        };
        match client_from_config(&config) {
            Err(LlmError::MissingApiKey { var }) => {
                assert_eq!(var, "SITESMITH_TEST_KEY_THAT_IS_NEVER_SET")
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("expected missing key error"),
        }
    }
}
