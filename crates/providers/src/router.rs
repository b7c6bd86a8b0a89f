//! Provider selection — builds the configured inference gateway.

use crate::deadline::DeadlineGateway;
use crate::gemini::{self, GeminiProvider};
use crate::openai_compat::OpenAiCompatProvider;
use lexchamber_config::{AppConfig, ConfigError};
use lexchamber_core::inference::InferenceGateway;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Build the inference gateway described by `config`, bounded by its
/// `inference_timeout_secs` deadline.
///
/// Fails with [`ConfigError::MissingApiKey`] when no key is configured.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn InferenceGateway>, ConfigError> {
    let api_key = config.require_api_key()?;
    let deadline = Duration::from_secs(config.inference_timeout_secs);

    let provider: Arc<dyn InferenceGateway> = match config.provider.as_str() {
        "gemini" | "google" => {
            let mut p = GeminiProvider::new(api_key, &config.model)
                .with_temperature(config.temperature)
                .with_request_timeout(deadline);
            if let Some(url) = &config.api_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        name => {
            let base_url = match &config.api_url {
                Some(url) => url.clone(),
                None => default_base_url(name).ok_or_else(|| {
                    ConfigError::ValidationError(format!(
                        "unknown provider '{name}'; set api_url for custom endpoints"
                    ))
                })?,
            };
            Arc::new(
                OpenAiCompatProvider::new(name, base_url, api_key, &config.model)
                    .with_temperature(config.temperature)
                    .with_request_timeout(deadline),
            )
        }
    };

    info!(
        provider = %provider.name(),
        model = %config.model,
        timeout_secs = config.inference_timeout_secs,
        "Inference gateway ready"
    );

    Ok(Arc::new(DeadlineGateway::new(provider, deadline)))
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> Option<String> {
    let url = match provider_name {
        "gemini" | "google" => gemini::DEFAULT_BASE_URL,
        "openai" => "https://api.openai.com/v1",
        "openrouter" => "https://openrouter.ai/api/v1",
        "ollama" => "http://localhost:11434/v1",
        "groq" => "https://api.groq.com/openai/v1",
        "vllm" => "http://localhost:8000/v1",
        _ => return None,
    };
    Some(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key() -> AppConfig {
        AppConfig {
            api_key: Some("test-key".into()),
            ..AppConfig::default()
        }
    }

    #[test]
    fn builds_gemini_by_default() {
        let gateway = build_from_config(&config_with_key()).unwrap();
        assert_eq!(gateway.name(), "gemini");
    }

    #[test]
    fn missing_key_is_fatal() {
        let err = build_from_config(&AppConfig::default()).err().unwrap();
        assert!(matches!(err, ConfigError::MissingApiKey));
    }

    #[test]
    fn openai_compatible_providers() {
        let mut config = config_with_key();
        config.provider = "openrouter".into();
        assert_eq!(build_from_config(&config).unwrap().name(), "openrouter");

        config.provider = "my-proxy".into();
        config.api_url = Some("http://localhost:9999/v1".into());
        assert_eq!(build_from_config(&config).unwrap().name(), "my-proxy");
    }

    #[test]
    fn unknown_provider_without_url_rejected() {
        let mut config = config_with_key();
        config.provider = "mystery".into();
        assert!(matches!(
            build_from_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn well_known_urls() {
        assert!(default_base_url("openai").unwrap().contains("api.openai.com"));
        assert!(default_base_url("gemini").unwrap().contains("generativelanguage"));
        assert!(default_base_url("nope").is_none());
    }
}
