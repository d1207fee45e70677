#![allow(clippy::result_large_err)]

use super::ScrivenerConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use scrivener_types::InferenceProvider;
use url::Url;

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration rules
    pub fn validate(config: &ScrivenerConfig) -> Result<(), AppError> {
        if config.storage.database_path.as_os_str().is_empty() {
            return Err(invalid("storage.database_path cannot be empty"));
        }

        if config.execution.request_timeout_seconds == 0 {
            return Err(invalid(
                "execution.request_timeout_seconds must be greater than zero",
            ));
        }

        if config.execution.step_timeout_seconds == Some(0) {
            return Err(invalid(
                "execution.step_timeout_seconds must be greater than zero when set",
            ));
        }

        for provider in InferenceProvider::ALL {
            if let Some(base_url) = &config.providers.get(provider).base_url {
                let parsed = Url::parse(base_url).map_err(|err| {
                    invalid(format!(
                        "providers.{}.base_url is not a valid URL: {}",
                        provider.as_str().to_lowercase(),
                        err
                    ))
                })?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(invalid(format!(
                        "providers.{}.base_url must use http or https",
                        provider.as_str().to_lowercase()
                    )));
                }
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::new(ErrorCategory::ValidationError, message).with_code("CFG-010")
}
