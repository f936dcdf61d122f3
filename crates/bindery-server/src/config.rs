use bindery_core::{AppError, PollPolicy};

/// Server configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub api_key: String,
    pub port: u16,
    pub runner_url: String,
    pub runner_token: Option<String>,
    pub allow_private_urls: bool,
    pub poll: PollPolicy,
}

impl ServerConfig {
    /// Reads `BINDERY_SERVER_API_KEY` (required), `BINDERY_SERVER_PORT`
    /// (default 3000), `BINDERY_RUNNER_URL` (required), `BINDERY_RUNNER_TOKEN`,
    /// `BINDERY_ALLOW_PRIVATE_URLS` and the poll policy variables.
    pub fn from_env() -> Result<Self, AppError> {
        let mut config = Self::from_lookup(|name| std::env::var(name).ok())?;
        config.poll = PollPolicy::from_env()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let api_key = lookup("BINDERY_SERVER_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                AppError::ConfigError(
                    "BINDERY_SERVER_API_KEY not set. Required to protect /v1 routes.".into(),
                )
            })?;

        let port = match lookup("BINDERY_SERVER_PORT") {
            None => 3000,
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                AppError::ConfigError(format!(
                    "Invalid BINDERY_SERVER_PORT '{raw}': must be a port number"
                ))
            })?,
        };

        let runner_url = lookup("BINDERY_RUNNER_URL")
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                AppError::ConfigError(
                    "BINDERY_RUNNER_URL not set. Required for sync routes.".into(),
                )
            })?;

        let allow_private_urls = match lookup("BINDERY_ALLOW_PRIVATE_URLS") {
            None => false,
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                _ => {
                    return Err(AppError::ConfigError(format!(
                        "Invalid BINDERY_ALLOW_PRIVATE_URLS '{raw}': expected true or false"
                    )));
                }
            },
        };

        Ok(Self {
            api_key,
            port,
            runner_url,
            runner_token: lookup("BINDERY_RUNNER_TOKEN").filter(|t| !t.is_empty()),
            allow_private_urls,
            poll: PollPolicy::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_minimal_config() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("BINDERY_SERVER_API_KEY", "secret"),
            ("BINDERY_RUNNER_URL", "http://runner:9000"),
        ]))
        .unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.runner_token, None);
        assert!(!config.allow_private_urls);
    }

    #[test]
    fn test_full_config() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("BINDERY_SERVER_API_KEY", "secret"),
            ("BINDERY_SERVER_PORT", "8080"),
            ("BINDERY_RUNNER_URL", "http://runner:9000"),
            ("BINDERY_RUNNER_TOKEN", "tok"),
            ("BINDERY_ALLOW_PRIVATE_URLS", "true"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.runner_token.as_deref(), Some("tok"));
        assert!(config.allow_private_urls);
    }

    #[test]
    fn test_missing_required_values() {
        let err = ServerConfig::from_lookup(lookup(&[("BINDERY_RUNNER_URL", "http://r")])).unwrap_err();
        assert!(err.to_string().contains("BINDERY_SERVER_API_KEY"));

        let err = ServerConfig::from_lookup(lookup(&[("BINDERY_SERVER_API_KEY", "k")])).unwrap_err();
        assert!(err.to_string().contains("BINDERY_RUNNER_URL"));
    }

    #[test]
    fn test_invalid_values() {
        let err = ServerConfig::from_lookup(lookup(&[
            ("BINDERY_SERVER_API_KEY", "k"),
            ("BINDERY_RUNNER_URL", "http://r"),
            ("BINDERY_SERVER_PORT", "99999"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));

        let err = ServerConfig::from_lookup(lookup(&[
            ("BINDERY_SERVER_API_KEY", "k"),
            ("BINDERY_RUNNER_URL", "http://r"),
            ("BINDERY_ALLOW_PRIVATE_URLS", "maybe"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("BINDERY_ALLOW_PRIVATE_URLS"));
    }
}
