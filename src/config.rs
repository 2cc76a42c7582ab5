use std::env;
use url::Url;

/// Runtime configuration for the GitLab and Gerrit API clients.
/// Values are sourced from environment variables once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub gitlab: Option<GitLabConfig>,
    pub gerrit: Option<GerritConfig>,
    /// Human-readable reasons for each backend that could not be configured.
    pub missing: Vec<String>,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub log_level: Option<String>,
    pub debug: bool,
}

#[derive(Debug, Clone)]
pub struct GitLabConfig {
    /// Fully qualified API root, e.g. `https://gitlab.com/api/v4`.
    pub api_url: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct GerritConfig {
    /// Base URL of the Gerrit server, without trailing slash.
    pub base_url: String,
    pub user: String,
    pub http_password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var}: {value:?} is not a valid URL ({source})")]
    InvalidUrl {
        var: &'static str,
        value: String,
        source: url::ParseError,
    },
    #[error("invalid {var}: {value:?} is not a non-negative integer")]
    InvalidNumber { var: &'static str, value: String },
}

impl Config {
    /// Load configuration from environment.
    ///
    /// Env vars:
    /// - GITLAB_HOST (default: gitlab.com), GITLAB_TOKEN, GITLAB_API_VERSION (default: v4)
    /// - GERRIT_HOST, GERRIT_USER, GERRIT_HTTP_PASSWORD
    /// - REQUEST_TIMEOUT (default: 30), MAX_RETRIES (default: 3)
    /// - USER_AGENT (default: review-mcp/<version>)
    /// - LOG_LEVEL, DEBUG
    ///
    /// A backend with missing credentials is left unconfigured rather than
    /// failing startup; its tools report `not_configured` when called.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());
        let mut missing = Vec::new();

        let gitlab = match var("GITLAB_TOKEN") {
            Some(token) => {
                let host = var("GITLAB_HOST").unwrap_or_else(|| "gitlab.com".to_string());
                let api_version = var("GITLAB_API_VERSION").unwrap_or_else(|| "v4".to_string());
                let base = normalize_base_url("GITLAB_HOST", &host)?;
                Some(GitLabConfig {
                    api_url: format!("{}/api/{}", base, api_version),
                    token,
                })
            }
            None => {
                missing.push("GitLab tools need GITLAB_TOKEN".to_string());
                None
            }
        };

        let gerrit = match (var("GERRIT_HOST"), var("GERRIT_USER"), var("GERRIT_HTTP_PASSWORD")) {
            (Some(host), Some(user), Some(http_password)) => Some(GerritConfig {
                base_url: normalize_base_url("GERRIT_HOST", &host)?,
                user,
                http_password,
            }),
            (host, user, password) => {
                let absent: Vec<&str> = [
                    ("GERRIT_HOST", host.is_none()),
                    ("GERRIT_USER", user.is_none()),
                    ("GERRIT_HTTP_PASSWORD", password.is_none()),
                ]
                .iter()
                .filter(|(_, is_missing)| *is_missing)
                .map(|(name, _)| *name)
                .collect();
                missing.push(format!("Gerrit tools need {}", absent.join(", ")));
                None
            }
        };

        let timeout_secs = parse_number::<u64>("REQUEST_TIMEOUT", var("REQUEST_TIMEOUT"), 30)?;
        let max_retries = parse_number::<u32>("MAX_RETRIES", var("MAX_RETRIES"), 3)?;
        let default_ua = format!("review-mcp/{}", env!("CARGO_PKG_VERSION"));
        let user_agent = var("USER_AGENT").unwrap_or(default_ua);
        let debug = matches!(
            var("DEBUG").map(|s| s.to_ascii_lowercase()).as_deref(),
            Some("1" | "true" | "yes" | "on")
        );

        Ok(Self {
            gitlab,
            gerrit,
            missing,
            user_agent,
            timeout_secs,
            max_retries,
            log_level: var("LOG_LEVEL"),
            debug,
        })
    }

    /// Effective log filter: an explicit CLI level wins, then DEBUG, then LOG_LEVEL.
    pub fn effective_log_level(&self, cli_level: Option<&str>) -> String {
        if let Some(lvl) = cli_level {
            return lvl.to_string();
        }
        if self.debug {
            return "debug".to_string();
        }
        self.log_level.clone().unwrap_or_else(|| "info".to_string())
    }
}

fn normalize_base_url(var: &'static str, host: &str) -> Result<String, ConfigError> {
    let trimmed = host.trim().trim_end_matches('/');
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    Url::parse(&candidate).map_err(|source| ConfigError::InvalidUrl {
        var,
        value: host.to_string(),
        source,
    })?;
    Ok(candidate)
}

fn parse_number<T: std::str::FromStr>(
    var: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(s) => s
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { var, value: s }),
    }
}
