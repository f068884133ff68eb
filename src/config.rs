//! Process configuration, read once at startup.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::gateway::candidates::ModelCandidates;
use crate::gateway::gemini::DEFAULT_GEMINI_BASE_URL;

pub const DEFAULT_BIND: &str = "127.0.0.1:5000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

/// Which upstream API the gateway talks to.
#[derive(Clone, PartialEq)]
pub enum ProviderSettings {
    /// Gemini `generateContent`.
    Gemini { api_key: String, base_url: String },
    /// OpenAI-compatible on-prem gateway.
    Internal {
        url: String,
        api_key: String,
        native_json_mode: bool,
    },
    /// No credentials; every completion fails with `ConfigError`.
    Unconfigured { reason: String },
}

impl ProviderSettings {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gemini { .. } => "gemini",
            Self::Internal { .. } => "openai_compat",
            Self::Unconfigured { .. } => "unconfigured",
        }
    }
}

// Keys never reach logs.
impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini { base_url, .. } => f
                .debug_struct("Gemini")
                .field("base_url", base_url)
                .finish_non_exhaustive(),
            Self::Internal {
                url,
                native_json_mode,
                ..
            } => f
                .debug_struct("Internal")
                .field("url", url)
                .field("native_json_mode", native_json_mode)
                .finish_non_exhaustive(),
            Self::Unconfigured { reason } => f
                .debug_struct("Unconfigured")
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Immutable runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: ProviderSettings,
    pub models: ModelCandidates,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub bind: SocketAddr,
}

impl Settings {
    /// Read from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through an arbitrary variable lookup. Blank values count as unset.
    ///
    /// The legacy names `url_interna`, `key_interna` and `GPT_MODEL` are read when the
    /// primary variable is unset. `GPT_MODEL` holds a single model id.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let internal_url = get("INTERNAL_LLM_URL").or_else(|| get("url_interna"));
        let internal_key = get("INTERNAL_LLM_KEY").or_else(|| get("key_interna"));
        let gemini_key = get("GEMINI_API_KEY");

        let provider = match (internal_url, internal_key, gemini_key) {
            (Some(url), Some(api_key), _) => ProviderSettings::Internal {
                url,
                api_key,
                native_json_mode: parse_bool(
                    "INTERNAL_LLM_JSON_MODE",
                    get("INTERNAL_LLM_JSON_MODE"),
                )?,
            },
            (_, _, Some(api_key)) => ProviderSettings::Gemini {
                api_key,
                base_url: get("GEMINI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            },
            (Some(_), None, None) => ProviderSettings::Unconfigured {
                reason: "INTERNAL_LLM_KEY not set".to_string(),
            },
            (None, Some(_), None) => ProviderSettings::Unconfigured {
                reason: "INTERNAL_LLM_URL not set".to_string(),
            },
            (None, None, None) => ProviderSettings::Unconfigured {
                reason: concat!(
                    "no LLM credentials configured ",
                    "(set GEMINI_API_KEY or INTERNAL_LLM_URL and INTERNAL_LLM_KEY)"
                )
                .to_string(),
            },
        };

        let models = match (get("LLM_MODEL"), get("GPT_MODEL")) {
            (Some(raw), _) => ModelCandidates::parse_list(&raw),
            (None, Some(single)) => ModelCandidates::new([single]),
            (None, None) => match provider {
                ProviderSettings::Internal { .. } => ModelCandidates::internal_default(),
                _ => ModelCandidates::gemini_default(),
            },
        };

        let timeout = match get("LLM_TIMEOUT_SECONDS") {
            Some(raw) => Duration::from_secs(parse_num("LLM_TIMEOUT_SECONDS", &raw)?),
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let temperature = match get("LLM_TEMPERATURE") {
            Some(raw) => parse_num("LLM_TEMPERATURE", &raw)?,
            None => DEFAULT_TEMPERATURE,
        };

        let max_tokens = get("LLM_MAX_TOKENS")
            .map(|raw| parse_num("LLM_MAX_TOKENS", &raw))
            .transpose()?;

        let bind = get("STORY4D_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = parse_num("STORY4D_BIND", &bind)?;

        Ok(Self {
            provider,
            models,
            timeout,
            temperature,
            max_tokens,
            bind,
        })
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self.provider, ProviderSettings::Unconfigured { .. })
    }
}

fn parse_num<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        message: format!("{raw:?}: {e}"),
    })
}

fn parse_bool(var: &'static str, raw: Option<String>) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            var,
            message: format!("{other:?} is not a boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn empty_environment_is_unconfigured_with_defaults() {
        let s = settings(&[]).unwrap();
        assert!(!s.is_configured());
        assert_eq!(s.models, ModelCandidates::gemini_default());
        assert_eq!(s.timeout, Duration::from_secs(60));
        assert_eq!(s.bind.to_string(), DEFAULT_BIND);
    }

    #[test]
    fn gemini_key_selects_gemini() {
        let s = settings(&[("GEMINI_API_KEY", "g-key")]).unwrap();
        assert_eq!(s.provider.name(), "gemini");
        match s.provider {
            ProviderSettings::Gemini { base_url, .. } => {
                assert_eq!(base_url, DEFAULT_GEMINI_BASE_URL)
            }
            other => panic!("expected gemini, got {other:?}"),
        }
    }

    #[test]
    fn internal_gateway_wins_when_fully_configured() {
        let s = settings(&[
            ("GEMINI_API_KEY", "g-key"),
            ("INTERNAL_LLM_URL", "http://llm.local/v1/chat/completions"),
            ("INTERNAL_LLM_KEY", "i-key"),
            ("INTERNAL_LLM_JSON_MODE", "true"),
        ])
        .unwrap();
        assert_eq!(
            s.provider,
            ProviderSettings::Internal {
                url: "http://llm.local/v1/chat/completions".into(),
                api_key: "i-key".into(),
                native_json_mode: true,
            }
        );
        assert_eq!(s.models, ModelCandidates::internal_default());
    }

    #[test]
    fn half_configured_internal_gateway_reports_missing_half() {
        let s = settings(&[("INTERNAL_LLM_URL", "http://llm.local")]).unwrap();
        assert_eq!(
            s.provider,
            ProviderSettings::Unconfigured {
                reason: "INTERNAL_LLM_KEY not set".into()
            }
        );
    }

    #[test]
    fn model_override_replaces_default_list() {
        let s = settings(&[
            ("GEMINI_API_KEY", "k"),
            ("LLM_MODEL", "gemini-2.5-pro, gemini-2.5-flash"),
        ])
        .unwrap();
        assert_eq!(s.models.as_slice(), &["gemini-2.5-pro", "gemini-2.5-flash"]);
    }

    #[test]
    fn legacy_backend_variable_names_are_accepted() {
        let s = settings(&[
            ("url_interna", "http://llm.local/v1/chat/completions"),
            ("key_interna", "i-key"),
            ("GPT_MODEL", "gpt-4o-mini"),
        ])
        .unwrap();
        assert_eq!(s.provider.name(), "openai_compat");
        match &s.provider {
            ProviderSettings::Internal { url, api_key, .. } => {
                assert_eq!(url, "http://llm.local/v1/chat/completions");
                assert_eq!(api_key, "i-key");
            }
            other => panic!("expected internal, got {other:?}"),
        }
        assert_eq!(s.models.as_slice(), &["gpt-4o-mini"]);

        // Primary names win over the legacy ones.
        let s = settings(&[
            ("INTERNAL_LLM_URL", "http://primary"),
            ("url_interna", "http://legacy"),
            ("INTERNAL_LLM_KEY", "k"),
            ("LLM_MODEL", "a,b"),
            ("GPT_MODEL", "c"),
        ])
        .unwrap();
        assert!(matches!(
            &s.provider,
            ProviderSettings::Internal { url, .. } if url == "http://primary"
        ));
        assert_eq!(s.models.as_slice(), &["a", "b"]);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let s = settings(&[("GEMINI_API_KEY", "   "), ("LLM_MODEL", "")]).unwrap();
        assert!(!s.is_configured());
        assert_eq!(s.models, ModelCandidates::gemini_default());
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = settings(&[("LLM_TIMEOUT_SECONDS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("LLM_TIMEOUT_SECONDS"));
        let err = settings(&[
            ("INTERNAL_LLM_URL", "http://llm.local"),
            ("INTERNAL_LLM_KEY", "k"),
            ("INTERNAL_LLM_JSON_MODE", "maybe"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("INTERNAL_LLM_JSON_MODE"));
    }

    #[test]
    fn debug_output_hides_keys() {
        let s = settings(&[("GEMINI_API_KEY", "super-secret")]).unwrap();
        assert!(!format!("{s:?}").contains("super-secret"));
    }
}
