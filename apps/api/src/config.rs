use anyhow::{bail, Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub ai: AiSettings,
    pub cache: CacheSettings,
    pub governance: GovernanceSettings,
    pub rate_limit: RateLimitSettings,
}

/// Immutable snapshot handed to the orchestrator at construction.
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub primary_model: String,
    pub fallback_model: String,
    /// When set, every outbound model call fails fast with `AI_DISABLED`.
    pub kill_switch: bool,
    pub default_temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub backend: CacheBackend,
    pub redis_url: Option<String>,
    pub default_ttl_secs: u64,
}

/// Entries never outlive this, whatever TTL a caller asks for.
pub const MAX_CACHE_TTL_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct GovernanceSettings {
    /// Records whose bias score is strictly above this value are flagged for review.
    pub bias_threshold: f64,
    /// Replaces the built-in decision vocabulary when set.
    pub decision_terms: Option<Vec<String>>,
    /// Replaces the built-in protected-attribute vocabulary when set.
    pub protected_terms: Option<Vec<String>>,
}

/// Fixed one-minute windows. A limit of 0 turns that limiter off.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    pub requests_per_minute: u32,
    /// Stricter budget for the endpoints that call a model.
    pub ai_requests_per_minute: u32,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            primary_model: "claude-sonnet-4-5".to_string(),
            fallback_model: "claude-haiku-4-5".to_string(),
            kill_switch: false,
            default_temperature: 0.7,
            timeout_secs: 120,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Memory,
            redis_url: None,
            default_ttl_secs: 3600,
        }
    }
}

impl Default for GovernanceSettings {
    fn default() -> Self {
        Self {
            bias_threshold: 0.0,
            decision_terms: None,
            protected_terms: None,
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            ai_requests_per_minute: 5,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let ai_defaults = AiSettings::default();
        let ai = AiSettings {
            primary_model: optional_env("AI_MODEL_NAME").unwrap_or(ai_defaults.primary_model),
            fallback_model: optional_env("AI_FALLBACK_MODEL")
                .unwrap_or(ai_defaults.fallback_model),
            kill_switch: parse_flag("AI_KILL_SWITCH", false)?,
            default_temperature: parse_env("AI_TEMPERATURE", ai_defaults.default_temperature)?,
            timeout_secs: parse_env("LLM_TIMEOUT_SECS", ai_defaults.timeout_secs)?,
        };

        let backend = match optional_env("CACHE_BACKEND").as_deref() {
            None | Some("memory") => CacheBackend::Memory,
            Some("redis") => CacheBackend::Redis,
            Some(other) => bail!("CACHE_BACKEND must be 'redis' or 'memory', got '{other}'"),
        };
        let redis_url = match backend {
            CacheBackend::Redis => Some(require_env("REDIS_URL")?),
            CacheBackend::Memory => optional_env("REDIS_URL"),
        };
        let cache = CacheSettings {
            enabled: parse_flag("ENABLE_CACHING", true)?,
            backend,
            redis_url,
            default_ttl_secs: parse_env::<u64>("CACHE_TTL_SECS", 3600)?.min(MAX_CACHE_TTL_SECS),
        };

        let governance = GovernanceSettings {
            bias_threshold: parse_env("GOVERNANCE_BIAS_THRESHOLD", 0.0)?,
            decision_terms: optional_env("BIAS_DECISION_TERMS").map(|raw| parse_list(&raw)),
            protected_terms: optional_env("BIAS_PROTECTED_TERMS").map(|raw| parse_list(&raw)),
        };

        let limit_defaults = RateLimitSettings::default();
        let rate_limit = RateLimitSettings {
            requests_per_minute: parse_env(
                "RATE_LIMIT_PER_MINUTE",
                limit_defaults.requests_per_minute,
            )?,
            ai_requests_per_minute: parse_env(
                "AI_RATE_LIMIT_PER_MINUTE",
                limit_defaults.ai_requests_per_minute,
            )?,
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            ai,
            cache,
            governance,
            rate_limit,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn parse_flag(key: &str, default: bool) -> Result<bool> {
    match optional_env(key) {
        Some(raw) => parse_bool(&raw).with_context(|| format!("{key} must be a boolean, got '{raw}'")),
        None => Ok(default),
    }
}

/// Comma-separated, trimmed, lowercased, empties dropped.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty())
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_accepts_common_spellings() {
        for raw in ["true", "TRUE", "1", "yes", " on "] {
            assert_eq!(parse_bool(raw), Some(true), "{raw}");
        }
        for raw in ["false", "0", "No", "off"] {
            assert_eq!(parse_bool(raw), Some(false), "{raw}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_defaults_keep_ai_enabled_and_caching_on() {
        assert!(!AiSettings::default().kill_switch);
        assert!(CacheSettings::default().enabled);
        assert_eq!(CacheSettings::default().backend, CacheBackend::Memory);
        assert_eq!(GovernanceSettings::default().bias_threshold, 0.0);
        assert_eq!(RateLimitSettings::default().ai_requests_per_minute, 5);
    }

    #[test]
    fn test_parse_list_trims_and_lowercases() {
        assert_eq!(
            parse_list(" Promote, ,TERMINATE ,bonus"),
            vec!["promote", "terminate", "bonus"]
        );
        assert!(parse_list(" , ").is_empty());
    }
}
