use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODELS_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.0-flash-live-001";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
///
/// Credentials, model and endpoint are optional here: a relay with none of
/// them still starts, and each session reports the gap to its client.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub gemini_api_key: Option<SecretString>,
    pub gemini_bearer_token: Option<SecretString>,
    pub live_endpoint: Option<String>,
    pub models_endpoint: String,
    pub live_model: Option<String>,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub input_transcription: bool,
    pub output_transcription: bool,
    pub output_sample_rate: u32,
    pub setup_timeout: Duration,
    pub model_cache_ttl: Duration,
    pub system_prompt_path: PathBuf,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let gemini_api_key = non_empty_var("GEMINI_API_KEY").map(SecretString::from);
        let gemini_bearer_token = non_empty_var("GEMINI_BEARER_TOKEN").map(SecretString::from);

        // Unset falls back to the default; set-but-empty means "none".
        let live_endpoint = optional_with_default("LIVE_ENDPOINT", DEFAULT_LIVE_ENDPOINT);
        let live_model = optional_with_default("LIVE_MODEL", DEFAULT_LIVE_MODEL);
        let models_endpoint = std::env::var("MODELS_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_MODELS_ENDPOINT.to_string());

        let temperature: f64 = parse_var("LIVE_TEMPERATURE", 0.7)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue(
                "LIVE_TEMPERATURE".to_string(),
                format!("{temperature} is outside 0.0..=2.0"),
            ));
        }

        let max_output_tokens: u32 = parse_var("LIVE_MAX_OUTPUT_TOKENS", 1024)?;
        if max_output_tokens == 0 {
            return Err(ConfigError::InvalidValue(
                "LIVE_MAX_OUTPUT_TOKENS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let input_transcription = parse_flag("LIVE_INPUT_TRANSCRIPTION", true)?;
        let output_transcription = parse_flag("LIVE_OUTPUT_TRANSCRIPTION", true)?;
        let output_sample_rate: u32 = parse_var(
            "OUTPUT_SAMPLE_RATE",
            live_protocol::audio::OUTPUT_SAMPLE_RATE,
        )?;
        let setup_timeout = Duration::from_secs(parse_var("SETUP_TIMEOUT_SECS", 15)?);
        let model_cache_ttl = Duration::from_secs(parse_var("MODEL_CACHE_TTL_SECS", 300)?);

        let system_prompt_path = std::env::var("SYSTEM_PROMPT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts/system_prompt.md"));

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            gemini_api_key,
            gemini_bearer_token,
            live_endpoint,
            models_endpoint,
            live_model,
            temperature,
            max_output_tokens,
            input_transcription,
            output_transcription,
            output_sample_rate,
            setup_timeout,
            model_cache_ttl,
            system_prompt_path,
            log_level,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn optional_with_default(name: &str, default: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if value.trim().is_empty() => None,
        Ok(value) => Some(value),
        Err(_) => Some(default.to_string()),
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_flag(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidValue(
                name.to_string(),
                format!("'{other}' is not a boolean"),
            )),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::env;

    const VARS: &[&str] = &[
        "BIND_ADDRESS",
        "GEMINI_API_KEY",
        "GEMINI_BEARER_TOKEN",
        "LIVE_ENDPOINT",
        "MODELS_ENDPOINT",
        "LIVE_MODEL",
        "LIVE_TEMPERATURE",
        "LIVE_MAX_OUTPUT_TOKENS",
        "LIVE_INPUT_TRANSCRIPTION",
        "LIVE_OUTPUT_TRANSCRIPTION",
        "OUTPUT_SAMPLE_RATE",
        "SETUP_TIMEOUT_SECS",
        "MODEL_CACHE_TTL_SECS",
        "SYSTEM_PROMPT_PATH",
        "RUST_LOG",
    ];

    fn clear_env_vars() {
        for var in VARS {
            unsafe { env::remove_var(var) };
        }
    }

    #[test]
    fn test_config_error_display() {
        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert!(config.gemini_api_key.is_none());
        assert!(config.gemini_bearer_token.is_none());
        assert_eq!(config.live_endpoint.as_deref(), Some(DEFAULT_LIVE_ENDPOINT));
        assert_eq!(config.models_endpoint, DEFAULT_MODELS_ENDPOINT);
        assert_eq!(config.live_model.as_deref(), Some(DEFAULT_LIVE_MODEL));
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.max_output_tokens, 1024);
        assert!(config.input_transcription);
        assert!(config.output_transcription);
        assert_eq!(config.output_sample_rate, 24000);
        assert_eq!(config.setup_timeout, Duration::from_secs(15));
        assert_eq!(config.model_cache_ttl, Duration::from_secs(300));
        assert_eq!(
            config.system_prompt_path,
            PathBuf::from("./prompts/system_prompt.md")
        );
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("GEMINI_API_KEY", "key-123");
            env::set_var("LIVE_MODEL", "gemini-live-test");
            env::set_var("LIVE_TEMPERATURE", "1.2");
            env::set_var("LIVE_MAX_OUTPUT_TOKENS", "64");
            env::set_var("LIVE_OUTPUT_TRANSCRIPTION", "off");
            env::set_var("SETUP_TIMEOUT_SECS", "3");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(
            config.gemini_api_key.as_ref().map(|k| k.expose_secret()),
            Some("key-123")
        );
        assert_eq!(config.live_model.as_deref(), Some("gemini-live-test"));
        assert_eq!(config.temperature, 1.2);
        assert_eq!(config.max_output_tokens, 64);
        assert!(config.input_transcription);
        assert!(!config.output_transcription);
        assert_eq!(config.setup_timeout, Duration::from_secs(3));
        assert_eq!(config.log_level, Level::DEBUG);
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_empty_model_and_endpoint_mean_none() {
        clear_env_vars();
        unsafe {
            env::set_var("LIVE_MODEL", "");
            env::set_var("LIVE_ENDPOINT", " ");
            env::set_var("GEMINI_API_KEY", "");
        }

        let config = Config::from_env().expect("Config should load successfully");
        assert!(config.live_model.is_none());
        assert!(config.live_endpoint.is_none());
        assert!(config.gemini_api_key.is_none());
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        unsafe { env::set_var("BIND_ADDRESS", "not-a-valid-address") };

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_rejects_out_of_range_generation_options() {
        clear_env_vars();
        unsafe { env::set_var("LIVE_TEMPERATURE", "3.5") };
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "LIVE_TEMPERATURE"),
            _ => panic!("Expected InvalidValue for LIVE_TEMPERATURE"),
        }

        clear_env_vars();
        unsafe { env::set_var("LIVE_MAX_OUTPUT_TOKENS", "0") };
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "LIVE_MAX_OUTPUT_TOKENS"),
            _ => panic!("Expected InvalidValue for LIVE_MAX_OUTPUT_TOKENS"),
        }
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_invalid_flag_and_log_level() {
        clear_env_vars();
        unsafe { env::set_var("LIVE_INPUT_TRANSCRIPTION", "maybe") };
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "LIVE_INPUT_TRANSCRIPTION"),
            _ => panic!("Expected InvalidValue for LIVE_INPUT_TRANSCRIPTION"),
        }

        clear_env_vars();
        unsafe { env::set_var("RUST_LOG", "not-a-level") };
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
        clear_env_vars();
    }
}
