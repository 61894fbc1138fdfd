use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "NGN";
const DEFAULT_PAYSTACK_BASE_URL: &str = "https://api.paystack.co";

/// Marketplace money rules.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommerceConfig {
    /// ISO currency code for orders, wallets and payment transactions
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Flat fee added to every order total
    #[serde(default = "default_shipping_fee")]
    pub shipping_fee: Decimal,

    /// Smallest amount an entrepreneur may withdraw
    #[serde(default = "default_minimum_withdrawal")]
    pub minimum_withdrawal: Decimal,

    /// Fraction of the withdrawn amount charged as a processing fee
    #[serde(default = "default_withdrawal_fee_rate")]
    pub withdrawal_fee_rate: Decimal,

    /// Floor applied to the processing fee
    #[serde(default = "default_withdrawal_minimum_fee")]
    pub withdrawal_minimum_fee: Decimal,

    /// Attempts made for a unit of work that loses an optimistic-lock race
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

impl Default for CommerceConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            shipping_fee: default_shipping_fee(),
            minimum_withdrawal: default_minimum_withdrawal(),
            withdrawal_fee_rate: default_withdrawal_fee_rate(),
            withdrawal_minimum_fee: default_withdrawal_minimum_fee(),
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

/// Paystack credentials and transport tuning.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaystackConfig {
    /// Secret key, used both as API bearer token and webhook HMAC key
    #[serde(default)]
    pub secret_key: String,

    #[serde(default = "default_paystack_base_url")]
    pub base_url: String,

    #[serde(default = "default_paystack_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts for transport-level failures (connect errors, timeouts)
    #[serde(default = "default_paystack_max_attempts")]
    pub max_attempts: u32,
}

impl Default for PaystackConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            base_url: default_paystack_base_url(),
            timeout_secs: default_paystack_timeout_secs(),
            max_attempts: default_paystack_max_attempts(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1))]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB connect timeout (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    /// DB idle timeout (seconds)
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    /// DB acquire timeout (seconds)
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Capacity of the in-process domain event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    #[serde(default)]
    pub commerce: CommerceConfig,

    #[serde(default)]
    pub paystack: PaystackConfig,
}

impl AppConfig {
    /// Builds a configuration with every optional setting at its default.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            commerce: CommerceConfig::default(),
            paystack: PaystackConfig::default(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
            || self.environment.eq_ignore_ascii_case("test")
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Cross-field rules the derive cannot express.
    pub fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let commerce = &self.commerce;

        if commerce.currency.len() != 3 {
            let mut err = ValidationError::new("currency");
            err.message = Some("Currency must be a three-letter ISO code".into());
            errors.add("commerce.currency", err);
        }

        let money_settings = [
            ("commerce.shipping_fee", commerce.shipping_fee),
            ("commerce.minimum_withdrawal", commerce.minimum_withdrawal),
            ("commerce.withdrawal_minimum_fee", commerce.withdrawal_minimum_fee),
        ];
        for (field, value) in money_settings {
            if value.is_sign_negative() {
                let mut err = ValidationError::new("negative_amount");
                err.message = Some("Monetary settings must not be negative".into());
                errors.add(field, err);
            }
        }

        if commerce.withdrawal_fee_rate.is_sign_negative()
            || commerce.withdrawal_fee_rate >= Decimal::ONE
        {
            let mut err = ValidationError::new("withdrawal_fee_rate");
            err.message = Some("Withdrawal fee rate must be in [0, 1)".into());
            errors.add("commerce.withdrawal_fee_rate", err);
        }

        if commerce.max_conflict_retries == 0 {
            let mut err = ValidationError::new("max_conflict_retries");
            err.message = Some("At least one attempt is required".into());
            errors.add("commerce.max_conflict_retries", err);
        }

        if self.paystack.max_attempts == 0 {
            let mut err = ValidationError::new("max_attempts");
            err.message = Some("At least one attempt is required".into());
            errors.add("paystack.max_attempts", err);
        }

        if !self.is_development() && self.paystack.secret_key.trim().is_empty() {
            let mut err = ValidationError::new("paystack_secret_required");
            err.message = Some(
                "Set APP__PAYSTACK__SECRET_KEY for non-development environments".into(),
            );
            errors.add("paystack.secret_key", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    20
}

fn default_db_min_connections() -> u32 {
    2
}

fn default_db_connect_timeout_secs() -> u64 {
    10
}

fn default_db_idle_timeout_secs() -> u64 {
    600
}

fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_shipping_fee() -> Decimal {
    dec!(500.00)
}

fn default_minimum_withdrawal() -> Decimal {
    dec!(1000.00)
}

fn default_withdrawal_fee_rate() -> Decimal {
    dec!(0.02)
}

fn default_withdrawal_minimum_fee() -> Decimal {
    dec!(50.00)
}

fn default_max_conflict_retries() -> u32 {
    3
}

fn default_paystack_base_url() -> String {
    DEFAULT_PAYSTACK_BASE_URL.to_string()
}

fn default_paystack_timeout_secs() -> u64 {
    15
}

fn default_paystack_max_attempts() -> u32 {
    3
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Installs the global tracing subscriber. `RUST_LOG` wins over `level`.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("payjaro_api={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(&filter_directive)
        .unwrap_or_else(|_| EnvFilter::new(format!("payjaro_api={}", DEFAULT_LOG_LEVEL)));

    let result = if json {
        fmt().with_env_filter(filter).json().try_init()
    } else {
        fmt().with_env_filter(filter).try_init()
    };
    if result.is_err() {
        // Tests and embedders may have installed a subscriber already.
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Loads configuration from defaults, `config/` files and `APP__*` environment variables.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://payjaro.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
