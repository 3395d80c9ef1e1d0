use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub test_before_acquire: bool,
}

/// Booking and payment policy knobs
#[derive(Debug, Clone)]
pub struct BookingConfig {
    /// Sliding cart hold, reset on every cart mutation
    pub cart_hold_minutes: i64,
    /// Payment window communicated to MoneyMarket payers
    pub money_market_window_hours: i64,
    /// Settlement conflicts without ledger progress before one is surfaced
    pub settlement_max_attempts: u32,
    /// 0 disables the background sweeper
    pub expiry_sweep_interval_secs: u64,
    /// External card gateway; the simulated gateway is used when unset
    pub card_gateway_url: Option<String>,
    pub audit_log_dir: PathBuf,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub booking: BookingConfig,
    pub log_level: String,
    pub log_format: String,
    pub grpc_port: u16,
    pub environment: String,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}

impl DatabaseConfig {
    /// Create database config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable is required")?;

        let max_connections = env_parse::<u32>("DATABASE_MAX_CONNECTIONS").unwrap_or(10);
        let acquire_timeout_secs = env_parse::<u64>("DATABASE_ACQUIRE_TIMEOUT_SECS").unwrap_or(30);
        let idle_timeout_secs = env_parse::<u64>("DATABASE_IDLE_TIMEOUT_SECS").unwrap_or(600); // 10 minutes
        let max_lifetime_secs = env_parse::<u64>("DATABASE_MAX_LIFETIME_SECS").unwrap_or(1800); // 30 minutes
        let test_before_acquire = env_parse::<bool>("DATABASE_TEST_BEFORE_ACQUIRE").unwrap_or(true);

        // Validate configuration
        if max_connections == 0 {
            return Err("DATABASE_MAX_CONNECTIONS must be greater than 0".to_string());
        }

        if acquire_timeout_secs == 0 {
            return Err("DATABASE_ACQUIRE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            url,
            max_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
            test_before_acquire,
        })
    }

    /// Get acquire timeout as Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Get max lifetime as Duration
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/ticketing".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            test_before_acquire: true,
        }
    }
}

impl BookingConfig {
    /// Create booking policy from environment variables
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let cart_hold_minutes =
            env_parse::<i64>("CART_HOLD_MINUTES").unwrap_or(defaults.cart_hold_minutes);
        let money_market_window_hours = env_parse::<i64>("MONEY_MARKET_WINDOW_HOURS")
            .unwrap_or(defaults.money_market_window_hours);
        let settlement_max_attempts = env_parse::<u32>("SETTLEMENT_MAX_ATTEMPTS")
            .unwrap_or(defaults.settlement_max_attempts);
        let expiry_sweep_interval_secs = env_parse::<u64>("EXPIRY_SWEEP_INTERVAL_SECS")
            .unwrap_or(defaults.expiry_sweep_interval_secs);
        let card_gateway_url = env::var("CARD_GATEWAY_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        let audit_log_dir = env::var("AUDIT_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.audit_log_dir);

        if cart_hold_minutes <= 0 {
            return Err("CART_HOLD_MINUTES must be greater than 0".to_string());
        }

        if money_market_window_hours <= 0 {
            return Err("MONEY_MARKET_WINDOW_HOURS must be greater than 0".to_string());
        }

        if settlement_max_attempts == 0 {
            return Err("SETTLEMENT_MAX_ATTEMPTS must be greater than 0".to_string());
        }

        Ok(Self {
            cart_hold_minutes,
            money_market_window_hours,
            settlement_max_attempts,
            expiry_sweep_interval_secs,
            card_gateway_url,
            audit_log_dir,
        })
    }

    pub fn cart_hold(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cart_hold_minutes)
    }

    pub fn money_market_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.money_market_window_hours)
    }

    /// Sweep interval, `None` when the sweeper is disabled
    pub fn expiry_sweep_interval(&self) -> Option<Duration> {
        (self.expiry_sweep_interval_secs > 0)
            .then(|| Duration::from_secs(self.expiry_sweep_interval_secs))
    }
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            cart_hold_minutes: 60,
            money_market_window_hours: 24,
            settlement_max_attempts: 3,
            expiry_sweep_interval_secs: 60,
            card_gateway_url: None,
            audit_log_dir: PathBuf::from("./logs"),
        }
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let database = DatabaseConfig::from_env()?;
        let booking = BookingConfig::from_env()?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let grpc_port = env_parse::<u16>("GRPC_PORT").unwrap_or(50051);

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| {
            if environment.eq_ignore_ascii_case("production") {
                "json".to_string()
            } else {
                "pretty".to_string()
            }
        });

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&log_format.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_FORMAT: {}. Must be one of: {:?}",
                log_format, valid_log_formats
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&environment.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                environment, valid_environments
            ));
        }

        Ok(Self {
            database,
            booking,
            log_level: log_level.to_lowercase(),
            log_format: log_format.to_lowercase(),
            grpc_port,
            environment: environment.to_lowercase(),
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if running in development
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            booking: BookingConfig::default(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            grpc_port: 50051,
            environment: "development".to_string(),
        }
    }
}
