use std::env;
use std::time::Duration;

use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {other}, expected compact/json")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub grpc_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Minimum proposed price for a new job, in minor currency units.
    pub price_floor: i64,
    pub event_buffer_size: usize,
    /// Per-observer queue depth before the observer is considered lagging.
    pub observer_buffer_size: usize,
    pub sweep_interval: Duration,
    pub probe_timeout: Duration,
    pub average_speed_kmh: f64,
    pub instance_id: Uuid,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            grpc_port: parse_or_default("GRPC_PORT", defaults.grpc_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: parse_or_default("LOG_FORMAT", defaults.log_format)?,
            price_floor: parse_or_default("PRICE_FLOOR", defaults.price_floor)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            observer_buffer_size: parse_or_default(
                "OBSERVER_BUFFER_SIZE",
                defaults.observer_buffer_size,
            )?,
            sweep_interval: Duration::from_secs(parse_or_default("SWEEP_INTERVAL_SECS", 30)?),
            probe_timeout: Duration::from_millis(parse_or_default("PROBE_TIMEOUT_MS", 2_000)?),
            average_speed_kmh: parse_or_default("AVERAGE_SPEED_KMH", defaults.average_speed_kmh)?,
            instance_id: parse_or_default("INSTANCE_ID", defaults.instance_id)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that parse but cannot drive the service.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.sweep_interval.is_zero() {
            return Err(AppError::Internal(
                "invalid SWEEP_INTERVAL_SECS: must be at least 1".to_string(),
            ));
        }
        if self.probe_timeout.is_zero() {
            return Err(AppError::Internal(
                "invalid PROBE_TIMEOUT_MS: must be at least 1".to_string(),
            ));
        }
        if !(self.average_speed_kmh.is_finite() && self.average_speed_kmh > 0.0) {
            return Err(AppError::Internal(format!(
                "invalid AVERAGE_SPEED_KMH: {} is not a positive speed",
                self.average_speed_kmh
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            grpc_port: 50051,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            price_floor: 500,
            event_buffer_size: 1024,
            observer_buffer_size: 64,
            sweep_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_millis(2_000),
            average_speed_kmh: 25.0,
            instance_id: Uuid::new_v4(),
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
