use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::Point;

/// Where a drone is placed once its trip finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishPosition {
    #[default]
    Base,
    LastStop,
}

impl FromStr for FinishPosition {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "base" => Ok(FinishPosition::Base),
            "last_stop" => Ok(FinishPosition::LastStop),
            other => Err(format!("unknown finish position {other}, expected base/last_stop")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {other}, expected compact/json")),
        }
    }
}

/// Knobs of the planning engine and of the trip lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanningConfig {
    /// Every route ends here.
    pub base: Point,
    /// Dwell time added at each stop between arrival and departure.
    pub stop_service_secs: u64,
    /// Reject orders no idle drone could carry even on their own.
    pub reject_unservable: bool,
    pub finish_position: FinishPosition,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            base: Point::new(0.0, 0.0),
            stop_service_secs: 0,
            reject_unservable: false,
            finish_position: FinishPosition::Base,
        }
    }
}

/// Upper bound for `STOP_SERVICE_SECS`, one day.
pub const MAX_STOP_SERVICE_SECS: u64 = 86_400;

impl PlanningConfig {
    /// Out-of-range values saturate, which later fails the schedule instead
    /// of panicking here.
    pub fn service_time(&self) -> chrono::Duration {
        i64::try_from(self.stop_service_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub planning: PlanningConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let base = Point::new(parse_or_default("BASE_X", 0.0)?, parse_or_default("BASE_Y", 0.0)?);
        if !base.is_finite() {
            return Err(AppError::Internal("BASE_X/BASE_Y must be finite".to_string()));
        }

        let stop_service_secs = bounded_service_secs(parse_or_default("STOP_SERVICE_SECS", 0)?)?;

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: parse_or_default("LOG_FORMAT", LogFormat::Compact)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            planning: PlanningConfig {
                base,
                stop_service_secs,
                reject_unservable: parse_or_default("REJECT_UNSERVABLE", false)?,
                finish_position: parse_or_default("FINISH_POSITION", FinishPosition::Base)?,
            },
        })
    }
}

fn bounded_service_secs(secs: u64) -> Result<u64, AppError> {
    if secs > MAX_STOP_SERVICE_SECS {
        return Err(AppError::Internal(format!(
            "STOP_SERVICE_SECS must be at most {MAX_STOP_SERVICE_SECS}, got {secs}"
        )));
    }
    Ok(secs)
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
