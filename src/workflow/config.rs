//! Step Configuration
//!
//! Retry policies and duration values accepted by `step.run_with_config`.
//!
//! # Example YAML/JSON Format
//!
//! ```yaml
//! retries:
//!   limit: 3
//!   delay: 1 second
//!   backoff: exponential
//! timeout: 10 minutes
//! ```
//!
//! Only `retries.limit` is interpreted by the engine. `delay`, `backoff` and
//! `timeout` are parsed and carried for schedulers layered on top.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Configuration for a single step.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct StepConfig {
    /// Retry policy; the engine default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<RetryConfig>,

    /// Step timeout (not enforced by the engine)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<WorkflowDuration>,
}

impl StepConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry limit and delay.
    pub fn with_retries(mut self, limit: u32, delay: WorkflowDuration) -> Self {
        self.retries = Some(RetryConfig {
            limit,
            delay,
            backoff: None,
        });
        self
    }

    /// Sets the backoff kind. Has no effect without a retry policy.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        if let Some(retries) = self.retries.as_mut() {
            retries.backoff = Some(backoff);
        }
        self
    }

    pub fn with_timeout(mut self, timeout: WorkflowDuration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the configured retry limit, if any.
    pub fn retry_limit(&self) -> Option<u32> {
        self.retries.as_ref().map(|retries| retries.limit)
    }
}

/// Retry policy for a step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Number of retries allowed after the first attempt
    pub limit: u32,

    /// Delay between attempts
    pub delay: WorkflowDuration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<Backoff>,
}

/// Backoff kind between retries.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Constant,
    Linear,
    Exponential,
}

/// Errors from parsing a duration string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("Duration '{0}' must have the form '<number> <unit>'")]
    Malformed(String),

    #[error("Invalid duration amount '{0}'")]
    InvalidAmount(String),

    #[error("Unknown duration unit '{0}'")]
    UnknownUnit(String),
}

/// Unit for a textual duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl DurationUnit {
    fn seconds(self) -> u64 {
        match self {
            Self::Second => 1,
            Self::Minute => 60,
            Self::Hour => 60 * 60,
            Self::Day => 24 * 60 * 60,
            Self::Week => 7 * 24 * 60 * 60,
            Self::Month => 30 * 24 * 60 * 60,
            Self::Year => 365 * 24 * 60 * 60,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

impl FromStr for DurationUnit {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let singular = s.strip_suffix('s').unwrap_or(s);
        match singular {
            "second" => Ok(Self::Second),
            "minute" => Ok(Self::Minute),
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            _ => Err(DurationError::UnknownUnit(s.to_string())),
        }
    }
}

/// A duration given either as whole milliseconds or as `"<n> <unit>[s]"`,
/// where `n` may be fractional (`"1.5 seconds"`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorkflowDuration {
    Millis(u64),
    Span { amount: f64, unit: DurationUnit },
}

impl WorkflowDuration {
    pub fn millis(amount: u64) -> Self {
        Self::Millis(amount)
    }

    pub fn seconds(amount: u64) -> Self {
        Self::Span {
            amount: amount as f64,
            unit: DurationUnit::Second,
        }
    }

    pub fn minutes(amount: u64) -> Self {
        Self::Span {
            amount: amount as f64,
            unit: DurationUnit::Minute,
        }
    }

    /// Converts to a standard duration. Months are 30 days, years 365.
    pub fn to_std(&self) -> Duration {
        match *self {
            Self::Millis(ms) => Duration::from_millis(ms),
            Self::Span { amount, unit } => {
                Duration::try_from_secs_f64(amount * unit.seconds() as f64).unwrap_or(Duration::MAX)
            }
        }
    }
}

impl fmt::Display for WorkflowDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Millis(ms) => write!(f, "{}", ms),
            Self::Span { amount, unit } => {
                let plural = if amount == 1.0 { "" } else { "s" };
                write!(f, "{} {}{}", amount, unit.label(), plural)
            }
        }
    }
}

impl FromStr for WorkflowDuration {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut parts = trimmed.split_whitespace();

        let (Some(amount), unit, None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(DurationError::Malformed(s.to_string()));
        };

        let invalid = || DurationError::InvalidAmount(amount.to_string());

        match unit {
            None => amount.parse().map(Self::Millis).map_err(|_| invalid()),
            Some(unit) => {
                let amount: f64 = amount.parse().map_err(|_| invalid())?;
                if !amount.is_finite() || amount < 0.0 {
                    return Err(invalid());
                }
                Ok(Self::Span {
                    amount,
                    unit: unit.parse()?,
                })
            }
        }
    }
}

impl Serialize for WorkflowDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Self::Millis(ms) => serializer.serialize_u64(ms),
            Self::Span { .. } => serializer.serialize_str(&self.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for WorkflowDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let val = Value::deserialize(deserializer)?;
        match val {
            Value::Number(n) => n
                .as_u64()
                .map(Self::Millis)
                .ok_or_else(|| de::Error::custom("Expected a non-negative integer duration")),
            Value::String(s) => s.parse().map_err(de::Error::custom),
            _ => Err(de::Error::custom("Expected a number or a duration string")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_singular_and_plural_units() {
        assert_eq!(
            "1 second".parse::<WorkflowDuration>().unwrap(),
            WorkflowDuration::seconds(1)
        );
        assert_eq!(
            "10 seconds".parse::<WorkflowDuration>().unwrap(),
            WorkflowDuration::seconds(10)
        );
        assert_eq!(
            "2 minutes".parse::<WorkflowDuration>().unwrap().to_std(),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_parse_long_units() {
        let month: WorkflowDuration = "1 month".parse().unwrap();
        assert_eq!(month.to_std(), Duration::from_secs(30 * 24 * 60 * 60));

        let years: WorkflowDuration = "2 years".parse().unwrap();
        assert_eq!(years.to_std(), Duration::from_secs(2 * 365 * 24 * 60 * 60));
    }

    #[test]
    fn test_parse_fractional_amount() {
        let duration: WorkflowDuration = "1.5 seconds".parse().unwrap();
        assert_eq!(duration.to_std(), Duration::from_millis(1500));
        assert_eq!(duration.to_string(), "1.5 seconds");

        let half_day: WorkflowDuration = "0.5 day".parse().unwrap();
        assert_eq!(half_day.to_std(), Duration::from_secs(12 * 60 * 60));

        assert!(matches!(
            "-1 seconds".parse::<WorkflowDuration>(),
            Err(DurationError::InvalidAmount(_))
        ));
        assert!(matches!(
            "1.5".parse::<WorkflowDuration>(),
            Err(DurationError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_parse_plain_number_is_millis() {
        let duration: WorkflowDuration = "250".parse().unwrap();
        assert_eq!(duration, WorkflowDuration::Millis(250));
        assert_eq!(duration.to_std(), Duration::from_millis(250));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "".parse::<WorkflowDuration>(),
            Err(DurationError::Malformed(_))
        ));
        assert!(matches!(
            "ten seconds".parse::<WorkflowDuration>(),
            Err(DurationError::InvalidAmount(_))
        ));
        assert!(matches!(
            "3 fortnights".parse::<WorkflowDuration>(),
            Err(DurationError::UnknownUnit(_))
        ));
        assert!(matches!(
            "1 second extra".parse::<WorkflowDuration>(),
            Err(DurationError::Malformed(_))
        ));
    }

    #[test]
    fn test_display_matches_input_form() {
        assert_eq!(WorkflowDuration::seconds(10).to_string(), "10 seconds");
        assert_eq!(WorkflowDuration::seconds(1).to_string(), "1 second");
        assert_eq!(WorkflowDuration::millis(500).to_string(), "500");
    }

    #[test]
    fn test_step_config_from_json() {
        let json = r#"{
            "retries": { "limit": 5, "delay": "1 second", "backoff": "exponential" },
            "timeout": 30000
        }"#;
        let config: StepConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.retry_limit(), Some(5));
        let retries = config.retries.unwrap();
        assert_eq!(retries.delay, WorkflowDuration::seconds(1));
        assert_eq!(retries.backoff, Some(Backoff::Exponential));
        assert_eq!(config.timeout, Some(WorkflowDuration::Millis(30000)));
    }

    #[test]
    fn test_step_config_rejects_bad_duration() {
        let json = r#"{ "retries": { "limit": 1, "delay": "soon" } }"#;
        assert!(serde_json::from_str::<StepConfig>(json).is_err());
    }

    #[test]
    fn test_step_config_builder() {
        let config = StepConfig::new()
            .with_retries(3, WorkflowDuration::seconds(1))
            .with_backoff(Backoff::Linear)
            .with_timeout(WorkflowDuration::minutes(5));

        assert_eq!(config.retry_limit(), Some(3));
        assert_eq!(config.retries.as_ref().unwrap().backoff, Some(Backoff::Linear));
        assert_eq!(config.timeout, Some(WorkflowDuration::minutes(5)));
        assert_eq!(StepConfig::new().retry_limit(), None);
    }
}
