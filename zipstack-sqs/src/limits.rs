//! SQS request limits

use serde::Deserialize;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::storage::SqsError;

/// Largest message body SQS accepts, in bytes
pub const MAX_MESSAGE_SIZE: usize = 262_144;

pub const MAX_QUEUE_NAME_LEN: usize = 80;

pub const RECEIVE_COUNT_RANGE: RangeInclusive<i32> = 1..=10;
pub const WAIT_TIME_RANGE: RangeInclusive<i32> = 0..=20;
pub const VISIBILITY_TIMEOUT_RANGE: RangeInclusive<i32> = 0..=43_200;
pub const DELAY_SECONDS_RANGE: RangeInclusive<i32> = 0..=900;
pub const RETENTION_PERIOD_RANGE: RangeInclusive<i32> = 60..=1_209_600;
pub const MAXIMUM_MESSAGE_SIZE_RANGE: RangeInclusive<i32> = 1_024..=262_144;

/// How closely requests are held to the limits of the real service
///
/// `Strict` rejects out-of-range parameters and invalid content the way SQS
/// does. `Relaxed` clamps numeric parameters into range and accepts any
/// queue name or body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqsLimits {
    #[default]
    Strict,
    Relaxed,
}

impl SqsLimits {
    pub fn is_strict(self) -> bool {
        self == Self::Strict
    }

    pub fn validate_queue_name(self, name: &str) -> Result<(), SqsError> {
        if name.is_empty() {
            return Err(SqsError::InvalidParameter(
                "Queue name must not be empty".to_string(),
            ));
        }
        if !self.is_strict() {
            return Ok(());
        }

        let base = name.strip_suffix(".fifo").unwrap_or(name);
        let valid = !base.is_empty()
            && name.len() <= MAX_QUEUE_NAME_LEN
            && base
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if valid {
            Ok(())
        } else {
            Err(SqsError::InvalidParameter(format!(
                "Can only include alphanumeric characters, hyphens, or underscores. 1 to 80 in length: {name}"
            )))
        }
    }

    /// Apply a numeric limit: out of range is an error when strict, and
    /// clamped otherwise.
    pub fn check_range(
        self,
        parameter: &str,
        value: i32,
        range: &RangeInclusive<i32>,
    ) -> Result<i32, SqsError> {
        if range.contains(&value) {
            return Ok(value);
        }
        if self.is_strict() {
            return Err(SqsError::InvalidParameter(format!(
                "Value {value} for parameter {parameter} is invalid. Must be between {} and {}.",
                range.start(),
                range.end()
            )));
        }
        Ok(value.clamp(*range.start(), *range.end()))
    }

    /// Number of messages a receive may return; one when not requested.
    pub fn receive_count(self, requested: Option<i32>) -> Result<usize, SqsError> {
        let count = match requested {
            Some(n) => self.check_range("MaxNumberOfMessages", n, &RECEIVE_COUNT_RANGE)?,
            None => 1,
        };
        Ok(usize::try_from(count).unwrap_or(1))
    }

    pub fn validate_body(self, body: &str, maximum_size: usize) -> Result<(), SqsError> {
        if !self.is_strict() {
            return Ok(());
        }
        if body.is_empty() {
            return Err(SqsError::InvalidParameter(
                "The request must contain the parameter MessageBody.".to_string(),
            ));
        }
        if body.len() > maximum_size {
            return Err(SqsError::InvalidParameter(format!(
                "One or more parameters are invalid. Reason: Message must be shorter than {maximum_size} bytes."
            )));
        }
        if let Some(c) = body.chars().find(|c| !is_allowed_char(*c)) {
            return Err(SqsError::InvalidMessageContents(format!(
                "Invalid binary character '#x{:X}' was found in the message body",
                u32::from(c)
            )));
        }
        Ok(())
    }
}

/// `#x9 | #xA | #xD | #x20 to #xD7FF | #xE000 to #xFFFD | #x10000 to #x10FFFF`
fn is_allowed_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r')
        || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}')
}

impl FromStr for SqsLimits {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "relaxed" => Ok(Self::Relaxed),
            other => Err(format!("unknown limits '{other}', expected strict or relaxed")),
        }
    }
}

impl fmt::Display for SqsLimits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => f.write_str("strict"),
            Self::Relaxed => f.write_str("relaxed"),
        }
    }
}
