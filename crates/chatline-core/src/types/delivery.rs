//! Message delivery status domain types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Delivery state of a message for one recipient.
///
/// Advances `sent → delivered → read` and never regresses; `read` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Created at send time, not yet delivered to the recipient.
    Sent,
    /// Received by at least one of the recipient's devices.
    Delivered,
    /// Seen by the recipient.
    Read,
}

impl DeliveryStatus {
    /// Database and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            other => Err(AppError::validation(format!(
                "Unknown delivery status: '{other}'"
            ))),
        }
    }
}

/// Aggregate delivery counts for one message, zero when absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Recipients still at `sent`.
    pub sent: u64,
    /// Recipients at `delivered`.
    pub delivered: u64,
    /// Recipients at `read`.
    pub read: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            DeliveryStatus::Sent,
            DeliveryStatus::Delivered,
            DeliveryStatus::Read,
        ] {
            assert_eq!(status.as_str().parse::<DeliveryStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!("seen".parse::<DeliveryStatus>().is_err());
    }

    #[test]
    fn test_counts_default_to_zero() {
        let counts = StatusCounts::default();
        assert_eq!((counts.sent, counts.delivered, counts.read), (0, 0, 0));
    }
}
