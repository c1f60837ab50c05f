//! Kernel session status.
//!
//! The kernel is the live interactive execution engine. Its lifecycle is
//! owned elsewhere; all the queue sees is the status it reports.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Status reported by a kernel session.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum KernelStatus {
    /// No session selected, or the session has not reported yet.
    #[default]
    Unknown,
    Starting,
    Idle,
    Busy,
    Restarting,
    Autorestarting,
    Terminating,
    Dead,
}

impl KernelStatus {
    /// Statuses that win over any queue state when presenting.
    pub fn is_dominant(&self) -> bool {
        matches!(self, Self::Dead | Self::Terminating | Self::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_default_is_unknown() {
        assert_eq!(KernelStatus::default(), KernelStatus::Unknown);
    }

    #[test]
    fn test_string_forms() {
        assert_eq!(KernelStatus::Autorestarting.to_string(), "autorestarting");
        assert_eq!(KernelStatus::from_str("dead").unwrap(), KernelStatus::Dead);
        assert!(KernelStatus::from_str("sleeping").is_err());
    }

    #[test]
    fn test_dominance() {
        assert!(KernelStatus::Dead.is_dominant());
        assert!(KernelStatus::Terminating.is_dominant());
        assert!(KernelStatus::Unknown.is_dominant());
        assert!(!KernelStatus::Idle.is_dominant());
        assert!(!KernelStatus::Busy.is_dominant());
    }

    #[test]
    fn test_json_form() {
        let json = serde_json::to_string(&KernelStatus::Idle).unwrap();
        assert_eq!(json, "\"idle\"");
    }
}
