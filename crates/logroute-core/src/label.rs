//! Closed label vocabulary for classified log lines.
//!
//! Every classifier stage produces a [`Label`]. The pattern table and the
//! remote model only ever emit a subset; the embedding predictor may emit
//! any variant its artifact was trained on. [`Label::Unclassified`] is the
//! universal fallback.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category assigned to a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "User Action")]
    UserAction,
    #[serde(rename = "System Notification")]
    SystemNotification,
    #[serde(rename = "Workflow Error")]
    WorkflowError,
    #[serde(rename = "Deprecation Warning")]
    DeprecationWarning,
    #[serde(rename = "HTTP Status")]
    HttpStatus,
    #[serde(rename = "Critical Error")]
    CriticalError,
    #[serde(rename = "Security Alert")]
    SecurityAlert,
    #[serde(rename = "Error")]
    Error,
    #[serde(rename = "Resource Usage")]
    ResourceUsage,
    #[serde(rename = "Unclassified")]
    Unclassified,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown label: {0:?}")]
pub struct LabelParseError(pub String);

impl Label {
    /// All labels, in declaration order.
    pub const ALL: [Label; 10] = [
        Label::UserAction,
        Label::SystemNotification,
        Label::WorkflowError,
        Label::DeprecationWarning,
        Label::HttpStatus,
        Label::CriticalError,
        Label::SecurityAlert,
        Label::Error,
        Label::ResourceUsage,
        Label::Unclassified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserAction => "User Action",
            Self::SystemNotification => "System Notification",
            Self::WorkflowError => "Workflow Error",
            Self::DeprecationWarning => "Deprecation Warning",
            Self::HttpStatus => "HTTP Status",
            Self::CriticalError => "Critical Error",
            Self::SecurityAlert => "Security Alert",
            Self::Error => "Error",
            Self::ResourceUsage => "Resource Usage",
            Self::Unclassified => "Unclassified",
        }
    }

    pub fn is_unclassified(&self) -> bool {
        matches!(self, Self::Unclassified)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = LabelParseError;

    /// Parse the exact display name. Matching is case-sensitive and does not trim.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|label| label.as_str() == s)
            .copied()
            .ok_or_else(|| LabelParseError(s.to_string()))
    }
}
