//! Closed value sets stored as TEXT columns.
//!
//! Each enum round-trips through its display label, which is both the stored
//! value and the JSON value.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Raised when a stored or submitted label is not part of the set.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("\"{0}\" is not a valid choice.")]
pub struct InvalidChoice(pub String);

macro_rules! text_choice {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $label:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = InvalidChoice;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|c| c.as_str() == s)
                    .ok_or_else(|| InvalidChoice(s.to_string()))
            }
        }

        impl TryFrom<String> for $name {
            type Error = InvalidChoice;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

text_choice! {
    /// Workflow state of a bug. New bugs start `Open`.
    BugStatus {
        Open => "Open",
        InProgress => "In Progress",
        Resolved => "Resolved",
        Closed => "Closed",
    }
}

text_choice! {
    /// Severity of a bug. Defaults to `Medium`.
    BugPriority {
        Low => "Low",
        Medium => "Medium",
        High => "High",
        Critical => "Critical",
    }
}

text_choice! {
    /// Kind of mutation recorded in the activity log.
    ActivityAction {
        Created => "created",
        Updated => "updated",
        Commented => "commented",
    }
}

impl Default for BugStatus {
    fn default() -> Self {
        BugStatus::Open
    }
}

impl Default for BugPriority {
    fn default() -> Self {
        BugPriority::Medium
    }
}

impl BugPriority {
    /// SQL expression ranking `priority` by severity, used for ordering.
    pub const RANK_SQL: &'static str = "CASE b.priority \
         WHEN 'Low' THEN 1 WHEN 'Medium' THEN 2 \
         WHEN 'High' THEN 3 WHEN 'Critical' THEN 4 ELSE 0 END";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_parse_back() {
        for status in BugStatus::ALL {
            assert_eq!(status.as_str().parse::<BugStatus>(), Ok(*status));
        }
        assert_eq!("In Progress".parse(), Ok(BugStatus::InProgress));
        assert_eq!("commented".parse(), Ok(ActivityAction::Commented));
    }

    #[test]
    fn unknown_label_is_rejected() {
        let err = "Urgent".parse::<BugPriority>().unwrap_err();
        assert_eq!(err.to_string(), "\"Urgent\" is not a valid choice.");
        assert!(BugStatus::try_from("open".to_string()).is_err());
    }

    #[test]
    fn json_uses_display_labels() {
        let json = serde_json::to_string(&BugStatus::InProgress).unwrap();
        assert_eq!(json, "\"In Progress\"");
        assert_eq!(BugStatus::default(), BugStatus::Open);
        assert_eq!(BugPriority::default(), BugPriority::Medium);
    }
}
