use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{InboxError, Result};

/// Outcome label stored when the caller does not give one
pub const DEFAULT_OUTCOME: &str = "resolved";

/// Fixed category list of the default wrap-up form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionCategory {
    GeneralInquiry,
    TechnicalIssue,
    Billing,
    Complaint,
    FeatureRequest,
    Other,
}

impl ResolutionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionCategory::GeneralInquiry => "general_inquiry",
            ResolutionCategory::TechnicalIssue => "technical_issue",
            ResolutionCategory::Billing => "billing",
            ResolutionCategory::Complaint => "complaint",
            ResolutionCategory::FeatureRequest => "feature_request",
            ResolutionCategory::Other => "other",
        }
    }
}

impl fmt::Display for ResolutionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionCategory {
    type Err = InboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "general_inquiry" => Ok(ResolutionCategory::GeneralInquiry),
            "technical_issue" => Ok(ResolutionCategory::TechnicalIssue),
            "billing" => Ok(ResolutionCategory::Billing),
            "complaint" => Ok(ResolutionCategory::Complaint),
            "feature_request" => Ok(ResolutionCategory::FeatureRequest),
            "other" => Ok(ResolutionCategory::Other),
            other => Err(InboxError::validation(format!("unknown resolution category '{}'", other))),
        }
    }
}

/// Wrap-up data submitted with a resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WrapUpPayload {
    /// Fixed category/notes form, used by teams without a configured form
    Default {
        #[serde(default)]
        category: Option<ResolutionCategory>,
        #[serde(default)]
        notes: Option<String>,
    },
    /// Values for the team's configured fields, keyed by field id
    Configured {
        #[serde(default)]
        values: HashMap<String, String>,
    },
    /// "Skip & resolve": close with an empty wrap-up
    Skip,
}

/// Request body of `resolveSession`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveRequest {
    #[serde(flatten)]
    pub wrap_up: WrapUpPayload,
    #[serde(default)]
    pub outcome: Option<String>,
}

impl ResolveRequest {
    pub fn new(wrap_up: WrapUpPayload) -> Self {
        Self { wrap_up, outcome: None }
    }
}

/// The wrap-up record of a resolved session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub session_id: String,
    pub tenant_id: String,
    pub category: Option<ResolutionCategory>,
    pub notes: Option<String>,
    pub outcome: String,
    /// Configured-form values keyed by field id
    pub fields: BTreeMap<String, String>,
    pub resolved_by_agent_id: String,
    pub resolved_at: DateTime<Utc>,
    pub csat_score: Option<u8>,
    pub csat_feedback: Option<String>,
    pub csat_recorded_at: Option<DateTime<Utc>>,
}

/// Result of a resolve attempt that did not fail validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResolveOutcome {
    Resolved { resolution: Resolution },
    /// Someone else closed the session first
    AlreadyResolved,
    /// The assignee changed between read and write; re-read and retry
    ConcurrentlyModified,
}
