//! Vote and reveal summary messages.
//!
//! Summaries are computed by the authority. The client stores them as
//! received and never recomputes averages or consensus.

use serde::{Deserialize, Serialize};

use crate::de::string_lenient;

/// A revealed vote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    /// Voter.
    pub participant_id: String,
    /// Voter display name at reveal time.
    #[serde(default)]
    pub participant_name: String,
    /// Card value.
    #[serde(default, deserialize_with = "string_lenient")]
    pub value: String,
}

/// Result of a revealed round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteSummary {
    /// Every cast vote.
    #[serde(default)]
    pub votes: Vec<Vote>,
    /// Server-rendered average.
    #[serde(default, deserialize_with = "string_lenient")]
    pub average: String,
    /// Most common value.
    #[serde(default, deserialize_with = "string_lenient")]
    pub mode: String,
    /// All votes agree.
    #[serde(default)]
    pub has_consensus: bool,
    /// Mean of numeric votes, when any were numeric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_average: Option<f64>,
}

impl VoteSummary {
    /// Values in reveal order.
    pub fn values(&self) -> Vec<&str> {
        self.votes.iter().map(|v| v.value.as_str()).collect()
    }
}
