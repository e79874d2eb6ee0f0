use serde::{Deserialize, Serialize};

use crate::{domain::PlanId, error::GENERIC_SERVER_ERROR};

/// Body posted to the confirm-selection endpoint once a candidate is picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmSelectionRequest {
    pub plan_id: PlanId,
}

/// Failure bodies seen from the service: `{"error": ...}`, `{"message": ...}`,
/// or nothing at all.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }

    /// First non-blank string among `error` and `message`.
    pub fn text(&self) -> Option<String> {
        [&self.error, &self.message]
            .into_iter()
            .flatten()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn message_or_generic(bytes: &[u8]) -> String {
        Self::from_bytes(bytes)
            .and_then(|body| body.text())
            .unwrap_or_else(|| GENERIC_SERVER_ERROR.to_string())
    }
}
