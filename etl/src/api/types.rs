//! REST API payloads.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::pipeline::RunReport;

/// Response to `POST /api/runs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    /// Always "completed": a run either finishes or fails. Dedup conflicts
    /// are reported in `report.conflicts`.
    pub status: String,
    pub report: RunReport,
}

impl From<RunReport> for RunResponse {
    fn from(report: RunReport) -> Self {
        Self {
            status: "completed".to_string(),
            report,
        }
    }
}

/// Optional body of `POST /api/runs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    /// Wrap the load in a single transaction for this run only.
    #[serde(default)]
    pub atomic: Option<bool>,
}

pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}
