use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable machine-readable reason, e.g. `INSUFFICIENT_FUNDS`
    pub code: String,
}
