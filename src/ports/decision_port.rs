//! External decision service port.
//!
//! The request is a JSON document describing the decision bar; the reply is
//! free-form text that the external strategy parses for a direction and
//! optional stop/target percentages.

use crate::domain::error::TraderError;

pub trait DecisionPort {
    fn request_decision(&self, request: &serde_json::Value) -> Result<String, TraderError>;
}
