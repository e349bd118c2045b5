//! Bus message parsing and validation.
//!
//! The cycle-time feed delivers one JSON object per line:
//!
//! ```json
//! {"line_id":"LINE-01","calculated_ct_seconds":72.5,"chain_state":{"is_running":true,"encoder_delta":12.0}}
//! ```
//!
//! Unknown fields (the producer also sends `jigs`, per-station detail the
//! controller does not use) are ignored. Malformed or invalid messages are
//! dropped with a logged warning by the caller — no retry, no dead-letter.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::types::ChainStateUpdate;

/// One cycle-time message as delivered on the bus.
#[derive(Debug, Clone, Deserialize)]
pub struct BusMessage {
    /// Production line identifier
    pub line_id: String,
    /// Calculated cycle time in seconds (> 0)
    pub calculated_ct_seconds: f64,
    /// Optional conveyor telemetry riding along with the sample
    #[serde(default)]
    pub chain_state: Option<ChainStateUpdate>,
    /// Producer-side timestamp, if present
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Why a bus message was rejected.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid message: {0}")]
    Invalid(String),
}

/// Parse and validate one line of the feed.
pub fn parse_message(raw: &str) -> Result<BusMessage, MessageError> {
    let message: BusMessage = serde_json::from_str(raw)?;

    if message.line_id.trim().is_empty() {
        return Err(MessageError::Invalid("line_id must not be empty".to_string()));
    }
    if !message.calculated_ct_seconds.is_finite() || message.calculated_ct_seconds <= 0.0 {
        return Err(MessageError::Invalid(format!(
            "calculated_ct_seconds must be > 0, got {}",
            message.calculated_ct_seconds
        )));
    }

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_message() {
        let msg = parse_message(r#"{"line_id":"LINE-01","calculated_ct_seconds":72.5}"#).unwrap();
        assert_eq!(msg.line_id, "LINE-01");
        assert!((msg.calculated_ct_seconds - 72.5).abs() < 1e-12);
        assert!(msg.chain_state.is_none());
    }

    #[test]
    fn test_parse_with_chain_state() {
        let raw = r#"{"line_id":"L1","calculated_ct_seconds":60.0,"chain_state":{"is_running":true,"encoder_delta":3.5}}"#;
        let msg = parse_message(raw).unwrap();
        let chain = msg.chain_state.unwrap();
        assert!(chain.is_running.is_some());
        assert!(chain.encoder_delta.is_some());
    }

    #[test]
    fn test_unknown_fields_tolerated() {
        let raw = r#"{"line_id":"L1","calculated_ct_seconds":60.0,"timestamp":"2026-01-01T00:00:00Z","jigs":[1,2,3]}"#;
        let msg = parse_message(raw).unwrap();
        assert!(msg.timestamp.is_some());
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            parse_message("{not json"),
            Err(MessageError::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_fields_rejected() {
        // serde treats missing required fields as a parse error
        assert!(parse_message(r#"{"line_id":"L1"}"#).is_err());
        assert!(parse_message(r#"{"calculated_ct_seconds":60.0}"#).is_err());
    }

    #[test]
    fn test_non_positive_ct_rejected() {
        assert!(matches!(
            parse_message(r#"{"line_id":"L1","calculated_ct_seconds":0.0}"#),
            Err(MessageError::Invalid(_))
        ));
        assert!(matches!(
            parse_message(r#"{"line_id":"L1","calculated_ct_seconds":-5.0}"#),
            Err(MessageError::Invalid(_))
        ));
    }

    #[test]
    fn test_blank_line_id_rejected() {
        assert!(matches!(
            parse_message(r#"{"line_id":"  ","calculated_ct_seconds":60.0}"#),
            Err(MessageError::Invalid(_))
        ));
    }
}
