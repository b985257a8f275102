//! Wire types for the submission endpoint.

use serde_json::Value;

use crate::api::ApiError;
use crate::domain::Submission;

/// Server-owned fields. A payload supplying any of these is rejected rather
/// than letting a client forge fraud state or ownership.
pub const RESERVED_FIELDS: &[&str] = &[
    "cheat_kind",
    "cheat_at",
    "identity_id",
    "game_id",
    "platform_status",
    "platform_response",
    "local_status",
];

/// Validate the decoded payload and pull out the fields the core needs.
///
/// Extra client fields (device type, level, playtime and the like) are
/// encouraged and ride along in the stored raw payload.
pub fn parse_submission(payload: Value) -> Result<(String, Submission), ApiError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ApiError::BadRequest("expected a JSON object".to_string()))?;

    for field in RESERVED_FIELDS {
        if obj.contains_key(*field) {
            return Err(ApiError::BadRequest(format!("invalid param {field}")));
        }
    }

    let game_secret = required_str(&payload, "game_secret")?;
    let submission = Submission {
        device_id_a: required_str(&payload, "device_id_a")?,
        device_id_b: required_str(&payload, "device_id_b")?,
        receipt: required_str(&payload, "receipt")?,
        xact_id: required_str(&payload, "xact_id")?,
        submission_uuid: required_str(&payload, "submission_uuid")?,
        bundle_id: required_str(&payload, "bundle_id")?,
        bundle_version: required_str(&payload, "bundle_version")?,
        raw: payload,
    };

    Ok((game_secret, submission))
}

fn required_str(payload: &Value, field: &str) -> Result<String, ApiError> {
    payload
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest(format!("missing field {field}")))
}
