//! Submission handler.

use axum::body::Bytes;
use axum::extract::State;
use flate2::read::ZlibDecoder;
use std::io::Read;

use crate::api::types::parse_submission;
use crate::api::ApiError;
use crate::infra::VerifyError;
use crate::server::AppState;

/// POST /verify - record and verify one purchase submission.
///
/// The response is a fixed literal acknowledgement once the payload is
/// well-formed and the tenant resolves; the verdict is never synchronous from
/// the client's point of view, and platform transience never fails the
/// request.
pub async fn verify(State(state): State<AppState>, body: Bytes) -> Result<&'static str, ApiError> {
    let body = maybe_decompress(&body);

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("invalid json".to_string()))?;

    let (game_secret, submission) = parse_submission(payload)?;

    let game = state
        .tenants
        .game_by_secret(&game_secret)
        .await?
        .ok_or(VerifyError::UnknownGame)?;

    let record = state.engine.submit(&game, &submission).await?;
    tracing::debug!(
        game = %game.id,
        xact_id = %record.transaction.xact_id,
        outcome = ?record.outcome,
        "submission recorded"
    );

    Ok("OK")
}

/// Decompressed-size cap for zlib bodies. A compressed bomb that inflates
/// past this is treated as raw bytes instead (and then fails JSON parsing).
const MAX_DECOMPRESSED_BYTES: u64 = 1 << 20;

/// Clients may zlib-compress the body; try the inflate and fall back to the
/// bytes as sent.
fn maybe_decompress(body: &[u8]) -> Vec<u8> {
    let mut decoder = ZlibDecoder::new(body).take(MAX_DECOMPRESSED_BYTES + 1);
    let mut decompressed = Vec::new();
    match decoder.read_to_end(&mut decompressed) {
        Ok(n) if n as u64 <= MAX_DECOMPRESSED_BYTES => decompressed,
        _ => body.to_vec(),
    }
}
