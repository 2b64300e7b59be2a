//! Stage idempotency keys.

use sha2::{Digest, Sha256};

/// Derives a stable key for one stage of one logical run.
///
/// The key survives retries and pause/resume because it depends only on the
/// job's correlation id and the stage name. Stages guarding an external side
/// effect (posting a comment, starting a remote task) pass it to the remote
/// system or check it before acting again.
#[must_use]
pub fn stage_idempotency_key(correlation_id: &str, stage_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(correlation_id.as_bytes());
    hasher.update(b":");
    hasher.update(stage_name.as_bytes());
    let digest = hasher.finalize();
    format!("idem:{}", hex::encode(&digest[..16]))
}
