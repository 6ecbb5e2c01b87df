//! Idempotency keys for commits.
//!
//! A key is the SHA-256 of the file content hash followed by the campaign
//! identity (name and budget). The same bytes committed under the same
//! campaign always produce the same key; the filename is not part of it, so
//! renaming a file does not defeat dedupe.

use sha2::{Digest, Sha256};

use crate::models::Campaign;

/// Hex SHA-256 of raw file bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn idempotency_key(bytes: &[u8], campaign: &Campaign) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content_hash(bytes).as_bytes());
    // Length-prefixed so that name/budget boundaries cannot collide.
    match &campaign.name {
        Some(name) => {
            hasher.update(b"name:");
            hasher.update((name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
        }
        None => hasher.update(b"name:-"),
    }
    match campaign.budget {
        Some(budget) => {
            hasher.update(b"budget:");
            hasher.update(budget.cents().to_le_bytes());
        }
        None => hasher.update(b"budget:-"),
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Budget;

    #[test]
    fn stable_for_same_inputs() {
        let c = Campaign {
            name: Some("Spring push".into()),
            budget: Some(Budget::from_cents(15_000)),
        };
        assert_eq!(idempotency_key(b"abc", &c), idempotency_key(b"abc", &c));
        assert_eq!(idempotency_key(b"abc", &c).len(), 64);
    }

    #[test]
    fn differs_by_content_and_campaign() {
        let none = Campaign::default();
        let named = Campaign {
            name: Some("x".into()),
            budget: None,
        };
        let budgeted = Campaign {
            name: Some("x".into()),
            budget: Some(Budget::from_cents(1)),
        };
        let base = idempotency_key(b"abc", &none);
        assert_ne!(base, idempotency_key(b"abd", &none));
        assert_ne!(base, idempotency_key(b"abc", &named));
        assert_ne!(
            idempotency_key(b"abc", &named),
            idempotency_key(b"abc", &budgeted)
        );
    }
}
