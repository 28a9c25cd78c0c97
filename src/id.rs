//! ID generation for tasks.

use chrono::{DateTime, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Prefix shared by every task id.
pub const ID_PREFIX: &str = "tk-";

/// Generate a unique ID from content + entropy.
/// Format: "tk-" + 10 hex chars of SHA256(owner + title + timestamp + random)
pub fn generate_id(owner_id: &str, title: &str, created_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(owner_id.as_bytes());
    hasher.update(title.as_bytes());
    hasher.update(created_at.timestamp_nanos_opt().unwrap_or(0).to_le_bytes());
    hasher.update(rand::rng().random::<[u8; 8]>());
    let hash = hasher.finalize();
    format!(
        "{}{:010x}",
        ID_PREFIX,
        u64::from_be_bytes([hash[0], hash[1], hash[2], hash[3], hash[4], 0, 0, 0]) >> 24
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_format() {
        let id = generate_id("alice", "Test title", Utc::now());
        assert!(id.starts_with(ID_PREFIX));
        assert_eq!(id.len(), 13);
        assert!(id[3..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_id_uniqueness() {
        let now = Utc::now();
        let id1 = generate_id("alice", "Same title", now);
        let id2 = generate_id("alice", "Same title", now);
        assert_ne!(id1, id2);
    }
}
