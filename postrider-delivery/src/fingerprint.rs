//! Idempotency fingerprinting.

use hex::encode;
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest.
const HASH_LEN: usize = 16;

/// Compute the idempotency fingerprint of an outbound message.
///
/// Recipients are sorted lexicographically and joined with `|` before
/// hashing, so the fingerprint does not depend on recipient order or on
/// whether `to` arrived as a scalar or a singleton list. The digest is
/// SHA-256 over the UTF-8 bytes of subject, html, and the joined recipient
/// string, truncated to the first 16 lowercase hex characters.
#[must_use]
pub fn message_hash(subject: &str, html: &str, recipients: &[String]) -> String {
    let mut sorted: Vec<&str> = recipients.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(subject.as_bytes());
    hasher.update(html.as_bytes());
    hasher.update(sorted.join("|").as_bytes());

    let mut digest = encode(hasher.finalize());
    digest.truncate(HASH_LEN);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipients(addrs: &[&str]) -> Vec<String> {
        addrs.iter().map(|a| (*a).to_string()).collect()
    }

    #[test]
    fn sixteen_lowercase_hex_chars() {
        let hash = message_hash("Hi", "<p>hi</p>", &recipients(&["a@x"]));
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn deterministic() {
        let a = message_hash("Hi", "<p>hi</p>", &recipients(&["a@x", "b@x"]));
        let b = message_hash("Hi", "<p>hi</p>", &recipients(&["a@x", "b@x"]));
        assert_eq!(a, b);
    }

    #[test]
    fn recipient_order_does_not_matter() {
        let forward = message_hash("Hi", "<p>hi</p>", &recipients(&["a@x", "b@x"]));
        let reversed = message_hash("Hi", "<p>hi</p>", &recipients(&["b@x", "a@x"]));
        assert_eq!(forward, reversed);
    }

    #[test]
    fn every_input_is_significant() {
        let base = message_hash("Hi", "<p>hi</p>", &recipients(&["a@x"]));
        assert_ne!(base, message_hash("Hi!", "<p>hi</p>", &recipients(&["a@x"])));
        assert_ne!(base, message_hash("Hi", "<p>hi!</p>", &recipients(&["a@x"])));
        assert_ne!(base, message_hash("Hi", "<p>hi</p>", &recipients(&["b@x"])));
        assert_ne!(
            base,
            message_hash("Hi", "<p>hi</p>", &recipients(&["a@x", "b@x"]))
        );
    }

    #[test]
    fn missing_fields_hash_as_empty() {
        let explicit = message_hash("", "", &recipients(&[]));
        assert_eq!(explicit.len(), 16);
    }
}
