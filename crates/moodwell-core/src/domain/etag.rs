//! Strong ETags over response bodies.

use sha2::{Digest, Sha256};

/// Hex characters of the SHA-256 digest kept in the validator.
const ETAG_HEX_LEN: usize = 16;

/// Quoted, truncated SHA-256 of the exact body bytes.
pub fn etag(body: &[u8]) -> String {
    let digest = format!("{:x}", Sha256::digest(body));
    format!("\"{}\"", &digest[..ETAG_HEX_LEN])
}

/// Whether an `If-None-Match` value names `etag`.
///
/// Each comma-separated validator is compared byte-for-byte; anything
/// malformed simply does not match.
pub fn if_none_match(header: Option<&str>, etag: &str) -> bool {
    header.is_some_and(|value| value.split(',').any(|candidate| candidate.trim() == etag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etag_is_quoted_and_truncated() {
        let tag = etag(b"hello");
        assert_eq!(tag, "\"2cf24dba5fb0a30e\"");
        assert_eq!(tag.len(), ETAG_HEX_LEN + 2);
    }

    #[test]
    fn test_etag_tracks_every_byte() {
        assert_eq!(etag(b"{\"a\":1}"), etag(b"{\"a\":1}"));
        assert_ne!(etag(b"{\"a\":1}"), etag(b"{\"a\":2}"));
        assert_ne!(etag(b""), etag(b" "));
    }

    #[test]
    fn test_if_none_match() {
        let tag = etag(b"body");
        assert!(if_none_match(Some(&tag), &tag));
        assert!(if_none_match(Some(&format!("\"other\", {tag}")), &tag));
        assert!(!if_none_match(None, &tag));
        assert!(!if_none_match(Some(""), &tag));
        assert!(!if_none_match(Some(tag.trim_matches('"')), &tag));
        assert!(!if_none_match(Some(&format!("W/{tag}")), &tag));
    }
}
