//! Query fingerprint generation.

use sha2::{Digest, Sha256};

/// Compute the cache key for a case query.
///
/// Each field is written under its own label, so the key depends only on the
/// normalized values and never on argument order. The case type is compared
/// case-insensitively.
pub fn compute_fingerprint(case_type: &str, case_number: u32, filing_year: i32) -> String {
    let case_type = case_type.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();

    let mut hasher = Sha256::new();
    hasher.update(b"case_type=");
    hasher.update(case_type.as_bytes());
    hasher.update(b"\ncase_number=");
    hasher.update(case_number.to_string().as_bytes());
    hasher.update(b"\nfiling_year=");
    hasher.update(filing_year.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_fingerprint("Civil Appeal", 12, 2021);
        let hash2 = compute_fingerprint("Civil Appeal", 12, 2021);
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_normalizes_case_type() {
        assert_eq!(compute_fingerprint("Civil  Appeal", 12, 2021), compute_fingerprint(" civil appeal\t", 12, 2021));
    }

    #[test]
    fn test_hash_no_field_bleed() {
        // "1" + "12" and "11" + "2" must not collide once concatenated.
        assert_ne!(compute_fingerprint("X", 1, 12), compute_fingerprint("X", 11, 2));
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_fingerprint("Civil Appeal", 12, 2021);
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
