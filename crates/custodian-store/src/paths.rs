//! Owner identifier to file stem mapping.
//!
//! Owner identifiers come from callers and may contain path separators,
//! dots, or arbitrary Unicode. They are reduced to ASCII alphanumerics,
//! `-` and `_`. When anything had to be replaced, a short SHA-256 suffix of
//! the raw identifier is appended so that `"a.b"` and `"a_b"` never share a
//! file. An identifier that already ends like a suffix (`-` plus eight
//! lowercase hex digits) is suffixed as well, so no raw identifier can name
//! another owner's suffixed stem.

use ring::digest;

use crate::error::{StoreError, StoreResult};

/// Number of hex characters of the disambiguating digest suffix.
const SUFFIX_HEX_LEN: usize = 8;

/// Map `owner_id` to a deterministic file stem.
///
/// # Errors
///
/// Returns [`StoreError::InvalidOwner`] if `owner_id` is empty or consists
/// only of whitespace.
pub fn owner_file_stem(owner_id: &str) -> StoreResult<String> {
    if owner_id.trim().is_empty() {
        return Err(StoreError::InvalidOwner(owner_id.to_string()));
    }

    let sanitized: String = owner_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized == owner_id && !has_digest_suffix(&sanitized) {
        return Ok(sanitized);
    }

    let hash = digest::digest(&digest::SHA256, owner_id.as_bytes());
    let suffix = &hex::encode(hash.as_ref())[..SUFFIX_HEX_LEN];
    Ok(format!("{sanitized}-{suffix}"))
}

fn has_digest_suffix(stem: &str) -> bool {
    stem.rsplit_once('-').is_some_and(|(_, tail)| {
        tail.len() == SUFFIX_HEX_LEN
            && tail.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_ids_are_kept() {
        assert_eq!(owner_file_stem("acme").unwrap(), "acme");
        assert_eq!(owner_file_stem("client_42-eu").unwrap(), "client_42-eu");
    }

    #[test]
    fn unsafe_characters_are_replaced_and_suffixed() {
        let stem = owner_file_stem("../etc/passwd").unwrap();
        assert!(stem.starts_with("___etc_passwd-"));
        assert!(!stem.contains('/'));
        assert!(!stem.contains('.'));
    }

    #[test]
    fn sanitized_collisions_stay_distinct() {
        let dotted = owner_file_stem("a.b").unwrap();
        let underscored = owner_file_stem("a_b").unwrap();
        assert_ne!(dotted, underscored);
    }

    #[test]
    fn suffixed_stem_is_not_a_usable_owner_id() {
        let dotted = owner_file_stem("a.b").unwrap();
        assert!(has_digest_suffix(&dotted));

        let crafted = owner_file_stem(&dotted).unwrap();
        assert_ne!(crafted, dotted);
        assert!(crafted.starts_with(&format!("{dotted}-")));
    }

    #[test]
    fn near_suffix_ids_are_kept() {
        assert_eq!(owner_file_stem("release-2024").unwrap(), "release-2024");
        assert_eq!(owner_file_stem("team-ABCDEF12").unwrap(), "team-ABCDEF12");
        assert_ne!(owner_file_stem("build-deadbeef").unwrap(), "build-deadbeef");
    }

    #[test]
    fn empty_owner_rejected() {
        assert!(matches!(owner_file_stem(""), Err(StoreError::InvalidOwner(_))));
        assert!(matches!(owner_file_stem("  "), Err(StoreError::InvalidOwner(_))));
    }
}
