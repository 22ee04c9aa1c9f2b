//! Post link and shortcode handling.
//!
//! A post's shortcode is its numeric media id written in a URL-safe base64
//! alphabet, so links resolve to ids without a network round trip.

use commentwatch_core::InstagramApiError;
use url::Url;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Private posts carry a 28 character suffix after the real shortcode.
const PRIVATE_SUFFIX_LEN: usize = 28;

const POST_PATH_KINDS: [&str; 4] = ["p", "reel", "reels", "tv"];

/// Decodes a shortcode into its numeric media id.
pub fn media_pk_from_code(code: &str) -> Result<u128, InstagramApiError> {
    let invalid = || InstagramApiError::InvalidPostUrl {
        url: code.to_string(),
    };

    if !code.is_ascii() {
        return Err(invalid());
    }
    let code = if code.len() > PRIVATE_SUFFIX_LEN {
        &code[..code.len() - PRIVATE_SUFFIX_LEN]
    } else {
        code
    };
    if code.is_empty() {
        return Err(invalid());
    }

    code.bytes().try_fold(0u128, |pk, byte| {
        let digit = ALPHABET
            .iter()
            .position(|&c| c == byte)
            .ok_or_else(invalid)?;
        pk.checked_mul(64)
            .and_then(|pk| pk.checked_add(digit as u128))
            .ok_or_else(invalid)
    })
}

/// Resolves a post reference to a media id.
///
/// Accepts a full post link (`/p/`, `/reel/`, `/tv/`), a bare shortcode or a
/// numeric media id.
pub fn media_pk_from_reference(reference: &str) -> Result<String, InstagramApiError> {
    let reference = reference.trim();
    let invalid = || InstagramApiError::InvalidPostUrl {
        url: reference.to_string(),
    };

    if reference.is_empty() {
        return Err(invalid());
    }
    if reference.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(reference.to_string());
    }

    if !reference.contains('/') {
        return media_pk_from_code(reference)
            .map(|pk| pk.to_string())
            .map_err(|_| invalid());
    }

    let with_scheme = if reference.contains("://") {
        reference.to_string()
    } else {
        format!("https://{}", reference)
    };
    let url = Url::parse(&with_scheme).map_err(|_| invalid())?;

    let host = url.host_str().unwrap_or_default();
    let known_host = host == "instagram.com"
        || host.ends_with(".instagram.com")
        || host == "instagr.am"
        || host.ends_with(".instagr.am");
    if !known_host {
        return Err(invalid());
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let code = segments
        .windows(2)
        .find(|pair| POST_PATH_KINDS.contains(&pair[0]))
        .map(|pair| pair[1])
        .or_else(|| segments.last().copied())
        .ok_or_else(invalid)?;

    media_pk_from_code(code)
        .map(|pk| pk.to_string())
        .map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_shortcode() {
        assert_eq!(media_pk_from_code("B-fKL9qpeab").unwrap(), 2278584739065882267);
        assert_eq!(media_pk_from_code("BA").unwrap(), 64);
    }

    #[test]
    fn test_private_suffix_is_stripped() {
        let suffixed = format!("B-fKL9qpeab{}", "x".repeat(28));
        assert_eq!(media_pk_from_code(&suffixed).unwrap(), 2278584739065882267);
    }

    #[test]
    fn test_invalid_characters() {
        assert!(media_pk_from_code("abc$").is_err());
        assert!(media_pk_from_code("").is_err());
    }

    #[test]
    fn test_post_links() {
        let expected = "2278584739065882267";
        for link in [
            "https://www.instagram.com/p/B-fKL9qpeab/",
            "https://instagram.com/p/B-fKL9qpeab/?igsh=abc",
            "instagram.com/reel/B-fKL9qpeab",
            "https://www.instagram.com/someone/p/B-fKL9qpeab/",
            "B-fKL9qpeab",
        ] {
            assert_eq!(media_pk_from_reference(link).unwrap(), expected, "{}", link);
        }
    }

    #[test]
    fn test_numeric_reference_passes_through() {
        assert_eq!(media_pk_from_reference(" 3141592 ").unwrap(), "3141592");
    }

    #[test]
    fn test_foreign_host_rejected() {
        assert!(matches!(
            media_pk_from_reference("https://example.com/p/B-fKL9qpeab/"),
            Err(InstagramApiError::InvalidPostUrl { .. })
        ));
    }
}
