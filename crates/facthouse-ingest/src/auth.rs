//! API-key authentication.
//!
//! A single static shared secret, compared in constant time so response
//! timing leaks nothing about how much of a guessed key matched. Deploys
//! without an `API_KEY` run with authentication disabled.

use subtle::ConstantTimeEq;

/// Check a request's `X-API-Key` header value against the configured key.
/// `configured = None` means auth is disabled and every request passes.
pub fn api_key_matches(configured: Option<&str>, provided: Option<&str>) -> bool {
    match configured {
        None => true,
        Some(expected) => match provided {
            Some(provided) => constant_time_eq(expected, provided),
            None => false,
        },
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_auth_accepts_everything() {
        assert!(api_key_matches(None, None));
        assert!(api_key_matches(None, Some("anything")));
    }

    #[test]
    fn enabled_auth_requires_exact_key() {
        assert!(api_key_matches(Some("secret"), Some("secret")));
        assert!(!api_key_matches(Some("secret"), Some("Secret")));
        assert!(!api_key_matches(Some("secret"), Some("secret2")));
        assert!(!api_key_matches(Some("secret"), Some("")));
        assert!(!api_key_matches(Some("secret"), None));
    }
}
