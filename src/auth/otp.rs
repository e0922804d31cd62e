//! One-time codes and opaque reset tokens.
//!
//! OTPs live in the cache store under a TTL; verification compares the
//! submitted code against the cached value, with an optional environment
//! bypass code for non-production builds.

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::config;

/// 6-digit numeric code, zero padded.
pub fn generate_otp() -> String {
    let n: u32 = rand::rng().random_range(0..1_000_000);
    format!("{:06}", n)
}

/// Opaque URL-safe token for password resets and invitations.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    hex_encode(&bytes)
}

/// Reset tokens are stored by digest so a cache dump alone cannot be
/// replayed against the reset endpoint.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex_encode(&hasher.finalize())
}

/// Check a submitted OTP against the cached value. The configured bypass
/// code (disabled in production) is accepted unconditionally.
pub fn otp_matches(submitted: &str, cached: &str) -> bool {
    if let Some(bypass) = &config::config().otp.bypass_code {
        if submitted == bypass {
            return true;
        }
    }
    // Constant-time-ish compare; codes are short and low-entropy anyway,
    // the TTL is the real defense.
    submitted.len() == cached.len()
        && submitted
            .bytes()
            .zip(cached.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_is_six_digits() {
        for _ in 0..100 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn matching_code_accepted() {
        assert!(otp_matches("123456", "123456"));
    }

    #[test]
    fn mismatched_code_rejected() {
        assert!(!otp_matches("123456", "654321"));
        assert!(!otp_matches("12345", "123456"));
    }

    #[test]
    fn bypass_code_accepted_in_dev() {
        // Dev/test config defaults the bypass to 000000
        if let Some(bypass) = &config::config().otp.bypass_code {
            assert!(otp_matches(bypass, "999999"));
        }
    }

    #[test]
    fn tokens_are_unique_and_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn digest_is_stable() {
        assert_eq!(token_digest("abc"), token_digest("abc"));
        assert_ne!(token_digest("abc"), token_digest("abd"));
    }
}
