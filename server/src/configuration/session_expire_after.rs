use super::Configuration;

/// Lifetime of a session cookie in seconds, counted from issuance.
pub struct SessionExpireAfter;

impl Configuration for SessionExpireAfter {
    type Type = i64;

    fn key() -> &'static str {
        "expire-after"
    }
}
