use super::Configuration;

/// Whether the session cookie is only sent over HTTPS.
pub struct SessionSecure;

impl Configuration for SessionSecure {
    type Type = bool;

    fn key() -> &'static str {
        "secure"
    }
}
