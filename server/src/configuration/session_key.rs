use super::Configuration;

pub struct SessionKey;

impl Configuration for SessionKey {
    type Type = String;

    fn key() -> &'static str {
        "key"
    }
}
