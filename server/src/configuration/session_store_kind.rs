use super::Configuration;

pub struct SessionStoreKind;

impl Configuration for SessionStoreKind {
    type Type = String;

    fn key() -> &'static str {
        "store"
    }
}
