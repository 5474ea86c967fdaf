mod session_expire_after;
mod session_key;
mod session_secure;
mod session_store_kind;

pub use self::{
    session_expire_after::SessionExpireAfter, session_key::SessionKey,
    session_secure::SessionSecure, session_store_kind::SessionStoreKind,
};

use rocket::figment::Figment;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Table in the Rocket configuration that holds the session overrides.
pub const SESSION_TABLE: &str = "session";

/// A typed key in the `session` table.
pub trait Configuration {
    type Type: Serialize + DeserializeOwned;

    fn key() -> &'static str;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("session cookie key must not be empty")]
    EmptyKey,
    #[error("session cookie key {0:?} contains characters not allowed in a cookie name")]
    InvalidKey(String),
    #[error("session expiration must be a positive number of seconds, got {0}")]
    NonPositiveExpiry(i64),
    #[error("session expiration of {0} seconds is longer than browsers keep cookies")]
    ExpiryTooLong(i64),
    #[error("session store {0:?} is disabled")]
    StoreDisabled(String),
    #[error("unknown session store {0:?}")]
    UnknownStore(String),
    #[error("invalid value for configuration key {key:?}: {message}")]
    InvalidValue { key: String, message: String },
    #[error("a different session policy is already configured")]
    AlreadyConfigured,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigurationManager {
    active_configuration: HashMap<String, serde_json::Value>,
}

impl ConfigurationManager {
    /// Reads overrides from the `session` table of the Rocket configuration.
    /// A missing table means nothing is overridden.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigurationError> {
        let active_configuration = match figment.find_value(SESSION_TABLE) {
            Ok(value) => value
                .deserialize()
                .map_err(|err| ConfigurationError::InvalidValue {
                    key: String::from(SESSION_TABLE),
                    message: err.to_string(),
                })?,
            Err(_) => HashMap::new(),
        };

        Ok(Self {
            active_configuration,
        })
    }

    /// The configured value for `T`, or `None` if the key is absent. A
    /// present value of the wrong type is an error.
    pub fn get<T: Configuration>(&self) -> Result<Option<T::Type>, ConfigurationError> {
        match self.active_configuration.get(T::key()) {
            Some(value) => serde_json::value::from_value(value.clone())
                .map(Some)
                .map_err(|err| ConfigurationError::InvalidValue {
                    key: String::from(T::key()),
                    message: err.to_string(),
                }),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_overridden_without_session_table() -> anyhow::Result<()> {
        let manager = ConfigurationManager::from_figment(&Figment::new())?;

        assert_eq!(manager.get::<SessionStoreKind>()?, None);
        assert_eq!(manager.get::<SessionKey>()?, None);
        assert_eq!(manager.get::<SessionExpireAfter>()?, None);
        assert_eq!(manager.get::<SessionSecure>()?, None);

        Ok(())
    }

    #[test]
    fn overrides_are_read_from_session_table() -> anyhow::Result<()> {
        let figment = Figment::new()
            .merge(("session.key", "other_cookie"))
            .merge(("session.expire-after", 60));
        let manager = ConfigurationManager::from_figment(&figment)?;

        assert_eq!(manager.get::<SessionKey>()?.as_deref(), Some("other_cookie"));
        assert_eq!(manager.get::<SessionExpireAfter>()?, Some(60));
        assert_eq!(manager.get::<SessionStoreKind>()?, None);

        Ok(())
    }

    #[test]
    fn ill_typed_override_is_an_error() -> anyhow::Result<()> {
        let figment = Figment::new().merge(("session.expire-after", "one month"));
        let manager = ConfigurationManager::from_figment(&figment)?;

        match manager.get::<SessionExpireAfter>() {
            Err(ConfigurationError::InvalidValue { key, .. }) => assert_eq!(key, "expire-after"),
            other => panic!("expected an invalid value error, got {:?}", other),
        }

        Ok(())
    }
}
