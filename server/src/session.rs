use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use log::{error, info};
use rocket::{
    fairing::{self, Fairing, Info, Kind},
    figment::Figment,
    http::SameSite,
    Build, Rocket,
};

use crate::configuration::{
    Configuration, ConfigurationError, ConfigurationManager, SessionExpireAfter, SessionKey,
    SessionSecure, SessionStoreKind,
};

mod cookie_store;

pub use self::cookie_store::Session;

pub const APPLICATION_SESSION_KEY: &str = "broomble_trap";
pub const APPLICATION_EXPIRE_AFTER_DAYS: i64 = 30;

/// Browsers cap cookie lifetimes at 400 days; anything longer is refused at boot.
pub const MAX_EXPIRE_AFTER_DAYS: i64 = 400;

/// Where session state lives. Only the cookie store can be selected; the
/// server-side variant carries an uninhabited payload and cannot be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStore {
    Cookie,
    ServerSide(Disabled),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disabled {}

impl FromStr for SessionStore {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cookie" | "cookie_store" => Ok(SessionStore::Cookie),
            "server-side" | "active_record" | "active_record_store" => {
                Err(ConfigurationError::StoreDisabled(s.to_owned()))
            }
            other => Err(ConfigurationError::UnknownStore(other.to_owned())),
        }
    }
}

impl fmt::Display for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStore::Cookie => f.write_str("cookie"),
            SessionStore::ServerSide(disabled) => match *disabled {},
        }
    }
}

/// Name of the session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieKey(String);

impl CookieKey {
    pub fn new(key: impl Into<String>) -> Result<Self, ConfigurationError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ConfigurationError::EmptyKey);
        }

        if !key.bytes().all(is_token_byte) {
            return Err(ConfigurationError::InvalidKey(key));
        }

        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CookieKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// RFC 6265 cookie-name: a token, i.e. visible ASCII minus separators.
fn is_token_byte(byte: u8) -> bool {
    (0x21..=0x7e).contains(&byte) && !b"()<>@,;:\\\"/[]?={}".contains(&byte)
}

/// How long a session cookie is honoured after it was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpireAfter(Duration);

impl ExpireAfter {
    pub fn seconds(seconds: i64) -> Result<Self, ConfigurationError> {
        if seconds <= 0 {
            return Err(ConfigurationError::NonPositiveExpiry(seconds));
        }

        if seconds > MAX_EXPIRE_AFTER_DAYS * 24 * 60 * 60 {
            return Err(ConfigurationError::ExpiryTooLong(seconds));
        }

        Ok(Self(Duration::seconds(seconds)))
    }

    pub fn days(days: i64) -> Result<Self, ConfigurationError> {
        match days.checked_mul(24 * 60 * 60) {
            Some(seconds) => Self::seconds(seconds),
            None => Err(ConfigurationError::InvalidValue {
                key: String::from(SessionExpireAfter::key()),
                message: format!("{} days is out of range", days),
            }),
        }
    }

    pub fn duration(&self) -> Duration {
        self.0
    }

    pub fn as_seconds(&self) -> i64 {
        self.0.num_seconds()
    }
}

/// Attributes written alongside every session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieAttributes {
    pub path: String,
    pub domain: Option<String>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

impl Default for CookieAttributes {
    fn default() -> Self {
        Self {
            path: String::from("/"),
            domain: None,
            http_only: true,
            secure: false,
            same_site: SameSite::Lax,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPolicy {
    store: SessionStore,
    key: CookieKey,
    expire_after: ExpireAfter,
    cookie: CookieAttributes,
}

impl SessionPolicy {
    pub fn new(store: SessionStore, key: CookieKey, expire_after: ExpireAfter) -> Self {
        Self {
            store,
            key,
            expire_after,
            cookie: CookieAttributes::default(),
        }
    }

    /// Cookie store, `broomble_trap`, one month.
    pub fn application() -> Self {
        Self::new(
            SessionStore::Cookie,
            CookieKey(String::from(APPLICATION_SESSION_KEY)),
            ExpireAfter(Duration::days(APPLICATION_EXPIRE_AFTER_DAYS)),
        )
    }

    /// Replaces the fields named in the configuration, keeping the rest.
    pub fn with_overrides(
        mut self,
        manager: &ConfigurationManager,
    ) -> Result<Self, ConfigurationError> {
        if let Some(store) = manager.get::<SessionStoreKind>()? {
            self.store = store.parse()?;
        }

        if let Some(key) = manager.get::<SessionKey>()? {
            self.key = CookieKey::new(key)?;
        }

        if let Some(seconds) = manager.get::<SessionExpireAfter>()? {
            self.expire_after = ExpireAfter::seconds(seconds)?;
        }

        if let Some(secure) = manager.get::<SessionSecure>()? {
            let cookie = CookieAttributes {
                secure,
                ..self.cookie.clone()
            };
            self = self.with_cookie_attributes(cookie);
        }

        Ok(self)
    }

    pub fn with_cookie_attributes(mut self, cookie: CookieAttributes) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn store(&self) -> SessionStore {
        self.store
    }

    pub fn key(&self) -> &CookieKey {
        &self.key
    }

    pub fn expire_after(&self) -> ExpireAfter {
        self.expire_after
    }

    pub fn cookie(&self) -> &CookieAttributes {
        &self.cookie
    }

    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        issued_at.checked_add_signed(self.expire_after.duration())
    }

    pub fn is_expired(&self, issued_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.expires_at(issued_at) {
            Some(expires_at) => expires_at <= now,
            None => false,
        }
    }
}

/// Registers the session policy with Rocket during ignition. Values in the
/// `session` table of the Rocket configuration override the given policy.
pub fn configure(policy: SessionPolicy) -> SessionConfiguration {
    SessionConfiguration { policy }
}

#[derive(Debug)]
pub struct SessionConfiguration {
    policy: SessionPolicy,
}

impl SessionConfiguration {
    fn resolve(&self, figment: &Figment) -> Result<SessionPolicy, ConfigurationError> {
        let manager = ConfigurationManager::from_figment(figment)?;
        self.policy.clone().with_overrides(&manager)
    }
}

#[rocket::async_trait]
impl Fairing for SessionConfiguration {
    fn info(&self) -> Info {
        Info {
            name: "Session Store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> fairing::Result {
        let policy = match self.resolve(rocket.figment()) {
            Ok(policy) => policy,
            Err(err) => {
                error!("invalid session configuration: {}", err);
                return Err(rocket);
            }
        };

        let registered = rocket
            .state::<SessionPolicy>()
            .map(|active| *active == policy);
        match registered {
            Some(true) => Ok(rocket),
            Some(false) => {
                error!("{}", ConfigurationError::AlreadyConfigured);
                Err(rocket)
            }
            None => {
                info!(
                    "session store: {}, cookie {:?}, expires after {}s",
                    policy.store(),
                    policy.key().as_str(),
                    policy.expire_after().as_seconds()
                );
                Ok(rocket.manage(policy))
            }
        }
    }
}
