use chrono::{DateTime, TimeZone, Utc};
use log::{info, warn};
use rocket::{
    http::{Cookie, CookieJar, Status},
    request::{FromRequest, Outcome},
    time::OffsetDateTime,
    Request,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use super::{SessionPolicy, SessionStore};

/// Largest cookie, name and encrypted value included, that browsers are
/// required to keep.
pub const MAX_COOKIE_SIZE: usize = 4096;

// AES-GCM nonce and tag added by Rocket's private cookies.
const PRIVATE_COOKIE_OVERHEAD: usize = 12 + 16;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no session policy has been configured")]
    NotConfigured,
    #[error("session cookie would be {0} bytes, over the 4096 byte limit")]
    CookieOverflow(usize),
    #[error("session expiry is out of range")]
    ExpiryOutOfRange,
    #[error("session value could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionCookie {
    id: Uuid,
    #[serde(with = "chrono::serde::ts_seconds")]
    issued_at: DateTime<Utc>,
    #[serde(default)]
    data: Map<String, Value>,
}

#[derive(Serialize)]
struct OutboundCookie<'a> {
    id: Uuid,
    #[serde(with = "chrono::serde::ts_seconds")]
    issued_at: DateTime<Utc>,
    data: &'a Map<String, Value>,
}

/// Session state carried in the encrypted session cookie.
///
/// Every change rewrites the cookie with a fresh issuance time, so the
/// cookie's `Expires` is always the issuance time plus the configured
/// `expire_after`.
pub struct Session<'r> {
    jar: &'r CookieJar<'r>,
    policy: &'r SessionPolicy,
    id: Uuid,
    issued_at: Option<DateTime<Utc>>,
    data: Map<String, Value>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Session<'r> {
    type Error = SessionError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let policy = match request.rocket().state::<SessionPolicy>() {
            Some(policy) => policy,
            None => {
                return Outcome::Error((Status::InternalServerError, SessionError::NotConfigured))
            }
        };

        match policy.store() {
            SessionStore::Cookie => {
                Outcome::Success(Session::load(request.cookies(), policy, Utc::now()))
            }
            SessionStore::ServerSide(disabled) => match disabled {},
        }
    }
}

impl<'r> Session<'r> {
    fn load(jar: &'r CookieJar<'r>, policy: &'r SessionPolicy, now: DateTime<Utc>) -> Self {
        let inbound = jar.get_private(policy.key().as_str()).and_then(|cookie| {
            match serde_json::from_str::<SessionCookie>(cookie.value()) {
                Ok(payload) => Some(payload),
                Err(err) => {
                    warn!("discarding undecodable session cookie: {}", err);
                    None
                }
            }
        });

        match inbound {
            Some(payload) if policy.is_expired(payload.issued_at, now) => {
                info!("session {} expired", payload.id);
                let session = Self::fresh(jar, policy);
                session.remove_cookie();
                session
            }
            Some(payload) => {
                let mut session = Self {
                    jar,
                    policy,
                    id: payload.id,
                    issued_at: Some(payload.issued_at),
                    data: payload.data,
                };

                // Sessions with an expiry slide forward on every request.
                if !session.data.is_empty() {
                    if let Err(err) = session.commit(now) {
                        warn!("could not renew session {}: {}", session.id, err);
                    }
                }

                session
            }
            None => Self::fresh(jar, policy),
        }
    }

    fn fresh(jar: &'r CookieJar<'r>, policy: &'r SessionPolicy) -> Self {
        Self {
            jar,
            policy,
            id: Uuid::new_v4(),
            issued_at: None,
            data: Map::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// When the current cookie was issued. `None` until the session is first
    /// written.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
            .and_then(|issued_at| self.policy.expires_at(issued_at))
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.data
            .get(name)
            .and_then(|value| serde_json::value::from_value(value.clone()).ok())
    }

    /// Stores `value` under `name` and reissues the cookie. If the cookie
    /// would overflow, the session is left as it was.
    pub fn insert<T: Serialize>(&mut self, name: &str, value: T) -> Result<(), SessionError> {
        let value = serde_json::to_value(value)?;
        let previous = self.data.insert(name.to_owned(), value);

        if let Err(err) = self.commit(Utc::now()) {
            match previous {
                Some(previous) => self.data.insert(name.to_owned(), previous),
                None => self.data.remove(name),
            };
            return Err(err);
        }

        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Option<Value>, SessionError> {
        let removed = self.data.remove(name);
        if removed.is_some() {
            self.commit(Utc::now())?;
        }

        Ok(removed)
    }

    /// Drops all session data, starts a new session id and removes the
    /// cookie from the client.
    pub fn reset(&mut self) {
        self.data.clear();
        self.id = Uuid::new_v4();
        self.issued_at = None;
        self.remove_cookie();
    }

    fn commit(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        let issued_at = truncate_to_seconds(now)?;
        let expires_at = self
            .policy
            .expires_at(issued_at)
            .ok_or(SessionError::ExpiryOutOfRange)?;
        let expires_at = OffsetDateTime::from_unix_timestamp(expires_at.timestamp())
            .map_err(|_| SessionError::ExpiryOutOfRange)?;

        let payload = serde_json::to_string(&OutboundCookie {
            id: self.id,
            issued_at,
            data: &self.data,
        })?;
        let name = self.policy.key().as_str();
        let size = encoded_cookie_size(name, &payload);
        if size > MAX_COOKIE_SIZE {
            return Err(SessionError::CookieOverflow(size));
        }

        let attributes = self.policy.cookie();
        let mut cookie = Cookie::build((name.to_owned(), payload))
            .path(attributes.path.clone())
            .http_only(attributes.http_only)
            .secure(attributes.secure)
            .same_site(attributes.same_site)
            .expires(expires_at);
        if let Some(domain) = &attributes.domain {
            cookie = cookie.domain(domain.clone());
        }

        self.jar.add_private(cookie.build());
        self.issued_at = Some(issued_at);

        Ok(())
    }

    fn remove_cookie(&self) {
        let attributes = self.policy.cookie();
        let mut cookie = Cookie::build((self.policy.key().as_str().to_owned(), ""))
            .path(attributes.path.clone());
        if let Some(domain) = &attributes.domain {
            cookie = cookie.domain(domain.clone());
        }

        self.jar.remove_private(cookie.build());
    }
}

fn truncate_to_seconds(now: DateTime<Utc>) -> Result<DateTime<Utc>, SessionError> {
    Utc.timestamp_opt(now.timestamp(), 0)
        .single()
        .ok_or(SessionError::ExpiryOutOfRange)
}

// `name=` followed by base64(nonce || ciphertext || tag).
fn encoded_cookie_size(name: &str, payload: &str) -> usize {
    let sealed = payload.len() + PRIVATE_COOKIE_OVERHEAD;
    name.len() + 1 + (sealed + 2) / 3 * 4
}
