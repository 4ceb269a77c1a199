//! Login sessions
//!
//! A session lets a client skip credential extraction on later requests. It
//! is presented back as `x-auth-session: <username>:<token>`.

use super::Identity;
use dashmap::DashMap;
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Request header carrying a session
pub const SESSION_HEADER: &str = "x-auth-session";

/// Session handle: a user name and a 128-bit random token
///
/// Two sessions are equal iff both fields match.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Session {
    username: String,
    token: Uuid,
}

impl Session {
    /// Mint a session with a fresh random token
    pub fn new(username: impl Into<String>) -> Self {
        Self::with_token(username, Uuid::new_v4())
    }

    pub fn with_token(username: impl Into<String>, token: Uuid) -> Self {
        Self {
            username: username.into(),
            token,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn token(&self) -> Uuid {
        self.token
    }

    /// Header value form `<username>:<token>`
    pub fn to_header_value(&self) -> String {
        format!("{}:{}", self.username, self.token)
    }

    /// Parse the header value form. The token is everything after the last `:`.
    pub fn parse_header_value(value: &str) -> Option<Self> {
        let (username, token) = value.trim().rsplit_once(':')?;
        if username.is_empty() {
            return None;
        }
        let token = Uuid::parse_str(token).ok()?;
        Some(Self::with_token(username, token))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Storage for issued sessions
pub trait SessionStore: Send + Sync {
    /// Mint and remember a session for an authenticated identity
    fn issue(&self, identity: &Identity) -> Session;

    /// Identity behind a live session
    fn resolve(&self, session: &Session) -> Option<Identity>;

    fn revoke(&self, session: &Session);
}

/// TTL-bounded in-memory session store
pub struct InMemorySessionStore {
    sessions: DashMap<Session, (Identity, Instant)>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Drop expired sessions, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.sessions.len();
        let now = Instant::now();
        self.sessions.retain(|_, (_, expires)| *expires > now);
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for InMemorySessionStore {
    fn issue(&self, identity: &Identity) -> Session {
        let session = Session::new(identity.username.clone());
        self.sessions.insert(
            session.clone(),
            (identity.clone(), Instant::now() + self.ttl),
        );
        session
    }

    fn resolve(&self, session: &Session) -> Option<Identity> {
        let identity = {
            let entry = self.sessions.get(session)?;
            let (identity, expires) = entry.value();
            (*expires > Instant::now()).then(|| identity.clone())
        };

        if identity.is_none() {
            self.sessions.remove(session);
        }
        identity
    }

    fn revoke(&self, session: &Session) {
        self.sessions.remove(session);
    }
}
