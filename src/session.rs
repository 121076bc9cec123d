//! Session-scoped holder of the master secret.

use std::cell::Cell;
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use zeroize::Zeroizing;

use crate::error::SessionError;

/// The user's master password.
///
/// Lives only in memory, is wiped on drop and never shows up in `Debug`
/// output.
#[derive(Clone)]
pub struct MasterSecret(Zeroizing<String>);

impl MasterSecret {
    pub fn new(password: String) -> Self {
        Self(Zeroizing::new(password))
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl From<Zeroizing<String>> for MasterSecret {
    fn from(password: Zeroizing<String>) -> Self {
        Self(password)
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret(***)")
    }
}

/// An unlocked vault session for one owner.
///
/// Every encrypt/decrypt call borrows the master secret through
/// [`Session::secret`], which refuses once the idle timeout has passed and
/// otherwise counts as activity. Dropping the session (logout) wipes the
/// secret.
#[derive(Debug)]
pub struct Session {
    owner_id: String,
    secret: MasterSecret,
    idle_timeout: TimeDelta,
    last_used: Cell<DateTime<Utc>>,
}

impl Session {
    pub fn new(owner_id: impl Into<String>, secret: MasterSecret, idle_timeout: TimeDelta) -> Self {
        Self {
            owner_id: owner_id.into(),
            secret,
            idle_timeout,
            last_used: Cell::new(Utc::now()),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.last_used.get() > self.idle_timeout
    }

    /// Returns the master secret if the session is still live.
    pub fn secret(&self) -> Result<&MasterSecret, SessionError> {
        self.secret_at(Utc::now())
    }

    pub fn secret_at(&self, now: DateTime<Utc>) -> Result<&MasterSecret, SessionError> {
        if self.is_expired_at(now) {
            return Err(SessionError::Expired);
        }
        if now > self.last_used.get() {
            self.last_used.set(now);
        }
        Ok(&self.secret)
    }

    /// Ends the session, wiping the master secret.
    pub fn end(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_the_secret() {
        let session = Session::new(
            "owner",
            MasterSecret::new("hunter2".into()),
            TimeDelta::minutes(15),
        );
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("MasterSecret(***)"));
    }

    #[test]
    fn secret_is_available_until_idle_timeout() {
        let session = Session::new(
            "owner",
            MasterSecret::new("pw".into()),
            TimeDelta::minutes(15),
        );
        let now = Utc::now();

        assert_eq!(session.secret_at(now).unwrap().expose(), "pw");
        assert_eq!(
            session.secret_at(now + TimeDelta::minutes(16)).unwrap_err(),
            SessionError::Expired
        );
    }

    #[test]
    fn use_extends_the_session() {
        let session = Session::new(
            "owner",
            MasterSecret::new("pw".into()),
            TimeDelta::minutes(10),
        );
        let start = Utc::now();

        assert!(session.secret_at(start + TimeDelta::minutes(8)).is_ok());
        assert!(session.secret_at(start + TimeDelta::minutes(16)).is_ok());
        assert!(session.secret_at(start + TimeDelta::minutes(30)).is_err());
    }
}
