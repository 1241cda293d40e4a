//! Session token issuing and restart handling.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use promptrun_core::SessionId;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session_id";

/// Outcome of identifying a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub session: SessionId,
    /// True when a new token was issued for this request.
    pub issued: bool,
}

impl Identity {
    /// `Set-Cookie` header value for this identity.
    #[must_use]
    pub fn set_cookie(&self) -> String {
        format!(
            "{SESSION_COOKIE}={}; HttpOnly; SameSite=Strict; Path=/",
            self.session
        )
    }
}

/// Decides which session a request belongs to.
///
/// The first request after launch always receives a fresh token, so
/// conversational context never survives a service restart.
#[derive(Debug)]
pub struct SessionIdentity {
    service_epoch: SystemTime,
    fresh_start: AtomicBool,
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionIdentity {
    /// Create an identity component for a service starting now.
    #[must_use]
    pub fn new() -> Self {
        Self::with_epoch(SystemTime::now())
    }

    /// Create an identity component for a service started at `service_epoch`.
    #[must_use]
    pub const fn with_epoch(service_epoch: SystemTime) -> Self {
        Self {
            service_epoch,
            fresh_start: AtomicBool::new(true),
        }
    }

    /// When the service started.
    #[must_use]
    pub const fn service_epoch(&self) -> SystemTime {
        self.service_epoch
    }

    /// Time since the service started, zero if `now` precedes it.
    #[must_use]
    pub fn uptime_at(&self, now: SystemTime) -> Duration {
        now.duration_since(self.service_epoch).unwrap_or_default()
    }

    /// Whether the next request will be treated as the first after launch.
    #[must_use]
    pub fn is_fresh_start(&self) -> bool {
        self.fresh_start.load(Ordering::Acquire)
    }

    /// Identify a request presenting `existing` as its token.
    #[must_use]
    pub fn identify(&self, existing: Option<&str>) -> Identity {
        self.identify_at(existing, SystemTime::now())
    }

    /// Identify a request at wall-clock time `now`.
    #[must_use]
    pub fn identify_at(&self, existing: Option<&str>, now: SystemTime) -> Identity {
        let restarted = self.fresh_start.swap(false, Ordering::AcqRel);
        let presented = existing.and_then(SessionId::parse);
        if restarted {
            tracing::info!(
                uptime_secs = self.uptime_at(now).as_secs(),
                replaced = presented.is_some(),
                "First request since launch, issuing a fresh session"
            );
        }

        if let Some(session) = presented.clone().filter(|_| !restarted) {
            return Identity {
                session,
                issued: false,
            };
        }

        let mut secs = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if presented.as_ref().is_some_and(|p| p.as_str() == secs.to_string()) {
            secs += 1;
        }
        let session = SessionId::new(secs.to_string());
        tracing::debug!(%session, restarted, "Issued session token");

        Identity {
            session,
            issued: true,
        }
    }
}

/// Extract the session token from a `Cookie` header value.
#[must_use]
pub fn session_cookie(header: &str) -> Option<&str> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name.trim() == SESSION_COOKIE).then(|| value.trim().trim_matches('"'))
    })
}
