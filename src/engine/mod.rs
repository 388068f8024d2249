mod checks;
mod error;
mod mutations;
mod queries;
mod seed;
mod sessions;

pub use checks::now_ms;
pub use error::EngineError;
pub use seed::{DEMO_PASSWORD, SeedSummary};

use std::time::Duration;

use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;
use crate::rules;

/// In-memory booking collaborator: users, sessions, hotels and bookings.
///
/// Every operation that acts on behalf of a user takes an explicit
/// [`Credential`]; every operation that depends on time takes `now`.
/// Nothing is persisted.
pub struct Engine {
    pub(super) users: DashMap<Ulid, User>,
    /// Lowercased email → user id. Claimed before the user row is inserted.
    pub(super) emails: DashMap<String, Ulid>,
    pub(super) sessions: DashMap<String, Session>,
    pub(super) hotels: DashMap<Ulid, Hotel>,
    pub(super) bookings: DashMap<Ulid, Booking>,
    /// Hotel → bookings index, so hotel deletion and per-hotel listing skip a full scan.
    pub(super) hotel_bookings: DashMap<Ulid, Vec<Ulid>>,
    session_ttl_ms: Ms,
    max_stay_days: i64,
}

impl Engine {
    pub fn new(session_ttl: Duration) -> Self {
        Self {
            users: DashMap::new(),
            emails: DashMap::new(),
            sessions: DashMap::new(),
            hotels: DashMap::new(),
            bookings: DashMap::new(),
            hotel_bookings: DashMap::new(),
            session_ttl_ms: Ms::try_from(session_ttl.as_millis()).unwrap_or(Ms::MAX),
            max_stay_days: rules::MAX_STAY_DAYS,
        }
    }

    pub fn max_stay_days(&self) -> i64 {
        self.max_stay_days
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn hotel_count(&self) -> usize {
        self.hotels.len()
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub(super) fn user_by_email(&self, email: &str) -> Option<User> {
        let id = *self.emails.get(email)?;
        self.users.get(&id).map(|u| u.value().clone())
    }

    /// Resolve a credential to its user. Expired sessions are treated as unknown;
    /// the reaper removes them.
    pub(super) fn authenticate(&self, credential: &Credential, now: Ms) -> Result<User, EngineError> {
        let user_id = {
            let session = self
                .sessions
                .get(credential.token())
                .ok_or(EngineError::Unauthenticated)?;
            if session.expires_at <= now {
                return Err(EngineError::Unauthenticated);
            }
            session.user_id
        };
        self.users
            .get(&user_id)
            .map(|u| u.value().clone())
            .ok_or(EngineError::Unauthenticated)
    }

    pub(super) fn authenticate_admin(&self, credential: &Credential, now: Ms) -> Result<User, EngineError> {
        let user = self.authenticate(credential, now)?;
        if !user.is_admin() {
            return Err(EngineError::Forbidden("admin only"));
        }
        Ok(user)
    }

    /// Join a booking with hotel/user names and the derived display values.
    pub(super) fn booking_info(&self, booking: &Booking, now: Ms) -> BookingInfo {
        let hotel_name = self
            .hotels
            .get(&booking.hotel_id)
            .map(|h| h.name.clone())
            .unwrap_or_default();
        let user_name = self
            .users
            .get(&booking.user_id)
            .map(|u| u.name.clone())
            .unwrap_or_default();
        let w = &booking.window;
        BookingInfo {
            id: booking.id,
            hotel_id: booking.hotel_id,
            hotel_name,
            user_id: booking.user_id,
            user_name,
            start: w.start,
            end: w.end,
            created_at: booking.created_at,
            status: rules::classify(w, now),
            nights: rules::nights_count(Some(w.start), Some(w.end)),
            days_until_stay: rules::days_until_stay(w, now),
            can_modify: rules::can_modify(w, now),
            can_cancel: rules::can_cancel(w, now),
        }
    }

    pub(super) fn session_expiry(&self, now: Ms) -> Ms {
        now.saturating_add(self.session_ttl_ms)
    }
}
