use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type on the engine and the wire.
pub type Ms = i64;

pub const DAY_MS: Ms = 86_400_000;

/// A stay: check-in at `start`, check-out at `end`.
///
/// Unlike a half-open span both ends count as "during the stay" when
/// classifying (see [`crate::rules::classify`]). The length invariant is
/// checked when a window is submitted, not here, so stored bookings can
/// always be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingWindow {
    pub start: Ms,
    pub end: Ms,
}

impl BookingWindow {
    pub fn new(start: Ms, end: Ms) -> Self {
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Derived from "now" and a window. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Past,
    Active,
    Upcoming,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Past => "past",
            ReservationStatus::Active => "active",
            ReservationStatus::Upcoming => "upcoming",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "past" | "completed" => Some(ReservationStatus::Past),
            "active" => Some(ReservationStatus::Active),
            "upcoming" => Some(ReservationStatus::Upcoming),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Ulid,
    pub name: String,
    pub tel_number: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// Hand-written so passwords never reach a log line.
impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("tel_number", &self.tel_number)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Address {
    pub building_number: String,
    pub street: String,
    pub district: String,
    pub province: String,
    pub postal_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotel {
    pub id: Ulid,
    pub name: String,
    pub address: Address,
    pub tel: String,
    pub image: Option<String>,
}

impl Hotel {
    /// Case-insensitive substring match over name, province and district.
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&term)
            || self.address.province.to_lowercase().contains(&term)
            || self.address.district.to_lowercase().contains(&term)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub hotel_id: Ulid,
    pub user_id: Ulid,
    pub window: BookingWindow,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: Ulid,
    pub expires_at: Ms,
}

/// Bearer token identifying a logged-in user. Passed explicitly to every
/// engine call that needs one.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

// ── Inputs ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHotel {
    pub name: String,
    pub address: Address,
    pub tel: String,
    pub image: Option<String>,
}

/// Partial hotel update; `None` leaves the field alone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HotelPatch {
    pub name: Option<String>,
    pub building_number: Option<String>,
    pub street: Option<String>,
    pub district: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub tel: Option<String>,
    pub image: Option<Option<String>>,
}

impl HotelPatch {
    pub fn is_empty(&self) -> bool {
        *self == HotelPatch::default()
    }

    pub fn apply(&self, hotel: &mut Hotel) {
        if let Some(v) = &self.name {
            hotel.name = v.clone();
        }
        if let Some(v) = &self.building_number {
            hotel.address.building_number = v.clone();
        }
        if let Some(v) = &self.street {
            hotel.address.street = v.clone();
        }
        if let Some(v) = &self.district {
            hotel.address.district = v.clone();
        }
        if let Some(v) = &self.province {
            hotel.address.province = v.clone();
        }
        if let Some(v) = &self.postal_code {
            hotel.address.postal_code = v.clone();
        }
        if let Some(v) = &self.tel {
            hotel.tel = v.clone();
        }
        if let Some(v) = &self.image {
            hotel.image = v.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub tel_number: Option<String>,
    pub email: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        *self == UserPatch::default()
    }
}

// ── Query result types ───────────────────────────────────────────

/// A booking joined with its hotel and the derived display values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInfo {
    pub id: Ulid,
    pub hotel_id: Ulid,
    pub hotel_name: String,
    pub user_id: Ulid,
    pub user_name: String,
    pub start: Ms,
    pub end: Ms,
    pub created_at: Ms,
    pub status: ReservationStatus,
    pub nights: i64,
    pub days_until_stay: i64,
    pub can_modify: bool,
    pub can_cancel: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    pub user: User,
    pub token: String,
}
