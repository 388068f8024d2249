use crate::model::Ms;

pub const MAX_USERS: usize = 100_000;
pub const MAX_HOTELS: usize = 10_000;
pub const MAX_BOOKINGS: usize = 1_000_000;
pub const MAX_SESSIONS: usize = 100_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_FIELD_LEN: usize = 256;
pub const MAX_URL_LEN: usize = 2048;
pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 1024;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
