use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

pub(crate) fn validate_timestamps(window: &BookingWindow) -> Result<(), EngineError> {
    for t in [window.start, window.end] {
        if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&t) {
            return Err(EngineError::LimitExceeded("timestamp out of range"));
        }
    }
    Ok(())
}

/// Trimmed, non-empty, bounded.
pub(crate) fn clean_text(value: &str, max: usize, field: &'static str) -> Result<String, EngineError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EngineError::InvalidInput(field));
    }
    if value.len() > max {
        return Err(EngineError::LimitExceeded(field));
    }
    Ok(value.to_string())
}

pub(crate) fn clean_email(email: &str) -> Result<String, EngineError> {
    let email = clean_text(email, MAX_FIELD_LEN, "email")?.to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(EngineError::InvalidInput("email")),
    }
}

pub(crate) fn check_password(password: &str) -> Result<(), EngineError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(EngineError::InvalidInput("password too short"));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(EngineError::LimitExceeded("password too long"));
    }
    Ok(())
}

pub(crate) fn clean_image(image: Option<&str>) -> Result<Option<String>, EngineError> {
    match image.map(str::trim) {
        None | Some("") => Ok(None),
        Some(url) if url.len() > MAX_URL_LEN => Err(EngineError::LimitExceeded("image url")),
        Some(url) => Ok(Some(url.to_string())),
    }
}

/// 160 random bits from two ULIDs, hex-encoded.
pub(crate) fn new_token() -> String {
    format!("{:020x}{:020x}", Ulid::new().random(), Ulid::new().random())
}

/// Owners act on their own bookings; admins act on anyone's.
pub(crate) fn check_owner(user: &User, booking: &Booking) -> Result<(), EngineError> {
    if booking.user_id == user.id || user.is_admin() {
        Ok(())
    } else {
        Err(EngineError::Forbidden("booking belongs to another user"))
    }
}
