use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;
use crate::rules::{self, Buckets};

use super::checks::check_owner;
use super::{Engine, EngineError};

impl Engine {
    /// Public hotel listing, optionally narrowed by a search term. Sorted by name.
    pub fn list_hotels(&self, search: Option<&str>) -> Vec<Hotel> {
        let mut hotels: Vec<Hotel> = self
            .hotels
            .iter()
            .filter(|h| search.is_none_or(|term| h.matches(term)))
            .map(|h| h.value().clone())
            .collect();
        hotels.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        hotels
    }

    pub fn get_hotel(&self, id: Ulid) -> Result<Hotel, EngineError> {
        self.hotels
            .get(&id)
            .map(|h| h.value().clone())
            .ok_or(EngineError::NotFound(id))
    }

    pub fn get_booking(&self, credential: &Credential, id: Ulid, now: Ms) -> Result<BookingInfo, EngineError> {
        let user = self.authenticate(credential, now)?;
        let booking = self
            .bookings
            .get(&id)
            .map(|b| b.value().clone())
            .ok_or(EngineError::NotFound(id))?;
        check_owner(&user, &booking)?;
        Ok(self.booking_info(&booking, now))
    }

    /// The caller's bookings (every booking for admins), optionally narrowed
    /// to one hotel and/or one derived status. Ordered by check-in.
    pub fn list_bookings(
        &self,
        credential: &Credential,
        hotel_id: Option<Ulid>,
        status: Option<ReservationStatus>,
        now: Ms,
    ) -> Result<Vec<BookingInfo>, EngineError> {
        let user = self.authenticate(credential, now)?;
        let visible = |b: &Booking| user.is_admin() || b.user_id == user.id;

        let mut found: Vec<Booking> = match hotel_id {
            Some(hid) => {
                if !self.hotels.contains_key(&hid) {
                    return Err(EngineError::NotFound(hid));
                }
                let ids = self
                    .hotel_bookings
                    .get(&hid)
                    .map(|ids| ids.value().clone())
                    .unwrap_or_default();
                ids.iter()
                    .filter_map(|id| self.bookings.get(id).map(|b| b.value().clone()))
                    .filter(|b| visible(b))
                    .collect()
            }
            None => self
                .bookings
                .iter()
                .filter(|b| visible(b.value()))
                .map(|b| b.value().clone())
                .collect(),
        };
        found.sort_by_key(|b| (b.window.start, b.id));

        Ok(found
            .iter()
            .map(|b| self.booking_info(b, now))
            .filter(|info| status.is_none_or(|s| info.status == s))
            .collect())
    }

    /// The caller's bookings split into active / upcoming / past.
    pub fn dashboard(&self, credential: &Credential, now: Ms) -> Result<Buckets<BookingInfo>, EngineError> {
        let bookings = self.list_bookings(credential, None, None, now)?;
        Ok(rules::partition(
            bookings,
            |b| BookingWindow::new(b.start, b.end),
            now,
        ))
    }

    /// Check-out days a picker should enable for a given check-in day.
    /// Empty when the check-in day itself is not selectable.
    pub fn checkout_dates(&self, start: Ms, now: Ms) -> Vec<NaiveDate> {
        let start = rules::calendar_day(start);
        if !rules::is_start_date_selectable(start, rules::calendar_day(now)) {
            return Vec::new();
        }
        rules::selectable_end_dates(start, self.max_stay_days())
    }
}
