use dashmap::mapref::entry::Entry;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::rules::{self, DateSelection, calendar_day};

use super::checks::{check_owner, clean_image, clean_text, validate_timestamps};
use super::{Engine, EngineError};

impl Engine {
    // ── Hotels (admin) ───────────────────────────────────────

    pub fn create_hotel(
        &self,
        credential: &Credential,
        hotel: NewHotel,
        now: Ms,
    ) -> Result<Hotel, EngineError> {
        self.authenticate_admin(credential, now)?;
        self.insert_hotel(hotel)
    }

    pub(super) fn insert_hotel(&self, hotel: NewHotel) -> Result<Hotel, EngineError> {
        if self.hotels.len() >= MAX_HOTELS {
            return Err(EngineError::LimitExceeded("too many hotels"));
        }
        let a = &hotel.address;
        let hotel = Hotel {
            id: Ulid::new(),
            name: clean_text(&hotel.name, MAX_NAME_LEN, "name")?,
            address: Address {
                building_number: clean_text(&a.building_number, MAX_FIELD_LEN, "building_number")?,
                street: clean_text(&a.street, MAX_FIELD_LEN, "street")?,
                district: clean_text(&a.district, MAX_FIELD_LEN, "district")?,
                province: clean_text(&a.province, MAX_FIELD_LEN, "province")?,
                postal_code: clean_text(&a.postal_code, MAX_FIELD_LEN, "postal_code")?,
            },
            tel: clean_text(&hotel.tel, MAX_FIELD_LEN, "tel")?,
            image: clean_image(hotel.image.as_deref())?,
        };
        self.hotels.insert(hotel.id, hotel.clone());
        info!(hotel_id = %hotel.id, name = %hotel.name, "created hotel");
        Ok(hotel)
    }

    pub fn update_hotel(
        &self,
        credential: &Credential,
        id: Ulid,
        patch: &HotelPatch,
        now: Ms,
    ) -> Result<Hotel, EngineError> {
        self.authenticate_admin(credential, now)?;
        if patch.is_empty() {
            return Err(EngineError::NoChanges);
        }
        let patch = clean_hotel_patch(patch)?;
        let mut hotel = self.hotels.get_mut(&id).ok_or(EngineError::NotFound(id))?;
        patch.apply(&mut hotel);
        Ok(hotel.clone())
    }

    /// Hotels with bookings (past ones included) cannot be deleted.
    pub fn delete_hotel(&self, credential: &Credential, id: Ulid, now: Ms) -> Result<(), EngineError> {
        self.authenticate_admin(credential, now)?;
        if !self.hotels.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        // remove_if holds the shard write lock, so no booking can slip in
        // between the check and the removal (create_booking reads the hotel).
        let removed = self.hotels.remove_if(&id, |_, _| {
            self.hotel_bookings.get(&id).is_none_or(|b| b.is_empty())
        });
        match removed {
            Some(_) => {
                self.hotel_bookings.remove(&id);
                info!(hotel_id = %id, "deleted hotel");
                Ok(())
            }
            None if self.hotels.contains_key(&id) => Err(EngineError::HasBookings(id)),
            None => Err(EngineError::NotFound(id)),
        }
    }

    // ── Bookings ─────────────────────────────────────────────

    pub fn create_booking(
        &self,
        credential: &Credential,
        hotel_id: Ulid,
        window: BookingWindow,
        now: Ms,
    ) -> Result<BookingInfo, EngineError> {
        let user = self.authenticate(credential, now)?;
        validate_timestamps(&window)?;
        rules::validate_window(&window, calendar_day(now), self.max_stay_days())?;
        self.insert_booking(hotel_id, user.id, window, now)
            .map(|b| self.booking_info(&b, now))
    }

    /// Inserts without date-rule checks. Callers validate first.
    pub(super) fn insert_booking(
        &self,
        hotel_id: Ulid,
        user_id: Ulid,
        window: BookingWindow,
        created_at: Ms,
    ) -> Result<Booking, EngineError> {
        if self.bookings.len() >= MAX_BOOKINGS {
            return Err(EngineError::LimitExceeded("too many bookings"));
        }
        // Held until the booking is indexed; blocks a concurrent delete_hotel.
        let _hotel = self
            .hotels
            .get(&hotel_id)
            .ok_or(EngineError::NotFound(hotel_id))?;
        let booking = Booking {
            id: Ulid::new(),
            hotel_id,
            user_id,
            window,
            created_at,
        };
        self.bookings.insert(booking.id, booking.clone());
        self.hotel_bookings.entry(hotel_id).or_default().push(booking.id);
        info!(booking_id = %booking.id, %hotel_id, %user_id, "created booking");
        Ok(booking)
    }

    /// Reschedule an upcoming stay. Omitted bounds keep their stored value.
    pub fn update_booking(
        &self,
        credential: &Credential,
        id: Ulid,
        start: Option<Ms>,
        end: Option<Ms>,
        now: Ms,
    ) -> Result<BookingInfo, EngineError> {
        let user = self.authenticate(credential, now)?;
        let updated = {
            let mut booking = self.bookings.get_mut(&id).ok_or(EngineError::NotFound(id))?;
            check_owner(&user, &booking)?;
            if !rules::can_modify(&booking.window, now) {
                return Err(EngineError::NotModifiable(id));
            }
            let window = BookingWindow::new(
                start.unwrap_or(booking.window.start),
                end.unwrap_or(booking.window.end),
            );
            let draft = DateSelection::from_window(&window, calendar_day(now));
            if !draft.has_changes(&booking.window) {
                return Err(EngineError::NoChanges);
            }
            validate_timestamps(&window)?;
            rules::validate_window(&window, calendar_day(now), self.max_stay_days())?;
            booking.window = window;
            booking.clone()
        };
        info!(booking_id = %id, "rescheduled booking");
        Ok(self.booking_info(&updated, now))
    }

    /// Cancel (delete) a booking that has not ended yet.
    pub fn cancel_booking(&self, credential: &Credential, id: Ulid, now: Ms) -> Result<(), EngineError> {
        let user = self.authenticate(credential, now)?;
        let hotel_id = match self.bookings.entry(id) {
            Entry::Vacant(_) => return Err(EngineError::NotFound(id)),
            Entry::Occupied(entry) => {
                check_owner(&user, entry.get())?;
                if !rules::can_cancel(&entry.get().window, now) {
                    return Err(EngineError::NotCancellable(id));
                }
                entry.remove().hotel_id
            }
        };
        if let Some(mut ids) = self.hotel_bookings.get_mut(&hotel_id) {
            ids.retain(|b| *b != id);
        }
        info!(booking_id = %id, "cancelled booking");
        Ok(())
    }
}

/// Text fields in a patch follow the same rules as on create.
fn clean_hotel_patch(patch: &HotelPatch) -> Result<HotelPatch, EngineError> {
    let field = |v: &Option<String>, max: usize, name: &'static str| {
        v.as_deref().map(|s| clean_text(s, max, name)).transpose()
    };
    Ok(HotelPatch {
        name: field(&patch.name, MAX_NAME_LEN, "name")?,
        building_number: field(&patch.building_number, MAX_FIELD_LEN, "building_number")?,
        street: field(&patch.street, MAX_FIELD_LEN, "street")?,
        district: field(&patch.district, MAX_FIELD_LEN, "district")?,
        province: field(&patch.province, MAX_FIELD_LEN, "province")?,
        postal_code: field(&patch.postal_code, MAX_FIELD_LEN, "postal_code")?,
        tel: field(&patch.tel, MAX_FIELD_LEN, "tel")?,
        image: match &patch.image {
            Some(image) => Some(clean_image(image.as_deref())?),
            None => None,
        },
    })
}
