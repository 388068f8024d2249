use tracing::{info, warn};

use crate::model::*;

use super::{Engine, EngineError};

/// Password shared by every demo account.
pub const DEMO_PASSWORD: &str = "staybook-demo";

struct DemoHotel {
    name: &'static str,
    address: [&'static str; 5],
    tel: &'static str,
    image: &'static str,
}

const DEMO_USERS: [(&str, &str, &str, Role); 3] = [
    ("John Doe", "123-456-7890", "john.doe@example.com", Role::User),
    ("Jane Smith", "987-654-3210", "jane.smith@example.com", Role::User),
    ("Admin User", "555-123-4567", "admin@example.com", Role::Admin),
];

const DEMO_HOTELS: [DemoHotel; 5] = [
    DemoHotel {
        name: "Grand Hyatt Bangkok",
        address: ["123", "Main Street", "Downtown", "Bangkok", "10330"],
        tel: "02-123-4567",
        image: "https://images.unsplash.com/photo-1566073771259-6a8506099945",
    },
    DemoHotel {
        name: "Phuket Marriott Resort",
        address: ["456", "Beach Road", "Patong", "Phuket", "83150"],
        tel: "076-987-6543",
        image: "https://images.unsplash.com/photo-1520250497591-112f2f40a3f4",
    },
    DemoHotel {
        name: "Le Meridien Chiang Mai",
        address: ["789", "Nimman Road", "Suthep", "Chiang Mai", "50200"],
        tel: "053-123-4567",
        image: "https://images.unsplash.com/photo-1551882547-ff40c63fe5fa",
    },
    DemoHotel {
        name: "Sukhumvit Suites",
        address: ["101", "Sukhumvit Road", "Watthana", "Bangkok", "10110"],
        tel: "02-345-6789",
        image: "https://images.unsplash.com/photo-1512918728675-ed5a9ecdebfd",
    },
    DemoHotel {
        name: "Thonglor Design Hotel",
        address: ["202", "Thonglor", "Khlong Tan Nuea", "Bangkok", "10110"],
        tel: "02-987-6543",
        image: "https://images.unsplash.com/photo-1522771739844-6a9f6d5f14af",
    },
];

/// (hotel, user, check-in offset from now in days, nights, created days ago)
const DEMO_BOOKINGS: [(usize, usize, i64, i64, i64); 6] = [
    (0, 0, -30, 3, 40),
    (1, 1, -20, 2, 25),
    (2, 0, -1, 3, 7),
    (3, 0, 5, 3, 2),
    (4, 1, 10, 2, 3),
    (0, 1, 15, 3, 5),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub hotels: usize,
    pub bookings: usize,
}

impl Engine {
    /// Load the demo data set: three users (one admin), five hotels and six
    /// bookings spread over past, active and upcoming stays relative to `now`.
    ///
    /// Bookings bypass the date rules so past stays can exist. A demo email
    /// that is already registered keeps its account; if all of them are, the
    /// data set is considered loaded and nothing changes.
    pub fn seed_demo(&self, now: Ms) -> Result<SeedSummary, EngineError> {
        let existing: Vec<Option<User>> = DEMO_USERS
            .iter()
            .map(|(_, _, email, _)| self.user_by_email(email))
            .collect();
        if existing.iter().all(Option::is_some) {
            return Err(EngineError::AlreadyExists("demo data".into()));
        }

        let mut users = Vec::with_capacity(DEMO_USERS.len());
        for ((name, tel, email, role), found) in DEMO_USERS.into_iter().zip(existing) {
            let user = match found {
                Some(user) => {
                    warn!(user_id = %user.id, email, "demo account already exists, reusing it");
                    user
                }
                None => self.insert_user(name, tel, email, DEMO_PASSWORD, role)?,
            };
            users.push(user);
        }

        let mut hotels = Vec::with_capacity(DEMO_HOTELS.len());
        for h in &DEMO_HOTELS {
            let [building_number, street, district, province, postal_code] = h.address;
            hotels.push(self.insert_hotel(NewHotel {
                name: h.name.into(),
                address: Address {
                    building_number: building_number.into(),
                    street: street.into(),
                    district: district.into(),
                    province: province.into(),
                    postal_code: postal_code.into(),
                },
                tel: h.tel.into(),
                image: Some(h.image.into()),
            })?);
        }

        for (hotel, user, offset, nights, created_ago) in DEMO_BOOKINGS {
            let start = now + offset * DAY_MS;
            let window = BookingWindow::new(start, start + nights * DAY_MS);
            self.insert_booking(
                hotels[hotel].id,
                users[user].id,
                window,
                now - created_ago * DAY_MS,
            )?;
        }

        let summary = SeedSummary {
            users: users.len(),
            hotels: hotels.len(),
            bookings: DEMO_BOOKINGS.len(),
        };
        info!(?summary, "seeded demo data");
        Ok(summary)
    }
}
