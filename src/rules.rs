//! Booking rules: which dates a guest may pick, and where an existing stay
//! sits relative to "now".
//!
//! Everything in this module is pure. Callers pass "today"/"now" in; nothing
//! here reads the clock. Calendar-day questions are answered in UTC.

use chrono::{DateTime, Days, NaiveDate, NaiveTime};

use crate::model::{BookingWindow, DAY_MS, Ms, ReservationStatus};

/// Longest stay, in nights, a single booking may cover.
pub const MAX_STAY_DAYS: i64 = 3;

/// Calendar day (UTC) of a timestamp. Out-of-range timestamps map to the epoch day.
pub fn calendar_day(t: Ms) -> NaiveDate {
    DateTime::from_timestamp_millis(t)
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}

/// Midnight UTC of `date`, in ms.
pub fn day_start(date: NaiveDate) -> Ms {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// A check-out candidate is valid iff it falls strictly after the chosen
/// check-in day and no more than `max_stay_days` days after it.
///
/// `today` is not consulted: only the check-in day is bounded against today
/// (see [`is_start_date_selectable`]).
pub fn is_candidate_end_date_valid(
    candidate: NaiveDate,
    chosen_start: NaiveDate,
    _today: NaiveDate,
    max_stay_days: i64,
) -> bool {
    candidate > chosen_start && (candidate - chosen_start).num_days() <= max_stay_days
}

/// Check-in may be today or any later day.
pub fn is_start_date_selectable(candidate: NaiveDate, today: NaiveDate) -> bool {
    candidate >= today
}

/// Active wins at both boundaries: `now == start` and `now == end` are Active.
pub fn classify(window: &BookingWindow, now: Ms) -> ReservationStatus {
    if window.contains_instant(now) {
        ReservationStatus::Active
    } else if now < window.start {
        ReservationStatus::Upcoming
    } else {
        ReservationStatus::Past
    }
}

/// Whole nights between check-in and check-out. 0 when either bound is missing.
pub fn nights_count(start: Option<Ms>, end: Option<Ms>) -> i64 {
    match (start, end) {
        (Some(start), Some(end)) => (end - start) / DAY_MS,
        _ => 0,
    }
}

/// `max(0, ceil((start - now) / 1 day))`.
pub fn days_until_stay(window: &BookingWindow, now: Ms) -> i64 {
    let diff = window.start - now;
    if diff <= 0 {
        return 0;
    }
    (diff + DAY_MS - 1) / DAY_MS
}

/// Dates can only be changed before the stay starts.
pub fn can_modify(window: &BookingWindow, now: Ms) -> bool {
    classify(window, now) == ReservationStatus::Upcoming
}

/// Upcoming and in-progress stays may be cancelled; finished ones may not.
pub fn can_cancel(window: &BookingWindow, now: Ms) -> bool {
    classify(window, now) != ReservationStatus::Past
}

/// Which selection rule a submitted window breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleViolation {
    StartInPast,
    EndNotAfterStart,
    StayTooLong { nights: i64, max: i64 },
}

impl std::fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleViolation::StartInPast => write!(f, "check-in date is in the past"),
            RuleViolation::EndNotAfterStart => {
                write!(f, "check-out date must be after check-in date")
            }
            RuleViolation::StayTooLong { nights, max } => {
                write!(f, "stay of {nights} nights exceeds the maximum of {max}")
            }
        }
    }
}

/// The two picker rules applied together, for a window being submitted.
pub fn validate_window(
    window: &BookingWindow,
    today: NaiveDate,
    max_stay_days: i64,
) -> Result<(), RuleViolation> {
    let start = calendar_day(window.start);
    let end = calendar_day(window.end);
    if !is_start_date_selectable(start, today) {
        return Err(RuleViolation::StartInPast);
    }
    if end <= start || window.end <= window.start {
        return Err(RuleViolation::EndNotAfterStart);
    }
    if !is_candidate_end_date_valid(end, start, today, max_stay_days) {
        return Err(RuleViolation::StayTooLong {
            nights: (end - start).num_days(),
            max: max_stay_days,
        });
    }
    Ok(())
}

/// Every check-out day a picker should enable once `chosen_start` is picked.
pub fn selectable_end_dates(chosen_start: NaiveDate, max_stay_days: i64) -> Vec<NaiveDate> {
    (1..=max_stay_days.max(0))
        .filter_map(|i| chosen_start.checked_add_days(Days::new(i as u64)))
        .collect()
}

/// Items bucketed by [`classify`]. Input order is kept within each bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buckets<T> {
    pub active: Vec<T>,
    pub upcoming: Vec<T>,
    pub past: Vec<T>,
}

impl<T> Default for Buckets<T> {
    fn default() -> Self {
        Self {
            active: Vec::new(),
            upcoming: Vec::new(),
            past: Vec::new(),
        }
    }
}

pub fn partition<T>(
    items: impl IntoIterator<Item = T>,
    window_of: impl Fn(&T) -> BookingWindow,
    now: Ms,
) -> Buckets<T> {
    let mut buckets = Buckets::default();
    for item in items {
        match classify(&window_of(&item), now) {
            ReservationStatus::Active => buckets.active.push(item),
            ReservationStatus::Upcoming => buckets.upcoming.push(item),
            ReservationStatus::Past => buckets.past.push(item),
        }
    }
    buckets
}

// ── Interactive selection ────────────────────────────────────────

/// Draft check-in/check-out pair held while a guest picks dates.
///
/// Discarded on cancel; turned into a [`BookingWindow`] on submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateSelection {
    today: NaiveDate,
    max_stay_days: i64,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl DateSelection {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            max_stay_days: MAX_STAY_DAYS,
            start: None,
            end: None,
        }
    }

    /// Pre-filled from an existing booking (the reschedule form).
    pub fn from_window(window: &BookingWindow, today: NaiveDate) -> Self {
        Self {
            start: Some(calendar_day(window.start)),
            end: Some(calendar_day(window.end)),
            ..Self::new(today)
        }
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.start
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.end
    }

    pub fn is_start_selectable(&self, candidate: NaiveDate) -> bool {
        is_start_date_selectable(candidate, self.today)
    }

    /// Every candidate is disabled until a check-in day is chosen.
    pub fn is_end_selectable(&self, candidate: NaiveDate) -> bool {
        match self.start {
            Some(start) => {
                is_candidate_end_date_valid(candidate, start, self.today, self.max_stay_days)
            }
            None => false,
        }
    }

    /// Returns false (and changes nothing) if the day is not selectable.
    /// A check-out that now falls before the new check-in is cleared.
    pub fn select_start(&mut self, date: NaiveDate) -> bool {
        if !self.is_start_selectable(date) {
            return false;
        }
        self.start = Some(date);
        if self.end.is_some_and(|end| end < date) {
            self.end = None;
        }
        true
    }

    pub fn select_end(&mut self, date: NaiveDate) -> bool {
        if !self.is_end_selectable(date) {
            return false;
        }
        self.end = Some(date);
        true
    }

    pub fn is_complete(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    pub fn nights(&self) -> i64 {
        match (self.start, self.end) {
            (Some(start), Some(end)) => (end - start).num_days(),
            _ => 0,
        }
    }

    /// True when either day differs from the stored booking's.
    pub fn has_changes(&self, original: &BookingWindow) -> bool {
        self.start != Some(calendar_day(original.start))
            || self.end != Some(calendar_day(original.end))
    }

    pub fn to_window(&self) -> Option<BookingWindow> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(BookingWindow::new(day_start(start), day_start(end))),
            _ => None,
        }
    }
}
