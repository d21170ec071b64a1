use std::cmp::Reverse;

use chrono::NaiveDate;
use tracing::debug;

use crate::model::*;
use crate::timeparse::{normalize_date, parse_date, slot_active, time_to_minutes};

use super::{Engine, EngineError};

impl Engine {
    /// Every row, in table order.
    pub async fn all_bookings(&self) -> Result<Vec<BookingRecord>, EngineError> {
        Ok(self.store.read_all_records().await?)
    }

    /// Active bookings on `date` (any accepted date spelling).
    pub async fn bookings_on(&self, date: &str) -> Result<Vec<BookingRecord>, EngineError> {
        let target = normalize_date(date);
        let rows = self.store.read_all_records().await?;
        Ok(rows
            .into_iter()
            .filter(|b| b.is_active() && normalize_date(&b.date) == target)
            .collect())
    }

    /// Active bookings on `date` whose slot is in progress at `now_time`.
    pub async fn active_bookings(
        &self,
        date: &str,
        now_time: &str,
    ) -> Result<Vec<BookingRecord>, EngineError> {
        let slot = self.settings.slot_minutes;
        let mut rows = self.bookings_on(date).await?;
        rows.retain(|b| slot_active(&b.time, now_time, slot));
        Ok(rows)
    }

    /// Bookings matching a phone number (or, for older clients, an employee id),
    /// newest slot first.
    pub async fn booking_history(&self, query: &str) -> Result<Vec<BookingRecord>, EngineError> {
        let needle = history_key(query);
        if needle.is_empty() {
            debug!("empty history query");
            return Ok(Vec::new());
        }

        let rows = self.store.read_all_records().await?;
        let mut history: Vec<BookingRecord> = rows
            .into_iter()
            .filter(|b| {
                history_key(b.phone.stored()) == needle
                    || b.employee_id.trim().to_lowercase() == needle
            })
            .collect();
        history.sort_by_key(|b| Reverse(slot_key(b)));
        Ok(history)
    }
}

/// Lower-cased, trimmed, leading string markers removed.
fn history_key(raw: &str) -> String {
    raw.to_lowercase()
        .trim()
        .trim_start_matches(PHONE_MARKER)
        .to_string()
}

/// Sort key for a booking's slot. Unreadable times count as midnight;
/// unreadable dates sort below every real date.
fn slot_key(b: &BookingRecord) -> (Option<NaiveDate>, i32) {
    (parse_date(&b.date), time_to_minutes(&b.time).unwrap_or(0))
}
