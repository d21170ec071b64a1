use crate::model::*;
use crate::timeparse::{normalize_date, time_to_minutes};

/// Whether `table_id` has no active booking within one slot of `time` on `date`.
///
/// Compares start times only: two bookings collide when their starts are
/// strictly less than `slot_minutes` apart. Every active row on the table
/// counts, whatever its booking type; rows whose own time cannot be read are
/// skipped. Callers decide whether the candidate needs this check at all.
pub(crate) fn is_table_free(
    rows: &[BookingRecord],
    table_id: &str,
    date: &str,
    time: &str,
    slot_minutes: i32,
) -> bool {
    let Some(candidate) = time_to_minutes(time) else {
        // Unreadable candidates never reach here; validation rejects them first.
        return true;
    };
    let target_date = normalize_date(date);

    !rows.iter().any(|b| {
        if !b.is_active() || b.table_id != table_id {
            return false;
        }
        if normalize_date(&b.date) != target_date {
            return false;
        }
        match time_to_minutes(&b.time) {
            Some(existing) => (candidate - existing).abs() < slot_minutes,
            None => false,
        }
    })
}

/// Whether the employee already has an active booking at exactly this date and time.
///
/// Employee ids compare trimmed and case-insensitively, dates after
/// normalization, and times as literal strings.
pub(crate) fn is_employee_booked(
    rows: &[BookingRecord],
    employee_id: &str,
    date: &str,
    time: &str,
) -> bool {
    let emp = employee_id.trim().to_lowercase();
    let target_date = normalize_date(date);

    rows.iter().any(|b| {
        b.is_active()
            && b.employee_id.trim().to_lowercase() == emp
            && normalize_date(&b.date) == target_date
            && b.time == time
    })
}
