use chrono::{DateTime, NaiveDate};

/// Formats tried, in order, for dates that do not start with `YYYY-MM-DD`.
const FALLBACK_DATE_FORMATS: &[&str] = &[
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%a %b %d %Y",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

/// Minutes since midnight for a time-slot string, or `None` if it can't be read.
///
/// Ranges such as `"05:00 PM - 07:00 PM"` resolve to their start. An AM/PM
/// marker anywhere in the start token switches to 12-hour interpretation.
/// Everything except digits and `:` is discarded before splitting into
/// hour and minute, so `"18:00 hrs"` reads as `18:00`.
pub fn time_to_minutes(raw: &str) -> Option<i32> {
    let start = raw.split(['-', '–']).next().unwrap_or("").trim();
    if start.is_empty() {
        return None;
    }

    let meridiem = find_meridiem(start);
    let digits: String = start
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ':')
        .collect();
    let mut parts = digits.split(':');
    let mut hour: i32 = parts.next()?.parse().ok()?;
    let minute: i32 = parts.next()?.parse().ok()?;

    match meridiem {
        Some(Meridiem::Pm) if hour != 12 => hour = hour.checked_add(12)?,
        Some(Meridiem::Am) if hour == 12 => hour = 0,
        _ => {}
    }

    hour.checked_mul(60)?.checked_add(minute)
}

/// First AM/PM marker in the token, case-insensitive.
fn find_meridiem(token: &str) -> Option<Meridiem> {
    let upper = token.to_ascii_uppercase();
    let am = upper.find("AM");
    let pm = upper.find("PM");
    match (am, pm) {
        (Some(a), Some(p)) if a < p => Some(Meridiem::Am),
        (Some(_), Some(_)) => Some(Meridiem::Pm),
        (Some(_), None) => Some(Meridiem::Am),
        (None, Some(_)) => Some(Meridiem::Pm),
        (None, None) => None,
    }
}

/// Canonical `YYYY-MM-DD` from the date's own calendar fields.
pub fn canonical_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Normalize a stored or submitted date to `YYYY-MM-DD`.
///
/// An ISO prefix is cut out as-is, never re-parsed, so no timezone can shift
/// the day. Other shapes go through [`FALLBACK_DATE_FORMATS`]; if nothing
/// matches, the trimmed input comes back unchanged and callers must cope with
/// a non-canonical value.
pub fn normalize_date(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }
    if let Some(prefix) = iso_prefix(s) {
        return prefix.to_string();
    }
    match parse_date_fallback(s) {
        Some(date) => canonical_date(date),
        None => s.to_string(),
    }
}

/// Calendar date for sorting; `None` when the value is not a recognizable date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let normalized = normalize_date(raw);
    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d").ok()
}

fn iso_prefix(s: &str) -> Option<&str> {
    let b = s.as_bytes();
    if b.len() < 10 {
        return None;
    }
    let digits = |range: std::ops::Range<usize>| b[range].iter().all(u8::is_ascii_digit);
    if digits(0..4) && b[4] == b'-' && digits(5..7) && b[7] == b'-' && digits(8..10) {
        Some(&s[..10])
    } else {
        None
    }
}

fn parse_date_fallback(s: &str) -> Option<NaiveDate> {
    for fmt in FALLBACK_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.date_naive());
    }
    // "Sat Jun 01 2024 18:00:00 GMT+0530 (India Standard Time)"
    let head: Vec<&str> = s.split_whitespace().take(4).collect();
    if head.len() == 4 {
        return NaiveDate::parse_from_str(&head.join(" "), "%a %b %d %Y").ok();
    }
    None
}

/// Whether `now` falls inside the slot that starts at `booking_time`.
///
/// Unreadable times on either side count as active.
pub fn slot_active(booking_time: &str, now_time: &str, slot_minutes: i32) -> bool {
    match (time_to_minutes(booking_time), time_to_minutes(now_time)) {
        (Some(start), Some(now)) => now >= start && now - start < slot_minutes,
        _ => true,
    }
}
