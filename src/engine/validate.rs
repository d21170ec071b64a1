use crate::limits::*;
use crate::model::*;
use crate::timeparse::time_to_minutes;

use super::EngineError;

/// Structural checks on a create request. Runs inside the exclusion window,
/// before the conflict scan.
pub(crate) fn validate_booking(p: &BookingPayload) -> Result<(), EngineError> {
    let required = [
        (&p.emp_no, "Missing Employee No"),
        (&p.name, "Missing Name"),
        (&p.date, "Missing Date"),
        (&p.time, "Missing Time"),
    ];
    for (value, message) in required {
        if value.trim().is_empty() {
            return Err(EngineError::Validation(message.into()));
        }
    }
    if time_to_minutes(&p.time).is_none() {
        return Err(EngineError::Validation("Invalid Time".into()));
    }

    let short = [
        ("Booking Ref", &p.reference),
        ("Employee No", &p.emp_no),
        ("Customer Name", &p.name),
        ("Phone", &p.phone),
        ("Email", &p.email),
        ("Table No.", &p.table),
        ("Table ID", &p.table_id),
        ("Date", &p.date),
        ("Time", &p.time),
    ];
    for (field, value) in short {
        check_len(field, value, MAX_SHORT_FIELD_LEN)?;
    }
    check_len("Special Requests", &p.special, MAX_TEXT_FIELD_LEN)?;
    if let Some(dishes) = &p.guest_dishes
        && dishes.len() > MAX_GUEST_DISHES
    {
        return Err(EngineError::Validation("Too many guest dishes".into()));
    }
    check_len("Guest Orders", &p.guest_orders(), MAX_TEXT_FIELD_LEN)
}

/// Length limits for a field patch. No required-field or time checks:
/// a patch only overwrites what it names.
pub(crate) fn validate_patch(patch: &BookingPatch) -> Result<(), EngineError> {
    for update in &patch.updates {
        let field = update.field();
        let max = match field {
            Field::GuestOrders | Field::SpecialRequests => MAX_TEXT_FIELD_LEN,
            _ => MAX_SHORT_FIELD_LEN,
        };
        if let Some(text) = update.text() {
            check_len(field.header(), text, max)?;
        }
    }
    Ok(())
}

pub(crate) fn validate_status(status: &BookingStatus) -> Result<(), EngineError> {
    if status.as_str().trim().is_empty() {
        return Err(EngineError::Validation("Missing Status".into()));
    }
    check_len("Status", status.as_str(), MAX_SHORT_FIELD_LEN)
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), EngineError> {
    if value.len() > max {
        return Err(EngineError::Validation(format!("Field too long: {field}")));
    }
    Ok(())
}
