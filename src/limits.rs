/// Longest accepted request line on the wire, in bytes.
pub const MAX_REQUEST_LINE_LEN: usize = 64 * 1024;

/// Identifiers and short text: ref, employee, name, phone, email, table, date, time, status.
pub const MAX_SHORT_FIELD_LEN: usize = 256;

/// Guest orders and special requests.
pub const MAX_TEXT_FIELD_LEN: usize = 8 * 1024;

pub const MAX_GUEST_DISHES: usize = 200;

/// Slot length used when no configuration overrides it.
pub const DEFAULT_SLOT_MINUTES: i32 = 120;

pub const DEFAULT_CREATE_LOCK_WAIT_MS: u64 = 30_000;
pub const DEFAULT_LOCK_WAIT_MS: u64 = 10_000;
