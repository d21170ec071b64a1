use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Leading marker that keeps a phone number string-typed in the table.
pub const PHONE_MARKER: char = '\'';

/// Phone number held in its marked storage form.
///
/// Serializes without the marker, so callers always see the number they
/// submitted; deserializing re-applies it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Phone(String);

impl Phone {
    /// Mark `raw` unless it already carries the marker. Empty stays empty.
    pub fn marked(raw: &str) -> Self {
        if raw.is_empty() || raw.starts_with(PHONE_MARKER) {
            Phone(raw.to_string())
        } else {
            Phone(format!("{PHONE_MARKER}{raw}"))
        }
    }

    /// The value as stored, marker included.
    pub fn stored(&self) -> &str {
        &self.0
    }

    /// The number without any leading markers.
    pub fn as_str(&self) -> &str {
        self.0.trim_start_matches(PHONE_MARKER)
    }
}

impl From<String> for Phone {
    fn from(s: String) -> Self {
        Phone::marked(&s)
    }
}

impl From<Phone> for String {
    fn from(p: Phone) -> Self {
        p.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookingType {
    /// Food order only; never occupies a table slot.
    Food,
    Table,
    #[default]
    Both,
}

impl BookingType {
    /// Case-insensitive; blank means the default.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "BOTH" => Some(BookingType::Both),
            "FOOD" => Some(BookingType::Food),
            "TABLE" => Some(BookingType::Table),
            _ => None,
        }
    }

    pub fn occupies_table(self) -> bool {
        self != BookingType::Food
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BookingStatus {
    Confirmed,
    /// Soft removal: kept in the table, ignored by conflict checks.
    Cancelled,
    Other(String),
}

impl BookingStatus {
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("confirmed") {
            BookingStatus::Confirmed
        } else if trimmed.eq_ignore_ascii_case("cancelled") {
            BookingStatus::Cancelled
        } else {
            BookingStatus::Other(s.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::Cancelled => "Cancelled",
            BookingStatus::Other(s) => s,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BookingStatus::Cancelled)
    }
}

impl From<String> for BookingStatus {
    fn from(s: String) -> Self {
        BookingStatus::parse(&s)
    }
}

impl From<BookingStatus> for String {
    fn from(s: BookingStatus) -> Self {
        s.as_str().to_string()
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the bookings table. Keys on the wire are the column headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    #[serde(rename = "Booking Ref")]
    pub reference: String,
    #[serde(rename = "Employee No")]
    pub employee_id: String,
    #[serde(rename = "Customer Name")]
    pub customer_name: String,
    #[serde(rename = "Phone")]
    pub phone: Phone,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Table No.")]
    pub table_name: String,
    /// Conflict key for the table rule.
    #[serde(rename = "Table ID")]
    pub table_id: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Guests")]
    pub guests: u32,
    #[serde(rename = "Guest Orders")]
    pub guest_orders: String,
    #[serde(rename = "Special Requests")]
    pub special_requests: String,
    #[serde(rename = "Booking Type")]
    pub booking_type: BookingType,
    #[serde(rename = "Status")]
    pub status: BookingStatus,
    #[serde(rename = "Submitted At")]
    pub submitted_at: DateTime<Utc>,
}

impl BookingRecord {
    pub fn is_active(&self) -> bool {
        !self.status.is_cancelled()
    }

    pub fn apply(&mut self, update: FieldUpdate) {
        match update {
            FieldUpdate::EmployeeId(v) => self.employee_id = v,
            FieldUpdate::CustomerName(v) => self.customer_name = v,
            FieldUpdate::Phone(v) => self.phone = v,
            FieldUpdate::Email(v) => self.email = v,
            FieldUpdate::TableName(v) => self.table_name = v,
            FieldUpdate::TableId(v) => self.table_id = v,
            FieldUpdate::Date(v) => self.date = v,
            FieldUpdate::Time(v) => self.time = v,
            FieldUpdate::Guests(v) => self.guests = v,
            FieldUpdate::GuestOrders(v) => self.guest_orders = v,
            FieldUpdate::SpecialRequests(v) => self.special_requests = v,
            FieldUpdate::BookingType(v) => self.booking_type = v,
            FieldUpdate::Status(v) => self.status = v,
        }
    }
}

/// Inbound create request, as posted by the booking form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BookingPayload {
    #[serde(rename = "ref", default, deserialize_with = "lenient_string")]
    pub reference: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub emp_no: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub table: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub table_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub time: String,
    #[serde(default, deserialize_with = "lenient_count")]
    pub guests: u32,
    #[serde(default)]
    pub guest_dishes: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub menu: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub special: String,
    #[serde(rename = "type", default, deserialize_with = "lenient_booking_type")]
    pub booking_type: BookingType,
}

impl BookingPayload {
    /// Dishes joined with `" | "`, else the free-text menu, else empty.
    pub fn guest_orders(&self) -> String {
        match &self.guest_dishes {
            Some(dishes) if !dishes.is_empty() => dishes.join(" | "),
            _ => self.menu.clone(),
        }
    }

    /// The row to append: status forced to Confirmed, phone marked.
    pub fn into_record(self, submitted_at: DateTime<Utc>) -> BookingRecord {
        let guest_orders = self.guest_orders();
        BookingRecord {
            reference: self.reference,
            employee_id: self.emp_no,
            customer_name: self.name,
            phone: Phone::marked(&self.phone),
            email: self.email,
            table_name: self.table,
            table_id: self.table_id,
            date: self.date,
            time: self.time,
            guests: self.guests,
            guest_orders,
            special_requests: self.special,
            booking_type: self.booking_type,
            status: BookingStatus::Confirmed,
            submitted_at,
        }
    }
}

/// Accepts strings, numbers and booleans; `null` becomes empty.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_text(&value).ok_or_else(|| serde::de::Error::custom("expected a string or number"))
}

fn lenient_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_count(&value).ok_or_else(|| serde::de::Error::custom("expected a guest count"))
}

fn lenient_booking_type<'de, D>(deserializer: D) -> Result<BookingType, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_text(&value)
        .and_then(|s| BookingType::parse(&s))
        .ok_or_else(|| serde::de::Error::custom("expected FOOD, TABLE or BOTH"))
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn value_to_count(value: &Value) -> Option<u32> {
    match value {
        Value::Null => Some(0),
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) if s.trim().is_empty() => Some(0),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ── Partial updates ──────────────────────────────────────────────

/// Columns a patch may touch. `Booking Ref` and `Submitted At` are not among them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    EmployeeId,
    CustomerName,
    Phone,
    Email,
    TableName,
    TableId,
    Date,
    Time,
    Guests,
    GuestOrders,
    SpecialRequests,
    BookingType,
    Status,
}

impl Field {
    /// Resolve a column header or a create-payload key.
    pub fn from_key(key: &str) -> Option<Field> {
        let field = match key {
            "Employee No" | "emp_no" => Field::EmployeeId,
            "Customer Name" | "name" => Field::CustomerName,
            "Phone" | "phone" => Field::Phone,
            "Email" | "email" => Field::Email,
            "Table No." | "table" => Field::TableName,
            "Table ID" | "table_id" => Field::TableId,
            "Date" | "date" => Field::Date,
            "Time" | "time" => Field::Time,
            "Guests" | "guests" => Field::Guests,
            "Guest Orders" | "menu" => Field::GuestOrders,
            "Special Requests" | "special" => Field::SpecialRequests,
            "Booking Type" | "type" => Field::BookingType,
            "Status" | "status" => Field::Status,
            _ => return None,
        };
        Some(field)
    }

    pub fn header(self) -> &'static str {
        match self {
            Field::EmployeeId => "Employee No",
            Field::CustomerName => "Customer Name",
            Field::Phone => "Phone",
            Field::Email => "Email",
            Field::TableName => "Table No.",
            Field::TableId => "Table ID",
            Field::Date => "Date",
            Field::Time => "Time",
            Field::Guests => "Guests",
            Field::GuestOrders => "Guest Orders",
            Field::SpecialRequests => "Special Requests",
            Field::BookingType => "Booking Type",
            Field::Status => "Status",
        }
    }

    fn parse_value(self, value: &Value) -> Option<FieldUpdate> {
        let text = || value_to_text(value);
        let update = match self {
            Field::EmployeeId => FieldUpdate::EmployeeId(text()?),
            Field::CustomerName => FieldUpdate::CustomerName(text()?),
            Field::Phone => FieldUpdate::Phone(Phone::marked(&text()?)),
            Field::Email => FieldUpdate::Email(text()?),
            Field::TableName => FieldUpdate::TableName(text()?),
            Field::TableId => FieldUpdate::TableId(text()?),
            Field::Date => FieldUpdate::Date(text()?),
            Field::Time => FieldUpdate::Time(text()?),
            Field::Guests => FieldUpdate::Guests(value_to_count(value)?),
            Field::GuestOrders => FieldUpdate::GuestOrders(text()?),
            Field::SpecialRequests => FieldUpdate::SpecialRequests(text()?),
            Field::BookingType => FieldUpdate::BookingType(BookingType::parse(&text()?)?),
            Field::Status => FieldUpdate::Status(BookingStatus::parse(&text()?)),
        };
        Some(update)
    }
}

/// A typed single-column write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldUpdate {
    EmployeeId(String),
    CustomerName(String),
    Phone(Phone),
    Email(String),
    TableName(String),
    TableId(String),
    Date(String),
    Time(String),
    Guests(u32),
    GuestOrders(String),
    SpecialRequests(String),
    BookingType(BookingType),
    Status(BookingStatus),
}

impl FieldUpdate {
    pub fn field(&self) -> Field {
        match self {
            FieldUpdate::EmployeeId(_) => Field::EmployeeId,
            FieldUpdate::CustomerName(_) => Field::CustomerName,
            FieldUpdate::Phone(_) => Field::Phone,
            FieldUpdate::Email(_) => Field::Email,
            FieldUpdate::TableName(_) => Field::TableName,
            FieldUpdate::TableId(_) => Field::TableId,
            FieldUpdate::Date(_) => Field::Date,
            FieldUpdate::Time(_) => Field::Time,
            FieldUpdate::Guests(_) => Field::Guests,
            FieldUpdate::GuestOrders(_) => Field::GuestOrders,
            FieldUpdate::SpecialRequests(_) => Field::SpecialRequests,
            FieldUpdate::BookingType(_) => Field::BookingType,
            FieldUpdate::Status(_) => Field::Status,
        }
    }

    /// Text payload, for length checks. `None` for non-text columns.
    pub fn text(&self) -> Option<&str> {
        match self {
            FieldUpdate::EmployeeId(s)
            | FieldUpdate::CustomerName(s)
            | FieldUpdate::Email(s)
            | FieldUpdate::TableName(s)
            | FieldUpdate::TableId(s)
            | FieldUpdate::Date(s)
            | FieldUpdate::Time(s)
            | FieldUpdate::GuestOrders(s)
            | FieldUpdate::SpecialRequests(s) => Some(s),
            FieldUpdate::Phone(p) => Some(p.stored()),
            FieldUpdate::Status(s) => Some(s.as_str()),
            FieldUpdate::Guests(_) | FieldUpdate::BookingType(_) => None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("Invalid value for {0}")]
    InvalidValue(&'static str),
}

/// Allow-listed partial update built from a field-name → value map.
///
/// Unknown names are collected in `ignored` and otherwise dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingPatch {
    pub updates: Vec<FieldUpdate>,
    pub ignored: Vec<String>,
}

impl BookingPatch {
    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self, PatchError> {
        let mut patch = BookingPatch::default();
        for (key, value) in fields {
            match Field::from_key(key) {
                Some(field) => {
                    let update = field
                        .parse_value(value)
                        .ok_or(PatchError::InvalidValue(field.header()))?;
                    patch.updates.push(update);
                }
                None => patch.ignored.push(key.clone()),
            }
        }
        Ok(patch)
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

// ── Write-ahead log records ──────────────────────────────────────

/// Row-level mutations as persisted in the WAL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowEvent {
    RowAppended { record: BookingRecord },
    FieldOverwritten { index: usize, update: FieldUpdate },
    RowDeleted { index: usize },
}

// ── Operation results ────────────────────────────────────────────

/// Outcome of a status change: the record as it was, plus the new status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    #[serde(rename = "ref")]
    pub reference: String,
    pub status: BookingStatus,
    pub booking: BookingRecord,
}
