use std::sync::Arc;

use chrono::Local;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::timeparse::canonical_date;

/// A decoded request, one per JSON object on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Create(BookingPayload),
    All,
    /// `None` means the server's local today.
    Today { date: Option<String> },
    Active {
        date: Option<String>,
        time: Option<String>,
    },
    History { query: String },
    Update {
        reference: String,
        data: Map<String, Value>,
    },
    Status {
        reference: String,
        status: BookingStatus,
    },
    Cancel { reference: String },
    Delete { reference: String },
}

impl Command {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Command::Create(_)
                | Command::Update { .. }
                | Command::Status { .. }
                | Command::Cancel { .. }
                | Command::Delete { .. }
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Request must be a JSON object")]
    NotAnObject,
    #[error("Missing {0}")]
    MissingField(&'static str),
    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Decode one request line. A missing or unrecognised `action` means `all`.
pub fn parse_request(line: &str) -> Result<Command, RequestError> {
    let value: Value = serde_json::from_str(line)?;
    let Value::Object(obj) = value else {
        return Err(RequestError::NotAnObject);
    };

    let action = text_field(&obj, "action")
        .map(|a| a.trim().to_ascii_lowercase())
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| "all".to_string());

    let cmd = match action.as_str() {
        "create" => {
            reference(&obj)?;
            let payload: BookingPayload =
                serde_json::from_value(Value::Object(obj)).map_err(|e| {
                    RequestError::InvalidField {
                        field: "booking",
                        reason: e.to_string(),
                    }
                })?;
            Command::Create(payload)
        }
        "today" => Command::Today {
            date: non_blank(&obj, "date"),
        },
        "active" => Command::Active {
            date: non_blank(&obj, "date"),
            time: non_blank(&obj, "time"),
        },
        "history" => Command::History {
            query: non_blank(&obj, "phone")
                .or_else(|| non_blank(&obj, "emp"))
                .unwrap_or_default(),
        },
        "update" => Command::Update {
            reference: reference(&obj)?,
            data: patch_data(&obj)?,
        },
        "status" => Command::Status {
            reference: reference(&obj)?,
            status: BookingStatus::parse(&text_field(&obj, "status").unwrap_or_default()),
        },
        "cancel" => Command::Cancel {
            reference: reference(&obj)?,
        },
        "delete" => Command::Delete {
            reference: reference(&obj)?,
        },
        "all" => Command::All,
        other => {
            debug!(action = other, "unrecognised action, listing all bookings");
            Command::All
        }
    };
    Ok(cmd)
}

/// String or number value of `key`; anything else counts as absent.
fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_blank(obj: &Map<String, Value>, key: &str) -> Option<String> {
    text_field(obj, key).filter(|s| !s.trim().is_empty())
}

fn reference(obj: &Map<String, Value>) -> Result<String, RequestError> {
    non_blank(obj, "ref").ok_or(RequestError::MissingField("ref"))
}

/// `data` may be an object or a string holding a JSON-encoded object.
fn patch_data(obj: &Map<String, Value>) -> Result<Map<String, Value>, RequestError> {
    let invalid = |reason: String| RequestError::InvalidField {
        field: "data",
        reason,
    };
    match obj.get("data") {
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(Value::String(encoded)) => match serde_json::from_str::<Value>(encoded) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(invalid("expected an object".into())),
            Err(e) => Err(invalid(e.to_string())),
        },
        Some(Value::Null) | None => Err(RequestError::MissingField("data")),
        Some(_) => Err(invalid("expected an object".into())),
    }
}

/// The uniform response shape. Absent members are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<BookingRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookings: Option<Vec<BookingRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl Envelope {
    pub fn with_ref(reference: String) -> Self {
        Self {
            success: true,
            reference: Some(reference),
            ..Self::default()
        }
    }

    pub fn with_bookings(bookings: Vec<BookingRecord>) -> Self {
        Self {
            success: true,
            bookings: Some(bookings),
            ..Self::default()
        }
    }

    pub fn with_status_change(change: StatusChange) -> Self {
        Self {
            success: true,
            reference: Some(change.reference),
            status: Some(change.status.to_string()),
            booking: Some(change.booking),
            ..Self::default()
        }
    }

    pub fn failure(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            code: Some(code),
            ..Self::default()
        }
    }

    pub fn bad_request(err: &RequestError) -> Self {
        Self::failure("bad_request", err.to_string())
    }
}

impl From<EngineError> for Envelope {
    fn from(e: EngineError) -> Self {
        if let EngineError::Store(ref inner) = e {
            error!(error = %inner, "store failure");
        }
        Envelope::failure(e.code(), e.to_string())
    }
}

/// Run a command against the engine. Never fails: errors become envelopes.
///
/// Mutations run in their own task so that a caller that goes away
/// mid-request cannot cancel them while the lock is held.
pub async fn execute(engine: &Arc<Engine>, cmd: Command) -> Envelope {
    if cmd.is_mutation() {
        let engine = engine.clone();
        return match tokio::spawn(async move { dispatch(&engine, cmd).await }).await {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, "mutation task failed");
                Envelope::failure("store", format!("Server Error: {e}"))
            }
        };
    }
    dispatch(engine, cmd).await
}

async fn dispatch(engine: &Engine, cmd: Command) -> Envelope {
    let result = match cmd {
        Command::Create(payload) => engine.create_booking(payload).await.map(Envelope::with_ref),
        Command::All => engine.all_bookings().await.map(Envelope::with_bookings),
        Command::Today { date } => {
            let date = date.unwrap_or_else(local_today);
            debug!(%date, "listing bookings for date");
            engine.bookings_on(&date).await.map(Envelope::with_bookings)
        }
        Command::Active { date, time } => {
            let date = date.unwrap_or_else(local_today);
            let time = time.unwrap_or_else(|| Local::now().format("%H:%M").to_string());
            debug!(%date, %time, "listing active bookings");
            engine
                .active_bookings(&date, &time)
                .await
                .map(Envelope::with_bookings)
        }
        Command::History { query } => engine
            .booking_history(&query)
            .await
            .map(Envelope::with_bookings),
        Command::Update { reference, data } => engine
            .update_fields(&reference, &data)
            .await
            .map(Envelope::with_ref),
        Command::Status { reference, status } => engine
            .update_status(&reference, status)
            .await
            .map(Envelope::with_status_change),
        Command::Cancel { reference } => engine
            .cancel_booking(&reference)
            .await
            .map(Envelope::with_status_change),
        Command::Delete { reference } => engine
            .delete_booking(&reference)
            .await
            .map(Envelope::with_ref),
    };
    result.unwrap_or_else(Envelope::from)
}

fn local_today() -> String {
    canonical_date(Local::now().date_naive())
}

/// Parse and execute one request line.
pub async fn handle_line(engine: &Arc<Engine>, line: &str) -> (Option<&'static str>, Envelope) {
    match parse_request(line) {
        Ok(cmd) => {
            let action = crate::observability::action_label(&cmd);
            (Some(action), execute(engine, cmd).await)
        }
        Err(e) => {
            debug!(error = %e, "rejected request");
            (None, Envelope::bad_request(&e))
        }
    }
}
