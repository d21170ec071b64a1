use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::model::*;

use super::conflict::{is_employee_booked, is_table_free};
use super::store::ScanDirection;
use super::validate::{validate_booking, validate_patch, validate_status};
use super::{ConflictKind, Engine, EngineError};

impl Engine {
    /// Validate, check both conflict rules against a fresh snapshot, append.
    ///
    /// FOOD bookings skip the table rule; the employee rule always applies.
    /// The stored row is Confirmed and stamped with the server's clock.
    pub async fn create_booking(&self, payload: BookingPayload) -> Result<String, EngineError> {
        let _guard = self.exclusive(self.settings.create_lock_wait).await?;

        validate_booking(&payload)?;

        let rows = self.store.read_all_records().await?;
        if payload.booking_type.occupies_table()
            && !is_table_free(
                &rows,
                &payload.table_id,
                &payload.date,
                &payload.time,
                self.settings.slot_minutes,
            )
        {
            return Err(rejected(ConflictKind::Table, &payload.reference));
        }
        if is_employee_booked(&rows, &payload.emp_no, &payload.date, &payload.time) {
            return Err(rejected(ConflictKind::Employee, &payload.reference));
        }

        let record = payload.into_record(Utc::now());
        let reference = record.reference.clone();
        let slot = format!("{} {} @ {}", record.date, record.time, record.table_id);
        self.store.append_record(record).await?;

        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        info!(reference = %reference, slot = %slot, "booking created");
        Ok(reference)
    }

    /// Overwrite the status of the first row carrying `reference`.
    ///
    /// Returns the row as it was before the write together with the new status.
    pub async fn update_status(
        &self,
        reference: &str,
        status: BookingStatus,
    ) -> Result<StatusChange, EngineError> {
        let _guard = self.exclusive(self.settings.lock_wait).await?;

        validate_status(&status)?;
        let index = self.locate(reference, ScanDirection::TopDown).await?;
        let booking = self
            .store
            .read_row(index)
            .await?
            .ok_or_else(|| EngineError::NotFound(reference.to_string()))?;

        self.store
            .overwrite_field(index, FieldUpdate::Status(status.clone()))
            .await?;
        info!(reference, status = %status, "booking status changed");
        Ok(StatusChange {
            reference: reference.to_string(),
            status,
            booking,
        })
    }

    pub async fn cancel_booking(&self, reference: &str) -> Result<StatusChange, EngineError> {
        self.update_status(reference, BookingStatus::Cancelled).await
    }

    /// Apply a field-name → value patch to the first row carrying `reference`.
    ///
    /// Names outside the allow-list are ignored. No conflict re-check is done.
    pub async fn update_fields(
        &self,
        reference: &str,
        fields: &Map<String, Value>,
    ) -> Result<String, EngineError> {
        let _guard = self.exclusive(self.settings.lock_wait).await?;

        let patch = BookingPatch::from_fields(fields)?;
        validate_patch(&patch)?;
        if !patch.ignored.is_empty() {
            debug!(reference, ignored = ?patch.ignored, "ignoring unknown patch fields");
        }

        let index = self.locate(reference, ScanDirection::TopDown).await?;
        let changed = patch.updates.len();
        for update in patch.updates {
            self.store.overwrite_field(index, update).await?;
        }
        info!(reference, changed, "booking fields updated");
        Ok(reference.to_string())
    }

    /// Physically remove the last row carrying `reference`.
    pub async fn delete_booking(&self, reference: &str) -> Result<String, EngineError> {
        let _guard = self.exclusive(self.settings.lock_wait).await?;

        let index = self.locate(reference, ScanDirection::BottomUp).await?;
        self.store.delete_row_at_index(index).await?;
        info!(reference, index, "booking deleted");
        Ok(reference.to_string())
    }

    async fn locate(&self, reference: &str, direction: ScanDirection) -> Result<usize, EngineError> {
        self.store
            .find_row_index_by_reference(reference, direction)
            .await?
            .ok_or_else(|| EngineError::NotFound(reference.to_string()))
    }
}

fn rejected(kind: ConflictKind, reference: &str) -> EngineError {
    metrics::counter!(crate::observability::CONFLICTS_TOTAL, "kind" => kind.label()).increment(1);
    warn!(reference, kind = kind.label(), "booking rejected: slot conflict");
    EngineError::Conflict(kind)
}
