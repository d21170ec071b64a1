use std::path::PathBuf;
use std::time::Duration;

use serde_json::{Map, Value, json};

use super::*;
use crate::model::*;

fn payload(reference: &str, emp: &str, table_id: &str, date: &str, time: &str) -> BookingPayload {
    BookingPayload {
        reference: reference.into(),
        emp_no: emp.into(),
        name: format!("Guest {emp}"),
        phone: "9876543210".into(),
        table: format!("Table {table_id}"),
        table_id: table_id.into(),
        date: date.into(),
        time: time.into(),
        guests: 2,
        ..Default::default()
    }
}

fn fields(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

fn engine() -> Engine {
    Engine::in_memory(EngineSettings::default())
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("tablebook_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

// ── Create ───────────────────────────────────────────────

#[tokio::test]
async fn created_record_round_trips_every_field() {
    let engine = engine();
    engine
        .create_booking(BookingPayload {
            reference: "BK-100".into(),
            emp_no: "E42".into(),
            name: "Asha Rao".into(),
            phone: "9876543210".into(),
            email: "asha@example.com".into(),
            table: "Table 5 (Window)".into(),
            table_id: "T5".into(),
            date: "2024-06-01".into(),
            time: "06:00 PM".into(),
            guests: 4,
            guest_dishes: Some(vec!["Paneer Tikka".into(), "Dal Makhani".into()]),
            special: "High chair".into(),
            booking_type: BookingType::Table,
            ..Default::default()
        })
        .await
        .unwrap();

    let rows = engine.all_bookings().await.unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.reference, "BK-100");
    assert_eq!(row.employee_id, "E42");
    assert_eq!(row.customer_name, "Asha Rao");
    assert_eq!(row.phone.as_str(), "9876543210");
    assert_eq!(row.email, "asha@example.com");
    assert_eq!(row.table_name, "Table 5 (Window)");
    assert_eq!(row.table_id, "T5");
    assert_eq!(row.date, "2024-06-01");
    assert_eq!(row.time, "06:00 PM");
    assert_eq!(row.guests, 4);
    assert_eq!(row.guest_orders, "Paneer Tikka | Dal Makhani");
    assert_eq!(row.special_requests, "High chair");
    assert_eq!(row.booking_type, BookingType::Table);
}

#[tokio::test]
async fn create_then_list() {
    let engine = engine();
    let r = engine
        .create_booking(payload("R1", "E1", "T5", "2024-06-01", "06:00 PM"))
        .await
        .unwrap();
    assert_eq!(r, "R1");

    let all = engine.all_bookings().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, BookingStatus::Confirmed);
    assert_eq!(all[0].phone.stored(), "'9876543210");
}

#[tokio::test]
async fn table_slot_conflict_within_window() {
    let engine = engine();
    engine
        .create_booking(payload("R1", "E1", "T5", "2024-06-01", "06:00 PM"))
        .await
        .unwrap();

    // 19:00 is 60 minutes after 18:00: inside the 120 minute slot.
    let err = engine
        .create_booking(payload("R2", "E2", "T5", "2024-06-01", "07:00 PM"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(ConflictKind::Table)));
    assert!(err.to_string().starts_with("This table has already been booked"));

    // Exactly one slot apart does not collide.
    engine
        .create_booking(payload("R3", "E3", "T5", "2024-06-01", "08:00 PM"))
        .await
        .unwrap();
    // Other table, same time.
    engine
        .create_booking(payload("R4", "E4", "T6", "2024-06-01", "07:00 PM"))
        .await
        .unwrap();

    assert_eq!(engine.all_bookings().await.unwrap().len(), 3);
}

#[tokio::test]
async fn evening_scenario_on_one_table() {
    let engine = engine();
    let first = engine
        .create_booking(payload("A", "E1", "T5", "2024-06-01", "06:00 PM"))
        .await;
    let second = engine
        .create_booking(payload("B", "E2", "T5", "2024-06-01", "07:30 PM"))
        .await;
    let third = engine
        .create_booking(payload("C", "E3", "T5", "2024-06-01", "09:00 PM"))
        .await;

    assert!(first.is_ok());
    assert!(matches!(second, Err(EngineError::Conflict(ConflictKind::Table))));
    assert!(third.is_ok());
}

#[tokio::test]
async fn table_conflict_across_date_spellings() {
    let engine = engine();
    engine
        .create_booking(payload("R1", "E1", "T5", "2024-06-01T00:00:00.000Z", "18:00"))
        .await
        .unwrap();
    let err = engine
        .create_booking(payload("R2", "E2", "T5", "2024-06-01", "06:30 PM"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(ConflictKind::Table)));
}

#[tokio::test]
async fn employee_double_booking_rejected() {
    let engine = engine();
    engine
        .create_booking(payload("R1", "E7", "T1", "2024-06-01", "06:00 PM"))
        .await
        .unwrap();
    let err = engine
        .create_booking(payload("R2", " e7 ", "T9", "2024-06-01", "06:00 PM"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(ConflictKind::Employee)));
    assert_eq!(err.code(), "conflict");
    assert!(err.is_retryable());

    // Same employee, different literal time is allowed.
    engine
        .create_booking(payload("R3", "E7", "T9", "2024-06-01", "09:00 PM"))
        .await
        .unwrap();
}

#[tokio::test]
async fn food_skips_table_rule_but_not_employee_rule() {
    let engine = engine();
    engine
        .create_booking(payload("R1", "E1", "T5", "2024-06-01", "06:00 PM"))
        .await
        .unwrap();

    let mut food = payload("R2", "E2", "T5", "2024-06-01", "06:00 PM");
    food.booking_type = BookingType::Food;
    engine.create_booking(food).await.unwrap();

    let mut food_same_emp = payload("R3", "E1", "T8", "2024-06-01", "06:00 PM");
    food_same_emp.booking_type = BookingType::Food;
    let err = engine.create_booking(food_same_emp).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(ConflictKind::Employee)));
}

#[tokio::test]
async fn existing_food_booking_blocks_table() {
    let engine = engine();
    let mut food = payload("R1", "E1", "T5", "2024-06-01", "06:00 PM");
    food.booking_type = BookingType::Food;
    engine.create_booking(food).await.unwrap();

    let err = engine
        .create_booking(payload("R2", "E2", "T5", "2024-06-01", "07:00 PM"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(ConflictKind::Table)));
}

#[tokio::test]
async fn cancelled_bookings_free_the_slot() {
    let engine = engine();
    engine
        .create_booking(payload("R1", "E1", "T5", "2024-06-01", "06:00 PM"))
        .await
        .unwrap();
    engine.cancel_booking("R1").await.unwrap();

    engine
        .create_booking(payload("R2", "E1", "T5", "2024-06-01", "06:00 PM"))
        .await
        .unwrap();
}

#[tokio::test]
async fn validation_runs_before_conflicts() {
    let engine = engine();
    let mut p = payload("R1", "E1", "T5", "2024-06-01", "06:00 PM");
    p.emp_no.clear();
    let err = engine.create_booking(p).await.unwrap_err();
    assert_eq!(err.to_string(), "Missing Employee No");
    assert_eq!(err.code(), "validation");

    let err = engine
        .create_booking(payload("R2", "E1", "T5", "2024-06-01", "whenever"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid Time");
    assert!(engine.all_bookings().await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_creates_for_one_slot_admit_exactly_one() {
    let engine = Arc::new(engine());
    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .create_booking(payload(&format!("R{i}"), &format!("E{i}"), "T5", "2024-06-01", "06:00 PM"))
                .await
        }));
    }

    let mut ok = 0;
    let mut conflicts = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => ok += 1,
            Err(EngineError::Conflict(ConflictKind::Table)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(conflicts, 15);
    assert_eq!(engine.all_bookings().await.unwrap().len(), 1);
}

#[tokio::test]
async fn busy_when_lock_held_past_wait() {
    let settings = EngineSettings {
        create_lock_wait: Duration::from_millis(30),
        lock_wait: Duration::from_millis(30),
        ..EngineSettings::default()
    };
    let engine = Engine::in_memory(settings);
    let guard = engine.lock.try_acquire(Duration::from_secs(1)).await.unwrap();

    let err = engine
        .create_booking(payload("R1", "E1", "T5", "2024-06-01", "06:00 PM"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Busy));
    assert_eq!(err.to_string(), "System busy. Please try again in a moment.");
    assert!(matches!(
        engine.delete_booking("R1").await.unwrap_err(),
        EngineError::Busy
    ));

    guard.release();
    engine
        .create_booking(payload("R1", "E1", "T5", "2024-06-01", "06:00 PM"))
        .await
        .unwrap();
}

#[tokio::test]
async fn lock_released_after_failed_mutation() {
    let settings = EngineSettings {
        lock_wait: Duration::from_millis(50),
        ..EngineSettings::default()
    };
    let engine = Engine::in_memory(settings);
    assert!(matches!(
        engine.cancel_booking("missing").await.unwrap_err(),
        EngineError::NotFound(_)
    ));
    // Would be Busy if the failed cancel had leaked its guard.
    assert!(matches!(
        engine.delete_booking("missing").await.unwrap_err(),
        EngineError::NotFound(_)
    ));
}

// ── Status, update, delete ───────────────────────────────

#[tokio::test]
async fn status_change_returns_previous_record() {
    let engine = engine();
    engine
        .create_booking(payload("R1", "E1", "T5", "2024-06-01", "06:00 PM"))
        .await
        .unwrap();

    let change = engine
        .update_status("R1", BookingStatus::Other("Seated".into()))
        .await
        .unwrap();
    assert_eq!(change.reference, "R1");
    assert_eq!(change.booking.status, BookingStatus::Confirmed);
    assert_eq!(change.status.as_str(), "Seated");

    let all = engine.all_bookings().await.unwrap();
    assert_eq!(all[0].status.as_str(), "Seated");
}

#[tokio::test]
async fn status_update_twice_leaves_same_table() {
    let engine = engine();
    engine
        .create_booking(payload("R1", "E1", "T5", "2024-06-01", "06:00 PM"))
        .await
        .unwrap();
    engine
        .create_booking(payload("R2", "E2", "T6", "2024-06-01", "06:00 PM"))
        .await
        .unwrap();

    engine
        .update_status("R1", BookingStatus::Other("Seated".into()))
        .await
        .unwrap();
    let once = engine.all_bookings().await.unwrap();
    let again = engine
        .update_status("R1", BookingStatus::Other("Seated".into()))
        .await
        .unwrap();
    assert_eq!(again.booking.status.as_str(), "Seated");
    assert_eq!(engine.all_bookings().await.unwrap(), once);
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let engine = engine();
    engine
        .create_booking(payload("R1", "E1", "T5", "2024-06-01", "06:00 PM"))
        .await
        .unwrap();
    engine.cancel_booking("R1").await.unwrap();
    let again = engine.cancel_booking("R1").await.unwrap();
    assert!(again.booking.status.is_cancelled());
    assert_eq!(engine.all_bookings().await.unwrap().len(), 1);
}

#[tokio::test]
async fn blank_status_rejected() {
    let engine = engine();
    engine
        .create_booking(payload("R1", "E1", "T5", "2024-06-01", "06:00 PM"))
        .await
        .unwrap();
    let err = engine
        .update_status("R1", BookingStatus::parse("  "))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Missing Status");
}

#[tokio::test]
async fn update_fields_applies_allow_list_only() {
    let engine = engine();
    engine
        .create_booking(payload("R1", "E1", "T5", "2024-06-01", "06:00 PM"))
        .await
        .unwrap();

    let patch = fields(json!({
        "Customer Name": "Ravi",
        "phone": "5551234",
        "Booking Ref": "HIJACK",
        "Colour": "blue",
    }));
    engine.update_fields("R1", &patch).await.unwrap();

    let row = &engine.all_bookings().await.unwrap()[0];
    assert_eq!(row.reference, "R1");
    assert_eq!(row.customer_name, "Ravi");
    assert_eq!(row.phone.stored(), "'5551234");
}

#[tokio::test]
async fn update_fields_rejects_bad_values() {
    let engine = engine();
    engine
        .create_booking(payload("R1", "E1", "T5", "2024-06-01", "06:00 PM"))
        .await
        .unwrap();
    let err = engine
        .update_fields("R1", &fields(json!({ "Guests": "many" })))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "validation");
    assert_eq!(engine.all_bookings().await.unwrap()[0].guests, 2);
}

#[tokio::test]
async fn update_targets_first_row_and_delete_targets_last() {
    let rows = vec![
        payload("DUP", "E1", "T1", "2024-06-01", "06:00 PM").into_record(chrono::Utc::now()),
        payload("DUP", "E2", "T2", "2024-06-01", "06:00 PM").into_record(chrono::Utc::now()),
    ];
    let engine = Engine::new(
        Arc::new(MemoryStore::with_rows(rows)),
        crate::lock::ExclusionCoordinator::new(),
        EngineSettings::default(),
    );

    engine
        .update_fields("DUP", &fields(json!({ "Special Requests": "cake" })))
        .await
        .unwrap();
    engine.delete_booking("DUP").await.unwrap();

    let all = engine.all_bookings().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].employee_id, "E1");
    assert_eq!(all[0].special_requests, "cake");
}

#[tokio::test]
async fn unknown_reference_is_not_found() {
    let engine = engine();
    for err in [
        engine.cancel_booking("nope").await.unwrap_err(),
        engine.delete_booking("nope").await.unwrap_err(),
        engine
            .update_fields("nope", &fields(json!({ "Email": "x@y.z" })))
            .await
            .unwrap_err(),
    ] {
        assert!(matches!(err, EngineError::NotFound(_)));
        assert_eq!(err.to_string(), "Ref not found");
    }
}

// ── Queries ──────────────────────────────────────────────

#[tokio::test]
async fn bookings_on_date_hides_cancelled() {
    let engine = engine();
    engine
        .create_booking(payload("R1", "E1", "T1", "2024-06-01", "06:00 PM"))
        .await
        .unwrap();
    engine
        .create_booking(payload("R2", "E2", "T2", "2024-06-01", "06:00 PM"))
        .await
        .unwrap();
    engine
        .create_booking(payload("R3", "E3", "T3", "2024-06-02", "06:00 PM"))
        .await
        .unwrap();
    engine.cancel_booking("R2").await.unwrap();

    let today = engine.bookings_on("2024-06-01").await.unwrap();
    let refs: Vec<_> = today.iter().map(|b| b.reference.as_str()).collect();
    assert_eq!(refs, vec!["R1"]);
}

#[tokio::test]
async fn active_bookings_follow_the_clock() {
    let engine = engine();
    engine
        .create_booking(payload("R1", "E1", "T1", "2024-06-01", "06:00 PM"))
        .await
        .unwrap();
    engine
        .create_booking(payload("R2", "E2", "T2", "2024-06-01", "09:00 PM"))
        .await
        .unwrap();

    let at_seven = engine.active_bookings("2024-06-01", "19:00").await.unwrap();
    assert_eq!(at_seven.len(), 1);
    assert_eq!(at_seven[0].reference, "R1");

    let at_eight = engine.active_bookings("2024-06-01", "20:00").await.unwrap();
    assert!(at_eight.is_empty());
}

#[tokio::test]
async fn active_bookings_at_extreme_minutes() {
    let engine = engine();
    engine
        .create_booking(payload("R1", "E1", "T1", "2024-06-01", "0:2147483647"))
        .await
        .unwrap();

    let late = engine
        .active_bookings("2024-06-01", "0:2147483647")
        .await
        .unwrap();
    assert_eq!(late.len(), 1);
    assert!(engine.active_bookings("2024-06-01", "0:0").await.unwrap().is_empty());
}

#[tokio::test]
async fn history_matches_phone_or_employee_newest_first() {
    let engine = engine();
    engine
        .create_booking(payload("OLD", "E1", "T1", "2024-05-01", "06:00 PM"))
        .await
        .unwrap();
    engine
        .create_booking(payload("NEW", "E1", "T1", "2024-06-01", "01:00 PM"))
        .await
        .unwrap();
    engine
        .create_booking(payload("LATER", "E1", "T2", "2024-06-01", "09:00 PM"))
        .await
        .unwrap();
    let mut other = payload("OTHER", "E2", "T3", "2024-06-01", "06:00 PM");
    other.phone = "1112223333".into();
    engine.create_booking(other).await.unwrap();

    let by_phone = engine.booking_history("'9876543210").await.unwrap();
    let refs: Vec<_> = by_phone.iter().map(|b| b.reference.as_str()).collect();
    assert_eq!(refs, vec!["LATER", "NEW", "OLD"]);

    let by_emp = engine.booking_history(" e2 ").await.unwrap();
    assert_eq!(by_emp.len(), 1);
    assert_eq!(by_emp[0].reference, "OTHER");

    assert!(engine.booking_history("   ").await.unwrap().is_empty());
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn wal_store_replays_after_reopen() {
    let path = test_wal_path("replay.wal");
    {
        let store = Arc::new(WalStore::open(&path).unwrap());
        let engine = Engine::new(
            store,
            crate::lock::ExclusionCoordinator::new(),
            EngineSettings::default(),
        );
        engine
            .create_booking(payload("R1", "E1", "T1", "2024-06-01", "06:00 PM"))
            .await
            .unwrap();
        engine
            .create_booking(payload("R2", "E2", "T2", "2024-06-01", "06:00 PM"))
            .await
            .unwrap();
        engine.cancel_booking("R1").await.unwrap();
        engine.delete_booking("R2").await.unwrap();
    }

    let store = WalStore::open(&path).unwrap();
    let rows = store.read_all_records().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].reference, "R1");
    assert!(rows[0].status.is_cancelled());
    assert_eq!(rows[0].phone.stored(), "'9876543210");
}

#[tokio::test]
async fn second_store_on_same_log_is_refused() {
    let path = test_wal_path("owned.wal");
    let first = WalStore::open(&path).unwrap();
    first
        .append_record(payload("R1", "E1", "T1", "2024-06-01", "06:00 PM").into_record(chrono::Utc::now()))
        .await
        .unwrap();

    // A second handle would replay once and then miss every later append.
    let err = WalStore::open(&path).err().unwrap();
    assert!(matches!(err, StoreError::AlreadyOwned(_)));

    drop(first);
    let second = WalStore::open(&path).unwrap();
    assert_eq!(second.read_all_records().await.unwrap().len(), 1);
}

#[tokio::test]
async fn wal_store_compaction_keeps_rows() {
    let path = test_wal_path("compact.wal");
    let store = Arc::new(WalStore::open(&path).unwrap());
    let engine = Engine::new(
        store.clone(),
        crate::lock::ExclusionCoordinator::new(),
        EngineSettings::default(),
    );
    for i in 0..5 {
        engine
            .create_booking(payload(&format!("R{i}"), &format!("E{i}"), "T1", &format!("2024-06-0{}", i + 1), "06:00 PM"))
            .await
            .unwrap();
    }
    engine.delete_booking("R0").await.unwrap();
    assert_eq!(store.appends_since_compact().await, 6);

    store.compact().await.unwrap();
    assert_eq!(store.appends_since_compact().await, 0);

    drop(engine);
    drop(store);
    let reopened = WalStore::open(&path).unwrap();
    let refs: Vec<_> = reopened
        .read_all_records()
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.reference)
        .collect();
    assert_eq!(refs, vec!["R1", "R2", "R3", "R4"]);
}
