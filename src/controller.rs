// 🅿️ Parking Controller - slot assignment, check-in/out, payments
//
// Session lifecycle: Absent → Parked → Exited (terminal).
//
// Each mutation runs inside one IMMEDIATE transaction. Returning early with
// `?` drops the transaction, which rolls it back, so a failure halfway leaves
// the store exactly as it was.

use crate::clock::{format_timestamp, Clock, SystemClock};
use crate::db::{self, Event, IntegrityIssue, Occupancy, PaymentRecord, Slot, VehicleSession};
use crate::error::{is_unique_violation, ParkingError, Result};
use crate::fee::{compute_fee, compute_fee_until_now, elapsed_minutes, FeeQuote, Rate};
use crate::receipt::Receipt;
use chrono::NaiveDateTime;
use rusqlite::{Connection, TransactionBehavior};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const ACTOR: &str = "parking_controller";

/// A parked vehicle with the time it has spent in the lot so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParkedDuration {
    pub session: VehicleSession,
    pub elapsed_minutes: i64,
}

pub struct ParkingController {
    conn: Connection,
    rate: Rate,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ParkingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParkingController")
            .field("rate", &self.rate)
            .finish_non_exhaustive()
    }
}

impl ParkingController {
    /// Wrap an open connection, creating the schema if needed
    pub fn new(conn: Connection, rate: Rate, clock: Arc<dyn Clock>) -> Result<Self> {
        db::setup_database(&conn)?;
        Ok(Self { conn, rate, clock })
    }

    pub fn open<P: AsRef<Path>>(path: P, rate: Rate) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "opened parking database");
        Self::new(conn, rate, Arc::new(SystemClock))
    }

    pub fn open_in_memory(rate: Rate, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::new(Connection::open_in_memory()?, rate, clock)
    }

    pub fn rate(&self) -> &Rate {
        &self.rate
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    // ========================================================================
    // CHECK-IN / CHECK-OUT
    // ========================================================================

    /// Park a vehicle in the lowest-numbered free slot. Returns the slot label.
    pub fn check_in(&mut self, vehicle_number: &str, owner_name: Option<&str>) -> Result<String> {
        let vehicle_number = normalize_vehicle_number(vehicle_number)?;
        let owner_name = owner_name.map(str::trim).filter(|o| !o.is_empty());
        let entry_time = self.clock.now();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        if db::find_active_session(&tx, &vehicle_number)?.is_some() {
            warn!(vehicle = %vehicle_number, "check-in rejected: already parked");
            return Err(ParkingError::DuplicateVehicle(vehicle_number));
        }

        let slot = match db::first_free_slot(&tx)? {
            Some(slot) => slot,
            None => {
                warn!(vehicle = %vehicle_number, "check-in rejected: lot full");
                return Err(ParkingError::LotFull);
            }
        };

        if db::occupy_slot(&tx, slot.slot_id)? != 1 {
            return Err(ParkingError::StoreIntegrityViolation(format!(
                "slot {} was taken while assigning it",
                slot.slot_number
            )));
        }

        let vehicle_id =
            match db::insert_session(&tx, owner_name, &vehicle_number, slot.slot_id, &entry_time) {
                Ok(id) => id,
                Err(e) if is_unique_violation(&e) => {
                    return Err(ParkingError::DuplicateVehicle(vehicle_number));
                }
                Err(e) => return Err(e.into()),
            };

        db::insert_event(
            &tx,
            &Event::new(
                "vehicle_checked_in",
                "vehicle",
                &vehicle_number,
                serde_json::json!({
                    "vehicle_id": vehicle_id,
                    "slot": slot.slot_number,
                    "owner": owner_name,
                    "entry_time": format_timestamp(&entry_time),
                }),
                ACTOR,
                entry_time,
            ),
        )?;

        tx.commit()?;

        info!(
            vehicle = %vehicle_number,
            slot = %slot.slot_number,
            vehicle_id,
            "vehicle checked in"
        );
        Ok(slot.slot_number)
    }

    /// Close the active session, free its slot and record the payment
    pub fn check_out(&mut self, vehicle_number: &str) -> Result<Receipt> {
        let vehicle_number = normalize_vehicle_number(vehicle_number)?;
        let exit_time = self.clock.now();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let session = match db::find_active_session(&tx, &vehicle_number)? {
            Some(session) => session,
            None => {
                warn!(vehicle = %vehicle_number, "check-out rejected: not parked");
                return Err(ParkingError::NotParked(vehicle_number));
            }
        };

        let quote = compute_fee(session.entry_time, exit_time, &self.rate)?;

        if db::close_session(&tx, session.vehicle_id, &exit_time)? != 1 {
            return Err(ParkingError::NotParked(vehicle_number));
        }

        if db::release_slot(&tx, session.slot_id)? != 1 {
            return Err(ParkingError::StoreIntegrityViolation(format!(
                "slot {} held {} but was not marked occupied",
                session.slot_number, vehicle_number
            )));
        }

        let payment_id = db::insert_payment(&tx, session.vehicle_id, quote.amount, &exit_time)?;

        db::insert_event(
            &tx,
            &Event::new(
                "vehicle_checked_out",
                "vehicle",
                &vehicle_number,
                serde_json::json!({
                    "vehicle_id": session.vehicle_id,
                    "payment_id": payment_id,
                    "slot": session.slot_number,
                    "exit_time": format_timestamp(&exit_time),
                    "billed_minutes": quote.billed_minutes,
                    "amount": quote.amount.to_string(),
                }),
                ACTOR,
                exit_time,
            ),
        )?;

        tx.commit()?;

        info!(
            vehicle = %vehicle_number,
            slot = %session.slot_number,
            minutes = quote.billed_minutes,
            amount = %quote.amount,
            "vehicle checked out"
        );

        Ok(Receipt {
            vehicle_id: session.vehicle_id,
            payment_id,
            vehicle_number: session.vehicle_number,
            owner_name: session.owner_name,
            slot_number: session.slot_number,
            entry_time: session.entry_time,
            exit_time,
            billed_minutes: quote.billed_minutes,
            amount: quote.amount,
            rate: self.rate,
        })
    }

    // ========================================================================
    // SLOTS
    // ========================================================================

    /// Ensure Slot-1..Slot-total exist. Never removes slots. Returns the slot count.
    pub fn provision_slots(&mut self, total: u32) -> Result<usize> {
        let now = self.clock.now();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let inserted = db::provision_slots(&tx, total)?;
        let count = db::count_slots(&tx)?;

        if inserted > 0 {
            db::insert_event(
                &tx,
                &Event::new(
                    "slots_provisioned",
                    "lot",
                    "slots",
                    serde_json::json!({
                        "requested": total,
                        "inserted": inserted,
                        "total": count,
                    }),
                    ACTOR,
                    now,
                ),
            )?;
        }

        tx.commit()?;

        if inserted > 0 {
            info!(requested = total, inserted, total_slots = count, "slots provisioned");
        } else {
            debug!(requested = total, total_slots = count, "slots already provisioned");
        }
        Ok(count)
    }

    /// First-run seeding: provision `total` slots only if the lot has none
    pub fn seed_default_slots(&mut self, total: u32) -> Result<usize> {
        let count = db::count_slots(&self.conn)?;
        if count > 0 {
            return Ok(count);
        }
        self.provision_slots(total)
    }

    /// (label, occupied) in numeric label order
    pub fn list_slots(&self) -> Result<Vec<Slot>> {
        Ok(db::list_slots(&self.conn)?)
    }

    pub fn occupancy(&self) -> Result<Occupancy> {
        Ok(db::occupancy(&self.conn)?)
    }

    /// Who is parked in a slot right now
    pub fn slot_occupant(&self, slot_number: &str) -> Result<Option<VehicleSession>> {
        Ok(db::active_session_for_slot(&self.conn, slot_number)?)
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Parked vehicles, most recent check-in first
    pub fn list_active(&self) -> Result<Vec<VehicleSession>> {
        let sessions = db::list_active_sessions(&self.conn)?;
        debug!(count = sessions.len(), "listed active sessions");
        Ok(sessions)
    }

    /// Active sessions with elapsed minutes so far. Read-only; meant to be
    /// polled by the front-end on a timer.
    pub fn parked_durations(&self) -> Result<Vec<ParkedDuration>> {
        let now = self.clock.now();
        Ok(self
            .list_active()?
            .into_iter()
            .map(|session| ParkedDuration {
                elapsed_minutes: elapsed_minutes(session.entry_time, now).max(0),
                session,
            })
            .collect())
    }

    /// What the vehicle would pay if it left now
    pub fn current_fee(&self, vehicle_number: &str) -> Result<FeeQuote> {
        let vehicle_number = normalize_vehicle_number(vehicle_number)?;
        let session = db::find_active_session(&self.conn, &vehicle_number)?
            .ok_or(ParkingError::NotParked(vehicle_number))?;
        compute_fee_until_now(session.entry_time, &self.rate, self.clock.as_ref())
    }

    pub fn vehicle_history(&self) -> Result<Vec<VehicleSession>> {
        Ok(db::list_sessions(&self.conn)?)
    }

    pub fn payments(&self) -> Result<Vec<PaymentRecord>> {
        Ok(db::list_payments(&self.conn)?)
    }

    pub fn revenue_total(&self) -> Result<Decimal> {
        Ok(db::revenue_total(&self.conn)?)
    }

    /// Empty when slot flags agree with active sessions and payments match exits
    pub fn verify_integrity(&self) -> Result<Vec<IntegrityIssue>> {
        let issues = db::find_integrity_issues(&self.conn)?;
        if !issues.is_empty() {
            warn!(count = issues.len(), "store integrity issues found");
        }
        Ok(issues)
    }

    pub fn audit_trail(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
        Ok(db::get_events_for_entity(&self.conn, entity_type, entity_id)?)
    }
}

fn normalize_vehicle_number(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParkingError::InvalidInput(
            "vehicle number must not be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{parse_timestamp, ManualClock};
    use chrono::Duration;

    fn controller_at(start: &str, slots: u32) -> (ParkingController, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at(start).unwrap());
        let mut controller = ParkingController::open_in_memory(Rate::default(), clock.clone()).unwrap();
        controller.provision_slots(slots).unwrap();
        (controller, clock)
    }

    #[test]
    fn test_check_in_assigns_lowest_slot() {
        let (mut ctl, _) = controller_at("2024-01-01 10:00:00", 3);

        assert_eq!(ctl.check_in("AAA111", Some("Ana")).unwrap(), "Slot-1");
        assert_eq!(ctl.check_in("BBB222", None).unwrap(), "Slot-2");

        let slots = ctl.list_slots().unwrap();
        assert!(slots[0].occupied && slots[1].occupied && !slots[2].occupied);
    }

    #[test]
    fn test_lot_full_after_capacity() {
        let (mut ctl, _) = controller_at("2024-01-01 10:00:00", 4);

        for i in 0..4 {
            ctl.check_in(&format!("CAR{}00", i), None).unwrap();
        }

        let err = ctl.check_in("LATE999", None).unwrap_err();
        assert!(matches!(err, ParkingError::LotFull));
        assert_eq!(ctl.list_active().unwrap().len(), 4);
        assert!(ctl.verify_integrity().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_check_in_rejected() {
        let (mut ctl, _) = controller_at("2024-01-01 10:00:00", 3);

        ctl.check_in("ABC123", None).unwrap();
        let err = ctl.check_in("  ABC123 ", None).unwrap_err();

        assert!(matches!(err, ParkingError::DuplicateVehicle(ref v) if v == "ABC123"));
        assert_eq!(ctl.occupancy().unwrap().occupied, 1);
    }

    #[test]
    fn test_active_plate_index_reports_duplicate() {
        let (mut ctl, _) = controller_at("2024-01-01 10:00:00", 2);

        // an active row whose slot no longer exists: the lookup join misses it,
        // so only the partial unique index can stop the second session
        ctl.conn
            .execute_batch(
                "PRAGMA foreign_keys = OFF;
                 INSERT INTO vehicles (vehicle_number, slot_id, entry_time)
                 VALUES ('GHOST1', 999, '2024-01-01 09:00:00');
                 PRAGMA foreign_keys = ON;",
            )
            .unwrap();
        assert!(db::find_active_session(&ctl.conn, "GHOST1").unwrap().is_none());

        let err = ctl.check_in("GHOST1", None).unwrap_err();
        assert!(matches!(err, ParkingError::DuplicateVehicle(ref v) if v == "GHOST1"));

        // slot claim rolled back with the rejected insert
        assert_eq!(ctl.occupancy().unwrap().occupied, 0);
        assert!(ctl.audit_trail("vehicle", "GHOST1").unwrap().is_empty());
    }

    #[test]
    fn test_empty_vehicle_number_rejected() {
        let (mut ctl, _) = controller_at("2024-01-01 10:00:00", 1);
        assert!(matches!(ctl.check_in("   ", None), Err(ParkingError::InvalidInput(_))));
        assert!(matches!(ctl.check_out(""), Err(ParkingError::InvalidInput(_))));
    }

    #[test]
    fn test_check_out_once_then_not_parked() {
        let (mut ctl, clock) = controller_at("2024-01-01 10:00:00", 2);

        ctl.check_in("ABC123", Some("Ana")).unwrap();
        clock.advance(Duration::hours(2));

        let receipt = ctl.check_out("ABC123").unwrap();
        assert_eq!(receipt.slot_number, "Slot-1");
        assert_eq!(receipt.billed_minutes, 120);
        assert_eq!(receipt.amount, Decimal::new(2000, 2));
        assert_eq!(receipt.owner_name.as_deref(), Some("Ana"));
        assert_eq!(format_timestamp(&receipt.entry_time), "2024-01-01 10:00:00");
        assert_eq!(format_timestamp(&receipt.exit_time), "2024-01-01 12:00:00");

        let err = ctl.check_out("ABC123").unwrap_err();
        assert!(matches!(err, ParkingError::NotParked(_)));
    }

    #[test]
    fn test_check_out_frees_slot_and_records_payment() {
        let (mut ctl, clock) = controller_at("2024-01-01 10:00:00", 1);

        ctl.check_in("ABC123", None).unwrap();
        clock.advance(Duration::seconds(10));
        let receipt = ctl.check_out("ABC123").unwrap();

        assert_eq!(receipt.billed_minutes, 1);
        assert_eq!(receipt.amount, Decimal::new(17, 2));

        let slots = ctl.list_slots().unwrap();
        assert!(!slots[0].occupied);
        assert!(ctl.slot_occupant("Slot-1").unwrap().is_none());
        assert!(ctl.list_active().unwrap().is_empty());

        let payments = ctl.payments().unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].payment_id, receipt.payment_id);
        assert_eq!(payments[0].payment_time, receipt.exit_time);
        assert_eq!(payments[0].vehicle_number, "ABC123");

        assert_eq!(ctl.revenue_total().unwrap(), Decimal::new(17, 2));
        assert!(ctl.verify_integrity().unwrap().is_empty());
    }

    #[test]
    fn test_vehicle_can_return_after_exit() {
        let (mut ctl, clock) = controller_at("2024-01-01 10:00:00", 2);

        ctl.check_in("ABC123", None).unwrap();
        clock.advance(Duration::minutes(30));
        ctl.check_out("ABC123").unwrap();
        clock.advance(Duration::minutes(5));
        ctl.check_in("ABC123", None).unwrap();

        let history = ctl.vehicle_history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status(), "Parked");
        assert_eq!(history[1].status(), "Exited");
    }

    #[test]
    fn test_clock_going_backwards_is_invalid_interval() {
        let (mut ctl, clock) = controller_at("2024-01-01 10:00:00", 1);

        ctl.check_in("ABC123", None).unwrap();
        clock.set(parse_timestamp("2024-01-01 09:00:00").unwrap());

        let err = ctl.check_out("ABC123").unwrap_err();
        assert!(matches!(err, ParkingError::InvalidInterval { .. }));

        // nothing changed
        assert_eq!(ctl.list_active().unwrap().len(), 1);
        assert!(ctl.payments().unwrap().is_empty());
        assert!(ctl.list_slots().unwrap()[0].occupied);
    }

    #[test]
    fn test_check_in_rolls_back_on_store_failure() {
        let (mut ctl, _) = controller_at("2024-01-01 10:00:00", 2);
        ctl.conn
            .execute_batch(
                "CREATE TRIGGER reject_boom BEFORE INSERT ON vehicles
                 WHEN NEW.vehicle_number = 'BOOM'
                 BEGIN SELECT RAISE(ABORT, 'rejected by test trigger'); END;",
            )
            .unwrap();

        let err = ctl.check_in("BOOM", None).unwrap_err();
        assert!(matches!(err, ParkingError::StoreIntegrityViolation(_)));

        // slot update was rolled back with the failed insert
        assert_eq!(ctl.occupancy().unwrap().occupied, 0);
        assert!(ctl.audit_trail("vehicle", "BOOM").unwrap().is_empty());
        assert_eq!(ctl.check_in("OK1234", None).unwrap(), "Slot-1");
    }

    #[test]
    fn test_check_out_rolls_back_on_store_failure() {
        let (mut ctl, clock) = controller_at("2024-01-01 10:00:00", 1);
        ctl.check_in("ABC123", None).unwrap();
        clock.advance(Duration::minutes(45));

        ctl.conn
            .execute_batch(
                "CREATE TRIGGER reject_payment BEFORE INSERT ON payments
                 BEGIN SELECT RAISE(ABORT, 'payments offline'); END;",
            )
            .unwrap();

        let err = ctl.check_out("ABC123").unwrap_err();
        assert!(matches!(err, ParkingError::StoreIntegrityViolation(_)));

        let active = ctl.list_active().unwrap();
        assert_eq!(active.len(), 1);
        assert!(active[0].exit_time.is_none());
        assert!(ctl.list_slots().unwrap()[0].occupied);
        assert!(ctl.verify_integrity().unwrap().is_empty());

        ctl.conn.execute_batch("DROP TRIGGER reject_payment;").unwrap();
        let receipt = ctl.check_out("ABC123").unwrap();
        assert_eq!(receipt.billed_minutes, 45);
    }

    #[test]
    fn test_provision_never_shrinks() {
        let (mut ctl, _) = controller_at("2024-01-01 10:00:00", 0);

        assert_eq!(ctl.provision_slots(5).unwrap(), 5);
        assert_eq!(ctl.provision_slots(3).unwrap(), 5);
        assert_eq!(ctl.list_slots().unwrap().len(), 5);

        assert_eq!(ctl.provision_slots(12).unwrap(), 12);
        let labels: Vec<String> = ctl
            .list_slots()
            .unwrap()
            .into_iter()
            .map(|s| s.slot_number)
            .collect();
        assert_eq!(labels[1], "Slot-2");
        assert_eq!(labels[9], "Slot-10");
    }

    #[test]
    fn test_seed_only_when_empty() {
        let (mut ctl, _) = controller_at("2024-01-01 10:00:00", 0);

        assert_eq!(ctl.seed_default_slots(20).unwrap(), 20);
        assert_eq!(ctl.seed_default_slots(50).unwrap(), 20);
    }

    #[test]
    fn test_list_active_most_recent_first() {
        let (mut ctl, clock) = controller_at("2024-01-01 10:00:00", 3);

        ctl.check_in("FIRST1", None).unwrap();
        clock.advance(Duration::minutes(1));
        ctl.check_in("SECOND2", None).unwrap();
        clock.advance(Duration::minutes(1));
        ctl.check_in("THIRD3", None).unwrap();

        let order: Vec<String> = ctl
            .list_active()
            .unwrap()
            .into_iter()
            .map(|s| s.vehicle_number)
            .collect();
        assert_eq!(order, vec!["THIRD3", "SECOND2", "FIRST1"]);
    }

    #[test]
    fn test_parked_durations_and_current_fee_are_reads() {
        let (mut ctl, clock) = controller_at("2024-01-01 10:00:00", 2);

        ctl.check_in("ABC123", None).unwrap();
        clock.advance(Duration::minutes(95));

        let durations = ctl.parked_durations().unwrap();
        assert_eq!(durations.len(), 1);
        assert_eq!(durations[0].elapsed_minutes, 95);

        let quote = ctl.current_fee("ABC123").unwrap();
        assert_eq!(quote.billed_minutes, 95);
        assert!(matches!(ctl.current_fee("NOPE99"), Err(ParkingError::NotParked(_))));

        // still parked, nothing paid
        assert_eq!(ctl.list_active().unwrap().len(), 1);
        assert_eq!(ctl.revenue_total().unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_audit_trail_records_lifecycle() {
        let (mut ctl, clock) = controller_at("2024-01-01 10:00:00", 1);

        ctl.check_in("ABC123", None).unwrap();
        clock.advance(Duration::minutes(3));
        ctl.check_out("ABC123").unwrap();

        let events = ctl.audit_trail("vehicle", "ABC123").unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["vehicle_checked_in", "vehicle_checked_out"]);
        assert_eq!(events[1].data["billed_minutes"], 3);
        assert_eq!(events[1].data["amount"], "0.50");

        // stamped by the injected clock, matching the session times
        assert_eq!(format_timestamp(&events[0].timestamp), "2024-01-01 10:00:00");
        assert_eq!(format_timestamp(&events[1].timestamp), "2024-01-01 10:03:00");

        assert_eq!(ctl.audit_trail("lot", "slots").unwrap().len(), 1);
    }

    #[test]
    fn test_reopen_file_backed_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parking.db");

        {
            let mut ctl = ParkingController::open(&path, Rate::default()).unwrap();
            ctl.provision_slots(3).unwrap();
            ctl.check_in("ABC123", Some("Ana")).unwrap();
        }

        let ctl = ParkingController::open(&path, Rate::default()).unwrap();
        let active = ctl.list_active().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].slot_number, "Slot-1");
        assert_eq!(ctl.occupancy().unwrap().available, 2);
    }
}
