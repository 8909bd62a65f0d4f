// 🗄️ Record Store - slots, vehicle sessions, payments, audit events
//
// Thin query layer over SQLite. Functions take a &Connection so they work the
// same on a plain connection and inside a rusqlite::Transaction (which derefs
// to Connection); the controller decides where the transaction boundary is.

use crate::clock::{format_timestamp, TIMESTAMP_FORMAT};
use crate::fee::round_currency;
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Label prefix for provisioned slots ("Slot-1", "Slot-2", ...)
pub const SLOT_PREFIX: &str = "Slot-";

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub slot_id: i64,
    pub slot_number: String,
    pub occupied: bool,
}

/// One stay of a vehicle in a slot. Active while exit_time is None.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleSession {
    pub vehicle_id: i64,
    pub owner_name: Option<String>,
    pub vehicle_number: String,
    pub slot_id: i64,
    pub slot_number: String,
    pub entry_time: NaiveDateTime,
    pub exit_time: Option<NaiveDateTime>,
}

impl VehicleSession {
    pub fn is_active(&self) -> bool {
        self.exit_time.is_none()
    }

    pub fn status(&self) -> &'static str {
        if self.is_active() {
            "Parked"
        } else {
            "Exited"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub payment_id: i64,
    pub vehicle_id: i64,
    pub vehicle_number: String,
    pub amount: Decimal,
    pub payment_time: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Occupancy {
    pub total: usize,
    pub occupied: usize,
    pub available: usize,
}

/// A row set that breaks one of the store invariants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    /// occupied flag disagrees with the number of active sessions in the slot
    SlotOccupancy {
        slot_number: String,
        occupied: bool,
        active_sessions: i64,
    },
    /// payment whose vehicle is still parked or exited at a different time
    PaymentTime { payment_id: i64, vehicle_id: i64 },
}

/// Event for audit trail: every controller mutation leaves one behind.
/// Stamped with the controller's clock, same format as session times.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: NaiveDateTime,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // WAL for crash recovery (in-memory databases answer "memory")
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.pragma_update(None, "foreign_keys", true)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS slots (
            slot_id INTEGER PRIMARY KEY AUTOINCREMENT,
            slot_number TEXT UNIQUE NOT NULL,
            is_occupied INTEGER NOT NULL DEFAULT 0 CHECK (is_occupied IN (0, 1))
        )",
        [],
    )?;

    // vehicle_number is unique only among active sessions (see index below),
    // so a car can come back after it has exited
    conn.execute(
        "CREATE TABLE IF NOT EXISTS vehicles (
            vehicle_id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_name TEXT,
            vehicle_number TEXT NOT NULL,
            slot_id INTEGER NOT NULL,
            entry_time TEXT NOT NULL,
            exit_time TEXT,
            FOREIGN KEY(slot_id) REFERENCES slots(slot_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments (
            payment_id INTEGER PRIMARY KEY AUTOINCREMENT,
            vehicle_id INTEGER NOT NULL,
            amount REAL NOT NULL CHECK (amount >= 0),
            payment_time TEXT NOT NULL,
            FOREIGN KEY(vehicle_id) REFERENCES vehicles(vehicle_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_vehicles_active_number
         ON vehicles(vehicle_number) WHERE exit_time IS NULL",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_vehicles_slot ON vehicles(slot_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_vehicle ON payments(vehicle_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// SLOTS
// ============================================================================

pub fn slot_label(n: u32) -> String {
    format!("{}{}", SLOT_PREFIX, n)
}

/// Numeric suffix of a slot label: "Slot-10" → 10. None if there is no suffix.
pub fn slot_label_number(label: &str) -> Option<u64> {
    let digits_start = label
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    label[digits_start..].parse().ok()
}

/// Numeric-suffix order ("Slot-2" before "Slot-10"), then slot_id.
/// Labels without a number go last.
pub fn sort_slots(slots: &mut [Slot]) {
    slots.sort_by_key(|slot| {
        let number = slot_label_number(&slot.slot_number);
        (number.is_none(), number, slot.slot_id)
    });
}

fn map_slot(row: &Row<'_>) -> rusqlite::Result<Slot> {
    Ok(Slot {
        slot_id: row.get(0)?,
        slot_number: row.get(1)?,
        occupied: row.get::<_, i64>(2)? != 0,
    })
}

pub fn list_slots(conn: &Connection) -> rusqlite::Result<Vec<Slot>> {
    let mut stmt = conn.prepare("SELECT slot_id, slot_number, is_occupied FROM slots")?;

    let mut slots = stmt
        .query_map([], map_slot)?
        .collect::<Result<Vec<_>, _>>()?;

    sort_slots(&mut slots);
    Ok(slots)
}

/// Free slot with the lowest label number (ties: lowest slot_id)
pub fn first_free_slot(conn: &Connection) -> rusqlite::Result<Option<Slot>> {
    let mut stmt =
        conn.prepare("SELECT slot_id, slot_number, is_occupied FROM slots WHERE is_occupied = 0")?;

    let mut free = stmt
        .query_map([], map_slot)?
        .collect::<Result<Vec<_>, _>>()?;

    sort_slots(&mut free);
    Ok(free.into_iter().next())
}

pub fn count_slots(conn: &Connection) -> rusqlite::Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM slots", [], |row| row.get(0))?;
    Ok(count as usize)
}

pub fn occupancy(conn: &Connection) -> rusqlite::Result<Occupancy> {
    let (total, occupied): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(is_occupied), 0) FROM slots",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let total = total as usize;
    let occupied = occupied as usize;
    Ok(Occupancy {
        total,
        occupied,
        available: total.saturating_sub(occupied),
    })
}

/// Insert Slot-1..Slot-total where missing. Returns how many were inserted.
pub fn provision_slots(conn: &Connection, total: u32) -> rusqlite::Result<usize> {
    let mut stmt =
        conn.prepare("INSERT OR IGNORE INTO slots (slot_number, is_occupied) VALUES (?1, 0)")?;

    let mut inserted = 0;
    for n in 1..=total {
        inserted += stmt.execute([slot_label(n)])?;
    }

    Ok(inserted)
}

/// Flag a free slot as occupied. Returns rows changed (0 if it was taken).
pub fn occupy_slot(conn: &Connection, slot_id: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE slots SET is_occupied = 1 WHERE slot_id = ?1 AND is_occupied = 0",
        [slot_id],
    )
}

/// Flag an occupied slot as free. Returns rows changed (0 if it was free).
pub fn release_slot(conn: &Connection, slot_id: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE slots SET is_occupied = 0 WHERE slot_id = ?1 AND is_occupied = 1",
        [slot_id],
    )
}

// ============================================================================
// VEHICLE SESSIONS
// ============================================================================

const SESSION_SELECT: &str = "SELECT v.vehicle_id, v.owner_name, v.vehicle_number, v.slot_id,
        s.slot_number, v.entry_time, v.exit_time
     FROM vehicles v
     JOIN slots s ON s.slot_id = v.slot_id";

fn parse_column_timestamp(idx: usize, value: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn map_session(row: &Row<'_>) -> rusqlite::Result<VehicleSession> {
    let entry_str: String = row.get(5)?;
    let exit_str: Option<String> = row.get(6)?;

    Ok(VehicleSession {
        vehicle_id: row.get(0)?,
        owner_name: row.get(1)?,
        vehicle_number: row.get(2)?,
        slot_id: row.get(3)?,
        slot_number: row.get(4)?,
        entry_time: parse_column_timestamp(5, &entry_str)?,
        exit_time: exit_str
            .map(|s| parse_column_timestamp(6, &s))
            .transpose()?,
    })
}

pub fn find_active_session(
    conn: &Connection,
    vehicle_number: &str,
) -> rusqlite::Result<Option<VehicleSession>> {
    let sql = format!(
        "{} WHERE v.vehicle_number = ?1 AND v.exit_time IS NULL",
        SESSION_SELECT
    );
    conn.query_row(&sql, [vehicle_number], map_session).optional()
}

pub fn active_session_for_slot(
    conn: &Connection,
    slot_number: &str,
) -> rusqlite::Result<Option<VehicleSession>> {
    let sql = format!(
        "{} WHERE s.slot_number = ?1 AND v.exit_time IS NULL",
        SESSION_SELECT
    );
    conn.query_row(&sql, [slot_number], map_session).optional()
}

/// Active sessions, most recent check-in first
pub fn list_active_sessions(conn: &Connection) -> rusqlite::Result<Vec<VehicleSession>> {
    let sql = format!(
        "{} WHERE v.exit_time IS NULL ORDER BY v.entry_time DESC, v.vehicle_id DESC",
        SESSION_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let sessions = stmt
        .query_map([], map_session)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(sessions)
}

/// Every session ever recorded, newest entry first
pub fn list_sessions(conn: &Connection) -> rusqlite::Result<Vec<VehicleSession>> {
    let sql = format!(
        "{} ORDER BY v.entry_time DESC, v.vehicle_id DESC",
        SESSION_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let sessions = stmt
        .query_map([], map_session)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(sessions)
}

pub fn insert_session(
    conn: &Connection,
    owner_name: Option<&str>,
    vehicle_number: &str,
    slot_id: i64,
    entry_time: &NaiveDateTime,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO vehicles (owner_name, vehicle_number, slot_id, entry_time)
         VALUES (?1, ?2, ?3, ?4)",
        params![owner_name, vehicle_number, slot_id, format_timestamp(entry_time)],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Set exit_time on an active session. Returns rows changed (0 if already closed).
pub fn close_session(
    conn: &Connection,
    vehicle_id: i64,
    exit_time: &NaiveDateTime,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE vehicles SET exit_time = ?1 WHERE vehicle_id = ?2 AND exit_time IS NULL",
        params![format_timestamp(exit_time), vehicle_id],
    )
}

// ============================================================================
// PAYMENTS
// ============================================================================

fn amount_from_column(idx: usize, value: f64) -> rusqlite::Result<Decimal> {
    Decimal::from_f64(value)
        .map(round_currency)
        .ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                Type::Real,
                format!("amount {} is not a valid currency value", value).into(),
            )
        })
}

pub fn insert_payment(
    conn: &Connection,
    vehicle_id: i64,
    amount: Decimal,
    payment_time: &NaiveDateTime,
) -> rusqlite::Result<i64> {
    let amount = round_currency(amount).to_f64().ok_or_else(|| {
        rusqlite::Error::ToSqlConversionFailure(
            format!("amount {} does not fit in REAL", amount).into(),
        )
    })?;

    conn.execute(
        "INSERT INTO payments (vehicle_id, amount, payment_time) VALUES (?1, ?2, ?3)",
        params![vehicle_id, amount, format_timestamp(payment_time)],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Payment ledger, newest first
pub fn list_payments(conn: &Connection) -> rusqlite::Result<Vec<PaymentRecord>> {
    let mut stmt = conn.prepare(
        "SELECT p.payment_id, p.vehicle_id, v.vehicle_number, p.amount, p.payment_time
         FROM payments p
         JOIN vehicles v ON v.vehicle_id = p.vehicle_id
         ORDER BY p.payment_time DESC, p.payment_id DESC",
    )?;

    let payments = stmt
        .query_map([], |row| {
            let time_str: String = row.get(4)?;
            Ok(PaymentRecord {
                payment_id: row.get(0)?,
                vehicle_id: row.get(1)?,
                vehicle_number: row.get(2)?,
                amount: amount_from_column(3, row.get(3)?)?,
                payment_time: parse_column_timestamp(4, &time_str)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(payments)
}

/// Sum of all payments, added up in decimal (zero when there are none)
pub fn revenue_total(conn: &Connection) -> rusqlite::Result<Decimal> {
    let mut stmt = conn.prepare("SELECT amount FROM payments")?;
    let amounts = stmt
        .query_map([], |row| amount_from_column(0, row.get(0)?))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(amounts.into_iter().sum())
}

// ============================================================================
// INTEGRITY
// ============================================================================

pub fn find_integrity_issues(conn: &Connection) -> rusqlite::Result<Vec<IntegrityIssue>> {
    let mut issues = Vec::new();

    let mut stmt = conn.prepare(
        "SELECT s.slot_number, s.is_occupied, COUNT(v.vehicle_id)
         FROM slots s
         LEFT JOIN vehicles v ON v.slot_id = s.slot_id AND v.exit_time IS NULL
         GROUP BY s.slot_id
         HAVING (s.is_occupied = 1 AND COUNT(v.vehicle_id) != 1)
             OR (s.is_occupied = 0 AND COUNT(v.vehicle_id) != 0)",
    )?;
    let slot_issues = stmt
        .query_map([], |row| {
            Ok(IntegrityIssue::SlotOccupancy {
                slot_number: row.get(0)?,
                occupied: row.get::<_, i64>(1)? != 0,
                active_sessions: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    issues.extend(slot_issues);

    let mut stmt = conn.prepare(
        "SELECT p.payment_id, p.vehicle_id
         FROM payments p
         JOIN vehicles v ON v.vehicle_id = p.vehicle_id
         WHERE v.exit_time IS NULL OR v.exit_time != p.payment_time",
    )?;
    let payment_issues = stmt
        .query_map([], |row| {
            Ok(IntegrityIssue::PaymentTime {
                payment_id: row.get(0)?,
                vehicle_id: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    issues.extend(payment_issues);

    Ok(issues)
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> rusqlite::Result<()> {
    let data_json = serde_json::to_string(&event.data)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            format_timestamp(&event.timestamp),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, oldest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> rusqlite::Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id ASC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_column_timestamp(1, &timestamp_str)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}
