// ParkinUP - Core Library
// Exposes the controller, store and fee logic to the CLI, the TUI and tests

pub mod clock;
pub mod config;
pub mod controller;
pub mod db;
pub mod error;
pub mod fee;
pub mod logging;
pub mod plate;
pub mod receipt;
pub mod report;

// Re-export commonly used types
pub use clock::{
    format_timestamp, parse_timestamp, Clock, ManualClock, SystemClock, TIMESTAMP_FORMAT,
};
pub use config::Config;
pub use controller::{ParkedDuration, ParkingController};
pub use db::{Event, IntegrityIssue, Occupancy, PaymentRecord, Slot, VehicleSession};
pub use error::{ParkingError, Result};
pub use fee::{compute_fee, format_currency, format_duration, FeeQuote, Rate};
pub use plate::{
    detect_plate_with_timeout, FallbackDetector, FilenamePlateDetector, PlateDetector,
    SimulatedPlateDetector,
};
pub use receipt::Receipt;
pub use report::export_payments_csv;
