// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{anyhow, Context, Result};
use chrono::Duration;
use parkinup::{
    detect_plate_with_timeout, export_payments_csv, format_currency, format_duration,
    format_timestamp, logging, Clock, Config, FallbackDetector, ManualClock, ParkingController,
    PlateDetector, SystemClock,
};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

const USAGE: &str = "\
ParkinUP - parking lot manager

Usage:
  parkinup [ui]                     Terminal dashboard (default)
  parkinup checkin <plate> [owner]  Park a vehicle
  parkinup checkout <plate>         Process an exit and print the receipt
  parkinup active                   Currently parked vehicles
  parkinup slots                    Slot status
  parkinup history                  All vehicle sessions
  parkinup payments                 Payment ledger and total revenue
  parkinup revenue                  Total revenue
  parkinup provision <total>        Ensure Slot-1..Slot-<total> exist
  parkinup detect [image] [--park]  Read a plate from an image file name
                                    (no image: simulated plate)
  parkinup export <file.csv>        Export payments to CSV
  parkinup integrity                Check slot/session consistency
  parkinup demo                     Print a sample receipt (2 hour stay)
";

fn main() {
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("ui");

    if let Err(e) = run(command, &args[args.len().min(2)..]) {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}

fn run(command: &str, rest: &[String]) -> Result<()> {
    if matches!(command, "help" | "--help" | "-h") {
        print!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load()?;

    // log lines would tear the terminal UI, keep it quiet unless RUST_LOG asks
    let level = if command == "ui" { "warn" } else { config.log_level.as_str() };
    logging::init_logging(level)?;

    match command {
        "ui" => run_ui_mode(&config),
        "checkin" => run_check_in(&config, rest),
        "checkout" => run_check_out(&config, rest),
        "active" => run_active(&config),
        "slots" => run_slots(&config),
        "history" => run_history(&config),
        "payments" => run_payments(&config),
        "revenue" => run_revenue(&config),
        "provision" => run_provision(&config, rest),
        "detect" => run_detect(&config, rest),
        "export" => run_export(&config, rest),
        "integrity" => run_integrity(&config),
        "demo" => run_demo(&config),
        other => Err(anyhow!("unknown command {:?}\n\n{}", other, USAGE)),
    }
}

fn open_controller(config: &Config) -> Result<ParkingController> {
    let mut controller = ParkingController::open(&config.database_path, config.rate()?)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;
    controller.seed_default_slots(config.default_slots)?;
    Ok(controller)
}

/// File-name heuristic, with a simulated plate when there is nothing to read
fn plate_detector() -> Arc<dyn PlateDetector> {
    Arc::new(FallbackDetector::filename_or_simulated(Arc::new(SystemClock)))
}

fn required_arg<'a>(rest: &'a [String], name: &str) -> Result<&'a str> {
    rest.first()
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing <{}>\n\n{}", name, USAGE))
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_check_in(config: &Config, rest: &[String]) -> Result<()> {
    let plate = required_arg(rest, "plate")?;
    let owner = rest[1..].join(" ");
    let owner = if owner.trim().is_empty() { None } else { Some(owner.as_str()) };

    let mut controller = open_controller(config)?;
    let slot = controller.check_in(plate, owner)?;
    println!("✓ Vehicle {} parked in {}", plate.trim(), slot);
    Ok(())
}

fn run_check_out(config: &Config, rest: &[String]) -> Result<()> {
    let plate = required_arg(rest, "plate")?;

    let mut controller = open_controller(config)?;
    let receipt = controller.check_out(plate)?;
    println!("{}", receipt.render(&config.currency_symbol));
    Ok(())
}

fn run_active(config: &Config) -> Result<()> {
    let controller = open_controller(config)?;
    let parked = controller.parked_durations()?;

    if parked.is_empty() {
        println!("No vehicles currently parked");
        return Ok(());
    }

    println!("{:<14} {:<10} {:<20} {:<20} {}", "Vehicle", "Slot", "Owner", "Entry", "Duration");
    for p in parked {
        println!(
            "{:<14} {:<10} {:<20} {:<20} {}",
            p.session.vehicle_number,
            p.session.slot_number,
            p.session.owner_name.as_deref().unwrap_or("-"),
            format_timestamp(&p.session.entry_time),
            format_duration(p.elapsed_minutes),
        );
    }
    Ok(())
}

fn run_slots(config: &Config) -> Result<()> {
    let controller = open_controller(config)?;

    for slot in controller.list_slots()? {
        let status = if slot.occupied { "Occupied" } else { "Available" };
        println!("{:<10} {}", slot.slot_number, status);
    }

    let occupancy = controller.occupancy()?;
    println!(
        "\nTotal Slots: {} | Occupied: {} | Available: {}",
        occupancy.total, occupancy.occupied, occupancy.available
    );
    Ok(())
}

fn run_history(config: &Config) -> Result<()> {
    let controller = open_controller(config)?;

    println!("{:<20} {:<14} {:<20} {:<20} {}", "Owner", "Vehicle", "Entry", "Exit", "Status");
    for session in controller.vehicle_history()? {
        println!(
            "{:<20} {:<14} {:<20} {:<20} {}",
            session.owner_name.as_deref().unwrap_or("-"),
            session.vehicle_number,
            format_timestamp(&session.entry_time),
            session
                .exit_time
                .map(|t| format_timestamp(&t))
                .unwrap_or_else(|| "-".to_string()),
            session.status(),
        );
    }
    Ok(())
}

fn run_payments(config: &Config) -> Result<()> {
    let controller = open_controller(config)?;

    println!("{:<14} {:>12} {}", "Vehicle", "Amount", "Time");
    for payment in controller.payments()? {
        println!(
            "{:<14} {:>12} {}",
            payment.vehicle_number,
            format_currency(payment.amount, &config.currency_symbol),
            format_timestamp(&payment.payment_time),
        );
    }

    let total = controller.revenue_total()?;
    println!("\nTotal Revenue: {}", format_currency(total, &config.currency_symbol));
    Ok(())
}

fn run_revenue(config: &Config) -> Result<()> {
    let controller = open_controller(config)?;
    let total = controller.revenue_total()?;
    println!("{}", format_currency(total, &config.currency_symbol));
    Ok(())
}

fn run_provision(config: &Config, rest: &[String]) -> Result<()> {
    let raw = required_arg(rest, "total")?;
    let total: u32 = raw
        .trim()
        .parse()
        .with_context(|| format!("total must be a positive number, got {:?}", raw))?;
    if total == 0 {
        return Err(anyhow!("total must be a positive number, got 0"));
    }

    let mut controller = open_controller(config)?;
    let count = controller.provision_slots(total)?;
    println!("✓ Slots updated! Total slots: {}", count);
    Ok(())
}

/// `[image] [--park]` in either order; no image means an empty path
fn detect_args(rest: &[String]) -> (PathBuf, bool) {
    let park = rest.iter().any(|a| a == "--park");
    let image = rest
        .iter()
        .find(|a| a.as_str() != "--park")
        .map(PathBuf::from)
        .unwrap_or_default();
    (image, park)
}

fn run_detect(config: &Config, rest: &[String]) -> Result<()> {
    let (image, park) = detect_args(rest);

    let plate = detect_plate_with_timeout(plate_detector(), image.clone(), config.ocr_timeout());

    match plate {
        Some(plate) => {
            println!("✓ Detected Plate: {}", plate);
            if park {
                let mut controller = open_controller(config)?;
                let slot = controller.check_in(&plate, None)?;
                println!("✓ Vehicle {} parked in {}", plate, slot);
            }
        }
        None => {
            println!("Plate not detected in {:?}; enter it manually with `parkinup checkin`", image);
        }
    }
    Ok(())
}

fn run_export(config: &Config, rest: &[String]) -> Result<()> {
    let path = PathBuf::from(required_arg(rest, "file.csv")?);

    let controller = open_controller(config)?;
    let payments = controller.payments()?;
    let written = export_payments_csv(&path, &payments)?;
    println!("✓ Exported {} payments to {:?}", written, path);
    Ok(())
}

fn run_integrity(config: &Config) -> Result<()> {
    let controller = open_controller(config)?;
    let issues = controller.verify_integrity()?;

    if issues.is_empty() {
        println!("✓ Slots and sessions are consistent");
        return Ok(());
    }

    for issue in &issues {
        println!("✗ {:?}", issue);
    }
    Err(anyhow!("{} integrity issue(s) found", issues.len()))
}

/// Sample receipt for a vehicle parked two hours ago, on a throwaway store
fn run_demo(config: &Config) -> Result<()> {
    let now = SystemClock.now();
    let clock = Arc::new(ManualClock::new(now - Duration::hours(2)));

    let mut controller = ParkingController::open_in_memory(config.rate()?, clock.clone())?;
    controller.provision_slots(1)?;
    controller.check_in("PUP-12345", Some("Test User"))?;

    clock.set(now);
    let receipt = controller.check_out("PUP-12345")?;
    println!("{}", receipt.render(&config.currency_symbol));
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &Config) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the subcommands: parkinup help");
    std::process::exit(1);
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &Config) -> Result<()> {
    let controller = open_controller(config)?;
    let mut app = ui::App::new(controller, plate_detector(), config.clone())?;
    ui::run_ui(&mut app)?;

    println!("✅ ParkinUP closed");
    Ok(())
}
