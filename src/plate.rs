// 📷 Plate Detection - pluggable source for a vehicle number
//
// Detection only prefills the check-in form. A detector that fails, panics or
// runs past its timeout yields None; it never reaches the controller as an
// error.

use crate::clock::Clock;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Shortest plate accepted from a filename token (alphanumerics only)
const MIN_PLATE_LEN: usize = 4;

pub trait PlateDetector: Send + Sync {
    /// Plate found in the image, or None
    fn detect_plate(&self, image: &Path) -> Option<String>;
}

// ============================================================================
// FILENAME HEURISTIC
// ============================================================================

/// Reads the plate from the file name: `plate_PUP-12345.jpg` → `PUP12345`
#[derive(Debug, Default, Clone, Copy)]
pub struct FilenamePlateDetector;

impl FilenamePlateDetector {
    pub fn plate_from_name(name: &str) -> Option<String> {
        let upper = name.to_uppercase();

        upper
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
            .map(|token| token.replace('-', ""))
            .find(|token| {
                token.len() >= MIN_PLATE_LEN && token.chars().any(|c| c.is_ascii_digit())
            })
    }
}

impl PlateDetector for FilenamePlateDetector {
    fn detect_plate(&self, image: &Path) -> Option<String> {
        let stem = image.file_stem()?.to_str()?;
        Self::plate_from_name(stem)
    }
}

// ============================================================================
// SIMULATION / FALLBACK
// ============================================================================

/// Always "detects" SIM<HHMMSS> from the clock; useful for demos
pub struct SimulatedPlateDetector {
    clock: Arc<dyn Clock>,
}

impl SimulatedPlateDetector {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl PlateDetector for SimulatedPlateDetector {
    fn detect_plate(&self, _image: &Path) -> Option<String> {
        Some(format!("SIM{}", self.clock.now().format("%H%M%S")))
    }
}

/// Try `primary`, then `fallback`
pub struct FallbackDetector {
    primary: Box<dyn PlateDetector>,
    fallback: Box<dyn PlateDetector>,
}

impl FallbackDetector {
    pub fn new(primary: Box<dyn PlateDetector>, fallback: Box<dyn PlateDetector>) -> Self {
        Self { primary, fallback }
    }

    /// File-name heuristic first, simulated plate when there is nothing to read
    pub fn filename_or_simulated(clock: Arc<dyn Clock>) -> Self {
        Self::new(
            Box::new(FilenamePlateDetector),
            Box::new(SimulatedPlateDetector::new(clock)),
        )
    }
}

impl PlateDetector for FallbackDetector {
    fn detect_plate(&self, image: &Path) -> Option<String> {
        self.primary
            .detect_plate(image)
            .or_else(|| self.fallback.detect_plate(image))
    }
}

// ============================================================================
// TIMEOUT WRAPPER
// ============================================================================

/// Run detection on a worker thread; give up after `timeout`
pub fn detect_plate_with_timeout(
    detector: Arc<dyn PlateDetector>,
    image: PathBuf,
    timeout: Duration,
) -> Option<String> {
    let (tx, rx) = mpsc::channel();
    let worker_image = image.clone();

    let spawned = thread::Builder::new()
        .name("plate-detector".to_string())
        .spawn(move || {
            let plate = detector.detect_plate(&worker_image);
            // receiver may be gone after a timeout
            let _ = tx.send(plate);
        });

    if let Err(e) = spawned {
        warn!(error = %e, "could not start plate detector");
        return None;
    }

    match rx.recv_timeout(timeout) {
        Ok(Some(plate)) => {
            let plate = plate.trim().to_string();
            debug!(image = %image.display(), plate = %plate, "plate detected");
            if plate.is_empty() {
                None
            } else {
                Some(plate)
            }
        }
        Ok(None) => {
            debug!(image = %image.display(), "no plate detected");
            None
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            warn!(image = %image.display(), ?timeout, "plate detection timed out");
            None
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            warn!(image = %image.display(), "plate detector stopped without an answer");
            None
        }
    }
}
