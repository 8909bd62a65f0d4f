// 📊 Payment export - ledger to CSV

use crate::clock::format_timestamp;
use crate::db::PaymentRecord;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct PaymentRow<'a> {
    #[serde(rename = "Payment_ID")]
    payment_id: i64,

    #[serde(rename = "Vehicle_Number")]
    vehicle_number: &'a str,

    #[serde(rename = "Amount")]
    amount: String,

    #[serde(rename = "Payment_Time")]
    payment_time: String,
}

impl<'a> From<&'a PaymentRecord> for PaymentRow<'a> {
    fn from(p: &'a PaymentRecord) -> Self {
        Self {
            payment_id: p.payment_id,
            vehicle_number: &p.vehicle_number,
            amount: format!("{:.2}", p.amount),
            payment_time: format_timestamp(&p.payment_time),
        }
    }
}

/// Write payments to `path`; returns the number of rows written
pub fn export_payments_csv(path: &Path, payments: &[PaymentRecord]) -> Result<usize> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file: {:?}", path))?;

    for payment in payments {
        wtr.serialize(PaymentRow::from(payment))
            .context("Failed to write payment row")?;
    }

    wtr.flush().context("Failed to flush CSV file")?;
    Ok(payments.len())
}
