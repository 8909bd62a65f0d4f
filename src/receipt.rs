// 🧾 Receipt - read-only summary of a completed check-out

use crate::clock::format_timestamp;
use crate::fee::{format_currency, format_duration, Rate};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;

const RECEIPT_WIDTH: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub vehicle_id: i64,
    pub payment_id: i64,
    pub vehicle_number: String,
    pub owner_name: Option<String>,
    pub slot_number: String,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub billed_minutes: i64,
    pub amount: Decimal,
    pub rate: Rate,
}

impl Receipt {
    /// TXN-<exit YYYYMMDDHHMMSS>-<vehicle_id>
    pub fn transaction_id(&self) -> String {
        format!(
            "TXN-{}-{}",
            self.exit_time.format("%Y%m%d%H%M%S"),
            self.vehicle_id
        )
    }

    pub fn duration_text(&self) -> String {
        format_duration(self.billed_minutes)
    }

    /// Label/value rows in display order
    pub fn lines(&self, currency_symbol: &str) -> Vec<(&'static str, String)> {
        let mut lines = vec![("Plate Number:", self.vehicle_number.clone())];
        if let Some(owner) = &self.owner_name {
            lines.push(("Owner:", owner.clone()));
        }
        lines.push(("Slot:", self.slot_number.clone()));
        lines.push(("Time-In:", format_timestamp(&self.entry_time)));
        lines.push(("Time-Out:", format_timestamp(&self.exit_time)));
        lines.push(("Duration:", self.duration_text()));
        lines.push((
            "Rate:",
            format!("{}/hour", format_currency(self.rate.hourly(), currency_symbol)),
        ));
        lines
    }

    pub fn render(&self, currency_symbol: &str) -> String {
        let rule = "-".repeat(RECEIPT_WIDTH);
        let mut out = String::new();

        out.push_str(&center("ParkinUP"));
        out.push_str(&center("Automated Parking System"));
        out.push_str(&rule);
        out.push('\n');

        for (label, value) in self.lines(currency_symbol) {
            out.push_str(&spread(label, &value));
        }

        out.push_str(&rule);
        out.push('\n');
        out.push_str(&spread(
            "TOTAL FEE:",
            &format_currency(self.amount, currency_symbol),
        ));
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&center("Thank you for parking with us!"));
        out.push_str(&center(&format!("Transaction ID: {}", self.transaction_id())));
        out
    }
}

fn center(text: &str) -> String {
    format!("{:^width$}\n", text, width = RECEIPT_WIDTH)
}

fn spread(label: &str, value: &str) -> String {
    let used = label.chars().count() + value.chars().count();
    let gap = RECEIPT_WIDTH.saturating_sub(used).max(1);
    format!("{}{}{}\n", label, " ".repeat(gap), value)
}
