use std::io::Write;

use meter_client::{format::PLACEHOLDER, BillRecord};

const HEADER: [&str; 6] = ["date", "units", "tariff", "amount", "status", "reference"];

fn number(v: Option<f64>) -> String {
    v.filter(|n| n.is_finite()).unwrap_or(0.0).to_string()
}

fn text(v: &Option<String>) -> &str {
    v.as_deref().unwrap_or(PLACEHOLDER)
}

/// Write bills as CSV. Missing numbers are written as `0`, missing text as the placeholder.
pub fn write_billing_csv<W: Write>(writer: W, bills: &[BillRecord]) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(HEADER)?;
    for bill in bills {
        let (units, tariff, amount) = (number(bill.units), number(bill.tariff), number(bill.amount));
        wtr.write_record([
            text(&bill.date),
            units.as_str(),
            tariff.as_str(),
            amount.as_str(),
            text(&bill.status),
            text(&bill.reference),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
