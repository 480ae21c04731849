pub mod domain;
pub mod format;
pub mod history;

pub use domain::{BillRecord, BillingSnapshot, ChartPoint, Profile, PurchaseRequest, TelemetrySnapshot};
