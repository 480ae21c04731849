pub mod alerts;
pub mod api;
pub mod backend;
pub mod config;
pub mod export;
pub mod metrics_server;
pub mod observability;
pub mod profile;
pub mod realtime;
pub mod reconciler;

pub use reconciler::{DashboardError, Reconciler, ReconcilerSettings};
