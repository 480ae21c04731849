use std::{fs::File, io, path::PathBuf};

use anyhow::Result;
use clap::Parser;
use meter_client::history::{self, RangeFilter};
use telemetry_service::{
    backend::{HttpBackend, StatsBackend},
    config::AppConfig,
    export, observability,
};
use time::OffsetDateTime;

/// Export the billing history as CSV.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// day, week, month, year or all.
    #[arg(long, default_value = "month")]
    range: RangeFilter,

    /// Keep bills whose date or status contains this text.
    #[arg(long, default_value = "")]
    search: String,

    /// Output file; stdout when omitted.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();
    let args = Args::parse();

    let cfg = AppConfig::load()?;
    let backend = HttpBackend::new(&cfg.backend.base_url, cfg.request_timeout())?;

    let bills = backend.fetch_billing_history().await?;
    let now = OffsetDateTime::now_utc();
    let selected = history::search(&history::filter_bills(&bills, args.range, now), &args.search);

    match &args.output {
        Some(path) => export::write_billing_csv(File::create(path)?, &selected)?,
        None => export::write_billing_csv(io::stdout().lock(), &selected)?,
    }

    tracing::info!(
        total = bills.len(),
        exported = selected.len(),
        range = ?args.range,
        "billing history exported"
    );
    Ok(())
}
