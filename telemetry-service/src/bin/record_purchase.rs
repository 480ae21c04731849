use anyhow::Result;
use clap::Parser;
use meter_client::PurchaseRequest;
use telemetry_service::{backend::{HttpBackend, StatsBackend}, config::AppConfig, observability};
use time::OffsetDateTime;

/// Record a completed electricity purchase with the billing backend.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Amount paid, in currency units.
    #[arg(long)]
    amount: f64,

    /// Payment provider transaction reference.
    #[arg(long)]
    reference: String,

    /// Customer email; defaults to `billing.email` from the config.
    #[arg(long)]
    email: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();
    let args = Args::parse();

    let cfg = AppConfig::load()?;
    let backend = HttpBackend::new(&cfg.backend.base_url, cfg.request_timeout())?;

    let email = args.email.unwrap_or_else(|| cfg.billing.email.clone());
    let purchase = PurchaseRequest::from_amount(
        args.amount,
        cfg.billing.tariff,
        email,
        args.reference,
        OffsetDateTime::now_utc(),
    )?;
    backend.record_purchase(&purchase).await?;

    tracing::info!(
        id = purchase.id,
        date = %purchase.date,
        units = purchase.units,
        amount = purchase.amount,
        tariff = purchase.tariff,
        "purchase saved"
    );
    Ok(())
}
