use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "warn,telemetry_service=info,record_purchase=info,billing_export=info";

/// Install the global fmt subscriber. `RUST_LOG`, when set and valid, replaces
/// the default directives entirely.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
