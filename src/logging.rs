use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "medconsult_api=info,tower_http=info";

/// Installs the fmt subscriber; `RUST_LOG` overrides the default filter.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    // A second init (tests, CLI after server) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
