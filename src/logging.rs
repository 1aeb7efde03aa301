use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "cryptodesk=info,tower_http=info";

/// Install the global tracing subscriber
///
/// `RUST_LOG` overrides the default filter and `CRYPTODESK_LOG_FORMAT=json`
/// switches to JSON lines.
pub fn init() {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let json = std::env::var("CRYPTODESK_LOG_FORMAT")
        .map(|value| value.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // A subscriber may already be installed (tests)
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
