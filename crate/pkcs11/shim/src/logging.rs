use std::sync::Once;

use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

static TRACING_INIT: Once = Once::new();

/// Install a stderr subscriber once per process.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` is used (`info` when `None`).
pub fn log_init(default_directive: Option<&str>) {
    TRACING_INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive.unwrap_or("info")));
        if let Err(e) = Registry::default()
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(env_filter)
            .try_init()
        {
            eprintln!("Failed to initialize logging: {e}");
        }
    });
}
