use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "GUESTMEMO_LOG";

const DEFAULT_DIRECTIVES: &str = "warn";

static INIT: Once = Once::new();

/// Installs the global fmt subscriber. Later calls are no-ops, and a
/// subscriber installed elsewhere first is left in place.
pub fn init_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    });
}
