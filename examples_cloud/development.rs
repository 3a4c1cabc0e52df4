use tracing::{debug, warn};

use cloud_logging_tracing::init::init_logging;
use cloud_logging_tracing::{development_config, Encoding};

fn main() {
    let mut config = development_config();
    config.encoding = Encoding::Console;
    config.initial_fields.insert("service".to_string(), "inventory".into());

    if let Err(e) = init_logging(&config) {
        eprintln!("failed to initialize logging: {}", e);
        return;
    }

    debug!(sku = "A-100", "cache miss");
    warn!(remaining = 3, "stock running low");
}
