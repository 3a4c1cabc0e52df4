use tracing::{error, info, info_span};

use cloud_logging_tracing::init::init_production;

fn main() {
    if let Err(e) = init_production() {
        eprintln!("failed to initialize logging: {}", e);
        return;
    }

    info!("starting service");

    let span = info_span!("request", request_id = "req-7f3a");
    let _guard = span.enter();
    info!(user_id = 42, "authenticated");
    error!(reason = "card declined", "payment failed");
}
