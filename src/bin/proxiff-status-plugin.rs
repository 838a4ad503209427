//! Example comparator plugin: only status codes are compared.
//!
//! Not meant to be run by hand; start it through
//! `proxiff start --plugin path/to/proxiff-status-plugin`.

use proxiff::comparator::StatusOnlyComparator;

#[tokio::main]
async fn main() {
    // stdout carries the handshake, so logs go to stderr where the host collects them.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "proxiff=info".into()),
        )
        .init();

    if let Err(e) = proxiff::plugin::serve(StatusOnlyComparator).await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
