//! iap-sentry server binary.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    iap_sentry::server::run().await
}
