use stash_server::{Settings, run, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init()?;
    let settings = Settings::load()?;
    tracing::debug!(?settings, "settings loaded");
    run(settings).await
}
