use anyhow::Context;

use passport_infra::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    passport_observability::init(&settings.log);

    // An unset PASSPORT__TOKENS__SECRET fails validation here.
    let passport = passport_app::bootstrap(&settings).context("building services")?;
    let report = passport_app::run_scenario(&passport).await?;

    tracing::info!(steps = report.steps, events = report.events, "done");
    Ok(())
}
