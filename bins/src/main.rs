use env::Env;
use eyre::Context as _;
use ledger::{Ledger, LedgerConfig};
use log::info;
use storage::Storage;

mod demo;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let env = Env::load().context("Failed to load configuration")?;
    pretty_env_logger::formatted_builder()
        .parse_filters(env.rust_log())
        .init();
    color_eyre::install()?;
    if let Some(err) = env.dotenv_error() {
        info!("No .env file loaded: {}", err);
    }

    let config = LedgerConfig {
        transfer_expiry_days: env.transfer_expiry_days(),
        max_template_weeks: env.max_template_weeks(),
        default_currency: env.default_currency().to_string(),
        payment_provider: env.payment_provider().to_string(),
    };
    info!("creating ledger");
    let ledger = Ledger::new(Storage::new(), config);

    if !env.seed_demo() {
        info!("SEED_DEMO is off, nothing to do");
        return Ok(());
    }
    let studio = demo::seed(&ledger).await.context("Failed to seed demo data")?;
    demo::run_scenario(&ledger, &studio)
        .await
        .context("Demo scenario failed")?;
    Ok(())
}
