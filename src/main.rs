use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use tgforward::config::Config;
use tgforward::forwarder::Forwarder;
use tgforward::platform::telegram::TelegramTransport;
use tgforward::report;

#[tokio::main]
async fn main() -> Result<()> {
    tgforward::init_logging();

    // Usage: tgforward [config.toml] [--dry-run]
    let mut config_path: Option<PathBuf> = None;
    let mut dry_run = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--dry-run" | "-n" => dry_run = true,
            _ => config_path = Some(PathBuf::from(arg)),
        }
    }

    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration is incomplete; refusing to run")?;

    info!("Configuration:");
    info!("  Source Chat: {}", config.forward.source_chat);
    info!("  Recipients: {:?}", config.forward.recipients);
    info!("  Window: {}", config.forward.window);
    info!("  Cursor file: {}", config.forward.cursor_file.display());
    info!("  Fan-out: {:?}", config.forward.fanout);
    if dry_run {
        info!("  Dry run: nothing will be sent");
    }

    let transport = TelegramTransport::new(&config.telegram.session);
    let cursor = config.cursor_store();
    let settings = config.forward_settings(dry_run);

    let run = Forwarder::new(&transport, &cursor, &settings).run().await;
    let report = run.context("Forwarding run aborted")?;

    print!("{}", report::render(&report));
    info!("Done!");

    Ok(())
}
