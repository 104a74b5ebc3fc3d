//! Look up chats and users by id or `@username`.
//!
//! Useful for finding the numeric ids to put in `forward.recipients`. Never
//! touches the cursor or the update queue.

use anyhow::{Context, Result};
use tracing::error;

use tgforward::config::Config;
use tgforward::platform::telegram::TelegramTransport;
use tgforward::platform::{RecipientId, Session};

#[tokio::main]
async fn main() -> Result<()> {
    tgforward::init_logging();

    let targets: Vec<String> = std::env::args().skip(1).collect();
    if targets.is_empty() {
        anyhow::bail!("Usage: tgforward-lookup <chat id | @username>...");
    }

    let config = Config::load(None).context("Failed to load configuration")?;
    config
        .validate_credentials()
        .context("Credentials are incomplete")?;

    let transport = TelegramTransport::new(&config.telegram.session);
    transport.connect().await.context("Failed to connect")?;

    let mut failures = 0;
    for target in &targets {
        match transport.lookup_chat(&RecipientId::new(target.as_str())).await {
            Ok((id, details)) => {
                println!("{} => {}", target, id);
                println!("{}\n", details);
            }
            Err(e) => {
                error!("Lookup of {} failed: {}", target, e);
                failures += 1;
            }
        }
    }
    transport.disconnect().await;

    if failures > 0 {
        anyhow::bail!("{} of {} lookup(s) failed", failures, targets.len());
    }
    Ok(())
}
