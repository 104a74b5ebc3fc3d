//! One-time bootstrap: turn `API_ID` + `API_HASH` into a session token,
//! check it against Telegram and print it for storage as a secret.

use anyhow::{Context, Result};

use tgforward::config::Config;
use tgforward::platform::telegram::TelegramTransport;
use tgforward::platform::Session;

#[tokio::main]
async fn main() -> Result<()> {
    tgforward::init_logging();

    let path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let config = Config::load(path.as_deref()).context("Failed to load configuration")?;

    let tg = &config.telegram;
    if tg.api_id == 0 || tg.api_hash.trim().is_empty() {
        anyhow::bail!("API_ID and API_HASH must both be set");
    }

    let session = format!("{}:{}", tg.api_id, tg.api_hash.trim());
    let transport = TelegramTransport::new(&session);
    transport
        .connect()
        .await
        .context("Telegram rejected these credentials")?;
    transport.disconnect().await;

    let rule = "=".repeat(60);
    println!("\n{}", rule);
    println!("YOUR SESSION STRING (COPY THIS!):");
    println!("{}", rule);
    println!("{}", session);
    println!("{}", rule);
    println!("\nStore it as SESSION_STRING alongside your other secrets.");

    Ok(())
}
