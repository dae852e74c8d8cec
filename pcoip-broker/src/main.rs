//! PCoIP broker entrypoint.
//!
//! Initializes logging, then hands off to `server::run`. Keep this file
//! minimal — application logic lives in `server`, `protocol`, `session`,
//! `mapper`, and `agent`.
mod agent;
mod config;
mod html;
mod mapper;
mod protocol;
mod server;
mod session;

use config::CONFIG;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    simple_logger::init_with_level(CONFIG.log_level.to_level().unwrap_or(log::Level::Info))?;
    server::run(&CONFIG).await
}
