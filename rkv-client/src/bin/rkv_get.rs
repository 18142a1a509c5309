//! # rkv-get
//!
//! Fetch one key through a pooled client and print it.
//!
//! Usage: `rkv-get <key> [addr]`. Logging follows `RUST_LOG`.

use std::env;
use std::time::Duration;

use anyhow::Context;
use rkv_client::{ClientConfig, KVClient, RkvError};
use tracing::{debug, info};

const DEFAULT_ADDR: &str = "127.0.0.1:6379";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let mut args = env::args().skip(1);
    let key = args.next().context("usage: rkv-get <key> [addr]")?;
    let addr = args.next().unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let client = KVClient::with_config(ClientConfig {
        addr: addr.clone(),
        max_idle: 16,
        max_active: 0,
        idle_timeout: Some(Duration::from_secs(300)),
        ..ClientConfig::default()
    });
    info!(%addr, %key, "fetching key");

    match client.get_data(&key) {
        Ok(value) => println!("{}", value),
        Err(RkvError::Nil) => println!("(nil)"),
        Err(err) => return Err(err).with_context(|| format!("GET {} from {}", key, addr)),
    }

    debug!(stats = ?client.stats(), "done");
    client.close();
    Ok(())
}
