//! Connect every modem in a config file and print its events.
//!
//! ```text
//! cargo run --example monitor_devices -- cardlink.toml
//! RUST_LOG=cardlink=debug cargo run --example monitor_devices -- cardlink.toml
//! ```
//!
//! Incoming calls are answered and released again after thirty seconds.

use std::time::Duration;

use anyhow::Context;
use cardlink::{ModemEvent, Registry, RegistryConfig};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "cardlink.toml".to_string());
    let config =
        RegistryConfig::load(&path).with_context(|| format!("loading configuration from {path}"))?;
    tracing::info!(path = %path, devices = config.devices.len(), "configuration loaded");

    let registry = Registry::with_serial(config)?;
    let mut events = registry.subscribe();
    registry.start().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => handle(&registry, event),
                Err(RecvError::Lagged(n)) => tracing::warn!(missed = n, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    registry.shutdown().await;
    Ok(())
}

fn handle(registry: &Registry, event: ModemEvent) {
    match event {
        ModemEvent::Ready { device, identity } => {
            println!(
                "{device}: ready ({} {}, IMEI {})",
                identity.manufacturer.as_deref().unwrap_or("?"),
                identity.model.as_deref().unwrap_or("?"),
                identity.imei.as_deref().unwrap_or("?"),
            );
        }
        ModemEvent::IncomingCall { device, caller } => {
            println!(
                "{device}: incoming call from {}",
                caller.as_deref().unwrap_or("unknown")
            );
            let registry = registry.clone();
            tokio::spawn(async move {
                if let Err(e) = take_call(&registry, &device).await {
                    tracing::warn!(device = %device, error = %e, "call handling failed");
                }
            });
        }
        ModemEvent::MessageReceived {
            device,
            index,
            header,
            body,
        } => println!("{device}: message #{index} [{header}]\n{body}"),
        ModemEvent::FeatureCodeResult { device, response } => {
            println!("{device}: feature code result {response}")
        }
        other => println!("{other:?}"),
    }
}

async fn take_call(registry: &Registry, device: &str) -> cardlink::Result<()> {
    let call = registry.bind_call(device, ()).await?;
    call.answer().await?;
    tokio::time::sleep(Duration::from_secs(30)).await;
    call.hangup().await;
    Ok(())
}
