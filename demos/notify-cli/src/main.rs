//! Headless notification client.
//!
//! Run with:
//! `OC_POCKET_PAIRING=oc-pocket-pair:v1:... cargo run -p notify-cli-demo`
//!
//! Optional: `OC_POCKET_DIRECTORY` scopes requests to a working directory.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use oc_pocket_core::{
    Credential, DeepLinkHandler, InstallationPaths, ProactiveOutreach, decode_pairing_code,
};
use oc_pocket_sync::{NotificationSyncEngine, SyncConfig};
use oc_pocket_transport::{
    HttpNotificationApi, NotificationStreamClient, TransportConfig, TransportFactory,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Logs outreach instead of navigating.
struct LogDeepLinks;

impl DeepLinkHandler for LogDeepLinks {
    fn open(&self, outreach: &ProactiveOutreach) {
        tracing::info!(
            session_id = %outreach.session_id,
            deep_link = %outreach.deep_link,
            title = %outreach.title,
            "Proactive outreach"
        );
    }
}

fn installation_paths() -> InstallationPaths {
    let state = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("oc-pocket");
    let config = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("oc-pocket");
    InstallationPaths::new(state.to_string_lossy(), config.to_string_lossy())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let raw = std::env::var("OC_POCKET_PAIRING").context("OC_POCKET_PAIRING is not set")?;
    let payload = decode_pairing_code(&raw).map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let paths = installation_paths();
    tracing::info!(
        server = %payload.base_url,
        name = payload.name.as_deref().unwrap_or("-"),
        device = %paths.identity(),
        "Paired"
    );

    let credential = Credential::from_payload(&payload);
    let mut factory = TransportFactory::new(payload.base_url.clone(), &TransportConfig::default())?
        .token_provider(credential.token_provider());
    if let Ok(directory) = std::env::var("OC_POCKET_DIRECTORY") {
        factory = factory.directory_provider(Arc::new(move || Some(directory.clone())));
    }

    let engine = NotificationSyncEngine::new(
        HttpNotificationApi::from_factory(&factory),
        SyncConfig::default(),
    )
    .with_deep_link_handler(Arc::new(LogDeepLinks));

    let _subscription = engine.subscribe(
        |records| {
            for record in records.iter().take(5) {
                tracing::info!(
                    id = %record.id,
                    kind = %record.kind,
                    unread = record.is_unread(),
                    "{}",
                    record.title
                );
            }
        },
        |count| tracing::info!(count, "Unread notifications"),
    );

    let mut state = engine.connection_state();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            tracing::info!(state = ?current, "Connection");
        }
    });

    let stream = NotificationStreamClient::from_factory(&factory);
    tokio::select! {
        err = engine.run(&stream) => {
            credential.clear();
            return Err(anyhow::Error::new(err).context("Server rejected this device, pair again"));
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }
    Ok(())
}
