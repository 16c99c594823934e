// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builds the session engine from configuration.

use std::sync::Arc;
use std::time::Duration;

use parley_bridge::{BridgeConfig, BridgeEvent, EmbeddingBridge};
use parley_config::model::{StorageBackend, StorageConfig};
use parley_config::ParleyConfig;
use parley_core::platform::{
    ChannelWindow, FileStore, KeyValueStore, MemoryStore, SystemClock, TargetOrigin,
};
use parley_core::{EmbeddingMessage, ParleyError};
use parley_gate::{HttpSubscriptionApi, SubscriptionCache, SubscriptionGate, SubscriptionService};
use parley_session::{
    load_or_create, scoped_store, PollSettings, SessionScope, SessionShell, WidgetWindow,
    WindowBounds,
};
use parley_stream::{ChatSettings, HttpTransport, StreamingChatClient};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A wired engine plus the channels the host side reads from.
pub struct Engine {
    pub shell: Arc<SessionShell>,
    /// Decoded host messages for [`SessionShell::run`].
    pub events: mpsc::UnboundedReceiver<BridgeEvent>,
    /// Messages the engine posted to its host.
    pub outbound: mpsc::UnboundedReceiver<(EmbeddingMessage, TargetOrigin)>,
}

pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn KeyValueStore>, ParleyError> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::File => {
            let path = config.resolved_path().ok_or_else(|| {
                ParleyError::Config("no data directory found; set storage.path".into())
            })?;
            debug!(path = %path.display(), "using file store");
            Ok(Arc::new(FileStore::new(path)))
        }
    }
}

pub fn subscription_service(
    config: &ParleyConfig,
    store: Arc<dyn KeyValueStore>,
) -> Result<Arc<SubscriptionService>, ParleyError> {
    let subscription = &config.subscription;
    let api = HttpSubscriptionApi::new(
        &subscription.api_base_url,
        Duration::from_secs(subscription.request_timeout_secs),
    )?;
    let cache = SubscriptionCache::new(
        store,
        Arc::new(SystemClock),
        Duration::from_secs(subscription.cache_ttl_secs),
    );
    Ok(Arc::new(SubscriptionService::new(Arc::new(api), cache)))
}

pub fn poll_settings(config: &ParleyConfig) -> PollSettings {
    PollSettings {
        interval: Duration::from_secs(config.session.poll_interval_secs),
        max_consecutive_errors: config.session.poll_max_errors,
    }
}

pub fn chat_settings(config: &ParleyConfig) -> ChatSettings {
    let mut settings = ChatSettings::new(config.chat.endpoint.clone());
    settings.tenant_id = config.chat.tenant_id.clone();
    settings.use_rag = config.chat.use_rag;
    settings.rag_top_k = config.chat.rag_top_k;
    settings.debug_protocol = config.chat.debug_protocol;
    settings
}

fn window_bounds(config: &ParleyConfig) -> WindowBounds {
    let widget = &config.widget;
    WindowBounds {
        min_width: widget.min_width,
        min_height: widget.min_height,
        max_width: widget.max_width,
        max_height: widget.max_height,
        default_width: widget.default_width,
        default_height: widget.default_height,
    }
}

/// Wires transport, bridge, gate and window into a session shell.
pub async fn build(config: &ParleyConfig) -> Result<Engine, ParleyError> {
    let store = open_store(&config.storage)?;

    let scope: SessionScope = config.session.scope.parse().map_err(|_| {
        ParleyError::Config(format!("unknown session scope `{}`", config.session.scope))
    })?;
    let session_id = load_or_create(scoped_store(scope, store.clone()).as_ref());

    let transport = HttpTransport::new(config.chat.connect_timeout_secs.map(Duration::from_secs))?;
    let client =
        StreamingChatClient::new(Arc::new(transport), session_id.clone(), chat_settings(config));

    let (window, outbound) = ChannelWindow::new();
    let (bridge, events) = EmbeddingBridge::new(
        Arc::new(window),
        BridgeConfig {
            own_origin: config.bridge.own_origin.clone(),
            allowed_origins: config.bridge.allowed_origins.clone(),
            allow_wildcard_fallback: config.bridge.allow_wildcard_fallback,
        },
    );

    let mut shell = SessionShell::new(
        client,
        Arc::new(bridge),
        WidgetWindow::new(window_bounds(config), store.clone()),
    );

    if config.subscription.enabled {
        let service = subscription_service(config, store)?;
        if let Some(customer) = &config.subscription.customer_id
            && service.cached_customer_id().is_none()
        {
            service.cache().set_customer_id(customer);
        }
        shell = shell.with_gate(Arc::new(SubscriptionGate::new(service)));
    }

    let shell = Arc::new(shell);
    shell.mount().await?;
    info!(session_id = %session_id, gated = config.subscription.enabled, "session engine ready");

    Ok(Engine {
        shell,
        events,
        outbound,
    })
}
