//! Wiring of the push channel, the store and the fallback poll.
//!
//! A [`Monitor`] is built explicitly by whoever needs live data and torn down
//! with [`Monitor::shutdown`] (or on drop). Nothing here is global.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::api::{ApiClient, ApiError};
use crate::config::Config;
use crate::models::SessionFilter;
use crate::push::{ConnectionManager, ConnectionState, PushFrame, Subscription, Topic};
use crate::store::SessionStore;

/// Owns one connection manager, one store and the poll task.
pub struct Monitor {
    store: SessionStore,
    connection: ConnectionManager,
    subscription: Option<Subscription>,
    poll: Option<JoinHandle<()>>,
}

impl Monitor {
    /// Connect, load the first snapshot and start polling.
    pub async fn mount(config: &Config, filter: SessionFilter) -> Result<Self, ApiError> {
        let api = ApiClient::new(config.api_url.as_str(), config.namespace)?;
        let store = SessionStore::new(api);
        store.set_filter(filter);

        let connection = ConnectionManager::new(config.connection_settings());
        let subscription = {
            let store = store.clone();
            connection.subscribe(
                Topic::All,
                Arc::new(move |frame: &PushFrame| store.handle_frame(frame)),
            )
        };
        connection.connect();

        info!(
            api = %config.api_url,
            namespace = config.namespace.as_str(),
            "monitor mounted"
        );
        store.refresh().await;
        let poll = tokio::spawn(poll_backend(store.clone(), config.poll_interval));

        Ok(Self {
            store,
            connection,
            subscription: Some(subscription),
            poll: Some(poll),
        })
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    /// Send a frame on the push channel.
    pub fn send(&self, frame: &PushFrame) -> bool {
        self.connection.send(frame)
    }

    /// Stop polling, detach from the push channel and close it.
    ///
    /// Requests still in flight complete but no longer touch the store.
    pub fn shutdown(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.abort();
        }
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
            self.store.deactivate();
            self.connection.disconnect();
            info!("monitor shut down");
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Sessions and stats both, so a dead push channel still converges.
async fn poll_backend(store: SessionStore, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        debug!("polling backend");
        store.refresh().await;
    }
}
