pub mod fencing;
pub mod score;
pub mod session;
pub mod session_machine;
mod sse;
pub mod taxonomy;
pub mod timer;

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::match_store::MatchStore,
    error::ServiceError,
    services::{completion::CompletionClient, identity::IdentityProvider},
};

pub use self::session::LiveSession;
pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);

/// Central application state: the storage handle, live sessions and external collaborators.
pub struct AppState {
    match_store: RwLock<Option<Arc<dyn MatchStore>>>,
    degraded: watch::Sender<bool>,
    sessions: DashMap<Uuid, Arc<LiveSession>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    completion: Option<Arc<dyn CompletionClient>>,
    config: AppConfig,
    transition_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(
        config: AppConfig,
        identity: Option<Arc<dyn IdentityProvider>>,
        completion: Option<Arc<dyn CompletionClient>>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            match_store: RwLock::new(None),
            degraded: degraded_tx,
            sessions: DashMap::new(),
            identity,
            completion,
            config,
            transition_timeout: Some(DEFAULT_TRANSITION_TIMEOUT),
        })
    }

    /// Obtain a handle to the current match store, if one is installed.
    pub async fn match_store(&self) -> Option<Arc<dyn MatchStore>> {
        let guard = self.match_store.read().await;
        guard.as_ref().cloned()
    }

    /// Match store usable for a request, or [`ServiceError::Degraded`].
    pub async fn require_match_store(&self) -> Result<Arc<dyn MatchStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.match_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new match store implementation and leave degraded mode.
    pub async fn set_match_store(&self, store: Arc<dyn MatchStore>) {
        {
            let mut guard = self.match_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current match store and enter degraded mode.
    pub async fn clear_match_store(&self) {
        {
            let mut guard = self.match_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Registry of live sessions keyed by match id.
    pub fn sessions(&self) -> &DashMap<Uuid, Arc<LiveSession>> {
        &self.sessions
    }

    pub fn identity(&self) -> Option<&Arc<dyn IdentityProvider>> {
        self.identity.as_ref()
    }

    pub fn completion(&self) -> Option<&Arc<dyn CompletionClient>> {
        self.completion.as_ref()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Upper bound on the persistence work of one session transition.
    pub fn transition_timeout(&self) -> Option<Duration> {
        self.transition_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::match_store::memory::MemoryMatchStore;

    #[tokio::test]
    async fn starts_degraded_until_store_installed() {
        let state = AppState::new(AppConfig::default(), None, None);
        assert!(state.is_degraded());
        assert!(matches!(
            state.require_match_store().await,
            Err(ServiceError::Degraded)
        ));

        let mut watcher = state.degraded_watcher();
        state
            .set_match_store(Arc::new(MemoryMatchStore::new()))
            .await;
        assert!(!state.is_degraded());
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());
        assert!(state.require_match_store().await.is_ok());

        state.update_degraded(true);
        assert!(state.require_match_store().await.is_err());

        state.clear_match_store().await;
        assert!(state.match_store().await.is_none());
    }
}
