//! Session lifecycle controller.
//!
//! [`Dashboard`] owns the node connector and the session store and drives the
//! connection state machine:
//!
//! ```text
//! Uninitialized -> Initializing -> AwaitingCredentials -> Connecting -> Connected
//!                       |                 ^                   |           |
//!                       v                 +-------------------+           v
//!                     Error                                         Disconnected
//! ```
//!
//! Entering `Connected` attaches the session event listener and refreshes all
//! data. Leaving it bumps the generation and clears the data, so late results
//! of an earlier session are never presented.

use crate::error::{connection_failure, DashboardError, ValidationError};
use crate::state::{ConnectionState, DashboardState, DraftAsset, Session};
use lnc_adapter::{ConnectionEvent, Credentials, NodeConnector};
use session_store::{SessionStore, StoredSession};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use std::time::{SystemTime, UNIX_EPOCH};
use tap_schema::{Asset, Channel, NodeInfo, Peer};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Fee rate used when finalizing a batch, in sat/vbyte.
pub const DEFAULT_FINALIZE_FEE_RATE: u32 = 10;

/// Configuration for the dashboard.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Directory holding the session database.
    pub data_dir: PathBuf,
    /// Whether a password must accompany new pairings and unlock stored ones.
    pub require_password: bool,
    pub finalize_fee_rate: u32,
    /// List assets whose mint is not confirmed yet.
    pub include_unconfirmed_mints: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            require_password: false,
            finalize_fee_rate: DEFAULT_FINALIZE_FEE_RATE,
            include_unconfirmed_mints: true,
        }
    }
}

/// Handle to the spawned session event listener; aborts it when dropped.
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub(crate) struct Inner {
    pub(crate) node: Arc<dyn NodeConnector>,
    pub(crate) store: SessionStore,
    pub(crate) config: DashboardConfig,
    pub(crate) state: RwLock<DashboardState>,
    status: watch::Sender<ConnectionState>,
    listener: Mutex<Option<Subscription>>,
}

/// Dashboard for one remote node. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Dashboard {
    pub(crate) inner: Arc<Inner>,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Dashboard {
    pub fn new(
        node: Arc<dyn NodeConnector>,
        store: SessionStore,
        config: DashboardConfig,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionState::Uninitialized);
        Self {
            inner: Arc::new(Inner {
                node,
                store,
                config,
                state: RwLock::new(DashboardState::default()),
                status,
                listener: Mutex::new(None),
            }),
        }
    }

    /// Create a dashboard persisting its session under `config.data_dir`.
    pub fn open(
        node: Arc<dyn NodeConnector>,
        config: DashboardConfig,
    ) -> Result<Self, DashboardError> {
        std::fs::create_dir_all(&config.data_dir)?;
        let store = SessionStore::open(config.data_dir.join("session"))?;
        Ok(Self::new(node, store, config))
    }

    /// Create a dashboard with an in-memory session store (for testing and demos).
    pub fn in_memory(
        node: Arc<dyn NodeConnector>,
        config: DashboardConfig,
    ) -> Result<Self, DashboardError> {
        let store = SessionStore::in_memory()?;
        Ok(Self::new(node, store, config))
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.inner.config
    }

    /// Watch connection state changes.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionState> {
        self.inner.status.subscribe()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.inner.state.read().await.connection
    }

    /// Copy of the whole state.
    pub async fn snapshot(&self) -> DashboardState {
        self.inner.state.read().await.clone()
    }

    pub async fn session(&self) -> Option<Session> {
        self.inner.state.read().await.session.clone()
    }

    pub async fn node_info(&self) -> Option<NodeInfo> {
        self.inner.state.read().await.node_info.clone()
    }

    pub async fn channels(&self) -> Vec<Channel> {
        self.inner.state.read().await.channels.clone()
    }

    pub async fn assets(&self) -> Vec<Asset> {
        self.inner.state.read().await.assets.clone()
    }

    pub async fn pending_batch(&self) -> Vec<DraftAsset> {
        self.inner.state.read().await.pending_batch.clone()
    }

    pub async fn peers(&self) -> Vec<Peer> {
        self.inner.state.read().await.peers.clone()
    }

    /// Apply a state transition and publish it.
    fn transition(&self, state: &mut DashboardState, next: ConnectionState) {
        if state.connection != next {
            debug!("Connection state {:?} -> {:?}", state.connection, next);
        }
        state.transition(next);
        self.inner.status.send_replace(next);
    }

    /// Restore a previously paired session, if any.
    pub async fn init(&self) -> Result<ConnectionState, DashboardError> {
        let attempt = {
            let mut state = self.inner.state.write().await;
            if state.connection != ConnectionState::Uninitialized {
                return Ok(state.connection);
            }
            self.transition(&mut state, ConnectionState::Initializing);
            state.next_attempt()
        };

        let stored = match self.inner.store.load() {
            Ok(stored) => stored,
            Err(e) => {
                let message = format!("Unable to read stored session: {}", e);
                self.abandon_attempt(attempt, ConnectionState::Error, message, false)
                    .await?;
                return Err(e.into());
            }
        };

        let Some(stored) = stored else {
            debug!("No stored session");
            let mut state = self.inner.state.write().await;
            if !state.is_current_attempt(attempt) {
                return Err(DashboardError::Superseded);
            }
            self.transition(&mut state, ConnectionState::AwaitingCredentials);
            return Ok(ConnectionState::AwaitingCredentials);
        };

        info!("Found stored session {}", stored.fingerprint);
        let locked = self.inner.config.require_password && stored.is_password_protected();
        {
            let mut state = self.inner.state.write().await;
            if !state.is_current_attempt(attempt) {
                return Err(DashboardError::Superseded);
            }
            state.session = Some(Session {
                is_paired: true,
                ..Session::default()
            });
            if locked {
                self.transition(&mut state, ConnectionState::AwaitingCredentials);
                return Ok(ConnectionState::AwaitingCredentials);
            }
        }

        match self.establish(&Credentials::new(stored.pairing_phrase)).await {
            Ok(()) => {
                self.complete_attempt(attempt, None).await?;
                Ok(ConnectionState::Connected)
            }
            Err(e) => {
                let message = connection_failure(&e);
                warn!("Failed to restore session {}: {}", stored.fingerprint, message);
                self.abandon_attempt(attempt, ConnectionState::Error, message.clone(), false)
                    .await?;
                Err(DashboardError::Connection(message))
            }
        }
    }

    /// Pair with a node using fresh credentials.
    pub async fn connect(&self, credentials: Credentials) -> Result<(), DashboardError> {
        let pairing_phrase = credentials.pairing_phrase.trim().to_string();
        if pairing_phrase.is_empty() {
            return Err(ValidationError::MissingPairingPhrase.into());
        }
        let password = credentials.password.filter(|p| !p.trim().is_empty());
        if self.inner.config.require_password && password.is_none() {
            return Err(ValidationError::MissingPassword.into());
        }

        let Some(attempt) = self.begin_connecting(false).await? else {
            return Ok(());
        };

        let credentials = Credentials {
            pairing_phrase,
            password,
        };
        match self.establish(&credentials).await {
            Ok(()) => {
                let stored = StoredSession::new(
                    &credentials.pairing_phrase,
                    credentials.password.as_deref(),
                    unix_now(),
                );
                self.complete_attempt(attempt, Some(&stored)).await?;
                info!("Paired with node, session {}", stored.fingerprint);
                Ok(())
            }
            Err(e) => {
                let message = connection_failure(&e);
                warn!("Connection failed: {}", message);
                self.abandon_attempt(
                    attempt,
                    ConnectionState::AwaitingCredentials,
                    message.clone(),
                    true,
                )
                .await?;
                Err(DashboardError::Connection(message))
            }
        }
    }

    /// Unlock the stored session with its password.
    pub async fn login(&self, password: &str) -> Result<(), DashboardError> {
        if password.trim().is_empty() {
            return Err(ValidationError::MissingPassword.into());
        }
        let stored = self
            .inner
            .store
            .load()?
            .ok_or(DashboardError::NoStoredSession)?;
        if !stored.verify_password(password) {
            warn!("Rejected password for session {}", stored.fingerprint);
            let mut state = self.inner.state.write().await;
            let session = state.session.get_or_insert_with(Session::default);
            session.is_paired = true;
            session.last_error = Some(DashboardError::InvalidPassword.to_string());
            return Err(DashboardError::InvalidPassword);
        }

        let Some(attempt) = self.begin_connecting(true).await? else {
            return Ok(());
        };

        let credentials = Credentials::new(stored.pairing_phrase).with_password(password);
        match self.establish(&credentials).await {
            Ok(()) => {
                self.complete_attempt(attempt, None).await?;
                info!("Unlocked session {}", stored.fingerprint);
                Ok(())
            }
            Err(e) => {
                let message = connection_failure(&e);
                warn!("Login to session {} failed: {}", stored.fingerprint, message);
                self.abandon_attempt(
                    attempt,
                    ConnectionState::AwaitingCredentials,
                    message.clone(),
                    false,
                )
                .await?;
                Err(DashboardError::Connection(message))
            }
        }
    }

    /// End the session and forget the stored credentials.
    ///
    /// Any connection attempt still in flight is superseded and will neither
    /// persist its credentials nor reach `Connected`.
    pub async fn logout(&self) -> Result<(), DashboardError> {
        let cleared = {
            let mut state = self.inner.state.write().await;
            state.next_attempt();
            self.detach_listener();
            self.inner.node.disconnect();
            let cleared = self.inner.store.clear();
            state.session = None;
            state.mint_feedback = Default::default();
            state.batch_feedback = Default::default();
            state.fund_feedback = Default::default();
            state.peer_feedback = Default::default();
            self.transition(&mut state, ConnectionState::Disconnected);
            state.clear_data();
            cleared
        };
        info!("Logged out");
        cleared.map_err(Into::into)
    }

    /// React to a session event from the connector.
    pub async fn handle_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => {
                let reconnected = {
                    let mut state = self.inner.state.write().await;
                    let paired = state.session.as_ref().is_some_and(|s| s.is_paired);
                    let recoverable = matches!(
                        state.connection,
                        ConnectionState::Disconnected | ConnectionState::Error
                    );
                    if paired && recoverable && self.inner.node.is_ready() {
                        self.mark_connected(&mut state);
                        true
                    } else {
                        false
                    }
                };
                if reconnected {
                    info!("Transport reconnected");
                    self.refresh_all().await;
                } else {
                    debug!("Ignoring connected event");
                }
            }
            ConnectionEvent::Disconnected => {
                let mut state = self.inner.state.write().await;
                if state.connection == ConnectionState::Connected {
                    warn!("Transport disconnected");
                    self.transition(&mut state, ConnectionState::Disconnected);
                }
            }
            ConnectionEvent::Error(message) => {
                let message = crate::error::friendly_message(&message);
                warn!("Session error: {}", message);
                let mut state = self.inner.state.write().await;
                if let Some(session) = state.session.as_mut() {
                    session.last_error = Some(message);
                }
                if state.connection == ConnectionState::Connected {
                    self.transition(&mut state, ConnectionState::Error);
                }
            }
        }
    }

    /// Enter `Connecting` and return the new attempt; `None` when already connected.
    async fn begin_connecting(&self, paired: bool) -> Result<Option<u64>, DashboardError> {
        let mut state = self.inner.state.write().await;
        match state.connection {
            ConnectionState::Connected if self.inner.node.is_ready() => return Ok(None),
            ConnectionState::Connecting | ConnectionState::Initializing => {
                return Err(DashboardError::Busy)
            }
            s if s.accepts_credentials() => {}
            _ => return Err(DashboardError::Busy),
        }
        state.session = Some(Session {
            pairing_phrase_provided: !paired,
            is_paired: paired,
            ..Session::default()
        });
        self.transition(&mut state, ConnectionState::Connecting);
        Ok(Some(state.next_attempt()))
    }

    /// Connect the node and run the liveness probe.
    async fn establish(&self, credentials: &Credentials) -> Result<(), DashboardError> {
        self.inner.node.connect(credentials).await?;
        self.inner.node.lightning().list_channels().await?;
        Ok(())
    }

    /// Enter `Connected`, persisting `stored`, unless `attempt` was superseded.
    async fn complete_attempt(
        &self,
        attempt: u64,
        stored: Option<&StoredSession>,
    ) -> Result<(), DashboardError> {
        {
            let mut state = self.inner.state.write().await;
            if !state.is_current_attempt(attempt) {
                debug!("Discarding superseded connection attempt");
                if !matches!(
                    state.connection,
                    ConnectionState::Connecting
                        | ConnectionState::Initializing
                        | ConnectionState::Connected
                ) {
                    self.inner.node.disconnect();
                }
                return Err(DashboardError::Superseded);
            }
            if let Some(stored) = stored {
                if let Err(e) = self.inner.store.save(stored) {
                    warn!("Failed to persist session {}: {}", stored.fingerprint, e);
                }
            }
            self.mark_connected(&mut state);
            self.attach_listener();
        }
        self.refresh_all().await;
        Ok(())
    }

    /// Record a failed attempt unless it was superseded. `forget` also drops
    /// the stored session.
    async fn abandon_attempt(
        &self,
        attempt: u64,
        next: ConnectionState,
        message: String,
        forget: bool,
    ) -> Result<(), DashboardError> {
        let mut state = self.inner.state.write().await;
        if !state.is_current_attempt(attempt) {
            debug!("Ignoring failure of superseded connection attempt");
            return Err(DashboardError::Superseded);
        }
        self.inner.node.disconnect();
        if forget {
            if let Err(e) = self.inner.store.clear() {
                warn!("Failed to clear stored session: {}", e);
            }
            state.session = None;
        }
        let session = state.session.get_or_insert_with(Session::default);
        session.last_error = Some(message);
        self.transition(&mut state, next);
        Ok(())
    }

    fn mark_connected(&self, state: &mut DashboardState) {
        let session = state.session.get_or_insert_with(Session::default);
        session.is_paired = true;
        session.last_error = None;
        self.transition(state, ConnectionState::Connected);
    }

    fn attach_listener(&self) {
        let mut feed = self.inner.node.events();
        debug!("Listening for session events ({})", feed.mechanism());
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            while let Some(event) = feed.next().await {
                let Some(inner) = weak.upgrade() else { break };
                Dashboard { inner }.handle_event(event).await;
            }
            debug!("Session event feed closed");
        });
        let previous = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(Subscription { handle });
        drop(previous);
    }

    fn detach_listener(&self) {
        let previous = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(previous);
    }
}
