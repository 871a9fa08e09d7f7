//! Session manager with FSM-based lifecycle tracking.
//!
//! The manager listens to the identity provider, runs the entry sequence
//! (profile, notification snapshot, realtime channel) for each sign-in and
//! tears everything down on sign-out. Every identity event bumps a
//! generation counter; background work captures the generation it started
//! under and its results are dropped once a newer event has been applied.

use crate::machine::{SessionMachine, SessionMachineInput, SessionPhase};
use crate::{NotificationStore, SessionError, SessionResult, SessionSnapshot};
use parking_lot::Mutex;
use pulse_config::SessionSettings;
use pulse_protocol_types::{
    BackendGateway, ChannelHandle, IdentityError, IdentityEvent, IdentityProvider, IdentityUser,
    NotificationRecord, Profile, RealtimeConnector, IDENTITY_DISABLED,
};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, watch, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Tunables for [`SessionManager`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// How long `login` and `logout` wait for the session to settle.
    pub settle_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&SessionSettings::default())
    }
}

impl From<&SessionSettings> for SessionOptions {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            settle_timeout: Duration::from_secs(settings.settle_timeout_secs),
        }
    }
}

struct SessionState {
    machine: SessionMachine,
    generation: u64,
    identity: Option<IdentityUser>,
    user: Option<Profile>,
    store: NotificationStore,
    channel_open: bool,
    degraded_reason: Option<String>,
    last_sync_error: Option<String>,
    shut_down: bool,
}

impl SessionState {
    fn new() -> Self {
        Self {
            machine: SessionMachine::new(),
            generation: 0,
            identity: None,
            user: None,
            store: NotificationStore::new(),
            channel_open: false,
            degraded_reason: None,
            last_sync_error: None,
            shut_down: false,
        }
    }

    fn phase(&self) -> SessionPhase {
        SessionPhase::from(self.machine.state())
    }

    fn transition(&mut self, input: &SessionMachineInput) -> SessionResult<SessionPhase> {
        let old_phase = self.phase();

        self.machine.consume(input).map_err(|_| {
            SessionError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                self.machine.state()
            ))
        })?;

        let new_phase = self.phase();
        if old_phase != new_phase {
            debug!(
                old_phase = ?old_phase,
                new_phase = ?new_phase,
                "Session state transition"
            );
        }

        Ok(new_phase)
    }

    fn clear_user(&mut self) {
        self.identity = None;
        self.user = None;
        self.store.clear();
        self.last_sync_error = None;
    }

    fn snapshot(&self) -> SessionSnapshot {
        let phase = self.phase();
        SessionSnapshot {
            phase,
            loading: phase.is_loading(),
            identity: self.identity.clone(),
            user: self.user.clone(),
            notifications: self.store.records(),
            unread_count: self.store.unread_count(),
            channel_open: self.channel_open,
            degraded_reason: self.degraded_reason.clone(),
            last_sync_error: self.last_sync_error.clone(),
            generation: self.generation,
        }
    }
}

struct LiveChannel {
    handle: Box<dyn ChannelHandle>,
    pump: Option<JoinHandle<()>>,
}

impl LiveChannel {
    async fn close(mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.handle.disconnect().await;
    }
}

struct Inner {
    identity: Arc<dyn IdentityProvider>,
    backend: Arc<dyn BackendGateway>,
    realtime: Arc<dyn RealtimeConnector>,
    options: SessionOptions,
    state: Mutex<SessionState>,
    /// At most one open channel. Held across open and close so a new
    /// channel never overlaps the teardown of the previous one.
    channel: tokio::sync::Mutex<Option<LiveChannel>>,
    init: OnceCell<()>,
    listener: Mutex<Option<JoinHandle<()>>>,
    entry: Mutex<Option<JoinHandle<()>>>,
    updates: watch::Sender<SessionSnapshot>,
}

/// Client session: identity lifecycle, notification list and realtime
/// channel for the signed-in user.
///
/// Cloning is cheap and every clone drives the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("phase", &self.phase())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        backend: Arc<dyn BackendGateway>,
        realtime: Arc<dyn RealtimeConnector>,
    ) -> Self {
        Self::with_options(identity, backend, realtime, SessionOptions::default())
    }

    pub fn with_options(
        identity: Arc<dyn IdentityProvider>,
        backend: Arc<dyn BackendGateway>,
        realtime: Arc<dyn RealtimeConnector>,
        options: SessionOptions,
    ) -> Self {
        let (updates, _) = watch::channel(SessionSnapshot::bootstrapping());
        Self {
            inner: Arc::new(Inner {
                identity,
                backend,
                realtime,
                options,
                state: Mutex::new(SessionState::new()),
                channel: tokio::sync::Mutex::new(None),
                init: OnceCell::new(),
                listener: Mutex::new(None),
                entry: Mutex::new(None),
                updates,
            }),
        }
    }

    /// Initialize identity and start listening for identity changes.
    ///
    /// Runs once; concurrent and repeated calls wait for and observe the
    /// single attempt. A disabled or misconfigured identity provider
    /// leaves the session degraded rather than failing.
    pub async fn init(&self) -> SessionSnapshot {
        let inner = self.inner.clone();
        self.inner.init.get_or_init(|| inner.bootstrap()).await;
        self.snapshot()
    }

    /// Current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.updates.borrow().clone()
    }

    /// Receive every published state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.updates.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.lock().phase()
    }

    /// Wait until the session is no longer loading.
    pub async fn wait_settled(&self) -> SessionResult<SessionSnapshot> {
        let mut updates = self.subscribe();
        self.settle(&mut updates, |s| !s.loading).await
    }

    /// Sign in with email and password and wait until the entry sequence
    /// for that identity has finished.
    pub async fn login(&self, email: &str, password: &str) -> SessionResult<SessionSnapshot> {
        self.ensure_ready()?;
        let mut updates = self.subscribe();
        let baseline = updates.borrow().generation;

        let user = self
            .inner
            .identity
            .sign_in(email, password)
            .await
            .map_err(SessionError::Credential)?;
        info!(uid = %user.uid, "Signed in, waiting for session to settle");

        let snapshot = self
            .settle(&mut updates, |s| {
                let settled_as_user = s.identity.as_ref().is_some_and(|id| id.uid == user.uid);
                let signed_out_since = s.generation > baseline && s.identity.is_none();
                !s.loading && (settled_as_user || signed_out_since)
            })
            .await?;

        if snapshot.identity.is_none() {
            return Err(SessionError::NotAuthenticated);
        }
        Ok(snapshot)
    }

    /// Sign out and wait until the session state and channel are torn down.
    ///
    /// State is cleared by the resulting sign-out event, not by this call.
    pub async fn logout(&self) -> SessionResult<SessionSnapshot> {
        self.ensure_ready()?;
        let mut updates = self.subscribe();

        self.inner.identity.sign_out().await?;

        self.settle(&mut updates, |s| s.identity.is_none() && !s.channel_open)
            .await
    }

    /// Replace the notification list with the backend's current list.
    pub async fn fetch_notifications(&self) -> SessionResult<SessionSnapshot> {
        let generation = self.signed_in_generation()?;
        let records = self.inner.load_notifications().await?;
        let count = records.len();

        if self
            .inner
            .commit(generation, |state| state.store.replace_snapshot(records))
        {
            debug!(count, "Notifications fetched");
        }
        Ok(self.snapshot())
    }

    /// Mark one notification read, or all of them when `id` is `None`.
    ///
    /// The backend is acknowledged first. If that fails the local list is
    /// left untouched and the error is returned. Afterwards the list is
    /// reconciled with a fresh fetch; a failed reconcile is only recorded.
    pub async fn mark_notifications_read(
        &self,
        id: Option<&str>,
    ) -> SessionResult<SessionSnapshot> {
        let generation = self.signed_in_generation()?;
        let token = self.inner.identity.id_token().await?;

        match id {
            Some(id) => self.inner.backend.mark_notification_read(&token, id).await?,
            None => self.inner.backend.mark_all_notifications_read(&token).await?,
        }

        let applied = self.inner.commit(generation, |state| match id {
            Some(id) => {
                state.store.apply_read(id);
            }
            None => {
                state.store.apply_all_read();
            }
        });
        if !applied {
            return Ok(self.snapshot());
        }

        match self.inner.load_notifications().await {
            Ok(records) => {
                self.inner
                    .commit(generation, |state| state.store.replace_snapshot(records));
            }
            Err(err) => {
                warn!(error = %err, "Failed to reconcile notifications after marking read");
                self.inner.commit(generation, |state| {
                    state.last_sync_error = Some(err.to_string());
                });
            }
        }
        Ok(self.snapshot())
    }

    /// Stop listening, close the channel and clear all session state.
    pub async fn shutdown(&self) {
        let listener = self.inner.listener.lock().take();
        if let Some(listener) = listener {
            listener.abort();
        }
        let entry = self.inner.entry.lock().take();
        if let Some(entry) = entry {
            entry.abort();
        }

        {
            let mut state = self.inner.state.lock();
            state.shut_down = true;
            state.generation += 1;
            if state.phase().is_signed_in() {
                if let Err(err) = state.transition(&SessionMachineInput::SignedOut) {
                    warn!(error = %err, "Unexpected state during shutdown");
                }
            }
            state.clear_user();
            self.inner.publish(&state);
        }

        self.inner.close_channel().await;
        info!("Session shut down");
    }

    fn ensure_ready(&self) -> SessionResult<()> {
        let state = self.inner.state.lock();
        if state.shut_down {
            return Err(SessionError::ShutDown);
        }
        match state.phase() {
            SessionPhase::Degraded => Err(SessionError::Configuration(
                state
                    .degraded_reason
                    .clone()
                    .unwrap_or_else(|| IDENTITY_DISABLED.to_string()),
            )),
            SessionPhase::Bootstrapping => Err(SessionError::Initializing),
            _ => Ok(()),
        }
    }

    fn signed_in_generation(&self) -> SessionResult<u64> {
        self.ensure_ready()?;
        let state = self.inner.state.lock();
        if state.identity.is_none() {
            return Err(SessionError::NotAuthenticated);
        }
        Ok(state.generation)
    }

    async fn settle(
        &self,
        updates: &mut watch::Receiver<SessionSnapshot>,
        condition: impl FnMut(&SessionSnapshot) -> bool,
    ) -> SessionResult<SessionSnapshot> {
        let timeout = self.inner.options.settle_timeout;
        let wait = async { updates.wait_for(condition).await.map(|s| s.clone()) };

        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(_)) => Err(SessionError::ShutDown),
            Err(_) => Err(SessionError::Timeout(timeout.as_secs())),
        }
    }
}

impl Inner {
    async fn bootstrap(self: Arc<Self>) {
        if !self.identity.is_enabled() {
            self.degrade(IDENTITY_DISABLED.to_string());
            return;
        }

        if let Err(err) = self.identity.initialize().await {
            let reason = match err {
                IdentityError::NotConfigured(reason) => reason,
                other => other.to_string(),
            };
            self.degrade(reason);
            return;
        }

        // Subscribe before reading the current user so no event is missed.
        let events = self.identity.subscribe();
        {
            let mut state = self.state.lock();
            if let Err(err) = state.transition(&SessionMachineInput::InitSucceeded) {
                warn!(error = %err, "Unexpected state after identity init");
            }
            self.publish(&state);
        }
        info!("Session initialized");

        if let Some(user) = self.identity.current_user() {
            info!(uid = %user.uid, "Restoring persisted identity");
            self.apply_signed_in(user);
        }

        let listener = tokio::spawn(listen(Arc::downgrade(&self), events));
        *self.listener.lock() = Some(listener);
    }

    fn degrade(&self, reason: String) {
        warn!(reason = %reason, "Identity unavailable, session degraded");
        let mut state = self.state.lock();
        if let Err(err) = state.transition(&SessionMachineInput::InitFailed) {
            warn!(error = %err, "Unexpected state while degrading");
        }
        state.degraded_reason = Some(reason);
        self.publish(&state);
    }

    fn publish(&self, state: &SessionState) {
        self.updates.send_replace(state.snapshot());
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.lock().generation == generation
    }

    /// Apply `update` only if no identity event arrived since `generation`.
    fn commit(&self, generation: u64, update: impl FnOnce(&mut SessionState)) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!(
                generation,
                current = state.generation,
                "Discarding stale session update"
            );
            return false;
        }
        update(&mut state);
        self.publish(&state);
        true
    }

    fn apply_signed_in(self: &Arc<Self>, user: IdentityUser) {
        let generation = {
            let mut state = self.state.lock();
            if state.shut_down {
                return;
            }
            let same_user = state
                .identity
                .as_ref()
                .is_some_and(|current| current.uid == user.uid);
            if same_user && state.phase().is_signed_in() {
                debug!(uid = %user.uid, "Ignoring repeated sign-in");
                return;
            }
            if let Err(err) = state.transition(&SessionMachineInput::SignedIn) {
                warn!(error = %err, "Ignoring sign-in event");
                return;
            }
            state.generation += 1;
            state.clear_user();
            state.identity = Some(user.clone());
            // Any open channel belongs to the previous identity.
            state.channel_open = false;
            self.publish(&state);
            state.generation
        };

        info!(uid = %user.uid, generation, "Identity signed in, synchronizing");
        let entry = tokio::spawn(self.clone().run_entry(generation, user));
        *self.entry.lock() = Some(entry);
    }

    async fn apply_signed_out(&self) {
        {
            let mut state = self.state.lock();
            if state.shut_down {
                return;
            }
            if let Err(err) = state.transition(&SessionMachineInput::SignedOut) {
                warn!(error = %err, "Ignoring sign-out event");
                return;
            }
            state.generation += 1;
            state.clear_user();
            self.publish(&state);
            info!(generation = state.generation, "Identity signed out");
        }

        self.close_channel().await;
    }

    /// Profile, then notification snapshot, then realtime channel.
    async fn run_entry(self: Arc<Self>, generation: u64, user: IdentityUser) {
        {
            let mut slot = self.channel.lock().await;
            if !self.is_current(generation) {
                return;
            }
            self.close_previous(&mut slot).await;
        }

        match self.load_profile().await {
            Ok(profile) => {
                debug!(uid = %user.uid, role = %profile.role, "Profile loaded");
                if !self.commit(generation, |state| state.user = Some(profile)) {
                    return;
                }
            }
            Err(err) => {
                warn!(uid = %user.uid, error = %err, "Profile fetch failed");
                if !self.commit(generation, |state| {
                    state.last_sync_error = Some(err.to_string());
                }) {
                    return;
                }
            }
        }

        match self.load_notifications().await {
            Ok(records) => {
                let count = records.len();
                if !self.commit(generation, |state| state.store.replace_snapshot(records)) {
                    return;
                }
                debug!(count, "Notification snapshot loaded");
            }
            Err(err) => {
                warn!(uid = %user.uid, error = %err, "Notification snapshot failed");
                if !self.commit(generation, |state| {
                    state.last_sync_error = Some(err.to_string());
                }) {
                    return;
                }
            }
        }

        if let Err(err) = self.open_channel(generation, &user.uid).await {
            warn!(uid = %user.uid, error = %err, "Realtime channel unavailable");
            if !self.commit(generation, |state| {
                state.last_sync_error = Some(err.to_string());
            }) {
                return;
            }
        }

        let completed = self.commit(generation, |state| {
            if let Err(err) = state.transition(&SessionMachineInput::SyncCompleted) {
                warn!(error = %err, "Could not complete synchronization");
            }
        });
        if completed {
            info!(uid = %user.uid, "Session synchronized");
        }
    }

    async fn load_profile(&self) -> SessionResult<Profile> {
        let token = self.identity.id_token().await?;
        Ok(self.backend.fetch_profile(&token).await?)
    }

    async fn load_notifications(&self) -> SessionResult<Vec<NotificationRecord>> {
        let token = self.identity.id_token().await?;
        Ok(self.backend.list_notifications(&token).await?)
    }

    async fn open_channel(self: &Arc<Self>, generation: u64, uid: &str) -> SessionResult<()> {
        let mut slot = self.channel.lock().await;

        // A stale entry must not touch a channel opened by a newer one.
        if !self.is_current(generation) {
            return Ok(());
        }

        self.close_previous(&mut slot).await;

        let mut handle = self.realtime.connect().await?;
        if let Err(err) = handle.join(uid).await {
            handle.disconnect().await;
            return Err(err.into());
        }
        let notifications = handle.take_notifications();

        if !self.commit(generation, |state| state.channel_open = true) {
            debug!(uid, "Discarding channel opened for a stale identity");
            handle.disconnect().await;
            return Ok(());
        }

        let pump = notifications
            .map(|receiver| tokio::spawn(pump(Arc::downgrade(self), generation, receiver)));
        *slot = Some(LiveChannel { handle, pump });
        info!(uid, "Realtime channel joined");
        Ok(())
    }

    /// Caller holds the channel slot and has checked the generation.
    async fn close_previous(&self, slot: &mut Option<LiveChannel>) {
        if let Some(previous) = slot.take() {
            previous.close().await;
            debug!("Closed channel of previous identity");
        }
    }

    async fn close_channel(&self) {
        let mut slot = self.channel.lock().await;
        if let Some(live) = slot.take() {
            live.close().await;
            info!("Realtime channel closed");
        }

        let mut state = self.state.lock();
        if state.channel_open {
            state.channel_open = false;
            self.publish(&state);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}

async fn listen(inner: Weak<Inner>, mut events: broadcast::Receiver<IdentityEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => Some(event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Identity events lagged, resyncing from provider");
                None
            }
            Err(RecvError::Closed) => break,
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };

        let event = event.unwrap_or_else(|| match inner.identity.current_user() {
            Some(user) => IdentityEvent::SignedIn(user),
            None => IdentityEvent::SignedOut,
        });
        match event {
            IdentityEvent::SignedIn(user) => inner.apply_signed_in(user),
            IdentityEvent::SignedOut => inner.apply_signed_out().await,
        }
    }
    debug!("Identity listener stopped");
}

async fn pump(
    inner: Weak<Inner>,
    generation: u64,
    mut notifications: mpsc::Receiver<NotificationRecord>,
) {
    while let Some(record) = notifications.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let id = record.id.clone();
        let mut added = false;
        if !inner.commit(generation, |state| added = state.store.push_incoming(record)) {
            break;
        }
        if added {
            debug!(id = %id, "Notification received");
        } else {
            debug!(id = %id, "Ignoring duplicate notification");
        }
    }
}
