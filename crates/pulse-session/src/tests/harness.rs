//! Test harness: in-memory identity provider, backend and realtime
//! connector wired into a `SessionManager`.

use crate::{SessionManager, SessionOptions, SessionSnapshot};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use pulse_protocol_types::{
    BackendGateway, ChannelError, ChannelHandle, GatewayError, IdentityError, IdentityEvent,
    IdentityProvider, IdentityUser, NotificationRecord, Profile, RealtimeConnector, Role,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Notify};

pub const ADA_EMAIL: &str = "ada@qualitypulse.dev";
pub const ADA_PASSWORD: &str = "analytical";
pub const GRACE_EMAIL: &str = "grace@qualitypulse.dev";
pub const GRACE_PASSWORD: &str = "compiler";

pub fn ada() -> IdentityUser {
    IdentityUser {
        uid: "uid-ada".to_string(),
        email: Some(ADA_EMAIL.to_string()),
    }
}

pub fn grace() -> IdentityUser {
    IdentityUser {
        uid: "uid-grace".to_string(),
        email: Some(GRACE_EMAIL.to_string()),
    }
}

pub fn notification(id: &str, is_read: bool) -> NotificationRecord {
    let created_at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let mut record = NotificationRecord::new(id, is_read, created_at);
    record
        .payload
        .insert("message".into(), format!("Report {} needs review", id).into());
    record
}

pub fn assert_unread_invariant(snapshot: &SessionSnapshot) {
    let unread = snapshot.notifications.iter().filter(|n| !n.is_read).count();
    assert_eq!(snapshot.unread_count, unread, "unread count out of sync");
}

// ===== Identity =====

pub struct FakeIdentity {
    enabled: bool,
    init_error: Option<IdentityError>,
    accounts: HashMap<String, (String, IdentityUser)>,
    current: Mutex<Option<IdentityUser>>,
    events: broadcast::Sender<IdentityEvent>,
    init_calls: AtomicUsize,
}

impl FakeIdentity {
    pub fn new() -> Self {
        let mut accounts = HashMap::new();
        accounts.insert(ADA_EMAIL.to_string(), (ADA_PASSWORD.to_string(), ada()));
        accounts.insert(GRACE_EMAIL.to_string(), (GRACE_PASSWORD.to_string(), grace()));
        let (events, _) = broadcast::channel(64);
        Self {
            enabled: true,
            init_error: None,
            accounts,
            current: Mutex::new(None),
            events,
            init_calls: AtomicUsize::new(0),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    pub fn failing(error: IdentityError) -> Self {
        Self {
            init_error: Some(error),
            ..Self::new()
        }
    }

    /// A provider that restored a persisted session during initialize.
    pub fn restored(user: IdentityUser) -> Self {
        let identity = Self::new();
        *identity.current.lock().unwrap() = Some(user);
        identity
    }

    /// Sign-in observed from outside this client (another tab, a restore).
    pub fn emit_signed_in(&self, user: IdentityUser) {
        *self.current.lock().unwrap() = Some(user.clone());
        let _ = self.events.send(IdentityEvent::SignedIn(user));
    }

    /// Sign-out not initiated by this client, such as a revoked session.
    pub fn emit_signed_out(&self) {
        *self.current.lock().unwrap() = None;
        let _ = self.events.send(IdentityEvent::SignedOut);
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn initialize(&self) -> Result<(), IdentityError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        match &self.init_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<IdentityEvent> {
        self.events.subscribe()
    }

    fn current_user(&self) -> Option<IdentityUser> {
        self.current.lock().unwrap().clone()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<IdentityUser, IdentityError> {
        match self.accounts.get(email) {
            Some((expected, user)) if expected == password => {
                self.emit_signed_in(user.clone());
                Ok(user.clone())
            }
            _ => Err(IdentityError::InvalidCredentials(
                "INVALID_LOGIN_CREDENTIALS".to_string(),
            )),
        }
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        let had_session = self.current.lock().unwrap().take().is_some();
        if had_session {
            let _ = self.events.send(IdentityEvent::SignedOut);
        }
        Ok(())
    }

    async fn id_token(&self) -> Result<String, IdentityError> {
        match self.current.lock().unwrap().as_ref() {
            Some(user) => Ok(format!("token-{}", user.uid)),
            None => Err(IdentityError::NotSignedIn),
        }
    }
}

// ===== Backend =====

/// Blocks a backend call until released.
#[derive(Clone, Default)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

#[derive(Default)]
pub struct FakeBackend {
    profiles: Mutex<HashMap<String, Profile>>,
    /// Server-side notification lists keyed by uid.
    notifications: Mutex<HashMap<String, Vec<NotificationRecord>>>,
    calls: Mutex<Vec<String>>,
    profile_gate: Mutex<Option<Gate>>,
    fail_profile: AtomicBool,
    fail_list: AtomicBool,
    fail_ack: AtomicBool,
}

impl FakeBackend {
    pub fn new() -> Self {
        let backend = Self::default();
        backend.set_profile(
            &ada(),
            Profile {
                id: "user-ada".to_string(),
                name: "Ada".to_string(),
                email: ADA_EMAIL.to_string(),
                role: Role::Admin,
            },
        );
        backend.set_profile(
            &grace(),
            Profile {
                id: "user-grace".to_string(),
                name: "Grace".to_string(),
                email: GRACE_EMAIL.to_string(),
                role: Role::Engineer,
            },
        );
        backend
    }

    pub fn set_profile(&self, user: &IdentityUser, profile: Profile) {
        self.profiles
            .lock()
            .unwrap()
            .insert(user.uid.clone(), profile);
    }

    pub fn set_notifications(&self, user: &IdentityUser, records: Vec<NotificationRecord>) {
        self.notifications
            .lock()
            .unwrap()
            .insert(user.uid.clone(), records);
    }

    /// Hold the next profile fetches until the gate is released.
    pub fn hold_profile(&self) -> Gate {
        let gate = Gate::default();
        *self.profile_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn fail_profile(&self, fail: bool) {
        self.fail_profile.store(fail, Ordering::SeqCst);
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_ack(&self, fail: bool) {
        self.fail_ack.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn uid(token: &str) -> Result<String, GatewayError> {
        token
            .strip_prefix("token-")
            .map(str::to_string)
            .ok_or_else(|| GatewayError::Api {
                status: 401,
                message: "Unauthorized".to_string(),
            })
    }

    fn network_error() -> GatewayError {
        GatewayError::Network("connection refused".to_string())
    }
}

#[async_trait]
impl BackendGateway for FakeBackend {
    async fn fetch_profile(&self, token: &str) -> Result<Profile, GatewayError> {
        let uid = Self::uid(token)?;
        self.record(format!("GET /auth/me {}", uid));

        let gate = self.profile_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.record(format!("GET /auth/me {} done", uid));

        if self.fail_profile.load(Ordering::SeqCst) {
            return Err(Self::network_error());
        }
        self.profiles
            .lock()
            .unwrap()
            .get(&uid)
            .cloned()
            .ok_or_else(|| GatewayError::Api {
                status: 404,
                message: "User not found".to_string(),
            })
    }

    async fn list_notifications(
        &self,
        token: &str,
    ) -> Result<Vec<NotificationRecord>, GatewayError> {
        let uid = Self::uid(token)?;
        self.record(format!("GET /notifications {}", uid));
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Self::network_error());
        }
        Ok(self
            .notifications
            .lock()
            .unwrap()
            .get(&uid)
            .cloned()
            .unwrap_or_default())
    }

    async fn mark_notification_read(&self, token: &str, id: &str) -> Result<(), GatewayError> {
        let uid = Self::uid(token)?;
        self.record(format!("PATCH /notifications/{}/read {}", id, uid));
        if self.fail_ack.load(Ordering::SeqCst) {
            return Err(Self::network_error());
        }
        if let Some(records) = self.notifications.lock().unwrap().get_mut(&uid) {
            for record in records.iter_mut().filter(|r| r.id == id) {
                record.is_read = true;
            }
        }
        Ok(())
    }

    async fn mark_all_notifications_read(&self, token: &str) -> Result<(), GatewayError> {
        let uid = Self::uid(token)?;
        self.record(format!("POST /notifications/read-all {}", uid));
        if self.fail_ack.load(Ordering::SeqCst) {
            return Err(Self::network_error());
        }
        if let Some(records) = self.notifications.lock().unwrap().get_mut(&uid) {
            for record in records.iter_mut() {
                record.is_read = true;
            }
        }
        Ok(())
    }
}

// ===== Realtime =====

#[derive(Default)]
pub struct FakeConnector {
    opened: AtomicUsize,
    live: Arc<AtomicUsize>,
    joins: Arc<Mutex<Vec<String>>>,
    senders: Mutex<Vec<mpsc::Sender<NotificationRecord>>>,
    fail: AtomicBool,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Channels opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Channels opened and not yet disconnected.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn joins(&self) -> Vec<String> {
        self.joins.lock().unwrap().clone()
    }

    /// Push a notification on the most recently opened channel.
    pub async fn push(&self, record: NotificationRecord) {
        let sender = self.senders.lock().unwrap().last().cloned();
        if let Some(sender) = sender {
            let _ = sender.send(record).await;
        }
    }

    /// Push on a specific channel, counted from the first one opened.
    pub async fn push_on(&self, channel: usize, record: NotificationRecord) {
        let sender = self.senders.lock().unwrap().get(channel).cloned();
        if let Some(sender) = sender {
            let _ = sender.send(record).await;
        }
    }
}

#[async_trait]
impl RealtimeConnector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn ChannelHandle>, ChannelError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChannelError::Connection("connection refused".to_string()));
        }
        let (sender, receiver) = mpsc::channel(16);
        self.senders.lock().unwrap().push(sender);
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeChannel {
            live: self.live.clone(),
            joins: self.joins.clone(),
            receiver: Some(receiver),
            closed: false,
        }))
    }
}

/// Deliberately has no `Drop` impl so leaked channels stay counted.
struct FakeChannel {
    live: Arc<AtomicUsize>,
    joins: Arc<Mutex<Vec<String>>>,
    receiver: Option<mpsc::Receiver<NotificationRecord>>,
    closed: bool,
}

#[async_trait]
impl ChannelHandle for FakeChannel {
    async fn join(&mut self, uid: &str) -> Result<(), ChannelError> {
        self.joins.lock().unwrap().push(uid.to_string());
        Ok(())
    }

    fn take_notifications(&mut self) -> Option<mpsc::Receiver<NotificationRecord>> {
        self.receiver.take()
    }

    async fn disconnect(&mut self) {
        if !self.closed {
            self.closed = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

// ===== Harness =====

pub struct TestHarness {
    pub identity: Arc<FakeIdentity>,
    pub backend: Arc<FakeBackend>,
    pub connector: Arc<FakeConnector>,
    pub manager: SessionManager,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_identity(FakeIdentity::new())
    }

    pub fn with_identity(identity: FakeIdentity) -> Self {
        let identity = Arc::new(identity);
        let backend = Arc::new(FakeBackend::new());
        let connector = Arc::new(FakeConnector::new());
        let manager = SessionManager::with_options(
            identity.clone(),
            backend.clone(),
            connector.clone(),
            SessionOptions {
                settle_timeout: Duration::from_secs(5),
            },
        );
        Self {
            identity,
            backend,
            connector,
            manager,
        }
    }

    /// Harness whose manager has already been initialized.
    pub async fn started() -> Self {
        let harness = Self::new();
        harness.manager.init().await;
        harness
    }

    /// Initialized harness with Ada signed in and synchronized.
    pub async fn signed_in() -> Self {
        let harness = Self::started().await;
        harness
            .manager
            .login(ADA_EMAIL, ADA_PASSWORD)
            .await
            .expect("login should succeed");
        harness
    }

    /// Wait up to 5s for a snapshot matching `condition`.
    pub async fn wait_for(
        &self,
        mut condition: impl FnMut(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        let mut updates = self.manager.subscribe();
        let wait = async {
            updates
                .wait_for(|s| condition(s))
                .await
                .map(|s| s.clone())
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("condition not met within 5s")
            .expect("session dropped")
    }

    pub async fn wait_until_signed_out(&self) -> SessionSnapshot {
        let snapshot = self
            .wait_for(|s| s.identity.is_none() && !s.loading && !s.channel_open)
            .await;
        wait_until(|| self.connector.live() == 0).await;
        snapshot
    }
}

/// Poll `condition` every 10ms for up to 5s.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Let spawned tasks run to their next await point.
pub async fn settle_tasks() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}
