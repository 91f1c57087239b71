//! The dashboard: two panels, the poller that refreshes them, and the render
//! loop that turns dirty flags into fetches.

use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use weatherdash_auth::{AuthContext, PreferenceStore};
use weatherdash_core::{AppError, CityConfig, Interval};
use weatherdash_weather::{City, CityId, FetchService, WeatherSummary};

use crate::panel::{PanelKind, PanelSnapshot, PanelState};
use crate::poller::{Generation, PollController};
use crate::services::{request_weather_fetch, WeatherServiceMessage};

/// The fetch path used by each panel.
#[derive(Clone)]
pub struct Fetchers {
    /// Direct weather API lookups
    pub client: Arc<dyn FetchService>,
    /// Lookups through the proxy
    pub server: Arc<dyn FetchService>,
}

impl Fetchers {
    fn for_panel(&self, kind: PanelKind) -> Arc<dyn FetchService> {
        match kind {
            PanelKind::Client => self.client.clone(),
            PanelKind::Server => self.server.clone(),
        }
    }
}

/// Convert the configured city list.
pub fn cities_from_config(cities: &[CityConfig]) -> Vec<City> {
    cities
        .iter()
        .map(|c| City::new(c.id.as_str(), c.name.clone()))
        .collect()
}

pub struct Dashboard {
    client: Arc<PanelState>,
    server: Arc<PanelState>,
    poller: PollController,
    auth: Arc<dyn AuthContext>,
    preferences: Arc<dyn PreferenceStore>,
    fetchers: Fetchers,
    cities: Vec<City>,
    runtime: Handle,
    tx: mpsc::UnboundedSender<WeatherServiceMessage>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<WeatherServiceMessage>>>,
}

impl Dashboard {
    pub fn new(
        auth: Arc<dyn AuthContext>,
        preferences: Arc<dyn PreferenceStore>,
        fetchers: Fetchers,
        cities: Vec<City>,
        runtime: Handle,
    ) -> Self {
        let client = Arc::new(PanelState::new(PanelKind::Client));
        let server = Arc::new(PanelState::new(PanelKind::Server));
        let poller = PollController::new(
            auth.clone(),
            vec![client.clone(), server.clone()],
            runtime.clone(),
        );
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            client,
            server,
            poller,
            auth,
            preferences,
            fetchers,
            cities,
            runtime,
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Start polling with the signed-in user's stored interval.
    pub fn start(&self) -> Option<Generation> {
        let Some(user) = self.auth.current_user() else {
            tracing::info!("Dashboard started without a signed-in user; polling disabled");
            return None;
        };
        let interval = self.preferences.get_interval(&user);
        tracing::info!("Dashboard started for {} with interval {}", user, interval);
        self.poller.reconfigure(interval)
    }

    /// Manual refresh of one panel.
    pub fn refresh_panel(&self, kind: PanelKind) {
        self.panel(kind).mark_dirty();
    }

    pub fn select_city(&self, kind: PanelKind, id: impl Into<CityId>) {
        let id = id.into();
        if !self.cities.iter().any(|c| c.id == id) {
            tracing::debug!("{} panel selected unlisted city {}", kind, id);
        }
        let panel = self.panel(kind);
        panel.set_selected_id(id);
        panel.mark_dirty();
    }

    /// Apply and store a new refresh interval.
    ///
    /// Returns `Ok(false)` without touching anything when no user is signed
    /// in. The new schedule takes effect before it is persisted, so a storage
    /// failure is reported but does not undo it.
    pub fn change_interval(&self, interval: Interval) -> Result<bool, AppError> {
        let Some(user) = self.auth.current_user() else {
            tracing::warn!("Interval change to {} rejected: not signed in", interval);
            return Ok(false);
        };
        if self.poller.reconfigure(interval).is_none() {
            return Ok(false);
        }

        self.preferences
            .set_interval(&user, interval)
            .map_err(|e| AppError::Auth(e.into()))?;
        Ok(true)
    }

    pub fn panel(&self, kind: PanelKind) -> &Arc<PanelState> {
        match kind {
            PanelKind::Client => &self.client,
            PanelKind::Server => &self.server,
        }
    }

    pub fn snapshot(&self, kind: PanelKind) -> PanelSnapshot {
        self.panel(kind).snapshot()
    }

    /// Whether `id` is the selected city of panel `kind` (highlighted button).
    pub fn is_selected(&self, kind: PanelKind, id: &CityId) -> bool {
        self.panel(kind).selected_id().as_ref() == Some(id)
    }

    pub fn cities(&self) -> &[City] {
        &self.cities
    }

    pub fn interval(&self) -> Interval {
        self.poller.interval()
    }

    pub fn poller(&self) -> &PollController {
        &self.poller
    }

    /// Issue a fetch if the panel is dirty.
    fn render(&self, kind: PanelKind) {
        if let Some(ticket) = self.panel(kind).begin_fetch() {
            request_weather_fetch(&self.tx, &self.runtime, self.fetchers.for_panel(kind), ticket);
        }
    }

    fn handle_message(&self, msg: WeatherServiceMessage) {
        match msg {
            WeatherServiceMessage::FetchDone { ticket, result } => {
                let kind = ticket.panel();
                let line = match &result {
                    Ok(value) => WeatherSummary::from_value(value).map(|s| s.headline()),
                    Err(e) => {
                        let app: AppError = e.clone().into();
                        tracing::warn!("{} panel: {} ({})", kind, app.user_message(), e);
                        None
                    }
                };
                if self.panel(kind).complete_fetch(ticket, result) {
                    if let Some(line) = line {
                        tracing::info!("{} panel: {}", kind, line);
                    }
                }
            }
        }
    }

    /// Render loop. Watches both panels, issues fetches for dirty ones and
    /// stores their results, until `shutdown` fires. Polling stops on exit.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let mut rx = self
            .rx
            .lock()
            .take()
            .ok_or_else(|| anyhow!("Dashboard render loop is already running"))?;
        let mut client_changes = self.client.subscribe();
        let mut server_changes = self.server.subscribe();

        for kind in PanelKind::ALL {
            self.render(kind);
        }

        let result: anyhow::Result<()> = loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Dashboard render loop stopping");
                    break Ok(());
                }
                changed = client_changes.changed() => {
                    if let Err(e) = changed {
                        break Err(e.into());
                    }
                    self.render(PanelKind::Client);
                }
                changed = server_changes.changed() => {
                    if let Err(e) = changed {
                        break Err(e.into());
                    }
                    self.render(PanelKind::Server);
                }
                Some(msg) = rx.recv() => self.handle_message(msg),
            }
        };

        self.poller.stop();
        *self.rx.lock() = Some(rx);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use weatherdash_auth::{MemoryPreferenceStore, PreferenceError, Session, User, UserId};
    use weatherdash_weather::WeatherError as FetchError;

    #[derive(Default)]
    struct Echo {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FetchService for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn fetch(&self, id: &CityId) -> Result<Value, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "name": id.as_str(), "main": { "temp": 1.5 } }))
        }
    }

    /// Takes 1.5 s per lookup and records how many lookups overlap.
    #[derive(Default)]
    struct Slow {
        calls: AtomicUsize,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl FetchService for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn fetch(&self, id: &CityId) -> Result<Value, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(1_500)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(json!({ "name": id.as_str() }))
        }
    }

    struct BrokenStore;

    impl PreferenceStore for BrokenStore {
        fn get_interval(&self, _user: &UserId) -> Interval {
            Interval::Manual
        }

        fn set_interval(&self, _user: &UserId, _interval: Interval) -> Result<(), PreferenceError> {
            Err(PreferenceError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }
    }

    struct Fixture {
        session: Arc<Session>,
        store: Arc<MemoryPreferenceStore>,
        client: Arc<Echo>,
        server: Arc<Echo>,
        dashboard: Arc<Dashboard>,
    }

    fn fixture(signed_in: bool) -> Fixture {
        let session = Arc::new(if signed_in {
            Session::signed_in(User::new("u1", "Ada"))
        } else {
            Session::new()
        });
        let store = Arc::new(MemoryPreferenceStore::new());
        let client = Arc::new(Echo::default());
        let server = Arc::new(Echo::default());
        let dashboard = Arc::new(Dashboard::new(
            session.clone(),
            store.clone(),
            Fetchers {
                client: client.clone(),
                server: server.clone(),
            },
            weatherdash_weather::default_cities(),
            Handle::current(),
        ));
        Fixture {
            session,
            store,
            client,
            server,
            dashboard,
        }
    }

    fn every(ms: u64) -> Interval {
        Interval::every_ms(ms).unwrap()
    }

    async fn wait_for(panel: &PanelState, pred: impl Fn(&PanelSnapshot) -> bool) -> PanelSnapshot {
        let mut changes = panel.subscribe();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let snapshot = panel.snapshot();
                if pred(&snapshot) {
                    return snapshot;
                }
                changes.changed().await.unwrap();
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_select_city_marks_dirty_and_highlights() {
        let f = fixture(true);
        let london = CityId::from("2643743");
        f.dashboard.select_city(PanelKind::Client, london.clone());

        assert!(f.dashboard.is_selected(PanelKind::Client, &london));
        assert!(!f.dashboard.is_selected(PanelKind::Server, &london));
        assert!(f.dashboard.panel(PanelKind::Client).is_dirty());
        assert!(!f.dashboard.panel(PanelKind::Server).is_dirty());
    }

    #[tokio::test]
    async fn test_refresh_panel_marks_only_that_panel() {
        let f = fixture(false);
        f.dashboard.refresh_panel(PanelKind::Server);
        assert!(f.dashboard.snapshot(PanelKind::Server).dirty);
        assert!(!f.dashboard.snapshot(PanelKind::Client).dirty);
    }

    #[tokio::test]
    async fn test_change_interval_requires_sign_in() {
        let f = fixture(false);
        assert!(!f.dashboard.change_interval(every(5_000)).unwrap());
        assert_eq!(f.dashboard.interval(), Interval::Manual);
        assert!(!f.dashboard.panel(PanelKind::Client).is_dirty());
        assert_eq!(f.store.get_interval(&UserId::new("u1")), Interval::Manual);
    }

    #[tokio::test]
    async fn test_change_interval_persists_and_refreshes() {
        let f = fixture(true);
        assert!(f.dashboard.change_interval(every(30_000)).unwrap());

        assert_eq!(f.dashboard.interval(), every(30_000));
        assert!(f.dashboard.poller().is_running());
        assert_eq!(f.store.get_interval(&UserId::new("u1")), every(30_000));
        for kind in PanelKind::ALL {
            assert!(f.dashboard.panel(kind).is_dirty());
        }
    }

    #[tokio::test]
    async fn test_change_interval_storage_failure_keeps_schedule() {
        let session = Arc::new(Session::signed_in(User::new("u1", "Ada")));
        let echo = Arc::new(Echo::default());
        let dashboard = Dashboard::new(
            session,
            Arc::new(BrokenStore),
            Fetchers {
                client: echo.clone(),
                server: echo,
            },
            Vec::new(),
            Handle::current(),
        );

        let err = dashboard.change_interval(every(60_000)).unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
        assert_eq!(dashboard.interval(), every(60_000));
    }

    #[tokio::test]
    async fn test_change_interval_after_sign_out_is_rejected() {
        let f = fixture(true);
        f.dashboard.start().unwrap();
        f.session.sign_out();

        assert!(!f.dashboard.change_interval(every(5_000)).unwrap());
        assert_eq!(f.dashboard.interval(), Interval::Manual);
        assert_eq!(f.store.get_interval(&UserId::new("u1")), Interval::Manual);
    }

    #[tokio::test]
    async fn test_start_uses_stored_preference() {
        let f = fixture(true);
        f.store
            .set_interval(&UserId::new("u1"), every(15_000))
            .unwrap();

        assert!(f.dashboard.start().is_some());
        assert_eq!(f.dashboard.interval(), every(15_000));
    }

    #[tokio::test]
    async fn test_start_defaults_to_manual() {
        let f = fixture(true);
        assert!(f.dashboard.start().is_some());
        assert_eq!(f.dashboard.interval(), Interval::Manual);
        assert!(!f.dashboard.poller().is_running());
    }

    #[tokio::test]
    async fn test_start_signed_out_does_nothing() {
        let f = fixture(false);
        assert!(f.dashboard.start().is_none());
        assert!(f.dashboard.poller().active_generation().is_none());
    }

    #[tokio::test]
    async fn test_run_fetches_dirty_panels() {
        let f = fixture(true);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let dashboard = f.dashboard.clone();
        let handle = tokio::spawn(async move { dashboard.run(shutdown_rx).await });

        f.dashboard.select_city(PanelKind::Client, "524901");
        f.dashboard.select_city(PanelKind::Server, "703448");

        let client = wait_for(f.dashboard.panel(PanelKind::Client), |s| s.data.is_some()).await;
        let server = wait_for(f.dashboard.panel(PanelKind::Server), |s| s.data.is_some()).await;
        assert_eq!(client.data.unwrap()["name"], "524901");
        assert_eq!(server.data.unwrap()["name"], "703448");
        assert!(!client.dirty && !client.loading);

        // a refresh with no change in selection fetches again
        f.dashboard.refresh_panel(PanelKind::Client);
        wait_for(f.dashboard.panel(PanelKind::Client), |s| !s.dirty && !s.loading).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while f.client.calls.load(Ordering::SeqCst) < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(f.server.calls.load(Ordering::SeqCst), 1);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert!(f.dashboard.poller().active_generation().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_slower_than_interval_still_lands() {
        let session = Arc::new(Session::signed_in(User::new("u1", "Ada")));
        let client = Arc::new(Slow::default());
        let server = Arc::new(Slow::default());
        let dashboard = Arc::new(Dashboard::new(
            session,
            Arc::new(MemoryPreferenceStore::new()),
            Fetchers {
                client: client.clone(),
                server: server.clone(),
            },
            weatherdash_weather::default_cities(),
            Handle::current(),
        ));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = {
            let dashboard = dashboard.clone();
            tokio::spawn(async move { dashboard.run(shutdown_rx).await })
        };

        dashboard.select_city(PanelKind::Client, "524901");
        dashboard.select_city(PanelKind::Server, "2172797");
        assert!(dashboard.change_interval(every(1_000)).unwrap());

        tokio::time::sleep(Duration::from_secs(20)).await;

        for (kind, fetcher, city) in [
            (PanelKind::Client, &client, "524901"),
            (PanelKind::Server, &server, "2172797"),
        ] {
            let snapshot = dashboard.snapshot(kind);
            assert_eq!(snapshot.data, Some(json!({ "name": city })), "{kind} panel");
            assert_eq!(fetcher.peak.load(Ordering::SeqCst), 1, "{kind} panel overlapped");
            let calls = fetcher.calls.load(Ordering::SeqCst);
            // back to back: one lookup every 1.5 s, never one per tick
            assert!((5..=14).contains(&calls), "{kind} panel made {calls} lookups");
        }

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_city_change_supersedes_slow_fetch() {
        let session = Arc::new(Session::signed_in(User::new("u1", "Ada")));
        let slow = Arc::new(Slow::default());
        let dashboard = Arc::new(Dashboard::new(
            session,
            Arc::new(MemoryPreferenceStore::new()),
            Fetchers {
                client: slow.clone(),
                server: Arc::new(Echo::default()),
            },
            weatherdash_weather::default_cities(),
            Handle::current(),
        ));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = {
            let dashboard = dashboard.clone();
            tokio::spawn(async move { dashboard.run(shutdown_rx).await })
        };

        dashboard.select_city(PanelKind::Client, "524901");
        tokio::time::sleep(Duration::from_millis(500)).await;
        dashboard.select_city(PanelKind::Client, "2643743");

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(slow.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            dashboard.snapshot(PanelKind::Client).data,
            Some(json!({ "name": "2643743" }))
        );

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_run_twice_concurrently_fails() {
        let f = fixture(true);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let dashboard = f.dashboard.clone();
        let first = tokio::spawn(async move { dashboard.run(shutdown_rx).await });
        tokio::task::yield_now().await;

        let second = f.dashboard.run(shutdown_tx.subscribe()).await;
        assert!(second.is_err());

        shutdown_tx.send(()).unwrap();
        first.await.unwrap().unwrap();
    }

    #[test]
    fn test_cities_from_config() {
        let cities = cities_from_config(&weatherdash_core::DashboardConfig::default().cities);
        assert_eq!(cities, weatherdash_weather::default_cities());
    }
}
