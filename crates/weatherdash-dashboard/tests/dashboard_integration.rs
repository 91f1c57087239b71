//! End-to-end dashboard tests: real fetch services against a wiremock
//! upstream, driven through the render loop.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use weatherdash_auth::{MemoryPreferenceStore, PreferenceStore, Session, User, UserId};
use weatherdash_core::Interval;
use weatherdash_dashboard::{Dashboard, Fetchers, PanelKind, PanelSnapshot, PanelState};
use weatherdash_weather::{default_cities, OpenWeatherClient, ProxyClient, RetryConfig};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn city(id: u64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "main": { "temp": 4.2, "humidity": 70 },
        "weather": [{ "description": "overcast clouds" }],
        "dt": 1738591200
    })
}

async fn mount_direct(server: &MockServer, id: &str, body: Value, delay: Duration) {
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("id", id))
        .respond_with(ResponseTemplate::new(200).set_body_json(body).set_delay(delay))
        .mount(server)
        .await;
}

struct Harness {
    store: Arc<MemoryPreferenceStore>,
    dashboard: Arc<Dashboard>,
    shutdown: broadcast::Sender<()>,
    render: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl Harness {
    fn start(upstream: &MockServer, proxy: &MockServer) -> Self {
        let session = Arc::new(Session::signed_in(User::new("u1", "Ada")));
        let store = Arc::new(MemoryPreferenceStore::new());
        let direct = OpenWeatherClient::new(&upstream.uri(), None, Duration::from_secs(5))
            .unwrap()
            .with_retry(RetryConfig::none());
        let via_proxy = ProxyClient::new(&proxy.uri(), Duration::from_secs(5)).unwrap();

        let dashboard = Arc::new(Dashboard::new(
            session,
            store.clone(),
            Fetchers {
                client: Arc::new(direct),
                server: Arc::new(via_proxy),
            },
            default_cities(),
            Handle::current(),
        ));

        let (shutdown, rx) = broadcast::channel(1);
        let looped = dashboard.clone();
        let render = tokio::spawn(async move { looped.run(rx).await });

        Self {
            store,
            dashboard,
            shutdown,
            render,
        }
    }

    async fn stop(self) {
        self.shutdown.send(()).unwrap();
        self.render.await.unwrap().unwrap();
    }
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
async fn test_both_panels_load_their_selection() {
    let upstream = MockServer::start().await;
    let proxy = MockServer::start().await;

    mount_direct(&upstream, "2643743", city(2643743, "London"), Duration::ZERO).await;
    Mock::given(method("GET"))
        .and(path("/weather/2172797"))
        .respond_with(ResponseTemplate::new(200).set_body_json(city(2172797, "Cairns")))
        .expect(1)
        .mount(&proxy)
        .await;

    let h = Harness::start(&upstream, &proxy);
    h.dashboard.select_city(PanelKind::Client, "2643743");
    h.dashboard.select_city(PanelKind::Server, "2172797");

    let client = wait_for(h.dashboard.panel(PanelKind::Client), |s| s.data.is_some()).await;
    let server = wait_for(h.dashboard.panel(PanelKind::Server), |s| s.data.is_some()).await;
    assert_eq!(client.data.unwrap()["name"], "London");
    assert_eq!(server.data.unwrap()["name"], "Cairns");

    h.stop().await;
}

#[tokio::test]
async fn test_slow_response_for_old_selection_is_discarded() {
    let upstream = MockServer::start().await;
    let proxy = MockServer::start().await;

    mount_direct(
        &upstream,
        "524901",
        city(524901, "Moscow"),
        Duration::from_millis(400),
    )
    .await;
    mount_direct(&upstream, "703448", city(703448, "Kiev"), Duration::ZERO).await;

    let h = Harness::start(&upstream, &proxy);
    let panel = h.dashboard.panel(PanelKind::Client).clone();

    h.dashboard.select_city(PanelKind::Client, "524901");
    wait_for(&panel, |s| s.loading).await;
    h.dashboard.select_city(PanelKind::Client, "703448");

    let snapshot = wait_for(&panel, |s| s.data.is_some()).await;
    assert_eq!(snapshot.data.unwrap()["name"], "Kiev");

    // let the Moscow response arrive; it must not replace Kiev
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(panel.data().unwrap()["name"], "Kiev");
    assert!(!panel.is_loading());

    h.stop().await;
}

#[tokio::test]
async fn test_failed_refresh_keeps_last_data() {
    let upstream = MockServer::start().await;
    let proxy = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/weather/703448"))
        .respond_with(ResponseTemplate::new(200).set_body_json(city(703448, "Kiev")))
        .up_to_n_times(1)
        .mount(&proxy)
        .await;
    Mock::given(method("GET"))
        .and(path("/weather/703448"))
        .respond_with(
            ResponseTemplate::new(502).set_body_json(json!({ "error": "upstream unreachable" })),
        )
        .mount(&proxy)
        .await;

    let h = Harness::start(&upstream, &proxy);
    let panel = h.dashboard.panel(PanelKind::Server).clone();

    h.dashboard.select_city(PanelKind::Server, "703448");
    wait_for(&panel, |s| s.data.is_some()).await;

    h.dashboard.refresh_panel(PanelKind::Server);
    let snapshot = wait_for(&panel, |s| s.error.is_some()).await;
    assert!(snapshot.is_stale());
    assert_eq!(snapshot.data.unwrap()["name"], "Kiev");
    assert!(snapshot.error.unwrap().contains("upstream unreachable"));

    h.stop().await;
}

#[tokio::test]
async fn test_interval_change_refetches_and_is_stored() {
    let upstream = MockServer::start().await;
    let proxy = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(city(2643743, "London")))
        .expect(2)
        .mount(&upstream)
        .await;

    let h = Harness::start(&upstream, &proxy);
    let panel = h.dashboard.panel(PanelKind::Client).clone();

    h.dashboard.select_city(PanelKind::Client, "2643743");
    wait_for(&panel, |s| s.data.is_some() && !s.loading).await;

    // five minutes: only the immediate refresh happens within the test
    let five_minutes = Interval::every_ms(300_000).unwrap();
    assert!(h.dashboard.change_interval(five_minutes).unwrap());
    wait_for(&panel, |s| !s.dirty && !s.loading).await;
    assert_eq!(h.store.get_interval(&UserId::new("u1")), five_minutes);

    h.stop().await;
    upstream.verify().await;
}
