//! Tests for the scheduler's adapter pool against live adapter fixtures

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::Method;
use axum::middleware::{self, Next};
use drainscale::adapter::server::ApiState;
use drainscale::adapter::{
    Balancer, BindingApiServer, BindingStore, ClientManager, ClientManagerOptions, Connector,
    DialOpts, SubscriptionManager,
};
use drainscale::bindings::{AppBinding, AppBindings, Binding};
use drainscale::metrics::Metrics;
use drainscale::scheduler::orchestrator::{AdapterPool, BindingReader, Orchestrator};
use drainscale::scheduler::pool::PoolError;
use drainscale::scheduler::reader::FetchError;
use drainscale::scheduler::HttpAdapterPool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct AdapterFixture {
    addr: String,
    store: Arc<BindingStore>,
    /// POST and DELETE requests observed by this adapter
    mutations: Arc<AtomicUsize>,
}

async fn spawn_adapter() -> AdapterFixture {
    let metrics = Arc::new(Metrics::new());
    let connector = Connector::new(Balancer::new(vec![]), DialOpts::default(), Arc::clone(&metrics));
    let clients = Arc::new(
        ClientManager::new(
            connector,
            1,
            Duration::from_secs(60),
            ClientManagerOptions {
                retry_wait: Duration::from_secs(60),
            },
            Arc::clone(&metrics),
        )
        .unwrap(),
    );
    let subscriptions = Arc::new(SubscriptionManager::new(
        clients,
        "test-shard".to_string(),
        Duration::from_secs(60),
        metrics,
    ));
    let store = Arc::new(BindingStore::new());

    let mutations = Arc::new(AtomicUsize::new(0));
    let counting = {
        let mutations = Arc::clone(&mutations);
        middleware::from_fn(move |req: Request, next: Next| {
            let mutations = Arc::clone(&mutations);
            async move {
                if req.method() != Method::GET {
                    mutations.fetch_add(1, Ordering::SeqCst);
                }
                next.run(req).await
            }
        })
    };

    let app = BindingApiServer::router(ApiState {
        store: Arc::clone(&store),
        subscriptions,
    })
    .layer(counting);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    AdapterFixture {
        addr: addr.to_string(),
        store,
        mutations,
    }
}

fn pool(adapters: Vec<String>, replication_factor: usize) -> HttpAdapterPool {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    HttpAdapterPool::new(
        client,
        adapters,
        replication_factor,
        false,
        Arc::new(Metrics::new()),
    )
}

fn binding(drain: &str) -> Binding {
    Binding {
        hostname: "org.space.app".to_string(),
        app_id: "app-guid".to_string(),
        drain: drain.to_string(),
    }
}

#[tokio::test]
async fn test_create_prefers_least_loaded_adapter() {
    let first = spawn_adapter().await;
    let second = spawn_adapter().await;

    first.store.add(binding("syslog://existing.example.com"));

    let pool = pool(vec![first.addr.clone(), second.addr.clone()], 1);
    pool.list().await.unwrap();

    pool.create(&binding("syslog://new.example.com")).await.unwrap();

    assert!(second.store.list().contains(&binding("syslog://new.example.com")));
    assert!(!first.store.list().contains(&binding("syslog://new.example.com")));
}

#[tokio::test]
async fn test_duplicate_create_issues_no_rpc() {
    let adapter = spawn_adapter().await;

    let pool = pool(vec![adapter.addr.clone()], 1);
    pool.list().await.unwrap();

    pool.create(&binding("syslog://a.example.com")).await.unwrap();
    assert_eq!(adapter.mutations.load(Ordering::SeqCst), 1);

    pool.create(&binding("syslog://a.example.com")).await.unwrap();
    assert_eq!(adapter.mutations.load(Ordering::SeqCst), 1);
    assert_eq!(adapter.store.len(), 1);
}

#[tokio::test]
async fn test_replicates_to_enough_adapters() {
    let first = spawn_adapter().await;
    let second = spawn_adapter().await;

    let pool = pool(vec![first.addr.clone(), second.addr.clone()], 2);
    pool.list().await.unwrap();

    pool.create(&binding("syslog://a.example.com")).await.unwrap();

    assert!(first.store.list().contains(&binding("syslog://a.example.com")));
    assert!(second.store.list().contains(&binding("syslog://a.example.com")));
}

#[tokio::test]
async fn test_delete_removes_from_every_holder() {
    let first = spawn_adapter().await;
    let second = spawn_adapter().await;

    let pool = pool(vec![first.addr.clone(), second.addr.clone()], 2);
    pool.list().await.unwrap();
    pool.create(&binding("syslog://a.example.com")).await.unwrap();

    pool.delete(&binding("syslog://a.example.com")).await.unwrap();
    assert!(first.store.is_empty());
    assert!(second.store.is_empty());

    // deleting a binding nobody holds succeeds
    pool.delete(&binding("syslog://a.example.com")).await.unwrap();
}

#[tokio::test]
async fn test_create_then_delete_leaves_list_unchanged() {
    let adapter = spawn_adapter().await;

    let pool = pool(vec![adapter.addr.clone()], 1);
    let before = pool.list().await.unwrap();

    pool.create(&binding("syslog://a.example.com")).await.unwrap();
    pool.delete(&binding("syslog://a.example.com")).await.unwrap();

    assert_eq!(pool.list().await.unwrap(), before);
}

#[tokio::test]
async fn test_list_tolerates_partial_failure() {
    let adapter = spawn_adapter().await;
    adapter.store.add(binding("syslog://a.example.com"));

    // discard port, nothing listens there
    let pool = pool(vec![adapter.addr.clone(), "127.0.0.1:9".to_string()], 1);

    let listed = pool.list().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0], vec![binding("syslog://a.example.com")]);
    assert!(listed[1].is_empty());
}

#[tokio::test]
async fn test_list_fails_when_every_adapter_fails() {
    let pool = pool(vec!["127.0.0.1:9".to_string()], 1);
    assert!(matches!(pool.list().await, Err(PoolError::ListFailed)));
}

#[tokio::test]
async fn test_create_fails_when_no_adapter_accepts() {
    let pool = pool(vec!["127.0.0.1:9".to_string()], 1);
    let result = pool.create(&binding("syslog://a.example.com")).await;
    assert!(matches!(result, Err(PoolError::CreateFailed)));
}

#[derive(Clone)]
struct StaticReader {
    bindings: AppBindings,
}

#[async_trait]
impl BindingReader for StaticReader {
    async fn fetch_bindings(&self) -> Result<AppBindings, FetchError> {
        Ok(self.bindings.clone())
    }
}

#[tokio::test]
async fn test_reconcile_fixed_point_issues_no_mutations() {
    let adapter = spawn_adapter().await;

    let mut bindings = AppBindings::new();
    bindings.insert(
        "app-guid".to_string(),
        AppBinding {
            hostname: "org.space.app".to_string(),
            drains: vec!["syslog://a.example.com".to_string()],
        },
    );

    let pool = pool(vec![adapter.addr.clone()], 1);
    let orchestrator = Orchestrator::new(StaticReader { bindings }, pool, Arc::new(Metrics::new()));

    // first pass converges: one create RPC
    orchestrator.reconcile().await;
    assert_eq!(adapter.mutations.load(Ordering::SeqCst), 1);

    // at the fixed point a pass emits no create and no delete RPCs
    orchestrator.reconcile().await;
    orchestrator.reconcile().await;
    assert_eq!(adapter.mutations.load(Ordering::SeqCst), 1);
}
