//! Tests for the reconciliation orchestrator

use async_trait::async_trait;
use drainscale::bindings::{AppBinding, AppBindings, Binding};
use drainscale::metrics::Metrics;
use drainscale::scheduler::orchestrator::{AdapterPool, BindingReader, Orchestrator};
use drainscale::scheduler::pool::PoolError;
use drainscale::scheduler::reader::FetchError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct StaticReader {
    bindings: Arc<Mutex<AppBindings>>,
    fail: Arc<AtomicBool>,
}

impl StaticReader {
    fn set(&self, bindings: AppBindings) {
        *self.bindings.lock().unwrap() = bindings;
    }
}

#[async_trait]
impl BindingReader for StaticReader {
    async fn fetch_bindings(&self) -> Result<AppBindings, FetchError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(FetchError::Status(
                reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            ));
        }
        Ok(self.bindings.lock().unwrap().clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    Create(Binding),
    Delete(Binding),
}

#[derive(Clone, Default)]
struct RecordingPool {
    actual: Arc<Mutex<Vec<Vec<Binding>>>>,
    ops: Arc<Mutex<Vec<Op>>>,
    fail_list: Arc<AtomicBool>,
}

impl RecordingPool {
    fn set_actual(&self, actual: Vec<Vec<Binding>>) {
        *self.actual.lock().unwrap() = actual;
    }

    fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    fn deletes(&self) -> Vec<Binding> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Delete(binding) => Some(binding),
                Op::Create(_) => None,
            })
            .collect()
    }

    fn creates(&self) -> Vec<Binding> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Create(binding) => Some(binding),
                Op::Delete(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl AdapterPool for RecordingPool {
    async fn list(&self) -> Result<Vec<Vec<Binding>>, PoolError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(PoolError::ListFailed);
        }
        Ok(self.actual.lock().unwrap().clone())
    }

    async fn create(&self, binding: &Binding) -> Result<(), PoolError> {
        self.ops.lock().unwrap().push(Op::Create(binding.clone()));
        Ok(())
    }

    async fn delete(&self, binding: &Binding) -> Result<(), PoolError> {
        self.ops.lock().unwrap().push(Op::Delete(binding.clone()));
        Ok(())
    }
}

fn binding(drain: &str) -> Binding {
    Binding {
        hostname: "org.space.app".to_string(),
        app_id: "app-guid".to_string(),
        drain: drain.to_string(),
    }
}

fn expected(drains: &[&str]) -> AppBindings {
    let mut bindings = AppBindings::new();
    bindings.insert(
        "app-guid".to_string(),
        AppBinding {
            hostname: "org.space.app".to_string(),
            drains: drains.iter().map(|d| d.to_string()).collect(),
        },
    );
    bindings
}

#[tokio::test]
async fn test_deletes_extraneous_binding_exactly_once() {
    let reader = StaticReader::default();
    reader.set(expected(&["syslog://a.example.com"]));

    let pool = RecordingPool::default();
    pool.set_actual(vec![vec![
        binding("syslog://a.example.com"),
        binding("syslog://b.example.com"),
    ]]);

    let orchestrator = Orchestrator::new(reader, pool.clone(), Arc::new(Metrics::new()));
    orchestrator.reconcile().await;

    assert_eq!(pool.deletes(), vec![binding("syslog://b.example.com")]);
    assert!(pool
        .creates()
        .contains(&binding("syslog://a.example.com")));
}

#[tokio::test]
async fn test_fetch_failure_skips_the_tick() {
    let reader = StaticReader::default();
    reader.fail.store(true, Ordering::SeqCst);

    let pool = RecordingPool::default();
    pool.set_actual(vec![vec![binding("syslog://stale.example.com")]]);

    let orchestrator = Orchestrator::new(reader, pool.clone(), Arc::new(Metrics::new()));
    orchestrator.reconcile().await;

    assert!(pool.ops().is_empty());
}

#[tokio::test]
async fn test_list_failure_skips_cleanup_but_still_creates() {
    let reader = StaticReader::default();
    reader.set(expected(&["syslog://a.example.com"]));

    let pool = RecordingPool::default();
    pool.fail_list.store(true, Ordering::SeqCst);

    let orchestrator = Orchestrator::new(reader, pool.clone(), Arc::new(Metrics::new()));
    orchestrator.reconcile().await;

    assert!(pool.deletes().is_empty());
    assert_eq!(pool.creates(), vec![binding("syslog://a.example.com")]);
}

#[tokio::test]
async fn test_all_deletes_complete_before_any_create() {
    let reader = StaticReader::default();
    reader.set(expected(&["syslog://a.example.com", "syslog://b.example.com"]));

    let pool = RecordingPool::default();
    pool.set_actual(vec![
        vec![binding("syslog://old-1.example.com")],
        vec![binding("syslog://old-2.example.com")],
    ]);

    let orchestrator = Orchestrator::new(reader, pool.clone(), Arc::new(Metrics::new()));
    orchestrator.reconcile().await;

    let ops = pool.ops();
    let last_delete = ops
        .iter()
        .rposition(|op| matches!(op, Op::Delete(_)))
        .unwrap();
    let first_create = ops
        .iter()
        .position(|op| matches!(op, Op::Create(_)))
        .unwrap();
    assert!(last_delete < first_create);
}

#[tokio::test]
async fn test_binding_on_unknown_app_is_deleted() {
    let reader = StaticReader::default();

    let pool = RecordingPool::default();
    pool.set_actual(vec![vec![binding("syslog://a.example.com")]]);

    let orchestrator = Orchestrator::new(reader, pool.clone(), Arc::new(Metrics::new()));
    orchestrator.reconcile().await;

    assert_eq!(pool.deletes(), vec![binding("syslog://a.example.com")]);
    assert!(pool.creates().is_empty());
}

#[tokio::test]
async fn test_run_reconciles_until_stopped() {
    let reader = StaticReader::default();
    reader.set(expected(&["syslog://a.example.com"]));
    let pool = RecordingPool::default();

    let orchestrator = Arc::new(Orchestrator::new(
        reader,
        pool.clone(),
        Arc::new(Metrics::new()),
    ));

    let handle = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.run(Duration::from_millis(10)).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;

    // stop is idempotent
    orchestrator.stop();
    orchestrator.stop();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("orchestrator did not stop")
        .unwrap();

    assert!(!pool.creates().is_empty());
}

#[tokio::test]
async fn test_stop_before_run_exits_immediately() {
    let reader = StaticReader::default();
    let pool = RecordingPool::default();

    let orchestrator = Arc::new(Orchestrator::new(
        reader,
        pool.clone(),
        Arc::new(Metrics::new()),
    ));
    orchestrator.stop();

    tokio::time::timeout(
        Duration::from_secs(1),
        orchestrator.run(Duration::from_secs(60)),
    )
    .await
    .expect("orchestrator did not observe stop");

    assert!(pool.ops().is_empty());
}
