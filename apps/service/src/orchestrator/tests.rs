/// End-to-end tests for the monitoring engine
///
/// Probes are scripted so every scenario runs without the network; the
/// scheduling scenarios run on paused tokio time.
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

use crate::config::Config;
use crate::database::models::{
    Alert, AlertSeverity, AlertStatus, Device, MonitorRecord, MonitorResult, NewAlert, NewDevice,
    NewMonitor, NewMonitorResult,
};
use crate::database::{Database, DatabaseImpl, MemoryDatabase, initialize_database};
use crate::events::{DomainEvent, EventKind};
use crate::monitoring::probe::ProbeSet;
use crate::monitoring::probe::testing::{ScriptedProbe, uniform};
use crate::monitoring::types::{MonitorStatus, ProbeErrorKind, ProbeOutcome};
use crate::monitoring::{MonitoringExecutor, SchedulerError, Thresholds};
use crate::orchestrator::Orchestrator;
use crate::pool::open_pool;

type Events = Arc<Mutex<Vec<DomainEvent>>>;

fn build(database: Arc<dyn Database>, probe: Arc<ScriptedProbe>) -> (Orchestrator, Events) {
    build_with(database, uniform(probe))
}

fn build_with(database: Arc<dyn Database>, probes: ProbeSet) -> (Orchestrator, Events) {
    let executor = MonitoringExecutor::with_probes(probes, Thresholds::default());
    let orchestrator = Orchestrator::with_executor(&Config::default(), database, executor);

    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    orchestrator.publisher().subscribe_fn(move |event: &DomainEvent| {
        sink.lock().unwrap().push(event.clone());
        Ok(())
    });

    (orchestrator, events)
}

async fn device(db: &dyn Database) -> Device {
    db.create_device(NewDevice::new("Edge Switch", "10.0.0.2", "switch"))
        .await
        .unwrap()
}

async fn monitor(db: &dyn Database, device_id: i64, kind: &str, config: Value) -> MonitorRecord {
    db.create_monitor(NewMonitor::new(device_id, kind, config))
        .await
        .unwrap()
}

/// Let spawned ticks run to completion
async fn settle() {
    tokio::time::sleep(Duration::from_secs(1)).await;
}

async fn results_of(orchestrator: &Orchestrator, monitor_id: i64) -> Vec<MonitorResult> {
    orchestrator.recorder().history(monitor_id).await.unwrap()
}

fn kinds(events: &Events) -> Vec<EventKind> {
    events
        .lock()
        .unwrap()
        .iter()
        .map(DomainEvent::kind)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_http_down_raises_danger_alert() {
    let db = Arc::new(MemoryDatabase::new());
    let probe = Arc::new(ScriptedProbe::always(ProbeOutcome::failure(
        ProbeErrorKind::Refused,
        "connection refused",
    )));
    let (orchestrator, _events) = build(db.clone(), probe.clone());

    let device = device(&*db).await;
    let http = monitor(
        &*db,
        device.id,
        "http",
        json!({ "url": "http://status.example.test/health" }),
    )
    .await;

    assert_eq!(orchestrator.start().await.unwrap(), 1);
    settle().await;

    let history = orchestrator.recorder().history(http.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, MonitorStatus::Down);
    assert_eq!(history[0].response_time, None);
    assert_eq!(history[0].details["error"], "connection refused");

    let alerts = db.get_alerts(None).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, AlertSeverity::Danger);
    assert_eq!(alerts[0].status, AlertStatus::Active);
    assert_eq!(alerts[0].monitor_id, http.id);
    assert!(alerts[0].message.contains("http://status.example.test/health"));

    orchestrator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_slow_tcp_records_warning() {
    let db = Arc::new(MemoryDatabase::new());
    let probe = Arc::new(ScriptedProbe::always(ProbeOutcome::success(600).with("port", 443)));
    let (orchestrator, _events) = build(db.clone(), probe);

    let device = device(&*db).await;
    let tcp = monitor(&*db, device.id, "tcp", json!({ "port": 443 })).await;

    orchestrator.start().await.unwrap();
    settle().await;

    let history = orchestrator.recorder().history(tcp.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, MonitorStatus::Warning);
    assert_eq!(history[0].response_time, Some(600));
    assert_eq!(history[0].details["warning"], "High latency");

    let alerts = db.get_alerts(None).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, AlertSeverity::Warning);
    assert_eq!(alerts[0].message, "Edge Switch Port 443 Warning");

    orchestrator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_sustained_outage_alerts_once() {
    let db = Arc::new(MemoryDatabase::new());
    let probe = Arc::new(ScriptedProbe::always(ProbeOutcome::failure(
        ProbeErrorKind::Timeout,
        "timed out",
    )));
    let (orchestrator, _events) = build(db.clone(), probe.clone());

    let device = device(&*db).await;
    let icmp = db
        .create_monitor(NewMonitor::new(device.id, "icmp", json!({})).interval(10))
        .await
        .unwrap();

    orchestrator.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(35)).await;
    orchestrator.stop().await;

    let history = orchestrator.recorder().history(icmp.id).await.unwrap();
    assert_eq!(history.len(), 4);
    assert!(history.iter().all(|r| r.status == MonitorStatus::Down));
    assert_eq!(db.get_alerts(None).await.unwrap().len(), 1);
    assert_eq!(probe.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_then_failure_alerts_again() {
    let db = Arc::new(MemoryDatabase::new());
    let down = ProbeOutcome::failure(ProbeErrorKind::Timeout, "timed out");
    let probe = Arc::new(ScriptedProbe::sequence(
        [down.clone(), ProbeOutcome::success(5)],
        down,
    ));
    let (orchestrator, _events) = build(db.clone(), probe);

    let device = device(&*db).await;
    db.create_monitor(NewMonitor::new(device.id, "icmp", json!({})).interval(10))
        .await
        .unwrap();

    orchestrator.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(25)).await;
    orchestrator.stop().await;

    // down, online, down
    assert_eq!(db.get_alerts(None).await.unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_kind_records_unknown() {
    let db = Arc::new(MemoryDatabase::new());
    let probe = Arc::new(ScriptedProbe::always(ProbeOutcome::success(1)));
    let (orchestrator, events) = build(db.clone(), probe.clone());

    let device = device(&*db).await;
    let modbus = monitor(&*db, device.id, "modbus", json!({ "register": 40001 })).await;

    orchestrator.start().await.unwrap();
    settle().await;

    let history = orchestrator.recorder().history(modbus.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, MonitorStatus::Unknown);
    assert_eq!(history[0].details["error"], "Unknown monitor type: modbus");
    assert_eq!(probe.calls(), 0);
    assert!(db.get_alerts(None).await.unwrap().is_empty());
    assert_eq!(kinds(&events), vec![EventKind::DeviceStatus, EventKind::MonitorResult]);

    orchestrator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_missing_device_skips_tick() {
    let db = Arc::new(MemoryDatabase::new());
    let probe = Arc::new(ScriptedProbe::always(ProbeOutcome::success(1)));
    let (orchestrator, events) = build(db.clone(), probe.clone());

    let device = device(&*db).await;
    let icmp = monitor(&*db, device.id, "icmp", json!({})).await;
    db.remove_device(device.id).await;

    orchestrator.start().await.unwrap();
    settle().await;

    assert_eq!(probe.calls(), 0);
    assert!(results_of(&orchestrator, icmp.id).await.is_empty());
    assert!(events.lock().unwrap().is_empty());
    // still scheduled; the device may come back
    assert!(orchestrator.scheduler().is_scheduled(icmp.id).await);

    orchestrator.stop().await;
}

/// Store whose result or alert writes can be switched to fail
struct FlakyDatabase {
    inner: MemoryDatabase,
    fail_results: AtomicBool,
    fail_alerts: AtomicBool,
}

impl FlakyDatabase {
    fn new() -> Self {
        Self {
            inner: MemoryDatabase::new(),
            fail_results: AtomicBool::new(false),
            fail_alerts: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Database for FlakyDatabase {
    async fn get_device(&self, id: i64) -> Result<Option<Device>> {
        self.inner.get_device(id).await
    }

    async fn get_monitors(&self) -> Result<Vec<MonitorRecord>> {
        self.inner.get_monitors().await
    }

    async fn get_monitors_by_device(&self, device_id: i64) -> Result<Vec<MonitorRecord>> {
        self.inner.get_monitors_by_device(device_id).await
    }

    async fn get_monitor(&self, id: i64) -> Result<Option<MonitorRecord>> {
        self.inner.get_monitor(id).await
    }

    async fn create_monitor_result(&self, result: NewMonitorResult) -> Result<MonitorResult> {
        if self.fail_results.load(Ordering::SeqCst) {
            return Err(anyhow!("disk full"));
        }
        self.inner.create_monitor_result(result).await
    }

    async fn get_monitor_results(
        &self,
        monitor_id: i64,
        limit: usize,
    ) -> Result<Vec<MonitorResult>> {
        self.inner.get_monitor_results(monitor_id, limit).await
    }

    async fn prune_monitor_results(&self, monitor_id: i64, keep: usize) -> Result<u64> {
        self.inner.prune_monitor_results(monitor_id, keep).await
    }

    async fn create_alert(&self, alert: NewAlert) -> Result<Alert> {
        if self.fail_alerts.load(Ordering::SeqCst) {
            return Err(anyhow!("database is locked"));
        }
        self.inner.create_alert(alert).await
    }

    async fn get_alerts(&self, status: Option<AlertStatus>) -> Result<Vec<Alert>> {
        self.inner.get_alerts(status).await
    }

    async fn update_alert_status(&self, id: i64, status: AlertStatus) -> Result<Option<Alert>> {
        self.inner.update_alert_status(id, status).await
    }

    async fn create_device(&self, device: NewDevice) -> Result<Device> {
        self.inner.create_device(device).await
    }

    async fn create_monitor(&self, monitor: NewMonitor) -> Result<MonitorRecord> {
        self.inner.create_monitor(monitor).await
    }

    async fn update_monitor(&self, monitor: &MonitorRecord) -> Result<bool> {
        self.inner.update_monitor(monitor).await
    }

    async fn delete_monitor(&self, id: i64) -> Result<bool> {
        self.inner.delete_monitor(id).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_skips_alert_and_events() {
    let db = Arc::new(FlakyDatabase::new());
    db.fail_results.store(true, Ordering::SeqCst);
    let probe = Arc::new(ScriptedProbe::always(ProbeOutcome::failure(
        ProbeErrorKind::Timeout,
        "timed out",
    )));
    let (orchestrator, events) = build(db.clone(), probe.clone());

    let device = device(&*db).await;
    let icmp = db
        .create_monitor(NewMonitor::new(device.id, "icmp", json!({})).interval(10))
        .await
        .unwrap();

    orchestrator.start().await.unwrap();
    settle().await;

    assert_eq!(probe.calls(), 1);
    assert!(events.lock().unwrap().is_empty());
    assert!(db.get_alerts(None).await.unwrap().is_empty());

    // the timer keeps going once the store recovers
    db.fail_results.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(results_of(&orchestrator, icmp.id).await.len(), 1);
    assert_eq!(db.get_alerts(None).await.unwrap().len(), 1);

    orchestrator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_alert_is_raised_on_next_tick() {
    let db = Arc::new(FlakyDatabase::new());
    db.fail_alerts.store(true, Ordering::SeqCst);
    let probe = Arc::new(ScriptedProbe::always(ProbeOutcome::failure(
        ProbeErrorKind::Timeout,
        "timed out",
    )));
    let (orchestrator, _events) = build(db.clone(), probe.clone());

    let device = device(&*db).await;
    let icmp = db
        .create_monitor(NewMonitor::new(device.id, "icmp", json!({})).interval(10))
        .await
        .unwrap();

    orchestrator.start().await.unwrap();
    settle().await;
    assert_eq!(results_of(&orchestrator, icmp.id).await.len(), 1);
    assert!(db.get_alerts(None).await.unwrap().is_empty());

    db.fail_alerts.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(10)).await;
    let alerts = db.get_alerts(None).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].monitor_id, icmp.id);

    // the outage continues without a second alert
    tokio::time::sleep(Duration::from_secs(20)).await;
    orchestrator.stop().await;
    assert_eq!(results_of(&orchestrator, icmp.id).await.len(), 4);
    assert_eq!(db.get_alerts(None).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unschedule_discards_in_flight_result() {
    let db = Arc::new(MemoryDatabase::new());
    let probe = Arc::new(
        ScriptedProbe::always(ProbeOutcome::failure(ProbeErrorKind::Timeout, "timed out"))
            .delayed(Duration::from_secs(5)),
    );
    let (orchestrator, events) = build(db.clone(), probe.clone());

    let device = device(&*db).await;
    let icmp = monitor(&*db, device.id, "icmp", json!({})).await;

    orchestrator.start().await.unwrap();
    settle().await;
    assert_eq!(probe.calls(), 1);

    assert!(orchestrator.monitor_deleted(icmp.id).await);
    assert!(!orchestrator.monitor_deleted(icmp.id).await);
    tokio::time::sleep(Duration::from_secs(10)).await;

    let stored = db.get_monitor_results(icmp.id, 10).await.unwrap();

    assert!(stored.is_empty());
    assert!(db.get_alerts(None).await.unwrap().is_empty());
    assert!(events.lock().unwrap().is_empty());
    assert_eq!(probe.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rescheduling_keeps_one_timer() {
    let db = Arc::new(MemoryDatabase::new());
    let probe = Arc::new(ScriptedProbe::always(ProbeOutcome::success(3)));
    let (orchestrator, _events) = build(db.clone(), probe);

    let device = device(&*db).await;
    let icmp = db
        .create_monitor(NewMonitor::new(device.id, "icmp", json!({})).interval(10))
        .await
        .unwrap();

    for _ in 0..3 {
        assert!(orchestrator.monitor_saved(&icmp).await.unwrap());
    }
    assert_eq!(orchestrator.scheduler().scheduled_ids().await, vec![icmp.id]);

    tokio::time::sleep(Duration::from_secs(25)).await;
    orchestrator.stop().await;

    // ticks at 0s, 10s and 20s
    assert_eq!(results_of(&orchestrator, icmp.id).await.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_slow_check_skips_overlapping_ticks() {
    let db = Arc::new(MemoryDatabase::new());
    let probe = Arc::new(
        ScriptedProbe::always(ProbeOutcome::success(3)).delayed(Duration::from_secs(25)),
    );
    let (orchestrator, _events) = build(db.clone(), probe.clone());

    let device = device(&*db).await;
    let icmp = db
        .create_monitor(NewMonitor::new(device.id, "icmp", json!({})).interval(10))
        .await
        .unwrap();

    orchestrator.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(58)).await;
    orchestrator.stop().await;

    // 0s runs until 25s, 10s and 20s are skipped, 30s runs until 55s
    assert_eq!(probe.calls(), 2);
    assert_eq!(results_of(&orchestrator, icmp.id).await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_lets_in_flight_check_finish() {
    let db = Arc::new(MemoryDatabase::new());
    let probe = Arc::new(
        ScriptedProbe::always(ProbeOutcome::success(3)).delayed(Duration::from_secs(5)),
    );
    let (orchestrator, _events) = build(db.clone(), probe.clone());

    let device = device(&*db).await;
    let icmp = db
        .create_monitor(NewMonitor::new(device.id, "icmp", json!({})).interval(10))
        .await
        .unwrap();

    orchestrator.start().await.unwrap();
    settle().await;
    orchestrator.stop().await;
    assert!(orchestrator.scheduler().scheduled_ids().await.is_empty());

    tokio::time::sleep(Duration::from_secs(30)).await;

    let history = orchestrator.recorder().history(icmp.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, MonitorStatus::Online);
    assert_eq!(probe.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_monitor_does_not_delay_others() {
    let db = Arc::new(MemoryDatabase::new());
    let fast = Arc::new(ScriptedProbe::always(ProbeOutcome::success(2)));
    let slow = Arc::new(
        ScriptedProbe::always(ProbeOutcome::success(3)).delayed(Duration::from_secs(25)),
    );
    let probes = ProbeSet::with_probes(fast.clone(), fast.clone(), fast.clone(), slow.clone());
    let (orchestrator, _events) = build_with(db.clone(), probes);

    let device = device(&*db).await;
    let icmp = db
        .create_monitor(NewMonitor::new(device.id, "icmp", json!({})).interval(10))
        .await
        .unwrap();
    let tcp = db
        .create_monitor(NewMonitor::new(device.id, "tcp", json!({ "port": 22 })).interval(10))
        .await
        .unwrap();

    orchestrator.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(35)).await;
    orchestrator.stop().await;

    // ticks at 0s, 10s, 20s and 30s all ran while the tcp check hung
    assert_eq!(fast.calls(), 4);
    assert_eq!(results_of(&orchestrator, icmp.id).await.len(), 4);
    assert_eq!(slow.calls(), 2);
    assert_eq!(results_of(&orchestrator, tcp.id).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_running_checks() {
    let db = Arc::new(MemoryDatabase::new());
    let probe = Arc::new(
        ScriptedProbe::always(ProbeOutcome::success(3)).delayed(Duration::from_secs(5)),
    );
    let (orchestrator, events) = build(db.clone(), probe.clone());

    let device = device(&*db).await;
    let icmp = monitor(&*db, device.id, "icmp", json!({})).await;

    orchestrator.start().await.unwrap();
    settle().await;
    assert_eq!(orchestrator.shutdown(Duration::from_secs(30)).await, 0);

    // recorded before shutdown returned
    assert_eq!(db.get_monitor_results(icmp.id, 10).await.unwrap().len(), 1);
    assert_eq!(kinds(&events), vec![EventKind::DeviceStatus, EventKind::MonitorResult]);
    assert!(orchestrator.scheduler().scheduled_ids().await.is_empty());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(probe.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_checks_after_grace() {
    let db = Arc::new(MemoryDatabase::new());
    let probe = Arc::new(
        ScriptedProbe::always(ProbeOutcome::success(3)).delayed(Duration::from_secs(60)),
    );
    let (orchestrator, events) = build(db.clone(), probe.clone());

    let device = device(&*db).await;
    let icmp = monitor(&*db, device.id, "icmp", json!({})).await;

    orchestrator.start().await.unwrap();
    settle().await;
    assert_eq!(orchestrator.shutdown(Duration::from_secs(5)).await, 1);

    tokio::time::sleep(Duration::from_secs(120)).await;
    let stored = db.get_monitor_results(icmp.id, 10).await.unwrap();
    assert!(stored.is_empty());
    assert!(events.lock().unwrap().is_empty());
    assert_eq!(probe.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_config_is_not_scheduled() {
    let db = Arc::new(MemoryDatabase::new());
    let probe = Arc::new(ScriptedProbe::always(ProbeOutcome::success(1)));
    let (orchestrator, _events) = build(db.clone(), probe);

    let device = device(&*db).await;
    let broken = monitor(&*db, device.id, "tcp", json!({ "timeout": 5 })).await;
    let icmp = monitor(&*db, device.id, "icmp", json!({})).await;

    let err = orchestrator.monitor_saved(&broken).await.unwrap_err();
    assert!(
        matches!(err, SchedulerError::InvalidConfig { monitor_id, .. } if monitor_id == broken.id)
    );
    assert!(!orchestrator.scheduler().is_scheduled(broken.id).await);

    // start schedules the rest
    assert_eq!(orchestrator.start().await.unwrap(), 1);
    assert_eq!(orchestrator.scheduler().scheduled_ids().await, vec![icmp.id]);

    orchestrator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_disabled_monitors_are_not_started() {
    let db = Arc::new(MemoryDatabase::new());
    let probe = Arc::new(ScriptedProbe::always(ProbeOutcome::success(1)));
    let (orchestrator, _events) = build(db.clone(), probe.clone());

    let device = device(&*db).await;
    db.create_monitor(NewMonitor::new(device.id, "icmp", json!({})).disabled())
        .await
        .unwrap();

    assert_eq!(orchestrator.start().await.unwrap(), 0);
    settle().await;
    assert_eq!(probe.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_enabled() {
    let db = Arc::new(MemoryDatabase::new());
    let probe = Arc::new(ScriptedProbe::always(ProbeOutcome::success(1)));
    let (orchestrator, _events) = build(db.clone(), probe);

    let device = device(&*db).await;
    let icmp = monitor(&*db, device.id, "icmp", json!({})).await;
    orchestrator.start().await.unwrap();
    assert!(orchestrator.scheduler().is_scheduled(icmp.id).await);

    assert!(
        !orchestrator
            .set_monitor_enabled(icmp.id, false)
            .await
            .unwrap()
    );
    assert!(!orchestrator.scheduler().is_scheduled(icmp.id).await);
    assert!(!db.get_monitor(icmp.id).await.unwrap().unwrap().enabled);

    assert!(
        orchestrator
            .set_monitor_enabled(icmp.id, true)
            .await
            .unwrap()
    );
    assert!(orchestrator.scheduler().is_scheduled(icmp.id).await);
    assert!(db.get_monitor(icmp.id).await.unwrap().unwrap().enabled);

    assert!(!orchestrator.set_monitor_enabled(9_999, true).await.unwrap());

    orchestrator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_device_lifecycle_hooks() {
    let db = Arc::new(MemoryDatabase::new());
    let probe = Arc::new(ScriptedProbe::always(ProbeOutcome::success(1)));
    let (orchestrator, _events) = build(db.clone(), probe);

    let switch = device(&*db).await;
    let router = db
        .create_device(NewDevice::new("Core Router", "10.0.0.1", "router"))
        .await
        .unwrap();
    let a = monitor(&*db, switch.id, "icmp", json!({})).await;
    let b = monitor(&*db, switch.id, "tcp", json!({ "port": 22 })).await;
    db.create_monitor(NewMonitor::new(switch.id, "icmp", json!({})).disabled())
        .await
        .unwrap();
    let c = monitor(&*db, router.id, "icmp", json!({})).await;

    assert_eq!(orchestrator.start().await.unwrap(), 3);
    assert_eq!(orchestrator.device_updated(switch.id).await.unwrap(), 2);
    assert_eq!(orchestrator.scheduler().scheduled_ids().await, vec![a.id, b.id, c.id]);
    settle().await;
    for id in [a.id, b.id, c.id] {
        assert!(orchestrator.recorder().is_cached(id).await);
    }

    assert_eq!(orchestrator.device_deleted(switch.id).await, 2);
    assert_eq!(orchestrator.scheduler().scheduled_ids().await, vec![c.id]);
    assert!(!orchestrator.recorder().is_cached(a.id).await);
    assert!(!orchestrator.recorder().is_cached(b.id).await);
    assert!(orchestrator.recorder().is_cached(c.id).await);
    assert_eq!(orchestrator.device_deleted(switch.id).await, 0);

    orchestrator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_event_order_for_degraded_tick() {
    let db = Arc::new(MemoryDatabase::new());
    let probe = Arc::new(ScriptedProbe::always(ProbeOutcome::failure(
        ProbeErrorKind::Dns,
        "no such host",
    )));
    let (orchestrator, events) = build(db.clone(), probe);
    let mut bus = orchestrator.subscribe_events();

    let device = device(&*db).await;
    let http = monitor(&*db, device.id, "http", json!({ "url": "https://nowhere.invalid" })).await;

    orchestrator.start().await.unwrap();
    settle().await;
    orchestrator.stop().await;

    assert_eq!(
        kinds(&events),
        vec![EventKind::Alert, EventKind::DeviceStatus, EventKind::MonitorResult]
    );

    let recorded = events.lock().unwrap().clone();
    let DomainEvent::DeviceStatus(status) = &recorded[1] else {
        panic!("expected device status, got {:?}", recorded[1]);
    };
    assert_eq!(status.id, device.id);
    assert_eq!(status.name, "Edge Switch");
    assert_eq!(status.status, MonitorStatus::Down);

    let DomainEvent::MonitorResult(result) = &recorded[2] else {
        panic!("expected monitor result, got {:?}", recorded[2]);
    };
    assert_eq!(result.monitor_id, http.id);
    assert_eq!(result.device_id, device.id);
    assert_eq!(status.last_check, result.result.timestamp);

    // the broadcast bus sees the same sequence
    let mut bus_kinds = Vec::new();
    while let Ok(event) = bus.try_recv() {
        bus_kinds.push(event.kind());
    }
    assert_eq!(bus_kinds, kinds(&events));
}

#[tokio::test]
async fn test_libsql_backed_engine() {
    let dir = tempdir().unwrap();
    let pool = open_pool(dir.path().join("engine.db")).await.unwrap();
    {
        let conn = pool.get().await.unwrap();
        initialize_database(&conn).await.unwrap();
    }
    let db = Arc::new(DatabaseImpl::new_from_pool(pool));
    let probe = Arc::new(ScriptedProbe::always(ProbeOutcome::success(20)));
    let (orchestrator, _events) = build(db.clone(), probe);

    let device = device(&*db).await;
    let icmp = monitor(&*db, device.id, "icmp", json!({ "count": 2 })).await;

    assert_eq!(orchestrator.start().await.unwrap(), 1);

    let stored = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let results = db.get_monitor_results(icmp.id, 10).await.unwrap();
            if !results.is_empty() {
                return results;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("first tick recorded");

    orchestrator.stop().await;

    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, MonitorStatus::Online);
    assert_eq!(stored[0].response_time, Some(20));
}
