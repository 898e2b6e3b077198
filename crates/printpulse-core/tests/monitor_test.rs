#![allow(clippy::unwrap_used)]
// Integration tests for `Monitor`, driving sessions through in-process
// links and the seeded simulator.

use std::sync::Arc;
use std::time::Duration;

use printpulse_api::{LinkEndpoint, LinkEvent, PrinterRequest, link_channel};
use printpulse_core::{
    Backend, Command, ConnectionState, CoreError, Database, Monitor, MonitorConfig, Printer,
    PrinterConfig, PrinterEvent, PrinterStatus, SimConfig, TransitionOdds,
};
use secrecy::SecretString;
use serde_json::json;

// ── Helpers ─────────────────────────────────────────────────────────

fn config(id: &str) -> PrinterConfig {
    PrinterConfig {
        id: id.into(),
        name: format!("{id} printer"),
        model: "P1S".into(),
        ip: "192.168.1.60".into(),
        access_code: SecretString::from("24681357".to_string()),
        serial: format!("01P00A{id}"),
    }
}

async fn started(config: MonitorConfig) -> Monitor {
    let monitor = Monitor::new(config);
    monitor.start().await.unwrap();
    monitor
}

async fn fake_printer(monitor: &Monitor, id: &str) -> LinkEndpoint {
    let (handle, endpoint) = link_channel();
    monitor.add_printer_with_link(config(id), handle).await.unwrap();
    endpoint
}

/// Wait until the record for `id` satisfies `pred`.
async fn wait_for(monitor: &Monitor, id: &str, pred: impl Fn(&Printer) -> bool) -> Arc<Printer> {
    let mut stream = monitor.printers_stream();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(printer) = stream.latest().iter().find(|p| p.id == id) {
                if pred(printer) {
                    return Arc::clone(printer);
                }
            }
            stream.changed().await.unwrap();
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting on {id}: {:?}", monitor.printer(id)))
}

fn running_report() -> serde_json::Value {
    json!({"print": {
        "gcode_state": "RUNNING",
        "mc_percent": 35,
        "mc_remaining_time": 48,
        "layer_num": 70,
        "total_layer_num": 200,
        "subtask_name": "hinge",
        "nozzle_temper": 220.2,
        "bed_temper": 59.8,
        "fan_gear": 12
    }})
}

fn demo_config(odds: TransitionOdds) -> MonitorConfig {
    MonitorConfig {
        backend: Backend::Simulated(SimConfig {
            tick: Duration::from_secs(1),
            seed: Some(42),
            transitions: odds,
        }),
        ..MonitorConfig::default()
    }
}

// ── Session pipeline ────────────────────────────────────────────────

#[tokio::test]
async fn test_link_events_drive_the_record() {
    let monitor = started(MonitorConfig::default()).await;
    let mut events = monitor.events();
    let endpoint = fake_printer(&monitor, "p1").await;

    let initial = monitor.printer("p1").unwrap();
    assert_eq!(initial.status, PrinterStatus::Connecting);
    assert_eq!(initial.name, "p1 printer");
    assert!(matches!(events.recv().await.unwrap(), PrinterEvent::Updated(p) if p.id == "p1"));

    endpoint.emit(LinkEvent::Connected).await;
    let connected = wait_for(&monitor, "p1", |p| p.online).await;
    assert_eq!(connected.status, PrinterStatus::Idle);
    assert_eq!(connected.connection_state, ConnectionState::Connected);

    endpoint.emit(LinkEvent::Report(running_report())).await;
    let printing = wait_for(&monitor, "p1", |p| p.status == PrinterStatus::Printing).await;
    let job = printing.print.as_ref().unwrap();
    assert_eq!(job.file_name, "hinge");
    assert_eq!(job.layer_current, 70);
    assert_eq!(printing.temperatures.nozzle, 220);

    // A sparse delta keeps the accumulated job fields.
    endpoint
        .emit(LinkEvent::Report(json!({"print": {"nozzle_temper": 221.0}})))
        .await;
    let delta = wait_for(&monitor, "p1", |p| p.temperatures.nozzle == 221).await;
    assert_eq!(delta.status, PrinterStatus::Printing);
    assert_eq!(delta.print.as_ref().unwrap().file_name, "hinge");

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_fault_codes_surface_as_error() {
    let monitor = started(MonitorConfig::default()).await;
    let endpoint = fake_printer(&monitor, "p1").await;

    endpoint.emit(LinkEvent::Connected).await;
    endpoint.emit(LinkEvent::Report(running_report())).await;
    endpoint
        .emit(LinkEvent::Report(json!({"print": {"mc_print_error_code": "1204"}})))
        .await;

    let faulted = wait_for(&monitor, "p1", |p| p.status == PrinterStatus::Error).await;
    assert_eq!(faulted.error.as_ref().unwrap().message, "Filament tangle detected");

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_marks_offline_and_blocks_commands() {
    let monitor = started(MonitorConfig::default()).await;
    let endpoint = fake_printer(&monitor, "p1").await;

    endpoint.emit(LinkEvent::Connected).await;
    endpoint.emit(LinkEvent::Report(running_report())).await;
    wait_for(&monitor, "p1", |p| p.status == PrinterStatus::Printing).await;

    endpoint
        .emit(LinkEvent::Disconnected {
            reason: "connection reset".into(),
        })
        .await;
    let offline = wait_for(&monitor, "p1", |p| !p.online).await;
    assert_eq!(offline.status, PrinterStatus::Offline);
    assert_eq!(offline.connection_state, ConnectionState::Failed);
    assert!(offline.print.is_some());

    let err = monitor.pause("p1").await.unwrap_err();
    assert!(matches!(err, CoreError::PrinterOffline { .. }), "{err:?}");

    // Reconnecting brings it back.
    endpoint.emit(LinkEvent::Connected).await;
    wait_for(&monitor, "p1", |p| p.online).await;

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_gave_up_ends_the_session() {
    let monitor = started(MonitorConfig::default()).await;
    let endpoint = fake_printer(&monitor, "p1").await;

    endpoint.emit(LinkEvent::Connected).await;
    endpoint.emit(LinkEvent::GaveUp { attempts: 5 }).await;
    wait_for(&monitor, "p1", |p| p.status == PrinterStatus::Offline).await;

    // The session dropped its receiver once it ended.
    tokio::time::timeout(Duration::from_secs(5), endpoint.events.closed())
        .await
        .unwrap();

    monitor.shutdown().await;
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_commands_reach_the_link() {
    let monitor = started(MonitorConfig::default()).await;
    let mut endpoint = fake_printer(&monitor, "p1").await;

    endpoint.emit(LinkEvent::Connected).await;
    endpoint.emit(LinkEvent::Report(running_report())).await;
    wait_for(&monitor, "p1", |p| p.status == PrinterStatus::Printing).await;

    let responder = tokio::spawn(async move {
        let mut seen = Vec::new();
        for _ in 0..2 {
            let envelope = endpoint.requests.recv().await.unwrap();
            seen.push(envelope.request);
            envelope.reply.send(Ok(())).unwrap();
        }
        seen
    });

    monitor.pause("p1").await.unwrap();
    monitor
        .execute("p1", Command::SetLight(false))
        .await
        .unwrap();

    assert_eq!(
        responder.await.unwrap(),
        vec![PrinterRequest::Pause, PrinterRequest::SetLight { on: false }]
    );

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_faulted_job_can_still_be_stopped() {
    let monitor = started(MonitorConfig::default()).await;
    let mut endpoint = fake_printer(&monitor, "p1").await;

    endpoint.emit(LinkEvent::Connected).await;
    endpoint.emit(LinkEvent::Report(running_report())).await;
    endpoint
        .emit(LinkEvent::Report(json!({"print": {"mc_print_error_code": "1204"}})))
        .await;
    let faulted = wait_for(&monitor, "p1", |p| p.status == PrinterStatus::Error).await;
    assert!(faulted.print.is_some());

    let responder = tokio::spawn(async move {
        let envelope = endpoint.requests.recv().await.unwrap();
        envelope.reply.send(Ok(())).unwrap();
        envelope.request
    });

    monitor.stop("p1").await.unwrap();
    assert_eq!(responder.await.unwrap(), PrinterRequest::Stop);

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_invalid_commands_never_reach_the_link() {
    let monitor = started(MonitorConfig::default()).await;
    let mut endpoint = fake_printer(&monitor, "p1").await;

    endpoint.emit(LinkEvent::Connected).await;
    wait_for(&monitor, "p1", |p| p.online).await;

    let err = monitor.resume("p1").await.unwrap_err();
    assert_eq!(err.to_string(), "Cannot resume printer p1 while it is idle");
    let err = monitor
        .execute("p1", Command::Gcode("G28\nG29".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ValidationFailed { .. }));

    assert!(endpoint.requests.try_recv().is_err());
    monitor.shutdown().await;
}

// ── Registration ────────────────────────────────────────────────────

#[tokio::test]
async fn test_remove_printer_forgets_everything() {
    let monitor = started(MonitorConfig::default()).await;
    let endpoint = fake_printer(&monitor, "p1").await;
    endpoint.emit(LinkEvent::Connected).await;
    wait_for(&monitor, "p1", |p| p.online).await;

    let mut events = monitor.events();
    monitor.remove_printer("p1").await.unwrap();

    assert!(monitor.printer("p1").is_none());
    assert!(monitor.store().report("p1").is_none());
    assert!(monitor.database().unwrap().list_printers().unwrap().is_empty());
    assert!(matches!(
        events.recv().await.unwrap(),
        PrinterEvent::Removed { id } if id == "p1"
    ));
    assert!(matches!(
        monitor.remove_printer("p1").await.unwrap_err(),
        CoreError::PrinterNotFound { .. }
    ));

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_settling_waits_for_first_contact() {
    let monitor = started(MonitorConfig::default()).await;
    let endpoint = fake_printer(&monitor, "p1").await;

    assert!(!monitor.wait_until_settled(Duration::from_millis(50)).await);

    endpoint.emit(LinkEvent::Connected).await;
    assert!(monitor.wait_until_settled(Duration::from_secs(5)).await);

    monitor.shutdown().await;
}

// ── Persistence ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("printpulse.db");

    let first = started(MonitorConfig {
        database: Some(db_path.clone()),
        ..MonitorConfig::default()
    })
    .await;
    let endpoint = fake_printer(&first, "p1").await;
    endpoint.emit(LinkEvent::Connected).await;
    endpoint.emit(LinkEvent::Report(running_report())).await;
    wait_for(&first, "p1", |p| p.status == PrinterStatus::Printing).await;
    first.shutdown().await;
    drop(endpoint);

    let db = Database::open(&db_path).unwrap();
    let states = db.load_states().unwrap();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].status, "printing");
    assert_eq!(states[0].print_filename.as_deref(), Some("hinge"));
    drop(db);

    // Frozen simulator so the restored session cannot move on its own.
    let second = started(MonitorConfig {
        database: Some(db_path),
        ..demo_config(TransitionOdds::frozen())
    })
    .await;
    let restored = second.printer("p1").unwrap();
    assert_eq!(restored.status, PrinterStatus::Offline);
    assert_eq!(restored.print.as_ref().unwrap().file_name, "hinge");
    assert!(restored.error.is_none());

    second.shutdown().await;
}

#[tokio::test]
async fn test_report_burst_persists_latest_state() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("printpulse.db");

    let monitor = started(MonitorConfig {
        database: Some(db_path.clone()),
        ..MonitorConfig::default()
    })
    .await;
    let endpoint = fake_printer(&monitor, "p1").await;
    endpoint.emit(LinkEvent::Connected).await;
    endpoint.emit(LinkEvent::Report(running_report())).await;

    // Far more updates than the writer can keep up with one by one.
    for nozzle in 0..600 {
        let nozzle = 100 + nozzle % 150;
        endpoint
            .emit(LinkEvent::Report(json!({"print": {"nozzle_temper": nozzle}})))
            .await;
    }
    endpoint
        .emit(LinkEvent::Report(json!({"print": {"nozzle_temper": 250}})))
        .await;
    wait_for(&monitor, "p1", |p| p.temperatures.nozzle == 250).await;
    monitor.shutdown().await;
    drop(endpoint);

    let states = Database::open(&db_path).unwrap().load_states().unwrap();
    assert_eq!(states.len(), 1);
    assert!((states[0].nozzle_temp - 250.0).abs() < f64::EPSILON);
    assert_eq!(states[0].status, "printing");
}

#[tokio::test]
async fn test_configured_printers_are_registered_on_start() {
    let monitor = started(MonitorConfig {
        printers: vec![config("a"), config("b")],
        ..demo_config(TransitionOdds::frozen())
    })
    .await;

    let ids: Vec<_> = monitor.printers().iter().map(|p| p.id.clone()).collect();
    assert_eq!(ids, ["a", "b"]);
    assert_eq!(monitor.database().unwrap().list_printers().unwrap().len(), 2);
    assert!(monitor.wait_until_settled(Duration::from_secs(5)).await);

    monitor.shutdown().await;
}

// ── Simulated backend ───────────────────────────────────────────────

#[tokio::test]
async fn test_simulated_printer_obeys_job_control() {
    let monitor = started(demo_config(TransitionOdds {
        initial_job: 1.0,
        ..TransitionOdds::frozen()
    }))
    .await;
    monitor.add_printer(config("sim")).await.unwrap();

    let printing = wait_for(&monitor, "sim", |p| p.status == PrinterStatus::Printing).await;
    assert!(printing.print.is_some());
    assert!(printing.filament.is_some());

    monitor.pause("sim").await.unwrap();
    wait_for(&monitor, "sim", |p| p.status == PrinterStatus::Paused).await;

    monitor.resume("sim").await.unwrap();
    wait_for(&monitor, "sim", |p| p.status == PrinterStatus::Printing).await;

    monitor.stop("sim").await.unwrap();
    let idle = wait_for(&monitor, "sim", |p| p.status == PrinterStatus::Idle).await;
    assert!(idle.print.is_none());
    assert!(idle.error.is_none());

    monitor.shutdown().await;
}
