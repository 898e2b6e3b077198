// ── Demo simulator ──
//
// A random walk over printer states that produces Bambu-shaped report
// documents through the regular link contract. Everything downstream of
// the link (merge, inference, store, persistence) runs unchanged.

use std::time::Duration;

use printpulse_api::{
    LinkEndpoint, LinkEvent, LinkHandle, PrinterRequest, RequestEnvelope, SpeedLevel, link_channel,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::model::PrinterConfig;

const AMBIENT: f64 = 25.0;
const NOZZLE_PRINTING: f64 = 220.0;
const BED_PRINTING: f64 = 60.0;
const CHAMBER_PRINTING: f64 = 35.0;
const NOISE: f64 = 2.0;
/// Share of the remaining gap to target closed each tick.
const DRIFT: f64 = 0.25;

const JOB_NAMES: &[&str] = &[
    "benchy",
    "calibration_cube",
    "phone_stand",
    "cable_clip",
    "gearbox_housing",
    "planter",
    "lithophane",
];

const FAULT_CODES: &[(i64, i64)] = &[(1, 1203), (1, 1204), (1, 1205), (1, 0), (2, 0), (3, 0)];

// ── Configuration ────────────────────────────────────────────────────

/// Per-tick transition probabilities, each in `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOdds {
    /// Chance a printer is already mid-print when the simulation starts.
    pub initial_job: f64,
    pub start: f64,
    pub pause: f64,
    pub fail: f64,
    pub resume: f64,
    /// Error clears back to idle.
    pub recover: f64,
}

impl Default for TransitionOdds {
    fn default() -> Self {
        Self {
            initial_job: 0.4,
            start: 0.05,
            pause: 0.02,
            fail: 0.01,
            resume: 0.30,
            recover: 0.20,
        }
    }
}

impl TransitionOdds {
    /// Odds under which nothing ever changes on its own.
    pub fn frozen() -> Self {
        Self {
            initial_job: 0.0,
            start: 0.0,
            pause: 0.0,
            fail: 0.0,
            resume: 0.0,
            recover: 0.0,
        }
    }
}

/// Simulator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub tick: Duration,
    /// Fixed seed for reproducible runs. Mixed with the printer id so
    /// printers sharing a seed still diverge.
    pub seed: Option<u64>,
    pub transitions: TransitionOdds,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(2),
            seed: None,
            transitions: TransitionOdds::default(),
        }
    }
}

// ── Simulator ────────────────────────────────────────────────────────

/// Spawner for simulated printer links.
pub struct Simulator;

impl Simulator {
    /// Spawn a simulated printer and return its link handle.
    ///
    /// The task stops when `cancel` fires or the handle is dropped.
    pub fn spawn(
        printer: &PrinterConfig,
        config: &SimConfig,
        cancel: CancellationToken,
    ) -> LinkHandle {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(mix_seed(seed, &printer.id)),
            None => StdRng::from_entropy(),
        };
        let sim = SimPrinter::new(&printer.id, &printer.serial, rng, config.transitions.clone());
        let (handle, endpoint) = link_channel();

        tokio::spawn(run(sim, endpoint, config.tick, cancel));
        handle
    }
}

/// The fleet shown in demo mode.
pub fn demo_printers() -> Vec<PrinterConfig> {
    [
        ("x1c-studio", "Studio X1C", "X1C", "192.168.1.101", "00M00A280100001"),
        ("p1s-garage", "Garage P1S", "P1S", "192.168.1.102", "01P00A380200002"),
        ("a1-mini-desk", "Desk A1 mini", "A1 mini", "192.168.1.103", "0300AA390300003"),
    ]
    .into_iter()
    .map(|(id, name, model, ip, serial)| PrinterConfig {
        id: id.into(),
        name: name.into(),
        model: model.into(),
        ip: ip.into(),
        access_code: SecretString::from("demo0000".to_string()),
        serial: serial.into(),
    })
    .collect()
}

fn mix_seed(seed: u64, id: &str) -> u64 {
    id.bytes()
        .fold(seed, |acc, byte| acc.rotate_left(7) ^ u64::from(byte))
}

async fn run(
    mut sim: SimPrinter,
    endpoint: LinkEndpoint,
    tick: Duration,
    cancel: CancellationToken,
) {
    let LinkEndpoint { events, mut requests } = endpoint;
    let mut interval = tokio::time::interval(tick);
    // The first tick completes immediately.
    interval.tick().await;

    info!(printer = %sim.id, "simulated printer online");
    if !emit(&events, LinkEvent::Connected).await || !emit(&events, sim.report()).await {
        return;
    }

    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Some(envelope) = requests.recv() => {
                let RequestEnvelope { request, reply } = envelope;
                sim.handle(&request);
                let _ = reply.send(Ok(()));
                sim.report()
            }
            _ = interval.tick() => {
                sim.step();
                sim.report()
            }
        };

        if !emit(&events, event).await {
            break;
        }
    }

    debug!(printer = %sim.id, "simulated printer stopped");
}

async fn emit(events: &mpsc::Sender<LinkEvent>, event: LinkEvent) -> bool {
    events.send(event).await.is_ok()
}

// ── Simulated printer state ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Printing,
    Paused,
    Faulted,
}

#[derive(Debug, Clone)]
struct SimJob {
    name: &'static str,
    /// Percent.
    progress: f64,
    total_layers: i64,
    total_minutes: i64,
}

impl SimJob {
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::as_conversions)]
    fn remaining_minutes(&self) -> i64 {
        (self.total_minutes as f64 * (1.0 - self.progress / 100.0)).ceil() as i64
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::as_conversions)]
    fn layer(&self) -> i64 {
        ((self.total_layers as f64 * self.progress / 100.0).floor() as i64).max(1)
    }
}

#[derive(Debug, Clone)]
struct SimTray {
    kind: &'static str,
    color: &'static str,
    remain: f64,
}

struct SimPrinter {
    id: String,
    serial: String,
    rng: StdRng,
    odds: TransitionOdds,
    phase: Phase,
    job: Option<SimJob>,
    /// The next report announces a finished job.
    finished: bool,
    fault: (i64, i64),
    nozzle: f64,
    bed: f64,
    chamber: f64,
    speed: SpeedLevel,
    light_on: bool,
    trays: Vec<SimTray>,
    active_tray: usize,
}

impl SimPrinter {
    fn new(id: &str, serial: &str, rng: StdRng, odds: TransitionOdds) -> Self {
        let mut sim = Self {
            id: id.to_owned(),
            serial: serial.to_owned(),
            rng,
            odds,
            phase: Phase::Idle,
            job: None,
            finished: false,
            fault: (0, 0),
            nozzle: AMBIENT,
            bed: AMBIENT,
            chamber: AMBIENT,
            speed: SpeedLevel::Standard,
            light_on: true,
            trays: vec![
                SimTray { kind: "PLA", color: "FFFFFFFF", remain: 80.0 },
                SimTray { kind: "PETG", color: "161616FF", remain: 45.0 },
                SimTray { kind: "PLA", color: "FF6A13FF", remain: 100.0 },
                SimTray { kind: "ABS", color: "2850E0FF", remain: 20.0 },
            ],
            active_tray: 0,
        };

        if sim.chance(sim.odds.initial_job) {
            sim.start_job();
            if let Some(job) = sim.job.as_mut() {
                job.progress = sim.rng.gen_range(5.0..60.0);
            }
            sim.nozzle = NOZZLE_PRINTING;
            sim.bed = BED_PRINTING;
        }
        sim
    }

    fn chance(&mut self, odds: f64) -> bool {
        let p = if odds.is_finite() { odds.clamp(0.0, 1.0) } else { 0.0 };
        self.rng.gen_bool(p)
    }

    /// Advance one tick: maybe transition, then move progress and temperatures.
    fn step(&mut self) {
        match self.phase {
            Phase::Idle => {
                if self.chance(self.odds.start) {
                    self.start_job();
                }
            }
            Phase::Printing => {
                if self.chance(self.odds.fail) {
                    self.fail();
                } else if self.chance(self.odds.pause) {
                    self.set_phase(Phase::Paused);
                } else {
                    self.advance_job();
                }
            }
            Phase::Paused => {
                if self.chance(self.odds.resume) {
                    self.set_phase(Phase::Printing);
                }
            }
            Phase::Faulted => {
                if self.chance(self.odds.recover) {
                    self.fault = (0, 0);
                    self.end_job();
                }
            }
        }

        self.drift_temperatures();
    }

    fn handle(&mut self, request: &PrinterRequest) {
        debug!(printer = %self.id, action = request.action(), "simulator request");
        match request {
            PrinterRequest::Pause if self.phase == Phase::Printing => {
                self.set_phase(Phase::Paused);
            }
            PrinterRequest::Resume if self.phase == Phase::Paused => {
                self.set_phase(Phase::Printing);
            }
            PrinterRequest::Stop if self.phase != Phase::Idle => {
                self.fault = (0, 0);
                self.end_job();
            }
            PrinterRequest::SetSpeed(level) => self.speed = *level,
            PrinterRequest::SetLight { on } => self.light_on = *on,
            _ => {}
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!(printer = %self.id, from = ?self.phase, to = ?phase, "simulated transition");
            self.phase = phase;
        }
    }

    fn start_job(&mut self) {
        let name = JOB_NAMES[self.rng.gen_range(0..JOB_NAMES.len())];
        self.active_tray = self.rng.gen_range(0..self.trays.len());
        self.job = Some(SimJob {
            name,
            progress: 0.0,
            total_layers: self.rng.gen_range(120..=450),
            total_minutes: self.rng.gen_range(25..=240),
        });
        self.finished = false;
        self.set_phase(Phase::Printing);
    }

    fn fail(&mut self) {
        self.fault = FAULT_CODES[self.rng.gen_range(0..FAULT_CODES.len())];
        self.set_phase(Phase::Faulted);
    }

    fn end_job(&mut self) {
        self.job = None;
        self.finished = true;
        self.set_phase(Phase::Idle);
    }

    fn advance_job(&mut self) {
        let factor = match self.speed {
            SpeedLevel::Silent => 0.5,
            SpeedLevel::Standard => 1.0,
            SpeedLevel::Sport => 1.5,
            SpeedLevel::Ludicrous => 2.0,
        };
        let step = self.rng.gen_range(0.5..2.5) * factor;

        if let Some(tray) = self.trays.get_mut(self.active_tray) {
            tray.remain = (tray.remain - step * 0.05).max(0.0);
        }

        let done = match self.job.as_mut() {
            Some(job) => {
                job.progress = (job.progress + step).min(100.0);
                job.progress >= 100.0
            }
            None => true,
        };
        if done {
            self.end_job();
        }
    }

    fn targets(&self) -> (f64, f64, f64) {
        match self.phase {
            Phase::Printing | Phase::Paused => (NOZZLE_PRINTING, BED_PRINTING, CHAMBER_PRINTING),
            Phase::Idle | Phase::Faulted => (AMBIENT, AMBIENT, AMBIENT),
        }
    }

    fn drift_temperatures(&mut self) {
        let (nozzle, bed, chamber) = self.targets();
        self.nozzle = self.drift(self.nozzle, nozzle);
        self.bed = self.drift(self.bed, bed);
        self.chamber = self.drift(self.chamber, chamber);
    }

    fn drift(&mut self, current: f64, target: f64) -> f64 {
        let noise = self.rng.gen_range(-NOISE..=NOISE);
        (current + (target - current) * DRIFT + noise).max(AMBIENT - NOISE)
    }

    fn gcode_state(&self) -> &'static str {
        match self.phase {
            Phase::Idle if self.finished => "FINISH",
            Phase::Idle => "IDLE",
            Phase::Printing => "RUNNING",
            Phase::Paused | Phase::Faulted => "PAUSE",
        }
    }

    /// Full report document for the current state.
    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    fn report(&mut self) -> LinkEvent {
        let (percent, remaining, layer, total_layers, name) = match &self.job {
            Some(job) => (
                job.progress.floor() as i64,
                job.remaining_minutes(),
                job.layer(),
                job.total_layers,
                job.name,
            ),
            None => (0, 0, 0, 0, ""),
        };
        let (nozzle_target, bed_target, _) = self.targets();
        let fan = if self.phase == Phase::Printing {
            self.rng.gen_range(8..=15)
        } else {
            0
        };
        let stage = match self.phase {
            Phase::Paused => 2,
            Phase::Faulted => 3,
            Phase::Idle | Phase::Printing => 0,
        };

        let document = json!({
            "print": {
                "command": "push_status",
                "sequence_id": printpulse_api::request::next_sequence_id(),
                "gcode_state": self.gcode_state(),
                "mc_percent": percent,
                "mc_remaining_time": remaining,
                "layer_num": layer,
                "total_layer_num": total_layers,
                "subtask_name": name,
                "print_type": if self.job.is_some() { "local" } else { "idle" },
                "print_error": self.fault.0,
                "mc_print_error_code": self.fault.1.to_string(),
                "stg_cur": stage,
                "fan_gear": fan,
                "spd_lvl": self.speed.level(),
                "lifecycle": "product",
                "nozzle_temper": round_tenth(self.nozzle),
                "nozzle_target_temper": nozzle_target,
                "bed_temper": round_tenth(self.bed),
                "bed_target_temper": bed_target,
                "chamber_temper": round_tenth(self.chamber),
                "ams": self.ams(),
                "lights_report": [
                    {"node": "chamber_light", "mode": if self.light_on { "on" } else { "off" }}
                ],
                "serial": self.serial,
            }
        });

        self.finished = false;
        LinkEvent::Report(document)
    }

    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    fn ams(&self) -> Value {
        let trays: Vec<Value> = self
            .trays
            .iter()
            .enumerate()
            .map(|(slot, tray)| {
                json!({
                    "id": slot.to_string(),
                    "tray_type": tray.kind,
                    "tray_color": tray.color,
                    "remain": tray.remain.round() as i64,
                })
            })
            .collect();

        json!({
            "tray_now": self.active_tray.to_string(),
            "ams": [{"id": "0", "humidity": "4", "temp": "24.0", "tray": trays}],
        })
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
