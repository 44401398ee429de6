//! FrostGuard host simulator.
//!
//! Runs the heater service against a first-order battery pack model in
//! accelerated virtual time: a full relay autotune session, a commit of
//! the identified gains, then a stretch of closed-loop PID control.
//!
//! ```text
//!  ┌──────────────┐  applied %  ┌──────────────┐
//!  │ HeaterService│ ──────────▶ │  PackModel   │
//!  │  (frostguard)│ ◀────────── │ (1st order)  │
//!  └──────────────┘  temp °C    └──────────────┘
//! ```
//!
//! Usage: `frostguard-sim [conservative|normal|aggressive]`
#![deny(unused_must_use)]

use anyhow::{anyhow, Result};
use log::info;

use frostguard::adapters::link::LinkMonitor;
use frostguard::adapters::log_sink::LogEventSink;
use frostguard::adapters::memory_store::MemoryConfigStore;
use frostguard::adapters::time::MonotonicClock;
use frostguard::app::commands::HeaterCommand;
use frostguard::app::ports::{ConfigPort, HeaterActuator, InputId, InputPort, TemperatureSource};
use frostguard::app::service::HeaterService;
use frostguard::autotune::{Aggressiveness, AutotunePhase};
use frostguard::config::HeaterConfig;
use frostguard::error::Error;
use frostguard::mode::{ControlMode, SensorRole};

const STEP_MS: u32 = 1000;
const SESSION_LIMIT_MS: u32 = 4 * 3600 * 1000;
const CLOSED_LOOP_MS: u32 = 30 * 60 * 1000;
const REPORT_EVERY_MS: u32 = 5 * 60 * 1000;

// ── Plant model ───────────────────────────────────────────────

/// Lumped battery pack: heater power in, loss to ambient out.
struct PackModel {
    temp_c: f32,
    ambient_c: f32,
    /// °C/min per % of heater output.
    gain: f32,
    /// Loss coefficient, 1/min.
    loss: f32,
    updated_ms: u32,
}

impl PackModel {
    fn advance(&mut self, applied_pct: f32, dt_ms: u32, now_ms: u32) {
        let dt_min = dt_ms as f32 / 60_000.0;
        let rate = applied_pct * self.gain - (self.temp_c - self.ambient_c) * self.loss;
        self.temp_c += rate * dt_min;
        self.updated_ms = now_ms;
    }
}

impl TemperatureSource for PackModel {
    fn role_temp_c(&self, role: SensorRole) -> Option<f32> {
        match role {
            SensorRole::BatteryPrimary => Some(self.temp_c),
            SensorRole::BatterySecondary => Some(self.temp_c + 0.2),
            SensorRole::Ambient => Some(self.ambient_c),
        }
    }

    fn last_scan_ms(&self) -> Option<u32> {
        None
    }

    fn last_update_ms(&self) -> Option<u32> {
        Some(self.updated_ms)
    }
}

// ── Board ─────────────────────────────────────────────────────

/// No switches fitted; the heater pin level is only counted.
#[derive(Default)]
struct SimBoard {
    high_ms: u64,
    level: bool,
}

impl InputPort for SimBoard {
    fn read_level(&mut self, _input: InputId) -> bool {
        false
    }
}

impl HeaterActuator for SimBoard {
    fn write_duty(&mut self, duty: u32) {
        self.level = duty > 0;
    }

    fn write_level(&mut self, high: bool) {
        self.level = high;
    }
}

fn sim_config() -> HeaterConfig {
    let mut c = HeaterConfig::default();
    c.enabled = true;
    c.mode = ControlMode::Charge;
    c.output.pin = Some(25);
    c.one_wire_pin = Some(26);
    c
}

// ── Simulation loop ───────────────────────────────────────────

struct Sim {
    svc: HeaterService<MemoryConfigStore>,
    link: LinkMonitor,
    pack: PackModel,
    board: SimBoard,
    sink: LogEventSink,
    now_ms: u32,
}

impl Sim {
    fn step(&mut self) {
        let next = self.now_ms + STEP_MS;
        self.pack.advance(self.svc.heater().applied_pct(), STEP_MS, next);
        if self.board.level {
            self.board.high_ms += u64::from(STEP_MS);
        }
        self.now_ms = next;
        self.svc
            .tick(next, &self.pack, &self.link, &mut self.board, &mut self.sink);

        if next % REPORT_EVERY_MS == 0 {
            let s = self.svc.status(next);
            info!(
                "t={:>5}s temp={:.2} target={:.2} out={:.1}% tune={} {}%",
                next / 1000,
                self.pack.temp_c,
                s.target_c,
                s.applied_pct,
                s.autotune.phase,
                s.autotune.progress_pct
            );
        }
    }

    fn command(&mut self, cmd: HeaterCommand) -> frostguard::error::Result<()> {
        self.svc.handle_command(cmd, self.now_ms, &mut self.sink)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let aggressiveness = match std::env::args().nth(1) {
        Some(name) => name
            .parse::<Aggressiveness>()
            .map_err(|_| anyhow!("unknown aggressiveness '{name}'"))?,
        None => Aggressiveness::Normal,
    };

    info!("FrostGuard simulator v{}", env!("CARGO_PKG_VERSION"));

    let clock = MonotonicClock::new();
    let config = sim_config();
    let store = MemoryConfigStore::new();
    store.save(&config).map_err(Error::from)?;

    let mut link = LinkMonitor::new(&config.link);
    link.set_connected(true, 0);

    let mut sim = Sim {
        svc: HeaterService::new(store, 0),
        link,
        pack: PackModel {
            temp_c: 2.0,
            ambient_c: 0.0,
            gain: 0.04,
            loss: 0.02,
            updated_ms: 0,
        },
        board: SimBoard::default(),
        sink: LogEventSink::new(),
        now_ms: 0,
    };
    sim.svc.start(&mut sim.sink);
    sim.svc.tick(0, &sim.pack, &sim.link, &mut sim.board, &mut sim.sink);

    // ── Autotune session ──────────────────────────────────────
    sim.command(HeaterCommand::StartAutotune {
        auto_save: false,
        aggressiveness,
        max_duration_s: 0,
    })?;
    while sim.svc.autotune().is_running() && sim.now_ms < SESSION_LIMIT_MS {
        sim.step();
    }

    let phase = sim.svc.autotune().phase();
    if phase != AutotunePhase::Finished {
        let reason = sim.svc.autotune().last_error();
        return Err(anyhow!("autotune ended in {phase} ({reason:?})"));
    }
    sim.command(HeaterCommand::CommitAutotune)?;

    // ── Closed loop with the new gains ────────────────────────
    let until = sim.now_ms + CLOSED_LOOP_MS;
    while sim.now_ms < until {
        sim.step();
    }

    let status = sim.svc.status(sim.now_ms);
    println!("{}", serde_json::to_string_pretty(&status)?);
    info!(
        "simulated {} s in {} ms, heater pin high for {} s, final temp {:.2} C",
        sim.now_ms / 1000,
        clock.now_ms(),
        sim.board.high_ms / 1000,
        sim.pack.temp_c
    );
    Ok(())
}
