//! Integration tests for autotune sessions driven through the service, with
//! the real controller in the loop and a first-order plant fed by the
//! applied output.

use frostguard::adapters::memory_store::MemoryConfigStore;
use frostguard::app::commands::HeaterCommand;
use frostguard::app::events::HeaterEvent;
use frostguard::app::ports::ConfigPort;
use frostguard::app::service::HeaterService;
use frostguard::autotune::plan::RateClass;
use frostguard::autotune::rules::TuningRule;
use frostguard::autotune::{Aggressiveness, AutotunePhase, FailReason, QUALITY_THRESHOLD};
use frostguard::config::{ControlAlgorithm, HeaterConfig};
use frostguard::control::ControlAuthority;
use frostguard::error::{CommandError, Error, FaultKind};

use super::mock_hw::{charging_config, MockIo, MockLink, MockTemps, RecordingSink};

/// °C/min per % of applied output, and the constant loss.
const PLANT_GAIN: f32 = 0.0375;
const PLANT_LOSS: f32 = 0.65;
const STEP_MS: u32 = 1000;

struct Bench {
    svc: HeaterService<MemoryConfigStore>,
    temps: MockTemps,
    link: MockLink,
    io: MockIo,
    sink: RecordingSink,
    temp_c: f32,
    now_ms: u32,
}

impl Bench {
    fn new(config: HeaterConfig) -> Self {
        let store = MemoryConfigStore::with_config(&config).unwrap();
        let mut bench = Self {
            svc: HeaterService::new(store, 0),
            temps: MockTemps::at(10.0),
            link: MockLink::default(),
            io: MockIo::new(),
            sink: RecordingSink::new(),
            temp_c: 10.0,
            now_ms: 0,
        };
        bench.svc.start(&mut bench.sink);
        bench.tick();
        bench
    }

    fn tick(&mut self) {
        self.temps.primary = Some(self.temp_c);
        self.svc
            .tick(self.now_ms, &self.temps, &self.link, &mut self.io, &mut self.sink);
    }

    /// Advance the plant by one step, then tick.
    fn step(&mut self) {
        let applied = self.svc.heater().applied_pct();
        self.temp_c += (applied * PLANT_GAIN - PLANT_LOSS) * STEP_MS as f32 / 60_000.0;
        self.now_ms += STEP_MS;
        self.tick();
    }

    fn run_session(&mut self, limit_ms: u32) {
        while self.svc.autotune().is_running() && self.now_ms < limit_ms {
            self.step();
        }
    }

    fn command(&mut self, cmd: HeaterCommand) -> frostguard::error::Result<()> {
        self.svc.handle_command(cmd, self.now_ms, &mut self.sink)
    }
}

fn start(auto_save: bool) -> HeaterCommand {
    HeaterCommand::StartAutotune {
        auto_save,
        aggressiveness: Aggressiveness::Normal,
        max_duration_s: 0,
    }
}

#[test]
fn session_finishes_and_commit_installs_pid_gains() {
    let mut config = charging_config();
    config.algorithm = ControlAlgorithm::Hysteresis;
    let mut b = Bench::new(config);
    b.command(start(false)).unwrap();
    assert!(matches!(b.svc.heater().authority(), ControlAuthority::Autotune { .. }));

    b.run_session(7_200_000);

    let at = b.svc.autotune();
    assert_eq!(at.phase(), AutotunePhase::Finished, "error {:?}", at.last_error());
    assert_eq!(b.svc.heater().authority(), ControlAuthority::Internal);
    let status = b.svc.status(b.now_ms);
    assert_eq!(status.autotune.detected_class, Some(RateClass::Medium));
    assert_eq!(status.autotune.result_id, 1);
    assert!(!status.override_active);

    let result = *at.result();
    assert!(result.valid);
    assert!(result.quality >= QUALITY_THRESHOLD);
    assert_eq!(result.rule, Some(TuningRule::ZieglerNichols));

    // Not saved until asked.
    assert_eq!(b.svc.config().algorithm, ControlAlgorithm::Hysteresis);
    b.command(HeaterCommand::CommitAutotune).unwrap();
    let cfg = b.svc.config();
    assert_eq!(cfg.algorithm, ControlAlgorithm::Pid);
    assert_eq!(cfg.pid.kp, result.gains.kp);
    assert_eq!(cfg.pid.ki, result.gains.ki);
    assert_eq!(cfg.pid.kd, result.gains.kd);
    assert_eq!(b.svc.store().load().unwrap().pid.kp, result.gains.kp);
    assert!(b.sink.contains(&HeaterEvent::GainsCommitted(result.gains)));

    b.command(HeaterCommand::DiscardAutotune).unwrap();
    assert_eq!(b.svc.autotune().phase(), AutotunePhase::Idle);
    assert_eq!(b.svc.autotune().result_id(), 1);
}

#[test]
fn auto_save_commits_on_finish() {
    let mut b = Bench::new(charging_config());
    b.command(start(true)).unwrap();
    b.run_session(7_200_000);

    assert_eq!(b.svc.autotune().phase(), AutotunePhase::Finished);
    let gains = b.svc.autotune().result().gains;
    assert_eq!(b.svc.store().load().unwrap().pid.kp, gains.kp);
    assert_eq!(
        b.sink
            .events
            .iter()
            .filter(|e| matches!(e, HeaterEvent::GainsCommitted(_)))
            .count(),
        1
    );

    let phases: Vec<_> = b
        .sink
        .events
        .iter()
        .filter_map(|e| match e {
            HeaterEvent::AutotunePhaseChanged { to, .. } => Some(*to),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        [AutotunePhase::ProbeRunning, AutotunePhase::TuneRunning, AutotunePhase::Finished]
    );
}

#[test]
fn over_temp_mid_session_fails_with_safety_fault() {
    let mut b = Bench::new(charging_config());
    b.command(start(false)).unwrap();
    for _ in 0..30 {
        b.step();
    }
    b.temp_c = 51.0;
    b.step();

    let at = b.svc.autotune();
    assert_eq!(at.phase(), AutotunePhase::Failed);
    assert_eq!(at.last_error(), Some(FailReason::SafetyFault));
    assert_eq!(b.svc.heater().authority(), ControlAuthority::Internal);
    assert!(b.svc.heater().fault_latched().contains(FaultKind::OverTemp));
    assert_eq!(b.svc.heater().applied_pct(), 0.0);
}

#[test]
fn start_rejected_while_disabled() {
    let mut config = charging_config();
    config.enabled = false;
    let mut b = Bench::new(config);
    assert_eq!(
        b.command(start(false)),
        Err(Error::Command(CommandError::Disabled))
    );
    assert_eq!(b.svc.autotune().phase(), AutotunePhase::Idle);
}

#[test]
fn output_test_rejected_while_session_owns_the_heater() {
    let mut b = Bench::new(charging_config());
    b.command(start(false)).unwrap();
    assert_eq!(
        b.command(HeaterCommand::StartOutputTest {
            pct: 50.0,
            duration_ms: 1000
        }),
        Err(Error::Command(CommandError::OverrideActive))
    );

    b.command(HeaterCommand::AbortAutotune).unwrap();
    assert_eq!(b.svc.autotune().phase(), AutotunePhase::Aborted);
    assert_eq!(b.svc.autotune().last_error(), Some(FailReason::Aborted));
    assert_eq!(b.svc.heater().authority(), ControlAuthority::Internal);
    assert_eq!(
        b.command(HeaterCommand::CommitAutotune),
        Err(Error::Command(CommandError::AutotuneNotFinished))
    );
}

#[test]
fn runtime_disable_fails_running_session() {
    let mut b = Bench::new(charging_config());
    b.command(start(false)).unwrap();
    b.step();
    b.command(HeaterCommand::SetEnabled(false)).unwrap();
    b.step();
    assert_eq!(b.svc.autotune().last_error(), Some(FailReason::Disabled));
}
