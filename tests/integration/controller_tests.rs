//! Integration tests for the HeaterService → HeaterController → heater pin
//! pipeline: fault supervision, output timing and mode resolution.

use frostguard::adapters::memory_store::MemoryConfigStore;
use frostguard::app::commands::HeaterCommand;
use frostguard::app::events::HeaterEvent;
use frostguard::app::ports::ConfigPort;
use frostguard::app::service::HeaterService;
use frostguard::config::{HeaterConfig, LossPolicy, OutputType};
use frostguard::error::{CommandError, Error, FaultKind};
use frostguard::mode::ControlMode;

use super::mock_hw::{charging_config, HeaterWrite, MockIo, MockLink, MockTemps, RecordingSink};

struct Rig {
    svc: HeaterService<MemoryConfigStore>,
    temps: MockTemps,
    link: MockLink,
    io: MockIo,
    sink: RecordingSink,
}

impl Rig {
    fn new(config: HeaterConfig, temp_c: f32) -> Self {
        let store = MemoryConfigStore::with_config(&config).unwrap();
        let mut svc = HeaterService::new(store, 0);
        let mut sink = RecordingSink::new();
        svc.start(&mut sink);
        Self {
            svc,
            temps: MockTemps::at(temp_c),
            link: MockLink::default(),
            io: MockIo::new(),
            sink,
        }
    }

    fn tick(&mut self, now_ms: u32) {
        self.svc
            .tick(now_ms, &self.temps, &self.link, &mut self.io, &mut self.sink);
    }

    fn run(&mut self, from_ms: u32, to_ms: u32, step_ms: u32) {
        let mut t = from_ms;
        while t <= to_ms {
            self.tick(t);
            t += step_ms;
        }
    }

    fn command(&mut self, cmd: HeaterCommand, now_ms: u32) -> frostguard::error::Result<()> {
        self.svc.handle_command(cmd, now_ms, &mut self.sink)
    }
}

fn pwm_config() -> HeaterConfig {
    let mut c = charging_config();
    c.output.kind = OutputType::Pwm;
    c
}

// ── Faults ────────────────────────────────────────────────────

#[test]
fn over_temp_latches_and_cuts_output_on_the_same_tick() {
    let mut rig = Rig::new(pwm_config(), 5.0);
    rig.run(0, 5000, 500);
    assert!(rig.io.driven(), "heater should be on below target");

    rig.temps.primary = Some(51.0);
    rig.tick(5500);
    let h = rig.svc.heater();
    assert!(h.fault_latched().contains(FaultKind::OverTemp));
    assert_eq!(h.effective_mode(), ControlMode::Fault);
    assert_eq!(h.output_pct(), 0.0);
    assert_eq!(h.applied_pct(), 0.0);
    assert!(!h.heater_on());
    assert_eq!(rig.io.last_write(), Some(HeaterWrite::Duty(0)));
    assert!(rig.sink.contains(&HeaterEvent::FaultRaised(FaultKind::OverTemp)));
    assert!(rig.sink.contains(&HeaterEvent::ModeChanged {
        from: ControlMode::Charge,
        to: ControlMode::Fault,
    }));

    // Latch survives the condition clearing.
    rig.temps.primary = Some(20.0);
    rig.run(6000, 8000, 500);
    assert!(rig.svc.heater().fault_latched().contains(FaultKind::OverTemp));

    rig.command(HeaterCommand::ResetFaults, 8200).unwrap();
    rig.tick(8500);
    assert!(rig.svc.heater().fault_latched().is_empty());
    assert_eq!(rig.svc.heater().effective_mode(), ControlMode::Charge);
    assert!(rig.sink.contains(&HeaterEvent::FaultsCleared));
}

#[test]
fn inverted_pwm_drives_full_duty_when_off() {
    let mut c = pwm_config();
    c.output.invert = true;
    let mut rig = Rig::new(c, 30.0);
    rig.run(0, 3000, 500);
    assert!(!rig.svc.heater().heater_on());
    assert_eq!(rig.io.last_write(), Some(HeaterWrite::Duty(1023)));
}

#[test]
fn rate_runaway_trips_after_mode_change_grace() {
    let mut rig = Rig::new(charging_config(), -10.0);
    let mut t = 0;
    while t <= 70_000 {
        rig.temps.set_primary(-10.0 + t as f32 / 10_000.0, t);
        rig.tick(t);
        if t < 60_000 {
            assert!(
                !rig.svc.heater().fault_latched().contains(FaultKind::ThermalRunaway),
                "tripped inside grace at {t}"
            );
        }
        t += 1000;
    }
    assert!(rig.svc.heater().fault_latched().contains(FaultKind::ThermalRunaway));
    assert_eq!(rig.svc.heater().applied_pct(), 0.0);
}

#[test]
fn stuck_output_without_rise_latches() {
    let mut rig = Rig::new(charging_config(), 5.0);
    rig.command(
        HeaterCommand::StartOutputTest {
            pct: 80.0,
            duration_ms: 600_000,
        },
        0,
    )
    .unwrap();
    rig.run(0, 290_000, 1000);
    assert!(rig.svc.heater().fault_latched().is_empty());
    assert_eq!(rig.svc.heater().applied_pct(), 80.0);

    rig.run(291_000, 310_000, 1000);
    assert!(rig.svc.heater().fault_latched().contains(FaultKind::StuckOnNoHeat));
    assert_eq!(rig.svc.heater().applied_pct(), 0.0);

    assert_eq!(
        rig.command(
            HeaterCommand::StartOutputTest {
                pct: 10.0,
                duration_ms: 1000
            },
            311_000
        ),
        Err(Error::Command(CommandError::Faulted))
    );
}

#[test]
fn primary_never_seen_reports_unlatched_failure_after_boot_grace() {
    let mut rig = Rig::new(charging_config(), 5.0);
    rig.temps.primary = None;
    rig.run(0, 9000, 1000);
    assert!(rig.svc.heater().fault_active().is_empty());

    rig.tick(10_000);
    let h = rig.svc.heater();
    assert!(h.fault_active().contains(FaultKind::SensorPrimaryFail));
    assert!(h.fault_latched().is_empty());

    rig.temps.primary = Some(5.0);
    rig.tick(11_000);
    assert!(rig.svc.heater().fault_active().is_empty());
    assert_eq!(rig.svc.heater().effective_mode(), ControlMode::Charge);
}

#[test]
fn link_temperature_stands_in_for_missing_primary() {
    let mut c = charging_config();
    c.link.temp_fallback = true;
    let mut rig = Rig::new(c, 5.0);
    rig.temps.primary = None;
    rig.link.temp_c = Some(4.0);
    rig.run(0, 20_000, 1000);
    let temp = rig.svc.heater().control_temp();
    assert_eq!(temp.value_c, Some(4.0));
    assert!(temp.from_link);
    assert!(rig.svc.heater().fault_active().is_empty());
}

// ── Output timing ─────────────────────────────────────────────

#[test]
fn minimum_off_then_minimum_on_hold_to_the_millisecond() {
    let mut rig = Rig::new(charging_config(), 5.0);
    for t in [0, 1000, 1999] {
        rig.tick(t);
        assert_eq!(rig.svc.heater().applied_pct(), 0.0, "min-off at {t}");
    }
    rig.tick(2000);
    assert!(rig.svc.heater().applied_pct() > 0.0);

    rig.temps.primary = Some(30.0);
    for t in [3000, 3999] {
        rig.tick(t);
        assert!(rig.svc.heater().applied_pct() > 0.0, "min-on at {t}");
    }
    rig.tick(4000);
    assert_eq!(rig.svc.heater().applied_pct(), 0.0);
}

// ── Modes ─────────────────────────────────────────────────────

fn press_mode(rig: &mut Rig, t: u32) -> u32 {
    rig.io.mode_level = true;
    rig.tick(t);
    rig.tick(t + 60);
    rig.io.mode_level = false;
    rig.tick(t + 120);
    rig.tick(t + 180);
    t + 200
}

fn mode_switch_config(frost_enabled: bool) -> HeaterConfig {
    let mut c = charging_config();
    c.mode = ControlMode::Idle;
    c.frost_enabled = frost_enabled;
    c.inputs.mode.pin = Some(32);
    c
}

#[test]
fn mode_switch_cycles_through_frost_protect() {
    let mut rig = Rig::new(mode_switch_config(true), 5.0);
    rig.tick(0);
    let mut t = 100;
    let mut seen = Vec::new();
    for _ in 0..4 {
        t = press_mode(&mut rig, t);
        seen.push(rig.svc.heater().requested_mode());
    }
    assert_eq!(
        seen,
        [
            ControlMode::Charge,
            ControlMode::Discharge,
            ControlMode::FrostProtect,
            ControlMode::Idle
        ]
    );
}

#[test]
fn mode_switch_skips_frost_protect_when_disabled() {
    let mut rig = Rig::new(mode_switch_config(false), 5.0);
    rig.tick(0);
    let mut t = 100;
    let mut seen = Vec::new();
    for _ in 0..3 {
        t = press_mode(&mut rig, t);
        seen.push(rig.svc.heater().requested_mode());
    }
    assert_eq!(seen, [ControlMode::Charge, ControlMode::Discharge, ControlMode::Idle]);
}

#[test]
fn held_mode_switch_survives_config_reapply() {
    let c = mode_switch_config(true);
    let mut rig = Rig::new(c.clone(), 5.0);
    rig.io.mode_level = true;
    rig.run(0, 1000, 100);

    rig.command(HeaterCommand::ApplyConfig(Box::new(c)), 1000).unwrap();
    assert_eq!(rig.svc.heater().requested_mode(), ControlMode::Idle);
    rig.run(1100, 2000, 100);
    assert_eq!(rig.svc.heater().requested_mode(), ControlMode::Idle);
}

#[test]
fn link_loss_policy_selects_frost_protect() {
    let mut rig = Rig::new(charging_config(), 5.0);
    rig.link.timed_out = true;
    rig.tick(0);
    assert_eq!(rig.svc.heater().effective_mode(), ControlMode::FrostProtect);
    assert_eq!(rig.svc.heater().target(), 2.0);

    let mut c = charging_config();
    c.frost_enabled = false;
    let mut rig = Rig::new(c, 5.0);
    rig.link.timed_out = true;
    rig.tick(0);
    assert_eq!(rig.svc.heater().effective_mode(), ControlMode::Idle);
}

#[test]
fn keep_last_policy_keeps_requested_mode() {
    let mut c = charging_config();
    c.link.loss_policy = LossPolicy::KeepLast;
    let mut rig = Rig::new(c, 5.0);
    rig.link.timed_out = true;
    rig.tick(0);
    assert_eq!(rig.svc.heater().effective_mode(), ControlMode::Charge);
    assert!(rig.svc.heater().fault_active().is_empty());
}

#[test]
fn manual_switch_beats_external_mode_and_skips_the_ramp() {
    let mut c = charging_config();
    c.inputs.manual.pin = Some(33);
    let mut rig = Rig::new(c, 5.0);
    rig.link.mode = Some(ControlMode::Discharge);
    rig.tick(0);
    assert_eq!(rig.svc.heater().effective_mode(), ControlMode::Discharge);

    rig.io.manual_level = true;
    rig.run(1000, 3000, 500);
    let h = rig.svc.heater();
    assert_eq!(h.effective_mode(), ControlMode::Manual);
    assert_eq!(h.applied_pct(), 50.0);
}

#[test]
fn runtime_disable_keeps_mode_and_stops_output() {
    let mut rig = Rig::new(charging_config(), 5.0);
    rig.run(0, 3000, 500);
    assert!(rig.svc.heater().applied_pct() > 0.0);

    rig.command(HeaterCommand::SetEnabled(false), 3100).unwrap();
    rig.tick(3500);
    let status = rig.svc.status(3500);
    assert!(!status.enabled);
    assert!(!status.enabled_effective);
    assert_eq!(status.mode, ControlMode::Charge);
    assert_eq!(status.applied_pct, 0.0);
}

#[test]
fn apply_config_persists_and_resets_requested_mode() {
    let mut rig = Rig::new(charging_config(), 5.0);
    rig.command(HeaterCommand::SetMode(ControlMode::Discharge), 0).unwrap();
    rig.tick(0);
    assert_eq!(rig.svc.heater().effective_mode(), ControlMode::Discharge);

    let mut c = charging_config();
    c.targets.charge_c = 12.0;
    rig.command(HeaterCommand::ApplyConfig(Box::new(c.clone())), 100).unwrap();
    assert_eq!(rig.svc.heater().requested_mode(), ControlMode::Charge);
    rig.tick(200);
    assert_eq!(rig.svc.heater().target(), 12.0);
    assert!(rig.sink.contains(&HeaterEvent::ConfigApplied));

    assert_eq!(rig.svc.store().load().unwrap(), c);
}
