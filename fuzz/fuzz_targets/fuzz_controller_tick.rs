//! Fuzz target: `HeaterController::tick`
//!
//! Drives the controller with an arbitrary sequence of tick intervals,
//! primary/secondary readings and switch levels, and asserts after every
//! tick:
//! - No panics
//! - Output percentage within `[0, max_output_pct]`
//! - Any fault bit (active or latched) means zero output and heater off
//!
//! cargo fuzz run fuzz_controller_tick

#![no_main]

use frostguard::app::ports::{ExternalLink, HeaterActuator, InputId, InputPort, TemperatureSource};
use frostguard::config::HeaterConfig;
use frostguard::control::HeaterController;
use frostguard::mode::{ControlMode, SensorRole};
use libfuzzer_sys::fuzz_target;

#[derive(Default)]
struct Board {
    primary: Option<f32>,
    secondary: Option<f32>,
    updated_ms: Option<u32>,
    levels: u8,
    timed_out: bool,
}

impl TemperatureSource for Board {
    fn role_temp_c(&self, role: SensorRole) -> Option<f32> {
        match role {
            SensorRole::BatteryPrimary => self.primary,
            SensorRole::BatterySecondary => self.secondary,
            SensorRole::Ambient => None,
        }
    }

    fn last_scan_ms(&self) -> Option<u32> {
        None
    }

    fn last_update_ms(&self) -> Option<u32> {
        self.updated_ms
    }
}

impl ExternalLink for Board {
    fn external_mode(&self, _: u32) -> Option<ControlMode> {
        None
    }

    fn external_temp_c(&self, _: u32) -> Option<f32> {
        None
    }

    fn is_timed_out(&self, _: u32) -> bool {
        self.timed_out
    }
}

struct Io(u8);

impl InputPort for Io {
    fn read_level(&mut self, input: InputId) -> bool {
        let bit = match input {
            InputId::Enable => 0,
            InputId::Mode => 1,
            InputId::Manual => 2,
        };
        self.0 & (1 << bit) != 0
    }
}

impl HeaterActuator for Io {
    fn write_duty(&mut self, _: u32) {}

    fn write_level(&mut self, _: bool) {}
}

fn reading(byte: u8) -> Option<f32> {
    (byte != 0xff).then(|| f32::from(byte) / 4.0 - 20.0)
}

fuzz_target!(|data: &[u8]| {
    let mut cfg = HeaterConfig::default();
    cfg.enabled = true;
    cfg.mode = ControlMode::Charge;
    cfg.output.pin = Some(25);
    cfg.inputs.mode.pin = Some(32);
    cfg.inputs.manual.pin = Some(33);
    let max = cfg.output.max_output_pct;

    let mut ctl = HeaterController::new(cfg, 0);
    let mut board = Board::default();
    let mut now: u32 = 0;

    for chunk in data.chunks_exact(4) {
        now = now.wrapping_add(u32::from(chunk[0]) * 100);
        board.primary = reading(chunk[1]);
        board.secondary = reading(chunk[2]);
        board.updated_ms = Some(now);
        board.levels = chunk[3];
        board.timed_out = chunk[3] & 0x80 != 0;

        let mut io = Io(board.levels);
        ctl.tick(now, &board, &board, &mut io);

        let out = ctl.output_pct();
        assert!((0.0..=max).contains(&out), "output {out} out of range");
        assert!((0.0..=max).contains(&ctl.applied_pct()));
        let faulted = !ctl.fault_active().union(ctl.fault_latched()).is_empty();
        if faulted {
            assert_eq!(ctl.applied_pct(), 0.0);
            assert!(!ctl.heater_on());
        }
    }
});
