use crate::gear::hal::{BusPower, DimmingCurve, OutputDriver};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct OutputCtxt {
    rng: StdRng,
    lamp_ok: bool,
    eol_test: bool,
    level: Option<(DimmingCurve, u16)>,
    updates: usize,
}

/// LED driver stage that remembers the last output level. Clones share
/// state so tests can break the lamp or read the level.
#[derive(Clone)]
pub struct SimOutput {
    ctxt: Arc<Mutex<OutputCtxt>>,
}

impl SimOutput {
    pub fn new() -> SimOutput {
        SimOutput {
            ctxt: Arc::new(Mutex::new(OutputCtxt {
                rng: StdRng::seed_from_u64(0),
                lamp_ok: true,
                eol_test: false,
                level: None,
                updates: 0,
            })),
        }
    }

    pub fn set_lamp_ok(&self, ok: bool) {
        if let Ok(mut ctxt) = self.ctxt.lock() {
            ctxt.lamp_ok = ok;
        }
    }

    pub fn set_eol_test(&self, on: bool) {
        if let Ok(mut ctxt) = self.ctxt.lock() {
            ctxt.eol_test = on;
        }
    }

    /// Last output in tenths of a percent
    pub fn level(&self) -> Option<(DimmingCurve, u16)> {
        self.ctxt.lock().ok()?.level
    }

    pub fn updates(&self) -> usize {
        self.ctxt.lock().map(|c| c.updates).unwrap_or(0)
    }
}

impl Default for SimOutput {
    fn default() -> Self {
        SimOutput::new()
    }
}

impl OutputDriver for SimOutput {
    fn set_level(&mut self, curve: DimmingCurve, tenths: u16) {
        if let Ok(mut ctxt) = self.ctxt.lock() {
            ctxt.level = Some((curve, tenths));
            ctxt.updates += 1;
        }
    }

    fn status(&self) -> bool {
        self.ctxt.lock().map(|c| c.lamp_ok).unwrap_or(false)
    }

    fn eol_test_mode(&self) -> bool {
        self.ctxt.lock().map(|c| c.eol_test).unwrap_or(false)
    }

    fn seed_random(&mut self, seed: u32) {
        if let Ok(mut ctxt) = self.ctxt.lock() {
            ctxt.rng = StdRng::seed_from_u64(seed as u64);
        }
    }

    fn generate_random(&mut self) -> u8 {
        match self.ctxt.lock() {
            Ok(mut ctxt) => ctxt.rng.gen(),
            Err(_) => 0xff,
        }
    }
}

/// Bus supply that a test can switch on and off
#[derive(Clone)]
pub struct SimBusPower {
    powered: Arc<AtomicBool>,
}

impl SimBusPower {
    pub fn new(powered: bool) -> SimBusPower {
        SimBusPower {
            powered: Arc::new(AtomicBool::new(powered)),
        }
    }

    pub fn set(&self, powered: bool) {
        self.powered.store(powered, Ordering::SeqCst);
    }
}

impl BusPower for SimBusPower {
    fn powered(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }
}
