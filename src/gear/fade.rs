//! Ramp of the actual level toward the requested level.

use crate::defs::gear::cmd;
use crate::gear::hal::{DimmingCurve, OutputDriver};
use crate::gear::state::{ControlState, FadeDirection, LEVEL_RESET};

/// Fade time in microseconds, indexed by the fade time parameter
pub const FADE_TIMES_US: [u32; 16] = [
    0, 700_000, 1_000_000, 1_400_000, 2_000_000, 2_800_000, 4_000_000, 5_700_000, 8_000_000,
    11_300_000, 16_000_000, 22_600_000, 32_000_000, 45_300_000, 64_000_000, 90_500_000,
];

/// Microseconds per step, indexed by the fade rate parameter
pub const FADE_RATES_US: [u32; 16] = [
    0, 2793, 3953, 5587, 7874, 11186, 15797, 22371, 31646, 44643, 66667, 89286, 126582, 178571,
    250000, 357142,
];

pub const FAST_FADE_TIME_US: u32 = 25_000;
pub const MAX_FAST_FADE_TIME: u8 = 27;
/// Length of an UP or DOWN ramp in fade ticks
pub const UP_DOWN_FADE_TICKS: u32 = 200;

/// Logarithmic dimming curve in tenths of a percent
pub const DIM_PERCENT: [u16; 255] = [
    0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, //
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2, //
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 3, 3, 3, 3, 3, 3, //
    3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 5, 5, //
    5, 5, 5, 6, 6, 6, 6, 6, 6, 7, 7, 7, 7, 7, 8, 8, //
    8, 8, 9, 9, 9, 9, 10, 10, 10, 11, 11, 11, 12, 12, 12, 13, //
    13, 13, 14, 14, 14, 15, 15, 16, 16, 17, 17, 18, 18, 19, 19, 20, //
    20, 21, 21, 22, 23, 23, 24, 25, 25, 26, 27, 27, 28, 29, 30, 31, //
    32, 32, 33, 34, 35, 36, 37, 38, 39, 40, 42, 43, 44, 45, 46, 48, //
    49, 50, 52, 53, 55, 56, 58, 60, 61, 63, 65, 67, 68, 70, 72, 74, //
    76, 78, 81, 83, 85, 88, 90, 92, 95, 98, 100, 103, 106, 109, 112, 115, //
    118, 122, 125, 129, 132, 136, 140, 143, 147, 151, 156, 160, 164, 169, 174, 179, //
    184, 189, 194, 199, 205, 210, 216, 222, 228, 235, 241, 248, 255, 262, 269, 277, //
    284, 292, 300, 309, 317, 326, 335, 344, 354, 364, 374, 384, 395, 406, 417, 428, //
    440, 453, 465, 478, 491, 505, 519, 533, 548, 563, 579, 595, 611, 628, 646, 663, //
    682, 701, 720, 740, 761, 782, 803, 826, 848, 872, 896, 921, 946, 973, 1000,
];

pub fn curve_output(curve: DimmingCurve, level: u8) -> u16 {
    match curve {
        DimmingCurve::Linear => (level.min(LEVEL_RESET) as u32 * 1000 / 254) as u16,
        DimmingCurve::Logarithmic => DIM_PERCENT
            .get(level as usize)
            .copied()
            .unwrap_or(1000),
    }
}

/// Set up a fade from the actual level to the requested level.
pub fn start_output_change(state: &mut ControlState) {
    if state.requested_level == cmd::MASK {
        state.requested_level = state.actual_level;
        state.fade.period = 0;
        state.status.fade_running = false;
        return;
    }
    state.flags.fade_rate_requested = false;
    state.fade.counter = 0;
    state.status.limit_error = false;

    let min = state.params.min_level;
    let max = state.params.max_level;
    if state.requested_level != 0 && state.requested_level < min {
        state.requested_level = min;
        state.status.limit_error = true;
    } else if state.requested_level > max {
        state.requested_level = max;
        state.status.limit_error = true;
    }

    let fade_time = state.params.fade_time as usize;
    let mut period = if fade_time != 0 {
        FADE_TIMES_US[fade_time & 0x0f]
    } else {
        state.params.fast_fade_time as u32 * FAST_FADE_TIME_US
    };

    let actual = state.actual_level as u32;
    let requested = state.requested_level as u32;
    let min = min as u32;
    let steps = if requested > actual + 1 {
        state.fade.direction = FadeDirection::Up;
        if actual == 0 {
            requested.saturating_sub(min) + 1
        } else {
            requested - actual
        }
    } else if requested + 1 < actual {
        state.fade.direction = FadeDirection::Down;
        if requested == 0 {
            actual.saturating_sub(min) + 1
        } else {
            actual - requested
        }
    } else {
        state.fade.direction = FadeDirection::None;
        period = 0;
        0
    };

    state.fade.period = period;
    if period == 0 {
        state.fade.increment = 0;
        state.actual_level = state.requested_level;
        state.status.fade_running = false;
    } else {
        state.fade.increment = period / steps.max(1);
        state.status.fade_running = true;
    }
}

fn step(state: &mut ControlState) {
    let min = state.params.min_level;
    let max = state.params.max_level;
    match state.fade.direction {
        FadeDirection::Up => {
            if state.actual_level == 0 {
                state.actual_level = min;
            } else if state.actual_level < max {
                state.actual_level += 1;
            }
        }
        FadeDirection::Down => {
            if state.actual_level > min {
                state.actual_level -= 1;
            } else if !state.flags.fade_rate_requested {
                state.actual_level = 0;
            }
        }
        FadeDirection::None => {}
    }
}

fn finish(state: &mut ControlState) {
    state.fade.stop();
    state.flags.fade_rate_requested = false;
    state.status.fade_running = false;
}

/// Advance a running fade by one tick of `tick_us` microseconds and
/// drive the output.
pub fn tick(state: &mut ControlState, output: &mut dyn OutputDriver, tick_us: u32) {
    if state.fade.period != 0 {
        let rate_mode = state.flags.fade_rate_requested;
        state.fade.counter += tick_us;
        if rate_mode {
            state.fade.period -= 1;
        }
        if state.fade.counter >= state.fade.increment {
            state.fade.counter -= state.fade.increment;
            step(state);
            if !rate_mode && state.actual_level == state.requested_level {
                finish(state);
            } else if rate_mode && state.fade.period == 0 {
                finish(state);
            } else {
                state.status.fade_running = true;
            }
        } else if rate_mode && state.fade.period == 0 {
            finish(state);
        }
    }

    let min = state.params.min_level;
    if state.actual_level != 0 && state.actual_level >= min {
        state.actual_level = state.actual_level.min(state.params.max_level);
        state.status.lamp_on = output.status();
        state.status.lamp_failure = !state.status.lamp_on;
    } else {
        state.status.lamp_on = false;
        state.actual_level = 0;
    }
    state.reset_state.set(
        crate::gear::state::ResetState::ACTUAL_LEVEL,
        state.actual_level != LEVEL_RESET,
    );
    let curve = state.params.dimming_curve();
    output.set_level(curve, curve_output(curve, state.actual_level));
}

/// Start an UP or DOWN ramp at the fade rate.
pub fn start_rate_fade(state: &mut ControlState, direction: FadeDirection) {
    let actual = state.actual_level;
    let lit = actual != 0 && actual >= state.params.min_level;
    let room = match direction {
        FadeDirection::Up => actual < state.params.max_level,
        FadeDirection::Down => actual > state.params.min_level,
        FadeDirection::None => false,
    };
    if state.params.fade_rate != 0 && lit && room {
        state.fade.increment = FADE_RATES_US[(state.params.fade_rate & 0x0f) as usize];
        state.fade.period = UP_DOWN_FADE_TICKS;
        state.fade.counter = 0;
        state.fade.direction = direction;
        state.flags.fade_rate_requested = true;
        state.status.fade_running = true;
    } else {
        state.fade.period = 0;
    }
}
