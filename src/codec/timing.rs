use crate::config::CodecConfig;
use std::time::Duration;

pub const HALF_BIT_MICROS: u64 = 417;
pub const BIT_MICROS: u64 = 833;
// Includes start bit
pub const BACKWARD_FRAME_DURATION: Duration = Duration::from_micros(BIT_MICROS * 9);
pub const FORWARD_FRAME_DURATION: Duration = Duration::from_micros(BIT_MICROS * 17);

/// Time from the first to the last transition of a frame
pub fn frame_duration(frame: &[u8]) -> Duration {
    let bits = 1 + 8 * frame.len() as u64;
    // If the frame ends with a 1 then the last transition is
    // in the middle of the last bit.
    let last_one = frame.last().map(|b| b & 1 == 1).unwrap_or(false);
    Duration::from_micros(bits * BIT_MICROS - if last_one { HALF_BIT_MICROS } else { 0 })
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BitLength {
    Half = 0,
    Full = 1,
}

/// Acceptance windows for the time between two edges, in capture timer ticks.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BitWindows {
    half: u32,
    half_min: u32,
    half_max: u32,
    full_min: u32,
    full_max: u32,
}

impl BitWindows {
    pub fn new(config: &CodecConfig) -> BitWindows {
        let half = config.clock_freq / (config.baud.max(1) * 2);
        let tolerance = half * config.tolerance_pct.min(100) / 100;
        BitWindows {
            half,
            half_min: half - tolerance,
            half_max: half + tolerance,
            full_min: 2 * half - tolerance,
            full_max: 2 * half + tolerance,
        }
    }

    pub fn half_bit(&self) -> u32 {
        self.half
    }

    pub fn classify(&self, ticks: u32) -> Option<BitLength> {
        if (self.half_min..=self.half_max).contains(&ticks) {
            Some(BitLength::Half)
        } else if (self.full_min..=self.full_max).contains(&ticks) {
            Some(BitLength::Full)
        } else {
            None
        }
    }
}

#[test]
fn windows_for_dali() {
    let w = BitWindows::new(&CodecConfig::default());
    assert_eq!(w.half_bit(), 416);
    assert_eq!(w.classify(416), Some(BitLength::Half));
    assert_eq!(w.classify(340), Some(BitLength::Half));
    assert_eq!(w.classify(833), Some(BitLength::Full));
    assert_eq!(w.classify(600), None);
    assert_eq!(w.classify(1100), None);
    assert_eq!(w.classify(10), None);
}

#[test]
fn frame_durations() {
    assert_eq!(frame_duration(&[0x00]), BACKWARD_FRAME_DURATION);
    assert_eq!(
        frame_duration(&[0x00, 0x01]),
        FORWARD_FRAME_DURATION - Duration::from_micros(HALF_BIT_MICROS)
    );
}
