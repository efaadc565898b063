use super::event::CodecEvent;
use super::timing::{BitLength, BitWindows};
use crate::config::CodecConfig;

// Bit periods without an edge before a started frame is dropped
const MAX_MISSED_BITS: u8 = 4;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecvPhase {
    Idle,
    Sync,
    Data,
    Stop,
    Done,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Decoded {
    Zero,
    One,
    ZeroOne,
    Error,
}

/// Map (previous bit, off time, on time) to the bits they complete.
fn decode(prev_bit: u8, off: BitLength, on: BitLength) -> Decoded {
    match (prev_bit << 2) | ((off as u8) << 1) | on as u8 {
        0b000 => Decoded::Zero,
        0b001 => Decoded::ZeroOne,
        0b100 => Decoded::One,
        0b110 => Decoded::Zero,
        0b111 => Decoded::ZeroOne,
        _ => Decoded::Error,
    }
}

/// Manchester decoder fed with the time between line edges.
pub struct ManchesterReceiver {
    windows: BitWindows,
    start_bits: u8,
    stop_bits: u8,
    phase: RecvPhase,
    buffer: Vec<u8>,
    remaining: usize,
    current: u8,
    bit_count: u8,
    sync_count: u8,
    stop_count: u8,
    prev_bit: u8,
    first_edge: bool,
    missed: u8,
    off_ticks: u32,
}

impl ManchesterReceiver {
    pub fn new(config: &CodecConfig) -> ManchesterReceiver {
        ManchesterReceiver {
            windows: BitWindows::new(config),
            start_bits: config.start_bits.max(1),
            stop_bits: config.stop_bits,
            phase: RecvPhase::Idle,
            buffer: Vec::new(),
            remaining: 0,
            current: 0,
            bit_count: 0,
            sync_count: 0,
            stop_count: 0,
            prev_bit: 0,
            first_edge: true,
            missed: 0,
            off_ticks: 0,
        }
    }

    pub fn phase(&self) -> RecvPhase {
        self.phase
    }

    /// True while waiting for or receiving a frame
    pub fn is_listening(&self) -> bool {
        !matches!(self.phase, RecvPhase::Idle | RecvPhase::Done)
    }

    /// True between the first edge of a frame and its completion
    pub fn in_frame(&self) -> bool {
        self.is_listening() && !self.first_edge
    }

    /// Arm the decoder for a frame of `length` bytes.
    pub fn receive(&mut self, length: usize) {
        self.buffer.clear();
        self.remaining = length.max(1);
        self.current = 0;
        self.bit_count = 0;
        self.sync_count = 0;
        self.stop_count = 0;
        self.prev_bit = 0;
        self.first_edge = true;
        self.missed = 0;
        self.phase = RecvPhase::Sync;
    }

    pub fn stop_receive(&mut self) {
        self.phase = RecvPhase::Idle;
        self.buffer.clear();
    }

    fn fail(&mut self) -> Option<CodecEvent> {
        self.phase = RecvPhase::Done;
        self.buffer.clear();
        Some(CodecEvent::RecvError)
    }

    /// The line changed level. `active` is the new level, `elapsed` the
    /// number of capture ticks spent at the previous level.
    pub fn edge(&mut self, active: bool, elapsed: u32) -> Option<CodecEvent> {
        match self.phase {
            RecvPhase::Idle | RecvPhase::Done => return None,
            RecvPhase::Stop => return self.fail(),
            RecvPhase::Sync | RecvPhase::Data => {}
        }
        self.missed = 0;
        if self.first_edge {
            if !active {
                return None;
            }
            self.first_edge = false;
            self.prev_bit = 1;
            self.off_ticks = self.windows.half_bit();
            return Some(CodecEvent::RecvEdge);
        }
        if active {
            self.off_ticks = elapsed;
            return None;
        }
        let (off, on) = match (
            self.windows.classify(self.off_ticks),
            self.windows.classify(elapsed),
        ) {
            (Some(off), Some(on)) => (off, on),
            _ => return self.fail(),
        };
        match decode(self.prev_bit, off, on) {
            Decoded::Zero => self.shift(0),
            Decoded::One => self.shift(1),
            Decoded::ZeroOne => {
                if let Some(ev) = self.shift(0) {
                    return Some(ev);
                }
                self.shift(1)
            }
            Decoded::Error => self.fail(),
        }
    }

    fn shift(&mut self, bit: u8) -> Option<CodecEvent> {
        self.prev_bit = bit;
        match self.phase {
            RecvPhase::Sync => {
                if bit != 1 {
                    return self.fail();
                }
                self.sync_count += 1;
                if self.sync_count >= self.start_bits {
                    self.phase = RecvPhase::Data;
                }
                None
            }
            RecvPhase::Data => {
                self.current = (self.current << 1) | bit;
                self.bit_count += 1;
                if self.bit_count == 8 {
                    self.buffer.push(self.current);
                    self.current = 0;
                    self.bit_count = 0;
                    self.remaining -= 1;
                    if self.remaining == 0 {
                        self.phase = RecvPhase::Stop;
                        self.stop_count = 0;
                    }
                }
                None
            }
            RecvPhase::Stop | RecvPhase::Idle | RecvPhase::Done => self.fail(),
        }
    }

    /// Called once per bit period.
    pub fn bit_timeout(&mut self) -> Option<CodecEvent> {
        match self.phase {
            RecvPhase::Idle | RecvPhase::Done => None,
            RecvPhase::Stop => {
                self.stop_count += 1;
                if self.stop_count >= self.stop_bits + 2 {
                    self.phase = RecvPhase::Done;
                    Some(CodecEvent::RecvDone(std::mem::take(&mut self.buffer)))
                } else {
                    None
                }
            }
            RecvPhase::Sync | RecvPhase::Data => {
                if self.first_edge {
                    return None;
                }
                self.missed += 1;
                if self.missed >= MAX_MISSED_BITS {
                    self.fail()
                } else {
                    None
                }
            }
        }
    }
}
