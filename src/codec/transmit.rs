use crate::config::CodecConfig;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum XmitPhase {
    Idle,
    SyncFirstHalf,
    SyncSecondHalf,
    DataFirstHalf,
    DataSecondHalf,
    Stop,
    Done,
}

/// Result of one half bit tick
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum XmitTick {
    /// Drive the line to this level for the coming half bit.
    /// true is the active level, the first half of a 1 bit.
    Level(bool),
    /// The frame is complete, post XmitDone
    Done,
    Idle,
}

/// Manchester encoder advanced once per half bit.
pub struct ManchesterTransmitter {
    phase: XmitPhase,
    data: Vec<u8>,
    index: usize,
    mask: u8,
    sync_count: u8,
    stop_count: u16,
    start_bits: u8,
    stop_bits: u8,
}

impl ManchesterTransmitter {
    pub fn new(config: &CodecConfig) -> ManchesterTransmitter {
        ManchesterTransmitter {
            phase: XmitPhase::Idle,
            data: Vec::new(),
            index: 0,
            mask: 0x80,
            sync_count: 0,
            stop_count: 0,
            start_bits: config.start_bits.max(1),
            stop_bits: config.stop_bits,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.phase != XmitPhase::Idle
    }

    /// Arm the encoder. Returns false if a frame is already being sent
    /// or there is nothing to send.
    pub fn transmit(&mut self, bytes: &[u8]) -> bool {
        if self.is_busy() || bytes.is_empty() {
            return false;
        }
        self.data.clear();
        self.data.extend_from_slice(bytes);
        self.index = 0;
        self.mask = 0x80;
        self.sync_count = 0;
        self.stop_count = 0;
        self.phase = XmitPhase::SyncFirstHalf;
        true
    }

    fn current_bit(&self) -> bool {
        self.data.get(self.index).map(|b| b & self.mask != 0).unwrap_or(false)
    }

    pub fn tick(&mut self) -> XmitTick {
        match self.phase {
            XmitPhase::Idle => XmitTick::Idle,
            XmitPhase::SyncFirstHalf => {
                self.phase = XmitPhase::SyncSecondHalf;
                XmitTick::Level(true)
            }
            XmitPhase::SyncSecondHalf => {
                self.sync_count += 1;
                self.phase = if self.sync_count >= self.start_bits {
                    XmitPhase::DataFirstHalf
                } else {
                    XmitPhase::SyncFirstHalf
                };
                XmitTick::Level(false)
            }
            XmitPhase::DataFirstHalf => {
                self.phase = XmitPhase::DataSecondHalf;
                XmitTick::Level(self.current_bit())
            }
            XmitPhase::DataSecondHalf => {
                let level = !self.current_bit();
                self.mask >>= 1;
                if self.mask == 0 {
                    self.mask = 0x80;
                    self.index += 1;
                }
                self.phase = if self.index < self.data.len() {
                    XmitPhase::DataFirstHalf
                } else if self.stop_bits > 0 {
                    XmitPhase::Stop
                } else {
                    XmitPhase::Done
                };
                XmitTick::Level(level)
            }
            XmitPhase::Stop => {
                self.stop_count += 1;
                if self.stop_count >= self.stop_bits as u16 * 2 {
                    self.phase = XmitPhase::Done;
                }
                XmitTick::Level(false)
            }
            XmitPhase::Done => {
                self.phase = XmitPhase::Idle;
                XmitTick::Done
            }
        }
    }

    /// Line levels of a complete frame, one entry per half bit,
    /// including start and stop bits.
    pub fn line_levels(config: &CodecConfig, bytes: &[u8]) -> Vec<bool> {
        let mut xmit = ManchesterTransmitter::new(config);
        let mut levels = Vec::new();
        if !xmit.transmit(bytes) {
            return levels;
        }
        while let XmitTick::Level(l) = xmit.tick() {
            levels.push(l);
        }
        levels
    }
}
