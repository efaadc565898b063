//! The bus line as seen by one gear, sampled once per half bit. This is
//! the only code that touches the codec state machines, and it talks to
//! the engine through queues only.

use crate::codec::event::CodecEvent;
use crate::codec::receive::ManchesterReceiver;
use crate::codec::timing::{BitWindows, HALF_BIT_MICROS};
use crate::codec::transmit::{ManchesterTransmitter, XmitTick};
use crate::config::CodecConfig;
use crate::drivers::simulator::transceiver::CodecCommand;
use crate::gear::handler::GearEvent;
use log::{debug, warn};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

// Settling time between frames, about 13 ms
const FRAME_GAP_HALF_BITS: u32 = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutput {
    /// Event for the engine
    Codec(CodecEvent),
    /// A backward frame has been put on the bus
    Backward(Vec<u8>),
}

pub struct BusLine {
    config: CodecConfig,
    receiver: ManchesterReceiver,
    transmitter: ManchesterTransmitter,
    half_bit: u32,
    /// Forward frames waiting for the line to settle
    queued: VecDeque<Vec<u8>>,
    /// Levels of the forward frame being played
    incoming: VecDeque<bool>,
    // Half bits since anything was driven on the line
    quiet: u32,
    level: bool,
    // Half bits since the last edge
    run: u32,
    half_bit_count: u64,
    sending: Vec<u8>,
}

impl BusLine {
    pub fn new(config: &CodecConfig) -> BusLine {
        BusLine {
            config: config.clone(),
            receiver: ManchesterReceiver::new(config),
            transmitter: ManchesterTransmitter::new(config),
            half_bit: BitWindows::new(config).half_bit(),
            queued: VecDeque::new(),
            incoming: VecDeque::new(),
            quiet: FRAME_GAP_HALF_BITS,
            level: false,
            run: 0,
            half_bit_count: 0,
            sending: Vec::new(),
        }
    }

    /// Queue a forward frame sent by a bus master. It goes on the line once
    /// the line has been quiet for the settling time.
    pub fn inject(&mut self, frame: &[u8]) {
        self.queued.push_back(frame.to_vec());
    }

    pub fn is_idle(&self) -> bool {
        self.queued.is_empty()
            && self.incoming.is_empty()
            && !self.transmitter.is_busy()
            && !self.receiver.in_frame()
    }

    pub fn command(&mut self, cmd: CodecCommand) {
        match cmd {
            CodecCommand::Receive(len) => self.receiver.receive(len),
            CodecCommand::StopReceive => self.receiver.stop_receive(),
            CodecCommand::Transmit(bytes) => {
                if self.transmitter.transmit(&bytes) {
                    self.sending = bytes;
                } else {
                    warn!("Transmitter busy, dropped {:02x?}", bytes);
                }
            }
        }
    }

    /// Advance the line by one half bit.
    pub fn tick(&mut self) -> Vec<LineOutput> {
        let mut out = Vec::new();
        if self.incoming.is_empty() && self.quiet >= FRAME_GAP_HALF_BITS {
            if let Some(frame) = self.queued.pop_front() {
                let levels = ManchesterTransmitter::line_levels(&self.config, &frame);
                self.incoming.extend(levels);
            }
        }
        let level = match self.incoming.pop_front() {
            Some(level) => {
                self.quiet = 0;
                level
            }
            None => {
                self.quiet = self.quiet.saturating_add(1);
                false
            }
        };
        if self.transmitter.is_busy() {
            self.quiet = 0;
        }
        self.run = self.run.saturating_add(1);
        if level != self.level {
            let elapsed = self.run.saturating_sub(1).max(1) * self.half_bit;
            self.level = level;
            self.run = 1;
            if let Some(ev) = self.receiver.edge(level, elapsed) {
                out.push(LineOutput::Codec(ev));
            }
        }
        self.half_bit_count += 1;
        if self.half_bit_count % 2 == 0 {
            if let Some(ev) = self.receiver.bit_timeout() {
                out.push(LineOutput::Codec(ev));
            }
        }
        if let XmitTick::Done = self.transmitter.tick() {
            out.push(LineOutput::Backward(std::mem::take(&mut self.sending)));
            out.push(LineOutput::Codec(CodecEvent::XmitDone));
        }
        out
    }
}

/// Run the line until the forward frame queue is closed.
pub async fn run_line(
    mut line: BusLine,
    mut forward: mpsc::Receiver<Vec<u8>>,
    mut commands: mpsc::UnboundedReceiver<CodecCommand>,
    events: mpsc::Sender<GearEvent>,
    backward: mpsc::Sender<u8>,
) {
    let mut ticker = time::interval(Duration::from_micros(HALF_BIT_MICROS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
    let mut forward_open = true;
    loop {
        tokio::select! {
            frame = forward.recv(), if forward_open => {
                match frame {
                    Some(frame) => {
                        debug!("Forward frame {:02x?}", frame);
                        line.inject(&frame);
                    }
                    None => forward_open = false,
                }
            }
            Some(cmd) = commands.recv() => line.command(cmd),
            _ = ticker.tick() => {
                for out in line.tick() {
                    match out {
                        LineOutput::Codec(ev) => {
                            if events.send(GearEvent::Codec(ev)).await.is_err() {
                                return;
                            }
                        }
                        LineOutput::Backward(bytes) => {
                            for b in bytes {
                                if backward.send(b).await.is_err() {
                                    debug!("No listener for backward frame");
                                }
                            }
                        }
                    }
                }
                if !forward_open && line.is_idle() {
                    return;
                }
            }
        }
    }
}
