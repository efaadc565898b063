use crate::error::GearError;
use crate::gear::hal::Transceiver;
use log::warn;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Requests from the engine to the codec task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecCommand {
    Receive(usize),
    Transmit(Vec<u8>),
    StopReceive,
}

/// Forwards every request to the line task.
pub struct ChannelTransceiver {
    commands: mpsc::UnboundedSender<CodecCommand>,
}

impl ChannelTransceiver {
    pub fn new(commands: mpsc::UnboundedSender<CodecCommand>) -> ChannelTransceiver {
        ChannelTransceiver { commands }
    }

    fn send(&self, cmd: CodecCommand) {
        if let Err(e) = self.commands.send(cmd).map_err(GearError::from) {
            warn!("Codec request lost: {}", e);
        }
    }
}

impl Transceiver for ChannelTransceiver {
    fn receive(&mut self, length: usize) {
        self.send(CodecCommand::Receive(length));
    }

    fn transmit(&mut self, bytes: &[u8]) {
        self.send(CodecCommand::Transmit(bytes.to_vec()));
    }

    fn stop_receive(&mut self) {
        self.send(CodecCommand::StopReceive);
    }
}

#[derive(Default)]
struct LoopbackCtxt {
    listening: Option<usize>,
    receive_count: usize,
    transmitted: Vec<Vec<u8>>,
}

/// Records what the engine asked the codec to do. The test plays the part
/// of the codec and feeds the resulting events back.
#[derive(Clone, Default)]
pub struct LoopbackTransceiver {
    ctxt: Arc<Mutex<LoopbackCtxt>>,
}

impl LoopbackTransceiver {
    pub fn new() -> LoopbackTransceiver {
        LoopbackTransceiver::default()
    }

    /// Frame length the receiver is armed for
    pub fn listening(&self) -> Option<usize> {
        self.ctxt.lock().ok()?.listening
    }

    pub fn receive_count(&self) -> usize {
        self.ctxt.lock().map(|c| c.receive_count).unwrap_or(0)
    }

    pub fn take_transmitted(&self) -> Vec<Vec<u8>> {
        self.ctxt
            .lock()
            .map(|mut c| std::mem::take(&mut c.transmitted))
            .unwrap_or_default()
    }
}

impl Transceiver for LoopbackTransceiver {
    fn receive(&mut self, length: usize) {
        if let Ok(mut ctxt) = self.ctxt.lock() {
            ctxt.listening = Some(length);
            ctxt.receive_count += 1;
        }
    }

    fn transmit(&mut self, bytes: &[u8]) {
        if let Ok(mut ctxt) = self.ctxt.lock() {
            ctxt.listening = None;
            ctxt.transmitted.push(bytes.to_vec());
        }
    }

    fn stop_receive(&mut self) {
        if let Ok(mut ctxt) = self.ctxt.lock() {
            ctxt.listening = None;
        }
    }
}
