//! A simulated gear running on tokio: the line task feeds codec events to
//! the engine task, which also runs the fade tick and the bus supervision.

use crate::config::GearConfig;
use crate::drivers::simulator::line::{run_line, BusLine};
use crate::drivers::simulator::memory_banks::SimMemoryBanks;
use crate::drivers::simulator::output::{SimBusPower, SimOutput};
use crate::drivers::simulator::params::MemoryParameterStore;
use crate::drivers::simulator::scheduler::TokioScheduler;
use crate::drivers::simulator::transceiver::ChannelTransceiver;
use crate::error::{DynResult, GearError};
use crate::gear::hal::GearIo;
use crate::gear::handler::{GearEngine, GearEvent};
use crate::gear::state::ControlState;
use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;

const EVENT_QUEUE_LEN: usize = 16;
const FRAME_QUEUE_LEN: usize = 8;

/// Collaborators of a simulated gear. Keep clones to inspect them while
/// the gear runs.
#[derive(Clone)]
pub struct SimHardware {
    pub params: MemoryParameterStore,
    pub output: SimOutput,
    pub bus: SimBusPower,
    pub memory: SimMemoryBanks,
}

impl SimHardware {
    pub fn new(config: &GearConfig) -> SimHardware {
        SimHardware {
            params: MemoryParameterStore::new(config.identity.clone()),
            output: SimOutput::new(),
            bus: SimBusPower::new(true),
            memory: SimMemoryBanks::new(config.serial_number),
        }
    }
}

pub struct GearRuntime {
    forward: Option<mpsc::Sender<Vec<u8>>>,
    backward: Option<mpsc::Receiver<u8>>,
    engine: JoinHandle<ControlState>,
}

impl GearRuntime {
    /// Power up a gear. Must be called from within a tokio runtime.
    pub fn start(config: GearConfig, hw: SimHardware) -> GearRuntime {
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_LEN);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (forward_tx, forward_rx) = mpsc::channel(FRAME_QUEUE_LEN);
        let (backward_tx, backward_rx) = mpsc::channel(FRAME_QUEUE_LEN);

        let line = BusLine::new(&config.codec);
        let line = tokio::spawn(run_line(line, forward_rx, cmd_rx, event_tx.clone(), backward_tx));

        let io = GearIo {
            params: Box::new(hw.params),
            output: Box::new(hw.output),
            scheduler: Box::new(TokioScheduler::new(event_tx)),
            bus: Box::new(hw.bus),
            memory: Box::new(hw.memory),
            transceiver: Box::new(ChannelTransceiver::new(cmd_tx)),
            timers: config.timers.clone(),
        };
        let engine = GearEngine::new(config, io);
        let engine = tokio::spawn(run_engine(engine, event_rx, line));
        GearRuntime {
            forward: Some(forward_tx),
            backward: Some(backward_rx),
            engine,
        }
    }

    /// Queue for forward frames put on the bus by a controller
    pub fn forward(&self) -> Option<mpsc::Sender<Vec<u8>>> {
        self.forward.clone()
    }

    pub async fn send(&self, frame: [u8; 2]) -> Result<(), GearError> {
        match &self.forward {
            Some(tx) => Ok(tx.send(frame.to_vec()).await?),
            None => Err(GearError::ChannelClosed),
        }
    }

    /// Backward frames sent by the gear. Can only be taken once.
    pub fn backward_stream(&mut self) -> Option<ReceiverStream<u8>> {
        self.backward.take().map(ReceiverStream::new)
    }

    /// Close the bus, let the gear finish what it was doing and return its
    /// final state.
    pub async fn shutdown(mut self) -> DynResult<ControlState> {
        self.forward = None;
        Ok(self.engine.await?)
    }
}

async fn run_engine(
    mut engine: GearEngine,
    mut events: mpsc::Receiver<GearEvent>,
    mut line: JoinHandle<()>,
) -> ControlState {
    let timers = engine.config().timers.clone();
    let mut fade = time::interval(timers.fade_tick());
    fade.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut bus = time::interval(timers.bus_sample());
    bus.set_missed_tick_behavior(MissedTickBehavior::Delay);

    engine.enable();
    loop {
        tokio::select! {
            biased;
            Some(event) = events.recv() => engine.process_event(event),
            _ = fade.tick() => engine.fade_tick(),
            _ = bus.tick() => engine.periodic_bus_check(),
            _ = &mut line => break,
        }
    }
    let state = engine.state().clone();
    engine.disable();
    info!("Gear stopped");
    state
}
