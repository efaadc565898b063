//! The protocol engine of one control gear. Every event is processed to
//! completion before the next one is looked at.

use crate::base::address::{FrameAddress, COMMAND_BIT};
use crate::codec::event::CodecEvent;
use crate::config::GearConfig;
use crate::defs::gear::cmd;
use crate::gear::fade;
use crate::gear::hal::{GearIo, ParamId, TimerId};
use crate::gear::state::{
    ControlState, Frame, MsgState, Parameters, PhysicalSelection, LEVEL_RESET,
    SEARCH_ADDRESS_RESET,
};
use crate::gear::tables::{self, Action, CommandEntry, ResponsePolicy};
use log::{debug, info, trace, warn};

/// Forward frames are two bytes
pub const FORWARD_FRAME_LENGTH: usize = 2;

/// Consecutive powered samples needed before listening after power up
const BUS_ON_SAMPLES: u8 = 2;

const ALL_TIMERS: [TimerId; 4] = [
    TimerId::RepeatWindow,
    TimerId::DapcSequence,
    TimerId::ResponseDelay,
    TimerId::Commissioning,
];

#[derive(Debug, Clone, PartialEq)]
pub enum GearEvent {
    Codec(CodecEvent),
    /// Timer expiry with the generation it was started under
    Timeout(TimerId, u32),
}

/// What to do with the bus and the timers after a frame
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ParseResult {
    None,
    /// First arrival of a command that must be repeated
    Req100ms,
    /// Restart the DAPC sequence timer
    Req200ms,
    SendResponse,
    /// End of a repeat sequence
    ClearAll,
}

pub struct GearEngine {
    state: ControlState,
    io: GearIo,
    config: GearConfig,
}

impl GearEngine {
    /// Create a disabled gear. Call [`enable`](Self::enable) to power it up.
    pub fn new(config: GearConfig, io: GearIo) -> GearEngine {
        let params = Parameters::load(&*io.params);
        let state = ControlState::new(config.identity.clone(), params);
        GearEngine { state, io, config }
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ControlState {
        &mut self.state
    }

    pub fn io(&self) -> &GearIo {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut GearIo {
        &mut self.io
    }

    pub fn config(&self) -> &GearConfig {
        &self.config
    }

    pub fn enable(&mut self) {
        info!("Enabling gear");
        self.state.params = Parameters::load(&*self.io.params);
        self.state.status.power_failure = true;
        self.state.flags.fifteen_min_timer_running = false;
        self.io.output.seed_random(self.config.serial_number);
        self.startup(false);
    }

    pub fn disable(&mut self) {
        info!("Disabling gear");
        self.set_off(false);
    }

    /// Process a frame as if it was received from the bus, bypassing the
    /// repeat requirement. Only possible while idle.
    pub fn force_message(&mut self, addr: u8, data: u8) -> bool {
        if self.state.msg_state != MsgState::Idle {
            return false;
        }
        self.state.flags.forced_message = true;
        self.process_event(GearEvent::Codec(CodecEvent::RecvDone(vec![addr, data])));
        self.state.flags.forced_message = false;
        true
    }

    pub fn process_event(&mut self, event: GearEvent) {
        trace!("{:?} in {:?}", event, self.state.msg_state);
        match (self.state.msg_state, event) {
            (MsgState::Off, _) => {}
            (_, GearEvent::Timeout(id, generation)) => self.timeout(id, generation),
            (MsgState::Idle, GearEvent::Codec(CodecEvent::RecvDone(bytes))) => {
                if bytes.len() == FORWARD_FRAME_LENGTH {
                    self.state.current = Frame {
                        addr: bytes[0],
                        data: bytes[1],
                    };
                    let result = self.parse_frame();
                    self.apply_result(result);
                } else {
                    warn!("Dropped frame of {} bytes", bytes.len());
                    self.receive();
                }
            }
            (MsgState::Idle, GearEvent::Codec(CodecEvent::RecvError)) => {
                debug!("Receive error");
                self.receive();
            }
            (MsgState::WaitXmitDone, GearEvent::Codec(CodecEvent::XmitDone)) => {
                self.state.msg_state = MsgState::Idle;
                self.receive();
            }
            (_, GearEvent::Codec(_)) => {}
        }
    }

    /// Periodic fade tick
    pub fn fade_tick(&mut self) {
        if self.state.msg_state == MsgState::Off {
            return;
        }
        let tick_us = self.config.timers.fade_tick_us;
        fade::tick(&mut self.state, &mut *self.io.output, tick_us);
    }

    /// Periodic sample of the bus power
    pub fn periodic_bus_check(&mut self) {
        if self.state.msg_state == MsgState::Off {
            return;
        }
        let powered = self.io.bus.powered();
        let st = &mut self.state;
        if st.flags.test_bus_power_on {
            if powered {
                st.bus_on_count += 1;
                if st.bus_on_count >= BUS_ON_SAMPLES {
                    debug!("Bus powered");
                    st.flags.test_bus_power_on = false;
                    st.bus_on_count = 0;
                    st.bus_fail_count = 0;
                    self.receive();
                }
            } else {
                st.bus_on_count = 0;
            }
        } else if !powered {
            let limit = self.config.timers.bus_fail_samples();
            if st.bus_fail_count < limit {
                st.bus_fail_count += 1;
                if st.bus_fail_count == limit {
                    self.system_failure();
                }
            }
        } else {
            st.bus_fail_count = 0;
        }
    }

    fn system_failure(&mut self) {
        let st = &mut self.state;
        let level = st.params.system_failure_level;
        info!("Bus failure, system failure level {}", level);
        if level == cmd::MASK {
            return;
        }
        let mut actual = level.min(st.params.max_level);
        if level != 0 {
            actual = actual.max(st.params.min_level);
        }
        st.actual_level = actual;
        st.requested_level = actual;
        st.fade.stop();
        st.status.fade_running = false;
        self.output_level();
    }

    fn receive(&mut self) {
        self.io.transceiver.receive(FORWARD_FRAME_LENGTH);
    }

    fn output_level(&mut self) {
        fade::tick(&mut self.state, &mut *self.io.output, 0);
    }

    fn timeout(&mut self, id: TimerId, generation: u32) {
        // Restarted or stopped after this expiry was queued
        if !self.io.scheduler.claim_expiry(id, generation) {
            trace!("Stale {:?} timeout", id);
            return;
        }
        let st = &mut self.state;
        match id {
            TimerId::RepeatWindow => {
                st.flags.repeat_timer_requested = false;
                st.flags.app_extended_requested = false;
            }
            TimerId::DapcSequence => {
                debug!("DAPC sequence ended");
                st.flags.dapc_sequence_running = false;
                st.params.fade_time = st.fade.saved_fade_time;
                st.fade.stop();
                st.status.fade_running = false;
            }
            TimerId::ResponseDelay => {
                if st.flags.response_pending {
                    st.flags.response_pending = false;
                    st.flags.response_requested = false;
                    let value = st.response_value;
                    self.io.transceiver.transmit(&[value]);
                }
            }
            TimerId::Commissioning => {
                info!("Commissioning window closed");
                st.flags.fifteen_min_timer_running = false;
            }
        }
    }

    fn cancel_dapc(&mut self) {
        let st = &mut self.state;
        if st.flags.dapc_sequence_running {
            st.flags.dapc_sequence_running = false;
            st.params.fade_time = st.fade.saved_fade_time;
            st.fade.stop();
            st.status.fade_running = false;
            self.io.scheduler.stop_timer(TimerId::DapcSequence);
        }
    }

    fn parse_frame(&mut self) -> ParseResult {
        let frame = self.state.current;
        let device_type_enabled = self.state.flags.app_extended_requested;
        let addr = FrameAddress::from_byte(frame.addr);
        let result = match addr {
            FrameAddress::Special(i) => self.parse_special(tables::special_entry(i), true),
            // Only WRITE MEMORY LOCATION keeps writing enabled
            FrameAddress::Extended(i) => self.parse_special(tables::extended_entry(i), i == 3),
            _ if addr.accepts(self.state.params.short_address, self.state.params.groups) => {
                self.state.flags.write_memory_enabled = false;
                if frame.addr & COMMAND_BIT == 0 {
                    self.state.requested_level = frame.data;
                    self.state.status.power_failure = false;
                    self.state.flags.output_change_requested = true;
                    if self.state.flags.dapc_sequence_running {
                        ParseResult::Req200ms
                    } else {
                        ParseResult::None
                    }
                } else {
                    self.cancel_dapc();
                    let entry = tables::normal_entry(frame.data);
                    let (result, executed) = self.process_entry(entry, frame.data);
                    if executed {
                        self.state.flags.app_extended_requested = false;
                        if frame.data <= cmd::RESET {
                            self.state.status.power_failure = false;
                        }
                    }
                    result
                }
            }
            _ => ParseResult::None,
        };
        // ENABLE DEVICE TYPE applies to the next frame only, or to the
        // pair if that frame must be repeated
        if device_type_enabled && result != ParseResult::Req100ms {
            self.state.flags.app_extended_requested = false;
        }
        self.post_dispatch();
        result
    }

    fn parse_special(&mut self, entry: CommandEntry, keeps_write_enable: bool) -> ParseResult {
        self.cancel_dapc();
        if self.state.flags.app_extended_requested {
            // The frame after ENABLE DEVICE TYPE is consumed by it
            self.state.flags.app_extended_requested = false;
            debug!("Ignored special command after ENABLE DEVICE TYPE");
            return ParseResult::None;
        }
        let (result, executed) = self.process_entry(entry, self.state.current.data);
        if executed && !keeps_write_enable {
            self.state.flags.write_memory_enabled = false;
        }
        result
    }

    /// Apply the repeat and commissioning window gates to an entry and run
    /// it if they pass.
    fn process_entry(&mut self, entry: CommandEntry, data: u8) -> (ParseResult, bool) {
        if entry.is_noop() {
            return (ParseResult::None, false);
        }
        let flags = &self.state.flags;
        if entry.device_type && !flags.app_extended_requested {
            return (ParseResult::None, false);
        }
        let bypass = flags.forced_message || self.io.output.eol_test_mode();
        let in_time_ok = !entry.in_time || flags.fifteen_min_timer_running;

        if entry.repeat && !bypass {
            if !flags.repeat_timer_requested {
                self.state.previous = self.state.current;
                return (ParseResult::Req100ms, false);
            }
            if self.state.previous == self.state.current && in_time_ok {
                self.execute(entry, data);
                return (ParseResult::ClearAll, true);
            }
            return (ParseResult::ClearAll, false);
        }

        if flags.repeat_timer_requested {
            // Anything else ends the repeat sequence
            self.state.flags.repeat_timer_requested = false;
            self.io.scheduler.stop_timer(TimerId::RepeatWindow);
        }
        if !in_time_ok {
            return (ParseResult::None, false);
        }
        (self.execute(entry, data), true)
    }

    fn execute(&mut self, entry: CommandEntry, data: u8) -> ParseResult {
        self.state.flags.response_requested = false;
        if let Action::Exec(handler) = entry.action {
            handler(&mut self.state, &mut self.io, data);
        }
        match entry.response {
            ResponsePolicy::Always => ParseResult::SendResponse,
            ResponsePolicy::Flagged if self.state.flags.response_requested => {
                ParseResult::SendResponse
            }
            _ if self.state.flags.dapc_sequence_running => ParseResult::Req200ms,
            _ => ParseResult::None,
        }
    }

    fn post_dispatch(&mut self) {
        let st = &mut self.state;
        if st.params.last_requested_level != st.actual_level && !st.flags.output_change_requested {
            st.params.last_requested_level = st.actual_level;
            self.io
                .persist(ParamId::LastRequestedLevel, st.actual_level);
        }

        let st = &mut self.state;
        if st.flags.output_change_requested {
            fade::start_output_change(st);
            st.params.last_requested_level = st.requested_level;
            st.flags.output_change_requested = false;
            let level = st.requested_level;
            self.io.persist(ParamId::LastRequestedLevel, level);
        }

        if self.state.flags.reset_requested {
            info!("Reset");
            self.set_off(true);
            self.io.params.reset_user_defaults();
            self.state.params = Parameters::load(&*self.io.params);
            self.startup(true);
            self.state.flags.reset_requested = false;
            self.state.status.power_failure = false;
        }

        let st = &mut self.state;
        match (st.status.lamp_failure, st.physical_selection) {
            (true, PhysicalSelection::Requested) => {
                st.physical_selection = PhysicalSelection::Enabled
            }
            (false, PhysicalSelection::Enabled) => {
                st.physical_selection = PhysicalSelection::Requested
            }
            _ => {}
        }
    }

    fn apply_result(&mut self, result: ParseResult) {
        let timers = &self.config.timers;
        match result {
            ParseResult::Req100ms => {
                self.state.flags.repeat_timer_requested = true;
                self.io
                    .scheduler
                    .start_timer(TimerId::RepeatWindow, timers.repeat_window());
                self.receive();
            }
            ParseResult::Req200ms => {
                self.io
                    .scheduler
                    .start_timer(TimerId::DapcSequence, timers.dapc_sequence());
                self.receive();
            }
            ParseResult::SendResponse => {
                self.state.flags.response_pending = true;
                self.state.msg_state = MsgState::WaitXmitDone;
                self.io
                    .scheduler
                    .start_timer(TimerId::ResponseDelay, timers.response_delay());
            }
            ParseResult::ClearAll => {
                self.io.scheduler.stop_timer(TimerId::RepeatWindow);
                self.state.flags.repeat_timer_requested = false;
                self.state.flags.app_extended_requested = false;
                self.receive();
            }
            ParseResult::None => self.receive(),
        }
    }

    fn startup(&mut self, reset: bool) {
        let st = &mut self.state;
        st.msg_state = MsgState::Idle;
        st.status.limit_error = false;
        st.flags.dapc_sequence_running = false;
        st.physical_selection = PhysicalSelection::Disabled;
        st.search_address = SEARCH_ADDRESS_RESET;
        st.flags.repeat_timer_requested = false;
        st.update_missing_short_address();

        let level = if reset {
            LEVEL_RESET
        } else if st.params.power_on_level == cmd::MASK {
            st.params.last_requested_level
        } else {
            st.params.power_on_level
        };
        st.actual_level = if level == 0 {
            0
        } else {
            level.clamp(st.params.min_level, st.params.max_level)
        };
        st.requested_level = st.actual_level;
        st.fade.stop();
        st.status.fade_running = false;
        self.output_level();
        self.state.recompute_reset_state(&*self.io.params);

        if self.io.bus.powered() {
            self.receive();
        } else {
            debug!("Waiting for bus power");
            self.state.flags.test_bus_power_on = true;
            self.state.bus_on_count = 0;
        }
    }

    /// Stop the gear. RESET leaves an open commissioning window running.
    fn set_off(&mut self, reset: bool) {
        let st = &mut self.state;
        st.msg_state = MsgState::Off;
        st.actual_level = 0;
        st.requested_level = 0;
        st.fade.stop();
        st.status.fade_running = false;
        st.flags.response_pending = false;
        self.output_level();
        self.io.transceiver.stop_receive();
        for id in ALL_TIMERS {
            if reset && id == TimerId::Commissioning {
                continue;
            }
            self.io.scheduler.stop_timer(id);
        }
        if !reset {
            self.state.flags.fifteen_min_timer_running = false;
            self.state.flags.compare_mode_enabled = false;
        }
    }
}
