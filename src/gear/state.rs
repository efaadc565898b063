use crate::base::status::GearStatus;
use crate::defs::gear::cmd;
use crate::defs::gear::status as flag;
use crate::gear::hal::{DimmingCurve, ParamId, ParameterStore};
use log::warn;
use serde_derive::{Deserialize, Serialize};

pub const LEVEL_RESET: u8 = 0xfe;
pub const SEARCH_ADDRESS_RESET: u32 = 0xff_ffff;
// Bit of the operating mode selecting the linear dimming curve
pub const OP_MODE_LINEAR_CURVE: u8 = 0x10;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MsgState {
    Idle,
    WaitXmitDone,
    Off,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PhysicalSelection {
    Disabled,
    Requested,
    Enabled,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FadeDirection {
    None,
    Up,
    Down,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub addr: u8,
    pub data: u8,
}

/// Factory set, read only values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Identity {
    pub device_type: u8,
    pub physical_min_level: u8,
    pub gear_type: u8,
    pub possible_op_modes: u8,
    pub features: u8,
    pub min_fast_fade_time: u8,
    pub extended_version: u8,
    pub version: u8,
}

impl Default for Identity {
    fn default() -> Self {
        Identity {
            device_type: 6,
            physical_min_level: 25,
            gear_type: 0x01,
            possible_op_modes: 0x01,
            features: 0x80,
            min_fast_fade_time: 1,
            extended_version: 1,
            version: 1,
        }
    }
}

pub fn factory_default(id: ParamId, identity: &Identity) -> u8 {
    match id {
        ParamId::ShortAddress => cmd::MASK,
        ParamId::PowerOnLevel | ParamId::SystemFailureLevel => LEVEL_RESET,
        ParamId::MinLevel => identity.physical_min_level,
        ParamId::MaxLevel | ParamId::LastRequestedLevel => LEVEL_RESET,
        ParamId::FadeRate => 7,
        ParamId::FadeTime => 0,
        ParamId::RandomAddressH | ParamId::RandomAddressM | ParamId::RandomAddressL => 0xff,
        ParamId::Group0_7 | ParamId::Group8_15 => 0,
        ParamId::Scene(_) => cmd::MASK,
        ParamId::FailureStatus | ParamId::OperatingMode | ParamId::FastFadeTime => 0,
    }
}

#[derive(Debug, Clone, Default)]
pub struct ControlFlags {
    pub repeat_timer_requested: bool,
    pub response_requested: bool,
    pub response_pending: bool,
    pub dapc_sequence_running: bool,
    pub write_memory_enabled: bool,
    pub app_extended_requested: bool,
    pub output_change_requested: bool,
    pub reset_requested: bool,
    pub fifteen_min_timer_running: bool,
    pub compare_mode_enabled: bool,
    pub fade_rate_requested: bool,
    pub forced_message: bool,
    /// Waiting for bus power before listening
    pub test_bus_power_on: bool,
    pub current_protector_enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub short_address: u8,
    pub groups: u16,
    pub min_level: u8,
    pub max_level: u8,
    pub power_on_level: u8,
    pub system_failure_level: u8,
    pub fade_time: u8,
    pub fade_rate: u8,
    pub fast_fade_time: u8,
    pub scenes: [u8; 16],
    pub operating_mode: u8,
    pub failure_status: u8,
    pub random_address: u32,
    pub last_requested_level: u8,
}

impl Parameters {
    pub fn from_fn(mut f: impl FnMut(ParamId) -> u8) -> Parameters {
        let mut params = Parameters {
            short_address: 0,
            groups: 0,
            min_level: 0,
            max_level: 0,
            power_on_level: 0,
            system_failure_level: 0,
            fade_time: 0,
            fade_rate: 0,
            fast_fade_time: 0,
            scenes: [0; 16],
            operating_mode: 0,
            failure_status: 0,
            random_address: 0,
            last_requested_level: 0,
        };
        for id in ParamId::all() {
            params.set(id, f(id));
        }
        params
    }

    /// Read every parameter, using the default for any the store can't deliver.
    pub fn load(store: &dyn ParameterStore) -> Parameters {
        Parameters::from_fn(|id| match store.get(id) {
            Ok(v) => v,
            Err(e) => {
                warn!("{}, using default", e);
                store.default_value(id)
            }
        })
    }

    pub fn get(&self, id: ParamId) -> u8 {
        match id {
            ParamId::ShortAddress => self.short_address,
            ParamId::PowerOnLevel => self.power_on_level,
            ParamId::SystemFailureLevel => self.system_failure_level,
            ParamId::MinLevel => self.min_level,
            ParamId::MaxLevel => self.max_level,
            ParamId::LastRequestedLevel => self.last_requested_level,
            ParamId::FadeRate => self.fade_rate,
            ParamId::FadeTime => self.fade_time,
            ParamId::RandomAddressH => (self.random_address >> 16) as u8,
            ParamId::RandomAddressM => (self.random_address >> 8) as u8,
            ParamId::RandomAddressL => self.random_address as u8,
            ParamId::Group0_7 => self.groups as u8,
            ParamId::Group8_15 => (self.groups >> 8) as u8,
            ParamId::Scene(n) => self.scenes[(n & 0x0f) as usize],
            ParamId::FailureStatus => self.failure_status,
            ParamId::OperatingMode => self.operating_mode,
            ParamId::FastFadeTime => self.fast_fade_time,
        }
    }

    pub fn set(&mut self, id: ParamId, value: u8) {
        match id {
            ParamId::ShortAddress => self.short_address = value,
            ParamId::PowerOnLevel => self.power_on_level = value,
            ParamId::SystemFailureLevel => self.system_failure_level = value,
            ParamId::MinLevel => self.min_level = value,
            ParamId::MaxLevel => self.max_level = value,
            ParamId::LastRequestedLevel => self.last_requested_level = value,
            ParamId::FadeRate => self.fade_rate = value,
            ParamId::FadeTime => self.fade_time = value,
            ParamId::RandomAddressH => {
                self.random_address = (self.random_address & 0x00ffff) | ((value as u32) << 16)
            }
            ParamId::RandomAddressM => {
                self.random_address = (self.random_address & 0xff00ff) | ((value as u32) << 8)
            }
            ParamId::RandomAddressL => {
                self.random_address = (self.random_address & 0xffff00) | value as u32
            }
            ParamId::Group0_7 => self.groups = (self.groups & 0xff00) | value as u16,
            ParamId::Group8_15 => self.groups = (self.groups & 0x00ff) | ((value as u16) << 8),
            ParamId::Scene(n) => self.scenes[(n & 0x0f) as usize] = value,
            ParamId::FailureStatus => self.failure_status = value,
            ParamId::OperatingMode => self.operating_mode = value,
            ParamId::FastFadeTime => self.fast_fade_time = value,
        }
    }

    pub fn dimming_curve(&self) -> DimmingCurve {
        if self.operating_mode & OP_MODE_LINEAR_CURVE != 0 {
            DimmingCurve::Linear
        } else {
            DimmingCurve::Logarithmic
        }
    }
}

/// One bit per value that differs from its reset value
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ResetState(u32);

impl ResetState {
    pub const ACTUAL_LEVEL: u32 = 1 << 0;
    pub const POWER_ON_LEVEL: u32 = 1 << 1;
    pub const SYSTEM_FAILURE_LEVEL: u32 = 1 << 2;
    pub const MIN_LEVEL: u32 = 1 << 3;
    pub const MAX_LEVEL: u32 = 1 << 4;
    pub const FADE_RATE: u32 = 1 << 5;
    pub const FADE_TIME: u32 = 1 << 6;
    pub const SEARCH_ADDRESS_H: u32 = 1 << 7;
    pub const SEARCH_ADDRESS_M: u32 = 1 << 8;
    pub const SEARCH_ADDRESS_L: u32 = 1 << 9;
    pub const RANDOM_ADDRESS_H: u32 = 1 << 10;
    pub const RANDOM_ADDRESS_M: u32 = 1 << 11;
    pub const RANDOM_ADDRESS_L: u32 = 1 << 12;
    pub const GROUP: u32 = 1 << 13;

    pub fn scene(n: u8) -> u32 {
        1 << (16 + (n & 0x0f))
    }

    /// Bit tracking a persistent parameter, if any
    pub fn for_param(id: ParamId) -> Option<u32> {
        match id {
            ParamId::PowerOnLevel => Some(Self::POWER_ON_LEVEL),
            ParamId::SystemFailureLevel => Some(Self::SYSTEM_FAILURE_LEVEL),
            ParamId::MinLevel => Some(Self::MIN_LEVEL),
            ParamId::MaxLevel => Some(Self::MAX_LEVEL),
            ParamId::FadeRate => Some(Self::FADE_RATE),
            ParamId::FadeTime => Some(Self::FADE_TIME),
            ParamId::RandomAddressH => Some(Self::RANDOM_ADDRESS_H),
            ParamId::RandomAddressM => Some(Self::RANDOM_ADDRESS_M),
            ParamId::RandomAddressL => Some(Self::RANDOM_ADDRESS_L),
            ParamId::Scene(n) => Some(Self::scene(n)),
            _ => None,
        }
    }

    pub fn set(&mut self, bits: u32, differs: bool) {
        if differs {
            self.0 |= bits;
        } else {
            self.0 &= !bits;
        }
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn is_reset(&self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatusFlags {
    pub gear_failure: bool,
    pub lamp_failure: bool,
    pub lamp_on: bool,
    pub limit_error: bool,
    pub fade_running: bool,
    pub reset_state: bool,
    pub missing_short_address: bool,
    pub power_failure: bool,
}

impl StatusFlags {
    pub fn byte(&self) -> u8 {
        let bit = |set: bool, b: u8| if set { b } else { 0 };
        bit(self.gear_failure, flag::GEAR_FAILURE)
            | bit(self.lamp_failure, flag::LAMP_FAILURE)
            | bit(self.lamp_on, flag::LAMP_ON)
            | bit(self.limit_error, flag::LIMIT_ERROR)
            | bit(self.fade_running, flag::FADE_RUNNING)
            | bit(self.reset_state, flag::RESET_STATE)
            | bit(self.missing_short_address, flag::MISSING_SHORT_ADDRESS)
            | bit(self.power_failure, flag::POWER_FAILURE)
    }
}

#[derive(Debug, Clone)]
pub struct FadeState {
    /// Microseconds for a fade time fade, ticks left for a fade rate fade
    pub period: u32,
    /// Microseconds per step
    pub increment: u32,
    pub counter: u32,
    pub direction: FadeDirection,
    /// Fade time to restore when a DAPC sequence ends
    pub saved_fade_time: u8,
}

impl FadeState {
    pub fn stop(&mut self) {
        self.period = 0;
        self.increment = 0;
        self.counter = 0;
        self.direction = FadeDirection::None;
    }
}

impl Default for FadeState {
    fn default() -> Self {
        FadeState {
            period: 0,
            increment: 0,
            counter: 0,
            direction: FadeDirection::None,
            saved_fade_time: 0,
        }
    }
}

/// Everything a gear knows about itself. Owned by one engine.
#[derive(Debug, Clone)]
pub struct ControlState {
    pub msg_state: MsgState,
    pub current: Frame,
    /// First arrival of a command that must be sent twice
    pub previous: Frame,
    pub flags: ControlFlags,
    pub params: Parameters,
    pub status: StatusFlags,
    pub dtr: u8,
    pub dtr1: u8,
    pub dtr2: u8,
    pub search_address: u32,
    pub reset_state: ResetState,
    pub actual_level: u8,
    pub requested_level: u8,
    pub fade: FadeState,
    pub bus_fail_count: u16,
    pub bus_on_count: u8,
    pub physical_selection: PhysicalSelection,
    pub response_value: u8,
    pub identity: Identity,
}

impl ControlState {
    pub fn new(identity: Identity, params: Parameters) -> ControlState {
        ControlState {
            msg_state: MsgState::Off,
            current: Frame::default(),
            previous: Frame::default(),
            flags: ControlFlags::default(),
            params,
            status: StatusFlags::default(),
            dtr: 0,
            dtr1: 0,
            dtr2: 0,
            search_address: SEARCH_ADDRESS_RESET,
            reset_state: ResetState::default(),
            actual_level: 0,
            requested_level: 0,
            fade: FadeState::default(),
            bus_fail_count: 0,
            bus_on_count: 0,
            physical_selection: PhysicalSelection::Disabled,
            response_value: 0,
            identity,
        }
    }

    pub fn respond(&mut self, value: u8) {
        self.response_value = value;
    }

    /// Answer for commands that only reply when there is something to say
    pub fn respond_flagged(&mut self, value: u8) {
        self.response_value = value;
        self.flags.response_requested = true;
    }

    pub fn respond_yes_if(&mut self, cond: bool) {
        if cond {
            self.respond_flagged(cmd::YES);
        }
    }

    /// Set the level immediately, abandoning any fade
    pub fn jump_to(&mut self, level: u8) {
        self.actual_level = level;
        self.requested_level = level;
        self.fade.stop();
        self.flags.fade_rate_requested = false;
        self.status.fade_running = false;
    }

    pub fn random_matches_search(&self) -> bool {
        self.params.random_address == self.search_address
    }

    pub fn update_missing_short_address(&mut self) {
        self.status.missing_short_address = self.params.short_address == cmd::MASK;
    }

    /// Gear is in reset state if no value differs from its reset value
    pub fn update_reset_status(&mut self) {
        self.status.reset_state = self.reset_state.is_reset()
            && self.status.byte() & flag::RESET_STATE_MASK == 0;
    }

    pub fn gear_status(&self) -> GearStatus {
        GearStatus::new(self.status.byte())
    }

    /// Compare every value to its reset value
    pub fn recompute_reset_state(&mut self, store: &dyn ParameterStore) {
        for id in ParamId::all() {
            if let Some(bit) = ResetState::for_param(id) {
                self.reset_state
                    .set(bit, self.params.get(id) != store.default_value(id));
            }
        }
        self.reset_state.set(ResetState::GROUP, self.params.groups != 0);
        let search = self.search_address;
        self.reset_state
            .set(ResetState::SEARCH_ADDRESS_H, (search >> 16) as u8 != 0xff);
        self.reset_state
            .set(ResetState::SEARCH_ADDRESS_M, (search >> 8) as u8 != 0xff);
        self.reset_state
            .set(ResetState::SEARCH_ADDRESS_L, search as u8 != 0xff);
        self.reset_state
            .set(ResetState::ACTUAL_LEVEL, self.actual_level != LEVEL_RESET);
    }
}
