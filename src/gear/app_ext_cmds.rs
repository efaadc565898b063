//! Application extended commands for LED modules (device type 6).
//! Every entry is only acted on directly after ENABLE DEVICE TYPE 6.

use crate::defs::gear::cmd;
use crate::gear::fade::MAX_FAST_FADE_TIME;
use crate::gear::hal::{GearIo, ParamId};
use crate::gear::state::{ControlState, OP_MODE_LINEAR_CURVE};
use crate::gear::tables::CommandEntry;
use log::info;

// Bits of the failure status byte
const SHORT_CIRCUIT: u8 = 0x01;
const OPEN_CIRCUIT: u8 = 0x02;
const LOAD_DECREASE: u8 = 0x04;
const LOAD_INCREASE: u8 = 0x08;
const CURRENT_PROTECTOR_ACTIVE: u8 = 0x10;
const THERMAL_SHUTDOWN: u8 = 0x20;
const THERMAL_OVERLOAD: u8 = 0x40;
const REFERENCE_MEASUREMENT_FAILED: u8 = 0x80;

fn reference_system_power(_st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    info!("Reference system power measurement not supported");
}

fn enable_current_protector(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.flags.current_protector_enabled = true;
}

fn disable_current_protector(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.flags.current_protector_enabled = false;
}

fn select_dimming_curve(st: &mut ControlState, io: &mut GearIo, _cmd: u8) {
    let mode = match st.dtr {
        0 => st.params.operating_mode & !OP_MODE_LINEAR_CURVE,
        1 => st.params.operating_mode | OP_MODE_LINEAR_CURVE,
        _ => return,
    };
    st.params.operating_mode = mode;
    io.persist(ParamId::OperatingMode, mode);
}

fn store_dtr_as_fast_fade_time(st: &mut ControlState, io: &mut GearIo, _cmd: u8) {
    let value = match st.dtr {
        0 => 0,
        v if v < st.identity.min_fast_fade_time => st.identity.min_fast_fade_time,
        v => v.min(MAX_FAST_FADE_TIME),
    };
    st.params.fast_fade_time = value;
    io.persist(ParamId::FastFadeTime, value);
}

fn query_gear_type(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(st.identity.gear_type);
}

fn query_dimming_curve(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    let linear = st.params.operating_mode & OP_MODE_LINEAR_CURVE != 0;
    st.respond(linear as u8);
}

fn query_possible_operating_modes(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(st.identity.possible_op_modes);
}

fn query_features(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(st.identity.features);
}

fn query_failure_status(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(st.params.failure_status);
}

fn failure_bit(st: &mut ControlState, bit: u8) {
    st.respond_yes_if(st.params.failure_status & bit != 0);
}

fn query_short_circuit(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    failure_bit(st, SHORT_CIRCUIT);
}

fn query_open_circuit(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    failure_bit(st, OPEN_CIRCUIT);
}

fn query_load_decrease(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    failure_bit(st, LOAD_DECREASE);
}

fn query_load_increase(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    failure_bit(st, LOAD_INCREASE);
}

fn query_current_protector_active(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    failure_bit(st, CURRENT_PROTECTOR_ACTIVE);
}

fn query_thermal_shutdown(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    failure_bit(st, THERMAL_SHUTDOWN);
}

fn query_thermal_overload(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    failure_bit(st, THERMAL_OVERLOAD);
}

// No reference measurement ever runs
fn query_reference_running(_st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {}

fn query_reference_measurement_failed(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    failure_bit(st, REFERENCE_MEASUREMENT_FAILED);
}

fn query_current_protector_enabled(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond_yes_if(st.flags.current_protector_enabled);
}

fn query_operating_mode(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(st.params.operating_mode);
}

fn query_fast_fade_time(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(st.params.fast_fade_time);
}

fn query_min_fast_fade_time(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(st.identity.min_fast_fade_time);
}

fn query_extended_version_number(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(st.identity.extended_version);
}

pub fn table() -> [CommandEntry; 32] {
    let mut t = [CommandEntry::NOOP.device_type(); 32];
    let mut set = |c: u8, entry: CommandEntry| {
        t[(c - cmd::APP_EXTENDED_FIRST) as usize] = entry.device_type();
    };
    set(cmd::REFERENCE_SYSTEM_POWER, CommandEntry::twice(reference_system_power));
    set(cmd::ENABLE_CURRENT_PROTECTOR, CommandEntry::twice(enable_current_protector));
    set(cmd::DISABLE_CURRENT_PROTECTOR, CommandEntry::twice(disable_current_protector));
    set(cmd::SELECT_DIMMING_CURVE, CommandEntry::twice(select_dimming_curve));
    set(cmd::STORE_DTR_AS_FAST_FADE_TIME, CommandEntry::twice(store_dtr_as_fast_fade_time));
    set(cmd::QUERY_GEAR_TYPE, CommandEntry::query(query_gear_type));
    set(cmd::QUERY_DIMMING_CURVE, CommandEntry::query(query_dimming_curve));
    set(
        cmd::QUERY_POSSIBLE_OPERATING_MODES,
        CommandEntry::query(query_possible_operating_modes),
    );
    set(cmd::QUERY_FEATURES, CommandEntry::query(query_features));
    set(cmd::QUERY_FAILURE_STATUS, CommandEntry::query(query_failure_status));
    set(cmd::QUERY_SHORT_CIRCUIT, CommandEntry::flagged(query_short_circuit));
    set(cmd::QUERY_OPEN_CIRCUIT, CommandEntry::flagged(query_open_circuit));
    set(cmd::QUERY_LOAD_DECREASE, CommandEntry::flagged(query_load_decrease));
    set(cmd::QUERY_LOAD_INCREASE, CommandEntry::flagged(query_load_increase));
    set(
        cmd::QUERY_CURRENT_PROTECTOR_ACTIVE,
        CommandEntry::flagged(query_current_protector_active),
    );
    set(cmd::QUERY_THERMAL_SHUTDOWN, CommandEntry::flagged(query_thermal_shutdown));
    set(cmd::QUERY_THERMAL_OVERLOAD, CommandEntry::flagged(query_thermal_overload));
    set(cmd::QUERY_REFERENCE_RUNNING, CommandEntry::flagged(query_reference_running));
    set(
        cmd::QUERY_REFERENCE_MEASUREMENT_FAILED,
        CommandEntry::flagged(query_reference_measurement_failed),
    );
    set(
        cmd::QUERY_CURRENT_PROTECTOR_ENABLED,
        CommandEntry::flagged(query_current_protector_enabled),
    );
    set(cmd::QUERY_OPERATING_MODE, CommandEntry::query(query_operating_mode));
    set(cmd::QUERY_FAST_FADE_TIME, CommandEntry::query(query_fast_fade_time));
    set(cmd::QUERY_MIN_FAST_FADE_TIME, CommandEntry::query(query_min_fast_fade_time));
    set(
        cmd::QUERY_EXTENDED_VERSION_NUMBER,
        CommandEntry::query(query_extended_version_number),
    );
    t
}
