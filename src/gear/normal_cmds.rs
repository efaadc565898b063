use crate::base::address::short_from_data;
use crate::defs::gear::cmd;
use crate::gear::fade;
use crate::gear::hal::{GearIo, ParamId};
use crate::gear::state::{ControlState, FadeDirection, ResetState, LEVEL_RESET};
use crate::gear::tables::CommandEntry;
use log::debug;

fn lamp_lit(st: &ControlState) -> bool {
    st.actual_level != 0 && st.actual_level >= st.params.min_level
}

// Level commands

fn off(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.jump_to(0);
    st.status.limit_error = false;
}

fn up(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    fade::start_rate_fade(st, FadeDirection::Up);
}

fn down(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    fade::start_rate_fade(st, FadeDirection::Down);
}

fn step_up(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    if lamp_lit(st) && st.actual_level < st.params.max_level {
        st.jump_to(st.actual_level + 1);
    }
}

fn step_down(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    if st.actual_level > st.params.min_level {
        st.jump_to(st.actual_level - 1);
    }
}

fn recall_max_level(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.jump_to(st.params.max_level);
    st.status.limit_error = false;
}

fn recall_min_level(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.jump_to(st.params.min_level);
    st.status.limit_error = false;
}

fn step_down_and_off(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    if lamp_lit(st) {
        if st.actual_level > st.params.min_level {
            st.jump_to(st.actual_level - 1);
        } else {
            st.jump_to(0);
        }
    }
}

fn on_and_step_up(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    if lamp_lit(st) {
        if st.actual_level < st.params.max_level {
            st.jump_to(st.actual_level + 1);
        }
    } else {
        st.jump_to(st.params.min_level);
    }
}

fn enable_dapc_sequence(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    if !st.flags.dapc_sequence_running {
        st.fade.saved_fade_time = st.params.fade_time;
        st.params.fade_time = 1;
    }
    st.flags.dapc_sequence_running = true;
}

fn go_to_scene(st: &mut ControlState, _io: &mut GearIo, cmd: u8) {
    st.requested_level = st.params.scenes[(cmd & 0x0f) as usize];
    st.flags.output_change_requested = true;
}

// Configuration commands

fn reset(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.flags.reset_requested = true;
}

fn store_actual_level_in_dtr(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.dtr = st.actual_level;
}

/// Store a parameter and track whether it still has its default value
fn store_param(st: &mut ControlState, io: &mut GearIo, id: ParamId, value: u8) {
    st.params.set(id, value);
    if let Some(bit) = ResetState::for_param(id) {
        st.reset_state.set(bit, value != io.params.default_value(id));
    }
    io.persist(id, value);
}

fn store_dtr_as_max_level(st: &mut ControlState, io: &mut GearIo, _cmd: u8) {
    let mut max = st.dtr;
    if max <= st.params.min_level {
        max = st.params.min_level;
    }
    if max == cmd::MASK {
        max = LEVEL_RESET;
    }
    if st.actual_level > max {
        st.actual_level = max;
    }
    if st.requested_level > max {
        st.requested_level = max;
    }
    store_param(st, io, ParamId::MaxLevel, max);
}

fn store_dtr_as_min_level(st: &mut ControlState, io: &mut GearIo, _cmd: u8) {
    let mut min = st.dtr;
    if min >= st.params.max_level {
        min = st.params.max_level;
    }
    if min < st.identity.physical_min_level {
        min = st.identity.physical_min_level;
    }
    if st.actual_level != 0 && st.actual_level < min {
        st.actual_level = min;
    }
    if st.requested_level != 0 && st.requested_level < min {
        st.requested_level = min;
    }
    store_param(st, io, ParamId::MinLevel, min);
}

fn store_dtr_as_system_failure_level(st: &mut ControlState, io: &mut GearIo, _cmd: u8) {
    store_param(st, io, ParamId::SystemFailureLevel, st.dtr);
}

fn store_dtr_as_power_on_level(st: &mut ControlState, io: &mut GearIo, _cmd: u8) {
    store_param(st, io, ParamId::PowerOnLevel, st.dtr);
}

fn store_dtr_as_fade_time(st: &mut ControlState, io: &mut GearIo, _cmd: u8) {
    store_param(st, io, ParamId::FadeTime, st.dtr.min(0x0f));
}

fn store_dtr_as_fade_rate(st: &mut ControlState, io: &mut GearIo, _cmd: u8) {
    store_param(st, io, ParamId::FadeRate, st.dtr.clamp(1, 0x0f));
}

fn store_dtr_as_scene(st: &mut ControlState, io: &mut GearIo, cmd: u8) {
    store_param(st, io, ParamId::Scene(cmd & 0x0f), st.dtr);
}

fn remove_from_scene(st: &mut ControlState, io: &mut GearIo, cmd: u8) {
    store_param(st, io, ParamId::Scene(cmd & 0x0f), cmd::MASK);
}

fn store_groups(st: &mut ControlState, io: &mut GearIo, groups: u16) {
    st.params.groups = groups;
    st.reset_state.set(ResetState::GROUP, groups != 0);
    io.persist(ParamId::Group0_7, groups as u8);
    io.persist(ParamId::Group8_15, (groups >> 8) as u8);
}

fn add_to_group(st: &mut ControlState, io: &mut GearIo, cmd: u8) {
    let groups = st.params.groups | (1 << (cmd & 0x0f));
    store_groups(st, io, groups);
}

fn remove_from_group(st: &mut ControlState, io: &mut GearIo, cmd: u8) {
    let groups = st.params.groups & !(1 << (cmd & 0x0f));
    store_groups(st, io, groups);
}

fn store_dtr_as_short_address(st: &mut ControlState, io: &mut GearIo, _cmd: u8) {
    if let Some(short) = short_from_data(st.dtr) {
        debug!("New short address {}", short);
        st.params.short_address = short;
        st.update_missing_short_address();
        io.persist(ParamId::ShortAddress, short);
    }
}

fn enable_write_memory(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.flags.write_memory_enabled = true;
}

// Queries

fn query_status(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.update_reset_status();
    st.respond(st.status.byte());
}

fn query_control_gear_present(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(cmd::YES);
}

fn query_lamp_failure(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond_yes_if(st.status.lamp_failure);
}

fn query_lamp_power_on(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond_yes_if(st.status.lamp_on);
}

fn query_limit_error(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond_yes_if(st.status.limit_error);
}

fn query_reset_state(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.update_reset_status();
    st.respond_yes_if(st.status.reset_state);
}

fn query_missing_short_address(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond_yes_if(st.status.missing_short_address);
}

fn query_version_number(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(st.identity.version);
}

fn query_content_dtr(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(st.dtr);
}

fn query_device_type(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(st.identity.device_type);
}

fn query_physical_minimum(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(st.identity.physical_min_level);
}

fn query_power_failure(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond_yes_if(st.status.power_failure);
}

fn query_content_dtr1(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(st.dtr1);
}

fn query_content_dtr2(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(st.dtr2);
}

fn query_actual_level(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    let level = if st.status.lamp_failure {
        cmd::MASK
    } else {
        st.actual_level
    };
    st.respond(level);
}

fn query_max_level(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(st.params.max_level);
}

fn query_min_level(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(st.params.min_level);
}

fn query_power_on_level(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(st.params.power_on_level);
}

fn query_system_failure_level(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(st.params.system_failure_level);
}

fn query_fade(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond((st.params.fade_time << 4) | (st.params.fade_rate & 0x0f));
}

fn query_scene_level(st: &mut ControlState, _io: &mut GearIo, cmd: u8) {
    st.respond(st.params.scenes[(cmd & 0x0f) as usize]);
}

fn query_groups_0_7(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(st.params.groups as u8);
}

fn query_groups_8_15(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond((st.params.groups >> 8) as u8);
}

fn query_random_address_h(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond((st.params.random_address >> 16) as u8);
}

fn query_random_address_m(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond((st.params.random_address >> 8) as u8);
}

fn query_random_address_l(st: &mut ControlState, _io: &mut GearIo, _cmd: u8) {
    st.respond(st.params.random_address as u8);
}

/// Answer the location DTR in bank DTR1 and advance DTR. The location
/// after it is latched in DTR2.
fn read_memory_location(st: &mut ControlState, io: &mut GearIo, _cmd: u8) {
    if let Some(value) = io.memory.read(st.dtr1, st.dtr) {
        st.respond_flagged(value);
        st.dtr = st.dtr.wrapping_add(1);
    }
    if let Some(next) = io.memory.read(st.dtr1, st.dtr) {
        st.dtr2 = next;
    }
}

pub fn table() -> [CommandEntry; 256] {
    let mut t = [CommandEntry::NOOP; 256];
    t[cmd::OFF as usize] = CommandEntry::exec(off);
    t[cmd::UP as usize] = CommandEntry::exec(up);
    t[cmd::DOWN as usize] = CommandEntry::exec(down);
    t[cmd::STEP_UP as usize] = CommandEntry::exec(step_up);
    t[cmd::STEP_DOWN as usize] = CommandEntry::exec(step_down);
    t[cmd::RECALL_MAX_LEVEL as usize] = CommandEntry::exec(recall_max_level);
    t[cmd::RECALL_MIN_LEVEL as usize] = CommandEntry::exec(recall_min_level);
    t[cmd::STEP_DOWN_AND_OFF as usize] = CommandEntry::exec(step_down_and_off);
    t[cmd::ON_AND_STEP_UP as usize] = CommandEntry::exec(on_and_step_up);
    t[cmd::ENABLE_DAPC_SEQUENCE as usize] = CommandEntry::exec(enable_dapc_sequence);
    for n in 0..16 {
        t[(cmd::GO_TO_SCENE + n) as usize] = CommandEntry::exec(go_to_scene);
        t[(cmd::STORE_DTR_AS_SCENE + n) as usize] = CommandEntry::twice(store_dtr_as_scene);
        t[(cmd::REMOVE_FROM_SCENE + n) as usize] = CommandEntry::twice(remove_from_scene);
        t[(cmd::ADD_TO_GROUP + n) as usize] = CommandEntry::twice(add_to_group);
        t[(cmd::REMOVE_FROM_GROUP + n) as usize] = CommandEntry::twice(remove_from_group);
        t[(cmd::QUERY_SCENE_LEVEL + n) as usize] = CommandEntry::query(query_scene_level);
    }

    t[cmd::RESET as usize] = CommandEntry::twice(reset);
    t[cmd::STORE_ACTUAL_LEVEL_IN_DTR as usize] = CommandEntry::twice(store_actual_level_in_dtr);
    t[cmd::STORE_DTR_AS_MAX_LEVEL as usize] = CommandEntry::twice(store_dtr_as_max_level);
    t[cmd::STORE_DTR_AS_MIN_LEVEL as usize] = CommandEntry::twice(store_dtr_as_min_level);
    t[cmd::STORE_DTR_AS_SYSTEM_FAILURE_LEVEL as usize] =
        CommandEntry::twice(store_dtr_as_system_failure_level);
    t[cmd::STORE_DTR_AS_POWER_ON_LEVEL as usize] =
        CommandEntry::twice(store_dtr_as_power_on_level);
    t[cmd::STORE_DTR_AS_FADE_TIME as usize] = CommandEntry::twice(store_dtr_as_fade_time);
    t[cmd::STORE_DTR_AS_FADE_RATE as usize] = CommandEntry::twice(store_dtr_as_fade_rate);
    t[cmd::STORE_DTR_AS_SHORT_ADDRESS as usize] = CommandEntry::twice(store_dtr_as_short_address);
    t[cmd::ENABLE_WRITE_MEMORY as usize] = CommandEntry::twice(enable_write_memory);

    t[cmd::QUERY_STATUS as usize] = CommandEntry::query(query_status);
    t[cmd::QUERY_CONTROL_GEAR_PRESENT as usize] = CommandEntry::query(query_control_gear_present);
    t[cmd::QUERY_LAMP_FAILURE as usize] = CommandEntry::flagged(query_lamp_failure);
    t[cmd::QUERY_LAMP_POWER_ON as usize] = CommandEntry::flagged(query_lamp_power_on);
    t[cmd::QUERY_LIMIT_ERROR as usize] = CommandEntry::flagged(query_limit_error);
    t[cmd::QUERY_RESET_STATE as usize] = CommandEntry::flagged(query_reset_state);
    t[cmd::QUERY_MISSING_SHORT_ADDRESS as usize] =
        CommandEntry::flagged(query_missing_short_address);
    t[cmd::QUERY_VERSION_NUMBER as usize] = CommandEntry::query(query_version_number);
    t[cmd::QUERY_CONTENT_DTR as usize] = CommandEntry::query(query_content_dtr);
    t[cmd::QUERY_DEVICE_TYPE as usize] = CommandEntry::query(query_device_type);
    t[cmd::QUERY_PHYSICAL_MINIMUM as usize] = CommandEntry::query(query_physical_minimum);
    t[cmd::QUERY_POWER_FAILURE as usize] = CommandEntry::flagged(query_power_failure);
    t[cmd::QUERY_CONTENT_DTR1 as usize] = CommandEntry::query(query_content_dtr1);
    t[cmd::QUERY_CONTENT_DTR2 as usize] = CommandEntry::query(query_content_dtr2);
    t[cmd::QUERY_ACTUAL_LEVEL as usize] = CommandEntry::query(query_actual_level);
    t[cmd::QUERY_MAX_LEVEL as usize] = CommandEntry::query(query_max_level);
    t[cmd::QUERY_MIN_LEVEL as usize] = CommandEntry::query(query_min_level);
    t[cmd::QUERY_POWER_ON_LEVEL as usize] = CommandEntry::query(query_power_on_level);
    t[cmd::QUERY_SYSTEM_FAILURE_LEVEL as usize] = CommandEntry::query(query_system_failure_level);
    t[cmd::QUERY_FADE as usize] = CommandEntry::query(query_fade);
    t[cmd::QUERY_GROUPS_0_7 as usize] = CommandEntry::query(query_groups_0_7);
    t[cmd::QUERY_GROUPS_8_15 as usize] = CommandEntry::query(query_groups_8_15);
    t[cmd::QUERY_RANDOM_ADDRESS_H as usize] = CommandEntry::query(query_random_address_h);
    t[cmd::QUERY_RANDOM_ADDRESS_M as usize] = CommandEntry::query(query_random_address_m);
    t[cmd::QUERY_RANDOM_ADDRESS_L as usize] = CommandEntry::query(query_random_address_l);
    t[cmd::READ_MEMORY_LOCATION as usize] = CommandEntry::flagged(read_memory_location);

    for c in cmd::APP_EXTENDED_FIRST..=0xff {
        t[c as usize] = CommandEntry::REDIRECT;
    }
    t
}
