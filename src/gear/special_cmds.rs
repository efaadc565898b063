//! Special commands (0xa1..=0xbf) and extended special commands
//! (0xc1..=0xdf). The table index is taken from bits 1..=4 of the
//! address byte. Handlers get the data byte.

use crate::base::address::{short_command_byte, short_from_data};
use crate::error::GearError;
use crate::gear::hal::{GearIo, ParamId, TimerId};
use crate::gear::state::{ControlState, PhysicalSelection, ResetState};
use crate::gear::tables::CommandEntry;
use log::{debug, info};

fn selected(st: &ControlState) -> bool {
    st.random_matches_search() || st.physical_selection == PhysicalSelection::Enabled
}

fn terminate(st: &mut ControlState, io: &mut GearIo, _data: u8) {
    io.scheduler.stop_timer(TimerId::Commissioning);
    st.flags.fifteen_min_timer_running = false;
    st.flags.compare_mode_enabled = false;
    st.physical_selection = PhysicalSelection::Disabled;
}

fn data_transfer_register(st: &mut ControlState, _io: &mut GearIo, data: u8) {
    st.dtr = data;
}

fn initialise(st: &mut ControlState, io: &mut GearIo, data: u8) {
    let addressed = data == 0x00
        || (data == 0xff && st.status.missing_short_address)
        || data == short_command_byte(st.params.short_address);
    if addressed {
        info!("Commissioning window opened");
        let window = io.timers.commissioning();
        io.scheduler.start_timer(TimerId::Commissioning, window);
        st.flags.fifteen_min_timer_running = true;
        st.flags.compare_mode_enabled = true;
    }
}

fn randomise(st: &mut ControlState, io: &mut GearIo, _data: u8) {
    for id in [
        ParamId::RandomAddressH,
        ParamId::RandomAddressM,
        ParamId::RandomAddressL,
    ] {
        let byte = io.output.generate_random();
        st.params.set(id, byte);
        if let Some(bit) = ResetState::for_param(id) {
            st.reset_state.set(bit, byte != io.params.default_value(id));
        }
        io.persist(id, byte);
    }
    debug!("Random address {:06x}", st.params.random_address);
}

fn compare(st: &mut ControlState, _io: &mut GearIo, _data: u8) {
    st.respond_yes_if(
        st.flags.compare_mode_enabled && st.params.random_address <= st.search_address,
    );
}

fn withdraw(st: &mut ControlState, _io: &mut GearIo, _data: u8) {
    if st.random_matches_search() {
        st.flags.compare_mode_enabled = false;
    }
}

fn set_search_byte(st: &mut ControlState, shift: u32, bit: u32, data: u8) {
    st.search_address = (st.search_address & !(0xff << shift)) | ((data as u32) << shift);
    st.reset_state.set(bit, data != 0xff);
}

fn search_address_h(st: &mut ControlState, _io: &mut GearIo, data: u8) {
    set_search_byte(st, 16, ResetState::SEARCH_ADDRESS_H, data);
}

fn search_address_m(st: &mut ControlState, _io: &mut GearIo, data: u8) {
    set_search_byte(st, 8, ResetState::SEARCH_ADDRESS_M, data);
}

fn search_address_l(st: &mut ControlState, _io: &mut GearIo, data: u8) {
    set_search_byte(st, 0, ResetState::SEARCH_ADDRESS_L, data);
}

fn program_short_address(st: &mut ControlState, io: &mut GearIo, data: u8) {
    if !selected(st) {
        return;
    }
    if let Some(short) = short_from_data(data) {
        info!("Programmed short address {}", short);
        st.params.short_address = short;
        io.persist(ParamId::ShortAddress, short);
        st.update_missing_short_address();
    }
}

fn verify_short_address(st: &mut ControlState, _io: &mut GearIo, data: u8) {
    st.respond_yes_if(selected(st) && short_from_data(data) == Some(st.params.short_address));
}

fn query_short_address(st: &mut ControlState, _io: &mut GearIo, _data: u8) {
    if selected(st) {
        st.respond_flagged(short_command_byte(st.params.short_address));
    }
}

fn physical_selection(st: &mut ControlState, _io: &mut GearIo, _data: u8) {
    if st.physical_selection == PhysicalSelection::Disabled {
        st.physical_selection = PhysicalSelection::Requested;
        st.flags.compare_mode_enabled = false;
    } else {
        st.physical_selection = PhysicalSelection::Disabled;
        st.flags.compare_mode_enabled = true;
    }
}

fn enable_device_type(st: &mut ControlState, _io: &mut GearIo, data: u8) {
    st.flags.app_extended_requested = data == st.identity.device_type;
}

fn data_transfer_register1(st: &mut ControlState, _io: &mut GearIo, data: u8) {
    st.dtr1 = data;
}

fn data_transfer_register2(st: &mut ControlState, _io: &mut GearIo, data: u8) {
    st.dtr2 = data;
}

/// Write `data` to location DTR of bank DTR1. DTR advances whether or not
/// the write succeeded.
fn write_memory_location(st: &mut ControlState, io: &mut GearIo, data: u8) {
    if !st.flags.write_memory_enabled {
        return;
    }
    let ok = io.memory.write(st.dtr1, st.dtr, data, false);
    st.dtr = st.dtr.wrapping_add(1);
    if ok {
        st.respond_flagged(data);
    } else {
        debug!(
            "{}",
            GearError::MemoryBank {
                bank: st.dtr1,
                addr: st.dtr.wrapping_sub(1)
            }
        );
    }
}

pub fn special_table() -> [CommandEntry; 16] {
    [
        CommandEntry::exec(terminate),
        CommandEntry::exec(data_transfer_register),
        CommandEntry::twice(initialise),
        CommandEntry::twice(randomise).in_time(),
        CommandEntry::flagged(compare).in_time(),
        CommandEntry::exec(withdraw).in_time(),
        CommandEntry::NOOP,
        CommandEntry::NOOP,
        CommandEntry::exec(search_address_h).in_time(),
        CommandEntry::exec(search_address_m).in_time(),
        CommandEntry::exec(search_address_l).in_time(),
        CommandEntry::exec(program_short_address).in_time(),
        CommandEntry::flagged(verify_short_address).in_time(),
        CommandEntry::flagged(query_short_address).in_time(),
        CommandEntry::exec(physical_selection).in_time(),
        CommandEntry::NOOP,
    ]
}

pub fn extended_table() -> [CommandEntry; 16] {
    let mut t = [CommandEntry::NOOP; 16];
    t[0] = CommandEntry::exec(enable_device_type);
    t[1] = CommandEntry::exec(data_transfer_register1);
    t[2] = CommandEntry::exec(data_transfer_register2);
    t[3] = CommandEntry::flagged(write_memory_location);
    t
}
