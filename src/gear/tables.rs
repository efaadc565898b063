//! Dispatch tables mapping command numbers to handlers.

use crate::defs::gear::cmd;
use crate::gear::hal::GearIo;
use crate::gear::state::ControlState;
use crate::gear::{app_ext_cmds, normal_cmds, special_cmds};
use lazy_static::lazy_static;
use std::fmt;

/// Handlers get the data byte of the frame. For normal commands that is
/// the command number itself.
pub type Handler = fn(&mut ControlState, &mut GearIo, u8);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResponsePolicy {
    None,
    Always,
    /// Only if the handler asked for it
    Flagged,
}

#[derive(Copy, Clone)]
pub enum Action {
    NoOp,
    Exec(Handler),
    /// Look the command up in the application extended table
    Redirect,
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::NoOp => write!(f, "NoOp"),
            Action::Exec(_) => write!(f, "Exec"),
            Action::Redirect => write!(f, "Redirect"),
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct CommandEntry {
    pub repeat: bool,
    pub in_time: bool,
    pub device_type: bool,
    pub response: ResponsePolicy,
    pub action: Action,
}

impl CommandEntry {
    pub const NOOP: CommandEntry = CommandEntry {
        repeat: false,
        in_time: false,
        device_type: false,
        response: ResponsePolicy::None,
        action: Action::NoOp,
    };

    pub const REDIRECT: CommandEntry = CommandEntry {
        action: Action::Redirect,
        ..CommandEntry::NOOP
    };

    pub const fn exec(handler: Handler) -> CommandEntry {
        CommandEntry {
            action: Action::Exec(handler),
            ..CommandEntry::NOOP
        }
    }

    /// Must be received twice within the repeat window
    pub const fn twice(handler: Handler) -> CommandEntry {
        CommandEntry {
            repeat: true,
            ..CommandEntry::exec(handler)
        }
    }

    pub const fn query(handler: Handler) -> CommandEntry {
        CommandEntry {
            response: ResponsePolicy::Always,
            ..CommandEntry::exec(handler)
        }
    }

    pub const fn flagged(handler: Handler) -> CommandEntry {
        CommandEntry {
            response: ResponsePolicy::Flagged,
            ..CommandEntry::exec(handler)
        }
    }

    /// Only executed while the commissioning timer runs
    pub const fn in_time(self) -> CommandEntry {
        CommandEntry {
            in_time: true,
            ..self
        }
    }

    /// Only executed after ENABLE DEVICE TYPE with our device type
    pub const fn device_type(self) -> CommandEntry {
        CommandEntry {
            device_type: true,
            ..self
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.action, Action::NoOp)
    }
}

lazy_static! {
    static ref NORMAL: [CommandEntry; 256] = normal_cmds::table();
    static ref APP_EXTENDED: [CommandEntry; 32] = app_ext_cmds::table();
    static ref SPECIAL: [CommandEntry; 16] = special_cmds::special_table();
    static ref SPECIAL_EXTENDED: [CommandEntry; 16] = special_cmds::extended_table();
}

pub fn normal_entry(command: u8) -> CommandEntry {
    let entry = NORMAL[command as usize];
    match entry.action {
        Action::Redirect => {
            APP_EXTENDED[(command.wrapping_sub(cmd::APP_EXTENDED_FIRST) & 0x1f) as usize]
        }
        _ => entry,
    }
}

pub fn special_entry(index: u8) -> CommandEntry {
    SPECIAL[(index & 0x0f) as usize]
}

pub fn extended_entry(index: u8) -> CommandEntry {
    SPECIAL_EXTENDED[(index & 0x0f) as usize]
}
