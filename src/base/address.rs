use std::fmt;

/// Destination of a forward frame, decoded from its first byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameAddress {
    /// Short address 0..=63
    Short(u8),
    /// Group 0..=15
    Group(u8),
    Broadcast,
    /// Special command index 0..=15 (0xa1..=0xbf)
    Special(u8),
    /// Extended special command index 0..=15 (0xc1..=0xdf)
    Extended(u8),
    Reserved,
}

/// Bit 0 of the address byte selects between a direct arc power level
/// (cleared) and a command byte (set).
pub const COMMAND_BIT: u8 = 0x01;

pub const BROADCAST_ADDRESS: u8 = 0x3f;

impl FrameAddress {
    pub fn from_byte(byte: u8) -> FrameAddress {
        match byte {
            0x00..=0x7f => FrameAddress::Short(byte >> 1),
            0x80..=0x9f => FrameAddress::Group((byte >> 1) & 0x0f),
            0xa0..=0xdf if byte & COMMAND_BIT != 0 => {
                let index = (byte >> 1) & 0x0f;
                match ((byte >> 1) & 0x3f) >> 4 {
                    1 => FrameAddress::Special(index),
                    _ => FrameAddress::Extended(index),
                }
            }
            0xfe | 0xff => FrameAddress::Broadcast,
            _ => FrameAddress::Reserved,
        }
    }

    /// True if an addressable frame is meant for a gear with the given
    /// short address (0xff when unassigned) and group membership.
    pub fn accepts(&self, short_address: u8, groups: u16) -> bool {
        match *self {
            FrameAddress::Short(a) => a == short_address,
            FrameAddress::Group(g) => groups & (1 << g) != 0,
            FrameAddress::Broadcast => true,
            _ => false,
        }
    }

    pub fn is_special(&self) -> bool {
        matches!(self, FrameAddress::Special(_) | FrameAddress::Extended(_))
    }
}

impl fmt::Display for FrameAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameAddress::Short(a) => write!(f, "S{}", a),
            FrameAddress::Group(g) => write!(f, "G{}", g),
            FrameAddress::Broadcast => write!(f, "broadcast"),
            FrameAddress::Special(i) => write!(f, "special {}", i),
            FrameAddress::Extended(i) => write!(f, "extended {}", i),
            FrameAddress::Reserved => write!(f, "reserved"),
        }
    }
}

/// Address byte that selects the gear with the given short address for
/// commands, as answered by QUERY SHORT ADDRESS.
pub fn short_command_byte(short_address: u8) -> u8 {
    if short_address > 0x3f {
        0xff
    } else {
        (short_address << 1) | COMMAND_BIT
    }
}

/// Decode a short address carried in the data byte of
/// PROGRAM SHORT ADDRESS or STORE DTR AS SHORT ADDRESS.
/// Returns None if the byte is neither 0AAAAAA1 nor 0xff.
pub fn short_from_data(data: u8) -> Option<u8> {
    if data == 0xff {
        Some(0xff)
    } else if data & 0x81 == 0x01 {
        Some(data >> 1)
    } else {
        None
    }
}

#[test]
fn classify_address_bytes() {
    assert_eq!(FrameAddress::from_byte(0x0b), FrameAddress::Short(5));
    assert_eq!(FrameAddress::from_byte(0x0a), FrameAddress::Short(5));
    assert_eq!(FrameAddress::from_byte(0x83), FrameAddress::Group(1));
    assert_eq!(FrameAddress::from_byte(0x9f), FrameAddress::Group(15));
    assert_eq!(FrameAddress::from_byte(0xfe), FrameAddress::Broadcast);
    assert_eq!(FrameAddress::from_byte(0xff), FrameAddress::Broadcast);
    assert_eq!(FrameAddress::from_byte(0xa1), FrameAddress::Special(0));
    assert_eq!(FrameAddress::from_byte(0xbd), FrameAddress::Special(14));
    assert_eq!(FrameAddress::from_byte(0xc1), FrameAddress::Extended(0));
    assert_eq!(FrameAddress::from_byte(0xc7), FrameAddress::Extended(3));
    assert_eq!(FrameAddress::from_byte(0xa0), FrameAddress::Reserved);
    assert_eq!(FrameAddress::from_byte(0xe1), FrameAddress::Reserved);
}

#[test]
fn accept_addresses() {
    let groups = 1 << 3;
    assert!(FrameAddress::Short(5).accepts(5, groups));
    assert!(!FrameAddress::Short(5).accepts(0xff, groups));
    assert!(FrameAddress::Group(3).accepts(0xff, groups));
    assert!(!FrameAddress::Group(4).accepts(5, groups));
    assert!(FrameAddress::Broadcast.accepts(0xff, 0));
    assert!(!FrameAddress::Special(1).accepts(5, 0xffff));
}

#[test]
fn short_address_data() {
    assert_eq!(short_from_data(0x0b), Some(5));
    assert_eq!(short_from_data(0xff), Some(0xff));
    assert_eq!(short_from_data(0x0a), None);
    assert_eq!(short_from_data(0x81), None);
    assert_eq!(short_command_byte(5), 0x0b);
    assert_eq!(short_command_byte(0xff), 0xff);
}
