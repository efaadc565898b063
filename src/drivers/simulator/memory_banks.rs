//! Memory banks 0 and 1. Bank 0 holds read only identification data.
//! Bank 1 is writable once location 2 holds the unlock value.

use crate::gear::hal::MemoryBanks;
use std::sync::{Arc, Mutex};

pub const LOCK_BYTE: u8 = 0x02;
pub const UNLOCK_VALUE: u8 = 0x55;
pub const BANK1_SIZE: u8 = 0x10;

struct Banks {
    bank0: Vec<u8>,
    bank1: Vec<u8>,
}

#[derive(Clone)]
pub struct SimMemoryBanks {
    banks: Arc<Mutex<Banks>>,
}

impl SimMemoryBanks {
    /// Bank 0 is built from the serial number. Location 0 holds the
    /// address of the last accessible location.
    pub fn new(serial_number: u32) -> SimMemoryBanks {
        let mut bank0 = vec![0u8; 0x0f];
        bank0[0] = 0x0e;
        // Number of the last accessible bank
        bank0[2] = 1;
        bank0[0x0b..0x0f].copy_from_slice(&serial_number.to_be_bytes());
        let mut bank1 = vec![0xffu8; BANK1_SIZE as usize];
        bank1[0] = BANK1_SIZE - 1;
        bank1[1] = 0;
        bank1[LOCK_BYTE as usize] = 0;
        SimMemoryBanks {
            banks: Arc::new(Mutex::new(Banks { bank0, bank1 })),
        }
    }
}

impl MemoryBanks for SimMemoryBanks {
    fn read(&self, bank: u8, addr: u8) -> Option<u8> {
        let banks = self.banks.lock().ok()?;
        match bank {
            0 => banks.bank0.get(addr as usize).copied(),
            1 => banks.bank1.get(addr as usize).copied(),
            _ => None,
        }
    }

    fn write(&mut self, bank: u8, addr: u8, value: u8, bypass_lock: bool) -> bool {
        let mut banks = match self.banks.lock() {
            Ok(banks) => banks,
            Err(_) => return false,
        };
        if bank != 1 || addr < LOCK_BYTE || addr >= BANK1_SIZE {
            return false;
        }
        if addr != LOCK_BYTE && !bypass_lock && banks.bank1[LOCK_BYTE as usize] != UNLOCK_VALUE {
            return false;
        }
        banks.bank1[addr as usize] = value;
        true
    }
}

#[test]
fn lock_byte_guards_bank1() {
    let mut banks = SimMemoryBanks::new(0x12345678);
    assert_eq!(banks.read(0, 0x0b), Some(0x12));
    assert_eq!(banks.read(0, 0x0e), Some(0x78));
    assert_eq!(banks.read(0, 0x0f), None);
    assert!(!banks.write(0, 3, 1, true));
    assert!(!banks.write(1, 4, 0xaa, false));
    assert!(banks.write(1, 4, 0xaa, true));
    assert!(banks.write(1, LOCK_BYTE, UNLOCK_VALUE, false));
    assert!(banks.write(1, 5, 0xbb, false));
    assert_eq!(banks.read(1, 5), Some(0xbb));
    assert!(!banks.write(1, BANK1_SIZE, 0, false));
}
