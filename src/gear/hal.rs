//! Interfaces to the parts of a gear outside the protocol engine.

use crate::config::TimerConfig;
use crate::error::GearError;
use serde_derive::{Deserialize, Serialize};
use std::time::Duration;

/// Persistent parameters
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamId {
    ShortAddress,
    PowerOnLevel,
    SystemFailureLevel,
    MinLevel,
    MaxLevel,
    LastRequestedLevel,
    FadeRate,
    FadeTime,
    RandomAddressH,
    RandomAddressM,
    RandomAddressL,
    Group0_7,
    Group8_15,
    Scene(u8),
    FailureStatus,
    OperatingMode,
    FastFadeTime,
}

impl ParamId {
    pub fn all() -> impl Iterator<Item = ParamId> {
        use ParamId::*;
        [
            ShortAddress,
            PowerOnLevel,
            SystemFailureLevel,
            MinLevel,
            MaxLevel,
            LastRequestedLevel,
            FadeRate,
            FadeTime,
            RandomAddressH,
            RandomAddressM,
            RandomAddressL,
            Group0_7,
            Group8_15,
            FailureStatus,
            OperatingMode,
            FastFadeTime,
        ]
        .into_iter()
        .chain((0..16).map(Scene))
    }
}

pub trait ParameterStore {
    fn get(&self, id: ParamId) -> Result<u8, GearError>;
    fn put(&mut self, id: ParamId, value: u8) -> Result<(), GearError>;
    fn default_value(&self, id: ParamId) -> u8;
    /// Restore every parameter to its default value
    fn reset_user_defaults(&mut self);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DimmingCurve {
    Logarithmic,
    Linear,
}

pub trait OutputDriver {
    /// Light output in tenths of a percent, 0..=1000
    fn set_level(&mut self, curve: DimmingCurve, tenths: u16);
    /// False if the lamp has failed
    fn status(&self) -> bool;
    fn eol_test_mode(&self) -> bool;
    fn seed_random(&mut self, seed: u32);
    fn generate_random(&mut self) -> u8;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TimerId {
    RepeatWindow,
    DapcSequence,
    ResponseDelay,
    Commissioning,
}

/// Single shot timers. Expiry is reported to the engine as
/// `GearEvent::Timeout` with the generation of the start that armed it.
/// Starting a running timer restarts it under a new generation.
pub trait Scheduler {
    fn start_timer(&mut self, id: TimerId, duration: Duration);
    fn stop_timer(&mut self, id: TimerId);
    fn is_running(&self, id: TimerId) -> bool;
    /// Accept an expiry. False if the timer was restarted or stopped after
    /// this generation was armed.
    fn claim_expiry(&mut self, id: TimerId, generation: u32) -> bool;
}

pub trait BusPower {
    fn powered(&self) -> bool;
}

pub trait MemoryBanks {
    fn read(&self, bank: u8, addr: u8) -> Option<u8>;
    /// Returns false if the location doesn't exist or is locked
    fn write(&mut self, bank: u8, addr: u8, value: u8, bypass_lock: bool) -> bool;
}

/// The engine side of the Manchester codec
pub trait Transceiver {
    fn receive(&mut self, length: usize);
    fn transmit(&mut self, bytes: &[u8]);
    fn stop_receive(&mut self);
}

pub struct GearIo {
    pub params: Box<dyn ParameterStore + Send>,
    pub output: Box<dyn OutputDriver + Send>,
    pub scheduler: Box<dyn Scheduler + Send>,
    pub bus: Box<dyn BusPower + Send>,
    pub memory: Box<dyn MemoryBanks + Send>,
    pub transceiver: Box<dyn Transceiver + Send>,
    pub timers: TimerConfig,
}

impl GearIo {
    /// Write a parameter. A rejected write is dropped.
    pub fn persist(&mut self, id: ParamId, value: u8) {
        if let Err(e) = self.params.put(id, value) {
            log::warn!("{}", e);
        }
    }
}
