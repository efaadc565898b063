//! Build time constants of a gear, overridable from a JSON file.

use crate::error::{DynResult, GearError};
use crate::gear::state::Identity;
use serde_derive::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Frequency of the edge capture timer in Hz
    pub clock_freq: u32,
    pub baud: u32,
    /// Allowed deviation from the nominal half bit time in percent
    pub tolerance_pct: u32,
    pub start_bits: u8,
    pub stop_bits: u8,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            clock_freq: 1_000_000,
            baud: 1200,
            tolerance_pct: 20,
            start_bits: 1,
            stop_bits: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub repeat_window_ms: u64,
    pub dapc_sequence_ms: u64,
    pub response_delay_us: u64,
    pub commissioning_s: u64,
    pub fade_tick_us: u32,
    pub bus_sample_ms: u64,
    pub bus_fail_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        TimerConfig {
            repeat_window_ms: 100,
            dapc_sequence_ms: 200,
            response_delay_us: 2400,
            commissioning_s: 15 * 60,
            fade_tick_us: 1000,
            bus_sample_ms: 10,
            bus_fail_ms: 500,
        }
    }
}

impl TimerConfig {
    pub fn repeat_window(&self) -> Duration {
        Duration::from_millis(self.repeat_window_ms)
    }

    pub fn dapc_sequence(&self) -> Duration {
        Duration::from_millis(self.dapc_sequence_ms)
    }

    pub fn response_delay(&self) -> Duration {
        Duration::from_micros(self.response_delay_us)
    }

    pub fn commissioning(&self) -> Duration {
        Duration::from_secs(self.commissioning_s)
    }

    pub fn fade_tick(&self) -> Duration {
        Duration::from_micros(self.fade_tick_us as u64)
    }

    pub fn bus_sample(&self) -> Duration {
        Duration::from_millis(self.bus_sample_ms)
    }

    /// Number of consecutive low samples that make a bus failure
    pub fn bus_fail_samples(&self) -> u16 {
        (self.bus_fail_ms / self.bus_sample_ms.max(1)).clamp(1, u16::MAX as u64) as u16
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GearConfig {
    pub codec: CodecConfig,
    pub timers: TimerConfig,
    pub identity: Identity,
    /// Seeds the random address generator
    pub serial_number: u32,
}

impl Default for GearConfig {
    fn default() -> Self {
        GearConfig {
            codec: CodecConfig::default(),
            timers: TimerConfig::default(),
            identity: Identity::default(),
            serial_number: 0x0001_e240,
        }
    }
}

impl GearConfig {
    pub fn from_json(json: &str) -> Result<GearConfig, GearError> {
        let config: GearConfig = serde_json::from_str(json)?;
        if config.codec.baud == 0 || config.codec.clock_freq == 0 {
            return Err(GearError::Config("baud and clock_freq must be non-zero".into()));
        }
        if config.identity.physical_min_level == 0 || config.identity.physical_min_level > 0xfe {
            return Err(GearError::Config("physical_min_level must be 1..=254".into()));
        }
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> DynResult<GearConfig> {
        let json = tokio::fs::read_to_string(path).await?;
        Ok(GearConfig::from_json(&json)?)
    }
}
