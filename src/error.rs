use crate::gear::hal::ParamId;
use std::error::Error;
use std::fmt;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone, PartialEq)]
pub enum GearError {
    /// The parameter store rejected a read or write of this parameter
    ParameterStore(ParamId),
    /// A memory bank location that doesn't exist or is locked
    MemoryBank { bank: u8, addr: u8 },
    /// The event queue of the engine or the line task is gone
    ChannelClosed,
    Config(String),
}

impl Error for GearError {}

impl fmt::Display for GearError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GearError::ParameterStore(id) => write!(f, "Parameter store failed for {:?}", id),
            GearError::MemoryBank { bank, addr } => {
                write!(f, "Memory bank {} location {:#04x} not accessible", bank, addr)
            }
            GearError::ChannelClosed => write!(f, "Channel closed"),
            GearError::Config(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl From<serde_json::Error> for GearError {
    fn from(err: serde_json::Error) -> GearError {
        GearError::Config(err.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for GearError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> GearError {
        GearError::ChannelClosed
    }
}
