/// Completion notifications posted by the codec to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecEvent {
    XmitDone,
    /// First edge of a frame has been seen
    RecvEdge,
    /// A complete frame, the number of bytes requested by receive()
    RecvDone(Vec<u8>),
    RecvError,
}

impl CodecEvent {
    pub fn code(&self) -> u8 {
        match self {
            CodecEvent::XmitDone => 0xcc,
            CodecEvent::RecvEdge => 0xcd,
            CodecEvent::RecvDone(_) => 0xce,
            CodecEvent::RecvError => 0xcf,
        }
    }
}
