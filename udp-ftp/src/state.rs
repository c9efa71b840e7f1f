//! Stop-and-wait finite-state-machine types.
//!
//! Transitions are implemented by [`crate::sender::FragmentSender`] and
//! [`crate::receiver::Reassembly`]; keeping the states here lets both the
//! pure state and the async drivers in [`crate::stop_and_wait`] log them.

/// Sending side of one file transfer.
///
/// ```text
///  PREPARE_FRAGMENT ──▶ SEND_AND_WAIT ──valid ACK──▶ ADVANCE ──▶ PREPARE_FRAGMENT
///                            ▲   │                      │
///                            └───┘ dup / corrupt        └──LAST acked──▶ DONE
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendState {
    /// Next fragment not built yet.
    #[default]
    PrepareFragment,
    /// One fragment in flight, waiting for its acknowledgement.
    SendAndWait,
    /// Acknowledged; offset and numbering being moved on.
    Advance,
    /// The `LAST` fragment was acknowledged.
    Done,
}

/// Receiving side of one file transfer.
///
/// ```text
///  AWAIT_FRAGMENT ──▶ VALIDATE ──▶ APPEND ──▶ AWAIT_FRAGMENT | COMPLETE
///        ▲               │
///        └── REJECT ◀────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiveState {
    #[default]
    AwaitFragment,
    Validate,
    /// Fragment accepted and copied into the buffer.
    Append,
    /// Fragment dropped without being acknowledged.
    Reject,
    /// The `LAST` fragment was appended.
    Complete,
}

impl std::fmt::Display for SendState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::PrepareFragment => "PREPARE_FRAGMENT",
            Self::SendAndWait => "SEND_AND_WAIT",
            Self::Advance => "ADVANCE",
            Self::Done => "DONE",
        })
    }
}

impl std::fmt::Display for ReceiveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::AwaitFragment => "AWAIT_FRAGMENT",
            Self::Validate => "VALIDATE",
            Self::Append => "APPEND",
            Self::Reject => "REJECT",
            Self::Complete => "COMPLETE",
        })
    }
}
