/// The lifecycle state of a Call.
/// Created -> [Waiting ->] Executing -> {Completed, Failed, Canceled}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallState {
    /// The call has not been executed or enqueued yet.
    #[default]
    Created,

    /// Enqueued and waiting for a dispatcher slot.
    Waiting,

    /// The pipeline is running.
    Executing,

    /// A response was produced.
    Completed,

    /// The pipeline or the callback failed.
    Failed,

    /// Cancellation was observed before or during execution.
    Canceled,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallState::Completed | CallState::Failed | CallState::Canceled
        )
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            CallState::Created => 0,
            CallState::Waiting => 1,
            CallState::Executing => 2,
            CallState::Completed => 3,
            CallState::Failed => 4,
            CallState::Canceled => 5,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => CallState::Waiting,
            2 => CallState::Executing,
            3 => CallState::Completed,
            4 => CallState::Failed,
            5 => CallState::Canceled,
            _ => CallState::Created,
        }
    }
}
