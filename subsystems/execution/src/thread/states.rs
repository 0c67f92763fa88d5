//! # Thread States
//!
//! Run-state machine definition.

/// What the run loop should do next with a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum RunState {
    /// Run guest code until the backend stops
    #[default]
    Run = 0,
    /// Execute a single instruction, then wait
    Step = 1,
    /// Block until another party changes the state
    Wait = 2,
    /// Terminal
    Exit = 3,
}

impl RunState {
    /// Convert from u32
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Run),
            1 => Some(Self::Step),
            2 => Some(Self::Wait),
            3 => Some(Self::Exit),
            _ => None,
        }
    }

    /// Convert to u32
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Check if thread is terminated
    pub fn is_terminated(&self) -> bool {
        matches!(self, RunState::Exit)
    }

    /// Whether moving to `next` is allowed
    ///
    /// `Exit` is absorbing; every other state may move anywhere.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        !self.is_terminated() || next.is_terminated()
    }
}
