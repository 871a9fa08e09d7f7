//! Session lifecycle state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐  InitFailed   ┌─────────────────┐
//! │  Bootstrapping  │ ────────────► │    Degraded     │ (terminal)
//! └────────┬────────┘               └─────────────────┘
//!          │ InitSucceeded
//!          ▼
//! ┌─────────────────┐   SignedIn    ┌─────────────────┐
//! │ Unauthenticated │ ────────────► │  Synchronizing  │ ◄─┐ SignedIn
//! └─────────────────┘               └────────┬────────┘ ──┘
//!          ▲                                 │ SyncCompleted
//!          │ SignedOut                       ▼
//!          │                        ┌─────────────────┐
//!          └─────────────────────── │  Authenticated  │
//!                                   └─────────────────┘
//! ```
//!
//! `SignedOut` from `Synchronizing` and `SignedIn` from `Authenticated`
//! are also accepted.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Bootstrapping)

    Bootstrapping => {
        InitSucceeded => Unauthenticated,
        InitFailed => Degraded
    },
    Unauthenticated => {
        SignedIn => Synchronizing,
        SignedOut => Unauthenticated
    },
    Synchronizing => {
        // A newer sign-in restarts the entry sequence
        SignedIn => Synchronizing,
        SyncCompleted => Authenticated,
        SignedOut => Unauthenticated
    },
    Authenticated => {
        SignedIn => Synchronizing,
        SignedOut => Unauthenticated
    },
    Degraded => {
        InitFailed => Degraded
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Lifecycle phase exposed to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// `init` has not finished yet.
    Bootstrapping,
    /// Identity initialized, nobody signed in.
    Unauthenticated,
    /// Signed in; profile, snapshot and channel are being set up.
    Synchronizing,
    /// Signed in and the entry sequence has finished.
    Authenticated,
    /// Identity is disabled or failed to initialize. Terminal.
    Degraded,
}

impl SessionPhase {
    /// True exactly while bootstrapping or synchronizing.
    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            SessionPhase::Bootstrapping | SessionPhase::Synchronizing
        )
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(
            self,
            SessionPhase::Synchronizing | SessionPhase::Authenticated
        )
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPhase::Bootstrapping => "bootstrapping",
            SessionPhase::Unauthenticated => "unauthenticated",
            SessionPhase::Synchronizing => "synchronizing",
            SessionPhase::Authenticated => "authenticated",
            SessionPhase::Degraded => "degraded",
        };
        f.write_str(name)
    }
}

impl From<&SessionMachineState> for SessionPhase {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Bootstrapping => SessionPhase::Bootstrapping,
            SessionMachineState::Unauthenticated => SessionPhase::Unauthenticated,
            SessionMachineState::Synchronizing => SessionPhase::Synchronizing,
            SessionMachineState::Authenticated => SessionPhase::Authenticated,
            SessionMachineState::Degraded => SessionPhase::Degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_bootstrapping() {
        let machine = SessionMachine::new();
        assert_eq!(*machine.state(), SessionMachineState::Bootstrapping);
        assert!(SessionPhase::from(machine.state()).is_loading());
    }

    #[test]
    fn test_sign_in_flow() {
        let mut machine = SessionMachine::new();

        machine.consume(&SessionMachineInput::InitSucceeded).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Unauthenticated);

        machine.consume(&SessionMachineInput::SignedIn).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Synchronizing);

        machine.consume(&SessionMachineInput::SyncCompleted).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);

        machine.consume(&SessionMachineInput::SignedOut).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Unauthenticated);
    }

    #[test]
    fn test_sign_out_interrupts_synchronizing() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::InitSucceeded).unwrap();
        machine.consume(&SessionMachineInput::SignedIn).unwrap();

        machine.consume(&SessionMachineInput::SignedOut).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Unauthenticated);
    }

    #[test]
    fn test_user_switch_restarts_synchronizing() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::InitSucceeded).unwrap();
        machine.consume(&SessionMachineInput::SignedIn).unwrap();
        machine.consume(&SessionMachineInput::SyncCompleted).unwrap();

        machine.consume(&SessionMachineInput::SignedIn).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Synchronizing);
    }

    #[test]
    fn test_degraded_is_terminal() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::InitFailed).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Degraded);

        assert!(machine.consume(&SessionMachineInput::SignedIn).is_err());
        assert!(machine.consume(&SessionMachineInput::SignedOut).is_err());
        assert_eq!(*machine.state(), SessionMachineState::Degraded);
    }

    #[test]
    fn test_events_rejected_while_bootstrapping() {
        let mut machine = SessionMachine::new();
        assert!(machine.consume(&SessionMachineInput::SignedIn).is_err());
        assert!(machine.consume(&SessionMachineInput::SyncCompleted).is_err());
    }

    #[test]
    fn test_sync_completed_requires_synchronizing() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::InitSucceeded).unwrap();
        assert!(machine.consume(&SessionMachineInput::SyncCompleted).is_err());
    }

    #[test]
    fn test_phase_loading_flags() {
        assert!(SessionPhase::Bootstrapping.is_loading());
        assert!(SessionPhase::Synchronizing.is_loading());
        assert!(!SessionPhase::Unauthenticated.is_loading());
        assert!(!SessionPhase::Authenticated.is_loading());
        assert!(!SessionPhase::Degraded.is_loading());
    }
}
