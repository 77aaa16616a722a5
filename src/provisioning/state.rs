// src/provisioning/state.rs

use std::fmt;

use tracing::debug;

/// Phases of one provisioning run, in the only order they may occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    Init,
    KeysGenerated,
    AddressPrecomputed,
    Funding,
    Funded,
    AwaitingSettlement,
    Deploying,
    Done(Outcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl ProvisioningState {
    fn ordinal(&self) -> u8 {
        match self {
            ProvisioningState::Init => 0,
            ProvisioningState::KeysGenerated => 1,
            ProvisioningState::AddressPrecomputed => 2,
            ProvisioningState::Funding => 3,
            ProvisioningState::Funded => 4,
            ProvisioningState::AwaitingSettlement => 5,
            ProvisioningState::Deploying => 6,
            ProvisioningState::Done(_) => 7,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProvisioningState::Done(_))
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisioningState::Done(Outcome::Success) => f.write_str("Done(Success)"),
            ProvisioningState::Done(Outcome::Failure) => f.write_str("Done(Failure)"),
            other => write!(f, "{:?}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: ProvisioningState,
    pub to: ProvisioningState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal transition {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// Forward-only state tracker. States may be skipped (a resumed run starts at
/// `AddressPrecomputed`) but never revisited, and nothing leaves `Done`.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: ProvisioningState,
    history: Vec<ProvisioningState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: ProvisioningState::Init,
            history: vec![ProvisioningState::Init],
        }
    }

    pub fn current(&self) -> ProvisioningState {
        self.current
    }

    pub fn history(&self) -> &[ProvisioningState] {
        &self.history
    }

    pub fn advance(&mut self, next: ProvisioningState) -> Result<(), InvalidTransition> {
        if self.current.is_terminal() || next.ordinal() <= self.current.ordinal() {
            return Err(InvalidTransition {
                from: self.current,
                to: next,
            });
        }
        debug!("{} -> {}", self.current, next);
        self.current = next;
        self.history.push(next);
        Ok(())
    }

    /// Moves to the terminal state. Only fails when the run already finished.
    pub fn finish(&mut self, outcome: Outcome) -> Result<(), InvalidTransition> {
        self.advance(ProvisioningState::Done(outcome))
    }
}
