//! Governance transaction state machine
//!
//! ```text
//! RECEIVED → COST_ESTIMATED ─┬→ BLOCKED                         (terminal)
//!                            └→ ADMITTED → EXECUTING ─┬→ FINALIZED ─┐
//!                                                     └→ EXEC_ERROR ┴→ LOGGED (terminal)
//! ```

use crate::{Error, Result};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of one governed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    /// Request accepted for processing
    Received,
    /// Pre-execution cost known
    CostEstimated,
    /// Refused at admission; zero-cost record written
    Blocked,
    /// Allowed to execute
    Admitted,
    /// External call in flight
    Executing,
    /// External call succeeded, actual cost computed
    Finalized,
    /// External call failed or timed out
    ExecError,
    /// Outcome committed to the audit trail
    Logged,
}

impl TransactionState {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Received => "RECEIVED",
            TransactionState::CostEstimated => "COST_ESTIMATED",
            TransactionState::Blocked => "BLOCKED",
            TransactionState::Admitted => "ADMITTED",
            TransactionState::Executing => "EXECUTING",
            TransactionState::Finalized => "FINALIZED",
            TransactionState::ExecError => "EXEC_ERROR",
            TransactionState::Logged => "LOGGED",
        }
    }

    /// No transition leaves this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Blocked | TransactionState::Logged)
    }

    /// Whether `next` directly follows this state
    pub fn can_transition_to(&self, next: TransactionState) -> bool {
        use TransactionState::*;
        matches!(
            (self, next),
            (Received, CostEstimated)
                | (CostEstimated, Blocked)
                | (CostEstimated, Admitted)
                | (Admitted, Executing)
                | (Executing, Finalized)
                | (Executing, ExecError)
                | (Finalized, Logged)
                | (ExecError, Logged)
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One governed request moving through its states
#[derive(Debug, Clone)]
pub struct GovernanceTransaction {
    execution_id: Uuid,
    state: TransactionState,
    history: Vec<TransactionState>,
}

impl GovernanceTransaction {
    /// Start in `RECEIVED` with a fresh time-ordered id
    pub fn new() -> Self {
        let execution_id = Uuid::now_v7();
        tracing::debug!(%execution_id, state = %TransactionState::Received, "Transaction received");
        Self {
            execution_id,
            state: TransactionState::Received,
            history: vec![TransactionState::Received],
        }
    }

    /// Transaction id, recorded on the audit record
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// Current state
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Every state visited, in order
    pub fn history(&self) -> &[TransactionState] {
        &self.history
    }

    /// Move to `next`, rejecting illegal steps
    pub fn advance(&mut self, next: TransactionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        tracing::debug!(
            execution_id = %self.execution_id,
            from = %self.state,
            to = %next,
            "Transaction state changed"
        );
        self.state = next;
        self.history.push(next);
        Ok(())
    }
}

impl Default for GovernanceTransaction {
    fn default() -> Self {
        Self::new()
    }
}
