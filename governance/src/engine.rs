//! Governed execution engine
//!
//! Drives one [`GovernanceTransaction`] per request: estimate, admit or
//! block, execute under a timeout, then commit exactly one audit record
//! through the ledger's atomic debit+log path.

use crate::{
    admin::BudgetAdministrator,
    executor::{ExecutionError, Executor},
    redact::{NoopRedactor, Redactor},
    request::{CallReceipt, GovernedRequest},
    transaction::{GovernanceTransaction, TransactionState},
    Config, Error, Result,
};
use ledger_core::{Admission, AuditDraft, Ledger};
use risk_engine::{CostEstimator, RiskAssessor};
use std::sync::Arc;
use tracing::{info, warn, Instrument};

/// Budget-governed front door for metered external calls
#[derive(Clone)]
pub struct GovernanceEngine {
    ledger: Ledger,
    executor: Arc<dyn Executor>,
    redactor: Arc<dyn Redactor>,
    estimator: CostEstimator,
    assessor: RiskAssessor,
    config: Config,
}

impl std::fmt::Debug for GovernanceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernanceEngine")
            .field("service_name", &self.config.service_name)
            .field("estimator", &self.estimator)
            .field("assessor", &self.assessor)
            .finish_non_exhaustive()
    }
}

impl GovernanceEngine {
    /// Open the configured ledger and build an engine over it
    pub async fn open(config: Config, executor: Arc<dyn Executor>) -> Result<Self> {
        config.validate()?;
        let ledger = Ledger::open(config.ledger.clone()).await?;
        Self::with_ledger(config, ledger, executor)
    }

    /// Build an engine over an already opened ledger
    pub fn with_ledger(config: Config, ledger: Ledger, executor: Arc<dyn Executor>) -> Result<Self> {
        config.validate()?;
        let estimator = config.estimator()?;
        let assessor = config.assessor()?;

        info!(
            service = %config.service_name,
            limit = %assessor.limit(),
            unit_price = %estimator.unit_price(),
            "Governance engine ready"
        );

        Ok(Self {
            ledger,
            executor,
            redactor: Arc::new(NoopRedactor),
            estimator,
            assessor,
            config,
        })
    }

    /// Replace the content redactor
    pub fn with_redactor(mut self, redactor: Arc<dyn Redactor>) -> Self {
        self.redactor = redactor;
        self
    }

    /// Underlying ledger
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Administrative operations over the same ledger
    pub fn administrator(&self) -> BudgetAdministrator {
        BudgetAdministrator::new(self.ledger.clone())
    }

    /// Run one governed call
    pub async fn handle_call(&self, request: GovernedRequest) -> Result<CallReceipt> {
        request.validate(self.config.max_payload_chars)?;

        let tx = GovernanceTransaction::new();
        let span = tracing::info_span!(
            "governed_call",
            execution_id = %tx.execution_id(),
            requester = %request.requester_id,
        );
        self.run_transaction(tx, request).instrument(span).await
    }

    async fn run_transaction(
        &self,
        mut tx: GovernanceTransaction,
        request: GovernedRequest,
    ) -> Result<CallReceipt> {
        let execution_id = tx.execution_id();
        let owner = request.budget_owner().to_string();

        let estimated_cost = self.estimator.estimate(&request.payload)?;
        tx.advance(TransactionState::CostEstimated)?;

        let Admission {
            assessment,
            reservation,
            ..
        } = self.ledger.admit(estimated_cost, &self.assessor).await?;
        let input = self.render(&request.payload);
        let input_digest = ledger_core::crypto::digest_text(&request.payload);
        let provenance = |draft: AuditDraft| {
            draft
                .with_intent(request.intent.clone())
                .with_target(request.target.clone())
                .with_input_digest(input_digest.clone())
        };

        if !assessment.is_admitted() {
            tx.advance(TransactionState::Blocked)?;
            let draft = provenance(AuditDraft::blocked(
                execution_id,
                &request.requester_id,
                &owner,
                input,
                assessment.clone(),
            ));
            let record = self.ledger.debit_and_commit(draft).await?;

            warn!(
                audit_id = record.id,
                %estimated_cost,
                budget_impact_percent = %assessment.budget_impact_percent,
                balance = %record.balance_after,
                "Request blocked by budget limit"
            );
            return Err(Error::BudgetExceeded {
                audit_id: record.id,
                limit: assessment.limit,
                current_usage_percent: assessment.current_usage_percent,
                budget_impact_percent: assessment.budget_impact_percent,
            });
        }

        tx.advance(TransactionState::Admitted)?;
        tx.advance(TransactionState::Executing)?;

        let timeout = self.config.execution_timeout();
        let outcome = match tokio::time::timeout(timeout, self.executor.execute(&request.payload)).await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(ExecutionError::Timeout(timeout)),
        };

        match outcome {
            Ok(result) => {
                tx.advance(TransactionState::Finalized)?;
                let cost = self.estimator.estimate_exchange(&request.payload, &result)?;
                let draft = provenance(AuditDraft::success(
                    execution_id,
                    &request.requester_id,
                    &owner,
                    input,
                    self.render(&result),
                    cost,
                    assessment.clone(),
                ));
                let record = self.ledger.commit_reserved(draft, reservation).await?;
                tx.advance(TransactionState::Logged)?;

                info!(
                    audit_id = record.id,
                    %cost,
                    balance = %record.balance_after,
                    risk_level = %assessment.risk_level,
                    "Governed call completed"
                );
                Ok(CallReceipt {
                    audit_id: record.id,
                    execution_id,
                    cost: record.cost,
                    remaining_budget: record.balance_after,
                    risk_level: assessment.risk_level,
                    result,
                })
            }
            Err(e) => {
                tx.advance(TransactionState::ExecError)?;
                let reason = e.to_string();
                let draft = provenance(AuditDraft::failed(
                    execution_id,
                    &request.requester_id,
                    &owner,
                    input,
                    reason.clone(),
                    assessment,
                ));
                let record = self.ledger.commit_reserved(draft, reservation).await?;
                tx.advance(TransactionState::Logged)?;

                warn!(audit_id = record.id, error = %reason, "Upstream execution failed");
                Err(Error::UpstreamExecution {
                    audit_id: record.id,
                    reason,
                })
            }
        }
    }

    fn render(&self, content: &str) -> String {
        self.config.audit_content.render(self.redactor.as_ref(), content)
    }

    /// Stop the ledger writer
    pub async fn shutdown(&self) -> Result<()> {
        Ok(self.ledger.shutdown().await?)
    }
}
