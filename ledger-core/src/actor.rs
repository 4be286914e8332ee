//! Actor-based concurrency for the ledger
//!
//! Every mutation of the balance goes through one Tokio task, which gives a
//! total order over admissions and commits:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │          Governance transactions (many tasks)        │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                   │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)               │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │ balance cache, next record id, reservations    │  │
//! │  └────────────────────────────────────────────────┘  │
//! │                       │                              │
//! │                       ▼                              │
//! │           LedgerStorage::commit()                    │
//! │     (balance row + audit record, one batch)          │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The external call runs between `Admit` and `Commit`, outside the actor.
//! An admitted request holds a [`Reservation`] for its estimate so that
//! concurrent admissions see each other's pending spend.

use crate::{
    storage::LedgerStorage,
    types::{AuditDraft, AuditRecord, Balance, RequestType},
    Config, Error, Metrics, Result,
};
use chrono::{FixedOffset, Utc};
use risk_engine::{RiskAssessment, RiskAssessor};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;

/// Message sent to the ledger actor
pub enum LedgerMessage {
    /// Assess against the available balance and reserve the estimate if admitted
    Admit {
        estimated_cost: Decimal,
        assessor: RiskAssessor,
        response: oneshot::Sender<Result<AdmitReply>>,
    },

    /// Apply a draft atomically, consuming its reservation
    Commit {
        draft: AuditDraft,
        reservation: Option<u64>,
        response: oneshot::Sender<Result<AuditRecord>>,
    },

    /// Drop a reservation without committing
    Release { reservation: u64 },

    /// Report writer state
    Status {
        response: oneshot::Sender<WriterStatus>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Raw admission result from the actor
#[derive(Debug)]
pub struct AdmitReply {
    assessment: RiskAssessment,
    available: Decimal,
    reservation: Option<u64>,
}

/// Snapshot of the writer's cached state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterStatus {
    /// Committed balance
    pub balance: Decimal,
    /// Sum of outstanding reservations
    pub reserved: Decimal,
    /// Number of outstanding reservations
    pub reservations: usize,
    /// Id the next commit will receive
    pub next_record_id: u64,
}

/// Actor that owns every ledger mutation
pub struct LedgerActor {
    /// Storage backend
    storage: Arc<dyn LedgerStorage>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Last committed balance
    balance: Balance,

    /// Id for the next audit record
    next_id: u64,

    /// Outstanding reservations by id
    reservations: HashMap<u64, Decimal>,

    /// Id for the next reservation
    next_reservation: u64,

    /// Audit time zone
    offset: FixedOffset,

    metrics: Metrics,
}

impl LedgerActor {
    /// Load state from storage, initializing the balance on first start
    pub fn bootstrap(
        storage: Arc<dyn LedgerStorage>,
        mailbox: mpsc::Receiver<LedgerMessage>,
        config: &Config,
        metrics: Metrics,
    ) -> Result<Self> {
        let offset = config.offset()?;

        let balance = match storage.load_balance()? {
            Some(balance) => balance,
            None => {
                let balance = Balance {
                    remaining_budget: config.initial_budget,
                    last_updated_at: Utc::now().with_timezone(&offset),
                };
                storage.initialize(&balance)?;
                balance
            }
        };
        let next_id = storage.last_record_id()?.map_or(1, |id| id + 1);

        metrics.set_remaining_budget(balance.remaining_budget.to_f64().unwrap_or(0.0));
        tracing::info!(
            balance = %balance.remaining_budget,
            next_record_id = next_id,
            "Ledger writer ready"
        );

        Ok(Self {
            storage,
            mailbox,
            balance,
            next_id,
            reservations: HashMap::new(),
            next_reservation: 1,
            offset,
            metrics,
        })
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Admit {
                    estimated_cost,
                    assessor,
                    response,
                } => {
                    let result = self.admit(estimated_cost, &assessor);
                    // Caller gone before the reply: its hold must not linger
                    if let Err(Ok(reply)) = response.send(result) {
                        if let Some(id) = reply.reservation {
                            self.release(id);
                        }
                    }
                }

                LedgerMessage::Commit {
                    draft,
                    reservation,
                    response,
                } => {
                    let result = self.commit(draft, reservation);
                    let _ = response.send(result);
                }

                LedgerMessage::Release { reservation } => self.release(reservation),

                LedgerMessage::Status { response } => {
                    let _ = response.send(self.status());
                }

                LedgerMessage::Shutdown => break,
            }
        }

        if !self.reservations.is_empty() {
            tracing::warn!(
                outstanding = self.reservations.len(),
                "Ledger writer stopped with outstanding reservations"
            );
        }
        tracing::info!("Ledger writer stopped");
    }

    fn reserved(&self) -> Decimal {
        self.reservations.values().copied().sum()
    }

    fn status(&self) -> WriterStatus {
        WriterStatus {
            balance: self.balance.remaining_budget,
            reserved: self.reserved(),
            reservations: self.reservations.len(),
            next_record_id: self.next_id,
        }
    }

    fn admit(&mut self, estimated_cost: Decimal, assessor: &RiskAssessor) -> Result<AdmitReply> {
        let available = self
            .balance
            .remaining_budget
            .checked_sub(self.reserved())
            .ok_or_else(|| Error::InvariantViolation("reserved amount overflow".to_string()))?;

        let assessment = assessor.assess(available, estimated_cost)?;

        let reservation = if assessment.is_admitted() {
            let id = self.next_reservation;
            self.next_reservation += 1;
            self.reservations.insert(id, estimated_cost);
            self.metrics.set_reservations(self.reservations.len());
            Some(id)
        } else {
            None
        };

        tracing::debug!(
            %estimated_cost,
            %available,
            risk_level = %assessment.risk_level,
            reservation = ?reservation,
            "Admission evaluated"
        );

        Ok(AdmitReply {
            assessment,
            available,
            reservation,
        })
    }

    fn release(&mut self, id: u64) {
        if self.reservations.remove(&id).is_some() {
            self.metrics.set_reservations(self.reservations.len());
            tracing::trace!(reservation = id, "Reservation released");
        }
    }

    fn commit(&mut self, draft: AuditDraft, reservation: Option<u64>) -> Result<AuditRecord> {
        if let Some(id) = reservation {
            self.release(id);
        }
        draft.validate()?;

        let started = Instant::now();
        let previous = self.balance.remaining_budget;
        let (cost, balance_after) = draft.charge.resolve(previous)?;
        // Withdrawals stop at zero; credits into an overdraft are always allowed
        if draft.request_type == RequestType::AdminAdjustment
            && cost > Decimal::ZERO
            && balance_after < Decimal::ZERO
        {
            return Err(Error::Overdraw {
                balance: previous,
                delta: -cost,
            });
        }
        let timestamp = Utc::now().with_timezone(&self.offset);
        let id = self.next_id;

        let record = draft.seal(id, timestamp, previous, cost, balance_after)?;
        let balance = Balance {
            remaining_budget: balance_after,
            last_updated_at: timestamp,
        };

        if let Err(e) = self.storage.commit(&balance, &record) {
            self.metrics.record_persistence_failure();
            tracing::error!(
                audit_id = id,
                execution_id = %record.execution_id,
                error = %e,
                "Atomic commit failed"
            );
            self.resync();
            return Err(Error::Persistence(e.to_string()));
        }

        self.next_id += 1;
        self.balance = balance;

        self.metrics
            .record_commit(record.status.as_str(), started.elapsed().as_secs_f64());
        self.metrics
            .set_remaining_budget(balance_after.to_f64().unwrap_or(0.0));

        tracing::info!(
            audit_id = record.id,
            execution_id = %record.execution_id,
            request_type = %record.request_type,
            status = %record.status,
            cost = %record.cost,
            balance = %record.balance_after,
            "Audit record committed"
        );

        Ok(record)
    }

    /// Reload the cache after a failed commit in case the backend applied it anyway
    fn resync(&mut self) {
        let loaded = self
            .storage
            .load_balance()
            .and_then(|balance| Ok((balance, self.storage.last_record_id()?)));

        match loaded {
            Ok((Some(balance), last_id)) => {
                let next_id = last_id.map_or(1, |id| id + 1);
                if next_id != self.next_id {
                    tracing::warn!(
                        cached = self.next_id,
                        stored = next_id,
                        "Storage diverged from writer cache, resynchronized"
                    );
                }
                self.balance = balance;
                self.next_id = next_id;
            }
            Ok((None, _)) => {
                tracing::error!("Balance row missing after failed commit");
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not resynchronize ledger writer");
            }
        }
    }
}

/// Admission outcome
#[derive(Debug)]
pub struct Admission {
    /// Risk assessment against the available balance
    pub assessment: RiskAssessment,

    /// Committed balance minus outstanding reservations at admission time
    pub available: Decimal,

    /// Hold on the estimate, present only when admitted
    pub reservation: Option<Reservation>,
}

impl Admission {
    /// Whether the external call may run
    pub fn is_admitted(&self) -> bool {
        self.assessment.is_admitted()
    }
}

/// Hold on part of the available balance between admission and commit
///
/// Consumed by [`LedgerHandle::commit`]. Dropping it releases the hold.
#[derive(Debug)]
pub struct Reservation {
    id: u64,
    amount: Decimal,
    sender: mpsc::Sender<LedgerMessage>,
    armed: bool,
}

impl Reservation {
    /// Reserved amount
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    fn disarm(mut self) -> u64 {
        self.armed = false;
        self.id
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        match self.sender.try_send(LedgerMessage::Release { reservation: self.id }) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(msg)) => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let sender = self.sender.clone();
                    runtime.spawn(async move {
                        let _ = sender.send(msg).await;
                    });
                }
                Err(_) => {
                    tracing::warn!(reservation = self.id, "Reservation leaked: no runtime to release it");
                }
            },
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Assess a request and reserve its estimate if admitted
    pub async fn admit(&self, estimated_cost: Decimal, assessor: RiskAssessor) -> Result<Admission> {
        let reply = self
            .call(|response| LedgerMessage::Admit {
                estimated_cost,
                assessor,
                response,
            })
            .await??;

        let reservation = reply.reservation.map(|id| Reservation {
            id,
            amount: estimated_cost,
            sender: self.sender.clone(),
            armed: true,
        });

        Ok(Admission {
            assessment: reply.assessment,
            available: reply.available,
            reservation,
        })
    }

    /// Commit a draft, consuming the reservation if any
    pub async fn commit(
        &self,
        draft: AuditDraft,
        reservation: Option<Reservation>,
    ) -> Result<AuditRecord> {
        let reservation = reservation.map(Reservation::disarm);
        self.call(|response| LedgerMessage::Commit {
            draft,
            reservation,
            response,
        })
        .await?
    }

    /// Writer state
    pub async fn status(&self) -> Result<WriterStatus> {
        self.call(|response| LedgerMessage::Status { response }).await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    storage: Arc<dyn LedgerStorage>,
    config: &Config,
    metrics: Metrics,
) -> Result<LedgerHandle> {
    let (tx, rx) = mpsc::channel(config.mailbox_capacity); // Bounded channel for backpressure
    let actor = LedgerActor::bootstrap(storage, rx, config, metrics)?;

    tokio::spawn(async move {
        actor.run().await;
    });

    Ok(LedgerHandle::new(tx))
}
