//! Transaction sequencing.
//!
//! Every transaction, local or replicated, funnels through one FIFO queue
//! into a single actor task. The actor owns the [`Ledger`] (document,
//! watermarks, local counter and log appends) and processes one transaction
//! at a time, so each node has a single total local order. Different nodes
//! may see the same transactions in different orders; only per-source
//! monotonicity is guaranteed.
//!
//! Producers await a one-shot reply for their own transaction before
//! submitting the next, which bounds every producer to one outstanding
//! transaction.
//!
//! # Watermark policy
//!
//! The watermark for a source advances as soon as a new sequence number is
//! seen, *before* the payload is validated. A payload that fails to decode
//! or apply is therefore skipped permanently: resubmitting the same
//! `(source, id)` with a corrected payload is a silent duplicate.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::document;
use crate::error::{PatchError, SequencerError};
use crate::log::TransactionLog;
use crate::shutdown::Shutdown;
use crate::transaction::Transaction;

/// Highest processed sequence number per source.
pub type VectorClock = BTreeMap<String, u64>;

/// Result of processing one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The patch was applied and the transaction appended to the log.
    Applied,
    /// The sequence number was at or below the source's watermark. Nothing changed.
    Duplicate,
    /// The payload failed to decode or apply. Document and log are unchanged,
    /// the watermark has advanced.
    Rejected(PatchError),
}

impl Outcome {
    /// Whether the caller should see this as a success.
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Rejected(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::Duplicate => "duplicate",
            Outcome::Rejected(_) => "rejected",
        }
    }
}

/// Reply to a local write: the sequence number it was assigned and what happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub source: String,
    pub id: u64,
    pub outcome: Outcome,
}

/// State owned by the sequencer.
pub struct Ledger {
    source: String,
    document: Arc<Value>,
    watermarks: VectorClock,
    next_local: u64,
    log: Arc<TransactionLog>,
}

impl Ledger {
    pub fn new(source: impl Into<String>, log: Arc<TransactionLog>) -> Self {
        Self {
            source: source.into(),
            document: Arc::new(document::empty()),
            watermarks: VectorClock::new(),
            next_local: 1,
            log,
        }
    }

    /// Tags a client write with the next local sequence number and processes it.
    ///
    /// The counter advances for every call, whether or not the write is
    /// accepted. A body that is not UTF-8 is rejected as undecodable after
    /// its id has been assigned.
    pub fn process_local(&mut self, payload: Vec<u8>) -> Receipt {
        let id = self.next_local;
        self.next_local += 1;

        let outcome = match String::from_utf8(payload) {
            Ok(payload) => self.process(Transaction::new(self.source.clone(), id, payload)),
            Err(err) => {
                let source = self.source.clone();
                if self.admit(&source, id) {
                    Outcome::Rejected(PatchError::Decode(err.to_string()))
                } else {
                    Outcome::Duplicate
                }
            }
        };

        Receipt {
            source: self.source.clone(),
            id,
            outcome,
        }
    }

    pub fn process(&mut self, transaction: Transaction) -> Outcome {
        if !self.admit(&transaction.source, transaction.id) {
            return Outcome::Duplicate;
        }

        match document::apply_payload(&self.document, &transaction.payload) {
            Ok(next) => {
                self.document = Arc::new(next);
                self.log.append(transaction);
                Outcome::Applied
            }
            Err(err) => Outcome::Rejected(err),
        }
    }

    /// Advances the watermark for `source` if `id` is new.
    fn admit(&mut self, source: &str, id: u64) -> bool {
        if id <= self.watermark(source) {
            return false;
        }
        self.watermarks.insert(source.to_string(), id);
        true
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn document(&self) -> &Arc<Value> {
        &self.document
    }

    pub fn watermarks(&self) -> &VectorClock {
        &self.watermarks
    }

    pub fn watermark(&self, source: &str) -> u64 {
        self.watermarks.get(source).copied().unwrap_or(0)
    }

    pub fn log(&self) -> &Arc<TransactionLog> {
        &self.log
    }
}

enum Request {
    Local {
        payload: Vec<u8>,
        respond_to: oneshot::Sender<Receipt>,
    },
    Remote {
        transaction: Transaction,
        respond_to: oneshot::Sender<Outcome>,
    },
}

/// The actor side: drains the arrival queue until shutdown.
pub struct Sequencer {
    ledger: Ledger,
    requests: mpsc::Receiver<Request>,
    document: watch::Sender<Arc<Value>>,
    vclock: watch::Sender<Arc<VectorClock>>,
}

/// Cloneable entry point to a running [`Sequencer`].
#[derive(Clone)]
pub struct SequencerHandle {
    requests: mpsc::Sender<Request>,
    document: watch::Receiver<Arc<Value>>,
    vclock: watch::Receiver<Arc<VectorClock>>,
    log: Arc<TransactionLog>,
}

impl Sequencer {
    /// Creates the actor and its handle. Submissions queue up until
    /// [`Sequencer::run`] is polled.
    pub fn new(source: impl Into<String>, capacity: usize) -> (Self, SequencerHandle) {
        let log = Arc::new(TransactionLog::new());
        let ledger = Ledger::new(source, Arc::clone(&log));

        let (requests_tx, requests) = mpsc::channel(capacity.max(1));
        let (document, document_rx) = watch::channel(Arc::clone(ledger.document()));
        let (vclock, vclock_rx) = watch::channel(Arc::new(VectorClock::new()));

        let handle = SequencerHandle {
            requests: requests_tx,
            document: document_rx,
            vclock: vclock_rx,
            log,
        };

        (
            Self {
                ledger,
                requests,
                document,
                vclock,
            },
            handle,
        )
    }

    pub async fn run(mut self, mut shutdown: Shutdown) {
        info!(source = %self.ledger.source(), "sequencer started");

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                request = self.requests.recv() => match request {
                    Some(request) => self.handle(request),
                    None => break,
                },
            }
        }

        info!(source = %self.ledger.source(), "sequencer stopped");
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::Local {
                payload,
                respond_to,
            } => {
                let receipt = self.ledger.process_local(payload);
                self.publish(&receipt.source, receipt.id, &receipt.outcome);
                let _ = respond_to.send(receipt);
            }
            Request::Remote {
                transaction,
                respond_to,
            } => {
                let (source, id) = (transaction.source.clone(), transaction.id);
                let outcome = self.ledger.process(transaction);
                self.publish(&source, id, &outcome);
                let _ = respond_to.send(outcome);
            }
        }
    }

    fn publish(&self, source: &str, id: u64, outcome: &Outcome) {
        match outcome {
            Outcome::Applied => {
                debug!(%source, id, "applied transaction");
                self.document.send_replace(Arc::clone(self.ledger.document()));
                self.publish_vclock();
            }
            Outcome::Duplicate => debug!(%source, id, "skipped duplicate transaction"),
            Outcome::Rejected(err) => {
                warn!(%source, id, error = %err, "rejected transaction");
                self.publish_vclock();
            }
        }
    }

    fn publish_vclock(&self) {
        self.vclock
            .send_replace(Arc::new(self.ledger.watermarks().clone()));
    }
}

impl SequencerHandle {
    /// Submits a client write. The sequencer assigns the next local sequence
    /// number on dequeue, so concurrent writers never race each other into
    /// an out-of-order id.
    pub async fn submit_local(
        &self,
        payload: impl Into<Vec<u8>>,
    ) -> Result<Receipt, SequencerError> {
        let (respond_to, reply) = oneshot::channel();
        self.requests
            .send(Request::Local {
                payload: payload.into(),
                respond_to,
            })
            .await
            .map_err(|_| SequencerError::Closed)?;
        reply.await.map_err(|_| SequencerError::Closed)
    }

    /// Submits a transaction received from a peer and waits for its outcome.
    pub async fn submit(&self, transaction: Transaction) -> Result<Outcome, SequencerError> {
        let (respond_to, reply) = oneshot::channel();
        self.requests
            .send(Request::Remote {
                transaction,
                respond_to,
            })
            .await
            .map_err(|_| SequencerError::Closed)?;
        reply.await.map_err(|_| SequencerError::Closed)
    }

    /// Latest published document snapshot.
    pub fn document(&self) -> Arc<Value> {
        self.document.borrow().clone()
    }

    /// Receiver that observes every document replacement.
    pub fn watch_document(&self) -> watch::Receiver<Arc<Value>> {
        self.document.clone()
    }

    /// Latest published watermark table.
    pub fn vclock(&self) -> Arc<VectorClock> {
        self.vclock.borrow().clone()
    }

    pub fn watch_vclock(&self) -> watch::Receiver<Arc<VectorClock>> {
        self.vclock.clone()
    }

    pub fn log(&self) -> &Arc<TransactionLog> {
        &self.log
    }
}
