//! Append-only transaction log.
//!
//! The sequencer is the single appender. Outbound replication writers read
//! concurrently, each with its own cursor, and park on [`TransactionLog::subscribe`]
//! until the length moves past their cursor.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;

use crate::transaction::Transaction;

pub struct TransactionLog {
    entries: RwLock<Vec<Arc<Transaction>>>,
    len: watch::Sender<usize>,
}

impl Default for TransactionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionLog {
    pub fn new() -> Self {
        let (len, _) = watch::channel(0);
        Self {
            entries: RwLock::new(Vec::new()),
            len,
        }
    }

    /// Appends a transaction and wakes every subscribed reader.
    pub fn append(&self, transaction: Transaction) {
        let len = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            entries.push(Arc::new(transaction));
            entries.len()
        };
        self.len.send_replace(len);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns every entry at or after `cursor`, in log order.
    ///
    /// The length check and the copy happen under one read lock, so a reader
    /// never sees a torn tail.
    pub fn read_from(&self, cursor: usize) -> Vec<Arc<Transaction>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(cursor..).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Receiver that observes the log length after each append.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.len.subscribe()
    }
}
