use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::concurrency::{LockManager, LockType, Resource, WaitsForGraph};
use crate::errors::{Error, Result};

/// One client's transaction: the set of record locks it holds. Created by
/// `begin`, gone at commit (or at rollback, through the recovery manager).
pub struct Transaction {
    client_id: Uuid,
    resources: RwLock<HashMap<Resource, LockType>>,
}

impl Transaction {
    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    pub fn resources(&self) -> HashMap<Resource, LockType> {
        self.resources.read().clone()
    }
}

/// Strict two-phase locking across all clients. Lock requests that would
/// close a waits-for cycle fail with `Deadlock` instead of blocking; the
/// caller is expected to roll the transaction back.
pub struct TransactionManager {
    lm: Arc<LockManager>,
    graph: WaitsForGraph,
    transactions: RwLock<HashMap<Uuid, Arc<Transaction>>>,
}

impl TransactionManager {
    pub fn new(lm: Arc<LockManager>) -> Self {
        TransactionManager {
            lm,
            graph: WaitsForGraph::new(),
            transactions: RwLock::new(HashMap::new()),
        }
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lm
    }

    pub fn begin(&self, client_id: Uuid) -> Result<()> {
        let mut transactions = self.transactions.write();
        if transactions.contains_key(&client_id) {
            return Err(Error::InvalidInput("transaction already began".to_string()));
        }
        transactions.insert(
            client_id,
            Arc::new(Transaction {
                client_id,
                resources: RwLock::new(HashMap::new()),
            }),
        );
        Ok(())
    }

    pub fn has_transaction(&self, client_id: Uuid) -> bool {
        self.transactions.read().contains_key(&client_id)
    }

    fn transaction(&self, client_id: Uuid) -> Result<Arc<Transaction>> {
        self.transactions
            .read()
            .get(&client_id)
            .cloned()
            .ok_or(Error::NoTransaction)
    }

    /// Acquire `mode` on `(table, key)` for the client's transaction.
    ///
    /// A request for something already held in the same or a stronger mode
    /// is a no-op; upgrading shared to exclusive is refused outright. The
    /// waits-for edges stay in the graph for the whole wait, so concurrent
    /// requests see this one when they run their own cycle check.
    pub fn lock(&self, client_id: Uuid, table: &str, key: i64, mode: LockType) -> Result<()> {
        let tx = self.transaction(client_id)?;
        let resource = Resource {
            table: table.to_lowercase(),
            key,
        };
        {
            let held = tx.resources.read();
            if let Some(&current) = held.get(&resource) {
                if current == LockType::Exclusive || current == mode {
                    return Ok(());
                }
                return Err(Error::UpgradeForbidden);
            }
        }

        let conflicting = self.discover_conflicting(client_id, &resource, mode);
        for &other in &conflicting {
            self.graph.add_edge(client_id, other);
        }
        if self.graph.detect_cycle() {
            for &other in &conflicting {
                self.graph.remove_edge(client_id, other);
            }
            return Err(Error::Deadlock);
        }

        // The manager lock is free here; only the lock manager may block.
        self.lm.lock(&resource, mode);
        for &other in &conflicting {
            self.graph.remove_edge(client_id, other);
        }
        tx.resources.write().insert(resource, mode);
        Ok(())
    }

    /// Transactions that currently hold `resource` in a conflicting mode.
    fn discover_conflicting(
        &self,
        client_id: Uuid,
        resource: &Resource,
        mode: LockType,
    ) -> Vec<Uuid> {
        let transactions = self.transactions.read();
        let mut conflicting = Vec::new();
        for (&id, tx) in transactions.iter() {
            if id == client_id {
                continue;
            }
            if let Some(&held) = tx.resources.read().get(resource) {
                if held == LockType::Exclusive || mode == LockType::Exclusive {
                    conflicting.push(id);
                }
            }
        }
        conflicting
    }

    /// Point release. Kept for harnesses; strict 2PL releases only through
    /// commit or rollback.
    pub fn unlock(&self, client_id: Uuid, table: &str, key: i64, mode: LockType) -> Result<()> {
        let tx = self.transaction(client_id)?;
        let resource = Resource {
            table: table.to_lowercase(),
            key,
        };
        {
            let mut held = tx.resources.write();
            match held.get(&resource) {
                Some(&current) if current == mode => {
                    held.remove(&resource);
                }
                Some(_) => return Err(Error::Mismatch),
                None => {
                    return Err(Error::InvalidInput("resource not locked".to_string()));
                }
            }
        }
        self.lm.unlock(&resource, mode)
    }

    /// Release everything the transaction holds and forget it.
    pub fn commit(&self, client_id: Uuid) -> Result<()> {
        let tx = {
            let mut transactions = self.transactions.write();
            transactions.remove(&client_id).ok_or(Error::NoTransaction)?
        };
        let held = tx.resources.read();
        for (resource, &mode) in held.iter() {
            self.lm.unlock(resource, mode)?;
        }
        Ok(())
    }
}
