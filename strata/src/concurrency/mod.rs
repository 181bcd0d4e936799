//! Record-granularity two-phase locking.
//!
//! The lock manager hands out shared/exclusive locks on `(table, key)`
//! resources with FIFO waiter queues. The transaction manager layers strict
//! 2PL on top and detects deadlocks through a waits-for graph before any
//! request is allowed to block.

mod graph;
mod lock_manager;
mod transaction;

pub use graph::WaitsForGraph;
pub use lock_manager::{LockManager, LockType, Resource};
pub use transaction::{Transaction, TransactionManager};
