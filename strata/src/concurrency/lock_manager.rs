use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::errors::{Error, Result};

/// A lockable record: one key of one table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    pub table: String,
    pub key: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockType {
    Shared,
    Exclusive,
}

#[derive(Debug)]
struct LockRequest {
    ticket: u64,
    mode: LockType,
    granted: bool,
}

/// Per-resource state: granted counts plus the FIFO queue of requests.
#[derive(Debug, Default)]
struct LockQueue {
    requests: VecDeque<LockRequest>,
    shared_granted: usize,
    exclusive_granted: bool,
}

impl LockQueue {
    /// Grant requests in FIFO order, stopping at the first incompatible
    /// one: a waiting exclusive blocks the shared requests behind it.
    fn try_grant(&mut self) {
        let mut i = 0;
        while i < self.requests.len() {
            if self.requests[i].granted {
                i += 1;
                continue;
            }
            let compatible = match self.requests[i].mode {
                LockType::Shared => !self.exclusive_granted,
                LockType::Exclusive => self.shared_granted == 0 && !self.exclusive_granted,
            };
            if !compatible {
                break;
            }
            self.requests[i].granted = true;
            match self.requests[i].mode {
                LockType::Shared => self.shared_granted += 1,
                LockType::Exclusive => self.exclusive_granted = true,
            }
            i += 1;
        }
    }

    fn is_granted(&self, ticket: u64) -> bool {
        self.requests
            .iter()
            .any(|r| r.ticket == ticket && r.granted)
    }
}

/// Maps each resource to its lock queue. Callers block here until granted;
/// deadlock avoidance is the transaction manager's job, not ours.
#[derive(Default)]
pub struct LockManager {
    lock_table: Mutex<HashMap<Resource, LockQueue>>,
    cvar: Condvar,
    next_ticket: AtomicU64,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `mode` on `resource`, blocking behind incompatible holders.
    pub fn lock(&self, resource: &Resource, mode: LockType) {
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        let mut table = self.lock_table.lock();
        table
            .entry(resource.clone())
            .or_default()
            .requests
            .push_back(LockRequest {
                ticket,
                mode,
                granted: false,
            });
        loop {
            if let Some(queue) = table.get_mut(resource) {
                queue.try_grant();
                if queue.is_granted(ticket) {
                    return;
                }
            }
            self.cvar.wait(&mut table);
        }
    }

    /// Release one granted lock of `mode` on `resource`. Fails with
    /// `Mismatch` when no such grant exists.
    pub fn unlock(&self, resource: &Resource, mode: LockType) -> Result<()> {
        let mut table = self.lock_table.lock();
        let queue = table.get_mut(resource).ok_or(Error::Mismatch)?;
        let position = queue
            .requests
            .iter()
            .position(|r| r.granted && r.mode == mode)
            .ok_or(Error::Mismatch)?;
        queue.requests.remove(position);
        match mode {
            LockType::Shared => queue.shared_granted -= 1,
            LockType::Exclusive => queue.exclusive_granted = false,
        }
        if queue.requests.is_empty() {
            table.remove(resource);
        } else {
            queue.try_grant();
        }
        self.cvar.notify_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn resource(key: i64) -> Resource {
        Resource {
            table: "t".to_string(),
            key,
        }
    }

    #[test]
    fn test_shared_locks_coexist() {
        let lm = LockManager::new();
        lm.lock(&resource(1), LockType::Shared);
        lm.lock(&resource(1), LockType::Shared);
        lm.unlock(&resource(1), LockType::Shared).unwrap();
        lm.unlock(&resource(1), LockType::Shared).unwrap();
    }

    #[test]
    fn test_unlock_wrong_mode_is_mismatch() {
        let lm = LockManager::new();
        lm.lock(&resource(1), LockType::Shared);
        assert!(matches!(
            lm.unlock(&resource(1), LockType::Exclusive),
            Err(Error::Mismatch)
        ));
        assert!(matches!(
            lm.unlock(&resource(2), LockType::Shared),
            Err(Error::Mismatch)
        ));
    }

    #[test]
    fn test_exclusive_blocks_until_released() {
        let lm = Arc::new(LockManager::new());
        lm.lock(&resource(9), LockType::Exclusive);

        let waiter_granted = Arc::new(AtomicBool::new(false));
        let lm2 = lm.clone();
        let granted2 = waiter_granted.clone();
        let waiter = thread::spawn(move || {
            lm2.lock(&resource(9), LockType::Exclusive);
            granted2.store(true, Ordering::SeqCst);
            lm2.unlock(&resource(9), LockType::Exclusive).unwrap();
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!waiter_granted.load(Ordering::SeqCst));
        lm.unlock(&resource(9), LockType::Exclusive).unwrap();
        waiter.join().unwrap();
        assert!(waiter_granted.load(Ordering::SeqCst));
    }

    #[test]
    fn test_waiting_exclusive_blocks_later_shared() {
        let lm = Arc::new(LockManager::new());
        lm.lock(&resource(4), LockType::Shared);

        let lm_x = lm.clone();
        let exclusive = thread::spawn(move || {
            lm_x.lock(&resource(4), LockType::Exclusive);
            lm_x.unlock(&resource(4), LockType::Exclusive).unwrap();
        });
        thread::sleep(Duration::from_millis(50));

        // A shared request behind the queued exclusive must wait its turn.
        let shared_granted = Arc::new(AtomicBool::new(false));
        let lm_s = lm.clone();
        let granted = shared_granted.clone();
        let shared = thread::spawn(move || {
            lm_s.lock(&resource(4), LockType::Shared);
            granted.store(true, Ordering::SeqCst);
            lm_s.unlock(&resource(4), LockType::Shared).unwrap();
        });
        thread::sleep(Duration::from_millis(50));
        assert!(!shared_granted.load(Ordering::SeqCst));

        lm.unlock(&resource(4), LockType::Shared).unwrap();
        exclusive.join().unwrap();
        shared.join().unwrap();
        assert!(shared_granted.load(Ordering::SeqCst));
    }
}
