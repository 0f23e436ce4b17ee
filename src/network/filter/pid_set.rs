use std::collections::HashSet;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A thread-safe set of process IDs.
///
/// Lookups take the read lock, so many capture threads can query the set
/// while another thread updates it.
#[derive(Debug, Default)]
pub struct PidSet {
    pids: RwLock<HashSet<u32>>,
}

impl PidSet {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a HashSet half-updated.
    fn read(&self) -> RwLockReadGuard<'_, HashSet<u32>> {
        self.pids.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashSet<u32>> {
        self.pids.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `pid`, returning true if it was not already present.
    pub fn add(&self, pid: u32) -> bool {
        self.write().insert(pid)
    }

    /// Removes `pid`, returning true if it was present.
    pub fn remove(&self, pid: u32) -> bool {
        self.write().remove(&pid)
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.read().contains(&pid)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn extend<I: IntoIterator<Item = u32>>(&self, pids: I) {
        self.write().extend(pids);
    }

    /// A sorted copy of the current members.
    pub fn snapshot(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.read().iter().copied().collect();
        pids.sort_unstable();
        pids
    }
}

impl FromIterator<u32> for PidSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        PidSet {
            pids: RwLock::new(iter.into_iter().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_add_contains_remove() {
        let set = PidSet::new();
        assert!(set.is_empty());
        assert!(set.add(1234));
        assert!(!set.add(1234));
        assert!(set.contains(1234));
        assert!(!set.contains(4321));
        assert!(set.remove(1234));
        assert!(!set.remove(1234));
        assert!(!set.contains(1234));
    }

    #[test]
    fn test_extend_and_snapshot() {
        let set: PidSet = [30, 10].into_iter().collect();
        set.extend([20, 10]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.snapshot(), vec![10, 20, 30]);
        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn test_concurrent_disjoint_adds() {
        let set = Arc::new(PidSet::new());
        let workers: Vec<_> = (0..8u32)
            .map(|worker| {
                let set = Arc::clone(&set);
                thread::spawn(move || {
                    for i in 0..500 {
                        set.add(worker * 1000 + i);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(set.len(), 4000);
        for worker in 0..8u32 {
            assert!(set.contains(worker * 1000));
            assert!(set.contains(worker * 1000 + 499));
        }
    }
}
