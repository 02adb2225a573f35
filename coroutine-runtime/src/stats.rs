//! Per-ordinator counters
//!
//! An ordinator is confined to one thread, so plain `Cell`s are enough;
//! `Stats` is the value snapshot handed out to callers.

use std::cell::Cell;

/// Snapshot of an ordinator's activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Routines created
    pub created: u64,
    /// Routines destroyed
    pub destroyed: u64,
    /// Successful transfers into a routine
    pub resumes: u64,
    /// Suspensions back to the scheduler
    pub yields: u64,
    /// Routines whose callable returned or panicked
    pub finished: u64,
    /// Routines whose callable panicked
    pub panicked: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub created: Cell<u64>,
    pub destroyed: Cell<u64>,
    pub resumes: Cell<u64>,
    pub yields: Cell<u64>,
    pub finished: Cell<u64>,
    pub panicked: Cell<u64>,
}

impl Counters {
    #[inline]
    pub fn bump(counter: &Cell<u64>) {
        counter.set(counter.get() + 1);
    }

    pub fn snapshot(&self) -> Stats {
        Stats {
            created: self.created.get(),
            destroyed: self.destroyed.get(),
            resumes: self.resumes.get(),
            yields: self.yields.get(),
            finished: self.finished.get(),
            panicked: self.panicked.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_bumps() {
        let counters = Counters::default();
        Counters::bump(&counters.created);
        Counters::bump(&counters.created);
        Counters::bump(&counters.yields);

        let stats = counters.snapshot();
        assert_eq!(stats.created, 2);
        assert_eq!(stats.yields, 1);
        assert_eq!(stats.resumes, 0);
    }
}
