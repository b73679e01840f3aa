use crate::FlagId;
use anyhow::{Result, ensure};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub const ALWAYS_TRUE: FlagId = 0x2f0;
pub const CALMED_ANGRY_SEA: FlagId = 0x283;

// Wall flags are handed out from this range.
const WALL_FLAG_START: FlagId = 0x280;
const WALL_FLAG_END: FlagId = 0x300;

/// A location flag reference. `Pending` flags could not be allocated yet and
/// must be resolved by a later defragmentation pass.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FlagRef {
    Fixed(FlagId),
    Pending(usize),
}

impl fmt::Display for FlagRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagRef::Fixed(id) => write!(f, "{id:03x}"),
            FlagRef::Pending(n) => write!(f, "pending#{n}"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FlagAllocator {
    used: BTreeSet<FlagId>,
    pending: usize,
}

impl FlagAllocator {
    pub fn new(used: impl IntoIterator<Item = FlagId>) -> Self {
        FlagAllocator {
            used: used.into_iter().collect(),
            pending: 0,
        }
    }

    pub fn mark_used(&mut self, flag: FlagId) {
        self.used.insert(flag);
    }

    pub fn is_used(&self, flag: FlagId) -> bool {
        self.used.contains(&flag)
    }

    pub fn free(&mut self, flag: FlagId) {
        self.used.remove(&flag);
    }

    /// Allocates a flag from the wall range of the given 0x100-aligned segment.
    pub fn alloc(&mut self, segment: FlagId) -> Result<FlagRef> {
        ensure!(segment == 0x200, "cannot allocate flags in segment {segment:03x}");
        for flag in WALL_FLAG_START..WALL_FLAG_END {
            if self.used.insert(flag) {
                return Ok(FlagRef::Fixed(flag));
            }
        }
        let n = self.pending;
        self.pending += 1;
        warn!("no free flags in {segment:03x}; deferring allocation #{n}");
        Ok(FlagRef::Pending(n))
    }
}
