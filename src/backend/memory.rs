use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(thiserror::Error, Debug)]
pub enum MemoryError {
    #[error(
        "tried to allocate {mem_needed} bytes but only {mem_free} bytes are available out of {mem_total}"
    )]
    OutOfMemory {
        mem_needed: usize,
        mem_free: usize,
        mem_total: usize,
    },
}

#[derive(Default)]
struct Stat {
    cap: Option<usize>,
    used: usize,
    peak: usize,
    blocks: usize,
}

/// Byte accounting for the views of one backend. Clones share the same counters.
#[derive(Clone)]
pub struct Allocator {
    stat: Arc<Mutex<Stat>>,
}

impl Allocator {
    pub fn new(mem_cap: Option<usize>) -> Self {
        Allocator {
            stat: Arc::new(Mutex::new(Stat {
                cap: mem_cap,
                ..Stat::default()
            })),
        }
    }

    fn stat(&self) -> MutexGuard<'_, Stat> {
        self.stat.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn alloc(&self, size: usize) -> Result<Memory, MemoryError> {
        {
            let mut stat = self.stat();
            if let Some(cap) = stat.cap {
                if stat.used + size > cap {
                    return Err(MemoryError::OutOfMemory {
                        mem_needed: size,
                        mem_free: cap - stat.used,
                        mem_total: cap,
                    });
                }
            }
            stat.used += size;
            stat.peak = stat.peak.max(stat.used);
            stat.blocks += 1;
        }

        Ok(Memory {
            bytes: RwLock::new(vec![0; size]),
            stat: self.stat.clone(),
        })
    }

    pub fn mem_cap(&self) -> Option<usize> {
        self.stat().cap
    }

    pub fn mem_used(&self) -> usize {
        self.stat().used
    }

    pub fn mem_peak(&self) -> usize {
        self.stat().peak
    }

    /// Number of live allocations.
    pub fn num_blocks(&self) -> usize {
        self.stat().blocks
    }
}

impl Debug for Allocator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let stat = self.stat();
        write!(
            f,
            "Allocator {{ used: {}, peak: {}, blocks: {}, cap: {:?} }}",
            stat.used, stat.peak, stat.blocks, stat.cap
        )
    }
}

/// A zero-initialized byte block. Its size is returned to the allocator on drop.
pub struct Memory {
    bytes: RwLock<Vec<u8>>,
    stat: Arc<Mutex<Stat>>,
}

impl Memory {
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.bytes.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.bytes.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for Memory {
    fn drop(&mut self) {
        let size = self.bytes.get_mut().map(|b| b.len()).unwrap_or_else(|e| e.into_inner().len());
        let mut stat = self.stat.lock().unwrap_or_else(|e| e.into_inner());
        stat.used -= size;
        stat.blocks -= 1;
    }
}
