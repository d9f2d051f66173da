//! Value header - the lock/version word protocol.
//!
//! Every value slice starts with an 8-byte header: a 32-bit lock word
//! followed by a 32-bit generation tag. The lock word is a tagged
//! variant packed for cheap CAS:
//!
//! ```text
//! bits 1..0  tag:   0 = FREE, 1 = WRITE, 2 = DELETED, 3 = MOVED
//! bits 31..2 reader count (meaningful only while the tag is FREE)
//! ```
//!
//! State machine:
//!
//! ```text
//! FREE ── lock_read ──▶ READ(1) ── lock_read ──▶ READ(k+1)
//! READ(k) ── unlock_read ──▶ READ(k-1) | FREE (k = 1)
//! FREE ── lock_write ──▶ WRITE ── unlock_write ──▶ FREE
//! WRITE ── delete_locked ──▶ DELETED      (terminal for this generation)
//! WRITE ── move_locked ──▶ MOVED          (terminal for this generation)
//! DELETED ── allocator re-init, next generation ──▶ FREE
//! ```
//!
//! Writers acquire only from an empty FREE word (no readers, no
//! upgrade from READ). Contended acquisitions spin a bounded number of
//! iterations, then yield the OS thread. No fairness is promised;
//! critical sections are expected to be short.

use std::sync::atomic::{AtomicU32, Ordering};

use opal_common::constants::LOCK_SPIN_LIMIT;
use opal_common::types::Generation;

const TAG_MASK: u32 = 0b11;
const TAG_FREE: u32 = 0;
const TAG_WRITE: u32 = 1;
const TAG_DELETED: u32 = 2;
const TAG_MOVED: u32 = 3;

/// One reader in the packed reader count.
const READER_UNIT: u32 = 4;

/// Outcome of a lock-word transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockOutcome {
    /// The transition succeeded.
    Acquired,
    /// The word is terminally DELETED for this generation.
    Deleted,
    /// The word is terminally MOVED for this generation.
    Moved,
}

/// Bounded spin, then yield. Keeps contended acquisitions off the
/// scheduler for short critical sections without burning a core.
#[inline]
fn pause(spins: &mut u32) {
    if *spins < LOCK_SPIN_LIMIT {
        *spins += 1;
        core::hint::spin_loop();
    } else {
        std::thread::yield_now();
    }
}

/// A view of one value header inside a block.
///
/// The header's two words are accessed in place as atomics; the view
/// itself is a pair of references and is freely copyable.
#[derive(Clone, Copy)]
pub(crate) struct HeaderView<'a> {
    lock: &'a AtomicU32,
    generation: &'a AtomicU32,
}

impl<'a> HeaderView<'a> {
    /// Creates a view over the header at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must point at the first byte of a value header that lives
    /// for `'a`, 4-byte aligned (the allocators round slice starts to
    /// the slice alignment, which is stricter).
    pub(crate) unsafe fn from_ptr(ptr: *mut u8) -> Self {
        debug_assert_eq!(ptr as usize % 4, 0);
        Self {
            lock: &*(ptr as *const AtomicU32),
            generation: &*(ptr.add(4) as *const AtomicU32),
        }
    }

    /// Initializes the header for a fresh allocation instance: stamps
    /// the generation, then publishes the FREE word.
    ///
    /// The release store on the lock word is what makes the generation
    /// visible to any thread that subsequently acquires the header.
    pub(crate) fn init(&self, generation: Generation) {
        self.generation.store(generation.as_u32(), Ordering::Relaxed);
        self.lock.store(TAG_FREE, Ordering::Release);
    }

    /// Returns the generation stamped on this allocation instance.
    #[inline]
    pub(crate) fn generation(&self) -> Generation {
        Generation::new(self.generation.load(Ordering::Acquire))
    }

    /// Acquires the header in read mode, incrementing the reader count.
    ///
    /// Spins while a writer holds the word.
    pub(crate) fn lock_read(&self) -> LockOutcome {
        let mut spins = 0;
        loop {
            let word = self.lock.load(Ordering::Acquire);
            match word & TAG_MASK {
                TAG_FREE => {
                    if self
                        .lock
                        .compare_exchange_weak(
                            word,
                            word + READER_UNIT,
                            Ordering::Acquire,
                            Ordering::Relaxed,
                        )
                        .is_ok()
                    {
                        return LockOutcome::Acquired;
                    }
                }
                TAG_WRITE => pause(&mut spins),
                TAG_DELETED => return LockOutcome::Deleted,
                _ => return LockOutcome::Moved,
            }
        }
    }

    /// Releases one read acquisition.
    pub(crate) fn unlock_read(&self) {
        let old = self.lock.fetch_sub(READER_UNIT, Ordering::Release);
        debug_assert!(
            old >= READER_UNIT && old & TAG_MASK == TAG_FREE,
            "unlock_read without a matching lock_read"
        );
    }

    /// Acquires the header in write mode.
    ///
    /// Succeeds only from an empty FREE word; spins while readers
    /// drain or another writer holds the word.
    pub(crate) fn lock_write(&self) -> LockOutcome {
        let mut spins = 0;
        loop {
            let word = self.lock.load(Ordering::Acquire);
            match word & TAG_MASK {
                TAG_FREE => {
                    if word == TAG_FREE {
                        if self
                            .lock
                            .compare_exchange_weak(
                                TAG_FREE,
                                TAG_WRITE,
                                Ordering::Acquire,
                                Ordering::Relaxed,
                            )
                            .is_ok()
                        {
                            return LockOutcome::Acquired;
                        }
                    } else {
                        // Readers still active.
                        pause(&mut spins);
                    }
                }
                TAG_WRITE => pause(&mut spins),
                TAG_DELETED => return LockOutcome::Deleted,
                _ => return LockOutcome::Moved,
            }
        }
    }

    /// Releases the write acquisition, publishing all payload writes
    /// performed under it.
    pub(crate) fn unlock_write(&self) {
        debug_assert_eq!(self.lock.load(Ordering::Relaxed), TAG_WRITE);
        self.lock.store(TAG_FREE, Ordering::Release);
    }

    /// Transitions WRITE → DELETED. Terminal for this generation; the
    /// word returns to FREE only when the allocator re-initializes the
    /// slot under the next generation.
    pub(crate) fn delete_locked(&self) {
        debug_assert_eq!(self.lock.load(Ordering::Relaxed), TAG_WRITE);
        self.lock.store(TAG_DELETED, Ordering::Release);
    }

    /// Transitions WRITE → MOVED. Terminal for this generation.
    pub(crate) fn move_locked(&self) {
        debug_assert_eq!(self.lock.load(Ordering::Relaxed), TAG_WRITE);
        self.lock.store(TAG_MOVED, Ordering::Release);
    }

    /// Marks the header DELETED without a prior write acquisition,
    /// waiting for in-flight readers and writers to drain.
    ///
    /// Idempotent: a second call on the same generation reports
    /// `Deleted`.
    pub(crate) fn logical_delete(&self) -> LockOutcome {
        let mut spins = 0;
        loop {
            let word = self.lock.load(Ordering::Acquire);
            match word & TAG_MASK {
                TAG_FREE => {
                    if word == TAG_FREE {
                        if self
                            .lock
                            .compare_exchange_weak(
                                TAG_FREE,
                                TAG_DELETED,
                                Ordering::AcqRel,
                                Ordering::Relaxed,
                            )
                            .is_ok()
                        {
                            return LockOutcome::Acquired;
                        }
                    } else {
                        pause(&mut spins);
                    }
                }
                TAG_WRITE => pause(&mut spins),
                TAG_DELETED => return LockOutcome::Deleted,
                _ => return LockOutcome::Moved,
            }
        }
    }

    /// Returns true if the word is terminally DELETED.
    #[inline]
    pub(crate) fn is_deleted(&self) -> bool {
        self.lock.load(Ordering::Acquire) & TAG_MASK == TAG_DELETED
    }

    /// Returns true if the word is FREE with no readers.
    #[inline]
    pub(crate) fn is_free(&self) -> bool {
        self.lock.load(Ordering::Acquire) == TAG_FREE
    }

    /// Returns the live reader count.
    #[inline]
    pub(crate) fn reader_count(&self) -> u32 {
        let word = self.lock.load(Ordering::Acquire);
        if word & TAG_MASK == TAG_FREE {
            word >> 2
        } else {
            0
        }
    }
}

impl std::fmt::Debug for HeaderView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let word = self.lock.load(Ordering::Relaxed);
        let state = match word & TAG_MASK {
            TAG_FREE if word == TAG_FREE => "FREE".to_string(),
            TAG_FREE => format!("READ({})", word >> 2),
            TAG_WRITE => "WRITE".to_string(),
            TAG_DELETED => "DELETED".to_string(),
            _ => "MOVED".to_string(),
        };
        f.debug_struct("HeaderView")
            .field("state", &state)
            .field("generation", &self.generation())
            .finish()
    }
}
