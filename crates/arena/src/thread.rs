//! Thread registration
//!
//! Each arena keeps a ring of the threads registered with it; collectors
//! walk it to scan thread stacks conservatively. A registration record
//! occupies one grain of arena memory, placed through the ordinary
//! allocation policy in the arena's control pool.

use std::thread::ThreadId;

#[cfg(feature = "logging")]
use tracing::debug;

use crate::arena::{Arena, ArenaId};
use crate::error::{ArenaError, ArenaResult};
use crate::locus::LocusPref;
use crate::policy::policy_alloc;
use crate::tract::Tract;

/// Proof of registration, returned to [`Arena::deregister_thread`]
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a registered thread must be deregistered with its handle"]
pub struct ThreadHandle {
    arena: ArenaId,
    serial: u64,
}

impl ThreadHandle {
    /// Arena the thread is registered with
    pub fn arena(&self) -> ArenaId {
        self.arena
    }

    /// Registration serial, unique within the arena
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ThreadRecord {
    serial: u64,
    thread: ThreadId,
    tract: Tract,
}

/// Registered threads in registration order
#[derive(Debug, Default)]
pub(crate) struct ThreadRing {
    records: Vec<ThreadRecord>,
    next_serial: u64,
}

impl ThreadRing {
    fn push(&mut self, thread: ThreadId, tract: Tract) -> u64 {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.records.push(ThreadRecord {
            serial,
            thread,
            tract,
        });
        serial
    }

    fn remove(&mut self, serial: u64) -> Option<ThreadRecord> {
        let index = self
            .records
            .iter()
            .position(|record| record.serial == serial)?;
        Some(self.records.remove(index))
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    fn threads(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.records.iter().map(|record| record.thread)
    }
}

impl Arena {
    /// Registers the calling thread.
    ///
    /// # Errors
    ///
    /// Any policy failure placing the registration record.
    pub fn register_thread(&self) -> ArenaResult<ThreadHandle> {
        let mut state = self.claim_state();
        let state = &mut *state;
        let size = state.core.grain_size();
        let pool = state.core.control_pool();

        let result = policy_alloc(
            &mut state.core,
            state.grower.as_mut(),
            &LocusPref::default(),
            size,
            pool,
        );
        self.record_result(&result);
        let placement = result?;

        let thread = std::thread::current().id();
        let serial = state.core.threads.push(thread, placement.tract);

        #[cfg(feature = "logging")]
        debug!(
            arena = self.id().get(),
            serial,
            ?thread,
            "thread registered"
        );

        Ok(ThreadHandle {
            arena: self.id(),
            serial,
        })
    }

    /// Removes a registration and frees its record.
    ///
    /// # Errors
    ///
    /// [`ArenaError::InvalidOperation`] when the handle belongs to another
    /// arena or was already deregistered.
    pub fn deregister_thread(&self, handle: ThreadHandle) -> ArenaResult<()> {
        if handle.arena != self.id() {
            return Err(ArenaError::invalid_operation(format!(
                "thread handle belongs to arena {}, not {}",
                handle.arena.get(),
                self.id().get()
            )));
        }

        let mut state = self.claim_state();
        let record = state.core.threads.remove(handle.serial).ok_or_else(|| {
            ArenaError::invalid_operation(format!("thread {} is not registered", handle.serial))
        })?;
        state.core.free_tract(&record.tract)?;
        drop(state);

        self.record_free(record.tract.size());

        #[cfg(feature = "logging")]
        debug!(
            arena = self.id().get(),
            serial = handle.serial,
            "thread deregistered"
        );
        Ok(())
    }

    /// Number of registered threads
    pub fn thread_count(&self) -> usize {
        self.claim_state().core.threads.len()
    }

    /// Registered threads in registration order
    pub fn registered_threads(&self) -> Vec<ThreadId> {
        self.claim_state().core.threads.threads().collect()
    }
}
