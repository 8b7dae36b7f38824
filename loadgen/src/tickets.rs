use std::sync::{Arc, OnceLock};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::TicketsError;

/// Bounded pool of admission tickets.
///
/// The pool is initialized exactly once with a fixed number of tickets. Each
/// in-flight call must hold a [`Ticket`], so the number of concurrent calls
/// never exceeds [`Tickets::total`].
#[derive(Debug, Default)]
pub struct Tickets {
    inner: OnceLock<(u32, Arc<Semaphore>)>,
}

impl Tickets {
    /// Constructs a new active pool pre-loaded with `total` tickets.
    pub fn new(total: u32) -> Result<Self, TicketsError> {
        let tickets = Self::default();
        tickets.init(total)?;

        Ok(tickets)
    }

    /// Activates this pool with `total` tickets.
    ///
    /// Fails if `total` is zero or if the pool has already been activated.
    pub fn init(&self, total: u32) -> Result<(), TicketsError> {
        if let Some((total, ..)) = self.inner.get() {
            return Err(TicketsError::AlreadyActive(*total));
        }
        if total == 0 {
            return Err(TicketsError::ZeroTotal);
        }

        self.inner
            .set((total, Arc::new(Semaphore::new(total as usize))))
            .map_err(|(..)| TicketsError::AlreadyActive(self.total()))
    }

    /// Takes a ticket, waiting until one is available.
    pub async fn take(&self) -> Result<Ticket, TicketsError> {
        let (.., sem) = self.inner.get().ok_or(TicketsError::Inactive)?;
        // The semaphore is never closed, so acquiring can only fail on an
        // inactive pool.
        let permit = sem.clone().acquire_owned().await.map_err(|_| TicketsError::Inactive)?;

        Ok(Ticket { _permit: permit })
    }

    #[inline]
    pub fn active(&self) -> bool {
        self.inner.get().is_some()
    }

    #[inline]
    pub fn total(&self) -> u32 {
        self.inner.get().map(|(total, ..)| *total).unwrap_or(0)
    }

    /// Returns the number of tickets currently available.
    ///
    /// This is an instantaneous snapshot, not a synchronization primitive.
    #[inline]
    pub fn remainder(&self) -> u32 {
        self.inner
            .get()
            .map(|(.., sem)| sem.available_permits() as u32)
            .unwrap_or(0)
    }
}

/// Admission ticket.
///
/// Returned to its pool when dropped.
#[derive(Debug)]
pub struct Ticket {
    _permit: OwnedSemaphorePermit,
}

impl Ticket {
    /// Returns this ticket back to the pool, waking at most one waiter.
    #[inline]
    pub fn release(self) {}
}
