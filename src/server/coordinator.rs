//! First-reader/last-reader lock shared by every connection.
//!
//! Readers run alongside each other. The first reader to arrive takes the writer
//! lock on behalf of the whole group and the last one to leave gives it back, so a
//! writer only runs once no reader is active and no reader is admitted while a
//! writer holds the lock. A steady stream of overlapping readers keeps writers
//! waiting indefinitely.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct ReaderState {
    count: usize,
    writer_guard: Option<OwnedMutexGuard<()>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub active_readers: usize,
    pub active_writers: usize,
    pub past_readers: usize,
    pub past_writers: usize,
}

#[derive(Debug, Default)]
pub struct Coordinator {
    //Serializes reader admission
    entry: AsyncMutex<()>,
    readers: Mutex<ReaderState>,
    writer: Arc<AsyncMutex<()>>,
    active_writers: AtomicUsize,
    past_readers: AtomicUsize,
    past_writers: AtomicUsize,
}

impl Coordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Coordinator::default())
    }

    fn lock_readers(&self) -> MutexGuard<'_, ReaderState> {
        self.readers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn begin_read(self: &Arc<Self>) -> ReadGuard {
        let _entry = self.entry.lock().await;

        {
            let mut readers = self.lock_readers();
            if readers.count > 0 {
                readers.count += 1;
                return ReadGuard {
                    coordinator: Arc::clone(self),
                };
            }
        }

        //No reader is active, nobody else can touch the count until we are done
        let writer_guard = Arc::clone(&self.writer).lock_owned().await;

        let mut readers = self.lock_readers();
        readers.count += 1;
        readers.writer_guard = Some(writer_guard);
        debug!("First reader took the writer lock");

        ReadGuard {
            coordinator: Arc::clone(self),
        }
    }

    fn end_read(&self) {
        let released = {
            let mut readers = self.lock_readers();
            readers.count = readers.count.saturating_sub(1);

            if readers.count == 0 {
                readers.writer_guard.take()
            } else {
                None
            }
        };

        self.past_readers.fetch_add(1, Ordering::Relaxed);

        if released.is_some() {
            debug!("Last reader released the writer lock");
        }
    }

    pub async fn begin_write(self: &Arc<Self>) -> WriteGuard {
        let guard = Arc::clone(&self.writer).lock_owned().await;
        self.active_writers.fetch_add(1, Ordering::Relaxed);

        WriteGuard {
            coordinator: Arc::clone(self),
            _guard: guard,
        }
    }

    fn end_write(&self) {
        self.active_writers.fetch_sub(1, Ordering::Relaxed);
        self.past_writers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            active_readers: self.lock_readers().count,
            active_writers: self.active_writers.load(Ordering::Relaxed),
            past_readers: self.past_readers.load(Ordering::Relaxed),
            past_writers: self.past_writers.load(Ordering::Relaxed),
        }
    }
}

/// Held for the duration of a reader operation, may be moved into blocking tasks.
#[derive(Debug)]
pub struct ReadGuard {
    coordinator: Arc<Coordinator>,
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        self.coordinator.end_read();
    }
}

#[derive(Debug)]
pub struct WriteGuard {
    coordinator: Arc<Coordinator>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.coordinator.end_write();
    }
}
