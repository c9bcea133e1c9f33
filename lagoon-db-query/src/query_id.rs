//! Query-id allocation and no-reply ordering.
//!
//! Every query ingested on a session takes a monotonically increasing id.
//! Outstanding ids form a list sorted by arrival (and therefore by value);
//! the smallest live id is published as the *oldest outstanding* watermark.
//! `noreply_wait` samples the id counter at entry and resolves once the
//! watermark reaches the sample, which is exactly "every query submitted
//! before me has drained".
//!
//! Outstanding ids live in a slab of doubly linked slots, so acquire and
//! release are O(1) and release from the middle never shifts other entries.
//! Because acquisition is monotonic, appended ids are naturally sorted and
//! the oldest is always at the head.
//!
//! All mutation goes through `&mut self` on the session's worker; waiters
//! only hold a watch receiver. Dropping the allocator (session teardown)
//! closes the channel and releases every waiter.

use tokio::sync::watch;
use tracing::trace;

/// A live query id. Plain data; returning it to [`QueryIdAllocator::release`]
/// consumes it, so an id cannot be released twice.
#[derive(Debug)]
pub struct QueryIdHandle {
    value: u64,
    slot: usize,
}

impl QueryIdHandle {
    /// Integer value of this id.
    pub fn value(&self) -> u64 {
        self.value
    }
}

#[derive(Debug)]
struct Slot {
    value: u64,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Per-session id allocator and outstanding-id list.
pub struct QueryIdAllocator {
    next_id: u64,
    slots: Vec<Slot>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    oldest: watch::Sender<u64>,
}

impl Default for QueryIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryIdAllocator {
    pub fn new() -> Self {
        let (oldest, _) = watch::channel(0);
        Self {
            next_id: 0,
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            oldest,
        }
    }

    /// Take the next id and append it to the outstanding list.
    pub fn acquire(&mut self) -> QueryIdHandle {
        let value = self.next_id;
        self.next_id += 1;

        // Guarantee correct ordering.
        if let Some(tail) = self.tail {
            debug_assert!(self.slots[tail].value < value);
        }
        debug_assert!(value >= *self.oldest.borrow());

        let slot = Slot {
            value,
            prev: self.tail,
            next: None,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = slot;
                index
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };
        match self.tail {
            Some(tail) => self.slots[tail].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);

        trace!(id = value, "query id acquired");
        QueryIdHandle { value, slot: index }
    }

    /// Remove an id from the outstanding list, advancing the watermark when
    /// the oldest id departs.
    pub fn release(&mut self, handle: QueryIdHandle) {
        let QueryIdHandle { value, slot } = handle;
        debug_assert_eq!(self.slots[slot].value, value, "stale query id handle");

        let prev = self.slots[slot].prev;
        let next = self.slots[slot].next;
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
        self.free.push(slot);

        if value == *self.oldest.borrow() {
            let new_oldest = match self.head {
                Some(head) => self.slots[head].value,
                None => self.next_id,
            };
            debug_assert!(new_oldest > value);
            self.oldest.send_replace(new_oldest);
        }
        trace!(id = value, "query id released");
    }

    /// Current oldest-outstanding watermark.
    ///
    /// Equals the head of the outstanding list when nonempty, and the next
    /// id to be assigned when empty.
    pub fn oldest_outstanding(&self) -> u64 {
        *self.oldest.borrow()
    }

    /// Number of outstanding ids.
    pub fn outstanding(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Resolve once every id acquired before this call has been released.
    ///
    /// The returned future does not borrow the allocator, so the session can
    /// keep ingesting queries while waiters are parked.
    pub fn noreply_wait(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let sample = self.next_id;
        let mut rx = self.oldest.subscribe();
        async move {
            loop {
                if *rx.borrow_and_update() >= sample {
                    return;
                }
                // Channel closure means session teardown; nothing left to
                // wait for.
                if rx.changed().await.is_err() {
                    return;
                }
            }
        }
    }
}
