use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

use anyhow::ensure;

use crate::sync::Semaphore;

/// Fixed-capacity circular queue shared between producers and consumers.
///
/// Three semaphores carry the whole discipline: `empty` counts free slots,
/// `fill` counts occupied slots, and `mutex` (binary) serializes access to
/// the ring itself. [`add`](BoundedBuffer::add) blocks while the buffer is
/// full, [`remove`](BoundedBuffer::remove) while it is empty.
pub struct BoundedBuffer<T> {
    mutex: Semaphore,
    fill: Semaphore,
    empty: Semaphore,
    ring: UnsafeCell<Ring<T>>,
    capacity: usize,
}

// The ring is only touched between mutex.acquire() and mutex.release(),
// which admits one thread at a time.
unsafe impl<T: Send> Send for BoundedBuffer<T> {}
unsafe impl<T: Send> Sync for BoundedBuffer<T> {}

impl<T> BoundedBuffer<T> {
    pub fn new(capacity: usize) -> anyhow::Result<Self> {
        ensure!(capacity > 0, "buffer capacity must be positive");
        Ok(Self {
            mutex: Semaphore::with_max(1, 1)?,
            fill: Semaphore::with_max(0, capacity)?,
            empty: Semaphore::with_max(capacity, capacity)?,
            ring: UnsafeCell::new(Ring::with_capacity(capacity)),
            capacity,
        })
    }

    /// Appends `element` at the tail, blocking while the buffer is full.
    pub fn add(&self, element: T) {
        // Slot semaphore strictly before the mutex. Taken the other way
        // round, a full buffer would block this thread while it holds the
        // mutex and no remove() could ever free a slot.
        self.empty.acquire();
        self.mutex.acquire();
        // Safety: mutex held; empty.acquire() guarantees a free slot.
        unsafe { (*self.ring.get()).push(element) };
        self.mutex.release();
        self.fill.release();
    }

    /// Removes the head element, blocking while the buffer is empty.
    pub fn remove(&self) -> T {
        self.fill.acquire();
        self.mutex.acquire();
        // Safety: mutex held; fill.acquire() guarantees an occupied slot.
        let element = unsafe { (*self.ring.get()).pop() };
        self.mutex.release();
        self.empty.release();
        element
    }

    /// Current contents in queue order, for diagnostics.
    ///
    /// Holds only the mutex, never the slot semaphores, so the view is
    /// stale the moment it returns. Callers must not read anything into
    /// its relation to concurrent add/remove traffic.
    pub fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.mutex.acquire();
        // Safety: mutex held.
        let contents = unsafe { (*self.ring.get()).contents() };
        self.mutex.release();
        contents
    }

    /// Number of elements currently stored. Stale as soon as it returns.
    pub fn len(&self) -> usize {
        self.mutex.acquire();
        // Safety: mutex held.
        let len = unsafe { (*self.ring.get()).len };
        self.mutex.release();
        len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Ring storage. Slots outside `head..head+len` are uninitialized.
struct Ring<T> {
    storage: Box<[MaybeUninit<T>]>,
    head: usize,
    len: usize,
}

impl<T> Ring<T> {
    fn with_capacity(capacity: usize) -> Self {
        let storage = (0..capacity).map(|_| MaybeUninit::uninit()).collect();
        Self {
            storage,
            head: 0,
            len: 0,
        }
    }

    /// Caller must hold the buffer mutex and have acquired a free slot.
    fn push(&mut self, element: T) {
        let slot = (self.head + self.len) % self.storage.len();
        self.storage[slot].write(element);
        self.len += 1;
    }

    /// Caller must hold the buffer mutex and have acquired an occupied slot.
    fn pop(&mut self) -> T {
        // Safety: len > 0, so the slot at head is initialized; advancing
        // head marks it uninitialized again.
        let element = unsafe { self.storage[self.head].assume_init_read() };
        self.head = (self.head + 1) % self.storage.len();
        self.len -= 1;
        element
    }

    fn contents(&self) -> Vec<T>
    where
        T: Clone,
    {
        (0..self.len)
            .map(|offset| {
                let slot = (self.head + offset) % self.storage.len();
                // Safety: slots within head..head+len are initialized.
                unsafe { self.storage[slot].assume_init_ref() }.clone()
            })
            .collect()
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        for offset in 0..self.len {
            let slot = (self.head + offset) % self.storage.len();
            // Safety: same initialization window as contents().
            unsafe { self.storage[slot].assume_init_drop() };
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use crossbeam_channel::bounded;

    use super::BoundedBuffer;

    #[test]
    fn rejects_zero_capacity() {
        assert!(BoundedBuffer::<u32>::new(0).is_err());
    }

    #[test]
    fn fifo_order_within_capacity() {
        let buf = BoundedBuffer::new(4).unwrap();
        for n in 0..4 {
            buf.add(n);
        }
        for n in 0..4 {
            assert_eq!(buf.remove(), n);
        }
    }

    #[test]
    fn wraps_around_the_ring() {
        let buf = BoundedBuffer::new(3).unwrap();
        buf.add(1);
        buf.add(2);
        assert_eq!(buf.remove(), 1);
        buf.add(3);
        buf.add(4);
        assert_eq!(buf.snapshot(), vec![2, 3, 4]);
        assert_eq!(buf.remove(), 2);
        assert_eq!(buf.remove(), 3);
        assert_eq!(buf.remove(), 4);
        assert!(buf.is_empty());
    }

    #[test]
    fn semaphore_counters_track_occupancy() {
        let buf = BoundedBuffer::new(5).unwrap();
        assert_eq!(buf.fill.value(), 0);
        assert_eq!(buf.empty.value(), 5);

        buf.add('a');
        buf.add('b');
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.fill.value(), 2);
        assert_eq!(buf.empty.value(), 3);

        buf.remove();
        assert_eq!(buf.fill.value(), 1);
        assert_eq!(buf.empty.value(), 4);
        assert_eq!(buf.mutex.value(), 1);
    }

    #[test]
    fn add_blocks_when_full() {
        let buf = Arc::new(BoundedBuffer::new(2).unwrap());
        buf.add(1);
        buf.add(2);

        let (tx, rx) = bounded(1);
        let producer = {
            let buf = buf.clone();
            thread::spawn(move || {
                buf.add(3);
                tx.send(()).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        assert_eq!(buf.remove(), 1);
        rx.recv_timeout(Duration::from_secs(5))
            .expect("producer stayed blocked after a slot freed up");
        producer.join().unwrap();
        assert_eq!(buf.snapshot(), vec![2, 3]);
    }

    #[test]
    fn remove_blocks_when_empty() {
        let buf = Arc::new(BoundedBuffer::new(2).unwrap());

        let (tx, rx) = bounded(1);
        let consumer = {
            let buf = buf.clone();
            thread::spawn(move || {
                tx.send(buf.remove()).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        buf.add(42);
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5))
                .expect("consumer stayed blocked after an add"),
            42
        );
        consumer.join().unwrap();
    }

    #[test]
    fn capacity_one_is_a_handoff_channel() {
        let buf = Arc::new(BoundedBuffer::new(1).unwrap());
        buf.add(0u32);

        let (tx, rx) = bounded(1);
        let producer = {
            let buf = buf.clone();
            thread::spawn(move || {
                // Blocks until the pre-filled slot is taken.
                buf.add(1);
                tx.send(()).unwrap();
                for n in 2..16 {
                    buf.add(n);
                }
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        let got: Vec<u32> = (0..16).map(|_| buf.remove()).collect();
        assert_eq!(got, (0..16).collect::<Vec<_>>());
        producer.join().unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn drops_undelivered_elements() {
        let buf = BoundedBuffer::new(4).unwrap();
        buf.add(Arc::new(7));
        buf.add(Arc::new(8));
        let held = Arc::new(9);
        buf.add(held.clone());
        drop(buf);
        assert_eq!(Arc::strong_count(&held), 1);
    }
}
