use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::lockfree::{Backoff, pad_after};

// Node pointers regardless of `T`, so the generic struct can use them as
// array lengths.
const MPSC_PAD_HEAD_BYTES: usize = pad_after::<*mut ()>();
const MPSC_PAD_TAIL_BYTES: usize = pad_after::<AtomicPtr<()>>();

#[repr(C)]
struct Node<T> {
    next: AtomicPtr<Node<T>>,
    value: UnsafeCell<MaybeUninit<T>>,
}

unsafe impl<T: Send> Send for Node<T> {}
unsafe impl<T: Send> Sync for Node<T> {}

impl<T> Node<T> {
    #[inline]
    fn empty() -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

/// ### English
/// Unbounded lock-free FIFO, multi-producer single-consumer.
///
/// Vyukov's intrusive linked-list MPSC: producers swap the tail, the single
/// consumer chases `head.next`. A consumed node goes into a one-slot cache so
/// an alternating push/pop steady state reuses it instead of allocating.
/// `pop` must only ever be called from one thread (the worker).
///
/// ### 中文
/// 无界无锁 FIFO，多生产者、单消费者。
///
/// Vyukov 侵入式链表 MPSC：生产者原子交换 tail，唯一的消费者沿
/// `head.next` 前进。被消费的节点进入单槽缓存，使 push/pop 交替的稳态
/// 复用节点而非反复分配。`pop` 只允许从单一线程（worker 线程）调用。
#[repr(C, align(64))]
pub(crate) struct MpscQueue<T> {
    /// Consumer cursor, only ever touched by the worker thread.
    head: UnsafeCell<*mut Node<T>>,
    /// Keeps the consumer cursor off the producers' cache line.
    _pad_head: [u8; MPSC_PAD_HEAD_BYTES],
    /// Producer swap point.
    tail: AtomicPtr<Node<T>>,
    /// Keeps the tail and the spare cache on separate cache lines.
    _pad_tail: [u8; MPSC_PAD_TAIL_BYTES],
    spare: AtomicPtr<Node<T>>,
}

unsafe impl<T: Send> Send for MpscQueue<T> {}
unsafe impl<T: Send> Sync for MpscQueue<T> {}

impl<T> MpscQueue<T> {
    pub(crate) fn new() -> Self {
        let stub = Box::into_raw(Box::new(Node::empty()));
        Self {
            head: UnsafeCell::new(stub),
            _pad_head: [0; MPSC_PAD_HEAD_BYTES],
            tail: AtomicPtr::new(stub),
            _pad_tail: [0; MPSC_PAD_TAIL_BYTES],
            spare: AtomicPtr::new(ptr::null_mut()),
        }
    }

    #[inline]
    pub(crate) fn push(&self, value: T) {
        let node = self
            .pop_spare_node()
            .unwrap_or_else(|| Box::into_raw(Box::new(Node::empty())));
        unsafe {
            (*node).next.store(ptr::null_mut(), Ordering::Relaxed);
            (*(*node).value.get()).write(value);
        }

        let prev = self.tail.swap(node, Ordering::AcqRel);
        unsafe {
            (*prev).next.store(node, Ordering::Release);
        }
    }

    #[inline]
    pub(crate) fn pop(&self) -> Option<T> {
        let head = unsafe { *self.head.get() };
        let mut next = unsafe { (*head).next.load(Ordering::Acquire) };

        if next.is_null() {
            if self.tail.load(Ordering::Acquire) == head {
                return None;
            }
            // A producer swapped the tail but has not linked `next` yet.
            let mut backoff = Backoff::new();
            loop {
                next = unsafe { (*head).next.load(Ordering::Acquire) };
                if !next.is_null() {
                    break;
                }
                backoff.snooze();
            }
        }

        let value = unsafe { (*(*next).value.get()).assume_init_read() };
        unsafe {
            *self.head.get() = next;
            (*head).next.store(ptr::null_mut(), Ordering::Relaxed);
        }
        self.push_spare_node(head);
        Some(value)
    }

    #[inline]
    fn push_spare_node(&self, node: *mut Node<T>) {
        unsafe {
            (*node).next.store(ptr::null_mut(), Ordering::Relaxed);
        }
        let prev = self.spare.swap(node, Ordering::AcqRel);
        if !prev.is_null() {
            unsafe {
                drop(Box::from_raw(prev));
            }
        }
    }

    #[inline]
    fn pop_spare_node(&self) -> Option<*mut Node<T>> {
        let node = self.spare.swap(ptr::null_mut(), Ordering::AcqRel);
        (!node.is_null()).then_some(node)
    }
}

impl<T> Drop for MpscQueue<T> {
    fn drop(&mut self) {
        while let Some(value) = self.pop() {
            drop(value);
        }

        let head = unsafe { *self.head.get() };
        unsafe {
            drop(Box::from_raw(head));
        }

        let spare = self.spare.swap(ptr::null_mut(), Ordering::AcqRel);
        if !spare.is_null() {
            unsafe {
                drop(Box::from_raw(spare));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn fifo_order_single_producer() {
        let queue = MpscQueue::new();
        assert!(queue.pop().is_none());

        for i in 0..16u32 {
            queue.push(i);
        }
        for i in 0..16u32 {
            assert_eq!(queue.pop(), Some(i));
        }
        assert!(queue.pop().is_none());
    }

    #[test]
    fn all_values_arrive_from_many_producers() {
        let queue = Arc::new(MpscQueue::new());
        let producers = 4;
        let per_producer = 1_000u32;

        let handles: Vec<_> = (0..producers)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..per_producer {
                        queue.push(p * per_producer + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut seen = vec![false; (producers * per_producer) as usize];
        while let Some(value) = queue.pop() {
            assert!(!seen[value as usize]);
            seen[value as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn drop_frees_unconsumed_values() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Counted(Arc<AtomicUsize>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        {
            let queue = MpscQueue::new();
            for _ in 0..3 {
                queue.push(Counted(drops.clone()));
            }
            assert!(queue.pop().is_some());
        }
        assert_eq!(drops.load(Ordering::SeqCst), 3);
    }
}
