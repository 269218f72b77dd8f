use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const READY: u8 = 2;
const TAKEN: u8 = 3;

/// ### English
/// One-shot single-producer/single-consumer handoff cell.
///
/// Used for the worker start handshake and for synchronous request replies.
/// The receiver's thread handle is captured at construction so the sender
/// can `unpark()` it the moment the value lands; the receiver waits with
/// `park_timeout` against a deadline, never with a polling sleep.
///
/// ### 中文
/// 一次性的单生产者/单消费者传值单元。
///
/// 用于 worker 启动握手与同步请求的应答。构造时记录接收方线程句柄，
/// 发送方写入完成后立即 `unpark()` 唤醒；接收方按截止时间用
/// `park_timeout` 等待，绝不使用轮询睡眠。
pub(crate) struct OneShot<T> {
    /// ### English
    /// `EMPTY` → `WRITING` → `READY` → `TAKEN`.
    ///
    /// ### 中文
    /// `EMPTY` → `WRITING` → `READY` → `TAKEN`。
    state: AtomicU8,
    /// ### English
    /// Payload storage, written once by the sender.
    ///
    /// ### 中文
    /// 载荷存储区，仅由发送方写入一次。
    value: UnsafeCell<MaybeUninit<T>>,
    /// ### English
    /// Receiver thread, unparked on send.
    ///
    /// ### 中文
    /// 接收方线程，发送后被 unpark。
    waiter: thread::Thread,
}

unsafe impl<T: Send> Send for OneShot<T> {}
unsafe impl<T: Send> Sync for OneShot<T> {}

impl<T> OneShot<T> {
    #[inline]
    pub(crate) fn new(waiter: thread::Thread) -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(MaybeUninit::uninit()),
            waiter,
        }
    }

    /// ### English
    /// Delivers the value and wakes the receiver. Returns `false` when a
    /// value was already delivered.
    ///
    /// ### 中文
    /// 写入值并唤醒接收方；若已写入过则返回 `false`。
    #[inline]
    pub(crate) fn send(&self, value: T) -> bool {
        if self
            .state
            .compare_exchange(EMPTY, WRITING, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        unsafe {
            (*self.value.get()).write(value);
        }
        self.state.store(READY, Ordering::Release);
        self.waiter.unpark();
        true
    }

    /// ### English
    /// Non-blocking receive.
    ///
    /// ### 中文
    /// 非阻塞接收。
    #[inline]
    pub(crate) fn try_recv(&self) -> Option<T> {
        self.state
            .compare_exchange(READY, TAKEN, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| unsafe { (*self.value.get()).assume_init_read() })
    }

    /// ### English
    /// Waits for the value until the deadline, parking between checks.
    ///
    /// ### 中文
    /// 在截止时间前等待值到达，期间通过 park 挂起。
    pub(crate) fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(value) = self.try_recv() {
                return Some(value);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            thread::park_timeout(deadline - now);
        }
    }
}

impl<T> Drop for OneShot<T> {
    fn drop(&mut self) {
        if self.state.load(Ordering::Acquire) == READY {
            unsafe {
                drop((*self.value.get()).assume_init_read());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn delivers_across_threads() {
        let cell = Arc::new(OneShot::new(thread::current()));
        let sender = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                assert!(cell.send(42u32));
            })
        };

        assert_eq!(cell.recv_timeout(Duration::from_secs(5)), Some(42));
        sender.join().unwrap();
    }

    #[test]
    fn second_send_is_rejected() {
        let cell = OneShot::new(thread::current());
        assert!(cell.send(1u32));
        assert!(!cell.send(2u32));
        assert_eq!(cell.try_recv(), Some(1));
        assert_eq!(cell.try_recv(), None);
    }

    #[test]
    fn times_out_when_nothing_is_sent() {
        let cell: OneShot<u32> = OneShot::new(thread::current());
        assert_eq!(cell.recv_timeout(Duration::from_millis(20)), None);
    }
}
