use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::lockfree::pad_after;

const MAILBOX_PAD_BYTES: usize = pad_after::<AtomicPtr<()>>();

/// ### English
/// Latest-wins slot for a boxed payload, with a single-node spare cache.
///
/// Producers atomically swap the newest payload in; the consumer drains the
/// slot and hands the drained box back through the spare cache, so the
/// steady state runs without allocating. At most one payload and one spare
/// node exist at any time, which is what bounds a coalesced request lane to
/// O(1) memory however fast producers post.
///
/// ### 中文
/// “只保留最新值”的 boxed 载荷槽位，附带一个单节点备用缓存。
///
/// 生产者以原子 swap 写入最新载荷；消费者取空槽位后把用完的 box 通过
/// 备用缓存归还，稳态路径不再分配内存。任意时刻最多存在一个载荷节点和
/// 一个备用节点，这使合并请求通道的内存占用无论生产多快都保持 O(1)。
#[repr(C, align(64))]
pub(crate) struct Mailbox<T> {
    slot: AtomicPtr<T>,
    /// Keeps the post path and the recycle path on separate cache lines.
    _pad_slot: [u8; MAILBOX_PAD_BYTES],
    spare: AtomicPtr<T>,
}

unsafe impl<T: Send> Send for Mailbox<T> {}
unsafe impl<T: Send> Sync for Mailbox<T> {}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self {
            slot: AtomicPtr::new(ptr::null_mut()),
            _pad_slot: [0; MAILBOX_PAD_BYTES],
            spare: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

impl<T> Mailbox<T> {
    #[inline]
    pub(crate) fn is_pending(&self) -> bool {
        !self.slot.load(Ordering::Acquire).is_null()
    }

    /// ### English
    /// Posts a payload, returning the displaced one when the slot was
    /// already occupied (the coalesced case).
    ///
    /// ### 中文
    /// 写入载荷；若槽位已被占用（即发生合并），返回被替换下来的旧载荷。
    #[inline]
    pub(crate) fn post(&self, node: Box<T>) -> Option<Box<T>> {
        let fresh = Box::into_raw(node);
        let displaced = self.slot.swap(fresh, Ordering::Release);
        if displaced.is_null() {
            None
        } else {
            Some(unsafe { Box::from_raw(displaced) })
        }
    }

    #[inline]
    pub(crate) fn take(&self) -> Option<Box<T>> {
        let current = self.slot.swap(ptr::null_mut(), Ordering::Acquire);
        if current.is_null() {
            None
        } else {
            Some(unsafe { Box::from_raw(current) })
        }
    }

    #[inline]
    pub(crate) fn pop_spare(&self) -> Option<Box<T>> {
        let node = self.spare.swap(ptr::null_mut(), Ordering::AcqRel);
        if node.is_null() {
            None
        } else {
            Some(unsafe { Box::from_raw(node) })
        }
    }

    #[inline]
    pub(crate) fn push_spare(&self, node: Box<T>) {
        let fresh = Box::into_raw(node);
        let displaced = self.spare.swap(fresh, Ordering::AcqRel);
        if !displaced.is_null() {
            unsafe {
                drop(Box::from_raw(displaced));
            }
        }
    }
}

impl<T> Drop for Mailbox<T> {
    fn drop(&mut self) {
        let current = self.slot.swap(ptr::null_mut(), Ordering::AcqRel);
        if !current.is_null() {
            unsafe {
                drop(Box::from_raw(current));
            }
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
    use super::*;

    #[test]
    fn latest_post_wins() {
        let mailbox = Mailbox::default();
        assert!(!mailbox.is_pending());

        assert!(mailbox.post(Box::new(1u32)).is_none());
        let displaced = mailbox.post(Box::new(2u32));
        assert_eq!(displaced.as_deref(), Some(&1));

        assert!(mailbox.is_pending());
        assert_eq!(mailbox.take().as_deref(), Some(&2));
        assert!(mailbox.take().is_none());
        assert!(!mailbox.is_pending());
    }

    #[test]
    fn spare_cache_recycles_one_node() {
        let mailbox = Mailbox::default();
        assert!(mailbox.pop_spare().is_none());

        mailbox.push_spare(Box::new(7u32));
        mailbox.push_spare(Box::new(8u32));
        // Single-node cache: the older spare is freed, the newer kept.
        assert_eq!(mailbox.pop_spare().as_deref(), Some(&8));
        assert!(mailbox.pop_spare().is_none());
    }

    #[test]
    fn drop_releases_pending_and_spare() {
        use std::sync::Arc;
        use std::sync::atomic::AtomicUsize;

        struct Counted(Arc<AtomicUsize>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        {
            let mailbox = Mailbox::default();
            mailbox.post(Box::new(Counted(drops.clone())));
            mailbox.push_spare(Box::new(Counted(drops.clone())));
        }
        assert_eq!(drops.load(Ordering::SeqCst), 2);
    }
}
