//! ### English
//! Spin-then-yield backoff for the short waits inside lock-free primitives.
//!
//! Kept tiny and inlineable:
//! - A short spin covers the window where another thread is mid-publish.
//! - Past the spin budget it yields, so oversubscribed hosts are not starved.
//!
//! ### 中文
//! 为无锁原语内部的短暂等待提供“短自旋 + 让出调度”退避。
//!
//! 刻意保持极小且可内联：
//! - 短自旋覆盖另一线程正在发布数据的窗口期；
//! - 超出自旋预算后让出调度，避免在超额订阅的宿主上空转。

use std::thread;

/// ### English
/// Spins allowed before falling back to `yield_now()`.
///
/// ### 中文
/// 回退到 `yield_now()` 之前允许的自旋次数。
const SPIN_BUDGET: u32 = 64;

/// ### English
/// Per-wait backoff state.
///
/// ### 中文
/// 单次等待的退避状态。
pub(crate) struct Backoff {
    rounds: u32,
}

impl Backoff {
    /// ### English
    /// Starts a fresh backoff.
    ///
    /// ### 中文
    /// 开始一轮新的退避。
    #[inline]
    pub(crate) fn new() -> Self {
        Self { rounds: 0 }
    }

    /// ### English
    /// One backoff step: spin while under budget, then yield.
    ///
    /// ### 中文
    /// 执行一步退避：预算内自旋，超出后让出调度。
    #[inline]
    pub(crate) fn snooze(&mut self) {
        if self.rounds < SPIN_BUDGET {
            std::hint::spin_loop();
        } else {
            thread::yield_now();
        }
        self.rounds = self.rounds.wrapping_add(1);
    }
}
