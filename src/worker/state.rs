use std::sync::atomic::{AtomicU8, Ordering};

/// ### English
/// Lifecycle of a worker task.
///
/// `Uninitialized → Initializing → Running → Stopping → Stopped`, with
/// `Stopped` terminal. `Stopping` may also be entered straight from
/// `Initializing` when the task is released mid-handshake.
///
/// ### 中文
/// worker 任务的生命周期。
///
/// `Uninitialized → Initializing → Running → Stopping → Stopped`，其中
/// `Stopped` 为终态。若在握手期间被 release，也可以从 `Initializing`
/// 直接进入 `Stopping`。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum WorkerState {
    Uninitialized = 0,
    Initializing = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
}

#[inline]
fn decode(raw: u8) -> WorkerState {
    match raw {
        0 => WorkerState::Uninitialized,
        1 => WorkerState::Initializing,
        2 => WorkerState::Running,
        3 => WorkerState::Stopping,
        _ => WorkerState::Stopped,
    }
}

/// ### English
/// Atomic cell holding the worker state, shared between the owner and the
/// worker thread.
///
/// ### 中文
/// 保存 worker 状态的原子单元，在持有者与 worker 线程之间共享。
pub(crate) struct StateCell {
    raw: AtomicU8,
}

impl StateCell {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            raw: AtomicU8::new(WorkerState::Uninitialized as u8),
        }
    }

    #[inline]
    pub(crate) fn load(&self) -> WorkerState {
        decode(self.raw.load(Ordering::Acquire))
    }

    /// ### English
    /// Attempts the `from → to` transition; `false` means some other thread
    /// moved the state first.
    ///
    /// ### 中文
    /// 尝试执行 `from → to` 状态迁移；返回 `false` 表示其他线程抢先改变了状态。
    #[inline]
    pub(crate) fn advance(&self, from: WorkerState, to: WorkerState) -> bool {
        self.raw
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// ### English
    /// Unconditional store, used only by the worker thread for its terminal
    /// transition.
    ///
    /// ### 中文
    /// 无条件写入，仅供 worker 线程做终态迁移时使用。
    #[inline]
    pub(crate) fn force(&self, to: WorkerState) {
        self.raw.store(to as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_the_state_machine() {
        let cell = StateCell::new();
        assert_eq!(cell.load(), WorkerState::Uninitialized);

        assert!(cell.advance(WorkerState::Uninitialized, WorkerState::Initializing));
        assert!(cell.advance(WorkerState::Initializing, WorkerState::Running));
        // A stale transition loses.
        assert!(!cell.advance(WorkerState::Initializing, WorkerState::Running));
        assert!(cell.advance(WorkerState::Running, WorkerState::Stopping));

        cell.force(WorkerState::Stopped);
        assert_eq!(cell.load(), WorkerState::Stopped);
    }
}
