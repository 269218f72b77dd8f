use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::Thread;

use crate::lockfree::{Backoff, Mailbox, MpscQueue};
use crate::worker::request::{Request, RequestKind};

/// ### English
/// Result of a non-blocking [`RequestQueue::offer`].
///
/// ### 中文
/// 非阻塞 [`RequestQueue::offer`] 的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OfferOutcome {
    /// ### English
    /// Appended (or posted into an empty coalescing lane).
    ///
    /// ### 中文
    /// 已追加（或写入了空的合并通道）。
    Enqueued,
    /// ### English
    /// A pending request of the same kind was replaced.
    ///
    /// ### 中文
    /// 替换了同类的待处理请求。
    Replaced,
    /// ### English
    /// The queue is closed; the request was dropped (reply completed with an
    /// error).
    ///
    /// ### 中文
    /// 队列已关闭；请求被丢弃（reply 以错误完成）。
    Rejected,
}

/// ### English
/// Two-lane request queue feeding the worker thread.
///
/// FIFO kinds ride an unbounded MPSC queue; coalescible kinds (draw, target
/// resize) each own a latest-wins mailbox, which is what bounds the backlog
/// to at most one pending instance per kind. The embedded waker parks the
/// worker between bursts and collapses redundant unparks behind a pending
/// flag. `close()` only marks the queue; the final drain always happens on
/// the consumer side (the worker exit path, or the releaser after joining),
/// so the single-consumer contract of the FIFO is never violated — the
/// in-flight counter lets that drain wait out producers caught mid-push.
///
/// ### 中文
/// 供给 worker 线程的双通道请求队列。
///
/// FIFO 类请求走无界 MPSC 队列；可合并类（绘制、目标尺寸调整）各占一个
/// “只保留最新值”的信箱，这正是把积压限制在每类至多一个待处理实例的
/// 机制。内嵌的 waker 让 worker 在请求间歇 park，并用 pending 标志合并
/// 多余的 unpark。`close()` 只做标记；最终清空始终发生在消费侧
/// （worker 退出路径，或 join 之后的 release 调用方），从而不破坏 FIFO
/// 的单消费者约定——in-flight 计数用于等待恰好处于 push 途中的生产者。
pub(crate) struct RequestQueue {
    fifo: MpscQueue<Request>,
    draw_lane: Mailbox<Request>,
    resize_lane: Mailbox<Request>,
    closed: AtomicBool,
    in_flight: AtomicUsize,
    worker: OnceLock<Thread>,
    wake_pending: AtomicBool,
}

impl RequestQueue {
    pub(crate) fn new() -> Self {
        Self {
            fifo: MpscQueue::new(),
            draw_lane: Mailbox::default(),
            resize_lane: Mailbox::default(),
            closed: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            worker: OnceLock::new(),
            wake_pending: AtomicBool::new(false),
        }
    }

    /// ### English
    /// Records the worker thread for wakeups. Called once, on the worker.
    ///
    /// ### 中文
    /// 记录用于唤醒的 worker 线程。仅在 worker 线程上调用一次。
    pub(crate) fn register_worker(&self, thread: Thread) {
        let _ = self.worker.set(thread);
    }

    #[inline]
    pub(crate) fn worker_thread(&self) -> Option<&Thread> {
        self.worker.get()
    }

    /// ### English
    /// Non-blocking enqueue from any thread.
    ///
    /// The closed flag is re-checked after raising `in_flight` so a racing
    /// shutdown either sees this push completed or rejects it here; there is
    /// no window where an entry lands unobserved after the final drain.
    ///
    /// ### 中文
    /// 任意线程的非阻塞入队。
    ///
    /// 提升 `in_flight` 之后会复查 closed 标志，使与关闭并发的竞争要么
    /// 让本次 push 被最终清空观察到，要么在此处直接拒绝；不存在条目在
    /// 最终清空之后才落入队列而无人处理的窗口。
    pub(crate) fn offer(&self, request: Request) -> OfferOutcome {
        if self.closed.load(Ordering::Acquire) {
            request.fail("worker queue closed");
            return OfferOutcome::Rejected;
        }
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        if self.closed.load(Ordering::Acquire) {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            request.fail("worker queue closed");
            return OfferOutcome::Rejected;
        }

        let outcome = match request.kind() {
            kind if kind.is_coalescible() => {
                let lane = self.lane(kind);
                let node = match lane.pop_spare() {
                    Some(mut spare) => {
                        *spare = request;
                        spare
                    }
                    None => Box::new(request),
                };
                match lane.post(node) {
                    Some(displaced) => {
                        lane.push_spare(displaced);
                        OfferOutcome::Replaced
                    }
                    None => OfferOutcome::Enqueued,
                }
            }
            _ => {
                self.fifo.push(request);
                OfferOutcome::Enqueued
            }
        };

        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.wake();
        outcome
    }

    /// ### English
    /// Cancels a pending coalescible request. Returns whether one was
    /// pending. Non-coalescible kinds cannot be cancelled.
    ///
    /// ### 中文
    /// 取消一个待处理的可合并请求，返回此前是否存在。不可合并的类别
    /// 无法取消。
    pub(crate) fn remove_request(&self, kind: RequestKind) -> bool {
        if !kind.is_coalescible() {
            return false;
        }
        match self.lane(kind).take() {
            Some(request) => {
                drop(request);
                true
            }
            None => false,
        }
    }

    #[inline]
    fn lane(&self, kind: RequestKind) -> &Mailbox<Request> {
        match kind {
            RequestKind::Draw => &self.draw_lane,
            _ => &self.resize_lane,
        }
    }

    /// ### English
    /// Worker-side: next FIFO request, if any.
    ///
    /// ### 中文
    /// worker 侧：取下一个 FIFO 请求（若有）。
    #[inline]
    pub(crate) fn pop_fifo(&self) -> Option<Request> {
        self.fifo.pop()
    }

    /// ### English
    /// Worker-side: pending coalesced requests, resize before draw so a
    /// fresh size is in effect when the frame is blitted.
    ///
    /// ### 中文
    /// worker 侧：取出待处理的合并请求；先 resize 后 draw，使新的尺寸
    /// 在本帧绘制时已经生效。
    #[inline]
    pub(crate) fn take_resize(&self) -> Option<Request> {
        self.resize_lane.take().map(|boxed| *boxed)
    }

    #[inline]
    pub(crate) fn take_draw(&self) -> Option<Request> {
        self.draw_lane.take().map(|boxed| *boxed)
    }

    /// ### English
    /// Marks the queue closed. New offers are rejected; existing entries are
    /// handled by the consumer-side drain.
    ///
    /// ### 中文
    /// 标记队列关闭。新的 offer 会被拒绝；已有条目由消费侧清空处理。
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// ### English
    /// Consumer-side final drain: waits out producers caught mid-push, then
    /// fails every remaining entry. Must only run where the consumer role is
    /// held (worker exit path, or the releaser after the join).
    ///
    /// ### 中文
    /// 消费侧的最终清空：先等待恰在 push 途中的生产者完成，再将剩余条目
    /// 全部以失败完成。只能在持有消费者身份处运行（worker 退出路径，
    /// 或 join 之后的 release 调用方）。
    pub(crate) fn drain_failed(&self, reason: &str) {
        let mut backoff = Backoff::new();
        while self.in_flight.load(Ordering::Acquire) != 0 {
            backoff.snooze();
        }

        while let Some(request) = self.fifo.pop() {
            request.fail(reason);
        }
        if let Some(request) = self.resize_lane.take() {
            request.fail(reason);
        }
        if let Some(request) = self.draw_lane.take() {
            request.fail(reason);
        }
    }

    /// ### English
    /// Unparks the worker unless a wakeup is already pending.
    ///
    /// ### 中文
    /// 唤醒 worker；若已有待处理的唤醒则不再重复。
    #[inline]
    pub(crate) fn wake(&self) {
        if !self.wake_pending.swap(true, Ordering::AcqRel)
            && let Some(worker) = self.worker.get()
        {
            worker.unpark();
        }
    }

    /// ### English
    /// Worker-side: consumes the pending-wakeup flag. `true` means another
    /// pass over the lanes is owed before parking.
    ///
    /// ### 中文
    /// worker 侧：消费待唤醒标志。返回 `true` 表示在 park 之前还欠一轮
    /// 通道扫描。
    #[inline]
    pub(crate) fn take_wake_pending(&self) -> bool {
        self.wake_pending.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_offers_collapse_to_one() {
        let queue = RequestQueue::new();
        assert_eq!(queue.offer(Request::Draw), OfferOutcome::Enqueued);
        assert_eq!(queue.offer(Request::Draw), OfferOutcome::Replaced);
        assert_eq!(queue.offer(Request::Draw), OfferOutcome::Replaced);

        assert!(queue.take_draw().is_some());
        assert!(queue.take_draw().is_none());
    }

    #[test]
    fn resize_lane_keeps_the_latest_size() {
        use dpi::PhysicalSize;

        let queue = RequestQueue::new();
        queue.offer(Request::ResizeTargets {
            size: PhysicalSize::new(100, 100),
        });
        queue.offer(Request::ResizeTargets {
            size: PhysicalSize::new(640, 480),
        });

        match queue.take_resize() {
            Some(Request::ResizeTargets { size }) => {
                assert_eq!((size.width, size.height), (640, 480));
            }
            _ => panic!("expected the latest resize"),
        }
    }

    #[test]
    fn fifo_kinds_preserve_order() {
        let queue = RequestQueue::new();
        for token in [3u32, 1, 2] {
            queue.offer(Request::RemoveListener { token });
        }

        let mut seen = Vec::new();
        while let Some(request) = queue.pop_fifo() {
            if let Request::RemoveListener { token } = request {
                seen.push(token);
            }
        }
        assert_eq!(seen, [3, 1, 2]);
    }

    #[test]
    fn closed_queue_rejects_offers() {
        let queue = RequestQueue::new();
        queue.close();
        assert_eq!(queue.offer(Request::Draw), OfferOutcome::Rejected);
        assert!(queue.take_draw().is_none());
    }

    #[test]
    fn remove_request_cancels_a_pending_draw() {
        let queue = RequestQueue::new();
        queue.offer(Request::Draw);
        assert!(queue.remove_request(RequestKind::Draw));
        assert!(!queue.remove_request(RequestKind::Draw));
        assert!(queue.take_draw().is_none());
        // FIFO kinds are not cancellable.
        queue.offer(Request::RemoveListener { token: 9 });
        assert!(!queue.remove_request(RequestKind::RemoveListener));
    }

    #[test]
    fn drain_fails_pending_replies() {
        use std::sync::Arc;
        use std::thread;

        use dpi::PhysicalSize;

        use crate::lockfree::OneShot;
        use crate::source::{SharedSource, TextureKind};

        let queue = RequestQueue::new();
        let reply = Arc::new(OneShot::new(thread::current()));
        queue.offer(Request::AttachSource {
            shared: Arc::new(SharedSource::new()),
            size: PhysicalSize::new(16, 16),
            kind: TextureKind::Rgba2D,
            reply: Some(Arc::clone(&reply)),
        });

        queue.close();
        queue.drain_failed("stopping");
        assert!(matches!(reply.try_recv(), Some(Err(_))));
    }
}
