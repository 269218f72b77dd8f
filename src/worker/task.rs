use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error};

use crate::error::PipelineError;
use crate::lockfree::OneShot;
use crate::worker::queue::{OfferOutcome, RequestQueue};
use crate::worker::request::{Request, RequestKind};
use crate::worker::state::{StateCell, WorkerState};

/// ### English
/// Bounded wait for the worker thread's init handshake.
///
/// ### 中文
/// 等待 worker 线程初始化握手的时限。
const START_HANDSHAKE: Duration = Duration::from_secs(10);

/// ### English
/// Per-request dispatch target, built on the worker thread by the factory
/// passed to [`WorkerTask::start`]. The handler never leaves that thread, so
/// it may own non-`Send` state such as a GPU context.
///
/// ### 中文
/// 请求的分发目标，由传给 [`WorkerTask::start`] 的工厂在 worker 线程上
/// 构建。handler 永不离开该线程，因此可以持有 GPU 上下文等非 `Send`
/// 状态。
pub(crate) trait WorkerHandler {
    fn handle(&mut self, request: Request);

    /// ### English
    /// Runs once on the worker thread after the final queue drain, before
    /// the thread exits.
    ///
    /// ### 中文
    /// 在队列最终清空之后、线程退出之前，于 worker 线程上执行一次。
    fn teardown(&mut self) {}
}

struct Shared {
    queue: RequestQueue,
    state: StateCell,
}

/// ### English
/// Single-thread cooperative executor driven by the coalescing request
/// queue.
///
/// Exactly one instance exists per rendering context. Producer threads only
/// ever `offer`; the dedicated thread pops, dispatches, and — on release —
/// drains outstanding entries through the teardown path. Release is
/// idempotent and safe from the worker thread itself (the self-release skips
/// the join).
///
/// ### 中文
/// 由合并请求队列驱动的单线程协作执行器。
///
/// 每个渲染上下文恰有一个实例。生产者线程只会 `offer`；专属线程负责
/// 出队、分发，并在 release 时经由 teardown 路径清空剩余条目。release
/// 幂等，且允许从 worker 线程自身调用（自我 release 会跳过 join）。
pub(crate) struct WorkerTask {
    name: String,
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// ### English
/// Cheap cloneable submit handle onto a worker's queue, held by the
/// distributor and producer handles. Outliving the worker is fine: offers
/// against a stopped worker report `Rejected`.
///
/// ### 中文
/// 指向 worker 队列的轻量可克隆提交句柄，由 distributor 与 producer
/// 句柄持有。句柄活得比 worker 久也没问题：向已停止的 worker 提交会
/// 返回 `Rejected`。
#[derive(Clone)]
pub(crate) struct WorkerLink {
    shared: Arc<Shared>,
}

impl WorkerLink {
    #[inline]
    pub(crate) fn offer(&self, request: Request) -> OfferOutcome {
        self.shared.queue.offer(request)
    }

    #[inline]
    pub(crate) fn state(&self) -> WorkerState {
        self.shared.state.load()
    }
}

/// ### English
/// Rebindable slot in front of a [`WorkerLink`].
///
/// Producer and surface handles live longer than any single worker: across
/// a pause/resume cycle the pipeline tears one worker down and starts a
/// fresh one. Those handles hold this slot instead of a link; the pipeline
/// repoints it at the live worker and clears it while paused. Offers
/// against an empty slot fail the request and report `Rejected`.
///
/// ### 中文
/// 位于 [`WorkerLink`] 之前的可重绑槽位。
///
/// producer 与 surface 句柄比任何单个 worker 活得都久：一次 pause/resume
/// 会拆掉旧 worker、起一个新的。这些句柄持有的不是 link 而是本槽位；
/// 管线把它指向存活的 worker，暂停期间清空。对空槽位提交会使请求失败
/// 并返回 `Rejected`。
pub(crate) struct LinkSlot {
    inner: Mutex<Option<WorkerLink>>,
}

impl LinkSlot {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    pub(crate) fn bind(&self, link: WorkerLink) {
        *self.lock() = Some(link);
    }

    pub(crate) fn clear(&self) {
        *self.lock() = None;
    }

    pub(crate) fn offer(&self, request: Request) -> OfferOutcome {
        match &*self.lock() {
            Some(link) => link.offer(request),
            None => {
                request.fail("no worker is running");
                OfferOutcome::Rejected
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<WorkerLink>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl WorkerTask {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared {
                queue: RequestQueue::new(),
                state: StateCell::new(),
            }),
            thread: Mutex::new(None),
        }
    }

    #[inline]
    pub(crate) fn link(&self) -> WorkerLink {
        WorkerLink {
            shared: Arc::clone(&self.shared),
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> WorkerState {
        self.shared.state.load()
    }

    #[inline]
    pub(crate) fn offer(&self, request: Request) -> OfferOutcome {
        self.shared.queue.offer(request)
    }

    /// ### English
    /// Cancels a pending coalescible request (draw, target resize).
    ///
    /// ### 中文
    /// 取消待处理的可合并请求（绘制、目标尺寸调整）。
    #[inline]
    pub(crate) fn remove_request(&self, kind: RequestKind) -> bool {
        self.shared.queue.remove_request(kind)
    }

    /// ### English
    /// Spawns the worker thread and waits, bounded, for the init handshake.
    ///
    /// The factory runs on the new thread; its error becomes this call's
    /// error and leaves the task `Stopped`. A task starts at most once.
    ///
    /// ### 中文
    /// 启动 worker 线程并在时限内等待初始化握手。
    ///
    /// 工厂在新线程上运行；其错误会成为本调用的返回错误，并使任务进入
    /// `Stopped`。任务最多启动一次。
    pub(crate) fn start<H, F>(&self, factory: F) -> Result<(), PipelineError>
    where
        H: WorkerHandler + 'static,
        F: FnOnce() -> Result<H, PipelineError> + Send + 'static,
    {
        if !self
            .shared
            .state
            .advance(WorkerState::Uninitialized, WorkerState::Initializing)
        {
            return Err(PipelineError::WorkerUnavailable);
        }

        let ready = Arc::new(OneShot::new(thread::current()));
        let worker_ready = Arc::clone(&ready);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || run_worker(shared, factory, worker_ready));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                error!("failed to spawn worker thread: {err}");
                self.shared.state.force(WorkerState::Stopped);
                self.shared.queue.close();
                return Err(PipelineError::WorkerUnavailable);
            }
        };
        *self.lock_thread() = Some(handle);

        match ready.recv_timeout(START_HANDSHAKE) {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => {
                self.join_worker();
                Err(err)
            }
            None => {
                self.shared
                    .state
                    .advance(WorkerState::Initializing, WorkerState::Stopping);
                self.shared
                    .state
                    .advance(WorkerState::Running, WorkerState::Stopping);
                self.shared.queue.close();
                self.shared.queue.wake();
                self.join_worker();
                Err(PipelineError::StartTimeout)
            }
        }
    }

    /// ### English
    /// Stops the worker: marks `Stopping`, closes the queue, wakes the
    /// parked dequeue, and joins the thread. Idempotent; when called from
    /// the worker thread itself the join is skipped and the loop unwinds on
    /// its own.
    ///
    /// ### 中文
    /// 停止 worker：标记 `Stopping`、关闭队列、唤醒阻塞的出队并 join
    /// 线程。幂等；若从 worker 线程自身调用则跳过 join，由循环自行退出。
    pub(crate) fn release(&self) {
        loop {
            match self.shared.state.load() {
                WorkerState::Uninitialized => {
                    if self
                        .shared
                        .state
                        .advance(WorkerState::Uninitialized, WorkerState::Stopped)
                    {
                        self.shared.queue.close();
                        self.shared.queue.drain_failed("worker never started");
                        return;
                    }
                }
                WorkerState::Initializing => {
                    if self
                        .shared
                        .state
                        .advance(WorkerState::Initializing, WorkerState::Stopping)
                    {
                        break;
                    }
                }
                WorkerState::Running => {
                    if self
                        .shared
                        .state
                        .advance(WorkerState::Running, WorkerState::Stopping)
                    {
                        break;
                    }
                }
                WorkerState::Stopping | WorkerState::Stopped => break,
            }
        }

        self.shared.queue.close();
        self.shared.queue.wake();

        if let Some(worker) = self.shared.queue.worker_thread()
            && worker.id() == thread::current().id()
        {
            debug!("release from the worker thread itself; skipping the join");
            return;
        }
        self.join_worker();
    }

    fn join_worker(&self) {
        let handle = self.lock_thread().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn lock_thread(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.thread.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for WorkerTask {
    fn drop(&mut self) {
        self.release();
    }
}

/// ### English
/// Worker thread body: build the handler, answer the handshake, run the
/// dequeue loop, then drain and tear down.
///
/// ### 中文
/// worker 线程主体：构建 handler、应答握手、运行出队循环，最后清空
/// 队列并执行 teardown。
fn run_worker<H, F>(shared: Arc<Shared>, factory: F, ready: Arc<OneShot<Result<(), PipelineError>>>)
where
    H: WorkerHandler + 'static,
    F: FnOnce() -> Result<H, PipelineError> + Send + 'static,
{
    shared.queue.register_worker(thread::current());

    let mut handler = match factory() {
        Ok(handler) => handler,
        Err(err) => {
            error!("worker init failed: {err}");
            ready.send(Err(err));
            shared.queue.close();
            shared.queue.drain_failed("worker failed to initialize");
            shared.state.force(WorkerState::Stopped);
            return;
        }
    };

    ready.send(Ok(()));
    if shared
        .state
        .advance(WorkerState::Initializing, WorkerState::Running)
    {
        dequeue_loop(&shared, &mut handler);
    }

    shared.queue.close();
    shared.queue.drain_failed("worker stopping");
    handler.teardown();
    shared.state.force(WorkerState::Stopped);
    debug!("worker thread exiting");
}

/// ### English
/// FIFO entries first, then the coalesced lanes (resize before draw), then
/// park unless a wakeup arrived meanwhile. Stopping short-circuits at every
/// boundary so release never waits on a full pass.
///
/// ### 中文
/// 先处理 FIFO 条目，再处理合并通道（先 resize 后 draw），若期间没有
/// 新唤醒则 park。每个边界都检查 Stopping，使 release 无需等待完整一轮。
fn dequeue_loop<H: WorkerHandler>(shared: &Shared, handler: &mut H) {
    loop {
        loop {
            if shared.state.load() == WorkerState::Stopping {
                return;
            }
            match shared.queue.pop_fifo() {
                Some(request) => handler.handle(request),
                None => break,
            }
        }

        if let Some(request) = shared.queue.take_resize() {
            handler.handle(request);
        }
        if let Some(request) = shared.queue.take_draw() {
            handler.handle(request);
        }

        if shared.queue.take_wake_pending() {
            continue;
        }
        if shared.state.load() == WorkerState::Stopping {
            return;
        }
        thread::park();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crossbeam_channel::{Receiver, Sender, bounded, unbounded};

    use super::*;

    /// Token the test handler reports for an executed draw.
    const DRAW_TOKEN: u32 = 999;
    /// RemoveListener token that makes the handler release its own task.
    const RELEASE_TOKEN: u32 = 7_000;

    #[derive(Default)]
    struct TestHandler {
        tokens: Option<Sender<u32>>,
        draws: Option<Arc<AtomicUsize>>,
        draw_gate: Option<(Sender<()>, Receiver<()>)>,
        teardown_tx: Option<Sender<()>>,
        release_target: Option<Arc<WorkerTask>>,
    }

    impl WorkerHandler for TestHandler {
        fn handle(&mut self, request: Request) {
            match request {
                Request::Draw => {
                    if let Some(draws) = &self.draws {
                        draws.fetch_add(1, Ordering::SeqCst);
                    }
                    if let Some((entered, resume)) = &self.draw_gate {
                        let _ = entered.send(());
                        let _ = resume.recv_timeout(Duration::from_secs(2));
                    }
                    if let Some(tokens) = &self.tokens {
                        let _ = tokens.send(DRAW_TOKEN);
                    }
                }
                Request::RemoveListener { token } => {
                    if token == RELEASE_TOKEN
                        && let Some(task) = &self.release_target
                    {
                        task.release();
                    }
                    if let Some(tokens) = &self.tokens {
                        let _ = tokens.send(token);
                    }
                }
                _ => {}
            }
        }

        fn teardown(&mut self) {
            if let Some(tx) = &self.teardown_tx {
                let _ = tx.send(());
            }
        }
    }

    #[test]
    fn release_is_idempotent_and_runs_teardown() {
        let (teardown_tx, teardown_rx) = bounded(1);
        let task = WorkerTask::new("test-worker");
        task.start(move || {
            Ok(TestHandler {
                teardown_tx: Some(teardown_tx),
                ..TestHandler::default()
            })
        })
        .unwrap();
        assert_eq!(task.state(), WorkerState::Running);

        task.release();
        assert_eq!(task.state(), WorkerState::Stopped);
        teardown_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("teardown hook must run");

        // Second and third calls are no-ops.
        task.release();
        task.release();
        assert_eq!(task.state(), WorkerState::Stopped);
        assert_eq!(task.offer(Request::Draw), OfferOutcome::Rejected);
    }

    #[test]
    fn start_twice_is_rejected() {
        let task = WorkerTask::new("test-worker");
        task.start(|| Ok(TestHandler::default())).unwrap();
        assert!(matches!(
            task.start(|| Ok(TestHandler::default())),
            Err(PipelineError::WorkerUnavailable)
        ));
        task.release();
    }

    #[test]
    fn init_failure_surfaces_and_stops() {
        let task = WorkerTask::new("test-worker");
        let result = task.start(|| -> Result<TestHandler, PipelineError> {
            Err(PipelineError::Unsupported("no usable GL version".into()))
        });
        assert!(matches!(result, Err(PipelineError::Unsupported(_))));
        assert_eq!(task.state(), WorkerState::Stopped);
        assert_eq!(task.offer(Request::Draw), OfferOutcome::Rejected);
    }

    #[test]
    fn at_most_one_draw_is_pending() {
        let (entered_tx, entered_rx) = unbounded();
        let (resume_tx, resume_rx) = unbounded();
        let draws = Arc::new(AtomicUsize::new(0));
        let handler_draws = Arc::clone(&draws);

        let task = WorkerTask::new("test-worker");
        task.start(move || {
            Ok(TestHandler {
                draws: Some(handler_draws),
                draw_gate: Some((entered_tx, resume_rx)),
                ..TestHandler::default()
            })
        })
        .unwrap();

        assert_eq!(task.offer(Request::Draw), OfferOutcome::Enqueued);
        entered_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("worker must enter the first draw");

        // The worker is blocked inside draw #1; the lane is empty again, so
        // the first re-offer enqueues and every further one replaces it.
        assert_eq!(task.offer(Request::Draw), OfferOutcome::Enqueued);
        assert_eq!(task.offer(Request::Draw), OfferOutcome::Replaced);
        assert_eq!(task.offer(Request::Draw), OfferOutcome::Replaced);
        assert_eq!(task.offer(Request::Draw), OfferOutcome::Replaced);

        resume_tx.send(()).unwrap();
        entered_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("worker must enter the coalesced draw");
        resume_tx.send(()).unwrap();

        task.release();
        assert_eq!(draws.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn fifo_runs_before_the_coalesced_draw() {
        let (tokens_tx, tokens_rx) = unbounded();
        let task = WorkerTask::new("test-worker");

        // Queued before the thread exists: order must still hold.
        task.offer(Request::Draw);
        task.offer(Request::RemoveListener { token: 1 });
        task.offer(Request::RemoveListener { token: 2 });

        task.start(move || {
            Ok(TestHandler {
                tokens: Some(tokens_tx),
                ..TestHandler::default()
            })
        })
        .unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(tokens_rx.recv_timeout(Duration::from_secs(2)).unwrap());
        }
        assert_eq!(seen, [1, 2, DRAW_TOKEN]);
        task.release();
    }

    #[test]
    fn remove_request_cancels_a_queued_draw() {
        let (tokens_tx, tokens_rx) = unbounded();
        let draws = Arc::new(AtomicUsize::new(0));
        let handler_draws = Arc::clone(&draws);

        let task = WorkerTask::new("test-worker");
        task.offer(Request::Draw);
        assert!(task.remove_request(RequestKind::Draw));
        task.offer(Request::RemoveListener { token: 5 });

        task.start(move || {
            Ok(TestHandler {
                tokens: Some(tokens_tx),
                draws: Some(handler_draws),
                ..TestHandler::default()
            })
        })
        .unwrap();

        assert_eq!(
            tokens_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            5,
            "the marker request must still run"
        );
        task.release();
        assert_eq!(draws.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn release_from_the_worker_thread_does_not_deadlock() {
        let (tokens_tx, tokens_rx) = unbounded();
        let task = Arc::new(WorkerTask::new("test-worker"));
        let handler_task = Arc::clone(&task);

        task.start(move || {
            Ok(TestHandler {
                tokens: Some(tokens_tx),
                release_target: Some(handler_task),
                ..TestHandler::default()
            })
        })
        .unwrap();

        task.offer(Request::RemoveListener {
            token: RELEASE_TOKEN,
        });
        assert_eq!(
            tokens_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            RELEASE_TOKEN
        );

        // The outer release joins the thread the self-release left running.
        task.release();
        assert_eq!(task.state(), WorkerState::Stopped);
    }

    #[test]
    fn link_slot_drops_offers_while_unbound() {
        let slot = LinkSlot::new();
        assert_eq!(slot.offer(Request::Draw), OfferOutcome::Rejected);

        let task = WorkerTask::new("test-worker");
        slot.bind(task.link());
        assert_eq!(slot.offer(Request::Draw), OfferOutcome::Enqueued);

        slot.clear();
        assert_eq!(slot.offer(Request::Draw), OfferOutcome::Rejected);
    }
}
