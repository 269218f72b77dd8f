//! ### English
//! Host-facing assembly of the whole pipeline.
//!
//! A [`FramePipeline`] ties one GPU worker generation at a time to the
//! long-lived pieces around it: the [`Distributor`] registry, the
//! producer attachment, and the listener tokens. `on_resume` starts a
//! worker and replays the retained state into it; `on_pause` stops the
//! worker and keeps the state, so the host's lifecycle can cycle the GPU
//! side freely.
//!
//! ### 中文
//! 整条管线面向宿主的组装层。
//!
//! [`FramePipeline`] 把同一时刻至多一个 GPU worker 世代，与更长寿的部
//! 分绑在一起：[`Distributor`] 注册表、生产者挂接与监听器 token。
//! `on_resume` 启动 worker 并把保留的状态重放进去；`on_pause` 停止
//! worker 但保留状态，宿主的生命周期可以自由地循环 GPU 侧。

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::Duration;

use dpi::PhysicalSize;
use log::debug;

use crate::context::ContextConfig;
use crate::error::PipelineError;
use crate::fanout::{Distributor, FanoutHandler};
use crate::lockfree::OneShot;
use crate::source::{FrameListener, ProducerHandle, SharedSource, TextureKind};
use crate::worker::{GpuTask, LinkSlot, OfferOutcome, Request, RequestKind, WorkerTask};

mod config;
mod observer;

pub use config::PipelineConfig;
pub use observer::PipelineObserver;
pub(crate) use observer::EventSink;

/// ### English
/// Bounded wait for the worker to answer a synchronous attach.
///
/// ### 中文
/// 等待 worker 应答同步挂接的时限。
const ATTACH_REPLY: Duration = Duration::from_secs(5);

/// ### English
/// What survives of a producer attachment across a pause: enough to
/// re-create the capture texture, but only while the producer handle is
/// still alive.
///
/// ### 中文
/// 生产者挂接在暂停中留存的部分：足以重建采集纹理，但仅当生产者句柄
/// 仍然存活。
struct ProducerRecord {
    shared: Weak<SharedSource>,
    kind: TextureKind,
}

/// ### English
/// The frame fan-out pipeline.
///
/// Construction is cheap and GPU-free; nothing touches the GPU until
/// [`on_resume`](Self::on_resume). Targets registered through the
/// [`Distributor`] and an attached producer survive pause/resume cycles;
/// frame listeners live for one worker generation and are re-added by
/// the host after a resume. Dropping the pipeline pauses it.
///
/// ### 中文
/// 帧分发管线。
///
/// 构建廉价且不触碰 GPU；在 [`on_resume`](Self::on_resume) 之前不会有
/// 任何 GPU 操作。经 [`Distributor`] 注册的目标与已挂接的生产者可跨越
/// pause/resume 周期；帧监听器只存活一个 worker 世代，resume 之后由宿
/// 主重新添加。drop 管线等价于暂停它。
pub struct FramePipeline {
    context_config: ContextConfig,
    worker_name: String,
    observer: Option<Arc<dyn PipelineObserver>>,
    link: Arc<LinkSlot>,
    distributor: Arc<Distributor>,
    worker: Mutex<Option<WorkerTask>>,
    producer: Mutex<Option<ProducerRecord>>,
    listener_tokens: AtomicU32,
}

impl FramePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let link = Arc::new(LinkSlot::new());
        let distributor = Arc::new(Distributor::new(Arc::clone(&link), config.scale_mode));
        Self {
            context_config: config.context,
            worker_name: config.worker_name,
            observer: config.observer,
            link,
            distributor,
            worker: Mutex::new(None),
            producer: Mutex::new(None),
            listener_tokens: AtomicU32::new(1),
        }
    }

    /// ### English
    /// The registry consumers add their output surfaces to.
    ///
    /// ### 中文
    /// 消费者注册输出 surface 的注册表。
    pub fn distributor(&self) -> Arc<Distributor> {
        Arc::clone(&self.distributor)
    }

    /// Whether a worker generation is currently up.
    pub fn is_running(&self) -> bool {
        self.lock_worker().is_some()
    }

    /// ### English
    /// Starts a GPU worker and replays the retained state into it: scale
    /// mode, view size, registered targets, and the producer attachment
    /// (while its handle is alive). Idempotent while a worker is running.
    ///
    /// Fails when no usable GL version exists, the context cannot be
    /// built, or the worker thread does not come up; the pipeline stays
    /// paused in that case and the call can be retried.
    ///
    /// ### 中文
    /// 启动 GPU worker 并把保留的状态重放进去：缩放模式、视图尺寸、已注
    /// 册目标、以及（句柄仍存活的）生产者挂接。worker 运行期间幂等。
    ///
    /// 没有可用 GL 版本、上下文无法构建或 worker 线程起不来时失败；此
    /// 时管线保持暂停，可以重试。
    pub fn on_resume(&self) -> Result<(), PipelineError> {
        let mut worker = self.lock_worker();
        if worker.is_some() {
            return Ok(());
        }
        let task = WorkerTask::new(self.worker_name.clone());
        let events = Arc::new(EventSink::new(self.observer.clone()));
        let handler_events = Arc::clone(&events);
        GpuTask::start(
            &task,
            self.context_config.clone(),
            events,
            move |context| {
                FanoutHandler::new(context, handler_events).map_err(PipelineError::ContextCreation)
            },
        )?;
        self.link.bind(task.link());
        *worker = Some(task);
        drop(worker);

        self.distributor.replay();
        self.replay_producer();
        debug!("pipeline resumed");
        Ok(())
    }

    /// ### English
    /// Stops the worker and releases every GPU resource: targets, the
    /// capture texture, programs, the context. Registered ids, the view
    /// size, the scale mode, and the producer attachment stay recorded
    /// for the next resume. Idempotent.
    ///
    /// ### 中文
    /// 停止 worker 并释放全部 GPU 资源：目标、采集纹理、程序、上下文。
    /// 已注册的 id、视图尺寸、缩放模式与生产者挂接仍保留，供下次
    /// resume 使用。幂等。
    pub fn on_pause(&self) {
        let mut worker = self.lock_worker();
        // Unbound first, so producers see Rejected instead of feeding a
        // queue that is about to drain.
        self.link.clear();
        if let Some(task) = worker.take() {
            task.remove_request(RequestKind::Draw);
            task.release();
            debug!("pipeline paused");
        }
    }

    /// ### English
    /// Attaches a frame producer: the worker creates the capture texture
    /// and the returned handle is the producer's end of it. Synchronous;
    /// requires a running worker. An earlier attachment is replaced.
    ///
    /// ### 中文
    /// 挂接帧生产者：worker 创建采集纹理，返回的句柄即生产者端。同步调
    /// 用；要求 worker 正在运行。先前的挂接会被替换。
    pub fn attach_producer(
        &self,
        size: PhysicalSize<u32>,
        kind: TextureKind,
    ) -> Result<ProducerHandle, PipelineError> {
        let shared = Arc::new(SharedSource::new());
        shared.set_size(size);
        let reply = Arc::new(OneShot::new(thread::current()));
        let outcome = self.link.offer(Request::AttachSource {
            shared: Arc::clone(&shared),
            size,
            kind,
            reply: Some(Arc::clone(&reply)),
        });
        if outcome == OfferOutcome::Rejected {
            return Err(PipelineError::WorkerUnavailable);
        }
        match reply.recv_timeout(ATTACH_REPLY) {
            Some(Ok(_texture)) => {
                *self.lock_producer() = Some(ProducerRecord {
                    shared: Arc::downgrade(&shared),
                    kind,
                });
                Ok(ProducerHandle::new(shared, Arc::clone(&self.link)))
            }
            Some(Err(detail)) => Err(PipelineError::Unsupported(detail)),
            None => Err(PipelineError::RequestDropped),
        }
    }

    /// ### English
    /// Registers a secondary frame consumer and returns its removal
    /// token. Listeners run on the worker thread after each texture
    /// update; they last one worker generation, so re-add after a
    /// resume.
    ///
    /// ### 中文
    /// 注册次级帧消费者并返回用于移除的 token。监听器在每次纹理更新后
    /// 于 worker 线程上运行；只存活一个 worker 世代，resume 后需重新添
    /// 加。
    pub fn add_listener(&self, listener: Box<dyn FrameListener>) -> Result<u32, PipelineError> {
        let token = self.listener_tokens.fetch_add(1, Ordering::Relaxed);
        match self.link.offer(Request::AddListener { token, listener }) {
            OfferOutcome::Rejected => Err(PipelineError::WorkerUnavailable),
            _ => Ok(token),
        }
    }

    pub fn remove_listener(&self, token: u32) {
        let _ = self.link.offer(Request::RemoveListener { token });
    }

    /// ### English
    /// Swaps the 2D drawing program for consumer-supplied sources. The
    /// swap runs on the worker thread; a compile or link failure
    /// suspends 2D drawing and reaches the observer as
    /// [`PipelineError::Shader`].
    ///
    /// ### 中文
    /// 把 2D 绘制程序换成消费者提供的源码。替换在 worker 线程上执行；
    /// 编译或链接失败会暂停 2D 绘制，并以 [`PipelineError::Shader`] 送
    /// 达 observer。
    pub fn update_shader(&self, vertex: impl Into<String>, fragment: impl Into<String>) {
        let _ = self.link.offer(Request::UpdateShader {
            vertex: vertex.into(),
            fragment: fragment.into(),
        });
    }

    /// Restores the built-in 2D drawing program.
    pub fn reset_shader(&self) {
        let _ = self.link.offer(Request::ResetShader);
    }

    fn replay_producer(&self) {
        let mut record = self.lock_producer();
        let upgraded = record
            .as_ref()
            .map(|producer| (producer.shared.upgrade(), producer.kind));
        match upgraded {
            Some((Some(shared), kind)) => {
                let size = shared.size();
                let _ = self.link.offer(Request::AttachSource {
                    shared,
                    size,
                    kind,
                    reply: None,
                });
            }
            // The producer handle died during the pause.
            Some((None, _)) => *record = None,
            None => {}
        }
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<WorkerTask>> {
        match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_producer(&self) -> MutexGuard<'_, Option<ProducerRecord>> {
        match self.producer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        self.on_pause();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FrameInfo;

    struct NoopListener;

    impl FrameListener for NoopListener {
        fn on_frame(&mut self, _gl: &glow::Context, _frame: &FrameInfo) -> Result<(), String> {
            Ok(())
        }
    }

    #[test]
    fn paused_pipeline_rejects_synchronous_calls() {
        let pipeline = FramePipeline::new(PipelineConfig::default());
        assert!(!pipeline.is_running());

        assert!(matches!(
            pipeline.attach_producer(PhysicalSize::new(640, 480), TextureKind::Rgba2D),
            Err(PipelineError::WorkerUnavailable)
        ));
        assert!(matches!(
            pipeline.add_listener(Box::new(NoopListener)),
            Err(PipelineError::WorkerUnavailable)
        ));
    }

    #[test]
    fn pause_without_resume_is_a_no_op() {
        let pipeline = FramePipeline::new(PipelineConfig::default());
        pipeline.on_pause();
        pipeline.on_pause();
        assert!(!pipeline.is_running());
        // Fire-and-forget calls degrade silently while paused.
        pipeline.update_shader("void main() {}", "void main() {}");
        pipeline.reset_shader();
        pipeline.remove_listener(3);
    }

    #[test]
    fn rejected_attach_leaves_no_producer_record() {
        let pipeline = FramePipeline::new(PipelineConfig::default());
        let _ = pipeline.attach_producer(PhysicalSize::new(640, 480), TextureKind::Rgba2D);
        // A failed attach must not become a phantom re-attach on resume.
        assert!(pipeline.lock_producer().is_none());
    }
}
