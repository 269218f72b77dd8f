use std::sync::Arc;

use log::warn;

use crate::context::{ContextConfig, RenderingContext};
use crate::error::PipelineError;
use crate::pipeline::EventSink;
use crate::worker::request::Request;
use crate::worker::task::{WorkerHandler, WorkerTask};

/// ### English
/// Request handler that runs with a guaranteed-current rendering context.
///
/// Implementors never make the context current themselves; the adapter
/// around them has already done it before `handle`, and once more before
/// `teardown` so final GPU deletions can be issued.
///
/// ### 中文
/// 在“上下文必定 current”前提下运行的请求处理器。
///
/// 实现者自己从不切换上下文：外层适配器在 `handle` 之前、以及
/// `teardown` 之前都已完成 make-current，使最终的 GPU 释放调用得以执行。
pub(crate) trait GpuHandler {
    fn handle(&mut self, context: &mut RenderingContext, request: Request);

    fn teardown(&mut self, context: &mut RenderingContext);
}

/// ### English
/// Binds a [`RenderingContext`]'s init/teardown to a [`WorkerTask`]'s
/// lifecycle.
///
/// The context is created on the worker thread while the task is
/// `Initializing`, made current on the default surface before every
/// dequeued request, and destroyed (after a final make-current) when the
/// task stops. Construction failures travel back through the start
/// handshake.
///
/// ### 中文
/// 将 [`RenderingContext`] 的创建/销毁绑定到 [`WorkerTask`] 的生命周期。
///
/// 上下文在任务 `Initializing` 阶段于 worker 线程上创建；每个出队请求
/// 执行前都会在默认 surface 上 make-current；任务停止时（再做一次
/// make-current 之后）销毁。构建失败会经启动握手返回给调用方。
pub(crate) struct GpuTask;

impl GpuTask {
    pub(crate) fn start<H, F>(
        task: &WorkerTask,
        config: ContextConfig,
        events: Arc<EventSink>,
        factory: F,
    ) -> Result<(), PipelineError>
    where
        H: GpuHandler + 'static,
        F: FnOnce(&mut RenderingContext) -> Result<H, PipelineError> + Send + 'static,
    {
        task.start(move || {
            let mut context = RenderingContext::create(None, &config)?;
            let handler = factory(&mut context)?;
            Ok(GpuAdapter {
                context,
                handler,
                events,
            })
        })
    }
}

struct GpuAdapter<H> {
    context: RenderingContext,
    handler: H,
    events: Arc<EventSink>,
}

impl<H: GpuHandler> WorkerHandler for GpuAdapter<H> {
    fn handle(&mut self, request: Request) {
        if let Err(detail) = self.context.make_default_current() {
            // Lost context: report, fail the request, and keep the loop
            // alive so the host can drive the pause/resume recovery.
            self.events.raise(&PipelineError::ContextLost(detail.clone()));
            request.fail(&detail);
            return;
        }
        self.handler.handle(&mut self.context, request);
    }

    fn teardown(&mut self) {
        if let Err(detail) = self.context.make_default_current() {
            warn!("tearing down without a current context: {detail}");
        }
        self.handler.teardown(&mut self.context);
        // Dropping the adapter on this thread releases the context itself.
    }
}
