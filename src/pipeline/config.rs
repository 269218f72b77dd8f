use std::sync::Arc;

use crate::context::ContextConfig;
use crate::fanout::ScaleMode;
use crate::pipeline::PipelineObserver;

/// ### English
/// Host-supplied knobs for a [`FramePipeline`](crate::FramePipeline),
/// captured once at construction.
///
/// ### 中文
/// 宿主为 [`FramePipeline`](crate::FramePipeline) 提供的参数，构建时
/// 一次性捕获。
#[derive(Clone)]
pub struct PipelineConfig {
    /// ### English
    /// Creation parameters for the worker's rendering context; applied on
    /// every resume.
    ///
    /// ### 中文
    /// worker 渲染上下文的创建参数；每次 resume 时生效。
    pub context: ContextConfig,
    /// ### English
    /// Name given to the GPU worker thread, for logs and debuggers.
    ///
    /// ### 中文
    /// GPU worker 线程的名字，用于日志与调试器。
    pub worker_name: String,
    /// ### English
    /// Scale mode targets start with until the host picks another.
    ///
    /// ### 中文
    /// 目标的初始缩放模式，直到宿主另行选择。
    pub scale_mode: ScaleMode,
    /// ### English
    /// Receiver for failures that happen after the public call returned.
    ///
    /// ### 中文
    /// 接收公开调用返回之后才发生的失败。
    pub observer: Option<Arc<dyn PipelineObserver>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            context: ContextConfig::default(),
            worker_name: "frame-worker".to_string(),
            scale_mode: ScaleMode::default(),
            observer: None,
        }
    }
}
