//! ### English
//! Public error surface of the pipeline.
//!
//! GL-internal helpers report plain `Result<_, String>`; this module wraps
//! those strings into the typed errors the host sees.
//!
//! ### 中文
//! 管线对外的错误类型。
//!
//! GL 内部辅助函数返回普通的 `Result<_, String>`；本模块把这些字符串
//! 包装成宿主可见的带类型错误。

use std::error::Error;
use std::fmt;

/// ### English
/// Errors surfaced by the pipeline's public API and by the observer callback.
///
/// ### 中文
/// 管线公开 API 与 observer 回调上报的错误。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// ### English
    /// No usable GPU API version or a required capability is absent.
    /// Fatal to construction of whatever was being built; never retried.
    ///
    /// ### 中文
    /// 没有可用的 GPU API 版本，或缺少必需的能力。
    /// 对正在构建的对象是致命错误；不会自动重试。
    Unsupported(String),
    /// ### English
    /// The GPU device/context could not be created.
    ///
    /// ### 中文
    /// 无法创建 GPU device/context。
    ContextCreation(String),
    /// ### English
    /// A window or offscreen surface could not be created.
    ///
    /// ### 中文
    /// 无法创建 window 或离屏 surface。
    SurfaceCreation(String),
    /// ### English
    /// A consumer-supplied shader failed to compile or link. Drawing is
    /// suspended until `update_shader` succeeds or `reset_shader` restores
    /// the built-in program.
    ///
    /// ### 中文
    /// 消费者提供的 shader 编译或链接失败。绘制将暂停，直到
    /// `update_shader` 成功或 `reset_shader` 恢复内置程序。
    Shader(String),
    /// ### English
    /// The request needed a live worker, but none is running (not resumed,
    /// already paused, or already released).
    ///
    /// ### 中文
    /// 请求需要存活的 worker，但当前没有（尚未 resume、已 pause 或已 release）。
    WorkerUnavailable,
    /// ### English
    /// The worker thread did not finish initializing within the handshake
    /// window.
    ///
    /// ### 中文
    /// worker 线程未在握手时限内完成初始化。
    StartTimeout,
    /// ### English
    /// A synchronous request was dropped before the worker answered it
    /// (usually because the worker is shutting down).
    ///
    /// ### 中文
    /// 同步请求在 worker 应答之前被丢弃（通常因为 worker 正在关闭）。
    RequestDropped,
    /// ### English
    /// The underlying GPU context was invalidated by the host environment.
    /// Recover by treating it as `on_pause()` followed by `on_resume()`.
    ///
    /// ### 中文
    /// 底层 GPU 上下文被宿主环境置为无效。
    /// 恢复方式等价于先 `on_pause()` 再 `on_resume()`。
    ContextLost(String),
}

impl fmt::Display for PipelineError {
    /// ### English
    /// Formats the error for logs and host-facing messages.
    ///
    /// ### 中文
    /// 将错误格式化为日志与宿主可读的消息。
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported(detail) => write!(f, "unsupported capability: {detail}"),
            Self::ContextCreation(detail) => write!(f, "context creation failed: {detail}"),
            Self::SurfaceCreation(detail) => write!(f, "surface creation failed: {detail}"),
            Self::Shader(detail) => write!(f, "shader compile/link failed: {detail}"),
            Self::WorkerUnavailable => write!(f, "no live worker to execute the request"),
            Self::StartTimeout => write!(f, "worker initialization handshake timed out"),
            Self::RequestDropped => write!(f, "request dropped before the worker answered"),
            Self::ContextLost(detail) => write!(f, "GPU context lost: {detail}"),
        }
    }
}

impl Error for PipelineError {}
