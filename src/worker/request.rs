use std::sync::Arc;

use dpi::PhysicalSize;

use crate::context::NativeWindowHandle;
use crate::fanout::ScaleMode;
use crate::lockfree::OneShot;
use crate::source::{FrameListener, SharedSource, TextureKind};

/// ### English
/// One queued operation for the worker thread.
///
/// Anything that touches GPU state travels through this enum so that every
/// mutation runs on the thread owning the context. Variants carrying a
/// `reply` answer synchronous callers; the reply is completed with an error
/// if the worker shuts down before running them.
///
/// ### 中文
/// worker 线程的单个排队操作。
///
/// 一切涉及 GPU 状态的操作都经由该枚举传递，保证所有修改都在持有上下文
/// 的线程上执行。带 `reply` 的变体用于应答同步调用方；若 worker 在执行
/// 前就关闭，reply 会以错误完成。
pub(crate) enum Request {
    /// ### English
    /// Draw the latest frame into every registered target. Coalescible.
    ///
    /// ### 中文
    /// 将最新一帧绘制到所有已注册目标。可合并。
    Draw,
    /// ### English
    /// Resize every registered target's surface. Coalescible (latest wins).
    ///
    /// ### 中文
    /// 调整所有已注册目标 surface 的尺寸。可合并（保留最新值）。
    ResizeTargets { size: PhysicalSize<u32> },
    AddTarget {
        id: u32,
        window: NativeWindowHandle,
        recordable: bool,
    },
    RemoveTarget {
        id: u32,
    },
    SetScaleMode {
        mode: ScaleMode,
    },
    /// ### English
    /// Create the capture texture wired to `shared`; replies with its GL
    /// name.
    ///
    /// ### 中文
    /// 创建与 `shared` 相连的采集纹理；应答其 GL 名称。
    AttachSource {
        shared: Arc<SharedSource>,
        size: PhysicalSize<u32>,
        kind: TextureKind,
        reply: Option<Arc<OneShot<Result<u32, String>>>>,
    },
    /// ### English
    /// Drop the source backed by `source`. The identity check makes a
    /// late detach from an already replaced producer a no-op.
    ///
    /// ### 中文
    /// 移除由 `source` 支撑的帧源。身份比对让已被替换的生产者迟到的
    /// detach 成为 no-op。
    DetachSource {
        source: Arc<SharedSource>,
    },
    ResizeSource {
        size: PhysicalSize<u32>,
    },
    AddListener {
        token: u32,
        listener: Box<dyn FrameListener>,
    },
    RemoveListener {
        token: u32,
    },
    UpdateShader {
        vertex: String,
        fragment: String,
    },
    ResetShader,
}

/// ### English
/// Discriminant of a [`Request`], used for coalescing and cancellation.
///
/// ### 中文
/// [`Request`] 的判别值，用于合并与取消。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RequestKind {
    Draw,
    ResizeTargets,
    AddTarget,
    RemoveTarget,
    SetScaleMode,
    AttachSource,
    DetachSource,
    ResizeSource,
    AddListener,
    RemoveListener,
    UpdateShader,
    ResetShader,
}

impl RequestKind {
    /// ### English
    /// Whether a pending instance is replaced instead of appended.
    ///
    /// ### 中文
    /// 已有待处理实例时是否以替换代替追加。
    #[inline]
    pub(crate) fn is_coalescible(self) -> bool {
        matches!(self, Self::Draw | Self::ResizeTargets)
    }
}

impl Request {
    #[inline]
    pub(crate) fn kind(&self) -> RequestKind {
        match self {
            Self::Draw => RequestKind::Draw,
            Self::ResizeTargets { .. } => RequestKind::ResizeTargets,
            Self::AddTarget { .. } => RequestKind::AddTarget,
            Self::RemoveTarget { .. } => RequestKind::RemoveTarget,
            Self::SetScaleMode { .. } => RequestKind::SetScaleMode,
            Self::AttachSource { .. } => RequestKind::AttachSource,
            Self::DetachSource { .. } => RequestKind::DetachSource,
            Self::ResizeSource { .. } => RequestKind::ResizeSource,
            Self::AddListener { .. } => RequestKind::AddListener,
            Self::RemoveListener { .. } => RequestKind::RemoveListener,
            Self::UpdateShader { .. } => RequestKind::UpdateShader,
            Self::ResetShader => RequestKind::ResetShader,
        }
    }

    /// ### English
    /// Completes any reply slot with `reason` instead of running the
    /// request. Called for entries drained during shutdown or skipped after
    /// context loss.
    ///
    /// ### 中文
    /// 不执行请求，而是以 `reason` 完成其中的 reply。用于关闭期间被
    /// 清空、或上下文丢失后被跳过的条目。
    pub(crate) fn fail(self, reason: &str) {
        if let Self::AttachSource {
            reply: Some(reply), ..
        } = self
        {
            reply.send(Err(reason.to_owned()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_draw_and_resize_coalesce() {
        assert!(RequestKind::Draw.is_coalescible());
        assert!(RequestKind::ResizeTargets.is_coalescible());
        assert!(!RequestKind::AddTarget.is_coalescible());
        assert!(!RequestKind::SetScaleMode.is_coalescible());
        assert!(!RequestKind::AttachSource.is_coalescible());
    }

    #[test]
    fn fail_answers_the_reply_slot() {
        use std::thread;

        let reply = Arc::new(OneShot::new(thread::current()));
        let request = Request::AttachSource {
            shared: Arc::new(SharedSource::new()),
            size: PhysicalSize::new(640, 480),
            kind: TextureKind::Rgba2D,
            reply: Some(Arc::clone(&reply)),
        };
        request.fail("stopping");

        match reply.try_recv() {
            Some(Err(reason)) => assert_eq!(reason, "stopping"),
            other => panic!("expected an error reply, got {other:?}"),
        }
    }
}
