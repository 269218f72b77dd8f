//! ### English
//! Frame fan-out: one source texture, many output surfaces.
//!
//! The host-facing [`Distributor`] records targets and mirrors changes to
//! the GPU worker; the worker-side [`FanoutHandler`] owns the live
//! targets, the source, and the drawer, and services every queued
//! request. The draw path is: fold pending producer state into the
//! texture, tap the listeners, then draw and present each valid target.
//!
//! ### 中文
//! 帧分发：一个源纹理，多个输出 surface。
//!
//! 面向宿主的 [`Distributor`] 记录目标并把变更镜像给 GPU worker；worker
//! 侧的 [`FanoutHandler`] 持有活动目标、帧源与渲染器，处理每条排队请
//! 求。绘制路径为：先把生产者待处理状态折叠进纹理，再经监听器，最后
//! 逐个绘制并 present 有效目标。

use std::sync::Arc;

use dpi::PhysicalSize;
use log::{trace, warn};

use crate::context::RenderingContext;
use crate::drawer::Drawer;
use crate::error::PipelineError;
use crate::pipeline::EventSink;
use crate::source::{FrameListener, FrameSource, TextureKind};
use crate::worker::{GpuHandler, Request};

mod distributor;
mod ids;
mod scale;
mod target;

pub use distributor::Distributor;
pub use scale::ScaleMode;

use ids::U32HashMap;
use target::RenderTarget;

/// ### English
/// Worker-side state behind the request queue: the drawer, the attached
/// source, the registered targets, and the frame listeners. Lives and
/// dies with one worker; the distributor replays host state into the
/// next one.
///
/// ### 中文
/// 请求队列背后的 worker 侧状态：渲染器、已挂接的源、已注册目标与帧
/// 监听器。与单个 worker 同生共死；宿主状态由 distributor 重放给下一
/// 个 worker。
pub(crate) struct FanoutHandler {
    gl: Arc<glow::Context>,
    drawer: Drawer,
    events: Arc<EventSink>,
    source: Option<FrameSource>,
    targets: U32HashMap<RenderTarget>,
    listeners: Vec<(u32, Box<dyn FrameListener>)>,
    view_size: PhysicalSize<u32>,
    scale_mode: ScaleMode,
}

impl FanoutHandler {
    pub(crate) fn new(
        context: &mut RenderingContext,
        events: Arc<EventSink>,
    ) -> Result<Self, String> {
        let drawer = Drawer::new(context)?;
        Ok(Self {
            gl: context.gl(),
            drawer,
            events,
            source: None,
            targets: U32HashMap::default(),
            listeners: Vec::new(),
            view_size: PhysicalSize::new(0, 0),
            scale_mode: ScaleMode::default(),
        })
    }

    /// ### English
    /// One draw pass: update the texture, tap listeners on a fresh frame,
    /// then render every valid target. Invalid targets are skipped, not
    /// dropped.
    ///
    /// ### 中文
    /// 一次绘制：更新纹理，新帧先过监听器，再渲染所有有效目标。invalid
    /// 目标被跳过而非剔除。
    fn draw(&mut self, context: &mut RenderingContext) {
        let (info, texture, kind, tex_matrix, source_size) = {
            let Some(source) = self.source.as_mut() else {
                return;
            };
            let info = source.update_texture();
            (
                info,
                source.texture(),
                source.kind(),
                source.transform(),
                source.size(),
            )
        };

        if let Some(info) = &info {
            trace!(
                "frame {} ({}x{}) to {} targets",
                info.sequence,
                info.size.width,
                info.size.height,
                self.targets.len()
            );
            let gl = &self.gl;
            self.listeners
                .retain_mut(|(token, listener)| match listener.on_frame(gl, info) {
                    Ok(()) => true,
                    Err(err) => {
                        warn!("frame listener {token} failed and was removed: {err}");
                        false
                    }
                });
        }

        for target in self.targets.values_mut() {
            target.draw(
                context,
                &self.gl,
                &self.drawer,
                texture,
                kind,
                &tex_matrix,
                self.scale_mode,
                source_size,
            );
        }
    }
}

impl GpuHandler for FanoutHandler {
    fn handle(&mut self, context: &mut RenderingContext, request: Request) {
        match request {
            Request::Draw => self.draw(context),
            Request::ResizeTargets { size } => {
                self.view_size = size;
                for target in self.targets.values_mut() {
                    target.resize(context, size);
                }
            }
            Request::AddTarget {
                id,
                window,
                recordable,
            } => {
                if let Some(existing) = self.targets.get(&id)
                    && existing.matches(&window, recordable)
                {
                    return;
                }
                if let Some(stale) = self.targets.remove(&id) {
                    stale.destroy(context);
                }
                self.targets
                    .insert(id, RenderTarget::new(id, window, recordable, self.view_size));
            }
            Request::RemoveTarget { id } => {
                if let Some(target) = self.targets.remove(&id) {
                    target.destroy(context);
                }
            }
            Request::SetScaleMode { mode } => self.scale_mode = mode,
            Request::AttachSource {
                shared,
                size,
                kind,
                reply,
            } => {
                if kind == TextureKind::External
                    && let Err(err) = self.drawer.ensure_external_program()
                {
                    warn!("source attach failed: {err}");
                    if let Some(reply) = reply {
                        reply.send(Err(err));
                    }
                    return;
                }
                if let Some(old) = self.source.take() {
                    old.detach();
                }
                match FrameSource::attach(context, shared, size, kind) {
                    Ok(source) => {
                        let name = source.texture().0.get();
                        self.source = Some(source);
                        if let Some(reply) = reply {
                            reply.send(Ok(name));
                        }
                    }
                    Err(err) => {
                        warn!("source attach failed: {err}");
                        if let Some(reply) = reply {
                            reply.send(Err(err));
                        }
                    }
                }
            }
            Request::DetachSource { source } => {
                if let Some(current) = self.source.take() {
                    if current.is_backed_by(&source) {
                        current.detach();
                    } else {
                        self.source = Some(current);
                    }
                }
            }
            Request::ResizeSource { size } => {
                if let Some(source) = self.source.as_mut() {
                    source.resize(size);
                }
            }
            Request::AddListener { token, listener } => {
                self.listeners.push((token, listener));
            }
            Request::RemoveListener { token } => {
                self.listeners.retain(|(existing, _)| *existing != token);
            }
            Request::UpdateShader { vertex, fragment } => {
                if let Err(err) = self.drawer.update_shader(&vertex, &fragment) {
                    warn!("consumer shader rejected, 2D draws are suspended: {err}");
                    self.events.raise(&PipelineError::Shader(err));
                }
            }
            Request::ResetShader => {
                if let Err(err) = self.drawer.reset_shader() {
                    warn!("shader reset failed: {err}");
                    self.events.raise(&PipelineError::Shader(err));
                }
            }
        }
    }

    fn teardown(&mut self, context: &mut RenderingContext) {
        for (_, target) in self.targets.drain() {
            target.destroy(context);
        }
        if let Some(source) = self.source.take() {
            source.detach();
        }
        self.listeners.clear();
        self.drawer.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crossbeam_channel::{Sender, unbounded};
    use raw_window_handle::{RawWindowHandle, XlibWindowHandle};

    use super::*;
    use crate::context::NativeWindowHandle;
    use crate::worker::{LinkSlot, RequestKind, WorkerHandler, WorkerTask};

    fn window(id: u64) -> NativeWindowHandle {
        unsafe { NativeWindowHandle::new(RawWindowHandle::Xlib(XlibWindowHandle::new(id))) }
    }

    struct Recorder {
        kinds: Sender<RequestKind>,
    }

    impl WorkerHandler for Recorder {
        fn handle(&mut self, request: Request) {
            let _ = self.kinds.send(request.kind());
        }
    }

    #[test]
    fn replay_pushes_host_state_into_a_fresh_worker() {
        let (kinds_tx, kinds_rx) = unbounded();
        let task = WorkerTask::new("replay-test");
        task.start(move || Ok(Recorder { kinds: kinds_tx })).unwrap();

        let link = Arc::new(LinkSlot::new());
        let distributor = Distributor::new(Arc::clone(&link), ScaleMode::KeepAspect);
        // Registered while no worker is bound, like during a pause.
        distributor.add_surface(1, window(10), false);
        distributor.add_surface(2, window(20), true);
        distributor.resize(PhysicalSize::new(1920, 1080));

        link.bind(task.link());
        distributor.replay();

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(kinds_rx.recv_timeout(Duration::from_secs(2)).unwrap());
        }
        task.release();

        assert_eq!(
            seen.iter()
                .filter(|kind| **kind == RequestKind::AddTarget)
                .count(),
            2
        );
        assert!(seen.contains(&RequestKind::ResizeTargets));
        let mode = seen
            .iter()
            .position(|kind| *kind == RequestKind::SetScaleMode)
            .unwrap();
        let first_target = seen
            .iter()
            .position(|kind| *kind == RequestKind::AddTarget)
            .unwrap();
        assert!(mode < first_target, "scale mode must precede the targets");
    }
}
