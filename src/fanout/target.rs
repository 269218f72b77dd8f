use std::sync::Arc;

use dpi::PhysicalSize;
use euclid::default::Transform3D;
use glow::HasContext as _;
use log::{debug, warn};
use surfman::Surface;

use crate::context::{NativeWindowHandle, RenderingContext};
use crate::drawer::Drawer;
use crate::fanout::scale::{self, ScaleMode};
use crate::source::TextureKind;

/// ### English
/// One registered output window on the worker thread.
///
/// The surface is created lazily on first draw and recreated after a
/// resize. A target whose window went away is marked invalid and skipped
/// by subsequent draws, but stays registered; the next resize gives it a
/// fresh chance.
///
/// ### 中文
/// worker 线程上的一个已注册输出窗口。
///
/// surface 在首次绘制时惰性创建，resize 后重建。窗口已消失的目标被标
/// 记为 invalid 并被后续绘制跳过，但保持注册；下一次 resize 会再给它
/// 一次机会。
pub(crate) struct RenderTarget {
    id: u32,
    window: NativeWindowHandle,
    recordable: bool,
    size: PhysicalSize<u32>,
    surface: Option<Surface>,
    invalid: bool,
}

impl RenderTarget {
    pub(crate) fn new(
        id: u32,
        window: NativeWindowHandle,
        recordable: bool,
        size: PhysicalSize<u32>,
    ) -> Self {
        Self {
            id,
            window,
            recordable,
            size,
            surface: None,
            invalid: false,
        }
    }

    /// Same window and recordability as an incoming registration.
    pub(crate) fn matches(&self, window: &NativeWindowHandle, recordable: bool) -> bool {
        self.window == *window && self.recordable == recordable
    }

    /// ### English
    /// Draws the current source frame into this target and presents it.
    /// Every failure invalidates the target instead of propagating; the
    /// other targets still get their frame.
    ///
    /// ### 中文
    /// 把当前源帧画进该目标并 present。任何失败都只作废该目标而不向外
    /// 传播；其余目标照常出帧。
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn draw(
        &mut self,
        context: &mut RenderingContext,
        gl: &Arc<glow::Context>,
        drawer: &Drawer,
        texture: glow::NativeTexture,
        kind: TextureKind,
        tex_matrix: &Transform3D<f32>,
        mode: ScaleMode,
        source_size: PhysicalSize<u32>,
    ) {
        if self.invalid {
            return;
        }
        let surface = match self.surface.take() {
            Some(surface) => surface,
            None => match context.create_window_surface(&self.window, self.size, self.recordable) {
                Ok(surface) => surface,
                Err(err) => {
                    self.mark_invalid(&err);
                    return;
                }
            },
        };
        if let Err((err, surface)) = context.begin_target(surface) {
            self.surface = surface;
            self.mark_invalid(&err);
            return;
        }

        let layout = scale::layout(mode, self.size, source_size);
        let (x, y, width, height) = layout.viewport;
        unsafe {
            gl.disable(glow::SCISSOR_TEST);
            gl.clear_color(0.0, 0.0, 0.0, 1.0);
            gl.clear(glow::COLOR_BUFFER_BIT);
            gl.viewport(x, y, width, height);
        }
        let mvp = Transform3D::scale(layout.scale.0, layout.scale.1, 1.0);
        drawer.draw(texture, kind, &mvp, tex_matrix);

        let (surface, presented) = context.finish_target();
        self.surface = surface;
        if let Err(err) = presented {
            self.mark_invalid(&err);
        }
    }

    /// ### English
    /// Adopts a new size. The old surface is dropped so the next draw
    /// recreates it at the new dimensions; an invalid target is revived
    /// to retry.
    ///
    /// ### 中文
    /// 采用新尺寸。旧 surface 被丢弃，下次绘制按新尺寸重建；invalid 的
    /// 目标借此复活重试。
    pub(crate) fn resize(&mut self, context: &mut RenderingContext, size: PhysicalSize<u32>) {
        if size == self.size && !self.invalid {
            return;
        }
        self.size = size;
        self.invalid = false;
        if let Some(surface) = self.surface.take()
            && let Err(err) = context.destroy_surface(surface)
        {
            warn!("target {}: stale surface not destroyed: {err}", self.id);
        }
    }

    pub(crate) fn destroy(mut self, context: &mut RenderingContext) {
        if let Some(surface) = self.surface.take()
            && let Err(err) = context.destroy_surface(surface)
        {
            warn!("target {}: surface not destroyed: {err}", self.id);
        }
        debug!("target {} destroyed", self.id);
    }

    fn mark_invalid(&mut self, detail: &str) {
        if !self.invalid {
            warn!("target {} is invalid and will be skipped: {detail}", self.id);
            self.invalid = true;
        }
    }
}
