//! ### English
//! Frame source: the capture texture and the producer plumbing around it.
//!
//! The producer half ([`ProducerHandle`], [`SharedSource`]) is thread-safe
//! and lock-free; the worker half ([`FrameSource`]) owns the GL texture
//! and runs only on the GPU thread. Frames move producer → texture lazily:
//! the producer raises a dirty flag, and the next draw folds whatever is
//! pending into the texture before sampling it.
//!
//! ### 中文
//! 帧源：采集纹理及其周边的生产者管路。
//!
//! 生产者半边（[`ProducerHandle`]、[`SharedSource`]）线程安全且无锁；
//! worker 半边（[`FrameSource`]）持有 GL 纹理，只在 GPU 线程上运行。
//! 帧从生产者到纹理是惰性的：生产者竖起 dirty 标志，下一次绘制先把待
//! 处理内容折叠进纹理再采样。

use std::sync::Arc;

use dpi::PhysicalSize;
use euclid::default::Transform3D;
use glow::HasContext as _;
use log::{debug, warn};

use crate::context::RenderingContext;

mod frame;
mod producer;
mod shared;

pub use frame::{FrameData, FrameInfo, FrameListener, TextureKind};
pub use producer::ProducerHandle;
pub(crate) use shared::SharedSource;

/// ### English
/// Worker-side owner of the capture texture.
///
/// Holds the GL texture the producer's frames land in and the latched
/// texture transform. Created and destroyed only on the GPU thread.
///
/// ### 中文
/// 采集纹理在 worker 侧的持有者。
///
/// 持有生产者帧落入的 GL 纹理与锁存的纹理变换。只在 GPU 线程上创建与
/// 销毁。
pub(crate) struct FrameSource {
    gl: Arc<glow::Context>,
    shared: Arc<SharedSource>,
    kind: TextureKind,
    texture: glow::NativeTexture,
    size: PhysicalSize<u32>,
    /// GLES 2 insists internal format == format, so RGBA there, RGBA8 elsewhere.
    internal_format: i32,
    transform: Transform3D<f32>,
}

impl FrameSource {
    /// ### English
    /// Creates the capture texture. External sources require the
    /// `GL_OES_EGL_image_external` extension and get no storage here; the
    /// platform decoder supplies the image. 2D sources get RGBA storage
    /// at `size`.
    ///
    /// ### 中文
    /// 创建采集纹理。外部源要求 `GL_OES_EGL_image_external` 扩展，且此
    /// 处不分配存储，图像由平台解码器提供。2D 源按 `size` 分配 RGBA 存
    /// 储。
    pub(crate) fn attach(
        context: &mut RenderingContext,
        shared: Arc<SharedSource>,
        size: PhysicalSize<u32>,
        kind: TextureKind,
    ) -> Result<Self, String> {
        if kind == TextureKind::External && !context.has_extension("GL_OES_EGL_image_external") {
            return Err("external textures are not supported by this driver".to_string());
        }
        let gl = context.gl();
        let internal_format = if context.is_gles() && !context.is_gles3() {
            glow::RGBA as i32
        } else {
            glow::RGBA8 as i32
        };
        let target = kind.gl_target();
        let texture = unsafe {
            let texture = gl
                .create_texture()
                .map_err(|err| format!("failed to create source texture: {err}"))?;
            gl.bind_texture(target, Some(texture));
            gl.tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
            if kind == TextureKind::Rgba2D {
                gl.tex_image_2d(
                    target,
                    0,
                    internal_format,
                    size.width.max(1) as i32,
                    size.height.max(1) as i32,
                    0,
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                    glow::PixelUnpackData::Slice(None),
                );
            }
            gl.bind_texture(target, None);
            texture
        };

        shared.set_texture(texture.0.get());
        shared.set_size(size);
        debug!(
            "frame source attached: {kind:?} {}x{}",
            size.width, size.height
        );

        Ok(Self {
            gl,
            shared,
            kind,
            texture,
            size,
            internal_format,
            transform: Transform3D::identity(),
        })
    }

    /// ### English
    /// Folds pending producer state into the texture. Returns a frame
    /// snapshot when a new frame reached the texture, `None` when the
    /// source was clean (or the payload was unusable). Runs right before
    /// sampling, on the GPU thread.
    ///
    /// ### 中文
    /// 把生产者的待处理状态折叠进纹理。有新帧抵达纹理时返回帧快照，源
    /// 干净（或负载不可用）时返回 `None`。在采样之前、GPU 线程上执行。
    pub(crate) fn update_texture(&mut self) -> Option<FrameInfo> {
        if !self.shared.take_dirty() {
            return None;
        }
        if let Some(frame) = self.shared.take_frame() {
            let applied = self.apply_frame(&frame);
            self.transform = frame.transform;
            self.shared.recycle_frame(frame);
            if !applied {
                return None;
            }
        }
        let sequence = self.shared.bump_sequence();
        Some(self.info(sequence))
    }

    fn apply_frame(&mut self, frame: &FrameData) -> bool {
        let size = PhysicalSize::new(frame.width, frame.height);
        match &frame.pixels {
            Some(pixels) => {
                if self.kind != TextureKind::Rgba2D {
                    warn!("pixel payload on an external source; treating as a frame signal");
                    return true;
                }
                let expected = frame.width as usize * frame.height as usize * 4;
                if pixels.len() != expected {
                    warn!(
                        "frame payload is {} bytes, expected {expected}; frame dropped",
                        pixels.len()
                    );
                    return false;
                }
                if size != self.size {
                    self.reallocate(size);
                }
                unsafe {
                    self.gl.bind_texture(glow::TEXTURE_2D, Some(self.texture));
                    self.gl.tex_sub_image_2d(
                        glow::TEXTURE_2D,
                        0,
                        0,
                        0,
                        size.width as i32,
                        size.height as i32,
                        glow::RGBA,
                        glow::UNSIGNED_BYTE,
                        glow::PixelUnpackData::Slice(Some(pixels)),
                    );
                    self.gl.bind_texture(glow::TEXTURE_2D, None);
                }
                true
            }
            None => {
                if size != self.size && size.width > 0 && size.height > 0 {
                    self.size = size;
                    self.shared.set_size(size);
                }
                true
            }
        }
    }

    /// ### English
    /// Explicit source resize. Same size is a no-op; 2D sources get fresh
    /// storage, external ones just record the dimensions.
    ///
    /// ### 中文
    /// 显式调整源尺寸。同尺寸为 no-op；2D 源重新分配存储，外部源仅记录
    /// 尺寸。
    pub(crate) fn resize(&mut self, size: PhysicalSize<u32>) {
        if size == self.size {
            return;
        }
        match self.kind {
            TextureKind::Rgba2D => self.reallocate(size),
            TextureKind::External => {
                self.size = size;
                self.shared.set_size(size);
            }
        }
    }

    fn reallocate(&mut self, size: PhysicalSize<u32>) {
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(self.texture));
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                self.internal_format,
                size.width.max(1) as i32,
                size.height.max(1) as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(None),
            );
            self.gl.bind_texture(glow::TEXTURE_2D, None);
        }
        self.size = size;
        self.shared.set_size(size);
    }

    pub(crate) fn texture(&self) -> glow::NativeTexture {
        self.texture
    }

    pub(crate) fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub(crate) fn kind(&self) -> TextureKind {
        self.kind
    }

    pub(crate) fn transform(&self) -> Transform3D<f32> {
        self.transform
    }

    /// Whether this source is backed by the given producer state.
    pub(crate) fn is_backed_by(&self, shared: &Arc<SharedSource>) -> bool {
        Arc::ptr_eq(&self.shared, shared)
    }

    fn info(&self, sequence: u64) -> FrameInfo {
        FrameInfo {
            texture: self.texture,
            kind: self.kind,
            size: self.size,
            sequence,
            transform: self.transform,
        }
    }

    /// ### English
    /// Deletes the texture and unpublishes it from the producer.
    ///
    /// ### 中文
    /// 删除纹理并从生产者侧撤下其名字。
    pub(crate) fn detach(self) {
        self.shared.set_texture(0);
        unsafe {
            self.gl.delete_texture(self.texture);
        }
        debug!("frame source detached");
    }
}
