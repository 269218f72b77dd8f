use dpi::PhysicalSize;
use euclid::default::Transform3D;

/// ### English
/// How the source texture is backed and sampled.
///
/// ### 中文
/// 源纹理的存储与采样方式。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureKind {
    /// ### English
    /// Ordinary `TEXTURE_2D` storage; frames arrive as RGBA bytes.
    ///
    /// ### 中文
    /// 普通 `TEXTURE_2D` 存储；帧以 RGBA 字节送达。
    Rgba2D,
    /// ### English
    /// `GL_OES_EGL_image_external` texture; a platform decoder writes the
    /// image behind it and only a new-frame signal crosses into the
    /// pipeline. GLES only.
    ///
    /// ### 中文
    /// `GL_OES_EGL_image_external` 纹理；平台解码器在其背后写入图像，
    /// 进入管线的只有新帧信号。仅限 GLES。
    External,
}

/// Sampler target for external images; not in the core GL registry glow exposes.
pub(crate) const TEXTURE_EXTERNAL_OES: u32 = 0x8D65;

impl TextureKind {
    pub(crate) fn gl_target(self) -> u32 {
        match self {
            TextureKind::Rgba2D => glow::TEXTURE_2D,
            TextureKind::External => TEXTURE_EXTERNAL_OES,
        }
    }
}

/// ### English
/// One produced frame, as handed over by the producer thread.
///
/// `pixels: None` means the image lives behind an external texture and
/// this frame only carries dimensions and the texture transform.
///
/// ### 中文
/// 生产者线程交来的一帧。
///
/// `pixels: None` 表示图像在外部纹理背后，本帧只携带尺寸与纹理变换。
#[derive(Debug)]
pub struct FrameData {
    pub width: u32,
    pub height: u32,
    pub pixels: Option<Vec<u8>>,
    /// ### English
    /// Texture-coordinate transform for this frame (decoder crop/rotate);
    /// identity when the producer has none.
    ///
    /// ### 中文
    /// 本帧的纹理坐标变换（解码器裁剪/旋转）；生产者没有时为单位阵。
    pub transform: Transform3D<f32>,
}

impl FrameData {
    /// ### English
    /// A CPU frame of tightly packed RGBA bytes.
    ///
    /// ### 中文
    /// 一帧紧密排列的 RGBA 字节。
    pub fn rgba(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels: Some(pixels),
            transform: Transform3D::identity(),
        }
    }

    /// ### English
    /// A frame already sitting behind the external texture; only metadata
    /// crosses over.
    ///
    /// ### 中文
    /// 已位于外部纹理背后的一帧；只传递元数据。
    pub fn external(width: u32, height: u32, transform: Transform3D<f32>) -> Self {
        Self {
            width,
            height,
            pixels: None,
            transform,
        }
    }
}

/// ### English
/// Snapshot handed to frame listeners after the source texture was
/// updated; valid while the worker's context is current.
///
/// ### 中文
/// 源纹理更新后交给帧监听器的快照；在 worker 上下文 current 期间有效。
#[derive(Clone, Copy, Debug)]
pub struct FrameInfo {
    pub texture: glow::NativeTexture,
    pub kind: TextureKind,
    pub size: PhysicalSize<u32>,
    /// Monotonic count of frames that reached the texture.
    pub sequence: u64,
    pub transform: Transform3D<f32>,
}

/// ### English
/// Secondary frame consumer, e.g. an encoder feed or an analysis tap.
///
/// Called on the GPU worker thread, after the source texture holds the
/// new frame and before it is fanned out to the targets; the worker's
/// context is current, so GL calls against `gl` are allowed. An `Err`
/// removes this listener and nothing else.
///
/// ### 中文
/// 次级帧消费者，例如编码器馈送或分析分支。
///
/// 在 GPU worker 线程上调用，时机是源纹理已持有新帧、尚未分发到各目标
/// 之间；此时 worker 上下文为 current，可对 `gl` 发 GL 调用。返回
/// `Err` 只会移除该监听器，不影响其他任何东西。
pub trait FrameListener: Send {
    fn on_frame(&mut self, gl: &glow::Context, frame: &FrameInfo) -> Result<(), String>;
}
