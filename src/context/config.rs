use dpi::PhysicalSize;

/// ### English
/// Creation-time knobs for a `RenderingContext`.
///
/// The config is captured by the host thread and shipped into the GPU
/// worker's init closure, so it stays plain data.
///
/// ### 中文
/// `RenderingContext` 的创建期参数。
///
/// 配置在宿主线程捕获后被送进 GPU worker 的初始化闭包，因此保持为
/// 纯数据。
#[derive(Clone, Debug)]
pub struct ContextConfig {
    /// ### English
    /// Preferred GL version. `None` starts the fallback ladder at the
    /// highest version the pipeline targets for the platform's API
    /// (3.3 desktop / 3.0 GLES); `Some` caps the ladder at the hint and
    /// walks down from there.
    ///
    /// ### 中文
    /// 期望的 GL 版本。`None` 时回退阶梯从平台 API 的最高目标版本开始
    /// （桌面 3.3 / GLES 3.0）；`Some` 时阶梯以该提示为上限逐级下探。
    pub version_hint: Option<(u8, u8)>,
    /// ### English
    /// Request a depth buffer on every surface of this context.
    ///
    /// ### 中文
    /// 为该上下文的每个 surface 申请深度缓冲。
    pub depth: bool,
    /// ### English
    /// Stencil bits; any non-zero value requests a stencil buffer.
    ///
    /// ### 中文
    /// 模板位数；非零即申请模板缓冲。
    pub stencil_bits: u8,
    /// ### English
    /// Make the master surface CPU-readable so frames can be pulled back
    /// for recording.
    ///
    /// ### 中文
    /// 让主 surface 可被 CPU 回读，以便录制时取帧。
    pub recordable: bool,
    /// ### English
    /// Size of the hidden master surface. Drawing happens on the window
    /// targets, so 1x1 is enough unless the consumer reads this surface
    /// back.
    ///
    /// ### 中文
    /// 隐藏主 surface 的尺寸。真正的绘制发生在窗口目标上，除非消费者
    /// 回读该 surface，否则 1x1 足矣。
    pub master_size: PhysicalSize<u32>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            version_hint: None,
            depth: false,
            stencil_bits: 0,
            recordable: false,
            master_size: PhysicalSize::new(1, 1),
        }
    }
}
