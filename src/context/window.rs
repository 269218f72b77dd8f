use raw_window_handle::RawWindowHandle;

/// ### English
/// Borrowed native window handle for one output surface.
///
/// The window is owned by the external consumer; the pipeline only ever
/// uses the handle to create and release a GPU surface on it, never to
/// drive any window lifecycle. `Copy` + raw storage keeps that non-owning
/// relationship visible in the type.
///
/// ### 中文
/// 指向单个输出 surface 的借用原生窗口句柄。
///
/// 窗口由外部消费者持有；管线只用该句柄在其上创建/释放 GPU surface，
/// 绝不触碰任何窗口生命周期。`Copy` 加裸句柄存储让这种非持有关系在
/// 类型上一目了然。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NativeWindowHandle {
    raw: RawWindowHandle,
}

// The handle is plain data; what makes it safe to move across threads is
// the validity contract of `new`, not any synchronization.
unsafe impl Send for NativeWindowHandle {}
unsafe impl Sync for NativeWindowHandle {}

impl NativeWindowHandle {
    /// ### English
    /// Wraps a raw window handle.
    ///
    /// #### Safety
    /// The underlying window must stay valid until every target registered
    /// with this handle has been removed (or the pipeline paused); the
    /// pipeline dereferences it on the worker thread when creating the
    /// target's surface.
    ///
    /// ### 中文
    /// 包装一个裸窗口句柄。
    ///
    /// #### Safety
    /// 在以该句柄注册的所有目标被移除（或管线 pause）之前，底层窗口必须
    /// 保持有效；创建目标 surface 时管线会在 worker 线程上解引用它。
    #[inline]
    pub unsafe fn new(raw: RawWindowHandle) -> Self {
        Self { raw }
    }

    #[inline]
    pub fn raw(&self) -> RawWindowHandle {
        self.raw
    }
}
