//! ### English
//! GPU rendering context built on surfman.
//!
//! One context plus one hidden master surface live on the worker thread;
//! window targets borrow the context transiently by swapping their own
//! surface in, drawing, presenting, and swapping the master surface back.
//! A second context can be created sharing the first one's GL objects
//! (same device, same thread).
//!
//! ### 中文
//! 基于 surfman 的 GPU 渲染上下文。
//!
//! 一个上下文加一个隐藏主 surface 常驻 worker 线程；窗口目标通过换入
//! 自己的 surface、绘制、present、再换回主 surface 来瞬时借用上下文。
//! 可在同线程、同 device 上创建与其共享 GL 对象的第二个上下文。

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use dpi::PhysicalSize;
use euclid::default::Size2D;
use glow::HasContext as _;
use log::{debug, error, warn};
use raw_window_handle::WindowHandle;
use surfman::{
    Connection, Context, ContextAttributeFlags, ContextAttributes, Device, GLApi, GLVersion,
    Surface, SurfaceAccess, SurfaceType,
};

use crate::error::PipelineError;

mod config;
mod window;

pub use config::ContextConfig;
pub use window::NativeWindowHandle;

/// ### English
/// Parses `GL_VERSION` strings of the forms `"4.6.0 ..."` and
/// `"OpenGL ES 3.2 ..."`.
///
/// ### 中文
/// 解析 `GL_VERSION` 字符串，支持 `"4.6.0 ..."` 与 `"OpenGL ES 3.2 ..."`
/// 两种形式。
fn parse_gl_version(version: &str) -> (u32, u32) {
    let mut major = 0u32;
    let mut minor = 0u32;
    let tokens: Vec<&str> = version.split_whitespace().collect();
    let number_token = tokens.iter().find(|t| {
        t.chars()
            .next()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false)
    });
    if let Some(token) = number_token {
        let mut parts = token.split('.');
        if let Some(m) = parts.next().and_then(|s| s.parse::<u32>().ok()) {
            major = m;
        }
        if let Some(n) = parts.next().and_then(|s| s.parse::<u32>().ok()) {
            minor = n;
        }
    }
    (major, minor)
}

/// ### English
/// Version candidates to try, newest first. A hint caps the ladder: only
/// versions at or below it stay in.
///
/// ### 中文
/// 依新到旧排列的候选版本。提示版本为阶梯上限：仅保留不高于它的条目。
fn version_ladder(api: GLApi, hint: Option<(u8, u8)>) -> Vec<GLVersion> {
    let defaults: &[(u8, u8)] = match api {
        GLApi::GL => &[(3, 3), (3, 2), (2, 1)],
        GLApi::GLES => &[(3, 0), (2, 0)],
    };
    let mut ladder = Vec::new();
    if let Some((major, minor)) = hint {
        ladder.push((major, minor));
    }
    for &(major, minor) in defaults {
        let capped = hint.map(|h| (major, minor) <= h).unwrap_or(true);
        if capped && !ladder.contains(&(major, minor)) {
            ladder.push((major, minor));
        }
    }
    ladder
        .into_iter()
        .map(|(major, minor)| GLVersion::new(major, minor))
        .collect()
}

fn surface_access(recordable: bool) -> SurfaceAccess {
    if recordable {
        SurfaceAccess::GPUCPU
    } else {
        SurfaceAccess::GPUOnly
    }
}

/// ### English
/// Owns one surfman context with a bound master surface plus the glow API
/// loaded from it. Confined to the thread that created it; every entry
/// point asserts that in debug builds.
///
/// ### 中文
/// 持有一个绑定了主 surface 的 surfman 上下文及从中加载的 glow API。
/// 被限定在创建它的线程上；每个入口在 debug 构建下都会断言这一点。
pub struct RenderingContext {
    /// ### English
    /// Device shared with any context created via `create(Some(..))`.
    ///
    /// ### 中文
    /// 与任何经 `create(Some(..))` 创建的上下文共享的 device。
    device: Rc<RefCell<Device>>,
    context: Context,
    gl: Arc<glow::Context>,
    /// ### English
    /// Attributes the ladder settled on; reused verbatim for shared
    /// contexts so both ends agree on the GL version.
    ///
    /// ### 中文
    /// 阶梯最终选定的属性；共享上下文原样复用，保证两端 GL 版本一致。
    attributes: ContextAttributes,
    is_gles: bool,
    version: (u32, u32),
    /// ### English
    /// Master surface parked here while a target surface is bound.
    ///
    /// ### 中文
    /// 目标 surface 绑定期间，主 surface 暂存于此。
    stashed_master: Option<Surface>,
    owner: ThreadId,
    released: Cell<bool>,
}

impl RenderingContext {
    /// ### English
    /// Creates a context, walking the version ladder until one works.
    /// With `shared_with`, the new context is created on the same device
    /// and shares GL objects with it (both must live on this thread).
    /// Returns `Unsupported` when no candidate version comes up.
    ///
    /// ### 中文
    /// 创建上下文，沿版本阶梯逐级尝试直到成功。传入 `shared_with` 时在
    /// 同一 device 上创建并与之共享 GL 对象（两者须同线程）。所有候选
    /// 版本都失败时返回 `Unsupported`。
    pub fn create(
        shared_with: Option<&RenderingContext>,
        config: &ContextConfig,
    ) -> Result<Self, PipelineError> {
        let mut flags = ContextAttributeFlags::ALPHA;
        if config.depth {
            flags |= ContextAttributeFlags::DEPTH;
        }
        if config.stencil_bits > 0 {
            flags |= ContextAttributeFlags::STENCIL;
        }

        let (device, context, attributes) = match shared_with {
            Some(parent) => {
                debug_assert_eq!(
                    parent.owner,
                    thread::current().id(),
                    "shared rendering contexts must be created on the owning thread"
                );
                let device = parent.device.clone();
                let attributes = parent.attributes;
                let context = {
                    let mut dev = device.borrow_mut();
                    let descriptor = dev.create_context_descriptor(&attributes).map_err(|err| {
                        PipelineError::ContextCreation(format!(
                            "failed to describe shared context: {err:?}"
                        ))
                    })?;
                    dev.create_context(&descriptor, Some(&parent.context))
                        .map_err(|err| {
                            PipelineError::ContextCreation(format!(
                                "failed to create shared context: {err:?}"
                            ))
                        })?
                };
                (device, context, attributes)
            }
            None => {
                let connection = Connection::new().map_err(|err| {
                    PipelineError::ContextCreation(format!(
                        "failed to open display connection: {err:?}"
                    ))
                })?;
                let adapter = connection.create_adapter().map_err(|err| {
                    PipelineError::ContextCreation(format!("failed to pick GPU adapter: {err:?}"))
                })?;
                let mut device = connection.create_device(&adapter).map_err(|err| {
                    PipelineError::ContextCreation(format!("failed to open GPU device: {err:?}"))
                })?;

                let api = device.gl_api();
                let mut created = None;
                let mut last_error = None;
                for version in version_ladder(api, config.version_hint) {
                    let attributes = ContextAttributes { version, flags };
                    let descriptor = match device.create_context_descriptor(&attributes) {
                        Ok(descriptor) => descriptor,
                        Err(err) => {
                            last_error = Some(format!("{err:?}"));
                            continue;
                        }
                    };
                    match device.create_context(&descriptor, None) {
                        Ok(context) => {
                            created = Some((context, attributes));
                            break;
                        }
                        Err(err) => last_error = Some(format!("{err:?}")),
                    }
                }
                let Some((context, attributes)) = created else {
                    return Err(PipelineError::Unsupported(format!(
                        "no usable {api:?} context on this device; last error: {}",
                        last_error.unwrap_or_else(|| "none reported".to_string())
                    )));
                };
                (Rc::new(RefCell::new(device)), context, attributes)
            }
        };

        Self::finish_create(device, context, attributes, config)
    }

    /// ### English
    /// Gives the fresh context its master surface, makes it current and
    /// loads glow. Tears the context back down on any failure so nothing
    /// leaks out of a half-built state.
    ///
    /// ### 中文
    /// 为新上下文绑定主 surface、置为 current 并加载 glow。任何一步失败
    /// 都会就地销毁上下文，不让半成品状态泄漏出去。
    fn finish_create(
        device: Rc<RefCell<Device>>,
        mut context: Context,
        attributes: ContextAttributes,
        config: &ContextConfig,
    ) -> Result<Self, PipelineError> {
        let size = Size2D::new(
            config.master_size.width.max(1) as i32,
            config.master_size.height.max(1) as i32,
        );
        {
            let dev = &mut *device.borrow_mut();
            let surface = match dev.create_surface(
                &context,
                surface_access(config.recordable),
                SurfaceType::Generic { size },
            ) {
                Ok(surface) => surface,
                Err(err) => {
                    let _ = dev.destroy_context(&mut context);
                    return Err(PipelineError::SurfaceCreation(format!(
                        "failed to create master surface: {err:?}"
                    )));
                }
            };
            if let Err((err, mut surface)) = dev.bind_surface_to_context(&mut context, surface) {
                let _ = dev.destroy_surface(&mut context, &mut surface);
                let _ = dev.destroy_context(&mut context);
                return Err(PipelineError::SurfaceCreation(format!(
                    "failed to bind master surface: {err:?}"
                )));
            }
            if let Err(err) = dev.make_context_current(&context) {
                if let Ok(Some(mut surface)) = dev.unbind_surface_from_context(&mut context) {
                    let _ = dev.destroy_surface(&mut context, &mut surface);
                }
                let _ = dev.destroy_context(&mut context);
                return Err(PipelineError::ContextCreation(format!(
                    "failed to make context current: {err:?}"
                )));
            }
        }

        let gl = unsafe {
            glow::Context::from_loader_function(|name| {
                let dev = device.borrow();
                dev.get_proc_address(&context, name) as *const _
            })
        };

        let is_gles = matches!(device.borrow().gl_api(), GLApi::GLES);
        let gl_version = unsafe { gl.get_parameter_string(glow::VERSION) };
        let version = parse_gl_version(&gl_version);
        debug!(
            "rendering context up: {} {}.{} ({gl_version})",
            if is_gles { "GLES" } else { "GL" },
            version.0,
            version.1
        );

        Ok(Self {
            device,
            context,
            gl: Arc::new(gl),
            attributes,
            is_gles,
            version,
            stashed_master: None,
            owner: thread::current().id(),
            released: Cell::new(false),
        })
    }

    fn assert_owner(&self) {
        let current = thread::current().id();
        debug_assert_eq!(
            self.owner, current,
            "rendering context used off its owning thread"
        );
        if self.owner != current {
            error!("rendering context used off its owning thread");
        }
    }

    /// ### English
    /// Makes the context current with the master surface's framebuffer
    /// bound. Called before every request the GPU worker handles.
    ///
    /// ### 中文
    /// 使上下文 current 并绑定主 surface 的 framebuffer。GPU worker 处理
    /// 每条请求前都会调用。
    pub(crate) fn make_default_current(&mut self) -> Result<(), String> {
        self.assert_owner();
        let device = self.device.borrow();
        device
            .make_context_current(&self.context)
            .map_err(|err| format!("failed to make context current: {err:?}"))?;
        let info = device
            .context_surface_info(&self.context)
            .map_err(|err| format!("master surface info unavailable: {err:?}"))?
            .ok_or_else(|| "master surface is not bound".to_string())?;
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, info.framebuffer_object);
        }
        Ok(())
    }

    /// ### English
    /// Creates a surface on a native window for this context.
    ///
    /// ### 中文
    /// 在原生窗口上为该上下文创建 surface。
    pub(crate) fn create_window_surface(
        &mut self,
        window: &NativeWindowHandle,
        size: PhysicalSize<u32>,
        recordable: bool,
    ) -> Result<Surface, String> {
        self.assert_owner();
        let handle = unsafe { WindowHandle::borrow_raw(window.raw()) };
        let size = Size2D::new(size.width.max(1) as i32, size.height.max(1) as i32);
        let dev = &mut *self.device.borrow_mut();
        let native_widget = dev
            .connection()
            .create_native_widget_from_window_handle(handle, size)
            .map_err(|err| format!("failed to wrap native window: {err:?}"))?;
        dev.create_surface(
            &self.context,
            surface_access(recordable),
            SurfaceType::Widget { native_widget },
        )
        .map_err(|err| format!("failed to create window surface: {err:?}"))
    }

    /// ### English
    /// Swaps the master surface out and binds `surface` for drawing, with
    /// its framebuffer bound and the context current. On failure the
    /// surface is handed back when it is still alive (`Some`), and the
    /// master surface is restored whenever possible.
    ///
    /// ### 中文
    /// 换出主 surface 并绑定 `surface` 供绘制，framebuffer 已绑定、上下
    /// 文已 current。失败时若 surface 仍存活则原样交还（`Some`），并尽
    /// 可能恢复主 surface。
    pub(crate) fn begin_target(&mut self, surface: Surface) -> Result<(), (String, Option<Surface>)> {
        self.assert_owner();
        if self.stashed_master.is_some() {
            return Err(("a target surface is already bound".to_string(), Some(surface)));
        }
        let dev = &mut *self.device.borrow_mut();
        let master = match dev.unbind_surface_from_context(&mut self.context) {
            Ok(Some(master)) => master,
            Ok(None) => {
                return Err(("master surface is not bound".to_string(), Some(surface)));
            }
            Err(err) => {
                return Err((
                    format!("failed to unbind master surface: {err:?}"),
                    Some(surface),
                ));
            }
        };
        self.stashed_master = Some(master);

        if let Err((err, surface)) = dev.bind_surface_to_context(&mut self.context, surface) {
            return Err(Self::recover_master(
                dev,
                &mut self.context,
                &mut self.stashed_master,
                format!("failed to bind target surface: {err:?}"),
                Some(surface),
            ));
        }
        if let Err(err) = dev.make_context_current(&self.context) {
            let surface = dev
                .unbind_surface_from_context(&mut self.context)
                .ok()
                .flatten();
            return Err(Self::recover_master(
                dev,
                &mut self.context,
                &mut self.stashed_master,
                format!("failed to make target surface current: {err:?}"),
                surface,
            ));
        }
        let info = match dev.context_surface_info(&self.context) {
            Ok(Some(info)) => info,
            Ok(None) | Err(_) => {
                let surface = dev
                    .unbind_surface_from_context(&mut self.context)
                    .ok()
                    .flatten();
                return Err(Self::recover_master(
                    dev,
                    &mut self.context,
                    &mut self.stashed_master,
                    "target surface info unavailable".to_string(),
                    surface,
                ));
            }
        };
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, info.framebuffer_object);
        }
        Ok(())
    }

    /// ### English
    /// Presents the bound target surface and restores the master surface.
    /// The target surface comes back as `Some` unless it had to be
    /// destroyed; the `Result` reports the present outcome.
    ///
    /// ### 中文
    /// Present 当前绑定的目标 surface 并恢复主 surface。除非目标 surface
    /// 不得不被销毁，否则以 `Some` 交还；`Result` 报告 present 结果。
    pub(crate) fn finish_target(&mut self) -> (Option<Surface>, Result<(), String>) {
        self.assert_owner();
        let dev = &mut *self.device.borrow_mut();
        let mut target = match dev.unbind_surface_from_context(&mut self.context) {
            Ok(Some(target)) => target,
            Ok(None) => {
                let restore = Self::restore_master(dev, &mut self.context, &mut self.stashed_master);
                let detail = match restore {
                    Ok(()) => "no target surface was bound".to_string(),
                    Err(detail) => format!("no target surface was bound; {detail}"),
                };
                return (None, Err(detail));
            }
            Err(err) => {
                return (None, Err(format!("failed to unbind target surface: {err:?}")));
            }
        };
        let presented = dev
            .present_surface(&self.context, &mut target)
            .map_err(|err| format!("failed to present target surface: {err:?}"));
        match Self::restore_master(dev, &mut self.context, &mut self.stashed_master) {
            Ok(()) => (Some(target), presented),
            Err(detail) => {
                let _ = dev.destroy_surface(&mut self.context, &mut target);
                let detail = match presented {
                    Ok(()) => detail,
                    Err(first) => format!("{first}; then {detail}"),
                };
                (None, Err(detail))
            }
        }
    }

    /// ### English
    /// Error path shared by `begin_target`: put the master surface back;
    /// if even that fails, the surface in flight is destroyed and `None`
    /// signals the caller that it is gone.
    ///
    /// ### 中文
    /// `begin_target` 共用的出错路径：恢复主 surface；连恢复都失败时销
    /// 毁在途 surface，以 `None` 告知调用方它已不在。
    fn recover_master(
        dev: &mut Device,
        context: &mut Context,
        stash: &mut Option<Surface>,
        detail: String,
        surface: Option<Surface>,
    ) -> (String, Option<Surface>) {
        match Self::restore_master(dev, context, stash) {
            Ok(()) => (detail, surface),
            Err(restore) => {
                if let Some(mut surface) = surface {
                    let _ = dev.destroy_surface(context, &mut surface);
                }
                (format!("{detail}; {restore}"), None)
            }
        }
    }

    fn restore_master(
        dev: &mut Device,
        context: &mut Context,
        stash: &mut Option<Surface>,
    ) -> Result<(), String> {
        let master = stash
            .take()
            .ok_or_else(|| "master surface went missing".to_string())?;
        if let Err((err, mut master)) = dev.bind_surface_to_context(context, master) {
            let _ = dev.destroy_surface(context, &mut master);
            return Err(format!("failed to rebind master surface: {err:?}"));
        }
        dev.make_context_current(context)
            .map_err(|err| format!("failed to make master surface current: {err:?}"))
    }

    /// ### English
    /// Destroys a surface created on this context.
    ///
    /// ### 中文
    /// 销毁在该上下文上创建的 surface。
    pub(crate) fn destroy_surface(&mut self, mut surface: Surface) -> Result<(), String> {
        self.assert_owner();
        self.device
            .borrow_mut()
            .destroy_surface(&mut self.context, &mut surface)
            .map_err(|err| format!("failed to destroy surface: {err:?}"))
    }

    /// ### English
    /// Returns the glow API wrapper (cheap clone of an `Arc`).
    ///
    /// ### 中文
    /// 返回 glow GL API 封装（`Arc` 的低成本 clone）。
    pub(crate) fn gl(&self) -> Arc<glow::Context> {
        self.gl.clone()
    }

    pub fn is_gles(&self) -> bool {
        self.is_gles
    }

    pub fn version(&self) -> (u32, u32) {
        self.version
    }

    /// ### English
    /// GLES 3.0 or newer; gates sized internal formats and similar paths.
    ///
    /// ### 中文
    /// 是否为 GLES 3.0 及以上；决定 sized internal format 等路径。
    pub fn is_gles3(&self) -> bool {
        self.is_gles && self.version.0 >= 3
    }

    /// ### English
    /// Whether the driver reports a GL extension, e.g.
    /// `GL_OES_EGL_image_external`.
    ///
    /// ### 中文
    /// 驱动是否上报某 GL 扩展，例如 `GL_OES_EGL_image_external`。
    pub fn has_extension(&self, name: &str) -> bool {
        self.gl.supported_extensions().contains(name)
    }

    /// ### English
    /// Destroys the master surface and the context. Idempotent; also runs
    /// on drop.
    ///
    /// ### 中文
    /// 销毁主 surface 与上下文。幂等；drop 时也会执行。
    pub fn release(&mut self) {
        if self.released.replace(true) {
            return;
        }
        self.assert_owner();
        let dev = &mut *self.device.borrow_mut();
        if let Some(mut master) = self.stashed_master.take() {
            let _ = dev.destroy_surface(&mut self.context, &mut master);
        }
        if let Ok(Some(mut bound)) = dev.unbind_surface_from_context(&mut self.context) {
            let _ = dev.destroy_surface(&mut self.context, &mut bound);
        }
        if let Err(err) = dev.destroy_context(&mut self.context) {
            warn!("failed to destroy rendering context: {err:?}");
        } else {
            debug!("rendering context released");
        }
    }
}

impl Drop for RenderingContext {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_desktop_and_gles_version_strings() {
        assert_eq!(parse_gl_version("4.6.0 NVIDIA 550.54.14"), (4, 6));
        assert_eq!(parse_gl_version("OpenGL ES 3.2 Mesa 23.0.4"), (3, 2));
        assert_eq!(parse_gl_version("OpenGL ES 2.0 (ANGLE)"), (2, 0));
        assert_eq!(parse_gl_version("not a version"), (0, 0));
    }

    #[test]
    fn ladder_walks_down_from_the_default_head() {
        let pairs: Vec<(u8, u8)> = version_ladder(GLApi::GLES, None)
            .iter()
            .map(|v| (v.major, v.minor))
            .collect();
        assert_eq!(pairs, vec![(3, 0), (2, 0)]);

        let pairs: Vec<(u8, u8)> = version_ladder(GLApi::GL, None)
            .iter()
            .map(|v| (v.major, v.minor))
            .collect();
        assert_eq!(pairs, vec![(3, 3), (3, 2), (2, 1)]);
    }

    #[test]
    fn ladder_never_climbs_above_the_hint() {
        let pairs: Vec<(u8, u8)> = version_ladder(GLApi::GL, Some((3, 1)))
            .iter()
            .map(|v| (v.major, v.minor))
            .collect();
        assert_eq!(pairs, vec![(3, 1), (2, 1)]);

        let pairs: Vec<(u8, u8)> = version_ladder(GLApi::GLES, Some((2, 0)))
            .iter()
            .map(|v| (v.major, v.minor))
            .collect();
        assert_eq!(pairs, vec![(2, 0)]);
    }
}
