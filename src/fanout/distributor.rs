use std::sync::{Arc, Mutex, MutexGuard};

use dpi::PhysicalSize;
use log::debug;

use crate::context::NativeWindowHandle;
use crate::fanout::ids::U32HashMap;
use crate::fanout::scale::ScaleMode;
use crate::worker::{LinkSlot, Request};

/// What the host registered for one target id; enough to rebuild it.
#[derive(Clone, Copy)]
struct TargetSpec {
    window: NativeWindowHandle,
    recordable: bool,
}

struct Registry {
    targets: U32HashMap<TargetSpec>,
    view_size: Option<PhysicalSize<u32>>,
    scale_mode: ScaleMode,
}

/// ### English
/// Host-side registry of output surfaces.
///
/// Keeps the authoritative set of targets, the shared view size, and the
/// scale mode, and mirrors every change to the GPU worker through the
/// link slot. The registry outlives workers: after a pause/resume the
/// pipeline replays it into the fresh worker, so hosts never re-register.
///
/// ### 中文
/// 输出 surface 的宿主侧注册表。
///
/// 保存目标集合、共享视图尺寸与缩放模式的权威副本，并把每次变更经
/// link 槽位镜像给 GPU worker。注册表比 worker 长寿：pause/resume 后
/// 管线将其重放进新 worker，宿主无需重新注册。
pub struct Distributor {
    registry: Mutex<Registry>,
    link: Arc<LinkSlot>,
}

impl Distributor {
    pub(crate) fn new(link: Arc<LinkSlot>, scale_mode: ScaleMode) -> Self {
        Self {
            registry: Mutex::new(Registry {
                targets: U32HashMap::default(),
                view_size: None,
                scale_mode,
            }),
            link,
        }
    }

    /// ### English
    /// Registers an output window under `id`. Re-registering the same
    /// window with the same flags is a no-op; a different window under an
    /// existing id replaces it.
    ///
    /// ### 中文
    /// 以 `id` 注册输出窗口。同窗口同参数的重复注册为 no-op；同 id 下
    /// 不同窗口则替换之。
    pub fn add_surface(&self, id: u32, window: NativeWindowHandle, recordable: bool) {
        let spec = TargetSpec { window, recordable };
        {
            let mut registry = self.lock();
            if let Some(existing) = registry.targets.get(&id)
                && existing.window == window
                && existing.recordable == recordable
            {
                return;
            }
            registry.targets.insert(id, spec);
        }
        debug!("surface {id} registered (recordable: {recordable})");
        let _ = self.link.offer(Request::AddTarget {
            id,
            window,
            recordable,
        });
    }

    /// ### English
    /// Unregisters a target. Unknown ids are a no-op.
    ///
    /// ### 中文
    /// 注销目标。未知 id 为 no-op。
    pub fn remove_surface(&self, id: u32) {
        if self.lock().targets.remove(&id).is_none() {
            return;
        }
        debug!("surface {id} removed");
        let _ = self.link.offer(Request::RemoveTarget { id });
    }

    /// ### English
    /// Updates the shared view size; the worker resizes every target.
    ///
    /// ### 中文
    /// 更新共享视图尺寸；worker 将调整所有目标。
    pub fn resize(&self, size: PhysicalSize<u32>) {
        self.lock().view_size = Some(size);
        let _ = self.link.offer(Request::ResizeTargets { size });
    }

    pub fn set_scale_mode(&self, mode: ScaleMode) {
        self.lock().scale_mode = mode;
        let _ = self.link.offer(Request::SetScaleMode { mode });
    }

    pub fn scale_mode(&self) -> ScaleMode {
        self.lock().scale_mode
    }

    pub fn contains(&self, id: u32) -> bool {
        self.lock().targets.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().targets.is_empty()
    }

    /// ### English
    /// Pushes the whole registry into a freshly started worker: scale
    /// mode and view size first, then every target.
    ///
    /// ### 中文
    /// 把整个注册表灌入新启动的 worker：先缩放模式与视图尺寸，再逐个
    /// 目标。
    pub(crate) fn replay(&self) {
        let (specs, view_size, scale_mode) = {
            let registry = self.lock();
            let specs: Vec<(u32, TargetSpec)> = registry
                .targets
                .iter()
                .map(|(id, spec)| (*id, *spec))
                .collect();
            (specs, registry.view_size, registry.scale_mode)
        };

        let _ = self.link.offer(Request::SetScaleMode { mode: scale_mode });
        if let Some(size) = view_size {
            let _ = self.link.offer(Request::ResizeTargets { size });
        }
        for (id, spec) in specs {
            let _ = self.link.offer(Request::AddTarget {
                id,
                window: spec.window,
                recordable: spec.recordable,
            });
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        match self.registry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use raw_window_handle::{RawWindowHandle, XlibWindowHandle};

    use super::*;

    fn window(id: u64) -> NativeWindowHandle {
        unsafe { NativeWindowHandle::new(RawWindowHandle::Xlib(XlibWindowHandle::new(id))) }
    }

    fn distributor() -> Distributor {
        Distributor::new(Arc::new(LinkSlot::new()), ScaleMode::KeepAspect)
    }

    #[test]
    fn re_adding_the_same_surface_is_a_no_op() {
        let distributor = distributor();
        distributor.add_surface(1, window(100), false);
        distributor.add_surface(1, window(100), false);
        assert_eq!(distributor.len(), 1);

        // Same id, different window: replaced, never duplicated.
        distributor.add_surface(1, window(200), false);
        assert_eq!(distributor.len(), 1);

        distributor.add_surface(2, window(300), true);
        assert_eq!(distributor.len(), 2);
    }

    #[test]
    fn removing_an_unknown_surface_is_a_no_op() {
        let distributor = distributor();
        distributor.remove_surface(9);
        assert!(distributor.is_empty());

        distributor.add_surface(3, window(300), false);
        assert!(distributor.contains(3));
        distributor.remove_surface(3);
        assert!(!distributor.contains(3));
    }

    #[test]
    fn registry_survives_without_a_worker() {
        // All of the above ran against an unbound slot; the bookkeeping
        // must be intact so a later replay can rebuild the worker state.
        let distributor = distributor();
        distributor.add_surface(1, window(1), false);
        distributor.resize(PhysicalSize::new(640, 480));
        distributor.set_scale_mode(ScaleMode::CropCenter);

        assert_eq!(distributor.len(), 1);
        assert_eq!(distributor.scale_mode(), ScaleMode::CropCenter);
        distributor.replay();
        assert_eq!(distributor.len(), 1);
    }
}
