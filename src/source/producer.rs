use std::sync::Arc;

use dpi::PhysicalSize;
use euclid::default::Transform3D;

use crate::source::FrameData;
use crate::source::shared::SharedSource;
use crate::worker::{LinkSlot, Request};

/// ### English
/// The producer's end of an attached frame source.
///
/// Held by whatever delivers frames (camera callback, decoder thread);
/// every method is safe from any thread and never blocks on the GPU.
/// Signals degrade to no-ops while the pipeline is paused, and the next
/// resume picks the source back up. Dropping the handle detaches the
/// source.
///
/// ### 中文
/// 已挂接帧源的生产者端。
///
/// 由送帧方（相机回调、解码线程）持有；所有方法在任意线程上安全，绝不
/// 阻塞在 GPU 上。管线暂停期间信号退化为 no-op，下次 resume 会重新接
/// 上该源。句柄 drop 即分离帧源。
pub struct ProducerHandle {
    shared: Arc<SharedSource>,
    link: Arc<LinkSlot>,
}

impl ProducerHandle {
    pub(crate) fn new(shared: Arc<SharedSource>, link: Arc<LinkSlot>) -> Self {
        Self { shared, link }
    }

    /// ### English
    /// Signals that a new image sits behind the texture already (external
    /// sources). Wakes the worker; back-to-back signals coalesce into one
    /// draw.
    ///
    /// ### 中文
    /// 告知纹理背后已有新图像（外部源）。唤醒 worker；连续信号会合并成
    /// 一次绘制。
    pub fn notify_frame_available(&self) {
        self.shared.set_dirty();
        let _ = self.link.offer(Request::Draw);
    }

    /// ### English
    /// Hands over a frame payload. Unconsumed predecessors are replaced,
    /// never queued.
    ///
    /// ### 中文
    /// 交付一帧负载。未被消费的前帧会被顶替，绝不排队。
    pub fn push_frame(&self, frame: FrameData) {
        self.shared.post_frame(frame);
        self.shared.set_dirty();
        let _ = self.link.offer(Request::Draw);
    }

    /// ### English
    /// Announces a source dimension change (e.g. the camera switched
    /// capture resolution); the worker reallocates texture storage. The
    /// size is mirrored host-side at once, so a resize issued while
    /// paused still shapes the texture the next resume creates.
    ///
    /// ### 中文
    /// 宣告源尺寸变化（如相机切换采集分辨率）；worker 将重新分配纹理存
    /// 储。尺寸会立即镜像到宿主侧，因此暂停期间的 resize 仍会决定下次
    /// resume 创建的纹理尺寸。
    pub fn resize(&self, size: PhysicalSize<u32>) {
        self.shared.set_size(size);
        let _ = self.link.offer(Request::ResizeSource { size });
    }

    /// ### English
    /// Replaces the texture transform the next frame will be drawn with.
    /// Rides the same latest-wins mailbox as
    /// [`push_frame`](Self::push_frame), so it is meant for producers
    /// that write the texture themselves; it takes effect with the next
    /// frame signal.
    ///
    /// ### 中文
    /// 替换下一帧绘制所用的纹理变换。与 [`push_frame`](Self::push_frame)
    /// 共用同一个 latest-wins 信箱，因此面向自行写入纹理的生产者；随下
    /// 一次帧信号生效。
    pub fn set_transform(&self, transform: Transform3D<f32>) {
        self.shared.post_frame(FrameData::external(0, 0, transform));
    }

    /// ### English
    /// GL name of the source texture, for wiring a platform decoder to an
    /// external source. `None` while no worker has the source attached.
    ///
    /// ### 中文
    /// 源纹理的 GL 名字，用于把平台解码器接到外部源上。没有 worker 挂
    /// 接该源时为 `None`。
    pub fn texture(&self) -> Option<u32> {
        match self.shared.texture() {
            0 => None,
            name => Some(name),
        }
    }

    pub fn texture_size(&self) -> PhysicalSize<u32> {
        self.shared.size()
    }

    /// Frames that reached the texture so far.
    pub fn sequence(&self) -> u64 {
        self.shared.sequence()
    }

    /// ### English
    /// Detaches the source; the worker deletes the texture. Equivalent to
    /// dropping the handle.
    ///
    /// ### 中文
    /// 分离帧源；worker 删除纹理。等价于 drop 本句柄。
    pub fn detach(self) {}
}

impl Drop for ProducerHandle {
    fn drop(&mut self) {
        let _ = self.link.offer(Request::DetachSource {
            source: Arc::clone(&self.shared),
        });
    }
}
