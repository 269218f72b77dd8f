use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use dpi::PhysicalSize;

use crate::lockfree::{Mailbox, pad_after};
use crate::source::frame::FrameData;

const DIRTY_PAD_BYTES: usize = pad_after::<AtomicBool>();

/// ### English
/// Producer/worker rendezvous for one frame source.
///
/// The producer thread posts payloads and raises the dirty flag; the GPU
/// worker consumes both before drawing. Everything here is lock-free: a
/// latest-wins mailbox for the payload and atomics for the flag and the
/// mirrored texture state. The struct outlives any single worker, which
/// is what lets a paused pipeline resume with the same producer handle.
///
/// ### 中文
/// 单个帧源的生产者/worker 汇合点。
///
/// 生产者线程投递负载并竖起 dirty 标志；GPU worker 在绘制前消费两者。
/// 此处全部无锁：负载走“新值胜出”邮箱，标志与镜像的纹理状态走原子量。
/// 本结构比任何单个 worker 都长寿，暂停的管线因此能带着同一个
/// producer 句柄恢复。
#[repr(C)]
pub(crate) struct SharedSource {
    frames: Mailbox<FrameData>,
    /// Raised by the producer and cleared by the worker once per frame.
    dirty: AtomicBool,
    /// Keeps the per-frame flag off the line the low-rate mirrors share.
    _pad_dirty: [u8; DIRTY_PAD_BYTES],
    /// `width << 32 | height`, mirrored for the producer.
    size: AtomicU64,
    sequence: AtomicU64,
    /// GL texture name mirrored for the producer; 0 while unattached.
    texture: AtomicU32,
}

fn pack_size(size: PhysicalSize<u32>) -> u64 {
    (u64::from(size.width) << 32) | u64::from(size.height)
}

fn unpack_size(packed: u64) -> PhysicalSize<u32> {
    PhysicalSize::new((packed >> 32) as u32, packed as u32)
}

impl SharedSource {
    pub(crate) fn new() -> Self {
        Self {
            frames: Mailbox::default(),
            dirty: AtomicBool::new(false),
            _pad_dirty: [0; DIRTY_PAD_BYTES],
            size: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
            texture: AtomicU32::new(0),
        }
    }

    /// ### English
    /// Posts a payload, reusing a spare node when one is cached, and
    /// recycles whatever it displaced. Producer side.
    ///
    /// ### 中文
    /// 投递负载，有缓存空闲节点则复用，并回收被顶替者。生产者侧。
    pub(crate) fn post_frame(&self, frame: FrameData) {
        let node = match self.frames.pop_spare() {
            Some(mut spare) => {
                *spare = frame;
                spare
            }
            None => Box::new(frame),
        };
        if let Some(displaced) = self.frames.post(node) {
            self.frames.push_spare(displaced);
        }
    }

    /// Worker side; `None` when the frame only exists behind the texture.
    pub(crate) fn take_frame(&self) -> Option<Box<FrameData>> {
        self.frames.take()
    }

    /// Returns the node's allocation to the spare cache after an upload.
    pub(crate) fn recycle_frame(&self, frame: Box<FrameData>) {
        self.frames.push_spare(frame);
    }

    #[inline]
    pub(crate) fn set_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// ### English
    /// Consumes the dirty flag; pairs with the producer's `set_dirty` via
    /// release/acquire, so a payload posted before the flag is visible
    /// once this returns true.
    ///
    /// ### 中文
    /// 消费 dirty 标志；与生产者的 `set_dirty` 构成 release/acquire 配
    /// 对，故返回 true 时，先于标志投递的负载必然可见。
    #[inline]
    pub(crate) fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::Acquire)
    }

    pub(crate) fn texture(&self) -> u32 {
        self.texture.load(Ordering::Acquire)
    }

    pub(crate) fn set_texture(&self, name: u32) {
        self.texture.store(name, Ordering::Release);
    }

    pub(crate) fn size(&self) -> PhysicalSize<u32> {
        unpack_size(self.size.load(Ordering::Acquire))
    }

    pub(crate) fn set_size(&self, size: PhysicalSize<u32>) {
        self.size.store(pack_size(size), Ordering::Release);
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Worker side, once per frame that reached the texture.
    pub(crate) fn bump_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::AcqRel) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirty_flag_is_level_triggered() {
        let shared = SharedSource::new();
        assert!(!shared.take_dirty());

        shared.set_dirty();
        shared.set_dirty();
        assert!(shared.take_dirty());
        assert!(!shared.take_dirty());
    }

    #[test]
    fn posted_frames_collapse_to_the_latest() {
        let shared = SharedSource::new();
        shared.post_frame(FrameData::rgba(2, 2, vec![0; 16]));
        shared.post_frame(FrameData::rgba(4, 4, vec![1; 64]));

        let frame = shared.take_frame().expect("latest frame must be pending");
        assert_eq!((frame.width, frame.height), (4, 4));
        assert!(shared.take_frame().is_none());

        // The displaced node went to the spare cache and gets reused.
        shared.recycle_frame(frame);
        shared.post_frame(FrameData::rgba(8, 8, vec![2; 256]));
        let frame = shared.take_frame().expect("reposted frame must be pending");
        assert_eq!((frame.width, frame.height), (8, 8));
    }

    #[test]
    fn mirrored_texture_state_round_trips() {
        let shared = SharedSource::new();
        assert_eq!(shared.texture(), 0);

        shared.set_texture(42);
        shared.set_size(PhysicalSize::new(1280, 720));
        assert_eq!(shared.texture(), 42);
        assert_eq!(shared.size(), PhysicalSize::new(1280, 720));

        assert_eq!(shared.sequence(), 0);
        assert_eq!(shared.bump_sequence(), 1);
        assert_eq!(shared.bump_sequence(), 2);
        assert_eq!(shared.sequence(), 2);
    }
}
