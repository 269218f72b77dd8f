//! ### English
//! Lock-free primitives backing the request queue and frame hand-off.
//!
//! Everything here targets the hot paths between producer threads and the
//! single worker thread: atomic swaps, bounded allocation via spare-node
//! caches, and spin/yield backoff for sub-microsecond publish windows.
//!
//! ### 中文
//! 支撑请求队列与帧传递的无锁原语。
//!
//! 这里的一切都面向生产者线程与唯一 worker 线程之间的热路径：原子交换、
//! 通过备用节点缓存实现的有界分配，以及针对亚微秒级发布窗口的
//! 自旋/让出退避。

mod backoff;
mod cache;
mod mailbox;
mod mpsc;
mod oneshot;

pub(crate) use backoff::Backoff;
pub(crate) use cache::pad_after;
pub(crate) use mailbox::Mailbox;
pub(crate) use mpsc::MpscQueue;
pub(crate) use oneshot::OneShot;
