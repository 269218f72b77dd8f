//! ### English
//! The single-thread cooperative executor and its request plumbing.
//!
//! One worker thread per rendering context; every GPU mutation crosses this
//! module as a queued request, which is what turns the graphics API's
//! "current context per thread" global into a single-writer discipline
//! without any lock on the draw path.
//!
//! ### 中文
//! 单线程协作执行器及其请求通路。
//!
//! 每个渲染上下文对应一个 worker 线程；所有 GPU 修改都以排队请求的形式
//! 经过本模块，从而把图形 API“每线程一个 current 上下文”的全局状态
//! 变成单写者纪律，绘制路径上无需任何锁。

mod gpu;
mod queue;
mod request;
mod state;
mod task;

pub(crate) use gpu::{GpuHandler, GpuTask};
pub(crate) use queue::OfferOutcome;
pub(crate) use request::{Request, RequestKind};
pub(crate) use task::{LinkSlot, WorkerHandler, WorkerTask};
