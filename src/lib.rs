/// ### English
/// `framecast` crate root.
///
/// One producer's frames, one GPU texture, many output surfaces. The
/// host drives the lifecycle through [`FramePipeline`]; consumers
/// register surfaces on the [`Distributor`]; producers feed frames
/// through a [`ProducerHandle`]. All GPU work happens on one dedicated
/// worker thread per pipeline.
///
/// ### 中文
/// `framecast` crate 根。
///
/// 一个生产者的帧、一张 GPU 纹理、多个输出 surface。宿主通过
/// [`FramePipeline`] 驱动生命周期；消费者在 [`Distributor`] 上注册
/// surface；生产者经 [`ProducerHandle`] 送帧。每条管线的全部 GPU 工作
/// 都在一个专属 worker 线程上进行。
mod context;
mod drawer;
mod error;
mod fanout;
mod lockfree;
mod pipeline;
mod source;
mod worker;

pub use context::{ContextConfig, NativeWindowHandle};
pub use error::PipelineError;
pub use fanout::{Distributor, ScaleMode};
pub use pipeline::{FramePipeline, PipelineConfig, PipelineObserver};
pub use source::{FrameData, FrameInfo, FrameListener, ProducerHandle, TextureKind};
