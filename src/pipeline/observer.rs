use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use log::error;

use crate::error::PipelineError;

/// ### English
/// Host callback for failures that happen after the public call returned,
/// on the worker thread: a lost context, a rejected consumer shader.
///
/// Called from the worker thread; implementations must not block it. Each
/// failure kind is delivered at most once per worker generation — the
/// host reacts once (typically with `on_pause` + `on_resume`), not once
/// per frame.
///
/// ### 中文
/// 宿主回调，接收在公开调用返回之后、worker 线程上发生的失败：上下文
/// 丢失、消费者 shader 被拒。
///
/// 在 worker 线程上调用；实现不得阻塞该线程。每种失败在一个 worker 世
/// 代内至多送达一次——宿主响应一次（通常是 `on_pause` + `on_resume`），
/// 而不是每帧一次。
pub trait PipelineObserver: Send + Sync {
    fn on_pipeline_error(&self, error: &PipelineError);
}

/// ### English
/// Per-worker-generation error funnel.
///
/// Every raise is logged; the observer only hears the first raise of each
/// error kind. A fresh sink is created for every resume, so a recurring
/// failure reaches the host again after the recovery cycle.
///
/// ### 中文
/// 按 worker 世代划分的错误汇集点。
///
/// 每次 raise 都会记日志；observer 只会听到每种错误的首次 raise。每次
/// resume 都会新建 sink，因此恢复周期之后再次发生的失败仍会送达宿主。
pub(crate) struct EventSink {
    observer: Option<Arc<dyn PipelineObserver>>,
    /// One bit per error kind; a set bit mutes further deliveries.
    fired: AtomicU32,
}

impl EventSink {
    pub(crate) fn new(observer: Option<Arc<dyn PipelineObserver>>) -> Self {
        Self {
            observer,
            fired: AtomicU32::new(0),
        }
    }

    pub(crate) fn raise(&self, error: &PipelineError) {
        error!("{error}");
        let bit = 1 << kind_bit(error);
        // The mask only dedups delivery, it guards no other memory.
        if self.fired.fetch_or(bit, Ordering::Relaxed) & bit != 0 {
            return;
        }
        if let Some(observer) = &self.observer {
            observer.on_pipeline_error(error);
        }
    }
}

fn kind_bit(error: &PipelineError) -> u32 {
    match error {
        PipelineError::Unsupported(_) => 0,
        PipelineError::ContextCreation(_) => 1,
        PipelineError::SurfaceCreation(_) => 2,
        PipelineError::Shader(_) => 3,
        PipelineError::WorkerUnavailable => 4,
        PipelineError::StartTimeout => 5,
        PipelineError::RequestDropped => 6,
        PipelineError::ContextLost(_) => 7,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<PipelineError>>,
    }

    impl PipelineObserver for Recording {
        fn on_pipeline_error(&self, error: &PipelineError) {
            self.seen.lock().unwrap().push(error.clone());
        }
    }

    #[test]
    fn each_error_kind_is_delivered_once() {
        let observer = Arc::new(Recording::default());
        let sink = EventSink::new(Some(observer.clone()));

        sink.raise(&PipelineError::ContextLost("first".into()));
        sink.raise(&PipelineError::ContextLost("second".into()));
        sink.raise(&PipelineError::Shader("bad fragment".into()));

        let seen = observer.seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                PipelineError::ContextLost("first".into()),
                PipelineError::Shader("bad fragment".into()),
            ]
        );
    }

    #[test]
    fn raising_without_an_observer_is_harmless() {
        let sink = EventSink::new(None);
        sink.raise(&PipelineError::WorkerUnavailable);
        sink.raise(&PipelineError::WorkerUnavailable);
    }
}
