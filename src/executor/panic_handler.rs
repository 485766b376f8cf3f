use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// What a worker does when a task unwinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanicStrategy {
    /// Count the task as finished, let the bulk drain, and fail the
    /// launching `run`/`sync` with [`Error::TaskPanicked`](crate::Error::TaskPanicked).
    #[default]
    Propagate,
    /// Abort the process.
    Abort,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PanicHandler {
    strategy: PanicStrategy,
}

impl PanicHandler {
    pub fn new(strategy: PanicStrategy) -> Self {
        Self { strategy }
    }

    pub fn execute<F, R>(&self, f: F) -> Result<R, PanicInfo>
    where
        F: FnOnce() -> R,
    {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => Ok(result),
            Err(payload) => {
                let info = PanicInfo::from_payload(payload);

                if self.strategy == PanicStrategy::Abort {
                    tracing::error!(message = %info.message, "task panicked, aborting");
                    std::process::abort();
                }

                Err(info)
            }
        }
    }

    pub fn strategy(&self) -> PanicStrategy {
        self.strategy
    }
}

#[derive(Debug, Clone)]
pub struct PanicInfo {
    pub message: String,
}

impl PanicInfo {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        Self { message }
    }
}
