pub use crate::config::{Config, ConfigBuilder, WaitDiscipline};
pub use crate::error::{Error, Result};
pub use crate::executor::{BulkId, PanicStrategy, Runnable};
pub use crate::runtime::{Runtime, TaskSystem};
pub use crate::scheduler::BulkState;
pub use crate::serial::SerialRuntime;
pub use crate::spawn::SpawnRuntime;
pub use crate::telemetry::MetricsSnapshot;
