use crate::executor::BulkId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("bulk {bulk} depends on unknown bulk {missing}")]
    UnknownDependency { bulk: BulkId, missing: BulkId },

    #[error("dependency cycle among bulks {unresolved:?}")]
    DependencyCycle { unresolved: Vec<BulkId> },

    #[error("task {index} of bulk {bulk} panicked: {message}")]
    TaskPanicked {
        bulk: BulkId,
        index: usize,
        message: String,
    },

    #[error("engine poisoned by an earlier task panic")]
    Poisoned,

    #[error("bulk launch issued from inside one of the engine's own tasks")]
    Reentrant,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("telemetry error: {0}")]
    Telemetry(String),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn telemetry<S: Into<String>>(msg: S) -> Self {
        Error::Telemetry(msg.into())
    }

    /// True for the errors `sync` raises before running anything.
    pub fn is_dependency_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownDependency { .. } | Error::DependencyCycle { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_error_classification() {
        let cycle = Error::DependencyCycle {
            unresolved: vec![BulkId::new(1), BulkId::new(2)],
        };
        assert!(cycle.is_dependency_error());
        assert!(!Error::Poisoned.is_dependency_error());
        assert!(!Error::config("bad").is_dependency_error());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::UnknownDependency {
            bulk: BulkId::new(3),
            missing: BulkId::new(9),
        };
        assert_eq!(err.to_string(), "bulk #3 depends on unknown bulk #9");

        let err = Error::TaskPanicked {
            bulk: BulkId::new(1),
            index: 4,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "task 4 of bulk #1 panicked: boom");
    }
}
