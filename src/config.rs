use crate::error::{Error, Result};
use crate::executor::PanicStrategy;
use std::fmt;
use std::str::FromStr;

/// Environment variable overriding the worker count in [`Config::from_env`].
pub const ENV_NUM_THREADS: &str = "TASKSYS_NUM_THREADS";
/// Environment variable overriding the wait discipline in [`Config::from_env`].
pub const ENV_WAIT: &str = "TASKSYS_WAIT";

const MAX_THREADS: usize = 1024;

/// How an idle worker waits for the next task item.
///
/// Both disciplines give the same observable results; they differ only in
/// latency and CPU use while the queue is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitDiscipline {
    /// Poll the queue without ever parking the thread.
    Spin,
    /// Sleep on a condition variable until work is pushed.
    #[default]
    Block,
}

impl fmt::Display for WaitDiscipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitDiscipline::Spin => f.write_str("spin"),
            WaitDiscipline::Block => f.write_str("block"),
        }
    }
}

impl FromStr for WaitDiscipline {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spin" | "spinning" => Ok(WaitDiscipline::Spin),
            "block" | "blocking" | "sleep" => Ok(WaitDiscipline::Block),
            other => Err(Error::config(format!("unknown wait discipline '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub num_threads: Option<usize>,
    pub wait_discipline: WaitDiscipline,
    pub panic_strategy: PanicStrategy,
    pub pin_workers: bool,
    pub stack_size: Option<usize>,
    pub thread_name_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_threads: None,
            wait_discipline: WaitDiscipline::default(),
            panic_strategy: PanicStrategy::default(),
            pin_workers: false,
            stack_size: Some(2 * 1024 * 1024),
            thread_name_prefix: "tasksys-worker".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Defaults overlaid with `TASKSYS_NUM_THREADS` and `TASKSYS_WAIT`.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(raw) = std::env::var(ENV_NUM_THREADS) {
            let n = raw.trim().parse::<usize>().map_err(|e| {
                Error::config(format!("{} is not a thread count ({}): {}", ENV_NUM_THREADS, raw, e))
            })?;
            config.num_threads = Some(n);
        }

        if let Ok(raw) = std::env::var(ENV_WAIT) {
            config.wait_discipline = raw.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.num_threads {
            if n == 0 {
                return Err(Error::config("num_threads must be > 0"));
            }
            if n > MAX_THREADS {
                return Err(Error::config(format!(
                    "num_threads too large (max {})",
                    MAX_THREADS
                )));
            }
        }

        if self.stack_size == Some(0) {
            return Err(Error::config("stack_size must be > 0"));
        }

        Ok(())
    }

    pub fn worker_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(num_cpus::get)
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn num_threads(mut self, n: usize) -> Self {
        self.config.num_threads = Some(n);
        self
    }

    pub fn wait_discipline(mut self, discipline: WaitDiscipline) -> Self {
        self.config.wait_discipline = discipline;
        self
    }

    pub fn panic_strategy(mut self, strategy: PanicStrategy) -> Self {
        self.config.panic_strategy = strategy;
        self
    }

    pub fn pin_workers(mut self, pin: bool) -> Self {
        self.config.pin_workers = pin;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
