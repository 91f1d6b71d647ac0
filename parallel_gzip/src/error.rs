use thiserror::Error;

/// Errors produced by the block pipeline.
///
/// Every variant is fatal to the current invocation; nothing is retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not enough available memory (required {required} bytes, available {available} bytes)")]
    InsufficientMemory { required: u64, available: u64 },
    #[error("not enough free disk space (required {required} bytes, available {available} bytes)")]
    InsufficientDiskSpace { required: u64, available: u64 },
    #[error("source file corrupted: {0}")]
    CorruptFile(String),
    #[error("corrupt frame: {0}")]
    CorruptFrame(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("operation cancelled")]
    Cancelled,
    #[error("worker thread panicked: {0}")]
    WorkerPanicked(String),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True for preflight refusals, which happen before any output exists.
    ///
    /// Callers may retry these with different parameters or after freeing
    /// resources.
    pub fn is_preflight(&self) -> bool {
        match self {
            Self::InsufficientMemory { .. } | Self::InsufficientDiskSpace { .. } => true,
            Self::Context { source, .. } => source.is_preflight(),
            _ => false,
        }
    }

    /// Strips any context wrappers.
    pub fn root(&self) -> &PipelineError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
