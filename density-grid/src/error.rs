/// Error type for kernel operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    InvalidArgument(String),
}

impl std::fmt::Display for KernelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for KernelError {}
