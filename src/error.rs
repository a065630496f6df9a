use thiserror::Error;

pub type Result<T> = std::result::Result<T, IsingError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IsingError {
    /// A configuration that is not made of +1/-1 spins over the whole chain.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A repeat count, temperature, field or input sequence out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl IsingError {
    pub(crate) fn state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub(crate) fn argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}
