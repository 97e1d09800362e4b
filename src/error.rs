use std::io;

/// Global return type
pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No memory for a new node; the chain is left unchanged
    #[error("failed to allocate a new node")]
    AllocationFailure,

    #[error("failed to start the {role} thread")]
    ThreadStart {
        role: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("the {role} thread panicked")]
    ThreadPanicked { role: &'static str },

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}
