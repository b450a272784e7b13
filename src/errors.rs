//! Error types for the scheduler's external-facing operations.
//!
//! The scheduler core itself treats most invariant violations as fatal
//! assertions (a corrupted ready list or a double free is a programming
//! bug, not a recoverable condition) — mirroring the teaching kernel this
//! crate models, which panics the whole machine on `ASSERT` failure rather
//! than unwinding. The error types below cover the handful of operations
//! that legitimately fail at runtime: creating a thread when memory is
//! exhausted, and looking up a thread id that does not exist.

use core::fmt;

/// Result type for fallible scheduler operations.
pub type ThreadResult<T> = Result<T, ThreadError>;

/// Errors that can occur during thread creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateError {
    /// No page was available from the page pool for the new thread's TCB
    /// and stack.
    OutOfMemory,
}

impl fmt::Display for CreateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreateError::OutOfMemory => write!(f, "out of memory for thread creation"),
        }
    }
}

/// Errors that can occur while looking up a thread by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    /// No thread with the given id is currently registered in `all_list`.
    NotFound,
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::NotFound => write!(f, "thread id not found"),
        }
    }
}

/// Aggregate error type for the crate's public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadError {
    Create(CreateError),
    Lookup(LookupError),
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadError::Create(e) => write!(f, "{}", e),
            ThreadError::Lookup(e) => write!(f, "{}", e),
        }
    }
}

impl From<CreateError> for ThreadError {
    fn from(error: CreateError) -> Self {
        ThreadError::Create(error)
    }
}

impl From<LookupError> for ThreadError {
    fn from(error: LookupError) -> Self {
        ThreadError::Lookup(error)
    }
}
