//! # Error Types
//!
//! General error handling for the debugger.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Main error type for debugger operations
///
/// Each variant corresponds to one failure policy:
///
/// 1. **Os**: a syscall failed; the errno is attached and the session stays
///    usable.
/// 2. **Loader / Dwarf**: structural problems in an object file; fatal for
///    that object.
/// 3. **Lookup**: a name, id, or address had no match; recoverable.
/// 4. **InvalidArgument**: a caller broke an API contract (wrong register
///    size, bad watchpoint geometry); programmer error.
/// 5. **ProcessState**: an operation was issued while the tracee was in the
///    wrong state (resume after exit, step while running); recoverable.
#[derive(Error, Debug)]
pub enum TalonError
{
    /// A system call against the tracee or its proc files failed.
    #[error("{context}: {source}")]
    Os
    {
        /// What the debugger was doing when the call failed
        context: String,
        /// The errno reported by the kernel
        source: Errno,
    },

    /// The ELF image at `path` could not be mapped or parsed.
    ///
    /// This covers open/mmap failures as well as structural validation
    /// (bad magic, wrong class, wrong machine). The object is unusable;
    /// when it is the main executable the session cannot continue.
    #[error("malformed ELF image {path}: {message}")]
    Loader
    {
        /// Path of the offending object
        path: PathBuf,
        /// What was wrong with it
        message: String,
    },

    /// The DWARF data of an object is malformed or uses an unsupported
    /// encoding (DWARF64, version != 4, unknown form, bad opcode table).
    #[error("malformed DWARF data: {0}")]
    Dwarf(String),

    /// A name, id, attribute, or address lookup found nothing.
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// Invalid argument passed to a debugger function.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A hardware resource (debug register slots) has run out.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The child reported a failure over the launch pipe before `exec`.
    #[error("could not launch {path}: {message}")]
    Launch
    {
        /// Program that failed to start
        path: PathBuf,
        /// Error text received from the child
        message: String,
    },

    /// The tracee is not in the state the operation requires.
    #[error("{0}")]
    ProcessState(String),

    /// I/O error (for file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TalonError
{
    /// Build an [`TalonError::Os`] from a context string and an errno.
    pub fn os(context: impl Into<String>, source: Errno) -> Self
    {
        TalonError::Os {
            context: context.into(),
            source,
        }
    }

    /// Build an [`TalonError::Os`] carrying the calling thread's current
    /// errno.
    pub fn os_last(context: impl Into<String>) -> Self
    {
        TalonError::Os {
            context: context.into(),
            source: Errno::last(),
        }
    }

    /// Build an [`TalonError::Loader`] for the object at `path`.
    pub fn loader(path: impl Into<PathBuf>, message: impl Into<String>) -> Self
    {
        TalonError::Loader {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Build an [`TalonError::Lookup`].
    pub fn lookup(message: impl Into<String>) -> Self
    {
        TalonError::Lookup(message.into())
    }
}

/// Convenience type alias for `Result<T, TalonError>`
pub type Result<T> = std::result::Result<T, TalonError>;
