//! Kernel error types.
//!
//! Bus receivers and setting parsing surface errors through [`KernelError`].

/// Unified error type for the Lockwise kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    // -- Bus errors ---------------------------------------------------------
    /// A subscriber fell behind and the channel dropped events for it.
    #[error("bus receiver lagged, {missed} events dropped")]
    Lagged { missed: u64 },

    /// Every sender has been dropped; no further events will arrive.
    #[error("bus closed")]
    BusClosed,

    // -- Settings -----------------------------------------------------------
    /// A persisted or user-supplied setting value could not be parsed.
    #[error("unknown auto-lock setting: {value}")]
    UnknownSetting { value: String },

    // -- Generic ------------------------------------------------------------
    /// Catch-all for unexpected internal errors.
    #[error("internal kernel error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;
