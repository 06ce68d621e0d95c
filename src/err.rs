use thiserror::Error;

/// Error kinds reported by probe, bring-up and power transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// Malformed or contradictory configuration/geometry. Fatal at setup
    /// time; never raised once the controller is running.
    #[error("invalid configuration: {0}")]
    Config(&'static str),

    /// A clock, reset line or power supply could not be driven.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(&'static str),

    /// A register verification or bounded wait loop ran out of retries.
    #[error("timed out waiting for {0}")]
    IoTimeout(&'static str),

    /// The MSI bitmap has no free contiguous region of the requested size.
    #[error("no free contiguous MSI vectors")]
    Exhausted,

    /// The controller is strapped or revisioned for a role this driver
    /// cannot serve.
    #[error("unsupported controller: {0}")]
    Unsupported(&'static str),
}

pub type Result<T> = core::result::Result<T, Error>;
