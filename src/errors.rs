use thiserror::Error;

/// Failures surfaced to the user when play mode cannot start.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActivationError {
    #[error("Site not supported or not detected.")]
    Unsupported { host: String },

    #[error("Could not extract song content. The page might not be fully loaded yet.")]
    ExtractionFailed { attempts: u32 },
}
