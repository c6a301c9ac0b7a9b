use std::{any::Any, error::Error as StdError};

/// Routing engine errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The tabular store could not be read; the previous table stays in force.
    #[error("failed to fetch routing rows: {source}")]
    Fetch {
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// A single forward attempt failed or panicked.
    #[error("forward to {destination} failed: {message}")]
    Forward {
        destination: String,
        message: String,
    },
}

impl Error {
    #[must_use]
    pub fn fetch(source: anyhow::Error) -> Self {
        Self::Fetch {
            source: source.into(),
        }
    }

    #[must_use]
    pub fn forward(destination: impl ToString, message: impl Into<String>) -> Self {
        Self::Forward {
            destination: destination.to_string(),
            message: message.into(),
        }
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

pub type Result<T> = std::result::Result<T, Error>;
