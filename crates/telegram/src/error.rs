use {teloxide::RequestError, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error("telegram API request failed: {0}")]
    Telegram(#[from] RequestError),

    #[error("failed to build telegram HTTP client: {0}")]
    Client(String),

    /// A `copyMessage` call was rejected for one destination.
    #[error("copy to {destination} failed: {source}")]
    Copy {
        destination: String,
        #[source]
        source: RequestError,
    },
}

impl Error {
    pub fn copy(destination: impl ToString, source: RequestError) -> Self {
        Self::Copy {
            destination: destination.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
