use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tokio Join Error, couldn't await a task! {0}")]
    RuntimeJoin(#[from] tokio::task::JoinError),

    /// The request itself failed (timeout, connection reset, DNS...).
    #[error("Reqwest Error: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// The archive answered, but with a status that is neither success nor absence.
    #[error("Unexpected status {status} for {url}")]
    UnexpectedStatus { url: String, status: StatusCode },

    #[error("Image Error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Pdf Error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Invalid issue range: {start} is after {end}")]
    InvalidRange { start: u32, end: u32 },
    #[error("Invalid region code: {0:?}")]
    InvalidRegion(String),
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Cancelled before the issue finished downloading")]
    Cancelled,
}
