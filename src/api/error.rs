use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Failed to make BeanHub API call with code {status} and error: {detail}")]
    UnexpectedStatus { status: u16, detail: String },

    #[error("BeanHub API rejected the request with validation error: {detail}")]
    Validation { detail: String },

    #[error("Failed to reach BeanHub API")]
    Transport(#[from] reqwest::Error),
}
