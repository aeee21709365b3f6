use std::time::Duration;

pub type StudioResult<T> = Result<T, StudioError>;

#[derive(thiserror::Error, Debug)]
pub enum StudioError {
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("image conversion failed: {0}")]
    ConversionFailed(String),

    #[error("no API key stored")]
    MissingCredential,

    #[error("provider returned no image")]
    NoImageProduced,

    #[error("provider returned no result: {0}")]
    NoResultProduced(String),

    #[error("provider rejected the request ({status}): {body}")]
    ProviderRejected { status: u16, body: String },

    #[error("provider request failed ({status}): {body}")]
    ProviderFailed { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("a {0} job is already running")]
    JobAlreadyRunning(&'static str),

    #[error("operation still pending after {0:?}")]
    PollTimedOut(Duration),

    #[error("a model photo and at least one garment are required")]
    IncompleteOutfit,

    #[error("no generated image yet")]
    NoCurrentImage,

    #[error("prompt is empty")]
    EmptyPrompt,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StudioError {
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::ConversionFailed(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Message suitable for showing to the end user.
    pub fn user_message(&self) -> String {
        match self {
            StudioError::UnsupportedFormat(detail) => {
                format!("This file type is not supported ({detail}). Use a PNG, JPEG, GIF, WebP, AVIF or HEIC image.")
            }
            StudioError::ConversionFailed(detail) => {
                format!("The image could not be converted ({detail}). Try another file.")
            }
            StudioError::MissingCredential => {
                "API key not found. Please enter your key.".to_string()
            }
            StudioError::NoImageProduced => "No image was generated. Try again.".to_string(),
            StudioError::NoResultProduced(_) => "Video generation failed.".to_string(),
            StudioError::ProviderRejected { .. } => {
                "Invalid API key or missing permission. Log out and enter another key.".to_string()
            }
            StudioError::JobAlreadyRunning(kind) => {
                format!("Please wait for the current {kind} to finish.")
            }
            StudioError::PollTimedOut(_) => {
                "Video generation is taking too long; try again later.".to_string()
            }
            other => other.to_string(),
        }
    }
}
