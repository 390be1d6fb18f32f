/// Convenience result type used across stickerkit.
pub type StickerResult<T> = Result<T, StickerError>;

/// Top-level error taxonomy used by engine APIs.
///
/// `Validation` and `NotFound` describe bad caller input and are recovered by showing the
/// message to the user. `Fetch` and `Render` are transient ("try again later") failures.
/// `CatalogueLoad` and `Config` are startup-only.
#[derive(thiserror::Error, Debug)]
pub enum StickerError {
    /// A request field failed validation.
    #[error("validation error: {field}: {reason}")]
    Validation {
        /// Name of the offending request field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// Unknown character, sticker id, or cache entry.
    #[error("not found: {0}")]
    NotFound(String),

    /// A resource could not be fetched after exhausting the retry budget.
    #[error("fetch error: {reference}: {last_cause}")]
    Fetch {
        /// The resource reference that was requested.
        reference: String,
        /// Rendered cause of the final failed attempt.
        last_cause: String,
    },

    /// The rendering sandbox failed, timed out, or rejected the template.
    #[error("render error: {cause}")]
    Render {
        /// Rendered cause of the failure.
        cause: String,
    },

    /// The catalogue manifest is missing, malformed, or references unusable images.
    #[error("catalogue load error: {0}")]
    CatalogueLoad(String),

    /// Invalid engine configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StickerError {
    /// Build a [`StickerError::Validation`] value.
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Build a [`StickerError::NotFound`] value.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Build a [`StickerError::Fetch`] value.
    pub fn fetch(reference: impl Into<String>, last_cause: impl Into<String>) -> Self {
        Self::Fetch {
            reference: reference.into(),
            last_cause: last_cause.into(),
        }
    }

    /// Build a [`StickerError::Render`] value.
    pub fn render(cause: impl Into<String>) -> Self {
        Self::Render {
            cause: cause.into(),
        }
    }

    /// Build a [`StickerError::CatalogueLoad`] value.
    pub fn catalogue_load(msg: impl Into<String>) -> Self {
        Self::CatalogueLoad(msg.into())
    }

    /// Build a [`StickerError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Return `true` when the error was caused by the caller's input rather than the system.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::NotFound(_))
    }

    /// Text suitable for replying to the chat user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { field, reason } => format!("invalid value for `{field}`: {reason}"),
            Self::NotFound(what) => format!("not found: {what}"),
            Self::Fetch { .. } | Self::Render { .. } | Self::Other(_) => {
                "the sticker could not be generated right now, please try again later".to_owned()
            }
            Self::CatalogueLoad(_) | Self::Config(_) => {
                "the sticker service is not ready".to_owned()
            }
        }
    }
}

impl Clone for StickerError {
    fn clone(&self) -> Self {
        match self {
            Self::Validation { field, reason } => Self::Validation {
                field: *field,
                reason: reason.clone(),
            },
            Self::NotFound(s) => Self::NotFound(s.clone()),
            Self::Fetch {
                reference,
                last_cause,
            } => Self::Fetch {
                reference: reference.clone(),
                last_cause: last_cause.clone(),
            },
            Self::Render { cause } => Self::Render {
                cause: cause.clone(),
            },
            Self::CatalogueLoad(s) => Self::CatalogueLoad(s.clone()),
            Self::Config(s) => Self::Config(s.clone()),
            // anyhow errors are not clonable; keep the full context chain as text.
            Self::Other(e) => Self::Other(anyhow::anyhow!("{e:#}")),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
