use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, ChexNetError>;

/// Every way a training launch can fail.
///
/// The launcher is fail-fast: none of these are retried, each one aborts
/// the run with a message naming the offending field or file.
#[derive(Debug, Error)]
pub enum ChexNetError {
    #[error("configuration error in {path}: {reason}")]
    Configuration { path: PathBuf, reason: String },

    #[error("{field} : {value} is invalid, please use {expected}")]
    InvalidConfigurationValue {
        field: String,
        value: String,
        expected: &'static str,
    },

    #[error(
        "class {class} is degenerate: {positive} positive samples out of {total}, \
         class weights need at least one positive and one negative sample"
    )]
    DegenerateClass {
        class: String,
        positive: usize,
        total: usize,
    },

    #[error("failed to load weights from {path}: {reason}")]
    WeightsLoad { path: PathBuf, reason: String },

    #[error("failed to load image {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("dataset error at {path}: {reason}")]
    Dataset { path: PathBuf, reason: String },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("training statistics at {path} are malformed: {source}")]
    Stats {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ChexNetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn dataset(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Dataset {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn weights(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::WeightsLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: &'static str,
    ) -> Self {
        Self::InvalidConfigurationValue {
            field: field.into(),
            value: value.into(),
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_message_names_field_and_value() {
        let err = ChexNetError::invalid("train_steps", "abc", "'auto' or specify an integer");
        let msg = err.to_string();
        assert!(msg.contains("train_steps"));
        assert!(msg.contains("abc"));
        assert!(msg.contains("'auto'"));
    }

    #[test]
    fn test_degenerate_class_message() {
        let err = ChexNetError::DegenerateClass {
            class: "Hernia".to_string(),
            positive: 0,
            total: 10,
        };
        assert!(err.to_string().contains("Hernia"));
    }
}
