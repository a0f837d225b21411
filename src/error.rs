use std::io;

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError as TokioSendError;
use url::ParseError as UrlParseError;

use crate::event::AnnotationEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum YummyError {
    #[error("Event channel error: {0}")]
    Channel(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Markup error: {0}")]
    Markup(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("Range error: {0}")]
    Range(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Annotation store error: {0}")]
    Store(String),
}

impl YummyError {
    /// Failures that only cost a single mark (a block that could not be wrapped, a write that
    /// did not land) rather than invalidating the engine state.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            YummyError::Range(_) | YummyError::Store(_) | YummyError::Io(_) | YummyError::Markup(_)
        )
    }
}

impl From<toml::de::Error> for YummyError {
    fn from(src: toml::de::Error) -> YummyError {
        YummyError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for YummyError {
    fn from(src: toml::ser::Error) -> YummyError {
        YummyError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for YummyError {
    fn from(src: JsonError) -> YummyError {
        YummyError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<UrlParseError> for YummyError {
    fn from(src: UrlParseError) -> YummyError {
        YummyError::Serialization(format!("Invalid URL: {src}"))
    }
}

impl From<RegexError> for YummyError {
    fn from(x: RegexError) -> Self {
        YummyError::Serialization(format!("Regex parse failed: {x}"))
    }
}

impl From<io::Error> for YummyError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => YummyError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => YummyError::PermissionDenied,
            _ => YummyError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<TokioSendError<AnnotationEvent>> for YummyError {
    fn from(x: TokioSendError<AnnotationEvent>) -> Self {
        YummyError::Channel(format!(
            "Channel update send Error, could not transmit annotation event {:?}",
            x.0
        ))
    }
}
