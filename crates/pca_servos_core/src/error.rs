//!A mod for the error types
use std::{
    error::Error,
    fmt::{Debug, Display},
};

///Failure reported by a bus transport. Carries the underlying cause when there is one.
pub struct TransportError {
    message: String,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl TransportError {
    pub fn message(msg: &str) -> Self {
        TransportError {
            message: msg.to_string(),
            source: None,
        }
    }

    pub fn from_string(msg: String) -> Self {
        TransportError {
            message: msg,
            source: None,
        }
    }

    pub fn with_source<E>(msg: &str, source: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        TransportError {
            message: msg.to_string(),
            source: Some(Box::new(source)),
        }
    }

    pub fn text(&self) -> &str {
        &self.message
    }
}

impl Debug for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            Some(source) => f.write_fmt(format_args!(
                "TransportError: {} (cause: {:?})",
                self.message, source
            )),
            None => f.write_fmt(format_args!("TransportError: {}", self.message)),
        }
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            Some(source) => f.write_fmt(format_args!("{}: {}", self.message, source)),
            None => f.write_str(&self.message),
        }
    }
}

impl Error for TransportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn Error + 'static))
    }
}

///Common error type for every servo operation.
pub enum ServoError {
    ///Channel number outside 0-15.
    InvalidChannel(u8),
    ///Inverted limits, or pulse timings that don't fit in the PWM cycle.
    Configuration(String),
    ///The bus failed underneath us.
    Transport(TransportError),
    ///The device was never initialized, failed to initialize, or has been closed.
    NotInitialized,
}

impl ServoError {
    pub fn configuration(msg: &str) -> Self {
        ServoError::Configuration(msg.to_string())
    }
}

impl Debug for ServoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidChannel(channel) => {
                f.write_fmt(format_args!("ServoError: invalid channel {}", channel))
            }
            Self::Configuration(message) => f.write_fmt(format_args!(
                "ServoError: configuration error: {}",
                message
            )),
            Self::Transport(err) => f.write_fmt(format_args!("ServoError: {:?}", err)),
            Self::NotInitialized => f.write_str("ServoError: device not initialized"),
        }
    }
}

impl Display for ServoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidChannel(channel) => f.write_fmt(format_args!(
                "channel {} is out of range (0-15)",
                channel
            )),
            Self::Configuration(message) => {
                f.write_fmt(format_args!("configuration error: {}", message))
            }
            Self::Transport(err) => f.write_fmt(format_args!("transport error: {}", err)),
            Self::NotInitialized => f.write_str("device not initialized"),
        }
    }
}

impl Error for ServoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransportError> for ServoError {
    fn from(err: TransportError) -> Self {
        ServoError::Transport(err)
    }
}
