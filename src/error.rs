use std::error::Error as StdError;
use std::fmt;

/// Errors surfaced by SDK operations.
///
/// Malformed frames inside a streaming response are deliberately not covered
/// here: they are protocol noise (keepalives, comments) and are skipped
/// without surfacing to the consumer.
#[derive(Debug)]
pub enum Error {
    /// No running instance could be found and no explicit base URL was given.
    Discovery,

    /// The server answered with a success status but the response content was
    /// unusable (no choices, or empty output after trimming).
    InvalidResponse,

    /// The server answered with a status outside 200-299.
    Http(u16),

    /// A response body on the request/response path was not valid JSON of the
    /// expected shape.
    Decode(serde_json::Error),

    /// The connection failed before or while a response was being read.
    Transport(reqwest::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Discovery => write!(f, "no running Osaurus instance found"),
            Error::InvalidResponse => write!(f, "server response contained no usable content"),
            Error::Http(status) => write!(f, "server returned HTTP status {status}"),
            Error::Decode(source) => write!(f, "failed to decode server response: {source}"),
            Error::Transport(source) => write!(f, "request failed: {source}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Decode(source) => Some(source),
            Error::Transport(source) => Some(source),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Error::Decode(source)
    }
}

impl From<reqwest::Error> for Error {
    fn from(source: reqwest::Error) -> Self {
        Error::Transport(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_single_line() {
        let messages = [
            Error::Discovery.to_string(),
            Error::InvalidResponse.to_string(),
            Error::Http(503).to_string(),
        ];
        for message in &messages {
            assert!(!message.is_empty());
            assert!(!message.contains('\n'));
        }
        assert_eq!(Error::Http(503).to_string(), "server returned HTTP status 503");
    }

    #[test]
    fn decode_error_exposes_source() {
        let source = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let error = Error::from(source);
        assert!(matches!(error, Error::Decode(_)));
        assert!(StdError::source(&error).is_some());
    }
}
