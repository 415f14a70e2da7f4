//! Error handling for FogBugz API operations.

use thiserror::Error;

use crate::transport::TransportError;
use crate::xml::XmlParseError;

/// Error type for all client operations.
#[derive(Debug, Error)]
pub enum FogbugzClientError {
    /// An operation that requires a session was called without a token.
    #[error("not logged on: no session token is set")]
    UndefinedToken,
    /// The transport failed to deliver the request or fetch the response.
    ///
    /// The transport's error is kept untouched and exposed as the error's
    /// source.
    #[error("request to FogBugz failed")]
    Request(#[source] TransportError),
    #[error("could not parse FogBugz response")]
    XmlParse(#[from] XmlParseError),
    /// The server answered with an `<error>` element.
    #[error("{}", fmt_service_error(code.as_deref(), message))]
    Service {
        code: Option<String>,
        message: String,
    },
    /// The response was well formed and not an error, but did not have the
    /// shape the operation expects.
    #[error("unexpected response from FogBugz: {0}")]
    Unknown(String),
    /// A search matched no cases.
    #[error("no matching cases found")]
    BugNotFound,
    #[error("{}", .0)]
    Other(String),
}

impl FogbugzClientError {
    pub(crate) fn unknown(what: impl Into<String>) -> Self {
        FogbugzClientError::Unknown(what.into())
    }

    /// The transport error, if this error was caused by one.
    pub fn transport_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            FogbugzClientError::Request(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

fn fmt_service_error(code: Option<&str>, message: &str) -> String {
    match code {
        Some(code) => format!("FogBugz error {code}: {message}"),
        None => format!("FogBugz error: {message}"),
    }
}

/// Errors while loading a [crate::FogbugzConfig].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration")]
    Config(#[from] config::ConfigError),
    #[error("no FogBugz host configured")]
    MissingHost,
    #[error("invalid FogBugz URL '{url}'")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}
