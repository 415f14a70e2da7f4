//! Client for the FogBugz XML API.
//!
//! This crate provides:
//! - a session aware client that logs on once and reuses the token
//! - typed results for filters and cases, including unmodeled case columns
//! - detection of errors the server reports inside successful responses
//! - an HTTP transport and a mock transport for testing
//!
//! ## Usage
//!
//! ```ignore
//! use fogbugz_client::{FogbugzClient, FogbugzConfig};
//!
//! let config = FogbugzConfig::load()?;
//! let client = FogbugzClient::new(config)?;
//!
//! client.logon().await?;
//! let cases = client.search("assignedto:me", None, None).await?;
//! ```

mod client;
mod command;
mod config;
mod error;
pub mod extract;
mod mock;
mod session;
mod transport;
mod types;
pub mod xml;

pub use client::FogbugzClient;
pub use command::{ApiRequest, Command, DEFAULT_COLUMNS, DEFAULT_MAX_RESULTS};
pub use config::{FogbugzConfig, DEFAULT_PROTOCOL, FOGBUGZ_CONFIG_FILE};
pub use error::{ConfigError, FogbugzClientError};
pub use mock::{MockResponse, MockTransport};
pub use session::{MemoryTokenStore, TokenStore};
pub use transport::{HttpTransport, Transport, TransportError, TransportTrait};
pub use types::{Case, CaseResult, ExtraField, Filter, FilterRef, Logon, SessionToken};
pub use xml::{XmlDocument, XmlElement, XmlNode, XmlParseError};
