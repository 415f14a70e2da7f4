//! FogBugz client: session handling and the public operations.

use std::fmt::Debug;
use std::sync::Arc;

use tracing::{debug, instrument};
use url::Url;

use crate::command::Command;
use crate::config::FogbugzConfig;
use crate::error::FogbugzClientError;
use crate::extract::{
    check_response,
    extract_edited_cases,
    extract_filters,
    extract_search_cases,
    extract_token,
};
use crate::mock::MockTransport;
use crate::session::{MemoryTokenStore, TokenStore};
use crate::transport::{HttpTransport, Transport, TransportTrait};
use crate::types::{CaseResult, Filter, FilterRef, Logon, SessionToken};
use crate::xml::{parse_document, XmlNode};

/// A client for the FogBugz XML API.
///
/// Holds the configuration, a transport and the session token store. Every
/// operation except [FogbugzClient::logon] requires a token and fails with
/// [FogbugzClientError::UndefinedToken] without sending anything if there is
/// none.
///
/// Logging off does not clear the token; call
/// [FogbugzClient::forget_token] for that.
pub struct FogbugzClient {
    config: FogbugzConfig,
    endpoint: Url,
    transport: Transport,
    tokens: Arc<dyn TokenStore>,
}

impl Debug for FogbugzClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FogbugzClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl FogbugzClient {
    /// Create a client that talks HTTP to the configured host and keeps its
    /// token in memory.
    pub fn new(config: FogbugzConfig) -> Result<Self, FogbugzClientError> {
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, transport)
    }

    /// Create a client that uses `transport` and keeps its token in memory.
    pub fn with_transport(
        config: FogbugzConfig,
        transport: impl Into<Transport>,
    ) -> Result<Self, FogbugzClientError> {
        Self::with_parts(config, transport, Arc::new(MemoryTokenStore::new()))
    }

    /// Create a client with an explicit transport and token store, e.g. to
    /// share one session between several clients.
    pub fn with_parts(
        config: FogbugzConfig,
        transport: impl Into<Transport>,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self, FogbugzClientError> {
        let endpoint = config
            .api_url()
            .map_err(|e| FogbugzClientError::Other(e.to_string()))?;
        Ok(Self {
            config,
            endpoint,
            transport: transport.into(),
            tokens,
        })
    }

    /// A client backed by a fresh [MockTransport], returned alongside it.
    pub fn mocked(config: FogbugzConfig) -> Result<(Self, MockTransport), FogbugzClientError> {
        let mock = MockTransport::new();
        let client = Self::with_transport(config, mock.clone())?;
        Ok((client, mock))
    }

    pub fn config(&self) -> &FogbugzConfig {
        &self.config
    }

    // region: token store

    pub fn set_token(&self, token: impl Into<SessionToken>) {
        self.tokens.set(token.into());
    }

    pub fn get_token(&self) -> Option<SessionToken> {
        self.tokens.get()
    }

    pub fn forget_token(&self) {
        self.tokens.clear();
    }

    fn require_token(&self) -> Result<SessionToken, FogbugzClientError> {
        self.tokens.get().ok_or(FogbugzClientError::UndefinedToken)
    }

    // endregion

    /// Send a command and return the checked `<response>` node.
    async fn call(&self, command: Command) -> Result<XmlNode, FogbugzClientError> {
        debug!(?command, "sending FogBugz command");
        let body = self
            .transport
            .send(command.into_request(&self.endpoint))
            .await
            .map_err(FogbugzClientError::Request)?;

        let document = parse_document(&body)?;
        check_response(&document)?;
        Ok(document.root)
    }

    async fn call_authenticated(&self, command: Command) -> Result<XmlNode, FogbugzClientError> {
        let token = self.require_token()?;
        self.call(command.with_token(&token)).await
    }

    /// Log on with the configured credentials.
    ///
    /// If a token is already held it is returned with `cached: true` and no
    /// request is made.
    #[instrument(skip_all, fields(cmd = "logon"))]
    pub async fn logon(&self) -> Result<Logon, FogbugzClientError> {
        if let Some(token) = self.tokens.get() {
            debug!("using cached session token");
            return Ok(Logon {
                token,
                cached: true,
            });
        }

        let response = self
            .call(Command::logon(&self.config.username, &self.config.password))
            .await?;
        let token = extract_token(&response)?;
        self.tokens.set(token.clone());
        debug!("logged on");

        Ok(Logon {
            token,
            cached: false,
        })
    }

    /// End the session on the server. The stored token is left in place.
    #[instrument(skip_all, fields(cmd = "logoff"))]
    pub async fn logoff(&self) -> Result<(), FogbugzClientError> {
        self.call_authenticated(Command::logoff()).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(cmd = "listFilters"))]
    pub async fn list_filters(&self) -> Result<Vec<Filter>, FogbugzClientError> {
        let response = self.call_authenticated(Command::list_filters()).await?;
        let filters = extract_filters(&response, &self.config)?;
        debug!(n_filters = filters.len(), "received filters");
        Ok(filters)
    }

    #[instrument(skip_all, fields(cmd = "setCurrentFilter"))]
    pub async fn set_current_filter(
        &self,
        filter: impl Into<FilterRef>,
    ) -> Result<(), FogbugzClientError> {
        let filter = filter.into();
        self.call_authenticated(Command::set_current_filter(filter.id()))
            .await?;
        Ok(())
    }

    /// Search for cases.
    ///
    /// `columns` defaults to [crate::DEFAULT_COLUMNS], `max` to
    /// [crate::DEFAULT_MAX_RESULTS]. Columns that [crate::Case] does not
    /// model are available through [crate::Case::extra].
    #[instrument(skip_all, fields(cmd = "search", query = %query.as_ref()))]
    pub async fn search(
        &self,
        query: impl AsRef<str>,
        columns: Option<&[&str]>,
        max: Option<u32>,
    ) -> Result<CaseResult, FogbugzClientError> {
        let response = self
            .call_authenticated(Command::search(query.as_ref(), columns, max))
            .await?;
        let cases = extract_search_cases(&response, &self.config)?;
        CaseResult::from_cases(cases).ok_or(FogbugzClientError::BugNotFound)
    }

    /// Fetch a single case by id.
    pub async fn get_bug(
        &self,
        id: impl AsRef<str>,
        columns: Option<&[&str]>,
    ) -> Result<CaseResult, FogbugzClientError> {
        self.search(id, columns, Some(1)).await
    }

    /// Edit case `id`, setting the given API parameters, and return the case
    /// with the requested `columns`.
    #[instrument(skip_all, fields(cmd = "edit", id = %id.as_ref()))]
    pub async fn edit_bug<K, V>(
        &self,
        id: impl AsRef<str>,
        params: impl IntoIterator<Item = (K, V)>,
        columns: Option<&[&str]>,
    ) -> Result<CaseResult, FogbugzClientError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let response = self
            .call_authenticated(Command::edit(id.as_ref(), params, columns))
            .await?;
        let cases = extract_edited_cases(&response, &self.config)?;
        CaseResult::from_cases(cases)
            .ok_or_else(|| FogbugzClientError::unknown("response contains no case"))
    }
}
