//! Construction of API commands.
//!
//! A [Command] is a `cmd` name plus ordered parameters. The client adds the
//! session token and turns it into an [ApiRequest] for the transport.

use std::fmt;

use indexmap::IndexMap;
use url::Url;

use crate::types::SessionToken;

/// Columns requested by `search` and `edit` when the caller does not choose.
pub const DEFAULT_COLUMNS: [&str; 6] = [
    "sTitle",
    "sStatus",
    "sPersonAssignedTo",
    "sFixFor",
    "tags",
    "sEmailAssignedTo",
];

/// Result cap for `search` when the caller does not choose.
pub const DEFAULT_MAX_RESULTS: u32 = 20;

const CMD_PARAM: &str = "cmd";
const TOKEN_PARAM: &str = "token";
/// Parameters that must never show up in logs.
const SECRET_PARAMS: [&str; 2] = ["password", TOKEN_PARAM];

#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    name: &'static str,
    params: IndexMap<String, String>,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self
            .params
            .iter()
            .map(|(k, v)| {
                let v = if SECRET_PARAMS.contains(&k.as_str()) {
                    "<redacted>"
                } else {
                    v.as_str()
                };
                (k.as_str(), v)
            })
            .collect::<Vec<_>>();
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("params", &params)
            .finish()
    }
}

impl Command {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            params: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn params(&self) -> &IndexMap<String, String> {
        &self.params
    }

    /// Set a parameter, replacing an earlier value of the same name.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if key != CMD_PARAM {
            self.params.insert(key, value.into());
        }
        self
    }

    pub fn with_token(self, token: &SessionToken) -> Self {
        self.param(TOKEN_PARAM, token.secret())
    }

    pub fn logon(email: &str, password: &str) -> Self {
        Self::new("logon")
            .param("email", email)
            .param("password", password)
    }

    pub fn logoff() -> Self {
        Self::new("logoff")
    }

    pub fn list_filters() -> Self {
        Self::new("listFilters")
    }

    pub fn set_current_filter(filter_id: &str) -> Self {
        Self::new("setCurrentFilter").param("sFilter", filter_id)
    }

    pub fn search(query: &str, columns: Option<&[&str]>, max: Option<u32>) -> Self {
        Self::new("search")
            .param("q", query)
            .param("cols", join_columns(columns))
            .param("max", max.unwrap_or(DEFAULT_MAX_RESULTS).to_string())
    }

    /// An `edit` command for case `id`.
    ///
    /// Caller parameters are applied after `ixBug` and `cols` and win over
    /// them; `cmd` and `token` cannot be set this way.
    pub fn edit<K, V>(
        id: &str,
        params: impl IntoIterator<Item = (K, V)>,
        columns: Option<&[&str]>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        params.into_iter().fold(
            Self::new("edit")
                .param("ixBug", id)
                .param("cols", join_columns(columns)),
            |command, (k, v)| {
                let k = k.into();
                if k == TOKEN_PARAM {
                    command
                } else {
                    command.param(k, v)
                }
            },
        )
    }

    /// Build the request for `endpoint`: `cmd` first, then the parameters in
    /// insertion order.
    pub fn into_request(self, endpoint: &Url) -> ApiRequest {
        let mut form = Vec::with_capacity(self.params.len() + 1);
        form.push((CMD_PARAM.to_string(), self.name.to_string()));
        form.extend(self.params);
        ApiRequest {
            url: endpoint.clone(),
            form,
        }
    }
}

fn join_columns(columns: Option<&[&str]>) -> String {
    columns.unwrap_or(&DEFAULT_COLUMNS).join(",")
}

/// A request as handed to the transport: a form POST to `url`.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub url: Url,
    pub form: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn cmd(&self) -> Option<&str> {
        self.field(CMD_PARAM)
    }
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let form = self
            .form
            .iter()
            .map(|(k, v)| {
                if SECRET_PARAMS.contains(&k.as_str()) {
                    (k.as_str(), "<redacted>")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect::<Vec<_>>();
        f.debug_struct("ApiRequest")
            .field("url", &self.url.as_str())
            .field("form", &form)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn endpoint() -> Url {
        Url::parse("https://example.fogbugz.com/api.asp").unwrap()
    }

    fn form(command: Command) -> Vec<(String, String)> {
        command.into_request(&endpoint()).form
    }

    fn pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn search_defaults() {
        assert_eq!(
            form(Command::search("assignedto:me", None, None)),
            pairs(&[
                ("cmd", "search"),
                ("q", "assignedto:me"),
                (
                    "cols",
                    "sTitle,sStatus,sPersonAssignedTo,sFixFor,tags,sEmailAssignedTo"
                ),
                ("max", "20"),
            ])
        );
    }

    #[test]
    fn search_with_columns_and_max() {
        let columns = ["sTitle", "sFooBar"];
        assert_eq!(
            form(Command::search("123", Some(&columns[..]), Some(1))),
            pairs(&[
                ("cmd", "search"),
                ("q", "123"),
                ("cols", "sTitle,sFooBar"),
                ("max", "1"),
            ])
        );
    }

    #[test]
    fn edit_merges_caller_params() {
        let command = Command::edit(
            "42",
            [("sTitle", "New title"), ("cmd", "delete"), ("token", "evil")],
            Some(&["sTitle"][..]),
        )
        .with_token(&SessionToken::new("tok"));
        assert_eq!(
            form(command),
            pairs(&[
                ("cmd", "edit"),
                ("ixBug", "42"),
                ("cols", "sTitle"),
                ("sTitle", "New title"),
                ("token", "tok"),
            ])
        );
    }

    #[test]
    fn token_is_appended() {
        let request = Command::set_current_filter("ez")
            .with_token(&SessionToken::new("tok"))
            .into_request(&endpoint());
        assert_eq!(request.cmd(), Some("setCurrentFilter"));
        assert_eq!(request.field("sFilter"), Some("ez"));
        assert_eq!(request.field("token"), Some("tok"));
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let command = Command::logon("me@example.com", "hunter2").with_token(&"tok123".into());
        let debug = format!("{command:?}");
        assert!(debug.contains("me@example.com"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("tok123"));

        let request = command.into_request(&endpoint());
        let debug = format!("{request:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("tok123"));
    }
}
