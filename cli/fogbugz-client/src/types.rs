//! Domain types returned by [crate::FogbugzClient].

use std::fmt::{self, Display};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::xml::XmlNode;

/// An opaque session token issued by `logon`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

impl From<String> for SessionToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for SessionToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// Result of [crate::FogbugzClient::logon].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logon {
    pub token: SessionToken,
    /// `true` if the token was already held and no request was made.
    pub cached: bool,
}

/// A saved search as returned by `listFilters`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub name: String,
    /// The filter type reported by the server, e.g. `builtin`, `saved` or
    /// `shared`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub id: String,
    /// Web UI link to the filter; derived locally, not sent by the server.
    pub url: String,
}

/// Argument to [crate::FogbugzClient::set_current_filter]: either a bare
/// filter id or a previously listed [Filter].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterRef {
    Id(String),
    Filter(Filter),
}

impl FilterRef {
    pub fn id(&self) -> &str {
        match self {
            FilterRef::Id(id) => id,
            FilterRef::Filter(filter) => &filter.id,
        }
    }
}

impl From<&str> for FilterRef {
    fn from(id: &str) -> Self {
        FilterRef::Id(id.to_string())
    }
}

impl From<String> for FilterRef {
    fn from(id: String) -> Self {
        FilterRef::Id(id)
    }
}

impl From<Filter> for FilterRef {
    fn from(filter: Filter) -> Self {
        FilterRef::Filter(filter)
    }
}

impl From<&Filter> for FilterRef {
    fn from(filter: &Filter) -> Self {
        FilterRef::Filter(filter.clone())
    }
}

/// A server field that [Case] does not model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtraField {
    /// A field that occurred once with text content, trimmed.
    Text(String),
    /// A field that occurred once with nested structure, as sent.
    Node(XmlNode),
    /// A field that occurred several times, as sent.
    List(Vec<XmlNode>),
}

impl ExtraField {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ExtraField::Text(text) => Some(text),
            ExtraField::Node(_) | ExtraField::List(_) => None,
        }
    }
}

/// A FogBugz case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    /// `ixBug`
    pub id: String,
    /// Actions currently permitted on the case, in server order.
    pub operations: Vec<String>,
    pub title: Option<String>,
    pub status: Option<String>,
    pub url: String,
    pub fix_for: Option<String>,
    pub assigned_to: Option<String>,
    pub assigned_to_email: Option<String>,
    /// Tags joined with `", "`.
    pub tags: Option<String>,
    /// Fields requested through the column selection that are not modeled
    /// above, keyed by their server name in order of appearance.
    pub extra: IndexMap<String, ExtraField>,
    /// The unprocessed `<case>` element.
    #[serde(rename = "_raw")]
    pub raw: XmlNode,
}

impl Case {
    pub fn extra(&self, field: &str) -> Option<&ExtraField> {
        self.extra.get(field)
    }

    /// Convenience for text-valued extra fields.
    pub fn extra_text(&self, field: &str) -> Option<&str> {
        self.extra(field).and_then(ExtraField::as_text)
    }

    pub fn can(&self, operation: &str) -> bool {
        self.operations.iter().any(|op| op == operation)
    }
}

impl Display for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        if let Some(title) = &self.title {
            write!(f, ": {title}")?;
        }
        if let Some(status) = &self.status {
            write!(f, " ({status})")?;
        }
        Ok(())
    }
}

/// The cases matched by a search or touched by an edit.
///
/// A single match is returned bare, several matches as a list in document
/// order. There is no empty variant: zero matches are reported as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CaseResult {
    Single(Case),
    Multiple(Vec<Case>),
}

impl CaseResult {
    pub(crate) fn from_cases(mut cases: Vec<Case>) -> Option<Self> {
        match cases.len() {
            0 => None,
            1 => cases.pop().map(CaseResult::Single),
            _ => Some(CaseResult::Multiple(cases)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CaseResult::Single(_) => 1,
            CaseResult::Multiple(cases) => cases.len(),
        }
    }

    /// Always `false`; provided for symmetry with [CaseResult::len].
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn as_single(&self) -> Option<&Case> {
        match self {
            CaseResult::Single(case) => Some(case),
            CaseResult::Multiple(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Case> {
        let cases = match self {
            CaseResult::Single(case) => std::slice::from_ref(case),
            CaseResult::Multiple(cases) => cases.as_slice(),
        };
        cases.iter()
    }

    pub fn into_vec(self) -> Vec<Case> {
        match self {
            CaseResult::Single(case) => vec![case],
            CaseResult::Multiple(cases) => cases,
        }
    }
}
