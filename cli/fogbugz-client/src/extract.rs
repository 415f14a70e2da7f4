//! Extraction of typed results from parsed responses.
//!
//! Every response is checked for a server-side `<error>` first
//! ([check_response]); only then does the operation specific extractor walk
//! the tree. A missing node after a successful check is reported as
//! [FogbugzClientError::Unknown].

use indexmap::IndexMap;
use tracing::debug;

use crate::config::FogbugzConfig;
use crate::error::FogbugzClientError;
use crate::types::{Case, ExtraField, Filter, SessionToken};
use crate::xml::{unwrap_single, XmlDocument, XmlElement, XmlNode};

const RESPONSE_TAG: &str = "response";

/// Child elements of `<case>` that map onto [Case] fields and are therefore
/// not copied into [Case::extra].
const CASE_FIELDS: [&str; 6] = [
    "sTitle",
    "sStatus",
    "sFixFor",
    "sPersonAssignedTo",
    "sEmailAssignedTo",
    "tags",
];

/// Fail with [FogbugzClientError::Service] if the response reports an error,
/// otherwise return the `<response>` node.
pub fn check_response(document: &XmlDocument) -> Result<&XmlNode, FogbugzClientError> {
    if document.root_name != RESPONSE_TAG {
        return Err(FogbugzClientError::unknown(format!(
            "expected <{RESPONSE_TAG}> root element, found <{}>",
            document.root_name
        )));
    }

    let response = &document.root;
    if let Some(error) = response.first_child("error") {
        let code = error.attribute("code").map(str::to_string);
        let message = error.text().unwrap_or_default().to_string();
        debug!(?code, %message, "FogBugz reported an error");
        return Err(FogbugzClientError::Service { code, message });
    }

    Ok(response)
}

/// `<response><token>...</token></response>`
pub fn extract_token(response: &XmlNode) -> Result<SessionToken, FogbugzClientError> {
    response
        .single_child("token")
        .and_then(XmlNode::as_text)
        .map(SessionToken::new)
        .ok_or_else(|| FogbugzClientError::unknown("response contains no token"))
}

/// `<response><filters><filter type=".." sFilter="..">name</filter>...</filters></response>`
///
/// An empty filter list is an error; the API has no way to tell it apart from
/// a failed request.
pub fn extract_filters(
    response: &XmlNode,
    config: &FogbugzConfig,
) -> Result<Vec<Filter>, FogbugzClientError> {
    let filters = response
        .single_child("filters")
        .and_then(|filters| filters.children("filter"))
        .unwrap_or_default();

    if filters.is_empty() {
        return Err(FogbugzClientError::unknown("response contains no filters"));
    }

    filters
        .iter()
        .map(|node| {
            let id = node
                .attribute("sFilter")
                .ok_or_else(|| FogbugzClientError::unknown("filter without sFilter attribute"))?;
            Ok(Filter {
                name: node.text().unwrap_or_default().trim().to_string(),
                kind: node.attribute("type").map(str::to_string),
                id: id.to_string(),
                url: config.filter_url(id),
            })
        })
        .collect()
}

/// `<response><cases><case ixBug="..">...</case>...</cases></response>`, the
/// shape of `search` responses.
///
/// A `cases` container without any `case` is reported as
/// [FogbugzClientError::BugNotFound].
pub fn extract_search_cases(
    response: &XmlNode,
    config: &FogbugzConfig,
) -> Result<Vec<Case>, FogbugzClientError> {
    let container = response
        .single_child("cases")
        .ok_or_else(|| FogbugzClientError::unknown("response contains no cases"))?;

    match container.children("case") {
        Some(cases) if !cases.is_empty() => extract_cases(cases, config),
        _ => Err(FogbugzClientError::BugNotFound),
    }
}

/// `<response><case ixBug="..">...</case></response>`, the shape of `edit`
/// responses.
pub fn extract_edited_cases(
    response: &XmlNode,
    config: &FogbugzConfig,
) -> Result<Vec<Case>, FogbugzClientError> {
    match response.children("case") {
        Some(cases) if !cases.is_empty() => extract_cases(cases, config),
        _ => Err(FogbugzClientError::unknown("response contains no case")),
    }
}

fn extract_cases(nodes: &[XmlNode], config: &FogbugzConfig) -> Result<Vec<Case>, FogbugzClientError> {
    let cases = nodes
        .iter()
        .map(|node| extract_case(node, config))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(n_cases = cases.len(), "extracted cases");
    Ok(cases)
}

fn extract_case(node: &XmlNode, config: &FogbugzConfig) -> Result<Case, FogbugzClientError> {
    let element = node
        .as_element()
        .ok_or_else(|| FogbugzClientError::unknown("case without attributes"))?;
    let id = node
        .attribute("ixBug")
        .ok_or_else(|| FogbugzClientError::unknown("case without ixBug attribute"))?;

    let (assigned_to, assigned_to_email) = if element.children.contains_key("sPersonAssignedTo") {
        (
            first_text(node, "sPersonAssignedTo"),
            first_text(node, "sEmailAssignedTo"),
        )
    } else {
        (None, None)
    };

    Ok(Case {
        id: id.to_string(),
        operations: split_operations(node.attribute("operations").unwrap_or_default()),
        title: first_text(node, "sTitle"),
        status: first_text(node, "sStatus"),
        url: config.case_url(id),
        fix_for: first_text(node, "sFixFor"),
        assigned_to,
        assigned_to_email,
        tags: join_tags(node),
        extra: residual_fields(element),
        raw: node.clone(),
    })
}

/// Text of the first `tag` child, trimmed.
fn first_text(node: &XmlNode, tag: &str) -> Option<String> {
    node.first_child(tag)
        .map(|child| child.text().unwrap_or_default().trim().to_string())
}

/// Split the comma separated `operations` attribute.
pub(crate) fn split_operations(operations: &str) -> Vec<String> {
    operations
        .split(',')
        .map(str::trim)
        .filter(|op| !op.is_empty())
        .map(str::to_string)
        .collect()
}

/// `<tags><tag>a</tag><tag>b</tag></tags>` as `"a, b"`.
fn join_tags(node: &XmlNode) -> Option<String> {
    let tags = node.first_child("tags")?.children("tag")?;
    let joined = tags
        .iter()
        .map(|tag| tag.text().unwrap_or_default().trim())
        .collect::<Vec<_>>()
        .join(", ");
    Some(joined)
}

/// Copy every child that [CASE_FIELDS] does not cover.
///
/// A field that occurs once is unwrapped (and trimmed if it is text), repeated
/// fields are kept as the list of nodes.
pub(crate) fn residual_fields(element: &XmlElement) -> IndexMap<String, ExtraField> {
    element
        .children
        .iter()
        .filter(|(key, _)| !CASE_FIELDS.contains(&key.as_str()))
        .map(|(key, nodes)| {
            let value = match unwrap_single(nodes) {
                Some(XmlNode::Text(text)) => ExtraField::Text(text.trim().to_string()),
                Some(node) => ExtraField::Node(node.clone()),
                None => ExtraField::List(nodes.clone()),
            };
            (key.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::xml::parse_document;

    fn config() -> FogbugzConfig {
        FogbugzConfig::new("example.fogbugz.com", "me@example.com", "pw")
    }

    fn response(xml: &str) -> XmlDocument {
        parse_document(xml).unwrap()
    }

    const SEARCH_ONE: &str = indoc! {r#"
        <?xml version="1.0" encoding="UTF-8"?>
        <response>
          <cases count="1">
            <case ixBug="1234" operations="edit,assign,resolve,email,remind">
              <sTitle><![CDATA[  Crash on startup  ]]></sTitle>
              <sStatus><![CDATA[Active]]></sStatus>
              <sPersonAssignedTo><![CDATA[Jane Doe]]></sPersonAssignedTo>
              <sEmailAssignedTo><![CDATA[jane@example.com]]></sEmailAssignedTo>
              <sFixFor><![CDATA[ Undecided ]]></sFixFor>
              <tags>
                <tag><![CDATA[urgent]]></tag>
                <tag><![CDATA[ui]]></tag>
              </tags>
              <sFooBar><![CDATA[ FOO FOO FOO ]]></sFooBar>
              <events>
                <event ixBugEvent="1"/>
                <event ixBugEvent="2"/>
              </events>
              <ixPriority>3</ixPriority>
              <ixPriority>4</ixPriority>
            </case>
          </cases>
        </response>
    "#};

    // region: error detection

    #[test]
    fn service_error_is_detected() {
        let doc = response(r#"<response><error code="3"><![CDATA[Not logged on]]></error></response>"#);
        let err = check_response(&doc).unwrap_err();
        assert!(
            matches!(
                &err,
                FogbugzClientError::Service { code: Some(code), message }
                    if code == "3" && message == "Not logged on"
            ),
            "{err:?}"
        );
    }

    #[test]
    fn service_error_wins_over_payload() {
        let doc = response("<response><token>abc</token><error>Nope</error></response>");
        assert!(matches!(
            check_response(&doc),
            Err(FogbugzClientError::Service { message, .. }) if message == "Nope"
        ));
    }

    #[test]
    fn wrong_root_is_unknown() {
        let doc = response("<html><body>proxy error</body></html>");
        assert!(matches!(
            check_response(&doc),
            Err(FogbugzClientError::Unknown(_))
        ));
    }

    // endregion

    #[test]
    fn token_is_returned_verbatim() {
        let doc = response("<response><token><![CDATA[ 24dsg34lok43un23 ]]></token></response>");
        let token = extract_token(check_response(&doc).unwrap()).unwrap();
        assert_eq!(token.secret(), " 24dsg34lok43un23 ");
    }

    #[test]
    fn missing_token_is_unknown() {
        let doc = response("<response></response>");
        assert!(matches!(
            extract_token(check_response(&doc).unwrap()),
            Err(FogbugzClientError::Unknown(_))
        ));
    }

    #[test]
    fn filters_are_extracted_in_order() {
        let doc = response(indoc! {r#"
            <response>
              <filters>
                <filter type="builtin" sFilter="ez">
                  My Cases
                </filter>
                <filter sFilter="inbox">Inbox</filter>
              </filters>
            </response>
        "#});
        let filters = extract_filters(check_response(&doc).unwrap(), &config()).unwrap();
        assert_eq!(filters, vec![
            Filter {
                name: "My Cases".to_string(),
                kind: Some("builtin".to_string()),
                id: "ez".to_string(),
                url: "https://example.fogbugz.com/default.asp?pgx=LF&ixFilter=ez".to_string(),
            },
            Filter {
                name: "Inbox".to_string(),
                kind: None,
                id: "inbox".to_string(),
                url: "https://example.fogbugz.com/default.asp?pgx=LF&ixFilter=inbox".to_string(),
            },
        ]);
    }

    #[test]
    fn empty_filter_list_is_unknown() {
        for xml in [
            "<response><filters></filters></response>",
            "<response></response>",
            "<response><filters><filter>no id</filter></filters></response>",
        ] {
            let doc = response(xml);
            assert!(
                matches!(
                    extract_filters(check_response(&doc).unwrap(), &config()),
                    Err(FogbugzClientError::Unknown(_))
                ),
                "{xml}"
            );
        }
    }

    #[test]
    fn case_fields_are_extracted() {
        let doc = response(SEARCH_ONE);
        let cases = extract_search_cases(check_response(&doc).unwrap(), &config()).unwrap();
        assert_eq!(cases.len(), 1);
        let case = &cases[0];

        assert_eq!(case.id, "1234");
        assert_eq!(case.operations, ["edit", "assign", "resolve", "email", "remind"]);
        assert_eq!(case.title.as_deref(), Some("Crash on startup"));
        assert_eq!(case.status.as_deref(), Some("Active"));
        assert_eq!(case.fix_for.as_deref(), Some("Undecided"));
        assert_eq!(case.assigned_to.as_deref(), Some("Jane Doe"));
        assert_eq!(case.assigned_to_email.as_deref(), Some("jane@example.com"));
        assert_eq!(case.tags.as_deref(), Some("urgent, ui"));
        assert_eq!(case.url, "https://example.fogbugz.com/default.asp?1234");
    }

    #[test]
    fn residual_fields_are_preserved() {
        let doc = response(SEARCH_ONE);
        let cases = extract_search_cases(check_response(&doc).unwrap(), &config()).unwrap();
        let case = &cases[0];

        assert_eq!(
            case.extra.keys().collect::<Vec<_>>(),
            ["sFooBar", "events", "ixPriority"]
        );
        assert_eq!(case.extra_text("sFooBar"), Some("FOO FOO FOO"));
        assert!(matches!(case.extra("events"), Some(ExtraField::Node(XmlNode::Element(_)))));
        assert_eq!(
            case.extra("ixPriority"),
            Some(&ExtraField::List(vec![
                XmlNode::Text("3".to_string()),
                XmlNode::Text("4".to_string()),
            ]))
        );

        let raw_case = doc
            .root
            .single_child("cases")
            .and_then(|cases| cases.single_child("case"))
            .unwrap();
        assert_eq!(&case.raw, raw_case);
    }

    #[test]
    fn extraction_is_deterministic() {
        let first = extract_search_cases(check_response(&response(SEARCH_ONE)).unwrap(), &config());
        let second = extract_search_cases(check_response(&response(SEARCH_ONE)).unwrap(), &config());
        assert_eq!(first.unwrap(), second.unwrap());
    }

    #[test]
    fn assignee_is_only_read_when_present() {
        let doc = response(indoc! {r#"
            <response><cases><case ixBug="9" operations="">
              <sEmailAssignedTo>ghost@example.com</sEmailAssignedTo>
              <tags></tags>
            </case></cases></response>
        "#});
        let cases = extract_search_cases(check_response(&doc).unwrap(), &config()).unwrap();
        let case = &cases[0];
        assert_eq!(case.assigned_to, None);
        assert_eq!(case.assigned_to_email, None);
        assert_eq!(case.tags, None);
        assert_eq!(case.title, None);
        assert!(case.operations.is_empty());
        assert!(case.extra.is_empty());
    }

    #[test]
    fn empty_cases_container_is_not_found() {
        let doc = response(r#"<response><cases count="0"></cases></response>"#);
        assert!(matches!(
            extract_search_cases(check_response(&doc).unwrap(), &config()),
            Err(FogbugzClientError::BugNotFound)
        ));
    }

    #[test]
    fn missing_cases_container_is_unknown() {
        let doc = response("<response><filters/></response>");
        assert!(matches!(
            extract_search_cases(check_response(&doc).unwrap(), &config()),
            Err(FogbugzClientError::Unknown(_))
        ));
    }

    #[test]
    fn case_without_id_is_unknown() {
        let doc = response(r#"<response><cases><case operations="edit"><sTitle>x</sTitle></case></cases></response>"#);
        assert!(matches!(
            extract_search_cases(check_response(&doc).unwrap(), &config()),
            Err(FogbugzClientError::Unknown(_))
        ));
    }

    #[test]
    fn edit_response_shape() {
        let doc = response(indoc! {r#"
            <response>
              <case ixBug="77" operations="edit,close">
                <sTitle>Edited</sTitle>
                <sStatus>Resolved (Fixed)</sStatus>
              </case>
            </response>
        "#});
        let cases = extract_edited_cases(check_response(&doc).unwrap(), &config()).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].id, "77");
        assert_eq!(cases[0].status.as_deref(), Some("Resolved (Fixed)"));

        let empty = response("<response></response>");
        assert!(matches!(
            extract_edited_cases(check_response(&empty).unwrap(), &config()),
            Err(FogbugzClientError::Unknown(_))
        ));
    }

    proptest! {
        #[test]
        fn operations_split_preserves_order(ops in proptest::collection::vec("[a-z]{1,8}", 0..8)) {
            let padded = ops.iter().map(|op| format!(" {op} ")).collect::<Vec<_>>().join(",");
            prop_assert_eq!(split_operations(&padded), ops);
        }
    }
}
