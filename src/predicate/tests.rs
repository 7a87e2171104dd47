//! Unit tests for predicate composition and the built-in checks.

use std::{collections::BTreeSet, time::Duration};

use bytes::Bytes;
use rstest::{fixture, rstest};

use super::*;
use crate::{
    api::{ApiDescription, BodySchema, ContentType, FieldSpec, route},
    generator::{BodyInput, RequestInputs},
    value::{Value, ValueType},
};

/// Answers every follow-up `GET` with a canned response.
struct CannedTransport {
    reply: Option<Response>,
}

#[async_trait]
impl Transport for CannedTransport {
    async fn send(&self, base: &Url, _request: &GeneratedRequest) -> Result<Response, TransportError> {
        self.get(base).await
    }

    async fn get(&self, url: &Url) -> Result<Response, TransportError> {
        self.reply.clone().ok_or_else(|| TransportError::Timeout {
            url: url.to_string(),
            timeout: Duration::from_secs(1),
        })
    }
}

fn response(status: u16, headers: &[(&str, &str)], body: &str) -> Response {
    Response {
        status,
        headers: headers
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect(),
        body: Bytes::from(body.to_owned()),
        elapsed: Duration::from_millis(5),
    }
}

#[fixture]
fn get_item() -> GeneratedRequest {
    let description = ApiDescription::build(
        &route()
            .segment("items")
            .capture("id", ValueType::Integer)
            .get(["application/json"]),
    )
    .expect("valid api");
    let endpoint = description.endpoints().first().expect("endpoint");
    GeneratedRequest::assemble(
        Arc::clone(endpoint),
        RequestInputs {
            captures: vec![Value::Integer(3)],
            ..RequestInputs::default()
        },
    )
    .expect("assembles")
}

fn post_item(name: &str) -> GeneratedRequest {
    let description = ApiDescription::build(
        &route()
            .segment("items")
            .body(
                BodySchema::object([FieldSpec::required(
                    "name",
                    BodySchema::scalar(ValueType::Text),
                )]),
                ["application/json"],
            )
            .post(["application/json"]),
    )
    .expect("valid api");
    let endpoint = description.endpoints().first().expect("endpoint");
    GeneratedRequest::assemble(
        Arc::clone(endpoint),
        RequestInputs {
            body: Some(BodyInput {
                value: Value::Object(vec![("name".to_owned(), Some(Value::Text(name.to_owned())))]),
                content_type: ContentType::Json,
            }),
            ..RequestInputs::default()
        },
    )
    .expect("assembles")
}

async fn violations(
    predicate: &Predicate,
    request: &GeneratedRequest,
    observed: &Response,
    transport: &CannedTransport,
) -> Vec<String> {
    let base = Url::parse("http://127.0.0.1:9/").expect("base url");
    predicate
        .evaluate(&Exchange {
            request,
            response: observed,
            base_url: &base,
            transport,
        })
        .await
        .expect("no transport failure")
        .into_iter()
        .map(|violation| violation.predicate)
        .collect()
}

fn always_fails(name: &'static str) -> Predicate {
    Predicate::new(name, |_, _| Err("nope".to_owned()))
}

#[rstest]
#[tokio::test]
async fn identity_always_passes(get_item: GeneratedRequest) {
    let transport = CannedTransport { reply: None };
    let observed = response(500, &[], "");
    assert!(Predicate::identity().is_identity());
    assert!(
        violations(&Predicate::identity(), &get_item, &observed, &transport)
            .await
            .is_empty()
    );
    let with_identity = never_5xx().and(Predicate::identity());
    assert_eq!(with_identity.names(), never_5xx().names());
}

#[rstest]
#[tokio::test]
async fn composition_reports_every_violation(get_item: GeneratedRequest) {
    let transport = CannedTransport { reply: None };
    let observed = response(503, &[], "");
    let left = never_5xx()
        .and(always_fails("a"))
        .and(always_fails("b"));
    let right = always_fails("b").and(never_5xx().and(always_fails("a")));
    let from_left: BTreeSet<String> = violations(&left, &get_item, &observed, &transport)
        .await
        .into_iter()
        .collect();
    let from_right: BTreeSet<String> = violations(&right, &get_item, &observed, &transport)
        .await
        .into_iter()
        .collect();
    assert_eq!(from_left, from_right);
    assert_eq!(from_left.len(), 3);
    assert_eq!(
        Predicate::all([never_5xx(), always_fails("a"), always_fails("b")]).names(),
        ["never_5xx", "a", "b"]
    );
}

#[rstest]
#[case(response(200, &[("content-type", "application/json")], "7"), Some("number"))]
#[case(response(200, &[("content-type", "application/json")], "[1]"), Some("array"))]
#[case(response(200, &[("content-type", "application/json")], r#"{"id":1}"#), None)]
#[case(response(200, &[("content-type", "text/plain")], "7"), None)]
#[case(response(200, &[("content-type", "application/json")], "{"), Some("invalid"))]
#[tokio::test]
async fn json_objects_only(
    get_item: GeneratedRequest,
    #[case] observed: Response,
    #[case] expected: Option<&str>,
) {
    let transport = CannedTransport { reply: None };
    let base = Url::parse("http://127.0.0.1:9/").expect("base url");
    let found = json_top_level_is_object()
        .evaluate(&Exchange {
            request: &get_item,
            response: &observed,
            base_url: &base,
            transport: &transport,
        })
        .await
        .expect("no transport failure");
    match expected {
        None => assert!(found.is_empty()),
        Some(fragment) => {
            let violation = found.first().expect("one violation");
            assert!(
                violation.explanation.contains(fragment)
                    || (fragment == "invalid" && violation.explanation.contains("not valid JSON")),
                "unexpected explanation {}",
                violation.explanation
            );
        }
    }
}

#[rstest]
#[case(response(405, &[], ""), "not_allowed_has_allow_header", true)]
#[case(response(405, &[("allow", "GET")], ""), "not_allowed_has_allow_header", false)]
#[case(response(401, &[], ""), "unauthorized_has_www_authenticate", true)]
#[case(response(200, &[], "{}"), "gets_have_cache_control", true)]
#[case(response(200, &[("cache-control", "no-store")], "{}"), "gets_have_cache_control", false)]
#[case(response(200, &[("content-type", "text/html")], "<p>"), "honours_accept_header", true)]
#[case(response(200, &[("content-type", "application/json; charset=utf-8")], "{}"), "honours_accept_header", false)]
#[tokio::test]
async fn header_semantics(
    get_item: GeneratedRequest,
    #[case] observed: Response,
    #[case] check: &str,
    #[case] violated: bool,
) {
    let transport = CannedTransport { reply: None };
    let all = Predicate::all([
        not_allowed_has_allow_header(),
        unauthorized_has_www_authenticate(),
        gets_have_cache_control(),
        honours_accept_header(),
    ]);
    let found = violations(&all, &get_item, &observed, &transport).await;
    assert_eq!(found.iter().any(|name| name == check), violated, "{found:?}");
}

#[rstest]
#[tokio::test]
async fn latency_bound(get_item: GeneratedRequest) {
    let transport = CannedTransport { reply: None };
    let mut slow = response(200, &[], "");
    slow.elapsed = Duration::from_secs(2);
    let limit = not_longer_than(Duration::from_secs(1));
    assert_eq!(
        violations(&limit, &get_item, &slow, &transport).await,
        ["not_longer_than"]
    );
}

#[rstest]
#[case(Some(response(200, &[], r#"{"id":1,"name":"box"}"#)), false)]
#[case(Some(response(200, &[], r#"{"id":1,"name":"other"}"#)), true)]
#[case(Some(response(404, &[], "")), true)]
#[tokio::test]
async fn created_location_is_followed(#[case] reply: Option<Response>, #[case] violated: bool) {
    let transport = CannedTransport { reply };
    let created = response(201, &[("location", "/items/1")], r#"{"id":1}"#);
    let predicate = created_location_retrievable(body_fields_match());
    let found = violations(&predicate, &post_item("box"), &created, &transport).await;
    assert_eq!(!found.is_empty(), violated, "{found:?}");
}

#[tokio::test]
async fn follow_up_transport_failures_propagate() {
    let transport = CannedTransport { reply: None };
    let created = response(201, &[("location", "/items/1")], "");
    let base = Url::parse("http://127.0.0.1:9/").expect("base url");
    let request = post_item("box");
    let result = created_location_retrievable(body_fields_match())
        .evaluate(&Exchange {
            request: &request,
            response: &created,
            base_url: &base,
            transport: &transport,
        })
        .await;
    assert!(matches!(result, Err(TransportError::Timeout { .. })));
}

#[test]
fn resolves_cli_names() {
    assert!(by_name("never-5xx").is_some());
    assert!(by_name("created-location").is_some());
    assert!(by_name("no-such-check").is_none());
}
