//! Unit tests for request shrinking.

use proptest::prelude::*;
use rand::{SeedableRng, rngs::StdRng};

use super::*;
use crate::{
    api::{ApiDescription, ApiNode, ContentType, FieldSpec, route},
    generator::RequestGenerator,
};

fn description(node: &ApiNode) -> ApiDescription { ApiDescription::build(node).expect("valid api") }

fn request(description: &ApiDescription, inputs: RequestInputs) -> GeneratedRequest {
    let endpoint = description.endpoints().first().expect("endpoint");
    GeneratedRequest::assemble(Arc::clone(endpoint), inputs).expect("assembles")
}

#[test]
fn shrinks_integer_capture_toward_zero() {
    let api = description(
        &route()
            .segment("items")
            .capture("id", ValueType::Integer)
            .get(["application/json"]),
    );
    let failing = request(
        &api,
        RequestInputs {
            captures: vec![Value::Integer(-37)],
            ..RequestInputs::default()
        },
    );
    let registry = Registry::with_builtins();
    let paths: Vec<String> = shrink(&failing, &registry)
        .iter()
        .map(|candidate| candidate.path().to_owned())
        .collect();
    assert_eq!(paths, ["/items/0", "/items/-18", "/items/-36"]);
}

#[test]
fn never_proposes_dot_segment_captures() {
    let api = description(
        &route()
            .segment("files")
            .capture("name", ValueType::Text)
            .get(Vec::<String>::new()),
    );
    let failing = request(
        &api,
        RequestInputs {
            captures: vec![Value::Text("..x".to_owned())],
            ..RequestInputs::default()
        },
    );
    let registry = Registry::with_builtins();
    let paths: Vec<String> = shrink(&failing, &registry)
        .iter()
        .map(|candidate| candidate.path().to_owned())
        .collect();
    assert!(paths.contains(&"/files/".to_owned()), "{paths:?}");
    assert!(paths.contains(&"/files/.x".to_owned()), "{paths:?}");
    assert!(
        paths
            .iter()
            .all(|path| !path.ends_with("/.") && !path.ends_with("/..")),
        "{paths:?}"
    );
}

#[test]
fn drops_optional_query_before_shrinking_it() {
    let api = description(
        &route()
            .segment("search")
            .query("q", ValueType::Text)
            .required_query("page", ValueType::Integer)
            .get(["application/json"]),
    );
    let failing = request(
        &api,
        RequestInputs {
            query: vec![Some(Value::Text("bc".to_owned())), Some(Value::Integer(1))],
            ..RequestInputs::default()
        },
    );
    let registry = Registry::with_builtins();
    let queries: Vec<String> = shrink(&failing, &registry)
        .iter()
        .map(|candidate| candidate.query().to_owned())
        .collect();
    assert_eq!(
        queries,
        ["page=1", "q=&page=1", "q=b&page=1", "q=ac&page=1", "q=c&page=1", "q=bc&page=0"]
    );
}

#[test]
fn body_fields_drop_then_shrink() {
    let api = description(
        &route()
            .segment("items")
            .body(
                BodySchema::object([
                    FieldSpec::required("name", BodySchema::scalar(ValueType::Text)),
                    FieldSpec::optional("tag", BodySchema::scalar(ValueType::Text)),
                ]),
                ["application/json"],
            )
            .post(["application/json"]),
    );
    let failing = request(
        &api,
        RequestInputs {
            body: Some(BodyInput {
                value: Value::Object(vec![
                    ("name".to_owned(), Some(Value::Text("a".to_owned()))),
                    ("tag".to_owned(), Some(Value::Text("a".to_owned()))),
                ]),
                content_type: ContentType::Json,
            }),
            ..RequestInputs::default()
        },
    );
    let registry = Registry::with_builtins();
    let bodies: Vec<String> = shrink(&failing, &registry)
        .iter()
        .map(|candidate| String::from_utf8_lossy(candidate.body()).into_owned())
        .collect();
    assert_eq!(
        bodies,
        [
            r#"{"name":"a"}"#,
            r#"{"name":"","tag":"a"}"#,
            r#"{"name":"a","tag":""}"#,
        ]
    );
}

#[test]
fn lists_shrink_by_removal_first() {
    let api = description(
        &route()
            .segment("batch")
            .body(
                BodySchema::list(BodySchema::scalar(ValueType::Integer)),
                ["application/json"],
            )
            .put(Vec::<String>::new()),
    );
    let failing = request(
        &api,
        RequestInputs {
            body: Some(BodyInput {
                value: Value::List(vec![Value::Integer(0), Value::Integer(1)]),
                content_type: ContentType::Json,
            }),
            ..RequestInputs::default()
        },
    );
    let registry = Registry::with_builtins();
    let bodies: Vec<String> = shrink(&failing, &registry)
        .iter()
        .map(|candidate| String::from_utf8_lossy(candidate.body()).into_owned())
        .collect();
    assert_eq!(bodies, ["[]", "[0]", "[1]", "[0]", "[0,0]"]);
}

#[test]
fn minimal_requests_have_no_candidates() {
    let api = description(
        &route()
            .segment("items")
            .capture("id", ValueType::Integer)
            .get(["application/json"]),
    );
    let minimal = request(
        &api,
        RequestInputs {
            captures: vec![Value::Integer(0)],
            ..RequestInputs::default()
        },
    );
    assert!(shrink(&minimal, &Registry::with_builtins()).is_empty());
}

proptest! {
    /// Candidates keep the endpoint and strictly decrease in size.
    #[test]
    fn candidates_are_strictly_smaller(seed in any::<u64>(), size in 0u32..60) {
        let api = description(&ApiNode::branch([
            route().segment("items").capture("id", ValueType::Integer).get(["application/json"]),
            route()
                .segment("items")
                .query("tag", ValueType::Text)
                .body(
                    BodySchema::object([
                        FieldSpec::required("name", BodySchema::scalar(ValueType::Text)),
                        FieldSpec::optional(
                            "flags",
                            BodySchema::list(BodySchema::scalar(ValueType::Boolean)),
                        ),
                    ]),
                    ["application/json"],
                )
                .post(["application/json"]),
        ]));
        let registry = Registry::with_builtins();
        let generator = RequestGenerator::new(&api, &registry);
        let original = generator
            .generate(&mut StdRng::seed_from_u64(seed), size)
            .expect("generation succeeds");
        for candidate in Shrinker::new(&registry).candidates(&original) {
            prop_assert!(candidate.size() < original.size());
            prop_assert!(Arc::ptr_eq(candidate.endpoint(), original.endpoint()));
        }
    }
}
