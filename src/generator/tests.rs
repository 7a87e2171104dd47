//! Unit tests for request synthesis.

use proptest::prelude::*;
use rstest::{fixture, rstest};

use super::*;
use crate::api::{ApiNode, FieldSpec, route};

fn decode(component: &str) -> String {
    form_urlencoded::parse(format!("v={component}").as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}

#[fixture]
fn catalogue() -> ApiDescription {
    let api = ApiNode::branch([
        route()
            .segment("items")
            .capture("id", ValueType::Integer)
            .get(["application/json"]),
        route()
            .segment("items")
            .capture("name", ValueType::Text)
            .segment("tags")
            .query("limit", ValueType::Integer)
            .optional_header("x-trace", ValueType::Text)
            .get(["application/json"]),
        route()
            .segment("items")
            .body(
                BodySchema::object([
                    FieldSpec::required("name", BodySchema::scalar(ValueType::Text)),
                    FieldSpec::optional("tag", BodySchema::scalar(ValueType::Text)),
                    FieldSpec::optional(
                        "scores",
                        BodySchema::list(BodySchema::scalar(ValueType::Integer)),
                    ),
                ]),
                ["application/json"],
            )
            .post(["application/json"]),
    ]);
    ApiDescription::build(&api).expect("valid api")
}

fn check_valid(request: &GeneratedRequest, size: u32) {
    let endpoint = request.endpoint();
    let segments: Vec<&str> = request
        .path()
        .strip_prefix('/')
        .expect("absolute path")
        .split('/')
        .collect();
    assert_eq!(segments.len(), endpoint.path.len());
    for ((segment, spec), value) in segments
        .iter()
        .zip(&endpoint.path)
        .filter(|(_, spec)| matches!(spec, PathSegment::Capture { .. }))
        .zip(&request.inputs().captures)
    {
        let PathSegment::Capture { ty, .. } = spec else {
            continue;
        };
        let decoded = decode(segment);
        match ty {
            ValueType::Integer => {
                let n: i64 = decoded.parse().expect("integer capture");
                assert_eq!(Some(n), value.as_integer());
                assert!(n.unsigned_abs() <= u64::from(size));
            }
            _ => assert_eq!(Some(decoded.as_str()), value.as_text()),
        }
    }
    let has_accept = request.headers().iter().any(|(name, _)| name == "accept");
    assert_eq!(has_accept, !endpoint.produces.is_empty());
    if endpoint.body.is_some() {
        let json: serde_json::Value =
            serde_json::from_slice(request.body()).expect("body is json");
        let name = json.get("name").and_then(serde_json::Value::as_str);
        assert!(name.is_some(), "required field present in {json}");
        let content_type = request
            .headers()
            .iter()
            .find(|(name, _)| name == "content-type")
            .map(|(_, value)| value.as_str());
        assert_eq!(content_type, Some("application/json"));
    } else {
        assert!(request.body().is_empty());
    }
}

proptest! {
    /// Every generated request matches its endpoint's template and types.
    #[test]
    fn generated_requests_are_valid(seed in any::<u64>(), size in 0u32..120) {
        let description = catalogue();
        let registry = Registry::with_builtins();
        let generator = RequestGenerator::new(&description, &registry);
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..8 {
            let request = generator.generate(&mut rng, size).expect("generation succeeds");
            check_valid(&request, size);
        }
    }

    /// The same seed and schedule replay the same requests.
    #[test]
    fn sequences_replay(seed in any::<u64>()) {
        let description = catalogue();
        let registry = Registry::with_builtins();
        let generator = RequestGenerator::new(&description, &registry);
        let first: Vec<_> = generator
            .sequence(seed, cycling_sizes(100))
            .take(20)
            .collect::<Result<_, _>>()
            .expect("generation succeeds");
        let mut sequence = generator.sequence(seed, cycling_sizes(100));
        let second: Vec<_> = sequence
            .by_ref()
            .take(20)
            .collect::<Result<_, _>>()
            .expect("generation succeeds");
        prop_assert_eq!(&first, &second);
        sequence.restart();
        let replayed: Vec<_> = sequence
            .take(20)
            .collect::<Result<_, _>>()
            .expect("generation succeeds");
        prop_assert_eq!(first, replayed);
    }
}

#[rstest]
fn size_zero_yields_minimal_values(catalogue: ApiDescription) {
    let registry = Registry::with_builtins();
    let generator = RequestGenerator::new(&catalogue, &registry);
    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..20 {
        let request = generator.generate(&mut rng, 0).expect("generation succeeds");
        for capture in &request.inputs().captures {
            assert_eq!(capture.size(), 0, "{capture} is not minimal");
        }
    }
}

#[rstest]
fn reports_missing_generator(catalogue: ApiDescription) {
    let mut registry = Registry::empty();
    registry.register(ValueType::Integer, crate::value::IntegerGenerator);
    let err = RequestGenerator::new(&catalogue, &registry)
        .validate()
        .expect_err("text has no generator");
    assert_eq!(
        err,
        GenerationError::MissingGenerator {
            field: "name".to_owned(),
            endpoint: "GET /items/{name}/tags".to_owned(),
            ty: ValueType::Text,
        }
    );
}

#[test]
fn literal_only_routes_generate() {
    let description =
        ApiDescription::build(&ApiNode::branch([route().segment("x").get(["text/plain"])]))
            .expect("valid api");
    let registry = Registry::with_builtins();
    let generator = RequestGenerator::new(&description, &registry);
    assert!(generator.validate().is_ok());
    assert!(generate(&description, &registry, 1, 10).is_ok());
}

#[test]
fn percent_encodes_captures_and_query() {
    let description = ApiDescription::build(
        &route()
            .capture("name", ValueType::Text)
            .required_query("q", ValueType::Text)
            .get(Vec::<String>::new()),
    )
    .expect("valid api");
    let endpoint = description.endpoints().first().expect("endpoint");
    let request = GeneratedRequest::assemble(
        Arc::clone(endpoint),
        RequestInputs {
            captures: vec![Value::Text("a b/c?".to_owned())],
            query: vec![Some(Value::Text("x&y=z".to_owned()))],
            headers: Vec::new(),
            body: None,
        },
    )
    .expect("assembles");
    assert_eq!(request.path(), "/a%20b%2Fc%3F");
    assert_eq!(request.query(), "q=x%26y%3Dz");
    assert_eq!(request.path_and_query(), "/a%20b%2Fc%3F?q=x%26y%3Dz");
    assert_eq!(request.to_string(), "GET /a%20b%2Fc%3F?q=x%26y%3Dz");
}

#[test]
fn omits_absent_optionals_and_encodes_forms() {
    let description = ApiDescription::build(
        &route()
            .segment("items")
            .optional_header("x-trace", ValueType::Text)
            .body(
                BodySchema::object([
                    FieldSpec::required("name", BodySchema::scalar(ValueType::Text)),
                    FieldSpec::optional("tag", BodySchema::scalar(ValueType::Text)),
                ]),
                ["application/x-www-form-urlencoded"],
            )
            .post(Vec::<String>::new()),
    )
    .expect("valid api");
    let endpoint = description.endpoints().first().expect("endpoint");
    let request = GeneratedRequest::assemble(
        Arc::clone(endpoint),
        RequestInputs {
            captures: Vec::new(),
            query: Vec::new(),
            headers: vec![None],
            body: Some(BodyInput {
                value: Value::Object(vec![
                    ("name".to_owned(), Some(Value::Text("a b".to_owned()))),
                    ("tag".to_owned(), None),
                ]),
                content_type: ContentType::FormUrlEncoded,
            }),
        },
    )
    .expect("assembles");
    assert_eq!(request.body().as_ref(), b"name=a+b");
    assert_eq!(
        request.headers(),
        [(
            "content-type".to_owned(),
            "application/x-www-form-urlencoded".to_owned()
        )]
    );
    assert_eq!(request.size(), 6);
}

#[test]
fn rejects_mismatched_capture_counts() {
    let description = ApiDescription::build(
        &route().capture("id", ValueType::Integer).get(Vec::<String>::new()),
    )
    .expect("valid api");
    let endpoint = description.endpoints().first().expect("endpoint");
    let err = GeneratedRequest::assemble(Arc::clone(endpoint), RequestInputs::default())
        .expect_err("capture missing");
    assert!(matches!(err, GenerationError::Encode { .. }));
}

#[rstest]
#[case::current(".")]
#[case::parent("..")]
fn rejects_dot_segment_captures(#[case] capture: &str) {
    let description = ApiDescription::build(
        &route()
            .segment("files")
            .capture("name", ValueType::Text)
            .get(Vec::<String>::new()),
    )
    .expect("valid api");
    let endpoint = description.endpoints().first().expect("endpoint");
    let err = GeneratedRequest::assemble(
        Arc::clone(endpoint),
        RequestInputs {
            captures: vec![Value::Text(capture.to_owned())],
            ..RequestInputs::default()
        },
    )
    .expect_err("dot segment");
    assert!(matches!(err, GenerationError::Encode { .. }), "{err}");
}

#[test]
fn sent_path_matches_generated_path() {
    let description = ApiDescription::build(
        &route()
            .segment("files")
            .capture("name", ValueType::Text)
            .get(Vec::<String>::new()),
    )
    .expect("valid api");
    let registry = Registry::with_builtins();
    let base = url::Url::parse("http://127.0.0.1:8080/").expect("base url");
    for seed in 0..2_000 {
        let request = generate(&description, &registry, seed, 2).expect("generation succeeds");
        let sent = crate::transport::request_url(&base, &request).expect("request url");
        assert_eq!(sent.path(), request.path(), "seed {seed}");
    }
}

#[test]
fn cycling_sizes_wrap_after_max() {
    let schedule = cycling_sizes(3);
    let sizes: Vec<u32> = (0..6).map(|trial| schedule(trial)).collect();
    assert_eq!(sizes, [0, 1, 2, 3, 0, 1]);
}
