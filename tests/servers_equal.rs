//! End-to-end equivalence runs between pairs of fixture servers.

use rstest::rstest;
use servecheck::{
    CheckOptions,
    EquivalenceResult,
    Value,
    equivalence::{byte_equal, ignoring_headers, json_equal},
    servers_equal,
};
use test_util::{TestApp, named_items_api, named_items_app};

fn seeded(seed: u64, trials: u32) -> CheckOptions {
    CheckOptions {
        trial_count: trials,
        seed: Some(seed),
        ..CheckOptions::default()
    }
}

#[tokio::test]
async fn divergence_shrinks_to_the_first_dropped_name() {
    let api = named_items_api().expect("named items api");
    let reference = TestApp::spawn(named_items_app(None))
        .await
        .expect("reference starts");
    let truncating = TestApp::spawn(named_items_app(Some(50)))
        .await
        .expect("candidate starts");
    let result = servers_equal(
        &api,
        &reference.url().expect("url"),
        &truncating.url().expect("url"),
        &seeded(7, 500),
        &byte_equal(),
    )
    .await
    .expect("run completes");
    let mismatch = result.mismatch().expect("servers diverge");
    let inputs = mismatch.request.inputs();
    let name = inputs
        .query
        .first()
        .and_then(Option::as_ref)
        .and_then(Value::as_text)
        .expect("name present");
    assert_eq!(name.chars().count(), 51);
    assert_eq!(inputs.captures, [Value::Integer(0)]);
    assert_eq!(mismatch.seed, 7);
}

#[rstest]
#[case::json(false)]
#[case::headers_except_date(true)]
#[tokio::test]
async fn identical_servers_are_equivalent(#[case] compare_headers: bool) {
    let api = named_items_api().expect("named items api");
    let left = TestApp::spawn(named_items_app(None)).await.expect("left starts");
    let right = TestApp::spawn(named_items_app(None)).await.expect("right starts");
    let options = seeded(21, 150);
    let (left_url, right_url) = (left.url().expect("url"), right.url().expect("url"));
    let result = if compare_headers {
        servers_equal(&api, &left_url, &right_url, &options, &ignoring_headers(["date"])).await
    } else {
        servers_equal(&api, &left_url, &right_url, &options, &json_equal()).await
    }
    .expect("run completes");
    assert!(
        matches!(result, EquivalenceResult::Equivalent { trials: 150, seed: 21 }),
        "{result}"
    );
}
