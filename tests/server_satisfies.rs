//! End-to-end property runs against fixture servers.
//!
//! Each test starts an `axum` server from `test-util` and checks it over
//! real HTTP, covering failure shrinking, follow-up predicates and
//! transport timeouts.

use std::time::Duration;

use axum::{Router, routing::get};
use rstest::rstest;
use servecheck::{
    CheckOptions,
    RunResult,
    ServerHandle,
    ServerOptions,
    predicate::{
        body_fields_match,
        created_location_retrievable,
        honours_accept_header,
        json_top_level_is_object,
        never_5xx,
    },
    runner,
    server_satisfies,
    with_servant_server,
};
use test_util::{
    CatalogueBehaviour,
    ItemsBehaviour,
    TestApp,
    catalogue_api,
    catalogue_app,
    items_api,
    items_app,
    task_server,
};

fn seeded(seed: u64, trials: u32) -> CheckOptions {
    CheckOptions {
        trial_count: trials,
        seed: Some(seed),
        ..CheckOptions::default()
    }
}

#[tokio::test]
async fn negative_ids_shrink_to_minus_one() {
    let api = items_api().expect("items api");
    let app = TestApp::spawn(items_app(ItemsBehaviour::FailsOnNegative))
        .await
        .expect("server starts");
    let url = app.url().expect("url");
    let result = server_satisfies(&api, &url, &seeded(42, 200), &never_5xx())
        .await
        .expect("run completes");
    let failure = result.failures().first().expect("a failure");
    assert_eq!(failure.counterexample.path(), "/items/-1");
    assert_eq!(failure.response.status, 500);
    assert_eq!(failure.predicates(), ["never_5xx"]);
}

#[tokio::test]
async fn well_behaved_server_passes_every_predicate() {
    let api = items_api().expect("items api");
    let app = TestApp::spawn(items_app(ItemsBehaviour::Healthy))
        .await
        .expect("server starts");
    let predicate = never_5xx()
        .and(json_top_level_is_object())
        .and(honours_accept_header());
    let result = server_satisfies(&api, &app.url().expect("url"), &seeded(3, 100), &predicate)
        .await
        .expect("run completes");
    assert!(
        matches!(result, RunResult::Passed { trials: 100, seed: 3 }),
        "{result}"
    );
}

#[rstest]
#[case::consistent(CatalogueBehaviour::Consistent, true)]
#[case::loses_tags(CatalogueBehaviour::LosesTags, false)]
#[tokio::test]
async fn created_notes_are_retrievable(#[case] behaviour: CatalogueBehaviour, #[case] passes: bool) {
    let api = catalogue_api().expect("catalogue api");
    let app = TestApp::spawn(catalogue_app(behaviour))
        .await
        .expect("server starts");
    let predicate = created_location_retrievable(body_fields_match());
    let result = server_satisfies(&api, &app.url().expect("url"), &seeded(11, 100), &predicate)
        .await
        .expect("run completes");
    assert_eq!(result.is_passed(), passes, "{result}");
    if let Some(failure) = result.failures().first() {
        let sent: serde_json::Value =
            serde_json::from_slice(failure.counterexample.body()).expect("JSON body");
        assert_eq!(sent, serde_json::json!({ "title": "", "tag": "" }));
        assert!(failure.violations.iter().any(|violation| violation.explanation.contains("tag")));
    }
}

#[tokio::test]
async fn slow_servers_abort_with_a_timeout() {
    let api = items_api().expect("items api");
    let slow = Router::new().route(
        "/items/:id",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            "{}"
        }),
    );
    let app = TestApp::spawn(slow).await.expect("server starts");
    let options = CheckOptions {
        timeout: Duration::from_millis(100),
        ..seeded(1, 5)
    };
    let err = server_satisfies(&api, &app.url().expect("url"), &options, &never_5xx())
        .await
        .expect_err("timeout is fatal");
    assert!(err.is_timeout(), "{err}");
}

#[tokio::test]
async fn runs_inside_a_managed_server() {
    let api = items_api().expect("items api");
    let factory = task_server(items_app(ItemsBehaviour::FailsOnNegative));
    let options = seeded(42, 200);
    let result = with_servant_server(&api, &factory, &ServerOptions::default(), async |handle: &ServerHandle| {
        runner::run(&api, handle, &options, &never_5xx()).await
    })
    .await
    .expect("server starts")
    .expect("run completes");
    assert_eq!(
        result.failures().first().map(|failure| failure.counterexample.path()),
        Some("/items/-1")
    );
}
