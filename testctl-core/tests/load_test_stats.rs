//! Cross-module load test flow: `ApiTester::run_load_test` against a real
//! (mocked) HTTP endpoint, exercising the full request/session/stats path.

use std::collections::HashMap;
use std::time::Duration;

use testctl_core::api_tester::ApiTester;
use testctl_core::contracts::{ApiTestSpec, Environment, HttpMethod, TestConfig, TestContext, TestScenario, TestType};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn load_scenario(endpoint: &str) -> TestScenario {
    TestScenario::new(
        "load probe",
        TestType::Api,
        TestConfig::Api(ApiTestSpec {
            endpoint: endpoint.to_string(),
            method: HttpMethod::Get,
            headers: HashMap::new(),
            query_params: HashMap::new(),
            path_params: HashMap::new(),
            request_body: None,
            expected_status: 200,
            expected_response_schema: None,
            response_time_threshold_ms: 2000,
        }),
    )
    .expect("valid scenario")
}

fn context(base_url: &str) -> TestContext {
    let mut context = TestContext::new(uuid::Uuid::new_v4(), Environment::Test);
    context.metadata.insert("base_url".into(), serde_json::json!(base_url));
    context
}

/// §8 S4: 4 concurrent users, 2s duration, ~100ms responses.
#[tokio::test]
async fn four_users_two_seconds_matches_the_spec_s4_envelope() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(100)))
        .mount(&mock_server)
        .await;

    let tester = ApiTester::new(Duration::from_secs(5), 1);
    let scenario = load_scenario("/ping");
    let ctx = context(&mock_server.uri());

    let stats = tester.run_load_test(&scenario, &ctx, 4, 2).await.unwrap();

    // 4 users * (2000ms / ~200ms per request-plus-delay) ~= 40, generous band.
    assert!(stats.total_requests >= 8, "too few requests: {}", stats.total_requests);
    assert!(stats.total_requests <= 80, "too many requests: {}", stats.total_requests);
    assert_eq!(stats.successful_requests, stats.total_requests);
    assert!((stats.success_rate - 1.0).abs() < 1e-9);
    assert!(stats.response_time_mean_ms >= 80.0);
    assert!(stats.requests_per_second > 0.0);
    assert!(stats.response_time_p95_ms >= stats.response_time_mean_ms * 0.5);
    assert!(stats.errors.is_empty());
}

/// §8 property 5: `total_requests = sum(session_requests)`,
/// `success_rate = successful / total`, and a load run never aborts
/// even when every request fails.
#[tokio::test]
async fn a_failing_endpoint_does_not_abort_the_run() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let tester = ApiTester::new(Duration::from_secs(5), 1);
    let scenario = load_scenario("/broken");
    let ctx = context(&mock_server.uri());

    let stats = tester.run_load_test(&scenario, &ctx, 2, 1).await.unwrap();

    assert!(stats.total_requests > 0);
    assert_eq!(stats.successful_requests, 0);
    assert_eq!(stats.success_rate, 0.0);
}

/// §8 property 6: the percentile function used by load stats is
/// monotonic — p95 is never below p50's neighbourhood (mean here, since
/// `LoadStats` doesn't expose p50 directly, but the ordering invariant
/// is checked through the underlying function in `percentile`'s own
/// unit tests; here we confirm p95 never falls below the minimum).
#[tokio::test]
async fn p95_is_never_below_the_observed_minimum() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let tester = ApiTester::new(Duration::from_secs(5), 1);
    let scenario = load_scenario("/ping");
    let ctx = context(&mock_server.uri());

    let stats = tester.run_load_test(&scenario, &ctx, 3, 1).await.unwrap();
    assert!(stats.response_time_p95_ms >= stats.response_time_min_ms);
}
