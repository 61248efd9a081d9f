use doppler_testing::{MockResponse, MockServer, RequestMatcher};
use http::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

#[tokio::test]
async fn records_every_request() {
    let server = MockServer::start().await;
    server
        .expect(RequestMatcher::post("/hook"))
        .respond_with(MockResponse::new().body("ok"));

    let client = reqwest::Client::new();
    let resp = client
        .post(server.url("/hook"))
        .json(&json!({"a": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");

    let resp = client.get(server.url("/other")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    let received = server.received_requests();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].json::<Value>().unwrap(), json!({"a": 1}));
    assert_eq!(server.unmatched_requests().len(), 1);
    assert_eq!(server.unmatched_requests()[0].path, "/other");
}

#[tokio::test]
async fn sequences_fail_then_succeed() {
    let server = MockServer::start().await;
    server
        .expect(RequestMatcher::post("/hook"))
        .respond_with_sequence(vec![
            MockResponse::with_status(StatusCode::INTERNAL_SERVER_ERROR),
            MockResponse::with_status(StatusCode::BAD_GATEWAY),
            MockResponse::new(),
        ])
        .times(4);

    let client = reqwest::Client::new();
    let mut statuses = Vec::new();
    for _ in 0..4 {
        let resp = client.post(server.url("/hook")).send().await.unwrap();
        statuses.push(resp.status().as_u16());
    }
    assert_eq!(statuses, vec![500, 502, 200, 200]);
    server.verify();
}

#[tokio::test]
async fn later_expectations_override() {
    let server = MockServer::start().await;
    server
        .expect(RequestMatcher::get("/job"))
        .respond_with(MockResponse::with_status(StatusCode::NOT_FOUND));
    server
        .expect(RequestMatcher::get("/job"))
        .respond_with(MockResponse::new().json(json!({"status": "pending"})));

    let resp = reqwest::get(server.url("/job")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.headers()["content-type"], "application/json");
}

#[tokio::test]
#[should_panic(expected = "expected Exactly(2) calls, got 1")]
async fn verify_reports_missing_calls() {
    let server = MockServer::start().await;
    server.expect(RequestMatcher::post("/hook")).times(2);

    reqwest::Client::new()
        .post(server.url("/hook"))
        .send()
        .await
        .unwrap();
    server.verify();
}

#[tokio::test]
async fn wait_for_requests_returns_early() {
    let server = MockServer::start().await;
    server.expect(RequestMatcher::post("/hook"));

    let url = server.url("/hook");
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        reqwest::Client::new().post(url).send().await.unwrap();
    });

    let received = server.wait_for_requests(1, Duration::from_secs(5)).await;
    assert_eq!(received.len(), 1);
}
