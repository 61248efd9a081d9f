use doppler_core::{JobStatus, ManualClock};
use doppler_http::StatusCode;
use doppler_listener::{
    Arguments, CallbackRegistry, ClientError, DopplerClient, ListenerError, ParameterSet,
    RetryPolicy, Signer, Trigger,
};
use doppler_testing::{MockResponse, MockServer, RequestMatcher};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const NOW: i64 = 1_700_000_000;
const SECRET: &str = "s3cret";

fn args(value: Value) -> Arguments {
    value.as_object().cloned().unwrap()
}

fn view(request_id: &str, status: &str) -> Value {
    json!({
        "request_id": request_id,
        "status": status,
        "run_at": NOW + 10,
        "scheduled_at": NOW,
        "last_retry": null,
        "retries_left": 2,
    })
}

fn registry() -> CallbackRegistry {
    CallbackRegistry::new(Signer::from_secret(Some(SECRET)))
        .with_prefix("/doppler")
        .with_callback_base_url("http://asdf")
        .listen("foo", ParameterSet::new(["bar"]), |_args: Arguments| async { "spam" })
}

fn trigger(service: &MockServer) -> Trigger {
    registry()
        .trigger(
            "foo",
            DopplerClient::new(service.base_url()),
            RetryPolicy::new(2, 30).unwrap(),
        )
        .unwrap()
        .with_clock(Arc::new(ManualClock::new(NOW)))
}

#[tokio::test]
async fn schedule_submits_a_signed_job() {
    let service = MockServer::start().await;
    service
        .expect(RequestMatcher::post("/").body_json_includes(json!({
            "callback_url": "http://asdf/doppler/foo",
            "max_retries": 2,
            "retry_delay": 30,
            "run_at": NOW + 10,
        })))
        .respond_with(MockResponse::new().json(view("abc", "pending")))
        .once();

    let trigger = trigger(&service);
    assert_eq!(trigger.callback_url(), "http://asdf/doppler/foo");

    let job = trigger.schedule(10, args(json!({"bar": 1}))).await.unwrap();
    assert_eq!(job.request_id(), "abc");
    assert_eq!(job.status(), JobStatus::Pending);
    service.verify();

    let submitted: Value = service.received_requests()[0].json().unwrap();
    let token = submitted["message"].as_str().unwrap();
    let decoded = Signer::from_secret(Some(SECRET)).unsign(token).unwrap();
    assert_eq!(decoded, args(json!({"bar": 1})));
}

#[tokio::test]
async fn relative_and_absolute_times_agree() {
    let service = MockServer::start().await;
    service
        .expect(RequestMatcher::post("/").body_json_includes(json!({"run_at": NOW + 10})))
        .respond_with(MockResponse::new().json(view("abc", "pending")))
        .times(3);

    let trigger = trigger(&service);
    let at = chrono::DateTime::from_timestamp(NOW + 10, 0).unwrap();

    trigger.schedule(10, args(json!({"bar": 1}))).await.unwrap();
    trigger
        .schedule(Duration::from_secs(10), args(json!({"bar": 1})))
        .await
        .unwrap();
    trigger.schedule(at, args(json!({"bar": 1}))).await.unwrap();
    service.verify();
}

#[tokio::test]
async fn argument_mismatch_submits_nothing() {
    let service = MockServer::start().await;
    let trigger = trigger(&service);

    let err = trigger
        .schedule(10, args(json!({"bar": 1, "extra": 2})))
        .await
        .unwrap_err();
    match err {
        ListenerError::Arguments(mismatch) => {
            assert_eq!(mismatch.unexpected, vec!["extra".to_string()]);
            assert!(mismatch.missing.is_empty());
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let err = trigger.schedule(10, Arguments::new()).await.unwrap_err();
    assert!(matches!(err, ListenerError::Arguments(_)));
    assert!(service.received_requests().is_empty());
}

#[tokio::test]
async fn service_errors_surface_as_client_errors() {
    let service = MockServer::start().await;
    service
        .expect(RequestMatcher::post("/"))
        .respond_with(MockResponse::with_status(StatusCode::SERVICE_UNAVAILABLE));

    let err = trigger(&service)
        .schedule(10, args(json!({"bar": 1})))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ListenerError::Client(ClientError::Status { status: 503, .. })
    ));
}

#[tokio::test]
async fn job_handle_refreshes_and_cancels() {
    let service = MockServer::start().await;
    service
        .expect(RequestMatcher::post("/"))
        .respond_with(MockResponse::new().json(view("abc", "pending")));
    service
        .expect(RequestMatcher::get("/abc"))
        .respond_with(MockResponse::new().json(view("abc", "cancelled")))
        .once();
    service
        .expect(RequestMatcher::delete("/abc"))
        .respond_with(MockResponse::new().json(json!({"was_cancelled": true})))
        .once();

    let mut job = trigger(&service)
        .schedule(10, args(json!({"bar": 1})))
        .await
        .unwrap();

    assert!(job.cancel().await.unwrap().was_cancelled);
    job.refresh().await.unwrap().unwrap();
    assert_eq!(job.status(), JobStatus::Cancelled);
    service.verify();
}

#[tokio::test]
async fn unknown_jobs_are_none() {
    let service = MockServer::start().await;
    let client = DopplerClient::new(format!("{}/", service.base_url()));

    assert!(client.get_job("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn refreshing_a_vanished_job_keeps_the_last_view() {
    let service = MockServer::start().await;
    service
        .expect(RequestMatcher::post("/"))
        .respond_with(MockResponse::new().json(view("abc", "pending")));

    let mut job = trigger(&service)
        .schedule(10, args(json!({"bar": 1})))
        .await
        .unwrap();

    assert!(job.refresh().await.unwrap().is_none());
    assert_eq!(job.request_id(), "abc");
    assert_eq!(job.status(), JobStatus::Pending);
}

#[tokio::test]
async fn trigger_follows_the_registered_parameters() {
    let service = MockServer::start().await;
    let registry = registry();

    let err = registry
        .trigger(
            "/unregistered",
            DopplerClient::new(service.base_url()),
            RetryPolicy::default(),
        )
        .unwrap_err();
    assert!(matches!(err, ListenerError::UnknownRoute(_)));

    // `baz` is not a parameter of the `/foo` handler
    let trigger = registry
        .trigger("/foo", DopplerClient::new(service.base_url()), RetryPolicy::default())
        .unwrap();
    let err = trigger
        .schedule(10, args(json!({"baz": 1})))
        .await
        .unwrap_err();
    assert!(matches!(err, ListenerError::Arguments(_)));
    assert!(service.received_requests().is_empty());
}
