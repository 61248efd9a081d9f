//! Scheduling service, delivery worker and callback endpoint wired together
//! over real sockets.

use doppler_core::JobStatus;
use doppler_http::{Router, Server};
use doppler_jobs::{Attempt, DeliveryWorker, InMemoryQueue, WorkerOptions};
use doppler_listener::{
    Arguments, CallbackRegistry, DopplerClient, ParameterSet, RetryPolicy, Signer,
};
use doppler_service::{router, SchedulingService};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        Server::new(app)
            .serve(listener, std::future::pending())
            .await
            .unwrap();
    });
    addr
}

#[tokio::test]
async fn scheduled_callback_is_delivered_and_verified() {
    let queue = Arc::new(InMemoryQueue::new());
    let service_addr = spawn(router(Arc::new(SchedulingService::new(queue.clone())))).await;

    let (tx, mut rx) = mpsc::unbounded_channel::<Arguments>();
    let registry = CallbackRegistry::new(Signer::from_secret(Some("s3cret"))).listen(
        "/foo",
        ParameterSet::new(["bar"]),
        move |args: Arguments| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(args);
                "spam"
            }
        },
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listener_addr = listener.local_addr().unwrap();
    let registry = registry.with_callback_base_url(&format!("http://{}", listener_addr));
    let trigger = registry
        .trigger(
            "/foo",
            DopplerClient::new(format!("http://{}", service_addr)),
            RetryPolicy::default(),
        )
        .unwrap();
    tokio::spawn(async move {
        Server::new(registry.into_router())
            .serve(listener, std::future::pending())
            .await
            .unwrap();
    });

    let args = json!({"bar": 1}).as_object().cloned().unwrap();
    let mut job = trigger.schedule(0, args.clone()).await.unwrap();
    assert_eq!(job.status(), JobStatus::Pending);
    assert_eq!(job.view().retries_left, 0);

    let worker = DeliveryWorker::new(queue, WorkerOptions::default()).unwrap();
    let attempt = worker.process_one().await.unwrap();
    assert!(matches!(attempt, Some(Attempt::Delivered { .. })));

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, args);

    job.refresh().await.unwrap().unwrap();
    assert_eq!(job.status(), JobStatus::Done);
    assert!(!job.cancel().await.unwrap().was_cancelled);
}

#[tokio::test]
async fn rejected_callback_fails_the_job() {
    let queue = Arc::new(InMemoryQueue::new());
    let service_addr = spawn(router(Arc::new(SchedulingService::new(queue.clone())))).await;

    // Endpoint verifies with a different key than the trigger signs with
    let endpoint = CallbackRegistry::new(Signer::from_secret(Some("other")))
        .listen("/foo", ParameterSet::new(["bar"]), |_args: Arguments| async {
            "spam"
        });
    let listener_addr = spawn(endpoint.into_router()).await;

    let trigger = CallbackRegistry::new(Signer::from_secret(Some("s3cret")))
        .listen("/foo", ParameterSet::new(["bar"]), |_args: Arguments| async {
            "spam"
        })
        .with_callback_base_url(&format!("http://{}", listener_addr))
        .trigger(
            "/foo",
            DopplerClient::new(format!("http://{}", service_addr)),
            RetryPolicy::default(),
        )
        .unwrap();

    let mut job = trigger
        .schedule(0, json!({"bar": 1}).as_object().cloned().unwrap())
        .await
        .unwrap();

    let worker = DeliveryWorker::new(queue, WorkerOptions::default()).unwrap();
    let attempt = worker.process_one().await.unwrap();
    assert!(matches!(attempt, Some(Attempt::Failed { .. })));

    job.refresh().await.unwrap().unwrap();
    assert_eq!(job.status(), JobStatus::Failed);
}
