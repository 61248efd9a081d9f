use async_trait::async_trait;
use doppler_core::{JobRecord, JobStatus, ManualClock};
use doppler_jobs::{
    Attempt, DelayQueue, DeliveryWorker, InMemoryQueue, JobError, QueueOptions, WorkerOptions,
};
use doppler_testing::{MockResponse, MockServer, RequestMatcher};
use http::StatusCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const START: i64 = 1_700_000_000;

struct Harness {
    queue: Arc<InMemoryQueue>,
    clock: ManualClock,
    worker: DeliveryWorker,
}

fn harness(timeout: Duration) -> Harness {
    let queue = Arc::new(InMemoryQueue::new());
    let clock = ManualClock::new(START);
    let options = WorkerOptions {
        delivery_timeout: timeout,
        poll_interval: Duration::from_millis(10),
    };
    let worker = DeliveryWorker::new(queue.clone(), options)
        .unwrap()
        .with_clock(Arc::new(clock.clone()));
    Harness {
        queue,
        clock,
        worker,
    }
}

fn job(id: &str, url: String, run_at: i64, max_retries: u32, retry_delay: Option<u64>) -> JobRecord {
    JobRecord::new(id, url, "signed.payload", START, run_at, max_retries, retry_delay)
}

#[tokio::test]
async fn successful_delivery_posts_message_once() {
    let server = MockServer::start().await;
    server
        .expect(RequestMatcher::post("/hook").body_string("signed.payload"))
        .respond_with(MockResponse::new())
        .once();

    let h = harness(Duration::from_secs(5));
    h.queue
        .push(job("a", server.url("/hook"), START, 3, None))
        .await
        .unwrap();

    let attempt = h.worker.process_one().await.unwrap();
    assert_eq!(
        attempt,
        Some(Attempt::Delivered {
            request_id: "a".to_string()
        })
    );

    let record = h.queue.get("a").await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Done);
    assert_eq!(record.retries_left, 3);
    assert!(h.worker.process_one().await.unwrap().is_none());
    server.verify();
}

#[tokio::test]
async fn always_failing_job_gets_max_retries_plus_one_attempts() {
    let server = MockServer::start().await;
    server
        .expect(RequestMatcher::post("/hook"))
        .respond_with(MockResponse::with_status(StatusCode::INTERNAL_SERVER_ERROR));

    let h = harness(Duration::from_secs(5));
    h.queue
        .push(job("a", server.url("/hook"), START, 2, Some(5)))
        .await
        .unwrap();

    // attempt 1 at START
    let attempt = h.worker.process_one().await.unwrap().unwrap();
    assert_eq!(
        attempt,
        Attempt::Retrying {
            request_id: "a".to_string(),
            run_at: START + 5
        }
    );
    let record = h.queue.get("a").await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Pending);
    assert_eq!(record.retries_left, 1);
    assert_eq!(record.last_retry, Some(START));

    // not due yet
    h.clock.advance(4);
    assert!(h.worker.process_one().await.unwrap().is_none());

    // attempt 2, one second late
    h.clock.advance(2);
    let attempt = h.worker.process_one().await.unwrap().unwrap();
    assert_eq!(
        attempt,
        Attempt::Retrying {
            request_id: "a".to_string(),
            run_at: START + 6 + 5
        }
    );
    let record = h.queue.get("a").await.unwrap().unwrap();
    assert_eq!(record.retries_left, 0);
    assert_eq!(record.last_retry, Some(START + 6));

    // attempt 3 exhausts the budget
    h.clock.set(START + 11);
    let attempt = h.worker.process_one().await.unwrap().unwrap();
    assert_eq!(
        attempt,
        Attempt::Failed {
            request_id: "a".to_string()
        }
    );

    let record = h.queue.get("a").await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.retries_left, 0);

    h.clock.advance(3600);
    assert!(h.worker.process_one().await.unwrap().is_none());
    assert_eq!(server.received_requests().len(), 3);
}

#[tokio::test]
async fn client_errors_are_retried_like_server_errors() {
    let server = MockServer::start().await;
    server
        .expect(RequestMatcher::post("/hook"))
        .respond_with_sequence(vec![
            MockResponse::with_status(StatusCode::NOT_FOUND),
            MockResponse::new(),
        ]);

    let h = harness(Duration::from_secs(5));
    h.queue
        .push(job("a", server.url("/hook"), START, 1, None))
        .await
        .unwrap();

    assert!(matches!(
        h.worker.process_one().await.unwrap(),
        Some(Attempt::Retrying { .. })
    ));

    // default retry delay applies
    h.clock.advance(10);
    assert!(matches!(
        h.worker.process_one().await.unwrap(),
        Some(Attempt::Delivered { .. })
    ));
    assert_eq!(
        h.queue.get("a").await.unwrap().unwrap().status,
        JobStatus::Done
    );
}

#[tokio::test]
async fn unreachable_endpoint_counts_as_failure() {
    let h = harness(Duration::from_secs(2));
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/hook", listener.local_addr().unwrap());
    drop(listener);

    h.queue.push(job("a", url, START, 0, None)).await.unwrap();

    assert!(matches!(
        h.worker.process_one().await.unwrap(),
        Some(Attempt::Failed { .. })
    ));
    assert_eq!(
        h.queue.get("a").await.unwrap().unwrap().status,
        JobStatus::Failed
    );
}

#[tokio::test]
async fn delayed_jobs_do_not_fire_early() {
    let server = MockServer::start().await;
    server.expect(RequestMatcher::post("/hook"));

    let h = harness(Duration::from_secs(5));
    h.queue
        .push(job("a", server.url("/hook"), START + 3600, 0, None))
        .await
        .unwrap();

    assert!(h.worker.process_one().await.unwrap().is_none());
    h.clock.advance(3599);
    assert!(h.worker.process_one().await.unwrap().is_none());
    assert!(server.received_requests().is_empty());

    h.clock.advance(1);
    assert!(h.worker.process_one().await.unwrap().is_some());
    assert_eq!(server.received_requests().len(), 1);
}

#[tokio::test]
async fn cancelled_job_never_delivers() {
    let server = MockServer::start().await;
    server.expect(RequestMatcher::post("/hook")).never();

    let h = harness(Duration::from_secs(5));
    h.queue
        .push(job("a", server.url("/hook"), START + 10, 0, None))
        .await
        .unwrap();

    assert!(h.queue.cancel("a").await.unwrap());
    assert!(!h.queue.cancel("a").await.unwrap());

    h.clock.advance(60);
    assert!(h.worker.process_one().await.unwrap().is_none());
    assert_eq!(
        h.queue.get("a").await.unwrap().unwrap().status,
        JobStatus::Cancelled
    );
    server.verify();
}

#[tokio::test]
async fn slow_endpoint_times_out_as_failed_attempt() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    // accept and hold the connection without ever answering
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let h = harness(Duration::from_millis(200));
    h.queue
        .push(job("a", format!("http://{}/hook", addr), START, 0, None))
        .await
        .unwrap();

    let attempt = tokio::time::timeout(Duration::from_secs(5), h.worker.process_one())
        .await
        .expect("delivery was not bounded by the timeout")
        .unwrap();
    assert!(matches!(attempt, Some(Attempt::Failed { .. })));
}

#[tokio::test]
async fn run_loop_delivers_and_stops_on_shutdown() {
    let server = MockServer::start().await;
    server.expect(RequestMatcher::post("/hook"));

    let h = harness(Duration::from_secs(5));
    h.queue
        .push(job("a", server.url("/hook"), START, 0, None))
        .await
        .unwrap();
    h.queue
        .push(job("b", server.url("/hook"), START, 0, None))
        .await
        .unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let worker = h.worker.clone();
    let handle = tokio::spawn(async move {
        worker
            .run(async {
                let _ = rx.await;
            })
            .await
    });

    let received = server.wait_for_requests(2, Duration::from_secs(5)).await;
    assert_eq!(received.len(), 2);

    tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
}

/// In-memory queue whose next `push` can be made to fail
struct FlakyQueue {
    inner: InMemoryQueue,
    fail_next_push: AtomicBool,
}

#[async_trait]
impl DelayQueue for FlakyQueue {
    async fn push(&self, job: JobRecord) -> doppler_jobs::Result<()> {
        if self.fail_next_push.swap(false, Ordering::SeqCst) {
            return Err(JobError::BackendError("connection reset".to_string()));
        }
        self.inner.push(job).await
    }

    async fn pop(&self, now: i64) -> doppler_jobs::Result<Option<JobRecord>> {
        self.inner.pop(now).await
    }

    async fn complete(&self, job: &JobRecord) -> doppler_jobs::Result<()> {
        self.inner.complete(job).await
    }

    async fn fail(&self, job: &JobRecord) -> doppler_jobs::Result<()> {
        self.inner.fail(job).await
    }

    async fn requeue_expired(&self, now: i64) -> doppler_jobs::Result<usize> {
        self.inner.requeue_expired(now).await
    }

    async fn cancel(&self, request_id: &str) -> doppler_jobs::Result<bool> {
        self.inner.cancel(request_id).await
    }

    async fn get(&self, request_id: &str) -> doppler_jobs::Result<Option<JobRecord>> {
        self.inner.get(request_id).await
    }
}

#[tokio::test]
async fn lost_retry_write_is_recovered_when_the_claim_expires() {
    let server = MockServer::start().await;
    server
        .expect(RequestMatcher::post("/hook"))
        .respond_with(MockResponse::with_status(StatusCode::INTERNAL_SERVER_ERROR));

    let inner = InMemoryQueue::with_options(QueueOptions {
        claim_timeout: Duration::from_secs(30),
        ..QueueOptions::default()
    });
    let queue = Arc::new(FlakyQueue {
        inner: inner.clone(),
        fail_next_push: AtomicBool::new(false),
    });
    let clock = ManualClock::new(START);
    let worker = DeliveryWorker::new(queue.clone(), WorkerOptions::default())
        .unwrap()
        .with_clock(Arc::new(clock.clone()));

    inner
        .push(job("a", server.url("/hook"), START, 2, Some(5)))
        .await
        .unwrap();
    queue.fail_next_push.store(true, Ordering::SeqCst);

    // the attempt happens but its retry is never written
    let err = worker.process_one().await.unwrap_err();
    assert!(matches!(err, JobError::BackendError(_)));
    let record = inner.get("a").await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Pending);
    assert_eq!(record.retries_left, 2);
    assert_eq!(inner.scheduled_len(), 0);
    assert_eq!(inner.claimed_len(), 1);

    clock.advance(29);
    assert!(worker.process_one().await.unwrap().is_none());

    clock.advance(1);
    assert_eq!(
        worker.process_one().await.unwrap(),
        Some(Attempt::Retrying {
            request_id: "a".to_string(),
            run_at: START + 35
        })
    );

    clock.advance(5);
    assert!(matches!(
        worker.process_one().await.unwrap(),
        Some(Attempt::Retrying { .. })
    ));
    clock.advance(5);
    assert!(matches!(
        worker.process_one().await.unwrap(),
        Some(Attempt::Failed { .. })
    ));

    assert_eq!(inner.get("a").await.unwrap().unwrap().status, JobStatus::Failed);
    assert_eq!(inner.claimed_len(), 0);
    assert_eq!(server.received_requests().len(), 4);
}
