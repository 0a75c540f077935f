//! [`InferenceQueue`] – single-flight serialization of inference requests.
//!
//! An unbounded FIFO plus one background worker.  `submit` never blocks
//! beyond enqueue time and returns a [`PendingInference`] the caller awaits
//! with a mandatory timeout.  The worker holds an exclusive processing lock
//! across each external call, so even racing submitters produce strictly
//! sequential calls against the slow remote model.
//!
//! Stopping the worker fails the in-flight future with
//! [`InferenceError::Cancelled`]; requests still sitting in the queue
//! survive and resume on the next `start`.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rover_types::{InferenceError, InferenceResponse};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::VisionBackend;
use crate::parse::ResponseParser;

struct Job {
    image_b64: String,
    prompt: String,
    reply: oneshot::Sender<Result<InferenceResponse, InferenceError>>,
}

/// The caller's only handle onto a submitted request.
pub struct PendingInference {
    rx: oneshot::Receiver<Result<InferenceResponse, InferenceError>>,
}

impl PendingInference {
    /// Wait for the response, at most `timeout`.
    ///
    /// # Errors
    ///
    /// [`InferenceError::Timeout`] when the deadline elapses first,
    /// [`InferenceError::Cancelled`] when the worker was stopped while this
    /// request was in flight, or whatever error the worker resolved.
    pub async fn recv(self, timeout: Duration) -> Result<InferenceResponse, InferenceError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Err(_) => Err(InferenceError::Timeout(timeout)),
            Ok(Err(_)) => Err(InferenceError::Cancelled),
            Ok(Ok(outcome)) => outcome,
        }
    }
}

/// Serialized access to one [`VisionBackend`].
pub struct InferenceQueue {
    jobs_tx: mpsc::UnboundedSender<Job>,
    jobs_rx: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    flight: Arc<Mutex<()>>,
    backend: Arc<dyn VisionBackend>,
    parser: Arc<ResponseParser>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl InferenceQueue {
    pub fn new(backend: Arc<dyn VisionBackend>, parser: ResponseParser) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        Self {
            jobs_tx,
            jobs_rx: Arc::new(Mutex::new(jobs_rx)),
            flight: Arc::new(Mutex::new(())),
            backend,
            parser: Arc::new(parser),
            worker: Mutex::new(None),
        }
    }

    /// Enqueue one request and return immediately.
    ///
    /// The queue owns the request from here on; the returned handle is the
    /// caller's only connection to it.
    pub fn submit(&self, image: &[u8], prompt: impl Into<String>) -> PendingInference {
        let (reply, rx) = oneshot::channel();
        let job = Job {
            image_b64: BASE64.encode(image),
            prompt: prompt.into(),
            reply,
        };
        if self.jobs_tx.send(job).is_err() {
            // Channel gone means the queue is being torn down; the dropped
            // reply sender surfaces as Cancelled on the caller side.
            warn!("inference queue torn down; dropping request");
        }
        PendingInference { rx }
    }

    /// Spawn the background worker.  Idempotent.
    pub async fn start(&self) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return;
        }
        let jobs = Arc::clone(&self.jobs_rx);
        let flight = Arc::clone(&self.flight);
        let backend = Arc::clone(&self.backend);
        let parser = Arc::clone(&self.parser);
        *worker = Some(tokio::spawn(async move {
            loop {
                let job = {
                    let mut rx = jobs.lock().await;
                    match rx.recv().await {
                        Some(job) => job,
                        None => break,
                    }
                };
                // The exclusive flight lock is the single-flight guarantee:
                // the remote model never sees interleaved requests.
                let raw = {
                    let _in_flight = flight.lock().await;
                    backend.generate(&job.image_b64, &job.prompt).await
                };
                let outcome = raw.and_then(|text| parser.parse(&text));
                if let Err(err) = &outcome {
                    debug!(error = %err, "inference request failed");
                }
                // A dropped receiver means the caller timed out; not an error.
                let _ = job.reply.send(outcome);
            }
        }));
    }

    /// Abort the worker.
    ///
    /// The in-flight request (if any) resolves with
    /// [`InferenceError::Cancelled`]; queued requests stay queued and are
    /// picked up again by the next [`start`][Self::start].
    pub async fn stop(&self) {
        if let Some(handle) = self.worker.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    const GENEROUS: Duration = Duration::from_secs(60);

    /// Records the start/end instant of every call, so tests can assert
    /// that calls never overlap.
    struct RecordingBackend {
        spans: std::sync::Mutex<Vec<(Instant, Instant)>>,
        call_time: Duration,
        reply: String,
    }

    impl RecordingBackend {
        fn new(call_time: Duration, reply: &str) -> Arc<Self> {
            Arc::new(Self {
                spans: std::sync::Mutex::new(Vec::new()),
                call_time,
                reply: reply.to_string(),
            })
        }
    }

    #[async_trait]
    impl VisionBackend for RecordingBackend {
        async fn generate(&self, _image: &str, _prompt: &str) -> Result<String, InferenceError> {
            let start = Instant::now();
            tokio::time::sleep(self.call_time).await;
            self.spans.lock().unwrap().push((start, Instant::now()));
            Ok(self.reply.clone())
        }
    }

    /// Alternates between a malformed and a valid reply.
    struct FlakyBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VisionBackend for FlakyBackend {
        async fn generate(&self, _image: &str, _prompt: &str) -> Result<String, InferenceError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(r#"{"speech": "never closed"#.to_string())
            } else {
                Ok(r#"{"speech": "recovered"}"#.to_string())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn three_concurrent_submits_never_overlap() {
        let backend = RecordingBackend::new(Duration::from_millis(50), r#"{"speech":"ok"}"#);
        let queue = InferenceQueue::new(Arc::clone(&backend) as Arc<dyn VisionBackend>,
            ResponseParser::default());
        queue.start().await;

        let a = queue.submit(b"img-a", "prompt");
        let b = queue.submit(b"img-b", "prompt");
        let c = queue.submit(b"img-c", "prompt");

        a.recv(GENEROUS).await.unwrap();
        b.recv(GENEROUS).await.unwrap();
        c.recv(GENEROUS).await.unwrap();

        let spans = backend.spans.lock().unwrap();
        assert_eq!(spans.len(), 3, "exactly three external calls");
        for window in spans.windows(2) {
            assert!(
                window[0].1 <= window[1].0,
                "external calls must be strictly sequential"
            );
        }
        queue.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_response_fails_only_its_own_future() {
        let backend = Arc::new(FlakyBackend {
            calls: AtomicUsize::new(0),
        });
        let queue = InferenceQueue::new(backend, ResponseParser::default());
        queue.start().await;

        let bad = queue.submit(b"img", "prompt");
        let good = queue.submit(b"img", "prompt");

        let err = bad.recv(GENEROUS).await.unwrap_err();
        assert!(matches!(err, InferenceError::InvalidJson { .. }));

        let resp = good.recv(GENEROUS).await.unwrap();
        assert_eq!(resp.speech.as_deref(), Some("recovered"));
        queue.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn recv_times_out_when_worker_not_started() {
        let backend = RecordingBackend::new(Duration::from_millis(10), r#"{}"#);
        let queue = InferenceQueue::new(backend, ResponseParser::default());
        // No start() – nothing will ever resolve this future.
        let pending = queue.submit(b"img", "prompt");
        let err = pending.recv(Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, InferenceError::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_in_flight_request() {
        let backend = RecordingBackend::new(Duration::from_secs(3600), r#"{}"#);
        let queue = InferenceQueue::new(backend, ResponseParser::default());
        queue.start().await;

        let pending = queue.submit(b"img", "prompt");
        // Let the worker pick the job up and enter the backend call.
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.stop().await;

        let err = pending.recv(GENEROUS).await.unwrap_err();
        assert!(matches!(err, InferenceError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn queued_requests_survive_stop_and_resume_on_start() {
        let backend = RecordingBackend::new(Duration::from_millis(100), r#"{"speech":"ok"}"#);
        let queue = InferenceQueue::new(
            Arc::clone(&backend) as Arc<dyn VisionBackend>,
            ResponseParser::default(),
        );
        queue.start().await;

        let in_flight = queue.submit(b"img-a", "prompt");
        let queued = queue.submit(b"img-b", "prompt");
        // First job enters the backend; second stays queued.
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.stop().await;

        let err = in_flight.recv(GENEROUS).await.unwrap_err();
        assert!(matches!(err, InferenceError::Cancelled));

        // The un-started request was not dropped: restarting processes it.
        queue.start().await;
        let resp = queued.recv(GENEROUS).await.unwrap();
        assert_eq!(resp.speech.as_deref(), Some("ok"));
        queue.stop().await;
    }
}
