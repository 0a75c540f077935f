//! [`ControlLoop`] – the rover's perception-action cycle.
//!
//! Each iteration captures a frame, submits it to the inference queue, and
//! dispatches the parsed answer to the motion coordinator and the speech
//! sink.  Inference failures cost one iteration and a history entry; only
//! hardware faults and configuration problems halt the loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rover_client::{ChatHistory, ChatOutcome, InferenceQueue, PromptBuilder, SpeechSink};
use rover_hal::Camera;
use rover_motion::MotionCoordinator;
use rover_types::{Movement, RoverError, clamp_velocity};
use tracing::{info, warn};

/// Timing and lifetime knobs for the loop.
#[derive(Debug, Clone)]
pub struct ControlLoopConfig {
    /// Stop after this many iterations; `None` runs until shutdown.
    pub max_iterations: Option<u64>,
    /// Deadline for one inference round, enforced on the caller side.
    pub request_timeout: Duration,
    /// Track hold time when the model omits `movement.duration`.
    pub default_move_duration: Duration,
    /// Total time for one head trajectory.
    pub head_move_duration: Duration,
    /// Interpolation steps per head trajectory.
    pub head_steps: u32,
    /// Total time for one track ramp (up or down).
    pub track_ramp: Duration,
    /// Interpolation steps per track ramp.
    pub track_steps: u32,
    /// Where to persist the chat history after each round, if anywhere.
    pub history_path: Option<PathBuf>,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: None,
            request_timeout: Duration::from_secs(30),
            default_move_duration: Duration::from_secs(1),
            head_move_duration: Duration::from_secs(1),
            head_steps: 200,
            track_ramp: Duration::from_millis(500),
            track_steps: 50,
            history_path: None,
        }
    }
}

/// One rover's sense-think-act cycle.
pub struct ControlLoop {
    camera: Box<dyn Camera>,
    coordinator: Arc<MotionCoordinator>,
    queue: Arc<InferenceQueue>,
    speech: Arc<dyn SpeechSink>,
    prompt: PromptBuilder,
    history: ChatHistory,
    config: ControlLoopConfig,
}

impl ControlLoop {
    pub fn new(
        camera: Box<dyn Camera>,
        coordinator: Arc<MotionCoordinator>,
        queue: Arc<InferenceQueue>,
        speech: Arc<dyn SpeechSink>,
        prompt: PromptBuilder,
        history: ChatHistory,
        config: ControlLoopConfig,
    ) -> Self {
        Self {
            camera,
            coordinator,
            queue,
            speech,
            prompt,
            history,
            config,
        }
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    /// Run iterations until `max_iterations` is reached (or forever).
    ///
    /// # Errors
    ///
    /// Propagates only fatal errors: camera capture failures, hardware
    /// write failures and configuration problems.  Everything else is
    /// logged, recorded in the history, and survived.
    pub async fn run(&mut self) -> Result<(), RoverError> {
        let mut iteration: u64 = 0;
        loop {
            if let Some(max) = self.config.max_iterations
                && iteration >= max
            {
                info!(iterations = iteration, "control loop finished");
                return Ok(());
            }
            iteration += 1;
            self.tick(iteration).await?;
        }
    }

    /// One full perception-action round.
    async fn tick(&mut self, iteration: u64) -> Result<(), RoverError> {
        // A blind robot must not keep moving, so capture failures are fatal.
        let frame = self.camera.capture()?;
        let summary = format!("frame {iteration} ({}x{})", frame.width, frame.height);

        let prompt = self.prompt.build(&self.history);
        let pending = self.queue.submit(&frame.data, prompt);
        let response = match pending.recv(self.config.request_timeout).await {
            Ok(response) => response,
            Err(err) => {
                warn!(iteration, error = %err, "inference round failed");
                self.record(summary, ChatOutcome::Error {
                    error: err.to_string(),
                });
                return Ok(());
            }
        };

        if let Err(err) = self.dispatch_motion(&response.movement).await {
            if err.is_fatal() {
                return Err(err);
            }
            warn!(iteration, error = %err, "motion dispatch skipped");
        }
        self.dispatch_speech(response.speech.clone());
        self.record(summary, ChatOutcome::Response { response });
        Ok(())
    }

    /// Drive head and tracks concurrently, then ramp the tracks back to a
    /// stop after their hold time.
    async fn dispatch_motion(&self, movement: &Movement) -> Result<(), RoverError> {
        if movement.is_empty() {
            return Ok(());
        }
        let left = clamp_velocity(movement.left_track.unwrap_or(0.0));
        let right = clamp_velocity(movement.right_track.unwrap_or(0.0));
        let tracks_move = left != 0.0 || right != 0.0;
        let hold = movement
            .duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(Duration::from_secs_f32)
            .unwrap_or(self.config.default_move_duration);

        let head = async {
            match movement.head_angle {
                Some(degrees) => {
                    self.coordinator
                        .move_head(degrees, self.config.head_move_duration, self.config.head_steps)
                        .await
                }
                None => Ok(()),
            }
        };
        let tracks = async {
            if !tracks_move {
                return Ok(());
            }
            self.coordinator
                .drive_tracks(left, right, self.config.track_ramp, self.config.track_steps)
                .await?;
            tokio::time::sleep(hold).await;
            self.coordinator
                .stop_tracks(left, right, self.config.track_ramp, self.config.track_steps)
                .await
        };

        match tokio::join!(head, tracks) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
            (Err(head_err), Err(track_err)) => {
                // Surface the fatal one; both are already logged downstream.
                if track_err.is_fatal() && !head_err.is_fatal() {
                    Err(track_err)
                } else {
                    Err(head_err)
                }
            }
        }
    }

    /// Fire-and-forget speech: a slow or dead TTS server never stalls the
    /// loop.
    fn dispatch_speech(&self, speech: Option<String>) {
        let Some(text) = speech else { return };
        if text.trim().is_empty() {
            return;
        }
        let sink = Arc::clone(&self.speech);
        tokio::spawn(async move {
            if let Err(err) = sink.speak(&text).await {
                warn!(error = %err, "speech dispatch failed");
            }
        });
    }

    fn record(&mut self, summary: String, outcome: ChatOutcome) {
        self.history.append(summary, outcome);
        if let Some(path) = &self.config.history_path
            && let Err(err) = self.history.save(path)
        {
            warn!(error = %err, "history persistence failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rover_client::{ResponseParser, VisionBackend};
    use rover_hal::sim::{BrokenCamera, SimCamera, SimServo, SimTrack};
    use rover_types::InferenceError;
    use std::sync::Mutex as StdMutex;

    struct ScriptedBackend {
        reply: String,
    }

    #[async_trait]
    impl VisionBackend for ScriptedBackend {
        async fn generate(&self, _image: &str, _prompt: &str) -> Result<String, InferenceError> {
            Ok(self.reply.clone())
        }
    }

    struct SlowBackend;

    #[async_trait]
    impl VisionBackend for SlowBackend {
        async fn generate(&self, _image: &str, _prompt: &str) -> Result<String, InferenceError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("{}".to_string())
        }
    }

    #[derive(Default)]
    struct RecordingSpeech {
        spoken: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechSink for RecordingSpeech {
        async fn speak(&self, text: &str) -> Result<(), RoverError> {
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn coordinator_with_sims() -> (
        Arc<MotionCoordinator>,
        rover_hal::sim::ServoLog,
        rover_hal::sim::TrackLog,
        rover_hal::sim::TrackLog,
    ) {
        let (servo, servo_log) = SimServo::new("head");
        let (left, left_log) = SimTrack::new("left_track");
        let (right, right_log) = SimTrack::new("right_track");
        let mut coordinator = MotionCoordinator::new();
        coordinator.register_head(servo);
        coordinator.register_tracks(left, right);
        (Arc::new(coordinator), servo_log, left_log, right_log)
    }

    fn loop_config(iterations: u64) -> ControlLoopConfig {
        ControlLoopConfig {
            max_iterations: Some(iterations),
            request_timeout: Duration::from_secs(1),
            head_steps: 10,
            track_steps: 5,
            ..ControlLoopConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_round_moves_head_tracks_and_speaks() {
        let (coordinator, servo_log, left_log, right_log) = coordinator_with_sims();
        let backend = Arc::new(ScriptedBackend {
            reply: r#"{"speech":"hello","movement":{"head_angle":45,"left_track":0.5,"right_track":0.5,"duration":1.0}}"#.into(),
        });
        let queue = Arc::new(InferenceQueue::new(backend, ResponseParser::default()));
        queue.start().await;
        let speech = Arc::new(RecordingSpeech::default());

        let mut control = ControlLoop::new(
            SimCamera::new("front_rgb"),
            Arc::clone(&coordinator),
            Arc::clone(&queue),
            Arc::clone(&speech) as Arc<dyn SpeechSink>,
            PromptBuilder::default(),
            ChatHistory::new(2, "test-model"),
            loop_config(1),
        );
        control.run().await.unwrap();
        queue.stop().await;
        // Let the spawned speech task finish.
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(*speech.spoken.lock().unwrap(), vec!["hello".to_string()]);

        let servo_writes = servo_log.lock().unwrap();
        assert!((servo_writes[0] - 90.0).abs() < 1e-3, "head starts centered");
        let last = *servo_writes.last().unwrap();
        assert!((last - 45.0).abs() < 1e-3, "head settles on the target");

        for log in [&left_log, &right_log] {
            let writes = log.lock().unwrap();
            assert!(
                writes.iter().any(|c| c.velocity() > 0.45),
                "track ramps up to the commanded speed"
            );
            assert!(writes.last().unwrap().is_stop(), "track ends stopped");
        }

        assert_eq!(control.history().len(), 1);
        assert!(matches!(
            control.history().entries().next().unwrap().outcome,
            ChatOutcome::Response { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_round_leaves_actuators_untouched() {
        let (coordinator, servo_log, left_log, _right_log) = coordinator_with_sims();
        let queue = Arc::new(InferenceQueue::new(
            Arc::new(SlowBackend),
            ResponseParser::default(),
        ));
        queue.start().await;

        let mut control = ControlLoop::new(
            SimCamera::new("front_rgb"),
            coordinator,
            Arc::clone(&queue),
            Arc::new(RecordingSpeech::default()),
            PromptBuilder::default(),
            ChatHistory::new(4, "test-model"),
            loop_config(2),
        );
        control.run().await.unwrap();
        queue.stop().await;

        assert!(servo_log.lock().unwrap().is_empty());
        assert!(left_log.lock().unwrap().is_empty());

        // Both rounds survived as recorded errors.
        assert_eq!(control.history().len(), 2);
        for entry in control.history().entries() {
            assert!(matches!(entry.outcome, ChatOutcome::Error { .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn capture_failure_halts_the_loop() {
        let (coordinator, _servo_log, _left_log, _right_log) = coordinator_with_sims();
        let queue = Arc::new(InferenceQueue::new(
            Arc::new(ScriptedBackend {
                reply: "{}".into(),
            }),
            ResponseParser::default(),
        ));

        let mut control = ControlLoop::new(
            Box::new(BrokenCamera),
            coordinator,
            queue,
            Arc::new(RecordingSpeech::default()),
            PromptBuilder::default(),
            ChatHistory::new(2, "test-model"),
            loop_config(3),
        );
        let err = control.run().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, RoverError::HardwareWrite { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn speech_only_answer_moves_nothing() {
        let (coordinator, servo_log, left_log, right_log) = coordinator_with_sims();
        let queue = Arc::new(InferenceQueue::new(
            Arc::new(ScriptedBackend {
                reply: r#"{"speech":"just talking"}"#.into(),
            }),
            ResponseParser::default(),
        ));
        queue.start().await;
        let speech = Arc::new(RecordingSpeech::default());

        let mut control = ControlLoop::new(
            SimCamera::new("front_rgb"),
            coordinator,
            Arc::clone(&queue),
            Arc::clone(&speech) as Arc<dyn SpeechSink>,
            PromptBuilder::default(),
            ChatHistory::new(2, "test-model"),
            loop_config(1),
        );
        control.run().await.unwrap();
        queue.stop().await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(*speech.spoken.lock().unwrap(), vec!["just talking".to_string()]);
        assert!(servo_log.lock().unwrap().is_empty());
        assert!(left_log.lock().unwrap().is_empty());
        assert!(right_log.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn history_is_persisted_after_each_round() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("history.json");

        let (coordinator, _servo_log, _left_log, _right_log) = coordinator_with_sims();
        let queue = Arc::new(InferenceQueue::new(
            Arc::new(ScriptedBackend {
                reply: r#"{"speech":"saved"}"#.into(),
            }),
            ResponseParser::default(),
        ));
        queue.start().await;

        let mut control = ControlLoop::new(
            SimCamera::new("front_rgb"),
            coordinator,
            Arc::clone(&queue),
            Arc::new(RecordingSpeech::default()),
            PromptBuilder::default(),
            ChatHistory::new(2, "test-model"),
            ControlLoopConfig {
                history_path: Some(path.clone()),
                ..loop_config(1)
            },
        );
        control.run().await.unwrap();
        queue.stop().await;

        let raw = std::fs::read_to_string(&path).expect("history file written");
        assert!(raw.contains("saved"));
    }
}
