//! [`MotionCoordinator`] – cooperative multi-channel trajectory driver.
//!
//! Each registered channel runs at most one trajectory at a time.  A new
//! request for a busy channel wins: it takes a fresh epoch, the in-flight
//! trajectory notices at its next step, settles the channel and hands over
//! the sink (last-writer-wins, not queued).
//!
//! The two drive tracks are registered as a pair and can only be moved and
//! stopped together.  Commanding one track while silently leaving the other
//! "as is" caused asymmetric drift on the physical chassis, so the pairing
//! is enforced at the API level rather than left to caller discipline.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex as StdMutex, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use rover_hal::{ServoChannel, TrackChannel};
use rover_types::{HEAD_CENTER_DEG, MotionRequest, RoverError, clamp_angle, clamp_velocity};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::channel::{ActuatorChannel, HeadChannel, TrackDrive};
use crate::easing::ease;

/// Per-channel trajectory state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Ramping,
    Stopping,
}

struct ChannelSlot {
    sink: Mutex<Box<dyn ActuatorChannel>>,
    /// Trajectory epoch.  Bumping it cancels whatever is in flight.
    epoch: AtomicU64,
    state: StdMutex<ChannelState>,
}

impl ChannelSlot {
    fn new(sink: Box<dyn ActuatorChannel>) -> Self {
        Self {
            sink: Mutex::new(sink),
            epoch: AtomicU64::new(0),
            state: StdMutex::new(ChannelState::Idle),
        }
    }

    fn set_state(&self, state: ChannelState) {
        *self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn state(&self) -> ChannelState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drives registered actuator channels through eased trajectories.
///
/// Cheap to share behind an `Arc`; all trajectory methods take `&self`.
pub struct MotionCoordinator {
    channels: HashMap<String, ChannelSlot>,
    head_id: Option<String>,
    track_ids: Option<(String, String)>,
    /// Last commanded head angle, stored as `f32` bits.  Replaces the
    /// lock-guarded module global the first firmware iterations shared
    /// between the mover task and request handlers.
    head_target_bits: AtomicU32,
}

impl Default for MotionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionCoordinator {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
            head_id: None,
            track_ids: None,
            head_target_bits: AtomicU32::new(HEAD_CENTER_DEG.to_bits()),
        }
    }

    /// Register the head servo.  Its channel carries degrees.
    pub fn register_head(&mut self, servo: Box<dyn ServoChannel>) {
        let id = servo.id().to_string();
        self.channels
            .insert(id.clone(), ChannelSlot::new(Box::new(HeadChannel::new(servo))));
        self.head_id = Some(id);
    }

    /// Register the drive tracks as an inseparable pair.  Their channels
    /// carry signed velocities in `[-1, 1]`.
    pub fn register_tracks(&mut self, left: Box<dyn TrackChannel>, right: Box<dyn TrackChannel>) {
        let left_id = left.id().to_string();
        let right_id = right.id().to_string();
        self.channels
            .insert(left_id.clone(), ChannelSlot::new(Box::new(TrackDrive::new(left))));
        self.channels
            .insert(right_id.clone(), ChannelSlot::new(Box::new(TrackDrive::new(right))));
        self.track_ids = Some((left_id, right_id));
    }

    /// The last commanded head angle in degrees.
    pub fn head_target(&self) -> f32 {
        f32::from_bits(self.head_target_bits.load(Ordering::Acquire))
    }

    /// Record a new head goal without moving (used when resuming a session).
    pub fn set_head_target(&self, degrees: f32) {
        self.head_target_bits
            .store(clamp_angle(degrees).to_bits(), Ordering::Release);
    }

    /// Current trajectory state of a channel, if registered.
    pub fn channel_state(&self, channel_id: &str) -> Option<ChannelState> {
        self.channels.get(channel_id).map(|slot| slot.state())
    }

    /// Run one single-channel trajectory to completion.
    ///
    /// Writes `steps + 1` eased setpoints with a cooperative sleep of
    /// `duration / steps` between writes.  If `from == to` the call
    /// completes immediately without writing (no spurious no-op commands).
    ///
    /// # Errors
    ///
    /// [`RoverError::InvalidMotion`] for an unknown channel or a lone track;
    /// [`RoverError::HardwareWrite`] if a setpoint write fails.
    pub async fn move_channel(&self, request: &MotionRequest) -> Result<(), RoverError> {
        self.validate(std::slice::from_ref(request))?;
        self.run_trajectory(request).await
    }

    /// Run all given single-channel trajectories concurrently
    /// (fan-out/join-all).
    ///
    /// Every trajectory runs to completion even when a sibling fails; a
    /// stuck head must not leave a track at nonzero speed.  The first error
    /// is returned after all channels have finished, the rest are logged.
    pub async fn move_many(&self, requests: Vec<MotionRequest>) -> Result<(), RoverError> {
        self.validate(&requests)?;
        let trajectories = requests.iter().map(|request| async move {
            let outcome = self.run_trajectory(request).await;
            (request.channel_id.clone(), outcome)
        });

        let mut first_err = None;
        for (channel_id, outcome) in join_all(trajectories).await {
            if let Err(err) = outcome {
                warn!(channel = %channel_id, error = %err, "trajectory failed");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Move the head from its current goal to `degrees`.
    pub async fn move_head(
        &self,
        degrees: f32,
        duration: Duration,
        steps: u32,
    ) -> Result<(), RoverError> {
        let head_id = self
            .head_id
            .clone()
            .ok_or_else(|| RoverError::InvalidMotion("no head servo registered".into()))?;
        let request = MotionRequest::new(
            head_id,
            self.head_target(),
            clamp_angle(degrees),
            duration,
            steps,
        );
        self.move_channel(&request).await
    }

    /// Ramp both tracks from standstill to the given signed velocities.
    pub async fn drive_tracks(
        &self,
        left_velocity: f32,
        right_velocity: f32,
        ramp: Duration,
        steps: u32,
    ) -> Result<(), RoverError> {
        let (left_id, right_id) = self.track_pair()?;
        self.move_many(vec![
            MotionRequest::new(left_id, 0.0, clamp_velocity(left_velocity), ramp, steps),
            MotionRequest::new(right_id, 0.0, clamp_velocity(right_velocity), ramp, steps),
        ])
        .await
    }

    /// Ramp both tracks from their current velocities down to an explicit
    /// electrical stop.
    pub async fn stop_tracks(
        &self,
        left_velocity: f32,
        right_velocity: f32,
        duration: Duration,
        steps: u32,
    ) -> Result<(), RoverError> {
        let (left_id, right_id) = self.track_pair()?;
        let (left, right) = tokio::join!(
            self.run_ramp_to_stop(&left_id, left_velocity, duration, steps),
            self.run_ramp_to_stop(&right_id, right_velocity, duration, steps),
        );
        if let Err(err) = &left {
            warn!(channel = %left_id, error = %err, "ramp to stop failed");
        }
        if let Err(err) = &right {
            warn!(channel = %right_id, error = %err, "ramp to stop failed");
        }
        left.and(right)
    }

    /// Ramp one non-track channel down to its settled state.
    ///
    /// Tracks must go through [`stop_tracks`][Self::stop_tracks] so the pair
    /// stops together.
    pub async fn ramp_to_stop(
        &self,
        channel_id: &str,
        current_velocity: f32,
        duration: Duration,
        steps: u32,
    ) -> Result<(), RoverError> {
        if let Some((left_id, right_id)) = &self.track_ids
            && (channel_id == left_id || channel_id == right_id)
        {
            return Err(RoverError::InvalidMotion(format!(
                "track {channel_id} must be stopped as a pair via stop_tracks"
            )));
        }
        self.run_ramp_to_stop(channel_id, current_velocity, duration, steps)
            .await
    }

    /// Cancel every in-flight trajectory and leave all channels settled.
    ///
    /// Called on shutdown and Ctrl-C so a crash mid-trajectory never leaves
    /// a fractional duty cycle on a motor driver.
    pub async fn settle_all(&self) -> Result<(), RoverError> {
        for slot in self.channels.values() {
            slot.epoch.fetch_add(1, Ordering::AcqRel);
        }
        let mut first_err = None;
        for (channel_id, slot) in &self.channels {
            let mut sink = slot.sink.lock().await;
            slot.set_state(ChannelState::Stopping);
            if let Err(err) = sink.settle() {
                warn!(channel = %channel_id, error = %err, "settle failed");
                first_err.get_or_insert(err);
            }
            slot.set_state(ChannelState::Idle);
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn slot(&self, channel_id: &str) -> Result<&ChannelSlot, RoverError> {
        self.channels
            .get(channel_id)
            .ok_or_else(|| RoverError::InvalidMotion(format!("unknown channel {channel_id}")))
    }

    fn track_pair(&self) -> Result<(String, String), RoverError> {
        self.track_ids
            .clone()
            .ok_or_else(|| RoverError::InvalidMotion("no track pair registered".into()))
    }

    /// Reject unknown channels, duplicate channels within one batch, and a
    /// track commanded without its partner.
    fn validate(&self, requests: &[MotionRequest]) -> Result<(), RoverError> {
        let mut seen = HashSet::new();
        for request in requests {
            if !self.channels.contains_key(&request.channel_id) {
                return Err(RoverError::InvalidMotion(format!(
                    "unknown channel {}",
                    request.channel_id
                )));
            }
            if !seen.insert(request.channel_id.as_str()) {
                return Err(RoverError::InvalidMotion(format!(
                    "channel {} appears twice in one batch",
                    request.channel_id
                )));
            }
        }
        if let Some((left_id, right_id)) = &self.track_ids {
            let has_left = seen.contains(left_id.as_str());
            let has_right = seen.contains(right_id.as_str());
            if has_left != has_right {
                return Err(RoverError::InvalidMotion(
                    "tracks must be commanded as a pair".into(),
                ));
            }
        }
        Ok(())
    }

    async fn run_trajectory(&self, request: &MotionRequest) -> Result<(), RoverError> {
        let slot = self.slot(&request.channel_id)?;
        if Some(&request.channel_id) == self.head_id.as_ref() {
            self.head_target_bits
                .store(clamp_angle(request.to).to_bits(), Ordering::Release);
        }
        if request.from == request.to {
            debug!(channel = %request.channel_id, "trajectory is a no-op, skipping");
            return Ok(());
        }

        let steps = request.steps.max(1);
        // Claim a fresh epoch before waiting for the sink: the in-flight
        // trajectory sees the bump at its next step and hands over.
        let epoch = slot.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let mut sink = slot.sink.lock().await;
        slot.set_state(ChannelState::Ramping);

        let pause = request.duration / steps;
        for i in 0..=steps {
            if slot.epoch.load(Ordering::Acquire) != epoch {
                debug!(channel = %request.channel_id, "trajectory superseded, settling");
                slot.set_state(ChannelState::Stopping);
                let settled = sink.settle();
                slot.set_state(ChannelState::Idle);
                return settled;
            }
            let t = i as f32 / steps as f32;
            let value = request.from + (request.to - request.from) * ease(t);
            if let Err(err) = sink.write(value) {
                slot.set_state(ChannelState::Idle);
                return Err(err);
            }
            if i < steps {
                tokio::time::sleep(pause).await;
            }
        }
        slot.set_state(ChannelState::Idle);
        Ok(())
    }

    async fn run_ramp_to_stop(
        &self,
        channel_id: &str,
        current_velocity: f32,
        duration: Duration,
        steps: u32,
    ) -> Result<(), RoverError> {
        let slot = self.slot(channel_id)?;
        let steps = steps.max(1);
        let epoch = slot.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let mut sink = slot.sink.lock().await;
        slot.set_state(ChannelState::Stopping);

        let velocity = clamp_velocity(current_velocity);
        let pause = duration / steps;
        let mut write_err = None;
        // The eased ramp stops one step short of zero; the terminal write is
        // always the explicit stop from settle() below.
        for i in 0..steps {
            if slot.epoch.load(Ordering::Acquire) != epoch {
                break;
            }
            let t = i as f32 / steps as f32;
            if let Err(err) = sink.write(velocity * (1.0 - ease(t))) {
                write_err = Some(err);
                break;
            }
            tokio::time::sleep(pause).await;
        }
        // The explicit stop is mandatory even when the last eased step
        // rounded to a nonzero value or the ramp was cut short.
        let settled = sink.settle();
        slot.set_state(ChannelState::Idle);
        match write_err {
            Some(err) => Err(err),
            None => settled,
        }
    }
}
