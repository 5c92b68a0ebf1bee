//! Frame Loop Controller.
//!
//! A small state machine driving frame source, pipeline and viewer:
//!
//! * `Playing`: read a frame (end of stream stops the loop), process it,
//!   show it, then poll for a key with a short timeout. `PauseStep` pauses,
//!   `Quit` stops.
//! * `Paused`: block for a key. `PauseStep` advances exactly one frame and
//!   stays paused, `Quit` stops, any other key resumes playback.
//! * `Stopped`: terminal.

use super::{FrameOutcome, PosePipeline};
use crate::io::{CornerDetector, FrameSource, IoError, Key, Viewer};
use log::{debug, info};
use std::time::Duration;

/// Key-poll timeout while playing.
pub const DEFAULT_WAIT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

/// Frame counts of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub frames: usize,
    pub rendered: usize,
    pub skipped: usize,
}

pub struct FrameLoop<S, D, V> {
    pipeline: PosePipeline,
    source: S,
    detector: D,
    viewer: V,
    state: PlaybackState,
    wait: Duration,
    summary: LoopSummary,
}

impl<S, D, V> FrameLoop<S, D, V>
where
    S: FrameSource,
    D: CornerDetector,
    V: Viewer,
{
    pub fn new(pipeline: PosePipeline, source: S, detector: D, viewer: V) -> Self {
        Self {
            pipeline,
            source,
            detector,
            viewer,
            state: PlaybackState::Playing,
            wait: DEFAULT_WAIT,
            summary: LoopSummary::default(),
        }
    }

    /// Key-poll timeout used while playing.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Begin in `Paused` instead of `Playing`.
    pub fn start_paused(mut self) -> Self {
        self.state = PlaybackState::Paused;
        self
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn summary(&self) -> &LoopSummary {
        &self.summary
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn viewer(&self) -> &V {
        &self.viewer
    }

    /// Reads, processes and shows one frame. Returns `false` at end of stream.
    fn advance(&mut self) -> Result<bool, IoError> {
        let Some(mut frame) = self.source.read_frame() else {
            debug!("Frame source exhausted after {} frames", self.summary.frames);
            return Ok(false);
        };
        self.summary.frames += 1;

        match self.pipeline.process_frame(&mut frame, &mut self.detector) {
            FrameOutcome::Rendered { annotation, .. } => {
                self.summary.rendered += 1;
                info!("Frame {}: {}", self.summary.frames, annotation.label);
            }
            FrameOutcome::Skipped(reason) => {
                self.summary.skipped += 1;
                debug!("Frame {} shown without overlay: {reason}", self.summary.frames);
            }
        }

        self.viewer.show(&frame)?;
        Ok(true)
    }

    /// Performs a single state transition.
    ///
    /// # Errors
    ///
    /// Propagates [`IoError`] from the viewer; the state is left unchanged.
    pub fn step(&mut self) -> Result<PlaybackState, IoError> {
        let next = match self.state {
            PlaybackState::Playing => {
                if !self.advance()? {
                    PlaybackState::Stopped
                } else {
                    match self.viewer.poll_key(Some(self.wait)) {
                        Some(Key::PauseStep) => PlaybackState::Paused,
                        Some(Key::Quit) => PlaybackState::Stopped,
                        _ => PlaybackState::Playing,
                    }
                }
            }
            PlaybackState::Paused => match self.viewer.poll_key(None) {
                Some(Key::PauseStep) => {
                    if self.advance()? {
                        PlaybackState::Paused
                    } else {
                        PlaybackState::Stopped
                    }
                }
                Some(Key::Quit) => PlaybackState::Stopped,
                Some(Key::Other(_)) | None => PlaybackState::Playing,
            },
            PlaybackState::Stopped => PlaybackState::Stopped,
        };
        if next != self.state {
            debug!("Playback {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        Ok(next)
    }

    /// Runs until the loop stops, then closes the frame source.
    ///
    /// # Errors
    ///
    /// Returns the first viewer [`IoError`]; the source is closed either way.
    pub fn run(&mut self) -> Result<LoopSummary, IoError> {
        let result = self.drive();
        self.source.close();
        result?;
        info!(
            "Processed {} frames: {} rendered, {} skipped",
            self.summary.frames, self.summary.rendered, self.summary.skipped
        );
        Ok(self.summary.clone())
    }

    fn drive(&mut self) -> Result<(), IoError> {
        while self.state != PlaybackState::Stopped {
            self.step()?;
        }
        Ok(())
    }
}
