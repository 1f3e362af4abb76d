use std::time::Instant;

use crate::session::face_id::FaceId;

/// Observable session activity.
///
/// Every failure surfaces as [`FilterEvent::Error`] before the error is
/// returned to the caller, so listeners see one uniform error stream.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterEvent {
    FacesDetected {
        frame_index: usize,
        count: usize,
    },
    FilterQueued {
        face: FaceId,
        filter: String,
    },
    FiltersApplied {
        faces: usize,
        filters: usize,
    },
    FrameProcessed {
        frame_index: usize,
        total: usize,
        elapsed_ms: f64,
    },
    Error {
        operation: &'static str,
        message: String,
    },
}

pub trait FilterEventListener: Send {
    fn on_event(&mut self, event: &FilterEvent);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards all events.
pub struct NullEventListener;

impl FilterEventListener for NullEventListener {
    fn on_event(&mut self, _event: &FilterEvent) {}
}

/// Forwards events to the `log` facade and keeps run totals.
///
/// Frame progress is throttled to every `throttle_frames` frames.
pub struct LogEventListener {
    throttle_frames: usize,
    started: Instant,
    frames: usize,
    faces: usize,
    errors: usize,
    frame_ms: f64,
}

impl LogEventListener {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            started: Instant::now(),
            frames: 0,
            faces: 0,
            errors: 0,
            frame_ms: 0.0,
        }
    }

    /// Returns the formatted summary, or `None` if nothing was processed.
    pub fn summary_string(&self) -> Option<String> {
        if self.frames == 0 && self.errors == 0 {
            return None;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        let mut text = format!(
            "Processed {} frame(s), {} face(s), {} error(s) in {:.1}s",
            self.frames, self.faces, self.errors, elapsed
        );
        if self.frames > 0 {
            let avg = self.frame_ms / self.frames as f64;
            text.push_str(&format!(" (avg {avg:.1}ms/frame)"));
        }
        Some(text)
    }
}

impl Default for LogEventListener {
    fn default() -> Self {
        Self::new(10)
    }
}

impl FilterEventListener for LogEventListener {
    fn on_event(&mut self, event: &FilterEvent) {
        match event {
            FilterEvent::FacesDetected { frame_index, count } => {
                self.faces += count;
                log::debug!("Frame {frame_index}: {count} face(s) detected");
            }
            FilterEvent::FilterQueued { face, filter } => {
                log::debug!("Queued {filter} on {face}");
            }
            FilterEvent::FiltersApplied { faces, filters } => {
                log::debug!("Applied {filters} filter(s) across {faces} face(s)");
            }
            FilterEvent::FrameProcessed {
                frame_index,
                total,
                elapsed_ms,
            } => {
                self.frames += 1;
                self.frame_ms += elapsed_ms;
                let done = frame_index + 1;
                if done % self.throttle_frames == 0 || done == *total {
                    log::info!("Processed frame {done}/{total}");
                }
            }
            FilterEvent::Error { operation, message } => {
                self.errors += 1;
                log::error!("{operation} failed: {message}");
            }
        }
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("{text}");
        }
    }
}
