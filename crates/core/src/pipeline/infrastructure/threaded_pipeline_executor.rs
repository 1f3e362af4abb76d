use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use crate::media::domain::frame_sink::FrameSink;
use crate::media::domain::frame_source::FrameSource;
use crate::pipeline::frame_stage::{process_frame, FrameStage};
use crate::pipeline::pipeline_executor::{PipelineConfig, PipelineExecutor};
use crate::session::face_filter_session::FaceFilterSession;
use crate::session::filter_event::FilterEvent;
use crate::shared::frame::Frame;
use crate::shared::source_metadata::SourceMetadata;

const DEFAULT_CHANNEL_CAPACITY: usize = 8;

type SendError = Box<dyn std::error::Error + Send + Sync>;

/// Executes the frame pipeline with dedicated reader and writer threads.
///
/// Layout: `reader → main [stages] → writer`
///
/// Decoding and encoding overlap with filtering; the stages themselves run
/// on the calling thread, one frame at a time, in delivery order.
pub struct ThreadedPipelineExecutor {
    channel_capacity: usize,
}

impl ThreadedPipelineExecutor {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(channel_capacity: usize) -> Self {
        Self {
            channel_capacity: channel_capacity.max(1),
        }
    }
}

impl Default for ThreadedPipelineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineExecutor for ThreadedPipelineExecutor {
    fn execute(
        &self,
        reader: Box<dyn FrameSource>,
        mut writer: Box<dyn FrameSink>,
        session: &mut FaceFilterSession,
        stages: &mut [Box<dyn FrameStage>],
        metadata: &SourceMetadata,
        output_path: &Path,
        config: PipelineConfig,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let cap = self.channel_capacity;
        writer.open(output_path, metadata)?;

        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<Result<Frame, SendError>>(cap);
        let (write_tx, write_rx) = crossbeam_channel::bounded::<Frame>(cap);

        let reader_handle = spawn_reader(reader, frame_tx, config.cancelled.clone());
        let writer_handle = spawn_writer(writer, write_rx);

        let main_error = run_main_loop(
            frame_rx,
            &write_tx,
            session,
            stages,
            metadata.total_frames,
            &config,
        );

        drop(write_tx);
        session.finish();

        join_threads(reader_handle, writer_handle, main_error)
    }
}

fn spawn_reader(
    mut reader: Box<dyn FrameSource>,
    frame_tx: Sender<Result<Frame, SendError>>,
    cancelled: Arc<AtomicBool>,
) -> JoinHandle<Box<dyn FrameSource>> {
    std::thread::spawn(move || {
        for frame_result in reader.frames() {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            let mapped = frame_result.map_err(|e| -> SendError { e.to_string().into() });
            if frame_tx.send(mapped).is_err() {
                break;
            }
        }
        reader.close();
        reader
    })
}

fn spawn_writer(
    mut writer: Box<dyn FrameSink>,
    write_rx: Receiver<Frame>,
) -> JoinHandle<Result<Box<dyn FrameSink>, SendError>> {
    std::thread::spawn(move || {
        for frame in write_rx {
            writer
                .write(&frame)
                .map_err(|e| -> SendError { e.to_string().into() })?;
        }
        Ok(writer)
    })
}

/// Receives decoded frames, runs the stages on each and forwards the result
/// to the writer. Returns the first error, if any.
fn run_main_loop(
    frame_rx: Receiver<Result<Frame, SendError>>,
    write_tx: &Sender<Frame>,
    session: &mut FaceFilterSession,
    stages: &mut [Box<dyn FrameStage>],
    total_frames: usize,
    config: &PipelineConfig,
) -> Option<Box<dyn std::error::Error>> {
    let mut frames_processed: usize = 0;

    for frame_result in frame_rx {
        if config.cancelled.load(Ordering::Relaxed) {
            log::info!("Cancelled after {frames_processed} frame(s)");
            break;
        }

        let frame = match frame_result {
            Ok(frame) => frame,
            Err(e) => {
                session.emit(FilterEvent::Error {
                    operation: "read",
                    message: e.to_string(),
                });
                return Some(e.to_string().into());
            }
        };

        let frame_index = frame.index();
        let started = Instant::now();
        let out = match process_frame(session, stages, frame) {
            Ok(out) => out,
            Err(e) => return Some(format!("frame {frame_index}: {e}").into()),
        };
        session.emit(FilterEvent::FrameProcessed {
            frame_index,
            total: total_frames,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        });

        if write_tx.send(out).is_err() {
            // Writer hung up; its own error is reported on join.
            break;
        }
        frames_processed += 1;

        if let Some(cb) = &config.on_progress {
            if !cb(frames_processed, total_frames) {
                config.cancelled.store(true, Ordering::Relaxed);
            }
        }
    }

    None
}

/// Joins the I/O threads and coalesces the first error encountered.
fn join_threads(
    reader_handle: JoinHandle<Box<dyn FrameSource>>,
    writer_handle: JoinHandle<Result<Box<dyn FrameSink>, SendError>>,
    mut first_error: Option<Box<dyn std::error::Error>>,
) -> Result<(), Box<dyn std::error::Error>> {
    fn set_if_none(slot: &mut Option<Box<dyn std::error::Error>>, err: Box<dyn std::error::Error>) {
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    if reader_handle.join().is_err() {
        set_if_none(&mut first_error, "Reader thread panicked".into());
    }

    match writer_handle.join() {
        Ok(Ok(mut w)) => {
            if let Err(e) = w.close() {
                set_if_none(&mut first_error, e);
            }
        }
        Ok(Err(e)) => set_if_none(&mut first_error, e.to_string().into()),
        Err(_) => set_if_none(&mut first_error, "Writer thread panicked".into()),
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
