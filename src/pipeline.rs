//! Batch coordinator: frames in source order → detector → result store.
//!
//! One run is a single sequential control flow. Cancellation is polled once per
//! frame boundary, so the store always holds the contiguous prefix of frames the
//! run reached. A decode error aborts the run; the failing frame is not stored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::detect::{BeadDetector, DetectorBackend, FrameRecord};
use crate::error::Result;
use crate::frame::{RoiMask, VideoMetadata};
use crate::ingest::FrameSource;
use crate::store::{JsonlResultStore, ResultStore};

/// Cloneable stop request, safe to trigger from another thread or a signal handler.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Shared slot for the ROI mask; a replacement applies from the next frame on.
#[derive(Clone, Debug)]
pub struct RoiHandle {
    slot: Arc<Mutex<Option<Arc<RoiMask>>>>,
    width: u32,
    height: u32,
}

impl RoiHandle {
    fn new(width: u32, height: u32) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            width,
            height,
        }
    }

    /// Replace (or remove) the mask. The mask must match the normalized frame size.
    pub fn set(&self, mask: Option<RoiMask>) -> Result<()> {
        if let Some(mask) = &mask {
            mask.check_dimensions(self.width, self.height)?;
        }
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = mask.map(Arc::new);
        Ok(())
    }

    fn current(&self) -> Option<Arc<RoiMask>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Outcome of one run. Cancellation is a successful, partial run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub last_frame_id: Option<u64>,
    pub cancelled: bool,
}

pub struct PipelineCoordinator<D = BeadDetector, S = JsonlResultStore> {
    source: FrameSource,
    detector: D,
    store: S,
    roi: RoiHandle,
    cancel: CancelHandle,
}

impl<D: DetectorBackend, S: ResultStore> PipelineCoordinator<D, S> {
    pub fn new(source: FrameSource, detector: D, store: S) -> Self {
        let meta = source.metadata();
        let roi = RoiHandle::new(meta.width, meta.height);
        Self {
            source,
            detector,
            store,
            roi,
            cancel: CancelHandle::default(),
        }
    }

    pub fn metadata(&self) -> &VideoMetadata {
        self.source.metadata()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Request the active run to stop at the next frame boundary. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Mask for all subsequent frames; already processed frames are not revisited.
    pub fn set_roi_mask(&self, mask: Option<RoiMask>) -> Result<()> {
        self.roi.set(mask)
    }

    pub fn roi_handle(&self) -> RoiHandle {
        self.roi.clone()
    }

    /// Process the video from frame 0. See [`Self::run_from`].
    pub fn run(
        &mut self,
        progress: Option<&mut dyn FnMut(f64)>,
        frame_limit: Option<u64>,
    ) -> Result<RunSummary> {
        self.run_from(0, progress, frame_limit)
    }

    /// Process frames from `start_frame`, at most `frame_limit` of them.
    ///
    /// `progress` receives `(frame_id + 1) / frame_count * 100` after each stored
    /// frame, only when the container reports a positive frame count.
    pub fn run_from(
        &mut self,
        start_frame: u64,
        mut progress: Option<&mut dyn FnMut(f64)>,
        frame_limit: Option<u64>,
    ) -> Result<RunSummary> {
        self.cancel.reset();
        let meta = self.source.metadata().clone();
        let total = meta.frame_count.filter(|n| *n > 0);
        log::info!(
            "run started at frame {} with detector {} (limit {:?}, frames {:?})",
            start_frame,
            self.detector.name(),
            frame_limit,
            total
        );

        let mut summary = RunSummary::default();
        let mut frames = self.source.iter_frames(start_frame);
        loop {
            if frame_limit.is_some_and(|limit| summary.frames_processed >= limit) {
                break;
            }
            if self.cancel.is_cancelled() {
                log::info!("run cancelled after {} frames", summary.frames_processed);
                summary.cancelled = true;
                break;
            }
            let Some(frame) = frames.next() else {
                break;
            };
            let frame = frame?;

            let roi = self.roi.current();
            let detections = self.detector.detect(&frame.image, roi.as_deref())?;
            log::debug!("frame {}: {} beads", frame.index, detections.len());

            let record = FrameRecord::new(frame.index, meta.timestamp_for(frame.index), detections);
            self.store.save(&record)?;
            summary.frames_processed += 1;
            summary.last_frame_id = Some(frame.index);

            if let (Some(callback), Some(total)) = (progress.as_mut(), total) {
                callback((frame.index + 1) as f64 / total as f64 * 100.0);
            }
        }

        log::info!(
            "run finished: {} frames processed, last frame {:?}",
            summary.frames_processed,
            summary.last_frame_id
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DetectionConfig, SizeBin};
    use crate::ingest::SyntheticVideo;
    use crate::store::InMemoryResultStore;

    fn coordinator() -> PipelineCoordinator<BeadDetector, InMemoryResultStore> {
        let detector = BeadDetector::new(&DetectionConfig {
            px_per_mm: 10.0,
            bins: vec![SizeBin::new(4, 3.0, 5.0)],
            ..DetectionConfig::default()
        });
        PipelineCoordinator::new(
            FrameSource::synthetic(SyntheticVideo::beads()),
            detector,
            InMemoryResultStore::new(),
        )
    }

    #[test]
    fn full_run_stores_every_frame_with_timestamps() {
        let mut pipeline = coordinator();
        let summary = pipeline.run(None, None).unwrap();
        assert_eq!(summary.frames_processed, 5);
        assert_eq!(summary.last_frame_id, Some(4));
        assert!(!summary.cancelled);
        let record = pipeline.store().get(3).unwrap();
        assert!((record.timestamp - 0.1).abs() < 1e-9);
        assert_eq!(record.detections.len(), 1);
    }

    #[test]
    fn cancel_before_run_is_cleared() {
        let mut pipeline = coordinator();
        pipeline.cancel();
        let summary = pipeline.run(None, Some(2)).unwrap();
        assert_eq!(summary.frames_processed, 2);
    }

    #[test]
    fn mismatched_mask_is_refused() {
        let pipeline = coordinator();
        let mask = RoiMask::circle(10, 10, 5.0, 5.0, 3.0);
        assert!(pipeline.set_roi_mask(Some(mask)).is_err());
    }
}
