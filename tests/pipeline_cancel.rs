use std::fs;

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;

use mill_beads::{
    BeadDetector, DetectionConfig, FrameSource, InMemoryResultStore, JsonlResultStore, MillError,
    PipelineCoordinator, ResultStore, RoiMask, SizeBin, SyntheticVideo,
};

fn bead_frames(n: usize) -> Vec<RgbImage> {
    (0..n)
        .map(|_| {
            let mut frame = RgbImage::new(100, 100);
            draw_filled_circle_mut(&mut frame, (50, 50), 20, Rgb([255, 255, 255]));
            frame
        })
        .collect()
}

fn detector() -> BeadDetector {
    BeadDetector::new(&DetectionConfig {
        px_per_mm: 10.0,
        bins: vec![SizeBin::new(4, 3.0, 5.0)],
        ..DetectionConfig::default()
    })
}

fn in_memory(video: SyntheticVideo) -> PipelineCoordinator<BeadDetector, InMemoryResultStore> {
    PipelineCoordinator::new(
        FrameSource::synthetic(video),
        detector(),
        InMemoryResultStore::new(),
    )
}

#[test]
fn cancelling_leaves_a_contiguous_prefix() {
    let mut pipeline = in_memory(SyntheticVideo::new(bead_frames(10), 30.0));
    let handle = pipeline.cancel_handle();
    let mut calls = 0;
    let mut on_progress = |_: f64| {
        calls += 1;
        if calls == 3 {
            handle.cancel();
        }
    };

    let summary = pipeline.run(Some(&mut on_progress), None).unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.frames_processed, 3);
    assert_eq!(summary.last_frame_id, Some(2));
    assert_eq!(pipeline.store().frame_ids(), vec![0, 1, 2]);
}

#[test]
fn cancel_without_active_run_is_harmless() {
    let mut pipeline = in_memory(SyntheticVideo::new(bead_frames(3), 30.0));
    pipeline.cancel();
    pipeline.cancel();
    let summary = pipeline.run(None, None).unwrap();
    assert!(!summary.cancelled);
    assert_eq!(pipeline.store().len(), 3);
}

#[test]
fn frame_limit_stops_early() {
    let mut pipeline = in_memory(SyntheticVideo::new(bead_frames(8), 30.0));
    let summary = pipeline.run(None, Some(5)).unwrap();
    assert_eq!(summary.frames_processed, 5);
    assert!(!summary.cancelled);
    assert_eq!(pipeline.store().frame_ids(), vec![0, 1, 2, 3, 4]);

    let summary = pipeline.run(None, Some(0)).unwrap();
    assert_eq!(summary.frames_processed, 0);
    assert_eq!(summary.last_frame_id, None);
}

#[test]
fn progress_reports_percent_of_known_total() {
    let mut pipeline = in_memory(SyntheticVideo::new(bead_frames(4), 30.0));
    let mut seen = Vec::new();
    let mut on_progress = |p: f64| seen.push(p);
    pipeline.run(Some(&mut on_progress), None).unwrap();
    assert_eq!(seen, vec![25.0, 50.0, 75.0, 100.0]);

    let mut unknown = in_memory(SyntheticVideo::new(bead_frames(4), 30.0).without_frame_count());
    let mut calls = 0;
    let mut count_calls = |_: f64| calls += 1;
    let summary = unknown.run(Some(&mut count_calls), None).unwrap();
    assert_eq!(summary.frames_processed, 4);
    assert_eq!(calls, 0);
}

#[test]
fn decode_error_aborts_without_storing_the_failed_frame() {
    let mut pipeline = in_memory(SyntheticVideo::new(bead_frames(6), 30.0).failing_at(3));
    let err = pipeline.run(None, None).unwrap_err();
    assert!(matches!(err, MillError::Decode { .. }));
    assert_eq!(pipeline.store().frame_ids(), vec![0, 1, 2]);
}

#[test]
fn resume_continues_after_stored_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.jsonl");

    {
        let store = JsonlResultStore::open(&path).unwrap();
        let mut first = PipelineCoordinator::new(
            FrameSource::synthetic(SyntheticVideo::new(bead_frames(7), 30.0)),
            detector(),
            store,
        );
        assert_eq!(first.run(None, Some(4)).unwrap().frames_processed, 4);
    }

    let store = JsonlResultStore::open(&path).unwrap();
    let start = store.contiguous_prefix_len();
    assert_eq!(start, 4);
    let mut second = PipelineCoordinator::new(
        FrameSource::synthetic(SyntheticVideo::new(bead_frames(7), 30.0).with_keyframe_interval(3)),
        detector(),
        store,
    );
    let summary = second.run_from(start, None, None).unwrap();
    assert_eq!(summary.frames_processed, 3);
    assert_eq!(summary.last_frame_id, Some(6));

    let store = second.into_store();
    assert_eq!(store.frame_ids(), (0..7).collect::<Vec<_>>());
    assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 7);
    let record = store.get(5).unwrap();
    assert!((record.timestamp - 5.0 / 30.0).abs() < 1e-9);
    assert_eq!(record.detections.len(), 1);
}

#[test]
fn mask_change_applies_to_later_frames_only() {
    let mut pipeline = in_memory(SyntheticVideo::new(bead_frames(4), 30.0));
    let roi = pipeline.roi_handle();
    let mut on_progress = |p: f64| {
        if p >= 50.0 {
            roi.set(Some(RoiMask::from_gray(GrayImage::new(100, 100))))
                .unwrap();
        }
    };
    pipeline.run(Some(&mut on_progress), None).unwrap();

    let counts: Vec<usize> = (0..4)
        .map(|id| pipeline.store().get(id).unwrap().detections.len())
        .collect();
    assert_eq!(counts, vec![1, 1, 0, 0]);
}
