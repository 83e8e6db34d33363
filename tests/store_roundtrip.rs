use std::fs;

use mill_beads::{Detection, FrameRecord, JsonlResultStore, ResultStore};

fn record(frame_id: u64, beads: usize) -> FrameRecord {
    let detections = (0..beads)
        .map(|i| Detection {
            x: 10 + i as i32 * 20,
            y: 40,
            radius_px: 7.25,
            diameter_mm: 1.5,
            class: 2,
            confidence: 0.75,
        })
        .collect();
    FrameRecord::new(frame_id, frame_id as f64 * 0.5, detections)
}

#[test]
fn saved_record_is_equal_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.jsonl");

    let original = record(7, 3);
    {
        let mut store = JsonlResultStore::open(&path).unwrap();
        store.save(&original).unwrap();
    }
    let reopened = JsonlResultStore::open(&path).unwrap();
    assert_eq!(reopened.get(7), Some(&original));
    assert_eq!(reopened.len(), 1);
}

#[test]
fn measured_values_reload_bit_exact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.jsonl");
    let px_per_mm = 13.7;

    let records: Vec<FrameRecord> = (0..200u64)
        .map(|id| {
            let radius_px = 4.0 + id as f64 / 7.0;
            let detections = vec![
                Detection {
                    x: 12,
                    y: 30,
                    radius_px,
                    diameter_mm: 2.0 * radius_px / px_per_mm,
                    class: 1,
                    confidence: 0.39000599999999996,
                },
                Detection {
                    x: 70,
                    y: 31,
                    radius_px: 17.3,
                    diameter_mm: 2.0 * 17.3 / px_per_mm,
                    class: 3,
                    confidence: 0.6 * (0.65 + id as f64 / 613.0),
                },
            ];
            FrameRecord::new(id, id as f64 / 29.97, detections)
        })
        .collect();
    {
        let mut store = JsonlResultStore::open(&path).unwrap();
        for rec in &records {
            store.save(rec).unwrap();
        }
    }

    let reopened = JsonlResultStore::open(&path).unwrap();
    assert_eq!(reopened.len(), records.len());
    for rec in &records {
        let loaded = reopened.get(rec.frame_id).unwrap();
        assert_eq!(loaded.timestamp.to_bits(), rec.timestamp.to_bits());
        assert_eq!(loaded, rec);
    }
}

#[test]
fn log_lines_use_the_documented_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.jsonl");
    let mut store = JsonlResultStore::open(&path).unwrap();
    store.save(&record(0, 1)).unwrap();

    let raw = fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(raw.trim_end()).unwrap();
    assert_eq!(value["frame_id"], 0);
    assert_eq!(value["timestamp"], 0.0);
    let ball = &value["balls"][0];
    for key in ["x", "y", "r_px", "diameter_mm", "cls", "conf"] {
        assert!(ball.get(key).is_some(), "missing {key}");
    }
}

#[test]
fn malformed_lines_are_skipped_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.jsonl");
    let lines = [
        serde_json::to_string(&record(0, 1)).unwrap(),
        "not json at all".to_string(),
        String::new(),
        r#"{"frame_id": "one"}"#.to_string(),
        serde_json::to_string(&record(1, 2)).unwrap(),
    ];
    fs::write(&path, lines.join("\n") + "\n").unwrap();

    let store = JsonlResultStore::open(&path).unwrap();
    assert_eq!(store.frame_ids(), vec![0, 1]);
    assert_eq!(store.malformed_lines(), 2);
    assert_eq!(store.get(1).unwrap().detections.len(), 2);
}

#[test]
fn last_write_wins_across_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.jsonl");
    let mut store = JsonlResultStore::open(&path).unwrap();
    store.save(&record(2, 1)).unwrap();
    store.save(&record(3, 1)).unwrap();
    store.save(&record(2, 4)).unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 3);
    assert_eq!(store.load().unwrap(), 2);
    assert_eq!(store.get(2).unwrap().detections.len(), 4);
}

#[test]
fn clear_then_get_is_absent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.jsonl");
    let mut store = JsonlResultStore::open(&path).unwrap();
    store.save(&record(0, 1)).unwrap();
    store.clear().unwrap();

    assert!(store.get(0).is_none());
    assert!(store.is_empty());
    assert!(!path.exists());
    let reopened = JsonlResultStore::open(&path).unwrap();
    assert!(reopened.is_empty());
}

#[test]
fn opening_a_missing_log_does_not_create_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("later.jsonl");
    let store = JsonlResultStore::open(&path).unwrap();
    assert!(store.is_empty());
    assert!(!path.exists());
}
