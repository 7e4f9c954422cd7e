// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::ScriptedDetector;
use crate::detect::{DetectOptions, Detection, Detector, Frame};
use parkhub::wire::PixelBox;

fn det(class: &str) -> Detection {
    Detection {
        class: class.to_owned(),
        confidence: 0.9,
        bbox: PixelBox::new(10, 10, 50, 50),
        track_id: None,
    }
}

fn frame() -> Frame {
    let image = image::RgbImage::new(64, 48);
    let jpeg = crate::annotate::encode_jpeg(&image, 85).unwrap();
    Frame::decode(jpeg).unwrap()
}

fn opts() -> DetectOptions {
    DetectOptions { conf_threshold: 0.25, iou_threshold: 0.45, tracking: true }
}

#[tokio::test]
async fn replays_frames_in_script_order() {
    let detector =
        ScriptedDetector::new(vec![vec![det("car")], Vec::new(), vec![det("bus"), det("truck")]]);
    let frame = frame();

    let first = detector.detect(&frame, &opts()).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].class, "car");

    assert!(detector.detect(&frame, &opts()).await.unwrap().is_empty());

    let third = detector.detect(&frame, &opts()).await.unwrap();
    assert_eq!(third.len(), 2);
    assert_eq!(third[0].class, "bus");
}

#[tokio::test]
async fn exhausted_script_returns_no_detections() {
    let detector = ScriptedDetector::new(vec![vec![det("car")]]);
    let frame = frame();

    detector.detect(&frame, &opts()).await.unwrap();
    assert_eq!(detector.remaining(), 0);
    for _ in 0..3 {
        assert!(detector.detect(&frame, &opts()).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn push_appends_to_the_script() {
    let detector = ScriptedDetector::default();
    assert_eq!(detector.remaining(), 0);

    detector.push(vec![det("car")]);
    detector.push(vec![det("motorcycle")]);
    assert_eq!(detector.remaining(), 2);

    let frame = frame();
    assert_eq!(detector.detect(&frame, &opts()).await.unwrap()[0].class, "car");
    assert_eq!(detector.detect(&frame, &opts()).await.unwrap()[0].class, "motorcycle");
}
