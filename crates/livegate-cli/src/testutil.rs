//! Synthetic detections for engine and replay tests.

use livegate_core::{BoundingBox, FrameFeatures, Landmarks, Point};

/// A face centred in a 640x480 frame that sits inside the default oval.
/// `ear` sets both eye aspect ratios; `nose_offset` moves the nose tip
/// horizontally relative to the eye centre.
pub(crate) fn face(ear: f32, nose_offset: f32) -> FrameFeatures {
    let (cx, cy) = (320.0, 240.0);
    let mut points = vec![Point::new(cx, cy); 68];

    for (start, eye_x) in [(36, cx - 30.0), (42, cx + 30.0)] {
        let gap = ear * 10.0;
        let eye_y = cy - 30.0;
        points[start] = Point::new(eye_x - 10.0, eye_y);
        points[start + 1] = Point::new(eye_x - 4.0, eye_y - gap);
        points[start + 2] = Point::new(eye_x + 4.0, eye_y - gap);
        points[start + 3] = Point::new(eye_x + 10.0, eye_y);
        points[start + 4] = Point::new(eye_x + 4.0, eye_y + gap);
        points[start + 5] = Point::new(eye_x - 4.0, eye_y + gap);
    }
    points[30] = Point::new(cx + nose_offset, cy);
    points[48] = Point::new(cx - 20.0, cy + 40.0);
    points[54] = Point::new(cx + 20.0, cy + 40.0);

    let landmarks = Landmarks::new(points).unwrap();
    FrameFeatures::face(BoundingBox::new(220.0, 120.0, 200.0, 240.0), Some(landmarks))
}

pub(crate) fn neutral() -> FrameFeatures {
    face(0.3, 0.0)
}

/// A trace that completes a session without the challenge step: start,
/// three EAR swings, a head turn, then frames to sit out the hold.
pub(crate) fn passing_trace(hold_frames: usize) -> Vec<FrameFeatures> {
    let mut trace = vec![neutral(), face(0.3, 0.0)];
    for ear in [0.2, 0.3, 0.2] {
        trace.push(face(ear, 0.0));
    }
    trace.push(face(0.3, 0.0));
    trace.push(face(0.3, 40.0));
    trace.extend(std::iter::repeat_with(neutral).take(hold_frames));
    trace
}
