//! Synthetic faces for unit tests.

use crate::types::{BoundingBox, FrameFeatures, Landmarks, Point, LANDMARK_COUNT};

/// Controllable facial measurements of a synthetic face.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Shape {
    /// Eye aspect ratio of both eyes.
    pub ear: f32,
    /// Inner lip gap divided by mouth width.
    pub mouth_ratio: f32,
    /// Horizontal nose-tip offset from the eye centre.
    pub nose_offset: f32,
}

impl Default for Shape {
    fn default() -> Self {
        Self {
            ear: 0.3,
            mouth_ratio: 0.1,
            nose_offset: 0.0,
        }
    }
}

impl Shape {
    pub fn ear(ear: f32) -> Self {
        Self {
            ear,
            ..Self::default()
        }
    }

    pub fn nose(nose_offset: f32) -> Self {
        Self {
            nose_offset,
            ..Self::default()
        }
    }

    pub fn mouth(mouth_ratio: f32) -> Self {
        Self {
            mouth_ratio,
            ..Self::default()
        }
    }
}

const EYE_WIDTH: f32 = 20.0;
const MOUTH_WIDTH: f32 = 40.0;

fn place_eye(points: &mut [Point], centre_x: f32, centre_y: f32, ear: f32) {
    let half_gap = ear * EYE_WIDTH / 2.0;
    points[0] = Point::new(centre_x - EYE_WIDTH / 2.0, centre_y);
    points[1] = Point::new(centre_x - 4.0, centre_y - half_gap);
    points[2] = Point::new(centre_x + 4.0, centre_y - half_gap);
    points[3] = Point::new(centre_x + EYE_WIDTH / 2.0, centre_y);
    points[4] = Point::new(centre_x + 4.0, centre_y + half_gap);
    points[5] = Point::new(centre_x - 4.0, centre_y + half_gap);
}

/// 68 landmarks around `(cx, cy)`. The outer eye corners (36, 45) sit at
/// `cx ± 40`, so the eye centre used by the challenge is `cx`.
pub(crate) fn landmarks(cx: f32, cy: f32, shape: Shape) -> Landmarks {
    let mut points = vec![Point::new(cx, cy); LANDMARK_COUNT];

    // Left eye: outer corner is its first point.
    place_eye(&mut points[36..42], cx - 30.0, cy - 30.0, shape.ear);
    // Right eye: outer corner is its fourth point.
    place_eye(&mut points[42..48], cx + 30.0, cy - 30.0, shape.ear);

    points[30] = Point::new(cx + shape.nose_offset, cy);

    let mouth_y = cy + 40.0;
    let gap = shape.mouth_ratio * MOUTH_WIDTH;
    points[48] = Point::new(cx - MOUTH_WIDTH / 2.0, mouth_y);
    points[54] = Point::new(cx + MOUTH_WIDTH / 2.0, mouth_y);
    points[61] = Point::new(cx - 5.0, mouth_y - gap / 2.0);
    points[67] = Point::new(cx - 5.0, mouth_y + gap / 2.0);

    Landmarks::new(points).unwrap()
}

/// Box that classifies as `Valid` against the default oval on 640x480.
pub(crate) fn valid_box() -> BoundingBox {
    BoundingBox::new(220.0, 120.0, 200.0, 240.0)
}

pub(crate) fn valid_face(shape: Shape) -> FrameFeatures {
    FrameFeatures::face(valid_box(), Some(landmarks(320.0, 240.0, shape)))
}

pub(crate) fn outside_face() -> FrameFeatures {
    FrameFeatures::face(
        BoundingBox::new(400.0, 120.0, 200.0, 240.0),
        Some(landmarks(500.0, 240.0, Shape::default())),
    )
}
