use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of points in the landmark model consumed by the motion detectors.
pub const LANDMARK_COUNT: usize = 68;

const LEFT_EYE: std::ops::Range<usize> = 36..42;
const RIGHT_EYE: std::ops::Range<usize> = 42..48;
const NOSE: std::ops::Range<usize> = 27..36;
const MOUTH: std::ops::Range<usize> = 48..68;
const NOSE_TIP: usize = 30;
const LEFT_EYE_OUTER_CORNER: usize = 36;
const RIGHT_EYE_OUTER_CORNER: usize = 45;

#[derive(Error, Debug, PartialEq)]
pub enum LandmarkError {
    #[error("expected 68 landmarks, got {0}")]
    WrongCount(usize),
}

/// A 2-D point in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned face bounding box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Midpoints of the left, right, top and bottom edges, in that order.
    pub fn edge_midpoints(&self) -> [Point; 4] {
        let mid_x = self.x + self.width / 2.0;
        let mid_y = self.y + self.height / 2.0;
        [
            Point::new(self.x, mid_y),
            Point::new(self.x + self.width, mid_y),
            Point::new(mid_x, self.y),
            Point::new(mid_x, self.y + self.height),
        ]
    }
}

/// The 68-point facial landmark set (iBUG ordering).
///
/// Jaw `0..17`, brows `17..27`, nose `27..36`, left eye `36..42`,
/// right eye `42..48`, mouth `48..68`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point>", into = "Vec<Point>")]
pub struct Landmarks(Vec<Point>);

impl Landmarks {
    pub fn new(points: Vec<Point>) -> Result<Self, LandmarkError> {
        if points.len() != LANDMARK_COUNT {
            return Err(LandmarkError::WrongCount(points.len()));
        }
        Ok(Self(points))
    }

    pub fn points(&self) -> &[Point] {
        &self.0
    }

    pub fn left_eye(&self) -> &[Point] {
        &self.0[LEFT_EYE]
    }

    pub fn right_eye(&self) -> &[Point] {
        &self.0[RIGHT_EYE]
    }

    pub fn nose(&self) -> &[Point] {
        &self.0[NOSE]
    }

    pub fn mouth(&self) -> &[Point] {
        &self.0[MOUTH]
    }

    pub fn nose_tip(&self) -> Point {
        self.0[NOSE_TIP]
    }

    /// Outer corners of the left and right eye.
    pub fn outer_eye_corners(&self) -> (Point, Point) {
        (self.0[LEFT_EYE_OUTER_CORNER], self.0[RIGHT_EYE_OUTER_CORNER])
    }

    /// Centroids of the left and right eye contours.
    pub fn eye_centres(&self) -> (Point, Point) {
        (centroid(self.left_eye()), centroid(self.right_eye()))
    }
}

impl TryFrom<Vec<Point>> for Landmarks {
    type Error = LandmarkError;

    fn try_from(points: Vec<Point>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<Landmarks> for Vec<Point> {
    fn from(landmarks: Landmarks) -> Self {
        landmarks.0
    }
}

fn centroid(points: &[Point]) -> Point {
    let n = points.len().max(1) as f32;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Point::new(sx / n, sy / n)
}

/// Per-frame output of the feature source: at most one face.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameFeatures {
    pub detected: bool,
    #[serde(default)]
    pub bbox: BoundingBox,
    #[serde(default)]
    pub landmarks: Option<Landmarks>,
}

impl FrameFeatures {
    /// A frame in which no face was found.
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn face(bbox: BoundingBox, landmarks: Option<Landmarks>) -> Self {
        Self {
            detected: true,
            bbox,
            landmarks,
        }
    }
}

/// Fixed-length face embedding produced by an external recognition model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceDescriptor {
    pub values: Vec<f32>,
}

impl FaceDescriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
