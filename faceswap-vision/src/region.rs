use std::collections::BTreeMap;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Confidence assigned to regions that were rejected (e.g. too close to the border).
pub const REJECTED_CONFIDENCE: f32 = -1.0;

/// Cluster index of a region that does not belong to any cluster.
pub const UNCLUSTERED: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl std::ops::Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Axis-aligned box given by its upper-left corner and size.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest box containing all points. `None` for an empty slice.
    pub fn enclosing(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Integer pixel rectangle `(x, y, w, h)` clipped to an image of the given size.
    /// `None` when nothing of the box lies inside the image.
    pub fn clip_to(&self, img_width: u32, img_height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x.floor().max(0.0);
        let y0 = self.y.floor().max(0.0);
        let x1 = self.right().ceil().min(img_width as f32);
        let y1 = self.bottom().ceil().min(img_height as f32);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
    }
}

/// Provenance flags of a region. Flags combine with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DetectionType(u8);

impl DetectionType {
    pub const DETECTED: Self = Self(1);
    pub const MANUAL: Self = Self(2);
    pub const PREDICTED: Self = Self(4);
    pub const INTERPOLATED: Self = Self(8);
    pub const EXTRAPOLATED: Self = Self(16);

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Unknown bits are dropped.
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & 0b1_1111)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for DetectionType {
    fn default() -> Self {
        Self::DETECTED
    }
}

impl BitOr for DetectionType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DetectionType {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Free-form string parameters. Keys are unique; writing an existing key
/// replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    entries: BTreeMap<String, String>,
}

impl Parameters {
    /// Returns the position of `key` in key order after the insert.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> usize {
        let key = key.into();
        self.entries.insert(key.clone(), value.into());
        self.entries.range(..key).count()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn get_index(&self, index: usize) -> Option<(&str, &str)> {
        self.entries
            .iter()
            .nth(index)
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    center: Point,
    bbox: BoundingBox,
    points: Vec<Point>,
    detection_type: DetectionType,
    confidence: f32,
    scale: f32,
    cluster_index: i32,
    #[serde(skip)]
    appearance_calculated: bool,
    parameters: Parameters,
}

impl Default for Region {
    fn default() -> Self {
        Self {
            center: Point::default(),
            bbox: BoundingBox::default(),
            points: Vec::new(),
            detection_type: DetectionType::DETECTED,
            confidence: 0.0,
            scale: 1.0,
            cluster_index: UNCLUSTERED,
            appearance_calculated: false,
            parameters: Parameters::default(),
        }
    }
}

impl Region {
    /// Zero-sized region anchored at a single point.
    pub fn at(x: f32, y: f32, scale: f32) -> Self {
        Self {
            center: Point::new(x, y),
            bbox: BoundingBox::new(x, y, 0.0, 0.0),
            scale,
            ..Self::default()
        }
    }

    pub fn from_box(x: f32, y: f32, width: f32, height: f32, scale: f32) -> Self {
        let bbox = BoundingBox::new(x, y, width.max(0.0), height.max(0.0));
        Self {
            center: bbox.center(),
            bbox,
            scale,
            ..Self::default()
        }
    }

    pub fn from_points(points: Vec<Point>, scale: f32) -> Self {
        let mut region = Self {
            points,
            scale,
            ..Self::default()
        };
        region.update_box_from_points();
        region.center = region.bbox.center();
        region
    }

    pub fn center(&self) -> Point {
        self.center
    }

    /// Overrides the center without touching the bounding box.
    pub fn set_center(&mut self, x: f32, y: f32) {
        self.center = Point::new(x, y);
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    /// Replaces the box only; the center keeps its value.
    pub fn set_bounding_box(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.bbox = BoundingBox::new(x, y, width.max(0.0), height.max(0.0));
    }

    pub(crate) fn set_box_and_center(&mut self, bbox: BoundingBox) {
        self.set_bounding_box(bbox.x, bbox.y, bbox.width, bbox.height);
        self.center = self.bbox.center();
    }

    pub fn add_point(&mut self, x: f32, y: f32) {
        self.points.push(Point::new(x, y));
    }

    pub fn set_points(&mut self, points: Vec<Point>) {
        self.points = points;
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn clear_points(&mut self) {
        self.points.clear();
    }

    /// Recomputes the box as the min/max of the polygon. No-op without points.
    pub fn update_box_from_points(&mut self) {
        if let Some(bbox) = BoundingBox::enclosing(&self.points) {
            self.bbox = bbox;
        }
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn set_confidence(&mut self, confidence: f32) {
        self.confidence = confidence;
    }

    pub fn is_rejected(&self) -> bool {
        self.confidence == REJECTED_CONFIDENCE
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
    }

    pub fn detection_type(&self) -> DetectionType {
        self.detection_type
    }

    pub fn set_detection_type(&mut self, detection_type: DetectionType) {
        self.detection_type = detection_type;
    }

    pub fn appearance_calculated(&self) -> bool {
        self.appearance_calculated
    }

    pub(crate) fn mark_appearance_calculated(&mut self) {
        self.appearance_calculated = true;
    }

    pub fn reset_appearance(&mut self) {
        self.appearance_calculated = false;
    }

    pub fn cluster_index(&self) -> i32 {
        self.cluster_index
    }

    pub fn set_cluster_index(&mut self, cluster_index: i32) {
        self.cluster_index = cluster_index;
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Last write wins. Returns the parameter's index.
    pub fn add_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) -> usize {
        self.parameters.insert(key, value)
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key)
    }

    pub fn parameter_at(&self, index: usize) -> Option<(&str, &str)> {
        self.parameters.get_index(index)
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn clear_parameters(&mut self) {
        self.parameters.clear();
    }

    /// Translates by `(x, y)` and rescales about the current center.
    ///
    /// The box stays centred on its old middle while it grows or shrinks, so
    /// `shift_region(-x, -y, 1.0 / scale)` undoes `shift_region(x, y, scale)`.
    pub fn shift_region(&mut self, x: f32, y: f32, scale: f32) {
        let c = self.center;
        for p in &mut self.points {
            p.x = c.x + (p.x - c.x) * scale + x;
            p.y = c.y + (p.y - c.y) * scale + y;
        }

        self.center.x += x;
        self.center.y += y;

        self.bbox.x += x + self.bbox.width * 0.5 * (1.0 - scale);
        self.bbox.y += y + self.bbox.height * 0.5 * (1.0 - scale);
        self.bbox.width *= scale;
        self.bbox.height *= scale;

        self.appearance_calculated = false;
    }

    /// Strict interior test: points on the box edge are outside.
    pub fn point_within_region(&self, x: f32, y: f32) -> bool {
        x > self.bbox.x && x < self.bbox.right() && y > self.bbox.y && y < self.bbox.bottom()
    }

    /// Euclidean distance between the two centers.
    pub fn center_distance(&self, other: &Region) -> f32 {
        self.center.distance(&other.center)
    }

    /// Deep copy of every base field.
    pub fn copy_from(&mut self, other: &Region) {
        self.clone_from(other);
    }
}
