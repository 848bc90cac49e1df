use anyhow::Result;
use image::RgbImage;

use crate::face_region::FaceRegion;
use crate::region::{BoundingBox, Point};

/// Number of points in the 68-point face convention.
pub const FACE_68: usize = 68;

/// Landmark indices of the 68-point convention used by the aligner.
pub mod index {
    pub const JAW_LEFT: usize = 0;
    pub const JAW_LEFT_LOWER: usize = 3;
    pub const JAW_LEFT_CHIN: usize = 5;
    pub const CHIN: usize = 8;
    pub const JAW_RIGHT_CHIN: usize = 11;
    pub const JAW_RIGHT_LOWER: usize = 13;
    pub const JAW_RIGHT: usize = 16;
    pub const BROW_LEFT_OUTER: usize = 17;
    pub const BROW_RIGHT_OUTER: usize = 26;
    pub const NOSE_TOP: usize = 27;
    pub const NOSE_TIP: usize = 30;
    pub const EYE_LEFT_OUTER: usize = 36;
    pub const EYE_RIGHT_OUTER: usize = 45;
}

/// Maps an image region to an ordered set of facial keypoints.
///
/// An empty result means no face was found inside the box.
pub trait LandmarkExtractor {
    fn extract(&mut self, image: &RgbImage, bbox: &BoundingBox) -> Result<Vec<Point>>;
}

impl<T: LandmarkExtractor + ?Sized> LandmarkExtractor for Box<T> {
    fn extract(&mut self, image: &RgbImage, bbox: &BoundingBox) -> Result<Vec<Point>> {
        (**self).extract(image, bbox)
    }
}

/// Finds faces in an image.
pub trait FaceDetector {
    fn detect(&mut self, image: &RgbImage, min_confidence: f32) -> Result<Vec<FaceRegion>>;
}

/// Detector that hands back regions found earlier instead of running a
/// second detection pass.
#[derive(Debug, Clone, Default)]
pub struct KnownRegions {
    regions: Vec<FaceRegion>,
}

impl KnownRegions {
    pub fn new(regions: Vec<FaceRegion>) -> Self {
        Self { regions }
    }

    pub fn single(region: FaceRegion) -> Self {
        Self {
            regions: vec![region],
        }
    }
}

impl FaceDetector for KnownRegions {
    fn detect(&mut self, _image: &RgbImage, min_confidence: f32) -> Result<Vec<FaceRegion>> {
        Ok(self
            .regions
            .iter()
            .filter(|r| r.confidence() >= min_confidence)
            .cloned()
            .collect())
    }
}

/// Canonical 68-point face, normalised to the unit box.
#[rustfmt::skip]
const MEAN_SHAPE: [(f32, f32); FACE_68] = [
    // jaw
    (0.0000, 0.2500), (0.0096, 0.3963), (0.0381, 0.5370), (0.0843, 0.6667),
    (0.1464, 0.7803), (0.2222, 0.8736), (0.3087, 0.9429), (0.4025, 0.9856),
    (0.5000, 1.0000), (0.5975, 0.9856), (0.6913, 0.9429), (0.7778, 0.8736),
    (0.8536, 0.7803), (0.9157, 0.6667), (0.9619, 0.5370), (0.9904, 0.3963),
    (1.0000, 0.2500),
    // brows
    (0.0800, 0.1800), (0.1500, 0.1300), (0.2300, 0.1200), (0.3100, 0.1300), (0.4000, 0.1600),
    (0.6000, 0.1600), (0.6900, 0.1300), (0.7700, 0.1200), (0.8500, 0.1300), (0.9200, 0.1800),
    // nose
    (0.5000, 0.2500), (0.5000, 0.3300), (0.5000, 0.4100), (0.5000, 0.5000),
    (0.4000, 0.5700), (0.4500, 0.5900), (0.5000, 0.6000), (0.5500, 0.5900), (0.6000, 0.5700),
    // eyes
    (0.2100, 0.3100), (0.2600, 0.2800), (0.3200, 0.2800), (0.3700, 0.3100), (0.3200, 0.3300), (0.2600, 0.3300),
    (0.6300, 0.3100), (0.6800, 0.2800), (0.7400, 0.2800), (0.7900, 0.3100), (0.7400, 0.3300), (0.6800, 0.3300),
    // outer lip
    (0.3500, 0.7500), (0.4000, 0.7200), (0.4500, 0.7000), (0.5000, 0.7100), (0.5500, 0.7000), (0.6000, 0.7200),
    (0.6500, 0.7500), (0.6000, 0.8000), (0.5500, 0.8200), (0.5000, 0.8300), (0.4500, 0.8200), (0.4000, 0.8000),
    // inner lip
    (0.3700, 0.7500), (0.4500, 0.7400), (0.5000, 0.7450), (0.5500, 0.7400),
    (0.6300, 0.7500), (0.5500, 0.7700), (0.5000, 0.7750), (0.4500, 0.7700),
];

/// Fits the canonical 68-point face to the requested box.
///
/// Deterministic and model-free; returns no points for an empty box or a box
/// that does not intersect the image.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanShapeLandmarker;

impl LandmarkExtractor for MeanShapeLandmarker {
    fn extract(&mut self, image: &RgbImage, bbox: &BoundingBox) -> Result<Vec<Point>> {
        if bbox.width <= 0.0 || bbox.height <= 0.0 {
            return Ok(vec![]);
        }
        if bbox.clip_to(image.width(), image.height()).is_none() {
            return Ok(vec![]);
        }
        Ok(MEAN_SHAPE
            .iter()
            .map(|&(u, v)| Point::new(bbox.x + u * bbox.width, bbox.y + v * bbox.height))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_shape_fills_box() {
        let img = RgbImage::new(100, 100);
        let bbox = BoundingBox::new(10.0, 20.0, 50.0, 40.0);
        let pts = MeanShapeLandmarker.extract(&img, &bbox).unwrap();
        assert_eq!(pts.len(), FACE_68);
        assert_eq!(pts[index::JAW_LEFT], Point::new(10.0, 30.0));
        assert_eq!(pts[index::CHIN], Point::new(35.0, 60.0));
        assert!(pts.iter().all(|p| p.x >= 10.0 && p.x <= 60.0 && p.y >= 20.0 && p.y <= 60.0));
    }

    #[test]
    fn test_mean_shape_outside_image_is_empty() {
        let img = RgbImage::new(100, 100);
        let pts = MeanShapeLandmarker
            .extract(&img, &BoundingBox::new(200.0, 200.0, 10.0, 10.0))
            .unwrap();
        assert!(pts.is_empty());
    }

    #[test]
    fn test_known_regions_filters_confidence() {
        let mut a = FaceRegion::from_box(0.0, 0.0, 10.0, 10.0);
        a.set_confidence(0.99);
        let mut b = FaceRegion::from_box(20.0, 0.0, 10.0, 10.0);
        b.set_confidence(0.5);
        let mut det = KnownRegions::new(vec![a, b]);
        let found = det.detect(&RgbImage::new(1, 1), 0.9).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].bounding_box().x, 0.0);
    }
}
