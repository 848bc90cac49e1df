use image::RgbImage;

use crate::error::SwapError;
use crate::landmarks::{index, LandmarkExtractor};
use crate::region::{Point, Region};
use crate::transform::Affine;

/// Default ratio between the jaw span and the feather size.
pub const DEFAULT_FEATHER_DIVISOR: f32 = 8.0;

/// Face outline and control points derived from one landmark set.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceGeometry {
    /// Seven jaw points followed by two synthesized forehead points, in
    /// polygon order.
    pub boundary: [Point; 9],
    /// Chin, outer corner of the left eye, outer corner of the right eye.
    pub keypoints: [Point; 3],
    /// Blend softness in pixels.
    pub feather: u32,
}

impl FaceGeometry {
    pub fn from_landmarks(landmarks: &[Point], feather_divisor: f32) -> Result<Self, SwapError> {
        let needed = index::EYE_RIGHT_OUTER + 1;
        if landmarks.len() < needed {
            return Err(SwapError::TooFewLandmarks {
                found: landmarks.len(),
                expected: needed,
            });
        }
        let lm = |i: usize| landmarks[i];

        // The model has no forehead points: push the outer brow points up by
        // the length of the nose bridge.
        let nose = lm(index::NOSE_TOP) - lm(index::NOSE_TIP);

        let boundary = [
            lm(index::JAW_LEFT),
            lm(index::JAW_LEFT_LOWER),
            lm(index::JAW_LEFT_CHIN),
            lm(index::CHIN),
            lm(index::JAW_RIGHT_CHIN),
            lm(index::JAW_RIGHT_LOWER),
            lm(index::JAW_RIGHT),
            lm(index::BROW_RIGHT_OUTER) + nose,
            lm(index::BROW_LEFT_OUTER) + nose,
        ];

        let keypoints = [
            lm(index::CHIN),
            lm(index::EYE_LEFT_OUTER),
            lm(index::EYE_RIGHT_OUTER),
        ];

        let span = boundary[0].distance(&boundary[6]);
        let feather = if feather_divisor > 0.0 {
            (span / feather_divisor) as u32
        } else {
            0
        };

        Ok(Self {
            boundary,
            keypoints,
            feather,
        })
    }

    /// Runs `extractor` over the region's box and derives the geometry.
    pub fn extract<E: LandmarkExtractor + ?Sized>(
        extractor: &mut E,
        image: &RgbImage,
        region: &Region,
        feather_divisor: f32,
    ) -> Result<Self, SwapError> {
        let bbox = region.bounding_box();
        let landmarks = extractor.extract(image, &bbox)?;
        if landmarks.is_empty() {
            return Err(SwapError::NoLandmarks(bbox));
        }
        Self::from_landmarks(&landmarks, feather_divisor)
    }

    /// Transform that carries `self`'s keypoints onto `target`'s.
    pub fn alignment_to(&self, target: &FaceGeometry) -> Result<Affine, SwapError> {
        Affine::from_triangles(&self.keypoints, &target.keypoints)
            .ok_or(SwapError::DegenerateTransform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::MeanShapeLandmarker;
    use crate::region::BoundingBox;

    #[test]
    fn test_geometry_from_mean_shape() {
        let img = RgbImage::new(500, 500);
        let region = Region::from_box(100.0, 100.0, 200.0, 200.0, 1.0);
        let g = FaceGeometry::extract(&mut MeanShapeLandmarker, &img, &region, 8.0).unwrap();

        assert_eq!(g.boundary[0], Point::new(100.0, 150.0));
        assert_eq!(g.boundary[6], Point::new(300.0, 150.0));
        assert_eq!(g.keypoints[0], Point::new(200.0, 300.0));
        assert_eq!(g.feather, 25);
        // forehead points sit above the brows
        assert!(g.boundary[7].y < 100.0 && g.boundary[8].y < 100.0);
    }

    #[test]
    fn test_too_few_landmarks() {
        let pts = vec![Point::new(0.0, 0.0); 5];
        let err = FaceGeometry::from_landmarks(&pts, 8.0).unwrap_err();
        assert!(matches!(
            err,
            SwapError::TooFewLandmarks {
                found: 5,
                expected: 46
            }
        ));
    }

    #[test]
    fn test_missing_face_is_reported() {
        let img = RgbImage::new(50, 50);
        let region = Region::from_box(100.0, 100.0, 20.0, 20.0, 1.0);
        let err = FaceGeometry::extract(&mut MeanShapeLandmarker, &img, &region, 8.0).unwrap_err();
        assert!(matches!(err, SwapError::NoLandmarks(b) if b == BoundingBox::new(100.0, 100.0, 20.0, 20.0)));
    }

    #[test]
    fn test_alignment_between_scaled_faces() {
        let img = RgbImage::new(500, 500);
        let small = Region::from_box(50.0, 50.0, 100.0, 100.0, 1.0);
        let large = Region::from_box(200.0, 100.0, 200.0, 200.0, 1.0);
        let a = FaceGeometry::extract(&mut MeanShapeLandmarker, &img, &small, 8.0).unwrap();
        let b = FaceGeometry::extract(&mut MeanShapeLandmarker, &img, &large, 8.0).unwrap();
        let t = a.alignment_to(&b).unwrap();
        for (p, q) in a.boundary.iter().zip(&b.boundary) {
            assert!(t.apply(*p).distance(q) < 1e-2);
        }
    }
}
