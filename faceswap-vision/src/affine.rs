use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::alignment::FaceGeometry;
use crate::color;
use crate::error::SwapError;
use crate::geometry;
use crate::landmarks::LandmarkExtractor;
use crate::region::Region;
use crate::warp;

/// Progress of one compositing call. A failed call stays at the last stage it
/// completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    LandmarksExtracted,
    Aligned,
    MaskWarped,
    ColorCorrected,
    Blended,
    Done,
}

#[derive(Debug)]
pub struct AffineCompositor {
    feather_divisor: f32,
    stage: Stage,
}

impl AffineCompositor {
    pub fn new(feather_divisor: f32) -> Self {
        Self {
            feather_divisor,
            stage: Stage::Init,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, stage: Stage) {
        log::debug!("affine compositor: {:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    /// Warps the reference face from `face_set` onto `dest_region` and blends
    /// it into `destination`. Landmarks and reference tones for the destination
    /// face are read from `source`.
    ///
    /// `destination` is only written in the blend stage, so every error
    /// leaves it untouched.
    pub fn swap<E: LandmarkExtractor + ?Sized>(
        &mut self,
        extractor: &mut E,
        source: &RgbImage,
        destination: &mut RgbImage,
        face_set: &RgbImage,
        dest_region: &Region,
        reference_region: &Region,
    ) -> Result<(), SwapError> {
        self.stage = Stage::Init;

        let target = FaceGeometry::extract(extractor, source, dest_region, self.feather_divisor)?;
        let reference = FaceGeometry::extract(extractor, face_set, reference_region, self.feather_divisor)?;
        self.advance(Stage::LandmarksExtracted);

        let trafo = reference.alignment_to(&target)?;
        self.advance(Stage::Aligned);

        let (w, h) = destination.dimensions();
        let mask = geometry::convex_mask(&reference.boundary, face_set.width(), face_set.height());
        let cutout = cut_out(face_set, &mask);
        let warped_mask = warp::warp_nearest(&mask, &trafo, w, h, Luma([0u8]))?;
        let mut warped_face = warp::warp_nearest(&cutout, &trafo, w, h, Rgb([0u8; 3]))?;
        self.advance(Stage::MaskWarped);

        color::correct_colors(source, &mut warped_face, &warped_mask, &dest_region.bounding_box());
        self.advance(Stage::ColorCorrected);

        let alpha = geometry::feather_mask(&warped_mask, target.feather);
        let touched = blend(destination, &warped_face, &alpha);
        log::debug!("blended {} pixels, feather {}", touched, target.feather);
        self.advance(Stage::Blended);

        self.advance(Stage::Done);
        Ok(())
    }
}

/// Copy of `image` with every pixel outside `mask` set to black.
fn cut_out(image: &RgbImage, mask: &GrayImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        if mask.get_pixel(x, y)[0] != 0 {
            *image.get_pixel(x, y)
        } else {
            Rgb([0, 0, 0])
        }
    })
}

/// `dst = ((255 - a) * dst + a * face) >> 8` wherever the alpha is non-zero.
/// Returns the number of pixels written.
pub fn blend(destination: &mut RgbImage, face: &RgbImage, alpha: &GrayImage) -> usize {
    let mut touched = 0;
    for (x, y, d) in destination.enumerate_pixels_mut() {
        if x >= alpha.width() || y >= alpha.height() || x >= face.width() || y >= face.height() {
            continue;
        }
        let a = alpha.get_pixel(x, y)[0] as u32;
        if a == 0 {
            continue;
        }
        let f = face.get_pixel(x, y);
        for c in 0..3 {
            d[c] = (((255 - a) * d[c] as u32 + a * f[c] as u32) >> 8) as u8;
        }
        touched += 1;
    }
    touched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::MeanShapeLandmarker;

    #[test]
    fn test_blend_formula() {
        let mut dst = RgbImage::from_pixel(2, 1, Rgb([100, 100, 100]));
        let face = RgbImage::from_pixel(2, 1, Rgb([200, 0, 50]));
        let mut alpha = GrayImage::new(2, 1);
        alpha.put_pixel(0, 0, Luma([128]));
        assert_eq!(blend(&mut dst, &face, &alpha), 1);
        assert_eq!(*dst.get_pixel(0, 0), Rgb([149, 49, 74]));
        assert_eq!(*dst.get_pixel(1, 0), Rgb([100, 100, 100]));
    }

    #[test]
    fn test_stage_stops_at_missing_landmarks() {
        let source = RgbImage::new(100, 100);
        let mut dst = source.clone();
        let faces = RgbImage::new(100, 100);
        let mut comp = AffineCompositor::new(8.0);
        let err = comp
            .swap(
                &mut MeanShapeLandmarker,
                &source,
                &mut dst,
                &faces,
                &Region::from_box(20.0, 20.0, 50.0, 50.0, 1.0),
                &Region::from_box(300.0, 300.0, 50.0, 50.0, 1.0),
            )
            .unwrap_err();
        assert!(matches!(err, SwapError::NoLandmarks(_)));
        assert_eq!(comp.stage(), Stage::Init);
    }

    #[test]
    fn test_identity_swap_reaches_done() {
        let img = RgbImage::from_fn(120, 120, |x, y| Rgb([x as u8, y as u8, 77]));
        let mut dst = img.clone();
        let region = Region::from_box(20.0, 30.0, 80.0, 80.0, 1.0);
        let mut comp = AffineCompositor::new(8.0);
        comp.swap(&mut MeanShapeLandmarker, &img, &mut dst, &img, &region, &region)
            .unwrap();
        assert_eq!(comp.stage(), Stage::Done);
        // swapping a face onto itself only loses the >> 8 rounding
        for (a, b) in img.pixels().zip(dst.pixels()) {
            for c in 0..3 {
                assert!(a[c] as i32 - b[c] as i32 <= 1 && b[c] <= a[c]);
            }
        }
    }
}
