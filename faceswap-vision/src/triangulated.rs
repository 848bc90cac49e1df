use image::{imageops, GrayImage, Rgb32FImage, RgbImage};

use crate::delaunay;
use crate::error::SwapError;
use crate::face_region::FaceRegion;
use crate::geometry;
use crate::landmarks::{FaceDetector, KnownRegions, LandmarkExtractor};
use crate::region::{Point, Region};
use crate::seamless::{self, SeamlessParams};
use crate::transform::Affine;
use crate::warp::{self, Border};

#[derive(Debug, Clone)]
pub struct TriangulatedCompositor {
    params: SeamlessParams,
}

impl TriangulatedCompositor {
    pub fn new(params: SeamlessParams) -> Self {
        Self { params }
    }

    pub fn swap<E: LandmarkExtractor + ?Sized>(
        &self,
        extractor: &mut E,
        source: &RgbImage,
        destination: &mut RgbImage,
        face_set: &RgbImage,
        dest_region: &Region,
        reference_region: &Region,
    ) -> Result<(), SwapError> {
        let reference_points = landmarks_in(extractor, face_set, reference_region)?;
        let dest_points = landmarks_in(extractor, source, dest_region)?;
        if reference_points.len() != dest_points.len() {
            return Err(SwapError::TooFewLandmarks {
                found: reference_points.len().min(dest_points.len()),
                expected: reference_points.len().max(dest_points.len()),
            });
        }

        let hull = geometry::convex_hull_indices(&dest_points);
        if hull.len() < 3 {
            return Err(SwapError::EmptyHull);
        }
        let hull_dst: Vec<Point> = hull.iter().map(|&i| dest_points[i]).collect();
        let hull_src: Vec<Point> = hull.iter().map(|&i| reference_points[i]).collect();

        let (w, h) = destination.dimensions();
        let triangles = delaunay::within_rect(
            delaunay::triangulate(&hull_dst),
            &hull_dst,
            (0.0, 0.0, w as f32, h as f32),
        );
        log::debug!("{} hull points, {} triangles", hull.len(), triangles.len());
        if triangles.is_empty() {
            return Err(SwapError::EmptyHull);
        }

        let face_set_f32 = image::DynamicImage::ImageRgb8(face_set.clone()).into_rgb32f();
        let mut assembled = image::DynamicImage::ImageRgb8(destination.clone()).into_rgb32f();
        for tri in &triangles {
            let src_tri = tri.map(|i| hull_src[i]);
            let dst_tri = tri.map(|i| hull_dst[i]);
            warp_triangle(&face_set_f32, &mut assembled, &src_tri, &dst_tri);
        }

        let mask = {
            let mut mask = GrayImage::new(w, h);
            geometry::fill_polygon(&mut mask, &hull_dst, (0, 0), 255);
            mask
        };
        // same rasterisation as the mask, so the clone lands where the triangles were warped
        let Some(center) = geometry::mask_center(&mask) else {
            return Err(SwapError::EmptyHull);
        };

        // the solver works on 0..255 intensities
        for p in assembled.pixels_mut() {
            for c in 0..3 {
                p[c] *= 255.0;
            }
        }
        let sweeps = seamless::seamless_clone(&assembled, destination, &mask, center, &self.params);
        log::debug!("seamless clone at {:?} took {} sweeps", center, sweeps);
        Ok(())
    }
}

/// Landmarks of `region`, fetched through the known-region detector so no
/// second detection pass runs.
fn landmarks_in<E: LandmarkExtractor + ?Sized>(
    extractor: &mut E,
    image: &RgbImage,
    region: &Region,
) -> Result<Vec<Point>, SwapError> {
    let bbox = region.bounding_box();
    let mut detector = KnownRegions::single(FaceRegion::from_region(region));
    let face = detector
        .detect(image, f32::MIN)?
        .into_iter()
        .next()
        .ok_or(SwapError::NoLandmarks(bbox))?;
    let points = extractor.extract(image, &face.bounding_box())?;
    if points.is_empty() {
        return Err(SwapError::NoLandmarks(bbox));
    }
    Ok(points)
}

/// Warps triangle `src_tri` of `src` onto triangle `dst_tri` of `dst`,
/// replacing only the pixels inside the destination triangle.
fn warp_triangle(src: &Rgb32FImage, dst: &mut Rgb32FImage, src_tri: &[Point; 3], dst_tri: &[Point; 3]) {
    let (Some(r1), Some(r2)) = (geometry::bounding_rect(src_tri), geometry::bounding_rect(dst_tri)) else {
        return;
    };

    // clip the source rect to the image, the warp reflects at its edges
    let sx0 = r1.0.max(0);
    let sy0 = r1.1.max(0);
    let sx1 = (r1.0 + r1.2 as i32).min(src.width() as i32);
    let sy1 = (r1.1 + r1.3 as i32).min(src.height() as i32);
    if sx1 <= sx0 || sy1 <= sy0 {
        log::debug!("source triangle {:?} outside face image", src_tri);
        return;
    }
    let crop = imageops::crop_imm(src, sx0 as u32, sy0 as u32, (sx1 - sx0) as u32, (sy1 - sy0) as u32).to_image();

    let local_src = src_tri.map(|p| Point::new(p.x - sx0 as f32, p.y - sy0 as f32));
    let local_dst = dst_tri.map(|p| Point::new(p.x - r2.0 as f32, p.y - r2.1 as f32));
    let Some(trafo) = Affine::from_triangles(&local_src, &local_dst) else {
        log::debug!("degenerate triangle pair {:?} -> {:?}", src_tri, dst_tri);
        return;
    };
    let Ok(patch) = warp::warp_bilinear(&crop, &trafo, r2.2, r2.3, Border::Reflect101) else {
        return;
    };

    let mut tri_mask = GrayImage::new(r2.2, r2.3);
    geometry::fill_polygon(&mut tri_mask, dst_tri, (r2.0, r2.1), 255);

    for (x, y, m) in tri_mask.enumerate_pixels() {
        if m[0] == 0 {
            continue;
        }
        let (dx, dy) = (r2.0 + x as i32, r2.1 + y as i32);
        if dx < 0 || dy < 0 || dx >= dst.width() as i32 || dy >= dst.height() as i32 {
            continue;
        }
        dst.put_pixel(dx as u32, dy as u32, *patch.get_pixel(x, y));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_triangle_warp_replaces_inside_only() {
        let src = Rgb32FImage::from_pixel(20, 20, Rgb([1.0, 0.5, 0.25]));
        let mut dst = Rgb32FImage::new(20, 20);
        let tri = [Point::new(2.0, 2.0), Point::new(15.0, 2.0), Point::new(2.0, 15.0)];
        warp_triangle(&src, &mut dst, &tri, &tri);

        let inside = dst.get_pixel(4, 4);
        for (c, want) in [1.0, 0.5, 0.25].into_iter().enumerate() {
            assert!((inside[c] - want).abs() < 1e-5);
        }
        assert_eq!(*dst.get_pixel(14, 14), Rgb([0.0, 0.0, 0.0]));
        assert_eq!(*dst.get_pixel(0, 0), Rgb([0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_triangle_outside_source_is_skipped() {
        let src = Rgb32FImage::from_pixel(10, 10, Rgb([1.0, 1.0, 1.0]));
        let mut dst = Rgb32FImage::new(10, 10);
        let far = [Point::new(50.0, 50.0), Point::new(60.0, 50.0), Point::new(50.0, 60.0)];
        let near = [Point::new(1.0, 1.0), Point::new(8.0, 1.0), Point::new(1.0, 8.0)];
        warp_triangle(&src, &mut dst, &far, &near);
        assert!(dst.pixels().all(|p| p[0] == 0.0));
    }
}
