use image::{ImageBuffer, Pixel, Rgb, Rgb32FImage};

use crate::error::SwapError;
use crate::transform::Affine;

/// Pixel handling for source coordinates that fall outside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Border {
    /// Use a fixed fill value.
    Constant,
    /// Mirror without repeating the edge pixel (`gfedcb|abcdefgh|gfedcba`).
    Reflect101,
}

/// Warps `src` into a `width x height` canvas with nearest-neighbour sampling.
/// `forward` maps source coordinates to output coordinates; pixels that map
/// outside the source get `fill`.
pub fn warp_nearest<P: Pixel>(
    src: &ImageBuffer<P, Vec<P::Subpixel>>,
    forward: &Affine,
    width: u32,
    height: u32,
    fill: P,
) -> Result<ImageBuffer<P, Vec<P::Subpixel>>, SwapError> {
    let inv = forward.inverse().ok_or(SwapError::DegenerateTransform)?;
    let (sw, sh) = (src.width() as i64, src.height() as i64);

    let mut out = ImageBuffer::from_pixel(width, height, fill);
    for (x, y, px) in out.enumerate_pixels_mut() {
        let (sx, sy) = inv.apply_f64(x as f64, y as f64);
        let (ix, iy) = (sx.round() as i64, sy.round() as i64);
        if ix >= 0 && ix < sw && iy >= 0 && iy < sh {
            *px = *src.get_pixel(ix as u32, iy as u32);
        }
    }
    Ok(out)
}

fn reflect101(i: i64, n: i64) -> i64 {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    i
}

/// Bilinear warp of a float image; see [`warp_nearest`] for the conventions.
pub fn warp_bilinear(
    src: &Rgb32FImage,
    forward: &Affine,
    width: u32,
    height: u32,
    border: Border,
) -> Result<Rgb32FImage, SwapError> {
    let inv = forward.inverse().ok_or(SwapError::DegenerateTransform)?;
    let (sw, sh) = (src.width() as i64, src.height() as i64);
    let mut out = Rgb32FImage::new(width, height);
    if sw == 0 || sh == 0 {
        return Ok(out);
    }

    let sample = |x: i64, y: i64| -> Option<Rgb<f32>> {
        match border {
            Border::Constant if x < 0 || x >= sw || y < 0 || y >= sh => None,
            Border::Constant => Some(*src.get_pixel(x as u32, y as u32)),
            Border::Reflect101 => {
                Some(*src.get_pixel(reflect101(x, sw) as u32, reflect101(y, sh) as u32))
            }
        }
    };

    for (x, y, px) in out.enumerate_pixels_mut() {
        let (sx, sy) = inv.apply_f64(x as f64, y as f64);
        let (x0, y0) = (sx.floor() as i64, sy.floor() as i64);
        let (fx, fy) = ((sx - x0 as f64) as f32, (sy - y0 as f64) as f32);

        let taps = [
            (x0, y0, (1.0 - fx) * (1.0 - fy)),
            (x0 + 1, y0, fx * (1.0 - fy)),
            (x0, y0 + 1, (1.0 - fx) * fy),
            (x0 + 1, y0 + 1, fx * fy),
        ];
        let mut acc = [0.0f32; 3];
        for (tx, ty, w) in taps {
            if let Some(p) = sample(tx, ty) {
                for c in 0..3 {
                    acc[c] += p[c] * w;
                }
            }
        }
        *px = Rgb(acc);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_translation_nearest() {
        let mut src = GrayImage::new(4, 4);
        src.put_pixel(1, 1, Luma([200]));
        let out = warp_nearest(&src, &Affine::translation(2.0, 1.0), 6, 6, Luma([0])).unwrap();
        assert_eq!(out.get_pixel(3, 2)[0], 200);
        assert_eq!(out.get_pixel(1, 1)[0], 0);
        // outside the source gets the fill value
        assert_eq!(out.get_pixel(5, 5)[0], 0);
    }

    #[test]
    fn test_singular_transform_is_rejected() {
        let src = GrayImage::new(2, 2);
        let flat = Affine {
            m: [[1.0, 1.0, 0.0], [1.0, 1.0, 0.0]],
        };
        assert!(matches!(
            warp_nearest(&src, &flat, 2, 2, Luma([0])),
            Err(SwapError::DegenerateTransform)
        ));
    }

    #[test]
    fn test_reflect101() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(-2, 5), 2);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(6, 5), 2);
        assert_eq!(reflect101(2, 5), 2);
        assert_eq!(reflect101(7, 1), 0);
    }

    #[test]
    fn test_bilinear_half_pixel_shift() {
        let src = Rgb32FImage::from_fn(4, 1, |x, _| Rgb([x as f32 * 10.0, 0.0, 0.0]));
        let out = warp_bilinear(&src, &Affine::translation(-0.5, 0.0), 3, 1, Border::Reflect101).unwrap();
        assert!((out.get_pixel(0, 0)[0] - 5.0).abs() < 1e-4);
        assert!((out.get_pixel(2, 0)[0] - 25.0).abs() < 1e-4);
    }
}
