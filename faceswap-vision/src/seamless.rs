use image::{GrayImage, Rgb32FImage, RgbImage};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::geometry;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeamlessParams {
    /// Upper bound on solver sweeps.
    pub iterations: u32,
    /// Stop once no pixel changes by more than this in a sweep.
    pub tolerance: f32,
}

impl Default for SeamlessParams {
    fn default() -> Self {
        Self {
            iterations: 1000,
            tolerance: 0.05,
        }
    }
}

/// Pastes the masked part of `guide` into `destination` so that the masked
/// box of `guide` is centred at `center`.
///
/// Only masked pixels with all four neighbours inside `destination` are
/// changed. Returns the number of solver sweeps used.
pub fn seamless_clone(
    guide: &Rgb32FImage,
    destination: &mut RgbImage,
    mask: &GrayImage,
    center: (i32, i32),
    params: &SeamlessParams,
) -> u32 {
    let (Some((mx, my, mw, mh)), Some(anchor)) = (geometry::mask_bounds(mask), geometry::mask_center(mask)) else {
        return 0;
    };
    let (dw, dh) = (destination.width() as i32, destination.height() as i32);

    // destination position = guide position + shift
    let shift_x = center.0 - anchor.0;
    let shift_y = center.1 - anchor.1;

    // working window in destination space, one pixel of Dirichlet border around the mask box
    let x0 = (mx as i32 + shift_x - 1).max(0);
    let y0 = (my as i32 + shift_y - 1).max(0);
    let x1 = (mx as i32 + mw as i32 + shift_x + 1).min(dw);
    let y1 = (my as i32 + mh as i32 + shift_y + 1).min(dh);
    if x1 - x0 < 3 || y1 - y0 < 3 {
        return 0;
    }
    let (ww, wh) = ((x1 - x0) as usize, (y1 - y0) as usize);

    let guide_at = |dx: i32, dy: i32| -> Option<[f32; 3]> {
        let (gx, gy) = (dx - shift_x, dy - shift_y);
        if gx < 0 || gy < 0 || gx >= guide.width() as i32 || gy >= guide.height() as i32 {
            return None;
        }
        Some(guide.get_pixel(gx as u32, gy as u32).0)
    };
    let masked = |dx: i32, dy: i32| -> bool {
        let (gx, gy) = (dx - shift_x, dy - shift_y);
        gx >= 0
            && gy >= 0
            && gx < mask.width() as i32
            && gy < mask.height() as i32
            && mask.get_pixel(gx as u32, gy as u32)[0] != 0
    };

    let mut unknown = Array2::<bool>::from_elem((wh, ww), false);
    for r in 1..wh - 1 {
        for c in 1..ww - 1 {
            let (dx, dy) = (x0 + c as i32, y0 + r as i32);
            // never move the outermost destination pixels
            if dx == 0 || dy == 0 || dx == dw - 1 || dy == dh - 1 {
                continue;
            }
            unknown[[r, c]] = masked(dx, dy);
        }
    }

    let n = ww.max(wh) as f32;
    let omega = 2.0 / (1.0 + (std::f32::consts::PI / n).sin());

    let mut sweeps_used = 0;
    for channel in 0..3 {
        let mut field = Array2::<f32>::zeros((wh, ww));
        let mut rhs = Array2::<f32>::zeros((wh, ww));

        for r in 0..wh {
            for c in 0..ww {
                let (dx, dy) = (x0 + c as i32, y0 + r as i32);
                let dst = destination.get_pixel(dx as u32, dy as u32)[channel] as f32;
                if !unknown[[r, c]] {
                    field[[r, c]] = dst;
                    continue;
                }
                let Some(g) = guide_at(dx, dy) else {
                    field[[r, c]] = dst;
                    continue;
                };
                let g = g[channel];
                field[[r, c]] = g;
                let mut lap = 0.0;
                for (nx, ny) in [(dx - 1, dy), (dx + 1, dy), (dx, dy - 1), (dx, dy + 1)] {
                    lap += match guide_at(nx, ny) {
                        Some(q) => g - q[channel],
                        None => 0.0,
                    };
                }
                rhs[[r, c]] = lap;
            }
        }

        let mut sweeps = 0;
        while sweeps < params.iterations {
            sweeps += 1;
            let mut max_delta = 0.0f32;
            for r in 1..wh - 1 {
                for c in 1..ww - 1 {
                    if !unknown[[r, c]] {
                        continue;
                    }
                    let neighbours = field[[r - 1, c]] + field[[r + 1, c]] + field[[r, c - 1]] + field[[r, c + 1]];
                    let target = (neighbours + rhs[[r, c]]) / 4.0;
                    let old = field[[r, c]];
                    let new = old + omega * (target - old);
                    field[[r, c]] = new;
                    max_delta = max_delta.max((new - old).abs());
                }
            }
            if max_delta <= params.tolerance {
                break;
            }
        }
        sweeps_used = sweeps_used.max(sweeps);
        log::debug!("seamless clone channel {} converged after {} sweeps", channel, sweeps);

        for r in 0..wh {
            for c in 0..ww {
                if unknown[[r, c]] {
                    let px = destination.get_pixel_mut((x0 + c as i32) as u32, (y0 + r as i32) as u32);
                    px[channel] = field[[r, c]].round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
    sweeps_used
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Point;
    use image::{Luma, Rgb};

    fn square_mask(size: u32, from: u32, to: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if (from..to).contains(&x) && (from..to).contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    #[test]
    fn test_constant_guide_takes_destination_level() {
        // a flat guide has no gradients: the patch relaxes to the surrounding value
        let guide = Rgb32FImage::from_pixel(40, 40, Rgb([250.0, 0.0, 90.0]));
        let mut dst = RgbImage::from_pixel(40, 40, Rgb([60, 120, 180]));
        let mask = square_mask(40, 10, 30);
        let params = SeamlessParams {
            iterations: 2000,
            tolerance: 0.01,
        };
        seamless_clone(&guide, &mut dst, &mask, (20, 20), &params);
        for p in dst.pixels() {
            for c in 0..3 {
                assert!((p[c] as i32 - [60, 120, 180][c]).abs() <= 1, "{:?}", p);
            }
        }
    }

    #[test]
    fn test_outside_mask_untouched_and_detail_kept() {
        // bright block in the middle of an otherwise black guide
        let guide = Rgb32FImage::from_fn(40, 40, |x, y| {
            if (17..23).contains(&x) && (17..23).contains(&y) {
                Rgb([120.0, 0.0, 0.0])
            } else {
                Rgb([0.0, 0.0, 0.0])
            }
        });
        let mut dst = RgbImage::from_pixel(40, 40, Rgb([100, 100, 100]));
        let before = dst.clone();
        let mask = square_mask(40, 12, 28);
        let params = SeamlessParams {
            iterations: 3000,
            tolerance: 0.01,
        };
        seamless_clone(&guide, &mut dst, &mask, (20, 20), &params);

        for (x, y, p) in dst.enumerate_pixels() {
            if mask.get_pixel(x, y)[0] == 0 {
                assert_eq!(p, before.get_pixel(x, y));
            }
        }
        // the block keeps its contrast on top of the destination level
        let center = dst.get_pixel(20, 20)[0] as i32;
        let rim = dst.get_pixel(13, 20)[0] as i32;
        assert!((center - 220).abs() <= 3, "center {}", center);
        assert!((rim - 100).abs() <= 3, "rim {}", rim);
    }

    #[test]
    fn test_fractional_polygon_clones_in_place() {
        let guide = Rgb32FImage::from_pixel(40, 40, Rgb([200.0, 200.0, 200.0]));
        let mut dst = RgbImage::from_pixel(40, 40, Rgb([50, 50, 50]));
        let before = dst.clone();
        let square = [
            Point::new(12.6, 12.6),
            Point::new(27.6, 12.6),
            Point::new(27.6, 27.6),
            Point::new(12.6, 27.6),
        ];
        let mut mask = GrayImage::new(40, 40);
        geometry::fill_polygon(&mut mask, &square, (0, 0), 255);
        let center = geometry::mask_center(&mask).unwrap();
        seamless_clone(&guide, &mut dst, &mask, center, &SeamlessParams::default());

        for (x, y, p) in dst.enumerate_pixels() {
            if mask.get_pixel(x, y)[0] == 0 {
                assert_eq!(p, before.get_pixel(x, y), "({}, {}) changed", x, y);
            }
        }
    }

    #[test]
    fn test_empty_mask_is_noop() {
        let guide = Rgb32FImage::new(8, 8);
        let mut dst = RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]));
        let sweeps = seamless_clone(&guide, &mut dst, &GrayImage::new(8, 8), (4, 4), &SeamlessParams::default());
        assert_eq!(sweeps, 0);
        assert_eq!(*dst.get_pixel(4, 4), Rgb([1, 2, 3]));
    }
}
