use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point as PixelPoint;

use crate::region::Point;

/// Integer rectangle `(x, y, width, height)` covering every point, with the
/// maximum coordinates included.
pub fn bounding_rect(points: &[Point]) -> Option<(i32, i32, u32, u32)> {
    let first = points.first()?;
    let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
    for p in points {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    let (x0, y0) = (x0.floor() as i32, y0.floor() as i32);
    let (x1, y1) = (x1.floor() as i32, y1.floor() as i32);
    Some((x0, y0, (x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32))
}

fn cross(o: Point, a: Point, b: Point) -> f32 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Indices of the convex hull vertices in traversal order (monotone chain).
/// Collinear boundary points and duplicates are dropped.
pub fn convex_hull_indices(points: &[Point]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..points.len())
        .filter(|&i| points[i].x.is_finite() && points[i].y.is_finite())
        .collect();
    order.sort_by(|&a, &b| {
        points[a]
            .x
            .total_cmp(&points[b].x)
            .then(points[a].y.total_cmp(&points[b].y))
    });
    order.dedup_by(|a, b| points[*a] == points[*b]);

    if order.len() < 3 {
        return order;
    }

    let mut hull: Vec<usize> = Vec::with_capacity(2 * order.len());
    for pass in [false, true] {
        let start = hull.len();
        let iter: Box<dyn Iterator<Item = &usize>> = if pass {
            Box::new(order.iter().rev())
        } else {
            Box::new(order.iter())
        };
        for &i in iter {
            while hull.len() >= start + 2
                && cross(points[hull[hull.len() - 2]], points[hull[hull.len() - 1]], points[i]) <= 0.0
            {
                hull.pop();
            }
            hull.push(i);
        }
        // last point of each chain is the first of the other
        hull.pop();
    }

    if hull.len() < 3 {
        // all points collinear
        hull.truncate(2);
    }
    hull
}

/// Fills `polygon` into `mask` with `value`, offset by `(-origin.0, -origin.1)`.
/// Polygons with fewer than three distinct pixel vertices are skipped.
pub fn fill_polygon(mask: &mut GrayImage, polygon: &[Point], origin: (i32, i32), value: u8) {
    let mut pixels: Vec<PixelPoint<i32>> = polygon
        .iter()
        .map(|p| PixelPoint::new(p.x.round() as i32 - origin.0, p.y.round() as i32 - origin.1))
        .collect();
    pixels.dedup();
    while pixels.len() > 1 && pixels.first() == pixels.last() {
        pixels.pop();
    }
    if pixels.len() < 3 {
        log::debug!("polygon collapses to {} pixels, not filled", pixels.len());
        return;
    }
    draw_polygon_mut(mask, &pixels, Luma([value]));
}

/// Fills the convex hull of `points` into a fresh `width x height` mask.
pub fn convex_mask(points: &[Point], width: u32, height: u32) -> GrayImage {
    let hull: Vec<Point> = convex_hull_indices(points)
        .into_iter()
        .map(|i| points[i])
        .collect();
    let mut mask = GrayImage::new(width, height);
    fill_polygon(&mut mask, &hull, (0, 0), 255);
    mask
}

/// Shrinks the mask by half the feather size, then softens it with a box blur
/// of the same radius.
pub fn feather_mask(mask: &GrayImage, feather: u32) -> GrayImage {
    let radius = feather / 2;
    if radius == 0 {
        return mask.clone();
    }
    let eroded = imageproc::morphology::erode(mask, Norm::LInf, radius.min(u8::MAX as u32) as u8);
    imageproc::filter::box_filter(&eroded, radius, radius)
}

/// Axis-aligned box of the non-zero mask pixels as `(x, y, width, height)`.
pub fn mask_bounds(mask: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, p) in mask.enumerate_pixels() {
        if p[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bounds.map(|(x0, y0, x1, y1)| (x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

/// Centre of [`mask_bounds`], the anchor seamless cloning places a mask at.
pub fn mask_center(mask: &GrayImage) -> Option<(i32, i32)> {
    let (x, y, w, h) = mask_bounds(mask)?;
    Some((x as i32 + w as i32 / 2, y as i32 + h as i32 / 2))
}
