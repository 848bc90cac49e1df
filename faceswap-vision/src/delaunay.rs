use crate::region::Point;

#[derive(Debug, Clone, Copy)]
struct Circle {
    cx: f64,
    cy: f64,
    r2: f64,
}

#[derive(Debug, Clone, Copy)]
struct Triangle {
    v: [usize; 3],
    circle: Circle,
}

fn circumcircle(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Option<Circle> {
    let d = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));
    if d.abs() < 1e-12 {
        return None;
    }
    let (a2, b2, c2) = (
        a.0 * a.0 + a.1 * a.1,
        b.0 * b.0 + b.1 * b.1,
        c.0 * c.0 + c.1 * c.1,
    );
    let cx = (a2 * (b.1 - c.1) + b2 * (c.1 - a.1) + c2 * (a.1 - b.1)) / d;
    let cy = (a2 * (c.0 - b.0) + b2 * (a.0 - c.0) + c2 * (b.0 - a.0)) / d;
    let r2 = (a.0 - cx).powi(2) + (a.1 - cy).powi(2);
    Some(Circle { cx, cy, r2 })
}

fn make_triangle(vertices: &[(f64, f64)], v: [usize; 3]) -> Option<Triangle> {
    let circle = circumcircle(vertices[v[0]], vertices[v[1]], vertices[v[2]])?;
    Some(Triangle { v, circle })
}

/// Delaunay triangles of `points`.
///
/// Duplicate points are triangulated once, under their first index. Fewer
/// than three distinct, non-collinear points give no triangles.
pub fn triangulate(points: &[Point]) -> Vec<[usize; 3]> {
    let n = points.len();
    if n < 3 {
        return vec![];
    }

    let mut vertices: Vec<(f64, f64)> = points.iter().map(|p| (p.x as f64, p.y as f64)).collect();

    let (mut min_x, mut min_y) = (f64::MAX, f64::MAX);
    let (mut max_x, mut max_y) = (f64::MIN, f64::MIN);
    for &(x, y) in &vertices {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    let span = (max_x - min_x).max(max_y - min_y).max(1.0);
    let (mid_x, mid_y) = ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);

    // enclosing triangle, removed again at the end
    vertices.push((mid_x - 50.0 * span, mid_y - 50.0 * span));
    vertices.push((mid_x, mid_y + 50.0 * span));
    vertices.push((mid_x + 50.0 * span, mid_y - 50.0 * span));

    let Some(root) = make_triangle(&vertices, [n, n + 1, n + 2]) else {
        return vec![];
    };
    let mut triangles = vec![root];

    for i in 0..n {
        let (px, py) = vertices[i];
        if vertices[..i].iter().any(|&q| q == (px, py)) {
            continue;
        }

        let mut edges: Vec<(usize, usize)> = Vec::new();
        triangles.retain(|t| {
            let inside = (px - t.circle.cx).powi(2) + (py - t.circle.cy).powi(2) < t.circle.r2;
            if inside {
                let [a, b, c] = t.v;
                edges.extend([(a, b), (b, c), (c, a)]);
            }
            !inside
        });

        // the cavity boundary is made of the edges used by exactly one removed triangle
        let boundary: Vec<(usize, usize)> = edges
            .iter()
            .filter(|&&(a, b)| {
                edges
                    .iter()
                    .filter(|&&(c, d)| (a == c && b == d) || (a == d && b == c))
                    .count()
                    == 1
            })
            .copied()
            .collect();

        for (a, b) in boundary {
            if let Some(t) = make_triangle(&vertices, [a, b, i]) {
                triangles.push(t);
            }
        }
    }

    triangles
        .into_iter()
        .filter(|t| t.v.iter().all(|&v| v < n))
        .map(|t| t.v)
        .collect()
}

/// Keeps the triangles whose vertices all lie inside the rectangle
/// `(x, y, width, height)`.
pub fn within_rect(triangles: Vec<[usize; 3]>, points: &[Point], rect: (f32, f32, f32, f32)) -> Vec<[usize; 3]> {
    let (x, y, w, h) = rect;
    let inside = |p: &Point| p.x >= x && p.y >= y && p.x < x + w && p.y < y + h;
    triangles
        .into_iter()
        .filter(|t| t.iter().all(|&i| inside(&points[i])))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn area(points: &[Point], t: &[usize; 3]) -> f32 {
        let [a, b, c] = t.map(|i| points[i]);
        ((b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)).abs() / 2.0
    }

    #[test]
    fn test_square_with_center() {
        let pts = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
            Point::new(5.0, 5.0),
        ];
        let tris = triangulate(&pts);
        assert_eq!(tris.len(), 4);
        assert!(tris.iter().all(|t| t.contains(&4)));
        let total: f32 = tris.iter().map(|t| area(&pts, t)).sum();
        assert!((total - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_convex_polygon_gives_n_minus_two() {
        let pts: Vec<Point> = (0..9)
            .map(|i| {
                let a = i as f32 * std::f32::consts::TAU / 9.0;
                Point::new(50.0 + 40.0 * a.cos(), 50.0 + 30.0 * a.sin())
            })
            .collect();
        assert_eq!(triangulate(&pts).len(), 7);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(triangulate(&[Point::new(0.0, 0.0), Point::new(1.0, 1.0)]).is_empty());
        let line: Vec<Point> = (0..4).map(|i| Point::new(i as f32, 0.0)).collect();
        assert!(triangulate(&line).is_empty());
        let dup = vec![
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(0.0, 4.0),
            Point::new(4.0, 0.0),
        ];
        let tris = triangulate(&dup);
        assert_eq!(tris.len(), 1);
        assert!(!tris[0].contains(&3));
    }

    #[test]
    fn test_random_points_have_empty_circumcircles() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            let pts: Vec<Point> = (0..30)
                .map(|_| Point::new(rng.gen_range(0.0..200.0), rng.gen_range(0.0..200.0)))
                .collect();
            let tris = triangulate(&pts);
            assert!(!tris.is_empty());
            for t in &tris {
                let [a, b, c] = t.map(|i| (pts[i].x as f64, pts[i].y as f64));
                let circle = circumcircle(a, b, c).unwrap();
                for (j, p) in pts.iter().enumerate() {
                    if t.contains(&j) {
                        continue;
                    }
                    let d2 = (p.x as f64 - circle.cx).powi(2) + (p.y as f64 - circle.cy).powi(2);
                    assert!(d2 >= circle.r2 * (1.0 - 1e-6), "point {} inside circumcircle of {:?}", j, t);
                }
            }
        }
    }

    #[test]
    fn test_rect_filter() {
        let pts = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
            Point::new(30.0, 30.0),
        ];
        let kept = within_rect(triangulate(&pts), &pts, (0.0, 0.0, 20.0, 20.0));
        assert_eq!(kept.len(), 1);
        let mut t = kept[0];
        t.sort();
        assert_eq!(t, [0, 1, 2]);
    }
}
