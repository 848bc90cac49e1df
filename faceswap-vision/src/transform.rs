use crate::region::Point;

/// 2x3 affine map `[a b tx; c d ty]`: `x' = a*x + b*y + tx`, `y' = c*x + d*y + ty`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub m: [[f64; 3]; 2],
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
    };

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            m: [[1.0, 0.0, tx], [0.0, 1.0, ty]],
        }
    }

    /// The unique affine map sending triangle `src` onto triangle `dst`.
    /// `None` if `src` is degenerate (collinear points).
    pub fn from_triangles(src: &[Point; 3], dst: &[Point; 3]) -> Option<Self> {
        let [p0, p1, p2] = src.map(|p| (p.x as f64, p.y as f64));
        // | x0 y0 1 |
        // | x1 y1 1 |  * [a b tx]^T = [x0' x1' x2']^T, same for the second row
        // | x2 y2 1 |
        let det = p0.0 * (p1.1 - p2.1) - p0.1 * (p1.0 - p2.0) + (p1.0 * p2.1 - p2.0 * p1.1);
        if det.abs() < 1e-9 {
            return None;
        }

        let inv = [
            [
                (p1.1 - p2.1) / det,
                (p2.1 - p0.1) / det,
                (p0.1 - p1.1) / det,
            ],
            [
                (p2.0 - p1.0) / det,
                (p0.0 - p2.0) / det,
                (p1.0 - p0.0) / det,
            ],
            [
                (p1.0 * p2.1 - p2.0 * p1.1) / det,
                (p2.0 * p0.1 - p0.0 * p2.1) / det,
                (p0.0 * p1.1 - p1.0 * p0.1) / det,
            ],
        ];

        let solve = |v: [f64; 3]| -> [f64; 3] {
            let mut out = [0.0; 3];
            for (row, o) in inv.iter().zip(out.iter_mut()) {
                *o = row[0] * v[0] + row[1] * v[1] + row[2] * v[2];
            }
            out
        };

        let xs = dst.map(|p| p.x as f64);
        let ys = dst.map(|p| p.y as f64);
        Some(Self {
            m: [solve(xs), solve(ys)],
        })
    }

    pub fn apply(&self, p: Point) -> Point {
        let (x, y) = self.apply_f64(p.x as f64, p.y as f64);
        Point::new(x as f32, y as f32)
    }

    pub fn apply_f64(&self, x: f64, y: f64) -> (f64, f64) {
        let [[a, b, tx], [c, d, ty]] = self.m;
        (a * x + b * y + tx, c * x + d * y + ty)
    }

    pub fn determinant(&self) -> f64 {
        self.m[0][0] * self.m[1][1] - self.m[0][1] * self.m[1][0]
    }

    /// Inverse map, `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if det.abs() < 1e-12 {
            return None;
        }
        let [[a, b, tx], [c, d, ty]] = self.m;
        let (ia, ib, ic, id) = (d / det, -b / det, -c / det, a / det);
        Some(Self {
            m: [
                [ia, ib, -(ia * tx + ib * ty)],
                [ic, id, -(ic * tx + id * ty)],
            ],
        })
    }

    /// `self` applied after `first`.
    pub fn then(&self, first: &Affine) -> Affine {
        let [[a, b, tx], [c, d, ty]] = self.m;
        let [[e, f, ux], [g, h, uy]] = first.m;
        Affine {
            m: [
                [a * e + b * g, a * f + b * h, a * ux + b * uy + tx],
                [c * e + d * g, c * f + d * h, c * ux + d * uy + ty],
            ],
        }
    }
}
