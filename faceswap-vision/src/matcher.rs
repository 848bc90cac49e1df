use image::RgbImage;

use crate::face_region::FaceRegion;
use crate::region::{BoundingBox, Region};

pub trait RegionMatcher {
    fn base(&self) -> &Region;

    fn as_face(&self) -> Option<&FaceRegion> {
        None
    }

    /// Dissimilarity of the two regions' appearance, 0 means identical.
    fn match_appearance(&self, other: &dyn RegionMatcher) -> f32;

    fn match_distance(&self, other: &dyn RegionMatcher) -> f32;

    fn iou(&self, other: &dyn RegionMatcher) -> f32 {
        intersection_over_union(&self.base().bounding_box(), &other.base().bounding_box())
    }

    fn copy_from(&mut self, other: &dyn RegionMatcher, copy_appearance: bool);

    fn calc_appearance(&mut self, image: &RgbImage);

    fn shift_region(&mut self, x: f32, y: f32, scale: f32);

    fn point_within_region(&self, x: f32, y: f32) -> bool {
        self.base().point_within_region(x, y)
    }
}

impl RegionMatcher for Region {
    fn base(&self) -> &Region {
        self
    }

    /// Plain regions carry no appearance signal.
    fn match_appearance(&self, _other: &dyn RegionMatcher) -> f32 {
        0.0
    }

    fn match_distance(&self, other: &dyn RegionMatcher) -> f32 {
        self.center_distance(other.base())
    }

    fn copy_from(&mut self, other: &dyn RegionMatcher, _copy_appearance: bool) {
        Region::copy_from(self, other.base());
    }

    fn calc_appearance(&mut self, _image: &RgbImage) {}

    fn shift_region(&mut self, x: f32, y: f32, scale: f32) {
        Region::shift_region(self, x, y, scale);
    }
}

impl RegionMatcher for FaceRegion {
    fn base(&self) -> &Region {
        FaceRegion::base(self)
    }

    fn as_face(&self) -> Option<&FaceRegion> {
        Some(self)
    }

    fn match_appearance(&self, other: &dyn RegionMatcher) -> f32 {
        FaceRegion::match_appearance(self, other.as_face(), &other.base().bounding_box())
    }

    fn match_distance(&self, other: &dyn RegionMatcher) -> f32 {
        FaceRegion::match_distance(self, other.base())
    }

    fn copy_from(&mut self, other: &dyn RegionMatcher, copy_appearance: bool) {
        FaceRegion::copy_from(self, other.base(), other.as_face(), copy_appearance);
    }

    fn calc_appearance(&mut self, image: &RgbImage) {
        FaceRegion::calc_appearance(self, image);
    }

    fn shift_region(&mut self, x: f32, y: f32, scale: f32) {
        FaceRegion::shift_region(self, x, y, scale);
    }
}

/// Length of the overlap of two intervals given by center and width.
/// Negative when they are disjoint.
pub fn overlap(c1: f32, w1: f32, c2: f32, w2: f32) -> f32 {
    let left = (c1 - w1 / 2.0).max(c2 - w2 / 2.0);
    let right = (c1 + w1 / 2.0).min(c2 + w2 / 2.0);
    right - left
}

pub fn intersection_area(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let (ca, cb) = (a.center(), b.center());
    let w = overlap(ca.x, a.width, cb.x, b.width);
    let h = overlap(ca.y, a.height, cb.y, b.height);
    w.max(0.0) * h.max(0.0)
}

/// Intersection over union in [0, 1]. A zero-area union yields 0.
pub fn intersection_over_union(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter = intersection_area(a, b);
    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Center distance in units of `from`'s width and height.
pub fn normalized_distance(from: &Region, to: &Region) -> f32 {
    let b = from.bounding_box();
    if b.width <= 0.0 || b.height <= 0.0 {
        return from.center_distance(to);
    }
    let (a, c) = (from.center(), to.center());
    let dx = (c.x - a.x) / b.width;
    let dy = (c.y - a.y) / b.height;
    (dx * dx + dy * dy).sqrt()
}

/// Pearson correlation of two equally long vectors. `None` if either has zero variance.
pub fn pearson_correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n == 0 {
        return None;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a[..n].iter().zip(&b[..n]) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = var_a.sqrt() * var_b.sqrt();
    if denom == 0.0 {
        None
    } else {
        Some(cov / denom)
    }
}

/// Index and score of the candidate with the lowest appearance dissimilarity.
pub fn best_match<'a, I>(probe: &dyn RegionMatcher, candidates: I) -> Option<(usize, f32)>
where
    I: IntoIterator<Item = &'a dyn RegionMatcher>,
{
    candidates
        .into_iter()
        .enumerate()
        .map(|(i, c)| (i, probe.match_appearance(c)))
        .fold(None, |acc, (i, s)| match acc {
            Some((_, best)) if best <= s => acc,
            _ => Some((i, s)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_iou_identical_is_one() {
        let a = BoundingBox::new(10.0, 20.0, 30.0, 40.0);
        assert!((intersection_over_union(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint_is_zero() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 0.0, 10.0, 10.0);
        assert_eq!(intersection_over_union(&a, &b), 0.0);
        // touching edges
        let c = BoundingBox::new(10.0, 0.0, 10.0, 10.0);
        assert_eq!(intersection_over_union(&a, &c), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 10.0, 10.0);
        assert!((intersection_over_union(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_different_sizes_uses_centers() {
        let outer = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        let inner = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
        assert!((intersection_over_union(&outer, &inner) - 0.04).abs() < 1e-6);
    }

    #[test]
    fn test_iou_degenerate_union_is_zero() {
        let a = BoundingBox::new(5.0, 5.0, 0.0, 0.0);
        assert_eq!(intersection_over_union(&a, &a), 0.0);
    }

    #[test]
    fn test_iou_bounded_for_random_boxes() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let mut rand_box = || {
                BoundingBox::new(
                    rng.gen_range(-50.0..50.0),
                    rng.gen_range(-50.0..50.0),
                    rng.gen_range(0.1..60.0),
                    rng.gen_range(0.1..60.0),
                )
            };
            let (a, b) = (rand_box(), rand_box());
            let iou = intersection_over_union(&a, &b);
            assert!((0.0..=1.0 + 1e-6).contains(&iou), "iou {} for {:?} {:?}", iou, a, b);
            assert!((iou - intersection_over_union(&b, &a)).abs() < 1e-5);
        }
    }

    #[test]
    fn test_normalized_distance_is_asymmetric() {
        let small = FaceRegion::from_box(0.0, 0.0, 10.0, 10.0);
        let large = FaceRegion::from_box(20.0, 0.0, 40.0, 40.0);
        let d_small = small.match_distance(large.base());
        let d_large = large.match_distance(small.base());
        // centers (5,5) and (40,20)
        let expected_small = ((35.0f32 / 10.0).powi(2) + (15.0f32 / 10.0).powi(2)).sqrt();
        let expected_large = ((35.0f32 / 40.0).powi(2) + (15.0f32 / 40.0).powi(2)).sqrt();
        assert!((d_small - expected_small).abs() < 1e-5);
        assert!((d_large - expected_large).abs() < 1e-5);
        assert!(d_small > d_large);
    }

    #[test]
    fn test_base_distance_is_euclidean() {
        let a = Region::from_box(0.0, 0.0, 2.0, 2.0, 1.0);
        let b = Region::from_box(3.0, 4.0, 2.0, 2.0, 1.0);
        assert!((RegionMatcher::match_distance(&a, &b) - 5.0).abs() < 1e-6);
        assert_eq!(RegionMatcher::match_appearance(&a, &b), 0.0);
    }

    #[test]
    fn test_trait_dispatch_downcasts_face() {
        let plain = Region::from_box(0.0, 0.0, 10.0, 10.0, 1.0);
        let mut face = FaceRegion::from_box(0.0, 0.0, 10.0, 10.0);
        face.set_features(vec![1.0, 2.0, 3.0]);
        // plain region has no features -> 1 - IoU
        let d = RegionMatcher::match_appearance(&face, &plain);
        assert!(d.abs() < 1e-6);

        let mut copy = FaceRegion::default();
        RegionMatcher::copy_from(&mut copy, &face, true);
        assert_eq!(copy.features(), Some(&[1.0, 2.0, 3.0][..]));
        let mut shallow = FaceRegion::default();
        RegionMatcher::copy_from(&mut shallow, &face, false);
        assert_eq!(shallow.features(), None);
        assert_eq!(shallow.bounding_box(), face.bounding_box());
    }

    #[test]
    fn test_pearson() {
        assert!((pearson_correlation(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).unwrap() - 1.0).abs() < 1e-12);
        assert!((pearson_correlation(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]).unwrap() + 1.0).abs() < 1e-12);
        assert_eq!(pearson_correlation(&[1.0, 1.0], &[1.0, 2.0]), None);
        assert_eq!(pearson_correlation(&[], &[]), None);
    }

    #[test]
    fn test_best_match_picks_lowest() {
        let mut probe = FaceRegion::default();
        probe.set_features(vec![1.0, 2.0, 3.0, 4.0]);
        let mut near = FaceRegion::default();
        near.set_features(vec![1.0, 2.1, 2.9, 4.2]);
        let mut far = FaceRegion::default();
        far.set_features(vec![4.0, 1.0, 3.0, 2.0]);
        let candidates: Vec<&dyn RegionMatcher> = vec![&far, &near];
        let (idx, score) = best_match(&probe, candidates).unwrap();
        assert_eq!(idx, 1);
        assert!(score < 0.05);
    }
}
