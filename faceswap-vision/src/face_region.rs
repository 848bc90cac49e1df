use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use image::{imageops, RgbImage};
use imageproc::filter::laplacian_filter;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RegionFileError;
use crate::matcher;
use crate::region::{BoundingBox, Region, REJECTED_CONFIDENCE};

/// Version written into every record; records with another version are refused.
pub const RECORD_VERSION: i32 = 100;

/// Parameter key attached by the border check.
pub const RET_CODE_KEY: &str = "RetCode";
pub const TOO_CLOSE_TO_BORDER: &str = "FaceTooCloseToBorder";

/// Laplacian variance at which sharpness reaches 0.5.
const SHARPNESS_HALF_VARIANCE: f64 = 100.0;

/// IoU above which disagreeing embeddings are treated as the same face.
const DUPLICATE_IOU: f32 = 0.70;
const DUPLICATE_CORRELATION: f64 = 0.85;
const DUPLICATE_BONUS: f64 = 0.15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceRegion {
    base: Region,
    classification_confidence: f64,
    correlation: f32,
    /// `None` means "never set", which is distinct from an empty vector.
    features: Option<Vec<f64>>,
    uuid: Option<Uuid>,
    face_id: i32,
    detection_reliable: bool,
    classification_reliable: bool,
    auto_train_candidate: i32,
    detection_index: i32,
    detection_count: i32,
    trajectory_index: i32,
    sharpness: f64,
    out_of_image: bool,
    detection_time: i64,
    #[serde(skip)]
    region_image: Option<RgbImage>,
}

impl Default for FaceRegion {
    fn default() -> Self {
        Self {
            base: Region::default(),
            classification_confidence: 0.0,
            correlation: 0.0,
            features: None,
            uuid: None,
            face_id: -1,
            detection_reliable: true,
            classification_reliable: false,
            auto_train_candidate: 0,
            detection_index: 0,
            detection_count: 0,
            trajectory_index: -1,
            sharpness: -1.0,
            out_of_image: false,
            detection_time: 0,
            region_image: None,
        }
    }
}

impl FaceRegion {
    pub fn from_box(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            base: Region::from_box(x, y, width, height, 1.0),
            ..Self::default()
        }
    }

    /// Face region seeded from a plain region (base fields only).
    pub fn from_region(region: &Region) -> Self {
        Self {
            base: region.clone(),
            ..Self::default()
        }
    }

    pub fn base(&self) -> &Region {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut Region {
        &mut self.base
    }

    /// Restores every field to its default. An attached crop is kept.
    pub fn reset(&mut self) {
        let image = self.region_image.take();
        *self = Self {
            region_image: image,
            ..Self::default()
        };
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.base.bounding_box()
    }

    /// Sets the box and moves the center to its middle.
    pub fn set_bounding_box(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.base
            .set_box_and_center(BoundingBox::new(x, y, width, height));
    }

    pub fn confidence(&self) -> f32 {
        self.base.confidence()
    }

    pub fn set_confidence(&mut self, confidence: f32) {
        self.base.set_confidence(confidence);
    }

    pub fn classification_confidence(&self) -> f64 {
        self.classification_confidence
    }

    pub fn set_classification_confidence(&mut self, value: f64) {
        self.classification_confidence = value;
    }

    pub fn correlation(&self) -> f32 {
        self.correlation
    }

    pub fn set_correlation(&mut self, value: f64) {
        self.correlation = value as f32;
    }

    pub fn features(&self) -> Option<&[f64]> {
        self.features.as_deref()
    }

    pub fn set_features(&mut self, features: Vec<f64>) {
        self.features = Some(features);
    }

    pub fn clear_features(&mut self) {
        self.features = None;
    }

    pub fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }

    pub fn set_uuid(&mut self, uuid: Uuid) {
        self.uuid = Some(uuid);
    }

    /// Gives the region a fresh random identifier and returns it.
    pub fn assign_uuid(&mut self) -> Uuid {
        let id = Uuid::new_v4();
        self.uuid = Some(id);
        id
    }

    pub fn face_id(&self) -> i32 {
        self.face_id
    }

    pub fn set_face_id(&mut self, face_id: i32) {
        self.face_id = face_id;
    }

    pub fn is_detection_reliable(&self) -> bool {
        self.detection_reliable
    }

    pub fn set_detection_reliable(&mut self, reliable: bool) {
        self.detection_reliable = reliable;
    }

    pub fn is_classification_reliable(&self) -> bool {
        self.classification_reliable
    }

    pub fn set_classification_reliable(&mut self, reliable: bool) {
        self.classification_reliable = reliable;
    }

    pub fn auto_train_candidate(&self) -> i32 {
        self.auto_train_candidate
    }

    pub fn set_auto_train_candidate(&mut self, n: i32) {
        self.auto_train_candidate = n;
    }

    /// Index of this detection among `detection_count()` detections in the frame.
    pub fn detection_index(&self) -> i32 {
        self.detection_index
    }

    pub fn set_detection_index(&mut self, index: i32) {
        self.detection_index = index;
    }

    pub fn detection_count(&self) -> i32 {
        self.detection_count
    }

    pub fn set_detection_count(&mut self, count: i32) {
        self.detection_count = count;
    }

    pub fn trajectory_index(&self) -> i32 {
        self.trajectory_index
    }

    pub fn set_trajectory_index(&mut self, index: i32) {
        self.trajectory_index = index;
    }

    /// Sharpness in [0, 1], or -1 if never measured.
    pub fn sharpness(&self) -> f64 {
        self.sharpness
    }

    pub fn set_sharpness(&mut self, sharpness: f64) {
        self.sharpness = sharpness;
    }

    pub fn is_out_of_image(&self) -> bool {
        self.out_of_image
    }

    pub fn set_out_of_image(&mut self, out: bool) {
        self.out_of_image = out;
    }

    pub fn detection_time(&self) -> i64 {
        self.detection_time
    }

    pub fn set_detection_time(&mut self, time: i64) {
        self.detection_time = time;
    }

    pub fn region_image(&self) -> Option<&RgbImage> {
        self.region_image.as_ref()
    }

    pub fn set_region_image(&mut self, image: RgbImage) {
        self.region_image = Some(image);
    }

    pub fn take_region_image(&mut self) -> Option<RgbImage> {
        self.region_image.take()
    }

    pub fn shift_region(&mut self, x: f32, y: f32, scale: f32) {
        let center = self.base.center();
        let bbox = self.base.bounding_box();
        let (cx, cy) = (center.x + x, center.y + y);
        let (w, h) = (bbox.width * scale, bbox.height * scale);
        self.base.set_bounding_box(cx - w / 2.0, cy - h / 2.0, w, h);
        self.base.set_center(cx, cy);
        self.base.reset_appearance();
    }

    /// Intersection area with another box, 0 when disjoint.
    pub fn intersection(&self, other: &BoundingBox) -> f32 {
        matcher::intersection_area(&self.bounding_box(), other)
    }

    /// Distance between centers normalised by this region's box size.
    ///
    /// The metric is asymmetric: `a.match_distance(b)` divides by `a`'s width
    /// and height. A degenerate box falls back to the plain center distance.
    pub fn match_distance(&self, other: &Region) -> f32 {
        matcher::normalized_distance(&self.base, other)
    }

    /// Dissimilarity in [0, 1]; 0 means identical.
    ///
    /// Uses the Pearson correlation of the feature vectors when both regions
    /// carry vectors of the same length, otherwise `1 - IoU`.
    pub fn match_appearance(&self, other: Option<&FaceRegion>, other_box: &BoundingBox) -> f32 {
        let iou = matcher::intersection_over_union(&self.bounding_box(), other_box);

        let pair = other
            .and_then(|o| o.features.as_deref())
            .zip(self.features.as_deref())
            .filter(|(a, b)| !a.is_empty() && a.len() == b.len());

        let Some((theirs, ours)) = pair else {
            return 1.0 - iou;
        };

        let mut corr = match matcher::pearson_correlation(ours, theirs) {
            Some(r) => (r + 1.0) / 2.0,
            None => 0.0,
        };
        if iou > DUPLICATE_IOU && corr < DUPLICATE_CORRELATION {
            corr = (corr + DUPLICATE_BONUS).min(1.0);
        }
        (1.0 - corr) as f32
    }

    /// Crops the region out of `image`, keeps the crop and measures sharpness.
    pub fn calc_appearance(&mut self, image: &RgbImage) {
        let Some((x, y, w, h)) = self.bounding_box().clip_to(image.width(), image.height()) else {
            log::debug!("region {:?} outside image, appearance skipped", self.bounding_box());
            return;
        };
        let crop = imageops::crop_imm(image, x, y, w, h).to_image();
        self.sharpness = sharpness(&crop);
        self.region_image = Some(crop);
        self.base.mark_appearance_calculated();
    }

    /// Moves the feature vector towards `other`'s by `factor` in [0, 1].
    pub fn adapt_appearance(&mut self, other: &FaceRegion, factor: f64) {
        let factor = factor.clamp(0.0, 1.0);
        if let (Some(ours), Some(theirs)) = (self.features.as_mut(), other.features.as_ref()) {
            if ours.len() == theirs.len() {
                for (a, b) in ours.iter_mut().zip(theirs) {
                    *a = (1.0 - factor) * *a + factor * b;
                }
            }
        }
    }

    /// Deep copy. Face fields are taken from `other` when it is a face region;
    /// the embedding only when `copy_appearance` is set.
    pub fn copy_from(&mut self, base: &Region, face: Option<&FaceRegion>, copy_appearance: bool) {
        self.base.copy_from(base);
        if let Some(f) = face {
            self.classification_reliable = f.classification_reliable;
            self.uuid = f.uuid;
            self.face_id = f.face_id;
            self.classification_confidence = f.classification_confidence;
            self.correlation = f.correlation;
            if copy_appearance {
                self.features = f.features.clone();
            }
        }
    }

    /// Rejects the region when its box, grown by `margin` of its size on each
    /// side, leaves the image. Returns `true` on rejection.
    ///
    /// A rejected region gets confidence -1, the `RetCode` parameter and the
    /// out-of-image flag. The margin is truncated to whole pixels.
    pub fn check_border(&mut self, img_width: u32, img_height: u32, margin: f32) -> bool {
        let b = self.bounding_box();
        let mx = (margin * b.width) as i32 as f32;
        let my = (margin * b.height) as i32 as f32;
        let max_x = img_width as f32 - 1.0;
        let max_y = img_height as f32 - 1.0;

        let outside = b.x - mx < 0.0
            || b.y - my < 0.0
            || b.x + b.width - 1.0 + mx > max_x
            || b.y + b.height - 1.0 + my > max_y;

        if outside {
            self.set_confidence(REJECTED_CONFIDENCE);
            self.base.add_parameter(RET_CODE_KEY, TOO_CLOSE_TO_BORDER);
            self.out_of_image = true;
        }
        outside
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RegionFileError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Writes one record, one value per line: version, confidence, cluster
    /// index, out-of-border flag, sharpness, x, y, width, height, feature
    /// count, then the features.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), RegionFileError> {
        let b = self.bounding_box();
        writeln!(w, "{}", RECORD_VERSION)?;
        writeln!(w, "{}", self.confidence())?;
        writeln!(w, "{}", self.base.cluster_index())?;
        writeln!(w, "{}", self.out_of_image as u8)?;
        writeln!(w, "{}", self.sharpness)?;
        writeln!(w, "{}\n{}\n{}\n{}", b.x, b.y, b.width, b.height)?;

        let features = self.features.as_deref().unwrap_or(&[]);
        writeln!(w, "{}", features.len())?;
        for v in features {
            writeln!(w, "{}", v)?;
        }
        Ok(())
    }

    /// Resets the region, then loads it from `path`. On failure the region
    /// stays in its reset state.
    ///
    /// The record only stores the feature count, so a set but empty feature
    /// vector does not round-trip: it loads back as unset.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), RegionFileError> {
        self.reset();
        let mut reader = BufReader::new(File::open(path)?);
        self.read_from(&mut reader)
    }

    /// Reads one record. The region is reset first and only populated once the
    /// whole record parsed. A stored feature count of 0 loads as "unset".
    pub fn read_from<R: BufRead>(&mut self, r: &mut R) -> Result<(), RegionFileError> {
        self.reset();

        let version: i32 = next_value(r, "version")?;
        if version != RECORD_VERSION {
            return Err(RegionFileError::VersionMismatch {
                found: version,
                expected: RECORD_VERSION,
            });
        }

        let confidence: f32 = next_value(r, "confidence")?;
        let cluster_index: i32 = next_value(r, "cluster index")?;
        let out_of_image = next_flag(r, "out-of-border flag")?;
        let sharpness: f64 = next_value(r, "sharpness")?;
        let x: f32 = next_value(r, "x")?;
        let y: f32 = next_value(r, "y")?;
        let width: f32 = next_value(r, "width")?;
        let height: f32 = next_value(r, "height")?;

        let count: usize = next_value(r, "feature count")?;
        // the count is untrusted, grow as values arrive
        let mut features = Vec::new();
        for _ in 0..count {
            features.push(next_value::<f64, _>(r, "feature")?);
        }

        self.set_confidence(confidence);
        self.base.set_cluster_index(cluster_index);
        self.out_of_image = out_of_image;
        self.sharpness = sharpness;
        self.set_bounding_box(x, y, width, height);
        self.features = (!features.is_empty()).then_some(features);
        Ok(())
    }
}

impl AsRef<Region> for FaceRegion {
    fn as_ref(&self) -> &Region {
        &self.base
    }
}

fn next_token<R: BufRead>(r: &mut R, field: &'static str) -> Result<String, RegionFileError> {
    let mut line = String::new();
    loop {
        line.clear();
        if r.read_line(&mut line)? == 0 {
            return Err(RegionFileError::UnexpectedEof { field });
        }
        let token = line.trim();
        if !token.is_empty() {
            return Ok(token.to_string());
        }
    }
}

fn next_value<T: FromStr, R: BufRead>(r: &mut R, field: &'static str) -> Result<T, RegionFileError> {
    let token = next_token(r, field)?;
    token
        .parse()
        .map_err(|_| RegionFileError::Parse { field, value: token })
}

fn next_flag<R: BufRead>(r: &mut R, field: &'static str) -> Result<bool, RegionFileError> {
    let token = next_token(r, field)?;
    match token.as_str() {
        "0" | "false" => Ok(false),
        "1" | "true" => Ok(true),
        _ => Err(RegionFileError::Parse { field, value: token }),
    }
}

/// Variance of the Laplacian, squashed into [0, 1).
fn sharpness(crop: &RgbImage) -> f64 {
    let gray = imageops::grayscale(crop);
    let lap = laplacian_filter(&gray);
    let n = lap.len() as f64;
    if n == 0.0 {
        return -1.0;
    }
    let mean = lap.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
    let var = lap
        .pixels()
        .map(|p| (p[0] as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    var / (var + SHARPNESS_HALF_VARIANCE)
}
