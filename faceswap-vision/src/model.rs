use std::path::Path;

use anyhow::{Context, Result};
use image::{imageops, RgbImage};
use ndarray::Array4;
#[cfg(any(feature = "openvino", feature = "cuda"))]
use ort::ep::{self, ExecutionProvider};
use ort::{
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
    value::Value,
};

use crate::landmarks::{LandmarkExtractor, FACE_68};
use crate::region::{BoundingBox, Point};

pub fn session_builder() -> Result<SessionBuilder> {
    let mut builder =
        Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

    #[cfg(feature = "openvino")]
    {
        let ep = ep::OpenVINO::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("openvino feature is enabled, onnx runtime not compiled with openvino")
        }
    }

    #[cfg(feature = "cuda")]
    {
        let ep = ep::CUDA::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("cuda feature is enabled, onnx runtime not compiled with cuda")
        }
    }

    Ok(builder)
}

/// Input geometry of a landmark regression model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkModelSpec {
    /// Side of the square input tensor.
    pub input_size: u32,
    /// Number of (x, y) pairs the model emits.
    pub points: usize,
    /// Fraction of the box size added on each side before cropping.
    pub margin: f32,
}

impl Default for LandmarkModelSpec {
    fn default() -> Self {
        Self {
            input_size: 112,
            points: FACE_68,
            margin: 0.1,
        }
    }
}

/// Landmark extractor backed by an ONNX regression model.
///
/// The model takes a `[1, 3, S, S]` RGB tensor in `[0, 1]` and returns
/// `2 * points` coordinates normalised to the input crop.
pub struct OnnxLandmarker {
    session: Session,
    spec: LandmarkModelSpec,
}

impl OnnxLandmarker {
    pub fn from_file(path: impl AsRef<Path>, spec: LandmarkModelSpec) -> Result<Self> {
        let path = path.as_ref();
        let session = session_builder()?
            .commit_from_file(path)
            .with_context(|| format!("load landmark model {}", path.display()))?;
        log::info!("loaded landmark model {}", path.display());
        Ok(Self { session, spec })
    }

    pub fn from_memory(model: &[u8], spec: LandmarkModelSpec) -> Result<Self> {
        let session = session_builder()?
            .commit_from_memory(model)
            .context("load landmark model")?;
        Ok(Self { session, spec })
    }

    pub fn spec(&self) -> &LandmarkModelSpec {
        &self.spec
    }
}

/// The box grown by `margin` of its size on every side.
pub fn expand_box(bbox: &BoundingBox, margin: f32) -> BoundingBox {
    let (mx, my) = (bbox.width * margin, bbox.height * margin);
    BoundingBox::new(bbox.x - mx, bbox.y - my, bbox.width + 2.0 * mx, bbox.height + 2.0 * my)
}

/// NCHW float tensor of `image` resized to `size x size`, scaled to [0, 1].
pub fn to_input_tensor(image: &RgbImage, size: u32) -> Array4<f32> {
    let resized = imageops::resize(image, size, size, imageops::FilterType::Triangle);
    let mut input = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, p) in resized.enumerate_pixels() {
        for c in 0..3 {
            input[[0, c, y as usize, x as usize]] = p[c] as f32 / 255.0;
        }
    }
    input
}

/// Maps normalised `(x, y)` pairs back into the crop rectangle.
pub fn decode_points(raw: &[f32], points: usize, crop: (u32, u32, u32, u32)) -> Result<Vec<Point>> {
    if raw.len() < 2 * points {
        anyhow::bail!(
            "landmark model returned {} values, expected {}",
            raw.len(),
            2 * points
        );
    }
    let (x, y, w, h) = crop;
    Ok(raw[..2 * points]
        .chunks_exact(2)
        .map(|xy| Point::new(x as f32 + xy[0] * w as f32, y as f32 + xy[1] * h as f32))
        .collect())
}

impl LandmarkExtractor for OnnxLandmarker {
    fn extract(&mut self, image: &RgbImage, bbox: &BoundingBox) -> Result<Vec<Point>> {
        let expanded = expand_box(bbox, self.spec.margin);
        let Some(crop_rect) = expanded.clip_to(image.width(), image.height()) else {
            return Ok(vec![]);
        };
        let (x, y, w, h) = crop_rect;
        if w == 0 || h == 0 {
            return Ok(vec![]);
        }

        let crop = imageops::crop_imm(image, x, y, w, h).to_image();
        let input_tensor = Value::from_array(to_input_tensor(&crop, self.spec.input_size))?;
        let outputs = self.session.run(ort::inputs![input_tensor])?;

        let (_name, output) = outputs
            .iter()
            .next()
            .context("landmark model produced no output")?;
        let (_shape, data) = output.try_extract_tensor::<f32>()?;
        decode_points(data, self.spec.points, crop_rect)
    }
}
