use std::fmt;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::affine::AffineCompositor;
use crate::alignment::DEFAULT_FEATHER_DIVISOR;
use crate::error::SwapError;
use crate::landmarks::LandmarkExtractor;
use crate::region::Region;
use crate::seamless::SeamlessParams;
use crate::triangulated::TriangulatedCompositor;

/// How the reference face is mapped onto the destination face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Three-point affine warp, histogram matching and a feathered blend.
    #[default]
    Affine,
    /// Per-triangle warp over the landmark hull and seamless cloning.
    Triangulated,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Affine => write!(f, "affine"),
            Strategy::Triangulated => write!(f, "triangulated"),
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "affine" => Ok(Strategy::Affine),
            "triangulated" => Ok(Strategy::Triangulated),
            other => Err(format!("unknown strategy `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapOptions {
    pub strategy: Strategy,
    /// Jaw span divided by this gives the feather size of the affine blend.
    pub feather_divisor: f32,
    pub seamless: SeamlessParams,
}

impl Default for SwapOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            feather_divisor: DEFAULT_FEATHER_DIVISOR,
            seamless: SeamlessParams::default(),
        }
    }
}

enum Engine {
    Affine(AffineCompositor),
    Triangulated(TriangulatedCompositor),
}

/// Face swapper owning its landmark extractor. The strategy is fixed when the
/// swapper is built.
pub struct FaceSwapper {
    extractor: Box<dyn LandmarkExtractor>,
    engine: Engine,
    options: SwapOptions,
}

impl FaceSwapper {
    pub fn new(extractor: Box<dyn LandmarkExtractor>, options: SwapOptions) -> Self {
        let engine = match options.strategy {
            Strategy::Affine => Engine::Affine(AffineCompositor::new(options.feather_divisor)),
            Strategy::Triangulated => Engine::Triangulated(TriangulatedCompositor::new(options.seamless)),
        };
        Self {
            extractor,
            engine,
            options,
        }
    }

    pub fn options(&self) -> &SwapOptions {
        &self.options
    }

    pub fn strategy(&self) -> Strategy {
        self.options.strategy
    }

    /// Replaces the face at `dest_region` of `destination` with the face at
    /// `reference_region` of `face_set`.
    ///
    /// `source` is the unmodified image the destination region was detected
    /// in and must have the same size as `destination`. On error
    /// `destination` is left as it was.
    pub fn swap_faces(
        &mut self,
        source: &RgbImage,
        destination: &mut RgbImage,
        face_set: &RgbImage,
        dest_region: &Region,
        reference_region: &Region,
    ) -> Result<(), SwapError> {
        if source.dimensions() != destination.dimensions() {
            return Err(SwapError::SizeMismatch {
                source_size: source.dimensions(),
                destination_size: destination.dimensions(),
            });
        }
        let dest_box = dest_region.bounding_box();
        if dest_box.clip_to(source.width(), source.height()).is_none() {
            return Err(SwapError::RegionOutsideImage(dest_box));
        }
        let ref_box = reference_region.bounding_box();
        if ref_box.clip_to(face_set.width(), face_set.height()).is_none() {
            return Err(SwapError::RegionOutsideImage(ref_box));
        }

        match &mut self.engine {
            Engine::Affine(c) => c.swap(
                &mut self.extractor,
                source,
                destination,
                face_set,
                dest_region,
                reference_region,
            ),
            Engine::Triangulated(c) => c.swap(
                &mut self.extractor,
                source,
                destination,
                face_set,
                dest_region,
                reference_region,
            ),
        }
    }
}
