pub mod affine;
pub mod alignment;
pub mod color;
pub mod compositor;
pub mod delaunay;
pub mod error;
pub mod face_region;
pub mod geometry;
pub mod landmarks;
pub mod matcher;
pub mod model;
pub mod pipeline;
pub mod region;
pub mod seamless;
pub mod transform;
pub mod triangulated;
pub mod warp;

// Re-export commonly used types
pub use compositor::{FaceSwapper, Strategy, SwapOptions};
pub use error::{RegionFileError, SwapError};
pub use face_region::FaceRegion;
pub use landmarks::{FaceDetector, KnownRegions, LandmarkExtractor, MeanShapeLandmarker};
pub use matcher::RegionMatcher;
pub use model::{LandmarkModelSpec, OnnxLandmarker};
pub use pipeline::{Pipeline, ReferencePick, SwapReport};
pub use region::{BoundingBox, DetectionType, Point, Region};
pub use seamless::SeamlessParams;
