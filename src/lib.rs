pub mod config;
pub mod storage;

// Re-export vision types for convenience
pub use faceswap_vision::{
    pipeline, FaceRegion, FaceSwapper, Pipeline, ReferencePick, Region, Strategy, SwapOptions,
    SwapReport,
};
