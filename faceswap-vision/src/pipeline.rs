use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::compositor::FaceSwapper;
use crate::error::SwapError;
use crate::face_region::FaceRegion;
use crate::matcher::{best_match, RegionMatcher};

/// How a reference face is chosen for each target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferencePick {
    #[default]
    Random,
    /// Lowest appearance dissimilarity to the target.
    Similar,
}

#[derive(Debug)]
pub enum SkipReason {
    Rejected,
    BelowThreshold(f32),
    NoReference,
    Failed { reference: usize, error: SwapError },
}

#[derive(Debug, Default)]
pub struct SwapReport {
    /// `(target, reference)` pairs that were composited, in order.
    pub swapped: Vec<(usize, usize)>,
    pub skipped: Vec<(usize, SkipReason)>,
}

/// Full pipeline: pick a reference per target → swap → collect the report
pub struct Pipeline {
    pub swapper: FaceSwapper,
    pub detection_threshold: f32,
    rng: StdRng,
}

impl Pipeline {
    pub fn new(swapper: FaceSwapper, detection_threshold: f32, seed: u64) -> Self {
        Self {
            swapper,
            detection_threshold,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn pick(&mut self, target: &FaceRegion, references: &[FaceRegion], pick: ReferencePick) -> Option<usize> {
        if references.is_empty() {
            return None;
        }
        match pick {
            ReferencePick::Random => Some(self.rng.gen_range(0..references.len())),
            ReferencePick::Similar => best_match(
                target,
                references.iter().map(|r| r as &dyn RegionMatcher),
            )
            .map(|(i, _)| i),
        }
    }

    /// Swaps a reference face from `face_set` onto every usable target of
    /// `source`. Targets are processed in order, so later swaps win where
    /// faces overlap.
    pub fn run(
        &mut self,
        source: &RgbImage,
        face_set: &RgbImage,
        targets: &[FaceRegion],
        references: &[FaceRegion],
        pick: ReferencePick,
    ) -> (RgbImage, SwapReport) {
        let mut output = source.clone();
        let mut report = SwapReport::default();

        for (ti, target) in targets.iter().enumerate() {
            if target.base().is_rejected() {
                log::warn!("target {} was rejected, skipped", ti);
                report.skipped.push((ti, SkipReason::Rejected));
                continue;
            }
            if target.confidence() < self.detection_threshold {
                log::warn!(
                    "target {} confidence {:.3} below {:.3}, skipped",
                    ti,
                    target.confidence(),
                    self.detection_threshold
                );
                report
                    .skipped
                    .push((ti, SkipReason::BelowThreshold(target.confidence())));
                continue;
            }
            let Some(ri) = self.pick(target, references, pick) else {
                log::warn!("no reference face for target {}", ti);
                report.skipped.push((ti, SkipReason::NoReference));
                continue;
            };

            match self.swapper.swap_faces(
                source,
                &mut output,
                face_set,
                target.base(),
                references[ri].base(),
            ) {
                Ok(()) => report.swapped.push((ti, ri)),
                Err(error) => {
                    log::warn!("target {} with reference {} skipped: {}", ti, ri, error);
                    report.skipped.push((ti, SkipReason::Failed { reference: ri, error }));
                }
            }
        }

        log::info!(
            "swapped {} of {} faces ({} strategy)",
            report.swapped.len(),
            targets.len(),
            self.swapper.strategy()
        );
        (output, report)
    }
}
