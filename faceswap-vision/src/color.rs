use image::{GrayImage, RgbImage};

use crate::region::BoundingBox;

pub type Histogram = [u32; 256];
pub type Cdf = [f32; 256];
pub type Lut = [u8; 256];

/// Per-channel histograms of the masked pixels inside `rect`.
pub fn masked_histograms(
    image: &RgbImage,
    mask: &GrayImage,
    rect: (u32, u32, u32, u32),
) -> [Histogram; 3] {
    let mut hist = [[0u32; 256]; 3];
    let (x0, y0, w, h) = rect;
    for y in y0..y0 + h {
        for x in x0..x0 + w {
            if mask.get_pixel(x, y)[0] == 0 {
                continue;
            }
            let p = image.get_pixel(x, y);
            for c in 0..3 {
                hist[c][p[c] as usize] += 1;
            }
        }
    }
    hist
}

/// Cumulative distribution normalised to [0, 1]. All zeros for an empty histogram.
pub fn normalized_cdf(hist: &Histogram) -> Cdf {
    let mut running = [0u64; 256];
    let mut sum = 0u64;
    for (r, &count) in running.iter_mut().zip(hist) {
        sum += count as u64;
        *r = sum;
    }

    let mut cdf = [0.0f32; 256];
    if sum == 0 {
        return cdf;
    }
    for (c, &r) in cdf.iter_mut().zip(&running) {
        *c = r as f32 / sum as f32;
    }
    cdf
}

/// Bin of `haystack` (non-decreasing) whose value is closest to `needle`.
/// Ties between two bins resolve to the lower one.
pub fn closest_bin(needle: f32, haystack: &Cdf) -> u8 {
    let upper = haystack.partition_point(|&v| v < needle);
    if upper == 0 {
        return 0;
    }
    if upper >= haystack.len() {
        return (haystack.len() - 1) as u8;
    }
    let lower = upper - 1;
    if needle - haystack[lower] <= haystack[upper] - needle {
        lower as u8
    } else {
        upper as u8
    }
}

/// Lookup table sending each target intensity to the source intensity with
/// the nearest cumulative frequency.
pub fn build_lut(source: &Cdf, target: &Cdf) -> Lut {
    let mut lut = [0u8; 256];
    for (entry, &t) in lut.iter_mut().zip(target) {
        *entry = closest_bin(t, source);
    }
    lut
}

/// Histogram-matches `target` onto `source` in place, per channel, for the
/// pixels of `rect` where `mask` is non-zero.
///
/// `rect` is clipped to the images; nothing happens when it lies outside.
pub fn correct_colors(source: &RgbImage, target: &mut RgbImage, mask: &GrayImage, rect: &BoundingBox) {
    let (w, h) = (
        source.width().min(target.width()).min(mask.width()),
        source.height().min(target.height()).min(mask.height()),
    );
    let Some(rect) = rect.clip_to(w, h) else {
        log::debug!("colour correction rect {:?} outside image", rect);
        return;
    };

    let src_hist = masked_histograms(source, mask, rect);
    let dst_hist = masked_histograms(target, mask, rect);

    let luts: [Lut; 3] = std::array::from_fn(|c| {
        build_lut(&normalized_cdf(&src_hist[c]), &normalized_cdf(&dst_hist[c]))
    });

    let (x0, y0, rw, rh) = rect;
    for y in y0..y0 + rh {
        for x in x0..x0 + rw {
            if mask.get_pixel(x, y)[0] == 0 {
                continue;
            }
            let p = target.get_pixel_mut(x, y);
            for c in 0..3 {
                p[c] = luts[c][p[c] as usize];
            }
        }
    }
}
