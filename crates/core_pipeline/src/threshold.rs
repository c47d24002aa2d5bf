//! Global binarization with Otsu's method
//!
//! The histogram is taken over the first (red) channel only. After the
//! enhancement pass every channel carries the luminance, so this is the same
//! as thresholding luminance while still accepting RGB(A) buffers.

use image::{ImageBuffer, Pixel};
use imageproc::stats::histogram;
use tracing::debug;

/// Threshold used when no split improves on zero variance (uniform images)
pub const FALLBACK_THRESHOLD: u8 = 127;

/// Binarized image together with the threshold that produced it
#[derive(Debug, Clone)]
pub struct Binarized<P: Pixel<Subpixel = u8>> {
    pub image: ImageBuffer<P, Vec<u8>>,
    pub threshold: u8,
}

/// 256-bucket histogram of the first channel
pub fn red_histogram<P>(image: &ImageBuffer<P, Vec<u8>>) -> [u32; 256]
where
    P: Pixel<Subpixel = u8>,
{
    histogram(image).channels[0]
}

/// Otsu threshold of a histogram
///
/// Scans t = 0..=255, skipping empty background classes and stopping once the
/// foreground class is empty. The first t with the strictly largest
/// between-class variance wins. Pixels `> threshold` are foreground.
pub fn otsu_threshold(histogram: &[u32; 256]) -> u8 {
    let total: f64 = histogram.iter().map(|&count| f64::from(count)).sum();
    let grand_sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(value, &count)| value as f64 * f64::from(count))
        .sum();

    let mut weight_b = 0.0;
    let mut sum_b = 0.0;
    let mut max_variance = 0.0;
    let mut threshold = FALLBACK_THRESHOLD;

    for (t, &count) in histogram.iter().enumerate() {
        weight_b += f64::from(count);
        if weight_b == 0.0 {
            continue;
        }
        let weight_f = total - weight_b;
        if weight_f == 0.0 {
            break;
        }
        sum_b += t as f64 * f64::from(count);

        let mean_b = sum_b / weight_b;
        let mean_f = (grand_sum - sum_b) / weight_f;
        let between = weight_b * weight_f * (mean_b - mean_f) * (mean_b - mean_f);
        if between > max_variance {
            max_variance = between;
            threshold = t as u8;
        }
    }

    threshold
}

/// Turn every pixel pure black or white
///
/// Color channels all receive the thresholded first-channel value; alpha is
/// left as it was.
pub fn binarize<P>(input: &ImageBuffer<P, Vec<u8>>) -> Binarized<P>
where
    P: Pixel<Subpixel = u8>,
{
    let threshold = otsu_threshold(&red_histogram(input));
    let color_channels = usize::from(P::CHANNEL_COUNT) - usize::from(P::HAS_ALPHA);

    let mut image = input.clone();
    for pixel in image.pixels_mut() {
        let channels = pixel.channels_mut();
        let value = if channels[0] > threshold { 255 } else { 0 };
        for channel in channels.iter_mut().take(color_channels) {
            *channel = value;
        }
    }

    debug!(
        "binarized {}x{} image at threshold {}",
        image.width(),
        image.height(),
        threshold
    );
    Binarized { image, threshold }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    fn bimodal_histogram() -> [u32; 256] {
        let mut hist = [0u32; 256];
        hist[10] = 1000;
        hist[240] = 1000;
        hist
    }

    #[test]
    fn test_otsu_bimodal_separates_modes() {
        let threshold = otsu_threshold(&bimodal_histogram());
        // Every t in [10, 240) gives the same split; the first one is kept
        assert_eq!(threshold, 10);
        assert!(threshold >= 10 && threshold < 240);
    }

    #[test]
    fn test_otsu_is_deterministic() {
        let mut hist = [0u32; 256];
        for (i, slot) in hist.iter_mut().enumerate() {
            *slot = ((i * 37) % 101) as u32;
        }
        assert_eq!(otsu_threshold(&hist), otsu_threshold(&hist));
    }

    #[test]
    fn test_otsu_uneven_modes() {
        let mut hist = [0u32; 256];
        for value in 20..40 {
            hist[value] = 50;
        }
        for value in 200..230 {
            hist[value] = 80;
        }
        let threshold = otsu_threshold(&hist);
        assert!((39..200).contains(&threshold), "threshold {threshold}");
    }

    #[test]
    fn test_otsu_uniform_falls_back() {
        let mut hist = [0u32; 256];
        hist[200] = 500;
        assert_eq!(otsu_threshold(&hist), FALLBACK_THRESHOLD);
        assert_eq!(otsu_threshold(&[0u32; 256]), FALLBACK_THRESHOLD);
    }

    #[test]
    fn test_binarize_gray_bimodal() {
        let img = GrayImage::from_fn(40, 10, |x, _| if x < 20 { Luma([10]) } else { Luma([240]) });
        let out = binarize(&img);
        assert_eq!(out.threshold, 10);
        assert_eq!(out.image.get_pixel(0, 0).0, [0]);
        assert_eq!(out.image.get_pixel(39, 9).0, [255]);
    }

    #[test]
    fn test_binarize_uniform_images() {
        let white = GrayImage::from_pixel(8, 8, Luma([250]));
        let black = GrayImage::from_pixel(8, 8, Luma([30]));
        assert!(binarize(&white).image.pixels().all(|p| p.0 == [255]));
        assert!(binarize(&black).image.pixels().all(|p| p.0 == [0]));
    }

    #[test]
    fn test_binarize_reads_red_and_keeps_alpha() {
        let img = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([10, 250, 250, 77])
            } else {
                Rgba([240, 0, 0, 200])
            }
        });
        let out = binarize(&img);
        assert_eq!(out.image.get_pixel(0, 0).0, [0, 0, 0, 77]);
        assert_eq!(out.image.get_pixel(1, 0).0, [255, 255, 255, 200]);
    }

    #[test]
    fn test_binarize_is_idempotent() {
        let img = GrayImage::from_fn(32, 32, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]));
        let once = binarize(&img).image;
        let twice = binarize(&once).image;
        assert_eq!(once, twice);
        assert!(once.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn test_binarize_does_not_mutate_input() {
        let img = GrayImage::from_fn(4, 4, |x, _| Luma([(x * 60) as u8]));
        let copy = img.clone();
        let _ = binarize(&img);
        assert_eq!(img, copy);
    }

    #[test]
    fn test_binarized_result_is_cloneable() {
        let img = RgbaImage::from_pixel(3, 3, Rgba([200, 200, 200, 255]));
        let out = binarize(&img);
        let copy = out.clone();
        assert_eq!(copy.threshold, out.threshold);
        assert_eq!(copy.image, out.image);
    }
}
