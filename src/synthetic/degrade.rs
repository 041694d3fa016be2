use image::{imageops, Rgb, RgbImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use rand::Rng;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Scanner-style degradation: slight skew, occasional defocus, light noise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegradationSimulator {
    /// Rotation is drawn uniformly from `[-max, max]` degrees.
    pub max_rotation_degrees: f32,
    pub blur_probability: f64,
    pub blur_sigma: f32,
    /// Weight of the random layer in the final blend.
    pub noise_opacity: f32,
}

impl Default for DegradationSimulator {
    fn default() -> Self {
        Self {
            max_rotation_degrees: 1.5,
            blur_probability: 0.5,
            blur_sigma: 0.5,
            noise_opacity: 0.05,
        }
    }
}

impl DegradationSimulator {
    /// Rotate, maybe blur, then add noise. Output is never smaller than input.
    pub fn apply<R: Rng + ?Sized>(&self, image: &RgbImage, rng: &mut R) -> RgbImage {
        let degrees = if self.max_rotation_degrees > 0.0 {
            rng.gen_range(-self.max_rotation_degrees..=self.max_rotation_degrees)
        } else {
            0.0
        };
        let mut degraded = rotate_expanded(image, degrees);

        if self.blur_sigma > 0.0 && rng.gen_bool(self.blur_probability.clamp(0.0, 1.0)) {
            degraded = imageops::blur(&degraded, self.blur_sigma);
        }

        add_noise(&mut degraded, self.noise_opacity, rng);
        tracing::trace!(degrees, width = degraded.width(), height = degraded.height(), "Degraded");
        degraded
    }
}

/// Rotate counter-clockwise by `degrees` on a canvas grown to hold the
/// whole rotated page. Uncovered area is white.
pub fn rotate_expanded(image: &RgbImage, degrees: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    let theta = degrees.to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let out_w = ((width as f32 * cos + height as f32 * sin).ceil() as u32).max(width);
    let out_h = ((width as f32 * sin + height as f32 * cos).ceil() as u32).max(height);

    let mut canvas = RgbImage::from_pixel(out_w, out_h, WHITE);
    imageops::overlay(
        &mut canvas,
        image,
        i64::from((out_w - width) / 2),
        i64::from((out_h - height) / 2),
    );

    if degrees == 0.0 {
        return canvas;
    }
    // Positive theta turns clockwise in image coordinates.
    rotate_about_center(&canvas, -theta, Interpolation::Bicubic, WHITE)
}

/// Blend every channel with a uniform random layer: `v * (1 - o) + n * o`,
/// truncated to u8.
pub fn add_noise<R: Rng + ?Sized>(image: &mut RgbImage, opacity: f32, rng: &mut R) {
    if opacity <= 0.0 {
        return;
    }
    let opacity = f64::from(opacity.min(1.0));
    let keep = 1.0 - opacity;
    for channel in image.iter_mut() {
        let noise = f64::from(rng.gen_range(0u8..255));
        *channel = (f64::from(*channel) * keep + noise * opacity) as u8;
    }
}
