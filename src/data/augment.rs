use image::DynamicImage;
use rand::Rng;

/// Training-time image augmentation
///
/// Chest films are close to left/right symmetric at the resolution the
/// classifier sees, so a horizontal flip is the default policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Augmenter {
    /// Probability of mirroring the image horizontally
    pub flip_horizontal: f64,
}

impl Augmenter {
    pub fn new(flip_horizontal: f64) -> Self {
        Self {
            flip_horizontal: flip_horizontal.clamp(0.0, 1.0),
        }
    }

    pub fn apply<R: Rng + ?Sized>(&self, img: DynamicImage, rng: &mut R) -> DynamicImage {
        if self.flip_horizontal > 0.0 && rng.gen_bool(self.flip_horizontal) {
            img.fliph()
        } else {
            img
        }
    }
}

impl Default for Augmenter {
    fn default() -> Self {
        Self::new(0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::random::seeded_rng;
    use image::{Rgb, RgbImage};

    fn marked_image() -> DynamicImage {
        let mut img = RgbImage::new(4, 2);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_always_flip() {
        let out = Augmenter::new(1.0).apply(marked_image(), &mut seeded_rng(0));
        let rgb = out.to_rgb8();
        assert_eq!(rgb.get_pixel(3, 0), &Rgb([255, 0, 0]));
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_never_flip() {
        let out = Augmenter::new(0.0).apply(marked_image(), &mut seeded_rng(0));
        assert_eq!(out.to_rgb8().get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_probability_is_clamped() {
        assert_eq!(Augmenter::new(3.0).flip_horizontal, 1.0);
        assert_eq!(Augmenter::default().flip_horizontal, 0.5);
    }
}
