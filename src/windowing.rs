//! Conversion of raw sample planes into displayable grayscale.

use image::{GrayImage, Luma};
use ndarray::{Array2, ArrayView2, Zip};

use crate::enums::Polarity;

/// Smallest width a window may have.
pub const MIN_WINDOW_WIDTH: f32 = 1e-3;

/// Smallest width of a window derived from the sample range, so that a
/// flat plane does not collapse into a single tone.
pub const MIN_DERIVED_WINDOW_WIDTH: f32 = 1.0;

/// Largest value of the 8-bit display range.
pub const DISPLAY_MAX: f32 = 255.0;

/// Linear intensity window: center and width in sample units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSetting {
    center: f32,
    width: f32,
}

impl WindowSetting {
    /// Create a window, clamping the width to [`MIN_WINDOW_WIDTH`].
    pub fn new(center: f32, width: f32) -> Self {
        let width = if width.is_finite() {
            width.max(MIN_WINDOW_WIDTH)
        } else {
            MIN_WINDOW_WIDTH
        };
        let center = if center.is_finite() { center } else { 0.0 };
        WindowSetting { center, width }
    }

    /// Estimate a window covering the observed range of `plane`.
    ///
    /// Non-finite samples are ignored. An empty or all-NaN plane yields a
    /// window centered on zero.
    pub fn derive_from(plane: ArrayView2<'_, f32>) -> Self {
        let range = plane
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<(f32, f32)>, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            });
        match range {
            Some((min, max)) => {
                Self::new((min + max) / 2.0, (max - min).max(MIN_DERIVED_WINDOW_WIDTH))
            }
            None => Self::new(0.0, MIN_DERIVED_WINDOW_WIDTH),
        }
    }

    pub fn center(&self) -> f32 {
        self.center
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    /// Sample values at and beyond which the output saturates.
    pub fn bounds(&self) -> (f32, f32) {
        let half = self.width / 2.0;
        (self.center - half, self.center + half)
    }
}

/// Stateless windowing of sample planes.
pub struct WindowingEngine;

impl WindowingEngine {
    /// Position of `value` inside the window, in `[0, 1]`, before polarity.
    #[inline]
    fn linear(value: f32, low: f32, high: f32) -> f32 {
        let normalized = (value - low) / (high - low);
        if normalized.is_nan() {
            0.0
        } else {
            normalized.clamp(0.0, 1.0)
        }
    }

    /// Normalize a single sample into `[0, 1]` display intensity.
    #[inline]
    pub fn normalize(value: f32, window: WindowSetting, polarity: Polarity) -> f32 {
        let (low, high) = window.bounds();
        let normalized = Self::linear(value, low, high);
        if polarity.is_inverted() {
            1.0 - normalized
        } else {
            normalized
        }
    }

    /// Map a single sample to the 8-bit display range.
    ///
    /// Inversion happens after rounding so that both polarities of the same
    /// sample always add up to [`DISPLAY_MAX`].
    #[inline]
    pub fn to_display(value: f32, window: WindowSetting, polarity: Polarity) -> u8 {
        let (low, high) = window.bounds();
        let level = (Self::linear(value, low, high) * DISPLAY_MAX + 0.5) as u8;
        if polarity.is_inverted() {
            u8::MAX - level
        } else {
            level
        }
    }

    /// Normalized float intensities with the shape of `plane`.
    pub fn normalized_plane(
        plane: ArrayView2<'_, f32>,
        window: WindowSetting,
        polarity: Polarity,
    ) -> Array2<f32> {
        Zip::from(plane).par_map_collect(|&v| Self::normalize(v, window, polarity))
    }

    /// Window `plane` into an 8-bit grayscale image, one pixel per sample,
    /// rows of the plane becoming image rows.
    pub fn apply(
        plane: ArrayView2<'_, f32>,
        window: WindowSetting,
        polarity: Polarity,
    ) -> GrayImage {
        let levels = Zip::from(plane).par_map_collect(|&v| Self::to_display(v, window, polarity));
        let (height, width) = levels.dim();
        GrayImage::from_fn(width as u32, height as u32, |x, y| {
            Luma([levels[[y as usize, x as usize]]])
        })
    }
}
