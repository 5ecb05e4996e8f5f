use image::{GrayImage, Luma};
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

use crate::enums::Interpolation;

/// Longest side of a resampled image.
pub const MAX_OUTPUT_DIMENSION: u32 = 4096;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Output size `(width, height)` at which pixels of a `rows` x `columns`
    /// plane with the given aspect ratio appear square.
    ///
    /// Width is kept and height scaled by `1 / aspect_ratio`; the result is
    /// shrunk proportionally if either side exceeds [`MAX_OUTPUT_DIMENSION`].
    pub(crate) fn physical_dimensions(
        rows: usize,
        columns: usize,
        aspect_ratio: f32,
    ) -> (u32, u32) {
        let aspect_ratio = if aspect_ratio.is_finite() && aspect_ratio > 0.0 {
            aspect_ratio
        } else {
            1.0
        };
        let mut width = columns.max(1) as f32;
        let mut height = (rows as f32 / aspect_ratio).round().max(1.0);

        let longest = width.max(height);
        if longest > MAX_OUTPUT_DIMENSION as f32 {
            let scale = MAX_OUTPUT_DIMENSION as f32 / longest;
            width = (width * scale).round().max(1.0);
            height = (height * scale).round().max(1.0);
        }
        (width as u32, height as u32)
    }

    #[inline]
    pub(crate) fn bilinear_interpolate(slice: &ArrayView2<f32>, y: f32, x: f32) -> f32 {
        let (height, width) = slice.dim();

        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dy = y - y0 as f32;
        let dx = x - x0 as f32;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;

        let v00 = slice[[y0, x0]];
        let v01 = slice[[y0, x1]];
        let v10 = slice[[y1, x0]];
        let v11 = slice[[y1, x1]];

        let v0 = v00.mul_add(one_minus_dx, v01 * dx);
        let v1 = v10.mul_add(one_minus_dx, v11 * dx);

        v0.mul_add(one_minus_dy, v1 * dy)
    }

    /// Resample a grayscale image to `width` x `height`.
    pub(crate) fn resample(
        image: &GrayImage,
        width: u32,
        height: u32,
        interpolation: Interpolation,
    ) -> GrayImage {
        let (src_width, src_height) = image.dimensions();
        if src_width == 0 || src_height == 0 || width == 0 || height == 0 {
            return GrayImage::new(width, height);
        }
        if (src_width, src_height) == (width, height) {
            return image.clone();
        }
        let source = Array2::from_shape_fn((src_height as usize, src_width as usize), |(y, x)| {
            image.get_pixel(x as u32, y as u32).0[0] as f32
        });
        let source = source.view();

        let pixel_data: Vec<u8> = (0..height)
            .into_par_iter()
            .flat_map_iter(|y| {
                (0..width).map(move |x| {
                    // sample at pixel centres
                    let norm_x = (x as f32 + 0.5) / width as f32;
                    let norm_y = (y as f32 + 0.5) / height as f32;

                    let max_x = (src_width - 1) as f32;
                    let max_y = (src_height - 1) as f32;
                    let src_x = (norm_x * src_width as f32 - 0.5).clamp(0.0, max_x);
                    let src_y = (norm_y * src_height as f32 - 0.5).clamp(0.0, max_y);

                    let value = match interpolation {
                        Interpolation::Bilinear => {
                            Self::bilinear_interpolate(&source, src_y, src_x)
                        }
                        Interpolation::None => {
                            source[[src_y.round() as usize, src_x.round() as usize]]
                        }
                    };
                    value.round().clamp(0.0, 255.0) as u8
                })
            })
            .collect();

        let mut output = GrayImage::new(width, height);
        for (pixel, value) in output.pixels_mut().zip(pixel_data) {
            *pixel = Luma([value]);
        }
        output
    }
}
