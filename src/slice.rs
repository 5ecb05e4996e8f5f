use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::enums::Polarity;
use crate::windowing::WindowSetting;

/// A single decoded 2D image together with the attributes needed to place
/// it in a volume.
///
/// Every attribute a file may omit is an explicit `Option`; the fallbacks
/// are applied by the [`SeriesAssembler`](crate::series::SeriesAssembler).
#[derive(Debug, Clone)]
pub struct Slice {
    /// Samples after modality rescale, indexed `[row, column]`
    pub pixels: Array2<f32>,
    /// File the slice was decoded from
    pub source: PathBuf,
    pub series_uid: Option<String>,
    /// Physical distance between rows and between columns, in that order
    pub pixel_spacing: Option<(f32, f32)>,
    pub slice_thickness: Option<f32>,
    pub spacing_between_slices: Option<f32>,
    pub image_position: Option<[f64; 3]>,
    /// Row and column direction cosines
    pub image_orientation: Option<[[f64; 3]; 2]>,
    pub instance_number: Option<i32>,
    /// Frame within a multi-frame source, 0 for single-frame files
    pub frame_index: u32,
    pub bits_stored: u16,
    pub signed: bool,
    pub polarity: Polarity,
    pub window: Option<WindowSetting>,
}

impl Slice {
    /// Create a slice with no optional attributes set.
    pub fn new(pixels: Array2<f32>, source: impl AsRef<Path>) -> Self {
        Slice {
            pixels,
            source: source.as_ref().to_path_buf(),
            series_uid: None,
            pixel_spacing: None,
            slice_thickness: None,
            spacing_between_slices: None,
            image_position: None,
            image_orientation: None,
            instance_number: None,
            frame_index: 0,
            bits_stored: 16,
            signed: false,
            polarity: Polarity::Normal,
            window: None,
        }
    }

    pub fn rows(&self) -> usize {
        self.pixels.nrows()
    }

    pub fn columns(&self) -> usize {
        self.pixels.ncols()
    }

    pub fn with_series_uid(mut self, uid: impl Into<String>) -> Self {
        self.series_uid = Some(uid.into());
        self
    }

    pub fn with_pixel_spacing(mut self, row: f32, column: f32) -> Self {
        self.pixel_spacing = Some((row, column));
        self
    }

    pub fn with_slice_thickness(mut self, thickness: f32) -> Self {
        self.slice_thickness = Some(thickness);
        self
    }

    pub fn with_position(mut self, position: [f64; 3]) -> Self {
        self.image_position = Some(position);
        self
    }

    pub fn with_orientation(mut self, row: [f64; 3], column: [f64; 3]) -> Self {
        self.image_orientation = Some([row, column]);
        self
    }

    pub fn with_instance_number(mut self, number: i32) -> Self {
        self.instance_number = Some(number);
        self
    }

    pub fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    pub fn with_window(mut self, window: WindowSetting) -> Self {
        self.window = Some(window);
        self
    }

    /// Unit normal of the image plane, from the cross product of the row
    /// and column direction cosines.
    pub fn normal(&self) -> Option<[f64; 3]> {
        let [r, c] = self.image_orientation?;
        let n = [
            r[1] * c[2] - r[2] * c[1],
            r[2] * c[0] - r[0] * c[2],
            r[0] * c[1] - r[1] * c[0],
        ];
        let norm = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        if norm.is_finite() && norm > f64::EPSILON {
            Some([n[0] / norm, n[1] / norm, n[2] / norm])
        } else {
            None
        }
    }

    /// Distance of the image position along `normal`.
    pub fn project(&self, normal: [f64; 3]) -> Option<f64> {
        let p = self.image_position?;
        Some(p[0] * normal[0] + p[1] * normal[1] + p[2] * normal[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axial_orientation_has_z_normal() {
        let slice = Slice::new(Array2::zeros((2, 2)), "a.dcm")
            .with_orientation([1., 0., 0.], [0., 1., 0.])
            .with_position([10., 20., -35.5]);
        assert_eq!(slice.normal(), Some([0., 0., 1.]));
        assert_eq!(slice.project([0., 0., 1.]), Some(-35.5));
    }

    #[test]
    fn degenerate_orientation_has_no_normal() {
        let slice = Slice::new(Array2::zeros((2, 2)), "a.dcm")
            .with_orientation([1., 0., 0.], [1., 0., 0.]);
        assert_eq!(slice.normal(), None);
    }
}
