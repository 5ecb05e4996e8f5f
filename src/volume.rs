use ndarray::{Array3, s};
use tracing::warn;

use crate::enums::{Polarity, SortBy};
use crate::series::AssembledSeries;
use crate::volume_loader::VolumeLoaderError;
use crate::warning::LoadWarning;
use crate::windowing::WindowSetting;

/// Physical distance between neighbouring samples along each volume axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spacing {
    /// Between consecutive slices (axis 0)
    pub slice: f32,
    /// Between rows (axis 1)
    pub row: f32,
    /// Between columns (axis 2)
    pub column: f32,
}

impl Spacing {
    pub fn new(slice: f32, row: f32, column: f32) -> Self {
        Spacing { slice, row, column }
    }

    pub fn uniform(value: f32) -> Self {
        Self::new(value, value, value)
    }

    /// Spacing along volume axis `axis` (0 = depth, 1 = rows, 2 = columns).
    pub fn along(&self, axis: usize) -> f32 {
        match axis {
            0 => self.slice,
            1 => self.row,
            _ => self.column,
        }
    }
}

/// Which spacings were substituted by a default instead of read from tags.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EstimatedSpacing {
    pub slice: bool,
    pub row: bool,
    pub column: bool,
}

impl EstimatedSpacing {
    pub fn any(&self) -> bool {
        self.slice || self.row || self.column
    }

    pub fn all(&self) -> bool {
        self.slice && self.row && self.column
    }
}

/// What the display layer needs to know about a loaded volume.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeSummary {
    pub series: Option<String>,
    pub slice_count: usize,
    /// (depth, rows, columns)
    pub dim: (usize, usize, usize),
    pub spacing: Spacing,
    pub estimated_spacing: EstimatedSpacing,
    /// No window was found in the source and one was derived from samples
    pub estimated_window: bool,
    pub polarity: Polarity,
    pub sort_by: SortBy,
}

/// Stack of equally sized slices with physical spacing.
///
/// Built once per load and never modified afterwards.
#[derive(Debug, Clone)]
pub struct Volume {
    data: Array3<f32>,
    spacing: Spacing,
    estimated: EstimatedSpacing,
    polarity: Polarity,
    window_hint: Option<WindowSetting>,
    series_uid: Option<String>,
    sort_by: SortBy,
}

impl Volume {
    /// Wrap an existing array. Non-positive spacings are replaced by 1.0
    /// and flagged as estimated.
    pub fn new(data: Array3<f32>, spacing: Spacing) -> Self {
        let mut estimated = EstimatedSpacing::default();
        let fix = |value: f32, flag: &mut bool| {
            if value.is_finite() && value > 0.0 {
                value
            } else {
                *flag = true;
                1.0
            }
        };
        let spacing = Spacing {
            slice: fix(spacing.slice, &mut estimated.slice),
            row: fix(spacing.row, &mut estimated.row),
            column: fix(spacing.column, &mut estimated.column),
        };
        Self {
            data,
            spacing,
            estimated,
            polarity: Polarity::Normal,
            window_hint: None,
            series_uid: None,
            sort_by: SortBy::EnumerationOrder,
        }
    }

    pub fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    pub fn with_window_hint(mut self, window: Option<WindowSetting>) -> Self {
        self.window_hint = window;
        self
    }

    /// Stack an ordered series along the depth axis.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeLoaderError::InconsistentGeometry`] naming the first
    /// slice whose dimensions differ from the first slice's, and
    /// [`VolumeLoaderError::EmptySeries`] if the series has no slices.
    pub fn from_series(
        assembled: AssembledSeries,
        warnings: &mut Vec<LoadWarning>,
    ) -> Result<Self, VolumeLoaderError> {
        let AssembledSeries {
            series,
            spacing,
            estimated,
        } = assembled;
        let slices = series.slices();
        let first = slices.first().ok_or_else(|| VolumeLoaderError::EmptySeries {
            path: series.label().into(),
        })?;

        let expected = first.pixels.dim();
        if let Some(odd) = slices.iter().find(|slice| slice.pixels.dim() != expected) {
            return Err(VolumeLoaderError::InconsistentGeometry {
                series: series.label().to_string(),
                path: odd.source.clone(),
                expected,
                found: odd.pixels.dim(),
            });
        }

        let polarity = first.polarity;
        if slices.iter().any(|slice| slice.polarity != polarity) {
            let warning = LoadWarning::MixedPolarity {
                series: series.label().to_string(),
            };
            warn!("{warning}");
            warnings.push(warning);
        }

        let (height, width) = expected;
        let mut data = Array3::<f32>::zeros((slices.len(), height, width));
        for (i, slice) in slices.iter().enumerate() {
            data.slice_mut(s![i, .., ..]).assign(&slice.pixels);
        }

        Ok(Self {
            data,
            spacing,
            estimated,
            polarity,
            window_hint: slices.iter().find_map(|slice| slice.window),
            series_uid: series.uid().map(str::to_string),
            sort_by: series.sort_by(),
        })
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn spacing(&self) -> Spacing {
        self.spacing
    }

    pub fn estimated_spacing(&self) -> EstimatedSpacing {
        self.estimated
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// Window found in the source attributes, if any.
    pub fn window_hint(&self) -> Option<WindowSetting> {
        self.window_hint
    }

    pub fn series_uid(&self) -> Option<&str> {
        self.series_uid.as_deref()
    }

    pub fn sort_by(&self) -> SortBy {
        self.sort_by
    }

    pub fn summary(&self) -> VolumeSummary {
        VolumeSummary {
            series: self.series_uid.clone(),
            slice_count: self.data.dim().0,
            dim: self.dim(),
            spacing: self.spacing,
            estimated_spacing: self.estimated,
            estimated_window: self.window_hint.is_none(),
            polarity: self.polarity,
            sort_by: self.sort_by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::SeriesAssembler;
    use crate::slice::Slice;
    use ndarray::Array2;

    fn assemble(slices: Vec<Slice>) -> AssembledSeries {
        SeriesAssembler::default()
            .assemble(slices, &mut Vec::new())
            .unwrap()
    }

    #[test]
    fn stacks_slices_in_order() {
        let slices: Vec<Slice> = (0..3)
            .map(|i| {
                Slice::new(
                    Array2::from_shape_fn((2, 3), |(r, c)| (i * 100 + r * 10 + c) as f32),
                    format!("{i}.dcm"),
                )
                .with_instance_number(i as i32)
            })
            .collect();
        let volume = Volume::from_series(assemble(slices.clone()), &mut Vec::new()).unwrap();
        assert_eq!(volume.dim(), (3, 2, 3));
        for (i, slice) in slices.iter().enumerate() {
            assert_eq!(volume.data().slice(s![i, .., ..]), slice.pixels);
        }
    }

    #[test]
    fn mismatched_dimensions_are_fatal() {
        let slices = vec![
            Slice::new(Array2::zeros((4, 4)), "a.dcm")
                .with_series_uid("1.2.3")
                .with_instance_number(1),
            Slice::new(Array2::zeros((4, 5)), "b.dcm")
                .with_series_uid("1.2.3")
                .with_instance_number(2),
        ];
        let series = assemble(slices);
        let err = Volume::from_series(series, &mut Vec::new()).unwrap_err();
        match &err {
            VolumeLoaderError::InconsistentGeometry {
                series,
                path,
                expected,
                found,
            } => {
                assert_eq!(series, "1.2.3");
                assert_eq!(path.to_str(), Some("b.dcm"));
                assert_eq!(*expected, (4, 4));
                assert_eq!(*found, (4, 5));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("b.dcm"));
    }

    #[test]
    fn first_slice_polarity_wins() {
        let slices = vec![
            Slice::new(Array2::zeros((2, 2)), "a").with_polarity(Polarity::Inverted),
            Slice::new(Array2::zeros((2, 2)), "b"),
        ];
        let mut warnings = Vec::new();
        let volume = Volume::from_series(assemble(slices), &mut warnings).unwrap();
        assert_eq!(volume.polarity(), Polarity::Inverted);
        assert!(matches!(warnings[0], LoadWarning::MixedPolarity { .. }));
    }

    #[test]
    fn summary_flags_missing_metadata() {
        let slices: Vec<Slice> = (0..4)
            .map(|i| Slice::new(Array2::zeros((3, 2)), format!("{i}")))
            .collect();
        let volume = Volume::from_series(assemble(slices), &mut Vec::new()).unwrap();
        let summary = volume.summary();
        assert_eq!(summary.slice_count, 4);
        assert_eq!(summary.dim, (4, 3, 2));
        assert_eq!(summary.spacing, Spacing::uniform(1.0));
        assert!(summary.estimated_spacing.all());
        assert!(summary.estimated_window);
    }

    #[test]
    fn window_hint_comes_from_first_hinted_slice() {
        let slices = vec![
            Slice::new(Array2::zeros((2, 2)), "a"),
            Slice::new(Array2::zeros((2, 2)), "b").with_window(WindowSetting::new(40., 400.)),
        ];
        let volume = Volume::from_series(assemble(slices), &mut Vec::new()).unwrap();
        assert_eq!(volume.window_hint(), Some(WindowSetting::new(40., 400.)));
        assert!(!volume.summary().estimated_window);
    }

    #[test]
    fn invalid_spacing_is_replaced() {
        let volume = Volume::new(Array3::zeros((1, 1, 1)), Spacing::new(0.0, 0.5, f32::NAN));
        assert_eq!(volume.spacing(), Spacing::new(1.0, 0.5, 1.0));
        assert_eq!(
            volume.estimated_spacing(),
            EstimatedSpacing {
                slice: true,
                row: false,
                column: true
            }
        );
    }
}
