use ndarray::{ArrayView2, Axis};

use crate::enums::Orientation;
use crate::volume::Volume;

/// How an orientation maps onto the volume axes
/// (0 = depth, 1 = rows, 2 = columns).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AxisLayout {
    /// Axis held at the requested index
    fixed: usize,
    /// Axis running down the extracted plane
    rows: usize,
    /// Axis running across the extracted plane
    columns: usize,
}

const fn layout(orientation: Orientation) -> AxisLayout {
    match orientation {
        Orientation::Axial => AxisLayout {
            fixed: 0,
            rows: 1,
            columns: 2,
        },
        Orientation::Coronal => AxisLayout {
            fixed: 1,
            rows: 0,
            columns: 2,
        },
        Orientation::Sagittal => AxisLayout {
            fixed: 2,
            rows: 0,
            columns: 1,
        },
    }
}

/// A 2D cross-section of a volume.
#[derive(Debug, Clone)]
pub struct PlaneDescriptor<'a> {
    pub orientation: Orientation,
    /// Index along the fixed axis, after clamping
    pub index: usize,
    pub pixels: ArrayView2<'a, f32>,
    /// Physical width of a pixel divided by its physical height
    pub aspect_ratio: f32,
}

pub struct PlaneExtractor;

impl PlaneExtractor {
    /// Number of planes available in `orientation`.
    pub fn extent(volume: &Volume, orientation: Orientation) -> usize {
        volume.data().len_of(Axis(layout(orientation).fixed))
    }

    /// Physical aspect ratio of planes in `orientation`: the spacing
    /// across the plane over the spacing down the plane.
    pub fn aspect_ratio(volume: &Volume, orientation: Orientation) -> f32 {
        let AxisLayout { rows, columns, .. } = layout(orientation);
        let spacing = volume.spacing();
        spacing.along(columns) / spacing.along(rows)
    }

    /// Extract the plane at `index`, clamped to the valid range.
    ///
    /// The returned pixels are a view into the volume, no intensity
    /// transformation is applied.
    pub fn extract(volume: &Volume, orientation: Orientation, index: usize) -> PlaneDescriptor<'_> {
        let fixed = layout(orientation).fixed;
        let index = index.min(Self::extent(volume, orientation).saturating_sub(1));
        let pixels = volume.data().index_axis(Axis(fixed), index);
        // remaining axes keep their order, matching the layout table
        PlaneDescriptor {
            orientation,
            index,
            pixels,
            aspect_ratio: Self::aspect_ratio(volume, orientation),
        }
    }
}
