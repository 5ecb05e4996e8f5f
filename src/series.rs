//! Grouping of decoded slices into series, selection of the series to
//! display, spatial ordering and spacing inference.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::enums::SortBy;
use crate::slice::Slice;
use crate::volume::{EstimatedSpacing, Spacing};
use crate::warning::LoadWarning;

/// Label used for slices that carry no series identifier.
pub const UNIDENTIFIED_SERIES: &str = "<unidentified>";

/// Slices sharing one series identifier, in a single consistent order.
#[derive(Debug, Clone)]
pub struct Series {
    uid: Option<String>,
    slices: Vec<Slice>,
    sort_by: SortBy,
}

impl Series {
    fn new(uid: Option<String>) -> Self {
        Series {
            uid,
            slices: Vec::new(),
            sort_by: SortBy::EnumerationOrder,
        }
    }

    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    /// Identifier for messages, also for series without one.
    pub fn label(&self) -> &str {
        self.uid.as_deref().unwrap_or(UNIDENTIFIED_SERIES)
    }

    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Strategy the slices are currently ordered by.
    pub fn sort_by(&self) -> SortBy {
        self.sort_by
    }
}

/// An ordered series with its resolved physical spacing.
#[derive(Debug, Clone)]
pub struct AssembledSeries {
    pub series: Series,
    pub spacing: Spacing,
    pub estimated: EstimatedSpacing,
}

pub struct SeriesAssembler {
    default_spacing: f32,
    spacing_tolerance: f32,
}

impl Default for SeriesAssembler {
    fn default() -> Self {
        SeriesAssembler {
            default_spacing: 1.0,
            spacing_tolerance: 0.01,
        }
    }
}

#[inline]
fn is_valid_spacing(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

impl SeriesAssembler {
    /// `default_spacing` replaces any unknown spacing and must be strictly
    /// positive, otherwise 1.0 is used.
    pub fn new(default_spacing: f32, spacing_tolerance: f32) -> Self {
        SeriesAssembler {
            default_spacing: if is_valid_spacing(default_spacing) {
                default_spacing
            } else {
                1.0
            },
            spacing_tolerance: spacing_tolerance.max(0.0),
        }
    }

    /// Group, select, order and resolve spacing in one go.
    ///
    /// Returns `None` if there are no slices at all.
    pub fn assemble(
        &self,
        slices: Vec<Slice>,
        warnings: &mut Vec<LoadWarning>,
    ) -> Option<AssembledSeries> {
        let groups = Self::group(slices);
        let mut series = Self::select(groups, warnings)?;
        Self::order(&mut series);
        let (spacing, estimated) = self.infer_spacing(&series, warnings);
        debug!(
            series = series.label(),
            slices = series.len(),
            sort_by = ?series.sort_by(),
            ?spacing,
            "assembled series"
        );
        Some(AssembledSeries {
            series,
            spacing,
            estimated,
        })
    }

    /// Partition slices by series identifier, keeping groups and the slices
    /// within them in first-encountered order.
    pub fn group(slices: Vec<Slice>) -> Vec<Series> {
        let mut groups: Vec<Series> = Vec::new();
        let mut index: HashMap<Option<String>, usize> = HashMap::new();
        for slice in slices {
            let key = slice.series_uid.clone();
            let i = *index.entry(key.clone()).or_insert_with(|| {
                groups.push(Series::new(key));
                groups.len() - 1
            });
            groups[i].slices.push(slice);
        }
        groups
    }

    /// Pick the series with the most slices; on a tie the earlier group wins.
    pub fn select(mut groups: Vec<Series>, warnings: &mut Vec<LoadWarning>) -> Option<Series> {
        let (best, _) = groups
            .iter()
            .enumerate()
            .filter(|(_, series)| !series.is_empty())
            .fold(None, |best: Option<(usize, usize)>, (i, series)| match best {
                Some((_, len)) if len >= series.len() => best,
                _ => Some((i, series.len())),
            })?;
        let selected = groups.remove(best);
        for other in groups.iter().filter(|series| !series.is_empty()) {
            let warning = LoadWarning::DiscardedSeries {
                series: other.label().to_string(),
                slices: other.len(),
            };
            warn!("{warning}");
            warnings.push(warning);
        }
        Some(selected)
    }

    /// The most precise strategy whose fields every slice provides.
    fn ordering_strategy(slices: &[Slice]) -> SortBy {
        let positioned = slices
            .iter()
            .all(|slice| slice.image_position.is_some() && slice.normal().is_some());
        if positioned && !slices.is_empty() {
            SortBy::ImagePosition
        } else if slices.iter().all(|slice| slice.instance_number.is_some()) {
            SortBy::InstanceNumber
        } else {
            SortBy::EnumerationOrder
        }
    }

    /// Order the slices of `series` with one strategy for the whole series.
    ///
    /// Positions are projected onto the normal of the first slice. All sorts
    /// are stable, so equal keys keep enumeration order.
    pub fn order(series: &mut Series) {
        let sort_by = Self::ordering_strategy(&series.slices);
        match sort_by {
            SortBy::ImagePosition => {
                let normal = series.slices.first().and_then(Slice::normal);
                if let Some(normal) = normal {
                    let mut keyed: Vec<(f64, Slice)> = series
                        .slices
                        .drain(..)
                        .map(|slice| (slice.project(normal).unwrap_or_default(), slice))
                        .collect();
                    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
                    series.slices = keyed.into_iter().map(|(_, slice)| slice).collect();
                }
            }
            SortBy::InstanceNumber => series.slices.sort_by_key(|slice| slice.instance_number),
            SortBy::EnumerationOrder => {}
        }
        series.sort_by = sort_by;
    }

    fn in_plane_spacing(
        &self,
        series: &Series,
        warnings: &mut Vec<LoadWarning>,
    ) -> Option<(f32, f32)> {
        let valid = |&(row, column): &(f32, f32)| is_valid_spacing(row) && is_valid_spacing(column);
        let first = series
            .slices
            .iter()
            .find_map(|slice| slice.pixel_spacing.filter(valid))?;

        let other = series.slices.iter().find_map(|slice| {
            slice.pixel_spacing.filter(valid).filter(|other| {
                (other.0 - first.0).abs() > 1e-4 || (other.1 - first.1).abs() > 1e-4
            })
        });
        if let Some(other) = other {
            let warning = LoadWarning::InconsistentPixelSpacing { first, other };
            warn!("{warning}");
            warnings.push(warning);
        }
        Some(first)
    }

    /// Distances between consecutive slice positions: along the normal
    /// when ordered by position, else straight-line between neighbours.
    fn position_distances(series: &Series) -> Option<Vec<f32>> {
        if series.len() < 2 {
            return None;
        }
        let distances = if series.sort_by == SortBy::ImagePosition {
            let normal = series.slices.first()?.normal()?;
            let projections: Vec<f64> = series
                .slices
                .iter()
                .filter_map(|slice| slice.project(normal))
                .collect();
            projections
                .windows(2)
                .map(|pair| (pair[1] - pair[0]).abs() as f32)
                .collect()
        } else {
            let positions: Vec<[f64; 3]> = series
                .slices
                .iter()
                .map(|slice| slice.image_position)
                .collect::<Option<_>>()?;
            positions
                .windows(2)
                .map(|pair| {
                    let (a, b) = (pair[0], pair[1]);
                    let d = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
                    (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt() as f32
                })
                .collect()
        };
        Some(distances)
    }

    /// Median distance between consecutive slice positions.
    fn positional_spacing(&self, series: &Series, warnings: &mut Vec<LoadWarning>) -> Option<f32> {
        let mut distances = Self::position_distances(series)?;
        if distances.is_empty() {
            return None;
        }
        distances.sort_by(f32::total_cmp);

        let mid = distances.len() / 2;
        let median = if distances.len() % 2 == 0 {
            (distances[mid - 1] + distances[mid]) / 2.0
        } else {
            distances[mid]
        };
        if !is_valid_spacing(median) || median < 1e-6 {
            return None;
        }

        let (min, max) = (distances[0], distances[distances.len() - 1]);
        if max - min > self.spacing_tolerance * median {
            let warning = LoadWarning::NonUniformSpacing {
                min,
                max,
                used: median,
            };
            warn!("{warning}");
            warnings.push(warning);
        }
        Some(median)
    }

    fn tagged_slice_spacing(series: &Series) -> Option<f32> {
        series
            .slices
            .iter()
            .find_map(|slice| slice.spacing_between_slices.filter(|v| is_valid_spacing(*v)))
            .or_else(|| {
                series
                    .slices
                    .iter()
                    .find_map(|slice| slice.slice_thickness.filter(|v| is_valid_spacing(*v)))
            })
    }

    /// Resolve all three spacings of an ordered series, substituting the
    /// default for anything unknown and flagging it as estimated.
    pub fn infer_spacing(
        &self,
        series: &Series,
        warnings: &mut Vec<LoadWarning>,
    ) -> (Spacing, EstimatedSpacing) {
        let mut estimated = EstimatedSpacing::default();

        let (row, column) = match self.in_plane_spacing(series, warnings) {
            Some(spacing) => spacing,
            None => {
                estimated.row = true;
                estimated.column = true;
                (self.default_spacing, self.default_spacing)
            }
        };

        let slice = self
            .positional_spacing(series, warnings)
            .or_else(|| Self::tagged_slice_spacing(series))
            .unwrap_or_else(|| {
                estimated.slice = true;
                self.default_spacing
            });

        (Spacing::new(slice, row, column), estimated)
    }
}
