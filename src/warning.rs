use std::fmt;
use std::path::PathBuf;

/// A condition met while loading that does not prevent building a volume.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadWarning {
    /// A file could not be decoded and was skipped
    Decode { path: PathBuf, message: String },
    /// Slices disagree on photometric interpretation; the first one wins
    MixedPolarity { series: String },
    /// Distances between consecutive slice positions vary beyond tolerance
    NonUniformSpacing { min: f32, max: f32, used: f32 },
    /// Slices disagree on in-plane pixel spacing; the first one wins
    InconsistentPixelSpacing {
        first: (f32, f32),
        other: (f32, f32),
    },
    /// Another series was found next to the selected one and ignored
    DiscardedSeries { series: String, slices: usize },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadWarning::Decode { path, message } => {
                write!(f, "skipped {}: {message}", path.display())
            }
            LoadWarning::MixedPolarity { series } => write!(
                f,
                "series {series} mixes photometric interpretations, using the first slice's"
            ),
            LoadWarning::NonUniformSpacing { min, max, used } => write!(
                f,
                "slice spacing varies between {min:.3} and {max:.3}, using {used:.3}"
            ),
            LoadWarning::InconsistentPixelSpacing { first, other } => write!(
                f,
                "pixel spacing {:.3}/{:.3} differs from first slice's {:.3}/{:.3}",
                other.0, other.1, first.0, first.1
            ),
            LoadWarning::DiscardedSeries { series, slices } => {
                write!(f, "ignored series {series} with {slices} slice(s)")
            }
        }
    }
}
