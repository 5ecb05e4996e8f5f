use std::fmt;
use std::str::FromStr;

/// One of the three orthogonal anatomical planes through a volume.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    #[default]
    Axial,
    Coronal,
    Sagittal,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Axial,
        Orientation::Coronal,
        Orientation::Sagittal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Axial => "axial",
            Orientation::Coronal => "coronal",
            Orientation::Sagittal => "sagittal",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "axial" => Ok(Orientation::Axial),
            "coronal" => Ok(Orientation::Coronal),
            "sagittal" => Ok(Orientation::Sagittal),
            other => Err(format!(
                "unknown orientation `{other}` (expected axial, coronal or sagittal)"
            )),
        }
    }
}

/// Strategy used to order the slices of a series along the stacking axis.
///
/// A series is always ordered with a single strategy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    /// Image position projected onto the slice normal
    #[default]
    ImagePosition,
    InstanceNumber,
    /// Order in which files (or frames) were enumerated
    EnumerationOrder,
}

/// Whether increasing sample values display brighter or darker.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// MONOCHROME2: higher values are brighter
    #[default]
    Normal,
    /// MONOCHROME1: higher values are darker
    Inverted,
}

impl Polarity {
    pub fn from_photometric_interpretation(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("MONOCHROME1") {
            Polarity::Inverted
        } else {
            Polarity::Normal
        }
    }

    pub fn is_inverted(&self) -> bool {
        matches!(self, Polarity::Inverted)
    }
}

/// Sampling used when resampling a rendered plane to physical proportions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Bilinear,
    /// Nearest neighbour
    #[default]
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orientation_parses_case_insensitively() {
        assert_eq!("Coronal".parse::<Orientation>(), Ok(Orientation::Coronal));
        assert_eq!("SAGITTAL".parse::<Orientation>(), Ok(Orientation::Sagittal));
        assert!("oblique".parse::<Orientation>().is_err());
    }

    #[test]
    fn monochrome1_is_inverted() {
        assert_eq!(
            Polarity::from_photometric_interpretation("MONOCHROME1 "),
            Polarity::Inverted
        );
        assert_eq!(
            Polarity::from_photometric_interpretation("MONOCHROME2"),
            Polarity::Normal
        );
        assert_eq!(Polarity::from_photometric_interpretation(""), Polarity::Normal);
    }
}
