//! # DICOM-planes library
//!
//! This crate reconstructs a stack of DICOM images into a volume and renders
//! windowed cross-sections of it in the three medical axes:
//!  - Axial
//!  - Coronal
//!  - Sagittal
//!
//! A load accepts either a directory, where every regular file is attempted
//! and files that cannot be decoded are skipped, or a single (possibly
//! multi-frame) file. Slices are grouped by Series Instance UID and the
//! series with the most slices is displayed. Slices are ordered by their
//! image position projected onto the slice normal, falling back to the
//! instance number and finally to the enumeration order. Missing spacing is
//! replaced by 1.0 and reported as estimated in the [`VolumeSummary`].
//!
//! Every extracted plane carries its physical aspect ratio so that it can
//! be displayed without stretching, and is converted to 8-bit grayscale
//! with a window center/width, honouring MONOCHROME1 polarity.
//!
//! # Examples
//!
//! ## Rendering the middle coronal plane of a series
//!
//! ```no_run
//! # use dicom_planes::{CancelToken, Orientation, Session, VolumeLoader};
//! let outcome = VolumeLoader::default()
//!     .load("dicom", &CancelToken::new())
//!     .expect("should have loaded files from directory");
//! let mut session = Session::new(outcome);
//! let middle = session.extent(Orientation::Coronal) / 2;
//! let plane = session.render(Orientation::Coronal, middle, None);
//! plane.image.save("result.png").expect("should have saved the image");
//! ```
//!
//! ## Loading off the interactive thread
//!
//! ```no_run
//! # use dicom_planes::{LoadCoordinator, LoadOptions};
//! # async fn run() -> Result<(), dicom_planes::VolumeLoaderError> {
//! let coordinator = LoadCoordinator::new(LoadOptions::default());
//! let session = coordinator.load("dicom").await?;
//! println!("{:?}", session.summary());
//! # Ok(())
//! # }
//! ```

pub mod enums;
mod interpolator;
pub mod plane;
pub mod series;
pub mod session;
pub mod slice;
pub mod tag_reader;
pub mod volume;
pub mod volume_loader;
pub mod warning;
pub mod windowing;

pub use enums::{Interpolation, Orientation, Polarity, SortBy};
pub use plane::{PlaneDescriptor, PlaneExtractor};
pub use series::{AssembledSeries, Series, SeriesAssembler};
pub use session::{LoadCoordinator, PendingLoad, RenderedPlane, Session, WindowSource};
pub use slice::Slice;
pub use tag_reader::{DecodeError, DicomTagReader, TagReader};
pub use volume::{EstimatedSpacing, Spacing, Volume, VolumeSummary};
pub use volume_loader::{CancelToken, LoadOptions, LoadOutcome, VolumeLoader, VolumeLoaderError};
pub use warning::LoadWarning;
pub use windowing::{WindowSetting, WindowingEngine};
