//! Per-load display state and the asynchronous load entry point.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::channel::oneshot;
use image::GrayImage;
use tracing::debug;

use crate::enums::{Interpolation, Orientation};
use crate::interpolator::Interpolator;
use crate::plane::{PlaneDescriptor, PlaneExtractor};
use crate::tag_reader::{DicomTagReader, TagReader};
use crate::volume::{Volume, VolumeSummary};
use crate::volume_loader::{CancelToken, LoadOptions, LoadOutcome, VolumeLoader, VolumeLoaderError};
use crate::warning::LoadWarning;
use crate::windowing::{WindowSetting, WindowingEngine};

/// Where the display window of a session came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSource {
    /// Set by the user
    Explicit,
    /// Read from the source attributes
    Hinted,
    /// Estimated from the samples of a displayed plane
    Derived,
}

/// A windowed plane ready to be painted.
#[derive(Debug, Clone)]
pub struct RenderedPlane {
    pub orientation: Orientation,
    /// Index after clamping
    pub index: usize,
    /// One pixel per sample, plane rows as image rows
    pub image: GrayImage,
    /// Physical width over height of a pixel
    pub aspect_ratio: f32,
    pub window: WindowSetting,
}

impl RenderedPlane {
    /// Resample the image so that its pixels are physically square.
    pub fn physical_image(&self, interpolation: Interpolation) -> GrayImage {
        let (columns, rows) = self.image.dimensions();
        let (width, height) =
            Interpolator::physical_dimensions(rows as usize, columns as usize, self.aspect_ratio);
        Interpolator::resample(&self.image, width, height, interpolation)
    }
}

/// Everything displayed for one load. Owns its volume exclusively.
#[derive(Debug)]
pub struct Session {
    source: PathBuf,
    volume: Volume,
    warnings: Vec<LoadWarning>,
    window: Option<(WindowSetting, WindowSource)>,
}

impl Session {
    pub fn new(outcome: LoadOutcome) -> Self {
        let LoadOutcome {
            source,
            volume,
            warnings,
        } = outcome;
        let window = volume.window_hint().map(|w| (w, WindowSource::Hinted));
        Session {
            source,
            volume,
            warnings,
            window,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    /// Number of planes available in `orientation`.
    pub fn extent(&self, orientation: Orientation) -> usize {
        PlaneExtractor::extent(&self.volume, orientation)
    }

    /// Window used when rendering without an explicit one, if resolved yet.
    pub fn window(&self) -> Option<WindowSetting> {
        self.window.map(|(w, _)| w)
    }

    pub fn window_source(&self) -> Option<WindowSource> {
        self.window.map(|(_, source)| source)
    }

    pub fn set_window(&mut self, window: WindowSetting) {
        self.window = Some((window, WindowSource::Explicit));
    }

    /// Drop a user or derived window, going back to the source hint.
    pub fn reset_window(&mut self) {
        self.window = self
            .volume
            .window_hint()
            .map(|w| (w, WindowSource::Hinted));
    }

    pub fn plane(&self, orientation: Orientation, index: usize) -> PlaneDescriptor<'_> {
        PlaneExtractor::extract(&self.volume, orientation, index)
    }

    /// Render a plane with `window`, or with the session window if `None`.
    ///
    /// When the session has no window yet, one is derived from the requested
    /// plane and kept for later renders.
    pub fn render(
        &mut self,
        orientation: Orientation,
        index: usize,
        window: Option<WindowSetting>,
    ) -> RenderedPlane {
        let window = match window {
            Some(window) => window,
            None => self.resolve_window(orientation, index),
        };
        self.render_with(orientation, index, window)
    }

    /// Render a plane with the given window without touching session state.
    pub fn render_with(
        &self,
        orientation: Orientation,
        index: usize,
        window: WindowSetting,
    ) -> RenderedPlane {
        let plane = self.plane(orientation, index);
        RenderedPlane {
            orientation,
            index: plane.index,
            image: WindowingEngine::apply(plane.pixels, window, self.volume.polarity()),
            aspect_ratio: plane.aspect_ratio,
            window,
        }
    }

    fn resolve_window(&mut self, orientation: Orientation, index: usize) -> WindowSetting {
        if let Some((window, _)) = self.window {
            return window;
        }
        let plane = PlaneExtractor::extract(&self.volume, orientation, index);
        let derived = WindowSetting::derive_from(plane.pixels);
        debug!(
            %orientation,
            index = plane.index,
            center = derived.center(),
            width = derived.width(),
            "derived display window"
        );
        self.window = Some((derived, WindowSource::Derived));
        derived
    }

    pub fn summary(&self) -> VolumeSummary {
        VolumeSummary {
            estimated_window: !matches!(
                self.window_source(),
                Some(WindowSource::Hinted | WindowSource::Explicit)
            ),
            ..self.volume.summary()
        }
    }
}

/// A load that has been started and may still be running.
pub struct PendingLoad {
    generation: u64,
    latest: Arc<AtomicU64>,
    receiver: oneshot::Receiver<Result<LoadOutcome, VolumeLoaderError>>,
}

impl PendingLoad {
    /// Whether no newer load was started since this one.
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::SeqCst) == self.generation
    }

    /// Wait for the load. A superseded load yields
    /// [`VolumeLoaderError::CancelledLoad`] whatever its own outcome.
    pub async fn finish(self) -> Result<Session, VolumeLoaderError> {
        let PendingLoad {
            generation,
            latest,
            receiver,
        } = self;
        let result = receiver
            .await
            .map_err(|_| VolumeLoaderError::CancelledLoad)?;
        if latest.load(Ordering::SeqCst) != generation {
            debug!(generation, "discarding superseded load");
            return Err(VolumeLoaderError::CancelledLoad);
        }
        result.map(Session::new)
    }
}

/// Runs loads off the calling thread, at most one of interest at a time.
pub struct LoadCoordinator<R = DicomTagReader> {
    loader: Arc<VolumeLoader<R>>,
    generation: Arc<AtomicU64>,
    current: Mutex<CancelToken>,
}

impl LoadCoordinator {
    pub fn new(options: LoadOptions) -> Self {
        Self::with_loader(VolumeLoader::new(options))
    }
}

impl<R: TagReader + 'static> LoadCoordinator<R> {
    pub fn with_loader(loader: VolumeLoader<R>) -> Self {
        LoadCoordinator {
            loader: Arc::new(loader),
            generation: Arc::new(AtomicU64::new(0)),
            current: Mutex::new(CancelToken::new()),
        }
    }

    /// Start loading `path` on the rayon pool, cancelling any earlier load.
    pub fn start(&self, path: impl Into<PathBuf>) -> PendingLoad {
        let path = path.into();
        let cancel = CancelToken::new();
        let previous = std::mem::replace(
            &mut *self.current.lock().unwrap_or_else(PoisonError::into_inner),
            cancel.clone(),
        );
        previous.cancel();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, path = %path.display(), "starting load");

        let (sender, receiver) = oneshot::channel();
        let loader = Arc::clone(&self.loader);
        rayon::spawn(move || {
            // the receiver may be gone already, nothing left to report to
            let _ = sender.send(loader.load(&path, &cancel));
        });

        PendingLoad {
            generation,
            latest: Arc::clone(&self.generation),
            receiver,
        }
    }

    /// Start loading `path` and wait for the result.
    pub async fn load(&self, path: impl Into<PathBuf>) -> Result<Session, VolumeLoaderError> {
        self.start(path).finish().await
    }

    /// Cancel the running load, if any, without starting a new one.
    pub fn cancel(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::Polarity;
    use crate::volume::Spacing;
    use crate::volume_loader::tests::{FakeReader, write};
    use ndarray::Array3;
    use tempfile::TempDir;

    fn session(volume: Volume) -> Session {
        Session::new(LoadOutcome {
            source: PathBuf::from("memory"),
            volume,
            warnings: Vec::new(),
        })
    }

    fn coordinator() -> LoadCoordinator<FakeReader> {
        LoadCoordinator::with_loader(VolumeLoader::with_reader(
            FakeReader,
            LoadOptions::default(),
        ))
    }

    fn ramp() -> Volume {
        let data = Array3::from_shape_fn((3, 4, 5), |(d, r, c)| (d * 100 + r * 10 + c) as f32);
        Volume::new(data, Spacing::new(2.0, 0.5, 0.5))
    }

    #[test]
    fn derived_window_is_kept_across_plane_changes() {
        let mut session = session(ramp());
        assert_eq!(session.window(), None);
        assert!(session.summary().estimated_window);

        let first = session.render(Orientation::Axial, 0, None);
        assert_eq!(first.window, WindowSetting::new(17.0, 34.0));
        assert_eq!(session.window_source(), Some(WindowSource::Derived));

        let other = session.render(Orientation::Sagittal, 4, None);
        assert_eq!(other.window, first.window);
        assert!(session.summary().estimated_window);
    }

    #[test]
    fn hinted_window_is_preferred() {
        let hint = WindowSetting::new(40.0, 400.0);
        let mut session = session(ramp().with_window_hint(Some(hint)));
        assert_eq!(session.render(Orientation::Coronal, 1, None).window, hint);
        assert_eq!(session.window_source(), Some(WindowSource::Hinted));
        assert!(!session.summary().estimated_window);
    }

    #[test]
    fn explicit_window_and_reset() {
        let mut session = session(ramp());
        session.set_window(WindowSetting::new(0.0, 10.0));
        assert_eq!(session.window_source(), Some(WindowSource::Explicit));
        assert!(!session.summary().estimated_window);
        let rendered = session.render(Orientation::Axial, 0, None);
        assert_eq!(rendered.image.get_pixel(4, 3).0[0], 255);

        session.reset_window();
        assert_eq!(session.window(), None);
    }

    #[test]
    fn render_reports_clamped_index_and_aspect() {
        let session = session(ramp());
        let rendered =
            session.render_with(Orientation::Coronal, 99, WindowSetting::new(150.0, 300.0));
        assert_eq!(rendered.index, 3);
        assert_eq!(rendered.aspect_ratio, 0.25);
        assert_eq!(rendered.image.dimensions(), (5, 3));
        assert_eq!(rendered.physical_image(Interpolation::None).dimensions(), (5, 12));
    }

    #[test]
    fn inverted_volume_renders_inverted() {
        let session = session(ramp().with_polarity(Polarity::Inverted));
        let rendered = session.render_with(Orientation::Axial, 0, WindowSetting::new(20.0, 40.0));
        assert_eq!(rendered.image.get_pixel(0, 0).0[0], 255);
    }

    #[tokio::test]
    async fn newer_load_supersedes_older_one() {
        let dir_a = TempDir::new().unwrap();
        write(dir_a.path(), "1", "series=a instance=1");
        let dir_b = TempDir::new().unwrap();
        write(dir_b.path(), "1", "series=b instance=1");
        write(dir_b.path(), "2", "series=b instance=2");

        let coordinator = coordinator();
        let first = coordinator.start(dir_a.path());
        let second = coordinator.start(dir_b.path());
        assert!(!first.is_current());
        assert!(second.is_current());

        assert!(matches!(first.finish().await, Err(VolumeLoaderError::CancelledLoad)));
        let session = second.finish().await.unwrap();
        assert_eq!(session.volume().series_uid(), Some("b"));
        assert_eq!(session.extent(Orientation::Axial), 2);
    }

    #[tokio::test]
    async fn load_errors_reach_the_caller() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "1", "broken");
        let coordinator = coordinator();
        let err = coordinator.load(dir.path()).await.unwrap_err();
        assert!(matches!(err, VolumeLoaderError::EmptySeries { .. }));
    }

    #[tokio::test]
    async fn cancel_discards_running_load() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "1", "series=a");
        let coordinator = coordinator();
        let pending = coordinator.start(dir.path());
        coordinator.cancel();
        assert!(matches!(pending.finish().await, Err(VolumeLoaderError::CancelledLoad)));
    }
}
