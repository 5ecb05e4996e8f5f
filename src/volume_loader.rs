use crate::series::SeriesAssembler;
use crate::slice::Slice;
use crate::tag_reader::{DecodeError, DicomTagReader, TagReader};
use crate::volume::Volume;
use crate::warning::LoadWarning;

use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use web_time::Instant;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("no decodable images found in {}", path.display())]
    EmptySeries { path: PathBuf },

    #[error(
        "inconsistent geometry in series {series}: {} is {}x{}, expected {}x{}",
        path.display(), found.0, found.1, expected.0, expected.1
    )]
    InconsistentGeometry {
        series: String,
        path: PathBuf,
        /// (rows, columns) of the first slice
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("load superseded by a newer one")]
    CancelledLoad,

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Options controlling how an input path is turned into a volume.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    recursive: bool,
    extensions: Option<Vec<String>>,
    default_spacing: f32,
    spacing_tolerance: f32,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            recursive: true,
            extensions: None,
            default_spacing: 1.0,
            spacing_tolerance: 0.01,
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether sub-directories are searched as well.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Only attempt files with one of these extensions (case insensitive).
    /// By default every regular file is attempted.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = Some(extensions.into_iter().map(Into::into).collect());
        self
    }

    /// Spacing substituted when none can be found. Ignored unless strictly
    /// positive.
    pub fn default_spacing(mut self, spacing: f32) -> Self {
        if spacing.is_finite() && spacing > 0.0 {
            self.default_spacing = spacing;
        }
        self
    }

    /// Relative spread of slice distances tolerated without a warning.
    pub fn spacing_tolerance(mut self, tolerance: f32) -> Self {
        self.spacing_tolerance = tolerance.max(0.0);
        self
    }

    fn accepts(&self, path: &Path) -> bool {
        match &self.extensions {
            None => true,
            Some(extensions) => path
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e))),
        }
    }
}

/// Cooperative cancellation flag shared between a load and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a successful load.
#[derive(Debug)]
pub struct LoadOutcome {
    pub source: PathBuf,
    pub volume: Volume,
    pub warnings: Vec<LoadWarning>,
}

pub struct VolumeLoader<R = DicomTagReader> {
    reader: R,
    options: LoadOptions,
}

impl Default for VolumeLoader {
    fn default() -> Self {
        Self::new(LoadOptions::default())
    }
}

impl VolumeLoader {
    pub fn new(options: LoadOptions) -> Self {
        Self::with_reader(DicomTagReader, options)
    }
}

impl<R: TagReader> VolumeLoader<R> {
    pub fn with_reader(reader: R, options: LoadOptions) -> Self {
        VolumeLoader { reader, options }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Load a volume from a directory of single-slice files or from one
    /// (possibly multi-frame) file.
    ///
    /// # Errors
    ///
    /// Files that fail to decode inside a directory are skipped and reported
    /// as [`LoadWarning::Decode`]; the load only fails if nothing usable
    /// remains, the selected series has inconsistent dimensions, `cancel` is
    /// triggered, or `path` cannot be read.
    pub fn load(
        &self,
        path: impl AsRef<Path>,
        cancel: &CancelToken,
    ) -> Result<LoadOutcome, VolumeLoaderError> {
        let path = path.as_ref();
        let start = Instant::now();
        let mut warnings = Vec::new();

        let metadata = fs::metadata(path).map_err(|source| VolumeLoaderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let slices = if metadata.is_dir() {
            self.read_directory(path, cancel, &mut warnings)?
        } else {
            self.read_file(path, cancel)?
        };

        let assembler =
            SeriesAssembler::new(self.options.default_spacing, self.options.spacing_tolerance);
        let assembled = assembler
            .assemble(slices, &mut warnings)
            .ok_or_else(|| VolumeLoaderError::EmptySeries {
                path: path.to_path_buf(),
            })?;
        let volume = Volume::from_series(assembled, &mut warnings)?;

        if cancel.is_cancelled() {
            return Err(VolumeLoaderError::CancelledLoad);
        }

        info!(
            path = %path.display(),
            dim = ?volume.dim(),
            spacing = ?volume.spacing(),
            warnings = warnings.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "loaded volume"
        );
        Ok(LoadOutcome {
            source: path.to_path_buf(),
            volume,
            warnings,
        })
    }

    /// Regular files below `dir` accepted by the options, sorted by path.
    ///
    /// Symbolic links are not followed.
    pub fn collect_files(&self, dir: &Path) -> Result<Vec<PathBuf>, VolumeLoaderError> {
        let max_depth = if self.options.recursive { usize::MAX } else { 1 };
        let mut files = Vec::new();

        for entry in WalkDir::new(dir).follow_links(false).max_depth(max_depth) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    let message = e.to_string();
                    return Err(VolumeLoaderError::Io {
                        path: dir.to_path_buf(),
                        source: e
                            .into_io_error()
                            .unwrap_or_else(|| io::Error::other(message)),
                    });
                }
                Err(e) => {
                    warn!("skipping {}: {e}", e.path().unwrap_or(dir).display());
                    continue;
                }
            };
            if entry.file_type().is_file() && self.options.accepts(entry.path()) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        Ok(files)
    }

    fn read_directory(
        &self,
        dir: &Path,
        cancel: &CancelToken,
        warnings: &mut Vec<LoadWarning>,
    ) -> Result<Vec<Slice>, VolumeLoaderError> {
        let paths = self.collect_files(dir)?;
        debug!(dir = %dir.display(), files = paths.len(), "decoding directory");

        let results: Vec<Option<Result<Vec<Slice>, DecodeError>>> = paths
            .par_iter()
            .map(|path| (!cancel.is_cancelled()).then(|| self.reader.read(path)))
            .collect();
        if cancel.is_cancelled() {
            return Err(VolumeLoaderError::CancelledLoad);
        }

        let mut slices = Vec::new();
        for result in results.into_iter().flatten() {
            match result {
                Ok(decoded) => slices.extend(decoded),
                Err(e) => {
                    warn!("{e}");
                    warnings.push(LoadWarning::Decode {
                        path: e.path().to_path_buf(),
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(slices)
    }

    fn read_file(
        &self,
        path: &Path,
        cancel: &CancelToken,
    ) -> Result<Vec<Slice>, VolumeLoaderError> {
        if cancel.is_cancelled() {
            return Err(VolumeLoaderError::CancelledLoad);
        }
        Ok(self.reader.read(path)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::enums::{Orientation, SortBy};
    use crate::plane::PlaneExtractor;
    use ndarray::Array2;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    /// Reads files of whitespace separated `key=value` pairs, e.g.
    /// `series=a instance=2 value=7`. Files containing `broken` fail.
    #[derive(Debug, Default, Clone, Copy)]
    pub(crate) struct FakeReader;

    impl TagReader for FakeReader {
        fn read(&self, path: &Path) -> Result<Vec<Slice>, DecodeError> {
            let text = fs::read_to_string(path).unwrap();
            if text.contains("broken") {
                return Err(DecodeError::Unsupported {
                    path: path.to_path_buf(),
                    reason: "broken fixture".into(),
                });
            }
            let mut size = (2, 2);
            let mut value = 0.0;
            let mut slice = Slice::new(Array2::zeros((0, 0)), path);
            for pair in text.split_whitespace() {
                let (key, v) = pair.split_once('=').unwrap();
                match key {
                    "series" => slice.series_uid = Some(v.to_string()),
                    "instance" => slice.instance_number = Some(v.parse().unwrap()),
                    "value" => value = v.parse().unwrap(),
                    "rows" => size.0 = v.parse().unwrap(),
                    "thickness" => slice.slice_thickness = Some(v.parse().unwrap()),
                    _ => panic!("unknown key {key}"),
                }
            }
            slice.pixels = Array2::from_elem(size, value);
            Ok(vec![slice])
        }
    }

    pub(crate) fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(&path)
            .unwrap()
            .write_all(content.as_bytes())
            .unwrap();
        path
    }

    fn loader() -> VolumeLoader<FakeReader> {
        VolumeLoader::with_reader(FakeReader, LoadOptions::default())
    }

    #[test]
    fn undecodable_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a", "series=s instance=2 value=20");
        write(dir.path(), "b", "broken");
        write(dir.path(), "c", "series=s instance=1 value=10");

        let outcome = loader().load(dir.path(), &CancelToken::new()).unwrap();
        assert_eq!(outcome.volume.dim(), (2, 2, 2));
        assert_eq!(outcome.volume.sort_by(), SortBy::InstanceNumber);
        let first = PlaneExtractor::extract(&outcome.volume, Orientation::Axial, 0);
        assert_eq!(first.pixels[[0, 0]], 10.);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(matches!(
            &outcome.warnings[0],
            LoadWarning::Decode { path, .. } if path.ends_with("b")
        ));
    }

    #[test]
    fn nothing_decodable_is_an_empty_series() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a", "broken");
        let err = loader().load(dir.path(), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, VolumeLoaderError::EmptySeries { .. }));
        assert!(err.to_string().contains(&dir.path().display().to_string()));

        let empty = TempDir::new().unwrap();
        let err = loader().load(empty.path(), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, VolumeLoaderError::EmptySeries { .. }));
    }

    #[test]
    fn largest_series_in_directory_wins() {
        let dir = TempDir::new().unwrap();
        for (series, count) in [("a", 3), ("b", 7), ("c", 5)] {
            for i in 0..count {
                write(
                    dir.path(),
                    &format!("{series}{i:02}"),
                    &format!("series={series} instance={i} value={i}"),
                );
            }
        }
        let outcome = loader().load(dir.path(), &CancelToken::new()).unwrap();
        assert_eq!(outcome.volume.series_uid(), Some("b"));
        assert_eq!(outcome.volume.dim().0, 7);
        let discarded = outcome
            .warnings
            .iter()
            .filter(|w| matches!(w, LoadWarning::DiscardedSeries { .. }))
            .count();
        assert_eq!(discarded, 2);
    }

    #[test]
    fn mismatched_slice_sizes_fail_the_load() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a", "series=s instance=1");
        write(dir.path(), "b", "series=s instance=2 rows=3");
        let err = loader().load(dir.path(), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, VolumeLoaderError::InconsistentGeometry { .. }));
        assert!(err.to_string().contains("series s"));
    }

    #[test]
    fn recursion_and_extensions_are_configurable() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "top.dcm", "value=1");
        write(dir.path(), "notes.txt", "value=2");
        write(dir.path(), "nested/deep.DCM", "value=3");

        let all = loader().collect_files(dir.path()).unwrap();
        assert_eq!(all.len(), 3);

        let flat = VolumeLoader::with_reader(FakeReader, LoadOptions::new().recursive(false))
            .collect_files(dir.path())
            .unwrap();
        assert_eq!(flat.len(), 2);

        let dicom_only =
            VolumeLoader::with_reader(FakeReader, LoadOptions::new().with_extensions(["dcm"]))
                .collect_files(dir.path())
                .unwrap();
        assert_eq!(dicom_only.len(), 2);
        assert!(dicom_only.iter().all(|p| !p.ends_with("notes.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_not_followed() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a", "series=s instance=1");
        write(dir.path(), "b", "series=s instance=2");
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();

        let files = loader().collect_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        let outcome = loader().load(dir.path(), &CancelToken::new()).unwrap();
        assert_eq!(outcome.volume.dim().0, 2);
    }

    #[test]
    fn missing_directory_is_fatal_for_collection() {
        let dir = TempDir::new().unwrap();
        let err = loader().collect_files(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, VolumeLoaderError::Io { .. }));
    }

    #[test]
    fn cancelled_load_is_reported() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a", "value=1");
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = loader().load(dir.path(), &cancel).unwrap_err();
        assert!(matches!(err, VolumeLoaderError::CancelledLoad));
    }

    #[test]
    fn single_file_decode_error_is_fatal() {
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "a", "broken");
        let err = loader().load(&file, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, VolumeLoaderError::Decode(_)));
    }

    #[test]
    fn missing_path_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let err = loader()
            .load(dir.path().join("missing"), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, VolumeLoaderError::Io { .. }));
    }

    #[test]
    fn default_spacing_is_configurable() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a", "value=1");
        let loader = VolumeLoader::with_reader(FakeReader, LoadOptions::new().default_spacing(0.5));
        let outcome = loader.load(dir.path(), &CancelToken::new()).unwrap();
        assert_eq!(outcome.volume.spacing().row, 0.5);
        assert!(outcome.volume.estimated_spacing().all());
    }
}
