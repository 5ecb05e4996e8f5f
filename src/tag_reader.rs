//! Decoding boundary: turns one file into one or more [`Slice`]s.

use std::path::{Path, PathBuf};

use dicom::core::Tag;
use dicom::object::{DefaultDicomObject, open_file};
use dicom::pixeldata::{ConvertOptions, PixelDecoder, PixelRepresentation, VoiLutOption};
use dicom_dictionary_std::tags;
use ndarray::{Array2, Array3, s};
use thiserror::Error;
use tracing::debug;

use crate::enums::Polarity;
use crate::slice::Slice;
use crate::windowing::WindowSetting;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("could not read {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: Box<dicom::object::ReadError>,
    },

    #[error("{} has no pixel data", path.display())]
    MissingPixelData { path: PathBuf },

    #[error("could not decode pixel data of {}: {source}", path.display())]
    Pixel {
        path: PathBuf,
        #[source]
        source: Box<dicom::pixeldata::Error>,
    },

    #[error("{} is not supported: {reason}", path.display())]
    Unsupported { path: PathBuf, reason: String },
}

impl DecodeError {
    pub fn path(&self) -> &Path {
        match self {
            DecodeError::Open { path, .. }
            | DecodeError::MissingPixelData { path }
            | DecodeError::Pixel { path, .. }
            | DecodeError::Unsupported { path, .. } => path,
        }
    }
}

/// Reads a file into slices, one per frame.
///
/// Implementations must be callable from several threads at once.
pub trait TagReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<Vec<Slice>, DecodeError>;
}

/// [`TagReader`] backed by the `dicom` crate.
///
/// Samples are returned after the modality rescale (slope/intercept) and
/// without any VOI transformation.
#[derive(Debug, Default, Clone, Copy)]
pub struct DicomTagReader;

impl DicomTagReader {
    fn string(obj: &DefaultDicomObject, tag: Tag) -> Option<String> {
        let value = obj.element(tag).ok()?.to_str().ok()?;
        let value = value.trim_matches(|c: char| c == '\0' || c.is_whitespace());
        (!value.is_empty()).then(|| value.to_string())
    }

    fn floats(obj: &DefaultDicomObject, tag: Tag) -> Option<Vec<f64>> {
        obj.element(tag).ok()?.to_multi_float64().ok()
    }

    fn float(obj: &DefaultDicomObject, tag: Tag) -> Option<f32> {
        Self::floats(obj, tag)?.first().map(|&v| v as f32)
    }

    fn pixel_spacing(obj: &DefaultDicomObject) -> Option<(f32, f32)> {
        match Self::floats(obj, tags::PIXEL_SPACING)?.as_slice() {
            [row, column, ..] => Some((*row as f32, *column as f32)),
            _ => None,
        }
    }

    fn position(obj: &DefaultDicomObject) -> Option<[f64; 3]> {
        match Self::floats(obj, tags::IMAGE_POSITION_PATIENT)?.as_slice() {
            [x, y, z, ..] => Some([*x, *y, *z]),
            _ => None,
        }
    }

    fn orientation(obj: &DefaultDicomObject) -> Option<[[f64; 3]; 2]> {
        match Self::floats(obj, tags::IMAGE_ORIENTATION_PATIENT)?.as_slice() {
            [rx, ry, rz, cx, cy, cz, ..] => Some([[*rx, *ry, *rz], [*cx, *cy, *cz]]),
            _ => None,
        }
    }

    fn window(obj: &DefaultDicomObject) -> Option<WindowSetting> {
        let center = Self::float(obj, tags::WINDOW_CENTER)?;
        let width = Self::float(obj, tags::WINDOW_WIDTH)?;
        Some(WindowSetting::new(center, width))
    }
}

impl TagReader for DicomTagReader {
    fn read(&self, path: &Path) -> Result<Vec<Slice>, DecodeError> {
        let obj = open_file(path).map_err(|source| DecodeError::Open {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        if obj.element(tags::PIXEL_DATA).is_err() {
            return Err(DecodeError::MissingPixelData {
                path: path.to_path_buf(),
            });
        }

        let pixel_error = |source: dicom::pixeldata::Error| DecodeError::Pixel {
            path: path.to_path_buf(),
            source: Box::new(source),
        };
        let pixel_data = obj.decode_pixel_data().map_err(pixel_error)?;
        if pixel_data.samples_per_pixel() != 1 {
            return Err(DecodeError::Unsupported {
                path: path.to_path_buf(),
                reason: format!("{} samples per pixel", pixel_data.samples_per_pixel()),
            });
        }

        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::Identity);
        let frames: Array3<f32> = pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .map_err(pixel_error)?
            .slice_move(s![.., .., .., 0]);
        let multi_frame = frames.dim().0 > 1;

        let polarity = Self::string(&obj, tags::PHOTOMETRIC_INTERPRETATION)
            .map(|pi| Polarity::from_photometric_interpretation(&pi))
            .unwrap_or_default();
        let template = Slice {
            series_uid: Self::string(&obj, tags::SERIES_INSTANCE_UID),
            pixel_spacing: Self::pixel_spacing(&obj),
            slice_thickness: Self::float(&obj, tags::SLICE_THICKNESS),
            spacing_between_slices: Self::float(&obj, tags::SPACING_BETWEEN_SLICES),
            // a single position cannot place every frame of a multi-frame file
            image_position: if multi_frame { None } else { Self::position(&obj) },
            image_orientation: Self::orientation(&obj),
            instance_number: if multi_frame {
                None
            } else {
                obj.element(tags::INSTANCE_NUMBER)
                    .ok()
                    .and_then(|e| e.to_int::<i32>().ok())
            },
            bits_stored: pixel_data.bits_stored(),
            signed: matches!(pixel_data.pixel_representation(), PixelRepresentation::Signed),
            polarity,
            window: Self::window(&obj),
            ..Slice::new(Array2::zeros((0, 0)), path)
        };
        debug!(
            path = %path.display(),
            frames = frames.dim().0,
            rows = frames.dim().1,
            columns = frames.dim().2,
            "decoded file"
        );

        Ok(frames
            .outer_iter()
            .enumerate()
            .map(|(i, frame)| Slice {
                pixels: frame.to_owned(),
                frame_index: i as u32,
                ..template.clone()
            })
            .collect())
    }
}
