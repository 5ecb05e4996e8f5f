//! Render one plane of a DICOM series to an image file.
use std::path::PathBuf;

use clap::Parser;
use dicom_planes::{Interpolation, LoadCoordinator, LoadOptions, Orientation, WindowSetting};
use tracing::{Level, error, info, warn};

/// Render a windowed plane of a DICOM series or multi-frame file
#[derive(Debug, Parser)]
struct App {
    /// Directory holding a series, or a single (multi-frame) file
    path: PathBuf,

    /// Plane to render: axial, coronal or sagittal
    #[arg(short = 'O', long = "orientation", default_value = "axial")]
    orientation: Orientation,

    /// Plane index, 0-indexed (default is the middle plane)
    #[arg(short = 'i', long = "index")]
    index: Option<usize>,

    /// Window center (default from the file, or estimated)
    #[arg(short = 'c', long = "center", requires = "width", allow_negative_numbers = true)]
    center: Option<f32>,

    /// Window width
    #[arg(short = 'w', long = "width", requires = "center")]
    width: Option<f32>,

    /// Path to the output image
    /// (default is the input path with a `.png` extension)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Resample the output to true physical proportions
    #[arg(long = "physical")]
    physical: bool,

    /// Use bilinear instead of nearest sampling with `--physical`
    #[arg(long = "bilinear", requires = "physical")]
    bilinear: bool,

    /// Do not search sub-directories
    #[arg(long = "no-recursive")]
    no_recursive: bool,

    /// Print more information about the volume
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let App {
        path,
        orientation,
        index,
        center,
        width,
        output,
        physical,
        bilinear,
        no_recursive,
        verbose,
    } = App::parse();

    if let Err(e) = tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
            .finish(),
    ) {
        eprintln!("[ERROR] Could not set up global logging subscriber: {e}");
    }

    let output = output.unwrap_or_else(|| {
        let mut path = path.clone();
        path.set_extension("png");
        path
    });

    let coordinator = LoadCoordinator::new(LoadOptions::new().recursive(!no_recursive));
    let mut session = coordinator.load(&path).await.unwrap_or_else(|e| {
        error!("{e}");
        std::process::exit(-1);
    });

    for warning in session.warnings() {
        warn!("{warning}");
    }
    let summary = session.summary();
    if summary.estimated_spacing.any() {
        warn!("spacing partly estimated: {:?}", summary.estimated_spacing);
    }
    if verbose {
        println!(
            "{}x{}x{} volume, spacing {:.3}/{:.3}/{:.3}, {:?}, ordered by {:?}",
            summary.dim.0,
            summary.dim.1,
            summary.dim.2,
            summary.spacing.slice,
            summary.spacing.row,
            summary.spacing.column,
            summary.polarity,
            summary.sort_by,
        );
    }

    let window = center.zip(width).map(|(c, w)| WindowSetting::new(c, w));
    let index = index.unwrap_or_else(|| session.extent(orientation) / 2);
    let rendered = session.render(orientation, index, window);
    if session.summary().estimated_window && window.is_none() {
        info!(
            "no window in source, estimated center {:.1} width {:.1}",
            rendered.window.center(),
            rendered.window.width()
        );
    }

    let image = if physical {
        let interpolation = if bilinear {
            Interpolation::Bilinear
        } else {
            Interpolation::None
        };
        rendered.physical_image(interpolation)
    } else {
        rendered.image
    };

    image.save(&output).unwrap_or_else(|e| {
        error!("{e}");
        std::process::exit(-2);
    });

    if verbose {
        println!(
            "{orientation} plane {} saved to {}",
            rendered.index,
            output.display()
        );
    }
}
