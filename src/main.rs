use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use serde::Serialize;
use simplelog::{Config, LevelFilter, WriteLogger};

use pdfpane::host::{HeadlessFullscreen, Host, StaticDevice};
use pdfpane::panic_handler::initialize_panic_handler;
use pdfpane::pdf::{
    ContainerSize, Direction, DocumentEngine, DocumentSource, MupdfEngine, OverlayLayer,
    SourceMode, Viewport, ViewerDisplay, ViewerSession,
};
use pdfpane::settings::{self, Settings};

/// How long a single load or render may take before the CLI gives up
const RENDER_TIMEOUT: Duration = Duration::from_secs(60);

/// Render PDF pages to a raster image plus text and link overlays.
#[derive(Debug, Parser)]
#[command(name = "pdfpane", about, version)]
struct Cli {
    /// Log verbosity
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    log_level: LogLevel,

    /// Log file
    #[arg(long, value_name = "FILE", default_value = "pdfpane.log", global = true)]
    log_file: PathBuf,

    /// Settings file (default: the user config directory)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print page count and first page size
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Render one page fitted to a container
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Page to render (1-based)
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Container width in pixels
        #[arg(long, default_value_t = 1024)]
        width: u32,

        /// Container height in pixels
        #[arg(long, default_value_t = 768)]
        height: u32,

        /// Fit the page as in fullscreen mode
        #[arg(long)]
        fullscreen: bool,

        /// Raster output
        #[arg(long, value_name = "PNG", default_value = "page.png")]
        out: PathBuf,

        /// Text and link overlay output
        #[arg(long, value_name = "JSON")]
        overlay: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Serialize)]
struct OverlayDump<'a> {
    page: usize,
    page_count: usize,
    scale: f32,
    viewport: Viewport,
    overlay: &'a OverlayLayer,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    WriteLogger::init(
        cli.log_level.into(),
        Config::default(),
        File::create(&cli.log_file)
            .with_context(|| format!("creating log file {}", cli.log_file.display()))?,
    )?;
    initialize_panic_handler();

    let settings = match &cli.config {
        Some(path) => settings::load_or_create(path),
        None => settings::load_settings(),
    };

    let result = match cli.command {
        Commands::Info { ref file } => run_info(file),
        Commands::Render {
            ref file,
            page,
            width,
            height,
            fullscreen,
            ref out,
            ref overlay,
        } => run_render(
            &settings,
            file,
            page,
            ContainerSize::new(width, height),
            fullscreen,
            out,
            overlay.as_deref(),
        ),
    };

    if let Err(err) = &result {
        error!("{err:?}");
    }
    result
}

fn run_info(file: &Path) -> Result<()> {
    let source = DocumentSource::from_path(file);
    let doc = MupdfEngine::new()
        .open(&source)
        .with_context(|| format!("opening {}", file.display()))?;

    println!("File:  {}", file.display());
    println!("Pages: {}", doc.page_count());
    if doc.page_count() > 0 {
        let size = doc.page(1)?.size();
        println!("Page 1: {:.1} x {:.1} pt", size.width, size.height);
    }
    Ok(())
}

fn run_render(
    settings: &Settings,
    file: &Path,
    page: usize,
    container: ContainerSize,
    fullscreen: bool,
    out: &Path,
    overlay_out: Option<&Path>,
) -> Result<()> {
    if page == 0 {
        bail!("pages are numbered from 1");
    }

    let fullscreen = if fullscreen {
        HeadlessFullscreen::default().active()
    } else {
        HeadlessFullscreen::default()
    };
    let host = Host::new(Box::new(fullscreen), Box::new(StaticDevice::default()));

    let mut session = ViewerSession::new(
        MupdfEngine::new(),
        SourceMode::Fixed(DocumentSource::from_path(file)),
        settings.session_config(),
        host,
    )
    .context("starting render worker")?;

    session.mount(container);
    settle(&mut session)?;

    while session.current_page() < page {
        let before = session.current_page();
        session.switch_page(Direction::Next);
        settle(&mut session)?;
        if session.current_page() == before {
            break;
        }
    }
    if session.current_page() != page {
        bail!(
            "page {page} is out of range, {} has {} pages",
            file.display(),
            session.page_count()
        );
    }

    let surfaces = session.surfaces();
    if surfaces.page != Some(page) || surfaces.raster.is_empty() {
        bail!("page {page} produced no image");
    }
    write_png(out, surfaces.raster.width, surfaces.raster.height, &surfaces.raster.pixels)?;
    info!(
        "Wrote page {page} at scale {:.3} to {}",
        session.scale(),
        out.display()
    );

    if let Some(path) = overlay_out {
        let dump = OverlayDump {
            page,
            page_count: session.page_count(),
            scale: session.scale(),
            viewport: Viewport {
                width: surfaces.overlay.width,
                height: surfaces.overlay.height,
                scale: session.scale(),
            },
            overlay: &surfaces.overlay,
        };
        let writer = BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        );
        serde_json::to_writer_pretty(writer, &dump).context("writing overlay")?;
    }

    println!(
        "{}: page {} of {} -> {}",
        file.display(),
        page,
        session.page_count(),
        out.display()
    );
    Ok(())
}

/// Pump the session until idle and fail on any error screen
fn settle(session: &mut ViewerSession) -> Result<()> {
    let _ = session.run_until_idle(RENDER_TIMEOUT);
    if session.is_busy() {
        bail!("timed out waiting for the renderer");
    }
    match session.display() {
        ViewerDisplay::Document => Ok(()),
        ViewerDisplay::FatalError { message } | ViewerDisplay::LoadFailure { message } => {
            bail!("{message}: {}", session.last_error().unwrap_or("unknown error"))
        }
        other => bail!("unexpected viewer state {other:?}"),
    }
}

fn write_png(path: &Path, width: u32, height: u32, rgb: &[u8]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().context("writing png header")?;
    writer.write_image_data(rgb).context("writing png data")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_render_with_defaults() {
        let cli = Cli::parse_from(["pdfpane", "render", "doc.pdf"]);
        match cli.command {
            Commands::Render {
                ref file,
                page,
                width,
                height,
                fullscreen,
                ref out,
                ref overlay,
            } => {
                assert_eq!(file, &PathBuf::from("doc.pdf"));
                assert_eq!(page, 1);
                assert_eq!((width, height), (1024, 768));
                assert!(!fullscreen);
                assert_eq!(out, &PathBuf::from("page.png"));
                assert!(overlay.is_none());
            }
            _ => panic!("expected Render subcommand"),
        }
        assert!(matches!(cli.log_level, LogLevel::Info));
    }

    #[test]
    fn parse_render_with_options() {
        let cli = Cli::parse_from([
            "pdfpane",
            "--log-level",
            "debug",
            "render",
            "doc.pdf",
            "--page",
            "3",
            "--fullscreen",
            "--overlay",
            "layers.json",
        ]);
        assert!(matches!(cli.log_level, LogLevel::Debug));
        match cli.command {
            Commands::Render {
                page,
                fullscreen,
                ref overlay,
                ..
            } => {
                assert_eq!(page, 3);
                assert!(fullscreen);
                assert_eq!(overlay.as_deref(), Some(Path::new("layers.json")));
            }
            _ => panic!("expected Render subcommand"),
        }
    }

    #[test]
    fn png_has_expected_size() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("out.png");
        write_png(&path, 2, 1, &[0, 0, 0, 255, 255, 255]).expect("png written");

        let decoder = png::Decoder::new(File::open(&path).expect("open png"));
        let reader = decoder.read_info().expect("png header");
        let info = reader.info();
        assert_eq!((info.width, info.height), (2, 1));
    }
}
