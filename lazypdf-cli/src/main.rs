use std::cell::Cell;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture};
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use lazypdf_core::{Config, FitMode, FlowSurface, HostShell, Surface, ViewState, Viewer};
use lazypdf_render::PdfiumRenderFactory;
use lazypdf_tty::{
    compose, visible_pages, write_status_line, Action, EventMapper, KittyRenderer, TerminalLayout,
};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Poll interval while renders are outstanding.
const BUSY_POLL: Duration = Duration::from_millis(16);
const IDLE_POLL: Duration = Duration::from_millis(250);
/// Fraction of the viewport scrolled by page up / page down.
const PAGE_SCROLL: f32 = 0.9;

#[derive(Debug, Parser)]
#[command(
    name = "lazypdf",
    version,
    about = "Continuous-scroll PDF viewer for kitty-compatible terminals"
)]
struct Args {
    /// PDF file to open
    file: PathBuf,

    /// Page to open the document on (1-based)
    #[arg(short = 'p', long = "page")]
    page: Option<usize>,

    /// Show two pages per row
    #[arg(short = 'd', long = "double")]
    double: bool,

    /// Fit pages to the window `width` or `height`
    #[arg(short = 'f', long = "fit", default_value_t = FitMode::Width)]
    fit: FitMode,

    /// Zoom factor relative to the fitted size
    #[arg(short = 'z', long = "zoom", default_value_t = 1.0)]
    zoom: f32,

    /// Config file to use instead of the default location
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        crossterm::execute!(stdout, cursor::Hide, EnableMouseCapture)?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, DisableMouseCapture, cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

/// Terminal "fullscreen": the status row is hidden and the page flow takes every row.
#[derive(Default)]
struct TerminalShell {
    fullscreen: Cell<bool>,
    toggled: Cell<bool>,
}

impl TerminalShell {
    fn is_fullscreen(&self) -> bool {
        self.fullscreen.get()
    }

    fn take_toggle(&self) -> bool {
        self.toggled.replace(false)
    }
}

impl HostShell for TerminalShell {
    fn request_fullscreen_toggle(&self) {
        self.fullscreen.set(!self.fullscreen.get());
        self.toggled.set(true);
    }
}

enum LoopAction {
    Continue,
    ContinueRedraw,
    Relayout,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load_or_default(args.config.as_deref())?;

    let project_dirs =
        Config::project_dirs().ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs, &config.log_filter)?;
    info!(file = ?args.file, "starting lazypdf");

    let provider = PdfiumRenderFactory::new(config.pdfium_library.as_deref())?;

    let _raw = RawModeGuard::new()?;
    let host = TerminalShell::default();
    let mut layout = TerminalLayout::new(terminal::window_size()?, !host.is_fullscreen());

    let view = ViewState::new(args.fit, args.zoom, args.double);
    let mut viewer =
        Viewer::new(FlowSurface::new(layout.viewport()), &config).with_initial_view(view);
    if viewer.open(&provider, &args.file).await.is_ok() {
        if let Some(page) = args.page {
            viewer.go_to_page(page);
        }
    }

    let mut renderer = KittyRenderer::new(io::stdout());
    let mut event_mapper = EventMapper::new();
    let mut dirty = true;
    let mut last_status = String::new();
    renderer.clear_all()?;

    loop {
        if host.take_toggle() {
            layout = TerminalLayout::new(terminal::window_size()?, !host.is_fullscreen());
            viewer.viewport_changed(layout.viewport());
            renderer.clear_all()?;
            dirty = true;
        }

        let now = Instant::now();
        viewer.on_frame(now);
        if !viewer.drain_events().is_empty() {
            dirty = true;
        }

        if dirty {
            redraw(&mut renderer, &viewer, &layout)?;
            dirty = false;
            last_status.clear();
        }
        let status = status_text(&viewer, event_mapper.pending_input(), now);
        if status != last_status {
            draw_status_line(&mut renderer, &layout, &status)?;
            last_status = status;
        }

        let idle = if viewer.has_pending_renders() {
            BUSY_POLL
        } else {
            IDLE_POLL
        };
        let timeout = viewer
            .next_deadline(Instant::now())
            .map_or(idle, |deadline| deadline.min(idle));
        if !event::poll(timeout)? {
            continue;
        }

        let action = event_mapper.map_event(event::read()?);
        match handle_action(action, &mut viewer, &host, &config) {
            LoopAction::Continue => {}
            LoopAction::ContinueRedraw => dirty = true,
            LoopAction::Relayout => {
                layout = TerminalLayout::new(terminal::window_size()?, !host.is_fullscreen());
                viewer.viewport_changed(layout.viewport());
                renderer.clear_all()?;
                dirty = true;
            }
            LoopAction::Quit => break,
        }
    }

    viewer.close();
    renderer.delete_image()?;
    renderer.clear_all()?;
    info!("exiting");
    Ok(())
}

fn handle_action(
    action: Action,
    viewer: &mut Viewer<FlowSurface>,
    host: &TerminalShell,
    config: &Config,
) -> LoopAction {
    let changed = match action {
        Action::Scroll { dx, dy } => {
            let step = config.scroll_step_px;
            viewer.surface_mut().scroll_by(dx * step, dy * step);
            true
        }
        Action::ScrollPages(pages) => {
            let height = viewer.surface().viewport().height;
            viewer
                .surface_mut()
                .scroll_by(0.0, pages * height * PAGE_SCROLL);
            true
        }
        Action::GoToPage(page) => viewer.go_to_page(page),
        Action::GoToLastPage => {
            let last = viewer.page_count();
            viewer.go_to_page(last)
        }
        Action::ZoomIn => viewer.zoom_in(),
        Action::ZoomOut => viewer.zoom_out(),
        Action::ResetZoom => viewer.reset_zoom(),
        Action::ToggleFit => viewer.toggle_fit_mode(),
        Action::ToggleDoublePage => viewer.toggle_double_page(),
        Action::ToggleFullscreen => {
            viewer.toggle_fullscreen(host);
            false
        }
        Action::Resize { columns, rows } => {
            debug!(columns, rows, "terminal resized");
            return LoopAction::Relayout;
        }
        Action::Quit => return LoopAction::Quit,
        Action::None => false,
    };
    if changed {
        LoopAction::ContinueRedraw
    } else {
        LoopAction::Continue
    }
}

fn redraw(
    renderer: &mut KittyRenderer<io::Stdout>,
    viewer: &Viewer<FlowSurface>,
    layout: &TerminalLayout,
) -> Result<()> {
    renderer.begin_sync_update()?;

    if let Some(message) = viewer.load_error() {
        let row = layout.image_rows() / 2;
        let text: String = message.chars().take(layout.columns as usize).collect();
        let writer = renderer.writer();
        crossterm::queue!(
            writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, row),
            Print(text)
        )?;
    } else {
        let surface = viewer.surface();
        let pages = visible_pages(surface, |index| viewer.page(index).and_then(|page| page.image));
        let scroll = surface.scroll_offset();
        let viewport = surface.viewport();
        let frame = compose(
            viewport.width as u32,
            viewport.height as u32,
            (scroll.x, scroll.y),
            &pages,
        );
        crossterm::queue!(renderer.writer(), cursor::MoveTo(0, 0))?;
        if let Err(err) = renderer.draw(&frame, layout.draw_params()) {
            warn!(error = %err, "failed to draw frame");
        }
    }

    renderer.end_sync_update()
}

fn draw_status_line(
    renderer: &mut KittyRenderer<io::Stdout>,
    layout: &TerminalLayout,
    status: &str,
) -> Result<()> {
    let Some(row) = layout.status_row else {
        return Ok(());
    };
    let writer = renderer.writer();
    crossterm::queue!(
        writer,
        cursor::MoveTo(0, row),
        Clear(ClearType::CurrentLine),
        SetAttribute(Attribute::Reverse)
    )?;
    write_status_line(writer, status, layout.columns)?;
    crossterm::execute!(writer, SetAttribute(Attribute::Reset))?;
    Ok(())
}

fn status_text(viewer: &Viewer<FlowSurface>, pending: Option<&str>, now: Instant) -> String {
    let mut parts = Vec::new();
    if let Some(info) = viewer.document_info() {
        let name = info.title.clone().unwrap_or_else(|| {
            info.path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        parts.push(name);
        if let Some(page) = viewer.current_page() {
            parts.push(format!("{}/{}", page, viewer.page_count()));
        }
    }
    parts.push(viewer.status(now));
    if let Some(pending) = pending {
        parts.push(pending.to_string());
    }
    parts.join(" | ")
}

fn init_logging(project_dirs: &ProjectDirs, default_filter: &str) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {:?}", log_dir))?;

    let file_appender = tracing_appender::rolling::never(log_dir, "lazypdf.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .with_context(|| format!("invalid log filter {:?}", default_filter))?,
    };

    // the terminal belongs to the viewer, so logs only go to the file
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
