use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context as _;

use crate::foundation::error::{StickerError, StickerResult};

/// Why a sandbox render call failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SandboxFailure {
    /// No reply within the deadline. The session is unusable afterwards.
    Timeout(Duration),
    /// The session died or panicked. The session is unusable afterwards.
    Crashed(String),
    /// The document itself is invalid; retrying cannot help.
    BadDocument(String),
}

impl SandboxFailure {
    /// Return `true` when another attempt on a fresh session may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::BadDocument(_))
    }
}

impl fmt::Display for SandboxFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(d) => write!(f, "sandbox timed out after {d:?}"),
            Self::Crashed(m) => write!(f, "sandbox crashed: {m}"),
            Self::BadDocument(m) => write!(f, "invalid layout document: {m}"),
        }
    }
}

/// A long-lived rasterization session.
pub trait Sandbox: Send {
    /// Rasterize `document` into a straight-alpha RGBA image of exactly `width x height`,
    /// waiting at most `deadline`.
    fn render(
        &mut self,
        document: &str,
        width: u32,
        height: u32,
        deadline: Duration,
    ) -> Result<image::RgbaImage, SandboxFailure>;

    /// `false` once the session must not be reused.
    fn is_healthy(&self) -> bool;
}

/// Starts sandbox sessions. Launching is the expensive part; sessions are pooled.
pub trait SandboxLauncher: Send + Sync {
    /// Start a new session.
    fn launch(&self) -> StickerResult<Box<dyn Sandbox>>;

    /// Family name of the caption font every session has loaded, if known.
    fn font_family(&self) -> Option<String> {
        None
    }
}

/// Font sources registered with every SVG session.
#[derive(Clone, Debug, Default)]
pub struct FontSetup {
    /// Load the platform's installed fonts.
    pub system_fonts: bool,
    /// Font files to register.
    pub files: Vec<PathBuf>,
    /// Directories scanned for `.ttf`/`.otf`/`.ttc` files.
    pub dirs: Vec<PathBuf>,
}

impl FontSetup {
    /// Family of the first face of the first loadable file in `files`.
    ///
    /// Layouts must name this family exactly for the face to be selected.
    pub fn primary_family(&self) -> Option<String> {
        for file in &self.files {
            let mut db = usvg::fontdb::Database::new();
            if let Err(e) = db.load_font_file(file) {
                tracing::warn!(path = %file.display(), error = %e, "font file not readable");
                continue;
            }
            let family = db
                .faces()
                .next()
                .and_then(|face| face.families.first())
                .map(|(name, _)| name.clone());
            match family {
                Some(name) => return Some(name),
                None => tracing::warn!(path = %file.display(), "font file has no usable face"),
            }
        }
        None
    }
}

/// Launches [`SvgSandbox`] sessions.
#[derive(Clone, Debug, Default)]
pub struct SvgSandboxLauncher {
    fonts: Arc<FontSetup>,
    family: Option<String>,
}

impl SvgSandboxLauncher {
    /// Launcher registering `fonts` in every session.
    pub fn new(fonts: FontSetup) -> Self {
        let family = fonts.primary_family();
        if let Some(family) = &family {
            tracing::info!(family, "caption font loaded");
        }
        Self {
            fonts: Arc::new(fonts),
            family,
        }
    }
}

impl SandboxLauncher for SvgSandboxLauncher {
    fn launch(&self) -> StickerResult<Box<dyn Sandbox>> {
        Ok(Box::new(SvgSandbox::launch(Arc::clone(&self.fonts))?))
    }

    fn font_family(&self) -> Option<String> {
        self.family.clone()
    }
}

static SESSION_IDS: AtomicU64 = AtomicU64::new(1);

struct Job {
    document: String,
    width: u32,
    height: u32,
    reply: mpsc::Sender<Result<image::RgbaImage, SandboxFailure>>,
}

/// SVG engine session on a dedicated worker thread.
///
/// The worker owns the parser options and the loaded font database. Calls are handed over a
/// channel and awaited with a deadline, so a stuck or crashed render never blocks the caller past
/// the deadline; the session is then marked broken and left to finish on its own.
pub struct SvgSandbox {
    id: u64,
    jobs: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    broken: bool,
}

impl SvgSandbox {
    /// Spawn the worker and wait until its font database is loaded.
    pub fn launch(fonts: Arc<FontSetup>) -> StickerResult<Self> {
        let id = SESSION_IDS.fetch_add(1, Ordering::Relaxed);
        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::channel::<usize>();

        let worker = std::thread::Builder::new()
            .name(format!("stickerkit-sandbox-{id}"))
            .spawn(move || {
                let options = svg_options(&fonts);
                let _ = ready_tx.send(options.fontdb.len());
                drop(ready_tx);
                for job in jobs_rx {
                    let out = catch_unwind(AssertUnwindSafe(|| {
                        rasterize(&options, &job.document, job.width, job.height)
                    }));
                    match out {
                        Ok(result) => {
                            let _ = job.reply.send(result);
                        }
                        Err(_) => {
                            let _ = job
                                .reply
                                .send(Err(SandboxFailure::Crashed("render panicked".to_owned())));
                            return;
                        }
                    }
                }
            })
            .context("spawn sandbox worker")?;

        let faces = ready_rx
            .recv()
            .map_err(|_| StickerError::render("sandbox worker died during startup"))?;
        tracing::info!(session = id, faces, "sandbox session launched");
        Ok(Self {
            id,
            jobs: Some(jobs_tx),
            worker: Some(worker),
            broken: false,
        })
    }
}

impl Sandbox for SvgSandbox {
    fn render(
        &mut self,
        document: &str,
        width: u32,
        height: u32,
        deadline: Duration,
    ) -> Result<image::RgbaImage, SandboxFailure> {
        let Some(jobs) = self.jobs.as_ref().filter(|_| !self.broken) else {
            return Err(SandboxFailure::Crashed("session already broken".to_owned()));
        };
        let (reply_tx, reply_rx) = mpsc::channel();
        let job = Job {
            document: document.to_owned(),
            width,
            height,
            reply: reply_tx,
        };
        if jobs.send(job).is_err() {
            self.broken = true;
            return Err(SandboxFailure::Crashed("worker exited".to_owned()));
        }

        match reply_rx.recv_timeout(deadline) {
            Ok(Ok(img)) => Ok(img),
            Ok(Err(failure)) => {
                if matches!(failure, SandboxFailure::Crashed(_)) {
                    self.broken = true;
                }
                Err(failure)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                self.broken = true;
                tracing::warn!(session = self.id, ?deadline, "sandbox render timed out");
                Err(SandboxFailure::Timeout(deadline))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                self.broken = true;
                Err(SandboxFailure::Crashed("worker exited mid-render".to_owned()))
            }
        }
    }

    fn is_healthy(&self) -> bool {
        !self.broken
            && self.jobs.is_some()
            && self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }
}

impl Drop for SvgSandbox {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            // A broken worker may still be stuck in a render; leave it detached.
            if !self.broken {
                let _ = worker.join();
            }
        }
        tracing::debug!(session = self.id, broken = self.broken, "sandbox session closed");
    }
}

fn svg_options(fonts: &FontSetup) -> usvg::Options<'static> {
    let mut db = usvg::fontdb::Database::new();
    if fonts.system_fonts {
        db.load_system_fonts();
    }
    for dir in &fonts.dirs {
        load_fonts_from_dir(&mut db, dir);
    }
    for file in &fonts.files {
        if let Err(e) = db.load_font_file(file) {
            tracing::warn!(path = %file.display(), error = %e, "font file not loaded");
        }
    }
    usvg::Options {
        fontdb: Arc::new(db),
        font_resolver: font_resolver(),
        ..Default::default()
    }
}

fn load_fonts_from_dir(db: &mut usvg::fontdb::Database, dir: &std::path::Path) {
    let Ok(rd) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in rd.flatten() {
        let path = entry.path();
        let is_font = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
            .is_some_and(|ext| matches!(ext.as_str(), "ttf" | "otf" | "ttc"));
        if path.is_file() && is_font {
            let _ = db.load_font_file(&path);
        }
    }
}

// Requested family first, then generic fallbacks, then any face at all.
fn font_resolver() -> usvg::FontResolver<'static> {
    use usvg::FontResolver;

    FontResolver {
        select_font: Box::new(|font, fontdb| {
            let mut families = Vec::<usvg::fontdb::Family<'_>>::new();
            for family in font.families() {
                families.push(match family {
                    usvg::FontFamily::Serif => usvg::fontdb::Family::Serif,
                    usvg::FontFamily::SansSerif => usvg::fontdb::Family::SansSerif,
                    usvg::FontFamily::Cursive => usvg::fontdb::Family::Cursive,
                    usvg::FontFamily::Fantasy => usvg::fontdb::Family::Fantasy,
                    usvg::FontFamily::Monospace => usvg::fontdb::Family::Monospace,
                    usvg::FontFamily::Named(s) => usvg::fontdb::Family::Name(s),
                });
            }
            families.push(usvg::fontdb::Family::SansSerif);

            let query = usvg::fontdb::Query {
                families: &families,
                weight: usvg::fontdb::Weight(font.weight()),
                stretch: usvg::fontdb::Stretch::Normal,
                style: match font.style() {
                    usvg::FontStyle::Normal => usvg::fontdb::Style::Normal,
                    usvg::FontStyle::Italic => usvg::fontdb::Style::Italic,
                    usvg::FontStyle::Oblique => usvg::fontdb::Style::Oblique,
                },
            };
            fontdb
                .query(&query)
                .or_else(|| fontdb.faces().next().map(|f| f.id))
        }),
        select_fallback: FontResolver::default_fallback_selector(),
    }
}

fn rasterize(
    options: &usvg::Options<'static>,
    document: &str,
    width: u32,
    height: u32,
) -> Result<image::RgbaImage, SandboxFailure> {
    let tree = usvg::Tree::from_str(document, options)
        .map_err(|e| SandboxFailure::BadDocument(e.to_string()))?;
    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height).ok_or_else(|| {
        SandboxFailure::BadDocument(format!("cannot allocate {width}x{height} surface"))
    })?;

    let sx = width as f32 / tree.size().width();
    let sy = height as f32 / tree.size().height();
    let xform = resvg::tiny_skia::Transform::from_scale(sx, sy);
    resvg::render(&tree, xform, &mut pixmap.as_mut());

    let mut rgba = Vec::with_capacity(pixmap.data().len());
    for p in pixmap.pixels() {
        let c = p.demultiply();
        rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    image::RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| SandboxFailure::Crashed("surface size mismatch".to_owned()))
}

#[cfg(test)]
#[path = "../../tests/unit/render/sandbox.rs"]
mod tests;
