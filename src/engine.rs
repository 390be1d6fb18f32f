//! Request-serving façade.
//!
//! An [`Engine`] owns everything a request needs: the read-only catalogue (through the
//! [`Resolver`]), the render cache, the asset fetcher and the pooled renderer. It is `Sync` and is
//! meant to be shared by every request thread behind an `Arc`.

use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;

use crate::cache::{Fingerprint, RenderCache};
use crate::catalogue::{
    AssetCatalogue, CatalogueSource, CharacterSummary, MissingImages, TemplateMetadata,
    load_manifest_bytes,
};
use crate::config::EngineConfig;
use crate::fetch::{AssetFetcher, HttpFetcher, ResourceFetcher};
use crate::foundation::error::{StickerError, StickerResult};
use crate::render::{FontSetup, Renderer, SandboxLauncher, SvgSandboxLauncher, encode_png};
use crate::resolve::{CompositionRequest, Overrides, RawId, Resolver};

/// A rendered sticker and what produced it.
#[derive(Clone, Debug)]
pub struct Sticker {
    /// The fully resolved request.
    pub request: CompositionRequest,
    /// Cache key of the request.
    pub fingerprint: Fingerprint,
    /// PNG bytes, shared with the cache.
    pub png: Arc<Vec<u8>>,
}

/// Structured request from the command layer.
#[derive(Clone, Debug, PartialEq)]
pub enum Intent {
    /// Render a sticker.
    Generate {
        /// Sticker id or `random`.
        raw_id: RawId,
        /// Caption; `None` takes the template default.
        text: Option<String>,
        /// Textual parameter overrides.
        overrides: Overrides,
    },
    /// List characters, or one character's sticker ids.
    List {
        /// Restrict to one character.
        character: Option<String>,
    },
    /// Render a preview sheet of all characters, or of one character's stickers.
    Preview {
        /// Restrict to one character.
        character: Option<String>,
    },
}

/// Result handed back to the command layer. Errors are values, never panics.
#[derive(Clone, Debug)]
pub enum Outcome {
    /// PNG bytes.
    Image(Arc<Vec<u8>>),
    /// Characters with their sticker ids, in catalogue order.
    Listing(Vec<CharacterSummary>),
    /// The request failed.
    Failed(StickerError),
}

/// Asset prefetch summary.
#[derive(Debug, Default)]
pub struct PrefetchReport {
    /// Images already on disk.
    pub already_local: usize,
    /// Images downloaded now.
    pub fetched: usize,
    /// Images that could not be downloaded.
    pub failed: Vec<(String, StickerError)>,
}

/// The sticker engine.
pub struct Engine {
    config: EngineConfig,
    resolver: Resolver,
    cache: RenderCache,
    fetcher: AssetFetcher,
    font_fetcher: AssetFetcher,
    renderer: Renderer,
}

/// Remote directory holding the caption font, relative to each repository prefix.
const REMOTE_FONT_DIR: &str = "fonts/";

impl Engine {
    /// Assemble an engine from explicit parts.
    pub fn new(
        config: EngineConfig,
        catalogue: Arc<AssetCatalogue>,
        transport: Arc<dyn ResourceFetcher>,
        launcher: Arc<dyn SandboxLauncher>,
    ) -> StickerResult<Self> {
        config.validate()?;
        let font_fetcher = font_fetcher(&config, Arc::clone(&transport))?;
        let fetcher = AssetFetcher::new(
            transport,
            config.asset_prefixes.clone(),
            config.fetch_policy()?,
            config.resource_dir(),
        );
        let cache = RenderCache::open(
            config.cache_dir(),
            config.cache_enabled,
            config.clear_cache_on_start,
        )?;
        let font_family = launcher
            .font_family()
            .unwrap_or_else(|| config.font_family.clone());
        let renderer = Renderer::new(
            launcher,
            config.sandbox_pool_size,
            config.render_policy()?,
            font_family,
        );
        let resolver = Resolver::from_config(catalogue, &config);
        Ok(Self {
            config,
            resolver,
            cache,
            fetcher,
            font_fetcher,
            renderer,
        })
    }

    /// Build the production engine: HTTP transport, SVG sandbox sessions, the manifest refreshed
    /// from the mirrors (or read from `config.manifest`) and the caption font.
    ///
    /// The caption font is `config.font_path`, or `font_file` fetched from the font repository
    /// into `fonts/`. A font that cannot be provisioned is logged and the layout falls back to
    /// `config.font_family`.
    pub fn bootstrap(config: EngineConfig) -> StickerResult<Self> {
        config.validate()?;
        let transport: Arc<dyn ResourceFetcher> = Arc::new(
            HttpFetcher::new()
                .with_timeout(config.fetch_timeout()?)
                .with_proxy(config.effective_proxy()),
        );

        let source = match &config.manifest {
            Some(path) => CatalogueSource::File(path.clone()),
            None => CatalogueSource::Remote {
                local_copy: config.manifest_path(),
            },
        };
        let manifest_fetcher = AssetFetcher::new(
            Arc::clone(&transport),
            config.asset_prefixes.clone(),
            config.fetch_policy()?,
            config.resource_dir(),
        );
        let bytes = load_manifest_bytes(&source, Some(&manifest_fetcher))?;
        let catalogue = AssetCatalogue::from_manifest_bytes(
            &bytes,
            &config.resource_dir(),
            MissingImages::FetchLazily,
        )?;

        let fonts = font_fetcher(&config, Arc::clone(&transport))?;
        let caption_font = match provision_font(&config, &fonts) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, "caption font unavailable, using fallback family");
                None
            }
        };
        let launcher = Arc::new(SvgSandboxLauncher::new(FontSetup {
            system_fonts: config.system_fonts,
            files: caption_font.into_iter().collect(),
            dirs: vec![config.fonts_dir()],
        }));
        Self::new(config, Arc::new(catalogue), transport, launcher)
    }

    /// Configuration in effect.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The template catalogue.
    pub fn catalogue(&self) -> &Arc<AssetCatalogue> {
        self.resolver.catalogue()
    }

    /// The render cache.
    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    /// The renderer.
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Serve one intent. Every failure, including a panic below this point, comes back as
    /// [`Outcome::Failed`].
    pub fn handle(&self, intent: Intent) -> Outcome {
        let out = catch_unwind(AssertUnwindSafe(|| match intent {
            Intent::Generate {
                raw_id,
                text,
                overrides,
            } => self
                .generate(raw_id, text.as_deref(), &overrides)
                .map(|s| Outcome::Image(s.png)),
            Intent::List { character } => self.list(character.as_deref()).map(Outcome::Listing),
            Intent::Preview { character } => {
                self.contact_sheet(character.as_deref()).map(Outcome::Image)
            }
        }));
        match out {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                if e.is_user_facing() {
                    tracing::debug!(error = %e, "request rejected");
                } else {
                    tracing::warn!(error = %e, "request failed");
                }
                Outcome::Failed(e)
            }
            Err(_) => {
                tracing::error!("request handler panicked");
                Outcome::Failed(StickerError::render("internal error while rendering"))
            }
        }
    }

    /// Resolve, then serve from the cache or render.
    ///
    /// Invalid input fails before any fetch, render or cache write.
    pub fn generate(
        &self,
        raw_id: RawId,
        text: Option<&str>,
        overrides: &Overrides,
    ) -> StickerResult<Sticker> {
        let request = self.resolver.resolve(raw_id, text, overrides)?;
        self.render_request(request)
    }

    /// Serve an already resolved request.
    pub fn render_request(&self, request: CompositionRequest) -> StickerResult<Sticker> {
        let fingerprint = Fingerprint::of_request(&request);
        let png = self.cache.get_or_compute(fingerprint, || {
            let template = self.fetcher.fetch(&request.image_ref)?;
            Ok(self.renderer.render(&request, &template)?.png)
        })?;
        tracing::info!(
            sticker = request.template.sticker_id,
            fp = %fingerprint,
            bytes = png.len(),
            "sticker served"
        );
        Ok(Sticker {
            request,
            fingerprint,
            png,
        })
    }

    /// All characters with their sticker ids, or just `character`'s.
    pub fn list(&self, character: Option<&str>) -> StickerResult<Vec<CharacterSummary>> {
        let catalogue = self.catalogue();
        match character.map(str::trim).filter(|c| !c.is_empty()) {
            None => Ok(catalogue.summaries()),
            Some(c) => Ok(vec![catalogue.summary(c)?.clone()]),
        }
    }

    /// Preview sheet: one tile per character captioned with its name, or every sticker of
    /// `character` captioned with its id.
    pub fn contact_sheet(&self, character: Option<&str>) -> StickerResult<Arc<Vec<u8>>> {
        let catalogue = self.catalogue();
        let (title, tiles): (String, Vec<(Arc<TemplateMetadata>, String)>) =
            match character.map(str::trim).filter(|c| !c.is_empty()) {
                None => {
                    let mut seen = BTreeSet::new();
                    let tiles = catalogue
                        .templates()
                        .filter(|t| seen.insert(t.character.to_lowercase()))
                        .map(|t| (Arc::clone(t), capitalize(&t.character)))
                        .collect();
                    (String::new(), tiles)
                }
                Some(c) => {
                    let summary = catalogue.summary(c)?;
                    let tiles = summary
                        .sticker_ids
                        .iter()
                        .filter_map(|&id| catalogue.get(id))
                        .map(|t| {
                            let caption = t.sticker_id.to_string();
                            (t, caption)
                        })
                        .collect();
                    (summary.character.to_lowercase(), tiles)
                }
            };

        let fit = Overrides {
            auto_fit: true,
            ..Default::default()
        };
        let requests = tiles
            .iter()
            .map(|(t, caption)| self.resolver.resolve_template(t, Some(caption), &fit))
            .collect::<StickerResult<Vec<_>>>()?;
        let sheet_fp = Fingerprint::of_sheet(&title, requests.iter().map(Fingerprint::of_request));

        self.cache.get_or_compute(sheet_fp, || {
            let images = requests
                .into_par_iter()
                .map(|req| {
                    let sticker = self.render_request(req)?;
                    image::load_from_memory(&sticker.png)
                        .map(|img| img.to_rgba8())
                        .map_err(|e| StickerError::render(format!("decode tile: {e}")))
                })
                .collect::<StickerResult<Vec<_>>>()?;
            Ok(encode_png(crate::render::compose_sheet(&images))?.png)
        })
    }

    /// Download the caption font and every template image that is not on disk yet.
    ///
    /// Image downloads run on at most `prefetch_workers` threads. Individual failures are
    /// collected, not fatal.
    pub fn prefetch_assets(&self) -> StickerResult<PrefetchReport> {
        let mut report = PrefetchReport::default();
        if self.config.font_path.is_none() && !self.config.repo_prefixes.is_empty() {
            let font = self.config.font_file.as_str();
            if self.font_fetcher.is_local(font) {
                report.already_local += 1;
            } else {
                match self.font_fetcher.fetch(font) {
                    Ok(_) => report.fetched += 1,
                    Err(e) => report.failed.push((format!("{REMOTE_FONT_DIR}{font}"), e)),
                }
            }
        }

        let refs: BTreeSet<&str> = self
            .catalogue()
            .templates()
            .map(|t| t.image_ref.as_str())
            .collect();
        let (local, missing): (Vec<&str>, Vec<&str>) =
            refs.into_iter().partition(|r| self.fetcher.is_local(r));

        report.already_local += local.len();
        if missing.is_empty() {
            return Ok(report);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.prefetch_workers.min(missing.len()))
            .build()
            .map_err(|e| StickerError::config(format!("failed to build prefetch pool: {e}")))?;
        let results: Vec<(&str, StickerResult<Vec<u8>>)> = pool.install(|| {
            missing
                .par_iter()
                .map(|r| (*r, self.fetcher.fetch(r)))
                .collect()
        });

        for (reference, result) in results {
            match result {
                Ok(_) => report.fetched += 1,
                Err(e) => report.failed.push((reference.to_owned(), e)),
            }
        }
        tracing::info!(
            fetched = report.fetched,
            failed = report.failed.len(),
            already_local = report.already_local,
            "asset prefetch finished"
        );
        Ok(report)
    }
}

fn font_fetcher(
    config: &EngineConfig,
    transport: Arc<dyn ResourceFetcher>,
) -> StickerResult<AssetFetcher> {
    Ok(AssetFetcher::new(
        transport,
        config.repo_prefixes.clone(),
        config.fetch_policy()?,
        config.fonts_dir(),
    )
    .with_remote_dir(REMOTE_FONT_DIR))
}

/// Path of the caption font, fetching it into `fonts/` when missing. `None` when it is neither
/// on disk nor provisioned from any repository.
fn provision_font(
    config: &EngineConfig,
    fetcher: &AssetFetcher,
) -> StickerResult<Option<PathBuf>> {
    if let Some(path) = &config.font_path {
        return Ok(Some(path.clone()));
    }
    if !fetcher.is_local(&config.font_file) {
        if config.repo_prefixes.is_empty() {
            return Ok(None);
        }
        fetcher.fetch(&config.font_file)?;
    }
    fetcher.local_path(&config.font_file).map(Some)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
#[path = "../tests/unit/engine.rs"]
mod tests;
