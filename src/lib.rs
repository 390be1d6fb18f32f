//! Stickerkit is a sticker composition engine.
//!
//! A catalogue of character template images is loaded once at startup. Each request names a
//! template (or asks for a random one), supplies a caption and optional layout overrides, and gets
//! back a PNG of exactly the template's canvas size:
//!
//! - [`Resolver`] validates the raw request into a [`CompositionRequest`]
//! - [`RenderCache`] serves identical requests from a content-addressed store, computing each
//!   distinct key at most once even under concurrency
//! - [`Renderer`] rasterizes the layout in a pooled, crash-isolated sandbox session
//!
//! [`Engine`] ties these together behind a single `Sync` façade.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod catalogue;
/// Engine configuration.
pub mod config;
pub mod engine;
pub mod fetch;
mod foundation;
pub mod render;
pub mod resolve;

pub use crate::foundation::core::{Canvas, PixelPoint, Rgb8};
pub use crate::foundation::error::{StickerError, StickerResult};
pub use crate::foundation::fs::{normalize_rel_path, write_atomic};
pub use crate::foundation::retry::{AttemptError, RetryExhausted, RetryPolicy, run_with_retry};

pub use crate::cache::{CacheStats, Fingerprint, RenderCache};
pub use crate::catalogue::{
    AssetCatalogue, CatalogueSource, CharacterSummary, MissingImages, TemplateKey,
    TemplateMetadata,
};
pub use crate::config::EngineConfig;
pub use crate::engine::{Engine, Intent, Outcome, PrefetchReport, Sticker};
pub use crate::fetch::{AssetFetcher, FetchFailure, HttpFetcher, ResourceFetcher};
pub use crate::render::{
    FontSetup, RenderedImage, Renderer, Sandbox, SandboxFailure, SandboxLauncher, SvgSandbox,
    SvgSandboxLauncher,
};
pub use crate::resolve::{CompositionRequest, Overrides, RawId, Resolver};
