//! Sticker rasterization.
//!
//! A [`CompositionRequest`](crate::resolve::CompositionRequest) becomes an SVG layout document
//! ([`layout`]) which a pooled, long-lived [`Sandbox`] session rasterizes to exactly the canvas
//! size. The shipped sandbox is an SVG engine session on its own worker thread
//! ([`SvgSandbox`]); tests substitute their own [`SandboxLauncher`].

pub mod layout;
mod pool;
mod renderer;
mod sandbox;
mod sheet;

pub use pool::{SandboxLease, SandboxPool, SandboxPoolStats};
pub use renderer::{RenderedImage, Renderer, encode_png};
pub use sandbox::{
    FontSetup, Sandbox, SandboxFailure, SandboxLauncher, SvgSandbox, SvgSandboxLauncher,
};
pub use sheet::{SHEET_COLUMNS, compose_sheet};
