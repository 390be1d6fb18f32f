use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use stickerkit::{Engine, EngineConfig, Intent, Outcome, Overrides, RawId};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stickerkit", version, about)]
struct Cli {
    /// Engine config JSON. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a sticker as a PNG.
    Generate(GenerateArgs),
    /// List characters, or one character's sticker ids.
    List {
        /// Character name (case-insensitive).
        character: Option<String>,
    },
    /// Render a preview sheet of all characters, or of one character's stickers.
    Preview {
        /// Character name (case-insensitive).
        character: Option<String>,

        /// Output PNG path.
        #[arg(long)]
        out: PathBuf,
    },
    /// Download every template image that is missing locally.
    Prefetch,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Sticker id, or `random`.
    #[arg(short, long, default_value = "random")]
    id: String,

    /// Caption. Use `\n` for line breaks. Defaults to the template's caption.
    text: Option<String>,

    /// Text anchor x. Prefix with `^` to offset the template default.
    #[arg(short = 'x', long, allow_hyphen_values = true)]
    x: Option<String>,

    /// Text anchor y. Prefix with `^` to offset the template default.
    #[arg(short = 'y', long, allow_hyphen_values = true)]
    y: Option<String>,

    /// Rotation in degrees. Prefix with `^` to offset the template default.
    #[arg(short, long, allow_hyphen_values = true)]
    rotate: Option<String>,

    /// Font size in pixels. Prefix with `^` to offset the template default.
    #[arg(short, long, allow_hyphen_values = true)]
    size: Option<String>,

    /// Fill color, `#rrggbb`.
    #[arg(short, long)]
    color: Option<String>,

    /// Outline width in pixels.
    #[arg(long)]
    stroke_width: Option<String>,

    /// Outline color, `#rrggbb`.
    #[arg(long)]
    stroke_color: Option<String>,

    /// Line height as a multiple of the font size.
    #[arg(long)]
    line_spacing: Option<String>,

    /// Shrink the font so the caption fits the canvas width (when no size is given).
    #[arg(long, default_value_t = false)]
    auto_fit: bool,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };
    let engine = Engine::bootstrap(config).context("start sticker engine")?;

    match cli.cmd {
        Command::Generate(args) => cmd_generate(&engine, args),
        Command::List { character } => cmd_list(&engine, character),
        Command::Preview { character, out } => {
            let png = expect_image(engine.handle(Intent::Preview { character }))?;
            write_png(&out, &png)
        }
        Command::Prefetch => cmd_prefetch(&engine),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "stickerkit=debug" } else { "stickerkit=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_generate(engine: &Engine, args: GenerateArgs) -> anyhow::Result<()> {
    let raw_id = RawId::parse(&args.id)?;
    let overrides = Overrides {
        x: args.x,
        y: args.y,
        rotate: args.rotate,
        size: args.size,
        color: args.color,
        stroke_width: args.stroke_width,
        stroke_color: args.stroke_color,
        line_spacing: args.line_spacing,
        auto_fit: args.auto_fit,
    };
    let text = args.text.map(|t| t.replace("\\n", "\n"));
    let png = expect_image(engine.handle(Intent::Generate {
        raw_id,
        text,
        overrides,
    }))?;
    write_png(&args.out, &png)
}

fn cmd_list(engine: &Engine, character: Option<String>) -> anyhow::Result<()> {
    match engine.handle(Intent::List { character }) {
        Outcome::Listing(summaries) => {
            for s in summaries {
                let ids: Vec<String> = s.sticker_ids.iter().map(u32::to_string).collect();
                println!("{}: {}", s.character, ids.join(" "));
            }
            Ok(())
        }
        Outcome::Failed(e) => anyhow::bail!("{}", e.user_message()),
        Outcome::Image(_) => anyhow::bail!("unexpected image outcome for a listing"),
    }
}

fn cmd_prefetch(engine: &Engine) -> anyhow::Result<()> {
    let report = engine.prefetch_assets()?;
    for (reference, e) in &report.failed {
        eprintln!("failed: {reference}: {e}");
    }
    eprintln!(
        "{} fetched, {} already local, {} failed",
        report.fetched,
        report.already_local,
        report.failed.len()
    );
    if !report.failed.is_empty() {
        anyhow::bail!("{} asset(s) could not be fetched", report.failed.len());
    }
    Ok(())
}

fn expect_image(outcome: Outcome) -> anyhow::Result<std::sync::Arc<Vec<u8>>> {
    match outcome {
        Outcome::Image(png) => Ok(png),
        Outcome::Failed(e) => {
            tracing::debug!(error = %e, "request failed");
            anyhow::bail!("{}", e.user_message())
        }
        Outcome::Listing(_) => anyhow::bail!("unexpected listing outcome for an image request"),
    }
}

fn write_png(out: &Path, png: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(out, png).with_context(|| format!("write png '{}'", out.display()))?;
    eprintln!("wrote {}", out.display());
    Ok(())
}
