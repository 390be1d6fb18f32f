use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::*;
use crate::fetch::FetchFailure;
use crate::foundation::core::{Canvas, PixelPoint, Rgb8};
use crate::render::{Sandbox, SandboxFailure};

struct CountingSandbox {
    renders: Arc<AtomicUsize>,
    panic: bool,
}

impl Sandbox for CountingSandbox {
    fn render(
        &mut self,
        _document: &str,
        width: u32,
        height: u32,
        _deadline: Duration,
    ) -> Result<image::RgbaImage, SandboxFailure> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        if self.panic {
            panic!("sandbox exploded");
        }
        // Give concurrent callers a chance to pile up on the same key.
        std::thread::sleep(Duration::from_millis(20));
        Ok(image::RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([9, 9, 9, 255]),
        ))
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

#[derive(Default)]
struct CountingLauncher {
    renders: Arc<AtomicUsize>,
    launches: AtomicUsize,
    panic: AtomicBool,
    family: Option<String>,
}

impl SandboxLauncher for CountingLauncher {
    fn launch(&self) -> StickerResult<Box<dyn Sandbox>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingSandbox {
            renders: Arc::clone(&self.renders),
            panic: self.panic.load(Ordering::SeqCst),
        }))
    }

    fn font_family(&self) -> Option<String> {
        self.family.clone()
    }
}

#[derive(Default)]
struct TemplateServer {
    calls: Mutex<Vec<String>>,
    unreachable: bool,
}

impl ResourceFetcher for TemplateServer {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchFailure> {
        self.calls.lock().unwrap().push(url.to_owned());
        if self.unreachable {
            return Err(FetchFailure::transient("connection refused"));
        }
        Ok(encode_png(image::RgbaImage::from_pixel(8, 6, image::Rgba([200, 0, 0, 255])))
            .unwrap()
            .png)
    }
}

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "stickerkit_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

fn template(character: &str, id: u32) -> TemplateMetadata {
    TemplateMetadata {
        character: character.to_owned(),
        sticker_id: id,
        name: format!("{character} {id}"),
        image_ref: format!("{}/{id}.png", character.to_lowercase()),
        canvas: Canvas {
            width: 400,
            height: 300,
        },
        default_text: "default".to_owned(),
        default_anchor: PixelPoint { x: 50, y: 250 },
        default_rotation_deg: 0.0,
        default_font_size_px: 24,
        default_color: Rgb8::new(0x33, 0xcc, 0xbb),
    }
}

struct Fixture {
    engine: Engine,
    launcher: Arc<CountingLauncher>,
    server: Arc<TemplateServer>,
}

fn fixture(name: &str, server: TemplateServer) -> Fixture {
    fixture_with(name, server, CountingLauncher::default())
}

fn fixture_with(name: &str, server: TemplateServer, launcher: CountingLauncher) -> Fixture {
    let catalogue = AssetCatalogue::from_templates(vec![
        template("Miku", 1),
        template("Miku", 3),
        template("Miku", 2),
        template("Airi", 10),
    ])
    .unwrap();
    let config = EngineConfig {
        data_dir: temp_dir(name),
        asset_prefixes: vec!["https://mirror.test/".to_owned()],
        repo_prefixes: vec!["https://repo.test/".to_owned()],
        ..Default::default()
    };
    let launcher = Arc::new(launcher);
    let server = Arc::new(server);
    let engine = Engine::new(
        config,
        Arc::new(catalogue),
        server.clone(),
        launcher.clone(),
    )
    .unwrap();
    Fixture {
        engine,
        launcher,
        server,
    }
}

fn renders(f: &Fixture) -> usize {
    f.launcher.renders.load(Ordering::SeqCst)
}

#[test]
fn generate_returns_png_of_template_canvas() {
    let f = fixture("engine_generate", TemplateServer::default());
    let sticker = f
        .engine
        .generate(RawId::Id(1), Some("hello"), &Overrides::default())
        .unwrap();
    let img = image::load_from_memory(&sticker.png).unwrap();
    assert_eq!((img.width(), img.height()), (400, 300));
    assert_eq!(sticker.request.text, "hello");
    assert_eq!((sticker.request.x, sticker.request.y), (50, 250));
    assert_eq!(f.server.calls.lock().unwrap().len(), 1);
}

#[test]
fn identical_requests_render_once() {
    let f = fixture("engine_cached", TemplateServer::default());
    let a = f
        .engine
        .generate(RawId::Id(1), Some("hello"), &Overrides::default())
        .unwrap();
    let b = f
        .engine
        .generate(RawId::Id(1), Some("hello"), &Overrides::default())
        .unwrap();
    assert_eq!(a.png, b.png);
    assert_eq!(a.fingerprint, b.fingerprint);
    assert_eq!(renders(&f), 1);
    assert_eq!(f.engine.cache().stats().hits, 1);

    // The template image is now local; a different caption does not fetch it again.
    f.engine
        .generate(RawId::Id(1), Some("other"), &Overrides::default())
        .unwrap();
    assert_eq!(renders(&f), 2);
    assert_eq!(f.server.calls.lock().unwrap().len(), 1);
}

#[test]
fn concurrent_identical_requests_share_one_render() {
    let f = fixture("engine_concurrent", TemplateServer::default());
    let engine = &f.engine;
    let outputs: Vec<Arc<Vec<u8>>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(move || {
                    engine
                        .generate(RawId::Id(2), Some("same"), &Overrides::default())
                        .unwrap()
                        .png
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(renders(&f), 1);
    assert!(outputs.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn unknown_id_is_rejected_before_any_work() {
    let f = fixture("engine_unknown", TemplateServer::default());
    let err = f
        .engine
        .generate(RawId::Id(999), Some("hello"), &Overrides::default())
        .unwrap_err();
    assert!(matches!(err, StickerError::NotFound(_)), "{err:?}");
    assert_eq!(renders(&f), 0);
    assert_eq!(f.launcher.launches.load(Ordering::SeqCst), 0);
    assert!(f.server.calls.lock().unwrap().is_empty());
    assert!(f.engine.cache().is_empty());
}

#[test]
fn invalid_override_comes_back_as_failed_outcome() {
    let f = fixture("engine_invalid", TemplateServer::default());
    let out = f.engine.handle(Intent::Generate {
        raw_id: RawId::Id(1),
        text: Some("hello".to_owned()),
        overrides: Overrides {
            x: Some("400".to_owned()),
            ..Default::default()
        },
    });
    match out {
        Outcome::Failed(StickerError::Validation { field, .. }) => assert_eq!(field, "x"),
        other => panic!("expected validation failure, got {other:?}"),
    }
    assert_eq!(renders(&f), 0);
    assert!(f.engine.cache().is_empty());
}

#[test]
fn unreachable_template_is_a_fetch_error_and_not_cached() {
    let f = fixture(
        "engine_unreachable",
        TemplateServer {
            unreachable: true,
            ..Default::default()
        },
    );
    let err = f
        .engine
        .generate(RawId::Id(1), Some("hello"), &Overrides::default())
        .unwrap_err();
    assert!(matches!(err, StickerError::Fetch { .. }), "{err:?}");
    // Default retry_count is 1.
    assert_eq!(f.server.calls.lock().unwrap().len(), 1);
    assert!(f.engine.cache().is_empty());
}

#[test]
fn listing_is_ordered_and_case_insensitive() {
    let f = fixture("engine_list", TemplateServer::default());
    let all = f.engine.list(None).unwrap();
    let names: Vec<_> = all.iter().map(|s| s.character.as_str()).collect();
    assert_eq!(names, ["Airi", "Miku"]);

    match f.engine.handle(Intent::List {
        character: Some("miku".to_owned()),
    }) {
        Outcome::Listing(list) => {
            assert_eq!(list.len(), 1);
            assert_eq!(list[0].sticker_ids, [1, 2, 3]);
        }
        other => panic!("expected listing, got {other:?}"),
    }

    match f.engine.handle(Intent::List {
        character: Some("Nobody".to_owned()),
    }) {
        Outcome::Failed(e) => assert!(matches!(e, StickerError::NotFound(_))),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn random_generation_picks_a_catalogued_template() {
    let f = fixture("engine_random", TemplateServer::default());
    let sticker = f
        .engine
        .generate(RawId::Random, None, &Overrides::default())
        .unwrap();
    assert!([1, 2, 3, 10].contains(&sticker.request.template.sticker_id));
    assert_eq!(sticker.request.text, "default");
}

#[test]
fn character_sheet_tiles_every_sticker_and_is_cached() {
    let f = fixture("engine_sheet", TemplateServer::default());
    let png = f.engine.contact_sheet(Some("MIKU")).unwrap();
    let sheet = image::load_from_memory(&png).unwrap();
    assert_eq!(sheet.width(), 3 * 400 + 4 * 8);
    assert_eq!(sheet.height(), 300 + 2 * 8);
    assert_eq!(renders(&f), 3);

    let again = f.engine.contact_sheet(Some("miku")).unwrap();
    assert_eq!(png, again);
    assert_eq!(renders(&f), 3);
}

#[test]
fn overview_sheet_has_one_tile_per_character() {
    let f = fixture("engine_overview", TemplateServer::default());
    match f.engine.handle(Intent::Preview { character: None }) {
        Outcome::Image(png) => {
            let sheet = image::load_from_memory(&png).unwrap();
            assert_eq!(sheet.width(), 2 * 400 + 3 * 8);
        }
        other => panic!("expected image, got {other:?}"),
    }
    assert_eq!(renders(&f), 2);
}

#[test]
fn prefetch_downloads_only_missing_images() {
    let f = fixture("engine_prefetch", TemplateServer::default());
    f.engine
        .generate(RawId::Id(1), Some("warm"), &Overrides::default())
        .unwrap();
    let report = f.engine.prefetch_assets().unwrap();
    assert_eq!(report.already_local, 1);
    // Three images plus the caption font.
    assert_eq!(report.fetched, 4);
    assert!(report.failed.is_empty());
    assert!(
        f.server
            .calls
            .lock()
            .unwrap()
            .contains(&"https://repo.test/fonts/YurukaFangTang.ttf".to_owned())
    );
    assert!(f.engine.config().fonts_dir().join("YurukaFangTang.ttf").is_file());

    let again = f.engine.prefetch_assets().unwrap();
    assert_eq!(again.already_local, 5);
    assert_eq!(again.fetched, 0);
}

#[test]
fn prefetch_collects_failures() {
    let f = fixture(
        "engine_prefetch_fail",
        TemplateServer {
            unreachable: true,
            ..Default::default()
        },
    );
    let report = f.engine.prefetch_assets().unwrap();
    assert_eq!(report.fetched, 0);
    assert_eq!(report.failed.len(), 5);
    assert!(report.failed.iter().any(|(r, _)| r == "fonts/YurukaFangTang.ttf"));
}

#[test]
fn layout_names_the_family_of_the_loaded_caption_font() {
    let f = fixture_with(
        "engine_font_family",
        TemplateServer::default(),
        CountingLauncher {
            family: Some("Custom Sans".to_owned()),
            ..Default::default()
        },
    );
    assert_eq!(f.engine.renderer().font_family(), "Custom Sans");

    let f = fixture("engine_font_fallback", TemplateServer::default());
    assert_eq!(
        f.engine.renderer().font_family(),
        f.engine.config().font_family
    );
}

#[test]
fn sandbox_panic_becomes_render_failure() {
    let f = fixture("engine_panic", TemplateServer::default());
    f.launcher.panic.store(true, Ordering::SeqCst);
    let out = f.engine.handle(Intent::Generate {
        raw_id: RawId::Id(1),
        text: Some("boom".to_owned()),
        overrides: Overrides::default(),
    });
    assert!(matches!(out, Outcome::Failed(StickerError::Render { .. })), "{out:?}");
    assert!(f.engine.cache().is_empty());
}
