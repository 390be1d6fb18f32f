use super::*;

const SQUARE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="8" viewBox="0 0 10 8"><rect x="0" y="0" width="5" height="8" fill="#ff0000"/></svg>"##;

fn session() -> SvgSandbox {
    SvgSandbox::launch(Arc::new(FontSetup::default())).unwrap()
}

#[test]
fn renders_exact_size_with_straight_alpha() {
    let mut s = session();
    let img = s.render(SQUARE, 10, 8, Duration::from_secs(10)).unwrap();
    assert_eq!(img.dimensions(), (10, 8));
    assert_eq!(img.get_pixel(1, 1).0, [255, 0, 0, 255]);
    assert_eq!(img.get_pixel(8, 1).0[3], 0);
    assert!(s.is_healthy());
}

#[test]
fn invalid_document_is_permanent_and_keeps_session() {
    let mut s = session();
    let err = s
        .render("<svg", 10, 10, Duration::from_secs(10))
        .unwrap_err();
    assert!(matches!(err, SandboxFailure::BadDocument(_)));
    assert!(!err.is_transient());
    assert!(s.is_healthy());
    assert!(s.render(SQUARE, 10, 8, Duration::from_secs(10)).is_ok());
}

#[test]
fn launcher_produces_independent_sessions() {
    let launcher = SvgSandboxLauncher::default();
    let mut a = launcher.launch().unwrap();
    let mut b = launcher.launch().unwrap();
    assert!(a.render(SQUARE, 10, 8, Duration::from_secs(10)).is_ok());
    assert!(b.render(SQUARE, 20, 16, Duration::from_secs(10)).is_ok());
}

#[test]
fn failure_kinds_classify_transience() {
    assert!(SandboxFailure::Timeout(Duration::from_secs(1)).is_transient());
    assert!(SandboxFailure::Crashed("x".into()).is_transient());
    assert!(!SandboxFailure::BadDocument("x".into()).is_transient());
}

fn installed_font_file() -> Option<PathBuf> {
    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();
    db.faces().find_map(|face| match &face.source {
        usvg::fontdb::Source::File(p) => Some(p.clone()),
        _ => None,
    })
}

#[test]
fn configured_font_file_is_the_face_selected_for_its_family() {
    let Some(path) = installed_font_file() else {
        return;
    };
    let setup = FontSetup {
        system_fonts: false,
        files: vec![path.clone()],
        dirs: Vec::new(),
    };
    let family = setup.primary_family().unwrap();
    assert_eq!(
        SvgSandboxLauncher::new(setup.clone()).font_family().as_deref(),
        Some(family.as_str())
    );

    let options = svg_options(&setup);
    let families = [usvg::fontdb::Family::Name(&family)];
    let id = options
        .fontdb
        .query(&usvg::fontdb::Query {
            families: &families,
            weight: usvg::fontdb::Weight::NORMAL,
            stretch: usvg::fontdb::Stretch::Normal,
            style: usvg::fontdb::Style::Normal,
        })
        .unwrap();
    match &options.fontdb.face(id).unwrap().source {
        usvg::fontdb::Source::File(p) | usvg::fontdb::Source::SharedFile(p, _) => {
            assert_eq!(p, &path)
        }
        _ => panic!("font was not loaded from its file"),
    }
}

#[test]
fn unusable_font_file_yields_no_family() {
    let setup = FontSetup {
        system_fonts: false,
        files: vec![PathBuf::from("/nonexistent/caption.ttf")],
        dirs: Vec::new(),
    };
    assert_eq!(setup.primary_family(), None);
    assert_eq!(SvgSandboxLauncher::new(setup).font_family(), None);
}
