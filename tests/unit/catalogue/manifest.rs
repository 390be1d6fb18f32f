use super::*;

const UPSTREAM: &str = r##"[
  {"id": "7", "name": "Miku 01", "character": "miku", "img": "miku/Miku_01.png",
   "color": "#33ccbb", "defaultText": {"text": "Hi", "x": 148, "y": 58, "r": -2, "s": 47}},
  {"id": "1", "name": "Airi 01", "character": "Airi", "img": "airi/Airi_01.png",
   "color": "#FB8AAC", "defaultText": {"text": "Yo", "x": 140, "y": 40, "r": 0, "s": 50}},
  {"id": "2", "name": "Akito 01", "character": "akito", "img": "akito/Akito_01.png",
   "color": "#ff7722", "defaultText": {"text": "Hey", "x": 100, "y": 200, "r": 10, "s": 30}}
]"##;

#[test]
fn upstream_entries_are_sorted_by_character_and_renumbered() {
    let m = Manifest::parse(UPSTREAM.as_bytes()).unwrap();
    let chars: Vec<_> = m.stickers.iter().map(|e| e.character.as_str()).collect();
    assert_eq!(chars, ["Airi", "akito", "miku"]);
    let ids: Vec<_> = m.stickers.iter().map(|e| e.id).collect();
    assert_eq!(ids, [1, 2, 3]);
    assert_eq!(m.canvas, Canvas::default());
}

#[test]
fn upstream_rotation_is_tenths_of_radian() {
    let m = Manifest::parse(UPSTREAM.as_bytes()).unwrap();
    let akito = &m.stickers[1];
    assert!((akito.rotation_deg - 1.0f64.to_degrees()).abs() < 1e-9);
    let miku = &m.stickers[2];
    assert!((miku.rotation_deg - (-0.2f64).to_degrees()).abs() < 1e-9);
}

#[test]
fn native_manifest_applies_canvas_and_name_defaults() {
    let json = r##"{
      "canvas": {"width": 400, "height": 300},
      "stickers": [
        {"id": 1, "character": "Miku", "image": "miku/1.png", "text": "hello",
         "x": 50, "y": 250, "font_size": 24, "color": "#000000"}
      ]
    }"##;
    let templates = Manifest::parse(json.as_bytes())
        .unwrap()
        .into_templates()
        .unwrap();
    assert_eq!(templates.len(), 1);
    let t = &templates[0];
    assert_eq!(t.canvas.width, 400);
    assert_eq!(t.name, "Miku 1");
    assert_eq!(t.default_anchor, PixelPoint { x: 50, y: 250 });
    assert_eq!(t.default_rotation_deg, 0.0);
}

#[test]
fn malformed_manifests_are_catalogue_load_errors() {
    for bad in [
        "not json",
        r#"{"stickers": [{"id": 1}]}"#,
        r#"[{"id": "1"}]"#,
        r##"{"stickers": [{"id": 1, "character": "m", "image": "a.png", "x": 1, "y": 1,
             "font_size": 10, "color": "#zzzzzz"}]}"##,
    ] {
        let err = Manifest::parse(bad.as_bytes()).unwrap_err();
        assert!(
            matches!(err, StickerError::CatalogueLoad(_)),
            "{bad}: {err:?}"
        );
    }
}

#[test]
fn anchor_outside_canvas_is_rejected_at_load() {
    let json = r##"{"canvas": {"width": 10, "height": 10}, "stickers": [
        {"id": 1, "character": "m", "image": "a.png", "x": 10, "y": 1,
         "font_size": 10, "color": "#000000"}]}"##;
    let err = Manifest::parse(json.as_bytes())
        .unwrap()
        .into_templates()
        .unwrap_err();
    assert!(matches!(err, StickerError::CatalogueLoad(_)));
}
