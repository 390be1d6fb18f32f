use std::collections::HashMap;
use std::path::PathBuf;

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::*;
use crate::foundation::core::{Canvas, PixelPoint, Rgb8};

fn template(character: &str, id: u32) -> TemplateMetadata {
    TemplateMetadata {
        character: character.to_owned(),
        sticker_id: id,
        name: format!("{character} {id}"),
        image_ref: format!("{}/{id}.png", character.to_lowercase()),
        canvas: Canvas::default(),
        default_text: "hi".to_owned(),
        default_anchor: PixelPoint { x: 10, y: 10 },
        default_rotation_deg: 0.0,
        default_font_size_px: 40,
        default_color: Rgb8::new(0, 0, 0),
    }
}

fn catalogue() -> AssetCatalogue {
    AssetCatalogue::from_templates(vec![
        template("Miku", 3),
        template("airi", 7),
        template("Miku", 1),
        template("Akito", 2),
    ])
    .unwrap()
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

#[test]
fn characters_are_ordered_case_insensitively() {
    assert_eq!(catalogue().list_characters(), ["airi", "Akito", "Miku"]);
}

#[test]
fn list_stickers_is_ordered_and_unknown_is_not_found() {
    let c = catalogue();
    assert_eq!(c.list_stickers("Miku").unwrap(), [1, 3]);
    assert_eq!(c.list_stickers("miku").unwrap(), [1, 3]);
    assert!(matches!(
        c.list_stickers("Nobody"),
        Err(StickerError::NotFound(_))
    ));
}

#[test]
fn lookup_requires_matching_character() {
    let c = catalogue();
    assert_eq!(c.lookup("miku", 3).unwrap().sticker_id, 3);
    assert!(matches!(c.lookup("Airi", 3), Err(StickerError::NotFound(_))));
    assert!(matches!(c.lookup("Miku", 99), Err(StickerError::NotFound(_))));
}

#[test]
fn duplicate_ids_and_empty_catalogues_fail_to_load() {
    let dup = AssetCatalogue::from_templates(vec![template("Miku", 1), template("Airi", 1)]);
    assert!(matches!(dup, Err(StickerError::CatalogueLoad(_))));
    let empty = AssetCatalogue::from_templates(Vec::new());
    assert!(matches!(empty, Err(StickerError::CatalogueLoad(_))));
}

#[test]
fn empty_image_reference_fails_to_load() {
    let mut t = template("Miku", 1);
    t.image_ref = "  ".to_owned();
    let out = AssetCatalogue::from_templates(vec![t]);
    assert!(matches!(out, Err(StickerError::CatalogueLoad(_))));
}

#[test]
fn random_template_covers_every_entry() {
    let c = catalogue();
    let mut rng = StdRng::seed_from_u64(7);
    let mut seen = HashMap::<u32, usize>::new();
    for _ in 0..4000 {
        *seen.entry(c.random_template_with(&mut rng).sticker_id).or_default() += 1;
    }
    assert_eq!(seen.len(), 4);
    // Uniform over entries: Miku owns two of four, so no per-character weighting.
    for (_, n) in seen {
        assert!((800..1200).contains(&n), "{n}");
    }
}

#[test]
fn missing_and_unreadable_images_follow_policy() {
    let root = temp_dir("catalogue_images");
    std::fs::create_dir_all(root.join("m")).unwrap();
    let manifest = br##"{"stickers": [{"id": 1, "character": "Miku", "image": "m/1.png",
        "x": 1, "y": 1, "font_size": 10, "color": "#000000"}]}"##;

    let out = AssetCatalogue::from_manifest_bytes(manifest, &root, MissingImages::Reject);
    assert!(matches!(out, Err(StickerError::CatalogueLoad(_))));
    let lazy = AssetCatalogue::from_manifest_bytes(manifest, &root, MissingImages::FetchLazily);
    assert_eq!(lazy.unwrap().len(), 1);

    std::fs::write(root.join("m/1.png"), b"not an image").unwrap();
    let out = AssetCatalogue::from_manifest_bytes(manifest, &root, MissingImages::FetchLazily);
    assert!(matches!(out, Err(StickerError::CatalogueLoad(_))));

    image::RgbaImage::new(4, 4).save(root.join("m/1.png")).unwrap();
    let ok = AssetCatalogue::from_manifest_bytes(manifest, &root, MissingImages::Reject).unwrap();
    assert_eq!(ok.get(1).unwrap().image_ref, "m/1.png");
    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn missing_manifest_file_is_catalogue_load_error() {
    let root = temp_dir("catalogue_missing");
    let out = AssetCatalogue::load(&root.join("nope.json"), &root, MissingImages::Reject);
    assert!(matches!(out, Err(StickerError::CatalogueLoad(_))));
}
