use std::collections::HashSet;

use super::*;
use crate::catalogue::TemplateKey;

fn base() -> CompositionRequest {
    CompositionRequest {
        template: TemplateKey {
            character: "Miku".to_owned(),
            sticker_id: 1,
        },
        image_ref: "miku/1.png".to_owned(),
        canvas: Canvas {
            width: 400,
            height: 300,
        },
        text: "hello".to_owned(),
        x: 50,
        y: 250,
        rotation_deg: 0.0,
        font_size_px: 24,
        color: Rgb8::new(1, 2, 3),
        stroke_width_px: 9,
        stroke_color: Rgb8::WHITE,
        line_spacing: 1.3,
    }
}

#[test]
fn fingerprint_is_deterministic() {
    assert_eq!(Fingerprint::of_request(&base()), Fingerprint::of_request(&base()));
    assert_eq!(Fingerprint::of_request(&base()).to_hex().len(), 32);
}

#[test]
fn every_field_changes_the_fingerprint() {
    let variants: Vec<Box<dyn Fn(&mut CompositionRequest)>> = vec![
        Box::new(|r| r.template.character.push('!')),
        Box::new(|r| r.template.sticker_id = 2),
        Box::new(|r| r.image_ref.push('x')),
        Box::new(|r| r.canvas.width = 401),
        Box::new(|r| r.canvas.height = 301),
        Box::new(|r| r.text.push('!')),
        Box::new(|r| r.x = 51),
        Box::new(|r| r.y = 249),
        Box::new(|r| r.rotation_deg = 0.5),
        Box::new(|r| r.font_size_px = 25),
        Box::new(|r| r.color = Rgb8::new(1, 2, 4)),
        Box::new(|r| r.stroke_width_px = 8),
        Box::new(|r| r.stroke_color = Rgb8::new(0, 0, 0)),
        Box::new(|r| r.line_spacing = 1.4),
    ];

    let mut seen = HashSet::new();
    seen.insert(Fingerprint::of_request(&base()));
    for mutate in &variants {
        let mut r = base();
        mutate(&mut r);
        assert!(seen.insert(Fingerprint::of_request(&r)), "{r:?}");
    }
}

#[test]
fn adjacent_strings_do_not_alias() {
    let mut a = base();
    a.template.character = "ab".to_owned();
    a.image_ref = "c".to_owned();
    let mut b = base();
    b.template.character = "a".to_owned();
    b.image_ref = "bc".to_owned();
    assert_ne!(Fingerprint::of_request(&a), Fingerprint::of_request(&b));
}

#[test]
fn sheets_live_in_their_own_namespace() {
    let tile = Fingerprint::of_request(&base());
    let mut other = base();
    other.text = "2".to_owned();
    let other = Fingerprint::of_request(&other);

    let one = Fingerprint::of_sheet("Miku", [tile]);
    let two = Fingerprint::of_sheet("Miku", [tile, other]);
    assert_ne!(one, two);
    assert_ne!(one, tile);
    assert_ne!(one, Fingerprint::of_sheet("Airi", [tile]));
    assert_eq!(one, Fingerprint::of_sheet("Miku", [tile]));
}
