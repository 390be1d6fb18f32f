use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use rand::Rng;

use crate::foundation::error::{StickerError, StickerResult};
use crate::foundation::fs::normalize_rel_path;

use super::{Manifest, TemplateMetadata};

/// What to do with templates whose image is not on disk at load time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingImages {
    /// Fail the load.
    Reject,
    /// Accept; the image will be fetched on first use.
    FetchLazily,
}

/// One character with its sticker ids, in catalogue order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CharacterSummary {
    /// Character name as first seen in the manifest.
    pub character: String,
    /// Sticker ids, ascending.
    pub sticker_ids: Vec<u32>,
}

/// Read-only set of sticker templates.
#[derive(Debug)]
pub struct AssetCatalogue {
    templates: Vec<Arc<TemplateMetadata>>,
    by_id: HashMap<u32, usize>,
    // Keyed by lower-cased character name.
    characters: BTreeMap<String, CharacterSummary>,
}

impl AssetCatalogue {
    /// Load and validate a manifest file, checking images under `resource_root`.
    pub fn load(
        manifest_path: &Path,
        resource_root: &Path,
        missing: MissingImages,
    ) -> StickerResult<Self> {
        let bytes = std::fs::read(manifest_path).map_err(|e| {
            StickerError::catalogue_load(format!(
                "read manifest '{}': {e}",
                manifest_path.display()
            ))
        })?;
        Self::from_manifest_bytes(&bytes, resource_root, missing)
    }

    /// Build from raw manifest bytes.
    pub fn from_manifest_bytes(
        bytes: &[u8],
        resource_root: &Path,
        missing: MissingImages,
    ) -> StickerResult<Self> {
        let templates = Manifest::parse(bytes)?.into_templates()?;
        for t in &templates {
            check_image(t, resource_root, missing)?;
        }
        let catalogue = Self::from_templates(templates)?;
        tracing::info!(
            templates = catalogue.len(),
            characters = catalogue.characters.len(),
            "catalogue loaded"
        );
        Ok(catalogue)
    }

    /// Build from already validated templates without touching the filesystem.
    pub fn from_templates(templates: Vec<TemplateMetadata>) -> StickerResult<Self> {
        if templates.is_empty() {
            return Err(StickerError::catalogue_load("manifest has no stickers"));
        }

        let mut sorted = templates;
        sorted.sort_by(|a, b| {
            a.character
                .to_lowercase()
                .cmp(&b.character.to_lowercase())
                .then(a.sticker_id.cmp(&b.sticker_id))
        });

        let mut by_id = HashMap::with_capacity(sorted.len());
        let mut characters = BTreeMap::<String, CharacterSummary>::new();
        for (idx, t) in sorted.iter().enumerate() {
            t.validate()?;
            if by_id.insert(t.sticker_id, idx).is_some() {
                return Err(StickerError::catalogue_load(format!(
                    "duplicate sticker id {}",
                    t.sticker_id
                )));
            }
            characters
                .entry(t.character.to_lowercase())
                .or_insert_with(|| CharacterSummary {
                    character: t.character.clone(),
                    sticker_ids: Vec::new(),
                })
                .sticker_ids
                .push(t.sticker_id);
        }

        Ok(Self {
            templates: sorted.into_iter().map(Arc::new).collect(),
            by_id,
            characters,
        })
    }

    /// Number of templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Always `false`; an empty catalogue fails to load.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Template by id alone.
    pub fn get(&self, sticker_id: u32) -> Option<Arc<TemplateMetadata>> {
        self.by_id
            .get(&sticker_id)
            .map(|&idx| Arc::clone(&self.templates[idx]))
    }

    /// Template by character and id. The character match is case-insensitive.
    pub fn lookup(&self, character: &str, sticker_id: u32) -> StickerResult<Arc<TemplateMetadata>> {
        self.get(sticker_id)
            .filter(|t| t.character.to_lowercase() == character.trim().to_lowercase())
            .ok_or_else(|| StickerError::not_found(format!("sticker {character}/{sticker_id}")))
    }

    /// Character names in catalogue order.
    pub fn list_characters(&self) -> Vec<String> {
        self.characters
            .values()
            .map(|c| c.character.clone())
            .collect()
    }

    /// Every character with its sticker ids.
    pub fn summaries(&self) -> Vec<CharacterSummary> {
        self.characters.values().cloned().collect()
    }

    /// Sticker ids of `character`, ascending.
    pub fn list_stickers(&self, character: &str) -> StickerResult<Vec<u32>> {
        self.summary(character).map(|c| c.sticker_ids.clone())
    }

    /// Summary of one character.
    pub fn summary(&self, character: &str) -> StickerResult<&CharacterSummary> {
        self.characters
            .get(&character.trim().to_lowercase())
            .ok_or_else(|| StickerError::not_found(format!("character '{}'", character.trim())))
    }

    /// Templates in catalogue order.
    pub fn templates(&self) -> impl Iterator<Item = &Arc<TemplateMetadata>> {
        self.templates.iter()
    }

    /// Uniformly random template.
    pub fn random_template(&self) -> Arc<TemplateMetadata> {
        self.random_template_with(&mut rand::rng())
    }

    /// Uniformly random template drawn from `rng`.
    pub fn random_template_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Arc<TemplateMetadata> {
        let idx = rng.random_range(0..self.templates.len());
        Arc::clone(&self.templates[idx])
    }
}

fn check_image(
    t: &TemplateMetadata,
    resource_root: &Path,
    missing: MissingImages,
) -> StickerResult<()> {
    let rel = normalize_rel_path(&t.image_ref).map_err(|e| {
        StickerError::catalogue_load(format!("sticker {}: {e}", t.sticker_id))
    })?;
    let path = resource_root.join(rel);
    if !path.exists() {
        return match missing {
            MissingImages::FetchLazily => Ok(()),
            MissingImages::Reject => Err(StickerError::catalogue_load(format!(
                "sticker {}: image '{}' not found",
                t.sticker_id,
                path.display()
            ))),
        };
    }
    image::image_dimensions(&path).map_err(|e| {
        StickerError::catalogue_load(format!(
            "sticker {}: unreadable image '{}': {e}",
            t.sticker_id,
            path.display()
        ))
    })?;
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/catalogue/store.rs"]
mod tests;
