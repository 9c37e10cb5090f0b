//! Content-addressed texture store.
//!
//! Uploads are decoded, their pixel data hashed, and identical images are
//! deduplicated to a single stored entry. The hash covers the decoded
//! pixels rather than the file bytes, with fully transparent pixels
//! normalized, so re-encoded or transparency-noised copies of the same
//! image land on the same entry.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use image::{DynamicImage, ImageFormat, RgbaImage};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("bad image")]
pub struct BadImage;

/// An immutable stored texture: content hash, canonical PNG bytes, and the
/// public URL it is served under.
#[derive(Debug)]
pub struct Texture {
    pub hash: String,
    pub data: Vec<u8>,
    pub url: String,
}

pub struct TextureStore {
    root_url: String,
    textures: DashMap<String, Arc<Texture>>,
}

impl TextureStore {
    /// `root_url` is the public base the server is reachable under; stored
    /// textures are addressed as `{root_url}/textures/{hash}`.
    #[must_use]
    pub fn new(root_url: &str) -> Self {
        Self {
            root_url: root_url.trim_end_matches('/').to_string(),
            textures: DashMap::new(),
        }
    }

    /// Decode `bytes`, hash the pixels, and return the stored texture for
    /// that hash, inserting a freshly re-encoded one if none exists.
    /// Concurrent first-time uploads of the same image resolve to a single
    /// winner; losers drop their copy and return the winner's.
    pub fn store(&self, bytes: &[u8]) -> Result<Arc<Texture>, BadImage> {
        let image = image::load_from_memory(bytes).map_err(|_| BadImage)?;
        let pixels = image.to_rgba8();
        let hash = compute_texture_hash(&pixels);

        if let Some(existing) = self.textures.get(&hash) {
            return Ok(Arc::clone(&existing));
        }

        let mut encoded = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(pixels)
            .write_to(&mut encoded, ImageFormat::Png)
            .map_err(|_| BadImage)?;
        let texture = Arc::new(Texture {
            url: format!("{}/textures/{hash}", self.root_url),
            hash: hash.clone(),
            data: encoded.into_inner(),
        });

        let winner = match self.textures.entry(hash) {
            Entry::Occupied(existing) => Arc::clone(existing.get()),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&texture));
                texture
            }
        };
        Ok(winner)
    }

    #[must_use]
    pub fn fetch(&self, hash: &str) -> Option<Arc<Texture>> {
        self.textures.get(hash).map(|t| Arc::clone(&t))
    }
}

/// SHA-256 over `width ++ height` (big-endian u32s) followed by every
/// pixel's ARGB bytes in column-major order, with RGB zeroed wherever the
/// alpha channel is zero.
#[must_use]
pub fn compute_texture_hash(image: &RgbaImage) -> String {
    let width = image.width();
    let height = image.height();

    let mut digest = Sha256::new();
    digest.update(width.to_be_bytes());
    digest.update(height.to_be_bytes());

    let mut buf = Vec::with_capacity((width * height * 4) as usize);
    for x in 0..width {
        for y in 0..height {
            let pixel = image.get_pixel(x, y).0;
            let alpha = pixel[3];
            if alpha == 0 {
                buf.extend_from_slice(&[0, 0, 0, 0]);
            } else {
                buf.extend_from_slice(&[alpha, pixel[0], pixel[1], pixel[2]]);
            }
        }
    }
    digest.update(&buf);

    hex::encode(digest.finalize())
}
