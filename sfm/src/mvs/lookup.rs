//! Access to the images of a scene by view id.
//!
//! A scene easily has more images than fit in memory, so images are requested
//! one cluster at a time instead of being handed over up front.

use cv_core::{Error, ImageDimension, Result};
use image::GrayImage;
use std::collections::HashMap;
use std::path::PathBuf;

pub trait LookUpImages {
    /// Image shape, without necessarily decoding the pixels.
    fn load_shape(&self, id: &str) -> Result<ImageDimension>;

    fn load_image(&self, id: &str) -> Result<GrayImage>;
}

impl<L: LookUpImages + ?Sized> LookUpImages for &L {
    fn load_shape(&self, id: &str) -> Result<ImageDimension> {
        (**self).load_shape(id)
    }

    fn load_image(&self, id: &str) -> Result<GrayImage> {
        (**self).load_image(id)
    }
}

/// Images already decoded and held in memory.
#[derive(Debug, Clone, Default)]
pub struct LookUpImagesMemory {
    images: HashMap<String, GrayImage>,
}

impl LookUpImagesMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, image: GrayImage) {
        self.images.insert(id.into(), image);
    }

    pub fn with_image(mut self, id: impl Into<String>, image: GrayImage) -> Self {
        self.insert(id, image);
        self
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    fn get(&self, id: &str) -> Result<&GrayImage> {
        self.images
            .get(id)
            .ok_or_else(|| Error::InvalidInput(format!("no image for view '{id}'")))
    }
}

impl LookUpImages for LookUpImagesMemory {
    fn load_shape(&self, id: &str) -> Result<ImageDimension> {
        self.get(id).map(ImageDimension::of)
    }

    fn load_image(&self, id: &str) -> Result<GrayImage> {
        self.get(id).cloned()
    }
}

/// Images decoded from disk on demand and converted to gray scale.
#[derive(Debug, Clone, Default)]
pub struct LookUpImageFiles {
    paths: HashMap<String, PathBuf>,
}

impl LookUpImageFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, path: impl Into<PathBuf>) {
        self.paths.insert(id.into(), path.into());
    }

    /// Uses each file stem as the view id.
    pub fn from_paths<I, P>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut lookup = Self::new();
        for path in paths {
            let path = path.into();
            let id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| Error::InvalidInput(format!("no file stem in {}", path.display())))?
                .to_string();
            if lookup.paths.contains_key(&id) {
                return Err(Error::InvalidInput(format!("duplicate view id '{id}'")));
            }
            lookup.paths.insert(id, path);
        }
        Ok(lookup)
    }

    fn path(&self, id: &str) -> Result<&PathBuf> {
        self.paths
            .get(id)
            .ok_or_else(|| Error::InvalidInput(format!("no image file for view '{id}'")))
    }
}

impl LookUpImages for LookUpImageFiles {
    fn load_shape(&self, id: &str) -> Result<ImageDimension> {
        let (width, height) = image::image_dimensions(self.path(id)?)?;
        Ok(ImageDimension::new(width, height))
    }

    fn load_image(&self, id: &str) -> Result<GrayImage> {
        Ok(image::open(self.path(id)?)?.into_luma8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_memory_lookup() {
        let lookup = LookUpImagesMemory::new().with_image("v0", GrayImage::new(8, 6));
        assert_eq!(lookup.load_shape("v0").unwrap(), ImageDimension::new(8, 6));
        assert_eq!(lookup.load_image("v0").unwrap().dimensions(), (8, 6));
        assert!(lookup.load_image("v1").is_err());
    }

    #[test]
    fn test_file_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("view_a.png");
        let mut img = GrayImage::new(5, 4);
        img.put_pixel(2, 1, Luma([77]));
        img.save(&path).unwrap();

        let lookup = LookUpImageFiles::from_paths([path]).unwrap();
        assert_eq!(lookup.load_shape("view_a").unwrap(), ImageDimension::new(5, 4));
        let loaded = lookup.load_image("view_a").unwrap();
        assert_eq!(loaded.get_pixel(2, 1)[0], 77);

        assert!(lookup.load_image("view_b").is_err());
    }

    #[test]
    fn test_file_lookup_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut lookup = LookUpImageFiles::new();
        lookup.insert("gone", dir.path().join("gone.png"));
        assert!(lookup.load_shape("gone").is_err());
        assert!(lookup.load_image("gone").is_err());
    }
}
