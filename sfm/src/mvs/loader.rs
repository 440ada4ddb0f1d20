use super::graph::StereoPairGraph;
use super::lookup::LookUpImages;
use super::{MvsError, Result};
use image::GrayImage;

/// Holds the images of exactly one cluster: a center and its neighbors.
///
/// Reset before every candidate center so memory stays bounded by the
/// largest cluster rather than by the scene.
#[derive(Debug, Default)]
pub struct ClusterImageLoader {
    images: Vec<(usize, GrayImage)>,
    center: Option<usize>,
    peak_loaded: usize,
}

impl ClusterImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases every image. The peak counter is kept.
    pub fn reset(&mut self) {
        self.images.clear();
        self.center = None;
    }

    /// Loads the neighbor images of a cluster, returning how many were loaded.
    pub fn load_neighbors<L: LookUpImages + ?Sized>(
        &mut self,
        lookup: &L,
        graph: &StereoPairGraph,
        neighbors: &[usize],
    ) -> Result<usize> {
        for &vertex in neighbors {
            self.load(lookup, graph, vertex)?;
        }
        Ok(neighbors.len())
    }

    pub fn load_center<L: LookUpImages + ?Sized>(
        &mut self,
        lookup: &L,
        graph: &StereoPairGraph,
        center: usize,
    ) -> Result<()> {
        self.load(lookup, graph, center)?;
        self.center = Some(center);
        Ok(())
    }

    fn load<L: LookUpImages + ?Sized>(
        &mut self,
        lookup: &L,
        graph: &StereoPairGraph,
        vertex: usize,
    ) -> Result<()> {
        if self.image(vertex).is_some() {
            return Ok(());
        }
        let id = &graph.vertex(vertex).id;
        let image = lookup.load_image(id).map_err(|source| MvsError::Resource {
            id: id.clone(),
            source,
        })?;
        tracing::debug!("Loaded image {} ({}x{})", id, image.width(), image.height());
        self.images.push((vertex, image));
        self.peak_loaded = self.peak_loaded.max(self.images.len());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn center(&self) -> Option<usize> {
        self.center
    }

    pub fn image(&self, vertex: usize) -> Option<&GrayImage> {
        self.images
            .iter()
            .find(|(v, _)| *v == vertex)
            .map(|(_, img)| img)
    }

    /// Loaded neighbor images in load order, excluding the center.
    pub fn neighbors(&self) -> impl Iterator<Item = (usize, &GrayImage)> + '_ {
        let center = self.center;
        self.images
            .iter()
            .filter(move |(v, _)| Some(*v) != center)
            .map(|(v, img)| (*v, img))
    }

    /// Largest number of images held at once since creation.
    pub fn peak_loaded(&self) -> usize {
        self.peak_loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvs::lookup::LookUpImagesMemory;

    fn setup() -> (StereoPairGraph, LookUpImagesMemory) {
        let mut graph = StereoPairGraph::new();
        let mut lookup = LookUpImagesMemory::new();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            graph.add_vertex(*id, i).unwrap();
            lookup.insert(*id, GrayImage::new(4 + i as u32, 4));
        }
        graph.add_vertex("missing", 3).unwrap();
        (graph, lookup)
    }

    #[test]
    fn test_cluster_lifecycle() {
        let (graph, lookup) = setup();
        let mut loader = ClusterImageLoader::new();

        assert_eq!(loader.load_neighbors(&lookup, &graph, &[1, 2]).unwrap(), 2);
        loader.load_center(&lookup, &graph, 0).unwrap();
        assert_eq!(loader.len(), 3);
        assert_eq!(loader.center(), Some(0));
        assert_eq!(loader.image(2).unwrap().width(), 6);
        let neighbors: Vec<usize> = loader.neighbors().map(|(v, _)| v).collect();
        assert_eq!(neighbors, vec![1, 2]);

        loader.reset();
        assert!(loader.is_empty());
        assert_eq!(loader.center(), None);
        loader.load_neighbors(&lookup, &graph, &[1]).unwrap();
        assert_eq!(loader.peak_loaded(), 3);
    }

    #[test]
    fn test_missing_image_is_resource_error() {
        let (graph, lookup) = setup();
        let mut loader = ClusterImageLoader::new();
        let err = loader.load_neighbors(&lookup, &graph, &[0, 3]).unwrap_err();
        match err {
            MvsError::Resource { id, .. } => assert_eq!(id, "missing"),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
