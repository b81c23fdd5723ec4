use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::OrientationFilter;

/// Opaque handle for one selectable image.
///
/// The id is whatever the selection store recorded (a filesystem path for the
/// file-backed store). The orientation is a cached hint and may be `Unknown`
/// until a sink has decoded the image once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    id: Arc<str>,
    orientation: Orientation,
}

impl ImageRef {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            orientation: Orientation::Unknown,
        }
    }

    pub fn with_orientation(&self, orientation: Orientation) -> Self {
        Self {
            id: Arc::clone(&self.id),
            orientation,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Orientation {
    Landscape,
    Portrait,
    #[default]
    Unknown,
}

impl Orientation {
    /// Square images count as landscape; degenerate sizes stay unknown.
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        if width == 0 || height == 0 {
            Self::Unknown
        } else if height > width {
            Self::Portrait
        } else {
            Self::Landscape
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Landscape => "landscape",
            Self::Portrait => "portrait",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "landscape" => Some(Self::Landscape),
            "portrait" => Some(Self::Portrait),
            "unknown" | "" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orientations learned from decoded pixels, keyed by image id.
///
/// Shared between the scheduler and manual steps; it only ever gains
/// information and never touches a `PlaylistState`.
#[derive(Debug, Clone, Default)]
pub struct OrientationCache {
    inner: Arc<RwLock<HashMap<Arc<str>, Orientation>>>,
}

impl OrientationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the recorded value changed.
    pub fn record(&self, image: &ImageRef, orientation: Orientation) -> bool {
        if !orientation.is_known() {
            return false;
        }
        let mut map = self.inner.write();
        let previous = map.insert(Arc::clone(&image.id), orientation);
        previous != Some(orientation)
    }

    pub fn resolve(&self, image: &ImageRef) -> Orientation {
        if image.orientation.is_known() {
            return image.orientation;
        }
        self.inner
            .read()
            .get(image.id())
            .copied()
            .unwrap_or(Orientation::Unknown)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Applies the orientation filter to a selection snapshot.
///
/// Images whose orientation is still unknown are always kept. Every returned
/// ref carries its resolved orientation so sinks can skip re-deriving it.
pub fn filtered_view(
    selection: &[ImageRef],
    filter: OrientationFilter,
    cache: &OrientationCache,
) -> Vec<ImageRef> {
    selection
        .iter()
        .filter_map(|image| {
            let orientation = cache.resolve(image);
            let keep = match (filter, orientation) {
                (OrientationFilter::All, _) => true,
                (_, Orientation::Unknown) => true,
                (OrientationFilter::Landscape, o) => o == Orientation::Landscape,
                (OrientationFilter::Portrait, o) => o == Orientation::Portrait,
            };
            keep.then(|| image.with_orientation(orientation))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(ids: &[&str]) -> Vec<ImageRef> {
        ids.iter().map(|id| ImageRef::new(*id)).collect()
    }

    #[test]
    fn orientation_from_dimensions() {
        assert_eq!(Orientation::from_dimensions(400, 300), Orientation::Landscape);
        assert_eq!(Orientation::from_dimensions(300, 400), Orientation::Portrait);
        assert_eq!(Orientation::from_dimensions(300, 300), Orientation::Landscape);
        assert_eq!(Orientation::from_dimensions(0, 300), Orientation::Unknown);
    }

    #[test]
    fn unknown_images_survive_landscape_filter_until_resolved() {
        let selection = refs(&["a", "b"]);
        let cache = OrientationCache::new();
        cache.record(&selection[0], Orientation::Landscape);

        let view = filtered_view(&selection, OrientationFilter::Landscape, &cache);
        assert_eq!(view.len(), 2);
        assert_eq!(view[0].orientation(), Orientation::Landscape);
        assert_eq!(view[1].orientation(), Orientation::Unknown);

        assert!(cache.record(&selection[1], Orientation::Portrait));
        let view = filtered_view(&selection, OrientationFilter::Landscape, &cache);
        assert_eq!(view.iter().map(ImageRef::id).collect::<Vec<_>>(), ["a"]);
    }

    #[test]
    fn hint_on_ref_wins_over_cache() {
        let image = ImageRef::new("a").with_orientation(Orientation::Portrait);
        let cache = OrientationCache::new();
        cache.record(&image, Orientation::Landscape);
        assert_eq!(cache.resolve(&image), Orientation::Portrait);
    }

    #[test]
    fn recording_same_value_twice_reports_no_change() {
        let cache = OrientationCache::new();
        let image = ImageRef::new("a");
        assert!(cache.record(&image, Orientation::Portrait));
        assert!(!cache.record(&image, Orientation::Portrait));
        assert!(!cache.record(&image, Orientation::Unknown));
        assert_eq!(cache.len(), 1);
    }
}
