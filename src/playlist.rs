use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use tracing::debug;

use crate::config::OrderMode;
use crate::model::ImageRef;

/// What decides whether the playback order must be rebuilt.
///
/// Deliberately blind to the order of the selection: reordering the same ids
/// under the same mode keeps the current order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    order: OrderMode,
    len: usize,
    ids: BTreeSet<Arc<str>>,
}

impl Signature {
    pub fn of(order: OrderMode, selection: &[ImageRef]) -> Self {
        Self {
            order,
            len: selection.len(),
            ids: selection.iter().map(|image| Arc::from(image.id())).collect(),
        }
    }

    pub fn order(&self) -> OrderMode {
        self.order
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The scheduler's private cursor over one generated order.
#[derive(Debug, Clone)]
pub struct PlaylistState {
    order: Vec<ImageRef>,
    signature: Signature,
    index: usize,
}

impl PlaylistState {
    pub fn order(&self) -> &[ImageRef] {
        &self.order
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// `order[index mod len]`; `None` only for an empty order.
    pub fn current(&self) -> Option<&ImageRef> {
        if self.order.is_empty() {
            return None;
        }
        self.order.get(self.index % self.order.len())
    }

    /// Element at `offset` positions from the start of the order, wrapping both ways.
    pub fn at_offset(&self, offset: isize) -> Option<&ImageRef> {
        let len = self.order.len();
        if len == 0 {
            return None;
        }
        let idx = offset.rem_euclid(len as isize) as usize;
        self.order.get(idx)
    }

    pub fn advance(&mut self) {
        self.index = self.index.wrapping_add(1);
    }
}

/// Result of [`OrderGenerator::refresh`].
#[derive(Debug)]
pub enum Refresh {
    /// Signature unchanged; the previous state is handed back untouched.
    Kept(PlaylistState),
    /// A new order starting at index 0.
    Regenerated(PlaylistState),
    /// Nothing to play. The previous state, if any, is handed back untouched.
    Empty(Option<PlaylistState>),
}

impl Refresh {
    pub fn into_state(self) -> Option<PlaylistState> {
        match self {
            Self::Kept(state) | Self::Regenerated(state) => Some(state),
            Self::Empty(_) => None,
        }
    }
}

/// Derives playback orders from selection snapshots.
pub struct OrderGenerator {
    rng: StdRng,
}

impl OrderGenerator {
    /// Shuffles are seeded from the wall clock: not reproducible across runs.
    pub fn from_clock() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self::with_seed(nanos)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn refresh(
        &mut self,
        selection: &[ImageRef],
        order: OrderMode,
        previous: Option<PlaylistState>,
    ) -> Refresh {
        if selection.is_empty() {
            return Refresh::Empty(previous);
        }
        let signature = Signature::of(order, selection);
        match previous {
            Some(prev) if prev.signature == signature => Refresh::Kept(prev),
            prev => {
                debug!(
                    order = ?order,
                    len = signature.len,
                    had_previous = prev.is_some(),
                    "regenerating playback order"
                );
                Refresh::Regenerated(self.generate(selection, signature))
            }
        }
    }

    /// Always builds a new order, as manual stepping does.
    pub fn fresh(&mut self, selection: &[ImageRef], order: OrderMode) -> Option<PlaylistState> {
        if selection.is_empty() {
            return None;
        }
        let signature = Signature::of(order, selection);
        Some(self.generate(selection, signature))
    }

    fn generate(&mut self, selection: &[ImageRef], signature: Signature) -> PlaylistState {
        let mut order = selection.to_vec();
        if signature.order == OrderMode::Random {
            order.shuffle(&mut self.rng);
        }
        PlaylistState {
            order,
            signature,
            index: 0,
        }
    }
}

impl Default for OrderGenerator {
    fn default() -> Self {
        Self::from_clock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(ids: &[&str]) -> Vec<ImageRef> {
        ids.iter().map(|id| ImageRef::new(*id)).collect()
    }

    fn ids(state: &PlaylistState) -> Vec<&str> {
        state.order().iter().map(ImageRef::id).collect()
    }

    #[test]
    fn offsets_wrap_in_both_directions() {
        let mut generator = OrderGenerator::with_seed(1);
        let state = generator
            .fresh(&refs(&["a", "b", "c"]), OrderMode::Sequential)
            .unwrap();
        assert_eq!(state.at_offset(1).unwrap().id(), "b");
        assert_eq!(state.at_offset(-1).unwrap().id(), "c");
        assert_eq!(state.at_offset(4).unwrap().id(), "b");
    }

    #[test]
    fn current_wraps_with_index() {
        let mut generator = OrderGenerator::with_seed(1);
        let mut state = generator
            .fresh(&refs(&["a", "b"]), OrderMode::Sequential)
            .unwrap();
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(state.current().unwrap().id().to_string());
            state.advance();
        }
        assert_eq!(seen, ["a", "b", "a", "b", "a"]);
    }

    #[test]
    fn empty_selection_is_not_regenerated() {
        let mut generator = OrderGenerator::with_seed(1);
        assert!(matches!(
            generator.refresh(&[], OrderMode::Random, None),
            Refresh::Empty(None)
        ));
        assert!(generator.fresh(&[], OrderMode::Sequential).is_none());
    }

    #[test]
    fn sequential_order_matches_selection() {
        let mut generator = OrderGenerator::with_seed(3);
        let selection = refs(&["c", "a", "b"]);
        let state = generator
            .refresh(&selection, OrderMode::Sequential, None)
            .into_state()
            .unwrap();
        assert_eq!(ids(&state), ["c", "a", "b"]);
        assert_eq!(state.index(), 0);
    }
}
