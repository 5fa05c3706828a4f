use crate::page::{ToolCard, ToolId};

/// How a card was activated. Pointer and keyboard activation are equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Pointer,
    Space,
    Enter,
}

/// Keys the catalog sees while a card has focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardKey {
    Space,
    Enter,
    Other,
}

impl CardKey {
    fn activation(self) -> Option<Activation> {
        match self {
            CardKey::Space => Some(Activation::Space),
            CardKey::Enter => Some(Activation::Enter),
            CardKey::Other => None,
        }
    }
}

/// What the user sees for one card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardView {
    pub card: ToolCard,
    /// Highlight styling.
    pub highlighted: bool,
    /// Pressed state announced to assistive technology.
    pub pressed: bool,
}

/// Tools chosen on one catalog screen.
///
/// Lives exactly as long as the page: created empty from the rendered cards
/// and dropped on navigation. The visual state of a card and its membership
/// in the selection are only ever changed together, in `toggle_at`.
#[derive(Debug, Clone, Default)]
pub struct SelectionTracker {
    views: Vec<CardView>,
    order: Vec<ToolId>,
}

impl SelectionTracker {
    pub fn new(cards: impl IntoIterator<Item = ToolCard>) -> Self {
        let views = cards
            .into_iter()
            .map(|card| CardView {
                card,
                highlighted: false,
                pressed: false,
            })
            .collect();
        Self {
            views,
            order: Vec::new(),
        }
    }

    pub fn cards(&self) -> &[CardView] {
        &self.views
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Flip the card at `index`. Returns the new selected state, or `None`
    /// when there is no such card.
    pub fn toggle_at(&mut self, index: usize, how: Activation) -> Option<bool> {
        let view = self.views.get_mut(index)?;
        let now_selected = !view.pressed;
        view.pressed = now_selected;
        view.highlighted = now_selected;

        if now_selected {
            self.order.push(view.card.id.clone());
        } else {
            self.order.retain(|id| *id != view.card.id);
        }
        tracing::debug!(tool = %view.card.id, selected = now_selected, ?how, "card toggled");
        Some(now_selected)
    }

    pub fn toggle(&mut self, id: &ToolId, how: Activation) -> Option<bool> {
        let index = self.views.iter().position(|v| v.card.id == *id)?;
        self.toggle_at(index, how)
    }

    /// Keyboard handling for a focused card. Space and Enter toggle it and
    /// are consumed so they do not also trigger anything else; other keys
    /// pass through untouched.
    pub fn key_at(&mut self, index: usize, key: CardKey) -> bool {
        match key.activation() {
            Some(how) => {
                self.toggle_at(index, how);
                true
            }
            None => false,
        }
    }

    /// Selected ids in the order they were (last) selected.
    pub fn current_selection_ids(&self) -> Vec<ToolId> {
        self.order.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_selected(&self, id: &ToolId) -> bool {
        self.order.contains(id)
    }

    /// True when every card's visual state agrees with the selection.
    pub fn is_consistent(&self) -> bool {
        self.views.iter().all(|v| {
            let member = self.order.contains(&v.card.id);
            v.pressed == member && v.highlighted == member
        }) && self.order.len() == self.views.iter().filter(|v| v.pressed).count()
    }
}
