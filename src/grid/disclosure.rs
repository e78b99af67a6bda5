//! Collapsible recognized text

use std::borrow::Cow;

/// Characters shown while collapsed
pub const PREVIEW_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextDisclosure {
    expanded: bool,
}

impl TextDisclosure {
    pub fn toggle(&mut self) {
        self.expanded = !self.expanded;
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    /// Whether `text` is long enough to need a toggle at all
    pub fn applies_to(text: &str) -> bool {
        text.chars().count() > PREVIEW_CHARS
    }

    pub fn render<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if self.expanded || !Self::applies_to(text) {
            return Cow::Borrowed(text);
        }
        let preview: String = text.chars().take(PREVIEW_CHARS).collect();
        Cow::Owned(format!("{}...", preview))
    }
}
