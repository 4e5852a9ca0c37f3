use serde::{Deserialize, Serialize};

/// Nesting level of a panel, used to alternate background shading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Surface {
    pub depth: u32,
    /// Flips on every level so adjacent surfaces contrast.
    pub alternate: bool,
}

impl Surface {
    pub fn root() -> Self {
        Self::default()
    }

    /// The surface one level inside this one.
    pub fn nested(self) -> Self {
        Self {
            depth: self.depth.saturating_add(1),
            alternate: !self.alternate,
        }
    }

    pub fn is_root(&self) -> bool {
        self.depth == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nesting_alternates() {
        let root = Surface::root();
        assert!(root.is_root());
        assert!(!root.alternate);

        let card = root.nested();
        let inset = card.nested();
        assert_eq!(card, Surface { depth: 1, alternate: true });
        assert_eq!(inset, Surface { depth: 2, alternate: false });
        assert!(!inset.is_root());
    }
}
