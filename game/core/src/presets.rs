use crate::geometry::Vector;
use crate::pattern::Pattern;

/// Read-only indexed collection of the patterns available for placement.
/// Built once by the host and shared across the process lifetime.
pub struct Presets {
    patterns: Vec<Pattern>,
}

impl Presets {
    #[inline]
    pub fn new(patterns: Vec<Pattern>) -> Presets {
        Presets { patterns }
    }

    #[inline]
    pub fn empty() -> Presets {
        Presets {
            patterns: Vec::new(),
        }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.patterns.len()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Pattern> {
        self.patterns.get(index)
    }

    #[inline]
    pub fn name(&self, index: usize) -> &str {
        self.patterns[index].name()
    }

    #[inline]
    pub fn units(&self, index: usize) -> &[Vector] {
        self.patterns[index].units()
    }

    #[inline]
    pub fn size(&self, index: usize) -> usize {
        self.patterns[index].size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexed_access() {
        let presets = Presets::new(vec![
            Pattern::new("dot", vec![Vector::ZERO]),
            Pattern::new("pair", vec![Vector::new(0, 0), Vector::new(1, 0)]),
        ]);

        assert_eq!(presets.count(), 2);
        assert_eq!(presets.name(0), "dot");
        assert_eq!(presets.size(1), 2);
        assert_eq!(presets.units(1)[1], Vector::new(1, 0));
        assert!(presets.get(2).is_none());
    }
}
