use crate::geometry::Vector;

/// A named Life pattern. Offsets are normalized so the pattern is centered
/// on the origin; placement maps them through an affine transform.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Pattern {
    name: String,
    units: Vec<Vector>,
}

impl Pattern {
    #[inline]
    pub fn new<S: Into<String>>(name: S, units: Vec<Vector>) -> Pattern {
        Pattern {
            name: name.into(),
            units,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn units(&self) -> &[Vector] {
        &self.units
    }

    /// Number of live cells in the pattern.
    #[inline]
    pub fn size(&self) -> usize {
        self.units.len()
    }
}
