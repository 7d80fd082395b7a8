//! Virtual knob with hard stops

use std::fmt;

/// Bounded knob position
///
/// The position always stays within `[min, max]`; moves past a bound are
/// clamped and reported as a limit hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnobState {
    name: String,
    position: i32,
    min: i32,
    max: i32,
}

impl KnobState {
    /// Create a knob; `initial` is clamped into range
    pub fn new(name: impl Into<String>, initial: i32, min: i32, max: i32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            name: name.into(),
            position: initial.clamp(min, max),
            min,
            max,
        }
    }

    /// Move by `delta`, clamping at the bounds
    ///
    /// Returns `(new_position, hit_limit)`. `hit_limit` is true only for a
    /// non-zero move whose target lay outside the range.
    pub fn adjust(&mut self, delta: i32) -> (i32, bool) {
        let target = self.position.saturating_add(delta);
        self.position = target.clamp(self.min, self.max);
        let hit_limit = delta != 0 && self.position != target;
        (self.position, hit_limit)
    }

    /// Jump straight to `value` (clamped); used for resync
    pub fn set(&mut self, value: i32) -> i32 {
        self.position = value.clamp(self.min, self.max);
        self.position
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn at_max(&self) -> bool {
        self.position == self.max
    }
}

impl fmt::Display for KnobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.name, self.position, self.max)
    }
}
