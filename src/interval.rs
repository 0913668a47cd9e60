//! Interval arithmetic for ray parameter ranges.
//!
//! Closed intervals [min, max] used to map hit distances over the render
//! distance range.

/// Closed interval [min, max] for range checking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    /// Minimum value of the interval
    pub min: f32,
    /// Maximum value of the interval
    pub max: f32,
}

impl Interval {
    /// Create a new interval with given min and max values
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Calculate the size (width) of the interval
    pub fn size(&self) -> f32 {
        self.max - self.min
    }

    /// Map `x` linearly into [0, 1] over this interval, clamped.
    pub fn normalize(&self, x: f32) -> f32 {
        let size = self.size();
        if size <= 0.0 {
            return 0.0;
        }
        ((x - self.min) / size).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_outside_values() {
        let range = Interval::new(1.0, 3.0);
        assert_eq!(range.normalize(2.0), 0.5);
        assert_eq!(range.normalize(-4.0), 0.0);
        assert_eq!(range.normalize(9.0), 1.0);
        assert_eq!(Interval::new(2.0, 2.0).normalize(2.0), 0.0);
    }
}
