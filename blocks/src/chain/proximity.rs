/// How close a dragged block landed to a potential predecessor.
///
/// The registry never measures layout itself; the host either reports a
/// precomputed verdict or the distance between the predecessor's bottom-edge
/// midpoint and the successor's top-edge midpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Proximity {
    Adjacent(bool),
    Distance(f64),
}

impl Proximity {
    /// Distance between two points given in the host's pixel space.
    pub fn between(bottom_mid: (f64, f64), top_mid: (f64, f64)) -> Self {
        let dx = bottom_mid.0 - top_mid.0;
        let dy = bottom_mid.1 - top_mid.1;
        Proximity::Distance(dx.hypot(dy))
    }

    /// A distance connects only when strictly inside the tolerance.
    pub fn within(&self, tolerance: f64) -> bool {
        match *self {
            Proximity::Adjacent(adjacent) => adjacent,
            Proximity::Distance(d) => d.is_finite() && d < tolerance,
        }
    }
}
