use std::fmt;

pub const STAGE_MIN: f64 = 0.0;
pub const STAGE_MAX: f64 = 100.0;
pub const MIN_SIZE: f64 = 10.0;
pub const MAX_SIZE: f64 = 300.0;
/// Distance from the border at which the sprite counts as touching it.
pub const EDGE_MARGIN: f64 = 5.0;

/// The actor every block acts on.
///
/// Position is in stage percent, `[0, 100]` on both axes with y growing
/// downwards. Rotation is in degrees and is never wrapped. Size is a
/// percentage of the costume's natural size.
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteState {
    pub x: f64,
    pub y: f64,
    pub rotation: f64,
    pub size: f64,
    pub visible: bool,
}

impl Default for SpriteState {
    fn default() -> Self {
        SpriteState {
            x: 50.0,
            y: 50.0,
            rotation: 0.0,
            size: 100.0,
            visible: true,
        }
    }
}

impl SpriteState {
    /// Walk `steps` units along the current heading, stopping at the border.
    pub fn advance(&mut self, steps: f64) {
        let radians = self.rotation.to_radians();
        let x = self.x + radians.cos() * steps;
        let y = self.y + radians.sin() * steps;
        self.set_position(x, y);
    }

    /// A turn that would leave the heading non-finite is dropped.
    pub fn turn(&mut self, degrees: f64) {
        let rotation = self.rotation + degrees;
        if rotation.is_finite() {
            self.rotation = rotation;
        }
    }

    /// Ignores targets that are not finite numbers.
    pub fn set_position(&mut self, x: f64, y: f64) {
        if !(x.is_finite() && y.is_finite()) {
            return;
        }
        self.x = x.clamp(STAGE_MIN, STAGE_MAX);
        self.y = y.clamp(STAGE_MIN, STAGE_MAX);
    }

    /// Move to a point given in the ±100 coordinates users type into blocks.
    pub fn move_to_logical(&mut self, x: f64, y: f64) {
        self.set_position((x + 100.0) / 2.0, (y + 100.0) / 2.0);
    }

    pub fn change_size(&mut self, delta: f64) {
        let size = self.size + delta;
        if size.is_finite() {
            self.size = size.clamp(MIN_SIZE, MAX_SIZE);
        }
    }

    pub fn is_near_edge(&self) -> bool {
        self.x <= STAGE_MIN + EDGE_MARGIN
            || self.x >= STAGE_MAX - EDGE_MARGIN
            || self.y <= STAGE_MIN + EDGE_MARGIN
            || self.y >= STAGE_MAX - EDGE_MARGIN
    }
}

impl fmt::Display for SpriteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "position ({:.1}, {:.1}), rotation {}°, size {}%, {}",
            self.x,
            self.y,
            self.rotation,
            self.size,
            if self.visible { "visible" } else { "hidden" }
        )
    }
}
