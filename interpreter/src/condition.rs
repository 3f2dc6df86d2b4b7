use blocks::block::Condition;
use rand::{Rng, RngCore};

use crate::sprite::SpriteState;

/// Chance that the mouse-clicked stub reports a click.
pub const MOUSE_CLICK_CHANCE: f64 = 0.3;
/// Chance that the key-pressed stub reports a key press.
pub const KEY_PRESS_CHANCE: f64 = 0.2;

/// Decide an `if` block's condition. Input conditions are not tied to real
/// input and are drawn from `rng`.
pub fn evaluate(condition: Condition, sprite: &SpriteState, rng: &mut dyn RngCore) -> bool {
    match condition {
        Condition::Always => true,
        Condition::SpriteEdge => sprite.is_near_edge(),
        Condition::MouseClicked => rng.gen_bool(MOUSE_CLICK_CHANCE),
        Condition::KeyPressed => rng.gen_bool(KEY_PRESS_CHANCE),
    }
}
