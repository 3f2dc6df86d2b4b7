use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Tunables of the interpreter. Every field has a default, so a partial
/// `[settings]` table is enough.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Settings {
    /// Distance covered by one `move` block, in stage units.
    #[serde(deserialize_with = "finite")]
    pub move_step: f64,
    /// Rotation applied by `turn-right` / `turn-left`, in degrees.
    #[serde(deserialize_with = "finite")]
    pub turn_degrees: f64,
    /// Animation settle time after `move`.
    pub move_settle_ms: u64,
    /// Animation settle time after `move-to`.
    pub move_to_settle_ms: u64,
    /// Pause after every `forever` round so the host stays responsive.
    pub forever_pacing_ms: u64,
    /// How long the plain `say` bubble stays up.
    pub say_duration_ms: u64,
    pub say_text: String,
    /// Iterations of a `repeat` block without a `times` value.
    pub default_repeat: u32,
    /// Log one `forever` round out of this many. 0 disables round logging.
    pub forever_log_every: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            move_step: 10.0,
            turn_degrees: 15.0,
            move_settle_ms: 300,
            move_to_settle_ms: 500,
            forever_pacing_ms: 50,
            say_duration_ms: 2000,
            say_text: "Hello".to_string(),
            default_repeat: 10,
            forever_log_every: 5,
        }
    }
}

impl Settings {
    pub fn move_settle(&self) -> Duration {
        Duration::from_millis(self.move_settle_ms)
    }

    pub fn move_to_settle(&self) -> Duration {
        Duration::from_millis(self.move_to_settle_ms)
    }

    /// Never zero: a `forever` round must always give up control.
    pub fn forever_pacing(&self) -> Duration {
        Duration::from_millis(self.forever_pacing_ms.max(1))
    }

    pub fn say_duration(&self) -> Duration {
        Duration::from_millis(self.say_duration_ms)
    }
}

/// TOML accepts `nan` and `inf`; the sprite cannot move by either.
fn finite<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = f64::deserialize(deserializer)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(serde::de::Error::custom(format!(
            "expected a finite number, found {}",
            value
        )))
    }
}
