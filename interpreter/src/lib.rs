pub mod clock;
pub mod condition;
pub mod context;
pub mod control;
pub mod executor;
pub mod settings;
pub mod sprite;
pub mod tracing_sink;

pub use clock::{Clock, ManualClock, TokioClock};
pub use context::{Context, NullStage, Speech, Stage};
pub use control::{RunControl, RunState};
pub use executor::{Interpreter, RunOutcome};
pub use settings::Settings;
pub use sprite::SpriteState;
pub use tracing_sink::TracingLog;
