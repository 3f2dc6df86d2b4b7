use std::time::Duration;

use blocks::event::LogSink;
use rand::RngCore;

use crate::sprite::SpriteState;

/// A speech bubble request.
#[derive(Debug, Clone, PartialEq)]
pub struct Speech {
    pub text: String,
    pub duration: Duration,
}

/// Where sprite changes are shown.
pub trait Stage {
    /// Called after every change to the sprite. `transition` is how long
    /// the change should take on screen; zero means it is instant.
    fn render(&mut self, sprite: &SpriteState, transition: Duration);

    /// Show a bubble; the stage takes it down after `speech.duration`.
    fn speak(&mut self, speech: &Speech);
}

/// A stage that shows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStage;

impl Stage for NullStage {
    fn render(&mut self, _sprite: &SpriteState, _transition: Duration) {}

    fn speak(&mut self, _speech: &Speech) {}
}

/// Everything one run reads and writes, passed explicitly to every block.
pub struct Context<'h> {
    pub sprite: SpriteState,
    pub log: &'h mut dyn LogSink,
    pub stage: &'h mut dyn Stage,
    /// Drives `glide` targets and the stub conditions of `if`.
    pub rng: &'h mut dyn RngCore,
}

impl<'h> Context<'h> {
    pub fn new(log: &'h mut dyn LogSink, stage: &'h mut dyn Stage, rng: &'h mut dyn RngCore) -> Self {
        Context {
            sprite: SpriteState::default(),
            log,
            stage,
            rng,
        }
    }

    pub fn with_sprite(mut self, sprite: SpriteState) -> Self {
        self.sprite = sprite;
        self
    }

    pub(crate) fn render(&mut self, transition: Duration) {
        self.stage.render(&self.sprite, transition);
    }
}
