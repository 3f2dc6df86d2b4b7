use std::io::Write;
use std::time::Duration;

use blocks::{LogEvent, LogSink};
use interpreter::{Speech, SpriteState, Stage};
use owo_colors::OwoColorize;
use tracing::debug;

use crate::logging;

/// The log panel: one line per runtime event on stdout.
pub struct ConsoleLog<W> {
    out: W,
}

impl<W: Write> ConsoleLog<W> {
    pub fn new(out: W) -> Self {
        ConsoleLog { out }
    }
}

impl<W: Write> LogSink for ConsoleLog<W> {
    fn log(&mut self, event: LogEvent) {
        let _ = writeln!(
            self.out,
            "{} {}",
            logging::level_label(event.level),
            event.message
        );
    }
}

/// Text stand-in for the stage: speech goes to stdout, frames to the debug log.
pub struct TerminalStage<W> {
    out: W,
    frames: usize,
    animated: Duration,
}

impl<W: Write> TerminalStage<W> {
    pub fn new(out: W) -> Self {
        TerminalStage {
            out,
            frames: 0,
            animated: Duration::ZERO,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Total time spent in animated transitions so far.
    pub fn animated(&self) -> Duration {
        self.animated
    }
}

impl<W: Write> Stage for TerminalStage<W> {
    fn render(&mut self, sprite: &SpriteState, transition: Duration) {
        self.frames += 1;
        self.animated = self.animated.saturating_add(transition);
        debug!(frame = self.frames, %sprite, ?transition, "render");
    }

    fn speak(&mut self, speech: &Speech) {
        let bubble = format!("\"{}\"", speech.text);
        let bubble = if logging::ansi_enabled() {
            format!("{}", bubble.italic())
        } else {
            bubble
        };
        let _ = writeln!(
            self.out,
            "{:>10} {} for {}s",
            "sprite:",
            bubble,
            speech.duration.as_secs_f64()
        );
    }
}
