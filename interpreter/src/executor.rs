use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use blocks::block::{Block, Condition, Opcode};
use blocks::workspace::Workspace;
use rand::Rng;
use tracing::debug;

use crate::clock::{Clock, TokioClock};
use crate::condition;
use crate::context::{Context, Speech};
use crate::control::{RunControl, RunState};
use crate::settings::Settings;

/// Defaults substituted for missing or malformed inputs.
const DEFAULT_WAIT_SECONDS: f64 = 1.0;
const DEFAULT_GLIDE_SECONDS: f64 = 2.0;
const DEFAULT_SAY_SECONDS: f64 = 2.0;
const DEFAULT_SAY_TEXT: &str = "Hello!";
const DEFAULT_SIZE_DELTA: f64 = 10.0;

/// A boxed step, so containers can recurse into their children.
type Step<'f> = Pin<Box<dyn Future<Output = ()> + 'f>>;

/// How a call to [`Interpreter::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every chain ran to the end.
    Completed,
    /// Stop was pressed before the program finished.
    Stopped,
    /// A run was already in progress; nothing happened.
    AlreadyRunning,
}

/// Executes a workspace one chain at a time, one block at a time.
///
/// Suspension happens only at clock sleeps, and the run flag is checked
/// before every block and every loop round, so stop takes effect at the
/// next boundary.
pub struct Interpreter<C = TokioClock> {
    settings: Settings,
    clock: C,
    control: RunControl,
}

impl Interpreter<TokioClock> {
    pub fn new(settings: Settings) -> Self {
        Interpreter::with_clock(settings, TokioClock)
    }
}

impl<C: Clock> Interpreter<C> {
    pub fn with_clock(settings: Settings, clock: C) -> Self {
        Interpreter {
            settings,
            clock,
            control: RunControl::new(),
        }
    }

    /// Share an existing run flag, e.g. one a clock will press.
    pub fn with_control(mut self, control: RunControl) -> Self {
        self.control = control;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn control(&self) -> &RunControl {
        &self.control
    }

    pub fn stop(&self) -> bool {
        self.control.stop()
    }

    fn running(&self) -> bool {
        self.control.is_running()
    }

    /// Run every chain of the workspace, top to bottom.
    ///
    /// Entry points are the top-level blocks no other block leads into, in
    /// insertion order; each one's chain finishes before the next starts.
    /// A lone block is logged by its position among all top-level blocks,
    /// chained successors included.
    pub async fn run(&self, workspace: &Workspace, ctx: &mut Context<'_>) -> RunOutcome {
        if !self.control.try_start() {
            debug!("run requested while already running");
            return RunOutcome::AlreadyRunning;
        }
        debug!(blocks = workspace.len(), "run started");

        ctx.log.execution("running program");
        if workspace.is_empty() {
            ctx.log.warning("workspace has no blocks");
        } else {
            ctx.log.info(format!("found {} blocks", workspace.len()));
        }

        for (index, entry) in workspace.top_level().iter().enumerate() {
            if !self.running() {
                break;
            }
            if workspace.registry().is_successor(entry.id) {
                continue;
            }
            let chain = workspace.chain_from(entry.id);
            if chain.len() > 1 {
                self.execute_chain(&chain, ctx).await;
            } else {
                ctx.log.execution(format!(
                    "block {}: {}",
                    index + 1,
                    entry.opcode.description()
                ));
                self.execute_block(entry, ctx).await;
            }
        }

        let outcome = match self.control.finish() {
            RunState::Running => {
                ctx.log.success("run complete");
                RunOutcome::Completed
            }
            _ => {
                ctx.log.warning("run interrupted");
                RunOutcome::Stopped
            }
        };
        debug!(?outcome, "run finished");
        outcome
    }

    async fn execute_chain(&self, chain: &[&Block], ctx: &mut Context<'_>) {
        let total = chain.len();
        ctx.log
            .execution(format!("executing chain of {} blocks", total));
        for (i, block) in chain.iter().enumerate() {
            if !self.running() {
                return;
            }
            ctx.log.execution(format!(
                "chain step {}/{}: {}",
                i + 1,
                total,
                block.opcode.description()
            ));
            self.execute_block(block, ctx).await;
        }
    }

    /// Execute a single block, recursing into children for containers.
    pub fn execute_block<'f, 'h>(&'f self, block: &'f Block, ctx: &'f mut Context<'h>) -> Step<'f> {
        Box::pin(async move { self.dispatch(block, ctx).await })
    }

    async fn dispatch(&self, block: &Block, ctx: &mut Context<'_>) {
        debug!(block = %block.id, opcode = %block.opcode, "dispatch");
        let params = &block.params;
        match &block.opcode {
            Opcode::Move => {
                let step = self.settings.move_step;
                let (from_x, from_y) = (ctx.sprite.x, ctx.sprite.y);
                ctx.sprite.advance(step);
                ctx.render(self.settings.move_settle());
                ctx.log.execution(format!(
                    "moved {} steps ({:.0},{:.0} -> {:.0},{:.0})",
                    step, from_x, from_y, ctx.sprite.x, ctx.sprite.y
                ));
                self.clock.sleep(self.settings.move_settle()).await;
            }
            Opcode::TurnRight => self.turn(ctx, self.settings.turn_degrees),
            Opcode::TurnLeft => self.turn(ctx, -self.settings.turn_degrees),
            Opcode::Say => {
                let speech = Speech {
                    text: self.settings.say_text.clone(),
                    duration: self.settings.say_duration(),
                };
                self.say(ctx, &speech);
            }
            Opcode::Show => {
                ctx.sprite.visible = true;
                ctx.render(Duration::ZERO);
                ctx.log.execution("sprite shown");
            }
            Opcode::Hide => {
                ctx.sprite.visible = false;
                ctx.render(Duration::ZERO);
                ctx.log.execution("sprite hidden");
            }
            Opcode::Wait => {
                let seconds = params.number_or("seconds", DEFAULT_WAIT_SECONDS).max(0.0);
                ctx.log.execution(format!("waiting {}s", seconds));
                self.clock.sleep(seconds_to_duration(seconds)).await;
            }
            Opcode::Repeat => self.repeat(block, ctx).await,
            Opcode::Forever => self.forever(block, ctx).await,
            Opcode::If => self.branch(block, ctx).await,
            Opcode::MoveTo => {
                let x = params.number_or("x", 0.0);
                let y = params.number_or("y", 0.0);
                ctx.sprite.move_to_logical(x, y);
                ctx.render(self.settings.move_to_settle());
                ctx.log.execution(format!("moved to ({}, {})", x, y));
                self.clock.sleep(self.settings.move_to_settle()).await;
            }
            Opcode::Glide => {
                let seconds = params.number_or("duration", DEFAULT_GLIDE_SECONDS).max(0.0);
                let duration = seconds_to_duration(seconds);
                let x = ctx.rng.gen_range(0.0..100.0);
                let y = ctx.rng.gen_range(0.0..100.0);
                ctx.sprite.set_position(x, y);
                ctx.render(duration);
                ctx.log.execution(format!(
                    "gliding to ({:.0}, {:.0}) over {}s",
                    x, y, seconds
                ));
                self.clock.sleep(duration).await;
            }
            Opcode::SayCustom => {
                let seconds = params.number_or("duration", DEFAULT_SAY_SECONDS).max(0.0);
                let speech = Speech {
                    text: params.text_or("text", DEFAULT_SAY_TEXT).to_string(),
                    duration: seconds_to_duration(seconds),
                };
                self.say(ctx, &speech);
                self.clock.sleep(speech.duration).await;
            }
            Opcode::ChangeSize => {
                let delta = params.number_or("delta", DEFAULT_SIZE_DELTA);
                ctx.sprite.change_size(delta);
                ctx.render(Duration::ZERO);
                ctx.log.execution(format!(
                    "size changed by {:+}% (now {}%)",
                    delta, ctx.sprite.size
                ));
            }
            Opcode::WhenClicked | Opcode::WhenGreenFlag => {
                ctx.log.info(format!("event: {}", block.opcode.description()));
            }
            Opcode::Unknown(tag) => {
                ctx.log.error(format!("unknown block type: {}", tag));
            }
        }
    }

    fn turn(&self, ctx: &mut Context<'_>, degrees: f64) {
        let before = ctx.sprite.rotation;
        ctx.sprite.turn(degrees);
        ctx.render(Duration::ZERO);
        ctx.log.execution(format!(
            "turned {:+}° ({}° -> {}°)",
            degrees, before, ctx.sprite.rotation
        ));
    }

    fn say(&self, ctx: &mut Context<'_>, speech: &Speech) {
        ctx.stage.speak(speech);
        ctx.log.execution(format!(
            "said \"{}\" ({}s)",
            speech.text,
            speech.duration.as_secs_f64()
        ));
    }

    /// Run `block`'s children in order. Returns false if stop interrupted them.
    async fn run_children(&self, block: &Block, ctx: &mut Context<'_>) -> bool {
        for child in &block.children {
            if !self.running() {
                return false;
            }
            self.execute_block(child, ctx).await;
        }
        self.running()
    }

    async fn repeat(&self, block: &Block, ctx: &mut Context<'_>) {
        let times = block
            .params
            .number_or("times", f64::from(self.settings.default_repeat));
        // Fractions truncate; negatives run zero rounds.
        let times = times.clamp(0.0, f64::from(u32::MAX)) as u32;

        if block.children.is_empty() {
            ctx.log.warning("repeat block is empty");
            return;
        }
        ctx.log.execution(format!("repeating {} times", times));
        for round in 1..=times {
            if !self.running() {
                return;
            }
            ctx.log
                .execution(format!("repeat round {}/{}", round, times));
            if !self.run_children(block, ctx).await {
                return;
            }
        }
        ctx.log.success("repeat finished");
    }

    async fn forever(&self, block: &Block, ctx: &mut Context<'_>) {
        if block.children.is_empty() {
            ctx.log.warning("forever block is empty");
            return;
        }
        ctx.log.execution("forever loop started");
        let every = u64::from(self.settings.forever_log_every);
        let mut round: u64 = 0;
        while self.running() {
            round += 1;
            if every > 0 && (round - 1) % every == 0 {
                ctx.log.execution(format!("forever round {}", round));
            }
            if !self.run_children(block, ctx).await {
                break;
            }
            self.clock.sleep(self.settings.forever_pacing()).await;
        }
        debug!(rounds = round, "forever loop ended");
    }

    async fn branch(&self, block: &Block, ctx: &mut Context<'_>) {
        let condition = Condition::from_choice(block.params.text_or("condition", "always"));
        let met = condition::evaluate(condition, &ctx.sprite, &mut *ctx.rng);
        debug!(%condition, random = condition.is_stub(), met, "condition evaluated");
        ctx.log.execution(format!(
            "if {}: {}",
            condition,
            if met { "met" } else { "not met" }
        ));
        if met {
            self.run_children(block, ctx).await;
        }
    }
}

fn seconds_to_duration(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}
