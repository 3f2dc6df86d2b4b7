use std::io::Write;
use std::time::Duration;

use blocks::script::Loader;
use blocks::{LogLevel, MemoryLog, Opcode, Parameters, Proximity, Workspace};
use interpreter::{
    Context, Interpreter, ManualClock, NullStage, RunControl, RunOutcome, Settings, Speech,
    SpriteState, Stage,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

const NEAR: Proximity = Proximity::Adjacent(true);

struct Finished {
    outcome: RunOutcome,
    sprite: SpriteState,
    log: MemoryLog,
    elapsed: Duration,
}

impl Finished {
    fn lines_starting_with(&self, prefixes: &[&str]) -> Vec<String> {
        self.log
            .messages()
            .into_iter()
            .filter(|m| prefixes.iter().any(|p| m.starts_with(p)))
            .map(str::to_string)
            .collect()
    }
}

async fn run_with(workspace: &Workspace, settings: Settings, seed: u64) -> Finished {
    let interpreter = Interpreter::with_clock(settings, ManualClock::new());
    let mut log = MemoryLog::new();
    let mut stage = NullStage;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ctx = Context::new(&mut log, &mut stage, &mut rng);
    let outcome = interpreter.run(workspace, &mut ctx).await;
    let sprite = ctx.sprite.clone();
    drop(ctx);
    Finished {
        outcome,
        sprite,
        log,
        elapsed: interpreter.clock().now(),
    }
}

async fn run(workspace: &Workspace) -> Finished {
    run_with(workspace, Settings::default(), 0).await
}

fn chained(opcodes: &[Opcode]) -> Workspace {
    let mut ws = Workspace::new();
    let ids: Vec<_> = opcodes
        .iter()
        .map(|op| ws.add(op.clone(), Parameters::new()))
        .collect();
    for pair in ids.windows(2) {
        assert!(ws.connect(pair[0], pair[1], NEAR).unwrap());
    }
    ws
}

#[derive(Default)]
struct RecordingStage {
    frames: Vec<(SpriteState, Duration)>,
    speech: Vec<Speech>,
}

impl Stage for RecordingStage {
    fn render(&mut self, sprite: &SpriteState, transition: Duration) {
        self.frames.push((sprite.clone(), transition));
    }

    fn speak(&mut self, speech: &Speech) {
        self.speech.push(speech.clone());
    }
}

#[tokio::test]
async fn chain_runs_in_connection_order() {
    let mut ws = Workspace::new();
    let show = ws.add(Opcode::Show, Parameters::new());
    let mv = ws.add(Opcode::Move, Parameters::new());
    let turn = ws.add(Opcode::TurnRight, Parameters::new());
    ws.connect(show, turn, NEAR).unwrap();
    ws.connect(turn, mv, NEAR).unwrap();

    let done = run(&ws).await;
    assert_eq!(done.outcome, RunOutcome::Completed);
    assert_eq!(
        done.lines_starting_with(&["executing chain", "chain step"]),
        vec![
            "executing chain of 3 blocks",
            "chain step 1/3: show block",
            "chain step 2/3: turn right block",
            "chain step 3/3: move block",
        ]
    );
    // Turned before moving, so the step goes slightly downwards.
    assert!(done.sprite.y > 50.0);
}

#[tokio::test]
async fn disconnected_blocks_run_alone() {
    let mut ws = chained(&[Opcode::Move, Opcode::TurnRight]);
    let first = ws.top_level()[0].id;
    ws.disconnect(first);
    assert_eq!(ws.chain_from(first).len(), 1);

    let done = run(&ws).await;
    assert_eq!(
        done.lines_starting_with(&["block ", "executing chain"]),
        vec!["block 1: move block", "block 2: turn right block"]
    );
}

#[tokio::test]
async fn lone_block_numbers_count_chained_blocks() {
    let mut ws = Workspace::new();
    let first = ws.add(Opcode::Show, Parameters::new());
    let second = ws.add(Opcode::Move, Parameters::new());
    ws.add(Opcode::Hide, Parameters::new());
    ws.connect(first, second, NEAR).unwrap();

    let done = run(&ws).await;
    assert_eq!(
        done.lines_starting_with(&["block ", "executing chain"]),
        vec!["executing chain of 2 blocks", "block 3: hide block"]
    );
}

#[tokio::test]
async fn run_log_is_framed() {
    let done = run(&chained(&[Opcode::Show])).await;
    let messages = done.log.messages();
    assert_eq!(messages.first(), Some(&"running program"));
    assert_eq!(messages.get(1), Some(&"found 1 blocks"));
    assert_eq!(messages.last(), Some(&"run complete"));
    assert_eq!(done.log.count(LogLevel::Success), 1);
}

#[tokio::test]
async fn empty_workspace_warns_and_completes() {
    let done = run(&Workspace::new()).await;
    assert_eq!(done.outcome, RunOutcome::Completed);
    assert_eq!(
        done.log.with_level(LogLevel::Warning),
        vec!["workspace has no blocks"]
    );
}

#[tokio::test]
async fn move_from_centre() {
    let done = run(&chained(&[Opcode::Move])).await;
    assert_eq!((done.sprite.x, done.sprite.y), (60.0, 50.0));
    assert_eq!(done.elapsed, Duration::from_millis(300));
}

#[tokio::test]
async fn move_to_corner_of_logical_range() {
    let mut ws = Workspace::new();
    ws.add(Opcode::MoveTo, Parameters::new().with("x", 100.0).with("y", 0.0));
    let done = run(&ws).await;
    assert_eq!((done.sprite.x, done.sprite.y), (100.0, 50.0));
}

#[tokio::test]
async fn change_size_stops_at_minimum() {
    let mut ws = Workspace::new();
    let shrink = Parameters::new().with("delta", -95.0);
    let a = ws.add(Opcode::ChangeSize, shrink.clone());
    let b = ws.add(Opcode::ChangeSize, shrink);
    ws.connect(a, b, NEAR).unwrap();
    let done = run(&ws).await;
    assert_eq!(done.sprite.size, 10.0);
}

#[tokio::test]
async fn repeat_runs_children_in_order_each_round() {
    let mut ws = Workspace::new();
    let repeat = ws.add(Opcode::Repeat, Parameters::new().with("times", 3.0));
    ws.add_child(repeat, Opcode::TurnRight, Parameters::new()).unwrap();
    ws.add_child(repeat, Opcode::Hide, Parameters::new()).unwrap();

    let done = run(&ws).await;
    assert_eq!(
        done.lines_starting_with(&["turned", "sprite hidden", "repeat"]),
        vec![
            "repeating 3 times",
            "repeat round 1/3",
            "turned +15° (0° -> 15°)",
            "sprite hidden",
            "repeat round 2/3",
            "turned +15° (15° -> 30°)",
            "sprite hidden",
            "repeat round 3/3",
            "turned +15° (30° -> 45°)",
            "sprite hidden",
            "repeat finished",
        ]
    );
    assert_eq!(done.sprite.rotation, 45.0);
}

#[tokio::test]
async fn repeat_count_is_truncated_and_floored() {
    let mut ws = Workspace::new();
    let fractional = ws.add(Opcode::Repeat, Parameters::new().with("times", 2.9));
    ws.add_child(fractional, Opcode::TurnRight, Parameters::new()).unwrap();
    let negative = ws.add(Opcode::Repeat, Parameters::new().with("times", -4.0));
    ws.add_child(negative, Opcode::TurnRight, Parameters::new()).unwrap();

    let done = run(&ws).await;
    assert_eq!(done.sprite.rotation, 30.0);
    assert_eq!(done.outcome, RunOutcome::Completed);
}

#[tokio::test]
async fn empty_containers_warn() {
    let mut ws = Workspace::new();
    ws.add(Opcode::Repeat, Parameters::new());
    ws.add(Opcode::Forever, Parameters::new());
    let done = run(&ws).await;
    assert_eq!(done.outcome, RunOutcome::Completed);
    assert_eq!(
        done.log.with_level(LogLevel::Warning),
        vec!["repeat block is empty", "forever block is empty"]
    );
}

#[tokio::test(start_paused = true)]
async fn stop_during_forever_ends_the_loop() {
    let mut ws = Workspace::new();
    let forever = ws.add(Opcode::Forever, Parameters::new());
    ws.add_child(forever, Opcode::Move, Parameters::new()).unwrap();

    let interpreter = Interpreter::new(Settings::default());
    let control = interpreter.control().clone();
    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        control.stop()
    });

    let mut log = MemoryLog::new();
    let mut stage = NullStage;
    let mut rng = StdRng::seed_from_u64(0);
    let mut ctx = Context::new(&mut log, &mut stage, &mut rng);
    let started = tokio::time::Instant::now();
    let outcome = interpreter.run(&ws, &mut ctx).await;
    drop(ctx);

    assert_eq!(outcome, RunOutcome::Stopped);
    assert!(stopper.await.unwrap());
    assert!(started.elapsed() < Duration::from_millis(1100));
    // Rounds start at 0, 350 and 700 ms; stop lands during the third.
    assert_eq!(
        log.messages().iter().filter(|m| m.starts_with("moved")).count(),
        3
    );
    assert_eq!(log.messages().last(), Some(&"run interrupted"));

    let mut ws = Workspace::new();
    ws.add(Opcode::Show, Parameters::new());
    let mut log = MemoryLog::new();
    let mut ctx = Context::new(&mut log, &mut stage, &mut rng);
    assert_eq!(interpreter.run(&ws, &mut ctx).await, RunOutcome::Completed);
}

#[tokio::test(start_paused = true)]
async fn second_run_while_running_is_refused() {
    let mut ws = Workspace::new();
    ws.add(Opcode::Wait, Parameters::new().with("seconds", 1.0));
    let interpreter = Interpreter::new(Settings::default());

    let mut first_log = MemoryLog::new();
    let mut second_log = MemoryLog::new();
    let (mut stage_a, mut stage_b) = (NullStage, NullStage);
    let (mut rng_a, mut rng_b) = (StdRng::seed_from_u64(1), StdRng::seed_from_u64(2));
    let mut first = Context::new(&mut first_log, &mut stage_a, &mut rng_a);
    let mut second = Context::new(&mut second_log, &mut stage_b, &mut rng_b);

    let (a, b) = tokio::join!(interpreter.run(&ws, &mut first), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        interpreter.run(&ws, &mut second).await
    });
    drop((first, second));

    assert_eq!(a, RunOutcome::Completed);
    assert_eq!(b, RunOutcome::AlreadyRunning);
    assert!(second_log.is_empty());
    assert_eq!(first_log.messages().last(), Some(&"run complete"));
}

#[tokio::test]
async fn stop_is_acknowledged_once() {
    let mut ws = Workspace::new();
    let repeat = ws.add(Opcode::Repeat, Parameters::new().with("times", 5.0));
    ws.add_child(repeat, Opcode::Wait, Parameters::new()).unwrap();
    let after = ws.add(Opcode::Show, Parameters::new());
    ws.connect(repeat, after, NEAR).unwrap();
    ws.add(Opcode::Hide, Parameters::new());

    let control = RunControl::new();
    let clock = ManualClock::new().stop_at(Duration::from_secs(2), control.clone());
    let interpreter = Interpreter::with_clock(Settings::default(), clock).with_control(control);
    let mut log = MemoryLog::new();
    let mut stage = NullStage;
    let mut rng = StdRng::seed_from_u64(0);
    let mut ctx = Context::new(&mut log, &mut stage, &mut rng);
    let outcome = interpreter.run(&ws, &mut ctx).await;
    let sprite = ctx.sprite.clone();
    drop(ctx);

    assert_eq!(outcome, RunOutcome::Stopped);
    assert_eq!(log.with_level(LogLevel::Warning), vec!["run interrupted"]);
    assert!(!log.messages().contains(&"repeat finished"));
    assert!(!log.messages().contains(&"sprite shown"));
    assert!(sprite.visible);
    assert_eq!(interpreter.clock().now(), Duration::from_secs(2));
    assert!(!interpreter.control().is_running());
}

#[tokio::test]
async fn waits_are_measured_on_the_clock() {
    let mut ws = Workspace::new();
    let half = ws.add(Opcode::Wait, Parameters::new().with("seconds", 0.5));
    let default = ws.add(Opcode::Wait, Parameters::new());
    let mv = ws.add(Opcode::Move, Parameters::new());
    ws.connect(half, default, NEAR).unwrap();
    ws.connect(default, mv, NEAR).unwrap();

    let done = run(&ws).await;
    assert_eq!(done.elapsed, Duration::from_millis(1800));
}

#[tokio::test]
async fn unknown_opcode_is_reported_once() {
    let mut ws = Workspace::new();
    ws.add(Opcode::from_tag("xyz"), Parameters::new());
    let done = run(&ws).await;
    assert_eq!(done.outcome, RunOutcome::Completed);
    assert_eq!(done.sprite, SpriteState::default());
    assert_eq!(
        done.log.with_level(LogLevel::Error),
        vec!["unknown block type: xyz"]
    );
}

#[tokio::test]
async fn if_always_runs_its_children() {
    let mut ws = Workspace::new();
    let branch = ws.add(Opcode::If, Parameters::new());
    ws.add_child(branch, Opcode::TurnLeft, Parameters::new()).unwrap();
    let done = run(&ws).await;
    assert!(done.log.messages().contains(&"if always: met"));
    assert_eq!(done.sprite.rotation, -15.0);
}

#[tokio::test]
async fn seeded_runs_are_reproducible() {
    let mut ws = Workspace::new();
    let glide = ws.add(Opcode::Glide, Parameters::new());
    let branch = ws.add(Opcode::If, Parameters::new().with("condition", "mouse-clicked"));
    ws.add_child(branch, Opcode::Hide, Parameters::new()).unwrap();
    ws.connect(glide, branch, NEAR).unwrap();

    let a = run_with(&ws, Settings::default(), 99).await;
    let b = run_with(&ws, Settings::default(), 99).await;
    assert_eq!(a.sprite, b.sprite);
    assert_eq!(a.log.messages(), b.log.messages());
    assert_eq!(a.elapsed, Duration::from_secs(2));
}

#[tokio::test]
async fn stage_sees_every_change_and_speech() {
    let mut ws = chained(&[Opcode::Move, Opcode::Say, Opcode::Hide]);
    ws.add(Opcode::SayCustom, Parameters::new().with("text", "Bye"));

    let interpreter = Interpreter::with_clock(Settings::default(), ManualClock::new());
    let mut log = MemoryLog::new();
    let mut stage = RecordingStage::default();
    let mut rng = StdRng::seed_from_u64(0);
    let mut ctx = Context::new(&mut log, &mut stage, &mut rng);
    interpreter.run(&ws, &mut ctx).await;
    drop(ctx);

    assert_eq!(stage.frames.len(), 2);
    assert_eq!(stage.frames[0].1, Duration::from_millis(300));
    assert!(!stage.frames[1].0.visible);
    assert_eq!(stage.frames[1].1, Duration::ZERO);
    let texts: Vec<_> = stage.speech.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, vec!["Hello", "Bye"]);
    assert_eq!(stage.speech[1].duration, Duration::from_secs(2));
}

#[tokio::test]
async fn frames_carry_their_transition_time() {
    let mut ws = Workspace::new();
    let glide = ws.add(Opcode::Glide, Parameters::new().with("duration", 1.5));
    let move_to = ws.add(
        Opcode::MoveTo,
        Parameters::new().with("x", 0.0).with("y", 0.0),
    );
    let grow = ws.add(Opcode::ChangeSize, Parameters::new());
    ws.connect(glide, move_to, NEAR).unwrap();
    ws.connect(move_to, grow, NEAR).unwrap();

    let interpreter = Interpreter::with_clock(Settings::default(), ManualClock::new());
    let mut log = MemoryLog::new();
    let mut stage = RecordingStage::default();
    let mut rng = StdRng::seed_from_u64(3);
    let mut ctx = Context::new(&mut log, &mut stage, &mut rng);
    interpreter.run(&ws, &mut ctx).await;
    drop(ctx);

    let transitions: Vec<_> = stage.frames.iter().map(|(_, t)| *t).collect();
    assert_eq!(
        transitions,
        vec![
            Duration::from_millis(1500),
            Duration::from_millis(500),
            Duration::ZERO,
        ]
    );
    assert_eq!(interpreter.clock().now(), Duration::from_millis(2000));
}

#[tokio::test]
async fn huge_turn_setting_keeps_sprite_on_stage() {
    let settings: Settings = toml::from_str("turn-degrees = 1e308").unwrap();
    let done = run_with(
        &chained(&[Opcode::TurnRight, Opcode::TurnRight, Opcode::Move]),
        settings,
        0,
    )
    .await;
    assert_eq!(done.outcome, RunOutcome::Completed);
    assert!(done.sprite.rotation.is_finite());
    assert!((0.0..=100.0).contains(&done.sprite.x));
    assert!((0.0..=100.0).contains(&done.sprite.y));
}

#[tokio::test]
async fn settings_change_behaviour() {
    let settings: Settings = toml::from_str("move-step = 25.0\nturn-degrees = 90.0").unwrap();
    let done = run_with(
        &chained(&[Opcode::TurnRight, Opcode::Move]),
        settings,
        0,
    )
    .await;
    assert!((done.sprite.x - 50.0).abs() < 1e-9);
    assert!((done.sprite.y - 75.0).abs() < 1e-9);
}

#[tokio::test]
async fn script_file_round_trip_through_loader() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[settings]
tolerance = 10
move-step = 20

[[block]]
label = "start"
opcode = "when-green-flag"

[[block]]
label = "loop"
opcode = "repeat"
params = {{ times = 2 }}
children = [{{ opcode = "move" }}]

[[connection]]
from = "start"
to = "loop"
distance = 4.0
"#
    )
    .unwrap();

    let source = std::fs::read_to_string(file.path()).unwrap();
    let script = Loader::new(source, 0).load().expect("script should load");
    assert!(script.warnings.is_empty());
    let settings: Settings = toml::Value::Table(script.settings.clone()).try_into().unwrap();
    assert_eq!(settings.move_step, 20.0);

    let done = run_with(&script.workspace, settings, 0).await;
    assert_eq!(done.outcome, RunOutcome::Completed);
    assert_eq!((done.sprite.x, done.sprite.y), (90.0, 50.0));
    assert!(done.log.messages().contains(&"executing chain of 2 blocks"));
    assert!(done.log.messages().contains(&"event: when green flag block"));
}
