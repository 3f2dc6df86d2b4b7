use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Deserialize;
use tokio::runtime::Runtime;

use blocks::script::{LoadError, Loader};
use blocks::{LogLevel, LogSink, MemoryLog};
use interpreter::{
    Context, Interpreter, ManualClock, NullStage, RunControl, RunOutcome, Settings, SpriteState,
};

use crate::logging;

const EXTENSION: &str = ".test.blocks";
const FENCE: &str = "---";
const SPRITE_TOLERANCE: f64 = 1e-6;

/// One loader warning a scenario expects, in reporting order.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectedWarning {
    pub contains: String,

    /// Line of the script (counted from 1) the warning must point at.
    #[serde(default)]
    pub line: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectedSprite {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub rotation: Option<f64>,
    pub size: Option<f64>,
    pub visible: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpectedOutcome {
    Completed,
    Stopped,
}

/// The expectations block at the top of a scenario file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct TestConfig {
    /// Shown instead of the file name in the report.
    pub description: Option<String>,

    /// Seed for glide targets and random conditions.
    pub seed: u64,

    /// Press stop once this much virtual time has passed.
    pub stop_after_ms: Option<u64>,

    pub expect_outcome: Option<ExpectedOutcome>,

    /// Substrings that must appear in the run log, in this order.
    pub expect_log: Vec<String>,

    /// Number of error-level lines in the run log.
    pub expect_errors: Option<usize>,

    /// Number of warning-level lines in the run log.
    pub expect_warnings: Option<usize>,

    pub expect_sprite: Option<ExpectedSprite>,

    /// Virtual time the run must take.
    pub expect_elapsed_ms: Option<u64>,

    /// The script must fail to load with an error containing this substring.
    pub expect_load_error: Option<String>,

    /// Every loader warning, in order. An empty list asserts a clean load.
    pub expect_load_warnings: Option<Vec<ExpectedWarning>>,
}

/// A scenario file split into its expectations and the script under test.
struct Scenario<'a> {
    config: TestConfig,
    script: &'a str,
}

impl<'a> Scenario<'a> {
    /// The file opens with a `---` line, then TOML expectations up to the
    /// next `---` line; everything after that is the script.
    fn parse(content: &'a str) -> Result<Self, String> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);

        let mut fences = Vec::with_capacity(2);
        let mut offset = 0;
        for line in content.split_inclusive('\n') {
            let next = offset + line.len();
            if line.trim_end() == FENCE {
                fences.push(offset..next);
                if fences.len() == 2 {
                    break;
                }
            } else if fences.is_empty() {
                return Err(format!("the first line must be `{}`", FENCE));
            }
            offset = next;
        }

        let [open, close] = fences.as_slice() else {
            return Err(format!("expectations are not closed by a `{}` line", FENCE));
        };
        let config = toml::from_str(&content[open.end..close.start])
            .map_err(|e| format!("bad expectations: {}", e))?;
        Ok(Scenario {
            config,
            script: &content[close.end..],
        })
    }
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

impl TestResult {
    fn passed(&self) -> bool {
        matches!(self.outcome, TestOutcome::Pass)
    }
}

/// What a scenario run produced.
struct Observed {
    outcome: RunOutcome,
    sprite: SpriteState,
    log: MemoryLog,
    elapsed: Duration,
}

fn run_single_test(path: &Path, runtime: &Runtime) -> TestResult {
    let finished = |description: Option<String>, outcome: TestOutcome| TestResult {
        path: path.to_path_buf(),
        description,
        outcome,
    };

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => return finished(None, TestOutcome::Fail(format!("cannot read file: {}", e))),
    };
    let scenario = match Scenario::parse(&content) {
        Ok(scenario) => scenario,
        Err(e) => return finished(None, TestOutcome::Fail(e)),
    };

    let outcome = match run_scenario(&scenario.config, scenario.script, runtime) {
        Ok(()) => TestOutcome::Pass,
        Err(reason) => TestOutcome::Fail(reason),
    };
    finished(scenario.config.description, outcome)
}

fn run_scenario(config: &TestConfig, source: &str, runtime: &Runtime) -> Result<(), String> {
    let loaded = Loader::new(source.to_string(), 0).load();

    if let Some(expected) = &config.expect_load_error {
        return match loaded {
            Err(errors) if errors.iter().any(|e| e.message.contains(expected.as_str())) => Ok(()),
            Err(errors) => Err(format!(
                "expected load error containing \"{}\", got: {}",
                expected,
                join_messages(&errors)
            )),
            Ok(_) => Err(format!(
                "expected load error containing \"{}\", but loading succeeded",
                expected
            )),
        };
    }

    let script = loaded.map_err(|errors| format!("unexpected load error: {}", join_messages(&errors)))?;

    if let Some(expected) = &config.expect_load_warnings {
        check_load_warnings(source, &script.warnings, expected)?;
    }

    let settings: Settings = toml::Value::Table(script.settings.clone())
        .try_into()
        .map_err(|e| format!("invalid [settings]: {}", e))?;

    let control = RunControl::new();
    let mut clock = ManualClock::new();
    if let Some(ms) = config.stop_after_ms {
        clock = clock.stop_at(Duration::from_millis(ms), control.clone());
    }
    let interpreter = Interpreter::with_clock(settings, clock).with_control(control);

    let mut log = MemoryLog::new();
    for event in &script.events {
        log.log(event.clone());
    }
    let mut stage = NullStage;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut ctx = Context::new(&mut log, &mut stage, &mut rng);
    let outcome = runtime.block_on(interpreter.run(&script.workspace, &mut ctx));
    let sprite = ctx.sprite.clone();
    drop(ctx);

    check_observed(
        config,
        &Observed {
            outcome,
            sprite,
            log,
            elapsed: interpreter.clock().now(),
        },
    )
}

fn check_observed(config: &TestConfig, observed: &Observed) -> Result<(), String> {
    if let Some(expected) = config.expect_outcome {
        let matches = matches!(
            (expected, observed.outcome),
            (ExpectedOutcome::Completed, RunOutcome::Completed)
                | (ExpectedOutcome::Stopped, RunOutcome::Stopped)
        );
        if !matches {
            return Err(format!(
                "expected outcome {:?}, got {:?}",
                expected, observed.outcome
            ));
        }
    }

    check_log_order(&observed.log, &config.expect_log)?;

    for (level, expected) in [
        (LogLevel::Error, config.expect_errors),
        (LogLevel::Warning, config.expect_warnings),
    ] {
        let Some(expected) = expected else { continue };
        let actual = observed.log.with_level(level);
        if actual.len() != expected {
            return Err(format!(
                "expected {} {} log line(s), got {}\n{}",
                expected,
                level,
                actual.len(),
                bullet_list(&actual)
            ));
        }
    }

    if let Some(expected) = &config.expect_sprite {
        check_sprite(&observed.sprite, expected)?;
    }

    if let Some(ms) = config.expect_elapsed_ms {
        let expected = Duration::from_millis(ms);
        if observed.elapsed != expected {
            return Err(format!(
                "expected {:?} of virtual time, took {:?}",
                expected, observed.elapsed
            ));
        }
    }

    Ok(())
}

/// Each expected substring must match a log line after the previous match.
fn check_log_order(log: &MemoryLog, expected: &[String]) -> Result<(), String> {
    let messages = log.messages();
    let mut cursor = 0;
    for want in expected {
        match messages[cursor..].iter().position(|m| m.contains(want.as_str())) {
            Some(offset) => cursor += offset + 1,
            None => {
                return Err(format!(
                    "log line containing \"{}\" not found in order\n  actual log:\n{}",
                    want,
                    bullet_list(&messages)
                ));
            }
        }
    }
    Ok(())
}

fn check_sprite(actual: &SpriteState, expected: &ExpectedSprite) -> Result<(), String> {
    let fields = [
        ("x", expected.x, actual.x),
        ("y", expected.y, actual.y),
        ("rotation", expected.rotation, actual.rotation),
        ("size", expected.size, actual.size),
    ];
    for (name, want, got) in fields {
        if let Some(want) = want {
            if (want - got).abs() > SPRITE_TOLERANCE {
                return Err(format!(
                    "sprite {} mismatch\n  expected: {}\n  actual:   {}",
                    name, want, got
                ));
            }
        }
    }
    if let Some(visible) = expected.visible {
        if visible != actual.visible {
            return Err(format!(
                "sprite visibility mismatch\n  expected: {}\n  actual:   {}",
                visible, actual.visible
            ));
        }
    }
    Ok(())
}

fn check_load_warnings(
    source: &str,
    warnings: &[LoadError],
    expected: &[ExpectedWarning],
) -> Result<(), String> {
    if warnings.len() != expected.len() {
        let reported: Vec<&str> = warnings.iter().map(|w| w.message.as_str()).collect();
        return Err(format!(
            "{} load warning(s) expected, {} reported\n{}",
            expected.len(),
            warnings.len(),
            bullet_list(&reported)
        ));
    }

    for (n, (warning, want)) in (1..).zip(warnings.iter().zip(expected)) {
        if !warning.message.contains(&want.contains) {
            return Err(format!(
                "load warning #{} reads \"{}\", expected it to mention \"{}\"",
                n, warning.message, want.contains
            ));
        }
        let line = warning.line_in(source);
        match want.line {
            Some(wanted) if wanted != line => {
                return Err(format!(
                    "load warning #{} points at line {}, expected line {}",
                    n, line, wanted
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

fn join_messages(errors: &[LoadError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

fn bullet_list(lines: &[&str]) -> String {
    if lines.is_empty() {
        "    (none)".to_string()
    } else {
        lines
            .iter()
            .map(|l| format!("    - {}", l))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Scenario files under `root`, keyed by the folder holding them relative
/// to `root`. Files in `root` itself land under "".
fn discover(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut found: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        let category = category_of(root, &dir);
        for path in entries.filter_map(Result::ok).map(|entry| entry.path()) {
            if path.is_dir() {
                pending.push(path);
            } else if is_scenario(&path) {
                found.entry(category.clone()).or_default().push(path);
            }
        }
    }
    found.values_mut().for_each(|files| files.sort());
    found
}

fn category_of(root: &Path, dir: &Path) -> String {
    dir.strip_prefix(root)
        .map(|relative| {
            relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

fn is_scenario(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(EXTENSION))
}

fn display_category(category: &str) -> &str {
    if category.is_empty() { "(root)" } else { category }
}

/// Whether `category` is `name` or one of its subfolders.
fn in_category(category: &str, name: &str) -> bool {
    category
        .strip_prefix(name)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Keep the categories named in `wanted`, subfolders included. Also
/// returns the names that matched nothing. No names keeps everything.
fn select_categories<'w>(
    found: BTreeMap<String, Vec<PathBuf>>,
    wanted: &'w [String],
) -> (BTreeMap<String, Vec<PathBuf>>, Vec<&'w str>) {
    if wanted.is_empty() {
        return (found, Vec::new());
    }
    let wanted: Vec<&str> = wanted.iter().map(|w| w.trim_matches('/')).collect();
    let unmatched = wanted
        .iter()
        .copied()
        .filter(|name| !found.keys().any(|category| in_category(category, name)))
        .collect();
    let selected = found
        .into_iter()
        .filter(|(category, _)| wanted.iter().any(|name| in_category(category, name)))
        .collect();
    (selected, unmatched)
}

/// Print the categories found under `path` with their scenario counts.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("{} is a single scenario", path.display());
        return;
    }
    let found = discover(path);
    if found.is_empty() {
        eprintln!("no {} files found in {}", EXTENSION, path.display());
        return;
    }
    eprintln!("categories in {}:", path.display());
    for (category, files) in &found {
        eprintln!("  {:<20} {} scenario(s)", display_category(category), files.len());
    }
}

fn test_label(result: &TestResult) -> &str {
    if let Some(description) = result.description.as_deref() {
        return description;
    }
    result
        .path
        .file_name()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_suffix(EXTENSION))
        .unwrap_or("?")
}

fn print_failures(failures: &[TestResult]) {
    eprintln!();
    eprintln!("failures:");
    for f in failures {
        eprintln!();
        eprintln!("  --- {} ---", f.path.display());
        if let TestOutcome::Fail(reason) = &f.outcome {
            for line in reason.lines() {
                eprintln!("  {}", line);
            }
        }
    }
}

/// Run every scenario under `path` (or the single file `path`), limited to
/// `categories` when any are named. Returns the process exit code.
pub fn run_tests(path: &Path, categories: &[String]) -> i32 {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: cannot start runtime: {}", e);
            return 1;
        }
    };

    let single = path.is_file();
    let selection = if single {
        BTreeMap::from([(String::new(), vec![path.to_path_buf()])])
    } else {
        let found = discover(path);
        if found.is_empty() {
            eprintln!("no {} files found in {}", EXTENSION, path.display());
            return 1;
        }
        let known = found
            .keys()
            .map(|c| display_category(c))
            .collect::<Vec<_>>()
            .join(", ");
        let (selected, unmatched) = select_categories(found, categories);
        for name in unmatched {
            eprintln!("warning: no category '{}' (have: {})", name, known);
        }
        selected
    };
    if selection.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let mut passed = 0usize;
    let mut failures = Vec::new();
    for (category, files) in &selection {
        if !single {
            eprintln!();
            eprintln!("{}", logging::bold(display_category(category)));
        }
        for result in files.iter().map(|file| run_single_test(file, &runtime)) {
            let label = if result.passed() {
                passed += 1;
                logging::pass_label()
            } else {
                logging::fail_label()
            };
            eprintln!("  {}  {}", label, test_label(&result));
            if !result.passed() {
                failures.push(result);
            }
        }
    }

    if !failures.is_empty() {
        print_failures(&failures);
    }
    eprintln!();
    if failures.is_empty() {
        eprintln!("test result: {}. {} passed, 0 failed", logging::verdict(true), passed);
        0
    } else {
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            logging::verdict(false),
            passed,
            failures.len(),
            passed + failures.len()
        );
        1
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn runtime() -> Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
    }

    fn scenario(content: &str) -> TestResult {
        let mut file = tempfile::Builder::new()
            .suffix(EXTENSION)
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        run_single_test(file.path(), &runtime())
    }

    fn assert_pass(result: &TestResult) {
        if let TestOutcome::Fail(reason) = &result.outcome {
            panic!("scenario failed: {}", reason);
        }
    }

    fn failure(result: &TestResult) -> &str {
        match &result.outcome {
            TestOutcome::Fail(reason) => reason,
            TestOutcome::Pass => panic!("scenario unexpectedly passed"),
        }
    }

    #[test]
    fn fences_split_expectations_from_script() {
        let parsed = Scenario::parse(
            "---\ndescription = \"one move\"\nexpect-errors = 0\n---\n[[block]]\nopcode = \"move\"\n",
        )
        .unwrap();
        assert_eq!(parsed.config.description.as_deref(), Some("one move"));
        assert_eq!(parsed.config.expect_errors, Some(0));
        assert_eq!(parsed.script, "[[block]]\nopcode = \"move\"\n");
    }

    #[test]
    fn fences_tolerate_bom_and_crlf() {
        let parsed = Scenario::parse("\u{feff}---\r\nseed = 4\r\n---\r\n[[block]]\r\n").unwrap();
        assert_eq!(parsed.config.seed, 4);
        assert_eq!(parsed.script, "[[block]]\r\n");

        let parsed = Scenario::parse("---\n---").unwrap();
        assert_eq!(parsed.script, "");
    }

    #[test]
    fn fences_are_required() {
        assert!(Scenario::parse("---\nseed = 1\n").is_err());
        assert!(Scenario::parse("[[block]]\n---\n---\n").is_err());
        assert!(Scenario::parse("").is_err());
    }

    #[test]
    fn unknown_expectations_are_rejected() {
        assert!(Scenario::parse("---\nexpect-output = \"x\"\n---\n").is_err());
    }

    #[test]
    fn passing_scenario() {
        let result = scenario(
            r#"---
description = "move then turn"
expect-outcome = "completed"
expect-log = ["running program", "moved 10 steps", "turned +15", "run complete"]
expect-errors = 0
expect-warnings = 0
expect-sprite = { x = 60.0, y = 50.0, rotation = 15.0 }
expect-elapsed-ms = 300
---
[[block]]
label = "a"
opcode = "move"

[[block]]
label = "b"
opcode = "turn-right"

[[connection]]
from = "a"
to = "b"
"#,
        );
        assert_pass(&result);
        assert_eq!(test_label(&result), "move then turn");
    }

    #[test]
    fn stop_after_interrupts_forever() {
        let result = scenario(
            r#"---
stop-after-ms = 1000
expect-outcome = "stopped"
expect-log = ["forever loop started", "run interrupted"]
expect-warnings = 1
---
[[block]]
opcode = "forever"
children = [{ opcode = "move" }]
"#,
        );
        assert_pass(&result);
    }

    #[test]
    fn log_order_is_enforced() {
        let result = scenario(
            r#"---
expect-log = ["run complete", "running program"]
---
[[block]]
opcode = "show"
"#,
        );
        assert!(failure(&result).contains("not found in order"));
    }

    #[test]
    fn sprite_mismatch_is_reported() {
        let result = scenario(
            r#"---
expect-sprite = { x = 0.0 }
---
[[block]]
opcode = "move"
"#,
        );
        assert!(failure(&result).contains("sprite x mismatch"));
    }

    #[test]
    fn load_errors_can_be_expected() {
        let result = scenario(
            r#"---
expect-load-error = "no block labelled"
---
[[connection]]
from = "ghost"
to = "nobody"
"#,
        );
        assert_pass(&result);
    }

    #[test]
    fn load_warnings_are_checked_with_lines() {
        let result = scenario(
            r#"---
expect-load-warnings = [{ contains = "unknown", line = 2 }]
expect-errors = 1
---
[[block]]
opcode = "xyz"
"#,
        );
        assert_pass(&result);

        let result = scenario(
            r#"---
expect-load-warnings = [{ contains = "unknown", line = 1 }]
---
[[block]]
opcode = "xyz"
"#,
        );
        assert!(failure(&result).contains("points at line 2, expected line 1"));
    }

    #[test]
    fn categories_select_subfolders_and_report_misses() {
        let found = BTreeMap::from([
            ("control".to_string(), vec![PathBuf::from("a")]),
            ("control/loops".to_string(), vec![PathBuf::from("b")]),
            ("controls".to_string(), vec![PathBuf::from("c")]),
            ("motion".to_string(), vec![PathBuf::from("d")]),
        ]);
        let wanted = ["control/".to_string(), "sound".to_string()];
        let (selected, unmatched) = select_categories(found, &wanted);
        assert_eq!(
            selected.keys().cloned().collect::<Vec<_>>(),
            vec!["control", "control/loops"]
        );
        assert_eq!(unmatched, vec!["sound"]);
    }

    #[test]
    fn discovery_groups_files_by_folder() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("motion/turns")).unwrap();
        for file in [
            "top.test.blocks",
            "notes.md",
            "motion/b.test.blocks",
            "motion/a.test.blocks",
            "motion/turns/left.test.blocks",
        ] {
            std::fs::write(root.path().join(file), "").unwrap();
        }

        let found = discover(root.path());
        assert_eq!(
            found.keys().cloned().collect::<Vec<_>>(),
            vec!["", "motion", "motion/turns"]
        );
        let motion: Vec<_> = found["motion"]
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(motion, vec!["a.test.blocks", "b.test.blocks"]);
    }
}
