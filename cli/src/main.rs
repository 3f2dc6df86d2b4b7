mod logging;
mod stage;
mod test_runner;

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, warn};

use blocks::script::{LoadError, Loader, Script};
use blocks::{Block, BlockId, LogSink, Workspace};
use interpreter::{
    Clock, Context, Interpreter, ManualClock, RunControl, RunOutcome, Settings, SpriteState, Stage,
    TracingLog,
};

use crate::stage::{ConsoleLog, TerminalStage};

const SUBCOMMANDS: &[&str] = &["run", "test", "help"];

#[derive(Parser)]
#[command(name = "blocks", version, about = "Block program interpreter")]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Show interpreter internals (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a workspace script
    Run(RunArgs),

    /// Run .test.blocks scenario files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Workspace script (TOML) to execute
    file: String,

    /// Load only, don't execute (exit 0 if valid)
    #[arg(long)]
    check: bool,

    /// Dump the loaded workspace
    #[arg(long)]
    dump: bool,

    /// List blocks, their nesting and chains
    #[arg(long)]
    list_blocks: bool,

    /// Send the run log to tracing instead of stdout
    #[arg(short, long)]
    quiet: bool,

    /// Skip waits: run on a virtual clock
    #[arg(long)]
    instant: bool,

    /// Seed for glide targets and random conditions
    #[arg(long)]
    seed: Option<u64>,

    /// Press stop after this many milliseconds
    #[arg(long, value_name = "MS")]
    stop_after: Option<u64>,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.blocks file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    // `blocks file.toml` works like `blocks run file.toml`.
    let mut args: Vec<String> = std::env::args().collect();
    if let Some(pos) = args
        .iter()
        .skip(1)
        .position(|a| !a.starts_with('-'))
        .map(|i| i + 1)
    {
        if !SUBCOMMANDS.contains(&args[pos].as_str()) {
            args.insert(pos, "run".to_string());
        }
    }

    let cli = Cli::parse_from(&args);
    if let Err(err) = logging::init(cli.verbose, cli.no_color) {
        eprintln!("warning: logging unavailable: {}", err);
    }

    match cli.command {
        Command::Run(run_args) => do_run(run_args, cli.no_color),
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            let exit_code = test_runner::run_tests(path, &test_args.category);
            process::exit(exit_code);
        }
    }
}

fn do_run(args: RunArgs, no_color: bool) {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    let writer = StandardStream::stderr(color_choice);
    let config = term::Config::default();

    let source = match std::fs::read_to_string(&args.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", args.file, e);
            process::exit(1);
        }
    };

    let mut files = SimpleFiles::new();
    let file_id = files.add(args.file.clone(), source.clone());

    let script = match Loader::new(source, file_id).load() {
        Ok(script) => script,
        Err(errors) => {
            emit_diagnostics(&writer, &config, &files, &errors);
            process::exit(1);
        }
    };
    emit_diagnostics(&writer, &config, &files, &script.warnings);

    let settings: Settings = match toml::Value::Table(script.settings.clone()).try_into() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: invalid [settings] in '{}': {}", args.file, e);
            process::exit(1);
        }
    };

    if args.check {
        eprintln!(
            "ok: {} loaded successfully ({} blocks)",
            args.file,
            script.workspace.block_count()
        );
        return;
    }

    if args.dump {
        println!("{:#?}", script.workspace);
        println!("{:#?}", settings);
        return;
    }

    if args.list_blocks {
        print_workspace(&script);
        return;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: cannot start runtime: {}", e);
            process::exit(1);
        }
    };

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let control = RunControl::new();

    let (outcome, sprite) = runtime.block_on(async {
        let on_interrupt = control.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("interrupt received");
                on_interrupt.stop();
            }
        });

        if args.instant {
            let mut clock = ManualClock::new();
            if let Some(ms) = args.stop_after {
                clock = clock.stop_at(Duration::from_millis(ms), control.clone());
            }
            let interpreter = Interpreter::with_clock(settings, clock).with_control(control.clone());
            execute(&interpreter, &script, args.quiet, &mut rng).await
        } else {
            if let Some(ms) = args.stop_after {
                let timer = control.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    timer.stop();
                });
            }
            let interpreter = Interpreter::new(settings).with_control(control.clone());
            execute(&interpreter, &script, args.quiet, &mut rng).await
        }
    });

    match outcome {
        RunOutcome::AlreadyRunning => warn!("run refused: interpreter busy"),
        RunOutcome::Completed | RunOutcome::Stopped => {
            if !args.quiet {
                println!("final sprite: {}", sprite);
            }
        }
    }
}

async fn execute<C: Clock>(
    interpreter: &Interpreter<C>,
    script: &Script,
    quiet: bool,
    rng: &mut StdRng,
) -> (RunOutcome, SpriteState) {
    let (mut log, mut stage): (Box<dyn LogSink>, Box<dyn Stage>) = if quiet {
        (
            Box::new(TracingLog),
            Box::new(TerminalStage::new(io::sink())),
        )
    } else {
        (
            Box::new(ConsoleLog::new(io::stdout())),
            Box::new(TerminalStage::new(io::stdout())),
        )
    };

    for event in &script.events {
        log.log(event.clone());
    }

    let mut ctx = Context::new(&mut *log, &mut *stage, rng);
    let outcome = interpreter.run(&script.workspace, &mut ctx).await;
    (outcome, ctx.sprite)
}

fn print_workspace(script: &Script) {
    let names: HashMap<BlockId, &str> =
        script.labels.iter().map(|(label, id)| (*id, label.as_str())).collect();

    fn print_block(block: &Block, names: &HashMap<BlockId, &str>, indent: usize) {
        let pad = "  ".repeat(indent);
        let label = names
            .get(&block.id)
            .map(|l| format!(" ({})", l))
            .unwrap_or_default();
        let params: Vec<String> = block
            .params
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        let params = if params.is_empty() {
            String::new()
        } else {
            format!(" [{}]", params.join(", "))
        };
        let marker = if block.opcode.is_hat() { " (event)" } else { "" };
        println!("{}{} {}{}{}{}", pad, block.id, block.opcode, marker, label, params);
        for child in &block.children {
            print_block(child, names, indent + 1);
        }
    }

    for block in script.workspace.top_level() {
        print_block(block, &names, 0);
    }

    let chains = chains(&script.workspace);
    if !chains.is_empty() {
        println!();
        for chain in chains {
            println!("chain: {}", chain);
        }
    }
}

fn chains(workspace: &Workspace) -> Vec<String> {
    workspace
        .entry_points()
        .map(|entry| workspace.chain_from(entry.id))
        .filter(|chain| chain.len() > 1)
        .map(|chain| {
            chain
                .iter()
                .map(|b| b.id.to_string())
                .collect::<Vec<_>>()
                .join(" -> ")
        })
        .collect()
}

fn emit_diagnostics(
    writer: &StandardStream,
    config: &term::Config,
    files: &SimpleFiles<String, String>,
    errors: &[LoadError],
) {
    for error in errors {
        let diagnostic = error.to_diagnostic();
        let _ = term::emit_to_write_style(&mut writer.lock(), config, files, &diagnostic);
    }
}
