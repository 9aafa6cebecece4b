use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use aiscript::bytecode::disasm::print_script;
use aiscript::bytecode::ir::{CompiledScript, ScriptFlags};
use aiscript::config::Config;
use aiscript::frontend::lexer::Lexer;
use aiscript::frontend::token_dumper::TokenDumper;
use aiscript::library::{PERSISTED_EXTENSION, ScriptLibrary};
use aiscript::runtime::director::Director;
use aiscript::runtime::sandbox::{SandboxEntity, SandboxWorld};

#[derive(Parser, Debug)]
#[command(name = "aiscript")]
#[command(about = "Compile, inspect and run NPC AI scripts")]
struct Cli {
    /// Script source, or a persisted `.aic` script
    file: PathBuf,

    /// Show tokens only
    #[arg(long)]
    tokens: bool,

    /// Plain token listing without ANSI colors
    #[arg(long, requires = "tokens")]
    no_color: bool,

    /// Compact token listing
    #[arg(long, requires = "tokens")]
    pretty: bool,

    /// Print the disassembled bytecode
    #[arg(long)]
    bc: bool,

    /// Run the script in a sandbox world for this many ticks
    #[arg(long, value_name = "TICKS")]
    run: Option<u32>,

    /// Number of sandbox entities running the script
    #[arg(long, default_value_t = 1)]
    entities: u32,

    /// Write the compiled script in persisted form
    #[arg(long, value_name = "OUT")]
    emit: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    ensure_extension(&cli.file, &config)?;

    let library = ScriptLibrary::from_config(&config);

    if cli.tokens {
        let source = fs::read_to_string(&cli.file)
            .with_context(|| format!("Failed to read '{}'", cli.file.display()))?;
        dump_tokens(&source, &library, cli.no_color, cli.pretty);
        return Ok(());
    }

    let script = library
        .compile_path(&cli.file)
        .with_context(|| format!("Failed to load '{}'", cli.file.display()))?;
    if script.flags.contains(ScriptFlags::MISSING_END) {
        warn!(script = %script.name, "script does not end with End");
    }
    info!(
        script = %script.name,
        words = script.len(),
        labels = script.labels.len(),
        "script ready"
    );

    if cli.bc {
        print_script(&script, library.table());
    }

    if let Some(out) = &cli.emit {
        let bytes = script.to_bytes()?;
        fs::write(out, &bytes).with_context(|| format!("Failed to write '{}'", out.display()))?;
        info!(path = %out.display(), bytes = bytes.len(), "persisted script written");
    }

    if let Some(ticks) = cli.run {
        run_sandbox(script, &config, ticks, cli.entities);
    }

    Ok(())
}

fn ensure_extension(path: &Path, config: &Config) -> Result<()> {
    let extension = path.extension().and_then(|e| e.to_str());
    if extension != Some(config.script_extension.as_str()) && extension != Some(PERSISTED_EXTENSION)
    {
        bail!(
            "expected a .{} or .{} file, got {}",
            config.script_extension,
            PERSISTED_EXTENSION,
            path.display()
        );
    }
    Ok(())
}

fn dump_tokens(source: &str, library: &ScriptLibrary, no_color: bool, pretty: bool) {
    let tokens = Lexer::new(source, library.symbols()).tokenize();

    let mut dumper = TokenDumper::new();
    if no_color {
        dumper = dumper.no_color();
    }
    if pretty {
        dumper = dumper.pretty();
    }

    dumper.dump(&tokens);
}

/// Spawns `entities` copies of the script side by side and prints every
/// built-in call and world event, tick by tick.
fn run_sandbox(script: CompiledScript, config: &Config, ticks: u32, entities: u32) {
    let mut vm_config = config.vm_config();
    vm_config.record_calls = true;

    let mut world = SandboxWorld::new();
    let mut director = Director::new(vm_config);
    let script = Arc::new(script);

    for i in 0..entities {
        let x = i32::try_from(i).unwrap_or(i32::MAX).saturating_mul(128);
        let entity = world.add(SandboxEntity::new(x, 0));
        director.spawn(entity, Arc::clone(&script));
    }

    for tick in 0..ticks {
        let report = director.tick(&mut world);
        println!(
            "── tick {} ── ran {} (halted {}, suspended {}), delivered {}, removed {}",
            tick,
            report.ran(),
            report.halted,
            report.suspended,
            report.delivered,
            report.removed
        );
        for call in director.vm_mut().take_calls() {
            println!("  {:<4} {:<24} {:?}", call.entity.to_string(), call.name, call.signal);
        }
        for event in world.take_events() {
            println!("  event {:?}", event);
        }
        world.advance_clock();

        if director.is_empty() {
            info!(tick, "no entities left");
            break;
        }
    }
}
