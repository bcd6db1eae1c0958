use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use lingo::cli::{self, CliArgs};
use lingo::config::Config;
use lingo::engine::{Engine, EngineBuilder};
use lingo::event;
use lingo::script::{EventHandle, Value};

#[tokio::main]
async fn main() {
    let args = cli::parse_args();

    let config = match Config::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("lingo: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(&config, &args);

    let engine = match EngineBuilder::new().with_builtins() {
        Ok(b) => b.configure(&config).build(),
        Err(e) => {
            eprintln!("lingo: built-in grammar: {e}");
            std::process::exit(1);
        }
    };

    // ── Built-in globals ─────────────────────────────────────────────────────
    engine
        .globals()
        .write()
        .set("version", Value::Text(env!("CARGO_PKG_VERSION").to_owned()));

    // ── Load scripts (config first, then command line) ───────────────────────
    // Parse errors are reported by the engine's `warn` events.
    let scripts = engine.scripts();
    for path in config.scripts.iter().chain(&args.scripts) {
        if let Err(e) = scripts.load_path(path) {
            eprintln!("lingo: {}: {e}", path.display());
        }
    }
    if !args.quiet {
        let ver = env!("CARGO_PKG_VERSION");
        println!("lingo {ver}: {} script(s) loaded", scripts.len());
    }

    let fired = scripts.fire_event(event::LOAD, EventHandle::new(event::LOAD));
    for line in fired.output() {
        println!("{line}");
    }

    // ── One-shot commands (-e) ───────────────────────────────────────────────
    if !args.exec.is_empty() {
        for line in &args.exec {
            run_line(Arc::clone(&engine), line.clone()).await;
        }
        return;
    }

    // ── Enter main loop ──────────────────────────────────────────────────────
    if let Err(e) = read_commands(engine).await {
        eprintln!("lingo: {e}");
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise `-d`, otherwise the configured filter.
fn init_tracing(config: &Config, args: &CliArgs) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let fallback = if args.debug { "lingo=debug" } else { config.log.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

/// Read command lines from stdin until EOF or Ctrl-C.
async fn read_commands(engine: Arc<Engine>) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { return Ok(()) };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        run_line(Arc::clone(&engine), line.to_owned()).await;
    }
}

/// Run one `/command` line off the async runtime and print its output.
async fn run_line(engine: Arc<Engine>, line: String) {
    if !line.starts_with('/') {
        eprintln!("lingo: not a command: {line}");
        return;
    }
    let shown = line.clone();
    let result = tokio::task::spawn_blocking(move || engine.scripts().run_command(&line, None)).await;
    match result {
        Ok(Some(report)) => {
            for out in &report.output {
                println!("{out}");
            }
        }
        Ok(None) => eprintln!("lingo: unknown command: {shown}"),
        Err(e) => eprintln!("lingo: {shown}: {e}"),
    }
}
