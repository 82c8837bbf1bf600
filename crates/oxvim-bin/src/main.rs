//! oxvim entrypoint: runs ex commands, scripts and keys against a buffer
//! and prints the result.
use anyhow::{Context, Result, anyhow};
use clap::Parser;
use core_config::load_from;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

mod driver;

/// Stack for the session thread. Script recursion limits are sized to fit
/// in half of this in debug builds.
const SESSION_STACK: usize = 16 << 20;

use driver::Driver;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "oxvim", version, about = "Vim command engine driver")]
struct Args {
    /// File to load into the buffer. A missing file starts an empty buffer.
    pub path: Option<PathBuf>,
    /// Configuration file path (overrides discovery of `oxvim.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Script sourced after loading; may be repeated.
    #[arg(short = 'S', value_name = "SCRIPT")]
    pub scripts: Vec<PathBuf>,
    /// Ex command run after the scripts; may be repeated.
    #[arg(short = 'c', value_name = "CMD")]
    pub commands: Vec<String>,
    /// Keys in Vim notation, typed after the commands.
    #[arg(long, value_name = "NOTATION")]
    pub keys: Option<String>,
    /// Read further input from stdin: `:`-prefixed lines are ex commands,
    /// other lines are keys.
    #[arg(long)]
    pub repl: bool,
}

struct AppStartup {
    log_guard: Option<WorkerGuard>,
}

impl AppStartup {
    fn new() -> Self {
        Self { log_guard: None }
    }

    fn configure_logging(&mut self) -> Result<()> {
        let log_dir = Path::new(".");
        let log_path = log_dir.join("oxvim.log");
        if log_path.exists() {
            let _ = std::fs::remove_file(&log_path);
        }

        let file_appender = tracing_appender::rolling::never(log_dir, "oxvim.log");
        let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
        if tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(nb_writer)
            .try_init()
            .is_ok()
        {
            self.log_guard = Some(guard);
        }
        Ok(())
    }

    fn install_panic_hook() {
        static HOOK: Once = Once::new();
        HOOK.call_once(|| {
            let default_panic = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                tracing::error!(target: "runtime.panic", ?info, "panic");
                default_panic(info);
            }));
        });
    }
}

fn run(args: &Args) -> Result<String> {
    let config = load_from(args.config.clone())?;
    info!(
        target: "runtime.startup",
        path = args.path.as_ref().map(|p| p.display().to_string()).as_deref(),
        config_override = args.config.is_some(),
        scripts = args.scripts.len(),
        commands = args.commands.len(),
        repl = args.repl,
        "bootstrap_complete"
    );
    let mut driver = Driver::open(args.path.as_deref(), &config)?;
    for script in &args.scripts {
        driver.source(script);
    }
    for cmd in &args.commands {
        driver.run_command(cmd);
    }
    if let Some(keys) = &args.keys {
        driver.feed(keys);
    }
    if args.repl {
        driver.repl(std::io::stdin().lock(), &mut std::io::stdout().lock())?;
    }
    Ok(driver.report())
}

fn main() -> Result<()> {
    let mut startup = AppStartup::new();
    startup.configure_logging()?;
    AppStartup::install_panic_hook();
    info!(target: "runtime", "startup");

    let args = Args::parse();
    let report = std::thread::Builder::new()
        .name("oxvim-session".into())
        .stack_size(SESSION_STACK)
        .spawn(move || run(&args))
        .context("spawning session thread")?
        .join()
        .map_err(|_| anyhow!("session thread panicked"))??;
    print!("{report}");
    info!(target: "runtime", "shutdown");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_config::Config;
    use core_text::Buffer;
    use pretty_assertions::assert_eq;
    use std::fmt;
    use std::sync::{Arc, Mutex};
    use tracing::Subscriber;
    use tracing::dispatcher::Dispatch;
    use tracing::field::{Field, Visit};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_subscriber::registry::Registry;

    #[derive(Clone, Default)]
    struct Capture {
        events: Arc<Mutex<Vec<CapturedEvent>>>,
    }

    #[derive(Clone, Debug)]
    struct CapturedEvent {
        target: String,
        fields: Vec<(String, String)>,
    }

    #[derive(Default)]
    struct FieldCollector {
        fields: Vec<(String, String)>,
    }

    impl Visit for FieldCollector {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.fields
                .push((field.name().to_string(), format!("{:?}", value)));
        }
    }

    impl<S> Layer<S> for Capture
    where
        S: Subscriber,
    {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            let mut collector = FieldCollector::default();
            event.record(&mut collector);
            let meta = event.metadata();
            self.events.lock().unwrap().push(CapturedEvent {
                target: meta.target().to_string(),
                fields: collector.fields,
            });
        }
    }

    #[test]
    fn editing_logs_never_carry_buffer_text() {
        let capture = Capture::default();
        let events = capture.events.clone();
        let dispatcher = Dispatch::new(Registry::default().with(capture));
        tracing::dispatcher::with_default(&dispatcher, || {
            let buffer = Buffer::from_str("t", "classified buffer\nsecond");
            let mut driver = Driver::with_buffer(buffer, &Config::default());
            driver.feed("ddpu");
            driver.run_command("s/second/other/");
            driver.feed("/classified<CR>");
        });

        let events = events.lock().unwrap();
        assert!(events.iter().any(|e| e.target == "runtime.session"));
        assert!(events.iter().any(|e| e.target == "state.undo"));
        for event in events.iter() {
            for (_, value) in &event.fields {
                assert!(
                    !value.contains("classified buffer"),
                    "{} event leaked buffer text: {value}",
                    event.target
                );
            }
        }
    }

    #[test]
    fn args_collect_repeated_flags() {
        let args = Args::parse_from([
            "oxvim", "notes.txt", "-c", "1d", "-c", "echo 1", "-S", "a.vim", "--keys", "dd",
        ]);
        assert_eq!(args.path, Some(PathBuf::from("notes.txt")));
        assert_eq!(args.commands, vec!["1d".to_string(), "echo 1".to_string()]);
        assert_eq!(args.scripts, vec![PathBuf::from("a.vim")]);
        assert_eq!(args.keys.as_deref(), Some("dd"));
        assert!(!args.repl);
    }

    #[test]
    fn run_applies_scripts_commands_then_keys() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("buf.txt");
        std::fs::write(&file, "one\ntwo\nthree\n").unwrap();
        let script = dir.path().join("init.vim");
        std::fs::write(&script, "nnoremap Q dd\n").unwrap();
        let config = dir.path().join("missing.toml");
        let args = Args {
            path: Some(file),
            config: Some(config),
            scripts: vec![script],
            commands: vec!["2".to_string()],
            keys: Some("Q".to_string()),
            repl: false,
        };
        assert_eq!(run(&args).unwrap(), "one\nthree\n");
    }
}
