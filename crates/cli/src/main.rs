mod help;
mod repl;

use anyhow::{Context, Result, bail};
use crossterm::tty::IsTty;
use repl::{EditMode, Repl, ReplSettings};
use serde::Deserialize;
use sprig::{parser::Parser, prelude::*};
use std::{
    env, fs,
    io::{self, Read},
    path::PathBuf,
    time::Duration,
};
use tracing_subscriber::EnvFilter;
use unicode_width::UnicodeWidthStr;

#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn help_string() -> String {
    format!(
        "{version}

USAGE:
    sprig [FLAGS] [script]

FLAGS:
    -e, --eval               Evaluate the script as a string instead of loading it from disk
    -u, --show_unit          Show the compilation unit that was assembled for each snippet
    -c, --config PATH        Config file to load when using the REPL
    -t, --timeout MS         Limit the time that each snippet is allowed to run for
    -v, --version            Prints version information
    -h, --help               Prints help information

ARGS:
    <script>     The script to run, as a file path, or as a string when --eval is set

    When no script is provided and stdin isn't a terminal, the script is read from stdin.
    Otherwise the REPL is started.

REPL CONFIGURATION:
    Sprig will read configuration settings from $HOME/.sprig/config.toml,
    or from a file provided with the --config flag.

    The default configuration settings are:

    ```
    colored_output = true
    edit_mode = \"emacs\"
    max_history = 100
    commit_definitions_on_runtime_failure = true
    # execution_limit_ms = 5000
    ```

ENV VARS:
    SPRIG_EDIT_MODE_VI  Enables the VI editing mode (Emacs bindings are enabled by default)
    SPRIG_MAX_HISTORY   The maximum number of entries to store in the REPL history (default: 100)
    SPRIG_LOG           Enables logging to stderr, e.g. `SPRIG_LOG=debug`
    NO_COLOR            Disables colored output (enabled by default)
",
        version = version_string()
    )
}

fn version_string() -> String {
    format!("Sprig {}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Default)]
struct SprigArgs {
    help: bool,
    version: bool,
    eval_script: bool,
    show_unit: bool,
    timeout_ms: Option<u64>,
    script: Option<String>,
    config_file: Option<String>,
}

fn parse_arguments() -> Result<SprigArgs> {
    let mut args = pico_args::Arguments::from_env();

    let eval_script = args.contains(["-e", "--eval"]);
    let show_unit = args.contains(["-u", "--show_unit"]);
    let help = args.contains(["-h", "--help"]);
    let version = args.contains(["-v", "--version"]);
    let config_file = args.opt_value_from_str(["-c", "--config"])?;
    let timeout_ms = args.opt_value_from_str(["-t", "--timeout"])?;

    let script = args.opt_free_from_str()?;

    let remaining = args.finish();
    if let Some(unused) = remaining.first() {
        bail!("Unsupported argument: {}", unused.to_string_lossy());
    }

    Ok(SprigArgs {
        help,
        version,
        eval_script,
        show_unit,
        timeout_ms,
        script,
        config_file,
    })
}

fn main() -> Result<()> {
    let args = match parse_arguments() {
        Ok(args) => args,
        Err(error) => {
            bail!("{}\n\n{}", help_string(), error);
        }
    };

    if args.help {
        println!("{}", help_string());
        return Ok(());
    }

    if args.version {
        println!("{}", version_string());
        return Ok(());
    }

    init_logging();

    let config = load_config(args.config_file.as_ref())?;

    let mut sprig_settings = SprigSettings::default().with_commit_definitions_on_runtime_failure(
        config.commit_definitions_on_runtime_failure,
    );
    if let Some(limit) = args.timeout_ms.or(config.execution_limit_ms) {
        sprig_settings = sprig_settings.with_execution_limit(Duration::from_millis(limit));
    }

    let mut stdin = io::stdin();

    let script = if let Some(script) = args.script {
        if args.eval_script {
            Some(script)
        } else {
            let contents = fs::read_to_string(&script)
                .with_context(|| format!("Error while loading script '{script}'"))?;
            Some(contents)
        }
    } else if stdin.is_tty() {
        None
    } else {
        let mut script = String::new();
        stdin
            .read_to_string(&mut script)
            .context("Failed to read script from standard input")?;
        Some(script)
    };

    match script {
        Some(script) => run_script(&script, sprig_settings, args.show_unit),
        None => Repl::with_settings(
            ReplSettings {
                show_unit: args.show_unit,
                colored_output: config.colored_output,
                edit_mode: config.edit_mode,
                max_history_size: config.max_history,
            },
            sprig_settings,
        )?
        .run(),
    }
}

// Evaluates the script one snippet at a time, printing the value of a final expression
fn run_script(script: &str, settings: SprigSettings, show_unit: bool) -> Result<()> {
    let syntax = match Parser::parse(script) {
        Ok(syntax) => syntax,
        Err(error) => bail!(
            "parse error: {error}\n{}",
            sprig::parser::format_source_excerpt(script, &error.span, None)
        ),
    };

    let mut sprig = Sprig::with_settings(settings);

    for item in syntax.items {
        let result = sprig.evaluate(&item.text)?;

        if show_unit {
            if let Some(unit) = sprig.last_unit() {
                println!("{}\n", unit.source);
            }
        }

        let (errors, warnings): (Vec<_>, Vec<_>) =
            result.diagnostics.iter().partition(|d| d.is_error());
        for warning in warnings {
            eprintln!("{}", warning.render(&item.text));
        }
        if !errors.is_empty() {
            let rendered: Vec<_> = errors.iter().map(|d| d.render(&item.text)).collect();
            bail!("{}", rendered.join("\n"));
        }

        if let Some(value) = result.value {
            println!("{value}");
        }
    }

    Ok(())
}

fn init_logging() {
    // Logging is off unless SPRIG_LOG is set
    let Ok(filter) = EnvFilter::try_from_env("SPRIG_LOG") else {
        return;
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Config {
    colored_output: bool,
    edit_mode: EditMode,
    max_history: usize,
    commit_definitions_on_runtime_failure: bool,
    execution_limit_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            colored_output: true,
            edit_mode: EditMode::Emacs,
            max_history: 100,
            commit_definitions_on_runtime_failure: true,
            execution_limit_ms: None,
        }
    }
}

fn load_config(config_path: Option<&String>) -> Result<Config> {
    let config_path = config_path.map_or_else(
        || {
            home::home_dir()
                .map(|mut path| {
                    path.push(".sprig");
                    path.push("config.toml");
                    path
                })
                .filter(|path| path.exists())
        },
        |path| Some(PathBuf::from(path)),
    );

    // Load the config file if it exists
    let mut config = match config_path {
        Some(config_path) => {
            let contents = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to load the config file '{}'", config_path.display())
            })?;
            toml::from_str(&contents).with_context(|| {
                format!("Error while loading config '{}'", config_path.display())
            })?
        }
        None => Config::default(),
    };

    // Apply environment variables
    if env::var("SPRIG_EDIT_MODE_VI").is_ok() {
        config.edit_mode = EditMode::Vi
    };

    if let Ok(value) = env::var("SPRIG_MAX_HISTORY") {
        if let Ok(value) = value.parse::<usize>() {
            config.max_history = value;
        } else {
            bail!("expected integer for SPRIG_MAX_HISTORY environment variable");
        }
    }

    if env::var("NO_COLOR").is_ok() {
        config.colored_output = false;
    }

    Ok(config)
}

fn terminal_width() -> usize {
    crossterm::terminal::size()
        .map(|(width, _)| width as usize)
        .unwrap_or(80)
}

/// Wraps the text to the terminal's width, indenting each line
pub fn wrap_string_with_indent(text: &str, indent: &str) -> String {
    let options = textwrap::Options::new(terminal_width())
        .initial_indent(indent)
        .subsequent_indent(indent);
    wrap_lines(text, &options)
}

/// Wraps the text to the terminal's width, leaving room for a prefix on the first line
///
/// The prefix isn't included in the result, following lines are indented to align with it.
pub fn wrap_string_with_prefix(text: &str, prefix: &str) -> String {
    let indent = " ".repeat(prefix.width());
    let options = textwrap::Options::new(terminal_width().saturating_sub(prefix.width()).max(1));
    let wrapped = wrap_lines(text, &options);

    let mut result = String::with_capacity(wrapped.len());
    for (i, line) in wrapped.split_inclusive('\n').enumerate() {
        if i > 0 && line != "\n" {
            result.push_str(&indent);
        }
        result.push_str(line);
    }
    result
}

// Wraps each line separately so that existing line breaks are preserved
fn wrap_lines(text: &str, options: &textwrap::Options) -> String {
    let mut result = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let (line, newline) = match line.strip_suffix('\n') {
            Some(stripped) => (stripped, "\n"),
            None => (line, ""),
        };
        if line.is_empty() {
            result.push_str(newline);
            continue;
        }
        result.push_str(&textwrap::fill(line, options));
        result.push_str(newline);
    }
    result
}
