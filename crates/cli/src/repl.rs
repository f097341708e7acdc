use std::{
    cell::RefCell,
    fmt,
    io::{self, Stdout, Write},
    path::PathBuf,
    rc::Rc,
};

use anyhow::Result;
use crossterm::{execute, style, tty::IsTty};
use rustyline::{CompletionType, Config, Editor, error::ReadlineError, history::DefaultHistory};
use serde::{Deserialize, Serialize};
use sprig::{parser::Parser, prelude::*, runtime::CoreLib};
use tracing::debug;

use crate::{
    help::{COMMANDS, HELP_INDENT, Help},
    wrap_string_with_indent, wrap_string_with_prefix,
};

macro_rules! print_wrapped_indented {
    ($stdout:expr, $indent:expr, $text:expr) => {
        $stdout.write_all(wrap_string_with_indent(&format!($text), $indent).as_bytes())
    };
    ($stdout:expr, $indent:expr, $text:literal, $($y:expr),* $(,)?) => {
        $stdout.write_all(wrap_string_with_indent(&format!($text,  $($y),*), $indent).as_bytes())
    };
}
macro_rules! print_wrapped {
    ($stdout:expr, $text:expr) => {
        print_wrapped_indented!($stdout, "", $text)
    };
    ($stdout:expr, $text:literal, $($y:expr),* $(,)?) => {
        print_wrapped_indented!($stdout, "", $text, $($y),*)
    };
}

const PROMPT: &str = "» ";
const CONTINUED_PROMPT: &str = "… ";
const RESULT_PROMPT: &str = "➝ ";
const INDENT_SIZE: usize = 4;
const HISTORY_DIR: &str = ".sprig";
const HISTORY_FILE: &str = "repl_history.txt";

const KEYWORDS: &[&str] = &[
    "any", "boolean", "break", "continue", "else", "false", "final", "float", "foreach",
    "function", "if", "import", "in", "int", "nil", "return", "returns", "string", "true", "type",
    "var", "while",
];

pub struct ReplSettings {
    pub show_unit: bool,
    pub colored_output: bool,
    pub edit_mode: EditMode,
    pub max_history_size: usize,
}

#[derive(Copy, Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    #[default]
    Emacs,
    Vi,
}

impl From<EditMode> for rustyline::EditMode {
    fn from(mode: EditMode) -> Self {
        match mode {
            EditMode::Emacs => rustyline::EditMode::Emacs,
            EditMode::Vi => rustyline::EditMode::Vi,
        }
    }
}

type ReplEditor = Editor<ReplHelper, DefaultHistory>;

pub struct Repl {
    sprig: Rc<RefCell<Sprig>>,
    help: Help,
    editor: ReplEditor,
    stdout: Stdout,
    // A buffer of lines for input that continues over multiple lines
    continued_lines: Vec<String>,
    indent: usize,
    show_unit: bool,
    colored_output: bool,
}

fn history_dir() -> Option<PathBuf> {
    home::home_dir().map(|mut path| {
        path.push(HISTORY_DIR);
        path
    })
}

fn history_path() -> Option<PathBuf> {
    history_dir().map(|mut path| {
        path.push(HISTORY_FILE);
        path
    })
}

// A REPL meta-command, e.g. `/reset`
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Help(Option<&'a str>),
    Exit,
    Reset,
    Imports,
    Declarations,
    Variables,
    Remove(Vec<&'a str>),
    Unit,
    File(&'a str),
}

impl<'a> Command<'a> {
    // Returns None if the line isn't a command, or an error message if the command is invalid
    fn parse(line: &'a str) -> Option<Result<Self, String>> {
        let line = line.trim();
        if !line.starts_with('/') {
            return None;
        }

        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        let command = match (name, rest) {
            ("/help", "") => Ok(Self::Help(None)),
            ("/help", topic) => Ok(Self::Help(Some(topic))),
            ("/exit", "") => Ok(Self::Exit),
            ("/reset", "") => Ok(Self::Reset),
            ("/imports", "") => Ok(Self::Imports),
            ("/dclns", "") => Ok(Self::Declarations),
            ("/vars", "") => Ok(Self::Variables),
            ("/unit", "") => Ok(Self::Unit),
            ("/remove", "") => Err("expected one or more names to remove".to_string()),
            ("/remove", names) => Ok(Self::Remove(names.split_whitespace().collect())),
            ("/file", "") => Err("expected a file path".to_string()),
            ("/file", path) => Ok(Self::File(path)),
            (name, _) if COMMANDS.iter().any(|(command, _, _)| *command == name) => {
                Err(format!("unexpected arguments for '{name}'"))
            }
            (name, _) => Err(format!("unknown command '{name}', run /help for a list")),
        };

        Some(command)
    }
}

impl Repl {
    pub fn with_settings(settings: ReplSettings, sprig_settings: SprigSettings) -> Result<Self> {
        let sprig = Rc::new(RefCell::new(Sprig::with_settings(sprig_settings)));

        let mut editor = ReplEditor::with_config(
            Config::builder()
                .max_history_size(settings.max_history_size)?
                .edit_mode(settings.edit_mode.into())
                .completion_type(CompletionType::List)
                .completion_show_all_if_ambiguous(true)
                .build(),
        )?;

        editor.set_helper(Some(ReplHelper {
            sprig: sprig.clone(),
        }));

        if let Some(path) = history_path() {
            editor.load_history(&path).ok();
        }

        let stdout = io::stdout();
        let colored_output = settings.colored_output && stdout.is_tty();

        Ok(Self {
            sprig,
            help: Help::new(&CoreLib::default()),
            editor,
            stdout,
            continued_lines: Vec::new(),
            indent: 0,
            show_unit: settings.show_unit,
            colored_output,
        })
    }

    pub fn run(&mut self) -> Result<()> {
        let version = env!("CARGO_PKG_VERSION");
        writeln!(
            self.stdout,
            "\
Welcome to Sprig v{version}
Run `/help` for more information
"
        )?;

        loop {
            let result = if self.continued_lines.is_empty() {
                self.editor.readline(PROMPT)
            } else {
                let indent = " ".repeat(self.indent);
                self.editor
                    .readline_with_initial(CONTINUED_PROMPT, (&indent, ""))
            };

            match result {
                Ok(line) => {
                    if !self.on_line(&line)? {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    writeln!(self.stdout, "^C")?;
                    self.stdout.flush()?;
                    self.continued_lines.clear();
                    self.indent = 0;
                }
                Err(ReadlineError::Eof) => {
                    break;
                }
                Err(err) => {
                    writeln!(self.stdout, "Error: {err:?}")?;
                    break;
                }
            }
        }

        if let Some(mut path) = history_dir() {
            std::fs::create_dir_all(&path)?;
            path.push(HISTORY_FILE);
            self.editor.save_history(&path)?;
        }

        Ok(())
    }

    // Returns false when the REPL should exit
    fn on_line(&mut self, line: &str) -> Result<bool> {
        if self.continued_lines.is_empty() {
            if let Some(command) = Command::parse(line) {
                self.editor.add_history_entry(line.trim())?;
                return match command {
                    Ok(command) => self.run_command(command),
                    Err(error) => {
                        self.print_error(&error)?;
                        Ok(true)
                    }
                };
            }
        }

        let input_is_whitespace = line.chars().all(char::is_whitespace);
        if self.continued_lines.is_empty() && input_is_whitespace {
            return Ok(true);
        }

        self.continued_lines.push(line.to_string());
        let input = self.continued_lines.join("\n");

        // A blank line forces evaluation of incomplete input, so that its errors are shown
        if !input_is_whitespace {
            if let Err(error) = Parser::parse(&input) {
                if error.is_incomplete_input() {
                    self.update_indent(line);
                    return Ok(true);
                }
            }
        }

        self.continued_lines.clear();
        self.indent = 0;
        self.editor.add_history_entry(input.trim_end())?;
        self.evaluate(&input)?;

        Ok(true)
    }

    fn update_indent(&mut self, line: &str) {
        let current_indent = line.find(|c: char| !c.is_whitespace()).unwrap_or(0);
        let opens_block = line.trim_end().ends_with(['{', '[', '(']);

        self.indent = if opens_block {
            current_indent + INDENT_SIZE
        } else {
            current_indent
        };
    }

    fn evaluate(&mut self, input: &str) -> Result<()> {
        let result = self.sprig.borrow_mut().evaluate(input);

        match result {
            Ok(result) => {
                if self.show_unit {
                    self.print_unit()?;
                }
                for diagnostic in &result.diagnostics {
                    let rendered = diagnostic.render(input);
                    if diagnostic.is_error() {
                        self.print_error(&rendered)?;
                    } else {
                        writeln!(self.stdout, "{rendered}\n")?;
                    }
                }
                if let Some(value) = &result.value {
                    self.print_result(value)?;
                }
            }
            Err(error) => {
                self.print_error(&error)?;
                if error.requires_reset() {
                    print_wrapped!(self.stdout, "Run /reset to continue.\n\n")?;
                }
            }
        }

        Ok(())
    }

    fn run_command(&mut self, command: Command) -> Result<bool> {
        debug!(?command, "running command");

        match command {
            Command::Help(topic) => {
                let help = self.help.get_help(topic);
                print_wrapped_indented!(self.stdout, HELP_INDENT, "{help}")?;
                writeln!(self.stdout, "\n")?;
            }
            Command::Exit => return Ok(false),
            Command::Reset => {
                self.sprig.borrow_mut().reset();
                writeln!(self.stdout, "The session has been reset.\n")?;
            }
            Command::Imports => {
                let imports = self.sprig.borrow().imports_in_scope();
                self.print_list(&imports, "No imports are in scope.")?;
            }
            Command::Declarations => {
                let declarations: Vec<_> = self
                    .sprig
                    .borrow()
                    .declarations()
                    .iter()
                    .map(|declaration| format!("{} {}", declaration.kind, declaration.name))
                    .collect();
                self.print_list(&declarations, "Nothing has been declared.")?;
            }
            Command::Variables => {
                let variables: Vec<_> = self
                    .sprig
                    .borrow()
                    .module_variables()
                    .into_iter()
                    .map(|(name, value)| format!("{name} = {value}"))
                    .collect();
                self.print_list(&variables, "No module variables have values.")?;
            }
            Command::Remove(names) => {
                let result = self.sprig.borrow_mut().remove(names.iter().copied());
                match result {
                    Ok(result) if result.committed => {
                        writeln!(self.stdout, "Removed {}.\n", names.join(", "))?;
                    }
                    Ok(result) => {
                        for diagnostic in &result.diagnostics {
                            self.print_error(diagnostic)?;
                        }
                    }
                    Err(error) => self.print_error(&error)?,
                }
            }
            Command::Unit => {
                self.show_unit = !self.show_unit;
                let state = if self.show_unit { "on" } else { "off" };
                writeln!(self.stdout, "Showing compilation units is {state}.\n")?;
            }
            Command::File(path) => {
                let result = self.sprig.borrow_mut().load_file(path);
                match result {
                    Ok(result) => {
                        // Spans refer to the file's contents, so they're rendered without excerpts
                        for diagnostic in result.diagnostics.iter().filter(|d| d.is_error()) {
                            self.print_error(diagnostic)?;
                        }
                        if let Some(value) = &result.value {
                            self.print_result(value)?;
                        }
                    }
                    Err(error) => self.print_error(&error)?,
                }
            }
        }

        Ok(true)
    }

    fn print_list(&mut self, items: &[String], empty_message: &str) -> Result<()> {
        if items.is_empty() {
            writeln!(self.stdout, "{empty_message}\n")?;
        } else {
            for item in items {
                writeln!(self.stdout, "{HELP_INDENT}{item}")?;
            }
            writeln!(self.stdout)?;
        }
        Ok(())
    }

    fn print_unit(&mut self) -> Result<()> {
        let sprig = self.sprig.borrow();
        if let Some(unit) = sprig.last_unit() {
            writeln!(self.stdout, "Compilation unit\n----------------\n{}\n", unit.source)?;
        }
        Ok(())
    }

    fn print_result(&mut self, result: &str) -> Result<()> {
        if self.colored_output {
            use style::*;

            execute!(
                self.stdout,
                Print(RESULT_PROMPT),
                SetAttribute(Attribute::Bold),
                Print(wrap_string_with_prefix(
                    &format!("{result}\n\n"),
                    RESULT_PROMPT
                )),
                SetAttribute(Attribute::Reset),
            )?;
        } else {
            write!(self.stdout, "{RESULT_PROMPT}{result}\n\n")?;
        }

        Ok(())
    }

    fn print_error<E>(&mut self, error: &E) -> Result<()>
    where
        E: fmt::Display,
    {
        if self.colored_output {
            use style::*;

            execute!(
                self.stdout,
                SetForegroundColor(Color::DarkRed),
                Print("error"),
                ResetColor,
                Print(": "),
                SetAttribute(Attribute::Bold),
                Print(format!("{error:#}\n\n")),
                SetAttribute(Attribute::Reset),
            )?;
        } else {
            write!(self.stdout, "error: {error:#}\n\n")?;
        }

        Ok(())
    }
}

struct ReplHelper {
    sprig: Rc<RefCell<Sprig>>,
}

impl ReplHelper {
    fn candidates_from_commands(&self, line: &str) -> (usize, Vec<CompletionCandidate>) {
        let offset = line.len() - line.trim_start().len();
        let search = line.trim_start();
        let candidates = COMMANDS
            .iter()
            .filter(|(name, _, _)| name.starts_with(search))
            .map(|(name, _, _)| CompletionCandidate {
                display: (*name).into(),
            })
            .collect();
        (offset, candidates)
    }

    fn candidates_from_session(&self, line: &str, pos: usize) -> (usize, Vec<CompletionCandidate>) {
        // Complete the identifier (or `prefix:name` reference) that ends at the cursor
        let offset = line[..pos]
            .rfind(|c: char| !(c.is_alphanumeric() || c == '_' || c == ':'))
            .map_or(0, |i| i + 1);
        let search = &line[offset..pos];
        if search.is_empty() {
            return (offset, Vec::new());
        }

        let sprig = self.sprig.borrow();
        let declared = sprig
            .declarations()
            .iter()
            .map(|declaration| declaration.name.to_string())
            .collect::<Vec<_>>();

        let mut candidates: Vec<_> = declared
            .into_iter()
            .chain(KEYWORDS.iter().map(|keyword| keyword.to_string()))
            .filter(|name| name.starts_with(search))
            .map(|name| CompletionCandidate {
                display: name.into(),
            })
            .collect();
        candidates.sort_by(|a, b| a.display.cmp(&b.display));
        candidates.dedup_by(|a, b| a.display == b.display);

        (offset, candidates)
    }
}

impl rustyline::completion::Completer for ReplHelper {
    type Candidate = CompletionCandidate;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        if line.trim_start().starts_with('/') {
            Ok(self.candidates_from_commands(&line[..pos]))
        } else {
            Ok(self.candidates_from_session(line, pos))
        }
    }
}

impl rustyline::hint::Hinter for ReplHelper {
    type Hint = String;
}
impl rustyline::highlight::Highlighter for ReplHelper {}
impl rustyline::validate::Validator for ReplHelper {}
impl rustyline::Helper for ReplHelper {}

struct CompletionCandidate {
    display: Rc<str>,
}

impl rustyline::completion::Candidate for CompletionCandidate {
    fn display(&self) -> &str {
        &self.display
    }

    fn replacement(&self) -> &str {
        &self.display
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_commands() {
        assert_eq!(Command::parse("1 + 1"), None);
        assert_eq!(Command::parse(" /reset "), Some(Ok(Command::Reset)));
        assert_eq!(
            Command::parse("/remove a  b"),
            Some(Ok(Command::Remove(vec!["a", "b"])))
        );
        assert_eq!(
            Command::parse("/help sprig/io"),
            Some(Ok(Command::Help(Some("sprig/io"))))
        );
        assert_eq!(
            Command::parse("/file scripts/setup.sprig"),
            Some(Ok(Command::File("scripts/setup.sprig")))
        );
    }

    #[test]
    fn invalid_commands() {
        assert!(matches!(Command::parse("/remove"), Some(Err(_))));
        assert!(matches!(Command::parse("/exit now"), Some(Err(_))));
        assert_eq!(
            Command::parse("/quit"),
            Some(Err("unknown command '/quit', run /help for a list".into()))
        );
    }
}
