use indexmap::IndexMap;
use sprig::runtime::CoreLib;
use std::{fmt::Write, rc::Rc};

pub const HELP_INDENT: &str = "  ";

/// The REPL's meta-commands, with their arguments and descriptions
pub const COMMANDS: &[(&str, &str, &str)] = &[
    ("/help", "[topic]", "Shows help, optionally for a command, module, or topic"),
    ("/exit", "", "Exits the REPL"),
    ("/reset", "", "Discards all declarations, imports, and variable values"),
    ("/imports", "", "Lists the imports that are in scope"),
    ("/dclns", "", "Lists the declarations that can be referred to by name"),
    ("/vars", "", "Lists the module variables and their current values"),
    ("/remove", "<name>...", "Removes the named declarations"),
    ("/unit", "", "Toggles showing the compilation unit assembled for each snippet"),
    ("/file", "<path>", "Evaluates the contents of a file"),
];

const LANGUAGE_HELP: &str = "\
Each top-level item that's entered is a snippet. Declarations and imports are kept
for later snippets, statements and expressions are run straight away.

Imports:      import sprig/io;  import sprig/string as s;
Types:        type Scores int[]|nil;
Functions:    function add(int a, int b) returns int { return a + b; }
Variables:    int x = 1;  final string name = \"sprig\";  var v = [1, 2];
Statements:   if/else, while, foreach int i in 0 ..< 10 { ... }, break, continue,
              assignments like x += 1; and grid[1][2] = 3;
Expressions:  anything without a trailing ';' is evaluated and its value is shown

Types are int, float, string, boolean, nil, any, named types, arrays (T[]),
optionals (T?), and unions (A|B).

Input continues on the next line while braces or brackets are unclosed.";

struct HelpEntry {
    // The entry's user-displayed name
    name: Rc<str>,
    // The entry's contents
    help: Rc<str>,
}

pub struct Help {
    // All help entries, keys are lowercase
    help_map: IndexMap<Rc<str>, HelpEntry>,
    module_names: Vec<Rc<str>>,
}

impl Help {
    pub fn new(core_lib: &CoreLib) -> Self {
        let mut result = Self {
            help_map: IndexMap::new(),
            module_names: Vec::new(),
        };

        for (name, args, description) in COMMANDS {
            let usage = if args.is_empty() {
                name.to_string()
            } else {
                format!("{name} {args}")
            };
            result.add_entry(name, format!("{usage}\n\n{description}"));
        }

        result.add_entry("language", LANGUAGE_HELP.into());

        for path in core_lib.paths() {
            let Some(module) = core_lib.get(path) else {
                continue;
            };

            let mut help = format!("import {path};\n");
            for name in module.names() {
                if let Some(function) = module.get(name) {
                    let _ = write!(help, "\n{name} {function:?}");
                }
            }

            result.add_entry(path, help);
            result.module_names.push(path.into());
        }

        result
    }

    pub fn get_help(&self, search: Option<&str>) -> String {
        match search {
            Some(search) => {
                let search = search.trim().to_lowercase();
                match self.find(&search) {
                    Some(entry) => format!("{}\n\n{}", entry.name, entry.help),
                    None => {
                        let matches: Vec<_> = self
                            .help_map
                            .keys()
                            .filter(|key| key.contains(search.as_str()))
                            .map(|key| format!("{HELP_INDENT}{key}"))
                            .collect();
                        if matches.is_empty() {
                            format!("No matches for '{search}' found.")
                        } else {
                            format!("Did you mean one of these?\n\n{}", matches.join("\n"))
                        }
                    }
                }
            }
            None => self.overview(),
        }
    }

    pub fn topics(&self) -> impl Iterator<Item = &Rc<str>> {
        self.help_map.keys()
    }

    fn find(&self, search: &str) -> Option<&HelpEntry> {
        self.help_map.get(search).or_else(|| {
            // Commands can be looked up without their slash, and modules without their org
            self.help_map
                .get(format!("/{search}").as_str())
                .or_else(|| self.help_map.get(format!("sprig/{search}").as_str()))
        })
    }

    fn overview(&self) -> String {
        let mut help = String::from("Commands:\n");
        for (name, args, description) in COMMANDS {
            let _ = writeln!(help, "{HELP_INDENT}{:<20}{description}", format!("{name} {args}"));
        }

        help.push_str("\nModules:\n");
        for name in &self.module_names {
            let _ = writeln!(help, "{HELP_INDENT}{name}");
        }

        help.push_str("\nRun `/help language` for an overview of the language, ");
        help.push_str("or `/help <module>` for a module's functions.");
        help
    }

    fn add_entry(&mut self, name: &str, help: String) {
        self.help_map.insert(
            name.to_lowercase().into(),
            HelpEntry {
                name: name.into(),
                help: help.into(),
            },
        );
    }
}
