//! Interactive console for the emulator.
//!
//! Two prompt modes: MAIN drives the machine (initialize, create/attach
//! screens, toggle the batch generator, reports) and PROCESS observes one
//! process (`process-smi`). Line editing, history, and tab completion come
//! from rustyline; every command prints its outcome and the prompt
//! continues; only `exit` (or EOF) leaves the console.

use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::Local;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use thiserror::Error;

use coresim_core::instruction::TIME_FORMAT;
use coresim_rt::config::EngineConfig;
use coresim_rt::manager::ProcessManager;

/// ANSI escape codes for the console's color roles; [`Console::paint`]
/// applies them only when colors are enabled.
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const GRAY: &str = "\x1b[90m";
const RESET: &str = "\x1b[0m";

const HEADER: &str = r#"
   ____ ___  ____  _____ ____ ___ __  __
  / ___/ _ \|  _ \| ____/ ___|_ _|  \/  |
 | |  | | | | |_) |  _| \___ \| || |\/| |
 | |__| |_| |  _ <| |___ ___) | || |  | |
  \____\___/|_| \_\_____|____/___|_|  |_|
"#;

/// Commands offered by tab completion (both modes).
const COMMANDS: &[&str] = &[
    "initialize",
    "screen",
    "scheduler-start",
    "scheduler-test",
    "scheduler-stop",
    "report-util",
    "snapshot",
    "process-smi",
    "clear",
    "help",
    "exit",
];

// ---------------------------------------------------------------------------
// Completer
// ---------------------------------------------------------------------------

/// Completes command names at the start of the line.
struct ConsoleCompleter;

impl Completer for ConsoleCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let word = &line[..pos];
        if word.contains(char::is_whitespace) {
            return Ok((pos, Vec::new()));
        }
        let candidates = COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(word))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();
        Ok((0, candidates))
    }
}

impl Hinter for ConsoleCompleter {
    type Hint = String;
}

impl Highlighter for ConsoleCompleter {}

impl Validator for ConsoleCompleter {}

impl Helper for ConsoleCompleter {}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

/// A fatal console failure (the terminal itself broke).
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("line editor failure: {0}")]
    Readline(#[from] ReadlineError),
}

/// What the dispatched command asked the prompt loop to do next.
enum Flow {
    Continue,
    Exit,
}

/// The interactive console and its session state.
pub struct Console {
    config_path: PathBuf,
    colors: bool,
    manager: Option<ProcessManager>,
    /// Name of the process screen we are attached to, if any.
    attached: Option<String>,
}

impl Console {
    pub fn new(config_path: PathBuf, colors: bool) -> Self {
        Self {
            config_path,
            colors,
            manager: None,
            attached: None,
        }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.colors {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    /// Run the prompt loop until `exit` or end-of-input.
    pub fn run(&mut self) -> Result<(), ConsoleError> {
        self.print_banner();

        let editor_config = rustyline::Config::builder().auto_add_history(true).build();
        let mut editor = Editor::with_config(editor_config)?;
        editor.set_helper(Some(ConsoleCompleter));

        loop {
            let prompt = if self.attached.is_some() {
                self.paint(CYAN, "[PROCESS]> ")
            } else {
                self.paint(GREEN, "[MAIN]> ")
            };

            match editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match self.dispatch(line) {
                        Flow::Continue => {}
                        Flow::Exit => break,
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", self.paint(GRAY, "(interrupted, type 'exit' to quit)"));
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }

        if let Some(manager) = self.manager.take() {
            manager.shutdown();
        }
        println!("Goodbye.");
        Ok(())
    }

    fn print_banner(&self) {
        println!("{}", self.paint(GREEN, HEADER));
        println!(
            "{}",
            self.paint(YELLOW, "Welcome to the coresim CPU scheduler emulator!")
        );
        let started = format!("Session started {}", Local::now().format(TIME_FORMAT));
        println!("{}", self.paint(GRAY, &started));
        println!("Type 'help' for available commands or 'initialize' to begin.");
    }

    fn dispatch(&mut self, line: &str) -> Flow {
        if self.attached.is_some() {
            self.handle_process_command(line)
        } else {
            self.handle_main_command(line)
        }
    }

    /// The machine must be initialized before anything that touches it.
    fn manager(&self) -> Option<&ProcessManager> {
        if self.manager.is_none() {
            println!("Please run 'initialize' first.");
        }
        self.manager.as_ref()
    }

    // -- MAIN mode --------------------------------------------------------

    fn handle_main_command(&mut self, line: &str) -> Flow {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens[0] {
            "initialize" => self.handle_initialize(),
            "screen" => self.handle_screen(&tokens),
            "scheduler-start" | "scheduler-test" => {
                if let Some(manager) = self.manager() {
                    manager.start_batch();
                    println!("Batch process generation started.");
                }
            }
            "scheduler-stop" => {
                if let Some(manager) = self.manager() {
                    manager.stop_batch();
                    println!("Batch process generation stopped.");
                }
            }
            "report-util" => self.handle_report_util(),
            "snapshot" => self.handle_snapshot(tokens.get(1).copied()),
            "clear" => print!("\x1b[2J\x1b[1;1H"),
            "help" => self.show_help(),
            "exit" => return Flow::Exit,
            other => {
                println!("Unknown command: {other}. Type 'help' for the list.");
            }
        }
        Flow::Continue
    }

    fn handle_initialize(&mut self) {
        if self.manager.is_some() {
            println!("System is already initialized.");
            return;
        }
        match EngineConfig::load(&self.config_path) {
            Ok(config) => {
                let manager = ProcessManager::new(config);
                manager.start_scheduler();
                self.manager = Some(manager);
                println!("System initialized successfully.");
            }
            Err(err) => {
                println!("{}", self.paint(RED, &format!("Error: {err}")));
            }
        }
    }

    fn handle_screen(&mut self, tokens: &[&str]) {
        let Some(manager) = self.manager.as_ref() else {
            println!("Please run 'initialize' first.");
            return;
        };
        let mut attach: Option<String> = None;
        match (tokens.get(1).copied(), tokens.get(2).copied()) {
            (Some("-ls"), _) => {
                let mut stdout = io::stdout();
                if let Err(err) = manager.print_system_status(&mut stdout) {
                    println!("{}", self.paint(RED, &format!("Error: {err}")));
                }
            }
            (Some("-s"), Some(name)) => {
                let process = manager.add_process(name);
                if process.is_finished() {
                    println!("Process {name} not found.");
                } else {
                    println!("Attached to process {name}. Type 'process-smi' for details.");
                    attach = Some(name.to_string());
                }
            }
            (Some("-s"), None) => println!("Usage: screen -s <process_name>"),
            (Some("-r"), Some(name)) => match manager.attach(name) {
                Ok(_) => {
                    println!("Attached to process {name}.");
                    attach = Some(name.to_string());
                }
                Err(err) => println!("{err}."),
            },
            (Some("-r"), None) => println!("Usage: screen -r <process_name>"),
            _ => {
                println!("Invalid screen command. Use 'screen -s <name>', 'screen -r <name>', or 'screen -ls'.");
            }
        }
        if attach.is_some() {
            self.attached = attach;
        }
    }

    fn handle_report_util(&mut self) {
        let Some(manager) = self.manager() else { return };
        match manager.generate_utilization_report() {
            Ok(path) => println!("Report saved to {}.", path.display()),
            Err(err) => println!("{}", self.paint(RED, &format!("Error: {err}"))),
        }
    }

    fn handle_snapshot(&mut self, path: Option<&str>) {
        let Some(manager) = self.manager() else { return };
        let json = match serde_json::to_string_pretty(&manager.system_snapshot()) {
            Ok(json) => json,
            Err(err) => {
                println!("{}", self.paint(RED, &format!("Error: {err}")));
                return;
            }
        };
        match path {
            Some(path) => match fs::write(path, &json) {
                Ok(()) => println!("Snapshot written to {path}."),
                Err(err) => println!("{}", self.paint(RED, &format!("Error: {err}"))),
            },
            None => println!("{json}"),
        }
    }

    // -- PROCESS mode -----------------------------------------------------

    fn handle_process_command(&mut self, line: &str) -> Flow {
        match line.split_whitespace().next().unwrap_or("") {
            "process-smi" => self.show_process_info(),
            "help" => self.show_help(),
            "exit" => {
                self.attached = None;
            }
            other => {
                println!("Unknown command: {other}. Type 'help' for the list.");
            }
        }
        Flow::Continue
    }

    fn show_process_info(&self) {
        let Some(name) = self.attached.as_deref() else { return };
        let Some(process) = self.manager.as_ref().and_then(|m| m.get_process(name)) else {
            println!("Process {name} not found.");
            return;
        };
        println!("===== Process Name: {} =====", process.name());
        println!("ID: {}", process.id());
        println!("Logs:");
        for line in process.recent_logs(usize::MAX) {
            println!("{line}");
        }
        println!();
        println!("Current instruction line: {}", process.pc());
        println!("Lines of code: {}", process.code_len());
        if process.is_finished() {
            println!("\nFINISHED!");
        }
    }

    // -- help -------------------------------------------------------------

    fn show_help(&self) {
        if self.attached.is_some() {
            println!("Available commands:");
            println!("    process-smi - Show process info and logs.");
            println!("    exit        - Return to the main menu.");
            return;
        }
        println!("{}", self.paint(YELLOW, "Available commands:"));
        println!("    initialize          - Initialize the system from the config file (must be run first).");
        println!("    screen -s <name>    - Create a new process and attach to its screen.");
        println!("    screen -r <name>    - Re-attach to a running process's screen.");
        println!("    screen -ls          - List all running and finished processes.");
        println!("    scheduler-start     - Start automatically generating batch processes.");
        println!("    scheduler-stop      - Stop generating batch processes.");
        println!("    report-util         - Append a CPU utilization report to csopesy-log.txt.");
        println!("    snapshot [path]     - Dump a JSON system snapshot (stdout by default).");
        println!("    clear               - Clear the console screen.");
        println!("    help                - Show this help message.");
        println!("    exit                - Terminate the console.");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(line: &str) -> Vec<String> {
        let completer = ConsoleCompleter;
        let history = rustyline::history::MemHistory::new();
        let ctx = Context::new(&history);
        let (_, pairs) = completer.complete(line, line.len(), &ctx).unwrap();
        pairs.into_iter().map(|p| p.replacement).collect()
    }

    #[test]
    fn completer_matches_command_prefixes() {
        let matches = complete("sch");
        assert!(matches.contains(&"scheduler-start".to_string()));
        assert!(matches.contains(&"scheduler-stop".to_string()));
        assert!(!matches.contains(&"screen".to_string()));
    }

    #[test]
    fn completer_ignores_arguments() {
        assert!(complete("screen -").is_empty());
    }

    #[test]
    fn completer_offers_everything_on_empty_input() {
        assert_eq!(complete("").len(), COMMANDS.len());
    }

    #[test]
    fn console_starts_unattached_and_uninitialized() {
        let console = Console::new(PathBuf::from("config.txt"), false);
        assert!(console.manager.is_none());
        assert!(console.attached.is_none());
    }

    #[test]
    fn paint_respects_color_toggle() {
        let plain = Console::new(PathBuf::from("c"), false);
        assert_eq!(plain.paint(RED, "x"), "x");
        let colored = Console::new(PathBuf::from("c"), true);
        assert!(colored.paint(RED, "x").contains("\x1b[31m"));
    }
}
