//! CLI command handling
//!
//! Dispatches CLI commands to the library controllers and formats output.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::commands::Commands;
use crate::common::{config::Config, Error, Result};
use crate::engine::{with_timeout, DebugState, EngineApi, HttpEngine};
use crate::session::{BreakpointSet, BufferStore, FileStore, LogEntry, LogKind, BUFFER_KEY};
use crate::workbench::Workbench;

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, engine: Option<String>) -> Result<()> {
    let config = Config::load()?.with_engine_url(engine);

    match command {
        Commands::Run {
            file,
            timed,
            timeout_ms,
        } => {
            let workbench = Workbench::from_config(&config)?;
            if let Some(file) = &file {
                workbench.load(read_source(file)?);
            }

            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| workbench.runner().timeout());
            let outcome = workbench.run_with_timeout(timeout).await;

            let text = if timed {
                outcome.timed_report()
            } else {
                outcome.display_output().to_string()
            };
            if outcome.success() {
                println!("{}", text.trim_end_matches('\n'));
            } else {
                println!("{}", text.trim_end_matches('\n').red());
            }

            Ok(())
        }

        Commands::Save { file } => {
            let text = read_source(&file)?;
            let store = FileStore::from_config(&config.editor)
                .ok_or_else(|| Error::Config("No storage directory available".to_string()))?;
            store.save(BUFFER_KEY, &text)?;

            println!(
                "{} Saved {} ({} bytes)",
                "✓".green(),
                file.display(),
                text.len()
            );
            Ok(())
        }

        Commands::Repl => repl(&config).await,

        Commands::Debug { file, breakpoints } => debug(&config, file, breakpoints).await,

        Commands::Health => {
            let engine = HttpEngine::from_config(&config)?;
            with_timeout(config.timeouts.request(), engine.health()).await?;
            println!("{} Engine at {} is up", "✓".green(), engine.base_url());
            Ok(())
        }
    }
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::file_read(path, &e))
}

fn prompt(text: &str) -> Result<()> {
    print!("{}", text);
    std::io::stdout().flush()?;
    Ok(())
}

fn stdin_lines() -> Lines<BufReader<Stdin>> {
    BufReader::new(tokio::io::stdin()).lines()
}

// === REPL ===

async fn repl(config: &Config) -> Result<()> {
    let workbench = Workbench::from_config(config)?;
    let repl = workbench.repl();
    let log = repl.log().clone();

    println!(
        "MicroScript REPL on {}  {}",
        config.engine.base_url,
        "(:reset :clear :history :copy :quit)".dimmed()
    );

    let mut lines = stdin_lines();
    loop {
        prompt(if repl.awaiting_continuation() { "... " } else { ">>> " })?;
        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        let offset = log.len();
        match line.trim() {
            ":quit" | ":q" => break,
            ":reset" => {
                if !workbench.repl_reset().await.unwrap_or(true) {
                    println!("{}", "No active session".dimmed());
                }
            }
            ":clear" => {
                repl.clear_log();
                continue;
            }
            ":history" => {
                for (i, entry) in repl.history().iter().enumerate() {
                    println!("{:>4}  {}", i + 1, entry);
                }
                continue;
            }
            ":copy" => {
                println!("{}", repl.transcript());
                continue;
            }
            _ => {
                // Failures are already in the log
                let _ = workbench.repl_submit(&line).await;
            }
        }

        for entry in log.since(offset) {
            print_log_entry(&entry);
        }
    }

    Ok(())
}

fn print_log_entry(entry: &LogEntry) {
    let text = entry.text.trim_end_matches('\n');
    match entry.kind {
        // Already on screen as typed
        LogKind::Command => {}
        LogKind::Output => println!("{}", text),
        LogKind::Error => println!("{}", text.red()),
        LogKind::Info => println!("{}", text.dimmed()),
    }
}

// === Debugger ===

async fn debug(config: &Config, file: Option<PathBuf>, breakpoints: Vec<u32>) -> Result<()> {
    let workbench = Workbench::from_config(config)?;
    if let Some(file) = &file {
        workbench.load(read_source(file)?);
    }
    for line in BreakpointSet::from_lines(breakpoints).lines() {
        workbench.toggle_breakpoint(line).await?;
    }

    let mut shown_output = None;
    match workbench.debug_start().await {
        Ok(state) => {
            if let Some(session) = workbench.debug().session() {
                println!("Debug session {}", session.short().dimmed());
            }
            print_state(&state, &mut shown_output);
        }
        Err(e) => print_failure(&workbench.status().text, &e),
    }

    let mut lines = stdin_lines();
    loop {
        prompt("(debug) ")?;
        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };

        let result = match command {
            "step" | "s" => workbench.debug_step().await,
            "continue" | "c" => workbench.debug_continue().await,
            "refresh" => workbench.debug_refresh().await,
            "restart" => {
                shown_output = None;
                workbench.debug_start().await
            }
            "break" | "b" => {
                match words.next().map(str::parse::<u32>) {
                    Some(Ok(line)) if line > 0 => match workbench.toggle_breakpoint(line).await {
                        Ok(diff) => {
                            if diff.added.contains(&line) {
                                println!("Breakpoint set at line {}", line);
                            } else if diff.removed.contains(&line) {
                                println!("Breakpoint removed from line {}", line);
                            }
                            print_breakpoints(&workbench.debug().breakpoints());
                        }
                        Err(e) => print_failure(&workbench.status().text, &e),
                    },
                    _ => println!("Usage: break <line>"),
                }
                continue;
            }
            "vars" => {
                match workbench.debug().view().state {
                    Some(state) => print_variables(&state),
                    None => println!("No state available"),
                }
                continue;
            }
            "bt" => {
                match workbench.debug().view().state {
                    Some(state) => print_callstack(&state),
                    None => println!("No state available"),
                }
                continue;
            }
            "quit" | "q" => break,
            other => {
                println!(
                    "Unknown command '{}'. Commands: step, continue, break N, vars, bt, refresh, restart, quit",
                    other
                );
                continue;
            }
        };

        match result {
            Ok(state) => print_state(&state, &mut shown_output),
            Err(e) => print_failure(&workbench.status().text, &e),
        }
    }

    workbench.debug_reset().await;
    Ok(())
}

fn print_failure(status: &str, error: &Error) {
    println!("{}: {}", status.red(), error);
}

fn print_state(state: &DebugState, shown_output: &mut Option<String>) {
    if let Some(output) = state.output.as_deref().filter(|o| !o.is_empty()) {
        if shown_output.as_deref() != Some(output) {
            // Output is cumulative; print only what is new
            let fresh = match shown_output.as_deref() {
                Some(previous) if output.starts_with(previous) => &output[previous.len()..],
                _ => output,
            };
            print!("{}", fresh);
            if !fresh.ends_with('\n') {
                println!();
            }
            *shown_output = Some(output.to_string());
        }
    }

    if state.paused {
        match state.current_line() {
            Some(line) => println!("Paused at line {}", line.to_string().bold()),
            None => println!("Paused"),
        }
    } else if let Some(error) = &state.error {
        println!("{} {}", "Program stopped:".red(), error);
    } else {
        println!("{} Program finished", "✓".green());
    }
}

fn print_variables(state: &DebugState) {
    if state.variables.is_empty() {
        println!("No variables");
        return;
    }
    for (name, value) in &state.variables {
        println!("  {} = {}", name, value);
    }
}

fn print_callstack(state: &DebugState) {
    if state.callstack.is_empty() {
        println!("No call stack");
        return;
    }
    // The engine already lists the innermost frame first
    for (i, frame) in state.callstack.iter().enumerate() {
        println!("#{} {}", i, frame);
    }
}

fn print_breakpoints(lines: &[u32]) {
    if lines.is_empty() {
        println!("{}", "No breakpoints set".dimmed());
    } else {
        let list = lines.iter().map(u32::to_string).collect::<Vec<_>>().join(", ");
        println!("{} {}", "Breakpoints:".dimmed(), list);
    }
}
