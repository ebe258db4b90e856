// src/cli/handlers/commons.rs

// Shared output helpers used by several handlers.

use crate::core::binder::usage_line;
use crate::core::registry::{Registry, RegisteredCommand};
use crate::core::reserved::{Builtin, ReservedSet};
use crate::models::{OptionKind, OptionSpec};
use anyhow::{Error, anyhow};
use colored::Colorize;

/// Prints a yellow `Warning:` line to stderr unless `quiet` is set.
pub fn print_warning(quiet: bool, message: &str) {
    log::debug!("warning: {}", message);
    if !quiet {
        eprintln!("{} {}", "Warning:".yellow().bold(), message);
    }
}

/// Prints every warning attached to one registered script.
pub fn print_command_warnings(quiet: bool, command: &RegisteredCommand) {
    for warning in command.warnings() {
        print_warning(quiet, &warning);
    }
}

/// Warns when `name` hides a remote script of the same name.
pub fn print_shadowing(quiet: bool, registry: &Registry, name: &str) {
    for shadowed in registry.shadowed().iter().filter(|s| s.name == name) {
        print_warning(
            quiet,
            &format!(
                "script '{}' ({}) hides the remote script of the same name ({})",
                name, shadowed.by, shadowed.hidden
            ),
        );
    }
}

/// The error for a name that is neither registered nor excluded.
///
/// Excluded scripts get their validation failure as the message so the user
/// can fix the annotations.
pub fn unknown_script(registry: &Registry, name: &str) -> Error {
    match registry.excluded_by_name(name) {
        Some(excluded) => anyhow!(
            "Script '{}' is unavailable: {}",
            name.cyan(),
            excluded.reason
        ),
        None => anyhow!(
            "Unknown command or script '{}'. Run '{}' to see what is available.",
            name.cyan(),
            "runsh list".bold()
        ),
    }
}

fn builtin_help(builtin: Builtin) -> &'static str {
    match builtin {
        Builtin::Help => "Show this help",
        Builtin::Verbose => "Verbose output (exports RUNSH_VERBOSE=1)",
        Builtin::Quiet => "Quiet output (exports RUNSH_QUIET=1)",
        Builtin::Version => "Print the runsh version",
    }
}

fn option_label(opt: &OptionSpec) -> String {
    let short = opt
        .shortcut
        .map(|c| format!("-{}, ", c))
        .unwrap_or_else(|| "    ".to_string());
    match opt.kind {
        OptionKind::Flag => format!("{}--{}", short, opt.long),
        OptionKind::Value => format!("{}--{} <{}>", short, opt.long, opt.var_name()),
    }
}

fn option_note(opt: &OptionSpec) -> String {
    match (&opt.default, opt.required) {
        (Some(default), _) if !default.is_empty() => format!(" [default: {}]", default),
        (_, true) => " [required]".to_string(),
        _ => String::new(),
    }
}

/// Renders the full usage text of a script.
pub fn render_help(command: &RegisteredCommand, reserved: &ReservedSet) -> String {
    let schema = &command.schema;
    let mut out = String::new();

    out.push_str(&format!(
        "{} runsh {}\n\n",
        "Usage:".yellow().bold(),
        usage_line(schema)
    ));
    out.push_str(&format!("{}\n", schema.summary()));

    if !schema.positionals.is_empty() {
        let rows: Vec<(String, String)> = schema
            .positionals
            .iter()
            .map(|arg| {
                let label = if arg.required {
                    format!("<{}>", arg.name)
                } else {
                    format!("[{}]", arg.name)
                };
                let note = arg
                    .default
                    .as_ref()
                    .map(|d| format!(" [default: {}]", d))
                    .unwrap_or_default();
                (label, format!("{}{}", arg.help, note))
            })
            .collect();
        push_section(&mut out, "Arguments:", &rows);
    }

    let mut rows: Vec<(String, String)> = schema
        .options
        .iter()
        .map(|opt| (option_label(opt), format!("{}{}", opt.help, option_note(opt))))
        .collect();
    rows.extend(reserved.entries().iter().map(|entry| {
        (
            format!("-{}, --{}", entry.shortcut, entry.long),
            builtin_help(entry.builtin).to_string(),
        )
    }));
    push_section(&mut out, "Options:", &rows);

    out.push_str(&format!("\n{} {}\n", "Source:".dimmed(), command.origin));
    out
}

fn push_section(out: &mut String, title: &str, rows: &[(String, String)]) {
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    out.push_str(&format!("\n{}\n", title.yellow().bold()));
    for (label, help) in rows {
        let padded = format!("{:<width$}", label, width = width);
        out.push_str(&format!("  {}  {}\n", padded.cyan(), help));
    }
}

// MARK: --- UNIT TESTS ---
