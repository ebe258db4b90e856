use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// The built-in command table and routing.
pub mod dispatcher;
/// One handler per built-in command.
pub mod handlers;

const HELP_TEMPLATE: &str = "\
<title>runsh</title> {version}
{about}

<title>Usage:</title> <cmd>runsh</cmd> [-v|-q] [--config PATH] <hl><command|script></hl> [args...]

<title>Commands:</title>
<commands>
  <cmd>runsh</cmd> <hl><script></hl> [args...]  <dim>Any other name runs that script.</dim>

<title>Options:</title>
{options}
";

/// Builds the color-aware top-level help string at runtime.
fn build_help_string() -> String {
    let use_colors = colored::control::SHOULD_COLORIZE.should_colorize();

    let title = if use_colors { "\x1b[1;33m" } else { "" }; // Bold Yellow
    let hl = if use_colors { "\x1b[1;36m" } else { "" }; // Bold Cyan
    let cmd = if use_colors { "\x1b[36m" } else { "" }; // Cyan
    let dim = if use_colors { "\x1b[2m" } else { "" };
    let reset = if use_colors { "\x1b[0m" } else { "" };

    let width = dispatcher::COMMAND_REGISTRY
        .iter()
        .map(|c| command_label(c).len())
        .max()
        .unwrap_or(0);
    let commands: Vec<String> = dispatcher::COMMAND_REGISTRY
        .iter()
        .map(|c| {
            format!(
                "  <cmd>{:<width$}</cmd>  {}",
                command_label(c),
                c.about,
                width = width
            )
        })
        .collect();

    HELP_TEMPLATE
        .replace("<commands>", &commands.join("\n"))
        .replace("<title>", title)
        .replace("</title>", reset)
        .replace("<hl>", hl)
        .replace("</hl>", reset)
        .replace("<cmd>", cmd)
        .replace("</cmd>", reset)
        .replace("<dim>", dim)
        .replace("</dim>", reset)
}

fn command_label(command: &dispatcher::CommandDefinition) -> String {
    let mut names = vec![command.name];
    names.extend(command.aliases.iter().copied());
    format!("{} {}", names.join(", "), command.usage)
}

/// Runs annotated shell scripts as self-documenting CLI commands.
#[derive(Parser, Debug)]
#[command(
    name = "runsh",
    author,
    version,
    about,
    help_template = build_help_string(),
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
// `help` is a runsh command, not clap's help subcommand.
#[command(disable_help_subcommand = true)]
#[command(trailing_var_arg = true)]
pub struct Cli {
    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only print errors.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Use this configuration file instead of the usual lookup.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// The command or script name followed by its arguments.
    #[arg(allow_hyphen_values = true, hide = true)]
    pub args: Vec<String>,
}

// MARK: --- UNIT TESTS ---
