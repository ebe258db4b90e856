//! # Annotation Parser
//!
//! Scans the raw text of a script for structured comment lines and turns them
//! into a [`CommandSchema`]. The grammar is:
//!
//! ```text
//! # @description: <text>
//! # @arg <name> [modifier ...]: <text>
//! # @option <name>[,<shortcut>] [modifier ...]: <text>
//! ```
//!
//! Modifiers are drawn from `optional`, `flag` and `default=<value>`.
//!
//! Parsing never fails. A malformed annotation line is skipped and reported as
//! a [`ParseWarning`]; the rest of the file keeps parsing, so one bad comment
//! cannot hide a script from discovery.

use crate::models::{ArgSpec, CommandSchema, OptionKind, OptionSpec, canonical_var_name};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use thiserror::Error;

lazy_static! {
    // A comment line carrying one of our tags. The tag must be followed by a
    // boundary so that `@arguments` or `@options` are not mistaken for ours.
    static ref ANNOTATION_RE: Regex =
        Regex::new(r"^\s*#\s*@(description|arg|option)\b(.*)$").expect("annotation regex is valid");

    static ref NAME_RE: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("name regex is valid");
}

/// Why an annotation line was skipped (or, for descriptions, overridden).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseWarningKind {
    /// No space after the tag.
    #[error("'@{tag}' must be followed by a space")]
    MissingSeparator { tag: String },
    /// `@description` without a `:`.
    #[error("'@description' needs a ':' before its text")]
    DescriptionWithoutColon,
    /// A second `@description`.
    #[error("'@description' declared more than once, the last one wins")]
    DuplicateDescription,
    /// No name after the tag.
    #[error("'@{tag}' has an empty name")]
    EmptyName { tag: String },
    /// A name with characters outside `[A-Za-z0-9_-]`.
    #[error("invalid name '{name}' (use letters, digits, '-' and '_')")]
    InvalidName { name: String },
    /// The shortcut is not a single ASCII letter or digit.
    #[error("invalid shortcut '{shortcut}' for option '{option}' (must be a single letter or digit)")]
    InvalidShortcut { option: String, shortcut: String },
    /// A `[` without its `]`.
    #[error("unclosed '[' in modifiers")]
    UnclosedModifier,
    /// A modifier other than `optional`, `flag` or `default=`.
    #[error("unknown modifier '{modifier}'")]
    UnknownModifier { modifier: String },
    /// E.g. `flag` on an `@arg`.
    #[error("modifier '{modifier}' is not allowed on '@{tag}'")]
    ModifierNotAllowed { modifier: String, tag: String },
    /// `flag` and `default=` on the same option.
    #[error("modifiers 'flag' and 'default' cannot be combined")]
    FlagWithDefault,
    /// Text between the modifiers and the `:`.
    #[error("unexpected text '{text}' (expected ':' before the help text)")]
    TrailingText { text: String },
}

/// A non-fatal problem found on one annotation line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based line number in the script.
    pub line: usize,
    /// What was wrong with the line.
    pub kind: ParseWarningKind,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

/// The outcome of scanning one script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedScript {
    /// Every annotation line was understood.
    Complete(CommandSchema),
    /// Some lines were skipped. The schema holds everything else.
    Partial {
        schema: CommandSchema,
        warnings: Vec<ParseWarning>,
    },
}

impl ParsedScript {
    /// The schema built from the understood lines.
    pub fn schema(&self) -> &CommandSchema {
        match self {
            Self::Complete(schema) | Self::Partial { schema, .. } => schema,
        }
    }

    /// Skipped lines, empty for a complete parse.
    pub fn warnings(&self) -> &[ParseWarning] {
        match self {
            Self::Complete(_) => &[],
            Self::Partial { warnings, .. } => warnings,
        }
    }

    /// Splits into the schema and the skipped lines.
    pub fn into_parts(self) -> (CommandSchema, Vec<ParseWarning>) {
        match self {
            Self::Complete(schema) => (schema, Vec::new()),
            Self::Partial { schema, warnings } => (schema, warnings),
        }
    }
}

// --- DECLARATION PARSING ---

/// Modifiers collected from the bracket groups of one declaration.
#[derive(Debug, Default)]
struct Modifiers {
    optional: bool,
    flag: bool,
    default: Option<String>,
}

/// The pieces of an `@arg`/`@option` line after the tag.
#[derive(Debug)]
struct Declaration<'a> {
    head: &'a str,
    modifiers: Modifiers,
    help: String,
}

/// Parses a script's text into a schema. `name` is the command name derived
/// from the file identity.
pub fn parse_annotations(name: &str, text: &str) -> ParsedScript {
    let mut schema = CommandSchema {
        name: name.to_string(),
        ..Default::default()
    };
    let mut warnings = Vec::new();
    let mut seen_description = false;

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let Some(caps) = ANNOTATION_RE.captures(line) else {
            continue;
        };
        let tag = caps.get(1).map_or("", |m| m.as_str());
        let rest = caps.get(2).map_or("", |m| m.as_str());

        let result = match tag {
            "description" => parse_description(rest).map(|text| {
                if seen_description {
                    warnings.push(ParseWarning {
                        line: line_no,
                        kind: ParseWarningKind::DuplicateDescription,
                    });
                }
                seen_description = true;
                schema.description = text;
            }),
            "arg" => parse_arg(rest).map(|arg| schema.positionals.push(arg)),
            "option" => parse_option(rest).map(|opt| schema.options.push(opt)),
            _ => Ok(()),
        };

        if let Err(kind) = result {
            log::debug!("Skipping annotation on line {} of '{}': {}", line_no, name, kind);
            warnings.push(ParseWarning {
                line: line_no,
                kind,
            });
        }
    }

    if warnings.is_empty() {
        ParsedScript::Complete(schema)
    } else {
        ParsedScript::Partial { schema, warnings }
    }
}

fn parse_description(rest: &str) -> Result<String, ParseWarningKind> {
    rest.trim_start()
        .strip_prefix(':')
        .map(|text| text.trim().to_string())
        .ok_or(ParseWarningKind::DescriptionWithoutColon)
}

fn parse_arg(rest: &str) -> Result<ArgSpec, ParseWarningKind> {
    let decl = parse_declaration("arg", rest)?;
    let name = validate_name("arg", decl.head)?;

    if decl.modifiers.flag {
        return Err(ParseWarningKind::ModifierNotAllowed {
            modifier: "flag".to_string(),
            tag: "arg".to_string(),
        });
    }

    let required = !decl.modifiers.optional && decl.modifiers.default.is_none();
    Ok(ArgSpec {
        name: name.to_string(),
        required,
        default: decl.modifiers.default,
        help: decl.help,
    })
}

fn parse_option(rest: &str) -> Result<OptionSpec, ParseWarningKind> {
    let decl = parse_declaration("option", rest)?;

    let (raw_name, raw_shortcut) = match decl.head.split_once(',') {
        Some((name, shortcut)) => (name.trim(), Some(shortcut.trim())),
        None => (decl.head, None),
    };
    let name = validate_name("option", raw_name)?;

    let shortcut = match raw_shortcut {
        None => None,
        Some(s) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphanumeric() => Some(c),
                _ => {
                    return Err(ParseWarningKind::InvalidShortcut {
                        option: name.to_string(),
                        shortcut: s.to_string(),
                    });
                }
            }
        }
    };

    let Modifiers {
        optional,
        flag,
        default,
    } = decl.modifiers;

    let (kind, required) = match (flag, &default) {
        (true, Some(_)) => return Err(ParseWarningKind::FlagWithDefault),
        (true, None) => (OptionKind::Flag, false),
        (false, Some(_)) => (OptionKind::Value, false),
        // A plain value option must be supplied, unless explicitly optional.
        (false, None) => (OptionKind::Value, !optional),
    };

    Ok(OptionSpec {
        name: name.to_string(),
        long: name.to_string(),
        shortcut,
        kind,
        default,
        required,
        help: decl.help,
    })
}

/// Splits `<head> [mods] [mods]: <help>` into its parts.
fn parse_declaration<'a>(tag: &str, rest: &'a str) -> Result<Declaration<'a>, ParseWarningKind> {
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return Err(ParseWarningKind::MissingSeparator {
            tag: tag.to_string(),
        });
    }

    let body = rest.trim_start();
    let head_end = body
        .find(|c: char| c.is_whitespace() || c == '[' || c == ':')
        .unwrap_or(body.len());
    let (head, mut remaining) = body.split_at(head_end);

    let mut modifiers = Modifiers::default();
    loop {
        remaining = remaining.trim_start();
        let Some(group_start) = remaining.strip_prefix('[') else {
            break;
        };
        let close = group_start
            .find(']')
            .ok_or(ParseWarningKind::UnclosedModifier)?;
        let (group, after) = group_start.split_at(close);
        parse_modifier_group(group, &mut modifiers)?;
        remaining = after.strip_prefix(']').unwrap_or(after);
    }

    let remaining = remaining.trim();
    let help = if remaining.is_empty() {
        String::new()
    } else if let Some(help) = remaining.strip_prefix(':') {
        help.trim().to_string()
    } else {
        return Err(ParseWarningKind::TrailingText {
            text: remaining.to_string(),
        });
    };

    Ok(Declaration {
        head,
        modifiers,
        help,
    })
}

/// Parses the content of one `[...]` group, e.g. `optional default=8080`.
/// A `default=` token takes the rest of the group as its value, so defaults
/// may contain spaces: `[default=hello world]`.
fn parse_modifier_group(group: &str, modifiers: &mut Modifiers) -> Result<(), ParseWarningKind> {
    let mut rest = group.trim();
    while !rest.is_empty() {
        if let Some(value) = rest.strip_prefix("default=") {
            modifiers.default = Some(unquote(value.trim()).to_string());
            return Ok(());
        }
        let token_end = rest
            .find(|c: char| c.is_whitespace() || c == ',')
            .unwrap_or(rest.len());
        let (token, tail) = rest.split_at(token_end);
        match token {
            "optional" => modifiers.optional = true,
            "flag" => modifiers.flag = true,
            _ => {
                return Err(ParseWarningKind::UnknownModifier {
                    modifier: token.to_string(),
                });
            }
        }
        rest = tail.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
    }
    Ok(())
}

fn validate_name<'a>(tag: &str, name: &'a str) -> Result<&'a str, ParseWarningKind> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ParseWarningKind::EmptyName {
            tag: tag.to_string(),
        });
    }
    if !NAME_RE.is_match(name) || canonical_var_name(name).is_empty() {
        return Err(ParseWarningKind::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(name)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ParsedScript {
        parse_annotations("test", text)
    }

    #[test]
    fn test_parse_full_header() {
        let text = "#!/bin/bash\n\
                    # @description: Greets a person\n\
                    # @arg name: Person's name\n\
                    # @arg greeting [default=Hello]: Greeting word\n\
                    # @option loud,l [flag]: shout\n\
                    # @option times [default=1]: Repetitions\n\
                    echo hi\n";
        let parsed = parse(text);
        assert!(matches!(parsed, ParsedScript::Complete(_)));

        let schema = parsed.schema();
        assert_eq!(schema.name, "test");
        assert_eq!(schema.description, "Greets a person");
        assert_eq!(schema.positionals.len(), 2);
        assert!(schema.positionals[0].required);
        assert_eq!(schema.positionals[0].help, "Person's name");
        assert!(!schema.positionals[1].required);
        assert_eq!(schema.positionals[1].default.as_deref(), Some("Hello"));

        let loud = &schema.options[0];
        assert_eq!(loud.name, "loud");
        assert_eq!(loud.shortcut, Some('l'));
        assert_eq!(loud.kind, OptionKind::Flag);
        assert!(!loud.required);

        let times = &schema.options[1];
        assert_eq!(times.kind, OptionKind::Value);
        assert_eq!(times.default.as_deref(), Some("1"));
        assert!(!times.required);
    }

    #[test]
    fn test_option_without_modifiers_is_required_value() {
        let parsed = parse("# @option api-key: API key\n");
        let opt = &parsed.schema().options[0];
        assert_eq!(opt.kind, OptionKind::Value);
        assert!(opt.required);
        assert_eq!(opt.var_name(), "API_KEY");
    }

    #[test]
    fn test_optional_arg_and_option() {
        let parsed = parse("# @arg target [optional]: where\n# @option tag [optional]: tag\n");
        let schema = parsed.schema();
        assert!(!schema.positionals[0].required);
        assert!(schema.positionals[0].default.is_none());
        assert!(!schema.options[0].required);
    }

    #[test]
    fn test_default_with_spaces_and_colons() {
        let parsed = parse("# @arg url [default=http://localhost:8080]: Endpoint\n# @arg msg [default=hello world]: Message\n");
        let schema = parsed.schema();
        assert_eq!(
            schema.positionals[0].default.as_deref(),
            Some("http://localhost:8080")
        );
        assert_eq!(schema.positionals[0].help, "Endpoint");
        assert_eq!(schema.positionals[1].default.as_deref(), Some("hello world"));
    }

    #[test]
    fn test_multiple_modifier_groups() {
        let parsed = parse("# @arg port [optional] [default=8080]: Port\n");
        let arg = &parsed.schema().positionals[0];
        assert!(!arg.required);
        assert_eq!(arg.default.as_deref(), Some("8080"));
    }

    #[test]
    fn test_malformed_lines_are_skipped_with_warnings() {
        let text = "# @description: Still works\n\
                    # @arg [optional]: no name\n\
                    # @arg good: fine\n\
                    # @option bad [frobnicate]: unknown modifier\n\
                    # @option worse [flag default=1]: conflicting\n\
                    # @option open [flag: unclosed\n\
                    # @option ok,o [flag]: fine\n";
        let parsed = parse(text);
        let warnings = parsed.warnings().to_vec();
        assert_eq!(warnings.len(), 4);
        assert_eq!(warnings[0].line, 2);
        assert!(matches!(warnings[0].kind, ParseWarningKind::EmptyName { .. }));
        assert!(matches!(
            warnings[1].kind,
            ParseWarningKind::UnknownModifier { .. }
        ));
        assert_eq!(warnings[2].kind, ParseWarningKind::FlagWithDefault);
        assert_eq!(warnings[3].kind, ParseWarningKind::UnclosedModifier);

        let schema = parsed.schema();
        assert_eq!(schema.description, "Still works");
        assert_eq!(schema.positionals.len(), 1);
        assert_eq!(schema.positionals[0].name, "good");
        assert_eq!(schema.options.len(), 1);
        assert_eq!(schema.options[0].name, "ok");
    }

    #[test]
    fn test_duplicate_description_last_wins() {
        let parsed = parse("# @description: first\n# @description: second\n");
        assert_eq!(parsed.schema().description, "second");
        assert_eq!(
            parsed.warnings()[0].kind,
            ParseWarningKind::DuplicateDescription
        );
    }

    #[test]
    fn test_flag_on_arg_is_rejected() {
        let parsed = parse("# @arg verbose [flag]: nope\n");
        assert!(parsed.schema().positionals.is_empty());
        assert!(matches!(
            parsed.warnings()[0].kind,
            ParseWarningKind::ModifierNotAllowed { .. }
        ));
    }

    #[test]
    fn test_invalid_shortcut() {
        let parsed = parse("# @option loud,ll [flag]: shout\n");
        assert!(parsed.schema().options.is_empty());
        assert!(matches!(
            parsed.warnings()[0].kind,
            ParseWarningKind::InvalidShortcut { .. }
        ));
    }

    #[test]
    fn test_unrelated_comments_are_ignored() {
        let text = "# plain comment\n# @author someone\n# @arguments: nope\necho '# @arg x: inside string'\n";
        let parsed = parse(text);
        assert!(matches!(parsed, ParsedScript::Complete(_)));
        assert!(parsed.schema().positionals.is_empty());
    }

    #[test]
    fn test_missing_help_text_is_allowed() {
        let parsed = parse("#@arg name\n#   @option dry-run [flag]\n");
        let schema = parsed.schema();
        assert_eq!(schema.positionals[0].help, "");
        assert_eq!(schema.options[0].name, "dry-run");
    }

    #[test]
    fn test_trailing_text_without_colon() {
        let parsed = parse("# @arg name Person's name\n");
        assert!(matches!(
            parsed.warnings()[0].kind,
            ParseWarningKind::TrailingText { .. }
        ));
    }

    #[test]
    fn test_canonical_form_is_a_fixed_point() {
        let text = "# @description: Deploys things\n\
                    # @arg env: Target environment\n\
                    # @arg region [optional]: Region\n\
                    # @arg port   [ default=8080 ]:   Port  \n\
                    # @option loud,l [flag]: shout\n\
                    # @option api-key: Key\n\
                    # @option tag [optional]\n\
                    # @option mode [default=fast lane]: Mode\n";
        let first = parse(text);
        assert!(first.warnings().is_empty());

        let canonical = first.schema().to_annotations();
        let second = parse(&canonical);
        assert_eq!(first.schema(), second.schema());
        assert_eq!(canonical, second.schema().to_annotations());
    }
}
