//! # Argument Binder
//!
//! Matches the runtime tokens of one invocation against a validated
//! [`CommandSchema`] and produces the variables exported to the script.
//!
//! Tokens are walked left to right. `--name`, `--name=value` and `-c` are
//! option tokens; anything else (including `-` and negative numbers such as
//! `-5`) is positional. A bare `--` ends option parsing.
//!
//! After the walk, unsupplied options and optional positionals receive their
//! declared default (or an empty value), flags default to `"0"`, and anything
//! still required is reported. Values are never coerced: everything is a
//! string at this layer.

use crate::constants::{FLAG_OFF, FLAG_ON};
use crate::core::reserved::{Builtin, ReservedSet};
use crate::models::{BindingMap, CommandSchema, Invocation, OptionSpec};
use std::collections::HashMap;
use thiserror::Error;

/// A terminal problem with an invocation. The script is not executed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// A required positional was not supplied.
    #[error("missing required argument '{0}'")]
    MissingArgument(String),
    /// More positionals than declared.
    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),
    /// An option token no declared or built-in option matches.
    #[error("unknown option '{0}'")]
    UnknownOption(String),
    /// A value option at the end or before another long option.
    #[error("option '{0}' requires a value")]
    MissingOptionValue(String),
    /// A required value option was not supplied.
    #[error("missing required option '{0}'")]
    MissingRequired(String),
    /// A flag was given an attached value (`--loud=1`).
    #[error("option '{0}' is a flag and does not take a value")]
    FlagWithValue(String),
}

/// The shape of one token, before it is matched against the schema.
#[derive(Debug, PartialEq, Eq)]
enum Token<'a> {
    /// `--name` or `--name=value`.
    Long {
        name: &'a str,
        value: Option<&'a str>,
    },
    /// `-c`. A digit is only an option when a script declares it.
    Short(char),
    /// `-abc`: option-shaped, never matched.
    Unknown(&'a str),
    /// `--`.
    EndOfOptions,
    Positional(&'a str),
}

fn classify(token: &str) -> Token<'_> {
    if token == "--" {
        return Token::EndOfOptions;
    }
    if let Some(body) = token.strip_prefix("--") {
        return match body.split_once('=') {
            Some((name, value)) => Token::Long {
                name,
                value: Some(value),
            },
            None => Token::Long {
                name: body,
                value: None,
            },
        };
    }
    if let Some(body) = token.strip_prefix('-') {
        let mut chars = body.chars();
        return match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphanumeric() => Token::Short(c),
            (Some(c), Some(_)) if c.is_ascii_alphabetic() => Token::Unknown(token),
            _ => Token::Positional(token),
        };
    }
    Token::Positional(token)
}

/// Binds `tokens` (the command name already stripped) against `schema`.
///
/// When `-h/--help` or `-V/--version` appear, binding stops early and the
/// returned [`Invocation`] only carries the built-in flags; the caller is
/// expected to print help or the version instead of running the script.
pub fn bind(
    schema: &CommandSchema,
    tokens: &[String],
    reserved: &ReservedSet,
) -> Result<Invocation, BindingError> {
    let mut invocation = Invocation::default();
    let mut supplied: HashMap<&str, String> = HashMap::new();
    let mut positionals: Vec<&str> = Vec::new();
    let mut options_ended = false;

    let mut iter = tokens.iter().map(String::as_str).peekable();
    while let Some(raw) = iter.next() {
        let token = if options_ended {
            Token::Positional(raw)
        } else {
            classify(raw)
        };

        let (opt, attached) = match token {
            Token::EndOfOptions => {
                options_ended = true;
                continue;
            }
            Token::Positional(value) => {
                push_positional(schema, &mut positionals, value)?;
                continue;
            }
            Token::Unknown(value) => {
                return Err(BindingError::UnknownOption(value.to_string()));
            }
            Token::Long { name, value } => match schema.option_by_long(name) {
                Some(opt) => (opt, value),
                None => {
                    let builtin = reserved
                        .by_long(name)
                        .ok_or_else(|| BindingError::UnknownOption(raw.to_string()))?;
                    if value.is_some() {
                        return Err(BindingError::FlagWithValue(format!("--{}", name)));
                    }
                    if apply_builtin(&mut invocation, builtin) {
                        return Ok(invocation);
                    }
                    continue;
                }
            },
            Token::Short(c) => match schema.option_by_shortcut(c) {
                Some(opt) => (opt, None),
                // `-5` without a declared `5` shortcut is a negative number.
                None if c.is_ascii_digit() => {
                    push_positional(schema, &mut positionals, raw)?;
                    continue;
                }
                None => {
                    let builtin = reserved
                        .by_shortcut(c)
                        .ok_or_else(|| BindingError::UnknownOption(raw.to_string()))?;
                    if apply_builtin(&mut invocation, builtin) {
                        return Ok(invocation);
                    }
                    continue;
                }
            },
        };

        let value = option_value(opt, attached, &mut iter)?;
        // Repeated options: the last occurrence wins.
        supplied.insert(opt.long.as_str(), value);
    }

    let mut vars = BindingMap::new();

    for (index, arg) in schema.positionals.iter().enumerate() {
        let value = match positionals.get(index) {
            Some(value) => (*value).to_string(),
            None if arg.required => return Err(BindingError::MissingArgument(arg.var_name())),
            None => arg.default.clone().unwrap_or_default(),
        };
        invocation.positionals.push(value.clone());
        vars.insert(arg.var_name(), value);
    }

    for opt in &schema.options {
        let value = match supplied.remove(opt.long.as_str()) {
            Some(value) => value,
            None if opt.is_flag() => FLAG_OFF.to_string(),
            None if opt.required => return Err(BindingError::MissingRequired(opt.var_name())),
            None => opt.default.clone().unwrap_or_default(),
        };
        vars.insert(opt.var_name(), value);
    }

    invocation.vars = vars;
    Ok(invocation)
}

fn push_positional<'a>(
    schema: &CommandSchema,
    positionals: &mut Vec<&'a str>,
    value: &'a str,
) -> Result<(), BindingError> {
    if positionals.len() >= schema.positionals.len() {
        return Err(BindingError::UnexpectedArgument(value.to_string()));
    }
    positionals.push(value);
    Ok(())
}

/// Resolves the value of one matched option token.
fn option_value<'a, I>(
    opt: &OptionSpec,
    attached: Option<&str>,
    rest: &mut std::iter::Peekable<I>,
) -> Result<String, BindingError>
where
    I: Iterator<Item = &'a str>,
{
    if opt.is_flag() {
        return match attached {
            Some(_) => Err(BindingError::FlagWithValue(format!("--{}", opt.long))),
            None => Ok(FLAG_ON.to_string()),
        };
    }
    if let Some(value) = attached {
        return Ok(value.to_string());
    }
    match rest.peek() {
        Some(next) if !next.starts_with("--") => Ok(rest.next().unwrap_or_default().to_string()),
        _ => Err(BindingError::MissingOptionValue(format!("--{}", opt.long))),
    }
}

/// Records a built-in flag. Returns `true` when binding should stop.
fn apply_builtin(invocation: &mut Invocation, builtin: Builtin) -> bool {
    match builtin {
        Builtin::Help => {
            invocation.builtins.help = true;
            true
        }
        Builtin::Version => {
            invocation.builtins.version = true;
            true
        }
        Builtin::Verbose => {
            invocation.builtins.verbose = true;
            false
        }
        Builtin::Quiet => {
            invocation.builtins.quiet = true;
            false
        }
    }
}

/// Renders the usage line of a schema, e.g. `deploy <env> [region] [options]`.
pub fn usage_line(schema: &CommandSchema) -> String {
    let mut parts = vec![schema.name.clone()];
    for arg in &schema.positionals {
        if arg.required {
            parts.push(format!("<{}>", arg.name));
        } else {
            parts.push(format!("[{}]", arg.name));
        }
    }
    for opt in schema.options.iter().filter(|o| o.required) {
        parts.push(format!("--{} <{}>", opt.long, opt.var_name().to_lowercase()));
    }
    if schema.options.iter().any(|o| !o.required) {
        parts.push("[options]".to_string());
    }
    parts.join(" ")
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::annotations::parse_annotations;
    use crate::core::validator::validate;

    fn schema(text: &str) -> CommandSchema {
        let parsed = parse_annotations("test", text);
        assert!(parsed.warnings().is_empty(), "{:?}", parsed.warnings());
        validate(parsed.schema().clone(), &ReservedSet::standard())
            .unwrap()
            .schema
    }

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn bind_std(schema: &CommandSchema, list: &[&str]) -> Result<Invocation, BindingError> {
        bind(schema, &tokens(list), &ReservedSet::standard())
    }

    fn vars(pairs: &[(&str, &str)]) -> BindingMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // --- End-to-end scenarios ---

    #[test]
    fn test_positional_and_flag() {
        let s = schema("# @arg name: Person's name\n# @option loud,l [flag]: shout\n");
        let inv = bind_std(&s, &["World", "--loud"]).unwrap();
        assert_eq!(inv.vars, vars(&[("NAME", "World"), ("LOUD", "1")]));
        assert_eq!(inv.positionals, vec!["World"]);

        let inv = bind_std(&s, &["-l", "World"]).unwrap();
        assert_eq!(inv.vars, vars(&[("NAME", "World"), ("LOUD", "1")]));

        let inv = bind_std(&s, &["World"]).unwrap();
        assert_eq!(inv.vars, vars(&[("NAME", "World"), ("LOUD", "0")]));
    }

    #[test]
    fn test_positional_default() {
        let s = schema("# @arg port [default=8080]: Port\n");
        let inv = bind_std(&s, &[]).unwrap();
        assert_eq!(inv.vars, vars(&[("PORT", "8080")]));
        assert_eq!(inv.positionals, vec!["8080"]);
    }

    #[test]
    fn test_missing_required_option() {
        let s = schema("# @option api-key: API key\n");
        assert_eq!(
            bind_std(&s, &[]),
            Err(BindingError::MissingRequired("API_KEY".to_string()))
        );
        let inv = bind_std(&s, &["--api-key", "secret"]).unwrap();
        assert_eq!(inv.vars, vars(&[("API_KEY", "secret")]));
    }

    // --- Positionals ---

    #[test]
    fn test_missing_and_unexpected_positionals() {
        let s = schema("# @arg env: Environment\n# @arg region [optional]: Region\n");
        assert_eq!(
            bind_std(&s, &[]),
            Err(BindingError::MissingArgument("ENV".to_string()))
        );
        assert_eq!(
            bind_std(&s, &["prod", "eu", "extra"]),
            Err(BindingError::UnexpectedArgument("extra".to_string()))
        );
        let inv = bind_std(&s, &["prod"]).unwrap();
        assert_eq!(inv.vars, vars(&[("ENV", "prod"), ("REGION", "")]));
    }

    #[test]
    fn test_dash_tokens_are_positional() {
        let s = schema("# @arg a: a\n# @arg b: b\n");
        let inv = bind_std(&s, &["-", "-5"]).unwrap();
        assert_eq!(inv.vars, vars(&[("A", "-"), ("B", "-5")]));
    }

    #[test]
    fn test_double_dash_ends_options() {
        let s = schema("# @arg pattern: p\n# @option loud,l [flag]: shout\n");
        let inv = bind_std(&s, &["--", "--loud"]).unwrap();
        assert_eq!(inv.vars, vars(&[("PATTERN", "--loud"), ("LOUD", "0")]));
    }

    // --- Options ---

    #[test]
    fn test_value_option_forms() {
        let s = schema("# @option times,t [default=1]: Repeat count\n");
        assert_eq!(bind_std(&s, &[]).unwrap().vars, vars(&[("TIMES", "1")]));
        assert_eq!(
            bind_std(&s, &["--times", "3"]).unwrap().vars,
            vars(&[("TIMES", "3")])
        );
        assert_eq!(
            bind_std(&s, &["--times=4"]).unwrap().vars,
            vars(&[("TIMES", "4")])
        );
        assert_eq!(
            bind_std(&s, &["-t", "5"]).unwrap().vars,
            vars(&[("TIMES", "5")])
        );
        // Values are passed through verbatim.
        assert_eq!(
            bind_std(&s, &["--times", "-2"]).unwrap().vars,
            vars(&[("TIMES", "-2")])
        );
        // Last occurrence wins.
        assert_eq!(
            bind_std(&s, &["-t", "5", "--times=6"]).unwrap().vars,
            vars(&[("TIMES", "6")])
        );
    }

    #[test]
    fn test_missing_option_value() {
        let s = schema("# @option times [default=1]: t\n# @option loud [flag]: l\n");
        assert_eq!(
            bind_std(&s, &["--times"]),
            Err(BindingError::MissingOptionValue("--times".to_string()))
        );
        assert_eq!(
            bind_std(&s, &["--times", "--loud"]),
            Err(BindingError::MissingOptionValue("--times".to_string()))
        );
    }

    #[test]
    fn test_unknown_options() {
        let s = schema("# @option loud,l [flag]: l\n");
        assert_eq!(
            bind_std(&s, &["--louder"]),
            Err(BindingError::UnknownOption("--louder".to_string()))
        );
        assert_eq!(
            bind_std(&s, &["-x"]),
            Err(BindingError::UnknownOption("-x".to_string()))
        );
        assert_eq!(
            bind_std(&s, &["-lx"]),
            Err(BindingError::UnknownOption("-lx".to_string()))
        );
    }

    #[test]
    fn test_clustered_dash_token_never_matches_a_long_name() {
        let s = schema("# @option lx [flag]: l\n");
        assert_eq!(
            bind_std(&s, &["-lx"]),
            Err(BindingError::UnknownOption("-lx".to_string()))
        );
        assert_eq!(
            bind_std(&s, &["-verbose"]),
            Err(BindingError::UnknownOption("-verbose".to_string()))
        );
        assert_eq!(bind_std(&s, &["--lx"]).unwrap().vars, vars(&[("LX", "1")]));
    }

    #[test]
    fn test_digit_shortcut() {
        let s = schema("# @arg offset [optional]: o\n# @option level,3 [default=1]: l\n");
        let inv = bind_std(&s, &["-3", "9"]).unwrap();
        assert_eq!(inv.vars, vars(&[("OFFSET", ""), ("LEVEL", "9")]));

        // Undeclared digits stay positional.
        let inv = bind_std(&s, &["-5"]).unwrap();
        assert_eq!(inv.vars, vars(&[("OFFSET", "-5"), ("LEVEL", "1")]));
    }

    #[test]
    fn test_flag_with_attached_value() {
        let s = schema("# @option loud [flag]: l\n");
        assert_eq!(
            bind_std(&s, &["--loud=1"]),
            Err(BindingError::FlagWithValue("--loud".to_string()))
        );
    }

    // --- Reserved flags ---

    #[test]
    fn test_builtin_flags() {
        let s = schema("# @arg name: n\n");
        let inv = bind_std(&s, &["--help"]).unwrap();
        assert!(inv.builtins.help);
        assert!(inv.vars.is_empty());

        // Help short-circuits even when required arguments are missing.
        assert!(bind_std(&s, &["-h"]).unwrap().builtins.help);
        assert!(bind_std(&s, &["-V"]).unwrap().builtins.version);

        let inv = bind_std(&s, &["-v", "World", "--quiet"]).unwrap();
        assert!(inv.builtins.verbose);
        assert!(inv.builtins.quiet);
        assert_eq!(inv.vars, vars(&[("NAME", "World")]));
    }

    #[test]
    fn test_renamed_reserved_long_name() {
        let s = schema("# @option help [flag]: script-level help\n");
        let inv = bind_std(&s, &["--help-sh"]).unwrap();
        assert_eq!(inv.vars, vars(&[("HELP", "1")]));
        assert!(!inv.builtins.help);
    }

    #[test]
    fn test_dropped_reserved_shortcut_keeps_long_form() {
        let s = schema("# @option verbose-output,v [flag]: more\n");
        let inv = bind_std(&s, &["--verbose-output"]).unwrap();
        assert_eq!(inv.vars, vars(&[("VERBOSE_OUTPUT", "1")]));

        // `-v` now means the built-in verbose flag.
        let inv = bind_std(&s, &["-v"]).unwrap();
        assert!(inv.builtins.verbose);
        assert_eq!(inv.vars, vars(&[("VERBOSE_OUTPUT", "0")]));
    }

    #[test]
    fn test_defaults_only_invocation_yields_binary_flags() {
        let s = schema(
            "# @arg a [optional]: a\n\
             # @option f1 [flag]: f\n\
             # @option f2,x [flag]: f\n\
             # @option v1 [default=z]: v\n\
             # @option v2 [optional]: v\n",
        );
        let inv = bind_std(&s, &[]).unwrap();
        for opt in s.options.iter().filter(|o| o.is_flag()) {
            let value = inv.vars.get(&opt.var_name()).unwrap();
            assert!(value == "1" || value == "0");
        }
        assert_eq!(inv.vars.get("V1").map(String::as_str), Some("z"));
        assert_eq!(inv.vars.get("V2").map(String::as_str), Some(""));
    }

    #[test]
    fn test_usage_line() {
        let s = schema(
            "# @arg env: e\n# @arg region [optional]: r\n# @option api-key: k\n# @option loud [flag]: l\n",
        );
        assert_eq!(
            usage_line(&s),
            "test <env> [region] --api-key <api_key> [options]"
        );
    }
}
