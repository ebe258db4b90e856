// src/models.rs

use std::collections::BTreeMap;
use std::fmt;

// --- COMMAND SCHEMA ---
// Produced by the annotation parser, checked by the validator and then frozen
// inside the registry. Everything downstream (binder, help, executor) reads it.

/// The normalized CLI contract of one script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSchema {
    /// Command name, derived from the script's file stem.
    pub name: String,
    /// Free text from `@description`. May be empty.
    pub description: String,
    /// Positional arguments, in declaration order.
    pub positionals: Vec<ArgSpec>,
    /// Options, in declaration order. Long names are unique.
    pub options: Vec<OptionSpec>,
}

/// A positional argument declared with `@arg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSpec {
    /// The name as written in the annotation.
    pub name: String,
    /// Whether binding fails when the value is absent.
    pub required: bool,
    /// Value used when the token is absent.
    pub default: Option<String>,
    /// Help text after the `:`.
    pub help: String,
}

/// Whether an option records presence or carries a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// Records presence as `1`/`0`.
    Flag,
    /// Takes the next token or the `=` value.
    Value,
}

/// An option declared with `@option`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSpec {
    /// The name as written in the annotation. Used for the variable name.
    pub name: String,
    /// The long form accepted on the command line (without `--`). Usually equal
    /// to `name`, unless the validator had to rename a reserved long name.
    pub long: String,
    /// Single-character alias, as in `-c`.
    pub shortcut: Option<char>,
    /// Flag or value.
    pub kind: OptionKind,
    /// Value used when the token is absent.
    pub default: Option<String>,
    /// Whether binding fails when the value is absent.
    pub required: bool,
    /// Help text after the `:`.
    pub help: String,
}

impl ArgSpec {
    /// The environment variable this argument is bound to.
    pub fn var_name(&self) -> String {
        canonical_var_name(&self.name)
    }
}

impl OptionSpec {
    /// The environment variable this option is bound to.
    pub fn var_name(&self) -> String {
        canonical_var_name(&self.name)
    }

    /// Whether the option is a flag.
    pub fn is_flag(&self) -> bool {
        self.kind == OptionKind::Flag
    }
}

impl CommandSchema {
    /// Finds an option by its command-line long form.
    pub fn option_by_long(&self, long: &str) -> Option<&OptionSpec> {
        self.options.iter().find(|opt| opt.long == long)
    }

    /// Finds an option by its single-character shortcut.
    pub fn option_by_shortcut(&self, shortcut: char) -> Option<&OptionSpec> {
        self.options
            .iter()
            .find(|opt| opt.shortcut == Some(shortcut))
    }

    /// The description to show in listings, with a fallback for undocumented scripts.
    pub fn summary(&self) -> String {
        if self.description.is_empty() {
            format!("Run {} script", self.name)
        } else {
            self.description.clone()
        }
    }

    /// Renders the schema back to canonical annotation lines.
    ///
    /// Parsing the output again yields an equal schema, which makes the
    /// canonical form a fixed point.
    pub fn to_annotations(&self) -> String {
        let mut out = String::new();
        if !self.description.is_empty() {
            out.push_str(&format!("# @description: {}\n", self.description));
        }
        for arg in &self.positionals {
            out.push_str(&arg.to_annotation());
            out.push('\n');
        }
        for opt in &self.options {
            out.push_str(&opt.to_annotation());
            out.push('\n');
        }
        out
    }
}

impl ArgSpec {
    /// Canonical `# @arg` line for this argument.
    pub fn to_annotation(&self) -> String {
        let modifiers = match (&self.default, self.required) {
            (Some(default), _) => format!(" [default={}]", default),
            (None, false) => " [optional]".to_string(),
            (None, true) => String::new(),
        };
        format!("# @arg {}{}: {}", self.name, modifiers, self.help)
            .trim_end()
            .to_string()
    }
}

impl OptionSpec {
    /// Canonical `# @option` line for this option.
    pub fn to_annotation(&self) -> String {
        let shortcut = self
            .shortcut
            .map(|c| format!(",{}", c))
            .unwrap_or_default();
        let modifiers = match (self.kind, &self.default, self.required) {
            (OptionKind::Flag, _, _) => " [flag]".to_string(),
            (OptionKind::Value, Some(default), _) => format!(" [default={}]", default),
            (OptionKind::Value, None, false) => " [optional]".to_string(),
            (OptionKind::Value, None, true) => String::new(),
        };
        format!(
            "# @option {}{}{}: {}",
            self.name, shortcut, modifiers, self.help
        )
        .trim_end()
        .to_string()
    }
}

/// Converts a declared name into its environment variable form:
/// uppercase, with every run of non-alphanumeric characters collapsed to `_`.
///
/// Leading and trailing separators are dropped, so `--dry-run-` becomes `DRY_RUN`.
pub fn canonical_var_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_separator = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.push(c.to_ascii_uppercase());
        } else {
            pending_separator = true;
        }
    }
    out
}

// --- INVOCATION ---

/// Mapping from uppercase snake-case variable name to string value.
pub type BindingMap = BTreeMap<String, String>;

/// Built-in flags that may appear in any script's invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuiltinFlags {
    /// `-h/--help`.
    pub help: bool,
    /// `-v/--verbose`.
    pub verbose: bool,
    /// `-q/--quiet`.
    pub quiet: bool,
    /// `-V/--version`.
    pub version: bool,
}

/// The result of binding a token vector against a schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Variables to export to the script.
    pub vars: BindingMap,
    /// Positional values in schema order, passed as `$1..$n`.
    pub positionals: Vec<String>,
    /// Built-in flags seen while binding.
    pub builtins: BuiltinFlags,
}

// --- SCRIPT ORIGIN ---

/// Where a registered script's text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOrigin {
    /// A file in a local scripts directory.
    Local(std::path::PathBuf),
    /// A file in a cache entry.
    Remote {
        /// The cache key of the entry holding this script.
        cache_key: String,
        /// The file inside the cache entry.
        path: std::path::PathBuf,
    },
}

impl fmt::Display for ScriptOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "local: {}", path.display()),
            Self::Remote { cache_key, .. } => write!(f, "remote: {}", cache_key),
        }
    }
}

/// Raw text of one discovered script, before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptText {
    /// Script name: the file name without the extension.
    pub name: String,
    /// The whole file.
    pub content: String,
    /// Where the file was found.
    pub origin: ScriptOrigin,
}
