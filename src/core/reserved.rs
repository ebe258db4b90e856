// src/core/reserved.rs

/// A built-in behaviour reachable from any script's command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// `-h/--help`: print the script usage.
    Help,
    /// `-v/--verbose`: more log output.
    Verbose,
    /// `-q/--quiet`: only errors.
    Quiet,
    /// `-V/--version`: print the runsh version.
    Version,
}

/// One reserved `-c` / `--long` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedEntry {
    /// The `-c` form.
    pub shortcut: char,
    /// Long name without `--`.
    pub long: String,
    /// What the pair triggers.
    pub builtin: Builtin,
}

/// The shortcuts and long names claimed by the tool itself.
///
/// Built once at startup and passed by reference to the validator and the
/// binder. Tests construct their own sets instead of touching a global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedSet {
    entries: Vec<ReservedEntry>,
}

impl Default for ReservedSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl ReservedSet {
    /// `-h/--help`, `-v/--verbose`, `-q/--quiet`, `-V/--version`.
    pub fn standard() -> Self {
        Self::empty()
            .with('h', "help", Builtin::Help)
            .with('v', "verbose", Builtin::Verbose)
            .with('q', "quiet", Builtin::Quiet)
            .with('V', "version", Builtin::Version)
    }

    /// A set with nothing reserved.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds a reserved pair.
    pub fn with(mut self, shortcut: char, long: &str, builtin: Builtin) -> Self {
        self.entries.push(ReservedEntry {
            shortcut,
            long: long.to_string(),
            builtin,
        });
        self
    }

    /// The built-in bound to `-shortcut`, if any.
    pub fn by_shortcut(&self, shortcut: char) -> Option<Builtin> {
        self.entries
            .iter()
            .find(|e| e.shortcut == shortcut)
            .map(|e| e.builtin)
    }

    /// The built-in bound to `--long`, if any.
    pub fn by_long(&self, long: &str) -> Option<Builtin> {
        self.entries
            .iter()
            .find(|e| e.long == long)
            .map(|e| e.builtin)
    }

    /// Whether `-shortcut` is claimed.
    pub fn is_reserved_shortcut(&self, shortcut: char) -> bool {
        self.by_shortcut(shortcut).is_some()
    }

    /// Whether `--long` is claimed.
    pub fn is_reserved_long(&self, long: &str) -> bool {
        self.by_long(long).is_some()
    }

    /// Every reserved pair, in insertion order.
    pub fn entries(&self) -> &[ReservedEntry] {
        &self.entries
    }
}
