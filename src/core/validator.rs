//! # Schema Validator
//!
//! Runs once per parsed schema before it may enter the registry.
//!
//! - A required positional after an optional one is a hard error.
//! - Two declarations mapping to the same variable name are a hard error.
//! - A shortcut claimed by the tool (see [`ReservedSet`]) is dropped with a
//!   warning; the long form keeps working.
//! - A shortcut already used by an earlier option is dropped the same way.
//! - A long name claimed by the tool is renamed to `<name>-sh` with a warning.

use crate::core::reserved::ReservedSet;
use crate::models::CommandSchema;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// A schema that cannot be registered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaValidationError {
    /// A required positional follows an optional one.
    #[error(
        "required argument '{required}' is declared after optional argument '{optional}', which makes binding ambiguous"
    )]
    PositionalOrder { optional: String, required: String },
    /// Two declarations map to the same variable.
    #[error("'{second}' and '{first}' both bind the variable '{var}'")]
    DuplicateName {
        var: String,
        first: String,
        second: String,
    },
    /// Two options with the same long form.
    #[error("option '--{long}' is declared twice")]
    DuplicateLongName { long: String },
}

/// A non-fatal adjustment made while validating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaWarning {
    /// The shortcut was reserved and has been dropped.
    ReservedShortcut { option: String, shortcut: char },
    /// The shortcut was already taken and has been dropped.
    DuplicateShortcut {
        option: String,
        shortcut: char,
        owner: String,
    },
    /// The long name was reserved and the option was renamed.
    ReservedLongName { option: String, renamed: String },
}

impl fmt::Display for SchemaWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReservedShortcut { option, shortcut } => write!(
                f,
                "shortcut '-{}' of option '{}' is reserved, use --{} instead",
                shortcut, option, option
            ),
            Self::DuplicateShortcut {
                option,
                shortcut,
                owner,
            } => write!(
                f,
                "shortcut '-{}' of option '{}' is already used by '{}', use --{} instead",
                shortcut, option, owner, option
            ),
            Self::ReservedLongName { option, renamed } => write!(
                f,
                "option '--{}' collides with a built-in option, use --{} instead",
                option, renamed
            ),
        }
    }
}

/// A schema that passed validation, plus what had to be adjusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSchema {
    /// The adjusted schema.
    pub schema: CommandSchema,
    /// Adjustments made, in declaration order.
    pub warnings: Vec<SchemaWarning>,
}

/// Validates `schema` against the ordering and uniqueness rules.
pub fn validate(
    mut schema: CommandSchema,
    reserved: &ReservedSet,
) -> Result<ValidatedSchema, SchemaValidationError> {
    check_positional_order(&schema)?;
    check_unique_names(&schema)?;

    let mut warnings = Vec::new();
    let mut shortcut_owners: HashMap<char, String> = HashMap::new();

    for opt in &mut schema.options {
        if reserved.is_reserved_long(&opt.long) {
            let renamed = format!("{}-sh", opt.long);
            warnings.push(SchemaWarning::ReservedLongName {
                option: opt.name.clone(),
                renamed: renamed.clone(),
            });
            opt.long = renamed;
        }

        let Some(shortcut) = opt.shortcut else {
            continue;
        };
        if reserved.is_reserved_shortcut(shortcut) {
            warnings.push(SchemaWarning::ReservedShortcut {
                option: opt.long.clone(),
                shortcut,
            });
            opt.shortcut = None;
        } else if let Some(owner) = shortcut_owners.get(&shortcut) {
            warnings.push(SchemaWarning::DuplicateShortcut {
                option: opt.long.clone(),
                shortcut,
                owner: owner.clone(),
            });
            opt.shortcut = None;
        } else {
            shortcut_owners.insert(shortcut, opt.long.clone());
        }
    }

    // Renaming may have produced a long form that another option already uses.
    let mut longs: HashMap<&str, ()> = HashMap::new();
    for opt in &schema.options {
        if longs.insert(opt.long.as_str(), ()).is_some() {
            return Err(SchemaValidationError::DuplicateLongName {
                long: opt.long.clone(),
            });
        }
    }

    for warning in &warnings {
        log::debug!("Schema '{}': {}", schema.name, warning);
    }

    Ok(ValidatedSchema { schema, warnings })
}

fn check_positional_order(schema: &CommandSchema) -> Result<(), SchemaValidationError> {
    let mut first_optional: Option<&str> = None;
    for arg in &schema.positionals {
        match (arg.required, first_optional) {
            (false, None) => first_optional = Some(&arg.name),
            (true, Some(optional)) => {
                return Err(SchemaValidationError::PositionalOrder {
                    optional: optional.to_string(),
                    required: arg.name.clone(),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_unique_names(schema: &CommandSchema) -> Result<(), SchemaValidationError> {
    let mut seen: HashMap<String, String> = HashMap::new();
    let declared = schema
        .positionals
        .iter()
        .map(|a| (a.var_name(), a.name.as_str()))
        .chain(schema.options.iter().map(|o| (o.var_name(), o.name.as_str())));

    for (var, name) in declared {
        if let Some(first) = seen.get(&var) {
            return Err(SchemaValidationError::DuplicateName {
                var,
                first: first.clone(),
                second: name.to_string(),
            });
        }
        seen.insert(var, name.to_string());
    }
    Ok(())
}

// MARK: --- UNIT TESTS ---
