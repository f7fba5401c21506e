//! Actions applied to collected items.
//!
//! Config files spell actions as strings (`save`, `label:reading`). They are
//! parsed exactly once, at config load, into tagged variants; everything past
//! the config boundary works with [`Action`] values. The canonical string
//! form is also the wire form used in state files, so parse/format must stay
//! inverse to each other.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A discrete effectful operation applied to an item.
///
/// `Save` is universal (persist markdown locally); the rest are executed by
/// the source adapter, which declares the kinds it supports.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Action {
    Save,
    Archive,
    MarkRead,
    Delete,
    Label(String),
    Forward(String),
}

/// Unit discriminant of [`Action`], used for adapter capability sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionKind {
    Save,
    Archive,
    MarkRead,
    Delete,
    Label,
    Forward,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionParseError {
    #[error("unknown action '{0}'")]
    Unknown(String),
    #[error("action '{0}' requires an argument, e.g. '{0}:value'")]
    MissingArgument(&'static str),
}

impl Action {
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Save => ActionKind::Save,
            Self::Archive => ActionKind::Archive,
            Self::MarkRead => ActionKind::MarkRead,
            Self::Delete => ActionKind::Delete,
            Self::Label(_) => ActionKind::Label,
            Self::Forward(_) => ActionKind::Forward,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Save => f.write_str("save"),
            Self::Archive => f.write_str("archive"),
            Self::MarkRead => f.write_str("mark-read"),
            Self::Delete => f.write_str("delete"),
            Self::Label(name) => write!(f, "label:{name}"),
            Self::Forward(address) => write!(f, "forward:{address}"),
        }
    }
}

impl FromStr for Action {
    type Err = ActionParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        match raw {
            "save" => return Ok(Self::Save),
            "archive" => return Ok(Self::Archive),
            "mark-read" => return Ok(Self::MarkRead),
            "delete" => return Ok(Self::Delete),
            "label" => return Err(ActionParseError::MissingArgument("label")),
            "forward" => return Err(ActionParseError::MissingArgument("forward")),
            _ => {}
        }

        if let Some((verb, arg)) = raw.split_once(':') {
            let arg = arg.trim();
            match verb.trim() {
                "label" if !arg.is_empty() => return Ok(Self::Label(arg.to_string())),
                "label" => return Err(ActionParseError::MissingArgument("label")),
                "forward" if !arg.is_empty() => return Ok(Self::Forward(arg.to_string())),
                "forward" => return Err(ActionParseError::MissingArgument("forward")),
                _ => {}
            }
        }

        Err(ActionParseError::Unknown(raw.to_string()))
    }
}

impl TryFrom<String> for Action {
    type Error = ActionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.to_string()
    }
}
