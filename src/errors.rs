//! Error classification: per-kind search query building and local hints.
//!
//! `classify` is pure: given a complete description of what went wrong it
//! decides, per error kind, whether the best help is a Stack Overflow
//! search, a hint we can synthesize ourselves, both, or neither. Absence is
//! an expected outcome here, never an `Err`.

use regex::Regex;

use crate::hints;
use crate::inspection::ErrorDescription;
use crate::python::{is_known_exception, quoted_words, remove_quoted_words, slugify};

pub const API_SEARCH_URL: &str = "https://api.stackexchange.com/2.2/search?site=stackoverflow";

/// The message CPython emits when it cannot say anything more precise.
/// Searching for it is useless, so this exact text routes to a local hint.
pub const GENERIC_SYNTAX_ERROR: &str = "SyntaxError: invalid syntax";

/// Exception kinds with dedicated handling. Anything else recognized as a
/// builtin exception lands in `Other` and gets the default treatment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Name,
    Key,
    Attribute,
    Index,
    ModuleNotFound,
    Type,
    ZeroDivision,
    Syntax,
    Tab,
    Indentation,
    Other(String),
}

impl ErrorKind {
    /// Map an exception name from a traceback to a kind. Names outside the
    /// builtin exception table are rejected: the line is not a real Python
    /// error message.
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "NameError" => Self::Name,
            "KeyError" => Self::Key,
            "AttributeError" => Self::Attribute,
            "IndexError" => Self::Index,
            "ModuleNotFoundError" => Self::ModuleNotFound,
            "TypeError" => Self::Type,
            "ZeroDivisionError" => Self::ZeroDivision,
            "SyntaxError" => Self::Syntax,
            "TabError" => Self::Tab,
            "IndentationError" => Self::Indentation,
            other if is_known_exception(other) => Self::Other(other.to_string()),
            _ => return None,
        };
        Some(kind)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Name => "NameError",
            Self::Key => "KeyError",
            Self::Attribute => "AttributeError",
            Self::Index => "IndexError",
            Self::ModuleNotFound => "ModuleNotFoundError",
            Self::Type => "TypeError",
            Self::ZeroDivision => "ZeroDivisionError",
            Self::Syntax => "SyntaxError",
            Self::Tab => "TabError",
            Self::Indentation => "IndentationError",
            Self::Other(name) => name,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What classification can offer for one error: a search query, a locally
/// synthesized hint, both, or neither. The query is the primary channel
/// when present; the hint is the fallback. Display policy is the caller's.
#[derive(Debug, Default, PartialEq)]
pub struct Remediation {
    pub query: Option<String>,
    pub hint: Option<String>,
}

pub fn classify(description: &ErrorDescription) -> Remediation {
    let message = description.message.as_str();
    let template = hints::template_for(&description.kind);

    match &description.kind {
        ErrorKind::Name => Remediation {
            query: Some(handle_name_error(message)),
            hint: template.and_then(|t| handle_name_error_locally(message, t)),
        },
        ErrorKind::Key => Remediation {
            query: Some(url_for_error(message)),
            hint: template
                .and_then(|t| handle_key_error_locally(message, &description.offending_line, t)),
        },
        ErrorKind::Attribute => Remediation {
            query: Some(url_for_error(message)),
            hint: None,
        },
        ErrorKind::Index => Remediation {
            query: Some(handle_index_error(message)),
            hint: template.and_then(|t| handle_index_error_locally(message, description.line, t)),
        },
        ErrorKind::ModuleNotFound => Remediation {
            query: Some(handle_module_error(message)),
            hint: template.and_then(|t| handle_module_error_locally(message, t)),
        },
        ErrorKind::Type => Remediation {
            query: Some(handle_type_error(message)),
            hint: None,
        },
        ErrorKind::ZeroDivision => Remediation {
            query: Some(handle_zero_division_error(message)),
            hint: template.map(|t| handle_zero_division_error_locally(description.line, t)),
        },
        ErrorKind::Syntax => Remediation {
            query: handle_syntax_error(message),
            hint: template.and_then(|t| handle_syntax_error_locally(message, description.line, t)),
        },
        ErrorKind::Tab | ErrorKind::Indentation => Remediation {
            query: Some(url_for_error(remove_exception_prefix(message))),
            hint: None,
        },
        ErrorKind::Other(_) => Remediation {
            query: Some(url_for_error(message)),
            hint: None,
        },
    }
}

/// Build a full search URL: fixed filters plus the slugged phrase as the
/// title filter.
pub fn url_for_error(message: &str) -> String {
    format!(
        "{API_SEARCH_URL}&order=desc&sort=relevance&tagged=python&intitle={}",
        slugify(message)
    )
}

/// Append the page-size parameter. Applied by whoever fetches, never by a
/// handler, so handlers stay comparable in tests.
pub fn set_limit(query: &str, limit: usize) -> String {
    format!("{query}&pagesize={limit}")
}

/// `"KeyError: 'foo'"` -> `"'foo'"`: everything after the first space.
fn remove_exception_prefix(message: &str) -> &str {
    message.split_once(' ').map_or(message, |(_, rest)| rest)
}

pub fn handle_name_error(message: &str) -> String {
    // The quoted name is the user's own; it only pollutes the search.
    url_for_error(&remove_quoted_words(message))
}

pub fn handle_index_error(message: &str) -> String {
    let message = message.replace(" cannot be ", "");
    let message = message.replace("IndexError:", "index error");
    url_for_error(&message)
}

pub fn handle_module_error(message: &str) -> String {
    url_for_error(&message.replace("ModuleNotFoundError", ""))
}

pub fn handle_type_error(message: &str) -> String {
    if message.contains("the first argument must be callable") {
        url_for_error("must have first callable argument")
    } else if message.contains("not all arguments converted during string formatting") {
        url_for_error(remove_exception_prefix(message))
    } else {
        url_for_error(message)
    }
}

pub fn handle_zero_division_error(message: &str) -> String {
    url_for_error(remove_exception_prefix(message))
}

/// No query for the generic message; its slug matches half of Stack
/// Overflow. Anything more specific searches well.
pub fn handle_syntax_error(message: &str) -> Option<String> {
    if message == GENERIC_SYNTAX_ERROR {
        return None;
    }
    Some(url_for_error(message))
}

/// Name the dictionary whose key lookup failed, when the offending line
/// makes that unambiguous. Returns None when the line shows no
/// dictionary-style access at all (the lookup happened somewhere else).
pub fn handle_key_error_locally(
    message: &str,
    offending_line: &str,
    template: &str,
) -> Option<String> {
    let missing_key = remove_exception_prefix(message);

    // Matches the identifier of a subscript access: `a_dict[`.
    let access = Regex::new(r"[A-Za-z_]\w*\[").unwrap();
    let mut identifiers: Vec<&str> = Vec::new();
    for access_match in access.find_iter(offending_line) {
        let identifier = access_match.as_str().trim_end_matches('[');
        if !identifiers.contains(&identifier) {
            identifiers.push(identifier);
        }
    }
    let first = *identifiers.first()?;

    let initial_error = if identifiers.len() == 1 {
        format!("Dictionary '{first}' does not have a key with value {missing_key}.")
    } else {
        // Several distinct dictionaries share the missing key; we cannot
        // tell which one raised.
        format!(
            "One of dictionaries {} does not have a key with value {missing_key}.",
            identifiers.join(", ")
        )
    };

    Some(
        template
            .replace("<initial_error>", &initial_error)
            .replace("<key>", missing_key),
    )
}

pub fn handle_name_error_locally(message: &str, template: &str) -> Option<String> {
    let missing_name = *quoted_words(message).first()?;
    Some(template.replace("<missing_name>", missing_name))
}

pub fn handle_module_error_locally(message: &str, template: &str) -> Option<String> {
    let missing_module = *quoted_words(message).first()?;
    Some(template.replace("<missing_module>", missing_module))
}

pub fn handle_index_error_locally(
    message: &str,
    error_line: usize,
    template: &str,
) -> Option<String> {
    let sequence = ["list", "tuple", "range object"]
        .into_iter()
        .find(|kind| message.contains(kind))?;
    Some(
        template
            .replace("<sequence>", sequence)
            .replace("<line>", &error_line.to_string()),
    )
}

pub fn handle_syntax_error_locally(
    message: &str,
    error_line: usize,
    template: &str,
) -> Option<String> {
    if message != GENERIC_SYNTAX_ERROR {
        return None;
    }
    Some(template.replace("<line>", &error_line.to_string()))
}

pub fn handle_zero_division_error_locally(error_line: usize, template: &str) -> String {
    template.replace("<line>", &error_line.to_string())
}
