//! Hint templates, one per error kind that can be explained locally.
//!
//! Templates are plain strings with named placeholders (`<line>`, `<key>`,
//! `<missing_name>`, `<missing_module>`, `<sequence>`, `<initial_error>`)
//! filled by literal substitution in the per-kind handlers. Handlers take
//! the template text as a parameter, so swapping or extending this table
//! never touches dispatch logic.

use crate::errors::ErrorKind;

pub const NAME_ERROR_HINT: &str = "\
The name '<missing_name>' was used before anything was assigned to it.
Check for typos, and make sure '<missing_name>' is defined (or imported)
somewhere above the failing line.";

pub const KEY_ERROR_HINT: &str = "\
<initial_error>

A KeyError is raised when a key is looked up in a dictionary that does not
contain it. You may want to set a value for <key> before this access, or use
the .get() method, which returns a default instead of raising when the key
is missing:

    value = your_dict.get('missing_key', 'a default')";

pub const INDEX_ERROR_HINT: &str = "\
You tried to read a position of a <sequence> that does not exist, at line
<line>. Valid indexes run from 0 to len(sequence) - 1 (negative indexes
count from the end), so check the bounds before subscripting.";

pub const MODULE_NOT_FOUND_HINT: &str = "\
No module named '<missing_module>' could be imported. If it is a third
party package, install it first, for example:

    pip install <missing_module>

Also check the spelling, and that the interpreter running this script is
the one you installed the package into.";

pub const SYNTAX_ERROR_HINT: &str = "\
There is a syntax error at line <line>, and the interpreter could not be
more specific about it. Usual suspects: a missing colon at the end of a
def/for/if line, or an unclosed bracket or quote on line <line> or the
line just above it.";

pub const ZERO_DIVISION_HINT: &str = "\
The expression at line <line> divides by zero, which Python cannot
represent. Guard the division (if divisor != 0:) or catch the
ZeroDivisionError where a zero divisor is a legitimate input.";

/// Template lookup for the kinds that have one.
pub fn template_for(kind: &ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::Name => Some(NAME_ERROR_HINT),
        ErrorKind::Key => Some(KEY_ERROR_HINT),
        ErrorKind::Index => Some(INDEX_ERROR_HINT),
        ErrorKind::ModuleNotFound => Some(MODULE_NOT_FOUND_HINT),
        ErrorKind::Syntax => Some(SYNTAX_ERROR_HINT),
        ErrorKind::ZeroDivision => Some(ZERO_DIVISION_HINT),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_carry_their_placeholders() {
        assert!(NAME_ERROR_HINT.contains("<missing_name>"));
        assert!(KEY_ERROR_HINT.contains("<initial_error>"));
        assert!(KEY_ERROR_HINT.contains("<key>"));
        assert!(INDEX_ERROR_HINT.contains("<sequence>"));
        assert!(INDEX_ERROR_HINT.contains("<line>"));
        assert!(MODULE_NOT_FOUND_HINT.contains("<missing_module>"));
        assert!(SYNTAX_ERROR_HINT.contains("<line>"));
        assert!(ZERO_DIVISION_HINT.contains("<line>"));
    }

    #[test]
    fn kinds_without_local_explanations_have_no_template() {
        assert!(template_for(&ErrorKind::Attribute).is_none());
        assert!(template_for(&ErrorKind::Type).is_none());
        assert!(template_for(&ErrorKind::Other("ValueError".into())).is_none());
    }
}
