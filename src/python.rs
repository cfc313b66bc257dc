//! Python language tables and the lexical helpers built on them.
//!
//! Everything here is a pure function over static data: no parser, just the
//! keyword/builtin partition, quoted-token extraction, query slugs, and the
//! approximate line matching the answer adapter relies on.

use regex::Regex;

/// Python reserved words (`keyword.kwlist`).
pub const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise",
    "return", "try", "while", "with", "yield",
];

/// Builtin functions, types and constants visible without an import.
pub const PYTHON_BUILTINS: &[&str] = &[
    "abs", "all", "any", "ascii", "bin", "bool", "breakpoint", "bytearray", "bytes",
    "callable", "chr", "classmethod", "compile", "complex", "copyright", "credits",
    "delattr", "dict", "dir", "divmod", "enumerate", "eval", "exec", "exit", "filter",
    "float", "format", "frozenset", "getattr", "globals", "hasattr", "hash", "help",
    "hex", "id", "input", "int", "isinstance", "issubclass", "iter", "len", "license",
    "list", "locals", "map", "max", "memoryview", "min", "next", "object", "oct", "open",
    "ord", "pow", "print", "property", "quit", "range", "repr", "reversed", "round",
    "set", "setattr", "slice", "sorted", "staticmethod", "str", "sum", "super", "tuple",
    "type", "vars", "zip", "Ellipsis", "NotImplemented",
];

/// Builtin exception and warning names, used to validate the type parsed out
/// of a traceback and to spot traceback fragments quoted inside answers.
pub const PYTHON_EXCEPTIONS: &[&str] = &[
    "ArithmeticError", "AssertionError", "AttributeError", "BaseException",
    "BlockingIOError", "BrokenPipeError", "BufferError", "BytesWarning",
    "ChildProcessError", "ConnectionAbortedError", "ConnectionError",
    "ConnectionRefusedError", "ConnectionResetError", "DeprecationWarning", "EOFError",
    "EnvironmentError", "Exception", "FileExistsError", "FileNotFoundError",
    "FloatingPointError", "FutureWarning", "GeneratorExit", "IOError", "ImportError",
    "ImportWarning", "IndentationError", "IndexError", "InterruptedError",
    "IsADirectoryError", "KeyError", "KeyboardInterrupt", "LookupError", "MemoryError",
    "ModuleNotFoundError", "NameError", "NotADirectoryError", "NotImplementedError",
    "OSError", "OverflowError", "PendingDeprecationWarning", "PermissionError",
    "ProcessLookupError", "RecursionError", "ReferenceError", "ResourceWarning",
    "RuntimeError", "RuntimeWarning", "StopAsyncIteration", "StopIteration",
    "SyntaxError", "SyntaxWarning", "SystemError", "SystemExit", "TabError",
    "TimeoutError", "TypeError", "UnboundLocalError", "UnicodeDecodeError",
    "UnicodeEncodeError", "UnicodeError", "UnicodeTranslateError", "UnicodeWarning",
    "UserWarning", "ValueError", "Warning", "ZeroDivisionError",
];

pub fn is_keyword(token: &str) -> bool {
    PYTHON_KEYWORDS.contains(&token)
}

/// True for anything importable from `builtins`, exceptions included.
pub fn is_builtin(token: &str) -> bool {
    PYTHON_BUILTINS.contains(&token) || PYTHON_EXCEPTIONS.contains(&token)
}

pub fn is_known_exception(name: &str) -> bool {
    PYTHON_EXCEPTIONS.contains(&name)
}

/// Lowercase a phrase and collapse every non-alphanumeric run into a single
/// `+`, the form the Stack Exchange `intitle` filter expects.
///
/// `"TypeError: unsupported operand type(s)"` becomes
/// `"typeerror+unsupported+operand+type+s"`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut gap = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if gap && !slug.is_empty() {
                slug.push('+');
            }
            gap = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            gap = true;
        }
    }
    slug
}

/// Substrings between single quotes: `"name 'a' is not defined"` -> `["a"]`.
pub fn quoted_words(text: &str) -> Vec<&str> {
    text.split('\'').skip(1).step_by(2).collect()
}

/// Drop single-quoted tokens (and the space after each) from a message, so
/// a user-specific name does not pollute a search query:
/// `"NameError: name 'a' is not defined"` -> `"NameError: name is not defined"`.
pub fn remove_quoted_words(text: &str) -> String {
    let quoted = Regex::new(r"'.*?'\s").unwrap();
    quoted.replace_all(text, "").into_owned()
}

/// Characters that end an identifier-like token. Note the absences: commas
/// are handled separately by the adapter (argument lists collapse into one
/// token), quotes stay attached to string literals, and underscores are
/// identifier characters.
const TOKEN_DELIMITERS: &[char] = &[
    '!', '@', '#', '$', '%', '^', '&', '*', '-', '+', '=', '(', ')', '[', ']', '{', '}',
    '\\', '|', '~', '`', '/', '?', '.', '<', '>', ':', ';', ' ',
];

pub fn is_token_delimiter(c: char) -> bool {
    TOKEN_DELIMITERS.contains(&c)
}

/// Byte spans of the non-empty tokens in a line, in order.
pub fn token_spans(line: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in line.char_indices() {
        if is_token_delimiter(c) {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, line.len()));
    }
    spans
}

/// Spans of the tokens that are neither keywords nor builtins: the parts of
/// a line the user chose, which adaptation is allowed to rewrite.
pub fn user_identifier_spans(line: &str) -> Vec<(usize, usize)> {
    token_spans(line)
        .into_iter()
        .filter(|&(start, end)| {
            let token = &line[start..end];
            !is_keyword(token) && !is_builtin(token)
        })
        .collect()
}

pub fn user_identifiers(line: &str) -> Vec<&str> {
    user_identifier_spans(line)
        .into_iter()
        .map(|(start, end)| &line[start..end])
        .collect()
}

/// Plain Levenshtein distance over characters.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut matrix = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=b.len() {
        matrix[0][j] = j;
    }

    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            matrix[i][j] = (matrix[i - 1][j] + 1)
                .min(matrix[i][j - 1] + 1)
                .min(matrix[i - 1][j - 1] + cost);
        }
    }
    matrix[a.len()][b.len()]
}

/// Normalized similarity in `[0, 1]`: 1.0 for identical strings, 0.0 when
/// every character differs.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// The line most similar to `target`, if any line scores at least `cutoff`.
/// Ties keep the earliest line.
pub fn closest_line<'a, I>(target: &str, lines: I, cutoff: f64) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&str, f64)> = None;
    for line in lines {
        let ratio = similarity_ratio(target, line);
        if ratio >= cutoff && best.map_or(true, |(_, top)| ratio > top) {
            best = Some((line, ratio));
        }
    }
    best.map(|(line, _)| line)
}
