//! Answer retrieval and adaptation.
//!
//! Fetches candidate answers for a query, locates the code regions inside
//! each HTML body, and rewrites the fragment that matches the user's error
//! so it talks about the user's own identifiers instead of the answerer's.

use anyhow::Result;
use regex::Regex;

use crate::errors::set_limit;
use crate::inspection::ErrorDescription;
use crate::python::{closest_line, user_identifier_spans, user_identifiers};
use crate::stackoverflow::{Answer, StackClient};

const CODE_OPEN: &str = "<code>";
const CODE_CLOSE: &str = "</code>";
const PRE_OPEN: &str = "<pre>";
const PRE_CLOSE: &str = "</pre>";

/// Marker left where a `<pre>` boundary used to be, so block edges stay
/// visible in de-tagged text.
const PRE_MARKER: &str = "*pre*";

/// Minimum similarity for a de-tagged answer line to count as a match for
/// the user's offending line.
const SIMILARITY_CUTOFF: f64 = 0.4;

/// A half-open byte span of answer text sitting between a `<code>` and the
/// `</code>` that closes it. `is_block` marks regions whose opening tag is
/// glued to a `<pre>` wrapper: multi-line snippets rather than inline
/// mentions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeRegion {
    pub start: usize,
    pub end: usize,
    pub is_block: bool,
}

/// One answer after adaptation, ready to display.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub text: String,
    pub author: String,
    pub score: i64,
    pub accepted: bool,
}

/// Scan an answer body for `<code>` regions, in source order.
///
/// The markup comes from the Stack Exchange renderer and is well formed in
/// practice; a close tag with no matching open tag is ignored rather than
/// treated as an error.
pub fn locate_code_regions(body: &str) -> Vec<CodeRegion> {
    let mut regions = Vec::new();
    let mut open: Option<(usize, bool)> = None;

    for (i, c) in body.char_indices() {
        if c != '<' {
            continue;
        }
        if body[i..].starts_with(CODE_OPEN) {
            let is_block = body[..i].ends_with(PRE_OPEN);
            open = Some((i + CODE_OPEN.len(), is_block));
        } else if body[i..].starts_with(CODE_CLOSE) {
            if let Some((start, is_block)) = open.take() {
                regions.push(CodeRegion {
                    start,
                    end: i,
                    is_block,
                });
            }
        }
    }
    regions
}

/// Swap `<pre>` boundaries for markers and delete every other tag.
pub fn remove_tags(text: &str) -> String {
    let marked = text.replace(PRE_OPEN, PRE_MARKER).replace(PRE_CLOSE, PRE_MARKER);
    let tag = Regex::new("<.*?>").unwrap();
    tag.replace_all(&marked, "").into_owned()
}

/// Final cleanup before printing: strip leftover tags, drop the block
/// markers, and decode the angle-bracket entities the renderer escapes.
pub fn to_display_text(text: &str) -> String {
    remove_tags(text)
        .replace(PRE_MARKER, "")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
}

/// Matches a quoted traceback fragment inside de-tagged answer text: a
/// `File`/`Traceback` header, the source line under it, an optional caret
/// line, and a recognized exception line. Capture 1 is the source line.
fn traceback_fragment_regex() -> Regex {
    Regex::new(
        r"(?:File|Traceback)[^\n]*\n([^\n]+)\n(?:[ \t]+\^[ \t]*\n)?(?:Arithmetic|FloatingPoint|Overflow|ZeroDivision|Assertion|Attribute|Buffer|EOF|Import|ModuleNotFound|Lookup|Index|Key|Memory|Name|UnboundLocal|OS|BlockingIO|ChildProcess|Connection|BrokenPipe|ConnectionAborted|ConnectionRefused|ConnectionReset|FileExists|FileNotFound|Interrupted|IsADirectory|NotADirectory|Permission|ProcessLookup|Timeout|Reference|Runtime|NotImplemented|Recursion|Syntax|Indentation|Tab|System|Type|Value|Unicode|UnicodeDecode|UnicodeEncode|UnicodeTranslate)Error:[^\n]+",
    )
    .unwrap()
}

/// Adapt one answer body to the user's error.
///
/// Syntax errors get structural replacement: whole code regions that quote
/// the answerer's offending or erroring line are swapped for the user's
/// lines. Everything else gets identifier substitution on the single most
/// similar line. Both paths degrade to returning the text unchanged; this
/// never fails.
pub fn replace_code(
    text: &str,
    regions: &[CodeRegion],
    traceback: &str,
    offending_line: &str,
) -> String {
    let no_tags = remove_tags(text);

    // Chained tracebacks end with the exception that actually surfaced, so
    // the last "Error: " line decides the type.
    let error_type = traceback
        .lines()
        .filter(|line| line.contains("Error: "))
        .last()
        .and_then(|line| line.split(' ').next());

    let Some(error_header) = traceback.lines().nth(1) else {
        return text.to_string();
    };

    let fragment: Option<(&str, &str)> = traceback_fragment_regex()
        .captures(&no_tags)
        .map(|caps| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            let source = caps.get(1).map_or("", |m| m.as_str());
            (whole, source)
        });

    if error_type == Some("SyntaxError:") {
        if let Some((whole, source)) = fragment {
            // When the traceback's quoted line equals the offending line the
            // interpreter pointed at the line itself, not the one above it,
            // and positional substitution below handles it better.
            if error_header != offending_line {
                return replace_syntax_regions(
                    text,
                    regions,
                    whole,
                    source,
                    error_header,
                    offending_line,
                );
            }
        }
    }

    let matched = match fragment {
        Some((_, source)) => Some(source),
        None => closest_line(offending_line, no_tags.split('\n'), SIMILARITY_CUTOFF),
    };
    let Some(matched) = matched else {
        return text.to_string();
    };
    if matched.is_empty() {
        return text.to_string();
    }

    // Collapse spaced commas so an argument list tokenizes as one unit on
    // both sides of the substitution.
    let mut qa_line = matched.to_string();
    while qa_line.contains(", ") || qa_line.contains(" ,") {
        qa_line = qa_line.replace(", ", ",").replace(" ,", ",");
    }

    let user_variables = user_identifiers(error_header);
    let qa_spans = user_identifier_spans(&qa_line);
    if user_variables.len() != qa_spans.len() || qa_spans.is_empty() {
        return text.to_string();
    }

    // Positional substitution, back to front so earlier spans stay valid.
    let mut adapted = qa_line.clone();
    for (&(start, end), replacement) in qa_spans.iter().rev().zip(user_variables.iter().rev()) {
        adapted.replace_range(start..end, replacement);
    }
    if adapted == qa_line {
        return text.to_string();
    }

    let mut new_text = text.to_string();
    if let Some(at) = new_text.find(matched) {
        new_text.replace_range(at..at + matched.len(), &adapted);
    }
    new_text
}

/// The syntax-error path of [`replace_code`]: find which line played the
/// role of the user's offending line in the answer, then swap whole code
/// regions for the user's lines.
fn replace_syntax_regions(
    text: &str,
    regions: &[CodeRegion],
    fragment: &str,
    qa_error_line: &str,
    error_header: &str,
    offending_line: &str,
) -> String {
    // Syntax errors usually blame the line after the real mistake. Block
    // regions that do not quote the traceback show the answerer's fix, and
    // the line right above their error line is their offending line.
    let mut qa_offending_line: Option<&str> = None;
    for region in regions {
        if !region.is_block {
            continue;
        }
        let region_text = &text[region.start..region.end];
        if region_text.contains(fragment) {
            continue;
        }
        let mut previous = None;
        for line in region_text.split('\n') {
            if line == qa_error_line {
                qa_offending_line = previous;
            }
            previous = Some(line);
        }
    }

    let qa_offending_line = qa_offending_line.map(str::trim);
    let error_header = error_header.trim();
    let qa_error_line = qa_error_line.trim();

    // Replace back to front so earlier region offsets stay valid while
    // later ones shrink or grow.
    let mut new_text = text.to_string();
    for region in regions.iter().rev() {
        let region_text = &text[region.start..region.end];
        if qa_offending_line.is_some_and(|line| region_text.contains(line)) {
            new_text.replace_range(region.start..region.end, error_header);
        } else if region_text.contains(qa_error_line) {
            new_text.replace_range(region.start..region.end, offending_line);
        }
    }
    new_text
}

fn adapt_answer(answer: &Answer, traceback: &str, offending_line: &str) -> Solution {
    let regions = locate_code_regions(&answer.body);
    let replaced = replace_code(&answer.body, &regions, traceback, offending_line);
    Solution {
        text: to_display_text(&replaced),
        author: answer.author.clone(),
        score: answer.score,
        accepted: answer.accepted,
    }
}

/// Run a query and adapt every retrieved answer to the user's error.
///
/// A failed answer fetch for one question drops that question with a
/// warning instead of aborting the rest.
pub async fn get_answers(
    client: &StackClient,
    query: &str,
    description: &ErrorDescription,
    limit: usize,
) -> Result<Vec<Solution>> {
    let query = set_limit(query, limit);
    let questions = client.search_questions(&query).await?;

    let mut solutions = Vec::new();
    for question in &questions {
        match client.fetch_answers(question).await {
            Ok(answers) => {
                for answer in answers {
                    solutions.push(adapt_answer(
                        &answer,
                        &description.traceback,
                        &description.offending_line,
                    ));
                }
            }
            Err(err) => {
                eprintln!(
                    "Warning: failed to fetch answers for question {}: {}",
                    question.id, err
                );
            }
        }
    }
    Ok(solutions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region_text<'a>(body: &'a str, region: &CodeRegion) -> &'a str {
        &body[region.start..region.end]
    }

    #[test]
    fn locate_code_regions_distinguishes_blocks_from_inline() {
        let body = "<p>Use <code>len()</code> here:</p><pre><code>n = len(xs)\n</code></pre>";
        let regions = locate_code_regions(body);

        assert_eq!(regions.len(), 2);
        assert_eq!(region_text(body, &regions[0]), "len()");
        assert!(!regions[0].is_block);
        assert_eq!(region_text(body, &regions[1]), "n = len(xs)\n");
        assert!(regions[1].is_block);
    }

    #[test]
    fn locate_code_regions_ignores_unmatched_close() {
        assert!(locate_code_regions("</code> stray").is_empty());
        assert!(locate_code_regions("no markup at all").is_empty());
    }

    #[test]
    fn remove_tags_keeps_block_markers() {
        let body = "<p>hi <a href=\"x\">there</a></p><pre><code>x = 1</code></pre>";
        assert_eq!(remove_tags(body), "hi there*pre*x = 1*pre*");
    }

    #[test]
    fn to_display_text_drops_markup_and_decodes_entities() {
        let body = "<pre><code>if x &lt; 3 and y &gt; 1:\n    pass\n</code></pre>";
        assert_eq!(to_display_text(body), "if x < 3 and y > 1:\n    pass\n");
    }

    #[test]
    fn replace_code_substitutes_user_identifiers_into_closest_line() {
        let traceback =
            "  File \"calc.py\", line 3\n    print(add(num_one))\nSyntaxError: invalid syntax";
        let body = "<p>Do it like this:</p>\n\n<pre><code>total = 1\nprint(add(x))\n</code></pre>\n";
        let regions = locate_code_regions(body);

        let result = replace_code(body, &regions, traceback, "print(add(num_one))");

        assert!(result.contains("print(add(num_one))"));
        assert!(!result.contains("print(add(x))"));
        // Everything around the matched line is untouched.
        assert!(result.contains("total = 1"));
        assert!(result.starts_with("<p>Do it like this:</p>"));
    }

    #[test]
    fn replace_code_leaves_text_alone_when_identifier_counts_differ() {
        let traceback = "  File \"calc.py\", line 3\n    print(add(num_one, num_two))\nSyntaxError: invalid syntax";
        let body = "<p>Do it like this:</p>\n\n<pre><code>total = 1\nprint(add(x))\n</code></pre>\n";
        let regions = locate_code_regions(body);

        let result = replace_code(body, &regions, traceback, "print(add(num_one, num_two))");

        assert_eq!(result, body);
    }

    #[test]
    fn replace_code_swaps_syntax_error_regions_for_user_lines() {
        let traceback =
            "  File \"ex.py\", line 2\n    if b == 5\n             ^\nSyntaxError: invalid syntax";
        let body = concat!(
            "<p>Happens when the previous line is broken:</p>\n\n",
            "<pre><code>  File \"test.py\", line 1\n",
            "    if a == 10\n",
            "             ^\n",
            "SyntaxError: invalid syntax\n</code></pre>\n\n",
            "<p>Check the line above:</p>\n\n",
            "<pre><code>print(start)\n    if a == 10\n</code></pre>\n",
        );
        let regions = locate_code_regions(body);

        let result = replace_code(body, &regions, traceback, "if b == 5");

        // The traceback quote became the user's error line and the fix block
        // became the user's offending line.
        assert_eq!(result.matches("<pre><code>if b == 5</code></pre>").count(), 2);
        assert!(!result.contains("if a == 10"));
        assert!(!result.contains("print(start)"));
    }

    #[test]
    fn replace_code_finds_quoted_tracebacks_without_caret_lines() {
        let traceback = concat!(
            "Traceback (most recent call last):\n",
            "  File \"app.py\", line 4, in <module>\n",
            "    print(counter)\n",
            "NameError: name 'counter' is not defined",
        );
        let body = concat!(
            "<p>That name does not exist:</p>\n\n",
            "<pre><code>Traceback (most recent call last):\n",
            "  File \"test.py\", line 1, in &lt;module&gt;\n",
            "    print(x)\nNameError: name 'x' is not defined\n</code></pre>\n",
        );
        let regions = locate_code_regions(body);

        // The quoted fragment is recognized, but the header and answer lines
        // carry different identifier counts, so nothing is rewritten.
        let result = replace_code(body, &regions, traceback, "print(counter)");

        assert_eq!(result, body);
    }

    #[test]
    fn replace_code_without_similar_line_returns_text_unchanged() {
        let traceback =
            "  File \"calc.py\", line 3\n    frobnicate(alpha)\nSyntaxError: invalid syntax";
        let body = "<p>See the documentation.</p>";
        let regions = locate_code_regions(body);

        assert_eq!(
            replace_code(body, &regions, traceback, "frobnicate(alpha)"),
            body
        );
    }

    #[test]
    fn replace_code_needs_a_traceback_header_line() {
        let body = "<pre><code>x = 1\n</code></pre>";
        let regions = locate_code_regions(body);

        assert_eq!(replace_code(body, &regions, "NameError: x", "x = 1"), body);
    }
}
