//! Doc excerpts: the first comment block of a source file, or the leading text of anything else.

pub const DOC_EXCERPT_MAX_CHARS: usize = 240;
const MAX_SCAN_LINES: usize = 200;
const LEADING_TEXT_LINES: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct CommentSyntax {
    /// Longest prefixes first (`///` before `//`).
    pub line: &'static [&'static str],
    pub block: Option<(&'static str, &'static str)>,
    /// Python-style docstrings delimited by `"""` or `'''`.
    pub docstrings: bool,
}

impl CommentSyntax {
    pub const C_LIKE: CommentSyntax = CommentSyntax {
        line: &["//"],
        block: Some(("/*", "*/")),
        docstrings: false,
    };

    pub const RUST: CommentSyntax = CommentSyntax {
        line: &["//!", "///", "//"],
        block: Some(("/*", "*/")),
        docstrings: false,
    };

    pub const HASH: CommentSyntax = CommentSyntax {
        line: &["#"],
        block: None,
        docstrings: true,
    };

    pub fn line_prefix(&self, trimmed: &str) -> Option<&'static str> {
        self.line.iter().copied().find(|prefix| trimmed.starts_with(prefix))
    }

    pub fn is_comment_line(&self, line: &str) -> bool {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#!") {
            return false;
        }
        self.line_prefix(trimmed).is_some()
    }
}

/// First meaningful comment block within the first lines of the file.
pub fn comment_excerpt(text: &str, syntax: &CommentSyntax) -> String {
    let lines: Vec<&str> = text.lines().take(MAX_SCAN_LINES).collect();
    let mut i = 0;

    while i < lines.len() {
        let trimmed = lines[i].trim();
        if trimmed.is_empty() || trimmed.starts_with("#!") {
            i += 1;
            continue;
        }

        let mut collected: Vec<String> = Vec::new();

        if let Some((opening, close)) = block_delimiters(trimmed, syntax) {
            let rest = &trimmed[opening..];
            if let Some(end) = rest.find(close) {
                collected.push(rest[..end].to_string());
                i += 1;
            } else {
                collected.push(rest.to_string());
                i += 1;
                while i < lines.len() {
                    let line = lines[i].trim();
                    i += 1;
                    if let Some(end) = line.find(close) {
                        collected.push(line[..end].to_string());
                        break;
                    }
                    collected.push(line.to_string());
                }
            }
        } else if let Some(prefix) = syntax.line_prefix(trimmed) {
            collected.push(trimmed[prefix.len()..].to_string());
            i += 1;
            while i < lines.len() {
                let line = lines[i].trim();
                match syntax.line_prefix(line) {
                    Some(prefix) if !line.starts_with("#!") => {
                        collected.push(line[prefix.len()..].to_string());
                        i += 1;
                    }
                    _ => break,
                }
            }
        } else {
            i += 1;
            continue;
        }

        let excerpt = clean(collected.iter().map(|s| strip_block_decoration(s)));
        if !excerpt.is_empty() {
            return excerpt;
        }
    }

    String::new()
}

/// First few non-empty lines, for files without a known comment syntax.
pub fn leading_text(text: &str) -> String {
    let lines = text
        .lines()
        .map(|line| line.trim().trim_start_matches('#').trim())
        .filter(|line| !line.is_empty())
        .take(LEADING_TEXT_LINES);
    clean(lines)
}

/// Byte length of the opening delimiter (string prefix included) and the closing delimiter.
fn block_delimiters(trimmed: &str, syntax: &CommentSyntax) -> Option<(usize, &'static str)> {
    if let Some((open, close)) = syntax.block {
        if trimmed.starts_with(open) {
            return Some((open.len(), close));
        }
    }
    if syntax.docstrings {
        let unprefixed = trimmed.trim_start_matches(['r', 'R', 'u', 'U']);
        let prefix_len = trimmed.len() - unprefixed.len();
        for quote in ["\"\"\"", "'''"] {
            if unprefixed.starts_with(quote) {
                return Some((prefix_len + quote.len(), quote));
            }
        }
    }
    None
}

fn strip_block_decoration(line: &str) -> &str {
    let line = line.trim();
    let line = line.strip_prefix('*').unwrap_or(line);
    let line = line.trim_start_matches(['!', '/', '*']);
    let line = line.trim();
    if line.contains("-*-") || line.chars().all(|c| matches!(c, '=' | '-' | '*' | '#' | '~' | '_')) {
        ""
    } else {
        line
    }
}

fn clean<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let joined = parts
        .into_iter()
        .flat_map(|part| part.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ");
    truncate(&joined, DOC_EXCERPT_MAX_CHARS)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", text[..cut].trim_end()),
        None => text.to_string(),
    }
}
