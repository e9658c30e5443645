//! Top-level SQL statement splitting.
//!
//! The differ emits a script, the applier and the seed runner need the
//! individual statements back (for per-statement error reporting and DROP
//! detection). Splitting respects single-quoted strings with `''` escapes,
//! double-quoted identifiers, line comments, nested block comments, and
//! dollar-quoted blocks, so a `;` inside any of those never splits.

/// Split a SQL script into top-level statements.
///
/// Statement text is kept verbatim (comments included) minus the trailing
/// semicolon; segments that contain only whitespace and comments are not
/// emitted.
pub fn split_sql(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut has_code = false;

    let mut chars = script.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            ';' => {
                if has_code {
                    statements.push(current.trim().to_string());
                }
                current.clear();
                has_code = false;
            }
            '-' if matches!(chars.peek(), Some((_, '-'))) => {
                let end = line_comment_end(script, i);
                current.push_str(&script[i..end]);
                skip_to(&mut chars, end);
            }
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                let end = block_comment_end(script, i);
                current.push_str(&script[i..end]);
                skip_to(&mut chars, end);
            }
            '\'' => {
                let end = single_quote_end(script, i);
                current.push_str(&script[i..end]);
                has_code = true;
                skip_to(&mut chars, end);
            }
            '"' => {
                let end = double_quote_end(script, i);
                current.push_str(&script[i..end]);
                has_code = true;
                skip_to(&mut chars, end);
            }
            '$' => {
                if let Some(tag_end) = dollar_tag_end(script, i) {
                    let end = dollar_quote_end(script, i, tag_end);
                    current.push_str(&script[i..end]);
                    has_code = true;
                    skip_to(&mut chars, end);
                } else {
                    current.push(c);
                    has_code = true;
                }
            }
            _ => {
                current.push(c);
                if !c.is_whitespace() {
                    has_code = true;
                }
            }
        }
    }

    if has_code {
        statements.push(current.trim().to_string());
    }
    statements
}

/// First keyword of a statement, uppercased, skipping leading comments and
/// whitespace. `None` when nothing but comments remain.
pub fn leading_keyword(stmt: &str) -> Option<String> {
    let mut rest = stmt;
    loop {
        rest = rest.trim_start();
        if let Some(stripped) = rest.strip_prefix("--") {
            rest = stripped.split_once('\n').map_or("", |(_, tail)| tail);
        } else if rest.starts_with("/*") {
            let end = block_comment_end(rest, 0);
            rest = &rest[end..];
        } else {
            break;
        }
    }

    let word: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if word.is_empty() {
        None
    } else {
        Some(word.to_ascii_uppercase())
    }
}

fn skip_to(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>, end: usize) {
    while let Some((i, _)) = chars.peek() {
        if *i < end {
            chars.next();
        } else {
            break;
        }
    }
}

fn line_comment_end(s: &str, start: usize) -> usize {
    s[start..]
        .find('\n')
        .map_or(s.len(), |off| start + off + 1)
}

/// Postgres block comments nest.
fn block_comment_end(s: &str, start: usize) -> usize {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut i = start;
    while i + 1 < bytes.len() {
        if bytes[i] == b'/' && bytes[i + 1] == b'*' {
            depth += 1;
            i += 2;
        } else if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            depth -= 1;
            i += 2;
            if depth == 0 {
                return i;
            }
        } else {
            i += 1;
        }
    }
    s.len()
}

fn single_quote_end(s: &str, start: usize) -> usize {
    let bytes = s.as_bytes();
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            // '' escapes a quote inside the literal
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
            } else {
                return i + 1;
            }
        } else {
            i += 1;
        }
    }
    s.len()
}

fn double_quote_end(s: &str, start: usize) -> usize {
    let bytes = s.as_bytes();
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == b'"' {
            if bytes.get(i + 1) == Some(&b'"') {
                i += 2;
            } else {
                return i + 1;
            }
        } else {
            i += 1;
        }
    }
    s.len()
}

/// If `start` opens a dollar-quote tag (`$$` or `$tag$`), return the byte
/// offset just past the opening tag.
fn dollar_tag_end(s: &str, start: usize) -> Option<usize> {
    let rest = &s[start + 1..];
    let mut len = 0;
    for c in rest.chars() {
        if c == '$' {
            return Some(start + 1 + len + 1);
        }
        if !(c.is_alphanumeric() || c == '_') {
            return None;
        }
        len += c.len_utf8();
    }
    None
}

fn dollar_quote_end(s: &str, start: usize, tag_end: usize) -> usize {
    let tag = &s[start..tag_end];
    s[tag_end..]
        .find(tag)
        .map_or(s.len(), |off| tag_end + off + tag.len())
}
