//! Surface-level SQL scanning.
//!
//! Not a tokenizer: it only knows enough to skip string literals, quoted
//! identifiers, dollar-quoted bodies and comments, so that separators and
//! keywords are found where they actually delimit code.

/// Iterator over the code characters of a SQL text, with their byte offsets.
/// Literals, quoted identifiers, dollar-quoted bodies and comments are skipped.
pub struct CodeChars<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> CodeChars<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }
}

impl Iterator for CodeChars<'_> {
    type Item = (usize, char);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let rest = &self.src[self.pos..];
            let c = rest.chars().next()?;

            if rest.starts_with("--") {
                self.pos += rest.find('\n').map_or(rest.len(), |i| i + 1);
                continue;
            }
            if rest.starts_with("/*") {
                self.pos += block_comment_len(rest);
                continue;
            }
            match c {
                '\'' | '"' | '`' => {
                    self.pos += quoted_len(rest, c);
                    continue;
                }
                '$' if !self.src[..self.pos].ends_with(is_ident_char) => {
                    if let Some(len) = dollar_quoted_len(rest) {
                        self.pos += len;
                        continue;
                    }
                }
                _ => {}
            }

            let start = self.pos;
            self.pos += c.len_utf8();
            return Some((start, c));
        }
    }
}

pub fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn block_comment_len(rest: &str) -> usize {
    let mut depth = 0usize;
    let mut i = 0;
    let bytes = rest.as_bytes();
    while i < bytes.len() {
        if bytes[i..].starts_with(b"/*") {
            depth += 1;
            i += 2;
        } else if bytes[i..].starts_with(b"*/") {
            depth -= 1;
            i += 2;
            if depth == 0 {
                return i;
            }
        } else {
            i += 1;
        }
    }
    rest.len()
}

/// Length of a quoted run starting at `rest[0] == quote`. A doubled quote
/// is an escaped quote. Unterminated runs extend to the end.
fn quoted_len(rest: &str, quote: char) -> usize {
    let mut chars = rest.char_indices().skip(1).peekable();
    while let Some((i, c)) = chars.next() {
        if c == quote {
            if chars.peek().is_some_and(|&(_, next)| next == quote) {
                chars.next();
                continue;
            }
            return i + c.len_utf8();
        }
    }
    rest.len()
}

/// Length of a `$tag$ ... $tag$` body, if `rest` opens one.
fn dollar_quoted_len(rest: &str) -> Option<usize> {
    let after = &rest[1..];
    let tag_len = after.find('$')?;
    let tag = &after[..tag_len];
    let valid_tag = tag.is_empty()
        || (tag.starts_with(|c: char| c.is_alphabetic() || c == '_')
            && tag.chars().all(|c| c.is_alphanumeric() || c == '_'));
    if !valid_tag {
        return None;
    }
    let delimiter = &rest[..tag_len + 2];
    let body_start = delimiter.len();
    match rest[body_start..].find(delimiter) {
        Some(end) => Some(body_start + end + delimiter.len()),
        None => Some(rest.len()),
    }
}

/// Skip leading whitespace and comments.
pub fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if rest.starts_with("--") {
            rest = rest[rest.find('\n').map_or(rest.len(), |i| i + 1)..].trim_start();
        } else if rest.starts_with("/*") {
            rest = rest[block_comment_len(rest)..].trim_start();
        } else {
            return rest;
        }
    }
}

/// The word starting at byte `pos`, if `pos` begins one.
fn word_at(src: &str, pos: usize) -> Option<&str> {
    if src[..pos].ends_with(is_ident_char) {
        return None;
    }
    let rest = &src[pos..];
    if !rest.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        return None;
    }
    let end = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Split a script into top-level statements.
///
/// Statements end at `;` outside literals and comments. Inside a `CREATE
/// TRIGGER|FUNCTION|PROCEDURE` statement, `BEGIN`/`CASE` ... `END` blocks are
/// tracked so bodies written without dollar quoting stay whole. Returned
/// statements have leading comments removed and exclude the terminator;
/// empty statements are dropped.
pub fn split_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut block_depth = 0usize;
    let mut in_routine: Option<bool> = None;
    let mut skip_until = 0;
    let mut after_end = false;

    for (pos, c) in CodeChars::new(sql) {
        if pos < skip_until {
            continue;
        }
        if c == ';' && block_depth == 0 {
            push_statement(&mut statements, &sql[start..pos]);
            start = pos + 1;
            in_routine = None;
            after_end = false;
            continue;
        }
        let Some(word) = word_at(sql, pos) else {
            continue;
        };
        skip_until = pos + word.len();

        let routine = *in_routine.get_or_insert_with(|| opens_routine(&sql[pos..]));
        if !routine {
            continue;
        }
        let upper = word.to_ascii_uppercase();
        if after_end {
            after_end = false;
            // END IF / END LOOP close constructs that were never counted.
            if matches!(upper.as_str(), "IF" | "LOOP" | "WHILE" | "REPEAT") {
                block_depth += 1;
                continue;
            }
            if upper == "CASE" {
                continue;
            }
        }
        match upper.as_str() {
            "BEGIN" | "CASE" => block_depth += 1,
            "END" => {
                block_depth = block_depth.saturating_sub(1);
                after_end = true;
            }
            _ => {}
        }
    }
    push_statement(&mut statements, &sql[start..]);
    statements
}

fn opens_routine(stmt: &str) -> bool {
    let mut words = stmt.split_whitespace().take(6);
    words.next().is_some_and(|w| w.eq_ignore_ascii_case("CREATE"))
        && words.any(|w| {
            ["TRIGGER", "FUNCTION", "PROCEDURE"]
                .iter()
                .any(|kw| w.eq_ignore_ascii_case(kw))
        })
}

fn push_statement<'a>(statements: &mut Vec<&'a str>, raw: &'a str) {
    let stmt = strip_leading_comments(raw).trim_end();
    if !stmt.is_empty() {
        statements.push(stmt);
    }
}

/// Split on `sep` at parenthesis depth zero, outside literals.
pub fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (pos, c) in CodeChars::new(s) {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            _ if c == sep && depth == 0 => {
                parts.push(s[start..pos].trim());
                start = pos + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}

/// Byte offset of the first top-level occurrence of the keyword `kw`.
pub fn find_keyword(s: &str, kw: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (pos, c) in CodeChars::new(s) {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            _ if depth == 0 => {
                if let Some(word) = word_at(s, pos)
                    && word.eq_ignore_ascii_case(kw)
                {
                    return Some(pos);
                }
            }
            _ => {}
        }
    }
    None
}

/// Inner text of the parenthesised group `s` starts with, and what follows it.
pub fn parenthesized(s: &str) -> Option<(&str, &str)> {
    if !s.starts_with('(') {
        return None;
    }
    let mut depth = 0i32;
    for (pos, c) in CodeChars::new(s) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&s[1..pos], &s[pos + 1..]));
                }
            }
            _ => {}
        }
    }
    None
}

/// Whether a script holds at least one executable statement.
pub fn has_statements(sql: &str) -> bool {
    !split_statements(sql).is_empty()
}
