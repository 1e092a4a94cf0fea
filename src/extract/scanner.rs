//! Minimal bracket-depth scanner.
//!
//! Declaration bodies are located by tracking delimiter depth explicitly
//! instead of bounded regex character classes, so nested field objects are
//! never truncated. String literals (single, double and backtick quoted,
//! with escapes) and `//` / `/* */` comments are skipped while counting.

use lazy_static::lazy_static;
use regex::Regex;

/// A slice of a larger text together with its byte offset in that text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub offset: usize,
    pub text: &'a str,
}

/// If `i` starts a string literal or comment, return the index just past it.
fn skip_opaque(bytes: &[u8], i: usize) -> Option<usize> {
    match bytes[i] {
        q @ (b'"' | b'\'' | b'`') => {
            let mut j = i + 1;
            while j < bytes.len() {
                match bytes[j] {
                    b'\\' => j += 2,
                    c if c == q => return Some(j + 1),
                    // Unterminated single-line strings stop at the newline.
                    b'\n' if q != b'`' => return Some(j),
                    _ => j += 1,
                }
            }
            Some(bytes.len())
        }
        b'/' if bytes.get(i + 1) == Some(&b'/') => {
            let mut j = i + 2;
            while j < bytes.len() && bytes[j] != b'\n' {
                j += 1;
            }
            Some(j)
        }
        b'/' if bytes.get(i + 1) == Some(&b'*') => {
            let mut j = i + 2;
            while j + 1 < bytes.len() {
                if bytes[j] == b'*' && bytes[j + 1] == b'/' {
                    return Some(j + 2);
                }
                j += 1;
            }
            Some(bytes.len())
        }
        _ => None,
    }
}

fn closer_for(open: u8) -> Option<u8> {
    match open {
        b'{' => Some(b'}'),
        b'[' => Some(b']'),
        b'(' => Some(b')'),
        b'<' => Some(b'>'),
        _ => None,
    }
}

/// Replace comment bytes with spaces, keeping offsets and newlines intact.
pub fn mask_comments(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = bytes.to_vec();
    let mut i = 0;
    while i < bytes.len() {
        let is_comment =
            bytes[i] == b'/' && matches!(bytes.get(i + 1), Some(b'/') | Some(b'*'));
        match skip_opaque(bytes, i) {
            Some(end) => {
                if is_comment {
                    for b in &mut out[i..end] {
                        if *b != b'\n' {
                            *b = b' ';
                        }
                    }
                }
                i = end.max(i + 1);
            }
            None => i += 1,
        }
    }
    String::from_utf8(out).unwrap_or_else(|_| text.to_string())
}

/// Index of the delimiter closing the one at `open`.
///
/// Only the delimiter kind opened at `open` is counted, so an unbalanced
/// bracket of another kind inside (a `<` comparison, say) cannot derail
/// the match.
pub fn matching_close(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let opener = *bytes.get(open)?;
    let closer = closer_for(opener)?;
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        if let Some(end) = skip_opaque(bytes, i) {
            i = end.max(i + 1);
            continue;
        }
        let b = bytes[i];
        if b == opener {
            depth += 1;
        } else if b == closer {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

/// Find the first `open` delimiter at or after `from` and return
/// `(open_index, close_index)`.
pub fn block_after(text: &str, from: usize, open: u8) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        if let Some(end) = skip_opaque(bytes, i) {
            i = end.max(i + 1);
            continue;
        }
        if bytes[i] == open {
            let close = matching_close(text, i)?;
            return Some((i, close));
        }
        i += 1;
    }
    None
}

/// The expression starting at `from`, ending at a top-level `;`, an
/// unbalanced closer, or a newline not followed by a `.` chain.
pub fn expression_at(text: &str, from: usize) -> Segment<'_> {
    let bytes = text.as_bytes();
    let start = skip_ws(text, from);
    let mut i = start;
    while i < bytes.len() {
        if let Some(end) = skip_opaque(bytes, i) {
            i = end.max(i + 1);
            continue;
        }
        match bytes[i] {
            b'(' | b'[' | b'{' => {
                i = matching_close(text, i).map(|c| c + 1).unwrap_or(bytes.len());
            }
            b';' | b')' | b']' | b'}' | b',' => break,
            b'\n' => {
                let next = skip_ws(text, i);
                if bytes.get(next) == Some(&b'.') {
                    i = next;
                } else {
                    break;
                }
            }
            _ => i += 1,
        }
    }
    Segment {
        offset: start,
        text: text[start..i.min(bytes.len())].trim_end(),
    }
}

/// `sub` (a slice of `text`) as a segment of `text`.
pub fn segment_of<'a>(text: &str, sub: &'a str) -> Segment<'a> {
    let base = text.as_ptr() as usize;
    let at = sub.as_ptr() as usize;
    let offset = if at >= base && at <= base + text.len() { at - base } else { 0 };
    Segment { offset, text: sub }
}

/// The text strictly between two delimiter indices.
pub fn inner(text: &str, open: usize, close: usize) -> &str {
    &text[open + 1..close]
}

/// Split `body` on `sep` at bracket depth zero, outside strings and
/// comments. Segments are trimmed; empty ones are dropped.
pub fn split_top_level(body: &str, sep: u8) -> Vec<Segment<'_>> {
    let bytes = body.as_bytes();
    let mut segments = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if let Some(end) = skip_opaque(bytes, i) {
            i = end.max(i + 1);
            continue;
        }
        match bytes[i] {
            b'{' | b'[' | b'(' => depth += 1,
            b'}' | b']' | b')' => depth -= 1,
            b if b == sep && depth == 0 => {
                push_segment(body, start, i, &mut segments);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    push_segment(body, start, bytes.len(), &mut segments);
    segments
}

fn push_segment<'a>(body: &'a str, from: usize, to: usize, segments: &mut Vec<Segment<'a>>) {
    let raw = &body[from..to];
    let trimmed = raw.trim_start();
    let lead = raw.len() - trimmed.len();
    let trimmed = trimmed.trim_end();
    if !trimmed.is_empty() {
        segments.push(Segment {
            offset: from + lead,
            text: trimmed,
        });
    }
}

/// Split an object-literal entry into key and value at the first
/// top-level `:`. Quoted keys are unquoted.
pub fn split_key_value(entry: &str) -> Option<(String, &str)> {
    let bytes = entry.as_bytes();
    let mut depth: i32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        // A quoted key is itself opaque; step over it without losing it.
        if let Some(end) = skip_opaque(bytes, i) {
            i = end.max(i + 1);
            continue;
        }
        match bytes[i] {
            b'{' | b'[' | b'(' => depth += 1,
            b'}' | b']' | b')' => depth -= 1,
            b':' if depth == 0 => {
                let raw_key = entry[..i].trim();
                let key = string_literal(raw_key).unwrap_or_else(|| raw_key.to_string());
                if key.is_empty() || !key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$') {
                    return None;
                }
                return Some((key, entry[i + 1..].trim()));
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Unquote a complete string literal. Template literals with
/// interpolation are not literals.
pub fn string_literal(s: &str) -> Option<String> {
    let s = s.trim();
    let first = s.chars().next()?;
    if !matches!(first, '"' | '\'' | '`') || s.len() < 2 || !s.ends_with(first) {
        return None;
    }
    let body = &s[1..s.len() - 1];
    if first == '`' && body.contains("${") {
        return None;
    }
    Some(body.replace("\\'", "'").replace("\\\"", "\""))
}

/// String elements of an array literal (`['a', "b"]`). Non-literal
/// elements are skipped.
pub fn string_list(s: &str) -> Vec<String> {
    let s = s.trim();
    if !(s.starts_with('[') && s.ends_with(']')) {
        return Vec::new();
    }
    split_top_level(&s[1..s.len() - 1], b',')
        .into_iter()
        .filter_map(|seg| string_literal(seg.text))
        .collect()
}

/// Top-level arguments of the call whose `(` is at `open`.
pub fn call_args(text: &str, open: usize) -> Option<(Vec<Segment<'_>>, usize)> {
    if text.as_bytes().get(open) != Some(&b'(') {
        return None;
    }
    let close = matching_close(text, open)?;
    let args = split_top_level(inner(text, open, close), b',')
        .into_iter()
        .map(|seg| Segment {
            offset: seg.offset + open + 1,
            text: seg.text,
        })
        .collect();
    Some((args, close))
}

/// 1-indexed line number of a byte offset.
pub fn line_of(text: &str, offset: usize) -> usize {
    let end = offset.min(text.len());
    text.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}

/// First index at or after `from` that is not whitespace.
pub fn skip_ws(text: &str, from: usize) -> usize {
    let bytes = text.as_bytes();
    let mut i = from;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Value of a top-level `key: value` entry in an object-literal body.
pub fn object_entry<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    split_top_level(body, b',')
        .into_iter()
        .filter_map(|seg| split_key_value(seg.text))
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
}

/// Strip one pair of surrounding braces, if present.
pub fn strip_braces(s: &str) -> Option<&str> {
    let s = s.trim();
    if s.starts_with('{') && matching_close(s, 0) == Some(s.len() - 1) {
        Some(&s[1..s.len() - 1])
    } else {
        None
    }
}

/// Like [`string_literal`] but template literals keep their `${..}`
/// interpolations verbatim. Used for route paths.
pub fn path_literal(s: &str) -> Option<String> {
    let s = s.trim();
    let first = s.chars().next()?;
    if !matches!(first, '"' | '\'' | '`') || s.len() < 2 || !s.ends_with(first) {
        return None;
    }
    Some(s[1..s.len() - 1].to_string())
}

lazy_static! {
    static ref DECORATOR_RE: Regex =
        Regex::new(r"@([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)").unwrap();
    static ref CLASS_RE: Regex = Regex::new(
        r"\bclass\s+([A-Za-z_$][\w$]*)(?:\s*<[^>{]*>)?(?:\s+extends\s+([A-Za-z_$][\w$.]*))?"
    )
    .unwrap();
    static ref FUNCTION_DECL_RE: Regex =
        Regex::new(r"\b(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)\s*\(").unwrap();
    static ref FUNCTION_BINDING_RE: Regex = Regex::new(
        r"(?:\b(?:const|let|var)\s+|\bexports\.|\bmodule\.exports\.)([A-Za-z_$][\w$]*)\s*(?::[^=;\n]+)?=\s*(?:async\s+)?(?:function\s*\*?\s*[\w$]*\s*)?(\([^)]*\)|[A-Za-z_$][\w$]*)\s*(?:=>)?"
    )
    .unwrap();
}

/// One decorator application (`@Column({ nullable: true })`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoratorCall<'a> {
    pub offset: usize,
    /// Dotted name without `@`.
    pub name: &'a str,
    pub args: Vec<Segment<'a>>,
    /// Full decorator text.
    pub text: &'a str,
}

impl<'a> DecoratorCall<'a> {
    /// Last segment of a dotted name (`ApiProperty` for `swagger.ApiProperty`).
    pub fn simple_name(&self) -> &'a str {
        self.name.rsplit('.').next().unwrap_or(self.name)
    }
}

/// Parse the decorator starting at `at` (which must be `@`). Returns it
/// with the index just past it.
pub fn decorator_at(text: &str, at: usize) -> Option<(DecoratorCall<'_>, usize)> {
    let bytes = text.as_bytes();
    if bytes.get(at) != Some(&b'@') {
        return None;
    }
    if at > 0 {
        let prev = bytes[at - 1];
        if prev.is_ascii_alphanumeric() || matches!(prev, b'.' | b'\'' | b'"' | b'`' | b'_') {
            return None;
        }
    }
    let caps = DECORATOR_RE.captures(&text[at..])?;
    let whole = caps.get(0)?;
    if whole.start() != 0 {
        return None;
    }
    let name = caps.get(1)?.as_str();
    let mut end = at + whole.end();
    let mut args = Vec::new();
    let after = skip_ws(text, end);
    if bytes.get(after) == Some(&b'(') {
        if let Some((parsed, close)) = call_args(text, after) {
            args = parsed;
            end = close + 1;
        }
    }
    Some((
        DecoratorCall {
            offset: at,
            name,
            args,
            text: &text[at..end],
        },
        end,
    ))
}

/// Consecutive decorators starting at `at`. Returns them with the index
/// just past the last one (`at` itself when there are none).
pub fn decorator_run(text: &str, at: usize) -> (Vec<DecoratorCall<'_>>, usize) {
    let mut decorators = Vec::new();
    let mut end = at;
    let mut i = skip_ws(text, at);
    while let Some((decorator, next)) = decorator_at(text, i) {
        decorators.push(decorator);
        end = next;
        i = skip_ws(text, next);
    }
    (decorators, end)
}

/// A class declaration and the decorators written in front of it.
#[derive(Debug, Clone)]
pub struct ClassDecl<'a> {
    pub name: &'a str,
    pub extends: Option<&'a str>,
    /// Offset of the `class` keyword.
    pub offset: usize,
    pub decorators: Vec<DecoratorCall<'a>>,
    /// `(open, close)` brace indices of the body.
    pub body: Option<(usize, usize)>,
}

impl<'a> ClassDecl<'a> {
    pub fn decorator(&self, name: &str) -> Option<&DecoratorCall<'a>> {
        self.decorators.iter().find(|d| d.simple_name() == name)
    }
}

/// Every class declaration in `text`, with its leading decorators.
pub fn classes(text: &str) -> Vec<ClassDecl<'_>> {
    // Decorator runs outside string literals, in source order.
    let mut runs: Vec<(Vec<DecoratorCall<'_>>, usize)> = Vec::new();
    let mut consumed = 0;
    for m in DECORATOR_RE.find_iter(text) {
        if m.start() < consumed {
            continue;
        }
        let (run, end) = decorator_run(text, m.start());
        if !run.is_empty() {
            consumed = end;
            runs.push((run, end));
        }
    }

    CLASS_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str();
            let offset = whole.start();
            let decorators = runs
                .iter()
                .find(|(_, end)| {
                    *end <= offset
                        && text[*end..offset].split_whitespace().all(|w| {
                            matches!(w, "export" | "default" | "abstract" | "declare")
                        })
                })
                .map(|(run, _)| run.clone())
                .unwrap_or_default();
            Some(ClassDecl {
                name,
                extends: caps.get(2).map(|m| m.as_str()),
                offset,
                decorators,
                body: block_after(text, whole.end(), b'{'),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Method,
    Property,
}

/// One member of a class body.
#[derive(Debug, Clone)]
pub struct ClassMember<'a> {
    pub kind: MemberKind,
    pub name: &'a str,
    /// Offset of the first decorator, or of the declaration.
    pub offset: usize,
    pub decorators: Vec<DecoratorCall<'a>>,
    /// Decorators plus declaration, without a method body.
    pub text: &'a str,
    pub params: Option<Segment<'a>>,
    /// Method body, or an arrow-function initializer of a property.
    pub body: Option<Segment<'a>>,
}

impl<'a> ClassMember<'a> {
    pub fn decorator(&self, name: &str) -> Option<&DecoratorCall<'a>> {
        self.decorators.iter().find(|d| d.simple_name() == name)
    }
}

const MEMBER_MODIFIERS: &[&str] = &[
    "public", "private", "protected", "static", "readonly", "async", "get", "set", "abstract",
    "override", "declare",
];

fn member_name(decl: &str) -> &str {
    let mut rest = decl.trim_start();
    loop {
        let word_end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '$'))
            .unwrap_or(rest.len());
        let word = &rest[..word_end];
        let after = rest[word_end..].trim_start();
        // `get(` is a method named get, not a modifier.
        if MEMBER_MODIFIERS.contains(&word) && !after.is_empty() && !after.starts_with(['(', ':', '=', '?', '!', ';', '<'])
        {
            rest = after.trim_start_matches('*').trim_start();
            continue;
        }
        return word;
    }
}

/// Members of the class body delimited by braces at `open` and `close`.
pub fn class_members(text: &str, open: usize, close: usize) -> Vec<ClassMember<'_>> {
    let bytes = text.as_bytes();
    let mut members = Vec::new();
    let mut i = open + 1;

    while i < close {
        i = skip_ws(text, i);
        if i >= close {
            break;
        }
        if matches!(bytes[i], b';' | b',') {
            i += 1;
            continue;
        }
        let start = i;
        let (decorators, after) = decorator_run(text, i);
        let decl_start = skip_ws(text, after).min(close);

        let mut j = decl_start;
        let mut params = None;
        let mut body = None;
        let mut initializer: Option<usize> = None;
        let mut decl_end = close;

        while j < close {
            if let Some(e) = skip_opaque(bytes, j) {
                j = e.max(j + 1);
                continue;
            }
            let b = bytes[j];
            if initializer.is_some() {
                match b {
                    b'(' | b'[' | b'{' => j = matching_close(text, j).map(|c| c + 1).unwrap_or(close),
                    b';' => {
                        decl_end = j + 1;
                        break;
                    }
                    b'\n' if !text[initializer.unwrap_or(j)..j].trim().is_empty() => {
                        decl_end = j;
                        break;
                    }
                    _ => j += 1,
                }
                continue;
            }
            match b {
                b'(' if params.is_none() => match matching_close(text, j) {
                    Some(pc) => {
                        params = Some(Segment {
                            offset: j + 1,
                            text: &text[j + 1..pc],
                        });
                        j = pc + 1;
                    }
                    None => {
                        decl_end = close;
                        break;
                    }
                },
                b'<' if params.is_none() => {
                    j = matching_close(text, j).map(|c| c + 1).unwrap_or(j + 1);
                }
                b'{' => {
                    let bc = matching_close(text, j).unwrap_or(close.saturating_sub(1));
                    let annotation = params.is_none() && text[decl_start..j].contains(':');
                    if annotation {
                        j = bc + 1;
                        continue;
                    }
                    body = Some(Segment {
                        offset: j + 1,
                        text: &text[(j + 1).min(bc)..bc],
                    });
                    decl_end = j;
                    j = bc + 1;
                    break;
                }
                b'=' if bytes.get(j + 1) == Some(&b'>') => j += 2,
                b'=' if params.is_none() => {
                    initializer = Some(j + 1);
                    j += 1;
                }
                b';' => {
                    decl_end = j + 1;
                    j += 1;
                    break;
                }
                b'\n' if params.is_none() => {
                    let so_far = text[decl_start..j].trim_end();
                    if !so_far.is_empty() && !so_far.ends_with([':', '|', '&', ',']) {
                        decl_end = j;
                        break;
                    }
                    j += 1;
                }
                b'(' | b'[' => j = matching_close(text, j).map(|c| c + 1).unwrap_or(j + 1),
                _ => j += 1,
            }
        }
        let member_end = if body.is_some() { j } else { decl_end };

        if let Some(init) = initializer {
            let init_text = text[init..decl_end.min(close)].trim();
            if init_text.contains("=>") || init_text.starts_with("function") {
                let lead = text[init..].len() - text[init..].trim_start().len();
                body = Some(Segment {
                    offset: init + lead,
                    text: init_text,
                });
            }
        }

        let decl_text = &text[decl_start..decl_end.min(close).max(decl_start)];
        let name = member_name(decl_text);
        if !name.is_empty() && !name.starts_with(|c: char| c.is_ascii_digit()) {
            members.push(ClassMember {
                kind: if params.is_some() && initializer.is_none() {
                    MemberKind::Method
                } else {
                    MemberKind::Property
                },
                name,
                offset: start,
                decorators,
                text: &text[start..decl_end.min(close).max(start)],
                params,
                body,
            });
        }
        i = member_end.max(decl_end).max(start + 1);
    }
    members
}

/// A named top-level or exported function with a block body.
#[derive(Debug, Clone)]
pub struct NamedFunction<'a> {
    pub name: &'a str,
    pub offset: usize,
    pub params: Option<Segment<'a>>,
    pub body: Segment<'a>,
}

/// `function name(..) {..}`, `const name = (..) => {..}`,
/// `exports.name = function (..) {..}` and similar bindings.
pub fn named_functions(text: &str) -> Vec<NamedFunction<'_>> {
    let mut out = Vec::new();

    for caps in FUNCTION_DECL_RE.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let open = whole.end() - 1;
        let Some(pc) = matching_close(text, open) else {
            continue;
        };
        if let Some((bo, bc)) = block_after(text, pc + 1, b'{') {
            if text[pc + 1..bo].contains(';') {
                continue;
            }
            out.push(NamedFunction {
                name: name.as_str(),
                offset: whole.start(),
                params: Some(Segment {
                    offset: open + 1,
                    text: &text[open + 1..pc],
                }),
                body: Segment {
                    offset: bo + 1,
                    text: &text[bo + 1..bc],
                },
            });
        }
    }

    for caps in FUNCTION_BINDING_RE.captures_iter(text) {
        let (Some(whole), Some(name), Some(params)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let after = skip_ws(text, whole.end());
        let is_function = whole.as_str().contains("=>") || whole.as_str().contains("function");
        if text.as_bytes().get(after) != Some(&b'{') || !is_function {
            continue;
        }
        if let Some(bc) = matching_close(text, after) {
            let raw = params.as_str();
            let (p_offset, p_text) = match raw.strip_prefix('(') {
                Some(inner) => (params.start() + 1, inner.strip_suffix(')').unwrap_or(inner)),
                None => (params.start(), raw),
            };
            out.push(NamedFunction {
                name: name.as_str(),
                offset: whole.start(),
                params: Some(Segment {
                    offset: p_offset,
                    text: p_text,
                }),
                body: Segment {
                    offset: after + 1,
                    text: &text[after + 1..bc],
                },
            });
        }
    }

    out.sort_by_key(|f| f.offset);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_close_nested() {
        let text = "define('User', { a: { b: { c: 1 } }, d: [1, { e: 2 }] })";
        let open = text.find('{').unwrap();
        let close = matching_close(text, open).unwrap();
        assert_eq!(&text[close..], "})");
    }

    #[test]
    fn test_matching_close_skips_strings_and_comments() {
        let text = "{ a: '}', b: \"{\", // }\n c: `}` /* } */ }";
        assert_eq!(matching_close(text, 0), Some(text.len() - 1));
    }

    #[test]
    fn test_split_top_level() {
        let body = "name: String, meta: { a: 1, b: 2 }, tags: [String, Number]";
        let parts: Vec<_> = split_top_level(body, b',').into_iter().map(|s| s.text).collect();
        assert_eq!(
            parts,
            vec!["name: String", "meta: { a: 1, b: 2 }", "tags: [String, Number]"]
        );
    }

    #[test]
    fn test_split_key_value() {
        assert_eq!(
            split_key_value("'first-name': String"),
            None,
            "keys that are not identifiers are rejected"
        );
        let (k, v) = split_key_value("\"email\": { type: String }").unwrap();
        assert_eq!(k, "email");
        assert_eq!(v, "{ type: String }");
        assert!(split_key_value("email").is_none());
    }

    #[test]
    fn test_mask_comments_keeps_offsets() {
        let text = "a // comment\nb /* x */ c 'http://x'";
        let masked = mask_comments(text);
        assert_eq!(masked.len(), text.len());
        assert!(!masked.contains("comment"));
        assert!(masked.contains("'http://x'"));
        assert_eq!(line_of(&masked, masked.find('b').unwrap()), 2);
    }

    #[test]
    fn test_literals() {
        assert_eq!(string_literal("'abc'").as_deref(), Some("abc"));
        assert_eq!(string_literal("`/a/${id}`"), None);
        assert_eq!(string_list("['a', \"b\", c]"), vec!["a", "b"]);
    }

    #[test]
    fn test_call_args() {
        let text = "router.post('/x', auth, (req, res) => { res.json({ a, b }) })";
        let open = text.find('(').unwrap();
        let (args, close) = call_args(text, open).unwrap();
        assert_eq!(close, text.len() - 1);
        assert_eq!(args.len(), 3);
        assert_eq!(args[1].text, "auth");
        assert_eq!(&text[args[1].offset..args[1].offset + 4], "auth");
    }

    #[test]
    fn test_decorated_class_and_members() {
        let text = "@Entity('users')\nexport class User extends BaseEntity {\n  @PrimaryGeneratedColumn()\n  id: number;\n\n  @Column({ nullable: true })\n  email?: string\n\n  @OneToMany(() => Post, (p) => p.author)\n  posts: Post[];\n\n  async findPosts(limit = 10): Promise<Post[]> {\n    return this.posts.slice(0, limit);\n  }\n\n  handle = async (x) => { return x; };\n}\n";
        let decls = classes(text);
        assert_eq!(decls.len(), 1);
        let user = &decls[0];
        assert_eq!(user.name, "User");
        assert_eq!(user.extends, Some("BaseEntity"));
        assert_eq!(user.decorator("Entity").map(|d| d.args.len()), Some(1));

        let (open, close) = user.body.unwrap();
        let members = class_members(text, open, close);
        let names: Vec<_> = members.iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["id", "email", "posts", "findPosts", "handle"]);
        assert_eq!(members[1].kind, MemberKind::Property);
        assert!(members[1].text.contains("@Column"));
        assert!(members[1].text.ends_with("email?: string"));
        assert_eq!(members[3].kind, MemberKind::Method);
        assert!(members[3].body.unwrap().text.contains("slice"));
        assert!(members[4].body.unwrap().text.contains("=>"));
    }

    #[test]
    fn test_decorator_ignores_emails() {
        assert!(decorator_at("a@b.com", 1).is_none());
        let (d, end) = decorator_at("@Get(':id') find()", 0).unwrap();
        assert_eq!(d.name, "Get");
        assert_eq!(d.args[0].text, "':id'");
        assert_eq!(end, 11);
    }

    #[test]
    fn test_expression_at() {
        let text = "const s = Joi.object({ a: Joi.string() })\n  .unknown(true);\nconst t = 1";
        let from = text.find('=').unwrap() + 1;
        assert_eq!(
            expression_at(text, from).text,
            "Joi.object({ a: Joi.string() })\n  .unknown(true)"
        );
    }

    #[test]
    fn test_named_functions() {
        let text = "async function createOrder(req, res) { res.json({}) }\nconst listOrders = async (req, res) => {\n  return 1;\n};\nexports.remove = function (req, res) { };\nconst schema = Joi.object({ a: 1 });\n";
        let names: Vec<_> = named_functions(text).into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["createOrder", "listOrders", "remove"]);
    }
}
