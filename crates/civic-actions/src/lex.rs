//! Tokenizer for persona replies.
//!
//! Text before the first marker is prose. After a marker, every line up to
//! the next marker (or the end of the text) belongs to that block and is
//! classified as a field, a continuation, or blank. A bracketed run that
//! does not form a valid marker stays in the surrounding text.

const MARKER_OPEN: &str = "[ACTION:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token<'a> {
  Prose(&'a str),
  Marker(&'a str),
  Field { key: &'a str, value: &'a str },
  Continuation(&'a str),
  Blank,
}

fn is_name_char(c: char) -> bool { c.is_ascii_alphanumeric() || c == '_' }

/// Match a marker starting exactly at `s[0]`. Returns the name and the byte
/// length of the whole marker.
fn match_marker(s: &str) -> Option<(&str, usize)> {
  let after_open = s.strip_prefix(MARKER_OPEN)?;
  let name_start = after_open.trim_start_matches([' ', '\t']);
  let name_len = name_start
    .find(|c: char| !is_name_char(c))
    .unwrap_or(name_start.len());
  if name_len == 0 {
    return None;
  }
  let (name, rest) = name_start.split_at(name_len);
  let close = rest.trim_start_matches([' ', '\t']);
  let tail = close.strip_prefix(']')?;
  Some((name, s.len() - tail.len()))
}

/// Find the next well-formed marker. Returns `(start, end, name)`.
fn find_marker(s: &str) -> Option<(usize, usize, &str)> {
  let mut from = 0;
  while let Some(offset) = s[from..].find(MARKER_OPEN) {
    let start = from + offset;
    if let Some((name, len)) = match_marker(&s[start..]) {
      return Some((start, start + len, name));
    }
    from = start + MARKER_OPEN.len();
  }
  None
}

/// `key: value`, where the key is a bare identifier.
fn field(line: &str) -> Option<(&str, &str)> {
  let (key, value) = line.split_once(':')?;
  let key = key.trim();
  if key.is_empty() || !key.chars().all(is_name_char) {
    return None;
  }
  Some((key, value.trim()))
}

fn block_lines<'a>(segment: &'a str, tokens: &mut Vec<Token<'a>>) {
  for line in segment.lines() {
    let line = line.trim();
    tokens.push(if line.is_empty() {
      Token::Blank
    } else if let Some((key, value)) = field(line) {
      Token::Field { key, value }
    } else {
      Token::Continuation(line)
    });
  }
}

pub(crate) fn tokenize(input: &str) -> Vec<Token<'_>> {
  let mut tokens = Vec::new();
  let mut rest = input;
  let mut in_block = false;
  loop {
    let next = find_marker(rest);
    let segment = match next {
      Some((start, ..)) => &rest[..start],
      None => rest,
    };
    if in_block {
      block_lines(segment, &mut tokens);
    } else if !segment.is_empty() {
      tokens.push(Token::Prose(segment));
    }
    match next {
      Some((_, end, name)) => {
        tokens.push(Token::Marker(name));
        in_block = true;
        rest = &rest[end..];
      }
      None => break,
    }
  }
  tokens
}
