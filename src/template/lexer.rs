//! Splits a template source into text / output / statement / comment
//! segments. Three tag forms are recognized: `{{ }}`, `{% %}`, `{# #}`,
//! each with optional whitespace-trim dashes (`{{-`, `-}}`, `{%-`, `-%}`).
//! Text outside tags is preserved verbatim except where trimmed.

use crate::error::{RecipeError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Output(String),
    Statement(String),
    Comment,
}

pub fn lex(src: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = src;

    while !rest.is_empty() {
        let Some(tag_start) = find_tag_start(rest) else {
            segments.push(Segment::Text(rest.to_string()));
            break;
        };

        let (kind, trim_open) = tag_kind(&rest[tag_start..]);
        let mut text = rest[..tag_start].to_string();
        if trim_open {
            text = text.trim_end().to_string();
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        let open_len = if trim_open { 3 } else { 2 };
        let body_start = tag_start + open_len;
        let close_token = match kind {
            TagKind::Output => "}}",
            TagKind::Statement => "%}",
            TagKind::Comment => "#}",
        };

        let Some(close_rel) = find_close(&rest[body_start..], close_token) else {
            return Err(RecipeError::template_syntax("unterminated tag"));
        };
        let trim_close = body_start + close_rel >= 1
            && rest.as_bytes()[body_start + close_rel - 1] == b'-';
        let body_end = if trim_close {
            body_start + close_rel - 1
        } else {
            body_start + close_rel
        };
        let body = rest[body_start..body_end].trim().to_string();

        match kind {
            TagKind::Output => segments.push(Segment::Output(body)),
            TagKind::Statement => segments.push(Segment::Statement(body)),
            TagKind::Comment => segments.push(Segment::Comment),
        }

        let after = body_start + close_rel + close_token.len();
        rest = &rest[after..];
        if trim_close {
            rest = rest.trim_start();
        }
    }

    Ok(segments)
}

enum TagKind {
    Output,
    Statement,
    Comment,
}

fn tag_kind(s: &str) -> (TagKind, bool) {
    if s.starts_with("{{-") {
        (TagKind::Output, true)
    } else if s.starts_with("{{") {
        (TagKind::Output, false)
    } else if s.starts_with("{%-") {
        (TagKind::Statement, true)
    } else if s.starts_with("{%") {
        (TagKind::Statement, false)
    } else {
        (TagKind::Comment, s.starts_with("{#-"))
    }
}

fn find_tag_start(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && matches!(bytes[i + 1], b'{' | b'%' | b'#') {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn find_close(s: &str, token: &str) -> Option<usize> {
    s.find(token)
}
