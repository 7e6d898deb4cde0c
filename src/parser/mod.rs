use pest::Parser;

use crate::ast::Ast;
use crate::error::ParseError;

pub mod matlab_parser;

pub use matlab_parser::{MatlabParser, Rule};

/// Blank out `%` comments and `...` line continuations, replacing each byte
/// (including the continuation's newline) with a space so that spans reported
/// by the parser still index into the original source.
///
/// A `'` after something that can end a value (`a'`, `x(1)'`, `]'`) is the
/// transpose operator; anywhere else it opens a character string. Comments
/// inside strings are left alone.
///
/// A second pass rewrites the space before a glued sign inside matrix
/// brackets to a comma, so `[1 -2]` is two elements while `[1 - 2]` is a
/// subtraction.
pub fn preprocess(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = bytes.to_vec();
    let mut i = 0;
    let mut in_string = false;
    // whether the previous significant char could end a value
    let mut prev_value = false;
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if b == b'\'' {
                if i + 1 < bytes.len() && bytes[i + 1] == b'\'' {
                    i += 2;
                    continue;
                }
                in_string = false;
                prev_value = true;
            } else if b == b'\n' {
                // unterminated string, let the parser report it
                in_string = false;
                prev_value = false;
            }
            i += 1;
            continue;
        }
        match b {
            b'%' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    out[i] = b' ';
                    i += 1;
                }
            }
            b'.' if bytes[i..].starts_with(b"...") => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    out[i] = b' ';
                    i += 1;
                }
                if i < bytes.len() {
                    out[i] = b' ';
                    i += 1;
                }
            }
            b'\'' => {
                if !prev_value {
                    in_string = true;
                }
                i += 1;
            }
            _ => {
                prev_value = b.is_ascii_alphanumeric()
                    || matches!(b, b'_' | b')' | b']' | b'}');
                i += 1;
            }
        }
    }
    split_signed_elements(&mut out);
    // preprocess only ever writes ASCII over existing bytes
    String::from_utf8(out).unwrap()
}

/// Inside `[...]` (but not inside parentheses nested within it), a sign that
/// follows whitespace and is glued to its operand starts a new element:
/// `[1 -2]` is two elements while `[1 - 2]` is a subtraction. The separating
/// space is rewritten to a comma so the grammar itself stays
/// whitespace-insensitive. Runs after comments and continuations have been
/// blanked, so joined lines take part too.
fn split_signed_elements(out: &mut [u8]) {
    let mut i = 0;
    let mut in_string = false;
    let mut prev_value = false;
    // paren depth per open square bracket
    let mut brackets: Vec<u32> = Vec::new();
    while i < out.len() {
        let b = out[i];
        if in_string {
            if b == b'\'' {
                if i + 1 < out.len() && out[i + 1] == b'\'' {
                    i += 2;
                    continue;
                }
                in_string = false;
                prev_value = true;
            } else if b == b'\n' {
                in_string = false;
                prev_value = false;
            }
            i += 1;
            continue;
        }
        match b {
            b'\'' => {
                if !prev_value {
                    in_string = true;
                }
                i += 1;
            }
            b'[' => {
                brackets.push(0);
                prev_value = false;
                i += 1;
            }
            b']' => {
                brackets.pop();
                prev_value = true;
                i += 1;
            }
            b'(' => {
                if let Some(d) = brackets.last_mut() {
                    *d += 1;
                }
                prev_value = false;
                i += 1;
            }
            b')' => {
                if let Some(d) = brackets.last_mut() {
                    *d = d.saturating_sub(1);
                }
                prev_value = true;
                i += 1;
            }
            b' ' | b'\t' => {
                if prev_value
                    && brackets.last() == Some(&0)
                    && sign_starts_element(out, i)
                {
                    out[i] = b',';
                }
                prev_value = false;
                i += 1;
            }
            _ => {
                prev_value = b.is_ascii_alphanumeric()
                    || matches!(b, b'_' | b')' | b']' | b'}');
                i += 1;
            }
        }
    }
}

/// Looking past the whitespace at `i`: is the next token a `+` or `-` glued
/// to a following operand?
fn sign_starts_element(bytes: &[u8], i: usize) -> bool {
    let mut j = i + 1;
    while j < bytes.len() && matches!(bytes[j], b' ' | b'\t') {
        j += 1;
    }
    if j >= bytes.len() || !matches!(bytes[j], b'+' | b'-') {
        return false;
    }
    matches!(
        bytes.get(j + 1),
        Some(&c) if !matches!(c, b' ' | b'\t' | b'\r' | b'\n')
    )
}

/// Parse preprocessed source into a list of top-level statements. The
/// returned ASTs borrow from `text`, so callers keep the preprocessed
/// string alive for the lifetime of the parse.
pub fn parse_string(text: &str) -> Result<Vec<Ast<'_>>, ParseError> {
    let main = MatlabParser::parse(Rule::main, text)
        .map_err(|e| ParseError::Syntax(Box::new(e)))?
        .next()
        .unwrap();
    let mut stmts = Vec::new();
    for pair in main.into_inner() {
        if pair.as_rule() == Rule::EOI {
            continue;
        }
        stmts.push(matlab_parser::parse_value(pair)?);
    }
    Ok(stmts)
}
