// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Shrink whitespace in script-like source text.
///
/// Runs of blanks containing a line break become one `\n`; other runs of spaces
/// and tabs become one space. String literals and comments are copied verbatim.
/// A `/` that does not open a comment may start a regular expression, and a
/// backtick may hold nested code, so everything after either is copied verbatim.
pub fn collapse_whitespace(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.char_indices().peekable();

    while let Some((at, c)) = chars.next() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                let mut newline = c == '\r' || c == '\n';
                while let Some(&(_, next)) = chars.peek() {
                    if !matches!(next, ' ' | '\t' | '\r' | '\n') {
                        break;
                    }
                    newline |= next == '\r' || next == '\n';
                    chars.next();
                }
                out.push(if newline { '\n' } else { ' ' });
            }
            '"' | '\'' => {
                out.push(c);
                let mut escaped = false;
                for (_, s) in chars.by_ref() {
                    out.push(s);
                    if escaped {
                        escaped = false;
                    } else if s == '\\' {
                        escaped = true;
                    } else if s == c || s == '\n' {
                        break;
                    }
                }
            }
            '/' => match chars.peek().map(|&(_, n)| n) {
                Some('/') => {
                    out.push(c);
                    for (_, s) in chars.by_ref() {
                        out.push(s);
                        if s == '\n' {
                            break;
                        }
                    }
                }
                Some('*') => {
                    out.push(c);
                    let mut star = false;
                    // skip the opening '*' so "/*/" is not read as closed
                    if let Some((_, open)) = chars.next() {
                        out.push(open);
                    }
                    for (_, s) in chars.by_ref() {
                        out.push(s);
                        if star && s == '/' {
                            break;
                        }
                        star = s == '*';
                    }
                }
                _ => {
                    out.push_str(&source[at..]);
                    return out;
                }
            },
            '`' => {
                out.push_str(&source[at..]);
                return out;
            }
            _ => out.push(c),
        }
    }
    out
}
