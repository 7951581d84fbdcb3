//! Best-effort completion of a truncated JSON tail.
//!
//! The input is the text of one top-level object or array that has been opened
//! but not yet closed. The repaired text closes any open string, fills a
//! dangling key or value with `null`, finishes a partial literal, trims a
//! half-written number, and closes every open container in reverse order.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Key,
    Colon,
    Value,
    Comma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object(Expect),
    Array(Expect),
}

impl Container {
    fn with(self, expect: Expect) -> Self {
        match self {
            Container::Object(_) => Container::Object(expect),
            Container::Array(_) => Container::Array(expect),
        }
    }

    fn closer(self) -> char {
        match self {
            Container::Object(_) => '}',
            Container::Array(_) => ']',
        }
    }
}

fn after_value(stack: &mut [Container]) {
    if let Some(top) = stack.last_mut() {
        *top = top.with(Expect::Comma);
    }
}

fn is_bare(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.')
}

/// Complete a partial `true`/`false`/`null`, or trim a partial number.
fn complete_bare(token: &str) -> String {
    for literal in ["true", "false", "null"] {
        if literal.starts_with(token) {
            return literal.to_string();
        }
    }
    let trimmed = token.trim_end_matches(|c| matches!(c, '-' | '+' | '.' | 'e' | 'E'));
    if trimmed.is_empty() || trimmed.parse::<f64>().is_err() {
        "null".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Drop a `\` or a partial `\uXXXX` escape left at the end of a string.
fn trim_partial_escape(text: &mut String) {
    if let Some(pos) = text.rfind("\\u") {
        let hex = &text[pos + 2..];
        let escaped_backslash = text[..pos].ends_with('\\')
            && text[..pos].chars().rev().take_while(|c| *c == '\\').count() % 2 == 1;
        if !escaped_backslash && hex.len() < 4 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            text.truncate(pos);
            return;
        }
    }
    let trailing = text.chars().rev().take_while(|c| *c == '\\').count();
    if trailing % 2 == 1 {
        text.pop();
    }
}

/// Repair an unterminated top-level value. Returns `None` when the text does
/// not open a container.
pub fn repair(tail: &str) -> Option<String> {
    let mut stack: Vec<Container> = Vec::new();
    let mut in_string = false;
    let mut string_is_key = false;
    let mut string_start = 0;
    let mut escaped = false;
    let mut bare_start: Option<usize> = None;

    for (i, c) in tail.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                if string_is_key {
                    if let Some(top) = stack.last_mut() {
                        *top = top.with(Expect::Colon);
                    }
                } else {
                    after_value(&mut stack);
                }
            }
            continue;
        }

        if bare_start.is_some() {
            if is_bare(c) {
                continue;
            }
            bare_start = None;
            after_value(&mut stack);
        }

        match c {
            '{' => stack.push(Container::Object(Expect::Key)),
            '[' => stack.push(Container::Array(Expect::Value)),
            '}' | ']' => {
                stack.pop();
                after_value(&mut stack);
            }
            '"' => {
                in_string = true;
                string_start = i;
                string_is_key = matches!(stack.last(), Some(Container::Object(Expect::Key)));
            }
            ':' => {
                if let Some(top) = stack.last_mut() {
                    *top = top.with(Expect::Value);
                }
            }
            ',' => {
                if let Some(top) = stack.last_mut() {
                    *top = match top {
                        Container::Object(_) => Container::Object(Expect::Key),
                        Container::Array(_) => Container::Array(Expect::Value),
                    };
                }
            }
            c if c.is_whitespace() => {}
            c if is_bare(c) => bare_start = Some(i),
            _ => {}
        }
    }

    if stack.is_empty() {
        return None;
    }

    let mut out = tail.to_string();
    if in_string {
        if string_is_key {
            // A half-written key carries no information; drop it.
            out.truncate(string_start);
            if let Some(top) = stack.last_mut() {
                *top = top.with(Expect::Key);
            }
        } else {
            trim_partial_escape(&mut out);
            out.push('"');
            after_value(&mut stack);
        }
    } else if let Some(start) = bare_start {
        let completed = complete_bare(&tail[start..]);
        out.truncate(start);
        out.push_str(&completed);
        after_value(&mut stack);
    }

    if let Some(top) = stack.last() {
        match *top {
            Container::Object(Expect::Colon) => out.push_str(": null"),
            Container::Object(Expect::Value) => out.push_str(" null"),
            Container::Array(Expect::Value) => {
                if out.trim_end().ends_with(',') {
                    out.push_str(" null");
                }
            }
            Container::Object(Expect::Key) => {
                let trimmed_len = out.trim_end().len();
                out.truncate(trimmed_len);
                if out.ends_with(',') {
                    out.pop();
                }
            }
            _ => {}
        }
    }

    for container in stack.iter().rev() {
        out.push(container.closer());
    }
    Some(out)
}
