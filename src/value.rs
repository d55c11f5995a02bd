//! Word values.
//!
//! Every word produced by substitution, every command argument and every
//! command result is a [`Value`]: an immutable string shared through an
//! [`Rc`]. Cloning a value only bumps a reference count, so the engine can
//! hand the same word to traces, the command implementation and the error log
//! without copying it.
//!
//! Values also have a *list* reading. A list is a sequence of elements
//! separated by whitespace, where an element may be grouped with braces or
//! double quotes and may contain backslash escapes.

use crate::error::EvalError;
use crate::parser;
use std::fmt;
use std::rc::Rc;

/// An immutable, reference-counted string value.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(Rc<str>);

impl Value {
    /// Create a value from anything that converts into a string.
    pub fn new(s: impl Into<String>) -> Self {
        Self(Rc::from(s.into()))
    }

    /// The empty value.
    pub fn empty() -> Self {
        Self(Rc::from(""))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Interpret the value as a signed integer.
    pub fn as_int(&self) -> Result<i64, EvalError> {
        let text = self.0.trim();
        text.parse::<i64>().map_err(|_| EvalError::Command {
            message: format!("expected integer but got \"{}\"", self.0),
            code: vec!["TCL".into(), "VALUE".into(), "NUMBER".into()],
        })
    }

    /// Interpret the value as a boolean (`1/0`, `true/false`, `yes/no`, `on/off`).
    pub fn as_bool(&self) -> Result<bool, EvalError> {
        match self.0.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => match self.as_int() {
                Ok(n) => Ok(n != 0),
                Err(_) => Err(EvalError::Command {
                    message: format!("expected boolean value but got \"{}\"", self.0),
                    code: vec!["TCL".into(), "VALUE".into(), "BOOLEAN".into()],
                }),
            },
        }
    }

    /// Split the value into its list elements.
    ///
    /// Fails when the value is not a well-formed list, e.g. when a brace or
    /// quote is left open.
    pub fn as_list(&self) -> Result<Vec<Value>, EvalError> {
        parse_list(&self.0)
    }

    /// Build a list value whose elements read back exactly as `items`.
    pub fn from_list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: AsRef<str>,
    {
        let mut out = String::new();
        for item in items {
            if !out.is_empty() {
                out.push(' ');
            }
            quote_element(item.as_ref(), &mut out);
        }
        Self::new(out)
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self(Rc::from(s))
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self(Rc::from(s.as_str()))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::new(n.to_string())
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::new(n.to_string())
    }
}

impl AsRef<str> for Value {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn list_error(message: &str) -> EvalError {
    EvalError::NotAList(message.to_string())
}

fn is_list_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c')
}

fn parse_list(text: &str) -> Result<Vec<Value>, EvalError> {
    let mut elements = Vec::new();
    let bytes = text.as_bytes();
    let mut pos = 0;

    loop {
        while pos < text.len() && is_list_space(bytes[pos] as char) {
            pos += 1;
        }
        if pos >= text.len() {
            break;
        }

        let (element, next) = match bytes[pos] {
            b'{' => {
                let mut depth = 1;
                let start = pos + 1;
                let mut i = start;
                while i < text.len() && depth > 0 {
                    match bytes[i] {
                        b'\\' => i += 1,
                        b'{' => depth += 1,
                        b'}' => depth -= 1,
                        _ => {}
                    }
                    i += 1;
                }
                if depth > 0 {
                    return Err(list_error("unmatched open brace in list"));
                }
                (text[start..i - 1].to_string(), i)
            }
            b'"' => {
                let mut element = String::new();
                let mut i = pos + 1;
                loop {
                    let Some(c) = text[i..].chars().next() else {
                        return Err(list_error("unmatched open quote in list"));
                    };
                    if c == '"' {
                        i += 1;
                        break;
                    }
                    if c == '\\' {
                        let (replacement, used) = parser::backslash(&text[i + 1..]);
                        element.push_str(&replacement);
                        i += 1 + used;
                    } else {
                        element.push(c);
                        i += c.len_utf8();
                    }
                }
                (element, i)
            }
            _ => {
                let mut element = String::new();
                let mut i = pos;
                while let Some(c) = text[i..].chars().next() {
                    if is_list_space(c) {
                        break;
                    }
                    if c == '\\' {
                        let (replacement, used) = parser::backslash(&text[i + 1..]);
                        element.push_str(&replacement);
                        i += 1 + used;
                    } else {
                        element.push(c);
                        i += c.len_utf8();
                    }
                }
                (element, i)
            }
        };

        if let Some(c) = text[next..].chars().next() {
            if !is_list_space(c) {
                let kind = if bytes[pos] == b'{' { "braces" } else { "quotes" };
                return Err(list_error(&format!(
                    "list element in {} followed by \"{}\" instead of space",
                    kind, c
                )));
            }
        }

        elements.push(Value::from(element));
        pos = next;
    }

    Ok(elements)
}

fn braces_balanced(s: &str) -> bool {
    let mut depth = 0i32;
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && !escaped
}

fn quote_element(element: &str, out: &mut String) {
    if element.is_empty() {
        out.push_str("{}");
        return;
    }

    let needs_quoting = element.starts_with('#')
        || element.chars().any(|c| {
            is_list_space(c) || matches!(c, '{' | '}' | '"' | '\\' | '[' | ']' | '$' | ';')
        });
    if !needs_quoting {
        out.push_str(element);
        return;
    }

    if braces_balanced(element) && !element.ends_with('\\') {
        out.push('{');
        out.push_str(element);
        out.push('}');
        return;
    }

    for c in element.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '{' | '}' | '"' | '\\' | '[' | ']' | '$' | ';' | ' ' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[Value]) -> Vec<&str> {
        values.iter().map(|v| v.as_str()).collect()
    }

    #[test]
    fn test_plain_list_elements() {
        let list = Value::from("a  b\tc\n d").as_list().unwrap();
        assert_eq!(strings(&list), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_empty_list_has_no_elements() {
        assert!(Value::empty().as_list().unwrap().is_empty());
        assert!(Value::from("   ").as_list().unwrap().is_empty());
    }

    #[test]
    fn test_braced_and_quoted_elements() {
        let list = Value::from("{a b} \"c d\" {x {y z}}").as_list().unwrap();
        assert_eq!(strings(&list), vec!["a b", "c d", "x {y z}"]);
    }

    #[test]
    fn test_unbalanced_brace_is_not_a_list() {
        let err = Value::from("a {b c").as_list().unwrap_err();
        assert!(matches!(err, EvalError::NotAList(_)));
        assert_eq!(err.to_string(), "unmatched open brace in list");
    }

    #[test]
    fn test_garbage_after_close_brace() {
        let err = Value::from("{a}b").as_list().unwrap_err();
        assert!(err.to_string().contains("followed by \"b\""));
    }

    #[test]
    fn test_from_list_quotes_awkward_elements() {
        let items = ["plain", "", "with space", "open{", "#hash"];
        let list = Value::from_list(items);
        let back = list.as_list().unwrap();
        assert_eq!(strings(&back), items.to_vec());
    }

    #[test]
    fn test_as_int_and_bool() {
        assert_eq!(Value::from(" 42 ").as_int().unwrap(), 42);
        assert!(Value::from("4x").as_int().is_err());
        assert!(Value::from("yes").as_bool().unwrap());
        assert!(!Value::from("0").as_bool().unwrap());
        assert!(Value::from("maybe").as_bool().is_err());
    }
}
