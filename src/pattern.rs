//! Glob patterns (`*`, `?`, `[chars]`, `\x`) as used by `info commands`.

use crate::error::EvalError;
use regex::{Regex, RegexBuilder};

/// Compile a glob pattern into an anchored regular expression.
pub fn compile(glob: &str) -> Result<Regex, EvalError> {
    let mut re = String::with_capacity(glob.len() + 8);
    re.push('^');
    let mut chars = glob.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => re.push_str(&regex::escape(&escaped.to_string())),
                None => re.push_str(r"\\"),
            },
            '[' => {
                re.push('[');
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == ']' {
                        closed = true;
                        break;
                    }
                    if inner == '\\' || inner == '[' || inner == '^' {
                        re.push('\\');
                    }
                    re.push(inner);
                }
                if !closed {
                    return Err(EvalError::msg(format!(
                        "unmatched bracket in pattern \"{}\"",
                        glob
                    )));
                }
                re.push(']');
            }
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    RegexBuilder::new(&re)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| EvalError::msg(format!("bad pattern \"{}\": {}", glob, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcards() {
        let re = compile("a*z").unwrap();
        assert!(re.is_match("az"));
        assert!(re.is_match("abcz"));
        assert!(!re.is_match("abc"));
        assert!(compile("f?o").unwrap().is_match("foo"));
        assert!(!compile("f?o").unwrap().is_match("fo"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let re = compile("a.b+").unwrap();
        assert!(re.is_match("a.b+"));
        assert!(!re.is_match("axbb"));
    }

    #[test]
    fn test_bracket_sets() {
        let re = compile("[a-c]x").unwrap();
        assert!(re.is_match("bx"));
        assert!(!re.is_match("dx"));
        assert!(compile("[ab").is_err());
        assert!(compile(r"\*").unwrap().is_match("*"));
    }
}
