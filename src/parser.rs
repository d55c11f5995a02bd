//! Script parsing: turns script text into commands made of words.
//!
//! A script is a sequence of commands separated by newlines or semicolons.
//! Each command is a sequence of words separated by spaces or tabs. A word is
//! one of:
//!
//! - a bare word, in which `$var`, `[script]` and backslash substitutions apply;
//! - a `"quoted"` word, with the same substitutions but where whitespace and
//!   separators are literal;
//! - a `{braced}` word, taken literally (braces nest);
//!
//! and any of them may be prefixed with `{*}` to request list expansion.
//!
//! The parser only produces [`WordPart`] sequences; performing the
//! substitutions is the evaluation engine's job.

use thiserror::Error;

/// A part of a word, which can be literal text, a command substitution, or a
/// variable substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordPart {
    /// Literal text that requires no further processing.
    Literal(String),
    /// Command substitution `[...]`. Contains the script between the brackets.
    CmdSubst(String),
    /// Variable substitution `$name` or `${name}`. Contains the variable name.
    VarSubst(String),
}

/// One word of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub parts: Vec<WordPart>,
    /// Set for `{*}word`: the substituted value is spliced in as a list.
    pub expand: bool,
}

impl Word {
    /// The word's text when it contains no substitutions.
    pub fn as_literal(&self) -> Option<String> {
        let mut text = String::new();
        for part in &self.parts {
            match part {
                WordPart::Literal(s) => text.push_str(s),
                _ => return None,
            }
        }
        Some(text)
    }
}

/// One command of a script, with its location in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub words: Vec<Word>,
    /// Byte offset of the first character of the command.
    pub start: usize,
    /// Byte offset just past the last word (terminators excluded).
    pub end: usize,
}

/// What went wrong while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("missing close-brace")]
    UnfinishedBrace,
    #[error("missing \"")]
    UnfinishedQuote,
    #[error("missing close-bracket")]
    UnfinishedBracket,
    #[error("extra characters after close-brace")]
    ExtraAfterBrace,
    #[error("extra characters after close-quote")]
    ExtraAfterQuote,
}

/// A parse failure, located in the script.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// Start of the command being parsed when the error was found.
    pub command_start: usize,
    /// Offset of the offending character.
    pub offset: usize,
}

/// Incremental command parser over a script.
pub struct Parser<'a> {
    src: &'a str,
    pos: usize,
    /// Parsing the inside of `[...]`: a `]` ends the script.
    nested: bool,
    command_start: usize,
}

impl<'a> Parser<'a> {
    /// Creates a parser positioned at the start of `src`.
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            nested: false,
            command_start: 0,
        }
    }

    fn nested_at(src: &'a str, pos: usize) -> Self {
        Self {
            src,
            pos,
            nested: true,
            command_start: pos,
        }
    }

    /// Current byte offset into the script.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Parses the next command, or returns `None` at the end of the script.
    ///
    /// Commands made only of whitespace or a comment are skipped.
    pub fn next_command(&mut self) -> Result<Option<ParsedCommand>, ParseError> {
        loop {
            self.skip_command_separators();
            match self.peek_char() {
                None => return Ok(None),
                Some(']') if self.nested => return Ok(None),
                Some('#') => self.skip_comment(),
                Some(_) => break,
            }
        }

        let start = self.pos;
        self.command_start = start;
        let mut words = Vec::new();
        let mut end = start;

        loop {
            self.skip_word_separators();
            match self.peek_char() {
                None => break,
                Some('\n') | Some(';') => {
                    self.read_char();
                    break;
                }
                Some(']') if self.nested => break,
                Some(_) => {
                    words.push(self.parse_word()?);
                    end = self.pos;
                }
            }
        }

        Ok(Some(ParsedCommand { words, start, end }))
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            kind,
            command_start: self.command_start,
            offset: self.pos,
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.peek_char();
        if let Some(c) = ch {
            self.pos += c.len_utf8();
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn at_word_end(&self) -> bool {
        match self.peek_char() {
            None | Some(' ') | Some('\t') | Some('\n') | Some('\r') | Some(';') => true,
            Some(']') => self.nested,
            Some('\\') => self.peek_nth(1) == Some('\n'),
            _ => false,
        }
    }

    fn skip_word_separators(&mut self) {
        loop {
            match self.peek_char() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.read_char();
                }
                Some('\\') if self.peek_nth(1) == Some('\n') => {
                    let (_, used) = backslash(&self.src[self.pos + 1..]);
                    self.pos += 1 + used;
                }
                _ => return,
            }
        }
    }

    fn skip_command_separators(&mut self) {
        loop {
            self.skip_word_separators();
            match self.peek_char() {
                Some('\n') | Some(';') => {
                    self.read_char();
                }
                _ => return,
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.read_char() {
            match ch {
                '\\' => {
                    self.read_char();
                }
                '\n' => return,
                _ => {}
            }
        }
    }

    fn parse_word(&mut self) -> Result<Word, ParseError> {
        let mut expand = false;
        if self.rest().starts_with("{*}") {
            let after = self.src[self.pos + 3..].chars().next();
            let ends_word = match after {
                None | Some(' ') | Some('\t') | Some('\n') | Some('\r') | Some(';') => true,
                Some(']') => self.nested,
                _ => false,
            };
            if !ends_word {
                expand = true;
                self.pos += 3;
            }
        }

        let parts = match self.peek_char() {
            Some('{') => {
                let text = self.parse_braced()?;
                if !self.at_word_end() {
                    return Err(self.error(ParseErrorKind::ExtraAfterBrace));
                }
                vec![WordPart::Literal(text)]
            }
            Some('"') => {
                self.read_char();
                let parts = self.parse_parts(true)?;
                if !self.at_word_end() {
                    return Err(self.error(ParseErrorKind::ExtraAfterQuote));
                }
                parts
            }
            _ => self.parse_parts(false)?,
        };

        Ok(Word { parts, expand })
    }

    /// Reads a `{...}` group, returning its contents without the outer braces.
    fn parse_braced(&mut self) -> Result<String, ParseError> {
        self.read_char();
        let mut depth = 1;
        let mut text = String::new();
        loop {
            let Some(ch) = self.read_char() else {
                return Err(self.error(ParseErrorKind::UnfinishedBrace));
            };
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(text);
                    }
                }
                '\\' => {
                    if self.peek_char() == Some('\n') {
                        let (replacement, used) = backslash(self.rest());
                        text.push_str(&replacement);
                        self.pos += used;
                        continue;
                    }
                    text.push('\\');
                    match self.read_char() {
                        Some(escaped) => text.push(escaped),
                        None => return Err(self.error(ParseErrorKind::UnfinishedBrace)),
                    }
                    continue;
                }
                _ => {}
            }
            text.push(ch);
        }
    }

    /// Reads the parts of a bare word, or of a quoted word up to its close quote.
    fn parse_parts(&mut self, quoted: bool) -> Result<Vec<WordPart>, ParseError> {
        let mut parts = Vec::new();
        let mut buffer = String::new();

        loop {
            if !quoted && self.at_word_end() {
                break;
            }
            let Some(ch) = self.peek_char() else {
                if quoted {
                    return Err(self.error(ParseErrorKind::UnfinishedQuote));
                }
                break;
            };

            match ch {
                '"' if quoted => {
                    self.read_char();
                    break;
                }
                '\\' => {
                    let (replacement, used) = backslash(&self.src[self.pos + 1..]);
                    buffer.push_str(&replacement);
                    self.pos += 1 + used;
                }
                '$' => match self.parse_var_name()? {
                    Some(name) => {
                        Self::flush(&mut buffer, &mut parts);
                        parts.push(WordPart::VarSubst(name));
                    }
                    None => buffer.push('$'),
                },
                '[' => {
                    let script = self.parse_bracketed()?;
                    Self::flush(&mut buffer, &mut parts);
                    parts.push(WordPart::CmdSubst(script));
                }
                _ => {
                    self.read_char();
                    buffer.push(ch);
                }
            }
        }

        Self::flush(&mut buffer, &mut parts);
        if parts.is_empty() {
            parts.push(WordPart::Literal(String::new()));
        }
        Ok(parts)
    }

    fn flush(buffer: &mut String, parts: &mut Vec<WordPart>) {
        if !buffer.is_empty() {
            parts.push(WordPart::Literal(std::mem::take(buffer)));
        }
    }

    /// Reads a variable reference after `$`. Returns `None` (consuming only
    /// the `$`) when no valid name follows.
    fn parse_var_name(&mut self) -> Result<Option<String>, ParseError> {
        self.read_char();
        if self.peek_char() == Some('{') {
            self.read_char();
            let mut name = String::new();
            loop {
                match self.read_char() {
                    Some('}') => return Ok(Some(name)),
                    Some(c) => name.push(c),
                    None => return Err(self.error(ParseErrorKind::UnfinishedBrace)),
                }
            }
        }

        let mut name = String::new();
        loop {
            match self.peek_char() {
                Some(c) if c.is_alphanumeric() || c == '_' => {
                    self.read_char();
                    name.push(c);
                }
                Some(':') if self.peek_nth(1) == Some(':') => {
                    self.pos += 2;
                    name.push_str("::");
                    while self.peek_char() == Some(':') {
                        self.read_char();
                    }
                }
                _ => break,
            }
        }
        if name.is_empty() {
            Ok(None)
        } else {
            Ok(Some(name))
        }
    }

    /// Reads a `[...]` command substitution, returning the inner script.
    fn parse_bracketed(&mut self) -> Result<String, ParseError> {
        let open = self.pos;
        let mut inner = Parser::nested_at(self.src, open + 1);
        while inner.next_command()?.is_some() {}
        if inner.peek_char() != Some(']') {
            let mut err = inner.error(ParseErrorKind::UnfinishedBracket);
            err.command_start = self.command_start;
            return Err(err);
        }
        let script = self.src[open + 1..inner.pos].to_string();
        self.pos = inner.pos + 1;
        Ok(script)
    }
}

/// Parses a whole script into commands.
pub fn parse_script(src: &str) -> Result<Vec<ParsedCommand>, ParseError> {
    let mut parser = Parser::new(src);
    let mut commands = Vec::new();
    while let Some(command) = parser.next_command()? {
        if !command.words.is_empty() {
            commands.push(command);
        }
    }
    Ok(commands)
}

/// Performs backslash substitution.
///
/// `rest` is the text following a backslash. Returns the replacement text and
/// the number of bytes of `rest` it consumed.
pub fn backslash(rest: &str) -> (String, usize) {
    let mut chars = rest.chars();
    let Some(c) = chars.next() else {
        return ("\\".to_string(), 0);
    };
    let simple = match c {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        'a' => Some('\x07'),
        'b' => Some('\x08'),
        'f' => Some('\x0c'),
        'v' => Some('\x0b'),
        _ => None,
    };
    if let Some(replacement) = simple {
        return (replacement.to_string(), 1);
    }

    match c {
        '\n' => {
            let blanks = rest[1..]
                .chars()
                .take_while(|c| *c == ' ' || *c == '\t')
                .count();
            (" ".to_string(), 1 + blanks)
        }
        'u' | 'x' => {
            let max = if c == 'u' { 4 } else { 2 };
            let digits: String = rest[1..]
                .chars()
                .take(max)
                .take_while(|d| d.is_ascii_hexdigit())
                .collect();
            match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                Some(decoded) if !digits.is_empty() => (decoded.to_string(), 1 + digits.len()),
                _ => (c.to_string(), 1),
            }
        }
        other => (other.to_string(), other.len_utf8()),
    }
}
