//! Printable-term wire codec.
//!
//! The `erl` wire format carries request bodies and responses as terms in
//! their canonical printable form: atoms, integers, double-quoted strings,
//! `{...}` tuples, and `[...]` lists. Service configurations travel as
//! property lists of two-element tuples.

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use serde_json::Value;

use crate::core::service::{CommandSpec, ServiceConfig, ServiceKind, ServiceSpec};

/// Errors raised while parsing or interpreting a term.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TermError {
    /// Input ended in the middle of a term.
    #[error("unexpected end of input")]
    UnexpectedEnd,

    /// An unexpected character at the given byte offset.
    #[error("unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),

    /// Valid term syntax that does not describe a service configuration.
    #[error("invalid configuration term: {0}")]
    InvalidConfig(String),
}

/// A parsed term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Atom(String),
    Int(i64),
    Str(String),
    List(Vec<Term>),
    Tuple(Vec<Term>),
}

impl Term {
    /// Shorthand for a two-element tuple.
    pub fn pair(left: Term, right: Term) -> Term {
        Term::Tuple(vec![left, right])
    }

    /// Shorthand for an atom.
    pub fn atom(name: &str) -> Term {
        Term::Atom(name.to_string())
    }
}

fn is_bare_atom(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '@')
}

fn escape_into(f: &mut fmt::Formatter<'_>, text: &str, quote: char) -> fmt::Result {
    write!(f, "{}", quote)?;
    for c in text.chars() {
        match c {
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            c if c == quote => write!(f, "\\{}", quote)?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "{}", quote)
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Atom(name) if is_bare_atom(name) => write!(f, "{}", name),
            Term::Atom(name) => escape_into(f, name, '\''),
            Term::Int(value) => write!(f, "{}", value),
            Term::Str(text) => escape_into(f, text, '"'),
            Term::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Term::Tuple(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "}}")
            }
        }
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn skip_ws(&mut self) {
        while self
            .input
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Result<u8, TermError> {
        let b = self.peek().ok_or(TermError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(b)
    }

    fn expect(&mut self, expected: u8) -> Result<(), TermError> {
        let b = self.bump()?;
        if b == expected {
            Ok(())
        } else {
            Err(TermError::UnexpectedChar(b as char, self.pos - 1))
        }
    }

    fn parse_term(&mut self) -> Result<Term, TermError> {
        self.skip_ws();
        match self.peek().ok_or(TermError::UnexpectedEnd)? {
            b'{' => self.parse_sequence(b'{', b'}').map(Term::Tuple),
            b'[' => self.parse_sequence(b'[', b']').map(Term::List),
            b'"' => self.parse_quoted('"').map(Term::Str),
            b'\'' => self.parse_quoted('\'').map(Term::Atom),
            b'-' => self.parse_int(),
            b if b.is_ascii_digit() => self.parse_int(),
            b if b.is_ascii_lowercase() => self.parse_bare_atom(),
            b => Err(TermError::UnexpectedChar(b as char, self.pos)),
        }
    }

    fn parse_sequence(&mut self, open: u8, close: u8) -> Result<Vec<Term>, TermError> {
        self.expect(open)?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(close) {
            self.pos += 1;
            return Ok(items);
        }
        loop {
            items.push(self.parse_term()?);
            self.skip_ws();
            match self.bump()? {
                b',' => continue,
                b if b == close => return Ok(items),
                b => return Err(TermError::UnexpectedChar(b as char, self.pos - 1)),
            }
        }
    }

    fn parse_quoted(&mut self, quote: char) -> Result<String, TermError> {
        self.expect(quote as u8)?;
        let mut text = String::new();
        loop {
            match self.bump()? {
                b'\\' => match self.bump()? {
                    b'n' => text.push('\n'),
                    b't' => text.push('\t'),
                    b => text.push(b as char),
                },
                b if b as char == quote => return Ok(text),
                b => text.push(b as char),
            }
        }
    }

    fn parse_int(&mut self) -> Result<Term, TermError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| TermError::UnexpectedChar('?', start))?;
        text.parse::<i64>()
            .map(Term::Int)
            .map_err(|_| TermError::UnexpectedChar('-', start))
    }

    fn parse_bare_atom(&mut self) -> Result<Term, TermError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'@')
        {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| TermError::UnexpectedChar('?', start))?;
        Ok(Term::Atom(text.to_string()))
    }
}

/// Parse one term. A trailing full stop is tolerated; trailing garbage is
/// not.
pub fn parse(input: &str) -> Result<Term, TermError> {
    let mut parser = Parser::new(input);
    let term = parser.parse_term()?;
    parser.skip_ws();
    if parser.peek() == Some(b'.') {
        parser.pos += 1;
        parser.skip_ws();
    }
    match parser.peek() {
        None => Ok(term),
        Some(b) => Err(TermError::UnexpectedChar(b as char, parser.pos)),
    }
}

// ---- Configuration mapping ----

fn json_to_term(value: &Value) -> Term {
    match value {
        Value::Null => Term::atom("undefined"),
        Value::Bool(true) => Term::atom("true"),
        Value::Bool(false) => Term::atom("false"),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Term::Int(i),
            None => Term::Str(n.to_string()),
        },
        Value::String(s) => Term::Str(s.clone()),
        Value::Array(items) => Term::List(items.iter().map(json_to_term).collect()),
        Value::Object(map) => Term::List(
            map.iter()
                .map(|(k, v)| Term::pair(Term::Str(k.clone()), json_to_term(v)))
                .collect(),
        ),
    }
}

fn term_to_json(term: &Term) -> Value {
    match term {
        Term::Atom(a) if a == "true" => Value::Bool(true),
        Term::Atom(a) if a == "false" => Value::Bool(false),
        Term::Atom(a) if a == "undefined" => Value::Null,
        Term::Atom(a) => Value::String(a.clone()),
        Term::Int(i) => Value::from(*i),
        Term::Str(s) => Value::String(s.clone()),
        Term::List(items) => Value::Array(items.iter().map(term_to_json).collect()),
        Term::Tuple(items) => Value::Array(items.iter().map(term_to_json).collect()),
    }
}

/// Render one configuration as a property list.
pub fn config_to_term(config: &ServiceConfig) -> Term {
    let kind = match config.kind {
        ServiceKind::Internal => "internal",
        ServiceKind::External => "external",
    };
    let mut pairs = vec![Term::pair(Term::atom("kind"), Term::atom(kind))];
    match &config.spec {
        ServiceSpec::Command(spec) => {
            pairs.push(Term::pair(
                Term::atom("program"),
                Term::Str(spec.program.clone()),
            ));
            if !spec.args.is_empty() {
                pairs.push(Term::pair(
                    Term::atom("args"),
                    Term::List(spec.args.iter().map(|a| Term::Str(a.clone())).collect()),
                ));
            }
            if !spec.env.is_empty() {
                let mut env: Vec<_> = spec.env.iter().collect();
                env.sort();
                pairs.push(Term::pair(
                    Term::atom("env"),
                    Term::List(
                        env.into_iter()
                            .map(|(k, v)| Term::pair(Term::Str(k.clone()), Term::Str(v.clone())))
                            .collect(),
                    ),
                ));
            }
            if let Some(ms) = spec.timeout_init_ms {
                pairs.push(Term::pair(Term::atom("timeout_init"), Term::Int(ms as i64)));
            }
            if let Some(ms) = spec.timeout_terminate_ms {
                pairs.push(Term::pair(
                    Term::atom("timeout_terminate"),
                    Term::Int(ms as i64),
                ));
            }
        }
        ServiceSpec::Params(params) => {
            for (key, value) in params {
                let key_term = if is_bare_atom(key) {
                    Term::atom(key)
                } else {
                    Term::Str(key.clone())
                };
                pairs.push(Term::pair(key_term, json_to_term(value)));
            }
        }
    }
    Term::List(pairs)
}

fn pair_key(term: &Term) -> Option<(String, &Term)> {
    match term {
        Term::Tuple(items) if items.len() == 2 => {
            let key = match &items[0] {
                Term::Atom(a) => a.clone(),
                Term::Str(s) => s.clone(),
                _ => return None,
            };
            Some((key, &items[1]))
        }
        _ => None,
    }
}

fn text_of(term: &Term) -> Option<String> {
    match term {
        Term::Str(s) => Some(s.clone()),
        Term::Atom(a) => Some(a.clone()),
        _ => None,
    }
}

/// Interpret a property list as one configuration.
pub fn term_to_config(term: &Term) -> Result<ServiceConfig, TermError> {
    let Term::List(items) = term else {
        return Err(TermError::InvalidConfig(format!(
            "expected a property list, got {}",
            term
        )));
    };

    let mut kind = ServiceKind::default();
    let mut pairs: Vec<(String, &Term)> = Vec::new();
    for item in items {
        let (key, value) = pair_key(item).ok_or_else(|| {
            TermError::InvalidConfig(format!("expected a key-value tuple, got {}", item))
        })?;
        if key == "kind" {
            kind = match text_of(value).as_deref() {
                Some("internal") => ServiceKind::Internal,
                Some("external") => ServiceKind::External,
                _ => {
                    return Err(TermError::InvalidConfig(format!(
                        "unknown service kind: {}",
                        value
                    )))
                }
            };
        } else {
            pairs.push((key, value));
        }
    }

    let has_program = pairs.iter().any(|(key, _)| key == "program");
    let spec = if has_program {
        let mut spec = CommandSpec::new(String::new());
        for (key, value) in &pairs {
            match key.as_str() {
                "program" => {
                    spec.program = text_of(value).ok_or_else(|| {
                        TermError::InvalidConfig("program must be textual".to_string())
                    })?;
                }
                "args" => {
                    let Term::List(args) = value else {
                        return Err(TermError::InvalidConfig("args must be a list".to_string()));
                    };
                    spec.args = args
                        .iter()
                        .map(|a| {
                            text_of(a).ok_or_else(|| {
                                TermError::InvalidConfig("args must be textual".to_string())
                            })
                        })
                        .collect::<Result<_, _>>()?;
                }
                "env" => {
                    let Term::List(env) = value else {
                        return Err(TermError::InvalidConfig("env must be a list".to_string()));
                    };
                    let mut map = HashMap::new();
                    for item in env {
                        let (k, v) = pair_key(item).ok_or_else(|| {
                            TermError::InvalidConfig("env entries must be pairs".to_string())
                        })?;
                        let v = text_of(v).ok_or_else(|| {
                            TermError::InvalidConfig("env values must be textual".to_string())
                        })?;
                        map.insert(k, v);
                    }
                    spec.env = map;
                }
                "timeout_init" => {
                    if let Term::Int(ms) = value {
                        spec.timeout_init_ms = Some(*ms as u64);
                    }
                }
                "timeout_terminate" => {
                    if let Term::Int(ms) = value {
                        spec.timeout_terminate_ms = Some(*ms as u64);
                    }
                }
                other => {
                    return Err(TermError::InvalidConfig(format!(
                        "unknown command key: {}",
                        other
                    )))
                }
            }
        }
        ServiceSpec::Command(spec)
    } else {
        ServiceSpec::Params(
            pairs
                .into_iter()
                .map(|(key, value)| (key, term_to_json(value)))
                .collect(),
        )
    };

    Ok(ServiceConfig::new(spec).with_kind(kind))
}

/// Parse a request body: a list of configuration property lists.
pub fn parse_configs(body: &str) -> Result<Vec<ServiceConfig>, TermError> {
    let term = parse(body)?;
    let Term::List(items) = term else {
        return Err(TermError::InvalidConfig(
            "expected a list of configurations".to_string(),
        ));
    };
    items.iter().map(term_to_config).collect()
}

/// Render a list of configurations.
pub fn configs_to_term(configs: &[ServiceConfig]) -> Term {
    Term::List(configs.iter().map(config_to_term).collect())
}
