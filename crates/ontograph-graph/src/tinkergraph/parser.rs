//! Parser for the Gremlin subset the embedded engine evaluates
//!
//! Query text is read into raw `name(args)` steps, then compiled into
//! typed [`Step`]s. Modulators (`by`, `from`, `to`) and the property
//! clauses that follow `addV`/`addE` are folded into the step they modify.

use serde_json::Value;

use super::lexer::{tokenize, Token};
use super::SyntaxError;
use crate::gremlin::Direction;

// ============================================================================
// Compiled steps
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    List,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKey {
    Id,
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyWrite {
    pub cardinality: Cardinality,
    pub key: PropertyKey,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Id,
    Label,
    Key,
    Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum By {
    Identity,
    Token(TokenKind),
    Traversal(Vec<Step>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    V(Vec<Value>),
    E(Vec<Value>),
    AddV {
        label: String,
        properties: Vec<PropertyWrite>,
    },
    AddE {
        label: String,
        from: Option<String>,
        to: Option<String>,
        properties: Vec<PropertyWrite>,
    },
    As(String),
    Has {
        key: String,
        value: Option<Value>,
    },
    HasLabel(Vec<String>),
    Property(PropertyWrite),
    Limit(usize),
    Drop,
    Count,
    ValueMap {
        tokens: bool,
        keys: Vec<String>,
        unfold: bool,
    },
    Values(Vec<String>),
    Properties(Vec<String>),
    Key,
    Value,
    Id,
    Label,
    Project {
        names: Vec<String>,
        by: Vec<By>,
    },
    Dedup,
    /// Run a nested traversal for its effects and pass the input through
    SideEffect(Vec<Step>),
    EdgesOf(Direction, Vec<String>),
    Adjacent(Direction, Vec<String>),
    OutV,
    InV,
    BothV,
    Unfold,
    Identity,
    Iterate,
    Commit,
    Rollback,
}

// ============================================================================
// Raw syntax
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Literal(Value),
    Token(String),
    Traversal(Vec<RawStep>),
}

#[derive(Debug, Clone, PartialEq)]
struct RawStep {
    name: String,
    args: Vec<Arg>,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Result<Token, SyntaxError> {
        let token = self.tokens.get(self.pos).cloned().ok_or(SyntaxError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token) -> Result<(), SyntaxError> {
        let token = self.next()?;
        if token == expected {
            Ok(())
        } else {
            Err(SyntaxError::UnexpectedToken(token.to_string()))
        }
    }

    fn ident(&mut self) -> Result<String, SyntaxError> {
        match self.next()? {
            Token::Ident(name) => Ok(name),
            other => Err(SyntaxError::UnexpectedToken(other.to_string())),
        }
    }

    fn query(&mut self) -> Result<Vec<RawStep>, SyntaxError> {
        let source = self.ident()?;
        if source != "g" {
            return Err(SyntaxError::Invalid(format!(
                "traversal must start from 'g', found '{source}'"
            )));
        }

        let mut steps = Vec::new();
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            steps.push(self.step()?);
        }
        if steps.is_empty() {
            return Err(SyntaxError::Invalid("empty traversal".to_string()));
        }

        if self.peek() == Some(&Token::Semicolon) {
            self.pos += 1;
        }
        match self.peek() {
            None => Ok(steps),
            Some(token) => Err(SyntaxError::UnexpectedToken(token.to_string())),
        }
    }

    fn step(&mut self) -> Result<RawStep, SyntaxError> {
        let name = self.ident()?;
        self.expect(Token::LParen)?;

        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(RawStep { name, args });
        }

        loop {
            args.push(self.arg()?);
            match self.next()? {
                Token::Comma => continue,
                Token::RParen => break,
                other => return Err(SyntaxError::UnexpectedToken(other.to_string())),
            }
        }
        Ok(RawStep { name, args })
    }

    fn arg(&mut self) -> Result<Arg, SyntaxError> {
        match self.next()? {
            Token::Str(s) => Ok(Arg::Literal(Value::String(s))),
            Token::Int(n) => Ok(Arg::Literal(Value::from(n))),
            Token::Float(n) => Ok(Arg::Literal(Value::from(n))),
            Token::Ident(name) => self.ident_arg(name),
            other => Err(SyntaxError::UnexpectedToken(other.to_string())),
        }
    }

    fn ident_arg(&mut self, mut name: String) -> Result<Arg, SyntaxError> {
        // Namespace prefixes such as T.id, __.unfold() or Cardinality.list
        while matches!(name.as_str(), "T" | "__" | "Cardinality" | "VertexProperty")
            && self.peek() == Some(&Token::Dot)
        {
            self.pos += 1;
            name = self.ident()?;
        }

        match name.as_str() {
            "true" => return Ok(Arg::Literal(Value::Bool(true))),
            "false" => return Ok(Arg::Literal(Value::Bool(false))),
            "null" => return Ok(Arg::Literal(Value::Null)),
            _ => {}
        }

        if self.peek() != Some(&Token::LParen) {
            return Ok(Arg::Token(name));
        }

        // Anonymous traversal: step(args)(.step(args))*
        self.pos -= 1;
        let mut steps = vec![self.step()?];
        while self.peek() == Some(&Token::Dot) && matches!(self.peek_at(1), Some(Token::Ident(_))) {
            self.pos += 1;
            steps.push(self.step()?);
        }
        Ok(Arg::Traversal(steps))
    }
}

// ============================================================================
// Compilation
// ============================================================================

/// Parse query text into executable steps
pub fn parse(query: &str) -> Result<Vec<Step>, SyntaxError> {
    let tokens = tokenize(query)?;
    let mut parser = Parser { tokens, pos: 0 };
    let raw = parser.query()?;
    compile(raw)
}

fn literal(arg: &Arg, step: &str) -> Result<Value, SyntaxError> {
    match arg {
        Arg::Literal(value) => Ok(value.clone()),
        _ => Err(SyntaxError::Invalid(format!("{step}() expects literal arguments"))),
    }
}

fn string(arg: &Arg, step: &str) -> Result<String, SyntaxError> {
    match arg {
        Arg::Literal(Value::String(s)) => Ok(s.clone()),
        _ => Err(SyntaxError::Invalid(format!("{step}() expects string arguments"))),
    }
}

fn strings(args: &[Arg], step: &str) -> Result<Vec<String>, SyntaxError> {
    args.iter().map(|a| string(a, step)).collect()
}

fn single_string(args: &[Arg], step: &str) -> Result<String, SyntaxError> {
    match args {
        [arg] => string(arg, step),
        _ => Err(SyntaxError::Invalid(format!("{step}() expects one argument"))),
    }
}

fn property_write(args: &[Arg], in_add_v: bool) -> Result<PropertyWrite, SyntaxError> {
    let (cardinality, rest) = match args.first() {
        Some(Arg::Token(t)) if t == "list" || t == "set" => (Cardinality::List, &args[1..]),
        Some(Arg::Token(t)) if t == "single" => (Cardinality::Single, &args[1..]),
        _ => (Cardinality::Single, args),
    };

    let [key, value] = rest else {
        return Err(SyntaxError::Invalid("property() expects a key and a value".to_string()));
    };

    let key = match key {
        Arg::Token(t) if t == "id" => PropertyKey::Id,
        Arg::Literal(Value::String(s)) if in_add_v && s == "id" => PropertyKey::Id,
        Arg::Literal(Value::String(s)) => PropertyKey::Name(s.clone()),
        _ => return Err(SyntaxError::Invalid("property() key must be a string".to_string())),
    };

    Ok(PropertyWrite {
        cardinality,
        key,
        value: literal(value, "property")?,
    })
}

fn by_modulator(step: &RawStep) -> Result<By, SyntaxError> {
    match step.args.as_slice() {
        [] => Ok(By::Identity),
        [Arg::Token(t)] => match t.as_str() {
            "id" => Ok(By::Token(TokenKind::Id)),
            "label" => Ok(By::Token(TokenKind::Label)),
            "key" => Ok(By::Token(TokenKind::Key)),
            "value" => Ok(By::Token(TokenKind::Value)),
            other => Err(SyntaxError::Invalid(format!("unsupported by() token '{other}'"))),
        },
        [Arg::Traversal(steps)] => Ok(By::Traversal(compile(steps.clone())?)),
        [Arg::Literal(Value::String(key))] => Ok(By::Traversal(vec![Step::Values(vec![key.clone()])])),
        _ => Err(SyntaxError::Invalid("unsupported by() modulator".to_string())),
    }
}

fn direction(name: &str) -> Option<Direction> {
    match name {
        "out" | "outE" => Some(Direction::Out),
        "in" | "inE" => Some(Direction::In),
        "both" | "bothE" => Some(Direction::Both),
        _ => None,
    }
}

fn compile(raw: Vec<RawStep>) -> Result<Vec<Step>, SyntaxError> {
    let mut steps = Vec::with_capacity(raw.len());
    let mut iter = raw.into_iter().peekable();

    while let Some(step) = iter.next() {
        let name = step.name.as_str();
        let args = step.args.as_slice();

        let compiled = match name {
            "V" => Step::V(args.iter().map(|a| literal(a, "V")).collect::<Result<_, _>>()?),
            "E" => Step::E(args.iter().map(|a| literal(a, "E")).collect::<Result<_, _>>()?),
            "addV" => {
                let label = match args {
                    [] => "vertex".to_string(),
                    _ => single_string(args, "addV")?,
                };
                let mut properties = Vec::new();
                while let Some(next) = iter.next_if(|s| s.name == "property") {
                    properties.push(property_write(&next.args, true)?);
                }
                Step::AddV { label, properties }
            }
            "addE" => {
                let label = single_string(args, "addE")?;
                let mut from = None;
                let mut to = None;
                let mut properties = Vec::new();
                while let Some(next) = iter.next_if(|s| matches!(s.name.as_str(), "from" | "to" | "property")) {
                    match next.name.as_str() {
                        "from" => from = Some(single_string(&next.args, "from")?),
                        "to" => to = Some(single_string(&next.args, "to")?),
                        _ => properties.push(property_write(&next.args, false)?),
                    }
                }
                Step::AddE {
                    label,
                    from,
                    to,
                    properties,
                }
            }
            "tx" => match iter.next() {
                Some(next) if next.name == "commit" => Step::Commit,
                Some(next) if next.name == "rollback" => Step::Rollback,
                _ => return Err(SyntaxError::Invalid("tx() must be followed by commit() or rollback()".to_string())),
            },
            "as" => Step::As(single_string(args, "as")?),
            "has" => match args {
                [key] => Step::Has {
                    key: string(key, "has")?,
                    value: None,
                },
                [key, value] => Step::Has {
                    key: string(key, "has")?,
                    value: Some(literal(value, "has")?),
                },
                [label, key, value] => {
                    steps.push(Step::HasLabel(vec![string(label, "has")?]));
                    Step::Has {
                        key: string(key, "has")?,
                        value: Some(literal(value, "has")?),
                    }
                }
                _ => return Err(SyntaxError::Invalid("has() expects 1 to 3 arguments".to_string())),
            },
            "hasLabel" => Step::HasLabel(strings(args, "hasLabel")?),
            "property" => Step::Property(property_write(args, false)?),
            "limit" => match args {
                [Arg::Literal(Value::Number(n))] => {
                    let n = n
                        .as_u64()
                        .ok_or_else(|| SyntaxError::Invalid("limit() expects a non-negative integer".to_string()))?;
                    Step::Limit(n as usize)
                }
                _ => return Err(SyntaxError::Invalid("limit() expects an integer".to_string())),
            },
            "drop" => Step::Drop,
            "count" => Step::Count,
            "valueMap" => {
                let (tokens, keys) = match args.first() {
                    Some(Arg::Literal(Value::Bool(b))) => (*b, &args[1..]),
                    _ => (false, args),
                };
                let keys = strings(keys, "valueMap")?;
                let mut unfold = false;
                if let Some(next) = iter.next_if(|s| s.name == "by") {
                    match by_modulator(&next)? {
                        By::Traversal(t) if t == vec![Step::Unfold] => unfold = true,
                        _ => return Err(SyntaxError::Invalid("valueMap() only supports by(unfold())".to_string())),
                    }
                }
                Step::ValueMap { tokens, keys, unfold }
            }
            "values" => Step::Values(strings(args, "values")?),
            "properties" => Step::Properties(strings(args, "properties")?),
            "key" => Step::Key,
            "value" => Step::Value,
            "id" => Step::Id,
            "label" => Step::Label,
            "project" => {
                let names = strings(args, "project")?;
                if names.is_empty() {
                    return Err(SyntaxError::Invalid("project() expects at least one key".to_string()));
                }
                let mut by = Vec::new();
                while let Some(next) = iter.next_if(|s| s.name == "by") {
                    by.push(by_modulator(&next)?);
                }
                Step::Project { names, by }
            }
            "dedup" => Step::Dedup,
            "sideEffect" => match args {
                [Arg::Traversal(nested)] => Step::SideEffect(compile(nested.clone())?),
                _ => return Err(SyntaxError::Invalid("sideEffect() expects a traversal".to_string())),
            },
            "outE" | "inE" | "bothE" => Step::EdgesOf(
                direction(name).unwrap_or(Direction::Both),
                strings(args, name)?,
            ),
            "out" | "in" | "both" => Step::Adjacent(
                direction(name).unwrap_or(Direction::Both),
                strings(args, name)?,
            ),
            "outV" => Step::OutV,
            "inV" => Step::InV,
            "bothV" => Step::BothV,
            "unfold" => Step::Unfold,
            "identity" => Step::Identity,
            "iterate" => Step::Iterate,
            "toList" | "next" => continue,
            "by" | "from" | "to" => {
                return Err(SyntaxError::Invalid(format!("{name}() is not attached to a step")))
            }
            other => return Err(SyntaxError::UnsupportedStep(other.to_string())),
        };
        steps.push(compiled);
    }

    Ok(steps)
}
