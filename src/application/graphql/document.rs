//! Minimal executable-document parser.
//!
//! Only what the cache needs is resolved: the chosen operation's kind and its
//! selection tree, with arguments bound to variables, `@skip`/`@include`
//! applied and named fragments inlined.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::domain::selection::{FieldSelection, Selection};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("document has no operation")]
    NoOperation,
    #[error("operation `{0}` not found in document")]
    UnknownOperation(String),
    #[error("unknown fragment `{0}`")]
    UnknownFragment(String),
    #[error("fragment `{0}` spreads itself")]
    FragmentCycle(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOperation {
    pub kind: OperationKind,
    pub selections: Vec<Selection>,
}

/// Parse `source` and resolve the operation named `operation_name`, or the
/// first operation when no name is given.
pub fn parse_operation(
    source: &str,
    operation_name: Option<&str>,
    variables: Option<&Map<String, Value>>,
) -> Result<ParsedOperation, DocumentError> {
    let tokens = tokenize(source)?;
    let document = Parser::new(tokens).document()?;

    let operation = match operation_name {
        Some(name) => document
            .operations
            .iter()
            .find(|operation| operation.name.as_deref() == Some(name))
            .ok_or_else(|| DocumentError::UnknownOperation(name.to_string()))?,
        None => document
            .operations
            .first()
            .ok_or(DocumentError::NoOperation)?,
    };

    let mut bound = Map::new();
    for (name, default) in &operation.defaults {
        bound.insert(name.clone(), default.clone());
    }
    if let Some(variables) = variables {
        for (name, value) in variables {
            bound.insert(name.clone(), value.clone());
        }
    }

    let resolver = Resolver {
        fragments: &document.fragments,
        variables: &bound,
    };
    let mut active = HashSet::new();
    let selections = resolver.selections(&operation.selections, &mut active)?;
    Ok(ParsedOperation {
        kind: operation.kind,
        selections,
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Punct(char),
    Spread,
    Str(String),
    Number(String),
}

fn tokenize(source: &str) -> Result<Vec<Token>, DocumentError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        match c {
            '\u{feff}' | ',' => pos += 1,
            c if c.is_whitespace() => pos += 1,
            '#' => {
                while pos < chars.len() && chars[pos] != '\n' && chars[pos] != '\r' {
                    pos += 1;
                }
            }
            '!' | '$' | '&' | '(' | ')' | ':' | '=' | '@' | '[' | ']' | '{' | '|' | '}' => {
                tokens.push(Token::Punct(c));
                pos += 1;
            }
            '.' => {
                if chars.get(pos + 1) == Some(&'.') && chars.get(pos + 2) == Some(&'.') {
                    tokens.push(Token::Spread);
                    pos += 3;
                } else {
                    return Err(syntax(format!("unexpected `.` at {pos}")));
                }
            }
            '"' => {
                let (text, next) = if chars.get(pos + 1) == Some(&'"')
                    && chars.get(pos + 2) == Some(&'"')
                {
                    block_string(&chars, pos + 3)?
                } else {
                    string(&chars, pos + 1)?
                };
                tokens.push(Token::Str(text));
                pos = next;
            }
            c if c == '-' || c.is_ascii_digit() => {
                let start = pos;
                pos += 1;
                while pos < chars.len()
                    && (chars[pos].is_ascii_alphanumeric() || matches!(chars[pos], '.' | '+' | '-'))
                {
                    pos += 1;
                }
                tokens.push(Token::Number(chars[start..pos].iter().collect()));
            }
            c if c == '_' || c.is_ascii_alphabetic() => {
                let start = pos;
                while pos < chars.len() && (chars[pos] == '_' || chars[pos].is_ascii_alphanumeric())
                {
                    pos += 1;
                }
                tokens.push(Token::Name(chars[start..pos].iter().collect()));
            }
            other => return Err(syntax(format!("unexpected `{other}` at {pos}"))),
        }
    }

    Ok(tokens)
}

fn string(chars: &[char], mut pos: usize) -> Result<(String, usize), DocumentError> {
    let mut text = String::new();
    while let Some(&c) = chars.get(pos) {
        match c {
            '"' => return Ok((text, pos + 1)),
            '\\' => {
                let escaped = chars
                    .get(pos + 1)
                    .ok_or_else(|| syntax("unterminated string".to_string()))?;
                match escaped {
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    'r' => text.push('\r'),
                    'b' => text.push('\u{8}'),
                    'f' => text.push('\u{c}'),
                    'u' => {
                        let hex: String = chars
                            .get(pos + 2..pos + 6)
                            .unwrap_or_default()
                            .iter()
                            .collect();
                        let code = u32::from_str_radix(&hex, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| syntax(format!("bad unicode escape `{hex}`")))?;
                        text.push(code);
                        pos += 4;
                    }
                    other => text.push(*other),
                }
                pos += 2;
            }
            '\n' | '\r' => break,
            other => {
                text.push(other);
                pos += 1;
            }
        }
    }
    Err(syntax("unterminated string".to_string()))
}

fn block_string(chars: &[char], mut pos: usize) -> Result<(String, usize), DocumentError> {
    let mut raw = String::new();
    while pos < chars.len() {
        if chars[pos..].starts_with(&['"', '"', '"']) {
            return Ok((dedent(&raw), pos + 3));
        }
        if chars[pos..].starts_with(&['\\', '"', '"', '"']) {
            raw.push_str("\"\"\"");
            pos += 4;
            continue;
        }
        raw.push(chars[pos]);
        pos += 1;
    }
    Err(syntax("unterminated block string".to_string()))
}

fn dedent(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    let indent = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    let mut out: Vec<String> = lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            if index == 0 {
                line.to_string()
            } else {
                line.get(indent..).unwrap_or_default().to_string()
            }
        })
        .collect();
    while out.first().is_some_and(|line| line.trim().is_empty()) {
        out.remove(0);
    }
    while out.last().is_some_and(|line| line.trim().is_empty()) {
        out.pop();
    }
    out.join("\n")
}

fn syntax(message: String) -> DocumentError {
    DocumentError::Syntax(message)
}

#[derive(Debug, Clone)]
enum RawValue {
    Variable(String),
    Number(String),
    Str(String),
    Bool(bool),
    Null,
    Enum(String),
    List(Vec<RawValue>),
    Object(Vec<(String, RawValue)>),
}

#[derive(Debug, Clone)]
struct RawDirective {
    name: String,
    arguments: Vec<(String, RawValue)>,
}

#[derive(Debug, Clone)]
enum RawSelection {
    Field {
        alias: Option<String>,
        name: String,
        arguments: Vec<(String, RawValue)>,
        directives: Vec<RawDirective>,
        selections: Option<Vec<RawSelection>>,
    },
    Spread {
        name: String,
        directives: Vec<RawDirective>,
    },
    Inline {
        type_condition: Option<String>,
        directives: Vec<RawDirective>,
        selections: Vec<RawSelection>,
    },
}

struct RawOperation {
    kind: OperationKind,
    name: Option<String>,
    defaults: Vec<(String, Value)>,
    selections: Vec<RawSelection>,
}

struct RawFragment {
    type_condition: String,
    selections: Vec<RawSelection>,
}

struct RawDocument {
    operations: Vec<RawOperation>,
    fragments: HashMap<String, RawFragment>,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn at_punct(&self, c: char) -> bool {
        self.peek() == Some(&Token::Punct(c))
    }

    fn at_name(&self, name: &str) -> bool {
        matches!(self.peek(), Some(Token::Name(found)) if found == name)
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.at_punct(c) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect_punct(&mut self, c: char) -> Result<(), DocumentError> {
        if self.eat_punct(c) {
            return Ok(());
        }
        Err(self.unexpected(&format!("`{c}`")))
    }

    fn name(&mut self) -> Result<String, DocumentError> {
        if let Some(Token::Name(name)) = self.peek() {
            let name = name.clone();
            self.pos += 1;
            return Ok(name);
        }
        Err(self.unexpected("a name"))
    }

    fn unexpected(&self, wanted: &str) -> DocumentError {
        match self.peek() {
            Some(token) => syntax(format!("expected {wanted}, found {token:?}")),
            None => syntax(format!("expected {wanted}, found end of document")),
        }
    }

    fn document(&mut self) -> Result<RawDocument, DocumentError> {
        let mut operations = Vec::new();
        let mut fragments = HashMap::new();

        while self.peek().is_some() {
            if self.at_punct('{') {
                operations.push(RawOperation {
                    kind: OperationKind::Query,
                    name: None,
                    defaults: Vec::new(),
                    selections: self.selection_set()?,
                });
            } else if self.at_name("fragment") {
                self.pos += 1;
                let name = self.name()?;
                if !self.at_name("on") {
                    return Err(self.unexpected("`on`"));
                }
                self.pos += 1;
                let type_condition = self.name()?;
                self.directives()?;
                let selections = self.selection_set()?;
                fragments.insert(
                    name,
                    RawFragment {
                        type_condition,
                        selections,
                    },
                );
            } else {
                operations.push(self.operation()?);
            }
        }

        if operations.is_empty() {
            return Err(DocumentError::NoOperation);
        }
        Ok(RawDocument {
            operations,
            fragments,
        })
    }

    fn operation(&mut self) -> Result<RawOperation, DocumentError> {
        let kind = match self.name()?.as_str() {
            "query" => OperationKind::Query,
            "mutation" => OperationKind::Mutation,
            "subscription" => OperationKind::Subscription,
            other => return Err(syntax(format!("unknown definition `{other}`"))),
        };
        let name = if matches!(self.peek(), Some(Token::Name(_))) {
            Some(self.name()?)
        } else {
            None
        };
        let defaults = if self.at_punct('(') {
            self.variable_definitions()?
        } else {
            Vec::new()
        };
        self.directives()?;
        let selections = self.selection_set()?;
        Ok(RawOperation {
            kind,
            name,
            defaults,
            selections,
        })
    }

    fn variable_definitions(&mut self) -> Result<Vec<(String, Value)>, DocumentError> {
        self.expect_punct('(')?;
        let mut defaults = Vec::new();
        while !self.eat_punct(')') {
            self.expect_punct('$')?;
            let name = self.name()?;
            self.expect_punct(':')?;
            self.type_reference()?;
            if self.eat_punct('=') {
                let value = const_value(self.value()?)?;
                defaults.push((name, value));
            }
            self.directives()?;
        }
        Ok(defaults)
    }

    fn type_reference(&mut self) -> Result<(), DocumentError> {
        if self.eat_punct('[') {
            self.type_reference()?;
            self.expect_punct(']')?;
        } else {
            self.name()?;
        }
        self.eat_punct('!');
        Ok(())
    }

    fn selection_set(&mut self) -> Result<Vec<RawSelection>, DocumentError> {
        self.expect_punct('{')?;
        let mut selections = Vec::new();
        while !self.eat_punct('}') {
            selections.push(self.selection()?);
        }
        if selections.is_empty() {
            return Err(syntax("empty selection set".to_string()));
        }
        Ok(selections)
    }

    fn selection(&mut self) -> Result<RawSelection, DocumentError> {
        if self.peek() == Some(&Token::Spread) {
            self.pos += 1;
            if matches!(self.peek(), Some(Token::Name(name)) if name != "on") {
                let name = self.name()?;
                let directives = self.directives()?;
                return Ok(RawSelection::Spread { name, directives });
            }
            let type_condition = if self.at_name("on") {
                self.pos += 1;
                Some(self.name()?)
            } else {
                None
            };
            let directives = self.directives()?;
            let selections = self.selection_set()?;
            return Ok(RawSelection::Inline {
                type_condition,
                directives,
                selections,
            });
        }

        let first = self.name()?;
        let (alias, name) = if self.eat_punct(':') {
            (Some(first), self.name()?)
        } else {
            (None, first)
        };
        let arguments = if self.at_punct('(') {
            self.arguments()?
        } else {
            Vec::new()
        };
        let directives = self.directives()?;
        let selections = if self.at_punct('{') {
            Some(self.selection_set()?)
        } else {
            None
        };
        Ok(RawSelection::Field {
            alias,
            name,
            arguments,
            directives,
            selections,
        })
    }

    fn arguments(&mut self) -> Result<Vec<(String, RawValue)>, DocumentError> {
        self.expect_punct('(')?;
        let mut arguments = Vec::new();
        while !self.eat_punct(')') {
            let name = self.name()?;
            self.expect_punct(':')?;
            arguments.push((name, self.value()?));
        }
        Ok(arguments)
    }

    fn directives(&mut self) -> Result<Vec<RawDirective>, DocumentError> {
        let mut directives = Vec::new();
        while self.eat_punct('@') {
            let name = self.name()?;
            let arguments = if self.at_punct('(') {
                self.arguments()?
            } else {
                Vec::new()
            };
            directives.push(RawDirective { name, arguments });
        }
        Ok(directives)
    }

    fn value(&mut self) -> Result<RawValue, DocumentError> {
        match self.next() {
            Some(Token::Punct('$')) => Ok(RawValue::Variable(self.name()?)),
            Some(Token::Number(text)) => Ok(RawValue::Number(text)),
            Some(Token::Str(text)) => Ok(RawValue::Str(text)),
            Some(Token::Name(name)) => Ok(match name.as_str() {
                "true" => RawValue::Bool(true),
                "false" => RawValue::Bool(false),
                "null" => RawValue::Null,
                _ => RawValue::Enum(name),
            }),
            Some(Token::Punct('[')) => {
                let mut items = Vec::new();
                while !self.eat_punct(']') {
                    items.push(self.value()?);
                }
                Ok(RawValue::List(items))
            }
            Some(Token::Punct('{')) => {
                let mut fields = Vec::new();
                while !self.eat_punct('}') {
                    let name = self.name()?;
                    self.expect_punct(':')?;
                    fields.push((name, self.value()?));
                }
                Ok(RawValue::Object(fields))
            }
            Some(token) => Err(syntax(format!("expected a value, found {token:?}"))),
            None => Err(syntax("expected a value, found end of document".to_string())),
        }
    }
}

fn number(text: &str) -> Result<Value, DocumentError> {
    let invalid = || syntax(format!("invalid number `{text}`"));
    if text.contains(['.', 'e', 'E']) {
        let float: f64 = text.parse().map_err(|_| invalid())?;
        return Number::from_f64(float).map(Value::Number).ok_or_else(invalid);
    }
    let int: i64 = text.parse().map_err(|_| invalid())?;
    Ok(Value::from(int))
}

fn const_value(raw: RawValue) -> Result<Value, DocumentError> {
    let empty = Map::new();
    resolve_value(&raw, &empty)?.ok_or_else(|| syntax("variable in default value".to_string()))
}

/// `None` when the value is a variable that was never provided.
fn resolve_value(
    raw: &RawValue,
    variables: &Map<String, Value>,
) -> Result<Option<Value>, DocumentError> {
    Ok(Some(match raw {
        RawValue::Variable(name) => return Ok(variables.get(name).cloned()),
        RawValue::Number(text) => number(text)?,
        RawValue::Str(text) | RawValue::Enum(text) => Value::String(text.clone()),
        RawValue::Bool(flag) => Value::Bool(*flag),
        RawValue::Null => Value::Null,
        RawValue::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_value(item, variables)?.unwrap_or(Value::Null));
            }
            Value::Array(out)
        }
        RawValue::Object(fields) => {
            let mut out = Map::new();
            for (name, value) in fields {
                if let Some(value) = resolve_value(value, variables)? {
                    out.insert(name.clone(), value);
                }
            }
            Value::Object(out)
        }
    }))
}

struct Resolver<'a> {
    fragments: &'a HashMap<String, RawFragment>,
    variables: &'a Map<String, Value>,
}

impl<'a> Resolver<'a> {
    fn selections(
        &self,
        raw: &'a [RawSelection],
        active: &mut HashSet<&'a str>,
    ) -> Result<Vec<Selection>, DocumentError> {
        let mut out = Vec::with_capacity(raw.len());
        for selection in raw {
            match selection {
                RawSelection::Field {
                    alias,
                    name,
                    arguments,
                    directives,
                    selections,
                } => {
                    if !self.included(directives)? {
                        continue;
                    }
                    let mut field = FieldSelection::new(name.clone());
                    field.alias = alias.clone();
                    for (arg, value) in arguments {
                        if let Some(value) = resolve_value(value, self.variables)? {
                            field.arguments.insert(arg.clone(), value);
                        }
                    }
                    if let Some(inner) = selections {
                        field.selections = Some(self.selections(inner, active)?);
                    }
                    out.push(Selection::Field(field));
                }
                RawSelection::Inline {
                    type_condition,
                    directives,
                    selections,
                } => {
                    if !self.included(directives)? {
                        continue;
                    }
                    out.push(Selection::fragment(
                        type_condition.as_deref(),
                        self.selections(selections, active)?,
                    ));
                }
                RawSelection::Spread { name, directives } => {
                    if !self.included(directives)? {
                        continue;
                    }
                    out.push(self.spread(name, active)?);
                }
            }
        }
        Ok(out)
    }

    fn spread(
        &self,
        name: &'a str,
        active: &mut HashSet<&'a str>,
    ) -> Result<Selection, DocumentError> {
        let fragment = self
            .fragments
            .get(name)
            .ok_or_else(|| DocumentError::UnknownFragment(name.to_string()))?;
        if !active.insert(name) {
            return Err(DocumentError::FragmentCycle(name.to_string()));
        }
        let selections = self.selections(&fragment.selections, active)?;
        active.remove(name);
        Ok(Selection::fragment(
            Some(fragment.type_condition.as_str()),
            selections,
        ))
    }

    fn included(&self, directives: &[RawDirective]) -> Result<bool, DocumentError> {
        for directive in directives {
            let skip_when = match directive.name.as_str() {
                "skip" => true,
                "include" => false,
                _ => continue,
            };
            let condition = directive
                .arguments
                .iter()
                .find(|(name, _)| name == "if")
                .map(|(_, value)| resolve_value(value, self.variables))
                .transpose()?
                .flatten();
            if condition == Some(Value::Bool(skip_when)) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
