//! LDAP 风格目标过滤器：`(&(objectClass=x)(rank>=3))`。
//! 键大小写不敏感；字面量按属性值类型转换后比较；数组任一元素命中即匹配。
use std::{cmp::Ordering, fmt, str::FromStr};

use crate::{
    error::{Result, ScrError},
    properties::{Properties, PropertyValue},
};

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equal { key: String, value: String },
    Approx { key: String, value: String },
    GreaterEq { key: String, value: String },
    LessEq { key: String, value: String },
    Present(String),
    /// `parts[0]` 为前缀，末项为后缀，中间项按序出现
    Substring { key: String, parts: Vec<String> },
}

/// 过滤器最大嵌套层数；超出即拒绝
pub const MAX_FILTER_DEPTH: usize = 64;

#[derive(Clone, Copy)]
enum Op {
    Eq,
    Approx,
    Ge,
    Le,
}

impl Filter {
    pub fn parse(text: &str) -> Result<Filter> {
        let mut p = Parser {
            src: text,
            chars: text.chars().collect(),
            pos: 0,
            depth: 0,
        };
        let f = p.filter()?;
        p.skip_ws();
        if p.pos != p.chars.len() {
            return Err(p.err("trailing characters"));
        }
        Ok(f)
    }

    pub fn matches(&self, props: &Properties) -> bool {
        match self {
            Filter::And(items) => items.iter().all(|f| f.matches(props)),
            Filter::Or(items) => items.iter().any(|f| f.matches(props)),
            Filter::Not(inner) => !inner.matches(props),
            Filter::Present(key) => props.get_ignore_case(key).is_some(),
            Filter::Equal { key, value } => lookup(props, key, |v| compare(v, Op::Eq, value)),
            Filter::Approx { key, value } => lookup(props, key, |v| compare(v, Op::Approx, value)),
            Filter::GreaterEq { key, value } => lookup(props, key, |v| compare(v, Op::Ge, value)),
            Filter::LessEq { key, value } => lookup(props, key, |v| compare(v, Op::Le, value)),
            Filter::Substring { key, parts } => lookup(props, key, |v| substring(v, parts)),
        }
    }
}

impl FromStr for Filter {
    type Err = ScrError;
    fn from_str(s: &str) -> Result<Self> {
        Filter::parse(s)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(items) => {
                f.write_str("(&")?;
                for i in items {
                    write!(f, "{i}")?;
                }
                f.write_str(")")
            }
            Filter::Or(items) => {
                f.write_str("(|")?;
                for i in items {
                    write!(f, "{i}")?;
                }
                f.write_str(")")
            }
            Filter::Not(inner) => write!(f, "(!{inner})"),
            Filter::Equal { key, value } => write!(f, "({key}={})", escape_value(value)),
            Filter::Approx { key, value } => write!(f, "({key}~={})", escape_value(value)),
            Filter::GreaterEq { key, value } => write!(f, "({key}>={})", escape_value(value)),
            Filter::LessEq { key, value } => write!(f, "({key}<={})", escape_value(value)),
            Filter::Present(key) => write!(f, "({key}=*)"),
            Filter::Substring { key, parts } => {
                write!(f, "({key}=")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str("*")?;
                    }
                    f.write_str(&escape_value(part))?;
                }
                f.write_str(")")
            }
        }
    }
}

pub fn escape_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '(' | ')' | '*' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn lookup(props: &Properties, key: &str, pred: impl Fn(&PropertyValue) -> bool) -> bool {
    match props.get_ignore_case(key) {
        Some(PropertyValue::Array(items)) => items.iter().any(&pred),
        Some(v) => pred(v),
        None => false,
    }
}

fn ordering_ok(op: Op, ord: Option<Ordering>) -> bool {
    match (op, ord) {
        (Op::Eq | Op::Approx, Some(Ordering::Equal)) => true,
        (Op::Ge, Some(Ordering::Greater | Ordering::Equal)) => true,
        (Op::Le, Some(Ordering::Less | Ordering::Equal)) => true,
        _ => false,
    }
}

fn compare(value: &PropertyValue, op: Op, literal: &str) -> bool {
    let lit = literal.trim();
    match value {
        PropertyValue::String(s) => match op {
            Op::Eq => s == literal,
            Op::Approx => normalize(s) == normalize(literal),
            Op::Ge => s.as_str() >= literal,
            Op::Le => s.as_str() <= literal,
        },
        PropertyValue::Boolean(b) => match (op, lit.to_ascii_lowercase().as_str()) {
            (Op::Eq | Op::Approx, "true") => *b,
            (Op::Eq | Op::Approx, "false") => !*b,
            _ => false,
        },
        PropertyValue::Char(c) => {
            let mut it = literal.chars();
            match (it.next(), it.next()) {
                (Some(l), None) => match op {
                    Op::Approx => c.to_lowercase().eq(l.to_lowercase()),
                    _ => ordering_ok(op, Some(c.cmp(&l))),
                },
                _ => false,
            }
        }
        PropertyValue::Byte(v) => lit.parse::<i8>().ok().is_some_and(|l| ordering_ok(op, Some(v.cmp(&l)))),
        PropertyValue::Short(v) => lit.parse::<i16>().ok().is_some_and(|l| ordering_ok(op, Some(v.cmp(&l)))),
        PropertyValue::Int(v) => lit.parse::<i32>().ok().is_some_and(|l| ordering_ok(op, Some(v.cmp(&l)))),
        PropertyValue::Long(v) => lit.parse::<i64>().ok().is_some_and(|l| ordering_ok(op, Some(v.cmp(&l)))),
        PropertyValue::Float(v) => lit.parse::<f32>().ok().is_some_and(|l| ordering_ok(op, v.partial_cmp(&l))),
        PropertyValue::Double(v) => lit.parse::<f64>().ok().is_some_and(|l| ordering_ok(op, v.partial_cmp(&l))),
        PropertyValue::Array(items) => items.iter().any(|i| compare(i, op, literal)),
    }
}

fn normalize(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).flat_map(char::to_lowercase).collect()
}

fn substring(value: &PropertyValue, parts: &[String]) -> bool {
    let PropertyValue::String(s) = value else {
        return false;
    };
    let Some((first, rest)) = parts.split_first() else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return s == first;
    };
    if !s.starts_with(first.as_str()) {
        return false;
    }
    let mut pos = first.len();
    for m in middle {
        match s[pos..].find(m.as_str()) {
            Some(i) => pos += i + m.len(),
            None => return false,
        }
    }
    s[pos..].ends_with(last.as_str())
}

struct Parser<'a> {
    src: &'a str,
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn err(&self, reason: &str) -> ScrError {
        ScrError::InvalidFilter {
            filter: self.src.to_string(),
            reason: format!("{reason} at offset {}", self.pos),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.err(&format!("expected '{c}'")))
        }
    }

    fn filter(&mut self) -> Result<Filter> {
        self.skip_ws();
        self.expect('(')?;
        if self.depth == MAX_FILTER_DEPTH {
            return Err(self.err(&format!("nesting deeper than {MAX_FILTER_DEPTH}")));
        }
        self.depth += 1;
        let f = self.composite();
        self.depth -= 1;
        f
    }

    fn composite(&mut self) -> Result<Filter> {
        self.skip_ws();
        let f = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Filter::And(self.list()?)
            }
            Some('|') => {
                self.pos += 1;
                Filter::Or(self.list()?)
            }
            Some('!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            _ => self.item()?,
        };
        self.skip_ws();
        self.expect(')')?;
        Ok(f)
    }

    fn list(&mut self) -> Result<Vec<Filter>> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('(') {
                items.push(self.filter()?);
            } else {
                break;
            }
        }
        if items.is_empty() {
            return Err(self.err("empty filter list"));
        }
        Ok(items)
    }

    fn item(&mut self) -> Result<Filter> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '~' | '<' | '>' | '(' | ')') {
                break;
            }
            self.pos += 1;
        }
        let key: String = self.chars[start..self.pos].iter().collect::<String>().trim().to_string();
        if key.is_empty() {
            return Err(self.err("missing attribute"));
        }
        let op = match self.peek() {
            Some('=') => {
                self.pos += 1;
                Op::Eq
            }
            Some(c @ ('~' | '<' | '>')) => {
                self.pos += 1;
                self.expect('=')?;
                match c {
                    '~' => Op::Approx,
                    '<' => Op::Le,
                    _ => Op::Ge,
                }
            }
            _ => return Err(self.err("expected operator")),
        };
        let parts = self.value()?;
        Ok(match op {
            Op::Eq if parts.len() == 1 => Filter::Equal {
                key,
                value: parts.into_iter().next().unwrap_or_default(),
            },
            Op::Eq if parts.len() == 2 && parts.iter().all(String::is_empty) => Filter::Present(key),
            Op::Eq => Filter::Substring { key, parts },
            // 非等号运算符中的 * 视为字面量
            Op::Approx => Filter::Approx { key, value: parts.join("*") },
            Op::Ge => Filter::GreaterEq { key, value: parts.join("*") },
            Op::Le => Filter::LessEq { key, value: parts.join("*") },
        })
    }

    fn value(&mut self) -> Result<Vec<String>> {
        let mut parts = vec![String::new()];
        loop {
            match self.peek() {
                None => return Err(self.err("unterminated value")),
                Some(')') => break,
                Some('(') => return Err(self.err("unescaped '(' in value")),
                Some('\\') => {
                    self.pos += 1;
                    let Some(c) = self.peek() else {
                        return Err(self.err("dangling escape"));
                    };
                    self.pos += 1;
                    if let Some(last) = parts.last_mut() {
                        last.push(c);
                    }
                }
                Some('*') => {
                    self.pos += 1;
                    parts.push(String::new());
                }
                Some(c) => {
                    self.pos += 1;
                    if let Some(last) = parts.last_mut() {
                        last.push(c);
                    }
                }
            }
        }
        Ok(parts)
    }
}

/// 可能含 `${key}` 占位符的目标过滤器文本
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterTemplate(String);

impl FilterTemplate {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn raw(&self) -> &str {
        &self.0
    }

    pub fn is_parameterized(&self) -> bool {
        self.0.contains("${")
    }

    pub fn render(&self, props: &Properties) -> Result<Filter> {
        if !self.is_parameterized() {
            return Filter::parse(&self.0);
        }
        let mut out = String::with_capacity(self.0.len());
        let mut rest = self.0.as_str();
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                return Err(ScrError::InvalidFilter {
                    filter: self.0.clone(),
                    reason: "unterminated placeholder".into(),
                });
            };
            let key = &after[..end];
            let Some(value) = props.get(key) else {
                return Err(ScrError::InvalidFilter {
                    filter: self.0.clone(),
                    reason: format!("no property {key} for placeholder"),
                });
            };
            out.push_str(&escape_value(&value.to_string()));
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Filter::parse(&out)
    }
}
