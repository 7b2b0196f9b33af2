//! Drill-down constraint grammar.
//!
//! ```text
//! range := [int ("<" | "<=")] dimension [("<" | "<=") int]   (at least one bound)
//! exact := dimension "=" label
//! ```
//!
//! Input that is neither a range nor contains `=` is rejected.

use std::collections::BTreeMap;
use std::fmt;

use localdb_core::error::{IndexError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeBound {
    pub value: i64,
    pub inclusive: bool,
}

impl RangeBound {
    pub fn inclusive(value: i64) -> Self {
        Self { value, inclusive: true }
    }

    pub fn exclusive(value: i64) -> Self {
        Self { value, inclusive: false }
    }

    fn operator(self) -> &'static str {
        if self.inclusive { "<=" } else { "<" }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    Exact(String),
    Range { lower: Option<RangeBound>, upper: Option<RangeBound> },
}

/// Dimension -> constraint, one constraint per dimension.
pub type Drilldown = BTreeMap<String, Constraint>;

/// Render a constraint back into the grammar.
pub fn encode(dimension: &str, constraint: &Constraint) -> String {
    match constraint {
        Constraint::Exact(label) => format!("{dimension}={label}"),
        Constraint::Range { lower, upper } => {
            let mut out = String::new();
            if let Some(b) = lower {
                out.push_str(&b.value.to_string());
                out.push_str(b.operator());
            }
            out.push_str(dimension);
            if let Some(b) = upper {
                out.push_str(b.operator());
                out.push_str(&b.value.to_string());
            }
            out
        }
    }
}

/// `<base_path>/<urlencoded constraint>`
pub fn drilldown_link(base_path: &str, dimension: &str, constraint: &Constraint) -> String {
    format!("{}/{}", base_path, urlencoding::encode(&encode(dimension, constraint)))
}

pub fn parse(input: &str) -> Result<(String, Constraint)> {
    if let Some(parsed) = parse_range(input) {
        return Ok(parsed);
    }
    match input.split_once('=') {
        Some((dimension, label)) if !dimension.is_empty() => {
            Ok((dimension.to_string(), Constraint::Exact(label.to_string())))
        }
        _ => Err(IndexError::QueryPlanning(format!("unparsable drill-down constraint '{input}'"))),
    }
}

/// URL-decode a link segment, then parse it.
pub fn parse_link(segment: &str) -> Result<(String, Constraint)> {
    let decoded = urlencoding::decode(segment)
        .map_err(|e| IndexError::QueryPlanning(format!("invalid drill-down encoding '{segment}': {e}")))?;
    parse(&decoded)
}

pub fn add_to_map(input: &str, drilldown: &mut Drilldown) -> Result<()> {
    let (dimension, constraint) = parse(input)?;
    drilldown.insert(dimension, constraint);
    Ok(())
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn integer(&mut self) -> Option<i64> {
        let rest = self.rest();
        let sign = usize::from(rest.starts_with('-'));
        let digits = rest[sign..].bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return None;
        }
        let value = rest[..sign + digits].parse().ok()?;
        self.pos += sign + digits;
        Some(value)
    }

    fn operator(&mut self) -> Option<bool> {
        let rest = self.rest();
        if rest.starts_with("<=") {
            self.pos += 2;
            Some(true)
        } else if rest.starts_with('<') {
            self.pos += 1;
            Some(false)
        } else {
            None
        }
    }

    fn dimension(&mut self) -> Option<&'a str> {
        let rest = self.rest();
        let len = rest.find(['<', '=']).unwrap_or(rest.len());
        if len == 0 {
            return None;
        }
        self.pos += len;
        Some(&rest[..len])
    }
}

fn parse_lower(input: &str) -> Option<(RangeBound, usize)> {
    let mut cursor = Cursor { input, pos: 0 };
    let value = cursor.integer()?;
    let inclusive = cursor.operator()?;
    Some((RangeBound { value, inclusive }, cursor.pos))
}

fn parse_range(input: &str) -> Option<(String, Constraint)> {
    // A leading number only counts as a bound when an operator follows it,
    // otherwise it is part of the dimension name.
    let (lower, start) = match parse_lower(input) {
        Some((bound, pos)) => (Some(bound), pos),
        None => (None, 0),
    };
    let mut cursor = Cursor { input, pos: start };
    let dimension = cursor.dimension()?;

    let mut upper = None;
    if !cursor.at_end() {
        let inclusive = cursor.operator()?;
        let value = cursor.integer()?;
        upper = Some(RangeBound { value, inclusive });
    }
    if !cursor.at_end() || (lower.is_none() && upper.is_none()) {
        return None;
    }
    Some((dimension.to_string(), Constraint::Range { lower, upper }))
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Exact(label) => write!(f, "= {label}"),
            Constraint::Range { lower, upper } => {
                match lower {
                    Some(b) => write!(f, "{}{}", b.value, b.operator())?,
                    None => write!(f, "*")?,
                }
                write!(f, " .. ")?;
                match upper {
                    Some(b) => write!(f, "{}{}", b.operator(), b.value),
                    None => write!(f, "*"),
                }
            }
        }
    }
}
