//! Storage key templates
//!
//! Key patterns such as `log-data/{year}/{month}/` are tokenized once, when
//! the pipeline is loaded, so an unknown placeholder is a configuration error
//! long before any task runs. Rendering is pure substitution from the
//! [`RunContext`].
//!
//! `{{` and `}}` produce literal braces.

use std::fmt;

use crate::context::RunContext;
use crate::error::{EtlError, Result};

/// Run context fields usable in a key pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `2018-11-01`
    Ds,
    /// `20181101`
    DsNodash,
    Year,
    /// Two digits
    Month,
    /// Two digits
    Day,
    /// Two digits
    Hour,
    /// RFC 3339 logical timestamp
    Ts,
    RunId,
    /// RFC 3339 start of the data interval
    IntervalStart,
    /// RFC 3339 end of the data interval (exclusive)
    IntervalEnd,
}

impl Placeholder {
    pub const ALL: [Placeholder; 10] = [
        Placeholder::Ds,
        Placeholder::DsNodash,
        Placeholder::Year,
        Placeholder::Month,
        Placeholder::Day,
        Placeholder::Hour,
        Placeholder::Ts,
        Placeholder::RunId,
        Placeholder::IntervalStart,
        Placeholder::IntervalEnd,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Placeholder::Ds => "ds",
            Placeholder::DsNodash => "ds_nodash",
            Placeholder::Year => "year",
            Placeholder::Month => "month",
            Placeholder::Day => "day",
            Placeholder::Hour => "hour",
            Placeholder::Ts => "ts",
            Placeholder::RunId => "run_id",
            Placeholder::IntervalStart => "interval_start",
            Placeholder::IntervalEnd => "interval_end",
        }
    }

    fn resolve(self, ctx: &RunContext) -> String {
        let date = ctx.logical_date();
        match self {
            Placeholder::Ds => date.format("%Y-%m-%d").to_string(),
            Placeholder::DsNodash => date.format("%Y%m%d").to_string(),
            Placeholder::Year => date.format("%Y").to_string(),
            Placeholder::Month => date.format("%m").to_string(),
            Placeholder::Day => date.format("%d").to_string(),
            Placeholder::Hour => date.format("%H").to_string(),
            Placeholder::Ts => date.to_rfc3339(),
            Placeholder::RunId => ctx.run_id().to_string(),
            Placeholder::IntervalStart => ctx.data_interval_start().to_rfc3339(),
            Placeholder::IntervalEnd => ctx.data_interval_end().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(String),
    Field(Placeholder),
}

/// A tokenized key pattern
#[derive(Debug, Clone, PartialEq)]
pub struct KeyTemplate {
    source: String,
    tokens: Vec<Token>,
}

impl KeyTemplate {
    pub fn parse(pattern: &str) -> Result<Self> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(EtlError::InvalidConfig {
                            reason: format!("unclosed '{{' in key pattern '{}'", pattern),
                        });
                    }
                    let field = Placeholder::from_name(name.trim()).ok_or_else(|| {
                        EtlError::UnknownPlaceholder {
                            placeholder: name.clone(),
                            pattern: pattern.to_string(),
                        }
                    })?;
                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    tokens.push(Token::Field(field));
                }
                '}' => {
                    return Err(EtlError::InvalidConfig {
                        reason: format!("unmatched '}}' in key pattern '{}'", pattern),
                    });
                }
                other => literal.push(other),
            }
        }

        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Self {
            source: pattern.to_string(),
            tokens,
        })
    }

    /// Substitute run context fields
    pub fn render(&self, ctx: &RunContext) -> String {
        let mut out = String::with_capacity(self.source.len() + 16);
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Field(field) => out.push_str(&field.resolve(ctx)),
            }
        }
        out
    }

}

impl fmt::Display for KeyTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
