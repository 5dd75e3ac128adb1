//! Argument declarations and the quote-aware parser behind them.

use std::collections::HashMap;
use std::str::FromStr;

use serenity::all::{ChannelId, RoleId, UserId};

use crate::error::{CommandResult, Failure};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Required,
    Optional,
    /// Optional integer; a token that is not a number is left for the next argument.
    OptionalInt,
    /// Everything left, verbatim. May be empty.
    Rest,
    /// Everything left, verbatim. Must not be empty.
    RestRequired,
    /// Every remaining token.
    Variadic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
}

impl ArgSpec {
    pub const fn required(name: &'static str) -> Self {
        Self { name, kind: ArgKind::Required }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self { name, kind: ArgKind::Optional }
    }

    pub const fn optional_int(name: &'static str) -> Self {
        Self { name, kind: ArgKind::OptionalInt }
    }

    pub const fn rest(name: &'static str) -> Self {
        Self { name, kind: ArgKind::Rest }
    }

    pub const fn rest_required(name: &'static str) -> Self {
        Self { name, kind: ArgKind::RestRequired }
    }

    pub const fn variadic(name: &'static str) -> Self {
        Self { name, kind: ArgKind::Variadic }
    }

    fn usage(&self) -> String {
        match self.kind {
            ArgKind::Required => format!("<{}>", self.name),
            ArgKind::Optional | ArgKind::OptionalInt => format!("[{}]", self.name),
            ArgKind::RestRequired => format!("<{}...>", self.name),
            ArgKind::Rest | ArgKind::Variadic => format!("[{}...]", self.name),
        }
    }
}

/// Usage line such as `<member> [reason...]`.
pub fn signature(specs: &[ArgSpec]) -> String {
    specs
        .iter()
        .map(ArgSpec::usage)
        .collect::<Vec<_>>()
        .join(" ")
}

struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.input[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn next_token(&mut self) -> CommandResult<Option<String>> {
        self.skip_whitespace();
        let rest = &self.input[self.pos..];
        if rest.is_empty() {
            return Ok(None);
        }

        if let Some(quoted) = rest.strip_prefix('"') {
            let Some(end) = quoted.find('"') else {
                return Err(Failure::bad_argument("Expected closing \"."));
            };
            self.pos += end + 2;
            return Ok(Some(quoted[..end].to_string()));
        }

        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        self.pos += end;
        Ok(Some(rest[..end].to_string()))
    }

    fn peek_token(&self) -> CommandResult<Option<String>> {
        let mut probe = Tokenizer {
            input: self.input,
            pos: self.pos,
        };
        probe.next_token()
    }

    fn remainder(&mut self) -> &'a str {
        self.skip_whitespace();
        let rest = self.input[self.pos..].trim_end();
        self.pos = self.input.len();
        rest
    }
}

/// Splits on whitespace, keeping `"quoted phrases"` together.
pub fn split_words(input: &str) -> CommandResult<Vec<String>> {
    let mut tokenizer = Tokenizer::new(input);
    let mut words = Vec::new();
    while let Some(word) = tokenizer.next_token()? {
        words.push(word);
    }
    Ok(words)
}

/// Parsed arguments keyed by their declared names.
#[derive(Debug, Clone, Default)]
pub struct Args {
    values: HashMap<&'static str, Vec<String>>,
}

impl Args {
    pub fn parse(specs: &[ArgSpec], input: &str) -> CommandResult<Self> {
        let mut tokenizer = Tokenizer::new(input);
        let mut values = HashMap::new();

        for spec in specs {
            match spec.kind {
                ArgKind::Required => match tokenizer.next_token()? {
                    Some(token) => {
                        values.insert(spec.name, vec![token]);
                    }
                    None => return Err(Failure::MissingArgument(spec.name.to_string())),
                },
                ArgKind::Optional => {
                    if let Some(token) = tokenizer.next_token()? {
                        values.insert(spec.name, vec![token]);
                    }
                }
                ArgKind::OptionalInt => {
                    let numeric = tokenizer
                        .peek_token()?
                        .filter(|t| t.parse::<i64>().is_ok());
                    if let Some(token) = numeric {
                        tokenizer.next_token()?;
                        values.insert(spec.name, vec![token]);
                    }
                }
                ArgKind::Rest | ArgKind::RestRequired => {
                    let rest = tokenizer.remainder();
                    if rest.is_empty() {
                        if spec.kind == ArgKind::RestRequired {
                            return Err(Failure::MissingArgument(spec.name.to_string()));
                        }
                    } else {
                        values.insert(spec.name, vec![rest.to_string()]);
                    }
                }
                ArgKind::Variadic => {
                    let mut items = Vec::new();
                    while let Some(token) = tokenizer.next_token()? {
                        items.push(token);
                    }
                    values.insert(spec.name, items);
                }
            }
        }

        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn require(&self, name: &str) -> CommandResult<&str> {
        self.get(name)
            .ok_or_else(|| Failure::MissingArgument(name.to_string()))
    }

    pub fn all(&self, name: &str) -> &[String] {
        self.values.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Converts an argument, failing with the usual conversion message.
    pub fn parse_as<T: FromStr>(&self, name: &str) -> CommandResult<Option<T>> {
        match self.get(name) {
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                Failure::bad_argument(format!(
                    "Converting to \"{}\" failed for parameter \"{}\".",
                    std::any::type_name::<T>().rsplit("::").next().unwrap_or("value"),
                    name
                ))
            }),
            None => Ok(None),
        }
    }
}

fn parse_snowflake(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok().filter(|id| *id != 0)
}

/// Accepts `<@id>`, `<@!id>` or a bare id.
pub fn parse_user_mention(raw: &str) -> Option<UserId> {
    let inner = raw
        .strip_prefix("<@")
        .and_then(|s| s.strip_suffix('>'))
        .map(|s| s.strip_prefix('!').unwrap_or(s))
        .unwrap_or(raw);
    parse_snowflake(inner).map(UserId::new)
}

/// Accepts `<#id>` or a bare id.
pub fn parse_channel_mention(raw: &str) -> Option<ChannelId> {
    let inner = raw
        .strip_prefix("<#")
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(raw);
    parse_snowflake(inner).map(ChannelId::new)
}

/// Accepts `<@&id>` or a bare id.
pub fn parse_role_mention(raw: &str) -> Option<RoleId> {
    let inner = raw
        .strip_prefix("<@&")
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(raw);
    parse_snowflake(inner).map(RoleId::new)
}
