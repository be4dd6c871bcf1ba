//! Replacement rules and the per-copy values they produce.

use std::collections::HashSet;
use std::sync::Arc;

use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Serial,
    Random,
    Custom,
}

/// One fill-in rule. Absent and `null` fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacementRule {
    #[serde(default)]
    pub section_id: Option<String>,
    pub original_text: String,
    #[serde(rename = "type")]
    pub kind: RuleKind,
    #[serde(default)]
    pub start_value: Option<i64>,
    #[serde(default)]
    pub random_min: Option<i64>,
    #[serde(default)]
    pub random_max: Option<i64>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    /// printf-style numeric template such as `%04d`.
    #[serde(default)]
    pub format: Option<String>,
}

impl ReplacementRule {
    pub fn serial(original_text: &str, start_value: i64) -> Self {
        Self {
            section_id: None,
            original_text: original_text.to_string(),
            kind: RuleKind::Serial,
            start_value: Some(start_value),
            random_min: None,
            random_max: None,
            prefix: None,
            suffix: None,
            format: None,
        }
    }

    pub fn start_value(&self) -> i64 {
        self.start_value.unwrap_or(1)
    }

    pub fn random_min(&self) -> i64 {
        self.random_min.unwrap_or(1)
    }

    pub fn random_max(&self) -> i64 {
        self.random_max.unwrap_or(100)
    }

    pub fn prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or("")
    }

    pub fn suffix(&self) -> &str {
        self.suffix.as_deref().unwrap_or("")
    }

    /// Section id, with empty strings treated as no reference.
    pub fn section(&self) -> Option<&str> {
        self.section_id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

/// A validated, ordered list of rules with unique original texts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleSet {
    rules: Vec<ReplacementRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<ReplacementRule>) -> Result<Self, EngineError> {
        let mut seen = HashSet::new();
        for (idx, rule) in rules.iter().enumerate() {
            if rule.original_text.trim().is_empty() {
                return Err(EngineError::InvalidRules(format!(
                    "rule {} has an empty original_text",
                    idx
                )));
            }
            if !seen.insert(rule.original_text.as_str()) {
                return Err(EngineError::InvalidRules(format!(
                    "original_text {:?} is used by more than one rule",
                    rule.original_text
                )));
            }
            if rule.kind == RuleKind::Random && rule.random_min() > rule.random_max() {
                return Err(EngineError::InvalidRules(format!(
                    "rule {} has random_min {} greater than random_max {}",
                    idx,
                    rule.random_min(),
                    rule.random_max()
                )));
            }
        }
        Ok(Self { rules })
    }

    pub fn from_json(raw: &str) -> Result<Self, EngineError> {
        let rules: Vec<ReplacementRule> = serde_json::from_str(raw)
            .map_err(|err| EngineError::InvalidRules(err.to_string()))?;
        Self::new(rules)
    }

    pub fn rules(&self) -> &[ReplacementRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Supplies the number a `custom` rule formats for a given copy.
pub trait ValueSource: Send + Sync {
    fn value(&self, rule: &ReplacementRule, copy_index: usize) -> i64;
}

/// `start_value + copy_index`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialSource;

impl ValueSource for SerialSource {
    fn value(&self, rule: &ReplacementRule, copy_index: usize) -> i64 {
        rule.start_value().saturating_add(copy_index as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluated {
    pub value: String,
    /// The rule's format template did not fit the value and plain decimal was used.
    pub format_mismatch: bool,
}

#[derive(Clone)]
pub struct RuleEvaluator {
    custom: Arc<dyn ValueSource>,
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEvaluator {
    pub fn new() -> Self {
        Self {
            custom: Arc::new(SerialSource),
        }
    }

    pub fn with_custom_source(custom: Arc<dyn ValueSource>) -> Self {
        Self { custom }
    }

    pub fn evaluate(&self, rule: &ReplacementRule, copy_index: usize) -> Evaluated {
        let number = match rule.kind {
            RuleKind::Serial => SerialSource.value(rule, copy_index),
            RuleKind::Random => random_inclusive(rule.random_min(), rule.random_max()),
            RuleKind::Custom => self.custom.value(rule, copy_index),
        };
        let (body, format_mismatch) = match rule.format.as_deref() {
            Some(template) if !template.is_empty() => match format_number(template, number) {
                Some(formatted) => (formatted, false),
                None => (number.to_string(), true),
            },
            _ => (number.to_string(), false),
        };
        Evaluated {
            value: format!("{}{}{}", rule.prefix(), body, rule.suffix()),
            format_mismatch,
        }
    }

    /// The value copy 0 would receive.
    pub fn preview(&self, rule: &ReplacementRule) -> String {
        self.evaluate(rule, 0).value
    }
}

/// Uniform integer in `[min, max]` from the OS RNG.
fn random_inclusive(min: i64, max: i64) -> i64 {
    if min >= max {
        return min;
    }
    let span = (i128::from(max) - i128::from(min) + 1) as u128;
    if span > u128::from(u64::MAX) {
        return OsRng.next_u64() as i64;
    }
    let span = span as u64;
    let zone = (u64::MAX / span) * span;
    loop {
        let draw = OsRng.next_u64();
        if draw < zone {
            return (i128::from(min) + i128::from(draw % span)) as i64;
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Conversion {
    left: bool,
    plus: bool,
    space: bool,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    kind: char,
}

/// Applies a printf-style template holding exactly one numeric or string
/// conversion (`%d %i %u %s %x %X %o %f`, with flags `-+ 0`, width and
/// precision). `%%` is a literal percent sign. Returns `None` when the
/// template does not fit.
pub fn format_number(template: &str, value: i64) -> Option<String> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut converted = false;
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }
        if converted {
            return None;
        }
        let mut conv = Conversion::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => conv.left = true,
                '+' => conv.plus = true,
                ' ' => conv.space = true,
                '0' => conv.zero = true,
                _ => break,
            }
            chars.next();
        }
        conv.width = take_number(&mut chars).unwrap_or(0);
        if chars.peek() == Some(&'.') {
            chars.next();
            conv.precision = Some(take_number(&mut chars).unwrap_or(0));
        }
        conv.kind = chars.next()?;
        out.push_str(&render(&conv, value)?);
        converted = true;
    }
    converted.then_some(out)
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut digits = String::new();
    while let Some(&ch) = chars.peek() {
        if !ch.is_ascii_digit() {
            break;
        }
        digits.push(ch);
        chars.next();
    }
    digits.parse().ok()
}

fn render(conv: &Conversion, value: i64) -> Option<String> {
    let magnitude = value.unsigned_abs();
    let mut body = match conv.kind {
        'd' | 'i' | 'u' => magnitude.to_string(),
        'x' => format!("{:x}", magnitude),
        'X' => format!("{:X}", magnitude),
        'o' => format!("{:o}", magnitude),
        'f' => format!("{:.*}", conv.precision.unwrap_or(6), magnitude as f64),
        's' => {
            let mut text = value.to_string();
            if let Some(limit) = conv.precision {
                text = text.chars().take(limit).collect();
            }
            return Some(pad(text, conv.width, conv.left));
        }
        _ => return None,
    };
    let integer = conv.kind != 'f';
    if integer {
        if let Some(precision) = conv.precision {
            if body.len() < precision {
                body = format!("{}{}", "0".repeat(precision - body.len()), body);
            }
        }
    }
    let sign = if value < 0 {
        "-"
    } else if conv.plus {
        "+"
    } else if conv.space {
        " "
    } else {
        ""
    };
    let len = sign.len() + body.len();
    if len >= conv.width {
        return Some(format!("{}{}", sign, body));
    }
    let fill = conv.width - len;
    let zero_fill = conv.zero && !conv.left && (!integer || conv.precision.is_none());
    Some(if conv.left {
        format!("{}{}{}", sign, body, " ".repeat(fill))
    } else if zero_fill {
        format!("{}{}{}", sign, "0".repeat(fill), body)
    } else {
        format!("{}{}{}", " ".repeat(fill), sign, body)
    })
}

fn pad(text: String, width: usize, left: bool) -> String {
    let len = text.chars().count();
    if len >= width {
        return text;
    }
    let fill = " ".repeat(width - len);
    if left {
        format!("{}{}", text, fill)
    } else {
        format!("{}{}", fill, text)
    }
}
