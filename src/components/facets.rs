//! XSD constraining facets
//!
//! Raw facets ([`FacetDecl`]) are collected by the builder. The derivation
//! engine folds them level by level into a [`FacetSet`], where each level may
//! only tighten what its ancestors allowed; the set then checks literal values.

use std::cmp::Ordering;
use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{Error, Result, ValidationError, ValidationErrorKind};

/// White space handling modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum WhiteSpace {
    /// Preserve all white space
    Preserve,
    /// Replace tabs and newlines with spaces
    Replace,
    /// Replace and collapse multiple spaces
    Collapse,
}

impl WhiteSpace {
    /// Parse from string value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "preserve" => Some(WhiteSpace::Preserve),
            "replace" => Some(WhiteSpace::Replace),
            "collapse" => Some(WhiteSpace::Collapse),
            _ => None,
        }
    }

    /// Normalize a string according to this white space mode
    pub fn normalize(&self, s: &str) -> String {
        match self {
            WhiteSpace::Preserve => s.to_string(),
            WhiteSpace::Replace => s.replace(['\t', '\n', '\r'], " "),
            WhiteSpace::Collapse => s.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }
}

impl fmt::Display for WhiteSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WhiteSpace::Preserve => "preserve",
            WhiteSpace::Replace => "replace",
            WhiteSpace::Collapse => "collapse",
        })
    }
}

/// Constraining facet names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FacetKind {
    /// Exact length
    Length,
    /// Minimum length
    MinLength,
    /// Maximum length
    MaxLength,
    /// Regular expression
    Pattern,
    /// Allowed values
    Enumeration,
    /// White space normalization
    WhiteSpace,
    /// Upper bound, inclusive
    MaxInclusive,
    /// Upper bound, exclusive
    MaxExclusive,
    /// Lower bound, inclusive
    MinInclusive,
    /// Lower bound, exclusive
    MinExclusive,
    /// Maximum number of significant digits
    TotalDigits,
    /// Maximum number of fractional digits
    FractionDigits,
}

impl FacetKind {
    /// Parse from an XSD element local name
    pub fn from_local_name(name: &str) -> Option<Self> {
        Some(match name {
            "length" => Self::Length,
            "minLength" => Self::MinLength,
            "maxLength" => Self::MaxLength,
            "pattern" => Self::Pattern,
            "enumeration" => Self::Enumeration,
            "whiteSpace" => Self::WhiteSpace,
            "maxInclusive" => Self::MaxInclusive,
            "maxExclusive" => Self::MaxExclusive,
            "minInclusive" => Self::MinInclusive,
            "minExclusive" => Self::MinExclusive,
            "totalDigits" => Self::TotalDigits,
            "fractionDigits" => Self::FractionDigits,
            _ => return None,
        })
    }

    /// XSD element local name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Length => "length",
            Self::MinLength => "minLength",
            Self::MaxLength => "maxLength",
            Self::Pattern => "pattern",
            Self::Enumeration => "enumeration",
            Self::WhiteSpace => "whiteSpace",
            Self::MaxInclusive => "maxInclusive",
            Self::MaxExclusive => "maxExclusive",
            Self::MinInclusive => "minInclusive",
            Self::MinExclusive => "minExclusive",
            Self::TotalDigits => "totalDigits",
            Self::FractionDigits => "fractionDigits",
        }
    }
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A facet as written in a restriction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetDecl {
    /// Facet name
    pub kind: FacetKind,
    /// The `value` attribute
    pub value: String,
    /// `fixed="true"`
    pub fixed: bool,
}

impl FacetDecl {
    /// Create a non-fixed facet
    pub fn new(kind: FacetKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            fixed: false,
        }
    }

    /// Create a fixed facet
    pub fn fixed(kind: FacetKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            fixed: true,
        }
    }
}

/// Value space used to order range facet values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueSpace {
    /// Decimal and integer types
    Decimal,
    /// float / double
    Float,
    /// dateTime
    DateTime,
    /// date
    Date,
    /// time
    Time,
    /// No usable order
    Unordered,
}

impl ValueSpace {
    /// Parse a literal into an ordered value
    pub fn parse(self, lexical: &str) -> Option<OrderedValue> {
        let lexical = lexical.trim();
        match self {
            ValueSpace::Decimal => parse_decimal(lexical).map(OrderedValue::Decimal),
            ValueSpace::Float => parse_float(lexical).map(OrderedValue::Float),
            ValueSpace::DateTime => {
                let (text, offset) = split_timezone(lexical);
                NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|dt| OrderedValue::DateTime(dt - Duration::minutes(offset.unwrap_or(0))))
            }
            ValueSpace::Date => {
                let (text, _) = split_timezone(lexical);
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .ok()
                    .map(OrderedValue::Date)
            }
            ValueSpace::Time => {
                let (text, _) = split_timezone(lexical);
                NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
                    .ok()
                    .map(OrderedValue::Time)
            }
            ValueSpace::Unordered => None,
        }
    }

    /// Whether range facets apply
    pub fn is_ordered(self) -> bool {
        self != ValueSpace::Unordered
    }
}

/// Parse an xs:decimal literal, accepting the `.5` and `5.` forms
pub fn parse_decimal(lexical: &str) -> Option<Decimal> {
    let (sign, digits) = match lexical.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", lexical.strip_prefix('+').unwrap_or(lexical)),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    let digits = digits.strip_suffix('.').unwrap_or(digits);
    let text = if digits.starts_with('.') {
        format!("{}0{}", sign, digits)
    } else {
        format!("{}{}", sign, digits)
    };
    text.parse::<Decimal>().ok()
}

/// Parse an xs:float / xs:double literal
pub fn parse_float(lexical: &str) -> Option<f64> {
    match lexical {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        // Rust accepts "inf" and "nan" spellings XSD does not.
        s if s.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => None,
        s => s.parse::<f64>().ok(),
    }
}

/// Split a trailing `Z` or `+hh:mm` timezone, returning the offset in minutes
fn split_timezone(lexical: &str) -> (&str, Option<i64>) {
    if let Some(rest) = lexical.strip_suffix('Z') {
        return (rest, Some(0));
    }
    let bytes = lexical.as_bytes();
    let len = bytes.len();
    if len > 6 && (bytes[len - 6] == b'+' || bytes[len - 6] == b'-') && bytes[len - 3] == b':' {
        let hours: i64 = lexical[len - 5..len - 3].parse().unwrap_or(0);
        let minutes: i64 = lexical[len - 2..].parse().unwrap_or(0);
        let sign = if bytes[len - 6] == b'-' { -1 } else { 1 };
        return (&lexical[..len - 6], Some(sign * (hours * 60 + minutes)));
    }
    (lexical, None)
}

/// A value from an ordered value space
#[derive(Debug, Clone, PartialEq)]
pub enum OrderedValue {
    /// Decimal / integer
    Decimal(Decimal),
    /// float / double
    Float(f64),
    /// dateTime, normalized to UTC when a timezone is given
    DateTime(NaiveDateTime),
    /// date
    Date(NaiveDate),
    /// time
    Time(NaiveTime),
}

impl PartialOrd for OrderedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (OrderedValue::Decimal(a), OrderedValue::Decimal(b)) => a.partial_cmp(b),
            (OrderedValue::Float(a), OrderedValue::Float(b)) => a.partial_cmp(b),
            (OrderedValue::DateTime(a), OrderedValue::DateTime(b)) => a.partial_cmp(b),
            (OrderedValue::Date(a), OrderedValue::Date(b)) => a.partial_cmp(b),
            (OrderedValue::Time(a), OrderedValue::Time(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for OrderedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderedValue::Decimal(v) => write!(f, "{}", v),
            OrderedValue::Float(v) => write!(f, "{}", v),
            OrderedValue::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S%.f")),
            OrderedValue::Date(v) => write!(f, "{}", v),
            OrderedValue::Time(v) => write!(f, "{}", v),
        }
    }
}

/// A facet value together with its `fixed` flag
#[derive(Debug, Clone, PartialEq)]
pub struct Bound<T> {
    /// The value
    pub value: T,
    /// Whether derived types may change it
    pub fixed: bool,
}

/// The pattern facets of one derivation level; any alternative may match
#[derive(Debug, Clone)]
pub struct Pattern {
    /// Source expressions as written
    pub sources: Vec<String>,
    regex: Regex,
}

impl Pattern {
    /// Compile the alternatives of one level
    pub fn new(sources: Vec<String>) -> std::result::Result<Self, String> {
        let alternatives: Vec<String> = sources
            .iter()
            .map(|s| format!("(?:{})", translate_pattern(s)))
            .collect();
        let regex = Regex::new(&format!("^(?:{})$", alternatives.join("|")))
            .map_err(|e| format!("invalid pattern: {}", e))?;
        Ok(Self { sources, regex })
    }

    /// Whether the whole value matches one of the alternatives
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

/// Rewrite an XSD regular expression for the `regex` crate
///
/// XSD expressions are implicitly anchored, treat `^` and `$` as literals
/// outside character classes, and add the `\i` / `\c` name classes.
fn translate_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars().peekable();
    let mut class_depth = 0usize;
    let mut class_start = false;

    while let Some(c) = chars.next() {
        let at_class_start = std::mem::take(&mut class_start);
        match c {
            '\\' => match chars.next() {
                Some('i') => out.push_str("[_:A-Za-z]"),
                Some('I') => out.push_str("[^_:A-Za-z]"),
                Some('c') => out.push_str("[-._:A-Za-z0-9]"),
                Some('C') => out.push_str("[^-._:A-Za-z0-9]"),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push_str("\\\\"),
            },
            '[' => {
                class_depth += 1;
                class_start = true;
                out.push('[');
            }
            ']' if class_depth > 0 => {
                class_depth -= 1;
                out.push(']');
            }
            '^' if class_depth == 0 || !at_class_start => out.push_str("\\^"),
            '$' if class_depth == 0 => out.push_str("\\$"),
            other => out.push(other),
        }
    }
    out
}

/// Effective facets of a simple type after folding its derivation chain
#[derive(Debug, Clone, Default)]
pub struct FacetSet {
    /// length
    pub length: Option<Bound<u64>>,
    /// minLength
    pub min_length: Option<Bound<u64>>,
    /// maxLength
    pub max_length: Option<Bound<u64>>,
    /// whiteSpace
    pub white_space: Option<Bound<WhiteSpace>>,
    /// minInclusive
    pub min_inclusive: Option<Bound<OrderedValue>>,
    /// maxInclusive
    pub max_inclusive: Option<Bound<OrderedValue>>,
    /// minExclusive
    pub min_exclusive: Option<Bound<OrderedValue>>,
    /// maxExclusive
    pub max_exclusive: Option<Bound<OrderedValue>>,
    /// totalDigits
    pub total_digits: Option<Bound<u32>>,
    /// fractionDigits
    pub fraction_digits: Option<Bound<u32>>,
    /// Values of the most derived enumeration, already filtered by ancestor facets
    pub enumeration: Option<Vec<String>>,
    /// One entry per derivation level that declared patterns
    pub patterns: Vec<Pattern>,
}

/// Reject changing a fixed facet
fn check_fixed<T: PartialEq>(base: &Option<Bound<T>>, value: &T) -> std::result::Result<(), String> {
    match base {
        Some(bound) if bound.fixed && bound.value != *value => {
            Err("the base type declares this facet fixed".to_string())
        }
        _ => Ok(()),
    }
}

/// Compare two range facet values, failing when they are incomparable
fn compare(a: &OrderedValue, b: &OrderedValue) -> std::result::Result<Ordering, String> {
    a.partial_cmp(b)
        .ok_or_else(|| format!("values {} and {} are not comparable", a, b))
}

impl FacetSet {
    /// Effective white space mode (preserve when none was declared)
    pub fn white_space(&self) -> WhiteSpace {
        self.white_space
            .as_ref()
            .map(|b| b.value)
            .unwrap_or(WhiteSpace::Preserve)
    }

    /// Fold one derivation level into a new set
    ///
    /// Enumeration values are taken as declared; filtering them against the
    /// ancestor facets needs the full lexical check and is left to the caller.
    pub fn restrict(&self, local: &[FacetDecl], space: ValueSpace, type_name: &str) -> Result<FacetSet> {
        let mut next = self.clone();
        let mut enumeration: Vec<String> = Vec::new();
        let mut patterns: Vec<String> = Vec::new();
        let mut seen: Vec<FacetKind> = Vec::new();

        for decl in local {
            let invalid = |reason: String| Error::InvalidFacetRestriction {
                type_name: type_name.to_string(),
                facet: decl.kind.to_string(),
                reason,
            };
            match decl.kind {
                FacetKind::Enumeration => {
                    enumeration.push(decl.value.clone());
                    continue;
                }
                FacetKind::Pattern => {
                    patterns.push(decl.value.clone());
                    continue;
                }
                kind if seen.contains(&kind) => {
                    return Err(invalid("facet is declared more than once".to_string()));
                }
                kind => seen.push(kind),
            }
            next.apply(self, decl, space).map_err(invalid)?;
        }

        next.check_consistency().map_err(|(facet, reason)| Error::InvalidFacetRestriction {
            type_name: type_name.to_string(),
            facet: facet.to_string(),
            reason,
        })?;

        if !enumeration.is_empty() {
            next.enumeration = Some(enumeration);
        }
        if !patterns.is_empty() {
            let pattern = Pattern::new(patterns).map_err(|reason| Error::InvalidFacetRestriction {
                type_name: type_name.to_string(),
                facet: FacetKind::Pattern.to_string(),
                reason,
            })?;
            next.patterns.push(pattern);
        }
        Ok(next)
    }

    fn apply(&mut self, base: &FacetSet, decl: &FacetDecl, space: ValueSpace) -> std::result::Result<(), String> {
        let value = decl.value.trim();
        let fixed = decl.fixed;
        match decl.kind {
            FacetKind::Length | FacetKind::MinLength | FacetKind::MaxLength => {
                let n: u64 = value
                    .parse()
                    .map_err(|_| format!("'{}' is not a non-negative integer", value))?;
                match decl.kind {
                    FacetKind::Length => {
                        check_fixed(&base.length, &n)?;
                        if let Some(b) = &base.length {
                            if b.value != n {
                                return Err(format!("length cannot change from {} to {}", b.value, n));
                            }
                        }
                        self.length = Some(Bound { value: n, fixed });
                    }
                    FacetKind::MinLength => {
                        check_fixed(&base.min_length, &n)?;
                        if let Some(b) = &base.min_length {
                            if n < b.value {
                                return Err(format!("minLength {} is less than inherited {}", n, b.value));
                            }
                        }
                        self.min_length = Some(Bound { value: n, fixed });
                    }
                    _ => {
                        check_fixed(&base.max_length, &n)?;
                        if let Some(b) = &base.max_length {
                            if n > b.value {
                                return Err(format!("maxLength {} is greater than inherited {}", n, b.value));
                            }
                        }
                        self.max_length = Some(Bound { value: n, fixed });
                    }
                }
            }
            FacetKind::WhiteSpace => {
                let ws = WhiteSpace::parse(value)
                    .ok_or_else(|| format!("'{}' is not preserve, replace or collapse", value))?;
                check_fixed(&base.white_space, &ws)?;
                if let Some(b) = &base.white_space {
                    if ws < b.value {
                        return Err(format!("cannot relax whiteSpace from {} to {}", b.value, ws));
                    }
                }
                self.white_space = Some(Bound { value: ws, fixed });
            }
            FacetKind::MaxInclusive | FacetKind::MaxExclusive | FacetKind::MinInclusive | FacetKind::MinExclusive => {
                if !space.is_ordered() {
                    return Err("range facets do not apply to this type".to_string());
                }
                let v = space
                    .parse(value)
                    .ok_or_else(|| format!("'{}' is not a valid value of the base type", value))?;
                self.apply_range(base, decl.kind, v, fixed)?;
            }
            FacetKind::TotalDigits | FacetKind::FractionDigits => {
                let n: u32 = value
                    .parse()
                    .map_err(|_| format!("'{}' is not a non-negative integer", value))?;
                let (inherited, slot) = if decl.kind == FacetKind::TotalDigits {
                    if n == 0 {
                        return Err("totalDigits must be positive".to_string());
                    }
                    (&base.total_digits, &mut self.total_digits)
                } else {
                    (&base.fraction_digits, &mut self.fraction_digits)
                };
                check_fixed(inherited, &n)?;
                if let Some(b) = inherited {
                    if n > b.value {
                        return Err(format!("{} is greater than inherited {}", n, b.value));
                    }
                }
                *slot = Some(Bound { value: n, fixed });
            }
            FacetKind::Enumeration | FacetKind::Pattern => {}
        }
        Ok(())
    }

    fn apply_range(
        &mut self,
        base: &FacetSet,
        kind: FacetKind,
        v: OrderedValue,
        fixed: bool,
    ) -> std::result::Result<(), String> {
        let below = |bound: &Option<Bound<OrderedValue>>, strict: bool| -> std::result::Result<(), String> {
            if let Some(b) = bound {
                let ord = compare(&v, &b.value)?;
                if ord == Ordering::Greater || (strict && ord == Ordering::Equal) {
                    return Err(format!("{} exceeds inherited bound {}", v, b.value));
                }
            }
            Ok(())
        };
        let above = |bound: &Option<Bound<OrderedValue>>, strict: bool| -> std::result::Result<(), String> {
            if let Some(b) = bound {
                let ord = compare(&v, &b.value)?;
                if ord == Ordering::Less || (strict && ord == Ordering::Equal) {
                    return Err(format!("{} is below inherited bound {}", v, b.value));
                }
            }
            Ok(())
        };

        match kind {
            FacetKind::MaxInclusive => {
                check_fixed(&base.max_inclusive, &v)?;
                below(&base.max_inclusive, false)?;
                below(&base.max_exclusive, true)?;
                above(&base.min_inclusive, false)?;
                above(&base.min_exclusive, true)?;
                self.max_inclusive = Some(Bound { value: v, fixed });
            }
            FacetKind::MaxExclusive => {
                check_fixed(&base.max_exclusive, &v)?;
                below(&base.max_exclusive, false)?;
                below(&base.max_inclusive, false)?;
                above(&base.min_inclusive, true)?;
                above(&base.min_exclusive, true)?;
                self.max_exclusive = Some(Bound { value: v, fixed });
            }
            FacetKind::MinInclusive => {
                check_fixed(&base.min_inclusive, &v)?;
                above(&base.min_inclusive, false)?;
                above(&base.min_exclusive, true)?;
                below(&base.max_inclusive, false)?;
                below(&base.max_exclusive, true)?;
                self.min_inclusive = Some(Bound { value: v, fixed });
            }
            _ => {
                check_fixed(&base.min_exclusive, &v)?;
                above(&base.min_exclusive, false)?;
                above(&base.min_inclusive, false)?;
                below(&base.max_inclusive, true)?;
                below(&base.max_exclusive, true)?;
                self.min_exclusive = Some(Bound { value: v, fixed });
            }
        }
        Ok(())
    }

    fn check_consistency(&self) -> std::result::Result<(), (FacetKind, String)> {
        if let (Some(min), Some(max)) = (&self.min_length, &self.max_length) {
            if min.value > max.value {
                return Err((FacetKind::MinLength, format!("minLength {} exceeds maxLength {}", min.value, max.value)));
            }
        }
        if let Some(len) = &self.length {
            let outside = self.min_length.as_ref().map_or(false, |m| m.value > len.value)
                || self.max_length.as_ref().map_or(false, |m| m.value < len.value);
            if outside {
                return Err((FacetKind::Length, "length conflicts with minLength/maxLength".to_string()));
            }
        }
        if let (Some(total), Some(fraction)) = (&self.total_digits, &self.fraction_digits) {
            if fraction.value > total.value {
                return Err((FacetKind::FractionDigits, "fractionDigits exceeds totalDigits".to_string()));
            }
        }
        if let (Some(min), Some(max)) = (&self.min_inclusive, &self.max_inclusive) {
            if min.value.partial_cmp(&max.value) == Some(Ordering::Greater) {
                return Err((FacetKind::MinInclusive, format!("{} exceeds maxInclusive {}", min.value, max.value)));
            }
        }
        Ok(())
    }

    /// Check a whitespace-normalized literal
    ///
    /// `measure` is the length in the unit of the type (characters, octets or
    /// list items); length facets are skipped when it is None.
    pub fn check(&self, value: &str, measure: Option<u64>, space: ValueSpace) -> std::result::Result<(), ValidationError> {
        let fail = |message: String, reason: String| {
            Err(ValidationError::new(ValidationErrorKind::InvalidValue, message).with_reason(reason))
        };

        if let Some(len) = measure {
            if let Some(b) = &self.length {
                if len != b.value {
                    return fail(format!("Length must be exactly {}", b.value), format!("Actual length: {}", len));
                }
            }
            if let Some(b) = &self.min_length {
                if len < b.value {
                    return fail(format!("Length must be at least {}", b.value), format!("Actual length: {}", len));
                }
            }
            if let Some(b) = &self.max_length {
                if len > b.value {
                    return fail(format!("Length must be at most {}", b.value), format!("Actual length: {}", len));
                }
            }
        }

        for pattern in &self.patterns {
            if !pattern.is_match(value) {
                return fail(
                    format!("Value does not match pattern '{}'", pattern.sources.join("' | '")),
                    format!("Value: '{}'", value),
                );
            }
        }

        if let Some(values) = &self.enumeration {
            let parsed = space.parse(value);
            let found = values.iter().any(|candidate| match (&parsed, space.parse(candidate)) {
                (Some(a), Some(b)) => a.partial_cmp(&b) == Some(Ordering::Equal),
                _ => candidate == value,
            });
            if !found {
                return fail(
                    "Value is not in the enumeration".to_string(),
                    format!("Allowed values: {:?}", values),
                );
            }
        }

        if space.is_ordered() {
            if let Some(v) = space.parse(value) {
                let bounds = [
                    (&self.min_inclusive, Ordering::Less, false, ">="),
                    (&self.min_exclusive, Ordering::Less, true, ">"),
                    (&self.max_inclusive, Ordering::Greater, false, "<="),
                    (&self.max_exclusive, Ordering::Greater, true, "<"),
                ];
                for (bound, outside, strict, op) in bounds {
                    if let Some(b) = bound {
                        let ord = v.partial_cmp(&b.value);
                        if ord == Some(outside) || ord.is_none() || (strict && ord == Some(Ordering::Equal)) {
                            return fail(format!("Value must be {} {}", op, b.value), format!("Value: {}", value));
                        }
                    }
                }
            }
        }

        if space == ValueSpace::Decimal && (self.total_digits.is_some() || self.fraction_digits.is_some()) {
            if let Some(d) = parse_decimal(value.trim()) {
                let normalized = d.normalize();
                if let Some(b) = &self.fraction_digits {
                    if normalized.scale() > b.value {
                        return fail(
                            format!("Value exceeds fractionDigits limit of {}", b.value),
                            format!("Value {} has {} fractional digits", value, normalized.scale()),
                        );
                    }
                }
                if let Some(b) = &self.total_digits {
                    let digits = normalized.mantissa().unsigned_abs().to_string().len() as u32;
                    if digits > b.value {
                        return fail(
                            format!("Value exceeds totalDigits limit of {}", b.value),
                            format!("Value {} has {} significant digits", value, digits),
                        );
                    }
                }
            }
        }

        Ok(())
    }
}
