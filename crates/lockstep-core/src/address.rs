//! Stage addresses.
//!
//! An [`Address`] locates a step inside a plan as `(major, minor, repetition)`:
//! the stage (or sequence block), the step within it, and the round. Major and
//! minor may be numeric indices or names; the navigator normalizes names to
//! indices for plans with a declared sequence.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Template symbol replaced by the major component.
pub const MAJOR_SYMBOL: char = 'S';

/// Template symbol replaced by the minor component.
pub const MINOR_SYMBOL: char = 's';

/// Template symbol replaced by the repetition.
pub const REPETITION_SYMBOL: char = 'r';

/// Template used by `Display` and [`Address::parse`].
pub const DEFAULT_TEMPLATE: &str = "S.s.r";

/// One component of an address: a 1-based index or a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coord {
    /// Positional index (1-based; 0 only in the unresolved address).
    Index(u32),
    /// Stage or step name.
    Name(String),
}

impl Coord {
    /// Digit-only tokens become indices, anything else keeps its text.
    fn from_token(token: &str) -> Self {
        if token.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = token.parse::<u32>() {
                return Self::Index(index);
            }
        }
        Self::Name(token.to_owned())
    }

    /// Returns the index, if this is a positional component.
    #[must_use]
    pub fn as_index(&self) -> Option<u32> {
        match self {
            Self::Index(index) => Some(*index),
            Self::Name(_) => None,
        }
    }

    /// Returns the name, if this is a named component.
    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Index(_) => None,
            Self::Name(name) => Some(name),
        }
    }

    /// Index-vs-index and name-vs-name compare; mixed pairs are not comparable.
    fn try_compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Index(a), Self::Index(b)) => Some(a.cmp(b)),
            (Self::Name(a), Self::Name(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<u32> for Coord {
    fn from(index: u32) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for Coord {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for Coord {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// A position within a plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// Stage name or sequence block index.
    pub major: Coord,
    /// Step name or index within the stage.
    pub minor: Coord,
    /// Round counter for repeated and looped stages.
    pub repetition: u32,
}

impl Address {
    /// Creates a fully numeric address.
    #[must_use]
    pub const fn new(major: u32, minor: u32, repetition: u32) -> Self {
        Self {
            major: Coord::Index(major),
            minor: Coord::Index(minor),
            repetition,
        }
    }

    /// Creates an address from arbitrary components.
    #[must_use]
    pub fn named(major: impl Into<Coord>, minor: impl Into<Coord>, repetition: u32) -> Self {
        Self {
            major: major.into(),
            minor: minor.into(),
            repetition,
        }
    }

    /// The unresolved address `(0,0,0)`: before the first step.
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0, 0, 0)
    }

    /// Returns true for the unresolved address.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    /// Parses `major.minor.repetition` with defaulting.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        Self::parse_with(input, DEFAULT_TEMPLATE)
    }

    /// Parses `input` against `template`.
    ///
    /// Each symbol captures input up to the next literal character of the
    /// template. Parsing stops at the first literal that does not match;
    /// components not captured by then take their defaults.
    #[must_use]
    pub fn parse_with(input: &str, template: &str) -> Self {
        let mut spec = AddressSpec::default();
        let mut rest = input;
        let mut symbols = template.chars().peekable();

        while let Some(symbol) = symbols.next() {
            if !is_symbol(symbol) {
                match rest.strip_prefix(symbol) {
                    Some(remaining) => rest = remaining,
                    None => break,
                }
                continue;
            }

            let stop = symbols.peek().copied().filter(|c| !is_symbol(*c));
            let end = stop.and_then(|literal| rest.find(literal)).unwrap_or(rest.len());
            let (token, remaining) = rest.split_at(end);
            rest = remaining;

            if token.is_empty() {
                continue;
            }
            match symbol {
                MAJOR_SYMBOL => spec.major = Some(Coord::from_token(token)),
                MINOR_SYMBOL => spec.minor = Some(Coord::from_token(token)),
                _ => spec.repetition = token.parse().ok(),
            }
        }

        Self::from(spec)
    }

    /// Renders the address through `template`, passing literals through.
    #[must_use]
    pub fn format(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len() + 8);
        for c in template.chars() {
            match c {
                MAJOR_SYMBOL => out.push_str(&self.major.to_string()),
                MINOR_SYMBOL => out.push_str(&self.minor.to_string()),
                REPETITION_SYMBOL => out.push_str(&self.repetition.to_string()),
                literal => out.push(literal),
            }
        }
        out
    }

    /// Orders by major, then repetition, then minor.
    ///
    /// A mixed index/name pair at any level is not comparable and ends the
    /// comparison as `Equal` instead of falling through to the next level.
    /// See [`AddressSpec::compare`].
    #[must_use]
    pub fn compare(a: &Self, b: &Self) -> Ordering {
        AddressSpec::compare(&AddressSpec::from(a), &AddressSpec::from(b))
    }

    /// [`Address::compare`] for addresses that may be absent altogether.
    ///
    /// Two absent addresses are `Equal`; an absent one sorts after any
    /// present one.
    #[must_use]
    pub fn compare_optional(a: Option<&Self>, b: Option<&Self>) -> Ordering {
        match (a, b) {
            (Some(a), Some(b)) => Self::compare(a, b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(DEFAULT_TEMPLATE))
    }
}

impl FromStr for Address {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

fn is_symbol(c: char) -> bool {
    matches!(c, MAJOR_SYMBOL | MINOR_SYMBOL | REPETITION_SYMBOL)
}

/// A partially specified address, as received from callers and the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSpec {
    /// Stage component.
    pub major: Option<Coord>,
    /// Step component.
    pub minor: Option<Coord>,
    /// Round component.
    pub repetition: Option<u32>,
}

impl AddressSpec {
    /// Compares two partial addresses level by level.
    ///
    /// A level where either side is absent falls through to the next level.
    /// A level holding an index on one side and a name on the other stops the
    /// comparison with `Equal`, so ordering between addresses mixing numeric
    /// and named components is not transitive.
    #[must_use]
    pub fn compare(a: &Self, b: &Self) -> Ordering {
        let levels = [
            compare_level(a.major.as_ref(), b.major.as_ref(), Coord::try_compare),
            compare_level(a.repetition.as_ref(), b.repetition.as_ref(), |x, y| {
                Some(x.cmp(y))
            }),
            compare_level(a.minor.as_ref(), b.minor.as_ref(), Coord::try_compare),
        ];

        for level in levels {
            match level {
                Level::Undefined | Level::Decided(Ordering::Equal) => {}
                Level::Decided(ordering) => return ordering,
                Level::Incomparable => return Ordering::Equal,
            }
        }
        Ordering::Equal
    }
}

enum Level {
    Undefined,
    Incomparable,
    Decided(Ordering),
}

fn compare_level<T>(
    a: Option<&T>,
    b: Option<&T>,
    cmp: impl Fn(&T, &T) -> Option<Ordering>,
) -> Level {
    match (a, b) {
        (Some(a), Some(b)) => cmp(a, b).map_or(Level::Incomparable, Level::Decided),
        _ => Level::Undefined,
    }
}

impl From<AddressSpec> for Address {
    fn from(spec: AddressSpec) -> Self {
        if spec.major.is_none() && spec.minor.is_none() && spec.repetition.is_none() {
            return Self::zero();
        }
        Self {
            major: spec.major.unwrap_or(Coord::Index(0)),
            minor: spec.minor.unwrap_or(Coord::Index(1)),
            repetition: spec.repetition.unwrap_or(1),
        }
    }
}

impl From<&Address> for AddressSpec {
    fn from(address: &Address) -> Self {
        Self {
            major: Some(address.major.clone()),
            minor: Some(address.minor.clone()),
            repetition: Some(address.repetition),
        }
    }
}
