//! Query predicates on single attributes.
//!
//! Predicates are built with plaintext literals. Before they reach storage
//! a [`PredicateRewriter`] replaces every literal aimed at an encrypted
//! attribute with a query ciphertext. Storage then evaluates the rewritten
//! predicate with [`Predicate::matches`], which compares ciphertexts without
//! any key.

use std::cmp::Ordering;

use chrono::{NaiveDate, NaiveDateTime};

use crate::envelope::{EncryptedValue, OreCiphertext};
use crate::error::Error;
use crate::interceptor::Interceptor;
use crate::options::SafetyMode;
use crate::record::Cell;
use crate::types::EncryptedType;
use crate::value::Value;

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Plaintext value
    Literal(Value),
    /// Query ciphertext for an encrypted attribute
    Encrypted(EncryptedValue),
    /// Query ciphertext of a text length
    EncryptedLength(OreCiphertext),
    /// Positional parameter filled in by [`Predicate::bind`]
    Placeholder(usize),
}

macro_rules! impl_literal_operand {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Operand {
                fn from(value: $t) -> Self {
                    Self::Literal(Value::from(value))
                }
            }
        )*
    };
}

impl_literal_operand!(
    Value, bool, i8, i16, i32, i64, i128, u8, u16, u32, u64, f64, &str, String, NaiveDate,
    NaiveDateTime
);

/// A range bound.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    /// Bound value
    pub operand: Operand,
    /// Whether the bound value itself matches
    pub inclusive: bool,
}

impl Bound {
    /// Bound that includes its value.
    pub fn inclusive(operand: impl Into<Operand>) -> Self {
        Self { operand: operand.into(), inclusive: true }
    }

    /// Bound that excludes its value.
    pub fn exclusive(operand: impl Into<Operand>) -> Self {
        Self { operand: operand.into(), inclusive: false }
    }
}

/// The comparison a predicate applies.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Equal to the operand; a null literal matches null cells
    Eq(Operand),
    /// Equal to any operand
    In(Vec<Operand>),
    /// Between optional bounds
    ///
    /// On text attributes only the first
    /// [`MAX_ORDER_PREFIX`](crate::field::MAX_ORDER_PREFIX) bytes are
    /// compared. Values sharing that prefix compare equal, so `lt` and `gt`
    /// exclude them and `le` and `ge` include them.
    Range {
        /// Lower bound, unbounded if `None`
        lower: Option<Bound>,
        /// Upper bound, unbounded if `None`
        upper: Option<Bound>,
    },
    /// Text length (in characters) between optional bounds
    LengthRange {
        /// Lower bound, unbounded if `None`
        lower: Option<Bound>,
        /// Upper bound, unbounded if `None`
        upper: Option<Bound>,
    },
}

/// A condition on one attribute.
///
/// Range predicates on encrypted text need an attribute with ordering
/// enabled and order by byte prefix only; see [`Condition::Range`].
///
/// # Example
///
/// ```
/// use gizlidb::predicate::{Condition, Predicate};
///
/// let adults = Predicate::ge("age", 18);
/// assert_eq!(adults.attribute, "age");
/// assert!(matches!(adults.condition, Condition::Range { lower: Some(_), upper: None }));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Attribute the condition applies to
    pub attribute: String,
    /// The condition
    pub condition: Condition,
}

impl Predicate {
    /// Creates a predicate.
    pub fn new(attribute: impl Into<String>, condition: Condition) -> Self {
        Self { attribute: attribute.into(), condition }
    }

    /// `attribute = value`
    pub fn eq(attribute: impl Into<String>, value: impl Into<Operand>) -> Self {
        Self::new(attribute, Condition::Eq(value.into()))
    }

    /// `attribute IN (values...)`
    pub fn is_in<I, V>(attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        Self::new(attribute, Condition::In(values.into_iter().map(Into::into).collect()))
    }

    /// `attribute < value`
    pub fn lt(attribute: impl Into<String>, value: impl Into<Operand>) -> Self {
        Self::range(attribute, None, Some(Bound::exclusive(value)))
    }

    /// `attribute <= value`
    pub fn le(attribute: impl Into<String>, value: impl Into<Operand>) -> Self {
        Self::range(attribute, None, Some(Bound::inclusive(value)))
    }

    /// `attribute > value`
    pub fn gt(attribute: impl Into<String>, value: impl Into<Operand>) -> Self {
        Self::range(attribute, Some(Bound::exclusive(value)), None)
    }

    /// `attribute >= value`
    pub fn ge(attribute: impl Into<String>, value: impl Into<Operand>) -> Self {
        Self::range(attribute, Some(Bound::inclusive(value)), None)
    }

    /// `low <= attribute <= high`
    pub fn between(
        attribute: impl Into<String>,
        low: impl Into<Operand>,
        high: impl Into<Operand>,
    ) -> Self {
        Self::range(attribute, Some(Bound::inclusive(low)), Some(Bound::inclusive(high)))
    }

    /// Range with explicit bounds.
    pub fn range(attribute: impl Into<String>, lower: Option<Bound>, upper: Option<Bound>) -> Self {
        Self::new(attribute, Condition::Range { lower, upper })
    }

    /// `low <= length(attribute) <= high`
    pub fn length_between(attribute: impl Into<String>, low: u32, high: u32) -> Self {
        Self::new(
            attribute,
            Condition::LengthRange {
                lower: Some(Bound::inclusive(low)),
                upper: Some(Bound::inclusive(high)),
            },
        )
    }

    /// Replaces placeholders with the given parameters.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if a placeholder index has no parameter.
    pub fn bind(&self, params: &[Operand]) -> Result<Self, Error> {
        let fill = |operand: &Operand| match operand {
            Operand::Placeholder(i) => params.get(*i).cloned().ok_or_else(|| {
                Error::Configuration(format!("no parameter bound for placeholder {i}"))
            }),
            other => Ok(other.clone()),
        };
        let condition = map_operands(&self.condition, fill)?;
        Ok(Self::new(self.attribute.clone(), condition))
    }

    /// Evaluates a rewritten predicate against a stored cell.
    ///
    /// Missing cells count as null. Stored envelopes without query terms
    /// never match a comparison.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the predicate still holds
    /// placeholders or plaintext literals aimed at an encrypted cell.
    pub fn matches(&self, cell: Option<&Cell>) -> Result<bool, Error> {
        let null = Cell::Plain(Value::Null);
        let cell = cell.unwrap_or(&null);

        match &self.condition {
            Condition::Eq(operand) => equals(cell, operand),
            Condition::In(operands) => {
                for operand in operands {
                    if equals(cell, operand)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Range { lower, upper } => within(lower, upper, |op| compare(cell, op)),
            Condition::LengthRange { lower, upper } => {
                within(lower, upper, |op| compare_length(cell, op))
            }
        }
    }
}

fn map_operands<F>(condition: &Condition, mut f: F) -> Result<Condition, Error>
where
    F: FnMut(&Operand) -> Result<Operand, Error>,
{
    fn bound<F>(b: Option<&Bound>, f: &mut F) -> Result<Option<Bound>, Error>
    where
        F: FnMut(&Operand) -> Result<Operand, Error>,
    {
        b.map(|b| Ok(Bound { operand: f(&b.operand)?, inclusive: b.inclusive })).transpose()
    }

    let condition = match condition {
        Condition::Eq(op) => Condition::Eq(f(op)?),
        Condition::In(ops) => Condition::In(ops.iter().map(&mut f).collect::<Result<_, _>>()?),
        Condition::Range { lower, upper } => Condition::Range {
            lower: bound(lower.as_ref(), &mut f)?,
            upper: bound(upper.as_ref(), &mut f)?,
        },
        Condition::LengthRange { lower, upper } => Condition::LengthRange {
            lower: bound(lower.as_ref(), &mut f)?,
            upper: bound(upper.as_ref(), &mut f)?,
        },
    };
    Ok(condition)
}

fn unbound(operand: &Operand) -> Error {
    match operand {
        Operand::Placeholder(i) => {
            Error::Configuration(format!("placeholder {i} must be bound before evaluation"))
        }
        _ => Error::Configuration(
            "operand does not match the stored representation; rewrite the predicate first"
                .to_string(),
        ),
    }
}

fn equals(cell: &Cell, operand: &Operand) -> Result<bool, Error> {
    match (cell, operand) {
        (_, Operand::Literal(Value::Null)) => Ok(cell.is_null()),
        (Cell::Plain(value), Operand::Literal(literal)) => {
            Ok(value.compare(literal) == Some(Ordering::Equal))
        }
        (Cell::Encrypted(None) | Cell::Plain(Value::Null), Operand::Encrypted(_)) => Ok(false),
        (Cell::Encrypted(Some(stored)), Operand::Encrypted(literal)) => {
            Ok(stored.equals(literal)? == Some(true))
        }
        _ => Err(unbound(operand)),
    }
}

fn compare(cell: &Cell, operand: &Operand) -> Result<Option<Ordering>, Error> {
    match (cell, operand) {
        (Cell::Plain(value), Operand::Literal(literal)) => Ok(value.compare(literal)),
        (Cell::Encrypted(None) | Cell::Plain(Value::Null), Operand::Encrypted(_)) => Ok(None),
        (Cell::Encrypted(Some(stored)), Operand::Encrypted(literal)) => stored.compare(literal),
        _ => Err(unbound(operand)),
    }
}

fn compare_length(cell: &Cell, operand: &Operand) -> Result<Option<Ordering>, Error> {
    match (cell, operand) {
        (Cell::Plain(Value::Text(s)), Operand::Literal(Value::Integer(n))) => {
            Ok(Some(i128::try_from(s.chars().count()).map_or(Ordering::Greater, |len| len.cmp(n))))
        }
        (Cell::Plain(_), Operand::Literal(_))
        | (Cell::Encrypted(None), _)
        | (Cell::Plain(Value::Null), Operand::EncryptedLength(_)) => Ok(None),
        (Cell::Encrypted(Some(stored)), Operand::EncryptedLength(literal)) => {
            stored.compare_length(literal)
        }
        _ => Err(unbound(operand)),
    }
}

fn within(
    lower: &Option<Bound>,
    upper: &Option<Bound>,
    mut cmp: impl FnMut(&Operand) -> Result<Option<Ordering>, Error>,
) -> Result<bool, Error> {
    if let Some(bound) = lower {
        match cmp(&bound.operand)? {
            Some(Ordering::Greater) => {}
            Some(Ordering::Equal) if bound.inclusive => {}
            _ => return Ok(false),
        }
    }
    if let Some(bound) = upper {
        match cmp(&bound.operand)? {
            Some(Ordering::Less) => {}
            Some(Ordering::Equal) if bound.inclusive => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}

/// Rewrites predicates on encrypted attributes into ciphertext form.
#[derive(Debug, Clone, Copy)]
pub struct PredicateRewriter<'a, 'k> {
    interceptor: &'a Interceptor<'k>,
}

impl<'a, 'k> PredicateRewriter<'a, 'k> {
    /// Creates a rewriter for the interceptor's model.
    #[must_use]
    pub const fn new(interceptor: &'a Interceptor<'k>) -> Self {
        Self { interceptor }
    }

    /// Rewrites one predicate.
    ///
    /// Literals are encoded independently; bound flags, element order and
    /// duplicates are preserved. Operands that are already encrypted and
    /// placeholders pass through, as do predicates on plain attributes.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for unknown attributes, no-query
    /// attributes, text ranges without ordering and length ranges on
    /// non-text attributes. Literals the attribute's type rejects produce
    /// validation or range errors.
    pub fn rewrite(&self, predicate: &Predicate) -> Result<Predicate, Error> {
        let schema = self.interceptor.schema();
        let attribute = predicate.attribute.as_str();
        let descriptor = schema.attribute(attribute).ok_or_else(|| {
            Error::Configuration(format!(
                "{} has no attribute named {attribute}",
                schema.relation()
            ))
        })?;
        let Some(ty) = descriptor.encrypted_type() else {
            return Ok(predicate.clone());
        };

        if descriptor.options().safety() == SafetyMode::NoQuery {
            return Err(Error::Configuration(format!(
                "{}.{attribute} is a no-query attribute and cannot be used in predicates",
                schema.relation()
            )));
        }

        let condition = match &predicate.condition {
            Condition::Range { .. }
                if ty == EncryptedType::Text && !descriptor.options().is_ordered() =>
            {
                return Err(Error::Configuration(format!(
                    "range queries on {}.{attribute} need ordering enabled",
                    schema.relation()
                )));
            }
            Condition::LengthRange { .. } if ty != EncryptedType::Text => {
                return Err(Error::Configuration(format!(
                    "length queries need a text attribute, {attribute} is {ty}"
                )));
            }
            Condition::LengthRange { .. } => {
                map_operands(&predicate.condition, |op| self.rewrite_length(attribute, op))?
            }
            other => map_operands(other, |op| self.rewrite_operand(attribute, op))?,
        };

        Ok(Predicate::new(attribute, condition))
    }

    /// Rewrites a conjunction of predicates.
    ///
    /// # Errors
    ///
    /// Returns the first rewriting error.
    pub fn rewrite_all(&self, predicates: &[Predicate]) -> Result<Vec<Predicate>, Error> {
        predicates.iter().map(|p| self.rewrite(p)).collect()
    }

    fn rewrite_operand(&self, attribute: &str, operand: &Operand) -> Result<Operand, Error> {
        match operand {
            Operand::Literal(Value::Null) => Ok(operand.clone()),
            Operand::Literal(value) => self
                .interceptor
                .literal_encode(attribute, value)?
                .map(Operand::Encrypted)
                .ok_or_else(|| Error::Validation("literal encoded to null".to_string())),
            Operand::EncryptedLength(_) => Err(Error::Configuration(
                "length ciphertexts can only be used in length ranges".to_string(),
            )),
            Operand::Encrypted(_) | Operand::Placeholder(_) => Ok(operand.clone()),
        }
    }

    fn rewrite_length(&self, attribute: &str, operand: &Operand) -> Result<Operand, Error> {
        match operand {
            Operand::Literal(Value::Integer(n)) => {
                let length = u32::try_from(*n)
                    .map_err(|_| Error::Range(format!("text length {n} is out of range")))?;
                self.interceptor
                    .encode_length_query(attribute, length)
                    .map(Operand::EncryptedLength)
            }
            Operand::Literal(other) => Err(Error::Validation(format!(
                "text length must be an integer, got {}",
                other.type_name()
            ))),
            Operand::Encrypted(_) => Err(Error::Configuration(
                "value ciphertexts cannot be used as length bounds".to_string(),
            )),
            Operand::EncryptedLength(_) | Operand::Placeholder(_) => Ok(operand.clone()),
        }
    }
}
