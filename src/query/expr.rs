//! Aggregation expression evaluation
//!
//! Evaluation yields `Option<Bson>`: `None` is a missing value, which
//! `$project` and `$addFields` drop instead of writing as null.

use bson::{Bson, DateTime, Document};
use chrono::Datelike;
use docql::{Expr, MetaField, Operator};
use std::cmp::Ordering;

use super::value::{as_f64, compare, is_nullish, resolve_field_path, truthy, type_name};
use crate::error::{Error, Result};

/// The document an expression is evaluated against
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub doc: &'a Document,
    pub text_score: Option<f64>,
}

impl<'a> Scope<'a> {
    pub fn new(doc: &'a Document) -> Self {
        Self { doc, text_score: None }
    }
}

fn fail(message: impl Into<String>) -> Error {
    Error::Query { message: message.into() }
}

pub fn evaluate(expr: &Expr, scope: Scope<'_>) -> Result<Option<Bson>> {
    match expr {
        Expr::Literal(value) => Ok(Some(value.clone())),
        Expr::FieldPath(path) => Ok(resolve_field_path(scope.doc, path)),
        Expr::Root => Ok(Some(Bson::Document(scope.doc.clone()))),
        Expr::Object(fields) => {
            let mut out = Document::new();
            for (name, item) in fields {
                if let Some(value) = evaluate(item, scope)? {
                    out.insert(name.clone(), value);
                }
            }
            Ok(Some(Bson::Document(out)))
        }
        Expr::Array(items) => {
            let values = items
                .iter()
                .map(|item| Ok(evaluate(item, scope)?.unwrap_or(Bson::Null)))
                .collect::<Result<Vec<_>>>()?;
            Ok(Some(Bson::Array(values)))
        }
        Expr::Cond { condition, then, otherwise } => {
            if truthy(evaluate(condition, scope)?.as_ref()) {
                evaluate(then, scope)
            } else {
                evaluate(otherwise, scope)
            }
        }
        Expr::Meta(MetaField::TextScore) => Ok(scope.text_score.map(Bson::Double)),
        Expr::Op { op, args } => {
            let values = args
                .iter()
                .map(|arg| evaluate(arg, scope))
                .collect::<Result<Vec<_>>>()?;
            apply(*op, values)
        }
    }
}

fn apply(op: Operator, args: Vec<Option<Bson>>) -> Result<Option<Bson>> {
    match op {
        Operator::Concat => concat(&args),
        Operator::Round => round(&args),
        Operator::Size => match args.first().cloned().flatten() {
            Some(Bson::Array(items)) => Ok(Some(Bson::Int32(items.len() as i32))),
            other => Err(fail(format!(
                "The argument to $size must be an array. Type of argument is: {}",
                other.as_ref().map_or("missing", type_name)
            ))),
        },
        Operator::IfNull => {
            let last = args.len().saturating_sub(1);
            for (i, value) in args.iter().enumerate() {
                if i == last || !is_nullish(value.as_ref()) {
                    return Ok(value.clone());
                }
            }
            Ok(None)
        }
        Operator::Eq | Operator::Ne | Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
            let left = args[0].clone().unwrap_or(Bson::Null);
            let right = args[1].clone().unwrap_or(Bson::Null);
            let ord = compare(&left, &right);
            let result = match op {
                Operator::Eq => ord == Ordering::Equal,
                Operator::Ne => ord != Ordering::Equal,
                Operator::Gt => ord == Ordering::Greater,
                Operator::Gte => ord != Ordering::Less,
                Operator::Lt => ord == Ordering::Less,
                _ => ord != Ordering::Greater,
            };
            Ok(Some(Bson::Boolean(result)))
        }
        Operator::And => Ok(Some(Bson::Boolean(args.iter().all(|v| truthy(v.as_ref()))))),
        Operator::Or => Ok(Some(Bson::Boolean(args.iter().any(|v| truthy(v.as_ref()))))),
        Operator::Not => Ok(Some(Bson::Boolean(!truthy(args[0].as_ref())))),
        Operator::Add => add(&args),
        Operator::Subtract => subtract(&args[0], &args[1]),
        Operator::Multiply => {
            let mut product = Number::Int(1);
            for value in &args {
                match value {
                    None | Some(Bson::Null) => return Ok(Some(Bson::Null)),
                    Some(v) => {
                        let n = Number::of(v)
                            .ok_or_else(|| fail(format!("$multiply only supports numeric types, not {}", type_name(v))))?;
                        product = product.mul(n);
                    }
                }
            }
            Ok(Some(product.into_bson()))
        }
        Operator::Divide => {
            let (Some(left), Some(right)) = (&args[0], &args[1]) else {
                return Ok(Some(Bson::Null));
            };
            if matches!(left, Bson::Null) || matches!(right, Bson::Null) {
                return Ok(Some(Bson::Null));
            }
            let (Some(x), Some(y)) = (as_f64(left), as_f64(right)) else {
                return Err(fail("$divide only supports numeric types"));
            };
            if y == 0.0 {
                return Err(fail("can't $divide by zero"));
            }
            Ok(Some(Bson::Double(x / y)))
        }
        Operator::Year | Operator::Month | Operator::DayOfMonth => match &args[0] {
            None | Some(Bson::Null) => Ok(Some(Bson::Null)),
            Some(Bson::DateTime(date)) => {
                let date = date.to_chrono();
                let part = match op {
                    Operator::Year => date.year(),
                    Operator::Month => date.month() as i32,
                    _ => date.day() as i32,
                };
                Ok(Some(Bson::Int32(part)))
            }
            Some(other) => Err(fail(format!("can't convert from BSON type {} to Date", type_name(other)))),
        },
        Operator::ToLower | Operator::ToUpper => {
            let text = match &args[0] {
                None | Some(Bson::Null) => String::new(),
                Some(Bson::String(s)) => s.clone(),
                Some(other) if as_f64(other).is_some() => other.to_string(),
                Some(other) => {
                    return Err(fail(format!("can't convert from BSON type {} to String", type_name(other))))
                }
            };
            Ok(Some(Bson::String(if op == Operator::ToLower {
                text.to_lowercase()
            } else {
                text.to_uppercase()
            })))
        }
    }
}

fn concat(args: &[Option<Bson>]) -> Result<Option<Bson>> {
    let mut out = String::new();
    for value in args {
        match value {
            None | Some(Bson::Null) | Some(Bson::Undefined) => return Ok(Some(Bson::Null)),
            Some(Bson::String(s)) => out.push_str(s),
            Some(other) => {
                return Err(fail(format!(
                    "$concat only supports strings, not {}",
                    type_name(other)
                )))
            }
        }
    }
    Ok(Some(Bson::String(out)))
}

fn round(args: &[Option<Bson>]) -> Result<Option<Bson>> {
    let places = match args.get(1).cloned().flatten() {
        None => 0,
        Some(v) => match as_f64(&v) {
            Some(p) if p.fract() == 0.0 && (-20.0..=100.0).contains(&p) => p as i32,
            _ => return Err(fail("$round requires an integral place between -20 and 100")),
        },
    };
    match args.first().cloned().flatten() {
        None | Some(Bson::Null) => Ok(Some(Bson::Null)),
        Some(Bson::Double(f)) => Ok(Some(Bson::Double(round_half_even(f, places)))),
        Some(v @ (Bson::Int32(_) | Bson::Int64(_))) if places >= 0 => Ok(Some(v)),
        Some(Bson::Int32(n)) => Ok(Some(Bson::Int32(round_half_even(f64::from(n), places) as i32))),
        Some(Bson::Int64(n)) => Ok(Some(Bson::Int64(round_half_even(n as f64, places) as i64))),
        Some(other) => Err(fail(format!("$round only supports numeric types, not {}", type_name(&other)))),
    }
}

/// Round to `places` decimal digits, ties to even
pub fn round_half_even(value: f64, places: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scale = 10f64.powi(places);
    let scaled = value * scale;
    let floor = scaled.floor();
    let diff = scaled - floor;
    let rounded = if (diff - 0.5).abs() < 1e-9 {
        if floor % 2.0 == 0.0 {
            floor
        } else {
            floor + 1.0
        }
    } else {
        scaled.round()
    };
    rounded / scale
}

fn add(args: &[Option<Bson>]) -> Result<Option<Bson>> {
    let mut total = Number::Int(0);
    let mut date: Option<DateTime> = None;
    for value in args {
        match value {
            None | Some(Bson::Null) => return Ok(Some(Bson::Null)),
            Some(Bson::DateTime(d)) => {
                if date.is_some() {
                    return Err(fail("only one date allowed in an $add expression"));
                }
                date = Some(*d);
            }
            Some(v) => {
                let n = Number::of(v)
                    .ok_or_else(|| fail(format!("$add only supports numeric or date types, not {}", type_name(v))))?;
                total = total.add(n);
            }
        }
    }
    Ok(Some(match date {
        Some(d) => Bson::DateTime(DateTime::from_millis(d.timestamp_millis() + total.as_f64() as i64)),
        None => total.into_bson(),
    }))
}

fn subtract(left: &Option<Bson>, right: &Option<Bson>) -> Result<Option<Bson>> {
    match (left, right) {
        (None, _) | (_, None) | (Some(Bson::Null), _) | (_, Some(Bson::Null)) => Ok(Some(Bson::Null)),
        (Some(Bson::DateTime(a)), Some(Bson::DateTime(b))) => {
            Ok(Some(Bson::Int64(a.timestamp_millis() - b.timestamp_millis())))
        }
        (Some(Bson::DateTime(a)), Some(b)) => {
            let ms = as_f64(b).ok_or_else(|| fail("cant $subtract a non-number from a date"))?;
            Ok(Some(Bson::DateTime(DateTime::from_millis(a.timestamp_millis() - ms as i64))))
        }
        (Some(a), Some(b)) => match (Number::of(a), Number::of(b)) {
            (Some(x), Some(y)) => Ok(Some(x.add(y.negate()).into_bson())),
            _ => Err(fail(format!(
                "cant $subtract a {} from a {}",
                type_name(b),
                type_name(a)
            ))),
        },
    }
}

/// Arithmetic that keeps integers integral until a double appears
#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Double(f64),
}

impl Number {
    fn of(value: &Bson) -> Option<Self> {
        match value {
            Bson::Int32(n) => Some(Number::Int(i64::from(*n))),
            Bson::Int64(n) => Some(Number::Int(*n)),
            Bson::Double(f) => Some(Number::Double(*f)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Double(f) => f,
        }
    }

    fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => match a.checked_add(b) {
                Some(sum) => Number::Int(sum),
                None => Number::Double(a as f64 + b as f64),
            },
            (a, b) => Number::Double(a.as_f64() + b.as_f64()),
        }
    }

    fn mul(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => match a.checked_mul(b) {
                Some(product) => Number::Int(product),
                None => Number::Double(a as f64 * b as f64),
            },
            (a, b) => Number::Double(a.as_f64() * b.as_f64()),
        }
    }

    fn negate(self) -> Number {
        match self {
            Number::Int(n) => Number::Int(-n),
            Number::Double(f) => Number::Double(-f),
        }
    }

    fn into_bson(self) -> Bson {
        match self {
            Number::Int(n) => match i32::try_from(n) {
                Ok(small) => Bson::Int32(small),
                Err(_) => Bson::Int64(n),
            },
            Number::Double(f) => Bson::Double(f),
        }
    }
}

/// Running sum shared with the `$sum` accumulator
pub(crate) fn sum(values: impl Iterator<Item = Bson>) -> Bson {
    values
        .filter_map(|v| Number::of(&v))
        .fold(Number::Int(0), Number::add)
        .into_bson()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn eval(expr: Bson, doc: &Document) -> Result<Option<Bson>> {
        evaluate(&docql::expr(&expr).unwrap(), Scope::new(doc))
    }

    #[test]
    fn test_concat_names() {
        let d = doc! { "info": { "first_name": "Ada", "last_name": "Lovelace" } };
        let value = eval(
            Bson::Document(doc! { "$concat": ["$info.first_name", " ", "$info.last_name"] }),
            &d,
        )
        .unwrap();
        assert_eq!(value, Some(Bson::String("Ada Lovelace".into())));

        let value = eval(Bson::Document(doc! { "$concat": ["$missing", "x"] }), &d).unwrap();
        assert_eq!(value, Some(Bson::Null));
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_half_even(2.5, 0), 2.0);
        assert_eq!(round_half_even(3.5, 0), 4.0);
        assert_eq!(round_half_even(87.456, 2), 87.46);
        assert_eq!(round_half_even(12.125, 2), 12.12);
    }

    #[test]
    fn test_completion_rate_expression() {
        let rate = Bson::Document(doc! {
            "$cond": [
                { "$eq": ["$total", 0] },
                0,
                { "$multiply": [{ "$divide": ["$completed", "$total"] }, 100] }
            ]
        });
        assert_eq!(eval(rate.clone(), &doc! { "total": 4, "completed": 1 }).unwrap(), Some(Bson::Double(25.0)));
        assert_eq!(eval(rate, &doc! { "total": 0, "completed": 0 }).unwrap(), Some(Bson::Int32(0)));
    }

    #[test]
    fn test_divide_by_zero_fails() {
        let err = eval(Bson::Document(doc! { "$divide": [1, 0] }), &doc! {}).unwrap_err();
        assert!(err.to_string().contains("divide by zero"));
    }

    #[test]
    fn test_date_parts() {
        use chrono::TimeZone;
        let date = DateTime::from_chrono(chrono::Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap());
        let d = doc! { "enrollment_date": date };
        assert_eq!(eval(Bson::Document(doc! { "$year": "$enrollment_date" }), &d).unwrap(), Some(Bson::Int32(2024)));
        assert_eq!(eval(Bson::Document(doc! { "$month": "$enrollment_date" }), &d).unwrap(), Some(Bson::Int32(3)));
    }

    #[test]
    fn test_size_and_if_null() {
        let d = doc! { "students": ["a", "b", "c"] };
        assert_eq!(eval(Bson::Document(doc! { "$size": "$students" }), &d).unwrap(), Some(Bson::Int32(3)));
        assert!(eval(Bson::Document(doc! { "$size": "$missing" }), &d).is_err());
        assert_eq!(
            eval(Bson::Document(doc! { "$ifNull": ["$missing", "none"] }), &d).unwrap(),
            Some(Bson::String("none".into()))
        );
    }

    #[test]
    fn test_missing_field_stays_missing() {
        assert_eq!(eval(Bson::String("$nope".into()), &doc! {}).unwrap(), None);
    }
}
