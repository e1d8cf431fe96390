//! Condition evaluation
//!
//! Pure function of (operand property, operator, comparand literal). A null
//! property counts as absent. Ordering operators compare numerically: DATE by
//! epoch millis, LIST by element count.

use std::cmp::Ordering;

use thiserror::Error;

use crate::model::property::parse_date;
use crate::model::{Operator, Property, PropertyType, PropertyValue};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConditionError {
    #[error("Operator {operator:?} is not supported for {kind:?} properties")]
    Unsupported {
        operator: Operator,
        kind: PropertyType,
    },

    #[error("'{literal}' cannot be compared with a {kind:?} property")]
    Unparsable { literal: String, kind: PropertyType },
}

pub fn evaluate(
    property: Option<&Property>,
    operator: Operator,
    literal: Option<&str>,
) -> Result<bool, ConditionError> {
    let operand = property.filter(|p| !p.is_null());

    match operator {
        Operator::Equals => equals(operand, literal),
        Operator::NotEquals => equals(operand, literal).map(|eq| !eq),
        Operator::Gt => ordered(operand, literal, false, operator, Ordering::is_gt),
        Operator::Gte => ordered(operand, literal, true, operator, Ordering::is_ge),
        Operator::Lt => ordered(operand, literal, false, operator, Ordering::is_lt),
        Operator::Lte => ordered(operand, literal, true, operator, Ordering::is_le),
        Operator::True => boolean(property, operator, true),
        Operator::False => boolean(property, operator, false),
        Operator::IsNull => Ok(operand.is_none()),
        Operator::NotNull => Ok(operand.is_some()),
        Operator::IsEmpty => Ok(is_empty(operand)),
        Operator::NotEmpty => Ok(!is_empty(operand)),
    }
}

fn equals(operand: Option<&Property>, literal: Option<&str>) -> Result<bool, ConditionError> {
    let (property, literal) = match (operand, literal) {
        (None, None) => return Ok(true),
        (Some(property), Some(literal)) => (property, literal),
        _ => return Ok(false),
    };

    match &property.value {
        PropertyValue::Boolean(Some(b)) => match literal.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(*b),
            "false" => Ok(!*b),
            _ => Err(unparsable(property, literal)),
        },
        PropertyValue::Integer(_)
        | PropertyValue::Long(_)
        | PropertyValue::Double(_)
        | PropertyValue::Date(_)
        | PropertyValue::List(_) => compare(property, literal, Operator::Equals).map(Ordering::is_eq),
        _ => Ok(property.as_string().as_deref() == Some(literal)),
    }
}

fn ordered(
    operand: Option<&Property>,
    literal: Option<&str>,
    both_absent: bool,
    operator: Operator,
    accept: fn(Ordering) -> bool,
) -> Result<bool, ConditionError> {
    match (operand, literal) {
        (None, None) => Ok(both_absent),
        (Some(property), Some(literal)) => compare(property, literal, operator).map(accept),
        _ => Ok(false),
    }
}

/// `property` against a non-null literal, numerically
fn compare(property: &Property, literal: &str, operator: Operator) -> Result<Ordering, ConditionError> {
    let trimmed = literal.trim();
    match &property.value {
        PropertyValue::Integer(Some(v)) => compare_long(i64::from(*v), property, literal),
        PropertyValue::Long(Some(v)) => compare_long(*v, property, literal),
        PropertyValue::List(items) => compare_long(items.len() as i64, property, literal),
        PropertyValue::Date(Some(d)) => {
            let rhs = trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| parse_date(trimmed).map(|date| date.timestamp_millis()))
                .ok_or_else(|| unparsable(property, literal))?;
            Ok(d.timestamp_millis().cmp(&rhs))
        }
        PropertyValue::Double(Some(v)) => {
            let rhs: f64 = trimmed.parse().map_err(|_| unparsable(property, literal))?;
            v.partial_cmp(&rhs).ok_or_else(|| unparsable(property, literal))
        }
        _ => Err(ConditionError::Unsupported {
            operator,
            kind: property.kind(),
        }),
    }
}

fn compare_long(lhs: i64, property: &Property, literal: &str) -> Result<Ordering, ConditionError> {
    let rhs: i64 = literal
        .trim()
        .parse()
        .map_err(|_| unparsable(property, literal))?;
    Ok(lhs.cmp(&rhs))
}

fn boolean(property: Option<&Property>, operator: Operator, expected: bool) -> Result<bool, ConditionError> {
    match property {
        None => Ok(false),
        Some(p) => match &p.value {
            PropertyValue::Boolean(v) => Ok(*v == Some(expected)),
            _ => Err(ConditionError::Unsupported {
                operator,
                kind: p.kind(),
            }),
        },
    }
}

fn is_empty(operand: Option<&Property>) -> bool {
    match operand {
        None => true,
        Some(p) => match &p.value {
            PropertyValue::List(items) => items.is_empty(),
            _ => p.as_string().map_or(true, |s| s.is_empty()),
        },
    }
}

fn unparsable(property: &Property, literal: &str) -> ConditionError {
    ConditionError::Unparsable {
        literal: literal.to_string(),
        kind: property.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::property::parse_date;

    #[test]
    fn test_equals_strings() {
        let x = Property::string("name", "X");
        assert_eq!(evaluate(Some(&x), Operator::Equals, Some("X")), Ok(true));
        assert_eq!(evaluate(Some(&x), Operator::Equals, Some("Y")), Ok(false));
        assert_eq!(evaluate(Some(&x), Operator::NotEquals, Some("Y")), Ok(true));
    }

    #[test]
    fn test_equals_absent_operands() {
        assert_eq!(evaluate(None, Operator::Equals, None), Ok(true));
        assert_eq!(evaluate(None, Operator::Equals, Some("X")), Ok(false));
        assert_eq!(evaluate(None, Operator::NotEquals, Some("X")), Ok(true));

        let null = Property::new("n", PropertyValue::String(None));
        assert_eq!(evaluate(Some(&null), Operator::Equals, None), Ok(true));
    }

    #[test]
    fn test_equals_numbers() {
        let n = Property::integer("n", 42);
        assert_eq!(evaluate(Some(&n), Operator::Equals, Some(" 42 ")), Ok(true));
        assert!(evaluate(Some(&n), Operator::Equals, Some("forty-two")).is_err());

        let d = Property::double("d", 1.5);
        assert_eq!(evaluate(Some(&d), Operator::Equals, Some("1.50")), Ok(true));
    }

    #[test]
    fn test_ordering_operators() {
        let n = Property::long("n", 10);
        assert_eq!(evaluate(Some(&n), Operator::Gt, Some("9")), Ok(true));
        assert_eq!(evaluate(Some(&n), Operator::Gte, Some("10")), Ok(true));
        assert_eq!(evaluate(Some(&n), Operator::Lt, Some("10")), Ok(false));
        assert_eq!(evaluate(Some(&n), Operator::Lte, Some("11")), Ok(true));
    }

    #[test]
    fn test_ordering_with_absent_operands() {
        assert_eq!(evaluate(None, Operator::Gt, Some("1")), Ok(false));
        assert_eq!(evaluate(None, Operator::Lt, None), Ok(false));
        assert_eq!(evaluate(None, Operator::Gte, None), Ok(true));
        assert_eq!(evaluate(None, Operator::Lte, None), Ok(true));
        assert_eq!(evaluate(None, Operator::Gte, Some("1")), Ok(false));
    }

    #[test]
    fn test_ordering_on_strings_is_unsupported() {
        let s = Property::string("s", "b");
        assert_eq!(
            evaluate(Some(&s), Operator::Gt, Some("a")),
            Err(ConditionError::Unsupported {
                operator: Operator::Gt,
                kind: PropertyType::String
            })
        );
    }

    #[test]
    fn test_dates_compare_by_millis_or_literal() {
        let due = Property::date("due", parse_date("13.12.2012").unwrap());
        assert_eq!(evaluate(Some(&due), Operator::Equals, Some("13.12.2012")), Ok(true));
        assert_eq!(evaluate(Some(&due), Operator::Lt, Some("01.01.2013")), Ok(true));

        let millis = parse_date("13.12.2012").unwrap().timestamp_millis().to_string();
        assert_eq!(evaluate(Some(&due), Operator::Gte, Some(millis.as_str())), Ok(true));
    }

    #[test]
    fn test_list_compares_by_count() {
        let xs = Property::list("xs", vec![Property::integer("", 1), Property::integer("", 2)]);
        assert_eq!(evaluate(Some(&xs), Operator::Equals, Some("2")), Ok(true));
        assert_eq!(evaluate(Some(&xs), Operator::Gt, Some("2")), Ok(false));
    }

    #[test]
    fn test_boolean_operators() {
        let yes = Property::boolean("flag", true);
        assert_eq!(evaluate(Some(&yes), Operator::True, None), Ok(true));
        assert_eq!(evaluate(Some(&yes), Operator::False, None), Ok(false));
        assert_eq!(evaluate(None, Operator::True, None), Ok(false));

        let s = Property::string("s", "true");
        assert!(evaluate(Some(&s), Operator::True, None).is_err());
    }

    #[test]
    fn test_null_and_empty() {
        let empty = Property::string("s", "");
        let null = Property::new("s", PropertyValue::String(None));
        let xs = Property::list("xs", vec![]);

        assert_eq!(evaluate(Some(&null), Operator::IsNull, None), Ok(true));
        assert_eq!(evaluate(Some(&empty), Operator::NotNull, None), Ok(true));
        assert_eq!(evaluate(Some(&empty), Operator::IsEmpty, None), Ok(true));
        assert_eq!(evaluate(Some(&xs), Operator::IsEmpty, None), Ok(true));
        assert_eq!(evaluate(None, Operator::NotEmpty, None), Ok(false));
    }
}
