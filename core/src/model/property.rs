//! Typed property cells
//!
//! A property is the unit of data in a run's Property Store. Its `name` is the
//! key it is stored under; `reference` names another property whose value is
//! resolved at use time.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Literal date format used by SET and by the string form of DATE properties
pub const DATE_FORMAT: &str = "%d.%m.%Y";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyType {
    Boolean,
    String,
    Integer,
    Long,
    Double,
    Date,
    Xml,
    Xpath,
    File,
    Sql,
    List,
}

/// Value of a property, `None` meaning the cell is null
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyValue {
    Boolean(Option<bool>),
    String(Option<String>),
    Integer(Option<i32>),
    Long(Option<i64>),
    Double(Option<f64>),
    Date(Option<DateTime<Utc>>),
    Xml(Option<String>),
    Xpath(Option<String>),
    File(Option<String>),
    Sql(Option<String>),
    List(Vec<Property>),
}

impl PropertyValue {
    /// A null value of the given type (an empty list for LIST)
    pub fn null_of(kind: PropertyType) -> Self {
        match kind {
            PropertyType::Boolean => PropertyValue::Boolean(None),
            PropertyType::String => PropertyValue::String(None),
            PropertyType::Integer => PropertyValue::Integer(None),
            PropertyType::Long => PropertyValue::Long(None),
            PropertyType::Double => PropertyValue::Double(None),
            PropertyType::Date => PropertyValue::Date(None),
            PropertyType::Xml => PropertyValue::Xml(None),
            PropertyType::Xpath => PropertyValue::Xpath(None),
            PropertyType::File => PropertyValue::File(None),
            PropertyType::Sql => PropertyValue::Sql(None),
            PropertyType::List => PropertyValue::List(Vec::new()),
        }
    }

    pub fn kind(&self) -> PropertyType {
        match self {
            PropertyValue::Boolean(_) => PropertyType::Boolean,
            PropertyValue::String(_) => PropertyType::String,
            PropertyValue::Integer(_) => PropertyType::Integer,
            PropertyValue::Long(_) => PropertyType::Long,
            PropertyValue::Double(_) => PropertyType::Double,
            PropertyValue::Date(_) => PropertyType::Date,
            PropertyValue::Xml(_) => PropertyType::Xml,
            PropertyValue::Xpath(_) => PropertyType::Xpath,
            PropertyValue::File(_) => PropertyType::File,
            PropertyValue::Sql(_) => PropertyType::Sql,
            PropertyValue::List(_) => PropertyType::List,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Property {
    pub name: String,

    /// Resolve the value from this property instead, at use time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    #[serde(flatten)]
    pub value: PropertyValue,
}

impl Property {
    pub fn new(name: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            reference: None,
            value,
        }
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, PropertyValue::String(Some(value.into())))
    }

    pub fn boolean(name: impl Into<String>, value: bool) -> Self {
        Self::new(name, PropertyValue::Boolean(Some(value)))
    }

    pub fn integer(name: impl Into<String>, value: i32) -> Self {
        Self::new(name, PropertyValue::Integer(Some(value)))
    }

    pub fn long(name: impl Into<String>, value: i64) -> Self {
        Self::new(name, PropertyValue::Long(Some(value)))
    }

    pub fn double(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, PropertyValue::Double(Some(value)))
    }

    pub fn date(name: impl Into<String>, value: DateTime<Utc>) -> Self {
        Self::new(name, PropertyValue::Date(Some(value)))
    }

    pub fn list(name: impl Into<String>, items: Vec<Property>) -> Self {
        Self::new(name, PropertyValue::List(items))
    }

    /// A property that takes its value from `target` when resolved
    pub fn reference(name: impl Into<String>, kind: PropertyType, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference: Some(target.into()),
            value: PropertyValue::null_of(kind),
        }
    }

    pub fn kind(&self) -> PropertyType {
        self.value.kind()
    }

    /// Independent copy stored under another name
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference: self.reference.clone(),
            value: self.value.clone(),
        }
    }

    /// Scalars are null when unset; lists are never null
    pub fn is_null(&self) -> bool {
        match &self.value {
            PropertyValue::Boolean(v) => v.is_none(),
            PropertyValue::String(v)
            | PropertyValue::Xml(v)
            | PropertyValue::Xpath(v)
            | PropertyValue::File(v)
            | PropertyValue::Sql(v) => v.is_none(),
            PropertyValue::Integer(v) => v.is_none(),
            PropertyValue::Long(v) => v.is_none(),
            PropertyValue::Double(v) => v.is_none(),
            PropertyValue::Date(v) => v.is_none(),
            PropertyValue::List(_) => false,
        }
    }

    /// String form used by log lines and condition comparands
    pub fn as_string(&self) -> Option<String> {
        match &self.value {
            PropertyValue::Boolean(v) => v.map(|b| b.to_string()),
            PropertyValue::String(v)
            | PropertyValue::Xml(v)
            | PropertyValue::Xpath(v)
            | PropertyValue::File(v)
            | PropertyValue::Sql(v) => v.clone(),
            PropertyValue::Integer(v) => v.map(|n| n.to_string()),
            PropertyValue::Long(v) => v.map(|n| n.to_string()),
            PropertyValue::Double(v) => v.map(|n| n.to_string()),
            PropertyValue::Date(v) => v.map(|d| d.format(DATE_FORMAT).to_string()),
            PropertyValue::List(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|p| p.as_string().unwrap_or_else(|| "null".to_string()))
                    .collect();
                Some(format!("[{}]", parts.join(", ")))
            }
        }
    }

    pub fn items(&self) -> Option<&[Property]> {
        match &self.value {
            PropertyValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Null the value, keeping the type; empties a list
    pub fn clear(&mut self) {
        self.value = PropertyValue::null_of(self.kind());
    }

    /// Parse `literal` according to this property's type and assign it
    pub fn set_from_str(&mut self, literal: &str) -> Result<(), String> {
        let trimmed = literal.trim();
        self.value = match self.kind() {
            PropertyType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" => PropertyValue::Boolean(Some(true)),
                "false" => PropertyValue::Boolean(Some(false)),
                _ => return Err(format!("'{}' is not a boolean", literal)),
            },
            PropertyType::Integer => PropertyValue::Integer(Some(
                trimmed
                    .parse()
                    .map_err(|_| format!("'{}' is not an integer", literal))?,
            )),
            PropertyType::Long => PropertyValue::Long(Some(
                trimmed
                    .parse()
                    .map_err(|_| format!("'{}' is not a long", literal))?,
            )),
            PropertyType::Double => PropertyValue::Double(Some(
                trimmed
                    .parse()
                    .map_err(|_| format!("'{}' is not a double", literal))?,
            )),
            PropertyType::Date => PropertyValue::Date(Some(parse_date(trimmed).ok_or_else(
                || format!("'{}' does not match date format dd.MM.yyyy", literal),
            )?)),
            PropertyType::String => PropertyValue::String(Some(literal.to_string())),
            PropertyType::Xml => PropertyValue::Xml(Some(literal.to_string())),
            PropertyType::Xpath => PropertyValue::Xpath(Some(literal.to_string())),
            PropertyType::File => PropertyValue::File(Some(literal.to_string())),
            PropertyType::Sql => PropertyValue::Sql(Some(literal.to_string())),
            PropertyType::List => {
                return Err("a LIST property cannot be set from a literal".to_string())
            }
        };
        Ok(())
    }
}

/// Parse a `dd.MM.yyyy` literal to midnight UTC
pub fn parse_date(literal: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(literal, DATE_FORMAT).ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight))
}
