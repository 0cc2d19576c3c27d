//! Value types shared by the catalog, the syntax tree and the planner.

use crate::error::{PlanError, PlanResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Column storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Null,
    Tiny,
    Long,
    LongLong,
    Double,
    NewDecimal,
    Varchar,
    Blob,
    Date,
    Datetime,
    Json,
    Bit,
}

impl DataType {
    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::Tiny | DataType::Long | DataType::LongLong | DataType::Bit)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, DataType::Varchar | DataType::Blob | DataType::Json)
    }

    /// Display length used when none is declared.
    pub fn default_flen(&self) -> i32 {
        match self {
            DataType::Null => 0,
            DataType::Tiny => 4,
            DataType::Long => 11,
            DataType::LongLong => 20,
            DataType::Double => 22,
            DataType::NewDecimal => 10,
            DataType::Varchar => 255,
            DataType::Blob => 65535,
            DataType::Date => 10,
            DataType::Datetime => 19,
            DataType::Json => i32::MAX,
            DataType::Bit => 1,
        }
    }
}

/// Full type of a column or expression result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldType {
    pub tp: DataType,
    pub flen: i32,
    pub decimal: i32,
    pub unsigned: bool,
    pub not_null: bool,
}

impl FieldType {
    pub fn new(tp: DataType) -> Self {
        Self {
            tp,
            flen: tp.default_flen(),
            decimal: 0,
            unsigned: false,
            not_null: false,
        }
    }

    pub fn with_flen(mut self, flen: i32) -> Self {
        self.flen = flen;
        self
    }

    pub fn with_not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn with_unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    /// Result type of a nullable expression.
    pub fn nullable(mut self) -> Self {
        self.not_null = false;
        self
    }
}

impl Default for FieldType {
    fn default() -> Self {
        FieldType::new(DataType::Null)
    }
}

/// A typed constant value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Int(i64),
    Uint(u64),
    Float(f64),
    /// Decimal kept in its textual form.
    Decimal(String),
    String(String),
    Bytes(Vec<u8>),
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Datum::Null, Datum::Null) => true,
            (Datum::Int(a), Datum::Int(b)) => a == b,
            (Datum::Uint(a), Datum::Uint(b)) => a == b,
            (Datum::Float(a), Datum::Float(b)) => a.to_bits() == b.to_bits(),
            (Datum::Decimal(a), Datum::Decimal(b)) => a == b,
            (Datum::String(a), Datum::String(b)) => a == b,
            (Datum::Bytes(a), Datum::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Datum {}

impl Hash for Datum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Datum::Null => {}
            Datum::Int(v) => v.hash(state),
            Datum::Uint(v) => v.hash(state),
            Datum::Float(v) => v.to_bits().hash(state),
            Datum::Decimal(v) | Datum::String(v) => v.hash(state),
            Datum::Bytes(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Int(v) => write!(f, "{v}"),
            Datum::Uint(v) => write!(f, "{v}"),
            Datum::Float(v) => write!(f, "{v}"),
            Datum::Decimal(v) | Datum::String(v) => write!(f, "{v}"),
            Datum::Bytes(v) => write!(f, "{}", String::from_utf8_lossy(v)),
        }
    }
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// The natural field type of a literal.
    pub fn field_type(&self) -> FieldType {
        match self {
            Datum::Null => FieldType::new(DataType::Null),
            Datum::Int(_) => FieldType::new(DataType::LongLong).with_not_null(),
            Datum::Uint(_) => FieldType::new(DataType::LongLong).with_unsigned().with_not_null(),
            Datum::Float(_) => FieldType::new(DataType::Double).with_not_null(),
            Datum::Decimal(_) => FieldType::new(DataType::NewDecimal).with_not_null(),
            Datum::String(s) => FieldType::new(DataType::Varchar)
                .with_flen(s.chars().count() as i32)
                .with_not_null(),
            Datum::Bytes(b) => FieldType::new(DataType::Blob)
                .with_flen(b.len() as i32)
                .with_not_null(),
        }
    }

    /// Converts the value to the storage type of `col`.
    pub fn convert_to(&self, ft: &FieldType, col: &str) -> PlanResult<Datum> {
        let incorrect = || PlanError::InvalidValue(format!(
            "Incorrect value: '{self}' for column '{col}'"
        ));
        if self.is_null() {
            return Ok(Datum::Null);
        }
        match ft.tp {
            t if t.is_integer() => {
                let v: i128 = match self {
                    Datum::Int(v) => *v as i128,
                    Datum::Uint(v) => *v as i128,
                    Datum::Float(v) => v.round() as i128,
                    Datum::Decimal(s) | Datum::String(s) => {
                        let trimmed = s.trim();
                        match trimmed.parse::<i128>() {
                            Ok(v) => v,
                            Err(_) => trimmed.parse::<f64>().map_err(|_| incorrect())?.round() as i128,
                        }
                    }
                    Datum::Bytes(_) | Datum::Null => return Err(incorrect()),
                };
                if ft.unsigned {
                    u64::try_from(v).map(Datum::Uint).map_err(|_| incorrect())
                } else {
                    i64::try_from(v).map(Datum::Int).map_err(|_| incorrect())
                }
            }
            DataType::Double => match self {
                Datum::Int(v) => Ok(Datum::Float(*v as f64)),
                Datum::Uint(v) => Ok(Datum::Float(*v as f64)),
                Datum::Float(v) => Ok(Datum::Float(*v)),
                Datum::Decimal(s) | Datum::String(s) => {
                    s.trim().parse().map(Datum::Float).map_err(|_| incorrect())
                }
                _ => Err(incorrect()),
            },
            DataType::NewDecimal => match self {
                Datum::Decimal(s) => Ok(Datum::Decimal(s.clone())),
                Datum::String(s) if s.trim().parse::<f64>().is_ok() => {
                    Ok(Datum::Decimal(s.trim().to_string()))
                }
                Datum::Int(_) | Datum::Uint(_) | Datum::Float(_) => {
                    Ok(Datum::Decimal(self.to_string()))
                }
                _ => Err(incorrect()),
            },
            DataType::Blob => match self {
                Datum::Bytes(b) => Ok(Datum::Bytes(b.clone())),
                other => Ok(Datum::Bytes(other.to_string().into_bytes())),
            },
            _ => {
                let s = self.to_string();
                if ft.tp == DataType::Varchar && ft.flen > 0 && s.chars().count() > ft.flen as usize {
                    return Err(incorrect());
                }
                Ok(Datum::String(s))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_to_int() {
        let ft = FieldType::new(DataType::Long);
        assert_eq!(Datum::String("42".into()).convert_to(&ft, "a").unwrap(), Datum::Int(42));
        assert_eq!(Datum::Float(1.6).convert_to(&ft, "a").unwrap(), Datum::Int(2));
        assert!(Datum::String("abc".into()).convert_to(&ft, "a").is_err());
    }

    #[test]
    fn test_convert_to_unsigned_rejects_negative() {
        let ft = FieldType::new(DataType::LongLong).with_unsigned();
        let err = Datum::Int(-1).convert_to(&ft, "u").unwrap_err();
        assert!(err.to_string().contains("for column 'u'"));
    }

    #[test]
    fn test_convert_to_varchar_length() {
        let ft = FieldType::new(DataType::Varchar).with_flen(3);
        assert_eq!(
            Datum::Int(123).convert_to(&ft, "s").unwrap(),
            Datum::String("123".into())
        );
        assert!(Datum::Int(1234).convert_to(&ft, "s").is_err());
    }

    #[test]
    fn test_float_datum_hash_eq() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(Datum::Float(1.5));
        assert!(set.contains(&Datum::Float(1.5)));
        assert!(!set.contains(&Datum::Int(1)));
    }
}
