//! # Parameter Kinds
//!
//! The declared semantic type of a parameter or return value, and the rules
//! for coercing an incoming [`Value`] onto it.
//!
//! ## Invariants
//! - **Lossless**: a coercion either preserves the value exactly or fails.
//!   `"3"` becomes `3` in an integer slot; `"x"` and `3.5` do not.
//! - **Bounded**: nesting deeper than `MAX_DEPTH` is rejected rather than
//!   recursed into.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::value::Value;

/// The maximum nesting depth for coerced values.
pub const MAX_DEPTH: usize = 64;

/// Semantic type tag of a parameter or return value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "of", rename_all = "lowercase")]
pub enum Kind {
    Integer,
    Float,
    Boolean,
    String,
    /// Any JSON object, passed through untouched.
    Object,
    /// An object with a declared shape, see [`TypeDef`].
    Named(String),
    Array(Box<Kind>),
    /// Generic: accepts every value, including null.
    Any,
    /// No value. Only meaningful as a return kind.
    Unit,
}

impl Kind {
    pub fn array_of(inner: Kind) -> Self {
        Kind::Array(Box::new(inner))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Kind::Named(name.into())
    }

    /// Calls `f` for every type name this kind refers to.
    pub fn visit_named<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            Kind::Named(name) => f(name),
            Kind::Array(inner) => inner.visit_named(f),
            _ => {}
        }
    }

    /// Coerces `value` onto this kind.
    ///
    /// `shapes` resolves the fields of [`Kind::Named`] types.
    pub fn coerce(&self, value: Value, shapes: &dyn Shapes) -> Result<Value, CoerceError> {
        self.coerce_at(value, shapes, 0)
    }

    fn coerce_at(&self, value: Value, shapes: &dyn Shapes, depth: usize) -> Result<Value, CoerceError> {
        if depth > MAX_DEPTH {
            return Err(CoerceError::TooDeep);
        }

        match (self, value) {
            (Kind::Any, v) => Ok(v),
            (Kind::Unit, Value::Null) => Ok(Value::Null),

            (Kind::Integer, Value::Int(i)) => Ok(Value::Int(i)),
            (Kind::Integer, Value::Float(f)) if float_is_integral(f) => Ok(Value::Int(f as i64)),
            (Kind::Integer, Value::Str(s)) => match s.parse::<i64>() {
                Ok(i) => Ok(Value::Int(i)),
                Err(_) => Err(self.mismatch("non-numeric string")),
            },

            (Kind::Float, Value::Float(f)) => Ok(Value::Float(f)),
            (Kind::Float, Value::Int(i)) if int_fits_float(i) => Ok(Value::Float(i as f64)),
            (Kind::Float, Value::Str(s)) => match s.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Value::Float(f)),
                _ => Err(self.mismatch("non-numeric string")),
            },

            (Kind::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
            (Kind::Boolean, Value::Str(s)) => match s.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(self.mismatch("string")),
            },

            (Kind::String, Value::Str(s)) => Ok(Value::Str(s)),
            (Kind::String, Value::Int(i)) => Ok(Value::Str(i.to_string())),
            (Kind::String, Value::Float(f)) => Ok(Value::Str(f.to_string())),
            (Kind::String, Value::Bool(b)) => Ok(Value::Str(b.to_string())),

            (Kind::Object, Value::Object(fields)) => Ok(Value::Object(fields)),

            (Kind::Named(name), Value::Object(fields)) => {
                let def = shapes.shape(name).ok_or_else(|| CoerceError::UnknownType(name.clone()))?;
                coerce_fields(def, fields, shapes, depth)
            }

            (Kind::Array(inner), Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    let coerced = inner
                        .coerce_at(item, shapes, depth + 1)
                        .map_err(|e| e.nested(&format!("[{}]", i)))?;
                    out.push(coerced);
                }
                Ok(Value::Array(out))
            }

            (_, v) => Err(self.mismatch(v.type_name())),
        }
    }

    fn mismatch(&self, found: &'static str) -> CoerceError {
        CoerceError::Mismatch {
            expected: self.to_string(),
            found,
            path: String::new(),
        }
    }
}

fn coerce_fields(
    def: &TypeDef,
    mut fields: BTreeMap<String, Value>,
    shapes: &dyn Shapes,
    depth: usize,
) -> Result<Value, CoerceError> {
    for field in &def.fields {
        let Some(raw) = fields.remove(&field.name) else {
            return Err(CoerceError::MissingField {
                type_name: def.name.clone(),
                field: field.name.clone(),
            });
        };
        let coerced = field
            .kind
            .coerce_at(raw, shapes, depth + 1)
            .map_err(|e| e.nested(&format!(".{}", field.name)))?;
        fields.insert(field.name.clone(), coerced);
    }
    Ok(Value::Object(fields))
}

fn float_is_integral(f: f64) -> bool {
    // 2^63 itself is out of range, hence the strict upper bound.
    f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}

fn int_fits_float(i: i64) -> bool {
    (i as f64) as i128 == i as i128
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Integer => f.write_str("integer"),
            Kind::Float => f.write_str("float"),
            Kind::Boolean => f.write_str("boolean"),
            Kind::String => f.write_str("string"),
            Kind::Object => f.write_str("object"),
            Kind::Named(name) => f.write_str(name),
            Kind::Array(inner) => write!(f, "array<{}>", inner),
            Kind::Any => f.write_str("any"),
            Kind::Unit => f.write_str("unit"),
        }
    }
}

/// A named object shape: an ordered list of typed fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    pub fields: Vec<Field>,
}

impl TypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), fields: Vec::new() }
    }

    pub fn field(mut self, name: impl Into<String>, kind: Kind) -> Self {
        self.fields.push(Field { name: name.into(), kind });
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub kind: Kind,
}

/// Resolves type names to their declared shapes.
pub trait Shapes {
    fn shape(&self, name: &str) -> Option<&TypeDef>;
}

impl Shapes for BTreeMap<String, TypeDef> {
    fn shape(&self, name: &str) -> Option<&TypeDef> {
        self.get(name)
    }
}

/// No declared shapes.
impl Shapes for () {
    fn shape(&self, _name: &str) -> Option<&TypeDef> {
        None
    }
}

/// Why a value could not be coerced onto a kind.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CoerceError {
    #[error("expected {expected}, found {found}{}", location(.path))]
    Mismatch {
        expected: String,
        found: &'static str,
        path: String,
    },
    #[error("missing field '{field}' of {type_name}")]
    MissingField { type_name: String, field: String },
    #[error("undeclared type '{0}'")]
    UnknownType(String),
    #[error("value nested deeper than {} levels", MAX_DEPTH)]
    TooDeep,
}

impl CoerceError {
    /// Prefixes the location of a mismatch with an enclosing path segment.
    fn nested(self, segment: &str) -> Self {
        match self {
            CoerceError::Mismatch { expected, found, path } => CoerceError::Mismatch {
                expected,
                found,
                path: format!("{}{}", segment, path),
            },
            other => other,
        }
    }
}

fn location(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" at {}", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coerce(kind: Kind, value: Value) -> Result<Value, CoerceError> {
        kind.coerce(value, &())
    }

    #[test]
    fn test_integer_accepts_numeric_text_and_whole_floats() {
        assert_eq!(coerce(Kind::Integer, Value::Int(7)), Ok(Value::Int(7)));
        assert_eq!(coerce(Kind::Integer, Value::Str("-12".into())), Ok(Value::Int(-12)));
        assert_eq!(coerce(Kind::Integer, Value::Float(4.0)), Ok(Value::Int(4)));
    }

    #[test]
    fn test_integer_rejects_lossy_values() {
        assert!(coerce(Kind::Integer, Value::Float(4.5)).is_err());
        assert!(coerce(Kind::Integer, Value::Float(f64::INFINITY)).is_err());
        assert!(coerce(Kind::Integer, Value::Float(9.3e18)).is_err());
        assert!(coerce(Kind::Integer, Value::Str("x".into())).is_err());
        assert!(coerce(Kind::Integer, Value::Bool(true)).is_err());
        assert!(coerce(Kind::Integer, Value::Null).is_err());
    }

    #[test]
    fn test_float_rejects_integers_beyond_precision() {
        assert_eq!(coerce(Kind::Float, Value::Int(3)), Ok(Value::Float(3.0)));
        assert!(coerce(Kind::Float, Value::Int(i64::MAX)).is_err());
        assert!(coerce(Kind::Float, Value::Str("NaN".into())).is_err());
    }

    #[test]
    fn test_string_renders_scalars() {
        assert_eq!(coerce(Kind::String, Value::Int(3)), Ok(Value::Str("3".into())));
        assert_eq!(coerce(Kind::String, Value::Bool(false)), Ok(Value::Str("false".into())));
        assert!(coerce(Kind::String, Value::Array(vec![])).is_err());
    }

    #[test]
    fn test_array_reports_element_path() {
        let kind = Kind::array_of(Kind::Integer);
        let err = coerce(kind, Value::from(vec![Value::Int(1), Value::from("two")])).unwrap_err();
        assert_eq!(err.to_string(), "expected integer, found non-numeric string at [1]");
    }

    #[test]
    fn test_named_requires_declared_fields() {
        let mut shapes = BTreeMap::new();
        shapes.insert(
            "Point".to_string(),
            TypeDef::new("Point").field("x", Kind::Integer).field("y", Kind::Integer),
        );

        let mut fields = BTreeMap::new();
        fields.insert("x".to_string(), Value::from("1"));
        fields.insert("y".to_string(), Value::Int(2));
        fields.insert("label".to_string(), Value::from("origin"));

        let coerced = Kind::named("Point").coerce(Value::Object(fields.clone()), &shapes).unwrap();
        let obj = coerced.as_object().unwrap();
        assert_eq!(obj.get("x"), Some(&Value::Int(1)));
        assert_eq!(obj.get("label"), Some(&Value::from("origin")));

        fields.remove("y");
        let err = Kind::named("Point").coerce(Value::Object(fields), &shapes).unwrap_err();
        assert!(matches!(err, CoerceError::MissingField { ref field, .. } if field == "y"));
    }

    #[test]
    fn test_unit_and_any() {
        assert_eq!(coerce(Kind::Unit, Value::Null), Ok(Value::Null));
        assert!(coerce(Kind::Unit, Value::Int(0)).is_err());
        assert_eq!(coerce(Kind::Any, Value::Null), Ok(Value::Null));
    }

    #[test]
    fn test_depth_limit() {
        let mut kind = Kind::Integer;
        let mut value = Value::Int(1);
        for _ in 0..(MAX_DEPTH + 2) {
            kind = Kind::array_of(kind);
            value = Value::Array(vec![value]);
        }
        assert_eq!(coerce(kind, value), Err(CoerceError::TooDeep));
    }
}
