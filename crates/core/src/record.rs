//! Named-field access over records of any shape.
//!
//! Conditions, enrichments and stage runners read and write record fields by
//! name. [`FieldAccessor`] is that capability; [`MapRecord`] implements it for
//! untyped key/value data and [`field_accessor!`](crate::field_accessor)
//! generates it for plain structs.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::CoreError;

/// Read/write access to a record's fields by name.
pub trait FieldAccessor {
    /// Current value of `name`, or `None` when the record has no such field.
    fn get_field(&self, name: &str) -> Option<Value>;

    /// Assign `value` to `name`.
    fn set_field(&mut self, name: &str, value: Value) -> Result<(), CoreError>;

    /// Names of all fields currently present.
    fn field_names(&self) -> Vec<String>;

    /// Short runtime type name used for target-type and data-type matching.
    fn type_name(&self) -> String;

    /// Snapshot of the record as a JSON object, used as an evaluation binding.
    fn to_value(&self) -> Value {
        let mut map = Map::new();
        for name in self.field_names() {
            if let Some(v) = self.get_field(&name) {
                map.insert(name, v);
            }
        }
        Value::Object(map)
    }

    fn has_field(&self, name: &str) -> bool {
        self.get_field(name).map_or(false, |v| !v.is_null())
    }
}

/// Untyped record backed by an insertion-ordered map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapRecord {
    #[serde(flatten)]
    fields: IndexMap<String, Value>,
    #[serde(skip)]
    type_name: Option<String>,
}

impl MapRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// A map record that reports `type_name` instead of the generic `Map`.
    pub fn typed(type_name: impl Into<String>) -> Self {
        Self {
            fields: IndexMap::new(),
            type_name: Some(type_name.into()),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Build from a JSON object. Non-object values produce an empty record.
    pub fn from_value(value: Value) -> Self {
        let fields = match value {
            Value::Object(map) => map.into_iter().collect(),
            _ => IndexMap::new(),
        };
        Self {
            fields,
            type_name: None,
        }
    }
}

impl FieldAccessor for MapRecord {
    fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<(), CoreError> {
        self.fields.insert(name.to_string(), value);
        Ok(())
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn type_name(&self) -> String {
        self.type_name.clone().unwrap_or_else(|| "Map".to_string())
    }

    fn to_value(&self) -> Value {
        Value::Object(self.fields.clone().into_iter().collect())
    }
}

/// Implement [`FieldAccessor`] for a struct whose fields are serde-compatible.
///
/// ```
/// use rulekit_core::{field_accessor, FieldAccessor};
///
/// #[derive(Default)]
/// struct Trade {
///     trade_id: String,
///     notional: f64,
/// }
///
/// field_accessor!(Trade {
///     trade_id => "tradeId",
///     notional => "notional",
/// });
///
/// let mut t = Trade::default();
/// t.set_field("notional", 10.5.into()).unwrap();
/// assert_eq!(t.get_field("notional"), Some(10.5.into()));
/// assert_eq!(t.type_name(), "Trade");
/// ```
#[macro_export]
macro_rules! field_accessor {
    ($ty:ident { $($field:ident => $name:literal),* $(,)? }) => {
        impl $crate::FieldAccessor for $ty {
            fn get_field(&self, name: &str) -> Option<$crate::__private::serde_json::Value> {
                match name {
                    $($name => $crate::__private::serde_json::to_value(&self.$field).ok(),)*
                    _ => None,
                }
            }

            fn set_field(
                &mut self,
                name: &str,
                value: $crate::__private::serde_json::Value,
            ) -> Result<(), $crate::CoreError> {
                match name {
                    $($name => {
                        self.$field = $crate::__private::serde_json::from_value(value).map_err(|e| {
                            $crate::CoreError::FieldType {
                                type_name: stringify!($ty).to_string(),
                                field: name.to_string(),
                                reason: e.to_string(),
                            }
                        })?;
                        Ok(())
                    })*
                    _ => Err($crate::CoreError::UnknownField {
                        type_name: stringify!($ty).to_string(),
                        field: name.to_string(),
                    }),
                }
            }

            fn field_names(&self) -> Vec<String> {
                vec![$($name.to_string()),*]
            }

            fn type_name(&self) -> String {
                stringify!($ty).to_string()
            }
        }
    };
}
