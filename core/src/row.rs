//! Rows: persisted entities as the engine sees them.

use crate::{EntityKey, TypeId, Value};

/// Type alias for attribute storage.
pub type Attributes = std::collections::HashMap<String, Value>;

static NULL: Value = Value::Null;

/// A persisted entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Stable key of this entity.
    pub key: EntityKey,
    /// Type of this entity (reference to the rule set).
    pub type_id: TypeId,
    /// Attribute values.
    pub attributes: Attributes,
}

impl Row {
    /// Create a new row with the given properties.
    pub fn new(key: EntityKey, type_id: TypeId, attributes: Attributes) -> Self {
        Self {
            key,
            type_id,
            attributes,
        }
    }

    /// Get an attribute value by name.
    pub fn get_attr(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Get an attribute value by name, absent attributes read as Null.
    pub fn value(&self, name: &str) -> &Value {
        self.attributes.get(name).unwrap_or(&NULL)
    }

    /// Set an attribute value, returning the previous one.
    pub fn set_attr(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.attributes.insert(name.into(), value)
    }

    /// Remove an attribute.
    pub fn remove_attr(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    /// The entity this row references through `fk_attr`, if any.
    pub fn reference(&self, fk_attr: &str) -> Option<EntityKey> {
        self.value(fk_attr).as_ref_key()
    }
}

/// Helper macro to create attribute maps.
#[macro_export]
macro_rules! attrs {
    () => {
        $crate::Attributes::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        {
            let mut map = $crate::Attributes::new();
            $(
                map.insert($key.to_string(), $crate::Value::from($value));
            )+
            map
        }
    };
}
