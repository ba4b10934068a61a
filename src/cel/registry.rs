//! Message and enum types visible to the checker.
//!
//! The registry always knows the protobuf well-known types. Further
//! messages and enums come from a [`TypeCatalog`]: the embedded
//! conformance catalog and any `messages`/`enums` in the config file.

use super::types::{well_known_message, Type};
use crate::config::{EnumConfig, MessageConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Conformance test messages (`TestAllTypes` and friends, proto2 and proto3)
pub const CONFORMANCE_CATALOG: &str = include_str!("../../types/conformance.yaml");

/// YAML list of message and enum declarations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeCatalog {
    #[serde(default)]
    pub messages: Vec<MessageConfig>,

    #[serde(default)]
    pub enums: Vec<EnumConfig>,
}

impl TypeCatalog {
    pub fn conformance() -> Result<Self, String> {
        serde_norway::from_str(CONFORMANCE_CATALOG)
            .map_err(|e| format!("invalid conformance type catalog: {}", e))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    messages: HashMap<String, HashMap<String, Type>>,
    enums: HashMap<String, HashMap<String, i64>>,
}

impl TypeRegistry {
    /// Registry holding only the well-known protobuf messages
    pub fn new() -> Self {
        let mut registry = Self::default();
        let int = || Type::Int;
        registry.add_message("google.protobuf.Any", [
            ("type_url", Type::String),
            ("value", Type::Bytes),
        ]);
        for name in ["google.protobuf.Duration", "google.protobuf.Timestamp"] {
            registry.add_message(name, [("seconds", int()), ("nanos", int())]);
        }
        for (name, wrapped) in [
            ("google.protobuf.BoolValue", Type::Bool),
            ("google.protobuf.BytesValue", Type::Bytes),
            ("google.protobuf.DoubleValue", Type::Double),
            ("google.protobuf.FloatValue", Type::Double),
            ("google.protobuf.Int32Value", Type::Int),
            ("google.protobuf.Int64Value", Type::Int),
            ("google.protobuf.StringValue", Type::String),
            ("google.protobuf.UInt32Value", Type::Uint),
            ("google.protobuf.UInt64Value", Type::Uint),
        ] {
            registry.add_message(name, [("value", wrapped)]);
        }
        registry.add_message("google.protobuf.Value", [
            ("null_value", Type::Null),
            ("number_value", Type::Double),
            ("string_value", Type::String),
            ("bool_value", Type::Bool),
            ("struct_value", Type::map(Type::String, Type::Dyn)),
            ("list_value", Type::list(Type::Dyn)),
        ]);
        registry.add_message("google.protobuf.ListValue", [("values", Type::list(Type::Dyn))]);
        registry.add_message("google.protobuf.Struct", [(
            "fields",
            Type::map(Type::String, Type::Dyn),
        )]);
        registry.add_message("google.protobuf.Empty", []);
        registry.add_message("google.protobuf.FieldMask", [(
            "paths",
            Type::list(Type::String),
        )]);
        registry
            .enums
            .insert("google.protobuf.NullValue".into(), HashMap::from([("NULL_VALUE".into(), 0)]));
        registry
    }

    pub fn add_message<'a>(
        &mut self,
        name: &str,
        fields: impl IntoIterator<Item = (&'a str, Type)>,
    ) {
        let fields = fields
            .into_iter()
            .map(|(field, ty)| (field.to_string(), ty))
            .collect();
        self.messages.insert(name.to_string(), fields);
    }

    /// Register every message and enum of a catalog
    pub fn add_catalog(&mut self, catalog: &TypeCatalog) -> Result<(), String> {
        for message in &catalog.messages {
            let mut fields = HashMap::new();
            for field in &message.fields {
                let ty = Type::from_spec(&field.ty)
                    .map_err(|e| format!("field {}.{}: {}", message.name, field.name, e))?;
                fields.insert(field.name.clone(), ty);
            }
            self.messages.insert(message.name.clone(), fields);
        }
        for e in &catalog.enums {
            let values = e
                .values
                .iter()
                .map(|v| (v.name.clone(), v.number))
                .collect();
            self.enums.insert(e.name.clone(), values);
        }
        Ok(())
    }

    pub fn has_message(&self, name: &str) -> bool {
        self.messages.contains_key(name)
    }

    /// `type(T)` for a registered message; well-known messages map to
    /// their CEL equivalents.
    pub fn find_struct_type(&self, name: &str) -> Option<Type> {
        if !self.has_message(name) {
            return None;
        }
        let t = well_known_message(name).unwrap_or_else(|| Type::Message(name.to_string()));
        Some(Type::type_of(t))
    }

    pub fn find_field_type(&self, message: &str, field: &str) -> Option<Type> {
        self.messages.get(message)?.get(field).cloned()
    }

    /// Value of a fully qualified enum constant such as `a.Color.RED`
    pub fn enum_value(&self, qualified: &str) -> Option<i64> {
        let (enum_name, value_name) = qualified.rsplit_once('.')?;
        self.enums.get(enum_name)?.get(value_name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_types() {
        let registry = TypeRegistry::new();
        assert_eq!(
            registry.find_struct_type("google.protobuf.Int64Value"),
            Some(Type::type_of(Type::wrapper(Type::Int)))
        );
        assert_eq!(
            registry.find_field_type("google.protobuf.Timestamp", "seconds"),
            Some(Type::Int)
        );
        assert_eq!(registry.enum_value("google.protobuf.NullValue.NULL_VALUE"), Some(0));
        assert_eq!(registry.find_struct_type("a.Missing"), None);
    }

    #[test]
    fn test_conformance_catalog_loads() {
        let catalog = TypeCatalog::conformance().unwrap();
        let mut registry = TypeRegistry::new();
        registry.add_catalog(&catalog).unwrap();
        let name = "cel.expr.conformance.proto3.TestAllTypes";
        assert_eq!(
            registry.find_struct_type(name),
            Some(Type::type_of(Type::Message(name.into())))
        );
        assert_eq!(
            registry.find_field_type(name, "single_int64_wrapper"),
            Some(Type::wrapper(Type::Int))
        );
        assert_eq!(
            registry.find_field_type(name, "repeated_string"),
            Some(Type::list(Type::String))
        );
        assert_eq!(
            registry.enum_value("cel.expr.conformance.proto3.TestAllTypes.NestedEnum.BAR"),
            Some(1)
        );
    }
}
