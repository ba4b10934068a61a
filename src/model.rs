//! Test model
//!
//! Wire types for the upstream conformance corpus (`SimpleTestFile` and
//! friends, in their canonical protobuf-JSON field names) and for the
//! generated incremental suite tree.
//!
//! Fields the generator never interprets (bindings, expected values, ...)
//! are kept verbatim in `extra` so that `original` round-trips byte for
//! byte through serialization.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn is_false(b: &bool) -> bool {
    !*b
}

/// One upstream test case
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    /// Optional label, also used as the parse-error description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// CEL expression text
    #[serde(default)]
    pub expr: String,

    /// Parse without the standard macros
    #[serde(default, skip_serializing_if = "is_false")]
    pub disable_macros: bool,

    /// Skip type-checking entirely
    #[serde(default, skip_serializing_if = "is_false")]
    pub disable_check: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub check_only: bool,

    /// Extra declarations for checking this test
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_env: Vec<Decl>,

    /// Namespace used for name resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Test {
    /// Test built from a bare extracted expression
    pub fn from_expr(expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn container(&self) -> &str {
        self.container.as_deref().unwrap_or("")
    }
}

/// Identifier or function declaration from a test's `typeEnv`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decl {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ident: Option<IdentDecl>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDecl>,
}

impl Decl {
    pub fn ident(name: impl Into<String>, ty: TypeSpec) -> Self {
        Self {
            name: name.into(),
            ident: Some(IdentDecl {
                ty: Some(ty),
                ..Default::default()
            }),
            function: None,
        }
    }

    pub fn function(name: impl Into<String>, overloads: Vec<OverloadDecl>) -> Self {
        Self {
            name: name.into(),
            ident: None,
            function: Some(FunctionDecl { overloads }),
        }
    }

    pub fn is_function(&self) -> bool {
        self.function.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentDecl {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeSpec>,

    /// Constant value, carried but not interpreted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDecl {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overloads: Vec<OverloadDecl>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverloadDecl {
    #[serde(default)]
    pub overload_id: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<TypeSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_params: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_type: Option<TypeSpec>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub is_instance_function: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

/// Protobuf-JSON rendering of a CEL type: exactly one field is set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSpec {
    #[serde(rename = "dyn", default, skip_serializing_if = "Option::is_none")]
    pub dyn_: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null: Option<Value>,

    /// `BOOL`, `INT64`, `UINT64`, `DOUBLE`, `STRING`, `BYTES`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primitive: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapper: Option<String>,

    /// `ANY`, `TIMESTAMP`, `DURATION`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub well_known: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_type: Option<Box<ListTypeSpec>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_type: Option<Box<MapTypeSpec>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<Box<FunctionTypeSpec>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_param: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<Box<TypeSpec>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstract_type: Option<AbstractTypeSpec>,
}

impl TypeSpec {
    pub fn primitive(name: &str) -> Self {
        Self {
            primitive: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn message(name: &str) -> Self {
        Self {
            message_type: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn dyn_type() -> Self {
        Self {
            dyn_: Some(Value::Object(Map::new())),
            ..Default::default()
        }
    }

    pub fn list_of(elem: TypeSpec) -> Self {
        Self {
            list_type: Some(Box::new(ListTypeSpec {
                elem_type: Some(elem),
            })),
            ..Default::default()
        }
    }

    pub fn map_of(key: TypeSpec, value: TypeSpec) -> Self {
        Self {
            map_type: Some(Box::new(MapTypeSpec {
                key_type: Some(key),
                value_type: Some(value),
            })),
            ..Default::default()
        }
    }

    pub fn type_param(name: &str) -> Self {
        Self {
            type_param: Some(name.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTypeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elem_type: Option<TypeSpec>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapTypeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<TypeSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<TypeSpec>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionTypeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_type: Option<TypeSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arg_types: Vec<TypeSpec>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbstractTypeSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameter_types: Vec<TypeSpec>,
}

/// One upstream conformance file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleTestFile {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub section: Vec<SimpleTestSection>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleTestSection {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub test: Vec<Test>,
}

/// Generated record for one test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementalTest {
    pub original: Test,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,

    /// Annotated debug rendering of the parsed (and macro-expanded) tree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ast: Option<String>,

    /// Formatted result type after checking
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,

    /// Rendered parse or check diagnostics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IncrementalTest {
    pub fn new(original: Test) -> Self {
        Self {
            original,
            section: None,
            ast: None,
            ty: None,
            error: None,
        }
    }
}

/// Node of the generated suite tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IncrementalSuite {
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suites: Vec<IncrementalSuite>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<IncrementalTest>,
}

impl IncrementalSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Number of tests in this suite and all descendants
    pub fn test_count(&self) -> usize {
        self.tests.len() + self.suites.iter().map(|s| s.test_count()).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_simple_test_round_trips_unknown_fields() {
        let raw = r#"{"name":"self_eval_zeroish","expr":"0","value":{"int64Value":"0"}}"#;
        let test: Test = serde_json::from_str(raw).unwrap();
        assert_eq!(test.name(), "self_eval_zeroish");
        assert_eq!(test.expr, "0");
        assert!(test.extra.contains_key("value"));
        assert_eq!(serde_json::to_string(&test).unwrap(), raw);
    }

    #[test]
    fn test_type_env_parses() {
        let raw = r#"{
            "expr": "x",
            "typeEnv": [
                {"name": "x", "ident": {"type": {"primitive": "INT64"}}},
                {"name": "f", "function": {"overloads": [
                    {"overloadId": "f_int", "params": [{"primitive": "INT64"}],
                     "resultType": {"listType": {"elemType": {"dyn": {}}}}}
                ]}}
            ]
        }"#;
        let test: Test = serde_json::from_str(raw).unwrap();
        assert_eq!(test.type_env.len(), 2);
        assert_eq!(
            test.type_env[0],
            Decl::ident("x", TypeSpec::primitive("INT64"))
        );
        assert!(test.type_env[1].is_function());
        let overload = &test.type_env[1].function.as_ref().unwrap().overloads[0];
        assert_eq!(
            overload.result_type,
            Some(TypeSpec::list_of(TypeSpec::dyn_type()))
        );
    }

    #[test]
    fn test_suite_omits_empty_children() {
        let suite = IncrementalSuite::new("conformance");
        assert_eq!(
            serde_json::to_string(&suite).unwrap(),
            r#"{"name":"conformance"}"#
        );
    }

    #[test]
    fn test_incremental_test_field_order() {
        let mut t = IncrementalTest::new(Test::from_expr("1"));
        t.ast = Some("1^#*expr.Constant_Int64Value#".into());
        t.ty = Some("int".into());
        assert_eq!(
            serde_json::to_string(&t).unwrap(),
            r#"{"original":{"expr":"1"},"ast":"1^#*expr.Constant_Int64Value#","type":"int"}"#
        );
    }
}
