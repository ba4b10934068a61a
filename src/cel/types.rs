//! Checker types and the unification helpers used during overload
//! resolution.
//!
//! Display output is the canonical CEL type name: `int`, `list(string)`,
//! `map(string, dyn)`, `wrapper(int)`, `optional_type(bool)`, and so on.

use crate::model::TypeSpec;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Dyn,
    Error,
    Null,
    Bool,
    Int,
    Uint,
    Double,
    String,
    Bytes,
    Any,
    Timestamp,
    Duration,
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
    /// `type`, or `type(T)` for the type of a type
    Type(Option<Box<Type>>),
    /// Message type by fully qualified name
    Message(String),
    /// Nullable primitive, e.g. `google.protobuf.Int64Value`
    Wrapper(Box<Type>),
    /// Parameterized abstract type such as `optional_type(T)`
    Opaque(String, Vec<Type>),
    TypeParam(String),
}

/// Coarse classification used by the assignability rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Dyn,
    Error,
    Null,
    Bool,
    Int,
    Uint,
    Double,
    String,
    Bytes,
    Any,
    Timestamp,
    Duration,
    List,
    Map,
    Type,
    Struct,
    Opaque,
    TypeParam,
}

pub const OPTIONAL_TYPE: &str = "optional_type";
pub const FUNCTION_TYPE: &str = "function";

impl Type {
    pub fn list(elem: Type) -> Self {
        Type::List(Box::new(elem))
    }

    pub fn map(key: Type, value: Type) -> Self {
        Type::Map(Box::new(key), Box::new(value))
    }

    pub fn type_of(t: Type) -> Self {
        Type::Type(Some(Box::new(t)))
    }

    pub fn optional(t: Type) -> Self {
        Type::Opaque(OPTIONAL_TYPE.to_string(), vec![t])
    }

    pub fn param(name: &str) -> Self {
        Type::TypeParam(name.to_string())
    }

    pub fn wrapper(t: Type) -> Self {
        Type::Wrapper(Box::new(t))
    }

    pub fn function(result: Type, args: Vec<Type>) -> Self {
        let mut params = Vec::with_capacity(args.len() + 1);
        params.push(result);
        params.extend(args);
        Type::Opaque(FUNCTION_TYPE.to_string(), params)
    }

    pub fn kind(&self) -> Kind {
        match self {
            Type::Dyn => Kind::Dyn,
            Type::Error => Kind::Error,
            Type::Null => Kind::Null,
            Type::Bool => Kind::Bool,
            Type::Int => Kind::Int,
            Type::Uint => Kind::Uint,
            Type::Double => Kind::Double,
            Type::String => Kind::String,
            Type::Bytes => Kind::Bytes,
            Type::Any => Kind::Any,
            Type::Timestamp => Kind::Timestamp,
            Type::Duration => Kind::Duration,
            Type::List(_) => Kind::List,
            Type::Map(..) => Kind::Map,
            Type::Type(_) => Kind::Type,
            Type::Message(_) => Kind::Struct,
            Type::Wrapper(inner) => inner.kind(),
            Type::Opaque(..) => Kind::Opaque,
            Type::TypeParam(_) => Kind::TypeParam,
        }
    }

    /// Runtime type name. Wrappers report the wrapped name. Formatted
    /// types go through `Display`, which prints the null type as `null`.
    pub fn type_name(&self) -> String {
        match self {
            Type::Dyn => "dyn".into(),
            Type::Error => "*error*".into(),
            Type::Null => "null_type".into(),
            Type::Bool => "bool".into(),
            Type::Int => "int".into(),
            Type::Uint => "uint".into(),
            Type::Double => "double".into(),
            Type::String => "string".into(),
            Type::Bytes => "bytes".into(),
            Type::Any => "google.protobuf.Any".into(),
            Type::Timestamp => "google.protobuf.Timestamp".into(),
            Type::Duration => "google.protobuf.Duration".into(),
            Type::List(_) => "list".into(),
            Type::Map(..) => "map".into(),
            Type::Type(_) => "type".into(),
            Type::Message(name) => name.clone(),
            Type::Wrapper(inner) => inner.type_name(),
            Type::Opaque(name, _) => name.clone(),
            Type::TypeParam(name) => name.clone(),
        }
    }

    pub fn parameters(&self) -> Vec<&Type> {
        match self {
            Type::List(elem) => vec![elem],
            Type::Map(k, v) => vec![k, v],
            Type::Type(Some(t)) => vec![t],
            Type::Opaque(_, params) => params.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Dynamic for assignability purposes: `dyn`, `Any`, or an unbound
    /// type parameter
    pub fn is_dyn(&self) -> bool {
        matches!(self.kind(), Kind::Dyn | Kind::Any | Kind::TypeParam)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    pub fn is_dyn_or_error(&self) -> bool {
        self.is_dyn() || self.is_error()
    }

    /// `(T, true)` for `optional_type(T)`, otherwise `(self, false)`
    pub fn unwrap_optional(&self) -> (Type, bool) {
        match self {
            Type::Opaque(name, params) if name == OPTIONAL_TYPE && params.len() == 1 => {
                (params[0].clone(), true)
            }
            _ => (self.clone(), false),
        }
    }

    /// Whether a value of type `from` may be used where `self` is expected,
    /// without type-parameter inference.
    pub fn is_assignable_type(&self, from: &Type) -> bool {
        if let Type::Wrapper(inner) = self {
            return Type::Null.is_assignable_type(from) || inner.is_assignable_type(from);
        }
        if self == from || self.is_dyn() {
            return true;
        }
        if self.kind() != from.kind() || self.type_name() != from.type_name() {
            return false;
        }
        let (mine, theirs) = (self.parameters(), from.parameters());
        mine.len() == theirs.len()
            && mine
                .iter()
                .zip(theirs.iter())
                .all(|(a, b)| a.is_assignable_type(b))
    }

    /// Convert a protobuf-JSON type description
    pub fn from_spec(spec: &TypeSpec) -> Result<Type, String> {
        if spec.dyn_.is_some() {
            return Ok(Type::Dyn);
        }
        if spec.null.is_some() {
            return Ok(Type::Null);
        }
        if let Some(name) = &spec.primitive {
            return primitive(name);
        }
        if let Some(name) = &spec.wrapper {
            return primitive(name).map(Type::wrapper);
        }
        if let Some(name) = &spec.well_known {
            return match name.as_str() {
                "ANY" => Ok(Type::Any),
                "TIMESTAMP" => Ok(Type::Timestamp),
                "DURATION" => Ok(Type::Duration),
                other => Err(format!("unsupported well-known type: {}", other)),
            };
        }
        if let Some(list) = &spec.list_type {
            let elem = list
                .elem_type
                .as_ref()
                .ok_or_else(|| "list type without element type".to_string())?;
            return Ok(Type::list(Type::from_spec(elem)?));
        }
        if let Some(map) = &spec.map_type {
            let key = map
                .key_type
                .as_ref()
                .ok_or_else(|| "map type without key type".to_string())?;
            let value = map
                .value_type
                .as_ref()
                .ok_or_else(|| "map type without value type".to_string())?;
            return Ok(Type::map(Type::from_spec(key)?, Type::from_spec(value)?));
        }
        if let Some(function) = &spec.function {
            let result = function
                .result_type
                .as_ref()
                .map(Type::from_spec)
                .transpose()?
                .unwrap_or(Type::Dyn);
            let args = function
                .arg_types
                .iter()
                .map(Type::from_spec)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Type::function(result, args));
        }
        if let Some(name) = &spec.message_type {
            return Ok(well_known_message(name).unwrap_or_else(|| Type::Message(name.clone())));
        }
        if let Some(name) = &spec.type_param {
            return Ok(Type::param(name));
        }
        if let Some(inner) = &spec.type_ {
            return Ok(Type::type_of(Type::from_spec(inner)?));
        }
        if spec.error.is_some() {
            return Ok(Type::Error);
        }
        if let Some(abstract_type) = &spec.abstract_type {
            let params = abstract_type
                .parameter_types
                .iter()
                .map(Type::from_spec)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Type::Opaque(abstract_type.name.clone(), params));
        }
        Err(format!(
            "unsupported type: {}",
            serde_json::to_string(spec).unwrap_or_default()
        ))
    }
}

fn primitive(name: &str) -> Result<Type, String> {
    match name {
        "BOOL" => Ok(Type::Bool),
        "INT64" => Ok(Type::Int),
        "UINT64" => Ok(Type::Uint),
        "DOUBLE" => Ok(Type::Double),
        "STRING" => Ok(Type::String),
        "BYTES" => Ok(Type::Bytes),
        other => Err(format!("unsupported primitive type: {}", other)),
    }
}

/// CEL type that a well-known protobuf message name stands for
pub fn well_known_message(name: &str) -> Option<Type> {
    let t = match name {
        "google.protobuf.Any" => Type::Any,
        "google.protobuf.Timestamp" => Type::Timestamp,
        "google.protobuf.Duration" => Type::Duration,
        "google.protobuf.BoolValue" => Type::wrapper(Type::Bool),
        "google.protobuf.BytesValue" => Type::wrapper(Type::Bytes),
        "google.protobuf.DoubleValue" | "google.protobuf.FloatValue" => {
            Type::wrapper(Type::Double)
        }
        "google.protobuf.Int32Value" | "google.protobuf.Int64Value" => Type::wrapper(Type::Int),
        "google.protobuf.StringValue" => Type::wrapper(Type::String),
        "google.protobuf.UInt32Value" | "google.protobuf.UInt64Value" => {
            Type::wrapper(Type::Uint)
        }
        "google.protobuf.Value" => Type::Dyn,
        "google.protobuf.ListValue" => Type::list(Type::Dyn),
        "google.protobuf.Struct" => Type::map(Type::String, Type::Dyn),
        "google.protobuf.NullValue" => Type::Null,
        _ => return None,
    };
    Some(t)
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Null => f.write_str("null"),
            Type::Wrapper(inner) => write!(f, "wrapper({})", inner.type_name()),
            Type::Type(None) => f.write_str("type"),
            _ => {
                f.write_str(&self.type_name())?;
                let params = self.parameters();
                if !params.is_empty() {
                    f.write_str("(")?;
                    for (i, p) in params.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{}", p)?;
                    }
                    f.write_str(")")?;
                }
                Ok(())
            }
        }
    }
}

/// Type-parameter substitutions collected while checking one expression
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    subs: HashMap<Type, Type>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, from: Type, to: Type) {
        self.subs.insert(from, to);
    }

    pub fn find(&self, from: &Type) -> Option<&Type> {
        self.subs.get(from)
    }
}

/// Updated mapping when `t1` is assignable to `t2`
pub fn is_assignable(m: &Mapping, t1: &Type, t2: &Type) -> Option<Mapping> {
    let mut copy = m.clone();
    internal_is_assignable(&mut copy, t1, t2).then_some(copy)
}

/// Updated mapping when each `l1[i]` is assignable to `l2[i]`
pub fn is_assignable_list(m: &Mapping, l1: &[Type], l2: &[Type]) -> Option<Mapping> {
    let mut copy = m.clone();
    internal_is_assignable_list(&mut copy, l1, l2).then_some(copy)
}

fn internal_is_assignable_list(m: &mut Mapping, l1: &[Type], l2: &[Type]) -> bool {
    l1.len() == l2.len()
        && l1
            .iter()
            .zip(l2.iter())
            .all(|(a, b)| internal_is_assignable(m, a, b))
}

fn internal_is_assignable(m: &mut Mapping, t1: &Type, t2: &Type) -> bool {
    let (kind1, kind2) = (t1.kind(), t2.kind());
    if kind2 == Kind::TypeParam {
        let (valid, t2_has_sub) = is_valid_type_substitution(m, t1, t2);
        if valid {
            return true;
        }
        if t2_has_sub {
            return false;
        }
    }
    if kind1 == Kind::TypeParam {
        return is_valid_type_substitution(m, t2, t1).0;
    }
    if t1.is_dyn_or_error() || t2.is_dyn_or_error() {
        return true;
    }
    if kind1 == Kind::Null {
        return is_assignable_null(t2);
    }
    if kind2 == Kind::Null {
        return is_assignable_null(t1);
    }
    match kind1 {
        Kind::Bool
        | Kind::Bytes
        | Kind::Double
        | Kind::Int
        | Kind::String
        | Kind::Uint
        | Kind::Any
        | Kind::Duration
        | Kind::Timestamp
        | Kind::Struct => t1.is_assignable_type(t2),
        Kind::Type => kind2 == Kind::Type,
        Kind::Opaque | Kind::List | Kind::Map => {
            if kind1 != kind2 || t1.type_name() != t2.type_name() {
                return false;
            }
            let p1: Vec<Type> = t1.parameters().into_iter().cloned().collect();
            let p2: Vec<Type> = t2.parameters().into_iter().cloned().collect();
            internal_is_assignable_list(m, &p1, &p2)
        }
        _ => false,
    }
}

/// Whether `t2` (or its current substitution) may stand for `t1`, and
/// whether `t2` already had a substitution.
fn is_valid_type_substitution(m: &mut Mapping, t1: &Type, t2: &Type) -> (bool, bool) {
    if t1 == t2 {
        return (true, true);
    }
    if let Some(t2_sub) = m.find(t2).cloned() {
        if *t1 == t2_sub {
            return (true, true);
        }
        if internal_is_assignable(m, t1, &t2_sub) {
            let general = most_general(t1, &t2_sub);
            if not_referenced_in(m, t2, &general) {
                m.add(t2.clone(), general);
            }
            return (true, true);
        }
        return (false, true);
    }
    if not_referenced_in(m, t2, t1) {
        m.add(t2.clone(), t1.clone());
        return (true, false);
    }
    (false, false)
}

fn is_assignable_null(t: &Type) -> bool {
    matches!(
        t.kind(),
        Kind::Opaque | Kind::Struct | Kind::Any | Kind::Duration | Kind::Timestamp
    ) || t.is_assignable_type(&Type::Null)
}

fn is_equal_or_less_specific(t1: &Type, t2: &Type) -> bool {
    let (kind1, kind2) = (t1.kind(), t2.kind());
    if t1.is_dyn() || kind1 == Kind::TypeParam {
        return true;
    }
    if t2.is_dyn() || kind2 == Kind::TypeParam {
        return false;
    }
    if kind1 != kind2 {
        return false;
    }
    match kind1 {
        Kind::Opaque | Kind::List | Kind::Map | Kind::Type => {
            let (p1, p2) = (t1.parameters(), t2.parameters());
            t1.type_name() == t2.type_name()
                && p1.len() == p2.len()
                && p1
                    .iter()
                    .zip(p2.iter())
                    .all(|(a, b)| is_equal_or_less_specific(a, b))
        }
        _ => t1 == t2,
    }
}

/// The more general of two types known to unify
pub fn most_general(t1: &Type, t2: &Type) -> Type {
    if is_equal_or_less_specific(t1, t2) {
        t1.clone()
    } else {
        t2.clone()
    }
}

/// Occurs check: `t` does not appear in `within`, directly or through
/// substitutions.
fn not_referenced_in(m: &Mapping, t: &Type, within: &Type) -> bool {
    if t == within {
        return false;
    }
    if let Type::TypeParam(_) = within {
        return match m.find(within) {
            Some(sub) => not_referenced_in(m, t, sub),
            None => true,
        };
    }
    within
        .parameters()
        .iter()
        .all(|p| not_referenced_in(m, t, p))
}

/// Replace bound type parameters. Unbound ones become `dyn` when
/// `type_param_to_dyn` is set.
pub fn substitute(m: &Mapping, t: &Type, type_param_to_dyn: bool) -> Type {
    if let Some(sub) = m.find(t) {
        return substitute(m, sub, type_param_to_dyn);
    }
    match t {
        Type::TypeParam(_) if type_param_to_dyn => Type::Dyn,
        Type::List(elem) => Type::list(substitute(m, elem, type_param_to_dyn)),
        Type::Map(k, v) => Type::map(
            substitute(m, k, type_param_to_dyn),
            substitute(m, v, type_param_to_dyn),
        ),
        Type::Type(Some(inner)) => Type::type_of(substitute(m, inner, type_param_to_dyn)),
        Type::Opaque(name, params) => Type::Opaque(
            name.clone(),
            params
                .iter()
                .map(|p| substitute(m, p, type_param_to_dyn))
                .collect(),
        ),
        _ => t.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TypeSpec;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display() {
        assert_eq!(Type::list(Type::Int).to_string(), "list(int)");
        assert_eq!(
            Type::map(Type::String, Type::Dyn).to_string(),
            "map(string, dyn)"
        );
        assert_eq!(Type::wrapper(Type::Int).to_string(), "wrapper(int)");
        assert_eq!(Type::optional(Type::String).to_string(), "optional_type(string)");
        assert_eq!(Type::Null.to_string(), "null");
        assert_eq!(Type::type_of(Type::Null).to_string(), "type(null)");
        assert_eq!(Type::list(Type::Null).to_string(), "list(null)");
        assert_eq!(Type::Null.type_name(), "null_type");
        assert_eq!(Type::Timestamp.to_string(), "google.protobuf.Timestamp");
        assert_eq!(Type::Type(None).to_string(), "type");
    }

    #[test]
    fn test_from_type_spec() {
        let spec = TypeSpec::map_of(TypeSpec::primitive("STRING"), TypeSpec::dyn_type());
        assert_eq!(
            Type::from_spec(&spec),
            Ok(Type::map(Type::String, Type::Dyn))
        );
        assert_eq!(
            Type::from_spec(&TypeSpec::message("google.protobuf.Int64Value")),
            Ok(Type::wrapper(Type::Int))
        );
        assert!(Type::from_spec(&TypeSpec::default()).is_err());
        assert!(Type::from_spec(&TypeSpec::primitive("FLOAT")).is_err());
    }

    #[test]
    fn test_type_param_binding() {
        let m = Mapping::new();
        let a = Type::param("A");
        let m = is_assignable(&m, &Type::list(Type::Int), &Type::list(a.clone())).unwrap();
        assert_eq!(substitute(&m, &a, false), Type::Int);
        // a bound parameter rejects an incompatible type
        assert!(is_assignable(&m, &Type::String, &a).is_none());
    }

    #[test]
    fn test_dyn_generalizes_binding() {
        let mut m = Mapping::new();
        let a = Type::param("A");
        m.add(a.clone(), Type::Int);
        let m = is_assignable(&m, &Type::Dyn, &a).unwrap();
        assert_eq!(substitute(&m, &a, false), Type::Dyn);
    }

    #[test]
    fn test_null_and_wrappers() {
        let m = Mapping::new();
        assert!(is_assignable(&m, &Type::Null, &Type::wrapper(Type::Int)).is_some());
        assert!(is_assignable(&m, &Type::Null, &Type::Message("a.B".into())).is_some());
        assert!(is_assignable(&m, &Type::Null, &Type::Int).is_none());
        assert!(is_assignable(&m, &Type::wrapper(Type::Int), &Type::Int).is_some());
    }

    #[test]
    fn test_occurs_check() {
        let a = Type::param("A");
        let list_of_a = Type::list(a.clone());
        assert!(!not_referenced_in(&Mapping::new(), &a, &list_of_a));

        let mut m = Mapping::new();
        assert_eq!(is_valid_type_substitution(&mut m, &list_of_a, &a), (false, false));
        // a type parameter still counts as dynamic once substitution is refused
        assert!(is_assignable(&Mapping::new(), &list_of_a, &a).is_some());
    }

    #[test]
    fn test_unbound_params_become_dyn() {
        let m = Mapping::new();
        assert_eq!(
            substitute(&m, &Type::list(Type::param("_var0")), true),
            Type::list(Type::Dyn)
        );
    }
}
