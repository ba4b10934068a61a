//! Declarations for the standard library and the extension libraries.
//!
//! Only signatures live here; nothing in this crate evaluates CEL.

use super::decls::{FunctionDecl, OverloadDecl, VariableDecl};
use super::env::Library;
use super::macros::{bindings_macros, math_macros, optional_macros, proto_macros, Macro};
use super::types::Type;
use std::collections::HashSet;
use std::sync::LazyLock;

fn global(id: &str, args: Vec<Type>, result: Type) -> OverloadDecl {
    OverloadDecl::global(id, args, result)
}

fn member(id: &str, args: Vec<Type>, result: Type) -> OverloadDecl {
    OverloadDecl::member(id, args, result)
}

fn function(name: &str, overloads: Vec<OverloadDecl>) -> Result<FunctionDecl, String> {
    FunctionDecl::new(name, overloads)
}

fn a() -> Type {
    Type::param("A")
}

fn b() -> Type {
    Type::param("B")
}

fn k() -> Type {
    Type::param("K")
}

fn v() -> Type {
    Type::param("V")
}

/// Comparison overloads between different numeric types. They are
/// declared but skipped during overload resolution.
static CROSS_TYPE_COMPARISONS: LazyLock<HashSet<String>> = LazyLock::new(|| {
    let mut ids = HashSet::new();
    for op in ["less", "less_equals", "greater", "greater_equals"] {
        for (l, r) in CROSS_NUMERIC_PAIRS {
            ids.insert(format!("{}_{}_{}", op, l.0, r.0));
        }
    }
    ids
});

const CROSS_NUMERIC_PAIRS: [((&str, NumericKind), (&str, NumericKind)); 6] = [
    (("int64", NumericKind::Int), ("double", NumericKind::Double)),
    (("int64", NumericKind::Int), ("uint64", NumericKind::Uint)),
    (("uint64", NumericKind::Uint), ("double", NumericKind::Double)),
    (("uint64", NumericKind::Uint), ("int64", NumericKind::Int)),
    (("double", NumericKind::Double), ("int64", NumericKind::Int)),
    (("double", NumericKind::Double), ("uint64", NumericKind::Uint)),
];

#[derive(Debug, Clone, Copy)]
enum NumericKind {
    Int,
    Uint,
    Double,
}

impl NumericKind {
    fn to_type(self) -> Type {
        match self {
            NumericKind::Int => Type::Int,
            NumericKind::Uint => Type::Uint,
            NumericKind::Double => Type::Double,
        }
    }
}

pub fn is_overload_disabled(id: &str) -> bool {
    CROSS_TYPE_COMPARISONS.contains(id)
}

/// Operators, conversions, and the built-in type identifiers. Standard
/// macros are registered separately so an environment can opt out.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardLibrary;

impl Library for StandardLibrary {
    fn name(&self) -> &'static str {
        "cel.lib.std"
    }

    fn variables(&self) -> Vec<VariableDecl> {
        [
            Type::Any,
            Type::Bool,
            Type::Bytes,
            Type::Double,
            Type::Duration,
            Type::Dyn,
            Type::Int,
            Type::list(Type::Dyn),
            Type::map(Type::Dyn, Type::Dyn),
            Type::Null,
            Type::String,
            Type::Timestamp,
            Type::Type(None),
            Type::Uint,
        ]
        .into_iter()
        .map(|t| VariableDecl::new(t.type_name(), Type::type_of(t)))
        .collect()
    }

    fn functions(&self) -> Result<Vec<FunctionDecl>, String> {
        let list_a = || Type::list(a());
        let map_ab = || Type::map(a(), b());
        let (int, uint, double) = (Type::Int, Type::Uint, Type::Double);
        let (string, bytes, boolean) = (Type::String, Type::Bytes, Type::Bool);
        let (ts, dur) = (Type::Timestamp, Type::Duration);

        let mut fns = vec![
            function("_?_:_", vec![global("conditional", vec![boolean.clone(), a(), a()], a())])?,
            function("_&&_", vec![global("logical_and", vec![boolean.clone(), boolean.clone()], boolean.clone())])?,
            function("_||_", vec![global("logical_or", vec![boolean.clone(), boolean.clone()], boolean.clone())])?,
            function("!_", vec![global("logical_not", vec![boolean.clone()], boolean.clone())])?,
            function(
                "@not_strictly_false",
                vec![global("not_strictly_false", vec![boolean.clone()], boolean.clone())],
            )?,
            function(
                "__not_strictly_false__",
                vec![global("not_strictly_false", vec![boolean.clone()], boolean.clone())],
            )?,
            function("_==_", vec![global("equals", vec![a(), a()], boolean.clone())])?,
            function("_!=_", vec![global("not_equals", vec![a(), a()], boolean.clone())])?,
            function(
                "_+_",
                vec![
                    global("add_bytes", vec![bytes.clone(), bytes.clone()], bytes.clone()),
                    global("add_double", vec![double.clone(), double.clone()], double.clone()),
                    global("add_duration_duration", vec![dur.clone(), dur.clone()], dur.clone()),
                    global("add_duration_timestamp", vec![dur.clone(), ts.clone()], ts.clone()),
                    global("add_timestamp_duration", vec![ts.clone(), dur.clone()], ts.clone()),
                    global("add_int64", vec![int.clone(), int.clone()], int.clone()),
                    global("add_list", vec![list_a(), list_a()], list_a()),
                    global("add_string", vec![string.clone(), string.clone()], string.clone()),
                    global("add_uint64", vec![uint.clone(), uint.clone()], uint.clone()),
                ],
            )?,
            function(
                "_-_",
                vec![
                    global("subtract_double", vec![double.clone(), double.clone()], double.clone()),
                    global("subtract_duration_duration", vec![dur.clone(), dur.clone()], dur.clone()),
                    global("subtract_int64", vec![int.clone(), int.clone()], int.clone()),
                    global("subtract_timestamp_duration", vec![ts.clone(), dur.clone()], ts.clone()),
                    global("subtract_timestamp_timestamp", vec![ts.clone(), ts.clone()], dur.clone()),
                    global("subtract_uint64", vec![uint.clone(), uint.clone()], uint.clone()),
                ],
            )?,
            function(
                "_*_",
                vec![
                    global("multiply_double", vec![double.clone(), double.clone()], double.clone()),
                    global("multiply_int64", vec![int.clone(), int.clone()], int.clone()),
                    global("multiply_uint64", vec![uint.clone(), uint.clone()], uint.clone()),
                ],
            )?,
            function(
                "_/_",
                vec![
                    global("divide_double", vec![double.clone(), double.clone()], double.clone()),
                    global("divide_int64", vec![int.clone(), int.clone()], int.clone()),
                    global("divide_uint64", vec![uint.clone(), uint.clone()], uint.clone()),
                ],
            )?,
            function(
                "_%_",
                vec![
                    global("modulo_int64", vec![int.clone(), int.clone()], int.clone()),
                    global("modulo_uint64", vec![uint.clone(), uint.clone()], uint.clone()),
                ],
            )?,
            function(
                "-_",
                vec![
                    global("negate_double", vec![double.clone()], double.clone()),
                    global("negate_int64", vec![int.clone()], int.clone()),
                ],
            )?,
            function(
                "_[_]",
                vec![
                    global("index_list", vec![list_a(), int.clone()], a()),
                    global("index_map", vec![map_ab(), a()], b()),
                ],
            )?,
            function(
                "size",
                vec![
                    global("size_bytes", vec![bytes.clone()], int.clone()),
                    member("bytes_size", vec![bytes.clone()], int.clone()),
                    global("size_list", vec![list_a()], int.clone()),
                    member("list_size", vec![list_a()], int.clone()),
                    global("size_map", vec![map_ab()], int.clone()),
                    member("map_size", vec![map_ab()], int.clone()),
                    global("size_string", vec![string.clone()], int.clone()),
                    member("string_size", vec![string.clone()], int.clone()),
                ],
            )?,
            function(
                "@in",
                vec![
                    global("in_list", vec![a(), list_a()], boolean.clone()),
                    global("in_map", vec![a(), map_ab()], boolean.clone()),
                ],
            )?,
            function("type", vec![global("type", vec![a()], Type::type_of(a()))])?,
            function("dyn", vec![global("to_dyn", vec![a()], Type::Dyn)])?,
            function(
                "int",
                vec![
                    global("int64_to_int64", vec![int.clone()], int.clone()),
                    global("uint64_to_int64", vec![uint.clone()], int.clone()),
                    global("double_to_int64", vec![double.clone()], int.clone()),
                    global("string_to_int64", vec![string.clone()], int.clone()),
                    global("timestamp_to_int64", vec![ts.clone()], int.clone()),
                    global("duration_to_int64", vec![dur.clone()], int.clone()),
                ],
            )?,
            function(
                "uint",
                vec![
                    global("uint64_to_uint64", vec![uint.clone()], uint.clone()),
                    global("int64_to_uint64", vec![int.clone()], uint.clone()),
                    global("double_to_uint64", vec![double.clone()], uint.clone()),
                    global("string_to_uint64", vec![string.clone()], uint.clone()),
                ],
            )?,
            function(
                "double",
                vec![
                    global("double_to_double", vec![double.clone()], double.clone()),
                    global("int64_to_double", vec![int.clone()], double.clone()),
                    global("uint64_to_double", vec![uint.clone()], double.clone()),
                    global("string_to_double", vec![string.clone()], double.clone()),
                ],
            )?,
            function(
                "bool",
                vec![
                    global("bool_to_bool", vec![boolean.clone()], boolean.clone()),
                    global("string_to_bool", vec![string.clone()], boolean.clone()),
                ],
            )?,
            function(
                "bytes",
                vec![
                    global("bytes_to_bytes", vec![bytes.clone()], bytes.clone()),
                    global("string_to_bytes", vec![string.clone()], bytes.clone()),
                ],
            )?,
            function(
                "string",
                vec![
                    global("string_to_string", vec![string.clone()], string.clone()),
                    global("bool_to_string", vec![boolean.clone()], string.clone()),
                    global("int64_to_string", vec![int.clone()], string.clone()),
                    global("uint64_to_string", vec![uint.clone()], string.clone()),
                    global("double_to_string", vec![double.clone()], string.clone()),
                    global("bytes_to_string", vec![bytes.clone()], string.clone()),
                    global("timestamp_to_string", vec![ts.clone()], string.clone()),
                    global("duration_to_string", vec![dur.clone()], string.clone()),
                ],
            )?,
            function(
                "timestamp",
                vec![
                    global("timestamp_to_timestamp", vec![ts.clone()], ts.clone()),
                    global("string_to_timestamp", vec![string.clone()], ts.clone()),
                    global("int64_to_timestamp", vec![int.clone()], ts.clone()),
                ],
            )?,
            function(
                "duration",
                vec![
                    global("duration_to_duration", vec![dur.clone()], dur.clone()),
                    global("string_to_duration", vec![string.clone()], dur.clone()),
                ],
            )?,
            function(
                "matches",
                vec![
                    global("matches", vec![string.clone(), string.clone()], boolean.clone()),
                    member("matches_string", vec![string.clone(), string.clone()], boolean.clone()),
                ],
            )?,
            function(
                "contains",
                vec![member("contains_string", vec![string.clone(), string.clone()], boolean.clone())],
            )?,
            function(
                "endsWith",
                vec![member("ends_with_string", vec![string.clone(), string.clone()], boolean.clone())],
            )?,
            function(
                "startsWith",
                vec![member("starts_with_string", vec![string.clone(), string.clone()], boolean.clone())],
            )?,
        ];

        fns.extend(comparison_functions()?);
        fns.extend(time_accessors()?);
        Ok(fns)
    }
}

fn comparison_functions() -> Result<Vec<FunctionDecl>, String> {
    let ordered = [
        ("bool", Type::Bool),
        ("int64", Type::Int),
        ("uint64", Type::Uint),
        ("double", Type::Double),
        ("string", Type::String),
        ("bytes", Type::Bytes),
        ("timestamp", Type::Timestamp),
        ("duration", Type::Duration),
    ];
    let ops = [
        ("_<_", "less"),
        ("_<=_", "less_equals"),
        ("_>_", "greater"),
        ("_>=_", "greater_equals"),
    ];
    ops.iter()
        .map(|(name, prefix)| {
            let mut overloads: Vec<OverloadDecl> = ordered
                .iter()
                .map(|(suffix, t)| {
                    global(
                        &format!("{}_{}", prefix, suffix),
                        vec![t.clone(), t.clone()],
                        Type::Bool,
                    )
                })
                .collect();
            for ((l, lk), (r, rk)) in CROSS_NUMERIC_PAIRS {
                overloads.push(global(
                    &format!("{}_{}_{}", prefix, l, r),
                    vec![lk.to_type(), rk.to_type()],
                    Type::Bool,
                ));
            }
            function(name, overloads)
        })
        .collect()
}

fn time_accessors() -> Result<Vec<FunctionDecl>, String> {
    let accessors = [
        ("getFullYear", "timestamp_to_year", None),
        ("getMonth", "timestamp_to_month", None),
        ("getDayOfYear", "timestamp_to_day_of_year", None),
        ("getDayOfMonth", "timestamp_to_day_of_month", None),
        ("getDate", "timestamp_to_day_of_month_1_based", None),
        ("getDayOfWeek", "timestamp_to_day_of_week", None),
        ("getHours", "timestamp_to_hours", Some("duration_to_hours")),
        ("getMinutes", "timestamp_to_minutes", Some("duration_to_minutes")),
        ("getSeconds", "timestamp_to_seconds", Some("duration_to_seconds")),
        ("getMilliseconds", "timestamp_to_milliseconds", Some("duration_to_milliseconds")),
    ];
    accessors
        .iter()
        .map(|(name, ts_id, dur_id)| {
            let mut overloads = vec![
                member(ts_id, vec![Type::Timestamp], Type::Int),
                member(
                    &format!("{}_with_tz", ts_id),
                    vec![Type::Timestamp, Type::String],
                    Type::Int,
                ),
            ];
            if let Some(id) = dur_id {
                overloads.push(member(id, vec![Type::Duration], Type::Int));
            }
            function(name, overloads)
        })
        .collect()
}

/// `optional_type(T)` with its functions and the `optMap`/`optFlatMap`
/// macros.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionalLibrary;

impl Library for OptionalLibrary {
    fn name(&self) -> &'static str {
        "cel.lib.optional"
    }

    fn macros(&self) -> Vec<Macro> {
        optional_macros()
    }

    fn variables(&self) -> Vec<VariableDecl> {
        vec![VariableDecl::new(
            "optional_type",
            Type::type_of(Type::optional(Type::Dyn)),
        )]
    }

    fn functions(&self) -> Result<Vec<FunctionDecl>, String> {
        let opt_v = || Type::optional(v());
        let list_v = || Type::list(v());
        let map_kv = || Type::map(k(), v());
        Ok(vec![
            function("optional.of", vec![global("optional_of", vec![v()], opt_v())])?,
            function(
                "optional.ofNonZeroValue",
                vec![global("optional_ofNonZeroValue", vec![v()], opt_v())],
            )?,
            function("optional.none", vec![global("optional_none", vec![], opt_v())])?,
            function("value", vec![member("optional_value", vec![opt_v()], v())])?,
            function("hasValue", vec![member("optional_hasValue", vec![opt_v()], Type::Bool)])?,
            function("or", vec![member("optional_or_optional", vec![opt_v(), opt_v()], opt_v())])?,
            function("orValue", vec![member("optional_orValue_value", vec![opt_v(), v()], v())])?,
            function(
                "_?._",
                vec![global("select_optional_field", vec![Type::Dyn, Type::String], opt_v())],
            )?,
            function(
                "_[?_]",
                vec![
                    global("list_optindex_optional_int", vec![list_v(), Type::Int], opt_v()),
                    global(
                        "optional_list_optindex_optional_int",
                        vec![Type::optional(list_v()), Type::Int],
                        opt_v(),
                    ),
                    global("map_optindex_optional_value", vec![map_kv(), k()], opt_v()),
                    global(
                        "optional_map_optindex_optional_value",
                        vec![Type::optional(map_kv()), k()],
                        opt_v(),
                    ),
                ],
            )?,
            function(
                "_[_]",
                vec![
                    global("optional_list_index_int", vec![Type::optional(list_v()), Type::Int], opt_v()),
                    global("optional_map_index_value", vec![Type::optional(map_kv()), k()], opt_v()),
                ],
            )?,
            function("first", vec![member("list_first", vec![list_v()], opt_v())])?,
            function("last", vec![member("list_last", vec![list_v()], opt_v())])?,
            function(
                "optional.unwrap",
                vec![global("optional_unwrap", vec![Type::list(opt_v())], list_v())],
            )?,
            function(
                "unwrapOpt",
                vec![member("optional_unwrapOpt", vec![Type::list(opt_v())], list_v())],
            )?,
        ])
    }
}

/// `cel.bind`
#[derive(Debug, Clone, Copy, Default)]
pub struct BindingsLibrary;

impl Library for BindingsLibrary {
    fn name(&self) -> &'static str {
        "cel.lib.ext.cel.bindings"
    }

    fn macros(&self) -> Vec<Macro> {
        bindings_macros()
    }
}

/// `base64.encode` and `base64.decode`
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodersLibrary;

impl Library for EncodersLibrary {
    fn name(&self) -> &'static str {
        "cel.lib.ext.encoders"
    }

    fn functions(&self) -> Result<Vec<FunctionDecl>, String> {
        Ok(vec![
            function(
                "base64.decode",
                vec![global("base64_decode_string", vec![Type::String], Type::Bytes)],
            )?,
            function(
                "base64.encode",
                vec![global("base64_encode_bytes", vec![Type::Bytes], Type::String)],
            )?,
        ])
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MathLibrary;

impl Library for MathLibrary {
    fn name(&self) -> &'static str {
        "cel.lib.ext.math"
    }

    fn macros(&self) -> Vec<Macro> {
        math_macros()
    }

    fn functions(&self) -> Result<Vec<FunctionDecl>, String> {
        let numerics = [
            ("double", Type::Double),
            ("int", Type::Int),
            ("uint", Type::Uint),
        ];
        let mut fns = Vec::new();
        for name in ["@max", "@min"] {
            let prefix = format!("math_{}", name);
            let mut overloads = Vec::new();
            for (suffix, t) in &numerics {
                overloads.push(global(&format!("{}_{}", prefix, suffix), vec![t.clone()], t.clone()));
            }
            for (ls, lt) in &numerics {
                for (rs, rt) in &numerics {
                    let result = if ls == rs { lt.clone() } else { Type::Dyn };
                    overloads.push(global(
                        &format!("{}_{}_{}", prefix, ls, rs),
                        vec![lt.clone(), rt.clone()],
                        result,
                    ));
                }
            }
            for (suffix, t) in &numerics {
                overloads.push(global(
                    &format!("{}_list_{}", prefix, suffix),
                    vec![Type::list(t.clone())],
                    t.clone(),
                ));
            }
            fns.push(function(&format!("math.{}", name), overloads)?);
        }

        for name in ["ceil", "floor", "round", "trunc"] {
            fns.push(function(
                &format!("math.{}", name),
                vec![global(&format!("math_{}_double", name), vec![Type::Double], Type::Double)],
            )?);
        }
        for name in ["isInf", "isNaN", "isFinite"] {
            fns.push(function(
                &format!("math.{}", name),
                vec![global(&format!("math_{}_double", name), vec![Type::Double], Type::Bool)],
            )?);
        }
        for name in ["abs", "sign"] {
            let overloads = numerics
                .iter()
                .map(|(suffix, t)| {
                    global(&format!("math_{}_{}", name, suffix), vec![t.clone()], t.clone())
                })
                .collect();
            fns.push(function(&format!("math.{}", name), overloads)?);
        }
        for name in ["bitAnd", "bitOr", "bitXor"] {
            fns.push(function(
                &format!("math.{}", name),
                vec![
                    global(&format!("math_{}_int_int", name), vec![Type::Int, Type::Int], Type::Int),
                    global(&format!("math_{}_uint_uint", name), vec![Type::Uint, Type::Uint], Type::Uint),
                ],
            )?);
        }
        fns.push(function(
            "math.bitNot",
            vec![
                global("math_bitNot_int_int", vec![Type::Int], Type::Int),
                global("math_bitNot_uint_uint", vec![Type::Uint], Type::Uint),
            ],
        )?);
        for name in ["bitShiftLeft", "bitShiftRight"] {
            fns.push(function(
                &format!("math.{}", name),
                vec![
                    global(&format!("math_{}_int_int", name), vec![Type::Int, Type::Int], Type::Int),
                    global(&format!("math_{}_uint_int", name), vec![Type::Uint, Type::Int], Type::Uint),
                ],
            )?);
        }
        let sqrt = numerics
            .iter()
            .map(|(suffix, t)| global(&format!("math_sqrt_{}", suffix), vec![t.clone()], Type::Double))
            .collect();
        fns.push(function("math.sqrt", sqrt)?);
        Ok(fns)
    }
}

/// `proto.getExt` and `proto.hasExt`
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtosLibrary;

impl Library for ProtosLibrary {
    fn name(&self) -> &'static str {
        "cel.lib.ext.protos"
    }

    fn macros(&self) -> Vec<Macro> {
        proto_macros()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StringsLibrary;

impl Library for StringsLibrary {
    fn name(&self) -> &'static str {
        "cel.lib.ext.strings"
    }

    fn functions(&self) -> Result<Vec<FunctionDecl>, String> {
        let s = || Type::String;
        let i = || Type::Int;
        let list_s = || Type::list(Type::String);
        Ok(vec![
            function("charAt", vec![member("string_char_at_int", vec![s(), i()], s())])?,
            function(
                "indexOf",
                vec![
                    member("string_index_of_string", vec![s(), s()], i()),
                    member("string_index_of_string_int", vec![s(), s(), i()], i()),
                ],
            )?,
            function(
                "lastIndexOf",
                vec![
                    member("string_last_index_of_string", vec![s(), s()], i()),
                    member("string_last_index_of_string_int", vec![s(), s(), i()], i()),
                ],
            )?,
            function("lowerAscii", vec![member("string_lower_ascii", vec![s()], s())])?,
            function(
                "replace",
                vec![
                    member("string_replace_string_string", vec![s(), s(), s()], s()),
                    member("string_replace_string_string_int", vec![s(), s(), s(), i()], s()),
                ],
            )?,
            function(
                "split",
                vec![
                    member("string_split_string", vec![s(), s()], list_s()),
                    member("string_split_string_int", vec![s(), s(), i()], list_s()),
                ],
            )?,
            function(
                "substring",
                vec![
                    member("string_substring_int", vec![s(), i()], s()),
                    member("string_substring_int_int", vec![s(), i(), i()], s()),
                ],
            )?,
            function("trim", vec![member("string_trim", vec![s()], s())])?,
            function("upperAscii", vec![member("string_upper_ascii", vec![s()], s())])?,
            function(
                "format",
                vec![member("string_format", vec![s(), Type::list(Type::Dyn)], s())],
            )?,
            function("strings.quote", vec![global("strings_quote", vec![s()], s())])?,
            function(
                "join",
                vec![
                    member("list_join", vec![list_s()], s()),
                    member("list_join_string", vec![list_s(), s()], s()),
                ],
            )?,
            function("reverse", vec![member("string_reverse", vec![s()], s())])?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_libraries_declare_cleanly() {
        let libs: Vec<Box<dyn Library>> = vec![
            Box::new(StandardLibrary),
            Box::new(OptionalLibrary),
            Box::new(EncodersLibrary),
            Box::new(MathLibrary),
            Box::new(StringsLibrary),
        ];
        for lib in libs {
            assert!(lib.functions().is_ok(), "{}", lib.name());
        }
    }

    #[test]
    fn test_cross_type_comparisons_disabled() {
        assert!(is_overload_disabled("less_int64_double"));
        assert!(is_overload_disabled("greater_equals_uint64_int64"));
        assert!(!is_overload_disabled("less_int64"));
        assert_eq!(CROSS_TYPE_COMPARISONS.len(), 24);
    }

    #[test]
    fn test_type_identifiers() {
        let vars = StandardLibrary.variables();
        let int = vars.iter().find(|v| v.name == "int").unwrap();
        assert_eq!(int.ty, Type::type_of(Type::Int));
        let any = vars.iter().find(|v| v.name == "google.protobuf.Any").unwrap();
        assert_eq!(any.ty, Type::type_of(Type::Any));
        assert!(vars.iter().any(|v| v.name == "null_type"));
    }

    #[test]
    fn test_math_mixed_arguments_are_dyn() {
        let fns = MathLibrary.functions().unwrap();
        let max = fns.iter().find(|f| f.name == "math.@max").unwrap();
        let mixed = max
            .overloads()
            .iter()
            .find(|o| o.id == "math_@max_int_double")
            .unwrap();
        assert_eq!(mixed.result, Type::Dyn);
    }
}
