//! Variable and function declarations.
//!
//! Function declarations follow the usual CEL merge rules: overload IDs
//! are unique per function, two overloads of one function may not accept
//! the same arguments, and redeclaring an identical overload is a no-op.

use super::types::Type;
use crate::model;

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub name: String,
    pub ty: Type,
}

impl VariableDecl {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverloadDecl {
    pub id: String,
    /// Argument types; for member overloads the receiver comes first
    pub args: Vec<Type>,
    pub result: Type,
    pub member: bool,
}

impl OverloadDecl {
    pub fn global(id: &str, args: Vec<Type>, result: Type) -> Self {
        Self {
            id: id.to_string(),
            args,
            result,
            member: false,
        }
    }

    pub fn member(id: &str, args: Vec<Type>, result: Type) -> Self {
        Self {
            id: id.to_string(),
            args,
            result,
            member: true,
        }
    }

    /// Type parameter names in first-use order
    pub fn type_params(&self) -> Vec<String> {
        let mut names = Vec::new();
        for t in self.args.iter().chain(std::iter::once(&self.result)) {
            collect_params(t, &mut names);
        }
        names
    }

    /// Two overloads overlap when some call could match both
    pub fn signature_overlaps(&self, other: &OverloadDecl) -> bool {
        self.member == other.member
            && self.args.len() == other.args.len()
            && self
                .args
                .iter()
                .zip(&other.args)
                .all(|(a, b)| a.is_assignable_type(b) || b.is_assignable_type(a))
    }

    fn signature_equals(&self, other: &OverloadDecl) -> bool {
        self.id == other.id
            && self.member == other.member
            && self.args == other.args
            && self.result == other.result
    }
}

fn collect_params(t: &Type, names: &mut Vec<String>) {
    if let Type::TypeParam(name) = t {
        if !names.contains(name) {
            names.push(name.clone());
        }
        return;
    }
    for p in t.parameters() {
        collect_params(p, names);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    overloads: Vec<OverloadDecl>,
}

impl FunctionDecl {
    pub fn new(name: &str, overloads: Vec<OverloadDecl>) -> Result<Self, String> {
        if overloads.is_empty() {
            return Err(format!("function {} must have at least one overload", name));
        }
        let mut decl = Self {
            name: name.to_string(),
            overloads: Vec::with_capacity(overloads.len()),
        };
        for o in overloads {
            decl.add_overload(o)?;
        }
        Ok(decl)
    }

    pub fn overloads(&self) -> &[OverloadDecl] {
        &self.overloads
    }

    pub fn add_overload(&mut self, overload: OverloadDecl) -> Result<(), String> {
        for existing in &self.overloads {
            if existing.id != overload.id && existing.signature_overlaps(&overload) {
                return Err(format!(
                    "overload signature collision in function {}: {} collides with {}",
                    self.name, existing.id, overload.id
                ));
            }
            if existing.id == overload.id {
                if existing.signature_equals(&overload) {
                    return Ok(());
                }
                return Err(format!(
                    "overload redefinition in function. {}: {} has multiple definitions",
                    self.name, existing.id
                ));
            }
        }
        self.overloads.push(overload);
        Ok(())
    }

    /// Fold another declaration of the same function into this one
    pub fn merge(&mut self, other: &FunctionDecl) -> Result<(), String> {
        if self.name != other.name {
            return Err(format!(
                "cannot merge unrelated functions. {} and {}",
                self.name, other.name
            ));
        }
        for o in &other.overloads {
            self.add_overload(o.clone())
                .map_err(|e| format!("function declaration merge failed: {}", e))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Variable(VariableDecl),
    Function(FunctionDecl),
}

fn convert_type(spec: Option<&model::TypeSpec>) -> Result<Type, String> {
    match spec {
        Some(spec) => Type::from_spec(spec),
        None => Err("unsupported type: <nil>".to_string()),
    }
}

/// Convert a test's `typeEnv` entry. A decl with no ident part is read as
/// a function declaration.
pub fn from_model(decl: &model::Decl) -> Result<Declaration, String> {
    if let Some(ident) = &decl.ident {
        let ty = convert_type(ident.ty.as_ref())?;
        return Ok(Declaration::Variable(VariableDecl::new(&decl.name, ty)));
    }
    let mut overloads = Vec::new();
    for o in decl.function.iter().flat_map(|f| &f.overloads) {
        let args = o
            .params
            .iter()
            .map(Type::from_spec)
            .collect::<Result<Vec<_>, _>>()?;
        let result = convert_type(o.result_type.as_ref())?;
        overloads.push(OverloadDecl {
            id: o.overload_id.clone(),
            args,
            result,
            member: o.is_instance_function,
        });
    }
    FunctionDecl::new(&decl.name, overloads).map(Declaration::Function)
}
