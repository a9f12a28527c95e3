//! # Registry of bound objects and their method signatures
//!
//! The Catalog is the source of truth for what the UI surface may call.
//! It maps every qualifier to the ordered signatures of its methods, plus the
//! object shapes those signatures refer to.
//!
//! ## Philosophy
//!
//! - **Registration-Time Safety**: collisions, undeclared types and names that
//!   would not survive as script identifiers are rejected before anything is
//!   attached. A running bridge never discovers a bad declaration.
//! - **Immutable Catalog**: once built, the catalog is shared read-only
//!   (`Arc<Catalog>`) by the dispatcher and the stub generator.
//! - **Deterministic**: objects are ordered by qualifier, methods by
//!   (name, arity), types by name. The same bound set always yields the same
//!   catalog and the same manifest bytes.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use bindwire::Failure;
use bindwire::Kind;
use bindwire::Shapes;
use bindwire::TypeDef;

use crate::bind::Bindable;

/// Registration errors. All of them are fatal to startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Two objects were bound under the same qualifier.
    #[error("qualifier '{0}' is bound more than once")]
    DuplicateQualifier(String),
    /// One object declares two methods with the same name and arity.
    #[error("'{qualifier}' declares '{method}' with {arity} parameter(s) more than once")]
    AmbiguousMethod {
        qualifier: String,
        method: String,
        arity: usize,
    },
    /// A name cannot be used as an identifier in generated stubs.
    #[error("{context} '{name}' is not a valid identifier")]
    InvalidIdentifier { name: String, context: String },
    /// A name is legal on its own but collides in the generated stubs.
    #[error("{context} '{name}' clashes with {other}")]
    NameClash {
        name: String,
        context: String,
        other: String,
    },
    /// A signature or field refers to a type nobody declared.
    #[error("{owner} refers to undeclared type '{type_name}'")]
    UnknownType { owner: String, type_name: String },
    /// Two declarations of one type name disagree on its fields.
    #[error("type '{0}' is declared with conflicting fields")]
    ConflictingType(String),
    /// The manifest could not be (de)serialized or is inconsistent.
    #[error("catalog manifest: {0}")]
    Manifest(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A named, typed parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub kind: Kind,
}

/// The resolved signature of one exposed method.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub qualifier: String,
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Kind,
}

impl MethodSignature {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Every method of one bound object, ordered by (name, arity).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub qualifier: String,
    pub methods: Vec<MethodSignature>,
}

impl ObjectSchema {
    pub fn method(&self, name: &str, arity: usize) -> Option<&MethodSignature> {
        self.methods.iter().find(|m| m.name == name && m.arity() == arity)
    }

    /// All arities of `name`, in ascending order.
    pub fn overloads<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodSignature> + 'a {
        self.methods.iter().filter(move |m| m.name == name)
    }

    /// Distinct method names, in order.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.iter().map(|m| m.name.as_str()).collect();
        names.dedup();
        names
    }
}

/// The immutable description of everything bound.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub objects: BTreeMap<String, ObjectSchema>,
    #[serde(default)]
    pub types: BTreeMap<String, TypeDef>,
}

impl Catalog {
    /// Builds and validates a catalog from a bound set.
    ///
    /// Never invokes any method.
    pub fn build(objects: &[Arc<dyn Bindable>]) -> Result<Self> {
        let mut catalog = Catalog::default();

        for object in objects {
            let qualifier = object.qualifier();
            if catalog.objects.contains_key(&qualifier) {
                return Err(Error::DuplicateQualifier(qualifier));
            }

            for def in object.types() {
                catalog.declare_type(def)?;
            }

            let methods = object
                .methods()
                .into_iter()
                .map(|spec| MethodSignature {
                    qualifier: qualifier.clone(),
                    name: spec.name,
                    params: spec.params,
                    returns: spec.returns,
                })
                .collect();
            catalog.objects.insert(qualifier.clone(), ObjectSchema { qualifier, methods });
        }

        catalog.validate()?;
        Ok(catalog)
    }

    fn declare_type(&mut self, def: TypeDef) -> Result<()> {
        match self.types.get(&def.name) {
            Some(existing) if *existing != def => Err(Error::ConflictingType(def.name)),
            Some(_) => Ok(()),
            None => {
                self.types.insert(def.name.clone(), def);
                Ok(())
            }
        }
    }

    /// Checks every name the stubs will use and puts methods in
    /// (name, arity) order. Runs for built and for loaded catalogs alike.
    fn validate(&mut self) -> Result<()> {
        for (name, def) in &self.types {
            if *name != def.name {
                return Err(Error::Manifest(format!("type key '{}' holds type '{}'", name, def.name)));
            }
            check_identifier(name, "type")?;
            check_unclaimed(name, "type")?;

            let mut fields = HashSet::new();
            for field in &def.fields {
                check_identifier(&field.name, "field")?;
                if !fields.insert(field.name.as_str()) {
                    return Err(clash(&field.name, "field", format!("another field of '{}'", name)));
                }
            }
        }

        let types = &self.types;
        for (qualifier, schema) in self.objects.iter_mut() {
            if *qualifier != schema.qualifier {
                return Err(Error::Manifest(format!(
                    "object key '{}' holds qualifier '{}'",
                    qualifier, schema.qualifier
                )));
            }
            check_identifier(qualifier, "qualifier")?;
            check_unclaimed(qualifier, "qualifier")?;
            if types.contains_key(qualifier) {
                return Err(clash(qualifier, "qualifier", "a declared type"));
            }

            for sig in &schema.methods {
                if sig.qualifier != *qualifier {
                    return Err(Error::Manifest(format!(
                        "method '{}' of '{}' claims qualifier '{}'",
                        sig.name, qualifier, sig.qualifier
                    )));
                }
                check_identifier(&sig.name, "method")?;
                if sig.name == STUB_CALL {
                    return Err(clash(&sig.name, "method", "the stub call binding"));
                }
                if types.contains_key(&sig.name) {
                    return Err(clash(&sig.name, "method", "a declared type"));
                }

                let mut params = HashSet::new();
                for param in &sig.params {
                    check_identifier(&param.name, "parameter")?;
                    if param.name == STUB_CALL {
                        return Err(clash(&param.name, "parameter", "the stub call binding"));
                    }
                    if !params.insert(param.name.as_str()) {
                        return Err(clash(
                            &param.name,
                            "parameter",
                            format!("another parameter of '{}.{}'", qualifier, sig.name),
                        ));
                    }
                }
            }

            schema
                .methods
                .sort_by(|a, b| (a.name.as_str(), a.arity()).cmp(&(b.name.as_str(), b.arity())));
            if let Some(pair) = schema
                .methods
                .windows(2)
                .find(|w| w[0].name == w[1].name && w[0].arity() == w[1].arity())
            {
                return Err(Error::AmbiguousMethod {
                    qualifier: qualifier.clone(),
                    method: pair[0].name.clone(),
                    arity: pair[0].arity(),
                });
            }
        }

        self.check_references()
    }

    /// Every `named` kind must point at a declared type.
    fn check_references(&self) -> Result<()> {
        let mut missing: Option<(String, String)> = None;

        for def in self.types.values() {
            for field in &def.fields {
                self.find_missing(&field.kind, || format!("field '{}.{}'", def.name, field.name), &mut missing);
            }
        }
        for schema in self.objects.values() {
            for sig in &schema.methods {
                let owner = || format!("method '{}.{}'", sig.qualifier, sig.name);
                for param in &sig.params {
                    self.find_missing(&param.kind, owner, &mut missing);
                }
                self.find_missing(&sig.returns, owner, &mut missing);
            }
        }

        match missing {
            Some((owner, type_name)) => Err(Error::UnknownType { owner, type_name }),
            None => Ok(()),
        }
    }

    fn find_missing(&self, kind: &Kind, owner: impl Fn() -> String, missing: &mut Option<(String, String)>) {
        if missing.is_some() {
            return;
        }
        kind.visit_named(&mut |name| {
            if missing.is_none() && !self.types.contains_key(name) {
                *missing = Some((owner(), name.to_string()));
            }
        });
    }

    /// Looks up the method a call addresses.
    ///
    /// Arity must match exactly; there is no defaulting or truncation.
    pub fn resolve(&self, qualifier: &str, method: &str, arity: usize) -> std::result::Result<&MethodSignature, Failure> {
        let schema = self
            .objects
            .get(qualifier)
            .ok_or_else(|| Failure::unknown_object(qualifier))?;
        schema
            .method(method, arity)
            .ok_or_else(|| Failure::unknown_method(qualifier, method, arity))
    }

    pub fn object(&self, qualifier: &str) -> Option<&ObjectSchema> {
        self.objects.get(qualifier)
    }

    /// Serializes the catalog as pretty JSON, newline terminated.
    pub fn to_manifest(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(self).map_err(|e| Error::Manifest(e.to_string()))?;
        text.push('\n');
        Ok(text)
    }

    /// Loads a manifest and validates it like a freshly built catalog.
    pub fn from_manifest(text: &str) -> Result<Self> {
        let mut catalog: Catalog = serde_json::from_str(text).map_err(|e| Error::Manifest(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }
}

impl Shapes for Catalog {
    fn shape(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }
}

/// Words a generated stub cannot use as a binding or namespace name.
const RESERVED: &[&str] = &[
    "arguments", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "eval", "export", "extends", "false", "finally",
    "for", "function", "if", "implements", "import", "in", "instanceof", "interface", "let",
    "new", "null", "package", "private", "protected", "public", "return", "static", "super",
    "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Names the generated index exports next to the object namespaces.
pub const INDEX_EXPORTS: &[&str] = &["on", "off", "Handler", "BridgeError", "FailureKind"];

/// Local name object stubs give the runtime's call function.
pub const STUB_CALL: &str = "__bridgeCall";

fn clash(name: &str, context: &str, other: impl Into<String>) -> Error {
    Error::NameClash {
        name: name.to_string(),
        context: context.to_string(),
        other: other.into(),
    }
}

fn check_unclaimed(name: &str, context: &str) -> Result<()> {
    if INDEX_EXPORTS.contains(&name) {
        return Err(clash(name, context, "an export of the generated index"));
    }
    Ok(())
}

fn check_identifier(name: &str, context: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');

    if valid_start && valid_rest && !RESERVED.contains(&name) {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier {
            name: name.to_string(),
            context: context.to_string(),
        })
    }
}

/// The bound set: validated catalog plus the live objects behind it.
#[derive(Clone)]
pub struct Registry {
    catalog: Arc<Catalog>,
    objects: HashMap<String, Arc<dyn Bindable>>,
}

impl Registry {
    pub fn build(objects: Vec<Arc<dyn Bindable>>) -> Result<Self> {
        let catalog = Catalog::build(&objects)?;
        let objects = objects.into_iter().map(|o| (o.qualifier(), o)).collect();

        tracing::debug!(objects = catalog.objects.len(), types = catalog.types.len(), "catalog built");
        Ok(Self { catalog: Arc::new(catalog), objects })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn object(&self, qualifier: &str) -> Option<&Arc<dyn Bindable>> {
        self.objects.get(qualifier)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("catalog", &self.catalog).finish()
    }
}
