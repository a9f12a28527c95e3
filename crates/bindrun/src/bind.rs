//! # Binding Contract
//!
//! How a host object declares what it exposes to the UI surface.
//!
//! Nothing is discovered by introspection: an object implements [`Bindable`],
//! listing its methods with their parameter and return kinds, and receives
//! invocations by name. The registry checks the declarations once at startup;
//! by the time `invoke` runs, the method exists with exactly `args.len()`
//! parameters and every argument has been coerced to its declared kind.
//!
//! ## Concurrency
//!
//! `invoke` may be entered concurrently for different in-flight calls, even on
//! the same object, and calls are not guaranteed to start in the order the UI
//! issued them. An object that needs serialized access must provide it itself.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;

use bindwire::Kind;
use bindwire::TypeDef;
use bindwire::Value;

use crate::registry::Param;

/// A host object whose declared methods are callable from the UI surface.
#[async_trait::async_trait]
pub trait Bindable: Send + Sync + 'static {
    /// The name the object's methods are addressed under.
    ///
    /// Defaults to the short name of the implementing type.
    fn qualifier(&self) -> String {
        short_type_name(std::any::type_name::<Self>()).to_string()
    }

    /// The exposed method set.
    fn methods(&self) -> Vec<MethodSpec>;

    /// Shapes referenced by [`Kind::Named`] in the method set.
    fn types(&self) -> Vec<TypeDef> {
        Vec::new()
    }

    /// Invokes `method` with already coerced arguments.
    async fn invoke(&self, method: &str, args: Args) -> Result<Value, InvokeError>;
}

/// Strips the module path and generic arguments from a type name.
pub(crate) fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Declaration of one exposed method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSpec {
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Kind,
}

impl MethodSpec {
    /// A method taking no parameters and returning nothing.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: Kind::Unit,
        }
    }

    pub fn param(mut self, name: impl Into<String>, kind: Kind) -> Self {
        self.params.push(Param { name: name.into(), kind });
        self
    }

    pub fn returns(mut self, kind: Kind) -> Self {
        self.returns = kind;
        self
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Positional arguments of one invocation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.0
    }

    /// Decodes argument `index` into a host type.
    pub fn decode<T: DeserializeOwned>(&self, index: usize) -> Result<T, InvokeError> {
        let value = self
            .0
            .get(index)
            .cloned()
            .ok_or_else(|| InvokeError::new(format!("missing argument {}", index)))?;
        value
            .deserialize_into()
            .map_err(|e| InvokeError::new(format!("argument {}: {}", index, e)))
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// The error a native method reports back to its caller.
///
/// Like `anyhow::Error`, this converts from any `std::error::Error`, so `?`
/// works inside `invoke` on most fallible host operations.
pub struct InvokeError {
    message: String,
}

impl InvokeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl<E> From<E> for InvokeError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::new(err.to_string())
    }
}

impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl fmt::Debug for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InvokeError({:?})", self.message)
    }
}

type Handler = Arc<dyn Fn(Args) -> BoxFuture<'static, Result<Value, InvokeError>> + Send + Sync>;

/// A bindable object assembled from closures.
///
/// Handy when the exposed surface is a handful of free functions rather than
/// methods of one host type.
///
/// ```ignore
/// let math = Functions::new("math").func(
///     MethodSpec::new("add").param("a", Kind::Integer).param("b", Kind::Integer).returns(Kind::Integer),
///     |args| async move { Ok(Value::Int(args.decode::<i64>(0)? + args.decode::<i64>(1)?)) },
/// );
/// ```
pub struct Functions {
    qualifier: String,
    specs: Vec<MethodSpec>,
    types: Vec<TypeDef>,
    handlers: HashMap<(String, usize), Handler>,
}

impl Functions {
    pub fn new(qualifier: impl Into<String>) -> Self {
        Self {
            qualifier: qualifier.into(),
            specs: Vec::new(),
            types: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    /// Adds a method. A later declaration with the same name and arity is
    /// kept in the declared set, so the registry reports it as ambiguous.
    pub fn func<F, Fut>(mut self, spec: MethodSpec, handler: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, InvokeError>> + Send + 'static,
    {
        let key = (spec.name.clone(), spec.arity());
        let handler: Handler = Arc::new(move |args| Box::pin(handler(args)));
        self.handlers.entry(key).or_insert(handler);
        self.specs.push(spec);
        self
    }

    pub fn type_def(mut self, def: TypeDef) -> Self {
        self.types.push(def);
        self
    }
}

#[async_trait::async_trait]
impl Bindable for Functions {
    fn qualifier(&self) -> String {
        self.qualifier.clone()
    }

    fn methods(&self) -> Vec<MethodSpec> {
        self.specs.clone()
    }

    fn types(&self) -> Vec<TypeDef> {
        self.types.clone()
    }

    async fn invoke(&self, method: &str, args: Args) -> Result<Value, InvokeError> {
        let handler = self
            .handlers
            .get(&(method.to_string(), args.len()))
            .cloned()
            .ok_or_else(|| InvokeError::new(format!("no handler for '{}'", method)))?;
        handler(args).await
    }
}
