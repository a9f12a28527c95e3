//! # TypeScript Emission
//!
//! Renders a [`Catalog`] as TypeScript sources.
//!
//! ## Invariants
//! - **Deterministic**: output depends only on the catalog, which is already
//!   ordered. No timestamps, no hashes of the environment.
//! - Every exposed method is reachable as `qualifier.method` through the index.

use std::collections::BTreeSet;

use bindrun::Catalog;
use bindrun::MethodSignature;
use bindrun::ObjectSchema;
use bindrun::registry::STUB_CALL;
use bindwire::Kind;
use bindwire::TypeDef;

pub const HEADER: &str = "// Code generated by stubgen. DO NOT EDIT.";

/// Local name of the runtime's `call` inside object stubs. The registry
/// refuses methods and parameters that would shadow it.
const CALL: &str = STUB_CALL;

const RUNTIME_TEMPLATE: &str = include_str!("../templates/runtime.ts");
const EVENTS_TEMPLATE: &str = include_str!("../templates/events.ts");

/// Line-oriented source buffer.
#[derive(Default)]
struct Source {
    text: String,
}

impl Source {
    fn generated() -> Self {
        let mut source = Self::default();
        source.line(HEADER);
        source.blank();
        source
    }

    fn line(&mut self, text: impl AsRef<str>) {
        self.text.push_str(text.as_ref());
        self.text.push('\n');
    }

    fn blank(&mut self) {
        self.text.push('\n');
    }

    fn finish(self) -> String {
        self.text
    }
}

/// The TypeScript spelling of a kind.
pub fn ts_type(kind: &Kind) -> String {
    match kind {
        Kind::Integer | Kind::Float => "number".into(),
        Kind::Boolean => "boolean".into(),
        Kind::String => "string".into(),
        Kind::Object => "Record<string, unknown>".into(),
        Kind::Named(name) => name.clone(),
        Kind::Array(inner) => format!("Array<{}>", ts_type(inner)),
        Kind::Any => "unknown".into(),
        Kind::Unit => "void".into(),
    }
}

fn params(signature: &MethodSignature) -> String {
    signature
        .params
        .iter()
        .map(|p| format!("{}: {}", p.name, ts_type(&p.kind)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn arg_list(signature: &MethodSignature) -> String {
    let names: Vec<&str> = signature.params.iter().map(|p| p.name.as_str()).collect();
    format!("[{}]", names.join(", "))
}

pub fn runtime() -> String {
    let mut source = Source::generated();
    source.text.push_str(RUNTIME_TEMPLATE);
    source.finish()
}

pub fn events() -> String {
    let mut source = Source::generated();
    source.text.push_str(EVENTS_TEMPLATE);
    source.finish()
}

pub fn types(defs: &[&TypeDef]) -> String {
    let mut source = Source::generated();
    if defs.is_empty() {
        source.line("export {};");
        return source.finish();
    }

    for (i, def) in defs.iter().enumerate() {
        if i > 0 {
            source.blank();
        }
        source.line(format!("export interface {} {{", def.name));
        for field in &def.fields {
            source.line(format!("  {}: {};", field.name, ts_type(&field.kind)));
        }
        source.line("}");
    }
    source.finish()
}

/// The stub module of one bound object.
pub fn object(schema: &ObjectSchema) -> String {
    let mut source = Source::generated();
    source.line(format!("import {{ call as {} }} from \"../runtime\";", CALL));

    let mut named = BTreeSet::new();
    for signature in &schema.methods {
        for param in &signature.params {
            param.kind.visit_named(&mut |n| {
                named.insert(n);
            });
        }
        signature.returns.visit_named(&mut |n| {
            named.insert(n);
        });
    }
    if !named.is_empty() {
        let names: Vec<&str> = named.into_iter().collect();
        source.line(format!("import type {{ {} }} from \"../types\";", names.join(", ")));
    }

    for name in schema.method_names() {
        source.blank();
        let overloads: Vec<&MethodSignature> = schema.overloads(name).collect();
        match overloads.as_slice() {
            [single] => emit_method(&mut source, single),
            many => emit_overloads(&mut source, name, many),
        }
    }
    source.finish()
}

fn emit_method(source: &mut Source, signature: &MethodSignature) {
    let returns = ts_type(&signature.returns);
    source.line(format!(
        "export function {}({}): Promise<{}> {{",
        signature.name,
        params(signature),
        returns
    ));
    source.line(format!(
        "  return {}({:?}, {:?}, {}) as Promise<{}>;",
        CALL,
        signature.qualifier,
        signature.name,
        arg_list(signature),
        returns
    ));
    source.line("}");
}

/// Overloads share one implementation that forwards whatever was supplied;
/// the host picks the method by exact arity.
fn emit_overloads(source: &mut Source, name: &str, overloads: &[&MethodSignature]) {
    for signature in overloads {
        source.line(format!(
            "export function {}({}): Promise<{}>;",
            name,
            params(signature),
            ts_type(&signature.returns)
        ));
    }
    let qualifier = overloads.first().map(|s| s.qualifier.as_str()).unwrap_or_default();
    source.line(format!("export function {}(...args: any[]): Promise<any> {{", name));
    source.line(format!("  return {}({:?}, {:?}, args);", CALL, qualifier, name));
    source.line("}");
}

pub fn index(catalog: &Catalog) -> String {
    let mut source = Source::generated();
    for qualifier in catalog.objects.keys() {
        source.line(format!("export * as {} from \"./objects/{}\";", qualifier, qualifier));
    }
    source.line("export { off, on } from \"./events\";");
    source.line("export type { Handler } from \"./events\";");
    source.line("export { BridgeError } from \"./runtime\";");
    source.line("export type { FailureKind } from \"./runtime\";");
    source.line("export type * from \"./types\";");
    source.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ts_type(&Kind::Integer), "number");
        assert_eq!(ts_type(&Kind::Float), "number");
        assert_eq!(ts_type(&Kind::array_of(Kind::array_of(Kind::String))), "Array<Array<string>>");
        assert_eq!(ts_type(&Kind::named("Point")), "Point");
        assert_eq!(ts_type(&Kind::Any), "unknown");
        assert_eq!(ts_type(&Kind::Unit), "void");
    }

    #[test]
    fn test_empty_types_module() {
        assert_eq!(types(&[]), format!("{}\n\nexport {{}};\n", HEADER));
    }

    #[test]
    fn test_fixed_index_exports_are_reserved() {
        let text = index(&Catalog::default());
        let mut exported: Vec<&str> = text
            .lines()
            .filter_map(|line| Some(line.split_once('{')?.1.split_once('}')?.0))
            .flat_map(|names| names.split(',').map(str::trim))
            .collect();
        exported.sort_unstable();

        let mut reserved = bindrun::registry::INDEX_EXPORTS.to_vec();
        reserved.sort_unstable();
        assert_eq!(exported, reserved);
    }
}
