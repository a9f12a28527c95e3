//! # Stubgen
//!
//! Generates the UI-side TypeScript for a bridge catalog: one module per
//! bound object with a promise-returning function per method, the events API,
//! the shared runtime that pairs calls with replies, interfaces for declared
//! types and an index that ties them together.
//!
//! ```text
//! <out>/
//!   index.ts          export * as math from "./objects/math"; ...
//!   runtime.ts        correlation table, receive hook, BridgeError
//!   events.ts         on(event, handler) / off(event, handler)
//!   types.ts          interfaces for declared types
//!   objects/math.ts   export function add(a: number, b: number): Promise<number>
//! ```
//!
//! Generation is a build step. The host writes its catalog as a manifest
//! (`BridgeConfig::manifest_path`), and the `stubgen` binary turns the
//! manifest into sources. The same catalog always yields byte-identical files.

pub mod artifacts;
pub mod typescript;

pub use artifacts::StaleFile;
pub use artifacts::Staleness;
pub use artifacts::StubArtifacts;
pub use artifacts::WriteReport;
pub use artifacts::check_artifacts;
pub use artifacts::write_artifacts;

use bindrun::Catalog;

/// Renders every artifact for `catalog`.
pub fn generate(catalog: &Catalog) -> StubArtifacts {
    let objects = catalog
        .objects
        .iter()
        .map(|(qualifier, schema)| (qualifier.clone(), typescript::object(schema)))
        .collect();
    let defs: Vec<_> = catalog.types.values().collect();

    StubArtifacts {
        objects,
        events: typescript::events(),
        runtime: typescript::runtime(),
        types: typescript::types(&defs),
        index: typescript::index(catalog),
    }
}
