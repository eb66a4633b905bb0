//! Template pack schema (§6): `{name, url, binaries?, source?}`, each
//! variant a `{instructions, environment?, dependencies?}` triple
//! rendered against a parameter context to `{environment,
//! instructions}` (§4.1 `template` directive kind).

use indexmap::IndexMap;
use serde::Deserialize;

use crate::model::OneOrMany;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackVariant {
    pub instructions: OneOrMany,
    #[serde(default)]
    pub environment: IndexMap<String, String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplatePackDef {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub source: Option<PackVariant>,
    #[serde(default)]
    pub binaries: Option<PackVariant>,
}

/// Packs baked into the binary (design note §5: the registry is
/// effectively read-only after process init). Looked up by name before
/// falling back to an on-disk override directory.
pub const EMBEDDED_PACKS: &[(&str, &str)] = &[
    ("_header", include_str!("../../templatepacks/_header.yaml")),
    ("miniconda", include_str!("../../templatepacks/miniconda.yaml")),
];
