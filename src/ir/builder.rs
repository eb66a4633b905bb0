//! The build IR: an immutable, append-only ordered sequence of typed
//! directives (§4.7). `IrBuilder::add` takes `&self` and returns a new
//! builder whose sequence is the old one with the directive appended —
//! the context swaps its own pointer on each append rather than
//! mutating shared state (design note: "Immutable append-only builder
//! vs mutable context").

use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq)]
pub enum IrDirective {
    From(String),
    Env(IndexMap<String, String>),
    Run(String),
    RunWithMounts { mounts: Vec<String>, command: String },
    Copy { sources: Vec<String>, dest: String },
    LiteralFile { path: String, contents: String, executable: bool },
    Workdir(String),
    User(String),
    Entrypoint(String),
    ExecEntrypoint(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IrBuilder(Vec<IrDirective>);

impl IrBuilder {
    pub fn new() -> Self {
        IrBuilder(Vec::new())
    }

    /// Appends `directive`, returning a new builder. Ordering is
    /// preserved byte-for-byte from directive application order (§3
    /// invariant).
    pub fn add(&self, directive: IrDirective) -> Self {
        let mut next = self.0.clone();
        next.push(directive);
        IrBuilder(next)
    }

    pub fn directives(&self) -> &[IrDirective] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_non_mutating_and_preserves_order() {
        let b0 = IrBuilder::new();
        let b1 = b0.add(IrDirective::From("debian:bookworm".into()));
        let b2 = b1.add(IrDirective::Workdir("/app".into()));

        assert!(b0.is_empty());
        assert_eq!(b1.len(), 1);
        assert_eq!(b2.len(), 2);
        assert_eq!(b2.directives()[0], IrDirective::From("debian:bookworm".into()));
        assert_eq!(b2.directives()[1], IrDirective::Workdir("/app".into()));
    }
}
