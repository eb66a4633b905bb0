//! Directive algebra & apply semantics (§3, §4.1, §4.3, §4.4): the
//! tagged-sum `Action` (see `crate::model`) maps onto two total
//! functions — validation (`Directive::action`, already in
//! `model.rs`) and application (`apply`, here).

pub mod apply;
pub mod kinds;

pub use apply::{apply_directive, apply_directives, seed_header};
pub use kinds::GLOBAL_MOUNT_POINTS;
