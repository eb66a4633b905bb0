//! CLI command implementations (§6 external collaborator contract).
//! Each command returns `anyhow::Result`, adding a contextual message
//! at this boundary while the library crate stays strongly typed
//! (§7: "errors bubble up unwrapped except at component boundaries").

pub mod build;
pub mod generate;
pub mod template_tests;
pub mod test_all;
