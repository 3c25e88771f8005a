//! Policy Model (M) and Policy Parser/Validator (V).

pub mod model;
pub mod parser;
pub mod validator;

pub use model::{
    CapabilityGrant, FilesystemRight, MountEntry, MountMode, MountType, NetworkMode, Policy,
    ResourceLimits, SandboxConfig,
};
pub use parser::{parse, parse_file};
pub use validator::validate;

/// Parse and validate a policy document in one call - the shape most
/// callers (the Control Service, tests) actually want.
pub fn load(text: &str) -> hops_shared::errors::HopsResult<Policy> {
    let policy = parse(text)?;
    validate(&policy)?;
    Ok(policy)
}
