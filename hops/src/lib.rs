//! Hops - a lightweight, capability-constrained command execution engine.
//!
//! A persistent supervisor process ([`supervisor`]) owns a single
//! long-lived virtual-machine manager ([`vmm`]) and orchestrates many
//! short-lived guest containers ([`sandbox`]) that boot over a shared
//! minimal init filesystem, execute a user-supplied command, stream
//! output back over a local socket ([`control`]), and are torn down.
//! Policies ([`policy`]) describe what a container is allowed to do;
//! [`enforcer`] translates an accepted policy into a guest configuration.

pub mod control;
pub mod enforcer;
pub mod pipeline;
pub mod policy;
pub mod sandbox;
pub mod supervisor;
pub mod util;
pub mod vmm;

pub use hops_shared::errors::{HopsError, HopsResult};
