//! Control Service (C): the tonic `Control` RPC surface, converting
//! between wire messages and the internal policy/sandbox types and
//! delegating all container lifecycle work to the Sandbox Manager.

mod convert;
mod service;

pub use service::ControlService;
