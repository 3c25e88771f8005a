//! Wire types, state-directory layout, and the error taxonomy shared
//! between the engine binary and its internal crates.

pub mod constants;
pub mod errors;
pub mod layout;

pub mod generated {
    #![allow(clippy::all, unused_qualifications)]
    tonic::include_proto!("hops.v1");
}

pub use errors::{HopsError, HopsResult};
pub use layout::StateLayout;

pub use generated::control_client::ControlClient;
pub use generated::control_server::{Control, ControlServer};
