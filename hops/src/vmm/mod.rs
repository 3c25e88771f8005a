//! VM manager: turns a [`types::GuestContainerConfiguration`] into a
//! running guest, via a subprocess-isolated libkrun context.

pub mod controller;
pub mod guest_protocol;
pub mod io;
pub mod types;

pub use controller::{VmmController, VmmHandler, VmmMetrics};
pub use io::{OutputSink, StdinSource};
pub use types::{GuestContainerConfiguration, GuestMount, GuestMountType, NatInterface, VmBootSpec};
