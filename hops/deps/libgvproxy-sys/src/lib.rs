//! Low-level FFI bindings to libgvproxy, the CGO-built shared library that
//! backs the engine's NAT network mode.
//!
//! gvproxy is configured once per guest network endpoint: it listens on a
//! host-side unix datagram socket carrying virtio-net frames and performs
//! NAT/DHCP on behalf of the single guest interface described in
//! `NetworkBackendConfig`.

use std::os::raw::c_char;

unsafe extern "C" {
    /// Starts a gvproxy instance listening on `endpoint_path` (a unix
    /// socket) and NATing traffic for the guest at `guest_cidr`
    /// (e.g. "192.168.65.5/24") through `gateway_ip`. `port_map_json` is a
    /// JSON array of `{host_port, guest_port}` pairs, or "[]".
    ///
    /// Returns an opaque non-zero handle on success, 0 on failure.
    pub fn gvproxy_start(
        endpoint_path: *const c_char,
        guest_cidr: *const c_char,
        gateway_ip: *const c_char,
        port_map_json: *const c_char,
    ) -> u64;

    /// Stops a previously started gvproxy instance. Returns 0 on success.
    pub fn gvproxy_stop(handle: u64) -> i32;
}
