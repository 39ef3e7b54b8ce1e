use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::ops::Range;
use std::time::Duration;

use tracing::{debug, Span};

/// Candidate bases for the per-client debug ports.
pub const DEBUG_PORT_SCAN_RANGE: Range<u16> = 8600..8698;
/// Free ports a base needs in a row.
pub const DEBUG_PORT_RUN_LEN: u16 = 10;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(200);

/// A port is taken when something accepts a local connection on it.
pub fn is_port_in_use(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).is_ok()
}

/// First port in `range` that starts `DEBUG_PORT_RUN_LEN` consecutive free ports.
pub fn find_debug_port_base(
    range: Range<u16>,
    span: &Span,
    mut is_busy: impl FnMut(u16) -> bool,
) -> Option<u16> {
    let mut free_run = 0u16;
    for port in range {
        if is_busy(port) {
            free_run = 0;
            debug!(parent: span, port, "debug port base is busy");
            continue;
        }
        free_run += 1;
        if free_run >= DEBUG_PORT_RUN_LEN {
            let base = port + 1 - free_run;
            debug!(parent: span, base, "selected debug port base");
            return Some(base);
        }
    }
    None
}
