//! Blocking forwarding proxies.
//!
//! A proxy moves messages from a receiving socket to one or more sending
//! sockets until the source fails. The pub/sub plane runs these on dedicated
//! threads: one from the process ingress to the in-process publish endpoint,
//! and on relay peers a second fanning pulled messages back out.

use tracing::debug;

use crate::error::{Result, SocketError};
use crate::socket::Socket;

/// Forward every message from `from` to `to`.
///
/// Runs until receiving fails (source closed or transport gone). Send
/// failures other than a closed destination are logged and skipped; publish
/// is lossy by contract.
///
/// # Errors
///
/// Returns the receive error that ended the loop, or `Closed` if the
/// destination went away.
pub fn proxy(from: &Socket, to: &Socket) -> Result<()> {
    proxy_fanout(from, &[to])
}

/// Forward every message from `from` to each socket in `outs`.
///
/// # Errors
///
/// Returns the receive error that ended the loop, or `Closed` once every
/// destination is gone.
pub fn proxy_fanout(from: &Socket, outs: &[&Socket]) -> Result<()> {
    loop {
        let frames = from.recv_blocking()?;
        let mut live = 0;
        for out in outs {
            match out.send(frames.clone()) {
                Ok(()) => live += 1,
                Err(SocketError::Closed) => {}
                Err(e) => {
                    debug!(error = %e, "proxy send failed, dropping message");
                    live += 1;
                }
            }
        }
        if live == 0 {
            return Err(SocketError::Closed);
        }
    }
}
