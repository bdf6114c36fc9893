//! RTP packet pump between an inbound and an outbound track

use crate::peer::{LocalTrack, RemoteTrack};
use crate::Error;
use std::future::Future;
use std::sync::Arc;

/// Why a forwarding loop stopped
#[derive(Debug)]
pub enum ForwardEnd {
    /// Reading the inbound track failed; normally the sender went away
    SourceClosed(Error),

    /// Writing the outbound track failed
    SinkFailed(Error),

    /// One of the sessions involved was torn down
    Cancelled,
}

/// Counters reported when a forwarding loop exits
#[derive(Debug)]
pub struct ForwardStats {
    pub packets: u64,
    pub bytes: u64,
    pub end: ForwardEnd,
}

/// Copy packets from `source` to `sink` until either side fails or `stop`
/// resolves
///
/// Each read fills at most `buffer_size` bytes and the packet is written
/// exactly as read. Empty reads are skipped.
pub async fn forward_packets<S>(
    source: Arc<dyn RemoteTrack>,
    sink: Arc<dyn LocalTrack>,
    buffer_size: usize,
    stop: S,
) -> ForwardStats
where
    S: Future<Output = ()>,
{
    tokio::pin!(stop);

    let mut buf = vec![0u8; buffer_size];
    let mut packets = 0u64;
    let mut bytes = 0u64;

    let end = loop {
        let read = tokio::select! {
            biased;
            _ = &mut stop => break ForwardEnd::Cancelled,
            read = source.read(&mut buf) => read,
        };

        let n = match read {
            Ok(0) => continue,
            Ok(n) => n,
            Err(e) => break ForwardEnd::SourceClosed(e),
        };

        let written = tokio::select! {
            biased;
            _ = &mut stop => break ForwardEnd::Cancelled,
            written = sink.write(&buf[..n]) => written,
        };

        if let Err(e) = written {
            break ForwardEnd::SinkFailed(e);
        }

        packets += 1;
        bytes += n as u64;
    };

    ForwardStats { packets, bytes, end }
}
