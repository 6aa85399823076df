#[cfg(test)]
#[path = "decoder_test.rs"]
mod tests;

use std::mem;

use anyhow::bail;
use anyhow::Result;
use futures::Stream;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::domain::models::ProtocolEvent;

const FRAME_SEPARATOR: &[u8] = b"\n\n";
const DATA_PREFIX: &str = "data:";
const UNEXPECTED_END: &str = "Stream ended unexpectedly";

/// Incremental decoder for the council stream. Bytes go in as they arrive,
/// complete events come out.
///
/// Work happens on raw bytes so a chunk boundary inside a multi-byte UTF-8
/// sequence is harmless: `\r` and `\n` never occur inside one.
#[derive(Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    // Bytes of `buffer` already known not to start a separator.
    scanned: usize,
}

impl FrameDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ProtocolEvent> {
        self.buffer
            .extend(chunk.iter().filter(|byte| return **byte != b'\r'));

        let mut events = vec![];
        while let Some(idx) = find_separator(&self.buffer, self.scanned) {
            let frame = self
                .buffer
                .drain(..idx + FRAME_SEPARATOR.len())
                .collect::<Vec<u8>>();
            self.scanned = 0;

            if let Some(event) = decode_frame(&frame[..idx]) {
                events.push(event);
            }
        }

        // A separator can straddle the next chunk boundary.
        self.scanned = self
            .buffer
            .len()
            .saturating_sub(FRAME_SEPARATOR.len() - 1);

        return events;
    }

    /// Decodes whatever is left once the transport is done, treating it as
    /// one last frame.
    pub fn finish(&mut self) -> Vec<ProtocolEvent> {
        let rest = mem::take(&mut self.buffer);
        self.scanned = 0;
        return decode_frame(&rest).into_iter().collect();
    }
}

fn find_separator(buffer: &[u8], from: usize) -> Option<usize> {
    return buffer
        .get(from..)?
        .windows(FRAME_SEPARATOR.len())
        .position(|window| return window == FRAME_SEPARATOR)
        .map(|idx| return from + idx);
}

fn decode_frame(raw: &[u8]) -> Option<ProtocolEvent> {
    let text = String::from_utf8_lossy(raw);
    let data_lines = text
        .split('\n')
        .filter_map(|line| return line.strip_prefix(DATA_PREFIX))
        .map(|payload| return payload.strip_prefix(' ').unwrap_or(payload))
        .collect::<Vec<&str>>();

    // Comments and keep-alives.
    if data_lines.is_empty() {
        return None;
    }

    let payload = data_lines.join("\n");
    match serde_json::from_str::<ProtocolEvent>(&payload) {
        Ok(event) => {
            tracing::debug!(kind = event.kind.as_str(), "Decoded stream event");
            return Some(event);
        }
        Err(err) => {
            tracing::error!(error = ?err, payload = payload, "Failed to parse stream frame");
            return None;
        }
    }
}

struct Forwarder<'a> {
    tx: &'a mpsc::UnboundedSender<ProtocolEvent>,
    forwarded: usize,
    saw_terminal: bool,
}

impl<'a> Forwarder<'a> {
    fn send(&mut self, event: ProtocolEvent) -> Result<()> {
        if event.is_terminal() {
            self.saw_terminal = true;
        }
        self.forwarded += 1;
        self.tx.send(event)?;

        return Ok(());
    }

    fn send_all(&mut self, events: Vec<ProtocolEvent>) -> Result<()> {
        for event in events {
            self.send(event)?;
        }

        return Ok(());
    }
}

/// Drains a byte stream through a [`FrameDecoder`] and forwards each event.
///
/// Failures before the first event propagate. After that the stream is
/// always closed with a terminal event: a transport error or an early end of
/// stream is turned into a synthesized `error` event.
pub async fn forward_events<S, B, E>(
    stream: S,
    tx: &mpsc::UnboundedSender<ProtocolEvent>,
) -> Result<()>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
{
    futures::pin_mut!(stream);

    let mut decoder = FrameDecoder::default();
    let mut forwarder = Forwarder {
        tx,
        forwarded: 0,
        saw_terminal: false,
    };

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                forwarder.send_all(decoder.push(bytes.as_ref()))?;
            }
            Err(err) => {
                if forwarder.forwarded == 0 {
                    tracing::error!(error = ?err, "Stream failed before any event");
                    return Err(err.into());
                }

                tracing::error!(error = ?err, "Stream interrupted");
                if !forwarder.saw_terminal {
                    forwarder.send(ProtocolEvent::error(&err.to_string()))?;
                }

                return Ok(());
            }
        }
    }

    forwarder.send_all(decoder.finish())?;

    if !forwarder.saw_terminal {
        if forwarder.forwarded == 0 {
            tracing::error!("Stream ended before any event");
            bail!(UNEXPECTED_END);
        }

        tracing::warn!(
            forwarded = forwarder.forwarded,
            "Stream ended without a terminal event"
        );
        forwarder.send(ProtocolEvent::error(UNEXPECTED_END))?;
    }

    return Ok(());
}
