//! One pump of socket I/O for a connection.

use tracing::{debug, warn};

use super::{Connection, ConnectionError, IoState, transport::ReadEvent};
use crate::transaction::{Frame, Response, split_frame};

impl Connection {
    /// Pump one cycle of I/O: take every completed read, flush the outbound
    /// buffer, then complete each transaction whose response frame is whole.
    ///
    /// Returns immediately when no read has completed. Frames for ids that are
    /// no longer registered are discarded.
    ///
    /// # Errors
    /// Returns [`ConnectionError::NotConnected`] without a transport. Any
    /// other error is fatal: the message is recorded for
    /// [`Connection::connection_error`] and the transport is closed before
    /// returning.
    pub async fn monitor(&self) -> Result<(), ConnectionError> {
        let mut io = self.io.lock().await;
        if io.transport.is_none() {
            return Err(ConnectionError::NotConnected);
        }
        match self.pump(&mut io).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(
                    host = %self.config.host,
                    port = self.config.port,
                    error = %err,
                    "closing processor connection"
                );
                self.record_error(&err);
                self.close(&mut io).await;
                Err(err)
            }
        }
    }

    async fn pump(&self, io: &mut IoState) -> Result<(), ConnectionError> {
        let IoState {
            transport: slot,
            inbound,
            outbound,
        } = io;
        let Some(transport) = slot.as_mut() else {
            return Err(ConnectionError::NotConnected);
        };

        let mut terminal = None;
        while let Some(event) = transport.try_next_event() {
            match event {
                ReadEvent::Data(bytes) => inbound.extend_from_slice(&bytes),
                ReadEvent::Closed => {
                    terminal = Some(ConnectionError::RemoteDisconnect);
                    break;
                }
                ReadEvent::Failed(err) => {
                    terminal = Some(ConnectionError::Read(err));
                    break;
                }
            }
        }

        if terminal.is_none() && !outbound.is_empty() {
            transport.write_all(outbound).await?;
            outbound.clear();
        }

        // Frames that arrived ahead of a disconnect still complete.
        while let Some(frame) = split_frame(inbound)? {
            self.dispatch(frame);
        }

        terminal.map_or(Ok(()), Err)
    }

    fn dispatch(&self, frame: Frame) {
        let Frame { id, body } = frame;
        if !self.registry.contains(id) {
            debug!(transaction_id = %id, "discarding response for unknown transaction");
            return;
        }
        let response = Response::parse(body);
        if self.registry.update(id, |tx| tx.complete(response)).is_none() {
            debug!(transaction_id = %id, "transaction deleted before its response was stored");
        }
    }
}
