//! Connection state for one paired watch.
//!
//! Pure state transitions; the engine owns the session behind a mutex and
//! acts on the returned [`Transition`].

/// Transaction id the transport reports when it could not tell which message failed
const UNKNOWN_TRANSACTION: u8 = u8::MAX;

/// Connection edge produced by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSession {
    connected: bool,
    nack_count: u32,
    sending_transaction_id: u8,
    busy_sending: bool,
    updated_since_connect: bool,
    last_nacked: Option<u8>,
}

impl SyncSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn nack_count(&self) -> u32 {
        self.nack_count
    }

    pub fn is_busy(&self) -> bool {
        self.busy_sending
    }

    pub fn updated_since_connect(&self) -> bool {
        self.updated_since_connect
    }

    pub fn last_nacked(&self) -> Option<u8> {
        self.last_nacked
    }

    pub fn sending_transaction_id(&self) -> u8 {
        self.sending_transaction_id
    }

    /// Explicit connect signal. Counters restart even if already connected.
    pub fn on_connect(&mut self) -> Transition {
        let was_connected = self.connected;
        self.connected = true;
        self.nack_count = 0;
        self.sending_transaction_id = 0;
        self.updated_since_connect = false;
        if was_connected {
            Transition::Unchanged
        } else {
            Transition::Connected
        }
    }

    pub fn on_disconnect(&mut self) -> Transition {
        if !self.connected {
            return Transition::Unchanged;
        }
        self.connected = false;
        Transition::Disconnected
    }

    /// An ack also proves the watch app is running.
    pub fn on_ack(&mut self) -> Transition {
        let transition = self.connect_implicitly();
        self.nack_count = 0;
        transition
    }

    /// Inbound data connects implicitly and clears the nack streak.
    pub fn on_data(&mut self) -> Transition {
        self.on_ack()
    }

    /// Count a nack; too many in a row drops the connection.
    pub fn on_nack(&mut self, transaction_id: u8, threshold: u32) -> Transition {
        self.nack_count = self.nack_count.saturating_add(1);
        if transaction_id != UNKNOWN_TRANSACTION {
            self.last_nacked = Some(transaction_id);
        }
        if self.nack_exceeded(threshold) {
            self.on_disconnect()
        } else {
            Transition::Unchanged
        }
    }

    pub fn nack_exceeded(&self, threshold: u32) -> bool {
        self.nack_count > threshold
    }

    /// Claim the bulk-send slot. False if another bulk send holds it.
    pub fn try_begin_bulk(&mut self) -> bool {
        if self.busy_sending {
            return false;
        }
        self.busy_sending = true;
        true
    }

    pub fn end_bulk(&mut self) {
        self.busy_sending = false;
    }

    /// Id for the next outgoing message. Wraps before the reserved unknown id.
    pub fn next_transaction_id(&mut self) -> u8 {
        let id = self.sending_transaction_id;
        self.sending_transaction_id = if id >= UNKNOWN_TRANSACTION - 1 { 0 } else { id + 1 };
        id
    }

    pub fn mark_updated(&mut self) {
        self.updated_since_connect = true;
    }

    fn connect_implicitly(&mut self) -> Transition {
        if self.connected {
            Transition::Unchanged
        } else {
            self.on_connect()
        }
    }
}
