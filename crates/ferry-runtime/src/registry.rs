//! Device and session registry.
//!
//! The registry is owned by the dispatch task and mutated only there. Every
//! method translates one caller request or one adapter outcome into state
//! changes plus the [`TransportEvent`]s observers must see, pushed onto an
//! outbox in emission order.
//!
//! # State machines
//!
//! ```text
//! Device:  Discovered ─▶ Connecting ─▶ Connected ─▶ Disconnecting ─▶ (removed)
//! Session: Pending ─▶ Established ─▶ Closing ─▶ Closed (removed)
//! ```
//!
//! Device state is derived from its sessions, except for `Disconnecting`
//! which marks an in-flight device disconnect.

use std::collections::{HashMap, HashSet};
use std::fmt;

use ferry_core::{
    AdapterId, ApplicationHandle, CloseReason, CommunicationError, ConnectError, DataReceiveError,
    DataSendError, DeviceHandle, DeviceInfo, DeviceSnapshot, DeviceState, DeviceUid,
    DisconnectDeviceError, DisconnectError, LocalCause, PayloadValidator, RawMessage,
    SessionSnapshot, SessionState, TransportEvent,
};
use tracing::{debug, info, trace, warn};

type SessionKey = (DeviceHandle, ApplicationHandle);

/// Events produced by one registry step, in emission order.
pub(crate) type Outbox = Vec<TransportEvent>;

// ============================================================================
// Entries
// ============================================================================

#[derive(Debug)]
struct SessionEntry {
    app: ApplicationHandle,
    state: SessionState,
    /// Sends handed to the adapter and not yet resolved.
    in_flight: usize,
    /// A caller disconnect was issued and has not resolved.
    disconnect_in_flight: bool,
    /// Close to emit once `in_flight` drops to zero.
    close_after_sends: Option<CloseReason>,
}

impl SessionEntry {
    fn pending(app: ApplicationHandle) -> Self {
        Self {
            app,
            state: SessionState::Pending,
            in_flight: 0,
            disconnect_in_flight: false,
            close_after_sends: None,
        }
    }
}

#[derive(Debug)]
struct DeviceEntry {
    name: String,
    disconnecting: bool,
    /// Live sessions in registration order.
    sessions: Vec<SessionEntry>,
}

impl DeviceEntry {
    fn new(name: String) -> Self {
        Self {
            name,
            disconnecting: false,
            sessions: Vec::new(),
        }
    }

    fn state(&self) -> DeviceState {
        if self.disconnecting {
            DeviceState::Disconnecting
        } else if self
            .sessions
            .iter()
            .any(|s| matches!(s.state, SessionState::Established | SessionState::Closing))
        {
            DeviceState::Connected
        } else if !self.sessions.is_empty() {
            DeviceState::Connecting
        } else {
            DeviceState::Discovered
        }
    }

    fn session(&self, app: ApplicationHandle) -> Option<&SessionEntry> {
        self.sessions.iter().find(|s| s.app == app)
    }

    fn session_mut(&mut self, app: ApplicationHandle) -> Option<&mut SessionEntry> {
        self.sessions.iter_mut().find(|s| s.app == app)
    }

    fn take_session(&mut self, app: ApplicationHandle) -> Option<SessionEntry> {
        let idx = self.sessions.iter().position(|s| s.app == app)?;
        Some(self.sessions.remove(idx))
    }
}

// ============================================================================
// Registry
// ============================================================================

/// The authoritative device/session registry.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    devices: HashMap<DeviceHandle, DeviceEntry>,
    /// Discovery order, for deterministic snapshots.
    order: Vec<DeviceHandle>,
    /// Sessions closed by an unexpected disconnect while a caller disconnect
    /// was in flight; that disconnect's outcome is swallowed.
    superseded: HashSet<SessionKey>,
    /// Unresolved sends of sessions that are already gone.
    orphaned_sends: HashMap<SessionKey, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn contains(&self, device: &DeviceHandle) -> bool {
        self.devices.contains_key(device)
    }

    pub fn device_state(&self, device: &DeviceHandle) -> Option<DeviceState> {
        self.devices.get(device).map(DeviceEntry::state)
    }

    pub fn session_state(
        &self,
        device: &DeviceHandle,
        app: ApplicationHandle,
    ) -> Option<SessionState> {
        self.devices.get(device)?.session(app).map(|s| s.state)
    }

    pub fn devices(&self) -> Vec<DeviceSnapshot> {
        self.order
            .iter()
            .filter_map(|handle| {
                let entry = self.devices.get(handle)?;
                Some(DeviceSnapshot {
                    handle: handle.clone(),
                    name: entry.name.clone(),
                    state: entry.state(),
                    apps: entry.sessions.iter().map(|s| s.app).collect(),
                })
            })
            .collect()
    }

    pub fn sessions(&self) -> Vec<SessionSnapshot> {
        self.order
            .iter()
            .filter_map(|handle| Some((handle, self.devices.get(handle)?)))
            .flat_map(|(handle, entry)| {
                entry.sessions.iter().map(move |s| SessionSnapshot {
                    device: handle.clone(),
                    app: s.app,
                    state: s.state,
                    in_flight: s.in_flight,
                })
            })
            .collect()
    }

    pub fn stats(&self, adapters: usize) -> RegistryStats {
        let mut stats = RegistryStats {
            adapters,
            devices: self.devices.len(),
            ..Default::default()
        };
        for entry in self.devices.values() {
            if entry.state() == DeviceState::Connected {
                stats.connected_devices += 1;
            }
            for session in &entry.sessions {
                match session.state {
                    SessionState::Pending => stats.pending_sessions += 1,
                    SessionState::Established => stats.established_sessions += 1,
                    SessionState::Closing | SessionState::Closed => stats.closing_sessions += 1,
                }
                stats.in_flight_sends += session.in_flight;
            }
        }
        stats
    }

    // ------------------------------------------------------------------------
    // Caller requests
    //
    // Each returns `Ok` when the request must be forwarded to the adapter,
    // having already applied the optimistic state change.
    // ------------------------------------------------------------------------

    pub fn begin_connect(
        &mut self,
        device: &DeviceHandle,
        app: ApplicationHandle,
    ) -> Result<(), ConnectError> {
        let entry = self
            .devices
            .get_mut(device)
            .ok_or(ConnectError::local(LocalCause::UnknownDevice))?;
        if entry.disconnecting {
            return Err(ConnectError::local(LocalCause::InvalidState));
        }
        if entry.session(app).is_some() {
            return Err(ConnectError::local(LocalCause::SessionExists));
        }
        entry.sessions.push(SessionEntry::pending(app));
        self.superseded.remove(&(device.clone(), app));
        debug!(device = %device, app = %app, "Session pending");
        Ok(())
    }

    pub fn begin_disconnect(
        &mut self,
        device: &DeviceHandle,
        app: ApplicationHandle,
    ) -> Result<(), DisconnectError> {
        let session = self
            .devices
            .get_mut(device)
            .ok_or(DisconnectError::local(LocalCause::UnknownDevice))?
            .session_mut(app)
            .ok_or(DisconnectError::local(LocalCause::UnknownSession))?;
        if session.state != SessionState::Established {
            return Err(DisconnectError::local(LocalCause::InvalidState));
        }
        session.state = SessionState::Closing;
        session.disconnect_in_flight = true;
        debug!(device = %device, app = %app, "Session closing");
        Ok(())
    }

    pub fn begin_disconnect_device(
        &mut self,
        device: &DeviceHandle,
    ) -> Result<(), DisconnectDeviceError> {
        let entry = self
            .devices
            .get_mut(device)
            .ok_or(DisconnectDeviceError::local(LocalCause::UnknownDevice))?;
        if entry.disconnecting {
            return Err(DisconnectDeviceError::local(LocalCause::InvalidState));
        }
        entry.disconnecting = true;
        debug!(device = %device, "Device disconnecting");
        Ok(())
    }

    pub fn begin_send(
        &mut self,
        device: &DeviceHandle,
        app: ApplicationHandle,
    ) -> Result<(), DataSendError> {
        let session = self
            .devices
            .get_mut(device)
            .ok_or(DataSendError::local(LocalCause::UnknownDevice))?
            .session_mut(app)
            .ok_or(DataSendError::local(LocalCause::UnknownSession))?;
        if !session.state.accepts_data() {
            return Err(DataSendError::local(LocalCause::InvalidState));
        }
        session.in_flight += 1;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Adapter outcomes
    // ------------------------------------------------------------------------

    /// Applies a search result: announces new devices and drops devices of
    /// this adapter that are no longer listed and have no sessions.
    pub fn search_done(&mut self, adapter: &AdapterId, devices: Vec<DeviceInfo>, out: &mut Outbox) {
        let listed: HashSet<DeviceUid> = devices.iter().map(|d| d.uid.clone()).collect();
        for info in devices {
            self.discover(DeviceHandle::new(adapter.clone(), info.uid), info.name, out);
        }

        let stale: Vec<DeviceHandle> = self
            .order
            .iter()
            .filter(|h| &h.adapter == adapter && !listed.contains(&h.uid))
            .filter(|h| {
                self.devices
                    .get(*h)
                    .is_some_and(|d| d.sessions.is_empty() && !d.disconnecting)
            })
            .cloned()
            .collect();
        for handle in stale {
            self.remove_device(&handle, out);
        }
    }

    pub fn connect_done(
        &mut self,
        device: &DeviceHandle,
        app: ApplicationHandle,
        out: &mut Outbox,
    ) {
        match self.session_mut(device, app) {
            Some(session) if session.state == SessionState::Pending => {
                session.state = SessionState::Established;
                info!(device = %device, app = %app, "Session established");
                out.push(TransportEvent::SessionEstablished {
                    device: device.clone(),
                    app,
                });
            }
            _ => warn!(device = %device, app = %app, "Ignoring unsolicited connect done"),
        }
    }

    pub fn connect_failed(
        &mut self,
        device: &DeviceHandle,
        app: ApplicationHandle,
        error: ConnectError,
        out: &mut Outbox,
    ) {
        let is_pending = self
            .session_mut(device, app)
            .is_some_and(|s| s.state == SessionState::Pending);
        if !is_pending {
            warn!(device = %device, app = %app, "Ignoring unsolicited connect failed");
            return;
        }
        if let Some(entry) = self.devices.get_mut(device) {
            entry.take_session(app);
        }
        debug!(device = %device, app = %app, error = %error, "Connect failed");
        out.push(TransportEvent::ConnectFailed {
            device: device.clone(),
            app,
            error,
        });
    }

    /// Registers an adapter-initiated session. First writer wins: an existing
    /// session for the pair makes this a no-op.
    pub fn connect_requested(
        &mut self,
        device: &DeviceHandle,
        app: ApplicationHandle,
        out: &mut Outbox,
    ) {
        if !self.devices.contains_key(device) {
            self.discover(device.clone(), device.uid.to_string(), out);
        }
        let Some(entry) = self.devices.get_mut(device) else {
            return;
        };
        if entry.disconnecting || entry.session(app).is_some() {
            warn!(device = %device, app = %app, "Ignoring connect request for busy session");
            return;
        }
        entry.sessions.push(SessionEntry::pending(app));
        self.superseded.remove(&(device.clone(), app));
        info!(device = %device, app = %app, "Connection requested by device");
        out.push(TransportEvent::ConnectRequested {
            device: device.clone(),
            app,
        });
    }

    pub fn disconnect_done(
        &mut self,
        device: &DeviceHandle,
        app: ApplicationHandle,
        out: &mut Outbox,
    ) {
        if self.superseded.remove(&(device.clone(), app)) {
            debug!(device = %device, app = %app, "Disconnect already completed by session loss");
            return;
        }
        let Some(session) = self
            .session_mut(device, app)
            .filter(|s| s.disconnect_in_flight)
        else {
            warn!(device = %device, app = %app, "Ignoring unsolicited disconnect done");
            return;
        };
        session.disconnect_in_flight = false;
        if session.in_flight > 0 {
            debug!(
                device = %device,
                app = %app,
                in_flight = session.in_flight,
                "Deferring close until in-flight sends resolve"
            );
            session.close_after_sends = Some(CloseReason::Requested);
            return;
        }
        self.close_session(device, app, CloseReason::Requested, out);
    }

    pub fn disconnect_failed(
        &mut self,
        device: &DeviceHandle,
        app: ApplicationHandle,
        error: DisconnectError,
        out: &mut Outbox,
    ) {
        if self.superseded.remove(&(device.clone(), app)) {
            debug!(device = %device, app = %app, "Dropping disconnect failure of a lost session");
            return;
        }
        let Some(session) = self
            .session_mut(device, app)
            .filter(|s| s.disconnect_in_flight)
        else {
            warn!(device = %device, app = %app, "Ignoring unsolicited disconnect failed");
            return;
        };
        session.disconnect_in_flight = false;
        session.state = SessionState::Established;
        out.push(TransportEvent::DisconnectFailed {
            device: device.clone(),
            app,
            error,
        });
    }

    /// Handles loss of a session. The adapter's report is authoritative:
    /// a caller disconnect still in flight is considered done.
    pub fn unexpected_disconnect(
        &mut self,
        device: &DeviceHandle,
        app: ApplicationHandle,
        error: CommunicationError,
        out: &mut Outbox,
    ) {
        let Some(session) = self.session_mut(device, app) else {
            debug!(device = %device, app = %app, "Session already closed, ignoring loss report");
            return;
        };

        if session.state == SessionState::Pending {
            if let Some(entry) = self.devices.get_mut(device) {
                entry.take_session(app);
            }
            out.push(TransportEvent::ConnectFailed {
                device: device.clone(),
                app,
                error: ConnectError::new(error.description()),
            });
            return;
        }

        if session.disconnect_in_flight {
            self.superseded.insert((device.clone(), app));
        }
        warn!(device = %device, app = %app, error = %error, "Session lost");
        out.push(TransportEvent::CommunicationError {
            device: device.clone(),
            app,
            error: error.clone(),
        });
        self.close_session(device, app, CloseReason::Unexpected(error), out);
    }

    /// Removes the device after closing each of its sessions, in
    /// registration order. Accepted whether or not a caller requested it.
    pub fn disconnect_device_done(&mut self, device: &DeviceHandle, out: &mut Outbox) {
        if !self.devices.contains_key(device) {
            warn!(device = %device, "Ignoring disconnect done for unknown device");
            return;
        }
        self.remove_device(device, out);
    }

    pub fn disconnect_device_failed(
        &mut self,
        device: &DeviceHandle,
        error: DisconnectDeviceError,
        out: &mut Outbox,
    ) {
        match self.devices.get_mut(device) {
            Some(entry) if entry.disconnecting => {
                entry.disconnecting = false;
                debug!(device = %device, state = %entry.state(), "Device disconnect failed");
                out.push(TransportEvent::DisconnectDeviceFailed {
                    device: device.clone(),
                    error,
                });
            }
            _ => warn!(device = %device, "Ignoring unsolicited device disconnect failure"),
        }
    }

    pub fn send_done(
        &mut self,
        device: &DeviceHandle,
        app: ApplicationHandle,
        message: RawMessage,
        out: &mut Outbox,
    ) {
        if self.resolve_send(device, app) {
            trace!(device = %device, app = %app, len = message.len(), "Data sent");
            out.push(TransportEvent::DataSent {
                device: device.clone(),
                app,
                message,
            });
            self.finish_deferred_close(device, app, out);
        } else {
            warn!(device = %device, app = %app, "Ignoring send done with no send in flight");
        }
    }

    pub fn send_failed(
        &mut self,
        device: &DeviceHandle,
        app: ApplicationHandle,
        message: RawMessage,
        error: DataSendError,
        out: &mut Outbox,
    ) {
        if self.resolve_send(device, app) {
            debug!(device = %device, app = %app, error = %error, "Send failed");
            out.push(TransportEvent::SendFailed {
                device: device.clone(),
                app,
                message,
                error,
            });
            self.finish_deferred_close(device, app, out);
        } else {
            warn!(device = %device, app = %app, "Ignoring send failed with no send in flight");
        }
    }

    /// Delivers inbound data, or reports it as a receive failure with the
    /// raw bytes attached when there is no live session or the payload is
    /// rejected.
    pub fn receive_done(
        &mut self,
        device: &DeviceHandle,
        app: ApplicationHandle,
        message: RawMessage,
        validator: Option<&dyn PayloadValidator>,
        out: &mut Outbox,
    ) {
        let live = match self.devices.get(device) {
            None => Err(LocalCause::UnknownDevice),
            Some(entry) => match entry.session(app).map(|s| s.state) {
                Some(SessionState::Established | SessionState::Closing) => Ok(()),
                _ => Err(LocalCause::UnknownSession),
            },
        };

        let verdict = live
            .map_err(DataReceiveError::local)
            .and_then(|()| validator.map_or(Ok(()), |v| v.validate(&message)));

        match verdict {
            Ok(()) => {
                trace!(device = %device, app = %app, len = message.len(), "Data received");
                out.push(TransportEvent::DataReceived {
                    device: device.clone(),
                    app,
                    message,
                });
            }
            Err(error) => {
                debug!(device = %device, app = %app, error = %error, "Receive rejected");
                out.push(TransportEvent::ReceiveFailed {
                    device: device.clone(),
                    app,
                    error,
                    raw: Some(message),
                });
            }
        }
    }

    pub fn receive_failed(
        &mut self,
        device: &DeviceHandle,
        app: ApplicationHandle,
        error: DataReceiveError,
        out: &mut Outbox,
    ) {
        out.push(TransportEvent::ReceiveFailed {
            device: device.clone(),
            app,
            error,
            raw: None,
        });
    }

    /// Drops every device of an adapter that went away.
    pub fn remove_adapter(&mut self, adapter: &AdapterId, out: &mut Outbox) {
        let owned: Vec<DeviceHandle> = self
            .order
            .iter()
            .filter(|h| &h.adapter == adapter)
            .cloned()
            .collect();
        for handle in owned {
            self.remove_device(&handle, out);
        }
        self.orphaned_sends.retain(|(d, _), _| &d.adapter != adapter);
    }

    /// Surfaces a runtime fault. Session state is unchanged.
    pub fn communication_error(
        &mut self,
        device: &DeviceHandle,
        app: ApplicationHandle,
        out: &mut Outbox,
    ) {
        if !self.devices.contains_key(device) {
            warn!(device = %device, app = %app, "Ignoring communication error for unknown device");
            return;
        }
        out.push(TransportEvent::CommunicationError {
            device: device.clone(),
            app,
            error: CommunicationError::new("adapter reported a communication fault"),
        });
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn session_mut(
        &mut self,
        device: &DeviceHandle,
        app: ApplicationHandle,
    ) -> Option<&mut SessionEntry> {
        self.devices.get_mut(device)?.session_mut(app)
    }

    fn discover(&mut self, handle: DeviceHandle, name: String, out: &mut Outbox) {
        if self.devices.contains_key(&handle) {
            return;
        }
        info!(device = %handle, name = %name, "Device discovered");
        self.devices.insert(handle.clone(), DeviceEntry::new(name.clone()));
        self.order.push(handle.clone());
        out.push(TransportEvent::DeviceDiscovered {
            device: handle,
            name,
        });
    }

    fn remove_device(&mut self, handle: &DeviceHandle, out: &mut Outbox) {
        let Some(entry) = self.devices.remove(handle) else {
            return;
        };
        self.order.retain(|h| h != handle);
        self.superseded.retain(|(d, _)| d != handle);

        for session in entry.sessions {
            if session.state == SessionState::Pending {
                info!(device = %handle, app = %session.app, "Pending connect dropped with device");
                out.push(TransportEvent::ConnectFailed {
                    device: handle.clone(),
                    app: session.app,
                    error: ConnectError::new("device removed before the session was established"),
                });
                continue;
            }
            Self::orphan_sends(&mut self.orphaned_sends, handle, &session);
            info!(device = %handle, app = %session.app, "Session closed with device");
            out.push(TransportEvent::SessionClosed {
                device: handle.clone(),
                app: session.app,
                reason: CloseReason::DeviceRemoved,
            });
        }
        info!(device = %handle, "Device lost");
        out.push(TransportEvent::DeviceLost {
            device: handle.clone(),
        });
    }

    fn close_session(
        &mut self,
        device: &DeviceHandle,
        app: ApplicationHandle,
        reason: CloseReason,
        out: &mut Outbox,
    ) {
        let Some(session) = self.devices.get_mut(device).and_then(|e| e.take_session(app)) else {
            return;
        };
        Self::orphan_sends(&mut self.orphaned_sends, device, &session);
        info!(device = %device, app = %app, reason = %reason, "Session closed");
        out.push(TransportEvent::SessionClosed {
            device: device.clone(),
            app,
            reason,
        });
    }

    fn orphan_sends(
        orphans: &mut HashMap<SessionKey, usize>,
        device: &DeviceHandle,
        session: &SessionEntry,
    ) {
        if session.in_flight > 0 {
            *orphans.entry((device.clone(), session.app)).or_default() += session.in_flight;
        }
    }

    /// Accounts for one resolved send. Returns false if none was in flight.
    /// Accounts for one send outcome. Sends of a closed session resolve
    /// before those of a newer session on the same key, so orphans are
    /// consumed first.
    fn resolve_send(&mut self, device: &DeviceHandle, app: ApplicationHandle) -> bool {
        let key = (device.clone(), app);
        if let Some(count) = self.orphaned_sends.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                self.orphaned_sends.remove(&key);
            }
            return true;
        }
        match self.session_mut(device, app) {
            Some(session) if session.in_flight > 0 => {
                session.in_flight -= 1;
                true
            }
            _ => false,
        }
    }

    fn finish_deferred_close(
        &mut self,
        device: &DeviceHandle,
        app: ApplicationHandle,
        out: &mut Outbox,
    ) {
        let reason = match self.session_mut(device, app) {
            Some(session) if session.in_flight == 0 => session.close_after_sends.take(),
            _ => None,
        };
        if let Some(reason) = reason {
            self.close_session(device, app, reason, out);
        }
    }
}

// ============================================================================
// Stats
// ============================================================================

/// Counters describing the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub adapters: usize,
    pub devices: usize,
    pub connected_devices: usize,
    pub pending_sessions: usize,
    pub established_sessions: usize,
    pub closing_sessions: usize,
    pub in_flight_sends: usize,
}

impl RegistryStats {
    /// Total number of live sessions.
    pub fn sessions(&self) -> usize {
        self.pending_sessions + self.established_sessions + self.closing_sessions
    }
}

impl fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            concat!(
                "Devices: {} total ({} connected), ",
                "Sessions: {} ({} established, {} pending, {} closing), ",
                "{} sends in flight, {} adapters",
            ),
            self.devices,
            self.connected_devices,
            self.sessions(),
            self.established_sessions,
            self.pending_sessions,
            self.closing_sessions,
            self.in_flight_sends,
            self.adapters
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(uid: &str) -> DeviceHandle {
        DeviceHandle::new("a", uid)
    }

    fn app(n: u32) -> ApplicationHandle {
        ApplicationHandle::new(n)
    }

    fn msg(uid: &str, n: u32, data: &[u8]) -> RawMessage {
        RawMessage::new(uid, app(n), data.to_vec())
    }

    fn registry_with(uids: &[&str]) -> Registry {
        let mut registry = Registry::new();
        let mut out = Outbox::new();
        let devices = uids.iter().map(|u| DeviceInfo::new(*u, *u)).collect();
        registry.search_done(&AdapterId::new("a"), devices, &mut out);
        registry
    }

    fn established(registry: &mut Registry, uid: &str, n: u32) {
        let mut out = Outbox::new();
        registry.begin_connect(&handle(uid), app(n)).unwrap();
        registry.connect_done(&handle(uid), app(n), &mut out);
        assert_eq!(out.len(), 1);
    }

    fn names(out: &Outbox) -> Vec<&'static str> {
        out.iter().map(TransportEvent::name).collect()
    }

    #[test]
    fn test_search_discovers_and_prunes() {
        let mut registry = Registry::new();
        let mut out = Outbox::new();
        let id = AdapterId::new("a");
        let found = vec![DeviceInfo::new("d1", "One"), DeviceInfo::new("d2", "Two")];
        registry.search_done(&id, found, &mut out);
        assert_eq!(names(&out), ["device-discovered", "device-discovered"]);

        established(&mut registry, "d1", 1);
        out.clear();
        registry.search_done(&id, vec![], &mut out);
        // d1 has a session and stays; d2 is pruned.
        assert_eq!(names(&out), ["device-lost"]);
        assert!(registry.contains(&handle("d1")));
        assert!(!registry.contains(&handle("d2")));
    }

    #[test]
    fn test_requests_on_unknown_device() {
        let mut registry = Registry::new();
        let d = handle("missing");
        assert_eq!(
            registry.begin_connect(&d, app(1)).unwrap_err().local_cause(),
            Some(LocalCause::UnknownDevice)
        );
        assert_eq!(
            registry.begin_disconnect(&d, app(1)).unwrap_err().local_cause(),
            Some(LocalCause::UnknownDevice)
        );
        assert_eq!(
            registry.begin_send(&d, app(1)).unwrap_err().local_cause(),
            Some(LocalCause::UnknownDevice)
        );
        assert_eq!(
            registry.begin_disconnect_device(&d).unwrap_err().local_cause(),
            Some(LocalCause::UnknownDevice)
        );
    }

    #[test]
    fn test_device_state_follows_sessions() {
        let mut registry = registry_with(&["d1"]);
        let d = handle("d1");
        assert_eq!(registry.device_state(&d), Some(DeviceState::Discovered));

        registry.begin_connect(&d, app(1)).unwrap();
        assert_eq!(registry.device_state(&d), Some(DeviceState::Connecting));
        assert_eq!(registry.session_state(&d, app(1)), Some(SessionState::Pending));

        let mut out = Outbox::new();
        registry.connect_done(&d, app(1), &mut out);
        assert_eq!(registry.device_state(&d), Some(DeviceState::Connected));
    }

    #[test]
    fn test_send_requires_established_session() {
        let mut registry = registry_with(&["d1"]);
        let d = handle("d1");
        assert_eq!(
            registry.begin_send(&d, app(1)).unwrap_err().local_cause(),
            Some(LocalCause::UnknownSession)
        );

        registry.begin_connect(&d, app(1)).unwrap();
        assert_eq!(
            registry.begin_send(&d, app(1)).unwrap_err().local_cause(),
            Some(LocalCause::InvalidState)
        );
    }

    #[test]
    fn test_duplicate_connect_is_local_failure() {
        let mut registry = registry_with(&["d1"]);
        registry.begin_connect(&handle("d1"), app(1)).unwrap();
        assert_eq!(
            registry.begin_connect(&handle("d1"), app(1)).unwrap_err().local_cause(),
            Some(LocalCause::SessionExists)
        );
    }

    #[test]
    fn test_connect_requested_first_writer_wins() {
        let mut registry = registry_with(&["d1"]);
        let d = handle("d1");
        let mut out = Outbox::new();

        registry.connect_requested(&d, app(1), &mut out);
        assert_eq!(names(&out), ["connect-requested"]);
        assert_eq!(
            registry.begin_connect(&d, app(1)).unwrap_err().local_cause(),
            Some(LocalCause::SessionExists)
        );

        registry.begin_connect(&d, app(2)).unwrap();
        out.clear();
        registry.connect_requested(&d, app(2), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_connect_requested_from_undiscovered_device() {
        let mut registry = Registry::new();
        let mut out = Outbox::new();
        registry.connect_requested(&handle("d9"), app(1), &mut out);
        assert_eq!(names(&out), ["device-discovered", "connect-requested"]);
    }

    #[test]
    fn test_unsolicited_outcomes_ignored() {
        let mut registry = registry_with(&["d1"]);
        let d = handle("d1");
        let mut out = Outbox::new();
        registry.connect_done(&d, app(1), &mut out);
        registry.disconnect_done(&d, app(1), &mut out);
        registry.send_done(&d, app(1), msg("d1", 1, &[1]), &mut out);
        registry.disconnect_device_failed(&d, DisconnectDeviceError::new("x"), &mut out);
        assert!(out.is_empty());

        established(&mut registry, "d1", 1);
        registry.connect_done(&d, app(1), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_deferred_close_waits_for_sends() {
        let mut registry = registry_with(&["d1"]);
        let d = handle("d1");
        established(&mut registry, "d1", 1);
        registry.begin_send(&d, app(1)).unwrap();
        registry.begin_disconnect(&d, app(1)).unwrap();

        let mut out = Outbox::new();
        registry.disconnect_done(&d, app(1), &mut out);
        assert!(out.is_empty());
        assert_eq!(registry.session_state(&d, app(1)), Some(SessionState::Closing));

        registry.send_done(&d, app(1), msg("d1", 1, &[7]), &mut out);
        assert_eq!(names(&out), ["data-sent", "session-closed"]);
        assert_eq!(registry.session_state(&d, app(1)), None);
    }

    #[test]
    fn test_unexpected_disconnect_supersedes_explicit() {
        let mut registry = registry_with(&["d1"]);
        let d = handle("d1");
        established(&mut registry, "d1", 1);
        registry.begin_disconnect(&d, app(1)).unwrap();

        let mut out = Outbox::new();
        registry.unexpected_disconnect(&d, app(1), CommunicationError::new("link lost"), &mut out);
        assert_eq!(names(&out), ["communication-error", "session-closed"]);
        assert!(matches!(
            &out[1],
            TransportEvent::SessionClosed { reason: CloseReason::Unexpected(_), .. }
        ));

        out.clear();
        registry.disconnect_done(&d, app(1), &mut out);
        registry.unexpected_disconnect(&d, app(1), CommunicationError::new("again"), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_unexpected_disconnect_on_pending_fails_connect() {
        let mut registry = registry_with(&["d1"]);
        let d = handle("d1");
        registry.begin_connect(&d, app(1)).unwrap();
        let mut out = Outbox::new();
        registry.unexpected_disconnect(&d, app(1), CommunicationError::new("refused"), &mut out);
        assert_eq!(names(&out), ["connect-failed"]);
        assert_eq!(registry.session_state(&d, app(1)), None);
    }

    #[test]
    fn test_device_removal_order() {
        let mut registry = registry_with(&["d1"]);
        let d = handle("d1");
        for n in [3, 1, 2] {
            established(&mut registry, "d1", n);
        }
        registry.begin_disconnect_device(&d).unwrap();
        assert_eq!(registry.device_state(&d), Some(DeviceState::Disconnecting));

        let mut out = Outbox::new();
        registry.disconnect_device_done(&d, &mut out);
        let apps: Vec<_> = out.iter().filter_map(TransportEvent::app).collect();
        assert_eq!(apps, [app(3), app(1), app(2)]);
        assert_eq!(names(&out).last(), Some(&"device-lost"));
        assert!(!registry.contains(&d));
    }

    #[test]
    fn test_remove_adapter_drops_its_devices() {
        let mut registry = registry_with(&["d1", "d2"]);
        let mut out = Outbox::new();
        registry.search_done(&AdapterId::new("b"), vec![DeviceInfo::new("d1", "Other")], &mut out);
        established(&mut registry, "d1", 1);

        out.clear();
        registry.remove_adapter(&AdapterId::new("a"), &mut out);
        assert_eq!(names(&out), ["session-closed", "device-lost", "device-lost"]);
        assert_eq!(registry.devices().len(), 1);
        assert!(registry.contains(&DeviceHandle::new("b", "d1")));
    }

    #[test]
    fn test_disconnect_device_failure_restores_state() {
        let mut registry = registry_with(&["d1"]);
        let d = handle("d1");
        established(&mut registry, "d1", 1);
        registry.begin_disconnect_device(&d).unwrap();

        let mut out = Outbox::new();
        registry.disconnect_device_failed(&d, DisconnectDeviceError::new("busy"), &mut out);
        assert_eq!(names(&out), ["disconnect-device-failed"]);
        assert_eq!(registry.device_state(&d), Some(DeviceState::Connected));
    }

    #[test]
    fn test_orphaned_send_outcome_still_reported() {
        let mut registry = registry_with(&["d1"]);
        let d = handle("d1");
        established(&mut registry, "d1", 1);
        registry.begin_send(&d, app(1)).unwrap();

        let mut out = Outbox::new();
        registry.unexpected_disconnect(&d, app(1), CommunicationError::new("gone"), &mut out);
        out.clear();
        registry.send_failed(&d, app(1), msg("d1", 1, &[1]), DataSendError::new("gone"), &mut out);
        assert_eq!(names(&out), ["send-failed"]);

        out.clear();
        registry.send_failed(&d, app(1), msg("d1", 1, &[1]), DataSendError::new("dup"), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_late_send_of_lost_session_does_not_close_successor() {
        let mut registry = registry_with(&["d1"]);
        let d = handle("d1");
        established(&mut registry, "d1", 1);
        registry.begin_send(&d, app(1)).unwrap();

        let mut out = Outbox::new();
        registry.unexpected_disconnect(&d, app(1), CommunicationError::new("gone"), &mut out);

        established(&mut registry, "d1", 1);
        registry.begin_send(&d, app(1)).unwrap();
        registry.begin_disconnect(&d, app(1)).unwrap();
        registry.disconnect_done(&d, app(1), &mut out);

        out.clear();
        registry.send_failed(&d, app(1), msg("d1", 1, &[1]), DataSendError::new("gone"), &mut out);
        assert_eq!(registry.session_state(&d, app(1)), Some(SessionState::Closing));
        registry.send_done(&d, app(1), msg("d1", 1, &[2]), &mut out);
        assert_eq!(names(&out), ["send-failed", "data-sent", "session-closed"]);
        assert_eq!(registry.session_state(&d, app(1)), None);
    }

    #[test]
    fn test_device_removal_fails_pending_connects() {
        let mut registry = registry_with(&["d1"]);
        let d = handle("d1");
        established(&mut registry, "d1", 1);
        registry.begin_connect(&d, app(2)).unwrap();

        let mut out = Outbox::new();
        registry.disconnect_device_done(&d, &mut out);
        assert_eq!(names(&out), ["session-closed", "connect-failed", "device-lost"]);
        assert!(out[1].error().is_some_and(|e| e.local_cause().is_none()));

        out.clear();
        registry.connect_done(&d, app(2), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_communication_error_keeps_session() {
        let mut registry = registry_with(&["d1"]);
        let d = handle("d1");
        established(&mut registry, "d1", 1);

        let mut out = Outbox::new();
        registry.communication_error(&d, app(1), &mut out);
        assert_eq!(names(&out), ["communication-error"]);
        assert_eq!(registry.session_state(&d, app(1)), Some(SessionState::Established));

        out.clear();
        registry.communication_error(&handle("ghost"), app(1), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_receive_without_session_keeps_raw() {
        let mut registry = registry_with(&["d1"]);
        let mut out = Outbox::new();
        let message = msg("d1", 1, &[0xAA]);
        registry.receive_done(&handle("d1"), app(1), message.clone(), None, &mut out);
        match &out[0] {
            TransportEvent::ReceiveFailed { error, raw, .. } => {
                assert_eq!(error.local_cause(), Some(LocalCause::UnknownSession));
                assert!(raw.as_ref().is_some_and(|r| r.ptr_eq(&message)));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_receive_runs_validator() {
        let mut registry = registry_with(&["d1"]);
        established(&mut registry, "d1", 1);
        let reject_empty = |m: &RawMessage| {
            if m.is_empty() {
                Err(DataReceiveError::new("empty payload"))
            } else {
                Ok(())
            }
        };

        let mut out = Outbox::new();
        let validator: Option<&dyn PayloadValidator> = Some(&reject_empty);
        registry.receive_done(&handle("d1"), app(1), msg("d1", 1, &[1]), validator, &mut out);
        registry.receive_done(&handle("d1"), app(1), msg("d1", 1, &[]), validator, &mut out);
        assert_eq!(names(&out), ["data-received", "receive-failed"]);
    }

    #[test]
    fn test_stats_display() {
        let mut registry = registry_with(&["d1", "d2"]);
        established(&mut registry, "d1", 1);
        registry.begin_connect(&handle("d2"), app(1)).unwrap();
        let stats = registry.stats(1);
        assert_eq!(stats.devices, 2);
        assert_eq!(stats.connected_devices, 1);
        assert_eq!(stats.sessions(), 2);
        assert!(stats.to_string().starts_with("Devices: 2 total (1 connected)"));
    }
}
