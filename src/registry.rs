//! Name → session map shared by every caller.
//!
//! The registry is the only shared state in the transport. Its map lock is
//! held only long enough to reserve, look up, insert or remove a name; device
//! I/O (open, close, read, write) always happens outside it. Each session sits
//! behind its own lock so a blocking call on one port never stalls another.
//! The two locks are never taken map-then-session: `unregister` holds the
//! session lock while it briefly takes the map lock to drop the entry.

use crate::error::{TransportError, TransportResult};
use crate::session::PortSession;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared reference to a registered session.
pub type SessionHandle = Arc<Mutex<PortSession>>;

/// One session that failed to close during teardown.
#[derive(Debug)]
pub struct TeardownFailure {
    pub port: String,
    pub error: TransportError,
}

/// Outcome of force-closing every registered session.
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub closed: Vec<String>,
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of sessions a close was attempted on.
    pub fn attempted(&self) -> usize {
        self.closed.len() + self.failures.len()
    }
}

#[derive(Default)]
struct Slots {
    sessions: HashMap<String, SessionHandle>,
    /// Names whose open is in progress outside the lock.
    opening: HashSet<String>,
}

impl Slots {
    fn is_taken(&self, name: &str) -> bool {
        self.sessions.contains_key(name) || self.opening.contains(name)
    }
}

/// Releases an `open_with` reservation unless it was committed.
struct Reservation<'a> {
    slots: &'a Mutex<Slots>,
    name: &'a str,
    committed: bool,
}

impl Reservation<'_> {
    fn commit(mut self, handle: &SessionHandle) {
        let mut slots = self.slots.lock();
        slots.opening.remove(self.name);
        slots
            .sessions
            .insert(self.name.to_string(), Arc::clone(handle));
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.slots.lock().opening.remove(self.name);
        }
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    slots: Mutex<Slots>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an open session under its port name.
    ///
    /// A session that is rejected is dropped, which closes it.
    ///
    /// # Errors
    ///
    /// - `AlreadyOpen` if the name is taken or being opened
    /// - `NotOpen` if the session was already closed
    pub fn register(&self, session: PortSession) -> TransportResult<SessionHandle> {
        let name = session.port_name().to_string();
        if !session.is_open() {
            return Err(TransportError::NotOpen(name));
        }

        let mut slots = self.slots.lock();
        if slots.is_taken(&name) {
            return Err(TransportError::AlreadyOpen(name));
        }
        let handle = Arc::new(Mutex::new(session));
        slots.sessions.insert(name.clone(), Arc::clone(&handle));
        debug!(port = %name, "registered session");
        Ok(handle)
    }

    /// Reserve `name`, run `open` without holding the map lock, then commit.
    ///
    /// Two callers racing to open the same name cannot both reach the device:
    /// the loser sees the reservation and fails with `AlreadyOpen`. A failed
    /// open releases the reservation.
    pub fn open_with<F>(&self, name: &str, open: F) -> TransportResult<SessionHandle>
    where
        F: FnOnce() -> TransportResult<PortSession>,
    {
        {
            let mut slots = self.slots.lock();
            if slots.is_taken(name) {
                return Err(TransportError::AlreadyOpen(name.to_string()));
            }
            slots.opening.insert(name.to_string());
        }
        let reservation = Reservation {
            slots: &self.slots,
            name,
            committed: false,
        };

        let handle = Arc::new(Mutex::new(open()?));
        reservation.commit(&handle);
        debug!(port = %name, "registered session");
        Ok(handle)
    }

    /// Fetch the session registered under `name`.
    pub fn lookup(&self, name: &str) -> TransportResult<SessionHandle> {
        self.slots
            .lock()
            .sessions
            .get(name)
            .cloned()
            .ok_or_else(|| TransportError::NotOpen(name.to_string()))
    }

    /// Run `f` with exclusive access to the open session under `name`.
    ///
    /// The map lock is released before `f` runs.
    pub fn with_session<T, F>(&self, name: &str, f: F) -> TransportResult<T>
    where
        F: FnOnce(&mut PortSession) -> TransportResult<T>,
    {
        let handle = self.lookup(name)?;
        let mut session = handle.lock();
        // Closed between lookup and lock.
        if !session.is_open() {
            return Err(TransportError::NotOpen(name.to_string()));
        }
        f(&mut *session)
    }

    /// Close the session under `name` and remove it.
    ///
    /// Waits for any in-flight operation on that session, never on the map.
    /// The entry is removed while the session lock is still held, so every
    /// caller that reaches the session afterwards sees `NotOpen`. The entry is
    /// removed even if close reports a failure, since the handle is released
    /// either way.
    pub fn unregister(&self, name: &str) -> TransportResult<()> {
        let handle = self.lookup(name)?;
        let mut session = handle.lock();
        // Another caller closed it while we waited.
        if !session.is_open() {
            return Err(TransportError::NotOpen(name.to_string()));
        }
        let result = session.close();
        {
            let mut slots = self.slots.lock();
            if slots
                .sessions
                .get(name)
                .is_some_and(|current| Arc::ptr_eq(current, &handle))
            {
                slots.sessions.remove(name);
            }
        }
        drop(session);
        debug!(port = %name, "unregistered session");
        result
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.lock().sessions.contains_key(name)
    }

    /// Names of all open sessions, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.slots.lock().sessions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.slots.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().sessions.is_empty()
    }

    /// Force-close every session.
    ///
    /// The map is emptied first, then each session is closed outside the map
    /// lock. Every session gets a close attempt regardless of earlier failures.
    pub fn shutdown_all(&self) -> TeardownReport {
        let drained: Vec<(String, SessionHandle)> = self.slots.lock().sessions.drain().collect();
        let mut report = TeardownReport::default();

        for (port, handle) in drained {
            let mut session = handle.lock();
            if !session.is_open() {
                // Lost a race with `unregister`, which already reported.
                continue;
            }
            match session.close() {
                Ok(()) => report.closed.push(port),
                Err(error) => {
                    warn!(port = %port, error = %error, "close failed during teardown");
                    report.failures.push(TeardownFailure { port, error });
                }
            }
        }
        report.closed.sort();
        report
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        if self.is_empty() {
            return;
        }
        let report = self.shutdown_all();
        for failure in &report.failures {
            warn!(port = %failure.port, error = %failure.error, "session leaked a close failure on drop");
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("ports", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerator::DeviceClass;
    use crate::error::ErrorKind;
    use crate::port::{MockBackend, PortConfig};
    use std::time::Duration;

    fn open(backend: &MockBackend, name: &str) -> PortSession {
        PortSession::open(backend, PortConfig::new(name)).unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let backend = MockBackend::new();
        backend.add_port("COM1", DeviceClass::Usb);
        let registry = SessionRegistry::new();

        registry.register(open(&backend, "COM1")).unwrap();
        assert!(registry.contains("COM1"));
        assert_eq!(
            registry.lookup("COM1").unwrap().lock().port_name(),
            "COM1"
        );
        assert_eq!(
            registry.lookup("COM2").unwrap_err().kind(),
            ErrorKind::NotOpen
        );
    }

    #[test]
    fn test_register_duplicate_keeps_original() {
        let backend = MockBackend::new();
        let mut mock = backend.add_port("COM1", DeviceClass::Usb);
        let registry = SessionRegistry::new();

        registry.register(open(&backend, "COM1")).unwrap();
        let err = registry.register(open(&backend, "COM1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyOpen);

        mock.enqueue_read(b"ok");
        let data = registry
            .with_session("COM1", |s| s.read(Duration::from_millis(10)))
            .unwrap();
        assert_eq!(data, b"ok");
    }

    #[test]
    fn test_register_rejects_closed_session() {
        let backend = MockBackend::new();
        backend.add_port("COM1", DeviceClass::Usb);
        let registry = SessionRegistry::new();

        let mut session = open(&backend, "COM1");
        session.close().unwrap();
        assert_eq!(
            registry.register(session).unwrap_err().kind(),
            ErrorKind::NotOpen
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_open_with_does_not_call_opener_when_taken() {
        let backend = MockBackend::new();
        backend.add_port("COM1", DeviceClass::Usb);
        let registry = SessionRegistry::new();

        registry
            .open_with("COM1", || Ok(open(&backend, "COM1")))
            .unwrap();
        let mut called = false;
        let err = registry
            .open_with("COM1", || {
                called = true;
                Ok(open(&backend, "COM1"))
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyOpen);
        assert!(!called);
        assert_eq!(backend.open_log().len(), 1);
    }

    #[test]
    fn test_open_with_runs_opener_outside_map_lock() {
        let backend = MockBackend::new();
        backend.add_port("COM1", DeviceClass::Usb);
        let registry = SessionRegistry::new();

        registry
            .open_with("COM1", || {
                // The map stays usable while the device is being opened.
                assert!(registry.names().is_empty());
                let racing = registry.open_with("COM1", || unreachable!("name is reserved"));
                assert_eq!(racing.unwrap_err().kind(), ErrorKind::AlreadyOpen);
                Ok(open(&backend, "COM1"))
            })
            .unwrap();
        assert_eq!(registry.names(), vec!["COM1".to_string()]);
    }

    #[test]
    fn test_failed_open_releases_name() {
        let backend = MockBackend::new();
        backend.add_port("COM1", DeviceClass::Usb);
        let registry = SessionRegistry::new();

        let err = registry
            .open_with("COM1", || {
                Err(TransportError::PermissionDenied("COM1".to_string()))
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert!(registry.is_empty());

        registry
            .open_with("COM1", || Ok(open(&backend, "COM1")))
            .unwrap();
        assert!(registry.contains("COM1"));
    }

    #[test]
    fn test_unregister_waits_for_session_not_map() {
        let backend = MockBackend::new();
        backend.add_port("COM1", DeviceClass::Usb);
        let mock2 = backend.add_port("COM2", DeviceClass::Usb);
        let registry = Arc::new(SessionRegistry::new());
        registry.register(open(&backend, "COM1")).unwrap();
        registry.register(open(&backend, "COM2")).unwrap();

        let reader = Arc::clone(&registry);
        let read = std::thread::spawn(move || {
            reader.with_session("COM1", |s| s.read(Duration::from_millis(600)))
        });
        std::thread::sleep(Duration::from_millis(50));
        let closer = Arc::clone(&registry);
        let close = std::thread::spawn(move || closer.unregister("COM1"));
        std::thread::sleep(Duration::from_millis(50));

        let started = std::time::Instant::now();
        registry
            .with_session("COM2", |s| s.write_bytes(b"ping"))
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(300));
        assert_eq!(mock2.written_bytes(), b"ping".to_vec());

        assert!(read.join().unwrap().unwrap().is_empty());
        close.join().unwrap().unwrap();
        assert_eq!(registry.names(), vec!["COM2".to_string()]);
    }

    #[test]
    fn test_unregister_closes_and_removes() {
        let backend = MockBackend::new();
        let mock = backend.add_port("COM1", DeviceClass::Usb);
        let registry = SessionRegistry::new();

        let handle = registry.register(open(&backend, "COM1")).unwrap();
        registry.unregister("COM1").unwrap();
        assert!(!registry.contains("COM1"));
        assert!(!handle.lock().is_open());
        assert_eq!(mock.flush_count(), 1);

        assert_eq!(
            registry.unregister("COM1").unwrap_err().kind(),
            ErrorKind::NotOpen
        );
    }

    #[test]
    fn test_stale_handle_sees_not_open() {
        let backend = MockBackend::new();
        backend.add_port("COM1", DeviceClass::Usb);
        let registry = SessionRegistry::new();

        let handle = registry.register(open(&backend, "COM1")).unwrap();
        registry.unregister("COM1").unwrap();
        assert_eq!(
            handle
                .lock()
                .read(Duration::from_millis(1))
                .unwrap_err()
                .kind(),
            ErrorKind::NotOpen
        );
    }

    #[test]
    fn test_shutdown_all_attempts_every_session() {
        let backend = MockBackend::new();
        let mut first = backend.add_port("COM1", DeviceClass::Usb);
        let second = backend.add_port("COM2", DeviceClass::Usb);
        let registry = SessionRegistry::new();
        registry.register(open(&backend, "COM1")).unwrap();
        registry.register(open(&backend, "COM2")).unwrap();

        first.fail_next_flush();
        let report = registry.shutdown_all();

        assert_eq!(report.attempted(), 2);
        assert_eq!(report.closed, vec!["COM2".to_string()]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].port, "COM1");
        assert_eq!(report.failures[0].error.kind(), ErrorKind::CloseError);
        assert_eq!(second.flush_count(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drop_tears_down() {
        let backend = MockBackend::new();
        let mock = backend.add_port("COM1", DeviceClass::Usb);
        let registry = SessionRegistry::new();
        registry.register(open(&backend, "COM1")).unwrap();

        drop(registry);
        assert_eq!(mock.flush_count(), 1);
    }
}
