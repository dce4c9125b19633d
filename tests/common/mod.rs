//! Shared test utilities for the transport integration tests.
//!
//! This module provides common test infrastructure including:
//! - A service wired to an in-memory backend
//! - Request builders with sensible defaults
//! - Helpers that drain a port until a byte count arrives

#![allow(dead_code)]

use serial_assistant::port::MockBackend;
use serial_assistant::{
    CloseRequest, OpenRequest, ReadRequest, TransportService, WriteRequest,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Create a service over a fresh mock backend.
///
/// The backend handle is returned so tests can add, unplug or sabotage devices.
pub fn create_test_service() -> (TransportService, Arc<MockBackend>) {
    let backend = Arc::new(MockBackend::new());
    let service = TransportService::new(backend.clone());
    (service, backend)
}

pub fn open(service: &TransportService, port: &str) -> serial_assistant::TransportResult<()> {
    service.open_port(OpenRequest::new(port)).map(|_| ())
}

pub fn close_req(port: &str) -> CloseRequest {
    CloseRequest {
        port_name: port.to_string(),
    }
}

pub fn text(port: &str, data: &str) -> WriteRequest {
    WriteRequest {
        port_name: port.to_string(),
        data: data.to_string(),
        is_hex: false,
    }
}

pub fn hex(port: &str, data: &str) -> WriteRequest {
    WriteRequest {
        port_name: port.to_string(),
        data: data.to_string(),
        is_hex: true,
    }
}

pub fn read_req(port: &str, timeout_ms: u64) -> ReadRequest {
    ReadRequest {
        port_name: port.to_string(),
        timeout_ms,
    }
}

/// Read in short polls until `expected` bytes arrived or `budget` elapsed.
///
/// Returns the bytes and how many non-empty reads it took.
pub fn read_exactly(
    service: &TransportService,
    port: &str,
    expected: usize,
    budget: Duration,
) -> (Vec<u8>, usize) {
    let deadline = Instant::now() + budget;
    let mut received = Vec::new();
    let mut reads = 0;
    while received.len() < expected && Instant::now() < deadline {
        let chunk = service.read_data(read_req(port, 20)).unwrap();
        if !chunk.is_empty() {
            reads += 1;
            received.extend_from_slice(&chunk);
        }
    }
    (received, reads)
}
