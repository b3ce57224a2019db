//! Serial port discovery and opening.
//!
//! The link never talks to `tokio-serial` directly: it goes through a
//! [`PortProvider`], so the state machine can be driven by in-memory ports in
//! tests and simulations.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialPortType, SerialStream, StopBits,
};
use tracing::debug;

use crate::error::{DaemonError, DaemonResult};

/// Buffer size of each in-memory port direction.
const MEMORY_PORT_BUFFER: usize = 4096;

/// The bus a serial port is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    Usb,
    Pci,
    Bluetooth,
    Unknown,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Usb => "usb",
            Self::Pci => "pci",
            Self::Bluetooth => "bluetooth",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A port reported by the operating system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    /// Device path or name (`/dev/ttyACM0`, `COM3`).
    pub name: String,
    /// Attachment bus.
    pub kind: PortKind,
    /// USB vendor id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vid: Option<u16>,
    /// USB product id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u16>,
    /// USB manufacturer string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// USB product string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
}

impl PortInfo {
    /// Creates a port description with only a name.
    pub fn new(name: impl Into<String>, kind: PortKind) -> Self {
        Self {
            name: name.into(),
            kind,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
        }
    }
}

/// Source of serial ports for the link.
pub trait PortProvider: Send {
    /// The opened port type.
    type Port: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Lists the ports currently present.
    fn available_ports(&self) -> DaemonResult<Vec<PortInfo>>;

    /// Opens a port at `baud_rate`, 8 data bits, no parity, one stop bit and
    /// no flow control.
    fn open(&self, name: &str, baud_rate: u32) -> DaemonResult<Self::Port>;
}

/// Real serial ports through `tokio-serial`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPorts;

impl PortProvider for SerialPorts {
    type Port = SerialStream;

    fn available_ports(&self) -> DaemonResult<Vec<PortInfo>> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| DaemonError::PortEnumeration(e.to_string()))?;

        Ok(ports
            .into_iter()
            .map(|port| match port.port_type {
                SerialPortType::UsbPort(usb) => PortInfo {
                    name: port.port_name,
                    kind: PortKind::Usb,
                    vid: Some(usb.vid),
                    pid: Some(usb.pid),
                    manufacturer: usb.manufacturer,
                    product: usb.product,
                },
                SerialPortType::PciPort => PortInfo::new(port.port_name, PortKind::Pci),
                SerialPortType::BluetoothPort => {
                    PortInfo::new(port.port_name, PortKind::Bluetooth)
                }
                SerialPortType::Unknown => PortInfo::new(port.port_name, PortKind::Unknown),
            })
            .collect())
    }

    fn open(&self, name: &str, baud_rate: u32) -> DaemonResult<Self::Port> {
        tokio_serial::new(name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| DaemonError::serial(name, e))
    }
}

/// Orders candidates so USB ports, where knob panels live, come first.
///
/// With a pinned port, only that name is returned, whether or not the system
/// lists it (pseudo terminals are often not listed).
pub fn candidate_ports(ports: &[PortInfo], pinned: Option<&str>) -> Vec<String> {
    if let Some(pinned) = pinned {
        return vec![pinned.to_string()];
    }
    let mut candidates: Vec<&PortInfo> = ports.iter().collect();
    candidates.sort_by_key(|p| p.kind != PortKind::Usb);
    candidates.into_iter().map(|p| p.name.clone()).collect()
}

#[derive(Debug, Default)]
struct MemoryPortsState {
    listed: Vec<PortInfo>,
    pending: HashMap<String, DuplexStream>,
    opened: Vec<String>,
    fail_listing: bool,
}

/// In-memory ports backed by [`tokio::io::duplex`] pipes.
///
/// [`MemoryPorts::plug`] returns the device end of a new port; the link gets
/// the host end when it opens the port. Each plug can be opened once. Clones
/// share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryPorts {
    state: Arc<Mutex<MemoryPortsState>>,
}

impl MemoryPorts {
    /// Creates a provider with no ports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a USB port and returns its device end.
    pub fn plug(&self, name: &str) -> DuplexStream {
        let (device, host) = tokio::io::duplex(MEMORY_PORT_BUFFER);
        let mut state = self.lock();
        if !state.listed.iter().any(|p| p.name == name) {
            state.listed.push(PortInfo::new(name, PortKind::Usb));
        }
        state.pending.insert(name.to_string(), host);
        device
    }

    /// Lists a port that cannot be opened.
    pub fn plug_broken(&self, name: &str) {
        let mut state = self.lock();
        if !state.listed.iter().any(|p| p.name == name) {
            state.listed.push(PortInfo::new(name, PortKind::Unknown));
        }
    }

    /// Removes a port from the listing.
    pub fn unplug(&self, name: &str) {
        let mut state = self.lock();
        state.listed.retain(|p| p.name != name);
        state.pending.remove(name);
    }

    /// Returns the names of ports opened so far, in order.
    pub fn opened(&self) -> Vec<String> {
        self.lock().opened.clone()
    }

    /// Makes [`PortProvider::available_ports`] fail until reset.
    pub fn set_fail_listing(&self, fail: bool) {
        self.lock().fail_listing = fail;
    }

    fn lock(&self) -> MutexGuard<'_, MemoryPortsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PortProvider for MemoryPorts {
    type Port = DuplexStream;

    fn available_ports(&self) -> DaemonResult<Vec<PortInfo>> {
        let state = self.lock();
        if state.fail_listing {
            return Err(DaemonError::PortEnumeration("listing disabled".to_string()));
        }
        Ok(state.listed.clone())
    }

    fn open(&self, name: &str, baud_rate: u32) -> DaemonResult<Self::Port> {
        let mut state = self.lock();
        let port = state
            .pending
            .remove(name)
            .ok_or_else(|| DaemonError::serial(name, "no such device"))?;
        state.opened.push(name.to_string());
        debug!(port = name, baud_rate, "Opened in-memory port");
        Ok(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn usb_ports_come_first() {
        let ports = vec![
            PortInfo::new("/dev/ttyS0", PortKind::Unknown),
            PortInfo::new("/dev/ttyACM0", PortKind::Usb),
            PortInfo::new("/dev/rfcomm0", PortKind::Bluetooth),
            PortInfo::new("/dev/ttyUSB0", PortKind::Usb),
        ];

        assert_eq!(
            candidate_ports(&ports, None),
            vec!["/dev/ttyACM0", "/dev/ttyUSB0", "/dev/ttyS0", "/dev/rfcomm0"]
        );
    }

    #[test]
    fn pinned_port_is_the_only_candidate() {
        let ports = vec![PortInfo::new("/dev/ttyACM0", PortKind::Usb)];
        assert_eq!(
            candidate_ports(&ports, Some("/dev/pts/4")),
            vec!["/dev/pts/4"]
        );
    }

    #[test]
    fn port_info_serialization_skips_missing_usb_fields() {
        let json = serde_json::to_value(PortInfo::new("COM3", PortKind::Pci)).unwrap();
        assert_eq!(json["name"], "COM3");
        assert_eq!(json["kind"], "pci");
        assert!(json.get("vid").is_none());
    }

    #[tokio::test]
    async fn memory_port_round_trip() {
        let ports = MemoryPorts::new();
        let mut device = ports.plug("sim0");

        assert_eq!(ports.available_ports().unwrap().len(), 1);
        let mut host = ports.open("sim0", 9600).unwrap();
        assert_eq!(ports.opened(), vec!["sim0"]);

        device.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        host.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn memory_port_opens_once() {
        let ports = MemoryPorts::new();
        let _device = ports.plug("sim0");

        assert!(ports.open("sim0", 9600).is_ok());
        assert!(matches!(
            ports.open("sim0", 9600),
            Err(DaemonError::Serial { .. })
        ));
    }

    #[test]
    fn broken_and_unplugged_ports() {
        let ports = MemoryPorts::new();
        ports.plug_broken("ttyS0");
        let _device = ports.plug("sim0");

        assert!(ports.open("ttyS0", 9600).is_err());
        ports.unplug("sim0");
        assert_eq!(ports.available_ports().unwrap().len(), 1);

        ports.set_fail_listing(true);
        assert!(ports.available_ports().is_err());
    }
}
