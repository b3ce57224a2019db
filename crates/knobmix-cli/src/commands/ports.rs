//! Serial port listing.

use knobmix_daemon::{PortInfo, PortProvider, SerialPorts};

use crate::error::CliResult;

/// Prints the serial ports the system reports.
pub fn ports(json: bool) -> CliResult<()> {
    let ports = SerialPorts.available_ports()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
    } else if ports.is_empty() {
        println!("No serial ports found.");
    } else {
        for port in &ports {
            println!("{}", format_port(port));
        }
    }
    Ok(())
}

/// One line per port: name, bus, then USB ids and product when known.
pub fn format_port(port: &PortInfo) -> String {
    let mut line = format!("{:<20} {}", port.name, port.kind);
    if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        line.push_str(&format!(" {:04x}:{:04x}", vid, pid));
    }
    let label = match (&port.manufacturer, &port.product) {
        (Some(m), Some(p)) => Some(format!("{} {}", m, p)),
        (Some(s), None) | (None, Some(s)) => Some(s.clone()),
        (None, None) => None,
    };
    if let Some(label) = label {
        line.push_str(&format!(" ({})", label));
    }
    line
}
