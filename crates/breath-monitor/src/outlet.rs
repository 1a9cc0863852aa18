//! Datagram publish sink
//!
//! Every processed sample goes out as one JSON datagram carrying the stream
//! metadata, so a listener can pick streams by name and type.

use breath_core::{config_error, BreathError, BreathResult, PublishSink, StreamInfo, Value};
use breath_processing::OutletConfig;
use serde::Serialize;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::time::Instant;
use tracing::info;

#[derive(Serialize)]
struct Datagram<'a> {
    info: &'a StreamInfo,
    seq: u64,
    /// Seconds since the outlet opened
    timestamp: f64,
    sample: Vec<f32>,
}

/// Publishes values as UDP datagrams
pub struct UdpOutlet {
    socket: UdpSocket,
    destination: SocketAddr,
    info: StreamInfo,
    seq: u64,
    opened: Instant,
}

impl UdpOutlet {
    pub fn open(config: &OutletConfig, channel_count: usize) -> BreathResult<Self> {
        let destination: SocketAddr = config.destination.parse().map_err(|e| {
            config_error!("Invalid outlet destination '{}': {}", config.destination, e)
        })?;

        let local = if destination.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).map_err(|e| sink_error(&config.stream_name, e))?;
        if let IpAddr::V4(address) = destination.ip() {
            if address.is_multicast() {
                socket
                    .set_multicast_ttl_v4(1)
                    .map_err(|e| sink_error(&config.stream_name, e))?;
            }
        }

        let mut info = StreamInfo::new(
            &config.stream_name,
            &config.stream_type,
            channel_count,
            &config.source_id,
        );
        info.nominal_srate = config.nominal_srate;

        info!(
            name = %info.name,
            stream_type = %info.stream_type,
            channels = channel_count,
            %destination,
            uid = %info.uid,
            "Outlet open"
        );

        Ok(Self {
            socket,
            destination,
            info,
            seq: 0,
            opened: Instant::now(),
        })
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// Datagrams sent so far
    pub fn sent(&self) -> u64 {
        self.seq
    }
}

impl PublishSink for UdpOutlet {
    fn publish(&mut self, value: &Value) -> BreathResult<()> {
        let datagram = Datagram {
            info: &self.info,
            seq: self.seq,
            timestamp: self.opened.elapsed().as_secs_f64(),
            sample: value.to_wire(self.info.channel_count)?,
        };
        let payload = serde_json::to_vec(&datagram).map_err(|e| sink_error(&self.info.name, e))?;
        self.socket
            .send_to(&payload, self.destination)
            .map_err(|e| sink_error(&self.info.name, e))?;
        self.seq += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.info.name
    }
}

fn sink_error(sink: &str, e: impl std::fmt::Display) -> BreathError {
    BreathError::SinkError {
        sink: sink.to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn listener() -> (UdpSocket, OutletConfig) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let config = OutletConfig {
            destination: socket.local_addr().unwrap().to_string(),
            ..OutletConfig::default()
        };
        (socket, config)
    }

    #[test]
    fn test_publishes_json_datagrams() {
        let (socket, config) = listener();
        let mut outlet = UdpOutlet::open(&config, 2).unwrap();

        outlet.publish(&Value::Vector(vec![0.25, 0.75])).unwrap();
        outlet.publish(&Value::Vector(vec![0.5, 1.0])).unwrap();
        assert_eq!(outlet.sent(), 2);

        let mut buf = [0u8; 2048];
        let len = socket.recv(&mut buf).unwrap();
        let first: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(first["seq"], 0);
        assert_eq!(first["sample"], serde_json::json!([0.25, 0.75]));
        assert_eq!(first["info"]["name"], "BreathingBelt");
        assert_eq!(first["info"]["stream_type"], "Breathing");
        assert_eq!(first["info"]["channel_format"], "float32");

        let len = socket.recv(&mut buf).unwrap();
        let second: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(second["seq"], 1);
        assert_eq!(second["info"]["uid"], first["info"]["uid"]);
    }

    #[test]
    fn test_rejects_width_mismatch() {
        let (_socket, config) = listener();
        let mut outlet = UdpOutlet::open(&config, 2).unwrap();
        assert!(outlet.publish(&Value::Scalar(0.5)).is_err());
        assert_eq!(outlet.sent(), 0);
    }

    #[test]
    fn test_bad_destination() {
        let config = OutletConfig {
            destination: "not-an-address".to_string(),
            ..OutletConfig::default()
        };
        assert!(matches!(
            UdpOutlet::open(&config, 1),
            Err(BreathError::ConfigurationError { .. })
        ));
    }
}
