//! # TM Server
//!
//! Publishes the state of the planner as JSON datagrams, for display by a monitoring tool.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::net::SocketAddr;

use serde::Serialize;

use comms_if::net::{NetParams, SocketOptions, UdpEndpoint, UdpEndpointError};

use crate::{
    data_store::DataStore,
    exec_ctrl::ExecState,
    scene::{CanvasPoint, Obstacle},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Telemetry server
pub struct TmServer {
    endpoint: UdpEndpoint,

    dest: SocketAddr,
}

/// Telemetry packet that is output by the server.
#[derive(Debug, Serialize)]
pub struct TmPacket<'a> {
    pub sim_time_s: f64,

    pub drone_pos: CanvasPoint,

    pub drone_connected: bool,

    pub goal_pos: CanvasPoint,

    pub obstacles: Vec<&'a Obstacle>,

    pub waypoints: &'a [CanvasPoint],

    pub path: &'a [CanvasPoint],

    pub feasible: bool,

    pub user_message: &'a str,

    pub exec_state: ExecState,

    pub frozen: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TmServerError {
    #[error("Cannot parse {0:?} as a TM endpoint")]
    InvalidEndpoint(String),

    #[error("Socket error: {0}")]
    SocketError(UdpEndpointError),

    #[error("Could not send telemetry: {0}")]
    SendError(UdpEndpointError),

    #[error("Could not serialize the telemetry: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TmServer {
    /// Create a new instance of the TM Server publishing to `tm_endpoint`.
    pub fn new(tm_endpoint: &str, params: &NetParams) -> Result<Self, TmServerError> {
        let dest: SocketAddr = tm_endpoint
            .parse()
            .map_err(|_| TmServerError::InvalidEndpoint(tm_endpoint.into()))?;

        let endpoint = UdpEndpoint::bind(&params.bind_ip, 0, SocketOptions::default())
            .map_err(TmServerError::SocketError)?;

        Ok(Self { endpoint, dest })
    }

    pub fn send(&self, ds: &DataStore) -> Result<(), TmServerError> {
        let packet = TmPacket::from_datastore(ds);

        let packet_string =
            serde_json::to_string(&packet).map_err(TmServerError::SerializationError)?;

        self.endpoint
            .send_to(packet_string.as_bytes(), self.dest)
            .map_err(TmServerError::SendError)?;

        Ok(())
    }
}

impl<'a> TmPacket<'a> {
    pub fn from_datastore(ds: &'a DataStore) -> Self {
        Self {
            sim_time_s: ds.sim_time_s,
            drone_pos: ds.scene.drone.pos,
            drone_connected: ds.scene.drone.connected,
            goal_pos: ds.scene.goal.pos,
            obstacles: ds.scene.obstacles().collect(),
            waypoints: &ds.scene.waypoints.points,
            path: &ds.scene.path.points,
            feasible: ds.scene.feasibility.feasible,
            user_message: &ds.user_message,
            exec_state: ds.exec_ctrl.state(),
            frozen: ds.exec_ctrl.is_frozen(ds.sim_time_s),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::scene::{Inclusion, Scene};
    use std::{net::UdpSocket, time::Duration};

    #[test]
    fn test_publish() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(1)))
            .unwrap();

        let params = NetParams {
            bind_ip: String::from("127.0.0.1"),
            ..Default::default()
        };

        let mut scene = Scene::default();
        scene
            .add_ellipse(CanvasPoint::new(1.0, 2.0), 3.0, Inclusion::KeepIn, 0)
            .unwrap();

        let mut ds = DataStore::new(scene, &params);
        ds.sim_time_s = 4.5;
        ds.notify("Hello");

        let server = TmServer::new(&receiver.local_addr().unwrap().to_string(), &params).unwrap();
        server.send(&ds).unwrap();

        let mut buf = [0u8; 4096];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        let tm: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();

        assert_eq!(tm["sim_time_s"], 4.5);
        assert_eq!(tm["user_message"], "Hello");
        assert_eq!(tm["exec_state"], "Idle");
        assert_eq!(tm["frozen"], false);
        assert_eq!(tm["obstacles"].as_array().unwrap().len(), 1);
        assert_eq!(tm["obstacles"][0]["inclusion"], "KeepIn");
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(matches!(
            TmServer::new("nowhere", &NetParams::default()),
            Err(TmServerError::InvalidEndpoint(_))
        ));
    }
}
