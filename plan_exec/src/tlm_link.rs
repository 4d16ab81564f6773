//! # Telemetry Link
//!
//! The set of UDP endpoints through which live positions are received and trajectory commands
//! are sent. One endpoint is opened for the drone, the goal point and each tracked ellipse, on
//! the port configured in the scene. An entity with port 0 is not tracked.
//!
//! Endpoints refer to obstacles by [`ObstacleId`], so a stale handle after an obstacle was
//! removed is simply ignored. The link must be restarted whenever ports change or a new mission
//! is loaded.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::HashSet;

use comms_if::{
    net::{self, NetParams, SocketOptions, UdpEndpoint, UdpEndpointError},
    tlm::{Packet, Telemetry, TlmEncodeError, Traj3Dof, TOPIC_UNDEFINED},
};
use log::{debug, info, trace, warn};

use crate::{
    opt::ned_to_canvas,
    scene::{ObstacleId, Scene},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Per-entity UDP endpoints.
pub struct TlmLink {
    params: NetParams,

    drone: Option<UdpEndpoint>,
    goal: Option<UdpEndpoint>,
    obstacles: Vec<(ObstacleId, UdpEndpoint)>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// An entity whose position is driven by telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEntity {
    Drone,
    Goal,
    Obstacle(ObstacleId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The entity was moved by telemetry and must be redrawn.
    RefreshGraphics(LinkEntity),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The trajectory was sent, with the given number of bytes.
    Sent(usize),

    /// There's no drone endpoint to send from.
    NoEndpoint,

    /// The drone's destination address was rejected.
    InvalidDestination,
}

#[derive(Debug, thiserror::Error)]
pub enum TlmLinkError {
    #[error("Could not encode the trajectory: {0}")]
    EncodeError(TlmEncodeError),

    #[error("Could not send the trajectory: {0}")]
    SendError(UdpEndpointError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TlmLink {
    /// Create a link with no open endpoints.
    pub fn new(params: &NetParams) -> Self {
        Self {
            params: params.clone(),
            drone: None,
            goal: None,
            obstacles: Vec::new(),
        }
    }

    /// Close any open endpoints and open new ones for every tracked entity in the scene.
    ///
    /// Endpoints which can't be bound are skipped with a warning, as are entities using a port
    /// that is already taken by another entity.
    pub fn start(&mut self, scene: &Scene) {
        self.close_all();

        let mut used_ports = HashSet::new();

        self.drone = self.open("drone", scene.drone.port, &mut used_ports);
        self.goal = self.open("goal", scene.goal.port, &mut used_ports);

        for obs in scene.ellipses() {
            let name = format!("ellipse {}", obs.id.0);
            if let Some(ep) = self.open(&name, obs.port, &mut used_ports) {
                self.obstacles.push((obs.id, ep));
            }
        }

        info!("TlmLink started with {} endpoints", self.num_endpoints());
    }

    /// Drain every endpoint and apply the received positions to the scene.
    ///
    /// Malformed datagrams are dropped with a warning and never touch the scene.
    pub fn poll(&mut self, scene: &mut Scene) -> Vec<LinkEvent> {
        let mut events = Vec::new();

        if let Some(ref mut ep) = self.drone {
            for tlm in recv_telemetry("drone", ep) {
                scene.drone.pos = ned_to_canvas(&tlm.pos_ned);
                if !scene.drone.connected {
                    info!("Drone telemetry received, simulation disabled");
                    scene.drone.connected = true;
                }
                push_once(&mut events, LinkEntity::Drone);
            }
        }

        if let Some(ref mut ep) = self.goal {
            for tlm in recv_telemetry("goal", ep) {
                scene.goal.pos = ned_to_canvas(&tlm.pos_ned);
                push_once(&mut events, LinkEntity::Goal);
            }
        }

        for (id, ep) in self.obstacles.iter_mut() {
            for tlm in recv_telemetry("ellipse", ep) {
                if scene.move_ellipse(*id, ned_to_canvas(&tlm.pos_ned)) {
                    push_once(&mut events, LinkEntity::Obstacle(*id));
                }
            }
        }

        events
    }

    /// Send a trajectory to the drone's destination.
    ///
    /// Nothing is sent if the drone has no endpoint or its destination is invalid.
    pub fn send_trajectory(
        &self,
        scene: &Scene,
        traj: &Traj3Dof,
    ) -> Result<SendOutcome, TlmLinkError> {
        let ep = match self.drone {
            Some(ref ep) => ep,
            None => {
                debug!("No drone endpoint, trajectory not sent");
                return Ok(SendOutcome::NoEndpoint);
            }
        };

        let (dest_ip, dest_port) = (scene.drone.dest_ip.as_str(), scene.drone.dest_port);

        if !net::is_destination_addr_valid(dest_ip, dest_port) {
            debug!(
                "Invalid drone destination {}:{}, trajectory not sent",
                dest_ip, dest_port
            );
            return Ok(SendOutcome::InvalidDestination);
        }

        let addr = match net::destination_socket_addr(dest_ip, dest_port) {
            Some(a) => a,
            None => {
                debug!("Cannot resolve {}:{}, trajectory not sent", dest_ip, dest_port);
                return Ok(SendOutcome::InvalidDestination);
            }
        };

        let buf = traj
            .to_bytes(TOPIC_UNDEFINED)
            .map_err(TlmLinkError::EncodeError)?;

        let len = ep.send_to(&buf, addr).map_err(TlmLinkError::SendError)?;

        debug!("Sent {} sample trajectory ({} bytes) to {}", traj.k(), len, addr);

        Ok(SendOutcome::Sent(len))
    }

    /// Close the endpoint of a removed obstacle. Returns false if it had none.
    pub fn remove_obstacle_endpoint(&mut self, id: ObstacleId) -> bool {
        let len_before = self.obstacles.len();
        self.obstacles.retain(|(oid, _)| *oid != id);
        self.obstacles.len() != len_before
    }

    pub fn close_all(&mut self) {
        self.drone = None;
        self.goal = None;
        self.obstacles.clear();
    }

    pub fn num_endpoints(&self) -> usize {
        self.drone.iter().count() + self.goal.iter().count() + self.obstacles.len()
    }

    fn open(&self, name: &str, port: u16, used_ports: &mut HashSet<u16>) -> Option<UdpEndpoint> {
        if port == 0 {
            return None;
        }

        if !used_ports.insert(port) {
            warn!("Port {} for {} is already in use by the link, skipped", port, name);
            return None;
        }

        let options = SocketOptions {
            recv_buf_len: self.params.recv_buf_len,
            ..Default::default()
        };

        match UdpEndpoint::bind(&self.params.bind_ip, port, options) {
            Ok(ep) => {
                debug!("Opened {} endpoint on {}", name, ep.local_addr());
                Some(ep)
            }
            Err(e) => {
                warn!("Could not open {} endpoint: {}", name, e);
                None
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Every valid telemetry packet pending on the endpoint, oldest first.
fn recv_telemetry(name: &str, ep: &mut UdpEndpoint) -> Vec<Telemetry> {
    let datagrams = match ep.recv_pending() {
        Ok(d) => d,
        Err(e) => {
            warn!("Could not receive {} telemetry: {}", name, e);
            return Vec::new();
        }
    };

    datagrams
        .iter()
        .filter_map(|d| match Telemetry::from_bytes(d) {
            Ok((_, tlm)) => {
                trace!("{} telemetry: {:?}", name, tlm);
                Some(tlm)
            }
            Err(e) => {
                warn!("Dropped malformed {} telemetry: {}", name, e);
                None
            }
        })
        .collect()
}

fn push_once(events: &mut Vec<LinkEvent>, entity: LinkEntity) {
    let event = LinkEvent::RefreshGraphics(entity);
    if !events.contains(&event) {
        events.push(event);
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
