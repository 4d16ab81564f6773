//! # Telemetry Packets
//!
//! Binary packets exchanged with the vehicle over UDP. Every packet is little-endian and packed,
//! starting with a 4 byte header:
//!
//! ```text
//! [type_id: u16][topic_id: u16][body ...]
//! ```
//!
//! Two packets are defined:
//!
//! - [`Telemetry`] (`type_id = 1`), sent by the vehicle (or a tracker for goals and obstacles):
//!   `time_s: f64, pos_ned: [f64; 3], vel_ned: [f64; 3]`.
//! - [`Traj3Dof`] (`type_id = 2`), sent to the vehicle: `k: u32` followed by `k` samples of
//!   `time_s: f64, pos_ned: [f64; 3], vel_ned: [f64; 3], accl_ned: [f64; 3]`.
//!
//! Bytes following a complete body are ignored, so fixed size senders which pad their datagrams
//! are accepted.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::io::{self, Cursor, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Length of the packet header in bytes.
pub const HEADER_LEN: usize = 4;

/// Largest encoded packet, matches the largest datagram the network layer will carry.
pub const MAX_PACKET_LEN: usize = 4096;

/// Maximum number of samples a [`Traj3Dof`] packet can carry while fitting in
/// [`MAX_PACKET_LEN`].
pub const MAX_TRAJ_SAMPLES: usize = 50;

/// Topic used when the sender does not distinguish between sources.
pub const TOPIC_UNDEFINED: u16 = 0;

/// Encoded length of one trajectory sample.
const TRAJ_SAMPLE_LEN: usize = 10 * 8;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Header at the start of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub type_id: u16,
    pub topic_id: u16,
}

/// Live state of a tracked entity, in the vehicle-centric NED frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Telemetry {
    /// Sender timestamp in seconds
    pub time_s: f64,

    /// Position in metres, north-east-down
    pub pos_ned: [f64; 3],

    /// Velocity in metres/second, north-east-down
    pub vel_ned: [f64; 3],
}

/// A full 3DoF trajectory command.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Traj3Dof {
    pub samples: Vec<Traj3DofSample>,
}

/// One time-indexed sample of a [`Traj3Dof`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Traj3DofSample {
    pub time_s: f64,
    pub pos_ned: [f64; 3],
    pub vel_ned: [f64; 3],
    pub accl_ned: [f64; 3],
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur while decoding a packet.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TlmDecodeError {
    #[error("Packet too short, expected at least {expected} bytes but found {found}")]
    TooShort { expected: usize, found: usize },

    #[error("Unexpected packet type, expected {expected} but found {found}")]
    WrongType { expected: u16, found: u16 },

    #[error("Trajectory claims {0} samples, more than the packet can hold")]
    TooManySamples(u32),
}

/// Errors which can occur while encoding a packet.
#[derive(Debug, thiserror::Error)]
pub enum TlmEncodeError {
    #[error("Trajectory has {0} samples, more than the packet can hold")]
    TooManySamples(usize),

    #[error("Could not write the packet: {0}")]
    WriteError(io::Error),
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A packet which can be written to and read from a raw byte buffer.
pub trait Packet: Sized {
    /// Type discriminator written into the header.
    const TYPE_ID: u16;

    /// Length of the body (excluding the header) in bytes.
    fn body_len(&self) -> usize;

    /// Write the body into the writer.
    fn write_body<W: Write>(&self, w: &mut W) -> Result<(), TlmEncodeError>;

    /// Read the body from the given bytes, which follow the header.
    fn read_body(body: &[u8]) -> Result<Self, TlmDecodeError>;

    /// Encode the packet, including the header, into a new buffer.
    fn to_bytes(&self, topic_id: u16) -> Result<Vec<u8>, TlmEncodeError> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.body_len());

        buf.write_u16::<LittleEndian>(Self::TYPE_ID)
            .map_err(TlmEncodeError::WriteError)?;
        buf.write_u16::<LittleEndian>(topic_id)
            .map_err(TlmEncodeError::WriteError)?;
        self.write_body(&mut buf)?;

        Ok(buf)
    }

    /// Decode a packet from a raw buffer, checking the type in the header.
    fn from_bytes(buf: &[u8]) -> Result<(PacketHeader, Self), TlmDecodeError> {
        let header = PacketHeader::read(buf)?;

        if header.type_id != Self::TYPE_ID {
            return Err(TlmDecodeError::WrongType {
                expected: Self::TYPE_ID,
                found: header.type_id,
            });
        }

        let packet = Self::read_body(&buf[HEADER_LEN..])?;

        Ok((header, packet))
    }
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PacketHeader {
    /// Read the header from the start of a buffer.
    pub fn read(buf: &[u8]) -> Result<Self, TlmDecodeError> {
        check_len(buf, HEADER_LEN)?;

        let mut c = Cursor::new(buf);
        Ok(Self {
            type_id: read_u16(&mut c)?,
            topic_id: read_u16(&mut c)?,
        })
    }
}

impl Packet for Telemetry {
    const TYPE_ID: u16 = 1;

    fn body_len(&self) -> usize {
        7 * 8
    }

    fn write_body<W: Write>(&self, w: &mut W) -> Result<(), TlmEncodeError> {
        w.write_f64::<LittleEndian>(self.time_s)
            .map_err(TlmEncodeError::WriteError)?;
        write_vec3(w, &self.pos_ned)?;
        write_vec3(w, &self.vel_ned)
    }

    fn read_body(body: &[u8]) -> Result<Self, TlmDecodeError> {
        check_len(body, 7 * 8).map_err(|e| e.offset(HEADER_LEN))?;

        let mut c = Cursor::new(body);
        Ok(Self {
            time_s: read_f64(&mut c)?,
            pos_ned: read_vec3(&mut c)?,
            vel_ned: read_vec3(&mut c)?,
        })
    }
}

impl Traj3Dof {
    /// Number of samples in the trajectory.
    pub fn k(&self) -> usize {
        self.samples.len()
    }
}

impl Packet for Traj3Dof {
    const TYPE_ID: u16 = 2;

    fn body_len(&self) -> usize {
        4 + self.samples.len() * TRAJ_SAMPLE_LEN
    }

    fn write_body<W: Write>(&self, w: &mut W) -> Result<(), TlmEncodeError> {
        if self.samples.len() > MAX_TRAJ_SAMPLES {
            return Err(TlmEncodeError::TooManySamples(self.samples.len()));
        }

        w.write_u32::<LittleEndian>(self.samples.len() as u32)
            .map_err(TlmEncodeError::WriteError)?;

        for s in self.samples.iter() {
            w.write_f64::<LittleEndian>(s.time_s)
                .map_err(TlmEncodeError::WriteError)?;
            write_vec3(w, &s.pos_ned)?;
            write_vec3(w, &s.vel_ned)?;
            write_vec3(w, &s.accl_ned)?;
        }

        Ok(())
    }

    fn read_body(body: &[u8]) -> Result<Self, TlmDecodeError> {
        check_len(body, 4).map_err(|e| e.offset(HEADER_LEN))?;

        let mut c = Cursor::new(body);
        let k = c.read_u32::<LittleEndian>().map_err(|_| TlmDecodeError::TooShort {
            expected: HEADER_LEN + 4,
            found: HEADER_LEN + body.len(),
        })?;

        if k as usize > MAX_TRAJ_SAMPLES {
            return Err(TlmDecodeError::TooManySamples(k));
        }

        check_len(body, 4 + k as usize * TRAJ_SAMPLE_LEN).map_err(|e| e.offset(HEADER_LEN))?;

        let mut samples = Vec::with_capacity(k as usize);
        for _ in 0..k {
            samples.push(Traj3DofSample {
                time_s: read_f64(&mut c)?,
                pos_ned: read_vec3(&mut c)?,
                vel_ned: read_vec3(&mut c)?,
                accl_ned: read_vec3(&mut c)?,
            });
        }

        Ok(Self { samples })
    }
}

impl TlmDecodeError {
    /// Shift the lengths in a `TooShort` error to account for bytes already consumed.
    fn offset(self, by: usize) -> Self {
        match self {
            TlmDecodeError::TooShort { expected, found } => TlmDecodeError::TooShort {
                expected: expected + by,
                found: found + by,
            },
            e => e,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn check_len(buf: &[u8], expected: usize) -> Result<(), TlmDecodeError> {
    if buf.len() < expected {
        Err(TlmDecodeError::TooShort {
            expected,
            found: buf.len(),
        })
    } else {
        Ok(())
    }
}

// Lengths are always checked before reading, so an io error here means the check was wrong.
fn short_read(c: &Cursor<&[u8]>) -> TlmDecodeError {
    TlmDecodeError::TooShort {
        expected: c.position() as usize + 8,
        found: c.get_ref().len(),
    }
}

fn read_u16(c: &mut Cursor<&[u8]>) -> Result<u16, TlmDecodeError> {
    c.read_u16::<LittleEndian>().map_err(|_| short_read(c))
}

fn read_f64(c: &mut Cursor<&[u8]>) -> Result<f64, TlmDecodeError> {
    c.read_f64::<LittleEndian>().map_err(|_| short_read(c))
}

fn read_vec3(c: &mut Cursor<&[u8]>) -> Result<[f64; 3], TlmDecodeError> {
    Ok([read_f64(c)?, read_f64(c)?, read_f64(c)?])
}

fn write_vec3<W: Write>(w: &mut W, v: &[f64; 3]) -> Result<(), TlmEncodeError> {
    for x in v.iter() {
        w.write_f64::<LittleEndian>(*x)
            .map_err(TlmEncodeError::WriteError)?;
    }
    Ok(())
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn traj(k: usize) -> Traj3Dof {
        Traj3Dof {
            samples: (0..k)
                .map(|i| Traj3DofSample {
                    time_s: i as f64 * 0.5,
                    pos_ned: [i as f64, -(i as f64), 0.0],
                    vel_ned: [1.0, -1.0, 0.0],
                    accl_ned: [0.0, 0.0, -9.81],
                })
                .collect(),
        }
    }

    #[test]
    fn test_telemetry_layout() {
        let tlm = Telemetry {
            time_s: 1.5,
            pos_ned: [1.0, 2.0, 3.0],
            vel_ned: [0.0; 3],
        };

        let buf = tlm.to_bytes(7).unwrap();
        assert_eq!(buf.len(), 60);
        assert_eq!(&buf[0..4], &[1, 0, 7, 0]);
        assert_eq!(&buf[4..12], &1.5f64.to_le_bytes());
        assert_eq!(&buf[12..20], &1.0f64.to_le_bytes());

        let (header, decoded) = Telemetry::from_bytes(&buf).unwrap();
        assert_eq!(header, PacketHeader { type_id: 1, topic_id: 7 });
        assert_eq!(decoded, tlm);
    }

    #[test]
    fn test_telemetry_accepts_padding() {
        let mut buf = Telemetry::default().to_bytes(TOPIC_UNDEFINED).unwrap();
        buf.extend_from_slice(&[0u8; 100]);
        assert!(Telemetry::from_bytes(&buf).is_ok());
    }

    #[test]
    fn test_telemetry_rejects_truncated() {
        let buf = Telemetry::default().to_bytes(TOPIC_UNDEFINED).unwrap();

        assert_eq!(
            Telemetry::from_bytes(&buf[..59]),
            Err(TlmDecodeError::TooShort { expected: 60, found: 59 })
        );
        assert_eq!(
            Telemetry::from_bytes(&buf[..2]),
            Err(TlmDecodeError::TooShort { expected: 4, found: 2 })
        );
        assert!(Telemetry::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_wrong_type_rejected() {
        let buf = traj(3).to_bytes(TOPIC_UNDEFINED).unwrap();
        assert_eq!(
            Telemetry::from_bytes(&buf),
            Err(TlmDecodeError::WrongType { expected: 1, found: 2 })
        );
    }

    #[test]
    fn test_traj_full_horizon_fits() {
        let t = traj(MAX_TRAJ_SAMPLES);
        let buf = t.to_bytes(TOPIC_UNDEFINED).unwrap();

        assert_eq!(buf.len(), HEADER_LEN + 4 + MAX_TRAJ_SAMPLES * 80);
        assert!(buf.len() <= MAX_PACKET_LEN);

        let (_, decoded) = Traj3Dof::from_bytes(&buf).unwrap();
        assert_eq!(decoded.k(), MAX_TRAJ_SAMPLES);
        assert_eq!(decoded, t);
    }

    #[test]
    fn test_traj_too_long_rejected() {
        assert!(matches!(
            traj(MAX_TRAJ_SAMPLES + 1).to_bytes(TOPIC_UNDEFINED),
            Err(TlmEncodeError::TooManySamples(51))
        ));

        // Forge a header claiming too many samples
        let mut buf = vec![2, 0, 0, 0];
        buf.extend_from_slice(&1000u32.to_le_bytes());
        assert_eq!(
            Traj3Dof::from_bytes(&buf),
            Err(TlmDecodeError::TooManySamples(1000))
        );
    }

    #[test]
    fn test_traj_truncated_rejected() {
        let buf = traj(5).to_bytes(TOPIC_UNDEFINED).unwrap();
        assert!(matches!(
            Traj3Dof::from_bytes(&buf[..buf.len() - 1]),
            Err(TlmDecodeError::TooShort { .. })
        ));
    }
}
