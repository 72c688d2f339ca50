// VESC motor controller CAN protocol
//
// Extended CAN id layout: bits 8..16 = packet type, bits 0..8 = controller id.
// All multi-byte payload fields are big-endian.

use crate::transport::{pack_frame, unpack_frame};

/// Scale factors used on the wire
const DUTY_SCALE: f32 = 100_000.0;
const CURRENT_SCALE: f32 = 1_000.0;
const STATUS_CURRENT_SCALE: f32 = 10.0;
const STATUS_DUTY_SCALE: f32 = 1_000.0;

/// Packet types (subset used by the runtime)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    SetDuty = 0,
    SetCurrent = 1,
    Status = 9,
}

/// How a wheel is driven for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMode {
    /// Signed duty cycle in [-1, 1]
    Duty,
    /// Current-limited hold, value in amps
    Current,
}

/// One outbound per-wheel command
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorCommand {
    pub motor_id: u8,
    pub mode: CommandMode,
    pub value: f32,
}

/// Decoded inbound status
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotorFeedback {
    pub valid: bool,
    pub motor_id: u8,
    pub rpm: f32,
    pub current: f32,
    pub duty: f32,
}

/// Encodes wheel commands into transport messages and decodes telemetry
pub trait MotorCodec: Send + Sync {
    fn encode(&self, command: &MotorCommand) -> Vec<u8>;

    /// Never fails; undecodable messages come back with `valid == false`
    fn decode(&self, message: &[u8]) -> MotorFeedback;
}

/// Codec for VESC controllers on a shared CAN bus
#[derive(Debug, Clone, Copy, Default)]
pub struct VescCodec;

impl VescCodec {
    pub fn new() -> Self {
        Self
    }
}

/// Extended CAN id for `packet` addressed to `motor_id`
fn can_id(packet: PacketType, motor_id: u8) -> u32 {
    ((packet as u32) << 8) | motor_id as u32
}

impl MotorCodec for VescCodec {
    fn encode(&self, command: &MotorCommand) -> Vec<u8> {
        let (packet, raw) = match command.mode {
            CommandMode::Duty => (
                PacketType::SetDuty,
                (command.value.clamp(-1.0, 1.0) * DUTY_SCALE).round() as i32,
            ),
            CommandMode::Current => (
                PacketType::SetCurrent,
                (command.value * CURRENT_SCALE).round() as i32,
            ),
        };
        pack_frame(can_id(packet, command.motor_id), &raw.to_be_bytes())
    }

    fn decode(&self, message: &[u8]) -> MotorFeedback {
        let Ok((id, data)) = unpack_frame(message) else {
            return MotorFeedback::default();
        };
        let motor_id = (id & 0xFF) as u8;
        let packet = (id >> 8) & 0xFF;

        if packet != PacketType::Status as u32 || data.len() < 8 {
            return MotorFeedback {
                motor_id,
                ..MotorFeedback::default()
            };
        }

        let erpm = i32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let current = i16::from_be_bytes([data[4], data[5]]);
        let duty = i16::from_be_bytes([data[6], data[7]]);

        MotorFeedback {
            valid: true,
            motor_id,
            rpm: erpm as f32,
            current: current as f32 / STATUS_CURRENT_SCALE,
            duty: duty as f32 / STATUS_DUTY_SCALE,
        }
    }
}

/// Build a status message the way a controller would send it
#[cfg(test)]
pub(crate) fn status_message(motor_id: u8, erpm: i32, current: f32, duty: f32) -> Vec<u8> {
    let mut data = Vec::with_capacity(8);
    data.extend_from_slice(&erpm.to_be_bytes());
    data.extend_from_slice(&((current * STATUS_CURRENT_SCALE) as i16).to_be_bytes());
    data.extend_from_slice(&((duty * STATUS_DUTY_SCALE) as i16).to_be_bytes());
    pack_frame(can_id(PacketType::Status, motor_id), &data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_duty() {
        let message = VescCodec.encode(&MotorCommand {
            motor_id: 3,
            mode: CommandMode::Duty,
            value: 0.5,
        });
        // id = (0 << 8) | 3, payload = 50000 big-endian
        assert_eq!(message, vec![0, 0, 0x00, 0x03, 0x00, 0x00, 0xC3, 0x50]);
    }

    #[test]
    fn test_encode_negative_duty_is_clamped() {
        let message = VescCodec.encode(&MotorCommand {
            motor_id: 1,
            mode: CommandMode::Duty,
            value: -2.0,
        });
        let raw = i32::from_be_bytes([message[4], message[5], message[6], message[7]]);
        assert_eq!(raw, -100_000);
    }

    #[test]
    fn test_encode_current_hold() {
        let message = VescCodec.encode(&MotorCommand {
            motor_id: 4,
            mode: CommandMode::Current,
            value: 0.0,
        });
        assert_eq!(message, vec![0, 0, 0x01, 0x04, 0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_status() {
        let feedback = VescCodec.decode(&status_message(2, -4800, 3.5, 0.25));
        assert!(feedback.valid);
        assert_eq!(feedback.motor_id, 2);
        assert_eq!(feedback.rpm, -4800.0);
        assert_eq!(feedback.current, 3.5);
        assert_eq!(feedback.duty, 0.25);
    }

    #[test]
    fn test_decode_rejects_non_status_packets() {
        let command = VescCodec.encode(&MotorCommand {
            motor_id: 2,
            mode: CommandMode::Duty,
            value: 0.1,
        });
        let feedback = VescCodec.decode(&command);
        assert!(!feedback.valid);
        assert_eq!(feedback.motor_id, 2);
    }

    #[test]
    fn test_decode_rejects_short_payload() {
        let message = pack_frame(can_id(PacketType::Status, 1), &[0, 0, 0, 1]);
        assert!(!VescCodec.decode(&message).valid);
        assert!(!VescCodec.decode(&[0x00]).valid);
    }
}
