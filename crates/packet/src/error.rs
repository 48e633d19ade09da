use thiserror::Error;

use crate::kind::PacketKind;

#[derive(Error, Debug)]
pub enum PacketError {
    #[error("unknown packet kind {0:?}")]
    UnknownKind(String),

    #[error("{kind} packet: expected {expected} fields, got {got}")]
    FieldCount {
        kind: PacketKind,
        expected: &'static str,
        got: usize,
    },

    #[error("{kind} packet: missing required field {field}")]
    MissingField {
        kind: PacketKind,
        field: &'static str,
    },

    #[error("{kind} packet: field {field} has the wrong type")]
    WrongType {
        kind: PacketKind,
        field: &'static str,
    },

    #[error("ttl {0} outside 0..=200")]
    InvalidTtl(i32),

    #[error("packet is not a sequence")]
    NotASequence,
}
