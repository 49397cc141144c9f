//! Message framing: escape/stuffing encoder and the receive state machine.
//!
//! Messages travel through a modem whose firmware watches the raw byte
//! stream for its own syntax, so the framing has two jobs beyond marking
//! message boundaries:
//!
//! - **Escaping**: the escape prefix byte appearing in a payload is sent
//!   doubled, so the receiver can tell payload bytes from control
//!   sequences.
//! - **Stuffing**: the two-character substrings `AT` and `OK` must never
//!   appear on the wire (the modem would misread them as a command or a
//!   response). A prefix+stuffing pair is inserted between the two
//!   characters; the receiver discards it.
//!
//! The wire format for a message is:
//!
//! ```text
//! & J <cmd> <escaped+stuffed payload bytes> & X
//! ```
//!
//! The command id byte is not escaped; only payload bytes are, which is
//! why the id domain excludes the prefix value. A ping is the two bytes
//! `&P`, answered by `&E`.
//!
//! [`Decoder`] consumes the stream one byte at a time and reports what the
//! caller must act on via [`Step`]. Malformed control sequences are
//! absorbed silently: noise on a wireless link is expected and must not
//! crash the receiver.

use heapless::Vec;

use crate::consts::{
    CTRL_ECHO, CTRL_END, CTRL_PING, CTRL_PREFIX, CTRL_START, CTRL_STUFFING, MAX_PAYLOAD_LEN,
};

/// Encodes one message, emitting raw wire bytes through `emit`.
///
/// Payload bytes are escaped and stuffed as described in the module docs;
/// the surrounding start/end sequences and the command id are emitted
/// verbatim. The caller owns pacing: `emit` is called once per wire byte
/// in order.
pub fn encode(cmd: u8, payload: &[u8], emit: &mut impl FnMut(u8)) {
    emit(CTRL_PREFIX);
    emit(CTRL_START);
    emit(cmd);
    // every iteration ends by emitting the payload byte itself, so the
    // previous payload byte (or the command id, for the first one) is
    // always the most recent wire byte when the pair check runs
    let mut prev = cmd;
    for &byte in payload {
        match byte {
            CTRL_PREFIX => emit(CTRL_PREFIX),
            b'T' if prev == b'A' => {
                emit(CTRL_PREFIX);
                emit(CTRL_STUFFING);
            }
            b'K' if prev == b'O' => {
                emit(CTRL_PREFIX);
                emit(CTRL_STUFFING);
            }
            _ => {}
        }
        emit(byte);
        prev = byte;
    }
    emit(CTRL_PREFIX);
    emit(CTRL_END);
}

/// What the caller must do after feeding one byte to the [`Decoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Step {
    /// Nothing to act on yet.
    Pending,
    /// A complete message is available from [`Decoder::message`].
    Complete,
    /// The peer sent a ping; reply with prefix+echo now.
    Ping,
    /// The peer answered a ping; record the arrival time.
    Echo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Discarding inter-message noise until a start sequence.
    WaitingForStart,
    /// Start seen; the next ordinary byte is the command id.
    ReadingCommand,
    /// Accumulating payload bytes until the end sequence.
    InMessage,
}

/// Byte-at-a-time message assembly state machine.
///
/// Feed every received byte in arrival order; act on the returned [`Step`].
/// After [`Step::Complete`] the decoded command id and payload stay
/// readable via [`message`](Decoder::message) until the next start
/// sequence begins a new message.
#[derive(Debug)]
pub struct Decoder {
    state: DecodeState,
    saw_prefix: bool,
    cmd: u8,
    payload: Vec<u8, MAX_PAYLOAD_LEN>,
}

impl Decoder {
    /// Creates a decoder in the waiting-for-start state.
    pub const fn new() -> Self {
        Self {
            state: DecodeState::WaitingForStart,
            saw_prefix: false,
            cmd: 0,
            payload: Vec::new(),
        }
    }

    /// Consumes one byte.
    ///
    /// # Panics
    ///
    /// Panics if a message payload exceeds
    /// [`MAX_PAYLOAD_LEN`](crate::consts::MAX_PAYLOAD_LEN). The bound is a
    /// compile-time contract between the two boards; overrunning it means
    /// the peers were built with mismatched limits, which is not a runtime
    /// condition to recover from.
    pub fn feed(&mut self, byte: u8) -> Step {
        if self.saw_prefix {
            self.saw_prefix = false;
            return match byte {
                CTRL_START => {
                    // a new message begins; anything partial is discarded
                    self.state = DecodeState::ReadingCommand;
                    self.payload.clear();
                    Step::Pending
                }
                CTRL_END => {
                    let complete = self.state == DecodeState::InMessage;
                    self.state = DecodeState::WaitingForStart;
                    if complete {
                        Step::Complete
                    } else {
                        // end without a message in progress: malformed, ignore
                        Step::Pending
                    }
                }
                CTRL_PING => Step::Ping,
                CTRL_ECHO => Step::Echo,
                CTRL_STUFFING => Step::Pending,
                CTRL_PREFIX => {
                    // escaped prefix: a literal payload byte
                    self.ordinary(byte);
                    Step::Pending
                }
                _ => {
                    // unknown control code: malformed, resynchronize
                    self.state = DecodeState::WaitingForStart;
                    Step::Pending
                }
            };
        }

        if byte == CTRL_PREFIX {
            self.saw_prefix = true;
            return Step::Pending;
        }

        self.ordinary(byte);
        Step::Pending
    }

    /// The most recently completed message: command id and payload.
    ///
    /// Meaningful only after [`feed`](Decoder::feed) returned
    /// [`Step::Complete`]; the payload is overwritten once the next
    /// message starts.
    pub fn message(&self) -> (u8, &[u8]) {
        (self.cmd, &self.payload)
    }

    fn ordinary(&mut self, byte: u8) {
        match self.state {
            DecodeState::ReadingCommand => {
                self.cmd = byte;
                self.payload.clear();
                self.state = DecodeState::InMessage;
            }
            DecodeState::InMessage => {
                if self.payload.push(byte).is_err() {
                    panic!("message payload exceeded MAX_PAYLOAD_LEN");
                }
            }
            // noise between messages
            DecodeState::WaitingForStart => {}
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    fn encode_to_vec(cmd: u8, payload: &[u8]) -> Vec<u8> {
        let mut wire = Vec::new();
        encode(cmd, payload, &mut |b| wire.push(b));
        wire
    }

    /// Feeds `wire` through a decoder, returning every completed message.
    fn decode_all(decoder: &mut Decoder, wire: &[u8]) -> Vec<(u8, Vec<u8>)> {
        let mut messages = Vec::new();
        for &b in wire {
            if decoder.feed(b) == Step::Complete {
                let (cmd, payload) = decoder.message();
                messages.push((cmd, payload.to_vec()));
            }
        }
        messages
    }

    #[test]
    fn test_wire_example() {
        // command 1 carrying "AT": the stuffing pair lands between A and T
        let wire = encode_to_vec(1, b"AT");
        assert_eq!(wire, [b'&', b'J', 0x01, b'A', b'&', b'_', b'T', b'&', b'X']);
    }

    #[test]
    fn test_stuffing_across_command_id_boundary() {
        // a command id of 'A' followed by a 'T' payload byte would spell
        // AT on the wire without the pair check seeding from the id
        let wire = encode_to_vec(b'A', b"T");
        assert_eq!(wire, [b'&', b'J', b'A', b'&', b'_', b'T', b'&', b'X']);
        let mut decoder = Decoder::new();
        let messages = decode_all(&mut decoder, &wire);
        assert_eq!(messages, [(b'A', b"T".to_vec())]);
    }

    #[test]
    fn test_roundtrip_with_hostile_payload() {
        // prefix bytes, AT, OK, and a doubled prefix right before a T
        let payload = b"x&AT y OK z&&A&T OKO K\x00\xFF&";
        let wire = encode_to_vec(7, payload);
        // the raw stream never contains bare "AT" or "OK"
        assert!(!wire.windows(2).any(|w| w == b"AT" || w == b"OK"));
        let mut decoder = Decoder::new();
        let messages = decode_all(&mut decoder, &wire);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, 7);
        assert_eq!(messages[0].1, payload);
    }

    #[test]
    fn test_plain_payload_encodes_verbatim() {
        // no prefix bytes and no AT/OK pairs: wrapper only
        let payload = b"echo hello, world";
        let wire = encode_to_vec(3, payload);
        assert_eq!(&wire[..3], [b'&', b'J', 3]);
        assert_eq!(&wire[3..wire.len() - 2], payload);
        assert_eq!(&wire[wire.len() - 2..], [b'&', b'X']);
    }

    #[test]
    fn test_escaped_prefix_run_roundtrips() {
        for n in 1..8usize {
            let payload = vec![CTRL_PREFIX; n];
            let wire = encode_to_vec(9, &payload);
            let mut decoder = Decoder::new();
            let messages = decode_all(&mut decoder, &wire);
            assert_eq!(messages.len(), 1, "n = {n}");
            assert_eq!(messages[0].1, payload, "n = {n}");
        }
    }

    #[test]
    fn test_end_without_start_is_ignored() {
        let mut decoder = Decoder::new();
        assert_eq!(decoder.feed(b'&'), Step::Pending);
        assert_eq!(decoder.feed(b'X'), Step::Pending);
        // the machine resynchronized: a following message decodes cleanly
        let messages = decode_all(&mut decoder, &encode_to_vec(4, b"ok?"));
        assert_eq!(messages, [(4, b"ok?".to_vec())]);
    }

    #[test]
    fn test_unknown_control_code_resynchronizes() {
        let mut decoder = Decoder::new();
        // start a message, then hit an unknown control code mid-payload
        for &b in b"&J\x05abc&Q" {
            assert_ne!(decoder.feed(b), Step::Complete);
        }
        // the partial message was dropped; the end code alone completes nothing
        assert_eq!(decoder.feed(b'&'), Step::Pending);
        assert_eq!(decoder.feed(b'X'), Step::Pending);
    }

    #[test]
    fn test_ping_and_echo_steps() {
        let mut decoder = Decoder::new();
        assert_eq!(decoder.feed(b'&'), Step::Pending);
        assert_eq!(decoder.feed(b'P'), Step::Ping);
        assert_eq!(decoder.feed(b'&'), Step::Pending);
        assert_eq!(decoder.feed(b'E'), Step::Echo);
        // control exchanges do not disturb message assembly
        let messages = decode_all(&mut decoder, &encode_to_vec(2, b"later"));
        assert_eq!(messages, [(2, b"later".to_vec())]);
    }

    #[test]
    fn test_ping_inside_message_preserves_payload() {
        let mut decoder = Decoder::new();
        let mut steps = Vec::new();
        for &b in b"&J\x06ab&Pcd&X" {
            steps.push(decoder.feed(b));
        }
        assert_eq!(steps.iter().filter(|s| **s == Step::Ping).count(), 1);
        assert_eq!(steps.last(), Some(&Step::Complete));
        assert_eq!(decoder.message(), (6, &b"abcd"[..]));
    }

    #[test]
    fn test_noise_between_messages_is_discarded() {
        let mut decoder = Decoder::new();
        let mut wire = b"OK+CONN garbage \xF0\x9F".to_vec();
        wire.extend_from_slice(&encode_to_vec(1, b"real"));
        let messages = decode_all(&mut decoder, &wire);
        assert_eq!(messages, [(1, b"real".to_vec())]);
    }

    #[test]
    fn test_restart_discards_partial_message() {
        let mut decoder = Decoder::new();
        let mut wire = b"&J\x08abandoned".to_vec();
        wire.extend_from_slice(&encode_to_vec(9, b"kept"));
        let messages = decode_all(&mut decoder, &wire);
        assert_eq!(messages, [(9, b"kept".to_vec())]);
    }

    #[test]
    fn test_back_to_back_messages() {
        let mut wire = encode_to_vec(1, b"first");
        wire.extend_from_slice(&encode_to_vec(2, b"second"));
        let mut decoder = Decoder::new();
        let messages = decode_all(&mut decoder, &wire);
        assert_eq!(
            messages,
            [(1, b"first".to_vec()), (2, b"second".to_vec())]
        );
    }
}
