use tracing::trace;

use crate::codec::{
    self, decode_logical, encoded_len, FrameKind, MAX_LOGICAL, MAX_PAYLOAD, MAX_RAW, START_MARKER,
};

/// A fully decoded inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The peer wants `size` bytes of the variable at `index`.
    ReadRequest { index: u8, size: u8 },
    /// The peer answered a read request.
    ReadResponse {
        index: u8,
        data: [u8; MAX_PAYLOAD],
        len: u8,
    },
    /// The peer wants the payload stored into the variable at `index`.
    WriteRequest {
        index: u8,
        data: [u8; MAX_PAYLOAD],
        len: u8,
    },
    /// The peer wants the function at `index` invoked with the payload.
    ExecuteRequest {
        index: u8,
        data: [u8; MAX_PAYLOAD],
        len: u8,
    },
}

/// Byte-at-a-time receive state machine.
///
/// Feed every raw byte from the link through [`push`](FrameReceiver::push).
/// The machine is idle until a byte with the start marker arrives; it then
/// accumulates continuation bytes until the frame's exact raw length is
/// reached and returns the decoded [`Event`].
///
/// A start-marker byte always begins a new frame, even mid-accumulation —
/// whatever was buffered is discarded. That is the protocol's whole
/// recovery mechanism: after any corruption, the next genuine frame start
/// resynchronizes the stream.
#[derive(Debug)]
pub struct FrameReceiver {
    buf: [u8; MAX_RAW],
    count: usize,
    kind: FrameKind,
    payload_cnt: u8,
}

impl FrameReceiver {
    pub fn new() -> Self {
        Self {
            buf: [0; MAX_RAW],
            count: 0,
            kind: FrameKind::ReadResponse,
            payload_cnt: 0,
        }
    }

    /// True when the machine is waiting for a start marker.
    pub fn is_idle(&self) -> bool {
        self.count == 0
    }

    /// Discard any partially accumulated frame.
    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Consume one raw byte; returns the decoded frame if it completed one.
    pub fn push(&mut self, byte: u8) -> Option<Event> {
        if byte & START_MARKER != 0 {
            if self.count > 0 {
                trace!(discarded = self.count, "start marker mid-frame, resyncing");
            }
            self.buf[0] = byte;
            self.count = 1;
            self.kind = FrameKind::from_header(byte);
            self.payload_cnt = codec::payload_count(byte);
            return None;
        }

        if self.count == 0 {
            // Waiting for a start marker; discard stray continuation bytes.
            return None;
        }

        if self.count >= MAX_RAW {
            trace!("frame exceeds maximum raw length, resetting");
            self.reset();
            return None;
        }

        self.buf[self.count] = byte;
        self.count += 1;

        let required = match self.kind {
            // A read request packs only the index; the count field is the
            // requested response size, not transmitted payload.
            FrameKind::ReadRequest => 2,
            _ => encoded_len(self.payload_cnt as usize + 1),
        };
        if self.count < required {
            return None;
        }

        let event = self.complete();
        self.count = 0;
        Some(event)
    }

    fn complete(&self) -> Event {
        let mut logical = [0u8; MAX_LOGICAL];

        if self.kind == FrameKind::ReadRequest {
            decode_logical(&self.buf[..self.count], 1, &mut logical);
            return Event::ReadRequest {
                index: logical[0],
                size: self.payload_cnt,
            };
        }

        let n = self.payload_cnt as usize + 1;
        decode_logical(&self.buf[..self.count], n, &mut logical);

        let index = logical[0];
        let mut data = [0u8; MAX_PAYLOAD];
        data[..n - 1].copy_from_slice(&logical[1..n]);
        let len = self.payload_cnt;

        match self.kind {
            FrameKind::ReadResponse => Event::ReadResponse { index, data, len },
            FrameKind::WriteRequest => Event::WriteRequest { index, data, len },
            FrameKind::ExecuteRequest => Event::ExecuteRequest { index, data, len },
            FrameKind::ReadRequest => unreachable!("handled above"),
        }
    }
}

impl Default for FrameReceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_frame, encode_read_request};

    fn feed(rx: &mut FrameReceiver, bytes: &[u8]) -> Vec<Event> {
        bytes.iter().filter_map(|&b| rx.push(b)).collect()
    }

    #[test]
    fn read_request_completes_at_two_bytes() {
        let mut rx = FrameReceiver::new();
        let frame = encode_read_request(0x45, 4).unwrap();

        assert!(rx.push(frame.as_bytes()[0]).is_none());
        let event = rx.push(frame.as_bytes()[1]).expect("frame complete");

        assert_eq!(event, Event::ReadRequest { index: 0x45, size: 4 });
        assert!(rx.is_idle());
    }

    #[test]
    fn write_frame_roundtrip() {
        let mut rx = FrameReceiver::new();
        let frame = encode_frame(FrameKind::WriteRequest, 200, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();

        let events = feed(&mut rx, frame.as_bytes());
        assert_eq!(events.len(), 1);
        let Event::WriteRequest { index, data, len } = events[0] else {
            panic!("wrong event: {:?}", events[0]);
        };
        assert_eq!(index, 200);
        assert_eq!(len, 4);
        assert_eq!(&data[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn idle_machine_discards_continuation_bytes() {
        let mut rx = FrameReceiver::new();
        assert!(feed(&mut rx, &[0x00, 0x7F, 0x12, 0x34]).is_empty());
        assert!(rx.is_idle());
    }

    #[test]
    fn garbage_then_valid_frame_decodes() {
        let mut rx = FrameReceiver::new();
        let frame = encode_frame(FrameKind::ExecuteRequest, 7, &[1, 2]).unwrap();

        let mut stream = vec![0x13, 0x7E, 0x01];
        stream.extend_from_slice(frame.as_bytes());

        let events = feed(&mut rx, &stream);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::ExecuteRequest { index: 7, len: 2, .. }));
    }

    #[test]
    fn start_marker_mid_frame_discards_partial() {
        let mut rx = FrameReceiver::new();
        let long = encode_frame(FrameKind::WriteRequest, 1, &[9, 9, 9, 9, 9, 9, 9, 9]).unwrap();
        let short = encode_frame(FrameKind::WriteRequest, 2, &[0x55]).unwrap();

        // Half of a large frame, then a complete small one.
        let mut stream = long.as_bytes()[..5].to_vec();
        stream.extend_from_slice(short.as_bytes());

        let events = feed(&mut rx, &stream);
        assert_eq!(events.len(), 1);
        let Event::WriteRequest { index, data, len } = events[0] else {
            panic!("wrong event: {:?}", events[0]);
        };
        assert_eq!((index, len, data[0]), (2, 1, 0x55));
    }

    #[test]
    fn single_payload_byte_completes_at_three() {
        let mut rx = FrameReceiver::new();
        let frame = encode_frame(FrameKind::ReadResponse, 9, &[0x42]).unwrap();
        assert_eq!(frame.len(), 3);

        assert!(rx.push(frame.as_bytes()[0]).is_none());
        assert!(rx.push(frame.as_bytes()[1]).is_none());
        let event = rx.push(frame.as_bytes()[2]).expect("frame complete");
        assert!(matches!(event, Event::ReadResponse { index: 9, len: 1, .. }));
    }

    #[test]
    fn maximum_frame_completes_at_eleven() {
        let mut rx = FrameReceiver::new();
        let payload = [0xA5u8; 8];
        let frame = encode_frame(FrameKind::ReadResponse, 0xFE, &payload).unwrap();
        assert_eq!(frame.len(), MAX_RAW);

        let events = feed(&mut rx, frame.as_bytes());
        assert_eq!(events.len(), 1);
        let Event::ReadResponse { index, data, len } = events[0] else {
            panic!("wrong event: {:?}", events[0]);
        };
        assert_eq!((index, len), (0xFE, 8));
        assert_eq!(data, payload);
    }

    #[test]
    fn back_to_back_frames() {
        let mut rx = FrameReceiver::new();
        let first = encode_frame(FrameKind::WriteRequest, 3, &[0x11, 0x22]).unwrap();
        let second = encode_read_request(4, 2).unwrap();

        let mut stream = first.as_bytes().to_vec();
        stream.extend_from_slice(second.as_bytes());

        let events = feed(&mut rx, &stream);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::WriteRequest { index: 3, len: 2, .. }));
        assert_eq!(events[1], Event::ReadRequest { index: 4, size: 2 });
    }

    #[test]
    fn truncated_frame_then_resync() {
        let mut rx = FrameReceiver::new();
        let frame = encode_frame(FrameKind::WriteRequest, 5, &[1, 2, 3]).unwrap();

        // Drop the tail of the first copy; the second decodes cleanly.
        let cut = frame.len() - 2;
        let mut stream = frame.as_bytes()[..cut].to_vec();
        stream.extend_from_slice(frame.as_bytes());

        let events = feed(&mut rx, &stream);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::WriteRequest { index: 5, len: 3, .. }));
    }
}
