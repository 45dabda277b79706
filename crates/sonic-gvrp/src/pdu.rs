//! GVRP PDU encoding and decoding.
//!
//! Frame layout (802.3 with LLC):
//!
//! ```text
//! dst(6) src(6) length(2) LLC 42 42 03 | ProtocolID 00 01 | AttributeType 01
//!   Attribute* EndMark | EndMark
//! Ordinary attribute: length=4 event vid(2, big endian)
//! LeaveAll attribute: length=2 event=0
//! ```

use crate::error::PduError;
use crate::types::{AttributeEvent, Vid};

/// GVRP group address.
pub const GVRP_GROUP_ADDRESS: [u8; 6] = [0x01, 0x80, 0xC2, 0x00, 0x00, 0x21];

pub const LLC_HEADER: [u8; 3] = [0x42, 0x42, 0x03];

pub const GARP_PROTOCOL_ID: u16 = 0x0001;

pub const GVRP_ATTRIBUTE_TYPE: u8 = 0x01;

/// Bytes before the first attribute.
pub const HEADER_LEN: usize = 20;

/// Largest frame the encoder produces.
pub const MAX_PDU_SIZE: usize = 1514;

/// Frames shorter than this are zero padded.
pub const MIN_FRAME_SIZE: usize = 64;

const MAC_HEADER_LEN: usize = 14;
const END_MARK: u8 = 0x00;
// Attribute list end mark plus PDU end mark.
const TRAILER_LEN: usize = 2;
const ORDINARY_LEN: u8 = 4;
const LEAVE_ALL_LEN: u8 = 2;

/// A decoded or to-be-encoded GVRP attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Ordinary { event: AttributeEvent, vid: Vid },
    LeaveAll,
}

impl Attribute {
    pub fn encoded_len(&self) -> usize {
        match self {
            Attribute::Ordinary { .. } => usize::from(ORDINARY_LEN),
            Attribute::LeaveAll => usize::from(LEAVE_ALL_LEN),
        }
    }

    fn write(&self, buf: &mut Vec<u8>) {
        match self {
            Attribute::Ordinary { event, vid } => {
                buf.push(ORDINARY_LEN);
                buf.push(event.code());
                buf.extend_from_slice(&vid.as_u16().to_be_bytes());
            }
            Attribute::LeaveAll => {
                buf.push(LEAVE_ALL_LEN);
                buf.push(AttributeEvent::LeaveAll.code());
            }
        }
    }
}

/// Packs attributes into frames of at most `max_size` bytes.
///
/// [`PduEncoder::push`] hands back a finished frame whenever the next
/// attribute does not fit; [`PduEncoder::finish`] returns the last one.
#[derive(Debug)]
pub struct PduEncoder {
    source: [u8; 6],
    max_size: usize,
    frame: Vec<u8>,
    attributes: usize,
}

impl PduEncoder {
    pub fn new(source: [u8; 6]) -> Self {
        Self::with_max_size(source, MAX_PDU_SIZE)
    }

    /// Encoder with a smaller frame limit. The limit is raised to fit at
    /// least one attribute.
    pub fn with_max_size(source: [u8; 6], max_size: usize) -> Self {
        let floor = HEADER_LEN + usize::from(ORDINARY_LEN) + TRAILER_LEN;
        Self {
            source,
            max_size: max_size.clamp(floor, MAX_PDU_SIZE),
            frame: Vec::new(),
            attributes: 0,
        }
    }

    pub fn push(&mut self, attribute: Attribute) -> Option<Vec<u8>> {
        let mut sealed = None;
        if self.attributes > 0
            && self.frame.len() + attribute.encoded_len() + TRAILER_LEN > self.max_size
        {
            sealed = Some(self.seal());
        }
        if self.attributes == 0 {
            self.start_frame();
        }
        attribute.write(&mut self.frame);
        self.attributes += 1;
        sealed
    }

    /// Returns the frame in progress, if it carries any attribute.
    pub fn finish(mut self) -> Option<Vec<u8>> {
        (self.attributes > 0).then(|| self.seal())
    }

    fn start_frame(&mut self) {
        self.frame.clear();
        self.frame.reserve(self.max_size);
        self.frame.extend_from_slice(&GVRP_GROUP_ADDRESS);
        self.frame.extend_from_slice(&self.source);
        // Length, patched in seal().
        self.frame.extend_from_slice(&[0, 0]);
        self.frame.extend_from_slice(&LLC_HEADER);
        self.frame.extend_from_slice(&GARP_PROTOCOL_ID.to_be_bytes());
        self.frame.push(GVRP_ATTRIBUTE_TYPE);
    }

    fn seal(&mut self) -> Vec<u8> {
        self.frame.push(END_MARK);
        self.frame.push(END_MARK);
        let length = (self.frame.len() - MAC_HEADER_LEN) as u16;
        self.frame[12..14].copy_from_slice(&length.to_be_bytes());
        if self.frame.len() < MIN_FRAME_SIZE {
            self.frame.resize(MIN_FRAME_SIZE, 0);
        }
        self.attributes = 0;
        std::mem::take(&mut self.frame)
    }
}

/// Encodes a list of attributes into as many frames as needed.
pub fn encode_pdus(source: [u8; 6], attributes: &[Attribute]) -> Vec<Vec<u8>> {
    let mut encoder = PduEncoder::new(source);
    let mut frames: Vec<Vec<u8>> = attributes
        .iter()
        .filter_map(|attribute| encoder.push(*attribute))
        .collect();
    frames.extend(encoder.finish());
    frames
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Message,
    Attribute,
    Done,
}

/// Streaming decoder over the attributes of one frame.
///
/// Yields attributes in wire order. After the first error it yields that
/// error and then stops.
#[derive(Debug)]
pub struct PduDecoder<'a> {
    body: &'a [u8],
    pos: usize,
    expect: Expect,
}

/// Validates the frame header and returns a decoder over its attributes.
///
/// `frame` starts at the destination MAC. The 802.3 length field bounds
/// the PDU, so trailing padding is ignored.
pub fn decode_pdu(frame: &[u8]) -> Result<PduDecoder<'_>, PduError> {
    if frame.len() < MAC_HEADER_LEN + LLC_HEADER.len() + 2 {
        return Err(PduError::TooShort(frame.len()));
    }

    let length = usize::from(u16::from_be_bytes([frame[12], frame[13]]));
    let end = frame.len().min(MAC_HEADER_LEN + length);
    let start = MAC_HEADER_LEN + LLC_HEADER.len();
    if end < start + 2 {
        return Err(PduError::TooShort(end));
    }

    let body = &frame[start..end];
    let protocol_id = u16::from_be_bytes([body[0], body[1]]);
    if protocol_id != GARP_PROTOCOL_ID {
        return Err(PduError::BadProtocolId(protocol_id));
    }

    Ok(PduDecoder {
        body,
        pos: 2,
        expect: Expect::Message,
    })
}

impl PduDecoder<'_> {
    fn fail(&mut self, error: PduError) -> Option<Result<Attribute, PduError>> {
        self.expect = Expect::Done;
        Some(Err(error))
    }

    fn byte(&self, offset: usize) -> Option<u8> {
        self.body.get(self.pos + offset).copied()
    }
}

impl Iterator for PduDecoder<'_> {
    type Item = Result<Attribute, PduError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.expect {
                Expect::Done => return None,
                Expect::Message => {
                    let Some(attribute_type) = self.byte(0) else {
                        self.expect = Expect::Done;
                        return None;
                    };
                    self.pos += 1;
                    if attribute_type == END_MARK {
                        self.expect = Expect::Done;
                        return None;
                    }
                    if attribute_type != GVRP_ATTRIBUTE_TYPE {
                        return self.fail(PduError::BadAttributeType(attribute_type));
                    }
                    self.expect = Expect::Attribute;
                }
                Expect::Attribute => {
                    let Some(length) = self.byte(0) else {
                        self.expect = Expect::Done;
                        return None;
                    };
                    if length == END_MARK {
                        self.pos += 1;
                        self.expect = Expect::Message;
                        continue;
                    }

                    let offset = self.pos;
                    let Some(event) = self.byte(1) else {
                        return self.fail(PduError::Truncated(offset));
                    };

                    return match length {
                        ORDINARY_LEN => {
                            let (Some(hi), Some(lo)) = (self.byte(2), self.byte(3)) else {
                                return self.fail(PduError::Truncated(offset));
                            };
                            let raw_vid = u16::from_be_bytes([hi, lo]);
                            let Ok(vid) = Vid::new(raw_vid) else {
                                return self.fail(PduError::InvalidVid(raw_vid));
                            };
                            let event = match AttributeEvent::try_from(event) {
                                Ok(AttributeEvent::LeaveAll) | Err(_) => {
                                    return self.fail(PduError::InvalidEvent(event));
                                }
                                Ok(event) => event,
                            };
                            self.pos += usize::from(ORDINARY_LEN);
                            Some(Ok(Attribute::Ordinary { event, vid }))
                        }
                        LEAVE_ALL_LEN => {
                            if event != AttributeEvent::LeaveAll.code() {
                                return self.fail(PduError::BadLeaveAllEvent(event));
                            }
                            self.pos += usize::from(LEAVE_ALL_LEN);
                            Some(Ok(Attribute::LeaveAll))
                        }
                        other => self.fail(PduError::BadAttributeLength(other)),
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SRC: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];

    fn join(vid: u16) -> Attribute {
        Attribute::Ordinary {
            event: AttributeEvent::JoinIn,
            vid: Vid::new(vid).unwrap(),
        }
    }

    fn frame_with_body(body: &[u8]) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&GVRP_GROUP_ADDRESS);
        frame.extend_from_slice(&SRC);
        let length = (LLC_HEADER.len() + body.len()) as u16;
        frame.extend_from_slice(&length.to_be_bytes());
        frame.extend_from_slice(&LLC_HEADER);
        frame.extend_from_slice(body);
        frame
    }

    fn decode_all(frame: &[u8]) -> (Vec<Attribute>, Option<PduError>) {
        let mut attributes = Vec::new();
        for item in decode_pdu(frame).unwrap() {
            match item {
                Ok(attribute) => attributes.push(attribute),
                Err(e) => return (attributes, Some(e)),
            }
        }
        (attributes, None)
    }

    #[test]
    fn test_encode_single_join_layout() {
        let frames = encode_pdus(SRC, &[join(10)]);
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];

        assert_eq!(frame.len(), MIN_FRAME_SIZE);
        assert_eq!(&frame[0..6], &GVRP_GROUP_ADDRESS);
        assert_eq!(&frame[6..12], &SRC);
        // header 20 + attribute 4 + end marks 2 = 26 bytes, minus 14.
        assert_eq!(&frame[12..14], &[0x00, 12]);
        assert_eq!(&frame[14..20], &[0x42, 0x42, 0x03, 0x00, 0x01, 0x01]);
        assert_eq!(&frame[20..26], &[4, 2, 0x00, 0x0A, 0, 0]);
    }

    #[test]
    fn test_encode_leave_all() {
        let frames = encode_pdus(SRC, &[Attribute::LeaveAll, join(4094)]);
        assert_eq!(&frames[0][20..28], &[2, 0, 4, 2, 0x0F, 0xFE, 0, 0]);
    }

    #[test]
    fn test_encoder_empty_finish() {
        assert!(PduEncoder::new(SRC).finish().is_none());
    }

    #[test]
    fn test_roundtrip_with_split() {
        let attributes: Vec<Attribute> = std::iter::once(Attribute::LeaveAll)
            .chain((1..=500).map(join))
            .collect();

        let frames = encode_pdus(SRC, &attributes);
        assert!(frames.len() > 1);
        assert!(frames.iter().all(|f| f.len() <= MAX_PDU_SIZE));

        let decoded: Vec<Attribute> = frames
            .iter()
            .flat_map(|frame| {
                let (attributes, error) = decode_all(frame);
                assert_eq!(error, None);
                attributes
            })
            .collect();
        assert_eq!(decoded, attributes);
    }

    #[test]
    fn test_split_point_with_small_limit() {
        // Room for exactly two ordinary attributes per frame.
        let mut encoder = PduEncoder::with_max_size(SRC, HEADER_LEN + 8 + 2);
        assert!(encoder.push(join(1)).is_none());
        assert!(encoder.push(join(2)).is_none());
        let first = encoder.push(join(3)).unwrap();
        let last = encoder.finish().unwrap();

        assert_eq!(decode_all(&first).0, vec![join(1), join(2)]);
        assert_eq!(decode_all(&last).0, vec![join(3)]);
    }

    #[test]
    fn test_decode_rejects_vid_zero_and_4095() {
        for raw in [0u16, 4095] {
            let [hi, lo] = raw.to_be_bytes();
            let frame = frame_with_body(&[0, 1, 1, 4, 2, hi, lo, 0, 0]);
            let (attributes, error) = decode_all(&frame);
            assert!(attributes.is_empty());
            assert_eq!(error, Some(PduError::InvalidVid(raw)));
        }
    }

    #[test]
    fn test_decode_rejects_leave_all_with_event() {
        let frame = frame_with_body(&[0, 1, 1, 2, 3, 0, 0]);
        assert_eq!(decode_all(&frame).1, Some(PduError::BadLeaveAllEvent(3)));
    }

    #[test]
    fn test_decode_rejects_bad_event() {
        let frame = frame_with_body(&[0, 1, 1, 4, 6, 0, 10, 0, 0]);
        assert_eq!(decode_all(&frame).1, Some(PduError::InvalidEvent(6)));

        let frame = frame_with_body(&[0, 1, 1, 4, 0, 0, 10, 0, 0]);
        assert_eq!(decode_all(&frame).1, Some(PduError::InvalidEvent(0)));
    }

    #[test]
    fn test_decode_truncated_attribute() {
        // Length 4 but only the event byte follows.
        let frame = frame_with_body(&[0, 1, 1, 4, 2]);
        assert_eq!(decode_all(&frame).1, Some(PduError::Truncated(3)));

        let frame = frame_with_body(&[0, 1, 1, 4, 2, 0]);
        assert_eq!(decode_all(&frame).1, Some(PduError::Truncated(3)));
    }

    #[test]
    fn test_decode_keeps_attributes_before_error() {
        let frame = frame_with_body(&[0, 1, 1, 4, 2, 0, 10, 4, 2, 0, 0, 4, 2, 0, 20, 0, 0]);
        let (attributes, error) = decode_all(&frame);
        assert_eq!(attributes, vec![join(10)]);
        assert_eq!(error, Some(PduError::InvalidVid(0)));
    }

    #[test]
    fn test_decode_header_errors() {
        assert_eq!(decode_pdu(&[0u8; 10]).unwrap_err(), PduError::TooShort(10));

        let frame = frame_with_body(&[0, 2, 1, 4, 2, 0, 10, 0, 0]);
        assert_eq!(decode_pdu(&frame).unwrap_err(), PduError::BadProtocolId(2));

        let frame = frame_with_body(&[0, 1, 7, 4, 2, 0, 10, 0, 0]);
        assert_eq!(decode_all(&frame).1, Some(PduError::BadAttributeType(7)));

        let frame = frame_with_body(&[0, 1, 1, 3, 2, 0, 0]);
        assert_eq!(decode_all(&frame).1, Some(PduError::BadAttributeLength(3)));
    }

    #[test]
    fn test_decode_ignores_padding_past_length() {
        let mut frame = frame_with_body(&[0, 1, 1, 4, 1, 0, 7]);
        frame.extend_from_slice(&[0xFF; 20]);
        let (attributes, error) = decode_all(&frame);
        assert_eq!(error, None);
        assert_eq!(
            attributes,
            vec![Attribute::Ordinary {
                event: AttributeEvent::JoinEmpty,
                vid: Vid::new(7).unwrap()
            }]
        );
    }
}
