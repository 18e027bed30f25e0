//! Frame header codec and the message-type table.

use bitflags::bitflags;

/// Fixed header size on the wire.
pub const HEADER_LEN: usize = 8;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct FrameFlags: u8 {
        /// Reserved; no codec is currently applied when set.
        const COMPRESSED = 1;
        const REQUEST = 2;
        const RESPONSE = 4;
        const BROADCAST = 8;
    }
}

/// Canonical message types. The discriminants are wire ABI: they must
/// never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    // Control
    Init = 0x00,
    Ready = 0x01,
    Shutdown = 0x02,
    Ping = 0x03,
    Pong = 0x04,
    Error = 0x05,
    Ack = 0x06,
    // Data
    SurfaceFull = 0x10,
    SurfaceDelta = 0x11,
    ChainFull = 0x12,
    ChainDelta = 0x13,
    Timeseries = 0x14,
    Dispersion = 0x15,
    // Widget
    SetData = 0x20,
    AppendData = 0x21,
    Clear = 0x22,
    Scroll = 0x23,
    Focus = 0x24,
    Resize = 0x25,
    SetTitle = 0x26,
    // Events
    Selected = 0x30,
    Clicked = 0x31,
    Submitted = 0x32,
    KeyPressed = 0x33,
    ScrollChanged = 0x34,
    // Render
    RenderRequest = 0x40,
    RenderResult = 0x41,
    // Config
    ConfigUpdate = 0x50,
    WiringUpdate = 0x51,
}

impl MessageType {
    pub const ALL: [MessageType; 29] = [
        MessageType::Init,
        MessageType::Ready,
        MessageType::Shutdown,
        MessageType::Ping,
        MessageType::Pong,
        MessageType::Error,
        MessageType::Ack,
        MessageType::SurfaceFull,
        MessageType::SurfaceDelta,
        MessageType::ChainFull,
        MessageType::ChainDelta,
        MessageType::Timeseries,
        MessageType::Dispersion,
        MessageType::SetData,
        MessageType::AppendData,
        MessageType::Clear,
        MessageType::Scroll,
        MessageType::Focus,
        MessageType::Resize,
        MessageType::SetTitle,
        MessageType::Selected,
        MessageType::Clicked,
        MessageType::Submitted,
        MessageType::KeyPressed,
        MessageType::ScrollChanged,
        MessageType::RenderRequest,
        MessageType::RenderResult,
        MessageType::ConfigUpdate,
        MessageType::WiringUpdate,
    ];

    pub fn from_u8(v: u8) -> Option<MessageType> {
        MessageType::ALL.iter().copied().find(|m| *m as u8 == v)
    }

    /// Canonical upper-snake name, as used in wiring rules and templates.
    pub fn name(self) -> &'static str {
        match self {
            MessageType::Init => "INIT",
            MessageType::Ready => "READY",
            MessageType::Shutdown => "SHUTDOWN",
            MessageType::Ping => "PING",
            MessageType::Pong => "PONG",
            MessageType::Error => "ERROR",
            MessageType::Ack => "ACK",
            MessageType::SurfaceFull => "SURFACE_FULL",
            MessageType::SurfaceDelta => "SURFACE_DELTA",
            MessageType::ChainFull => "CHAIN_FULL",
            MessageType::ChainDelta => "CHAIN_DELTA",
            MessageType::Timeseries => "TIMESERIES",
            MessageType::Dispersion => "DISPERSION",
            MessageType::SetData => "SET_DATA",
            MessageType::AppendData => "APPEND_DATA",
            MessageType::Clear => "CLEAR",
            MessageType::Scroll => "SCROLL",
            MessageType::Focus => "FOCUS",
            MessageType::Resize => "RESIZE",
            MessageType::SetTitle => "SET_TITLE",
            MessageType::Selected => "SELECTED",
            MessageType::Clicked => "CLICKED",
            MessageType::Submitted => "SUBMITTED",
            MessageType::KeyPressed => "KEY_PRESSED",
            MessageType::ScrollChanged => "SCROLL_CHANGED",
            MessageType::RenderRequest => "RENDER_REQUEST",
            MessageType::RenderResult => "RENDER_RESULT",
            MessageType::ConfigUpdate => "CONFIG_UPDATE",
            MessageType::WiringUpdate => "WIRING_UPDATE",
        }
    }

    pub fn from_name(name: &str) -> Option<MessageType> {
        MessageType::ALL.iter().copied().find(|m| m.name() == name)
    }

    /// Event-band types (0x30..0x35): the ones wiring rules route.
    pub fn is_event(self) -> bool {
        matches!(
            self,
            MessageType::Selected
                | MessageType::Clicked
                | MessageType::Submitted
                | MessageType::KeyPressed
                | MessageType::ScrollChanged
        )
    }
}

/// Decoded header. `msg_type` stays a raw byte so unknown types survive
/// the round trip and can be treated as no-ops by receivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub msg_type: u8,
    pub flags: FrameFlags,
    pub seq: u16,
}

impl FrameHeader {
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_u8(self.msg_type)
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.length.to_le_bytes());
        out[4] = self.msg_type;
        out[5] = self.flags.bits();
        out[6..8].copy_from_slice(&self.seq.to_le_bytes());
        out
    }

    /// Decode from exactly [`HEADER_LEN`] bytes. Unknown flag bits are
    /// preserved via `from_bits_retain` for forward compatibility.
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> FrameHeader {
        FrameHeader {
            length: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            msg_type: bytes[4],
            flags: FrameFlags::from_bits_retain(bytes[5]),
            seq: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }
}

/// A complete frame: header plus exactly `header.length` payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn message_type(&self) -> Option<MessageType> {
        self.header.message_type()
    }
}

/// Encode a frame with a known message type.
pub fn encode_frame(msg_type: MessageType, payload: &[u8], flags: FrameFlags, seq: u16) -> Vec<u8> {
    encode_frame_raw(msg_type as u8, payload, flags, seq)
}

/// Encode with a raw type byte (used by tests exercising the unknown-type
/// no-op path and by forwarding code that never interprets the type).
pub fn encode_frame_raw(msg_type: u8, payload: &[u8], flags: FrameFlags, seq: u16) -> Vec<u8> {
    let header = FrameHeader {
        length: payload.len() as u32,
        msg_type,
        flags,
        seq,
    };
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_packed_le() {
        let h = FrameHeader {
            length: 0x0102_0304,
            msg_type: MessageType::SetData as u8,
            flags: FrameFlags::REQUEST | FrameFlags::BROADCAST,
            seq: 0xBEEF,
        };
        let bytes = h.encode();
        assert_eq!(bytes, [0x04, 0x03, 0x02, 0x01, 0x20, 0x0A, 0xEF, 0xBE]);
        assert_eq!(FrameHeader::decode(&bytes), h);
    }

    #[test]
    fn abi_values_are_fixed() {
        assert_eq!(MessageType::Init as u8, 0x00);
        assert_eq!(MessageType::Ack as u8, 0x06);
        assert_eq!(MessageType::SurfaceFull as u8, 0x10);
        assert_eq!(MessageType::Dispersion as u8, 0x15);
        assert_eq!(MessageType::SetData as u8, 0x20);
        assert_eq!(MessageType::SetTitle as u8, 0x26);
        assert_eq!(MessageType::Selected as u8, 0x30);
        assert_eq!(MessageType::ScrollChanged as u8, 0x34);
        assert_eq!(MessageType::RenderRequest as u8, 0x40);
        assert_eq!(MessageType::RenderResult as u8, 0x41);
        assert_eq!(MessageType::ConfigUpdate as u8, 0x50);
        assert_eq!(MessageType::WiringUpdate as u8, 0x51);
    }

    #[test]
    fn type_name_round_trip() {
        for m in MessageType::ALL {
            assert_eq!(MessageType::from_name(m.name()), Some(m));
            assert_eq!(MessageType::from_u8(m as u8), Some(m));
        }
        assert_eq!(MessageType::from_u8(0x7F), None);
        assert_eq!(MessageType::from_name("NOT_A_TYPE"), None);
    }

    #[test]
    fn event_band() {
        assert!(MessageType::Selected.is_event());
        assert!(MessageType::ScrollChanged.is_event());
        assert!(!MessageType::SetData.is_event());
        assert!(!MessageType::Ready.is_event());
    }

    #[test]
    fn unknown_flag_bits_survive() {
        let h = FrameHeader {
            length: 0,
            msg_type: 0,
            flags: FrameFlags::from_bits_retain(0xF0),
            seq: 0,
        };
        let decoded = FrameHeader::decode(&h.encode());
        assert_eq!(decoded.flags.bits(), 0xF0);
    }
}
