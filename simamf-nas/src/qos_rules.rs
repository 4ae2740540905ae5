//! Authorized QoS rules codec, TS 24.501 9.11.4.13
//!
//! ```text
//! rule:    | id (1) | length (2, BE) | op (3b) dqr (1b) #filters (4b) | filters | [precedence (1) | 0 seg (1b) qfi (6b)] |
//! filter:  | 00 direction (2b) id (4b) | components length (1) | components |
//! delete:  | 0000 id (4b) |  (one octet per filter)
//! ```
//!
//! Every length in the buffer is peer controlled, so decoding checks each
//! read and reports the byte offset of the first problem. A rule list is
//! either decoded completely or rejected.

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QosRuleError {
    #[error("truncated at offset {offset}: need {needed} bytes, {available} left")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("unknown packet filter component type 0x{component_type:02x} at offset {offset}")]
    UnknownComponentType { offset: usize, component_type: u8 },

    #[error("invalid rule operation code {code} at offset {offset}")]
    InvalidOperation { offset: usize, code: u8 },

    #[error("length mismatch at offset {offset}: declared {declared}, content {actual}")]
    LengthMismatch {
        offset: usize,
        declared: usize,
        actual: usize,
    },

    #[error("{field} of {value} does not fit its field (max {max})")]
    FieldOverflow {
        field: &'static str,
        value: usize,
        max: usize,
    },
}

/// Rejects `value` when it exceeds the width of `field`.
fn check_width(field: &'static str, value: usize, max: usize) -> Result<(), QosRuleError> {
    if value > max {
        return Err(QosRuleError::FieldOverflow { field, value, max });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum QosRuleOperation {
    Create = 1,
    Delete = 2,
    ModifyAndAddFilters = 3,
    ModifyAndReplaceFilters = 4,
    ModifyAndDeleteFilters = 5,
    ModifyWithoutFilterChange = 6,
}

impl QosRuleOperation {
    /// Operations whose filters carry direction and components.
    pub fn carries_full_filters(self) -> bool {
        matches!(
            self,
            Self::Create | Self::ModifyAndAddFilters | Self::ModifyAndReplaceFilters
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketFilterDirection {
    Reserved,
    DownlinkOnly,
    UplinkOnly,
    Bidirectional,
}

impl PacketFilterDirection {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            1 => Self::DownlinkOnly,
            2 => Self::UplinkOnly,
            3 => Self::Bidirectional,
            _ => Self::Reserved,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Self::Reserved => 0,
            Self::DownlinkOnly => 1,
            Self::UplinkOnly => 2,
            Self::Bidirectional => 3,
        }
    }
}

/// One typed packet filter component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PacketFilterComponent {
    MatchAll,
    Ipv4Remote { addr: Ipv4Addr, mask: Ipv4Addr },
    Ipv4Local { addr: Ipv4Addr, mask: Ipv4Addr },
    Ipv6Remote { addr: Ipv6Addr, prefix_len: u8 },
    Ipv6Local { addr: Ipv6Addr, prefix_len: u8 },
    /// Protocol identifier (IPv4) or next header (IPv6)
    ProtocolId(u8),
    SingleLocalPort(u16),
    LocalPortRange { low: u16, high: u16 },
    SingleRemotePort(u16),
    RemotePortRange { low: u16, high: u16 },
    SecurityParameterIndex(u32),
    TypeOfService { class: u8, mask: u8 },
    /// 20-bit flow label carried in 3 octets
    FlowLabel(u32),
    DestinationMac([u8; 6]),
    SourceMac([u8; 6]),
    CTagVid(u16),
    STagVid(u16),
    CTagPcpDei { pcp: u8, dei: u8 },
    STagPcpDei { pcp: u8, dei: u8 },
    Ethertype(u16),
}

mod component_type {
    pub const MATCH_ALL: u8 = 0x01;
    pub const IPV4_REMOTE: u8 = 0x10;
    pub const IPV4_LOCAL: u8 = 0x11;
    pub const IPV6_REMOTE: u8 = 0x21;
    pub const IPV6_LOCAL: u8 = 0x23;
    pub const PROTOCOL_ID: u8 = 0x30;
    pub const SINGLE_LOCAL_PORT: u8 = 0x40;
    pub const LOCAL_PORT_RANGE: u8 = 0x41;
    pub const SINGLE_REMOTE_PORT: u8 = 0x50;
    pub const REMOTE_PORT_RANGE: u8 = 0x51;
    pub const SPI: u8 = 0x60;
    pub const TOS: u8 = 0x70;
    pub const FLOW_LABEL: u8 = 0x80;
    pub const DEST_MAC: u8 = 0x81;
    pub const SOURCE_MAC: u8 = 0x82;
    pub const CTAG_VID: u8 = 0x83;
    pub const STAG_VID: u8 = 0x84;
    pub const CTAG_PCP_DEI: u8 = 0x85;
    pub const STAG_PCP_DEI: u8 = 0x86;
    pub const ETHERTYPE: u8 = 0x87;
}

/// Value length for a component type, `None` when the type is unknown.
fn component_value_len(component_type: u8) -> Option<usize> {
    use component_type::*;
    let len = match component_type {
        MATCH_ALL => 0,
        IPV4_REMOTE | IPV4_LOCAL => 8,
        IPV6_REMOTE | IPV6_LOCAL => 17,
        PROTOCOL_ID => 1,
        SINGLE_LOCAL_PORT | SINGLE_REMOTE_PORT => 2,
        LOCAL_PORT_RANGE | REMOTE_PORT_RANGE => 4,
        SPI => 4,
        TOS => 2,
        FLOW_LABEL => 3,
        DEST_MAC | SOURCE_MAC => 6,
        CTAG_VID | STAG_VID => 2,
        CTAG_PCP_DEI | STAG_PCP_DEI => 2,
        ETHERTYPE => 2,
        _ => return None,
    };
    Some(len)
}

impl PacketFilterComponent {
    pub fn type_code(&self) -> u8 {
        use component_type::*;
        match self {
            Self::MatchAll => MATCH_ALL,
            Self::Ipv4Remote { .. } => IPV4_REMOTE,
            Self::Ipv4Local { .. } => IPV4_LOCAL,
            Self::Ipv6Remote { .. } => IPV6_REMOTE,
            Self::Ipv6Local { .. } => IPV6_LOCAL,
            Self::ProtocolId(_) => PROTOCOL_ID,
            Self::SingleLocalPort(_) => SINGLE_LOCAL_PORT,
            Self::LocalPortRange { .. } => LOCAL_PORT_RANGE,
            Self::SingleRemotePort(_) => SINGLE_REMOTE_PORT,
            Self::RemotePortRange { .. } => REMOTE_PORT_RANGE,
            Self::SecurityParameterIndex(_) => SPI,
            Self::TypeOfService { .. } => TOS,
            Self::FlowLabel(_) => FLOW_LABEL,
            Self::DestinationMac(_) => DEST_MAC,
            Self::SourceMac(_) => SOURCE_MAC,
            Self::CTagVid(_) => CTAG_VID,
            Self::STagVid(_) => STAG_VID,
            Self::CTagPcpDei { .. } => CTAG_PCP_DEI,
            Self::STagPcpDei { .. } => STAG_PCP_DEI,
            Self::Ethertype(_) => ETHERTYPE,
        }
    }

    fn encode(&self, out: &mut BytesMut) {
        out.put_u8(self.type_code());
        match self {
            Self::MatchAll => {}
            Self::Ipv4Remote { addr, mask } | Self::Ipv4Local { addr, mask } => {
                out.put_slice(&addr.octets());
                out.put_slice(&mask.octets());
            }
            Self::Ipv6Remote { addr, prefix_len } | Self::Ipv6Local { addr, prefix_len } => {
                out.put_slice(&addr.octets());
                out.put_u8(*prefix_len);
            }
            Self::ProtocolId(v) => out.put_u8(*v),
            Self::SingleLocalPort(p) | Self::SingleRemotePort(p) => out.put_u16(*p),
            Self::LocalPortRange { low, high } | Self::RemotePortRange { low, high } => {
                out.put_u16(*low);
                out.put_u16(*high);
            }
            Self::SecurityParameterIndex(spi) => out.put_u32(*spi),
            Self::TypeOfService { class, mask } => {
                out.put_u8(*class);
                out.put_u8(*mask);
            }
            Self::FlowLabel(label) => out.put_slice(&label.to_be_bytes()[1..]),
            Self::DestinationMac(mac) | Self::SourceMac(mac) => out.put_slice(mac),
            Self::CTagVid(vid) | Self::STagVid(vid) => out.put_u16(*vid),
            Self::CTagPcpDei { pcp, dei } | Self::STagPcpDei { pcp, dei } => {
                out.put_u8(*pcp);
                out.put_u8(*dei);
            }
            Self::Ethertype(t) => out.put_u16(*t),
        }
    }

    /// Decodes one component from a value slice already sized by the type.
    fn from_value(component_type: u8, v: &[u8]) -> Self {
        use component_type::*;
        let u16_at = |i: usize| u16::from_be_bytes([v[i], v[i + 1]]);
        let ipv4_at = |i: usize| Ipv4Addr::new(v[i], v[i + 1], v[i + 2], v[i + 3]);
        let ipv6 = || {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&v[..16]);
            Ipv6Addr::from(octets)
        };
        let mac = || {
            let mut m = [0u8; 6];
            m.copy_from_slice(&v[..6]);
            m
        };
        match component_type {
            IPV4_REMOTE => Self::Ipv4Remote {
                addr: ipv4_at(0),
                mask: ipv4_at(4),
            },
            IPV4_LOCAL => Self::Ipv4Local {
                addr: ipv4_at(0),
                mask: ipv4_at(4),
            },
            IPV6_REMOTE => Self::Ipv6Remote {
                addr: ipv6(),
                prefix_len: v[16],
            },
            IPV6_LOCAL => Self::Ipv6Local {
                addr: ipv6(),
                prefix_len: v[16],
            },
            PROTOCOL_ID => Self::ProtocolId(v[0]),
            SINGLE_LOCAL_PORT => Self::SingleLocalPort(u16_at(0)),
            LOCAL_PORT_RANGE => Self::LocalPortRange {
                low: u16_at(0),
                high: u16_at(2),
            },
            SINGLE_REMOTE_PORT => Self::SingleRemotePort(u16_at(0)),
            REMOTE_PORT_RANGE => Self::RemotePortRange {
                low: u16_at(0),
                high: u16_at(2),
            },
            SPI => Self::SecurityParameterIndex(u32::from_be_bytes([v[0], v[1], v[2], v[3]])),
            TOS => Self::TypeOfService {
                class: v[0],
                mask: v[1],
            },
            FLOW_LABEL => Self::FlowLabel(u32::from_be_bytes([0, v[0], v[1], v[2]])),
            DEST_MAC => Self::DestinationMac(mac()),
            SOURCE_MAC => Self::SourceMac(mac()),
            CTAG_VID => Self::CTagVid(u16_at(0)),
            STAG_VID => Self::STagVid(u16_at(0)),
            CTAG_PCP_DEI => Self::CTagPcpDei {
                pcp: v[0],
                dei: v[1],
            },
            STAG_PCP_DEI => Self::STagPcpDei {
                pcp: v[0],
                dei: v[1],
            },
            ETHERTYPE => Self::Ethertype(u16_at(0)),
            _ => Self::MatchAll,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PacketFilter {
    /// Absent for modify-and-delete-filters, where only ids are listed.
    pub direction: Option<PacketFilterDirection>,
    /// 4-bit packet filter identifier
    pub id: u8,
    pub components: Vec<PacketFilterComponent>,
}

impl PacketFilter {
    pub fn new(direction: PacketFilterDirection, id: u8) -> Self {
        Self {
            direction: Some(direction),
            id: id & 0x0F,
            components: Vec::new(),
        }
    }

    pub fn with_component(mut self, component: PacketFilterComponent) -> Self {
        self.components.push(component);
        self
    }
}

/// Precedence and flow binding trailer of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QosFlowBinding {
    pub precedence: u8,
    pub segregation: bool,
    /// 6-bit QoS flow identifier
    pub qfi: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QosRule {
    pub id: u8,
    pub operation: QosRuleOperation,
    /// Default QoS rule flag
    pub dqr: bool,
    pub filters: Vec<PacketFilter>,
    pub binding: Option<QosFlowBinding>,
}

impl QosRule {
    /// Appends the rule to `out`. Counts and lengths wider than their
    /// fields are rejected and leave `out` untouched.
    pub fn encode(&self, out: &mut BytesMut) -> Result<(), QosRuleError> {
        check_width("packet filter count", self.filters.len(), 0x0F)?;
        let full_filters = self.operation.carries_full_filters();
        if !full_filters && self.operation != QosRuleOperation::ModifyAndDeleteFilters {
            check_width("packet filter count", self.filters.len(), 0)?;
        }

        let mut content = BytesMut::new();
        let op: u8 = self.operation.into();
        content.put_u8((op << 5) | ((self.dqr as u8) << 4) | self.filters.len() as u8);

        for filter in &self.filters {
            check_width("packet filter id", usize::from(filter.id), 0x0F)?;
            if !full_filters {
                content.put_u8(filter.id);
                continue;
            }
            let direction = filter.direction.unwrap_or(PacketFilterDirection::Reserved);
            content.put_u8((direction.bits() << 4) | filter.id);
            let mut components = BytesMut::new();
            for component in &filter.components {
                component.encode(&mut components);
            }
            check_width("packet filter contents length", components.len(), 0xFF)?;
            content.put_u8(components.len() as u8);
            content.put_slice(&components);
        }

        if let Some(binding) = self.binding {
            check_width("QFI", usize::from(binding.qfi), 0x3F)?;
            content.put_u8(binding.precedence);
            content.put_u8(((binding.segregation as u8) << 6) | binding.qfi);
        }

        check_width("QoS rule length", content.len(), 0xFFFF)?;
        out.put_u8(self.id);
        out.put_u16(content.len() as u16);
        out.put_slice(&content);
        Ok(())
    }
}

/// Bounds-checked reader that tracks the absolute offset for errors.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], QosRuleError> {
        if self.remaining() < n {
            return Err(QosRuleError::Truncated {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, QosRuleError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, QosRuleError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }
}

/// Decodes the full value of an Authorized QoS rules IE.
pub fn decode_qos_rules(buf: &[u8]) -> Result<Vec<QosRule>, QosRuleError> {
    let mut cursor = Cursor::new(buf);
    let mut rules = Vec::new();
    while cursor.remaining() > 0 {
        rules.push(decode_rule(&mut cursor)?);
    }
    Ok(rules)
}

fn decode_rule(cursor: &mut Cursor<'_>) -> Result<QosRule, QosRuleError> {
    let id = cursor.u8()?;
    let declared = cursor.u16()? as usize;
    let content_start = cursor.pos;
    if cursor.remaining() < declared {
        return Err(QosRuleError::LengthMismatch {
            offset: content_start - 2,
            declared,
            actual: cursor.remaining(),
        });
    }
    let content_end = content_start + declared;

    let header_offset = cursor.pos;
    let header = cursor.u8()?;
    let code = header >> 5;
    let operation = QosRuleOperation::try_from(code).map_err(|_| QosRuleError::InvalidOperation {
        offset: header_offset,
        code,
    })?;
    let dqr = header & 0x10 != 0;
    let filter_count = (header & 0x0F) as usize;

    let mut filters = Vec::with_capacity(filter_count);
    if operation == QosRuleOperation::ModifyAndDeleteFilters {
        for _ in 0..filter_count {
            filters.push(PacketFilter {
                direction: None,
                id: cursor.u8()? & 0x0F,
                components: Vec::new(),
            });
        }
    } else if operation.carries_full_filters() {
        for _ in 0..filter_count {
            filters.push(decode_filter(cursor)?);
        }
    } else if filter_count != 0 {
        return Err(QosRuleError::LengthMismatch {
            offset: header_offset,
            declared: 0,
            actual: filter_count,
        });
    }

    if cursor.pos > content_end {
        return Err(QosRuleError::LengthMismatch {
            offset: content_start - 2,
            declared,
            actual: cursor.pos - content_start,
        });
    }

    let binding = match content_end - cursor.pos {
        0 => None,
        2 => {
            let precedence = cursor.u8()?;
            let flow = cursor.u8()?;
            Some(QosFlowBinding {
                precedence,
                segregation: flow & 0x40 != 0,
                qfi: flow & 0x3F,
            })
        }
        extra => {
            return Err(QosRuleError::LengthMismatch {
                offset: cursor.pos,
                declared: 2,
                actual: extra,
            })
        }
    };

    Ok(QosRule {
        id,
        operation,
        dqr,
        filters,
        binding,
    })
}

fn decode_filter(cursor: &mut Cursor<'_>) -> Result<PacketFilter, QosRuleError> {
    let head = cursor.u8()?;
    let components_len = cursor.u8()? as usize;
    let base = cursor.pos;
    let raw = cursor.take(components_len)?;

    let mut components = Vec::new();
    let mut at = 0;
    while at < raw.len() {
        let component_type = raw[at];
        let offset = base + at;
        let value_len = component_value_len(component_type).ok_or(
            QosRuleError::UnknownComponentType {
                offset,
                component_type,
            },
        )?;
        let value_start = at + 1;
        if raw.len() - value_start < value_len {
            return Err(QosRuleError::Truncated {
                offset: offset + 1,
                needed: value_len,
                available: raw.len() - value_start,
            });
        }
        components.push(PacketFilterComponent::from_value(
            component_type,
            &raw[value_start..value_start + value_len],
        ));
        at = value_start + value_len;
    }

    Ok(PacketFilter {
        direction: Some(PacketFilterDirection::from_bits(head >> 4)),
        id: head & 0x0F,
        components,
    })
}

/// Encodes rules back into an Authorized QoS rules IE value.
pub fn encode_qos_rules(rules: &[QosRule]) -> Result<Vec<u8>, QosRuleError> {
    let mut out = BytesMut::new();
    for rule in rules {
        rule.encode(&mut out)?;
    }
    check_width("QoS rules length", out.len(), 0xFFFF)?;
    Ok(out.to_vec())
}
