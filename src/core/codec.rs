//! Deterministic wire codec for consensus persistence and monitor messages.
//!
//! Integers are little-endian fixed-width; strings are u32-length-prefixed
//! raw UTF-8; enums travel as their i32 wire codes. Maps encode in key
//! order, so encode-decode-encode is byte-stable.

use std::collections::BTreeMap;

use bytes::Bytes;
use thiserror::Error;

use crate::core::beacon::{Beacon, BeaconListener, BeaconNamespace, BeaconSubsystem};
use crate::core::domain::{
    AnaGroupId, Availability, ExportedState, GwAgroupState, MAX_ANA_GROUPS, REDUNDANT_WIRE_ID,
};
use crate::core::error::InvalidId;
use crate::core::fencing::OsdEpoch;
use crate::core::gateway::CreatedGateway;
use crate::core::identity::{GatewayId, GroupKey, Nqn};
use crate::core::map::GwMap;
use crate::core::timer::{TimerCell, TimerSlab};
use crate::core::tunables::Tunables;
use crate::core::view::{AnaStateVector, ExportedGwState, ExportedMap};

/// Malformed payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("payload truncated at offset {offset}: needed {needed} more byte(s)")]
    ShortRead { offset: usize, needed: usize },
    #[error("{what} length {declared} overflows remaining {remaining} byte(s)")]
    LengthOverflow {
        what: &'static str,
        declared: i64,
        remaining: usize,
    },
    #[error("unknown {what} code {code}")]
    UnknownEnum { what: &'static str, code: i64 },
    #[error("string at offset {offset} is not valid utf-8")]
    InvalidUtf8 { offset: usize },
    #[error("{trailing} trailing byte(s) after payload")]
    TrailingBytes { trailing: usize },
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
}

// =============================================================================
// Primitives
// =============================================================================

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_str(&mut self, s: &str) {
        self.put_u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn finish(self) -> Bytes {
        Bytes::from(self.buf)
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::ShortRead {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn get_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn get_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn get_u64(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn get_i32(&mut self) -> Result<i32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn get_str(&mut self, what: &'static str) -> Result<String, DecodeError> {
        let len = self.get_u32()? as usize;
        if len > self.remaining() {
            return Err(DecodeError::LengthOverflow {
                what,
                declared: len as i64,
                remaining: self.remaining(),
            });
        }
        let offset = self.pos;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8 { offset })
    }

    /// Signed list length, as the map payload declares them.
    fn get_len(&mut self, what: &'static str) -> Result<usize, DecodeError> {
        let len = self.get_i32()?;
        if len < 0 {
            return Err(DecodeError::LengthOverflow {
                what,
                declared: len as i64,
                remaining: self.remaining(),
            });
        }
        Ok(len as usize)
    }

    fn finish(self) -> Result<(), DecodeError> {
        if self.remaining() != 0 {
            return Err(DecodeError::TrailingBytes {
                trailing: self.remaining(),
            });
        }
        Ok(())
    }
}

fn get_ana_group(r: &mut Reader<'_>) -> Result<AnaGroupId, DecodeError> {
    let raw = r.get_u32()?;
    u8::try_from(raw)
        .ok()
        .and_then(|v| AnaGroupId::new(v).ok())
        .ok_or(DecodeError::UnknownEnum {
            what: "ana group id",
            code: raw as i64,
        })
}

fn get_owned(r: &mut Reader<'_>) -> Result<Option<AnaGroupId>, DecodeError> {
    let raw = r.get_u32()?;
    if raw == REDUNDANT_WIRE_ID {
        return Ok(None);
    }
    u8::try_from(raw)
        .ok()
        .and_then(|v| AnaGroupId::new(v).ok())
        .map(Some)
        .ok_or(DecodeError::UnknownEnum {
            what: "owned ana group id",
            code: raw as i64,
        })
}

fn put_owned(w: &mut Writer, owned: Option<AnaGroupId>) {
    w.put_u32(owned.map_or(REDUNDANT_WIRE_ID, |g| g.get() as u32));
}

// =============================================================================
// Shared sub-payloads
// =============================================================================

fn put_subsystems(w: &mut Writer, subsystems: &[BeaconSubsystem]) {
    w.put_i32(subsystems.len() as i32);
    for sub in subsystems {
        w.put_str(sub.nqn.as_str());
        w.put_u32(sub.listeners.len() as u32);
        for listener in &sub.listeners {
            w.put_str(&listener.address_family);
            w.put_str(&listener.address);
            w.put_str(&listener.svcid);
        }
        w.put_u32(sub.namespaces.len() as u32);
        for ns in &sub.namespaces {
            w.put_u32(ns.ana_group.get() as u32);
            w.put_str(&ns.nonce);
        }
    }
}

fn get_subsystems(r: &mut Reader<'_>) -> Result<Vec<BeaconSubsystem>, DecodeError> {
    let count = r.get_len("subsystem list")?;
    let mut subsystems = Vec::new();
    for _ in 0..count {
        let nqn = Nqn::new(r.get_str("subsystem nqn")?)?;
        let listener_count = r.get_u32()?;
        let mut listeners = Vec::new();
        for _ in 0..listener_count {
            listeners.push(BeaconListener {
                address_family: r.get_str("listener address family")?,
                address: r.get_str("listener address")?,
                svcid: r.get_str("listener svcid")?,
            });
        }
        let namespace_count = r.get_u32()?;
        let mut namespaces = Vec::new();
        for _ in 0..namespace_count {
            namespaces.push(BeaconNamespace {
                ana_group: get_ana_group(r)?,
                nonce: r.get_str("namespace nonce")?,
            });
        }
        subsystems.push(BeaconSubsystem {
            nqn,
            listeners,
            namespaces,
        });
    }
    Ok(subsystems)
}

fn put_nonce_map(w: &mut Writer, nonce_map: &BTreeMap<AnaGroupId, Vec<String>>) {
    w.put_i32(nonce_map.len() as i32);
    for (group, nonces) in nonce_map {
        w.put_u32(group.get() as u32);
        w.put_u32(nonces.len() as u32);
        for nonce in nonces {
            w.put_str(nonce);
        }
    }
}

fn get_nonce_map(r: &mut Reader<'_>) -> Result<BTreeMap<AnaGroupId, Vec<String>>, DecodeError> {
    let count = r.get_len("nonce map")?;
    let mut nonce_map = BTreeMap::new();
    for _ in 0..count {
        let group = get_ana_group(r)?;
        let nonce_count = r.get_u32()?;
        let mut nonces = Vec::new();
        for _ in 0..nonce_count {
            nonces.push(r.get_str("nonce")?);
        }
        nonce_map.insert(group, nonces);
    }
    Ok(nonce_map)
}

// =============================================================================
// Created gateway record
// =============================================================================

fn put_created_gateway(w: &mut Writer, id: &GatewayId, row: &CreatedGateway) {
    w.put_str(id.as_str());
    put_owned(w, row.owned());
    w.put_i32(row.availability().wire_code());
    put_subsystems(w, row.subsystems());
    put_nonce_map(w, row.nonce_map());
    for group in AnaGroupId::all() {
        w.put_i32(row.state(group).wire_code());
    }
    for group in AnaGroupId::all() {
        w.put_str(row.failover_peer(group).map_or("", |p| p.as_str()));
    }
    for group in AnaGroupId::all() {
        w.put_u32(row.blocklist_epoch(group).get());
    }
}

fn get_created_gateway(r: &mut Reader<'_>) -> Result<(GatewayId, CreatedGateway), DecodeError> {
    let id = GatewayId::new(r.get_str("gateway id")?)?;
    let owned = get_owned(r)?;
    let availability_code = r.get_i32()?;
    let availability =
        Availability::from_wire(availability_code).ok_or(DecodeError::UnknownEnum {
            what: "availability",
            code: availability_code as i64,
        })?;
    let subsystems = get_subsystems(r)?;
    let nonce_map = get_nonce_map(r)?;

    let mut sm_state = [GwAgroupState::Standby; MAX_ANA_GROUPS];
    for state in sm_state.iter_mut() {
        let code = r.get_i32()?;
        *state = GwAgroupState::from_wire(code).ok_or(DecodeError::UnknownEnum {
            what: "gateway state",
            code: code as i64,
        })?;
    }
    let mut failover_peer: [Option<GatewayId>; MAX_ANA_GROUPS] = std::array::from_fn(|_| None);
    for peer in failover_peer.iter_mut() {
        let raw = r.get_str("failover peer")?;
        *peer = if raw.is_empty() {
            None
        } else {
            Some(GatewayId::new(raw)?)
        };
    }
    let mut blocklist_epoch = [OsdEpoch::MAX; MAX_ANA_GROUPS];
    for epoch in blocklist_epoch.iter_mut() {
        *epoch = OsdEpoch::new(r.get_u32()?);
    }

    Ok((
        id,
        CreatedGateway::from_parts(
            owned,
            availability,
            subsystems,
            nonce_map,
            sm_state,
            failover_peer,
            blocklist_epoch,
        ),
    ))
}

// =============================================================================
// Aggregate map payload
// =============================================================================

impl GwMap {
    /// Encode for consensus persistence and inter-monitor shipping.
    pub fn encode(&self) -> Bytes {
        let mut w = Writer::new();
        w.put_u32(self.created.len() as u32);
        for (key, group) in &self.created {
            w.put_str(key.pool());
            w.put_str(key.group());
            w.put_u32(group.len() as u32);
            for (id, row) in group {
                put_created_gateway(&mut w, id, row);
            }
        }
        w.put_u32(self.timers.len() as u32);
        for (key, slabs) in &self.timers {
            w.put_str(key.pool());
            w.put_str(key.group());
            w.put_u32(slabs.len() as u32);
            for (id, slab) in slabs {
                w.put_str(id.as_str());
                for group in AnaGroupId::all() {
                    let cell = slab.cell(group);
                    w.put_u32(cell.ticks_elapsed());
                    w.put_u8(cell.deadline_ticks());
                }
            }
        }
        w.finish()
    }

    pub fn decode(buf: &[u8], tunables: Tunables) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let group_count = r.get_u32()?;
        let mut created = BTreeMap::new();
        for _ in 0..group_count {
            let key = GroupKey::new(r.get_str("pool")?, r.get_str("group")?);
            let gw_count = r.get_u32()?;
            let mut group = BTreeMap::new();
            for _ in 0..gw_count {
                let (id, row) = get_created_gateway(&mut r)?;
                group.insert(id, row);
            }
            created.insert(key, group);
        }
        let timer_group_count = r.get_u32()?;
        let mut timers = BTreeMap::new();
        for _ in 0..timer_group_count {
            let key = GroupKey::new(r.get_str("pool")?, r.get_str("group")?);
            let gw_count = r.get_u32()?;
            let mut slabs = BTreeMap::new();
            for _ in 0..gw_count {
                let id = GatewayId::new(r.get_str("gateway id")?)?;
                let mut cells = [TimerCell::disarmed(); MAX_ANA_GROUPS];
                for cell in cells.iter_mut() {
                    let ticks_elapsed = r.get_u32()?;
                    let deadline_ticks = r.get_u8()?;
                    *cell = TimerCell::from_raw(ticks_elapsed, deadline_ticks);
                }
                slabs.insert(id, TimerSlab::from_cells(cells));
            }
            timers.insert(key, slabs);
        }
        r.finish()?;
        Ok(GwMap::from_parts(created, timers, tunables))
    }
}

// =============================================================================
// Beacon payload
// =============================================================================

impl Beacon {
    pub fn encode(&self) -> Bytes {
        let mut w = Writer::new();
        w.put_str(self.gw_id.as_str());
        w.put_str(self.key.pool());
        w.put_str(self.key.group());
        put_subsystems(&mut w, &self.subsystems);
        put_nonce_map(&mut w, &self.nonce_map);
        w.put_i32(self.availability.wire_code());
        w.put_u32(self.version);
        w.finish()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let gw_id = GatewayId::new(r.get_str("gateway id")?)?;
        let key = GroupKey::new(r.get_str("pool")?, r.get_str("group")?);
        let subsystems = get_subsystems(&mut r)?;
        let nonce_map = get_nonce_map(&mut r)?;
        let availability_code = r.get_i32()?;
        let availability =
            Availability::from_wire(availability_code).ok_or(DecodeError::UnknownEnum {
                what: "availability",
                code: availability_code as i64,
            })?;
        let version = r.get_u32()?;
        r.finish()?;
        Ok(Beacon {
            gw_id,
            key,
            subsystems,
            nonce_map,
            availability,
            version,
        })
    }
}

// =============================================================================
// Exported map payload
// =============================================================================

/// Encode the projector output shipped to subscribers.
pub fn encode_exported_map(map: &ExportedMap) -> Bytes {
    let mut w = Writer::new();
    w.put_u32(map.len() as u32);
    for (key, group) in map {
        w.put_str(key.pool());
        w.put_str(key.group());
        w.put_u32(group.len() as u32);
        for (id, state) in group {
            w.put_str(id.as_str());
            put_owned(&mut w, state.owned);
            w.put_u64(state.version);
            w.put_u32(state.subsystems.len() as u32);
            for (nqn, vector) in &state.subsystems {
                w.put_str(nqn.as_str());
                for exported in vector {
                    w.put_i32(exported.wire_code());
                }
            }
        }
    }
    w.finish()
}

pub fn decode_exported_map(buf: &[u8]) -> Result<ExportedMap, DecodeError> {
    let mut r = Reader::new(buf);
    let group_count = r.get_u32()?;
    let mut map = ExportedMap::new();
    for _ in 0..group_count {
        let key = GroupKey::new(r.get_str("pool")?, r.get_str("group")?);
        let gw_count = r.get_u32()?;
        let mut group = BTreeMap::new();
        for _ in 0..gw_count {
            let id = GatewayId::new(r.get_str("gateway id")?)?;
            let owned = get_owned(&mut r)?;
            let version = r.get_u64()?;
            let sub_count = r.get_u32()?;
            let mut subsystems = BTreeMap::new();
            for _ in 0..sub_count {
                let nqn = Nqn::new(r.get_str("subsystem nqn")?)?;
                let mut vector: AnaStateVector = [ExportedState::Inaccessible; MAX_ANA_GROUPS];
                for state in vector.iter_mut() {
                    let code = r.get_i32()?;
                    *state = ExportedState::from_wire(code).ok_or(DecodeError::UnknownEnum {
                        what: "exported state",
                        code: code as i64,
                    })?;
                }
                subsystems.insert(nqn, vector);
            }
            group.insert(
                id,
                ExportedGwState {
                    owned,
                    version,
                    subsystems,
                },
            );
        }
        map.insert(key, group);
    }
    r.finish()?;
    Ok(map)
}
