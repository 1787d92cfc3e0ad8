//! Shared fixtures: a recording fencing stub and beacon builders.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use gwmon::{
    AnaGroupId, Availability, Beacon, BeaconListener, BeaconNamespace, BeaconSubsystem, Fencing,
    GatewayId, GroupKey, Nqn, OsdEpoch,
};

/// One accepted blocklist request.
#[derive(Clone, Debug)]
pub struct BlocklistCall {
    pub addrs: Vec<String>,
    pub ttl_secs: u64,
    pub epoch: OsdEpoch,
}

/// Fencing stub: a settable OSD epoch plus a log of blocklist calls.
///
/// Accepting a blocklist advances the epoch, the way a real osdmap change
/// would; tests drive further advances with `bump_epoch`.
pub struct RecordingFencing {
    epoch: Cell<u32>,
    calls: RefCell<Vec<BlocklistCall>>,
}

impl RecordingFencing {
    pub fn new() -> Self {
        Self {
            epoch: Cell::new(10),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn bump_epoch(&self) {
        self.epoch.set(self.epoch.get() + 1);
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn last_call(&self) -> BlocklistCall {
        self.calls.borrow().last().expect("a blocklist call").clone()
    }
}

impl Fencing for RecordingFencing {
    fn current_epoch(&self) -> OsdEpoch {
        OsdEpoch::new(self.epoch.get())
    }

    fn blocklist(&self, addrs: &[String], ttl_secs: u64) -> OsdEpoch {
        self.epoch.set(self.epoch.get() + 1);
        let epoch = OsdEpoch::new(self.epoch.get());
        self.calls.borrow_mut().push(BlocklistCall {
            addrs: addrs.to_vec(),
            ttl_secs,
            epoch,
        });
        epoch
    }
}

pub fn key() -> GroupKey {
    GroupKey::new("pool1", "grp1")
}

pub fn gw(name: &str) -> GatewayId {
    GatewayId::new(name).expect("valid gateway id")
}

pub fn grp(id: u8) -> AnaGroupId {
    AnaGroupId::new(id).expect("valid ana group id")
}

/// The nonce a gateway publishes for one ANA group.
pub fn nonce_of(id: &GatewayId, group: AnaGroupId) -> String {
    format!("{id}.{group}.addr:4420")
}

pub fn subsystem_for(id: &GatewayId) -> BeaconSubsystem {
    BeaconSubsystem {
        nqn: Nqn::new(format!("nqn.2016-06.io.example:{id}")).expect("valid nqn"),
        listeners: vec![BeaconListener {
            address_family: "IPv4".to_string(),
            address: format!("{id}.listen"),
            svcid: "4420".to_string(),
        }],
        namespaces: vec![BeaconNamespace {
            ana_group: grp(0),
            nonce: nonce_of(id, grp(0)),
        }],
    }
}

/// Full heartbeat: one subsystem, nonces published for every ANA group.
pub fn beacon(id: &GatewayId) -> Beacon {
    let nonce_map: BTreeMap<AnaGroupId, Vec<String>> = AnaGroupId::all()
        .map(|g| (g, vec![nonce_of(id, g)]))
        .collect();
    Beacon {
        gw_id: id.clone(),
        key: key(),
        subsystems: vec![subsystem_for(id)],
        nonce_map,
        availability: Availability::Available,
        version: 1,
    }
}
