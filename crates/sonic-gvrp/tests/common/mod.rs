//! Shared test fixtures for sonic-gvrp integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sonic_gvrp::{
    decode_pdu, encode_pdus, Attribute, AttributeEvent, GvrpCallbacks, GvrpConfig, GvrpEngine,
    Msti, MstiMap, PortNo, Vid,
};

pub const SOURCE_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];

/// Platform double recording transmitted frames.
pub struct MockCallbacks {
    pub sent: Mutex<Vec<(PortNo, Vec<u8>)>>,
    pub blocked: Mutex<HashSet<(PortNo, Msti)>>,
    pub map: Mutex<MstiMap>,
    pub fail_transmit: AtomicBool,
    pub fail_lookup: AtomicBool,
    pub membership_signals: AtomicUsize,
}

impl MockCallbacks {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            blocked: Mutex::new(HashSet::new()),
            map: Mutex::new(MstiMap::new()),
            fail_transmit: AtomicBool::new(false),
            fail_lookup: AtomicBool::new(false),
            membership_signals: AtomicUsize::new(0),
        }
    }

    pub fn set_msti(&self, vid: Vid, msti: Msti) {
        self.map.lock().unwrap().set(vid, msti);
    }

    pub fn block(&self, port: PortNo, msti: Msti) {
        self.blocked.lock().unwrap().insert((port, msti));
    }

    /// Drains transmitted frames and decodes them.
    pub fn take_sent(&self) -> Vec<(PortNo, Vec<Attribute>)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
            .into_iter()
            .map(|(port, frame)| (port, decode(&frame)))
            .collect()
    }
}

impl GvrpCallbacks for MockCallbacks {
    fn transmit(&self, port: PortNo, frame: &[u8]) -> Result<(), String> {
        if self.fail_transmit.load(Ordering::SeqCst) {
            return Err("link down".to_string());
        }
        self.sent.lock().unwrap().push((port, frame.to_vec()));
        Ok(())
    }

    fn msti_forwarding(&self, port: PortNo, msti: Msti) -> bool {
        !self.blocked.lock().unwrap().contains(&(port, msti))
    }

    fn vlan_msti(&self, vid: Vid) -> Option<Msti> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.map.lock().unwrap().get(vid))
    }

    fn msti_map(&self) -> MstiMap {
        self.map.lock().unwrap().clone()
    }

    fn vlan_membership_changed(&self) {
        self.membership_signals.fetch_add(1, Ordering::SeqCst);
    }
}

/// Engine plus its platform double.
pub struct TestSetup {
    pub engine: GvrpEngine,
    pub callbacks: Arc<MockCallbacks>,
}

impl TestSetup {
    /// `ports` participants, all forwarding, none enabled.
    pub fn new(ports: usize) -> Self {
        Self::with_config(GvrpConfig::with_ports(ports), MockCallbacks::new())
    }

    pub fn with_config(config: GvrpConfig, callbacks: MockCallbacks) -> Self {
        let callbacks = Arc::new(callbacks);
        let engine = GvrpEngine::new(config, callbacks.clone()).unwrap();
        Self { engine, callbacks }
    }

    /// `ports` participants, all forwarding and enabled.
    pub fn enabled(ports: usize) -> Self {
        let mut setup = Self::new(ports);
        for port in 0..ports {
            setup.engine.port_control_set(port, true).unwrap();
        }
        setup
    }

    pub fn receive(&mut self, port: PortNo, attributes: &[Attribute]) {
        for frame in encode_pdus(SOURCE_MAC, attributes) {
            let summary = self.engine.receive_pdu(port, &frame).unwrap();
            assert_eq!(summary.error, None);
        }
    }

    pub fn tick(&mut self, ticks: u32) {
        self.engine.timer_tick(ticks);
    }
}

pub fn vid(id: u16) -> Vid {
    Vid::new(id).unwrap()
}

pub fn msti(id: u8) -> Msti {
    Msti::new(id).unwrap()
}

pub fn attr(event: AttributeEvent, id: u16) -> Attribute {
    Attribute::Ordinary { event, vid: vid(id) }
}

pub fn decode(frame: &[u8]) -> Vec<Attribute> {
    decode_pdu(frame)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}
