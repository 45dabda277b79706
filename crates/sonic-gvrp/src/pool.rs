//! GID array pool.
//!
//! A GID array holds the attribute state of one VLAN for every participant.
//! Arrays are resident only while some participant has state for the VLAN
//! (or holds a reference to it), and are allocated against per-class quotas
//! so that protocol traffic for many VLANs cannot exhaust memory.
//!
//! Arrays live in a generation-checked arena. Released blocks go to a
//! bounded free list and are reused before new memory is allocated.

use serde::Serialize;
use std::fmt;
use tracing::{debug, error};

use crate::error::{GvrpError, GvrpResult};
use crate::machine::{ApplicantState, RegistrarState};
use crate::types::{Msti, PortNo, Vid};

/// Who an array is allocated for. Each class has its own quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocClass {
    /// Protocol events and administrative requests.
    Default,
    /// Transmit PDU builder scratch.
    Tx,
    /// Introspection (CLI, management reads).
    Introspect,
}

impl AllocClass {
    pub const ALL: [AllocClass; 3] = [AllocClass::Default, AllocClass::Tx, AllocClass::Introspect];

    fn index(self) -> usize {
        match self {
            AllocClass::Default => 0,
            AllocClass::Tx => 1,
            AllocClass::Introspect => 2,
        }
    }
}

impl fmt::Display for AllocClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AllocClass::Default => "default",
            AllocClass::Tx => "tx",
            AllocClass::Introspect => "introspect",
        };
        write!(f, "{}", s)
    }
}

/// Usage counters of one allocation class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassUsage {
    /// Arrays currently allocated in this class.
    pub count: usize,
    /// Quota.
    pub max: usize,
    /// High-water mark of `count`.
    pub peak: usize,
}

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub default: ClassUsage,
    pub tx: ClassUsage,
    pub introspect: ClassUsage,
    /// Blocks allocated from the heap.
    pub allocations: u64,
    /// Blocks taken from the free list.
    pub reuses: u64,
    /// Blocks dropped because the free list was full.
    pub deallocations: u64,
    /// Requests refused by a class quota.
    pub denials: u64,
    /// Blocks currently on the free list.
    pub free_blocks: usize,
}

impl PoolStats {
    pub fn class(&self, class: AllocClass) -> &ClassUsage {
        match class {
            AllocClass::Default => &self.default,
            AllocClass::Tx => &self.tx,
            AllocClass::Introspect => &self.introspect,
        }
    }

    /// Arrays resident across all classes.
    pub fn resident(&self) -> usize {
        self.default.count + self.tx.count + self.introspect.count
    }
}

/// Per (port, VLAN) attribute state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gid {
    pub applicant: ApplicantState,
    pub registrar: RegistrarState,
    holds: u32,
    active: bool,
}

impl Default for Gid {
    fn default() -> Self {
        Self {
            applicant: ApplicantState::INITIAL,
            registrar: RegistrarState::INITIAL,
            holds: 0,
            active: false,
        }
    }
}

impl Gid {
    /// True when both machines are in their initial state.
    pub fn is_idle(&self) -> bool {
        self.applicant == ApplicantState::INITIAL && self.registrar == RegistrarState::INITIAL
    }

    /// References held on this GID: explicit holds plus one while the state
    /// machines are out of their initial state.
    pub fn refs(&self) -> u32 {
        self.holds + u32::from(self.active)
    }

    fn reset(&mut self) {
        *self = Gid::default();
    }
}

/// The GIDs of one VLAN, one per participant.
#[derive(Debug)]
pub struct GidArray {
    vid: Vid,
    class: AllocClass,
    msti: Msti,
    refs: u32,
    gids: Vec<Gid>,
}

impl GidArray {
    pub fn vid(&self) -> Vid {
        self.vid
    }

    pub fn class(&self) -> AllocClass {
        self.class
    }

    /// Spanning-tree instance the VLAN was mapped to when last stamped.
    pub fn msti(&self) -> Msti {
        self.msti
    }

    pub fn refs(&self) -> u32 {
        self.refs
    }

    pub fn gids(&self) -> &[Gid] {
        &self.gids
    }
}

/// Generation-checked reference to a resident array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    array: Option<GidArray>,
}

/// Bounded cache of GID arrays keyed by VLAN.
#[derive(Debug)]
pub struct GidPool {
    ports: usize,
    slots: Vec<Slot>,
    free_slots: Vec<u32>,
    spare: Vec<Vec<Gid>>,
    spare_limit: usize,
    resident: Vec<Option<ArrayHandle>>,
    usage: [ClassUsage; 3],
    allocations: u64,
    reuses: u64,
    deallocations: u64,
    denials: u64,
}

impl GidPool {
    /// Creates a pool for `ports` participants. The default class may hold
    /// `max_vlans` arrays; the tx and introspection classes one each.
    pub fn new(ports: usize, max_vlans: usize) -> Self {
        let usage = [
            ClassUsage {
                max: max_vlans,
                ..ClassUsage::default()
            },
            ClassUsage {
                max: 1,
                ..ClassUsage::default()
            },
            ClassUsage {
                max: 1,
                ..ClassUsage::default()
            },
        ];

        Self {
            ports,
            slots: Vec::new(),
            free_slots: Vec::new(),
            spare: Vec::new(),
            spare_limit: max_vlans + 2,
            resident: vec![None; Vid::TABLE_SIZE],
            usage,
            allocations: 0,
            reuses: 0,
            deallocations: 0,
            denials: 0,
        }
    }

    pub fn ports(&self) -> usize {
        self.ports
    }

    /// Takes a reference on GID (`port`, `vid`), making the array resident
    /// if needed. A GID with no references starts in (VO, MT).
    pub fn acquire(
        &mut self,
        vid: Vid,
        port: PortNo,
        class: AllocClass,
        msti: Msti,
    ) -> GvrpResult<ArrayHandle> {
        if port >= self.ports {
            return Err(GvrpError::invalid_port(port, self.ports));
        }

        let handle = match self.resident[vid.index()] {
            Some(handle) => handle,
            None => self.allocate(vid, class, msti)?,
        };

        let array = self.array_mut(handle).ok_or_else(|| {
            GvrpError::internal(format!("resident handle for VLAN {} is stale", vid))
        })?;
        let gid = &mut array.gids[port];
        if gid.refs() == 0 {
            gid.reset();
        }
        gid.holds += 1;
        array.refs += 1;
        Ok(handle)
    }

    /// Drops a reference taken by [`GidPool::acquire`]. The array is
    /// released once nothing references it.
    pub fn done(&mut self, vid: Vid, port: PortNo) {
        let Some(array) = self.resident_mut(vid) else {
            error!(vid = %vid, port, "done on non-resident VLAN");
            return;
        };
        let Some(gid) = array.gids.get_mut(port) else {
            error!(vid = %vid, port, "done on invalid port");
            return;
        };
        if gid.holds == 0 {
            error!(vid = %vid, port, "GID reference count underflow");
            return;
        }
        gid.holds -= 1;
        array.refs -= 1;
        if array.refs == 0 {
            self.release(vid);
        }
    }

    /// Re-evaluates the implicit reference a GID holds while its machines
    /// are out of their initial state. Call after every state change.
    pub fn refresh(&mut self, vid: Vid, port: PortNo) {
        let Some(array) = self.resident_mut(vid) else {
            return;
        };
        let Some(gid) = array.gids.get_mut(port) else {
            return;
        };
        let active = !gid.is_idle();
        if active == gid.active {
            return;
        }
        gid.active = active;
        if active {
            array.refs += 1;
        } else {
            array.refs -= 1;
            if array.refs == 0 {
                self.release(vid);
            }
        }
    }

    /// Returns an unreferenced array to the free list. Returns false (and
    /// leaves the array in place) if it is still referenced.
    pub fn release(&mut self, vid: Vid) -> bool {
        let Some(handle) = self.resident[vid.index()] else {
            return false;
        };
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            error!(vid = %vid, "resident handle points outside the arena");
            return false;
        };
        match slot.array.as_ref() {
            Some(array) if array.refs > 0 => {
                error!(vid = %vid, refs = array.refs, "refusing to release referenced GID array");
                return false;
            }
            Some(_) => {}
            None => {
                error!(vid = %vid, "resident handle points at an empty slot");
                self.resident[vid.index()] = None;
                return false;
            }
        }

        let Some(array) = slot.array.take() else {
            return false;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free_slots.push(handle.index);
        self.resident[vid.index()] = None;

        let usage = &mut self.usage[array.class.index()];
        usage.count = usage.count.saturating_sub(1);

        if self.spare.len() < self.spare_limit {
            self.spare.push(array.gids);
        } else {
            self.deallocations += 1;
        }

        debug!(vid = %vid, class = %array.class, "released GID array");
        true
    }

    pub fn lookup(&self, vid: Vid) -> Option<ArrayHandle> {
        self.resident[vid.index()]
    }

    pub fn is_resident(&self, vid: Vid) -> bool {
        self.resident[vid.index()].is_some()
    }

    pub fn array(&self, handle: ArrayHandle) -> Option<&GidArray> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.array.as_ref())
    }

    fn array_mut(&mut self, handle: ArrayHandle) -> Option<&mut GidArray> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.array.as_mut())
    }

    fn resident_mut(&mut self, vid: Vid) -> Option<&mut GidArray> {
        let handle = self.resident[vid.index()]?;
        self.array_mut(handle)
    }

    pub fn resident_array(&self, vid: Vid) -> Option<&GidArray> {
        self.array(self.resident[vid.index()]?)
    }

    pub fn gid(&self, vid: Vid, port: PortNo) -> Option<&Gid> {
        self.resident_array(vid)?.gids.get(port)
    }

    /// Mutable access to a resident GID. Follow state changes with
    /// [`GidPool::refresh`].
    pub fn gid_mut(&mut self, vid: Vid, port: PortNo) -> Option<&mut Gid> {
        self.resident_mut(vid)?.gids.get_mut(port)
    }

    /// Re-stamps the instance of a resident array.
    pub fn set_msti(&mut self, vid: Vid, msti: Msti) {
        if let Some(array) = self.resident_mut(vid) {
            array.msti = msti;
        }
    }

    /// VLANs with a resident array, ascending.
    pub fn resident_vids(&self) -> Vec<Vid> {
        Vid::all().filter(|vid| self.is_resident(*vid)).collect()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            default: self.usage[AllocClass::Default.index()],
            tx: self.usage[AllocClass::Tx.index()],
            introspect: self.usage[AllocClass::Introspect.index()],
            allocations: self.allocations,
            reuses: self.reuses,
            deallocations: self.deallocations,
            denials: self.denials,
            free_blocks: self.spare.len(),
        }
    }

    fn allocate(&mut self, vid: Vid, class: AllocClass, msti: Msti) -> GvrpResult<ArrayHandle> {
        let usage = &mut self.usage[class.index()];
        if usage.count >= usage.max {
            self.denials += 1;
            return Err(GvrpError::ResourceDenied {
                vid,
                class,
                limit: usage.max,
            });
        }
        usage.count += 1;
        usage.peak = usage.peak.max(usage.count);

        let gids = match self.spare.pop() {
            Some(mut block) => {
                self.reuses += 1;
                block.iter_mut().for_each(Gid::reset);
                block
            }
            None => {
                self.allocations += 1;
                vec![Gid::default(); self.ports]
            }
        };

        let array = GidArray {
            vid,
            class,
            msti,
            refs: 0,
            gids,
        };

        let handle = match self.free_slots.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.array = Some(array);
                ArrayHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    array: Some(array),
                });
                ArrayHandle {
                    index,
                    generation: 0,
                }
            }
        };

        self.resident[vid.index()] = Some(handle);
        debug!(vid = %vid, class = %class, "allocated GID array");
        Ok(handle)
    }
}
