//! Core value types shared by the GVRP engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GvrpError;

/// Participant (port) index, 0-based.
pub type PortNo = usize;

/// IEEE 802.1Q VLAN identifier carried as a GVRP attribute value (1-4094).
///
/// # Examples
///
/// ```
/// use sonic_gvrp::Vid;
///
/// let vid = Vid::new(100).unwrap();
/// assert_eq!(vid.as_u16(), 100);
/// assert!(Vid::new(0).is_err());
/// assert!(Vid::new(4095).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Vid(u16);

impl Vid {
    /// Minimum valid VLAN ID.
    pub const MIN: u16 = 1;

    /// Maximum valid VLAN ID.
    pub const MAX: u16 = 4094;

    /// Size of tables indexed directly by VLAN ID.
    pub const TABLE_SIZE: usize = 4095;

    /// Creates a new VLAN ID.
    ///
    /// # Errors
    ///
    /// Returns [`GvrpError::InvalidVid`] outside 1-4094.
    pub fn new(id: u16) -> Result<Self, GvrpError> {
        if (Self::MIN..=Self::MAX).contains(&id) {
            Ok(Vid(id))
        } else {
            Err(GvrpError::InvalidVid(id))
        }
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    /// Iterates over every valid VLAN ID in ascending order.
    pub fn all() -> impl Iterator<Item = Vid> {
        (Self::MIN..=Self::MAX).map(Vid)
    }
}

impl fmt::Display for Vid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Vid {
    type Err = GvrpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: u16 = s
            .trim()
            .parse()
            .map_err(|_| GvrpError::invalid_config("vid", format!("'{}' is not a number", s)))?;
        Vid::new(id)
    }
}

impl TryFrom<u16> for Vid {
    type Error = GvrpError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Vid::new(value)
    }
}

impl From<Vid> for u16 {
    fn from(vid: Vid) -> Self {
        vid.0
    }
}

/// Spanning-tree instance index. 0 is the CIST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Msti(u8);

impl Msti {
    /// Number of spanning-tree instances (CIST plus seven MSTIs).
    pub const COUNT: usize = 8;

    /// The common and internal spanning tree.
    pub const CIST: Msti = Msti(0);

    pub fn new(id: u8) -> Result<Self, GvrpError> {
        if usize::from(id) < Self::COUNT {
            Ok(Msti(id))
        } else {
            Err(GvrpError::InvalidMsti(id))
        }
    }

    pub const fn as_u8(&self) -> u8 {
        self.0
    }

    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    pub fn all() -> impl Iterator<Item = Msti> {
        (0..Self::COUNT as u8).map(Msti)
    }
}

impl fmt::Display for Msti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for Msti {
    type Error = GvrpError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Msti::new(value)
    }
}

impl From<Msti> for u8 {
    fn from(msti: Msti) -> Self {
        msti.0
    }
}

/// VLAN to spanning-tree instance assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MstiMap {
    table: Vec<Msti>,
}

impl Default for MstiMap {
    fn default() -> Self {
        Self {
            table: vec![Msti::CIST; Vid::TABLE_SIZE],
        }
    }
}

impl MstiMap {
    /// A map with every VLAN on the CIST.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, vid: Vid) -> Msti {
        self.table[vid.index()]
    }

    pub fn set(&mut self, vid: Vid, msti: Msti) {
        self.table[vid.index()] = msti;
    }

    /// Builder-style variant of [`MstiMap::set`].
    pub fn with(mut self, vid: Vid, msti: Msti) -> Self {
        self.set(vid, msti);
        self
    }

    /// VLANs whose instance differs between `self` and `other`.
    pub fn changed(&self, other: &MstiMap) -> Vec<Vid> {
        Vid::all().filter(|vid| self.get(*vid) != other.get(*vid)).collect()
    }
}

/// Administrative registrar control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrarAdmin {
    /// The registrar follows the protocol.
    #[default]
    Normal,
    /// Registration is held regardless of protocol events.
    Fixed,
    /// Registration is refused regardless of protocol events.
    Forbidden,
}

impl fmt::Display for RegistrarAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegistrarAdmin::Normal => "normal",
            RegistrarAdmin::Fixed => "fixed",
            RegistrarAdmin::Forbidden => "forbidden",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for RegistrarAdmin {
    type Err = GvrpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(RegistrarAdmin::Normal),
            "fixed" => Ok(RegistrarAdmin::Fixed),
            "forbidden" => Ok(RegistrarAdmin::Forbidden),
            _ => Err(GvrpError::invalid_config(
                "registrar",
                format!("unknown registrar mode '{}'", s),
            )),
        }
    }
}

/// GARP attribute event codes as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AttributeEvent {
    LeaveAll = 0,
    JoinEmpty = 1,
    JoinIn = 2,
    LeaveEmpty = 3,
    LeaveIn = 4,
    Empty = 5,
}

impl AttributeEvent {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for AttributeEvent {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => AttributeEvent::LeaveAll,
            1 => AttributeEvent::JoinEmpty,
            2 => AttributeEvent::JoinIn,
            3 => AttributeEvent::LeaveEmpty,
            4 => AttributeEvent::LeaveIn,
            5 => AttributeEvent::Empty,
            other => return Err(other),
        })
    }
}

/// The three GARP timer contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Join period between transmit opportunities.
    TransmitPdu,
    /// Registrar leave timer.
    Leave,
    /// Participant LeaveAll timer.
    LeaveAll,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimerKind::TransmitPdu => "join",
            TimerKind::Leave => "leave",
            TimerKind::LeaveAll => "leaveall",
        };
        write!(f, "{}", s)
    }
}

/// Direction of a VLAN membership change reported to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MembershipKind {
    Add,
    Delete,
}

/// A pending VLAN port membership change caused by a registrar indication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MembershipChange {
    pub port: PortNo,
    pub vid: Vid,
    pub kind: MembershipKind,
}

/// Fixed-size set of VLAN IDs.
#[derive(Clone, PartialEq, Eq)]
pub struct VidSet {
    words: [u64; 64],
}

impl Default for VidSet {
    fn default() -> Self {
        Self { words: [0; 64] }
    }
}

impl fmt::Debug for VidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl VidSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the VLAN was not already present.
    pub fn insert(&mut self, vid: Vid) -> bool {
        let (word, bit) = Self::slot(vid);
        let was_set = self.words[word] & bit != 0;
        self.words[word] |= bit;
        !was_set
    }

    /// Returns true if the VLAN was present.
    pub fn remove(&mut self, vid: Vid) -> bool {
        let (word, bit) = Self::slot(vid);
        let was_set = self.words[word] & bit != 0;
        self.words[word] &= !bit;
        was_set
    }

    pub fn contains(&self, vid: Vid) -> bool {
        let (word, bit) = Self::slot(vid);
        self.words[word] & bit != 0
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn clear(&mut self) {
        self.words = [0; 64];
    }

    /// Iterates in ascending VLAN order.
    pub fn iter(&self) -> impl Iterator<Item = Vid> + '_ {
        Vid::all().filter(move |vid| self.contains(*vid))
    }

    fn slot(vid: Vid) -> (usize, u64) {
        let index = vid.index();
        (index / 64, 1u64 << (index % 64))
    }
}

impl FromIterator<Vid> for VidSet {
    fn from_iter<I: IntoIterator<Item = Vid>>(iter: I) -> Self {
        let mut set = VidSet::new();
        for vid in iter {
            set.insert(vid);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vid(id: u16) -> Vid {
        Vid::new(id).unwrap()
    }

    #[test]
    fn test_vid_range() {
        assert!(Vid::new(0).is_err());
        assert!(Vid::new(1).is_ok());
        assert!(Vid::new(4094).is_ok());
        assert!(Vid::new(4095).is_err());
        assert_eq!(Vid::all().count(), 4094);
    }

    #[test]
    fn test_vid_parse() {
        assert_eq!("  42 ".parse::<Vid>().unwrap(), vid(42));
        assert!("abc".parse::<Vid>().is_err());
        assert!("5000".parse::<Vid>().is_err());
    }

    #[test]
    fn test_msti_range() {
        assert!(Msti::new(7).is_ok());
        assert!(Msti::new(8).is_err());
        assert_eq!(Msti::all().count(), Msti::COUNT);
    }

    #[test]
    fn test_msti_map_changed() {
        let old = MstiMap::new().with(vid(30), Msti::new(1).unwrap());
        let new = MstiMap::new().with(vid(30), Msti::new(2).unwrap());
        assert_eq!(old.changed(&new), vec![vid(30)]);
        assert!(old.changed(&old).is_empty());
    }

    #[test]
    fn test_attribute_event_codes() {
        for code in 0..=5u8 {
            assert_eq!(AttributeEvent::try_from(code).unwrap().code(), code);
        }
        assert_eq!(AttributeEvent::try_from(6), Err(6));
    }

    #[test]
    fn test_registrar_admin_parse() {
        assert_eq!("Fixed".parse::<RegistrarAdmin>().unwrap(), RegistrarAdmin::Fixed);
        assert_eq!(RegistrarAdmin::Forbidden.to_string(), "forbidden");
        assert!("sticky".parse::<RegistrarAdmin>().is_err());
    }

    #[test]
    fn test_vid_set() {
        let mut set = VidSet::new();
        assert!(set.is_empty());
        assert!(set.insert(vid(4094)));
        assert!(set.insert(vid(1)));
        assert!(!set.insert(vid(1)));
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![vid(1), vid(4094)]);
        assert!(set.remove(vid(1)));
        assert!(!set.contains(vid(1)));
        set.clear();
        assert!(set.is_empty());
    }
}
