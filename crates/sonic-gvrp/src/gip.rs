//! GIP contexts: per-MSTI rings of participating ports.
//!
//! A port is linked into the ring of every spanning-tree instance it is
//! enabled and forwarding on. Registration changes on one port are
//! propagated to the other members of the same ring.

use crate::types::{Msti, PortNo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Link {
    next: PortNo,
    prev: PortNo,
}

/// Index-linked circular lists, one per MSTI.
#[derive(Debug)]
pub struct GipContexts {
    heads: [Option<PortNo>; Msti::COUNT],
    lens: [usize; Msti::COUNT],
    links: Vec<[Option<Link>; Msti::COUNT]>,
}

impl GipContexts {
    pub fn new(ports: usize) -> Self {
        Self {
            heads: [None; Msti::COUNT],
            lens: [0; Msti::COUNT],
            links: vec![[None; Msti::COUNT]; ports],
        }
    }

    pub fn contains(&self, port: PortNo, msti: Msti) -> bool {
        self.links
            .get(port)
            .map(|links| links[msti.index()].is_some())
            .unwrap_or(false)
    }

    /// Links `port` into the ring. Returns false if already a member.
    pub fn insert(&mut self, port: PortNo, msti: Msti) -> bool {
        let m = msti.index();
        if port >= self.links.len() || self.links[port][m].is_some() {
            return false;
        }

        match self.heads[m] {
            None => {
                self.links[port][m] = Some(Link {
                    next: port,
                    prev: port,
                });
                self.heads[m] = Some(port);
            }
            Some(head) => {
                // Insert before the head, i.e. at the tail of the ring.
                let Some(head_link) = self.links[head][m] else {
                    return false;
                };
                let tail = head_link.prev;
                self.links[port][m] = Some(Link {
                    next: head,
                    prev: tail,
                });
                if let Some(link) = self.links[tail][m].as_mut() {
                    link.next = port;
                }
                if let Some(link) = self.links[head][m].as_mut() {
                    link.prev = port;
                }
            }
        }
        self.lens[m] += 1;
        true
    }

    /// Unlinks `port` from the ring. Returns false if it was not a member.
    pub fn remove(&mut self, port: PortNo, msti: Msti) -> bool {
        let m = msti.index();
        let Some(link) = self.links.get_mut(port).and_then(|links| links[m].take()) else {
            return false;
        };

        if link.next == port {
            self.heads[m] = None;
        } else {
            if let Some(prev) = self.links[link.prev][m].as_mut() {
                prev.next = link.next;
            }
            if let Some(next) = self.links[link.next][m].as_mut() {
                next.prev = link.prev;
            }
            if self.heads[m] == Some(port) {
                self.heads[m] = Some(link.next);
            }
        }
        self.lens[m] -= 1;
        true
    }

    /// Other members of `port`'s ring, in ring order starting after `port`.
    /// Empty if `port` is not a member.
    pub fn peers(&self, port: PortNo, msti: Msti) -> Vec<PortNo> {
        let m = msti.index();
        let mut peers = Vec::new();
        let Some(mut link) = self.links.get(port).and_then(|links| links[m]) else {
            return peers;
        };
        while link.next != port {
            peers.push(link.next);
            match self.links[link.next][m] {
                Some(next) => link = next,
                None => break,
            }
        }
        peers
    }

    /// All members of a ring in ring order.
    pub fn members(&self, msti: Msti) -> Vec<PortNo> {
        match self.heads[msti.index()] {
            Some(head) => {
                let mut members = vec![head];
                members.extend(self.peers(head, msti));
                members
            }
            None => Vec::new(),
        }
    }

    pub fn len(&self, msti: Msti) -> usize {
        self.lens[msti.index()]
    }

    pub fn is_empty(&self, msti: Msti) -> bool {
        self.len(msti) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn msti(id: u8) -> Msti {
        Msti::new(id).unwrap()
    }

    #[test]
    fn test_insert_and_peers() {
        let mut gip = GipContexts::new(5);
        assert!(gip.insert(0, Msti::CIST));
        assert!(gip.insert(2, Msti::CIST));
        assert!(gip.insert(4, Msti::CIST));
        assert!(!gip.insert(2, Msti::CIST));

        assert_eq!(gip.members(Msti::CIST), vec![0, 2, 4]);
        assert_eq!(gip.peers(2, Msti::CIST), vec![4, 0]);
        assert_eq!(gip.len(Msti::CIST), 3);
        assert!(gip.peers(1, Msti::CIST).is_empty());
    }

    #[test]
    fn test_contexts_are_independent() {
        let mut gip = GipContexts::new(3);
        gip.insert(0, msti(1));
        gip.insert(1, msti(2));
        assert!(gip.contains(0, msti(1)));
        assert!(!gip.contains(0, msti(2)));
        assert!(gip.peers(0, msti(1)).is_empty());
        assert!(gip.is_empty(Msti::CIST));
    }

    #[test]
    fn test_remove_relinks_ring() {
        let mut gip = GipContexts::new(4);
        for port in 0..4 {
            gip.insert(port, Msti::CIST);
        }

        assert!(gip.remove(0, Msti::CIST));
        assert!(!gip.remove(0, Msti::CIST));
        assert_eq!(gip.members(Msti::CIST), vec![1, 2, 3]);

        assert!(gip.remove(2, Msti::CIST));
        assert_eq!(gip.peers(3, Msti::CIST), vec![1]);

        gip.remove(1, Msti::CIST);
        gip.remove(3, Msti::CIST);
        assert!(gip.members(Msti::CIST).is_empty());
        assert_eq!(gip.len(Msti::CIST), 0);

        assert!(gip.insert(3, Msti::CIST));
        assert_eq!(gip.members(Msti::CIST), vec![3]);
    }

    #[test]
    fn test_out_of_range_port() {
        let mut gip = GipContexts::new(2);
        assert!(!gip.insert(7, Msti::CIST));
        assert!(!gip.remove(7, Msti::CIST));
        assert!(!gip.contains(7, Msti::CIST));
    }
}
