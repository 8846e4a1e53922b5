use std::fmt;

use tracing::{debug, warn};

use crate::core::{Address, Error, Result, MAX_EDGES};
use super::edge::{Edge, EdgeFlags};
use super::update::{RoutingUpdate, DROP_LEN, JOIN_LEN};

/// Fixed-capacity edge table describing the subtree below this node
///
/// Edges are kept in insertion order and the table is compacted on removal.
/// Changes are flagged `JOIN` or `DROP` until the parent acknowledges the
/// report carrying them, see [`RouteTable::get_updates`] and
/// [`RouteTable::clear_pending_updates`].
#[derive(Debug, Clone)]
pub struct RouteTable {
    /// Address of this node
    self_addr: Address,
    /// The hub is the root of all reporting and never propagates joins
    is_hub: bool,
    /// Edge list
    edges: Vec<Edge>,
    /// Maximum number of edges
    capacity: usize,
}

impl RouteTable {
    /// Creates an empty table with the default capacity
    pub fn new(self_addr: Address, is_hub: bool) -> Self {
        Self::with_capacity(self_addr, is_hub, MAX_EDGES)
    }

    /// Creates an empty table holding at most `capacity` edges
    pub fn with_capacity(self_addr: Address, is_hub: bool, capacity: usize) -> Self {
        RouteTable {
            self_addr,
            is_hub,
            edges: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Clears the table and records the address of this node
    pub fn init(&mut self, self_addr: Address) {
        self.self_addr = self_addr;
        self.edges.clear();
    }

    pub fn self_address(&self) -> Address {
        self.self_addr
    }

    pub fn is_hub(&self) -> bool {
        self.is_hub
    }

    /// Number of edges, including every descendant edge
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates over the edges in table order
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// The full edge list, as forwarded to a new parent in a request to join
    pub fn as_slice(&self) -> &[Edge] {
        &self.edges
    }

    /// Looks up the edge connecting `src` to `dest`
    pub fn edge(&self, src: Address, dest: Address) -> Option<&Edge> {
        self.edges.iter().find(|e| e.connects(src, dest))
    }

    fn join_flags(&self) -> EdgeFlags {
        if self.is_hub {
            EdgeFlags::NONE
        } else {
            EdgeFlags::JOIN
        }
    }

    /// Adds an edge, or refreshes the flags of an existing one
    pub fn add_edge(&mut self, src: Address, dest: Address) -> Result<()> {
        if !src.is_valid() || !dest.is_valid() || src == dest {
            return Err(Error::InvalidEdge);
        }
        if self.edges.len() >= self.capacity {
            return Err(Error::TableFull);
        }

        let flags = self.join_flags();
        if let Some(edge) = self.edges.iter_mut().find(|e| e.connects(src, dest)) {
            edge.flags = flags;
            return Ok(());
        }

        self.edges.push(Edge { src, dest, flags });
        Ok(())
    }

    /// Removes every edge connecting `src` to `dest`
    pub fn remove_edge(&mut self, src: Address, dest: Address) -> Result<()> {
        if self.edges.is_empty() {
            return Err(Error::TableEmpty);
        }

        let before = self.edges.len();
        self.edges.retain(|e| !e.connects(src, dest));
        if self.edges.len() == before {
            return Err(Error::DoesNotExist);
        }
        Ok(())
    }

    /// Resolves the direct child to forward to in order to reach `dest`
    ///
    /// The walk back towards this node is bounded by the table length, so a
    /// malformed (cyclic) table yields [`Error::CycleDetected`]. A path that
    /// crosses a dropped edge yields [`Error::NotFound`].
    pub fn next_hop(&self, dest: Address) -> Result<Address> {
        let first = self
            .edges
            .iter()
            .find(|e| e.dest == dest)
            .ok_or(Error::NotFound)?;

        let mut dropped = first.flags.is_drop();
        if first.src == self.self_addr {
            return if dropped { Err(Error::NotFound) } else { Ok(dest) };
        }

        let mut current = first.src;
        for _ in 0..self.edges.len() {
            let parent = self
                .edges
                .iter()
                .find(|e| e.dest == current)
                .ok_or(Error::NotFound)?;
            dropped |= parent.flags.is_drop();

            if parent.src == self.self_addr {
                return if dropped { Err(Error::NotFound) } else { Ok(current) };
            }
            current = parent.src;
        }

        warn!("Routing table cycle while resolving next hop for {}", dest);
        Err(Error::CycleDetected)
    }

    /// Same as [`RouteTable::next_hop`], discarding the failure reason
    pub fn next_hop_opt(&self, dest: Address) -> Option<Address> {
        self.next_hop(dest).ok()
    }

    /// Edges announced to a new parent in a request to join
    pub fn subtree_edges(&self) -> Vec<Edge> {
        self.edges.iter().map(|e| Edge::new(e.src, e.dest)).collect()
    }

    /// Adds a joining node together with its subtree
    ///
    /// `parent` of [`Address::NONE`] mounts `child` directly below this node.
    /// The first failing insert is returned; edges inserted before it stay.
    pub fn node_join(&mut self, parent: Address, child: Address, subtree: &[Edge]) -> Result<()> {
        for edge in subtree {
            self.add_edge(edge.src, edge.dest)?;
        }

        let mount = if parent == Address::NONE { self.self_addr } else { parent };
        self.add_edge(mount, child)
    }

    /// Flags `child` as dropped and removes its descendants
    ///
    /// Only the incoming edge of `child` (flagged `DROP|ROOT`) is kept to
    /// report the drop upward. On the hub nothing is reported, so that edge
    /// goes too. Other entries awaiting acknowledgment keep their flags.
    pub fn node_unjoin(&mut self, child: Address) -> Result<()> {
        if self.edges.is_empty() {
            return Err(Error::TableEmpty);
        }

        let mut root_flags = EdgeFlags::DROP | EdgeFlags::ROOT;
        if self.is_hub {
            root_flags |= EdgeFlags::PENDING;
        }

        let mut found = false;
        for edge in self.edges.iter_mut().filter(|e| e.dest == child) {
            edge.flags = root_flags;
            found = true;
        }
        if !found {
            return Err(Error::DoesNotExist);
        }

        // Each edge of a well-formed tree is visited at most once
        let budget = self.edges.len();
        let mut doomed: Vec<(Address, Address)> = Vec::with_capacity(budget);
        let mut stack = Vec::with_capacity(budget);
        stack.push(child);

        'walk: while let Some(node) = stack.pop() {
            for edge in self.edges.iter().filter(|e| e.src == node) {
                if doomed.len() == budget {
                    warn!("Routing table cycle below {}, unjoin traversal stopped", child);
                    break 'walk;
                }
                doomed.push((edge.src, edge.dest));
                stack.push(edge.dest);
            }
        }

        let descendants = doomed.len();
        let is_hub = self.is_hub;
        self.edges.retain(|e| {
            !(doomed.contains(&(e.src, e.dest)) || (is_hub && e.dest == child))
        });

        debug!("Unjoined {} with {} descendant edges", child, descendants);
        Ok(())
    }

    /// Counts the edges carrying any bit of `mask`
    pub fn update_count(&self, mask: EdgeFlags) -> usize {
        self.edges.iter().filter(|e| e.flags.intersects(mask)).count()
    }

    /// Wire length of the updates selected by `mask`
    pub fn update_count_bytes(&self, mask: EdgeFlags) -> usize {
        let mut bytes = 0;
        if mask.is_join() {
            bytes += self.update_count(EdgeFlags::JOIN) * JOIN_LEN;
        }
        if mask.is_drop() {
            bytes += self.update_count(EdgeFlags::DROP) * DROP_LEN;
        }
        bytes
    }

    /// Serializes pending drops then joins into `buf`
    ///
    /// At most `space` bytes are written, both count bytes included. Entries
    /// that do not fit are left for the next report, and each count byte
    /// states the bytes actually written in its section. Every serialized
    /// entry is flagged `PENDING`. Returns the number of bytes written.
    pub fn get_updates(&mut self, buf: &mut [u8], space: usize) -> Result<usize> {
        let space = space.min(buf.len());
        if space < 2 {
            return Err(Error::BufferTooSmall { needed: 2, available: space });
        }

        let self_addr = self.self_addr;
        let mut remaining = space - 2;
        let mut pos = 0;

        let drop_count_at = pos;
        pos += 1;
        let mut drop_bytes = 0;
        for edge in self.edges.iter_mut().filter(|e| e.flags.is_drop()) {
            if remaining < DROP_LEN || drop_bytes + DROP_LEN > u8::MAX as usize {
                break;
            }
            let far = if edge.src == self_addr { edge.dest } else { edge.src };
            buf[pos..pos + DROP_LEN].copy_from_slice(&far.to_be_bytes());
            pos += DROP_LEN;
            remaining -= DROP_LEN;
            drop_bytes += DROP_LEN;
            edge.flags.insert(EdgeFlags::PENDING);
        }
        buf[drop_count_at] = drop_bytes as u8;

        let join_count_at = pos;
        pos += 1;
        let mut join_bytes = 0;
        for edge in self.edges.iter_mut().filter(|e| e.flags.is_join()) {
            if remaining < JOIN_LEN || join_bytes + JOIN_LEN > u8::MAX as usize {
                break;
            }
            buf[pos..pos + JOIN_LEN].copy_from_slice(&edge.to_be_bytes());
            pos += JOIN_LEN;
            remaining -= JOIN_LEN;
            join_bytes += JOIN_LEN;
            edge.flags.insert(EdgeFlags::PENDING);
        }
        buf[join_count_at] = join_bytes as u8;

        debug!("Serialized {} drop and {} join update bytes", drop_bytes, join_bytes);
        Ok(pos)
    }

    /// Applies a child's routing update to this table
    ///
    /// Drops unjoin the named node; drops for nodes this table no longer
    /// knows are ignored. Joins are added in order and the first table error
    /// is returned without undoing earlier joins.
    pub fn set_updates(&mut self, buf: &[u8]) -> Result<()> {
        let update = RoutingUpdate::parse(buf)?;

        for addr in update.drops {
            match self.node_unjoin(addr) {
                Ok(()) | Err(Error::DoesNotExist) | Err(Error::TableEmpty) => {}
                Err(e) => return Err(e),
            }
        }

        for edge in update.joins {
            self.add_edge(edge.src, edge.dest)?;
        }
        Ok(())
    }

    /// Commits or rolls back every `PENDING` edge
    ///
    /// On success dropped edges are removed and joined edges become active.
    /// On failure only `PENDING` is cleared so the entry is offered again.
    pub fn clear_pending_updates(&mut self, success: bool) {
        let mut i = 0;
        while i < self.edges.len() {
            let flags = self.edges[i].flags;
            if flags.is_pending() {
                if success && flags.is_drop() {
                    self.edges.remove(i);
                    continue;
                }

                let edge = &mut self.edges[i];
                edge.flags.remove(EdgeFlags::PENDING);
                if success && flags.is_join() {
                    edge.flags = EdgeFlags::NONE;
                }
            }
            i += 1;
        }
    }
}

impl fmt::Display for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SOURCE    DESTINATION   STATUS")?;
        for edge in &self.edges {
            writeln!(f, "{}      {}          {}", edge.src, edge.dest, edge.flags)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: Address = Address(1);
    const A: Address = Address(2);
    const B: Address = Address(3);
    const C: Address = Address(4);

    fn chain(is_hub: bool) -> RouteTable {
        let mut table = RouteTable::new(S, is_hub);
        table.add_edge(S, A).unwrap();
        table.add_edge(A, B).unwrap();
        table.add_edge(B, C).unwrap();
        table
    }

    #[test]
    fn test_add_edge_respects_capacity() {
        let mut table = RouteTable::with_capacity(S, false, 2);
        table.add_edge(S, A).unwrap();
        table.add_edge(S, B).unwrap();

        let snapshot: Vec<Edge> = table.edges().copied().collect();
        assert!(matches!(table.add_edge(S, C), Err(Error::TableFull)));
        assert_eq!(table.len(), 2);
        assert_eq!(table.as_slice(), snapshot.as_slice());
    }

    #[test]
    fn test_add_edge_is_idempotent() {
        let mut table = RouteTable::new(S, false);
        table.add_edge(S, A).unwrap();
        table.add_edge(S, A).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.edge(S, A).unwrap().flags.is_join());
    }

    #[test]
    fn test_add_edge_flags_depend_on_hub() {
        let mut hub = RouteTable::new(S, true);
        hub.add_edge(S, A).unwrap();
        assert!(hub.edge(S, A).unwrap().flags.is_active());

        let mut relay = RouteTable::new(S, false);
        relay.add_edge(S, A).unwrap();
        assert_eq!(relay.edge(S, A).unwrap().flags, EdgeFlags::JOIN);
    }

    #[test]
    fn test_add_edge_rejects_invalid() {
        let mut table = RouteTable::new(S, false);
        assert!(matches!(table.add_edge(A, A), Err(Error::InvalidEdge)));
        assert!(matches!(table.add_edge(Address::NONE, A), Err(Error::InvalidEdge)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_remove_edge() {
        let mut table = RouteTable::new(S, false);
        assert!(matches!(table.remove_edge(S, A), Err(Error::TableEmpty)));

        table.add_edge(S, A).unwrap();
        table.add_edge(S, B).unwrap();
        table.add_edge(S, C).unwrap();
        assert!(matches!(table.remove_edge(A, B), Err(Error::DoesNotExist)));

        table.remove_edge(S, B).unwrap();
        let dests: Vec<Address> = table.edges().map(|e| e.dest).collect();
        assert_eq!(dests, vec![A, C]);
    }

    #[test]
    fn test_next_hop_direct_child() {
        let mut table = RouteTable::new(S, false);
        table.node_join(Address::NONE, C, &[]).unwrap();
        assert_eq!(table.next_hop(C).unwrap(), C);
    }

    #[test]
    fn test_next_hop_chain() {
        let table = chain(false);
        assert_eq!(table.next_hop(C).unwrap(), A);
        assert_eq!(table.next_hop(B).unwrap(), A);
        assert_eq!(table.next_hop(A).unwrap(), A);
        assert!(matches!(table.next_hop(Address(99)), Err(Error::NotFound)));
    }

    #[test]
    fn test_next_hop_detects_cycle() {
        let mut table = RouteTable::new(S, false);
        table.add_edge(A, B).unwrap();
        table.add_edge(B, A).unwrap();
        assert!(matches!(table.next_hop(B), Err(Error::CycleDetected)));
    }

    #[test]
    fn test_next_hop_skips_dropped_child() {
        let mut table = chain(false);
        table.node_unjoin(A).unwrap();
        assert!(table.next_hop_opt(A).is_none());
    }

    #[test]
    fn test_node_join_with_subtree() {
        let mut table = RouteTable::new(S, false);
        let subtree = [Edge::new(A, B), Edge::new(B, C)];
        table.node_join(Address::NONE, A, &subtree).unwrap();

        assert_eq!(table.len(), 3);
        assert!(table.edge(S, A).is_some());
        assert_eq!(table.next_hop(C).unwrap(), A);

        let announced = table.subtree_edges();
        assert_eq!(announced.len(), 3);
        assert!(announced.iter().all(|e| e.flags.is_active()));
    }

    #[test]
    fn test_node_join_partial_insert_is_kept() {
        let mut table = RouteTable::with_capacity(S, false, 2);
        let subtree = [Edge::new(A, B), Edge::new(B, C)];
        assert!(matches!(table.node_join(Address::NONE, A, &subtree), Err(Error::TableFull)));
        assert_eq!(table.len(), 2);
        assert!(table.edge(S, A).is_none());
    }

    #[test]
    fn test_node_unjoin_flags_and_commits() {
        let mut table = chain(false);
        table.node_unjoin(A).unwrap();

        // Descendants are gone, the root drop waits for the parent
        assert_eq!(table.len(), 1);
        let root = table.edge(S, A).unwrap();
        assert_eq!(root.flags, EdgeFlags::DROP | EdgeFlags::ROOT);

        let mut buf = [0u8; 16];
        let written = table.get_updates(&mut buf, 16).unwrap();
        assert_eq!(&buf[..written], &[0x02, 0x00, 0x02, 0x00]);
        assert!(table.edge(S, A).unwrap().flags.is_pending());

        table.clear_pending_updates(true);
        assert!(table.is_empty());
    }

    #[test]
    fn test_node_unjoin_keeps_unacknowledged_joins() {
        let mut table = RouteTable::new(S, false);
        table.add_edge(S, A).unwrap();
        table.add_edge(S, B).unwrap();

        let mut buf = [0u8; 16];
        table.get_updates(&mut buf, 16).unwrap();
        table.node_unjoin(B).unwrap();

        // The report carrying both joins is lost
        table.clear_pending_updates(false);
        assert_eq!(table.edge(S, A).unwrap().flags, EdgeFlags::JOIN);
        assert_eq!(table.edge(S, B).unwrap().flags, EdgeFlags::DROP | EdgeFlags::ROOT);

        let written = table.get_updates(&mut buf, 16).unwrap();
        assert_eq!(&buf[..written], &[0x02, 0x00, 0x03, 0x04, 0x00, 0x01, 0x00, 0x02]);
    }

    #[test]
    fn test_node_unjoin_on_hub_is_immediate() {
        let mut table = chain(true);
        table.node_unjoin(A).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_node_unjoin_errors() {
        let mut table = RouteTable::new(S, false);
        assert!(matches!(table.node_unjoin(A), Err(Error::TableEmpty)));

        table.add_edge(S, A).unwrap();
        assert!(matches!(table.node_unjoin(B), Err(Error::DoesNotExist)));
        assert_eq!(table.edge(S, A).unwrap().flags, EdgeFlags::JOIN);
    }

    #[test]
    fn test_node_unjoin_terminates_on_cycle() {
        let mut table = RouteTable::new(S, false);
        table.add_edge(S, A).unwrap();
        table.add_edge(A, B).unwrap();
        table.add_edge(B, A).unwrap();
        table.node_unjoin(A).unwrap();
        assert!(table.len() <= 3);
    }

    #[test]
    fn test_failed_report_reoffers_drop() {
        let mut table = chain(false);
        table.node_unjoin(A).unwrap();

        let mut first = [0u8; 8];
        let n1 = table.get_updates(&mut first, 8).unwrap();
        table.clear_pending_updates(false);

        let root = table.edge(S, A).unwrap();
        assert!(root.flags.is_drop());
        assert!(!root.flags.is_pending());

        let mut second = [0u8; 8];
        let n2 = table.get_updates(&mut second, 8).unwrap();
        assert_eq!(&first[..n1], &second[..n2]);
    }

    #[test]
    fn test_update_counts() {
        let mut table = RouteTable::new(S, false);
        table.add_edge(S, A).unwrap();
        assert_eq!(table.update_count(EdgeFlags::JOIN), 1);
        assert_eq!(table.update_count_bytes(EdgeFlags::JOIN), 4);
        assert_eq!(table.update_count_bytes(EdgeFlags::DROP), 0);

        table.add_edge(S, B).unwrap();
        table.node_unjoin(B).unwrap();
        assert_eq!(table.update_count_bytes(EdgeFlags::DROP), 2);
        assert_eq!(table.update_count_bytes(EdgeFlags::JOIN | EdgeFlags::DROP), 6);
    }

    #[test]
    fn test_get_updates_scenario() {
        let mut table = RouteTable::new(Address(1), false);
        table.init(Address(1));
        table.add_edge(Address(1), Address(2)).unwrap();
        assert_eq!(table.update_count_bytes(EdgeFlags::JOIN), 4);

        let mut buf = [0xAAu8; 10];
        let written = table.get_updates(&mut buf, 10).unwrap();
        assert_eq!(written, 6);
        assert_eq!(&buf[..6], &[0x00, 0x04, 0x00, 0x01, 0x00, 0x02]);
        assert!(table.edge(Address(1), Address(2)).unwrap().flags.is_pending());

        table.clear_pending_updates(true);
        assert!(table.edge(Address(1), Address(2)).unwrap().flags.is_active());
    }

    #[test]
    fn test_get_updates_truncates_to_space() {
        let mut table = chain(false);
        let mut buf = [0u8; 32];

        // Two count bytes and room for a single join
        let written = table.get_updates(&mut buf, 7).unwrap();
        assert_eq!(written, 6);
        assert_eq!(buf[1], 4);
        assert_eq!(table.update_count(EdgeFlags::PENDING), 1);

        // Only the serialized entry is committed
        table.clear_pending_updates(true);
        assert_eq!(table.update_count(EdgeFlags::JOIN), 2);

        assert!(matches!(
            table.get_updates(&mut buf, 1),
            Err(Error::BufferTooSmall { needed: 2, available: 1 })
        ));
    }

    #[test]
    fn test_updates_roundtrip() {
        let mut child = chain(false);
        let mut buf = [0u8; 32];
        let space = buf.len();
        let written = child.get_updates(&mut buf, space).unwrap();

        let mut parent = RouteTable::new(Address(50), false);
        parent.set_updates(&buf[..written]).unwrap();

        let expected: Vec<(Address, Address)> = child.edges().map(|e| (e.src, e.dest)).collect();
        let applied: Vec<(Address, Address)> = parent.edges().map(|e| (e.src, e.dest)).collect();
        assert_eq!(applied, expected);
        assert!(parent.edges().all(|e| e.flags.is_join()));
    }

    #[test]
    fn test_set_updates_applies_drops() {
        let mut parent = RouteTable::new(Address(50), true);
        parent.node_join(Address::NONE, S, &[Edge::new(S, A), Edge::new(A, B)]).unwrap();

        // Child S reports that A left, and that C joined below S
        let buf = [0x02, 0x00, 0x02, 0x04, 0x00, 0x01, 0x00, 0x04];
        parent.set_updates(&buf).unwrap();

        assert!(parent.edge(S, A).is_none());
        assert!(parent.edge(A, B).is_none());
        assert!(parent.edge(S, C).is_some());
        assert_eq!(parent.next_hop(C).unwrap(), S);
    }

    #[test]
    fn test_set_updates_keeps_joins_before_table_full() {
        let mut table = RouteTable::with_capacity(S, false, 2);
        let buf = [
            0x00, 0x0C, 0x00, 0x01, 0x00, 0x02, 0x00, 0x01, 0x00, 0x03, 0x00, 0x01, 0x00, 0x04,
        ];
        assert!(matches!(table.set_updates(&buf), Err(Error::TableFull)));

        assert_eq!(table.len(), 2);
        assert!(table.edge(S, A).is_some());
        assert!(table.edge(S, B).is_some());
        assert!(table.edge(S, C).is_none());
    }

    #[test]
    fn test_set_updates_rejects_malformed() {
        let mut table = RouteTable::new(S, false);
        assert!(matches!(table.set_updates(&[0x00, 0x04, 0x00]), Err(Error::MalformedUpdate(_))));
        assert!(table.is_empty());
    }

    #[test]
    fn test_display_edges() {
        let mut table = RouteTable::new(S, false);
        table.add_edge(S, A).unwrap();
        let dump = table.to_string();
        assert!(dump.starts_with("SOURCE    DESTINATION   STATUS"));
        assert!(dump.contains("0001      0002          joined"));
    }
}
