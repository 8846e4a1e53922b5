use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use tracing::{debug, info, warn};

use crate::core::{
    Address, Config, Error, HopLevel, LinkRole, RandomSeed, Result, MAX_LINKS_PER_SLOT,
};
use crate::protocol::{
    Beacon, Frame, FrameCodec, Message, MessageId, RequestToJoin, MAX_FRAME_SIZE,
};
use crate::routing::RouteTable;
use super::mode::{DiscoveryMode, DiscoveryPolicy};
use super::report::ReportEvent;
use super::traits::{Alarm, Peripherals, RadioMode};

/// Sub-second offsets of the reply slots following a beacon
pub const SLOT_OFFSETS: [u16; MAX_LINKS_PER_SLOT] = [0x0000, 0x0400, 0x0800];

/// Why no beacon was accepted during a join attempt
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RejectReasons(u8);

impl RejectReasons {
    /// No beacon arrived before the window closed
    pub const TIMEOUT: RejectReasons = RejectReasons(0x01);
    /// Sender is not closer to the hub than this node
    pub const SOURCE_LEVEL: RejectReasons = RejectReasons(0x02);
    /// A link to the sender already exists
    pub const PRE_EXISTING_LINK: RejectReasons = RejectReasons(0x04);
    /// Beacon received below the signal floor
    pub const SIGNAL_TOO_WEAK: RejectReasons = RejectReasons(0x08);
    /// Bad checksum or unexpected message type
    pub const INTEGRITY: RejectReasons = RejectReasons(0x10);

    pub const fn empty() -> Self {
        RejectReasons(0)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, other: RejectReasons) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: RejectReasons) {
        self.0 |= other.0;
    }
}

impl BitOr for RejectReasons {
    type Output = RejectReasons;

    fn bitor(self, rhs: RejectReasons) -> RejectReasons {
        RejectReasons(self.0 | rhs.0)
    }
}

impl BitOrAssign for RejectReasons {
    fn bitor_assign(&mut self, rhs: RejectReasons) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for RejectReasons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(RejectReasons, &str); 5] = [
            (RejectReasons::TIMEOUT, "TIMEOUT"),
            (RejectReasons::SOURCE_LEVEL, "SOURCE_LEVEL"),
            (RejectReasons::PRE_EXISTING_LINK, "PRE_EXISTING_LINK"),
            (RejectReasons::SIGNAL_TOO_WEAK, "SIGNAL_TOO_WEAK"),
            (RejectReasons::INTEGRITY, "INTEGRITY"),
        ];

        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(reason, _)| self.contains(*reason))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "RejectReasons({})", names.join(" | "))
    }
}

/// Screens a beacon that passed the integrity check
pub fn screen_beacon(
    beacon_level: HopLevel,
    my_level: HopLevel,
    has_link: bool,
    rssi: i16,
    rssi_floor: i16,
) -> RejectReasons {
    let mut reasons = RejectReasons::empty();
    if beacon_level >= my_level {
        reasons |= RejectReasons::SOURCE_LEVEL;
    }
    if has_link {
        reasons |= RejectReasons::PRE_EXISTING_LINK;
    }
    if rssi < rssi_floor {
        reasons |= RejectReasons::SIGNAL_TOO_WEAK;
    }
    reasons
}

/// Sub-slot in which a child replies to a beacon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplySlot {
    pub index: usize,
    pub offset: u16,
}

/// Picks the reply slot for a rolled seed byte
pub fn reply_slot(seed: u8) -> ReplySlot {
    let index = seed as usize % MAX_LINKS_PER_SLOT;
    ReplySlot {
        index,
        offset: SLOT_OFFSETS[index],
    }
}

/// Addresses of the children that joined during one beacon cycle
#[derive(Debug, Clone)]
pub struct JoinedList {
    children: Vec<Address>,
    capacity: usize,
}

impl JoinedList {
    pub fn with_capacity(capacity: usize) -> Self {
        JoinedList {
            children: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Records a child, returning false when the list is full
    pub fn push(&mut self, child: Address) -> bool {
        if self.children.len() >= self.capacity {
            return false;
        }
        self.children.push(child);
        true
    }

    pub fn clear(&mut self) {
        self.children.clear();
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn as_slice(&self) -> &[Address] {
        &self.children
    }
}

/// Result of one parent-role beacon cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconOutcome {
    /// Children that joined, in order of arrival
    pub joined: Vec<Address>,
}

/// Link established by a successful join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinInfo {
    pub parent: Address,
    pub level: HopLevel,
    pub slot: ReplySlot,
    pub seed: RandomSeed,
}

/// Result of one child-role join attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined(JoinInfo),
    NoBeacon(RejectReasons),
}

/// What a discovery step did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryStep {
    Beacon(BeaconOutcome),
    Join(JoinOutcome),
}

/// Node state maintained by the discovery engine
#[derive(Debug, Clone)]
struct NodeState {
    level: HopLevel,
    parent: Option<Address>,
    have_network_time: bool,
    join_attempts: u32,
    freq_adjust_index: u8,
}

/// Runs the join protocol in both roles
///
/// As a parent the engine broadcasts beacons and links the children that
/// answer. As a child it listens for a beacon from a node closer to the hub,
/// synchronizes to it and answers with a request to join.
pub struct DiscoveryEngine {
    config: Config,
    address: Address,
    codec: FrameCodec,
    routes: RouteTable,
    joined: JoinedList,
    mode: Option<DiscoveryMode>,
    state: NodeState,
    io: Peripherals,
}

impl DiscoveryEngine {
    /// Creates an engine for the node described by `config`
    pub fn new(config: Config, io: Peripherals) -> Result<Self> {
        config.validate()?;

        let address = io.identity.own_address();
        if address != config.address {
            return Err(Error::config(format!(
                "identity address {} does not match configured address {}",
                address, config.address
            )));
        }

        // The hub is the time reference of the network
        let have_network_time = config.is_hub;
        let level = if config.is_hub { HopLevel::HUB } else { HopLevel::UNATTACHED };
        let routes = RouteTable::with_capacity(address, config.is_hub, config.max_edges);
        let joined = JoinedList::with_capacity(MAX_LINKS_PER_SLOT * config.beacons_per_cycle as usize);

        Ok(DiscoveryEngine {
            config,
            address,
            codec: FrameCodec::new(),
            routes,
            joined,
            mode: None,
            state: NodeState {
                level,
                parent: None,
                have_network_time,
                join_attempts: 0,
                freq_adjust_index: 0,
            },
            io,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn is_hub(&self) -> bool {
        self.config.is_hub
    }

    pub fn level(&self) -> HopLevel {
        self.state.level
    }

    /// Returns whether the node is part of a tree
    pub fn is_attached(&self) -> bool {
        self.state.level != HopLevel::UNATTACHED
    }

    pub fn parent(&self) -> Option<Address> {
        self.state.parent
    }

    pub fn has_network_time(&self) -> bool {
        self.state.have_network_time
    }

    pub fn join_attempts(&self) -> u32 {
        self.state.join_attempts
    }

    pub fn freq_adjust_index(&self) -> u8 {
        self.state.freq_adjust_index
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn routes_mut(&mut self) -> &mut RouteTable {
        &mut self.routes
    }

    pub fn system_time(&self) -> u32 {
        self.io.time.system_time_seconds()
    }

    /// Starts a discovery policy at the current system time
    pub fn set_discovery_mode(&mut self, policy: DiscoveryPolicy) {
        let mode = DiscoveryMode::new(policy, self.system_time());
        info!("Discovery mode {:?} for {}s", policy, mode.max_duration);
        self.mode = Some(mode);
    }

    /// The current discovery mode, `None` until one is set
    pub fn discovery_mode(&self) -> Option<DiscoveryMode> {
        self.mode
    }

    /// Returns whether the discovery window is open at `now`
    pub fn is_discovery_active(&self, now: u32) -> bool {
        self.mode.map_or(false, |mode| mode.is_active(now))
    }

    /// Runs one discovery step if the discovery window is open
    ///
    /// Attached nodes invite children, unattached nodes look for a parent.
    pub fn run_discovery_step(&mut self) -> Result<Option<DiscoveryStep>> {
        let now = self.system_time();
        if !self.is_discovery_active(now) {
            return Ok(None);
        }

        if self.is_attached() {
            self.send_beacon().map(|outcome| Some(DiscoveryStep::Beacon(outcome)))
        } else {
            self.request_to_join().map(|outcome| Some(DiscoveryStep::Join(outcome)))
        }
    }

    /// Broadcasts beacons and links the children that reply
    pub fn send_beacon(&mut self) -> Result<BeaconOutcome> {
        self.joined.clear();

        self.io.transport.set_channel(self.config.discovery_channel)?;
        self.io.transport.wake_up();

        let result = self.beacon_cycles();
        self.io.transport.quit();
        result?;

        let joined = self.joined.as_slice().to_vec();
        if !joined.is_empty() {
            let event = ReportEvent::ChildJoined { children: joined.clone() };
            let priority = event.default_priority();
            self.io.reports.log_event(event, priority);
            self.io.indicator.blip();
        }

        Ok(BeaconOutcome { joined })
    }

    fn beacon_cycles(&mut self) -> Result<()> {
        for cycle in 0..self.config.beacons_per_cycle {
            self.transmit_beacon()?;
            let joins = self.wait_for_request_to_join();
            debug!("Beacon {} answered by {} children", cycle, joins);

            if !self.io.tasks.has_free_link_slot() {
                debug!("No free link slot, ending beacon cycle");
                break;
            }
        }
        Ok(())
    }

    fn transmit_beacon(&mut self) -> Result<()> {
        let beacon = Beacon {
            level: self.state.level,
            source: self.address,
            group: self.io.identity.group_id(),
            seconds: self.io.time.system_time_seconds(),
            sub_second: self.io.time.sub_second(),
        };
        let frame = self.codec.build_beacon(beacon)?;

        self.io.transport.load_tx_buffer(&frame)?;
        self.io.transport.tx_rx_switch(RadioMode::Transmit);
        self.io.transport.send()
    }

    fn wait_for_request_to_join(&mut self) -> usize {
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let mut joins = 0;

        self.io.time.set_link_slot_alarm(true);
        loop {
            self.io.transport.tx_rx_switch(RadioMode::Receive);
            let len = match self.io.transport.wait_for_message_or_timeout(&mut buf, false) {
                Some(len) => len.min(buf.len()),
                None => break,
            };

            match self.codec.check_integrity(&buf[..len], MessageId::RequestToJoin, Some(self.address)) {
                Ok(Frame { message: Message::RequestToJoin(request), .. }) => {
                    self.accept_request_to_join(request);
                    joins += 1;
                }
                Ok(_) => {}
                Err(e) => debug!("Discarding frame: {}", e),
            }

            if self.io.time.check_alarm(Alarm::LinkSlot) {
                break;
            }
        }
        self.io.time.set_link_slot_alarm(false);

        joins
    }

    fn accept_request_to_join(&mut self, request: RequestToJoin) {
        let child = request.source;
        debug!("RTJ< {} with {} edges", child, request.edges.len());

        if let Some(task) = self.io.tasks.search_link(child) {
            warn!("Link to {} is stale, relinking", child);
            self.io.tasks.release_link(child);
            if let Err(e) = self.routes.node_unjoin(child) {
                debug!("Unjoin of {} skipped: {}", child, e);
            }
            self.io.tasks.destroy_task(task);

            let event = ReportEvent::LinkBroken { peer: child };
            let priority = event.default_priority();
            self.io.reports.log_event(event, priority);
        }

        if let Err(e) = self.routes.node_join(Address::NONE, child, &request.edges) {
            warn!("Routing table rejected join of {}: {}", child, e);
        }

        if let Err(e) = self.io.tasks.create_operational_task(child, request.seed, LinkRole::Parent) {
            warn!("Failed to create task for {}: {}", child, e);
        }

        if !self.joined.push(child) {
            warn!("Joined list full, {} left out of the report", child);
        }
        info!("Child {} joined", child);
    }

    /// Listens for a beacon and requests to join its sender
    pub fn request_to_join(&mut self) -> Result<JoinOutcome> {
        self.state.join_attempts = self.state.join_attempts.wrapping_add(1);

        self.io.time.set_link_slot_alarm(false);
        self.io.time.set_latency_timer(true);
        if let Err(e) = self.io.transport.set_channel(self.config.discovery_channel) {
            self.io.time.set_latency_timer(false);
            return Err(e);
        }
        self.io.transport.wake_up();

        let beacon = match self.wait_for_beacon() {
            Ok(beacon) => beacon,
            Err(reasons) => {
                self.io.transport.quit();
                self.io.time.set_latency_timer(false);
                debug!("No beacon accepted: {:?}", reasons);
                return Ok(JoinOutcome::NoBeacon(reasons));
            }
        };

        self.io.time.set_latency_timer(false);
        let latency = self.io.time.read_latency_timer();
        let parent = beacon.source;
        debug!("BCN< {} at level {}", parent, beacon.level.level());

        self.io.time.set_secondary_clock(beacon.seconds);
        let sub_second = beacon
            .sub_second
            .wrapping_add(latency)
            .wrapping_add(self.config.latency_compensation);
        self.io.time.set_sub_second(sub_second);

        let slot = reply_slot(self.io.seeds.next_slot_seed());
        let seed = self.io.seeds.next_seed();

        let request = RequestToJoin {
            source: self.address,
            seed,
            edges: self.routes.subtree_edges(),
        };
        let reply_seconds = self.io.time.secondary_clock_seconds();
        let reply_sub_second = sub_second.wrapping_add(slot.offset);

        let sent = self.transmit_request_to_join(parent, request, reply_seconds, reply_sub_second);
        self.io.transport.quit();
        if let Err(e) = sent {
            warn!("Request to join {} not sent: {}", parent, e);
            return Err(e);
        }

        // Only a node whose request went out belongs to the tree
        self.state.have_network_time = true;
        self.state.level = beacon.level.next();
        self.io.identity.set_group_id(beacon.group);
        self.state.parent = Some(parent);

        self.io.tasks.convert_join_slots_to_sleep();
        if let Err(e) = self.io.tasks.create_operational_task(parent, seed, LinkRole::Child) {
            warn!("Failed to create task for parent {}: {}", parent, e);
        }
        self.state.freq_adjust_index = 0;

        let event = ReportEvent::JoinedNetwork { parent };
        let priority = event.default_priority();
        self.io.reports.log_event(event, priority);
        self.io.indicator.blip();

        info!("Joined {} at level {} in slot {}", parent, self.state.level.level(), slot.index);

        Ok(JoinOutcome::Joined(JoinInfo {
            parent,
            level: self.state.level,
            slot,
            seed,
        }))
    }

    fn wait_for_beacon(&mut self) -> std::result::Result<Beacon, RejectReasons> {
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let mut reasons = RejectReasons::empty();

        while !self.io.time.check_alarm(Alarm::SubSlotWarning) {
            let len = match self.io.transport.wait_for_message_or_timeout(&mut buf, true) {
                Some(len) => len.min(buf.len()),
                None => {
                    reasons |= RejectReasons::TIMEOUT;
                    break;
                }
            };

            match self.codec.check_integrity(&buf[..len], MessageId::Beacon, None) {
                Ok(Frame { message: Message::Beacon(beacon), .. }) => {
                    let has_link = self.io.tasks.search_link(beacon.source).is_some();
                    let rssi = self.io.transport.request_rssi();
                    let rejected = screen_beacon(
                        beacon.level,
                        self.state.level,
                        has_link,
                        rssi,
                        self.config.rssi_floor_dbm,
                    );
                    if rejected.is_empty() {
                        return Ok(beacon);
                    }
                    debug!("Beacon from {} rejected: {:?}", beacon.source, rejected);
                    reasons |= rejected;
                }
                _ => reasons |= RejectReasons::INTEGRITY,
            }

            self.io.transport.tx_rx_switch(RadioMode::Receive);
        }

        // Reasons accumulate over the window; an empty set means nothing arrived
        if reasons.is_empty() {
            reasons = RejectReasons::TIMEOUT;
        }
        Err(reasons)
    }

    fn transmit_request_to_join(
        &mut self,
        parent: Address,
        request: RequestToJoin,
        seconds: u32,
        sub_second: u16,
    ) -> Result<()> {
        let frame = self.codec.build_request_to_join(parent, request)?;
        self.io.transport.load_tx_buffer(&frame)?;
        self.io.time.wait_until(seconds, sub_second);
        self.io.transport.tx_rx_switch(RadioMode::Transmit);
        self.io.transport.send()
    }
}
