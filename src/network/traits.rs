//! Contracts the discovery engine requires from the rest of the firmware
//!
//! None of these are implemented by the engine itself. [`super::sim`]
//! provides in-memory versions for simulation and tests.

use crate::core::{Address, GroupId, LinkRole, RandomSeed, Result};
use super::report::{ReportEvent, ReportPriority};

/// Direction of the half-duplex radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    Transmit,
    Receive,
}

/// Half-duplex radio transceiver
pub trait Transport {
    /// Tunes the radio to a channel
    fn set_channel(&mut self, channel: u8) -> Result<()>;

    /// Powers up and initializes the radio
    fn wake_up(&mut self);

    /// Powers down the radio
    fn quit(&mut self);

    /// Switches between transmit and receive
    fn tx_rx_switch(&mut self, mode: RadioMode);

    /// Loads a complete frame into the transmit buffer
    fn load_tx_buffer(&mut self, frame: &[u8]) -> Result<()>;

    /// Transmits the loaded frame
    fn send(&mut self) -> Result<()>;

    /// Signal strength of the last received frame in dBm
    fn request_rssi(&mut self) -> i16;

    /// Blocks until a frame arrives or the receive window times out
    ///
    /// Returns the number of bytes written to `buf`, or `None` on timeout.
    fn wait_for_message_or_timeout(&mut self, buf: &mut [u8], want_rssi: bool) -> Option<usize>;
}

/// Hardware alarms polled by the discovery wait loops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alarm {
    /// End of the link slot in which children may reply to a beacon
    LinkSlot,
    /// Warning that the current sub-slot is about to end
    SubSlotWarning,
}

/// Clocks, timers and alarms
pub trait TimeService {
    /// System time in seconds
    fn system_time_seconds(&self) -> u32;

    /// Arms or disarms the link-slot alarm
    fn set_link_slot_alarm(&mut self, on: bool);

    /// Starts or stops the latency timer
    fn set_latency_timer(&mut self, on: bool);

    /// Ticks counted by the latency timer
    fn read_latency_timer(&self) -> u16;

    /// Loads the secondary clock, leaving the primary clock and its alarms alone
    fn set_secondary_clock(&mut self, seconds: u32);

    fn secondary_clock_seconds(&self) -> u32;

    fn sub_second(&self) -> u16;

    fn set_sub_second(&mut self, ticks: u16);

    /// Returns whether the alarm has fired
    fn check_alarm(&mut self, alarm: Alarm) -> bool;

    /// Blocks until the secondary clock reaches `seconds` plus `sub_second` ticks
    fn wait_until(&mut self, seconds: u32, sub_second: u16);
}

/// Persistent node identity and network group
pub trait IdentityStore {
    fn own_address(&self) -> Address;

    fn group_id(&self) -> GroupId;

    fn set_group_id(&mut self, group: GroupId);
}

/// Index of a task in the scheduler's task table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub u8);

/// Cooperative scheduler running the steady-state per-link traffic
pub trait TaskScheduler {
    /// Finds the operational task linked to `peer`
    fn search_link(&self, peer: Address) -> Option<TaskId>;

    /// Creates the operational task for a new link
    fn create_operational_task(&mut self, peer: Address, seed: RandomSeed, role: LinkRole) -> Result<TaskId>;

    fn destroy_task(&mut self, task: TaskId);

    /// Frees the link block held for `peer`
    fn release_link(&mut self, peer: Address);

    /// Returns whether another link can be accepted
    fn has_free_link_slot(&self) -> bool;

    /// Turns the slots reserved for join attempts into sleep slots
    fn convert_join_slots_to_sleep(&mut self);
}

/// Persistent report of protocol events
pub trait ReportLogger {
    fn log_event(&mut self, event: ReportEvent, priority: ReportPriority);
}

/// Audible indicator
pub trait Indicator {
    /// Short blip signalling an established link
    fn blip(&mut self);
}

/// System random seed generator
pub trait SeedSource {
    /// Small rolled seed used to pick a reply sub-slot
    fn next_slot_seed(&mut self) -> u8;

    /// Full rolled seed coordinating communication with a new link peer
    fn next_seed(&mut self) -> RandomSeed;
}

/// The collaborators a discovery engine drives
pub struct Peripherals {
    pub transport: Box<dyn Transport + Send>,
    pub time: Box<dyn TimeService + Send>,
    pub identity: Box<dyn IdentityStore + Send>,
    pub tasks: Box<dyn TaskScheduler + Send>,
    pub reports: Box<dyn ReportLogger + Send>,
    pub indicator: Box<dyn Indicator + Send>,
    pub seeds: Box<dyn SeedSource + Send>,
}
