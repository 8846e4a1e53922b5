//! In-memory collaborators for simulating a node
//!
//! Every simulated collaborator is a cheap handle over shared state: hand a
//! clone to the engine and keep one to script inputs and inspect what the
//! engine did.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::{Address, Error, GroupId, LinkRole, RandomSeed, Result, MAX_LINKS_PER_SLOT};
use super::report::EventLog;
use super::seed::RandomSeeds;
use super::traits::{
    Alarm, IdentityStore, Indicator, Peripherals, RadioMode, TaskId, TaskScheduler,
    TimeService, Transport,
};

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct RadioState {
    channel: Option<u8>,
    awake: bool,
    mode: Option<RadioMode>,
    tx_buffer: Vec<u8>,
    sent: Vec<Vec<u8>>,
    inbox: VecDeque<(Vec<u8>, i16)>,
    last_rssi: i16,
    wake_count: usize,
    fail_sends: bool,
}

/// Simulated radio fed from a queue of received frames
///
/// A receive with an empty queue times out.
#[derive(Debug, Clone, Default)]
pub struct SimRadio {
    state: Arc<Mutex<RadioState>>,
}

impl SimRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a frame to be received with the given signal strength
    pub fn queue_frame(&self, frame: &[u8], rssi: i16) {
        lock(&self.state).inbox.push_back((frame.to_vec(), rssi));
    }

    /// Makes every following send fail until switched off again
    pub fn fail_sends(&self, fail: bool) {
        lock(&self.state).fail_sends = fail;
    }

    /// Frames transmitted so far
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        lock(&self.state).sent.clone()
    }

    /// Removes and returns the transmitted frames
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut lock(&self.state).sent)
    }

    pub fn pending_frames(&self) -> usize {
        lock(&self.state).inbox.len()
    }

    pub fn is_awake(&self) -> bool {
        lock(&self.state).awake
    }

    pub fn wake_count(&self) -> usize {
        lock(&self.state).wake_count
    }

    pub fn channel(&self) -> Option<u8> {
        lock(&self.state).channel
    }
}

impl Transport for SimRadio {
    fn set_channel(&mut self, channel: u8) -> Result<()> {
        lock(&self.state).channel = Some(channel);
        Ok(())
    }

    fn wake_up(&mut self) {
        let mut state = lock(&self.state);
        state.awake = true;
        state.wake_count += 1;
    }

    fn quit(&mut self) {
        let mut state = lock(&self.state);
        state.awake = false;
        state.mode = None;
    }

    fn tx_rx_switch(&mut self, mode: RadioMode) {
        lock(&self.state).mode = Some(mode);
    }

    fn load_tx_buffer(&mut self, frame: &[u8]) -> Result<()> {
        lock(&self.state).tx_buffer = frame.to_vec();
        Ok(())
    }

    fn send(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.awake {
            return Err(Error::transport("radio is asleep"));
        }
        if state.mode != Some(RadioMode::Transmit) {
            return Err(Error::transport("radio is not in transmit mode"));
        }
        if state.fail_sends {
            return Err(Error::transport("transmission failed"));
        }
        let frame = std::mem::take(&mut state.tx_buffer);
        state.sent.push(frame);
        Ok(())
    }

    fn request_rssi(&mut self) -> i16 {
        lock(&self.state).last_rssi
    }

    fn wait_for_message_or_timeout(&mut self, buf: &mut [u8], _want_rssi: bool) -> Option<usize> {
        let mut state = lock(&self.state);
        let (frame, rssi) = state.inbox.pop_front()?;
        state.last_rssi = rssi;
        let len = frame.len().min(buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        Some(len)
    }
}

#[derive(Debug, Default)]
struct ClockState {
    system_seconds: u32,
    secondary_seconds: u32,
    sub_second: u16,
    link_slot_alarm: bool,
    latency_running: bool,
    latency_ticks: u16,
    link_slot_script: VecDeque<bool>,
    sub_slot_script: VecDeque<bool>,
    waits: Vec<(u32, u16)>,
}

/// Simulated clocks whose alarms follow a script
///
/// An alarm without scripted values never fires.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    state: Arc<Mutex<ClockState>>,
}

impl SimClock {
    pub fn new(system_seconds: u32) -> Self {
        let clock = Self::default();
        lock(&clock.state).system_seconds = system_seconds;
        clock
    }

    pub fn set_system_seconds(&self, seconds: u32) {
        lock(&self.state).system_seconds = seconds;
    }

    /// Ticks the latency timer reports once stopped
    pub fn set_latency_ticks(&self, ticks: u16) {
        lock(&self.state).latency_ticks = ticks;
    }

    /// Appends values returned by successive checks of `alarm`
    pub fn script_alarm(&self, alarm: Alarm, fired: &[bool]) {
        let mut state = lock(&self.state);
        let script = match alarm {
            Alarm::LinkSlot => &mut state.link_slot_script,
            Alarm::SubSlotWarning => &mut state.sub_slot_script,
        };
        script.extend(fired.iter().copied());
    }

    pub fn link_slot_alarm_armed(&self) -> bool {
        lock(&self.state).link_slot_alarm
    }

    pub fn latency_timer_running(&self) -> bool {
        lock(&self.state).latency_running
    }

    /// Points in time the engine waited for
    pub fn waits(&self) -> Vec<(u32, u16)> {
        lock(&self.state).waits.clone()
    }
}

impl TimeService for SimClock {
    fn system_time_seconds(&self) -> u32 {
        lock(&self.state).system_seconds
    }

    fn set_link_slot_alarm(&mut self, on: bool) {
        lock(&self.state).link_slot_alarm = on;
    }

    fn set_latency_timer(&mut self, on: bool) {
        lock(&self.state).latency_running = on;
    }

    fn read_latency_timer(&self) -> u16 {
        lock(&self.state).latency_ticks
    }

    fn set_secondary_clock(&mut self, seconds: u32) {
        lock(&self.state).secondary_seconds = seconds;
    }

    fn secondary_clock_seconds(&self) -> u32 {
        lock(&self.state).secondary_seconds
    }

    fn sub_second(&self) -> u16 {
        lock(&self.state).sub_second
    }

    fn set_sub_second(&mut self, ticks: u16) {
        lock(&self.state).sub_second = ticks;
    }

    fn check_alarm(&mut self, alarm: Alarm) -> bool {
        let mut state = lock(&self.state);
        let script = match alarm {
            Alarm::LinkSlot => &mut state.link_slot_script,
            Alarm::SubSlotWarning => &mut state.sub_slot_script,
        };
        script.pop_front().unwrap_or(false)
    }

    fn wait_until(&mut self, seconds: u32, sub_second: u16) {
        lock(&self.state).waits.push((seconds, sub_second));
    }
}

#[derive(Debug)]
struct IdentityState {
    address: Address,
    group: GroupId,
}

/// Simulated identity store
#[derive(Debug, Clone)]
pub struct SimIdentity {
    state: Arc<Mutex<IdentityState>>,
}

impl SimIdentity {
    pub fn new(address: Address, group: GroupId) -> Self {
        SimIdentity {
            state: Arc::new(Mutex::new(IdentityState { address, group })),
        }
    }
}

impl IdentityStore for SimIdentity {
    fn own_address(&self) -> Address {
        lock(&self.state).address
    }

    fn group_id(&self) -> GroupId {
        lock(&self.state).group
    }

    fn set_group_id(&mut self, group: GroupId) {
        lock(&self.state).group = group;
    }
}

/// Operational task created for a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimTask {
    pub id: TaskId,
    pub peer: Address,
    pub seed: RandomSeed,
    pub role: LinkRole,
}

#[derive(Debug, Default)]
struct TaskState {
    tasks: Vec<SimTask>,
    next_id: u8,
    max_links: usize,
    destroyed: Vec<TaskId>,
    released: Vec<Address>,
    join_slots_asleep: bool,
}

/// Simulated task scheduler with a bounded number of links
#[derive(Debug, Clone)]
pub struct SimTasks {
    state: Arc<Mutex<TaskState>>,
}

impl Default for SimTasks {
    fn default() -> Self {
        Self::with_max_links(MAX_LINKS_PER_SLOT * 2)
    }
}

impl SimTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_links(max_links: usize) -> Self {
        SimTasks {
            state: Arc::new(Mutex::new(TaskState {
                max_links,
                ..Default::default()
            })),
        }
    }

    /// Live tasks
    pub fn tasks(&self) -> Vec<SimTask> {
        lock(&self.state).tasks.clone()
    }

    pub fn destroyed(&self) -> Vec<TaskId> {
        lock(&self.state).destroyed.clone()
    }

    pub fn released(&self) -> Vec<Address> {
        lock(&self.state).released.clone()
    }

    pub fn join_slots_asleep(&self) -> bool {
        lock(&self.state).join_slots_asleep
    }
}

impl TaskScheduler for SimTasks {
    fn search_link(&self, peer: Address) -> Option<TaskId> {
        lock(&self.state)
            .tasks
            .iter()
            .find(|task| task.peer == peer)
            .map(|task| task.id)
    }

    fn create_operational_task(&mut self, peer: Address, seed: RandomSeed, role: LinkRole) -> Result<TaskId> {
        let mut state = lock(&self.state);
        if state.tasks.len() >= state.max_links {
            return Err(Error::transport(format!("no free task for link to {}", peer)));
        }
        let id = TaskId(state.next_id);
        state.next_id = state.next_id.wrapping_add(1);
        state.tasks.push(SimTask { id, peer, seed, role });
        Ok(id)
    }

    fn destroy_task(&mut self, task: TaskId) {
        let mut state = lock(&self.state);
        state.tasks.retain(|t| t.id != task);
        state.destroyed.push(task);
    }

    fn release_link(&mut self, peer: Address) {
        lock(&self.state).released.push(peer);
    }

    fn has_free_link_slot(&self) -> bool {
        let state = lock(&self.state);
        state.tasks.len() < state.max_links
    }

    fn convert_join_slots_to_sleep(&mut self) {
        lock(&self.state).join_slots_asleep = true;
    }
}

/// Simulated buzzer counting blips
#[derive(Debug, Clone, Default)]
pub struct SimBuzzer {
    blips: Arc<Mutex<usize>>,
}

impl SimBuzzer {
    pub fn blips(&self) -> usize {
        *lock(&self.blips)
    }
}

impl Indicator for SimBuzzer {
    fn blip(&mut self) {
        *lock(&self.blips) += 1;
    }
}

/// A full set of simulated collaborators for one node
#[derive(Debug, Clone)]
pub struct SimNode {
    pub radio: SimRadio,
    pub clock: SimClock,
    pub identity: SimIdentity,
    pub tasks: SimTasks,
    pub log: EventLog,
    pub buzzer: SimBuzzer,
}

impl SimNode {
    pub fn new(address: Address, group: GroupId) -> Self {
        SimNode {
            radio: SimRadio::new(),
            clock: SimClock::new(0),
            identity: SimIdentity::new(address, group),
            tasks: SimTasks::new(),
            log: EventLog::new(),
            buzzer: SimBuzzer::default(),
        }
    }

    /// Peripherals sharing this node's state, with seeds drawn from `seed`
    pub fn peripherals(&self, seed: u64) -> Peripherals {
        Peripherals {
            transport: Box::new(self.radio.clone()),
            time: Box::new(self.clock.clone()),
            identity: Box::new(self.identity.clone()),
            tasks: Box::new(self.tasks.clone()),
            reports: Box::new(self.log.clone()),
            indicator: Box::new(self.buzzer.clone()),
            seeds: Box::new(RandomSeeds::seeded(seed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radio_queue() {
        let radio = SimRadio::new();
        let mut rx = radio.clone();
        radio.queue_frame(&[1, 2, 3], -40);

        let mut buf = [0u8; 8];
        assert_eq!(rx.wait_for_message_or_timeout(&mut buf, true), Some(3));
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(rx.request_rssi(), -40);
        assert_eq!(rx.wait_for_message_or_timeout(&mut buf, true), None);
    }

    #[test]
    fn test_radio_send_requires_transmit() {
        let radio = SimRadio::new();
        let mut tx = radio.clone();
        tx.wake_up();
        tx.load_tx_buffer(&[9]).unwrap();
        assert!(tx.send().is_err());

        tx.tx_rx_switch(RadioMode::Transmit);
        tx.send().unwrap();
        assert_eq!(radio.sent_frames(), vec![vec![9]]);
    }

    #[test]
    fn test_clock_script() {
        let clock = SimClock::new(10);
        let mut time = clock.clone();
        clock.script_alarm(Alarm::LinkSlot, &[false, true]);

        assert!(!time.check_alarm(Alarm::LinkSlot));
        assert!(time.check_alarm(Alarm::LinkSlot));
        assert!(!time.check_alarm(Alarm::LinkSlot));
        assert!(!time.check_alarm(Alarm::SubSlotWarning));
    }

    #[test]
    fn test_task_capacity() {
        let tasks = SimTasks::with_max_links(1);
        let mut sched = tasks.clone();
        let id = sched.create_operational_task(Address(2), 7, LinkRole::Parent).unwrap();
        assert!(!sched.has_free_link_slot());
        assert!(sched.create_operational_task(Address(3), 7, LinkRole::Parent).is_err());
        assert_eq!(sched.search_link(Address(2)), Some(id));

        sched.destroy_task(id);
        assert!(sched.has_free_link_slot());
        assert_eq!(tasks.destroyed(), vec![id]);
    }
}
