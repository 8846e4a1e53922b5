//! Network formation module
//!
//! This module runs the join handshake that builds the routing tree: parents
//! beacon, children answer with a request to join, and both sides hand the
//! new link to the task scheduler.

pub mod discovery;
pub mod mode;
pub mod report;
pub mod scheduler;
pub mod seed;
pub mod sim;
pub mod traits;

pub use self::discovery::{
    reply_slot, screen_beacon, BeaconOutcome, DiscoveryEngine, DiscoveryStep, JoinInfo,
    JoinOutcome, JoinedList, RejectReasons, ReplySlot, SLOT_OFFSETS,
};
pub use self::mode::{DiscoveryMode, DiscoveryPolicy};
pub use self::report::{EventLog, ReportEvent, ReportPriority, ReportRecord};
pub use self::scheduler::{DiscoveryScheduler, SchedulerHandle};
pub use self::seed::RandomSeeds;
pub use self::traits::{
    Alarm, IdentityStore, Indicator, Peripherals, RadioMode, ReportLogger, SeedSource,
    TaskId, TaskScheduler, TimeService, Transport,
};
