use serde::{Serialize, Deserialize};

/// Discovery policy deciding how long a node keeps looking for links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscoveryPolicy {
    /// No discovery
    Off,
    /// One-minute window
    Short,
    /// Four-hour window
    Long,
}

impl DiscoveryPolicy {
    /// Window length in seconds
    pub fn max_duration(&self) -> u32 {
        match self {
            DiscoveryPolicy::Off => 0,
            DiscoveryPolicy::Short => 60,
            DiscoveryPolicy::Long => 14_400,
        }
    }
}

/// The active discovery policy and when it began
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryMode {
    pub policy: DiscoveryPolicy,
    /// System seconds at which the policy was set
    pub start_time: u32,
    /// Window length in seconds
    pub max_duration: u32,
}

impl DiscoveryMode {
    /// Starts `policy` at system time `now`
    pub fn new(policy: DiscoveryPolicy, now: u32) -> Self {
        DiscoveryMode {
            policy,
            start_time: now,
            max_duration: policy.max_duration(),
        }
    }

    /// Returns whether the discovery window is still open at `now`
    pub fn is_active(&self, now: u32) -> bool {
        now.wrapping_sub(self.start_time) < self.max_duration
    }
}
