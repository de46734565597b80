// Copyright 2026 roster Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

use roster_common::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Timing of the two background sweepers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Period of the write-back sweep.
    ///
    /// Default: 5s.
    pub flush_interval: Duration,
    /// Period of the eviction sweep.
    ///
    /// Default: 1s.
    pub reclaim_interval: Duration,
    /// How long an entry must stay clean before it can be evicted.
    ///
    /// Default: 60s.
    pub grace_period: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(5),
            reclaim_interval: Duration::from_secs(1),
            grace_period: Duration::from_secs(60),
        }
    }
}

impl SweepConfig {
    /// Check that both sweep periods are non-zero.
    ///
    /// A zero grace period is allowed and evicts clean entries on the first sweep after they are flushed.
    pub fn validate(&self) -> Result<()> {
        if self.flush_interval.is_zero() {
            return Err(Error::config("flush_interval", "must be non-zero"));
        }
        if self.reclaim_interval.is_zero() {
            return Err(Error::config("reclaim_interval", "must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use roster_common::error::ErrorKind;

    use super::*;

    #[test]
    fn test_validate() {
        assert!(SweepConfig::default().validate().is_ok());

        let config = SweepConfig {
            flush_interval: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::Config);

        let config = SweepConfig {
            reclaim_interval: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::Config);

        let config = SweepConfig {
            grace_period: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let config: SweepConfig = serde_json::from_str(r#"{ "grace_period": { "secs": 120, "nanos": 0 } }"#).unwrap();
        assert_eq!(config.grace_period, Duration::from_secs(120));
        assert_eq!(config.flush_interval, Duration::from_secs(5));
        assert_eq!(config.reclaim_interval, Duration::from_secs(1));
    }
}
