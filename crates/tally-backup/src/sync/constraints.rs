//! Constraint evaluation for scheduled sync.
//!
//! A scheduled replication run only proceeds when the device can afford it:
//! unmetered network, charging, battery not critically low, the cloud-sync
//! flag on, and a signed-in identity. A failed constraint makes the run a
//! no-op, never an error. Evaluation is pure so the decision table is
//! testable without any host environment; manual sync skips it entirely.

use crate::settings::BackupSettings;
use std::fmt;

/// Host power and network facts.
pub trait DeviceConditions: Send + Sync {
    fn network_unmetered(&self) -> bool;
    fn charging(&self) -> bool;
    fn battery_low(&self) -> bool;
}

/// Remote identity facts. Login and logout belong to the host; this only
/// answers whether a credential exists right now.
pub trait IdentityProvider: Send + Sync {
    fn is_authenticated(&self) -> bool;

    /// Bearer credential for the remote store, present when signed in.
    fn access_token(&self) -> Option<String>;
}

/// The first constraint a skipped scheduled run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SyncDisabled,
    NotAuthenticated,
    MeteredNetwork,
    NotCharging,
    BatteryLow,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::SyncDisabled => "cloud sync disabled",
            SkipReason::NotAuthenticated => "not signed in",
            SkipReason::MeteredNetwork => "network is metered",
            SkipReason::NotCharging => "device not charging",
            SkipReason::BatteryLow => "battery critically low",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the first failed constraint, or `None` when a scheduled run may
/// proceed. Checked again between retry attempts so a run that loses its
/// conditions mid-flight cancels instead of burning the battery.
pub fn evaluate(
    settings: &BackupSettings,
    identity: &dyn IdentityProvider,
    conditions: &dyn DeviceConditions,
) -> Option<SkipReason> {
    if !settings.cloud_sync_enabled {
        return Some(SkipReason::SyncDisabled);
    }
    if !identity.is_authenticated() {
        return Some(SkipReason::NotAuthenticated);
    }
    if !conditions.network_unmetered() {
        return Some(SkipReason::MeteredNetwork);
    }
    if !conditions.charging() {
        return Some(SkipReason::NotCharging);
    }
    if conditions.battery_low() {
        return Some(SkipReason::BatteryLow);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedConditions {
        unmetered: bool,
        charging: bool,
        battery_low: bool,
    }

    impl DeviceConditions for FixedConditions {
        fn network_unmetered(&self) -> bool {
            self.unmetered
        }
        fn charging(&self) -> bool {
            self.charging
        }
        fn battery_low(&self) -> bool {
            self.battery_low
        }
    }

    struct FixedIdentity {
        authenticated: bool,
    }

    impl IdentityProvider for FixedIdentity {
        fn is_authenticated(&self) -> bool {
            self.authenticated
        }
        fn access_token(&self) -> Option<String> {
            self.authenticated.then(|| "token".to_string())
        }
    }

    fn green_settings() -> BackupSettings {
        BackupSettings {
            cloud_sync_enabled: true,
            ..Default::default()
        }
    }

    fn green_conditions() -> FixedConditions {
        FixedConditions {
            unmetered: true,
            charging: true,
            battery_low: false,
        }
    }

    #[test]
    fn test_all_constraints_met() {
        let verdict = evaluate(
            &green_settings(),
            &FixedIdentity {
                authenticated: true,
            },
            &green_conditions(),
        );
        assert_eq!(verdict, None);
    }

    #[test]
    fn test_each_single_violation() {
        let identity = FixedIdentity {
            authenticated: true,
        };

        let disabled = BackupSettings::default();
        assert_eq!(
            evaluate(&disabled, &identity, &green_conditions()),
            Some(SkipReason::SyncDisabled)
        );

        assert_eq!(
            evaluate(
                &green_settings(),
                &FixedIdentity {
                    authenticated: false
                },
                &green_conditions()
            ),
            Some(SkipReason::NotAuthenticated)
        );

        let metered = FixedConditions {
            unmetered: false,
            ..green_conditions()
        };
        assert_eq!(
            evaluate(&green_settings(), &identity, &metered),
            Some(SkipReason::MeteredNetwork)
        );

        let unplugged = FixedConditions {
            charging: false,
            ..green_conditions()
        };
        assert_eq!(
            evaluate(&green_settings(), &identity, &unplugged),
            Some(SkipReason::NotCharging)
        );

        let drained = FixedConditions {
            battery_low: true,
            ..green_conditions()
        };
        assert_eq!(
            evaluate(&green_settings(), &identity, &drained),
            Some(SkipReason::BatteryLow)
        );
    }

    #[test]
    fn test_cheapest_violation_reported_first() {
        // Several violations at once report the settings flag, which needs
        // no host query at all.
        let verdict = evaluate(
            &BackupSettings::default(),
            &FixedIdentity {
                authenticated: false,
            },
            &FixedConditions {
                unmetered: false,
                charging: false,
                battery_low: true,
            },
        );
        assert_eq!(verdict, Some(SkipReason::SyncDisabled));
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::MeteredNetwork.to_string(), "network is metered");
        assert_eq!(SkipReason::NotCharging.to_string(), "device not charging");
    }
}
