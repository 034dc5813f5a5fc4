//! Scenario flags and the rules that constrain them.

use crate::config::ParameterStore;
use crate::types::{SecurityDomainType, Subsystem};
use pkideploy_shared::errors::{DeployError, DeployResult};

/// Booleans selecting which derivation and validation rules apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScenarioFlags {
    pub clone: bool,
    pub external: bool,
    pub subordinate: bool,
    pub standalone: bool,
    pub external_step_two: bool,
    pub skip_configuration: bool,
    pub skip_installation: bool,
}

impl ScenarioFlags {
    pub fn from_store(store: &ParameterStore) -> DeployResult<Self> {
        let external_step_two = store.get_bool("pki_external_step_two")?;
        Ok(Self {
            clone: store.get_bool("pki_clone")?,
            external: store.get_bool("pki_external")?,
            subordinate: store.get_bool("pki_subordinate")?,
            standalone: store.get_bool("pki_standalone")?,
            external_step_two,
            skip_configuration: store.get_bool("pki_skip_configuration")?,
            // Step two re-enters an instance laid out by step one
            skip_installation: store.get_bool("pki_skip_installation")? || external_step_two,
        })
    }

    /// Reject contradictory combinations before anything is touched.
    pub fn validate(&self, subsystem: Subsystem) -> DeployResult<()> {
        if subsystem == Subsystem::Ca {
            let roles = [
                (self.clone, "clone"),
                (self.external, "external"),
                (self.subordinate, "subordinate"),
            ];
            let set: Vec<&str> = roles
                .iter()
                .filter(|(on, _)| *on)
                .map(|(_, name)| *name)
                .collect();
            if set.len() > 1 {
                return Err(DeployError::config(format!(
                    "a CA cannot be {} at the same time",
                    set.join(" and ")
                )));
            }
        }

        if self.standalone && subsystem != Subsystem::Kra {
            return Err(DeployError::config(format!(
                "standalone deployment is not supported for {subsystem}"
            )));
        }
        if self.standalone && self.clone {
            return Err(DeployError::config(
                "a standalone subsystem cannot be a clone",
            ));
        }
        if self.external_step_two && !(self.external || self.standalone) {
            return Err(DeployError::config(
                "pki_external_step_two requires pki_external or pki_standalone",
            ));
        }

        Ok(())
    }

    /// First half of a two-step bootstrap: emit CSRs and stop.
    pub fn is_step_one(&self) -> bool {
        (self.external || self.standalone) && !self.external_step_two
    }

    pub fn is_step_two(&self) -> bool {
        self.external_step_two
    }

    pub fn security_domain_type(&self, subsystem: Subsystem) -> SecurityDomainType {
        let joins = subsystem != Subsystem::Ca || self.clone || self.subordinate;
        if joins && !self.standalone {
            SecurityDomainType::Existing
        } else {
            SecurityDomainType::New
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(clone: bool, external: bool, subordinate: bool) -> ScenarioFlags {
        ScenarioFlags {
            clone,
            external,
            subordinate,
            ..Default::default()
        }
    }

    #[test]
    fn test_ca_role_matrix() {
        for bits in 0u8..8 {
            let f = flags(bits & 1 != 0, bits & 2 != 0, bits & 4 != 0);
            let expected_ok = bits.count_ones() <= 1;
            assert_eq!(f.validate(Subsystem::Ca).is_ok(), expected_ok, "{f:?}");
        }
    }

    #[test]
    fn test_role_matrix_only_applies_to_ca() {
        assert!(flags(true, true, false).validate(Subsystem::Kra).is_ok());
    }

    #[test]
    fn test_standalone_rules() {
        let standalone = ScenarioFlags {
            standalone: true,
            ..Default::default()
        };
        assert!(standalone.validate(Subsystem::Kra).is_ok());
        assert!(standalone.validate(Subsystem::Ca).is_err());

        let standalone_clone = ScenarioFlags {
            clone: true,
            ..standalone
        };
        assert!(standalone_clone.validate(Subsystem::Kra).is_err());
    }

    #[test]
    fn test_step_two_requires_two_step_scenario() {
        let lone = ScenarioFlags {
            external_step_two: true,
            ..Default::default()
        };
        assert!(lone.validate(Subsystem::Ca).is_err());

        let external = ScenarioFlags {
            external: true,
            ..lone
        };
        assert!(external.validate(Subsystem::Ca).is_ok());
        assert!(!external.is_step_one());
        assert!(external.is_step_two());
    }

    #[test]
    fn test_security_domain_type() {
        use SecurityDomainType::*;
        assert_eq!(ScenarioFlags::default().security_domain_type(Subsystem::Ca), New);
        assert_eq!(flags(false, true, false).security_domain_type(Subsystem::Ca), New);
        assert_eq!(flags(true, false, false).security_domain_type(Subsystem::Ca), Existing);
        assert_eq!(flags(false, false, true).security_domain_type(Subsystem::Ca), Existing);
        assert_eq!(ScenarioFlags::default().security_domain_type(Subsystem::Kra), Existing);

        let standalone = ScenarioFlags {
            standalone: true,
            ..Default::default()
        };
        assert_eq!(standalone.security_domain_type(Subsystem::Kra), New);
    }
}
