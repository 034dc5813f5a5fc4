//! Scenario flag combinations: rejected ones fail before touching anything.

use pkideploy::{Deployer, Subsystem};
use pkideploy_test_utils::{DeployRoot, RecordingRunner};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct Flags {
    clone: bool,
    external: bool,
    subordinate: bool,
    standalone: bool,
    step_two: bool,
}

impl Flags {
    fn allowed_for(&self, subsystem: Subsystem) -> bool {
        let ca_roles = [self.clone, self.external, self.subordinate]
            .iter()
            .filter(|on| **on)
            .count();
        if subsystem == Subsystem::Ca && ca_roles > 1 {
            return false;
        }
        if self.standalone && (subsystem != Subsystem::Kra || self.clone) {
            return false;
        }
        !self.step_two || self.external || self.standalone
    }

    fn user_config(&self, subsystem: Subsystem) -> String {
        let b = |on: bool| if on { "True" } else { "False" };
        format!(
            "[{}]\n\
pki_skip_configuration = True\n\
pki_clone = {}\n\
pki_external = {}\n\
pki_subordinate = {}\n\
pki_standalone = {}\n\
pki_external_step_two = {}\n",
            subsystem.as_str(),
            b(self.clone),
            b(self.external),
            b(self.subordinate),
            b(self.standalone),
            b(self.step_two),
        )
    }
}

fn flags() -> impl Strategy<Value = Flags> {
    (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
        |(clone, external, subordinate, standalone, step_two)| Flags {
            clone,
            external,
            subordinate,
            standalone,
            step_two,
        },
    )
}

fn subsystem() -> impl Strategy<Value = Subsystem> {
    prop_oneof![Just(Subsystem::Ca), Just(Subsystem::Kra), Just(Subsystem::Ocsp)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn rejected_scenarios_leave_filesystem_untouched(flags in flags(), subsystem in subsystem()) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let root = DeployRoot::new();
        let runner = Arc::new(RecordingRunner::new());
        let deployer = Deployer::new(runner.clone());
        let user = root.user_config("flags.cfg", &flags.user_config(subsystem));
        let before = root.snapshot();

        let result = rt.block_on(deployer.spawn(root.spawn_request(subsystem, Some(user))));

        if !flags.allowed_for(subsystem) {
            prop_assert!(matches!(&result, Err(e) if e.is_preflight()));
        } else if !flags.clone && !flags.step_two {
            // Clones need a PKCS#12 bundle and step two needs an installed
            // instance; everything else lays out cleanly.
            prop_assert!(result.is_ok(), "{:?}", result.as_ref().err());
        }
        if let Err(e) = &result {
            if e.is_preflight() {
                prop_assert_eq!(root.snapshot(), before);
                prop_assert!(runner.calls().is_empty());
            }
        }
    }
}
