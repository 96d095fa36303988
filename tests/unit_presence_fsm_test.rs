use amfd::core::avnd::clc::{ClcOutcome, ClcStep};
use amfd::core::avnd::presence::{self, AvndComp, CompEffect};
use amfd::core::model::comp::{Component, ComponentType};
use amfd::core::model::dn::Dn;
use amfd::core::model::states::{CompCapability, CompCategory, PresenceState};
use std::time::Duration;

fn comp(max_without_delay: u32, max_with_delay: u32) -> AvndComp {
    let ctype = ComponentType::new(
        Dn::new("safVersion=1,safCompType=T1").unwrap(),
        CompCategory::SaAware,
        CompCapability::OneActiveOrOneStandby,
    );
    let mut config = Component::from_type(
        Dn::new("safComp=C1,safSu=SU1,safSg=SG1,safApp=A1").unwrap(),
        Dn::new("safSu=SU1,safSg=SG1,safApp=A1").unwrap(),
        &ctype,
    );
    config.max_instantiate_without_delay = max_without_delay;
    config.max_instantiate_with_delay = max_with_delay;
    config.delay_between_instantiate_attempts = Duration::from_millis(50);
    AvndComp::new(config)
}

fn outcome(comp: &AvndComp, step: ClcStep, ok: bool) -> ClcOutcome {
    ClcOutcome {
        comp: comp.config.dn.clone(),
        step,
        ok,
        timed_out: false,
    }
}

#[test]
fn test_happy_path_instantiate_then_terminate() {
    let mut c = comp(2, 0);
    let effects = presence::start_instantiate(&mut c);
    assert_eq!(c.presence, PresenceState::Instantiating);
    assert!(effects.contains(&CompEffect::Exec(ClcStep::Instantiate)));

    let o = outcome(&c, ClcStep::Instantiate, true);
    let effects = presence::on_clc(&mut c, &o);
    assert_eq!(c.presence, PresenceState::Instantiated);
    assert!(effects.contains(&CompEffect::Became(PresenceState::Instantiated)));

    presence::start_terminate(&mut c);
    assert_eq!(c.presence, PresenceState::Terminating);
    let o = outcome(&c, ClcStep::Terminate, true);
    presence::on_clc(&mut c, &o);
    assert_eq!(c.presence, PresenceState::Uninstantiated);
}

#[test]
fn test_back_to_back_retries_then_delayed_then_failed() {
    let mut c = comp(2, 2);
    presence::start_instantiate(&mut c);

    // Attempt 1 fails: still within the without-delay budget.
    let o = outcome(&c, ClcStep::Instantiate, false);
    let effects = presence::on_clc(&mut c, &o);
    assert_eq!(effects, vec![CompEffect::Exec(ClcStep::Instantiate)]);

    // Attempt 2 fails: the delayed phase begins.
    let effects = presence::on_clc(&mut c, &o);
    assert_eq!(
        effects,
        vec![CompEffect::RetryAfter(Duration::from_millis(50))]
    );

    // Attempt 3 fails: one more delayed try remains.
    let effects = presence::on_clc(&mut c, &o);
    assert_eq!(
        effects,
        vec![CompEffect::RetryAfter(Duration::from_millis(50))]
    );

    // Attempt 4 fails: give up into the terminal repair state.
    let effects = presence::on_clc(&mut c, &o);
    assert_eq!(c.presence, PresenceState::InstantiationFailed);
    assert!(effects.contains(&CompEffect::Became(PresenceState::InstantiationFailed)));
}

#[test]
fn test_terminate_failure_escalates_to_cleanup() {
    let mut c = comp(2, 0);
    presence::start_instantiate(&mut c);
    let o = outcome(&c, ClcStep::Instantiate, true);
    presence::on_clc(&mut c, &o);

    presence::start_terminate(&mut c);
    let o = outcome(&c, ClcStep::Terminate, false);
    let effects = presence::on_clc(&mut c, &o);
    assert_eq!(effects, vec![CompEffect::Exec(ClcStep::Cleanup)]);

    // Cleanup failure is terminal.
    let o = outcome(&c, ClcStep::Cleanup, false);
    presence::on_clc(&mut c, &o);
    assert_eq!(c.presence, PresenceState::TerminationFailed);
}

#[test]
fn test_restart_cycles_through_terminate_and_instantiate() {
    let mut c = comp(2, 0);
    presence::start_instantiate(&mut c);
    let o = outcome(&c, ClcStep::Instantiate, true);
    presence::on_clc(&mut c, &o);

    let effects = presence::start_restart(&mut c);
    assert_eq!(c.presence, PresenceState::Restarting);
    assert!(effects.contains(&CompEffect::Exec(ClcStep::Terminate)));

    let o = outcome(&c, ClcStep::Terminate, true);
    let effects = presence::on_clc(&mut c, &o);
    assert_eq!(c.presence, PresenceState::Instantiating);
    assert!(effects.contains(&CompEffect::Exec(ClcStep::Instantiate)));

    let o = outcome(&c, ClcStep::Instantiate, true);
    presence::on_clc(&mut c, &o);
    assert_eq!(c.presence, PresenceState::Instantiated);
    assert!(!c.restarting);
}

#[test]
fn test_healthcheck_failure_reports_error() {
    let mut c = comp(2, 0);
    presence::start_instantiate(&mut c);
    let o = outcome(&c, ClcStep::Instantiate, true);
    presence::on_clc(&mut c, &o);

    let o = outcome(&c, ClcStep::Healthcheck, false);
    let effects = presence::on_clc(&mut c, &o);
    assert_eq!(effects, vec![CompEffect::HealthcheckFailed]);
    assert_eq!(c.presence, PresenceState::Instantiated, "presence unchanged");
}

#[test]
fn test_instantiate_ignored_outside_uninstantiated() {
    let mut c = comp(2, 0);
    presence::start_instantiate(&mut c);
    let o = outcome(&c, ClcStep::Instantiate, true);
    presence::on_clc(&mut c, &o);
    assert!(presence::start_instantiate(&mut c).is_empty());
}
