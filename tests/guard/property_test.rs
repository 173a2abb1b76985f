/*!
 * Property Tests
 * Fast work always returns its value; the phase machine settles at most once
 */

use deadline_guard::core::guard::*;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
enum Op {
    Arm,
    Fire,
    Disarm,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Arm), Just(Op::Fire), Just(Op::Disarm)]
}

fn expected(phase: Phase, op: Op) -> (bool, Phase) {
    match (op, phase) {
        (Op::Arm, Phase::Idle) => (true, Phase::Armed),
        (Op::Fire, Phase::Armed) => (true, Phase::Fired),
        (Op::Disarm, Phase::Armed) => (true, Phase::Disarmed),
        (_, p) => (false, p),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_fast_work_returns_value(work_ms in 0u64..20, value in any::<i64>(), propagate in any::<bool>()) {
        let policy = if propagate { ExpiryPolicy::Propagate } else { ExpiryPolicy::Suppress };
        let guard = SignalInterruptGuard::with_policy(
            Arc::new(TimerService::with_clock()),
            Duration::from_millis(work_ms + 250),
            policy,
        )
        .unwrap();

        let result = guard.run(|scope| {
            scope.sleep(Duration::from_millis(work_ms))?;
            Ok(value)
        });

        prop_assert_eq!(result.unwrap(), Some(value));
        prop_assert!(!guard.service().is_held());
    }
}

proptest! {
    #[test]
    fn prop_phase_transitions(ops in prop::collection::vec(op(), 0..32)) {
        let cell = PhaseCell::new();
        let mut model = Phase::Idle;

        for op in ops {
            let before = model;
            let (accepted, after) = expected(before, op);
            let result = match op {
                Op::Arm => cell.arm(),
                Op::Fire => cell.fire(),
                Op::Disarm => cell.disarm(),
            };
            prop_assert_eq!(result, accepted, "{:?} from {}", op, before);
            prop_assert_eq!(cell.get(), after);
            model = after;
        }

        // Once settled, no operation moves the cell again
        if model.is_settled() {
            prop_assert!(!cell.arm() && !cell.fire() && !cell.disarm());
            prop_assert_eq!(cell.get(), model);
        }
    }
}
