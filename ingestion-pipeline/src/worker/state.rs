use common::error::AppError;
use state_machines::{core::GuardError, state_machine};

state_machine! {
    name: BatchMachine,
    state: BatchState,
    initial: Accumulating,
    states: [Accumulating, Embedded, Committed, RolledBack],
    events {
        embed { transition: { from: Accumulating, to: Embedded } }
        commit { transition: { from: Embedded, to: Committed } }
        roll_back { transition: { from: Embedded, to: RolledBack } }
        abandon { transition: { from: Accumulating, to: RolledBack } }
    }
}

pub fn accumulating() -> BatchMachine<(), Accumulating> {
    BatchMachine::new(())
}

pub(crate) fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid batch transition during {event}: {guard:?}"
    ))
}
