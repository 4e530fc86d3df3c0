use state_machines::state_machine;

/// `received -> parsed -> authenticated -> validated -> persisted -> announced`,
/// with a `reject` event reachable from any non-terminal state so a batch
/// that fails partway through always lands in one well-defined end state.
state_machine! {
    name: BatchMachine,
    state: BatchState,
    initial: Received,
    states: [Received, Parsed, Authenticated, Validated, Persisted, Announced, Rejected],
    events {
        parse { transition: { from: Received, to: Parsed } }
        authenticate { transition: { from: Parsed, to: Authenticated } }
        validate { transition: { from: Authenticated, to: Validated } }
        persist { transition: { from: Validated, to: Persisted } }
        announce { transition: { from: Persisted, to: Announced } }
        reject {
            transition: { from: Received, to: Rejected }
            transition: { from: Parsed, to: Rejected }
            transition: { from: Authenticated, to: Rejected }
            transition: { from: Validated, to: Rejected }
        }
    }
}

pub fn ready() -> BatchMachine<(), Received> {
    BatchMachine::new(())
}
