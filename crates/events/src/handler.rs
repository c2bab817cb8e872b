use procurerp_core::Aggregate;

/// Handle `command` and apply the decided events in place.
///
/// Nothing is persisted or published; the infrastructure dispatcher does that.
/// Domain tests use this to walk an aggregate through its lifecycle.
pub fn execute<A: Aggregate>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error> {
    let events = aggregate.handle(command)?;
    replay(aggregate, &events);
    Ok(events)
}

/// Apply a history in order.
pub fn replay<'a, A, I>(aggregate: &mut A, events: I)
where
    A: Aggregate,
    A::Event: 'a,
    I: IntoIterator<Item = &'a A::Event>,
{
    for event in events {
        aggregate.apply(event);
    }
}
