use anyhow::Context;
use stage_approval::{
    ApprovalQueue, Bucket, EntityKind, RecordStore, SledStore, WorkflowError,
    config::{AppConfig, LoadOptions},
    role::Actor,
    telemetry,
};
use std::collections::BTreeMap;

// walks one cube test report through the chain, with a detour into rejection
fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(LoadOptions::default()).context("loading approval.toml")?;
    telemetry::init_logging(&config.logging)?;

    let store = SledStore::open(&config.store, config.policies()?)?;
    let entity = EntityKind::CubeTest;
    let engine = store.engine(entity);

    let clerk = Actor::from_session("u-100", "ravi", "ROLE_USER");
    let mut submit = ApprovalQueue::open(&store, entity, clerk)?;

    let mut payload = BTreeMap::new();
    payload.insert("grade".to_string(), "M40".to_string());
    payload.insert("strength_mpa".to_string(), "41.7".to_string());
    let report = submit.submit(payload)?;
    let second = submit.submit(BTreeMap::new())?;
    println!("submitted {} and {}", report.id, second.id);

    for (n, name) in (1..=engine.levels()).zip(["asha", "bilal", "chen", "dara", "emre"]) {
        let actor = Actor::from_session(&format!("u-{n}"), name, &format!("L{n}"));
        let mut queue = ApprovalQueue::open(&store, entity, actor)?;

        println!("{name}: {} pending", queue.bucket(Bucket::Pending).len());
        let stage = queue.approve(&report.id)?;
        println!("  approved {} -> {}", report.id, stage.describe(engine.levels()));
    }

    let l1 = Actor::from_session("u-1", "asha", "ROLE_L1");
    let mut queue = ApprovalQueue::open(&store, entity, l1)?;

    match queue.reject(&second.id, "") {
        Err(WorkflowError::Transition(err)) => println!("refused locally: {err}"),
        other => println!("unexpected outcome: {other:?}"),
    }
    let stage = queue.reject(&second.id, "cube cracked before test")?;
    println!("rejected {} -> {stage}", second.id);

    for record in store.list(entity)? {
        let rejection = record
            .rejection
            .as_ref()
            .map(|r| format!(" ({})", r.reason))
            .unwrap_or_default();
        println!(
            "{} {}{rejection}",
            record.id,
            record.stage.describe(engine.levels())
        );
    }

    Ok(())
}
