mod support;

use support::{entry, TestDir};
use taskreg::activity::ActivityId;
use taskreg::affiliation::ChainRepairKind;
use taskreg::config::Config;
use taskreg::error::Error;
use taskreg::persist::{RegistrySnapshot, TaskPersister};
use taskreg::registry::TaskRegistry;
use taskreg::stack::{StackKind, StackPosition};
use taskreg::task::TaskId;

/// Three affiliated tasks saved to `dir`'s snapshot.
fn saved_chain(dir: &TestDir) -> (TaskRegistry, [TaskId; 3]) {
    let mut registry = dir.registry();
    let stack = registry.create_stack(StackKind::Fullscreen, None).expect("stack");
    let first = registry
        .create_task(entry(1, "Mail"), Some(stack), StackPosition::Top)
        .expect("create");
    let second = registry
        .create_task(entry(2, "Compose"), Some(stack), StackPosition::Top)
        .expect("create");
    let third = registry
        .create_task(entry(3, "Attachment"), Some(stack), StackPosition::Top)
        .expect("create");
    registry
        .set_task_to_affiliate_with(second, first)
        .expect("affiliate");
    registry
        .set_task_to_affiliate_with(third, second)
        .expect("affiliate");
    registry.save_snapshot().expect("save");
    (registry, [first, second, third])
}

#[test]
fn snapshot_restores_detached_tasks_with_their_chain() {
    let dir = TestDir::new();
    let (_, [first, second, third]) = saved_chain(&dir);
    assert!(dir.state_dir().join("tasks.snapshot.json").exists());

    let mut restored = dir.registry();
    let repairs = restored.load_snapshot().expect("load");
    assert!(repairs.is_empty());
    assert_eq!(restored.len(), 3);
    assert_eq!(
        restored.affiliation_chain(third).expect("chain"),
        vec![first, second, third]
    );

    for task in restored.tasks() {
        assert_eq!(task.stack(), None);
        assert_eq!(task.len(), 1);
        assert!(task
            .activities()
            .iter()
            .all(|activity| activity.task() == Some(task.id())));
    }
}

#[test]
fn missing_snapshot_loads_nothing() {
    let dir = TestDir::new();
    let mut registry = dir.registry();
    assert!(registry.load_snapshot().expect("load").is_empty());
    assert!(registry.is_empty());
}

#[test]
fn dangling_links_are_cut_on_load() {
    let dir = TestDir::new();
    let (registry, [first, second, third]) = saved_chain(&dir);

    let mut snapshot = registry.snapshot();
    snapshot.tasks.retain(|task| task.id() != second);
    dir.persister().write_snapshot(&snapshot).expect("write");

    let mut restored = dir.registry();
    let repairs = restored.load_snapshot().expect("load");
    assert_eq!(repairs.len(), 2);
    assert!(repairs
        .iter()
        .all(|repair| repair.kind == ChainRepairKind::MissingTask && repair.link == second));

    assert_eq!(restored.affiliation_chain(first).expect("chain"), vec![first]);
    assert_eq!(restored.affiliation_chain(third).expect("chain"), vec![third]);
}

#[test]
fn new_tasks_after_restore_get_fresh_ids() {
    let dir = TestDir::new();
    let (_, saved) = saved_chain(&dir);

    let mut restored = dir.registry();
    restored.load_snapshot().expect("load");
    let stack = restored.create_stack(StackKind::Fullscreen, None).expect("stack");
    let fresh = restored
        .create_task(entry(10, "Settings"), Some(stack), StackPosition::Top)
        .expect("create");
    assert!(saved.iter().all(|id| fresh.get() > id.get()));
}

#[test]
fn restoring_the_same_snapshot_twice_is_rejected() {
    let dir = TestDir::new();
    let (registry, _) = saved_chain(&dir);
    let snapshot: RegistrySnapshot = registry.snapshot();

    let mut restored = dir.registry();
    restored.restore(snapshot.clone()).expect("first restore");
    let err = restored.restore(snapshot).expect_err("duplicate");
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(restored.len(), 3);
}

/// One task per root, in a throwaway registry, as a snapshot.
fn snapshot_of(roots: &[(u64, &str)]) -> RegistrySnapshot {
    let mut registry = TaskRegistry::new(Config::default());
    let stack = registry.create_stack(StackKind::Fullscreen, None).expect("stack");
    for (id, class) in roots {
        registry
            .create_task(entry(*id, class), Some(stack), StackPosition::Top)
            .expect("create");
    }
    registry.snapshot()
}

#[test]
fn snapshot_listing_one_activity_in_two_tasks_is_rejected() {
    let mut snapshot = snapshot_of(&[(1, "Mail")]);
    let mut other = snapshot_of(&[(5, "Notes"), (1, "Mail")]);
    other.tasks.retain(|task| task.id() == TaskId::new(2));
    snapshot.tasks.append(&mut other.tasks);

    let mut registry = TaskRegistry::new(Config::default());
    let err = registry.restore(snapshot).expect_err("shared activity");
    assert!(matches!(
        err,
        Error::OwnershipConflict { activity, owner, target }
            if activity == ActivityId::new(1)
                && owner == TaskId::new(1)
                && target == TaskId::new(2)
    ));
    assert!(registry.is_empty());
}

#[test]
fn restore_rejects_activity_already_owned_by_a_live_task() {
    let mut registry = TaskRegistry::new(Config::default());
    registry.restore(snapshot_of(&[(1, "Mail")])).expect("first");

    let mut other = snapshot_of(&[(5, "Notes"), (1, "Mail")]);
    other.tasks.retain(|task| task.id() == TaskId::new(2));
    let err = registry.restore(other).expect_err("owned by task 1");
    assert!(matches!(err, Error::OwnershipConflict { owner, .. } if owner == TaskId::new(1)));
    assert_eq!(registry.len(), 1);
}

#[test]
fn restored_max_task_id_exhausts_allocation() {
    let dir = TestDir::new();
    let (registry, _) = saved_chain(&dir);
    let mut json = serde_json::to_value(registry.snapshot()).expect("serialize");
    json["tasks"][0]["id"] = serde_json::json!(u32::MAX);
    let snapshot: RegistrySnapshot = serde_json::from_value(json).expect("deserialize");

    let mut restored = TaskRegistry::new(Config::default());
    restored.restore(snapshot).expect("restore");
    assert!(restored.task(TaskId::new(u32::MAX)).is_some());

    let stack = restored.create_stack(StackKind::Fullscreen, None).expect("stack");
    let err = restored
        .create_task(entry(10, "Settings"), Some(stack), StackPosition::Top)
        .expect_err("no task ids left");
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(restored.len(), 3);
}

#[test]
fn thumbnails_live_until_the_task_is_removed() {
    let dir = TestDir::new();
    let mut registry = dir.registry();
    let stack = registry.create_stack(StackKind::Fullscreen, None).expect("stack");
    let task = registry
        .create_task(entry(1, "Camera"), Some(stack), StackPosition::Top)
        .expect("create");

    assert!(registry.thumbnail(task).expect("thumbnail").is_none());
    registry.save_thumbnail(task, b"\x89PNG").expect("save");
    assert_eq!(
        registry.thumbnail(task).expect("thumbnail").as_deref(),
        Some(&b"\x89PNG"[..])
    );
    let image = dir.persister().image_path(task);
    assert!(image.exists());

    registry.remove_task(task).expect("remove");
    assert!(!image.exists());
    assert!(matches!(
        registry.thumbnail(task),
        Err(Error::TaskNotFound(_))
    ));
}
