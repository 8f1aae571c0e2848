//! Affiliation chains.
//!
//! Tasks that belong together in recents (a document and the task that
//! launched it, say) form a doubly linked chain through their
//! `prev_affiliate`/`next_affiliate` ids. Every member shares the head's
//! `affiliated_task_id` and colour.
//!
//! Links are plain ids into the registry's task map, so a chain can be
//! inconsistent after a task disappears or a snapshot is edited by hand.
//! Walks here never trust a link blindly: a missing task, a task from
//! another chain or a repeated id ends the walk and is reported as a
//! [`ChainRepair`].

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::task::{Task, TaskId};

pub(crate) type TaskMap = BTreeMap<TaskId, Task>;

/// What was wrong with a link that got cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainRepairKind {
    /// The link pointed at a task that does not exist.
    MissingTask,
    /// The linked task belongs to a different chain.
    AffiliationMismatch,
    /// The two sides of the link disagree.
    AsymmetricLink,
    /// Following links came back around.
    Cycle,
}

impl fmt::Display for ChainRepairKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainRepairKind::MissingTask => write!(f, "missing_task"),
            ChainRepairKind::AffiliationMismatch => write!(f, "affiliation_mismatch"),
            ChainRepairKind::AsymmetricLink => write!(f, "asymmetric_link"),
            ChainRepairKind::Cycle => write!(f, "cycle"),
        }
    }
}

/// A link cut while walking or rebuilding a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainRepair {
    /// Task whose link was cleared.
    pub task: TaskId,
    /// Where the link pointed.
    pub link: TaskId,
    pub kind: ChainRepairKind,
}

impl ChainRepair {
    fn new(task: TaskId, link: TaskId, kind: ChainRepairKind) -> Self {
        warn!(task = %task, link = %link, %kind, "truncating affiliation chain");
        Self { task, link, kind }
    }
}

/// Unlink `id` from its chain, joining its neighbours to each other.
pub(crate) fn close_recents_chain(tasks: &mut TaskMap, id: TaskId) {
    let Some(task) = tasks.get(&id) else {
        return;
    };
    let (prev, next) = (task.prev_affiliate(), task.next_affiliate());

    if let Some(prev_task) = prev.and_then(|prev| tasks.get_mut(&prev)) {
        prev_task.set_next_affiliate(next);
    }
    if let Some(next_task) = next.and_then(|next| tasks.get_mut(&next)) {
        next_task.set_prev_affiliate(prev);
    }
    if let Some(task) = tasks.get_mut(&id) {
        task.set_prev_affiliate(None);
        task.set_next_affiliate(None);
    }
}

/// Move `id` out of its chain and append it to the tail of `target`'s.
///
/// The walk to the tail starts at `target`; a bad link found on the way is
/// cut and `id` is appended at the last good task.
pub(crate) fn set_task_to_affiliate_with(
    tasks: &mut TaskMap,
    id: TaskId,
    target: TaskId,
) -> Result<Vec<ChainRepair>> {
    if id == target {
        return Err(Error::InvalidArgument(format!(
            "task {id} cannot be affiliated with itself"
        )));
    }
    if !tasks.contains_key(&id) {
        return Err(Error::TaskNotFound(id));
    }
    let (affiliated_id, color) = match tasks.get(&target) {
        Some(target) => (target.affiliated_task_id(), target.affiliated_task_color()),
        None => return Err(Error::TaskNotFound(target)),
    };

    close_recents_chain(tasks, id);
    if let Some(task) = tasks.get_mut(&id) {
        task.set_affiliation(affiliated_id, color);
    }

    let mut repairs = Vec::new();
    let mut visited = HashSet::from([id, target]);
    let mut tail = target;
    loop {
        let Some(next) = tasks.get(&tail).and_then(Task::next_affiliate) else {
            break;
        };
        let kind = match tasks.get(&next) {
            _ if !visited.insert(next) => Some(ChainRepairKind::Cycle),
            None => Some(ChainRepairKind::MissingTask),
            Some(next_task) if next_task.affiliated_task_id() != affiliated_id => {
                Some(ChainRepairKind::AffiliationMismatch)
            }
            Some(_) => None,
        };
        match kind {
            Some(kind) => {
                repairs.push(ChainRepair::new(tail, next, kind));
                if kind == ChainRepairKind::AffiliationMismatch {
                    if let Some(next_task) = tasks.get_mut(&next) {
                        if next_task.prev_affiliate() == Some(tail) {
                            next_task.set_prev_affiliate(None);
                        }
                    }
                }
                if let Some(tail_task) = tasks.get_mut(&tail) {
                    tail_task.set_next_affiliate(None);
                }
                break;
            }
            None => tail = next,
        }
    }

    if let Some(tail_task) = tasks.get_mut(&tail) {
        tail_task.set_next_affiliate(Some(id));
    }
    if let Some(task) = tasks.get_mut(&id) {
        task.set_prev_affiliate(Some(tail));
        task.set_next_affiliate(None);
    }
    Ok(repairs)
}

/// First task of the chain containing `id`, following `prev` links.
pub fn chain_head(tasks: &BTreeMap<TaskId, Task>, id: TaskId) -> TaskId {
    let mut visited = HashSet::from([id]);
    let mut head = id;
    while let Some(prev) = tasks.get(&head).and_then(Task::prev_affiliate) {
        if !tasks.contains_key(&prev) || !visited.insert(prev) {
            break;
        }
        head = prev;
    }
    head
}

/// Tasks from `start` to the end of its chain, following `next` links.
pub fn chain_from(tasks: &BTreeMap<TaskId, Task>, start: TaskId) -> Vec<TaskId> {
    let mut out = Vec::new();
    if !tasks.contains_key(&start) {
        return out;
    }
    let mut visited = HashSet::new();
    let mut current = Some(start);
    while let Some(id) = current {
        if !tasks.contains_key(&id) || !visited.insert(id) {
            break;
        }
        out.push(id);
        current = tasks.get(&id).and_then(Task::next_affiliate);
    }
    out
}

/// Make every chain consistent after a bulk load.
///
/// A link survives only when both ends exist, both sides point at each
/// other and both tasks share an affiliation. Cycles are opened before the
/// task that heads the chain, or before the lowest id when none does.
pub(crate) fn rebuild_chains(tasks: &mut TaskMap) -> Vec<ChainRepair> {
    let mut repairs = Vec::new();
    let ids: Vec<TaskId> = tasks.keys().copied().collect();

    let mut cut_next = Vec::new();
    let mut cut_prev = Vec::new();
    for id in &ids {
        let Some(task) = tasks.get(id) else {
            continue;
        };
        if let Some(next) = task.next_affiliate() {
            let kind = match tasks.get(&next) {
                None => Some(ChainRepairKind::MissingTask),
                Some(other) if other.prev_affiliate() != Some(*id) => {
                    Some(ChainRepairKind::AsymmetricLink)
                }
                Some(other) if other.affiliated_task_id() != task.affiliated_task_id() => {
                    Some(ChainRepairKind::AffiliationMismatch)
                }
                Some(_) => None,
            };
            if let Some(kind) = kind {
                repairs.push(ChainRepair::new(*id, next, kind));
                cut_next.push(*id);
            }
        }
        if let Some(prev) = task.prev_affiliate() {
            let kind = match tasks.get(&prev) {
                None => Some(ChainRepairKind::MissingTask),
                Some(other) if other.next_affiliate() != Some(*id) => {
                    Some(ChainRepairKind::AsymmetricLink)
                }
                Some(other) if other.affiliated_task_id() != task.affiliated_task_id() => {
                    Some(ChainRepairKind::AffiliationMismatch)
                }
                Some(_) => None,
            };
            if let Some(kind) = kind {
                repairs.push(ChainRepair::new(*id, prev, kind));
                cut_prev.push(*id);
            }
        }
    }
    for id in cut_next {
        if let Some(task) = tasks.get_mut(&id) {
            task.set_next_affiliate(None);
        }
    }
    for id in cut_prev {
        if let Some(task) = tasks.get_mut(&id) {
            task.set_prev_affiliate(None);
        }
    }

    // Remaining links are mutual, so anything not reachable from a head is
    // part of a cycle.
    let mut reached = HashSet::new();
    for id in &ids {
        if tasks.get(id).is_some_and(|task| task.prev_affiliate().is_none()) {
            reached.extend(chain_from(tasks, *id));
        }
    }
    for id in &ids {
        if reached.contains(id) {
            continue;
        }
        let cycle = chain_from(tasks, *id);
        let head = cycle
            .iter()
            .copied()
            .find(|member| tasks.get(member).is_some_and(|task| task.affiliated_task_id() == *member))
            .unwrap_or_else(|| cycle.iter().copied().min().unwrap_or(*id));
        let Some(before) = tasks.get(&head).and_then(Task::prev_affiliate) else {
            continue;
        };
        repairs.push(ChainRepair::new(before, head, ChainRepairKind::Cycle));
        if let Some(task) = tasks.get_mut(&before) {
            task.set_next_affiliate(None);
        }
        if let Some(task) = tasks.get_mut(&head) {
            task.set_prev_affiliate(None);
        }
        reached.extend(chain_from(tasks, head));
    }

    repairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityEntry, ActivityId, ActivityInfo, ComponentName};
    use crate::config::Config;
    use crate::configuration::ConfigurationResolver;
    use crate::task::TaskPolicy;

    fn tasks(count: u32) -> TaskMap {
        let config = Config::default();
        let resolver = ConfigurationResolver::from_config(&config);
        let policy = TaskPolicy {
            registry: &config.registry,
            lock_task: &config.lock_task,
            resolver: &resolver,
        };
        let mut map = TaskMap::new();
        for raw in 1..=count {
            let info = ActivityInfo::new(ComponentName::new("com.example", format!("com.example.A{raw}")));
            let root = ActivityEntry::for_info(ActivityId::new(raw as u64), info);
            map.insert(TaskId::new(raw), Task::new(TaskId::new(raw), &root, &policy));
        }
        map
    }

    fn id(raw: u32) -> TaskId {
        TaskId::new(raw)
    }

    #[test]
    fn affiliating_appends_to_tail() {
        let mut map = tasks(3);
        set_task_to_affiliate_with(&mut map, id(2), id(1)).expect("affiliate 2");
        set_task_to_affiliate_with(&mut map, id(3), id(1)).expect("affiliate 3");

        assert_eq!(chain_from(&map, id(1)), vec![id(1), id(2), id(3)]);
        assert_eq!(chain_head(&map, id(3)), id(1));
        assert_eq!(map[&id(3)].affiliated_task_id(), id(1));
        assert_eq!(map[&id(3)].prev_affiliate(), Some(id(2)));
    }

    #[test]
    fn self_affiliation_rejected() {
        let mut map = tasks(1);
        let err = set_task_to_affiliate_with(&mut map, id(1), id(1)).expect_err("self");
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn closing_joins_neighbours() {
        let mut map = tasks(3);
        set_task_to_affiliate_with(&mut map, id(2), id(1)).expect("affiliate");
        set_task_to_affiliate_with(&mut map, id(3), id(1)).expect("affiliate");

        close_recents_chain(&mut map, id(2));
        assert_eq!(chain_from(&map, id(1)), vec![id(1), id(3)]);
        assert_eq!(map[&id(2)].prev_affiliate(), None);
        assert_eq!(map[&id(2)].next_affiliate(), None);
    }

    #[test]
    fn mismatched_link_is_truncated() {
        let mut map = tasks(4);
        set_task_to_affiliate_with(&mut map, id(2), id(1)).expect("affiliate");
        // Point 2 at a task from another chain.
        map.get_mut(&id(2)).expect("task").set_next_affiliate(Some(id(3)));

        let repairs = set_task_to_affiliate_with(&mut map, id(4), id(1)).expect("affiliate");
        assert_eq!(repairs.len(), 1);
        assert_eq!(repairs[0].kind, ChainRepairKind::AffiliationMismatch);
        assert_eq!(chain_from(&map, id(1)), vec![id(1), id(2), id(4)]);
    }

    #[test]
    fn walks_terminate_on_cycles() {
        let mut map = tasks(2);
        map.get_mut(&id(1)).expect("task").set_next_affiliate(Some(id(2)));
        map.get_mut(&id(2)).expect("task").set_next_affiliate(Some(id(1)));
        map.get_mut(&id(1)).expect("task").set_prev_affiliate(Some(id(2)));
        map.get_mut(&id(2)).expect("task").set_prev_affiliate(Some(id(1)));

        assert_eq!(chain_from(&map, id(1)), vec![id(1), id(2)]);
        assert_eq!(chain_head(&map, id(1)), id(2));
    }

    #[test]
    fn rebuild_cuts_dangling_and_cyclic_links() {
        let mut map = tasks(3);
        set_task_to_affiliate_with(&mut map, id(2), id(1)).expect("affiliate");
        map.get_mut(&id(3)).expect("task").set_next_affiliate(Some(id(9)));
        // Close 1 <-> 2 into a cycle.
        map.get_mut(&id(2)).expect("task").set_next_affiliate(Some(id(1)));
        map.get_mut(&id(1)).expect("task").set_prev_affiliate(Some(id(2)));

        let repairs = rebuild_chains(&mut map);
        assert!(repairs
            .iter()
            .any(|repair| repair.task == id(3) && repair.kind == ChainRepairKind::MissingTask));
        assert!(repairs.iter().any(|repair| repair.kind == ChainRepairKind::Cycle));
        assert_eq!(chain_from(&map, id(1)), vec![id(1), id(2)]);
        assert_eq!(map[&id(1)].prev_affiliate(), None);
        assert_eq!(map[&id(3)].next_affiliate(), None);
    }
}
