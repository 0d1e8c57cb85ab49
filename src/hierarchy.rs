//! Parent-pointer trees shared by tasks and goals.
//!
//! Both trees are stored as a nullable parent id on the row itself. Validation and
//! traversal work on an id -> parent adjacency map loaded with a single query, so a
//! cycle check is a bounded upward walk over plain integers.

use std::collections::{HashMap, HashSet};

use log::warn;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};

use crate::entities::{goal, task};
use crate::error::AppError;

pub trait ParentLookup {
    /// Parent of `id`, or `None` for a root or an id the lookup does not know.
    fn parent_of(&self, id: i64) -> Option<i64>;
}

#[derive(Clone, Debug, Default)]
pub struct ParentMap {
    parents: HashMap<i64, Option<i64>>,
}

impl ParentMap {
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (i64, Option<i64>)>,
    {
        Self {
            parents: pairs.into_iter().collect(),
        }
    }

    /// Children of every node, each list in ascending id order.
    pub fn children_index(&self) -> ChildIndex {
        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        for (id, parent) in &self.parents {
            if let Some(parent) = parent {
                children.entry(*parent).or_default().push(*id);
            }
        }
        for ids in children.values_mut() {
            ids.sort_unstable();
        }
        ChildIndex { children }
    }
}

impl ParentLookup for ParentMap {
    fn parent_of(&self, id: i64) -> Option<i64> {
        self.parents.get(&id).copied().flatten()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ChildIndex {
    children: HashMap<i64, Vec<i64>>,
}

impl ChildIndex {
    pub fn children_of(&self, id: i64) -> &[i64] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every id strictly below `root`, parents before children.
    pub fn descendant_ids(&self, root: i64) -> Vec<i64> {
        let mut visited = HashSet::from([root]);
        let mut ordered = Vec::new();
        let mut stack: Vec<i64> = self.children_of(root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            ordered.push(id);
            stack.extend(self.children_of(id).iter().rev().copied());
        }
        ordered
    }

    /// Builds the nested subtree below `root`. `make` receives the node id, its level
    /// (1 for direct children) and its already-built children.
    pub fn build<T, F>(&self, root: i64, mut make: F) -> Vec<T>
    where
        F: FnMut(i64, u32, Vec<T>) -> T,
    {
        let mut visited = HashSet::from([root]);
        self.build_level(root, 1, &mut visited, &mut make)
    }

    fn build_level<T, F>(
        &self,
        parent: i64,
        level: u32,
        visited: &mut HashSet<i64>,
        make: &mut F,
    ) -> Vec<T>
    where
        F: FnMut(i64, u32, Vec<T>) -> T,
    {
        let mut nodes = Vec::new();
        for &id in self.children_of(parent) {
            if !visited.insert(id) {
                warn!("event=tree_walk module=hierarchy status=skipped reason=revisit id={id}");
                continue;
            }
            let children = self.build_level(id, level + 1, visited, make);
            nodes.push(make(id, level, children));
        }
        nodes
    }
}

/// Reports whether making `proposed_parent_id` the parent of `node_id` would close a
/// loop, i.e. whether `node_id` is `proposed_parent_id` or one of its ancestors.
///
/// A chain that already loops without passing through `node_id` ends the walk and
/// counts as no new cycle.
pub fn would_create_cycle<L>(lookup: &L, node_id: i64, proposed_parent_id: i64) -> bool
where
    L: ParentLookup + ?Sized,
{
    if proposed_parent_id == node_id {
        return true;
    }

    let mut visited = HashSet::new();
    let mut current = proposed_parent_id;
    while visited.insert(current) {
        match lookup.parent_of(current) {
            Some(parent) if parent == node_id => return true,
            Some(parent) => current = parent,
            None => return false,
        }
    }
    false
}

pub trait TreeNode {
    fn children(&self) -> &[Self]
    where
        Self: Sized;
}

impl TreeNode for crate::model::GoalNode {
    fn children(&self) -> &[Self] {
        &self.children
    }
}

impl TreeNode for crate::model::TaskNode {
    fn children(&self) -> &[Self] {
        &self.children
    }
}

/// Total number of nodes in a forest returned by a descendant walk.
pub fn count_descendants<N: TreeNode>(nodes: &[N]) -> usize {
    nodes
        .iter()
        .map(|node| 1 + count_descendants(node.children()))
        .sum()
}

pub async fn goal_parent_map<C: ConnectionTrait>(db: &C) -> Result<ParentMap, AppError> {
    let rows: Vec<(i64, Option<i64>)> = goal::Entity::find()
        .select_only()
        .column(goal::Column::Id)
        .column(goal::Column::ParentGoalId)
        .into_tuple()
        .all(db)
        .await?;
    Ok(ParentMap::from_pairs(rows))
}

pub async fn task_parent_map<C: ConnectionTrait>(
    db: &C,
    project_id: i64,
) -> Result<ParentMap, AppError> {
    let rows: Vec<(i64, Option<i64>)> = task::Entity::find()
        .select_only()
        .column(task::Column::Id)
        .column(task::Column::ParentTaskId)
        .filter(task::Column::ProjectId.eq(project_id))
        .into_tuple()
        .all(db)
        .await?;
    Ok(ParentMap::from_pairs(rows))
}

/// Ancestors of `start`, root first, direct parent last.
pub async fn goal_ancestor_chain<C: ConnectionTrait>(
    db: &C,
    start: &goal::Model,
) -> Result<Vec<goal::Model>, AppError> {
    let mut chain = Vec::new();
    let mut seen = HashSet::from([start.id]);
    let mut next = start.parent_goal_id;
    while let Some(parent_id) = next {
        if !seen.insert(parent_id) {
            return Err(AppError::Validation(format!(
                "goal hierarchy above goal id {} loops through goal id {parent_id}",
                start.id
            )));
        }
        let Some(parent) = goal::Entity::find_by_id(parent_id).one(db).await? else {
            break;
        };
        next = parent.parent_goal_id;
        chain.push(parent);
    }
    chain.reverse();
    Ok(chain)
}

/// Ancestors of `start`, root first, direct parent last.
pub async fn task_ancestor_chain<C: ConnectionTrait>(
    db: &C,
    start: &task::Model,
) -> Result<Vec<task::Model>, AppError> {
    let mut chain = Vec::new();
    let mut seen = HashSet::from([start.id]);
    let mut next = start.parent_task_id;
    while let Some(parent_id) = next {
        if !seen.insert(parent_id) {
            return Err(AppError::Validation(format!(
                "task hierarchy above task id {} loops through task id {parent_id}",
                start.id
            )));
        }
        let Some(parent) = task::Entity::find_by_id(parent_id).one(db).await? else {
            break;
        };
        next = parent.parent_task_id;
        chain.push(parent);
    }
    chain.reverse();
    Ok(chain)
}

/// Loads every goal below `root` keyed by id, together with the child index used to
/// nest them.
pub async fn goal_subtree<C: ConnectionTrait>(
    db: &C,
    root: i64,
) -> Result<(ChildIndex, HashMap<i64, goal::Model>), AppError> {
    let index = goal_parent_map(db).await?.children_index();
    let ids = index.descendant_ids(root);
    let rows = if ids.is_empty() {
        Vec::new()
    } else {
        goal::Entity::find()
            .filter(goal::Column::Id.is_in(ids))
            .order_by_asc(goal::Column::Id)
            .all(db)
            .await?
    };
    Ok((index, rows.into_iter().map(|row| (row.id, row)).collect()))
}

/// Same as [`goal_subtree`] for the task tree of one project.
pub async fn task_subtree<C: ConnectionTrait>(
    db: &C,
    root: &task::Model,
) -> Result<(ChildIndex, HashMap<i64, task::Model>), AppError> {
    let index = task_parent_map(db, root.project_id).await?.children_index();
    let ids = index.descendant_ids(root.id);
    let rows = if ids.is_empty() {
        Vec::new()
    } else {
        task::Entity::find()
            .filter(task::Column::Id.is_in(ids))
            .order_by_asc(task::Column::Id)
            .all(db)
            .await?
    };
    Ok((index, rows.into_iter().map(|row| (row.id, row)).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskNode;

    fn chain() -> ParentMap {
        // 1 <- 2 <- 3 <- 4, plus 5 under 2 and a lone root 9.
        ParentMap::from_pairs([
            (1, None),
            (2, Some(1)),
            (3, Some(2)),
            (4, Some(3)),
            (5, Some(2)),
            (9, None),
        ])
    }

    #[test]
    fn self_parent_is_a_cycle() {
        assert!(would_create_cycle(&chain(), 3, 3));
    }

    #[test]
    fn descendant_as_parent_is_a_cycle() {
        let map = chain();
        assert!(would_create_cycle(&map, 1, 4));
        assert!(would_create_cycle(&map, 2, 3));
        assert!(would_create_cycle(&map, 2, 5));
    }

    #[test]
    fn non_descendant_parent_is_not_a_cycle() {
        let map = chain();
        assert!(!would_create_cycle(&map, 4, 1));
        assert!(!would_create_cycle(&map, 5, 3));
        assert!(!would_create_cycle(&map, 1, 9));
        assert!(!would_create_cycle(&map, 9, 4));
    }

    #[test]
    fn cycle_iff_proposed_parent_is_in_subtree() {
        let map = chain();
        let index = map.children_index();
        for node in [1, 2, 3, 4, 5, 9] {
            let mut subtree = index.descendant_ids(node);
            subtree.push(node);
            for candidate in [1, 2, 3, 4, 5, 9] {
                assert_eq!(
                    would_create_cycle(&map, node, candidate),
                    subtree.contains(&candidate),
                    "node {node} candidate {candidate}"
                );
            }
        }
    }

    #[test]
    fn existing_loop_elsewhere_is_not_a_new_cycle() {
        let map = ParentMap::from_pairs([(1, Some(2)), (2, Some(1)), (7, None)]);
        assert!(!would_create_cycle(&map, 7, 1));
    }

    #[test]
    fn unknown_parent_ends_the_walk() {
        let map = ParentMap::from_pairs([(1, Some(42))]);
        assert!(!would_create_cycle(&map, 5, 1));
    }

    #[test]
    fn descendant_ids_lists_parents_first() {
        let index = chain().children_index();
        assert_eq!(index.descendant_ids(1), vec![2, 3, 4, 5]);
        assert_eq!(index.descendant_ids(4), Vec::<i64>::new());
    }

    #[test]
    fn build_assigns_levels_and_counts() {
        let index = chain().children_index();
        let nodes = index.build(1, |id, level, children: Vec<TaskNode>| TaskNode {
            id,
            title: format!("t{id}"),
            status: "todo".to_string(),
            level,
            subtask_count: children.len(),
            children,
        });
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, 2);
        assert_eq!(nodes[0].level, 1);
        assert_eq!(nodes[0].subtask_count, 2);
        assert_eq!(nodes[0].children[0].id, 3);
        assert_eq!(nodes[0].children[0].children[0].level, 3);
        assert_eq!(count_descendants(&nodes), 4);
    }

    #[test]
    fn build_survives_a_loop_through_the_root() {
        let index = ParentMap::from_pairs([(1, Some(2)), (2, Some(1))]).children_index();
        let nodes = index.build(1, |id, level, children: Vec<TaskNode>| TaskNode {
            id,
            title: String::new(),
            status: String::new(),
            level,
            subtask_count: children.len(),
            children,
        });
        assert_eq!(count_descendants(&nodes), 1);
    }
}
