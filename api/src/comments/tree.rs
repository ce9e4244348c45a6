use std::{collections::HashMap, str::FromStr};

use serde::Serialize;

use crate::models::comment::Comment;

/// What to do with comments whose parent is not part of the loaded set,
/// e.g. because the parent was hidden by a moderator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrphanPolicy {
    /// Show orphans as if they were root comments.
    #[default]
    Promote,
    /// Leave orphans and all their replies out.
    Drop,
}

impl FromStr for OrphanPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "promote" => Ok(OrphanPolicy::Promote),
            "drop" => Ok(OrphanPolicy::Drop),
            other => Err(format!("unknown orphan policy `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ThreadedComment {
    #[serde(flatten)]
    pub comment: Comment,
    pub depth: usize,
}

/// Orders the comments of one target in threaded order: every comment is
/// followed by its replies, depth first, and siblings keep creation order.
///
/// With `branches`, only the subtrees rooted at those comment ids are
/// emitted, in the order given. Ids that are unknown or were already emitted
/// as part of an earlier branch are skipped.
pub fn threaded_order(
    mut comments: Vec<Comment>,
    branches: Option<&[i32]>,
    orphans: OrphanPolicy,
) -> Vec<ThreadedComment> {
    comments.sort_by_key(|c| (c.submit_date, c.id));

    let position: HashMap<i32, usize> = comments
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id, i))
        .collect();

    let mut children: HashMap<usize, Vec<usize>> = HashMap::with_capacity(comments.len());
    let mut roots: Vec<usize> = vec![];

    for (i, comment) in comments.iter().enumerate() {
        match comment.parent_id.and_then(|p| position.get(&p)) {
            Some(&parent) if parent != i => children.entry(parent).or_default().push(i),
            Some(_) => {}
            None if comment.parent_id.is_none() || orphans == OrphanPolicy::Promote => {
                roots.push(i)
            }
            None => {}
        }
    }

    let starts: Vec<(usize, usize)> = match branches {
        None => roots.into_iter().map(|i| (i, 0)).collect(),
        Some(ids) => ids
            .iter()
            .filter_map(|id| position.get(id).copied())
            .filter_map(|i| ancestry_depth(&comments, &position, i, orphans).map(|d| (i, d)))
            .collect(),
    };

    let mut emitted = vec![false; comments.len()];
    let mut order: Vec<(usize, usize)> = Vec::with_capacity(comments.len());
    // Explicit stack, threads can be arbitrarily deep
    let mut stack: Vec<(usize, usize)> = vec![];

    for start in starts {
        stack.push(start);
        while let Some((i, depth)) = stack.pop() {
            if emitted[i] {
                continue;
            }
            emitted[i] = true;
            order.push((i, depth));

            if let Some(replies) = children.get(&i) {
                stack.extend(replies.iter().rev().map(|&r| (r, depth + 1)));
            }
        }
    }

    let mut slots: Vec<Option<Comment>> = comments.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|(i, depth)| {
            slots[i]
                .take()
                .map(|comment| ThreadedComment { comment, depth })
        })
        .collect()
}

/// Number of ancestors above `i` in the loaded set, or `None` when the
/// comment hangs off a dropped orphan or sits on a parent cycle.
fn ancestry_depth(
    comments: &[Comment],
    position: &HashMap<i32, usize>,
    i: usize,
    orphans: OrphanPolicy,
) -> Option<usize> {
    let mut depth = 0;
    let mut current = i;

    while let Some(parent_id) = comments[current].parent_id {
        match position.get(&parent_id) {
            Some(&parent) => {
                depth += 1;
                if depth > comments.len() {
                    return None;
                }
                current = parent;
            }
            None if orphans == OrphanPolicy::Promote => break,
            None => return None,
        }
    }

    Some(depth)
}
