//! Default plan used when the model produced nothing usable.

use std::cmp::Reverse;

use super::{Priority, Task, TimeBudget};

const DEFAULT_TASKS: &[(&str, &str, i64, Priority, &str)] = &[
    (
        "Clear desk surface",
        "Remove items from desk, wipe down surface, only return essential items",
        5,
        Priority::High,
        "Desk",
    ),
    (
        "Organize loose papers",
        "Sort papers into keep, recycle, and action piles. File what needs keeping.",
        10,
        Priority::High,
        "Desk",
    ),
    (
        "Put away clothes",
        "Fold or hang clean clothes, put dirty clothes in hamper",
        8,
        Priority::Medium,
        "Floor",
    ),
    (
        "Clear floor items",
        "Pick up items from floor and return to proper storage locations",
        5,
        Priority::High,
        "Floor",
    ),
    (
        "Organize shelf items",
        "Arrange books and items neatly, remove items that don't belong",
        10,
        Priority::Medium,
        "Shelves",
    ),
    (
        "Dust surfaces",
        "Wipe down all visible surfaces with microfiber cloth",
        8,
        Priority::Low,
        "General",
    ),
    (
        "Empty trash",
        "Empty all trash cans and replace bags",
        3,
        Priority::Medium,
        "General",
    ),
    (
        "Organize cables",
        "Bundle and route cables neatly, use cable ties if available",
        10,
        Priority::Low,
        "Desk",
    ),
    (
        "Clean windows",
        "Wipe down window glass and sills",
        10,
        Priority::Low,
        "General",
    ),
    (
        "Vacuum floor",
        "Vacuum entire floor area including corners and under furniture",
        15,
        Priority::Medium,
        "Floor",
    ),
];

/// The built-in plan for `budget`: most urgent first, capped at the tier's
/// task count.
pub fn fallback_plan(budget: TimeBudget) -> Vec<Task> {
    let mut tasks: Vec<Task> = DEFAULT_TASKS
        .iter()
        .enumerate()
        .map(|(i, (title, description, minutes, priority, area))| {
            Task::new(
                format!("default-{}", i + 1),
                *title,
                *description,
                *minutes,
                *priority,
                *area,
            )
        })
        .collect();
    tasks.sort_by_key(|t| Reverse(t.priority.rank()));
    tasks.truncate(budget.max_tasks());
    tasks
}
