// Read-side search views over the task sequence

use crate::models::Task;

/// Case-insensitive substring search over title and description
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    needle: String,
}

impl TaskQuery {
    pub fn new(query: &str) -> Self {
        Self {
            needle: query.trim().to_lowercase(),
        }
    }

    /// A blank query matches everything
    pub fn is_blank(&self) -> bool {
        self.needle.is_empty()
    }

    pub fn matches(&self, task: &Task) -> bool {
        if self.is_blank() {
            return true;
        }
        task.title.to_lowercase().contains(&self.needle)
            || task
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&self.needle))
    }
}

/// Borrowed subset of the task sequence, in the same order
///
/// Entries point at the original tasks; nothing is cloned or reordered, so
/// positions can always be translated back to the underlying sequence.
#[derive(Debug, Clone)]
pub struct FilteredView<'a> {
    entries: Vec<(usize, &'a Task)>,
}

impl<'a> FilteredView<'a> {
    pub fn new(tasks: &'a [Task], query: &TaskQuery) -> Self {
        let entries = tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| query.matches(task))
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, view_index: usize) -> Option<&'a Task> {
        self.entries.get(view_index).map(|(_, task)| *task)
    }

    /// Position in the underlying sequence of the task shown at `view_index`
    pub fn underlying_index(&self, view_index: usize) -> Option<usize> {
        self.entries.get(view_index).map(|(index, _)| *index)
    }

    /// Pairs of (underlying index, task)
    pub fn iter(&self) -> impl Iterator<Item = (usize, &'a Task)> + '_ {
        self.entries.iter().copied()
    }
}
