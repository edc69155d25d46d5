//! Prompt text for every pipeline stage.
//!
//! Schema instructions are appended by the structured layer, so these only
//! carry the task-specific part.

use crate::task::Task;

pub fn complexity(description: &str) -> String {
    format!(
        r#"Decide whether this task needs decomposition into smaller research tasks.

Task: {description}

A task needs decomposition when it spans several independent topics, languages,
regions, or steps that are better researched separately. A single factual
question does not."#
    )
}

pub fn decompose(description: &str) -> String {
    format!(
        r#"Split this task into 3 to 5 independent subtasks.

Task: {description}

Each subtask must be answerable on its own without the results of the others.
Return a JSON array of subtask descriptions."#
    )
}

pub fn merge(task: &Task, similar: &[Task]) -> String {
    let others: String = similar
        .iter()
        .map(|t| format!("- {}\n", t.description))
        .collect();
    format!(
        r#"Combine these similar tasks into one unified task description.

Task: {}

Similar pending tasks:
{others}
The unified description must cover everything the individual tasks ask for."#,
        task.description
    )
}

pub fn atomicity(description: &str) -> String {
    format!(
        r#"Decide whether this task is atomic.

Task: {description}

A task is atomic when it can be answered well in one response without further
research steps."#
    )
}

pub fn execute(description: &str) -> String {
    format!(
        r#"Answer this task directly and thoroughly.

Task: {description}

List every source you relied on. Use an empty list if there are none."#
    )
}

pub fn quality(description: &str, answer: &str) -> String {
    format!(
        r#"Score the quality of this answer between 0 and 1 and say whether it is complete.

Task: {description}

Answer:
{answer}"#
    )
}

pub fn assess(description: &str, answer: &str) -> String {
    format!(
        r#"Review this completed research and decide whether more research is needed.

Task: {description}

Result:
{answer}

Name each important gap that remains open."#
    )
}

pub fn follow_ups(description: &str, gaps: &[String]) -> String {
    let gaps: String = gaps.iter().map(|g| format!("- {g}\n")).collect();
    format!(
        r#"List follow-up research tasks that close these gaps.

Original task: {description}

Gaps:
{gaps}
Return a JSON array of task descriptions, at most one per gap."#
    )
}

pub fn aggregate(description: &str, summaries: &str) -> String {
    format!(
        r#"Synthesize the subtask results into one report for the parent task.

Parent task: {description}

Subtask results:
{summaries}
Write a single coherent answer and list the sources it relies on."#
    )
}
