//! Question banks, keyed by course id.
//!
//! The built-in bank covers the data-structures course. Deployments can
//! replace it with a JSON document of the shape
//! `{"<course_id>": [QuestionBankEntry, ...]}` via [`QuestionBank::from_json_str`].

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Context, Result};

use crate::models::{Difficulty, QuestionBankEntry};

pub const OPTIONS_PER_QUESTION: usize = 4;

#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    courses: HashMap<String, Vec<QuestionBankEntry>>,
}

impl QuestionBank {
    pub fn new(courses: HashMap<String, Vec<QuestionBankEntry>>) -> Result<Self> {
        for (course_id, entries) in &courses {
            validate_course(course_id, entries)?;
        }
        Ok(Self { courses })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let courses: HashMap<String, Vec<QuestionBankEntry>> =
            serde_json::from_str(json).context("Failed to parse question bank JSON")?;
        Self::new(courses)
    }

    pub fn builtin() -> Self {
        let mut courses = HashMap::new();
        courses.insert("data-structures".to_string(), data_structures_questions());
        Self { courses }
    }

    pub fn questions(&self, course_id: &str) -> Option<&[QuestionBankEntry]> {
        self.courses.get(course_id).map(Vec::as_slice)
    }

    pub fn course_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.courses.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

fn validate_course(course_id: &str, entries: &[QuestionBankEntry]) -> Result<()> {
    if entries.is_empty() {
        bail!("question bank for course '{}' is empty", course_id);
    }
    let mut seen = HashSet::new();
    for q in entries {
        if !seen.insert(q.id.as_str()) {
            bail!("duplicate question id '{}' in course '{}'", q.id, course_id);
        }
        if q.options.len() != OPTIONS_PER_QUESTION {
            bail!(
                "question '{}' must have {} options, found {}",
                q.id,
                OPTIONS_PER_QUESTION,
                q.options.len()
            );
        }
        if q.correct >= q.options.len() {
            bail!("question '{}' has correct index {} out of range", q.id, q.correct);
        }
    }
    Ok(())
}

fn q(
    id: &str,
    topic: &str,
    difficulty: Difficulty,
    question: &str,
    options: [&str; OPTIONS_PER_QUESTION],
    correct: usize,
    explanation: &str,
) -> QuestionBankEntry {
    QuestionBankEntry {
        id: id.to_string(),
        topic: topic.to_string(),
        difficulty,
        question: question.to_string(),
        options: options.iter().map(|o| o.to_string()).collect(),
        correct,
        explanation: explanation.to_string(),
    }
}

fn data_structures_questions() -> Vec<QuestionBankEntry> {
    use Difficulty::{High, Medium};
    vec![
        q(
            "ds_arrays_1",
            "Arrays",
            Medium,
            "What is the time complexity of accessing an element by index in an array?",
            ["O(1)", "O(log n)", "O(n)", "O(n log n)"],
            0,
            "Arrays store elements contiguously, so the address of any index is computed directly.",
        ),
        q(
            "ds_arrays_2",
            "Arrays",
            High,
            "Inserting an element at the front of a dynamic array of n elements costs:",
            ["O(1)", "O(log n)", "O(n)", "O(n^2)"],
            2,
            "Every existing element must shift one position to the right.",
        ),
        q(
            "ds_arrays_3",
            "2D Arrays",
            Medium,
            "In row-major order, element [i][j] of an R x C matrix is stored at offset:",
            ["i * R + j", "i * C + j", "j * R + i", "i + j"],
            1,
            "Each full row occupies C slots, so row i starts at i * C.",
        ),
        q(
            "ds_linked_1",
            "Linked Lists",
            Medium,
            "What does each node of a singly linked list store?",
            [
                "Only its value",
                "Its value and a pointer to the next node",
                "Pointers to the next and previous nodes only",
                "Its index in the list",
            ],
            1,
            "A singly linked node carries data plus one reference to its successor.",
        ),
        q(
            "ds_linked_2",
            "Linked Lists",
            High,
            "Given only a pointer to a node in a doubly linked list, removing that node takes:",
            ["O(1)", "O(log n)", "O(n)", "It is impossible"],
            0,
            "The node knows both neighbours, so they can be relinked directly.",
        ),
        q(
            "ds_linked_3",
            "Linked Lists",
            High,
            "Which technique detects a cycle in a linked list using O(1) extra space?",
            [
                "Recursion with memoization",
                "A hash set of visited nodes",
                "Slow and fast pointers",
                "Sorting the nodes",
            ],
            2,
            "Floyd's tortoise and hare: the fast pointer eventually meets the slow one inside a cycle.",
        ),
        q(
            "ds_stacks_1",
            "Stacks",
            Medium,
            "Which ordering does a stack follow?",
            ["FIFO", "LIFO", "Priority order", "Random order"],
            1,
            "The last element pushed is the first one popped.",
        ),
        q(
            "ds_stacks_2",
            "Stacks",
            High,
            "Which problem is most naturally solved with a stack?",
            [
                "Breadth-first search",
                "Checking balanced parentheses",
                "Round-robin scheduling",
                "Finding the median of a stream",
            ],
            1,
            "Each closing bracket must match the most recently opened one.",
        ),
        q(
            "ds_queues_1",
            "Queues",
            Medium,
            "Which ordering does a queue follow?",
            ["LIFO", "FIFO", "Sorted order", "Reverse insertion order"],
            1,
            "Elements leave in the order they arrived.",
        ),
        q(
            "ds_queues_2",
            "Queues",
            High,
            "A circular buffer queue avoids which cost of a naive array queue?",
            [
                "Shifting all elements on dequeue",
                "Allocating nodes on the heap",
                "Hashing keys",
                "Sorting on insert",
            ],
            0,
            "Head and tail indices wrap around, so no elements ever move.",
        ),
        q(
            "ds_trees_1",
            "Trees",
            Medium,
            "What is the maximum number of children of a node in a binary tree?",
            ["1", "2", "3", "Unlimited"],
            1,
            "Binary means each node has at most a left and a right child.",
        ),
        q(
            "ds_trees_2",
            "Trees",
            High,
            "An in-order traversal of a binary search tree visits keys in:",
            ["Insertion order", "Descending order", "Ascending order", "Level order"],
            2,
            "Left subtree keys are smaller and right subtree keys are larger than the node.",
        ),
        q(
            "ds_trees_3",
            "Trees",
            High,
            "Worst-case search time in an unbalanced BST with n nodes is:",
            ["O(1)", "O(log n)", "O(n)", "O(n log n)"],
            2,
            "Sorted insertions degrade the tree into a linked list.",
        ),
        q(
            "ds_complexity_1",
            "Big O",
            Medium,
            "Which growth rate is the slowest for large n?",
            ["O(n)", "O(log n)", "O(n log n)", "O(n^2)"],
            1,
            "Logarithmic functions grow slower than any positive power of n.",
        ),
        q(
            "ds_complexity_2",
            "Big O",
            High,
            "What is the space complexity of a recursive factorial of n without tail-call optimisation?",
            ["O(1)", "O(log n)", "O(n)", "O(n^2)"],
            2,
            "Each pending call keeps a stack frame until the base case returns.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_bank_is_valid() {
        let bank = QuestionBank::builtin();
        let ds = bank.questions("data-structures").unwrap();
        assert!(ds.len() >= 10);
        validate_course("data-structures", ds).unwrap();
        assert!(bank.questions("unknown").is_none());
        assert_eq!(bank.course_ids(), vec!["data-structures"]);
    }

    #[test]
    fn test_from_json() {
        let json = r#"{"algo": [{
            "id": "a1", "topic": "Sorting", "difficulty": "Medium",
            "question": "Stable sort?", "options": ["merge", "heap", "quick", "selection"],
            "correct": 0, "explanation": "merge sort is stable"
        }]}"#;
        let bank = QuestionBank::from_json_str(json).unwrap();
        assert_eq!(bank.questions("algo").unwrap()[0].id, "a1");
    }

    #[test]
    fn test_rejects_bad_correct_index() {
        let json = r#"{"algo": [{
            "id": "a1", "topic": "t", "difficulty": "High",
            "question": "q", "options": ["a", "b", "c", "d"],
            "correct": 4, "explanation": "e"
        }]}"#;
        let err = QuestionBank::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let entry = q("x", "t", Difficulty::Medium, "q", ["a", "b", "c", "d"], 0, "e");
        let mut courses = HashMap::new();
        courses.insert("c".to_string(), vec![entry.clone(), entry]);
        assert!(QuestionBank::new(courses).is_err());
    }
}
