//! Coding problems and their fixed test suites.

use std::collections::HashMap;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpectedComplexity {
    pub time: String,
    pub space: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodingProblem {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(skip)]
    pub test_cases: Vec<TestCase>,
    pub expected_complexity: ExpectedComplexity,
}

impl CodingProblem {
    /// The first test case, shown to learners as the worked example.
    pub fn sample(&self) -> Option<&TestCase> {
        self.test_cases.first()
    }
}

/// Client-facing view of a problem: the full test suite stays server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProblemView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub sample: Option<TestCase>,
    pub total_tests: usize,
    pub expected_complexity: ExpectedComplexity,
}

impl From<&CodingProblem> for ProblemView {
    fn from(p: &CodingProblem) -> Self {
        Self {
            id: p.id.clone(),
            title: p.title.clone(),
            description: p.description.clone(),
            sample: p.sample().cloned(),
            total_tests: p.test_cases.len(),
            expected_complexity: p.expected_complexity.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProblemRegistry {
    problems: HashMap<String, CodingProblem>,
}

impl ProblemRegistry {
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.insert(factorial());
        registry
    }

    pub fn insert(&mut self, problem: CodingProblem) {
        self.problems.insert(problem.id.clone(), problem);
    }

    pub fn get(&self, problem_id: &str) -> Option<&CodingProblem> {
        self.problems.get(problem_id)
    }
}

fn factorial() -> CodingProblem {
    let cases = [
        ("0", "1"),
        ("1", "1"),
        ("2", "2"),
        ("3", "6"),
        ("4", "24"),
        ("5", "120"),
        ("10", "3628800"),
        ("12", "479001600"),
        ("15", "1307674368000"),
        ("20", "2432902008176640000"),
    ];
    CodingProblem {
        id: "factorial".to_string(),
        title: "Factorial of a Number".to_string(),
        description: "Read a non-negative integer n from standard input and print n!.".to_string(),
        test_cases: cases
            .iter()
            .map(|(i, o)| TestCase {
                input: i.to_string(),
                expected_output: o.to_string(),
            })
            .collect(),
        expected_complexity: ExpectedComplexity {
            time: "O(n)".to_string(),
            space: "O(1) for iterative or O(n) for recursive".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factorial_suite() {
        let registry = ProblemRegistry::builtin();
        let p = registry.get("factorial").unwrap();
        assert_eq!(p.test_cases.len(), 10);
        assert_eq!(p.sample().unwrap().expected_output, "1");
        assert_eq!(p.test_cases[9].expected_output, "2432902008176640000");
        assert!(registry.get("fibonacci").is_none());
    }

    #[test]
    fn test_view_hides_suite() {
        let registry = ProblemRegistry::builtin();
        let view = ProblemView::from(registry.get("factorial").unwrap());
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("test_cases").is_none());
        assert_eq!(json["total_tests"], 10);
        assert_eq!(json["sample"]["input"], "0");
    }
}
