//! Deterministic quiz scoring.
//!
//! ```text
//! raw   = base + completion bonus + time bonus + 0.5 * difficulty bonus
//! final = clamp(round(raw - anti-cheat penalty), 0, 100)
//! ```

use std::collections::HashMap;

use serde::Serialize;

use crate::models::QuestionBankEntry;

pub const PERFECT_BONUS: f64 = 15.0;
pub const HIGH_ACCURACY_BONUS: f64 = 10.0;
pub const GOOD_ACCURACY_BONUS: f64 = 5.0;
pub const DIFFICULTY_WEIGHT: f64 = 0.5;
pub const DEFAULT_QUIZ_PASS_SCORE: u32 = 85;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionResult {
    pub question_id: String,
    pub topic: String,
    pub question: String,
    pub options: Vec<String>,
    pub user_answer: Option<usize>,
    pub correct_answer: usize,
    pub is_correct: bool,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub base_score: f64,
    pub bonus_points: f64,
    pub time_bonus: f64,
    pub difficulty_bonus: f64,
    pub anti_cheat_penalty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizScore {
    pub score: u32,
    pub correct_answers: usize,
    pub total_questions: usize,
    pub results: Vec<QuestionResult>,
    pub breakdown: ScoreBreakdown,
    pub passed: bool,
    pub feedback: String,
}

pub fn completion_bonus(correct: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let ratio = correct as f64 / total as f64;
    if correct == total {
        PERFECT_BONUS
    } else if ratio >= 0.8 {
        HIGH_ACCURACY_BONUS
    } else if ratio >= 0.7 {
        GOOD_ACCURACY_BONUS
    } else {
        0.0
    }
}

pub fn time_bonus(remaining_secs: f64) -> f64 {
    if remaining_secs > 300.0 {
        3.0
    } else if remaining_secs > 60.0 {
        1.0
    } else {
        0.0
    }
}

pub fn feedback_for(score: u32) -> &'static str {
    match score {
        95.. => "Perfect score! You have mastered this material.",
        85..=94 => "Excellent work! You passed and are eligible for the NFT certificate.",
        70..=84 => "Good job! Review the explanations below to reach the 85% certificate threshold.",
        50..=69 => "Passing effort. Revisit the lessons you missed and try again.",
        _ => "Keep learning! Work through the course modules and retake the quiz when ready.",
    }
}

/// Score `answers` against the issued `questions`.
///
/// `remaining_secs` is `time_limit - elapsed` at submission time.
pub fn score_quiz(
    questions: &[QuestionBankEntry],
    answers: &HashMap<String, usize>,
    remaining_secs: f64,
    penalty: f64,
    pass_score: u32,
) -> QuizScore {
    let total = questions.len();
    let mut correct = 0usize;
    let mut difficulty_tally = 0u32;

    let results: Vec<QuestionResult> = questions
        .iter()
        .map(|q| {
            let user_answer = answers.get(&q.id).copied();
            let is_correct = user_answer == Some(q.correct);
            if is_correct {
                correct += 1;
                difficulty_tally += q.difficulty.weight();
            }
            QuestionResult {
                question_id: q.id.clone(),
                topic: q.topic.clone(),
                question: q.question.clone(),
                options: q.options.clone(),
                user_answer,
                correct_answer: q.correct,
                is_correct,
                explanation: q.explanation.clone(),
            }
        })
        .collect();

    let base_score = if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64 * 100.0
    };
    let bonus_points = completion_bonus(correct, total);
    let time_bonus = time_bonus(remaining_secs);
    let difficulty_bonus = f64::from(difficulty_tally);

    let raw = base_score + bonus_points + time_bonus + DIFFICULTY_WEIGHT * difficulty_bonus;
    let score = (raw - penalty).round().clamp(0.0, 100.0) as u32;

    QuizScore {
        score,
        correct_answers: correct,
        total_questions: total,
        results,
        breakdown: ScoreBreakdown {
            base_score,
            bonus_points,
            time_bonus,
            difficulty_bonus,
            anti_cheat_penalty: penalty,
        },
        passed: score >= pass_score,
        feedback: feedback_for(score).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Difficulty;

    fn question(id: &str, difficulty: Difficulty, correct: usize) -> QuestionBankEntry {
        QuestionBankEntry {
            id: id.to_string(),
            topic: "Stacks".to_string(),
            difficulty,
            question: format!("{}?", id),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct,
            explanation: "because".to_string(),
        }
    }

    fn five() -> Vec<QuestionBankEntry> {
        vec![
            question("q1", Difficulty::Medium, 0),
            question("q2", Difficulty::High, 1),
            question("q3", Difficulty::Medium, 2),
            question("q4", Difficulty::High, 3),
            question("q5", Difficulty::Medium, 0),
        ]
    }

    fn answers_all_correct(qs: &[QuestionBankEntry]) -> HashMap<String, usize> {
        qs.iter().map(|q| (q.id.clone(), q.correct)).collect()
    }

    #[test]
    fn test_completion_bonus_bands() {
        assert_eq!(completion_bonus(5, 5), 15.0);
        assert_eq!(completion_bonus(4, 5), 10.0);
        assert_eq!(completion_bonus(7, 10), 5.0);
        assert_eq!(completion_bonus(6, 10), 0.0);
        assert_eq!(completion_bonus(0, 0), 0.0);
    }

    #[test]
    fn test_time_bonus_bands() {
        assert_eq!(time_bonus(301.0), 3.0);
        assert_eq!(time_bonus(300.0), 1.0);
        assert_eq!(time_bonus(61.0), 1.0);
        assert_eq!(time_bonus(60.0), 0.0);
        assert_eq!(time_bonus(-5.0), 0.0);
    }

    #[test]
    fn test_all_correct_caps_at_100() {
        let qs = five();
        let s = score_quiz(&qs, &answers_all_correct(&qs), 800.0, 0.0, 85);
        assert_eq!(s.score, 100);
        assert_eq!(s.correct_answers, 5);
        assert!(s.passed);
        assert_eq!(s.breakdown.difficulty_bonus, 7.0);
        assert!(s.results.iter().all(|r| r.is_correct));
    }

    #[test]
    fn test_none_correct_fails_low() {
        let qs = five();
        let wrong: HashMap<String, usize> =
            qs.iter().map(|q| (q.id.clone(), (q.correct + 1) % 4)).collect();
        let s = score_quiz(&qs, &wrong, 800.0, 0.0, 85);
        assert!(s.score <= 15);
        assert_eq!(s.score, 3);
        assert!(!s.passed);
    }

    #[test]
    fn test_unanswered_counts_as_wrong() {
        let qs = five();
        let s = score_quiz(&qs, &HashMap::new(), 0.0, 0.0, 85);
        assert_eq!(s.score, 0);
        assert!(s.results.iter().all(|r| r.user_answer.is_none()));
    }

    #[test]
    fn test_penalty_applies_and_clamps() {
        let qs = five();
        let all = answers_all_correct(&qs);
        // raw = 100 + 15 + 3 + 3.5 = 121.5; minus 50 = 71.5 -> 72
        let s = score_quiz(&qs, &all, 800.0, 50.0, 85);
        assert_eq!(s.score, 72);
        assert!(!s.passed);
        assert_eq!(s.breakdown.anti_cheat_penalty, 50.0);

        let s = score_quiz(&qs, &HashMap::new(), 0.0, 50.0, 85);
        assert_eq!(s.score, 0);
    }

    #[test]
    fn test_four_of_five() {
        let qs = five();
        let mut answers = answers_all_correct(&qs);
        answers.insert("q2".to_string(), 0);
        // 80 + 10 + 1 + 0.5 * 5 = 93.5 -> 94
        let s = score_quiz(&qs, &answers, 120.0, 0.0, 85);
        assert_eq!(s.score, 94);
        assert!(s.passed);
        assert_eq!(s.feedback, feedback_for(94));
    }

    #[test]
    fn test_feedback_bands() {
        assert!(feedback_for(100).starts_with("Perfect"));
        assert!(feedback_for(85).contains("NFT"));
        assert!(feedback_for(70).starts_with("Good"));
        assert!(feedback_for(50).starts_with("Passing"));
        assert!(feedback_for(49).starts_with("Keep learning"));
    }
}
