use super::{Tracker, invalid_input, require_user};
use crate::ai;
use crate::config::Config;
use crate::db::StudySessionRow;
use crate::engine::challenge::RandomSource;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

pub const STUDY_BUDDY_APOLOGY: &str = "Sorry, I couldn't generate an answer.";

#[derive(Debug, Clone, Serialize)]
pub struct StudyAnswer {
    pub session_id: i64,
    pub question: String,
    pub answer: String,
    /// False when the apology text was returned instead of a model answer.
    pub answered: bool,
}

impl<R: RandomSource> Tracker<R> {
    /// Answers a study question; an unavailable model degrades to the apology text.
    pub fn ask(&self, user_id: &str, question: &str, now: DateTime<Utc>) -> Result<StudyAnswer> {
        self.ask_with(user_id, question, now, |config, question| {
            ai::answer_question(config, question)
        })
    }

    pub fn study_history(&self, user_id: &str, limit: usize) -> Result<Vec<StudySessionRow>> {
        self.database
            .recent_study_sessions(require_user(user_id)?, limit)
    }

    fn ask_with<F>(
        &self,
        user_id: &str,
        question: &str,
        now: DateTime<Utc>,
        answer: F,
    ) -> Result<StudyAnswer>
    where
        F: FnOnce(&Config, &str) -> Result<String>,
    {
        let user_id = require_user(user_id)?;
        let question = question.trim();
        if question.is_empty() {
            return Err(invalid_input("question must not be empty"));
        }

        let (answer, answered) = match answer(&self.config, question) {
            Ok(text) => (text, true),
            Err(error) => {
                warn!(error = %error, user_id, "study buddy unavailable");
                (STUDY_BUDDY_APOLOGY.to_string(), false)
            }
        };

        let session_id = self
            .database
            .insert_study_session(user_id, question, &answer, now)?;

        Ok(StudyAnswer {
            session_id,
            question: question.to_string(),
            answer,
            answered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::STUDY_BUDDY_APOLOGY;
    use crate::tracker::testing::{day, open_tracker};
    use anyhow::anyhow;

    #[test]
    fn disabled_ai_records_the_apology() {
        let (_dir, tracker) = open_tracker();

        let reply = tracker.ask("amy", "why is the sky blue?", day(0)).unwrap();
        assert!(!reply.answered);
        assert_eq!(reply.answer, STUDY_BUDDY_APOLOGY);

        let history = tracker.study_history("amy", 5).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].question, "why is the sky blue?");
    }

    #[test]
    fn model_answer_is_stored_with_the_question() {
        let (_dir, tracker) = open_tracker();

        let reply = tracker
            .ask_with("amy", "  2+2?  ", day(0), |_, question| {
                assert_eq!(question, "2+2?");
                Ok("4, because two pairs make four.".to_string())
            })
            .unwrap();
        assert!(reply.answered);

        let failed = tracker
            .ask_with("amy", "hard one", day(1), |_, _| Err(anyhow!("timeout")))
            .unwrap();
        assert_eq!(failed.answer, STUDY_BUDDY_APOLOGY);

        let history = tracker.study_history("amy", 5).unwrap();
        assert_eq!(history[1].answer, "4, because two pairs make four.");
    }

    #[test]
    fn blank_question_is_not_recorded() {
        let (_dir, tracker) = open_tracker();
        assert!(tracker.ask("amy", "   ", day(0)).is_err());
        assert!(tracker.study_history("amy", 5).unwrap().is_empty());
    }
}
