//! Results aggregation.
//!
//! A pure projection of (question, participants) into tallies. The same
//! shape serves the mid-question read API and the final close snapshot, so
//! downstream consumers never branch on where the numbers came from.

use crate::actors::messages::CloseReason;
use crate::actors::question::Question;
use crate::actors::session::Participant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Tally for one option, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionCount {
    /// Option id.
    pub option_id: String,
    /// Option text.
    pub text: String,
    /// Votes recorded for this option.
    pub votes: u32,
}

/// Aggregated view of a question at some instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionResults {
    /// Question id.
    pub question_id: String,
    /// Question text.
    pub text: String,
    /// Option tallies in display order.
    pub options: Vec<OptionCount>,
    /// Participants who have answered.
    pub total_responses: usize,
    /// Respondent display names, sorted for deterministic output.
    pub respondents: Vec<String>,
}

/// Immutable close snapshot: the final aggregation plus close metadata.
///
/// Created exactly once when a question closes and appended to the session's
/// history; never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionResult {
    /// Final aggregation, same shape as the live read API returns.
    #[serde(flatten)]
    pub results: QuestionResults,
    /// When the question closed.
    pub closed_at: DateTime<Utc>,
    /// Why the question closed.
    pub reason: CloseReason,
}

/// Aggregate a question against the current participant set.
///
/// Vote counts come from the option counters (mutated only by answer
/// submission); respondent count and names come from the participants'
/// answered flags. Under the session's single-writer discipline the two
/// always agree.
pub fn aggregate<'a, I>(question: &Question, participants: I) -> QuestionResults
where
    I: IntoIterator<Item = &'a Participant>,
{
    let options = question
        .options
        .iter()
        .map(|option| OptionCount {
            option_id: option.option_id.clone(),
            text: option.text.clone(),
            votes: option.votes,
        })
        .collect();

    let mut respondents: Vec<String> = participants
        .into_iter()
        .filter(|p| p.has_answered)
        .map(|p| p.display_name.clone())
        .collect();
    respondents.sort();

    QuestionResults {
        question_id: question.question_id.clone(),
        text: question.text.clone(),
        options,
        total_responses: respondents.len(),
        respondents,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn question_with_votes(votes: &[u32]) -> Question {
        let mut question = Question::new(
            "Favourite color?".to_string(),
            votes.iter().map(|i| format!("option-{i}")).collect(),
            Duration::from_secs(30),
        );
        for (option, &count) in question.options.iter_mut().zip(votes) {
            option.votes = count;
        }
        question
    }

    fn participant(name: &str, answered: bool) -> Participant {
        Participant {
            participant_id: format!("id-{name}"),
            display_name: name.to_string(),
            joined_at: Utc::now(),
            has_answered: answered,
            answer: None,
        }
    }

    #[test]
    fn test_aggregate_empty_session() {
        let question = question_with_votes(&[0, 0]);
        let results = aggregate(&question, std::iter::empty());

        assert_eq!(results.total_responses, 0);
        assert!(results.respondents.is_empty());
        assert_eq!(results.options.len(), 2);
        assert!(results.options.iter().all(|o| o.votes == 0));
    }

    #[test]
    fn test_aggregate_counts_only_answered() {
        let question = question_with_votes(&[2, 1]);
        let participants = vec![
            participant("carol", true),
            participant("alice", true),
            participant("bob", false),
            participant("dave", true),
        ];

        let results = aggregate(&question, participants.iter());

        assert_eq!(results.total_responses, 3);
        // Sorted for deterministic output
        assert_eq!(results.respondents, vec!["alice", "carol", "dave"]);
        // Vote sum equals answered participants
        let vote_sum: u32 = results.options.iter().map(|o| o.votes).sum();
        assert_eq!(vote_sum as usize, results.total_responses);
    }

    #[test]
    fn test_aggregate_preserves_option_order() {
        let question = Question::new(
            "Pick one".to_string(),
            vec!["zeta".to_string(), "alpha".to_string(), "mid".to_string()],
            Duration::from_secs(30),
        );

        let results = aggregate(&question, std::iter::empty());

        let texts: Vec<&str> = results.options.iter().map(|o| o.text.as_str()).collect();
        assert_eq!(texts, vec!["zeta", "alpha", "mid"]);
    }
}
