//! Candidate disambiguation
//!
//! Candidates are ranked against the lookup query before a [`Chooser`] sees
//! them. Choosers are synchronous; the console implementation blocks on
//! input.

use crate::sources::Candidate;
use std::io::{self, BufRead, Write};

/// Outcome of one choice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    /// Use the candidate at this index of the ranked list
    Index(usize),
    /// No metadata from this source for this record
    Skip,
    /// Stop processing the current record
    Abort,
}

/// A candidate with its similarity to the lookup query
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    /// 0.0 (unrelated) to 1.0 (identical)
    pub similarity: f64,
}

/// Lowercase, punctuation to spaces, whitespace collapsed
fn normalize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity between a query and a candidate label
pub fn similarity(query: &str, label: &str) -> f64 {
    strsim::normalized_levenshtein(&normalize(query), &normalize(label))
}

/// Rank candidates by similarity to the query, best first. Ties keep source
/// order.
pub fn rank_candidates(query: &str, candidates: Vec<Candidate>) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = candidates
        .into_iter()
        .map(|candidate| RankedCandidate {
            similarity: similarity(query, &candidate.label),
            candidate,
        })
        .collect();

    ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    ranked
}

/// Decides among ranked candidates
pub trait Chooser {
    fn choose(&mut self, prompt: &str, candidates: &[RankedCandidate]) -> Choice;
}

/// Interactive chooser reading from a line-oriented input
pub struct ConsoleChooser<R, W> {
    input: R,
    output: W,
}

impl ConsoleChooser<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleChooser<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn print_candidates(&mut self, prompt: &str, candidates: &[RankedCandidate]) -> io::Result<()> {
        writeln!(self.output, "{}", prompt)?;
        for (i, ranked) in candidates.iter().enumerate() {
            writeln!(
                self.output,
                "  {}. {} ({}, {:.0}%)",
                i + 1,
                ranked.candidate.label,
                ranked.candidate.source,
                ranked.similarity * 100.0
            )?;
        }
        Ok(())
    }

    fn read_choice(&mut self, count: usize) -> io::Result<Choice> {
        loop {
            write!(self.output, "# selection (default 1), [S]kip, a[B]ort? ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(Choice::Abort);
            }

            match parse_selection(line.trim(), count) {
                Some(choice) => return Ok(choice),
                None => writeln!(self.output, "Please enter a number from 1 to {}, s or b", count)?,
            }
        }
    }
}

fn parse_selection(input: &str, count: usize) -> Option<Choice> {
    match input {
        "" => Some(Choice::Index(0)),
        "b" | "B" => Some(Choice::Abort),
        "s" | "S" => Some(Choice::Skip),
        number => match number.parse::<usize>() {
            Ok(n) if (1..=count).contains(&n) => Some(Choice::Index(n - 1)),
            _ => None,
        },
    }
}

impl<R: BufRead, W: Write> Chooser for ConsoleChooser<R, W> {
    fn choose(&mut self, prompt: &str, candidates: &[RankedCandidate]) -> Choice {
        if candidates.is_empty() {
            return Choice::Skip;
        }

        let result = self
            .print_candidates(prompt, candidates)
            .and_then(|_| self.read_choice(candidates.len()));

        match result {
            Ok(choice) => choice,
            Err(e) => {
                tracing::warn!(error = %e, "Console input failed, aborting record");
                Choice::Abort
            }
        }
    }
}

/// Non-interactive chooser: takes the best candidate when it is close enough
#[derive(Debug, Clone, Copy)]
pub struct AutoChooser {
    threshold: f64,
}

impl AutoChooser {
    pub const DEFAULT_THRESHOLD: f64 = 0.8;

    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }
}

impl Default for AutoChooser {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

impl Chooser for AutoChooser {
    fn choose(&mut self, prompt: &str, candidates: &[RankedCandidate]) -> Choice {
        match candidates.first() {
            Some(best) if best.similarity >= self.threshold => {
                tracing::info!(
                    "{}: {} ({:.0}%)",
                    prompt,
                    best.candidate.label,
                    best.similarity * 100.0
                );
                Choice::Index(0)
            }
            Some(best) => {
                tracing::info!(
                    similarity = best.similarity,
                    threshold = self.threshold,
                    "{}: no close match, skipping",
                    prompt
                );
                Choice::Skip
            }
            None => Choice::Skip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaimport_common::Metadata;

    fn candidate(label: &str) -> Candidate {
        Candidate {
            source: "test".to_string(),
            label: label.to_string(),
            metadata: Metadata::new(),
        }
    }

    fn ranked(labels: &[&str], query: &str) -> Vec<RankedCandidate> {
        rank_candidates(query, labels.iter().map(|l| candidate(l)).collect())
    }

    fn console(input: &str) -> ConsoleChooser<&[u8], Vec<u8>> {
        ConsoleChooser::new(input.as_bytes(), Vec::new())
    }

    #[test]
    fn test_rank_best_first_and_stable() {
        let list = ranked(
            &["Someone Else - Other", "Queen - Bohemian Rhapsody", "Queen - Bohemian Rhapsody"],
            "Queen Bohemian Rhapsody",
        );

        assert_eq!(list[0].candidate.label, "Queen - Bohemian Rhapsody");
        assert!((list[0].similarity - 1.0).abs() < f64::EPSILON);
        assert_eq!(list[1].similarity, list[0].similarity);
        assert_eq!(list[2].candidate.label, "Someone Else - Other");
    }

    #[test]
    fn test_console_number_and_default() {
        let list = ranked(&["A - a", "B - b"], "x");

        assert_eq!(console("2\n").choose("Pick", &list), Choice::Index(1));
        assert_eq!(console("\n").choose("Pick", &list), Choice::Index(0));
    }

    #[test]
    fn test_console_skip_abort_and_eof() {
        let list = ranked(&["A - a"], "x");

        assert_eq!(console("s\n").choose("Pick", &list), Choice::Skip);
        assert_eq!(console("B\n").choose("Pick", &list), Choice::Abort);
        assert_eq!(console("").choose("Pick", &list), Choice::Abort);
    }

    #[test]
    fn test_console_reprompts_on_invalid_input() {
        let list = ranked(&["A - a", "B - b"], "x");
        let mut chooser = console("7\nhello\n2\n");

        assert_eq!(chooser.choose("Pick", &list), Choice::Index(1));

        let shown = String::from_utf8(chooser.output).unwrap();
        assert!(shown.contains("  1. A - a (test,"));
        assert_eq!(shown.matches("Please enter a number").count(), 2);
    }

    #[test]
    fn test_empty_candidates_skip() {
        assert_eq!(console("1\n").choose("Pick", &[]), Choice::Skip);
        assert_eq!(AutoChooser::default().choose("Pick", &[]), Choice::Skip);
    }

    #[test]
    fn test_auto_threshold() {
        let close = ranked(&["Queen - Bohemian Rhapsody"], "queen bohemian rhapsody");
        let far = ranked(&["Metallica - One"], "queen bohemian rhapsody");

        let mut auto = AutoChooser::default();
        assert_eq!(auto.choose("Pick", &close), Choice::Index(0));
        assert_eq!(auto.choose("Pick", &far), Choice::Skip);
    }
}
