//! Operator confirmation before any remote write
//!
//! The gate shows a summary of what is about to change and asks `[Y/n]`.
//! Only an answer of exactly `n` or `N` aborts; anything else, including an
//! empty line, proceeds.

use std::io::{BufRead, Write};
use tracing::info;

/// Operator's answer to the confirmation prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Abort,
}

/// Interpret one line of operator input
pub fn decide(answer: &str) -> Decision {
    let answer = answer.strip_suffix('\n').unwrap_or(answer);
    let answer = answer.strip_suffix('\r').unwrap_or(answer);
    if answer == "n" || answer == "N" {
        Decision::Abort
    } else {
        Decision::Proceed
    }
}

/// Something that can approve or reject a pending mutation
pub trait Approver {
    fn approve(&mut self, summary: &str) -> Decision;
}

impl<F> Approver for F
where
    F: FnMut(&str) -> Decision,
{
    fn approve(&mut self, summary: &str) -> Decision {
        self(summary)
    }
}

/// Prompts on a writer and reads the answer from a reader
pub struct PromptApprover<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptApprover<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Approver for PromptApprover<R, W> {
    fn approve(&mut self, summary: &str) -> Decision {
        if writeln!(self.output, "{}", summary).is_err()
            || write!(self.output, "[Y/n]: ").is_err()
            || self.output.flush().is_err()
        {
            return Decision::Abort;
        }

        let mut line = String::new();
        match self.input.read_line(&mut line) {
            // Closed input means nobody is there to approve
            Ok(0) | Err(_) => Decision::Abort,
            Ok(_) => decide(&line),
        }
    }
}

/// Approves everything (`--yes`)
pub struct AssumeYes;

impl Approver for AssumeYes {
    fn approve(&mut self, _summary: &str) -> Decision {
        Decision::Proceed
    }
}

/// The single checkpoint in front of every irreversible bulk mutation
pub struct ConfirmationGate {
    approver: Box<dyn Approver>,
}

impl ConfirmationGate {
    pub fn new(approver: impl Approver + 'static) -> Self {
        Self {
            approver: Box::new(approver),
        }
    }

    /// Prompt on stdout, read from stdin
    pub fn interactive() -> Self {
        Self::new(PromptApprover::new(
            std::io::BufReader::new(std::io::stdin()),
            std::io::stdout(),
        ))
    }

    pub fn assume_yes() -> Self {
        Self::new(AssumeYes)
    }

    pub fn confirm(&mut self, summary: &str) -> Decision {
        let decision = self.approver.approve(summary);
        if decision == Decision::Abort {
            info!("Exiting, no changes have been made");
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_decide_abort_only_on_n() {
        assert_eq!(decide("n"), Decision::Abort);
        assert_eq!(decide("N"), Decision::Abort);
        assert_eq!(decide("n\n"), Decision::Abort);
        assert_eq!(decide("N\r\n"), Decision::Abort);
    }

    #[test]
    fn test_decide_proceeds_on_anything_else() {
        assert_eq!(decide(""), Decision::Proceed);
        assert_eq!(decide("\n"), Decision::Proceed);
        assert_eq!(decide("y"), Decision::Proceed);
        assert_eq!(decide("no"), Decision::Proceed);
        assert_eq!(decide(" n"), Decision::Proceed);
        assert_eq!(decide("nn"), Decision::Proceed);
    }

    #[test]
    fn test_prompt_approver_writes_summary() {
        let mut output = Vec::new();
        let decision = {
            let mut approver = PromptApprover::new(Cursor::new("N\n"), &mut output);
            approver.approve("Update 2 reports?")
        };
        assert_eq!(decision, Decision::Abort);
        let shown = String::from_utf8(output).unwrap();
        assert!(shown.contains("Update 2 reports?"));
        assert!(shown.ends_with("[Y/n]: "));
    }

    #[test]
    fn test_prompt_approver_empty_line_proceeds() {
        let mut approver = PromptApprover::new(Cursor::new("\n"), Vec::new());
        assert_eq!(approver.approve("go?"), Decision::Proceed);
    }

    #[test]
    fn test_prompt_approver_closed_input_aborts() {
        let mut approver = PromptApprover::new(Cursor::new(""), Vec::new());
        assert_eq!(approver.approve("go?"), Decision::Abort);
    }

    #[test]
    fn test_gate_with_closure() {
        let mut gate = ConfirmationGate::new(|summary: &str| {
            assert!(summary.contains("datasource"));
            Decision::Proceed
        });
        assert_eq!(gate.confirm("switch datasource"), Decision::Proceed);
    }

    #[test]
    fn test_assume_yes() {
        let mut gate = ConfirmationGate::assume_yes();
        assert_eq!(gate.confirm("anything"), Decision::Proceed);
    }
}
