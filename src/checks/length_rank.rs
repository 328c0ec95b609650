use crate::checks::{CheckInput, ValidationCheck, median};
use crate::domain::{Answer, ValidationOutcome};

const ALIAS: &str = "lenr";
const HEADER: &str = "Length Rank";
/// Share of hits that must be at least as extreme as the prediction.
const MIN_PERCENTAGE: f64 = 20.0;

/// Ranks the prediction length among hit lengths.
pub struct LengthRank;

impl ValidationCheck for LengthRank {
    fn alias(&self) -> &str {
        ALIAS
    }

    fn header(&self) -> &str {
        HEADER
    }

    fn expected(&self) -> Answer {
        Answer::Yes
    }

    fn run(&self, input: &CheckInput<'_>) -> ValidationOutcome {
        let lengths = input
            .hits
            .iter()
            .map(|hit| hit.length as f64)
            .filter(|len| *len > 0.0)
            .collect::<Vec<_>>();
        let Some(median) = median(&lengths) else {
            return ValidationOutcome::unapplicable(
                ALIAS,
                HEADER,
                Answer::Yes,
                "no hits with a known length",
            );
        };

        let length = input.prediction.length as f64;
        let shorter = length < median;
        let extreme = lengths
            .iter()
            .filter(|hit| if shorter { **hit < length } else { **hit > length })
            .count();
        let percentage = 100.0 * extreme as f64 / lengths.len() as f64;

        let direction = if shorter { "shorter" } else { "longer" };
        if percentage >= MIN_PERCENTAGE {
            let message = format!("{percentage:.0}% of hits are {direction}");
            ValidationOutcome::verdict(ALIAS, HEADER, Answer::Yes, Answer::Yes, message)
        } else {
            let label = if shorter { "TOO_SHORT" } else { "TOO_LONG" };
            let message = format!("{label}: only {percentage:.0}% of hits are {direction}");
            ValidationOutcome::verdict(ALIAS, HEADER, Answer::No, Answer::Yes, message)
        }
    }
}
