use std::str::FromStr;

use crate::engine::models::{IndividualTestResult, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationPolicy {
    #[default]
    FirstFailure,
    MostSevere,
}

impl FromStr for AggregationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first_failure" | "first" => Ok(Self::FirstFailure),
            "most_severe" | "severity" => Ok(Self::MostSevere),
            _ => Err(format!("unsupported aggregation policy: {s}")),
        }
    }
}

fn severity(verdict: Verdict) -> u8 {
    match verdict {
        Verdict::Accepted | Verdict::Executed => 0,
        Verdict::WrongAnswer => 1,
        Verdict::RuntimeError => 2,
        Verdict::TimeLimitExceeded => 3,
        Verdict::MemoryLimitExceeded => 4,
        Verdict::CompilationError => 5,
        Verdict::InternalError | Verdict::ConfigurationError => 6,
    }
}

pub fn aggregate(results: &[IndividualTestResult], policy: AggregationPolicy) -> Verdict {
    let mut failures = results.iter().filter(|r| !r.is_correct).map(|r| r.verdict);
    let overall = match policy {
        AggregationPolicy::FirstFailure => failures.next(),
        // max_by_key keeps the last maximum; rev() keeps the first
        AggregationPolicy::MostSevere => failures.rev().max_by_key(|v| severity(*v)),
    };
    overall.unwrap_or(Verdict::Accepted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(verdict: Verdict) -> IndividualTestResult {
        IndividualTestResult {
            test_id: 1,
            input: String::new(),
            expected_output: None,
            actual_output: String::new(),
            verdict,
            is_correct: verdict.is_correct(),
            elapsed_ms: 0,
            diagnostic: String::new(),
        }
    }

    #[test]
    fn all_correct_is_accepted() {
        let results = vec![result(Verdict::Accepted), result(Verdict::Executed)];
        assert_eq!(aggregate(&results, AggregationPolicy::FirstFailure), Verdict::Accepted);
        assert_eq!(aggregate(&results, AggregationPolicy::MostSevere), Verdict::Accepted);
    }

    #[test]
    fn first_failure_in_input_order_wins() {
        let results = vec![
            result(Verdict::Accepted),
            result(Verdict::WrongAnswer),
            result(Verdict::TimeLimitExceeded),
        ];
        assert_eq!(
            aggregate(&results, AggregationPolicy::FirstFailure),
            Verdict::WrongAnswer
        );
    }

    #[test]
    fn most_severe_policy_ranks_failures() {
        let results = vec![
            result(Verdict::WrongAnswer),
            result(Verdict::TimeLimitExceeded),
            result(Verdict::RuntimeError),
        ];
        assert_eq!(
            aggregate(&results, AggregationPolicy::MostSevere),
            Verdict::TimeLimitExceeded
        );
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!(
            "MOST_SEVERE".parse::<AggregationPolicy>().unwrap(),
            AggregationPolicy::MostSevere
        );
        assert!("random".parse::<AggregationPolicy>().is_err());
    }
}
