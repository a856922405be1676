use crate::engine::{
    models::Verdict,
    sandbox::{ExecutionOutcome, LanguageFamily, language::COMPILE_FAILURE_MARKER},
};

// Exit code of a process killed with SIGKILL, which is how the container
// runtime enforces the memory ceiling.
const SIGKILL_EXIT: i32 = 137;

#[derive(Debug)]
pub struct FamilyMarkers {
    pub memory: &'static [&'static str],
    pub compile: &'static [&'static str],
}

const MEMORY_MARKERS: &[&str] = &[
    "OOMKilled",
    "MemoryError",
    "std::bad_alloc",
    "java.lang.OutOfMemoryError",
    "JavaScript heap out of memory",
    "runtime: out of memory",
    "memory allocation of",
    "Cannot allocate memory",
];

static COMPILED: FamilyMarkers = FamilyMarkers {
    memory: MEMORY_MARKERS,
    compile: &[COMPILE_FAILURE_MARKER],
};

static INTERPRETED: FamilyMarkers = FamilyMarkers {
    memory: MEMORY_MARKERS,
    compile: &[],
};

impl LanguageFamily {
    pub fn markers(self) -> &'static FamilyMarkers {
        match self {
            LanguageFamily::Compiled => &COMPILED,
            LanguageFamily::Interpreted => &INTERPRETED,
        }
    }
}

pub fn classify(
    outcome: &ExecutionOutcome,
    family: LanguageFamily,
    expected: Option<&str>,
) -> Verdict {
    if outcome.timed_out {
        return Verdict::TimeLimitExceeded;
    }

    if !outcome.exited_normally {
        let markers = family.markers();
        if outcome.exit_code == Some(SIGKILL_EXIT) || contains_any(&outcome.stderr, markers.memory)
        {
            return Verdict::MemoryLimitExceeded;
        }
        if contains_any(&outcome.stderr, markers.compile) {
            return Verdict::CompilationError;
        }
        return Verdict::RuntimeError;
    }

    match expected {
        None => Verdict::Executed,
        Some(expected) if outputs_match(&outcome.stdout, expected) => Verdict::Accepted,
        Some(_) => Verdict::WrongAnswer,
    }
}

pub fn outputs_match(actual: &str, expected: &str) -> bool {
    actual.trim() == expected.trim()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exited(stdout: &str) -> ExecutionOutcome {
        ExecutionOutcome {
            stdout: stdout.to_string(),
            exited_normally: true,
            exit_code: Some(0),
            ..Default::default()
        }
    }

    fn failed(code: i32, stderr: &str) -> ExecutionOutcome {
        ExecutionOutcome {
            stderr: stderr.to_string(),
            exit_code: Some(code),
            ..Default::default()
        }
    }

    #[test]
    fn timeout_wins_over_everything() {
        let outcome = ExecutionOutcome {
            stdout: "4".to_string(),
            stderr: "OOMKilled error:".to_string(),
            exited_normally: true,
            timed_out: true,
            ..Default::default()
        };
        assert_eq!(
            classify(&outcome, LanguageFamily::Compiled, Some("4")),
            Verdict::TimeLimitExceeded
        );
    }

    #[test]
    fn memory_markers_beat_compile_markers() {
        let outcome = failed(1, "error: std::bad_alloc");
        assert_eq!(
            classify(&outcome, LanguageFamily::Compiled, None),
            Verdict::MemoryLimitExceeded
        );
        assert_eq!(
            classify(&failed(137, ""), LanguageFamily::Interpreted, None),
            Verdict::MemoryLimitExceeded
        );
    }

    #[test]
    fn compile_markers_apply_only_to_compiled_languages() {
        let outcome = failed(1, "main.cpp:3:1: error: expected ';'\ncompilation failed\n");
        assert_eq!(
            classify(&outcome, LanguageFamily::Compiled, Some("4")),
            Verdict::CompilationError
        );
        assert_eq!(
            classify(&outcome, LanguageFamily::Interpreted, Some("4")),
            Verdict::RuntimeError
        );
    }

    #[test]
    fn program_error_text_is_not_a_compile_failure() {
        let outcome = failed(1, "error: bad input\n");
        assert_eq!(
            classify(&outcome, LanguageFamily::Compiled, Some("4")),
            Verdict::RuntimeError
        );
    }

    #[test]
    fn abnormal_exit_without_markers_is_runtime_error() {
        let outcome = failed(1, "Traceback (most recent call last):\nZeroDivisionError");
        assert_eq!(
            classify(&outcome, LanguageFamily::Interpreted, Some("4")),
            Verdict::RuntimeError
        );
    }

    #[test]
    fn accepted_and_wrong_answer() {
        assert_eq!(
            classify(&exited("4\n"), LanguageFamily::Interpreted, Some("4")),
            Verdict::Accepted
        );
        assert_eq!(
            classify(&exited("5\n"), LanguageFamily::Interpreted, Some("4")),
            Verdict::WrongAnswer
        );
    }

    #[test]
    fn missing_expected_output_never_yields_wrong_answer() {
        for stdout in ["", "anything", "  5 \n"] {
            assert_eq!(
                classify(&exited(stdout), LanguageFamily::Compiled, None),
                Verdict::Executed
            );
        }
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        for (actual, expected) in [
            ("1 2 3", "\n 1 2 3 \n\n"),
            ("\t1 2 3\r\n", "1 2 3"),
            ("1\n2\n", "1\n2"),
        ] {
            assert!(outputs_match(actual, expected), "{actual:?} vs {expected:?}");
        }
    }

    #[test]
    fn internal_whitespace_is_significant() {
        for (actual, expected) in [("1  2", "1 2"), ("1\n2", "1 2"), ("1\n\n2", "1\n2")] {
            assert!(!outputs_match(actual, expected), "{actual:?} vs {expected:?}");
        }
    }
}
