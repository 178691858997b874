use std::{fs::File, io::Write};

use monotask_graph::OutputMode;
use monotask_path::AbsoluteSystemPath;

use crate::UiError;

/// Whether a task's output should stream to the terminal live as it runs.
/// Spec.md §4.7: only `full` mode streams; everything else is silent until
/// (and unless) a replay is warranted.
pub fn streams_live(mode: OutputMode) -> bool {
    matches!(mode, OutputMode::Full)
}

/// Whether a cache hit's log should be replayed to the terminal. `full`
/// always replays, `errors-only` replays only on a subsequent failure (not
/// applicable to a hit, but scheduler reuses this for miss replays),
/// `hash-only` and `none` never replay.
pub fn replays_on_hit(mode: OutputMode) -> bool {
    matches!(mode, OutputMode::Full)
}

/// Whether a failed task's log should be replayed to the terminal after the
/// fact. `errors-only` exists precisely for this: stay quiet on success,
/// dump the log on failure.
pub fn replays_on_failure(mode: OutputMode) -> bool {
    matches!(mode, OutputMode::Full | OutputMode::ErrorsOnly)
}

/// Copies a task's persisted log file to `writer` verbatim, for cache-hit
/// and post-failure replay (spec.md §4.7: "no process spawn").
pub fn replay_log(path: &AbsoluteSystemPath, writer: &mut impl Write) -> Result<(), UiError> {
    let mut file = File::open(path.as_path()).map_err(UiError::Io)?;
    std::io::copy(&mut file, writer).map_err(UiError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(OutputMode::Full, true; "full streams live")]
    #[test_case(OutputMode::HashOnly, false; "hash-only is silent")]
    #[test_case(OutputMode::ErrorsOnly, false; "errors-only is silent until failure")]
    #[test_case(OutputMode::None, false; "none is silent")]
    fn streaming_matches_mode(mode: OutputMode, expected: bool) {
        assert_eq!(streams_live(mode), expected);
    }

    #[test]
    fn errors_only_replays_on_failure_not_success() {
        assert!(replays_on_failure(OutputMode::ErrorsOnly));
        assert!(!replays_on_hit(OutputMode::ErrorsOnly));
    }
}
