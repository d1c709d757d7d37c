//! Subsequence fuzzy matching for the picker.
//!
//! A query matches a candidate when every query character appears in the
//! candidate in order. Matching ignores case unless the query contains an
//! uppercase character.

/// Base score for any match.
const BASE_SCORE: u32 = 100;

/// Per-character bonus for runs of two or more adjacent matches.
const CONSECUTIVE_BONUS: u32 = 10;

/// Bonus for a match at the start of a path component or word.
const BOUNDARY_BONUS: u32 = 15;

/// Bonus for each match inside the final path component.
const BASENAME_BONUS: u32 = 5;

/// Scores `query` against `candidate`; `None` if it does not match.
///
/// Higher is better. An empty query matches everything with the same score.
#[must_use]
pub fn score(query: &str, candidate: &str) -> Option<u32> {
    if query.is_empty() {
        return Some(1);
    }

    let case_sensitive = query.chars().any(char::is_uppercase);
    let fold = |c: char| {
        if case_sensitive {
            c
        } else {
            c.to_ascii_lowercase()
        }
    };

    let query_chars: Vec<char> = query.chars().map(fold).collect();
    let target: Vec<char> = candidate.chars().collect();
    let folded: Vec<char> = target.iter().copied().map(fold).collect();

    let positions = find_match_positions(&query_chars, &folded)?;

    let basename_start = target
        .iter()
        .rposition(|&c| c == '/')
        .map_or(0, |slash| slash + 1);

    let mut score = BASE_SCORE;

    let mut run_length: u32 = 1;
    for window in positions.windows(2) {
        if window[1] == window[0] + 1 {
            run_length += 1;
        } else {
            if run_length >= 2 {
                score = score.saturating_add(run_length * CONSECUTIVE_BONUS);
            }
            run_length = 1;
        }
    }
    if run_length >= 2 {
        score = score.saturating_add(run_length * CONSECUTIVE_BONUS);
    }

    for &pos in &positions {
        if pos == 0 || is_separator(target[pos - 1]) {
            score = score.saturating_add(BOUNDARY_BONUS);
        }
        if pos >= basename_start {
            score = score.saturating_add(BASENAME_BONUS);
        }
    }

    // Prefer tighter matches.
    let span = positions.last().map_or(0, |last| last - positions[0]);
    let slack = u32::try_from(span + 1 - positions.len()).unwrap_or(u32::MAX);
    score = score.saturating_sub(slack.min(BASE_SCORE - 1));

    Some(score)
}

/// Indices of `candidates` matching `query`, best first.
///
/// Equal scores keep candidate order.
#[must_use]
pub fn rank<S: AsRef<str>>(query: &str, candidates: &[S]) -> Vec<usize> {
    let mut scored: Vec<(usize, u32)> = candidates
        .iter()
        .enumerate()
        .filter_map(|(i, c)| score(query, c.as_ref()).map(|s| (i, s)))
        .collect();
    // Stable sort keeps insertion order among ties.
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.into_iter().map(|(i, _)| i).collect()
}

fn is_separator(c: char) -> bool {
    matches!(c, '/' | '-' | '_' | '.' | ' ')
}

/// Greedy left-to-right match positions, or `None` if a character is missing.
fn find_match_positions(query: &[char], target: &[char]) -> Option<Vec<usize>> {
    let mut positions = Vec::with_capacity(query.len());
    let mut target_idx = 0;

    for &qc in query {
        let offset = target[target_idx..].iter().position(|&tc| tc == qc)?;
        positions.push(target_idx + offset);
        target_idx += offset + 1;
    }

    Some(positions)
}
