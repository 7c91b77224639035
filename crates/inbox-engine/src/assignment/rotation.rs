/// Candidates in the order a round-robin scan visits them
///
/// The scan starts just after `cursor` and wraps around. A cursor that is no
/// longer a candidate (removed from the team, dropped from the allow-list)
/// restarts the rotation from the first candidate.
pub fn rotation_order<'a>(candidates: &'a [String], cursor: Option<&str>) -> impl Iterator<Item = &'a String> {
    let start = cursor
        .and_then(|c| candidates.iter().position(|a| a == c))
        .map_or(0, |i| i + 1);

    candidates
        .iter()
        .cycle()
        .skip(start)
        .take(candidates.len())
}
