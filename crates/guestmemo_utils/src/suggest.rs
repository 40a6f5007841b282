/// Picks the candidate closest to `target` by edit distance, if any is close
/// enough to be a plausible typo.
pub fn closest_name<'a, I>(target: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let threshold = if target.chars().count() < 4 { 1 } else { 3 };
    candidates
        .into_iter()
        .map(|candidate| (edit_distance(target, candidate), candidate))
        .filter(|(distance, _)| *distance <= threshold)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate)
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_near_miss() {
        let exports = ["isBusy", "sameTeam", "overlap"];
        assert_eq!(closest_name("isBussy", exports), Some("isBusy"));
        assert_eq!(closest_name("sametaem", exports), Some("sameTeam"));
    }

    #[test]
    fn rejects_distant_names() {
        assert_eq!(closest_name("weight", ["isBusy", "overlap"]), None);
        assert_eq!(closest_name("ab", ["xyz"]), None);
    }

    #[test]
    fn distance_counts_edits() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("same", "same"), 0);
    }
}
