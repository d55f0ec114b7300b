//! "Did you mean" hints for undeclared names.

/// Names shorter than this get no suggestions.
const MIN_NAME_LEN: usize = 2;

/// Edit distance between two names.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    if a == b {
        return 0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Largest distance still worth suggesting for a name of this length.
fn threshold(name: &str) -> usize {
    match name.chars().count() {
        0..=4 => 1,
        5..=7 => 2,
        _ => 3,
    }
}

/// Up to `limit` names close to `missing`, nearest first, ties alphabetical.
pub fn suggest_similar<'a, I>(missing: &str, names: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    if missing.chars().count() < MIN_NAME_LEN || limit == 0 {
        return Vec::new();
    }
    let max = threshold(missing);
    let mut scored: Vec<(usize, &str)> = names
        .into_iter()
        .filter(|name| !name.is_empty() && *name != missing)
        .map(|name| (levenshtein_distance(missing, name), name))
        .filter(|(distance, _)| *distance <= max)
        .collect();
    scored.sort();
    scored.dedup_by(|a, b| a.1 == b.1);
    scored
        .into_iter()
        .take(limit)
        .map(|(_, name)| name.to_string())
        .collect()
}

/// Render suggestions as a message suffix; empty when there are none.
pub fn format_suggestions(suggestions: &[String]) -> String {
    match suggestions {
        [] => String::new(),
        [only] => format!("; did you mean '{only}'?"),
        many => {
            let quoted: Vec<String> = many.iter().map(|name| format!("'{name}'")).collect();
            format!("; did you mean one of {}?", quoted.join(", "))
        }
    }
}
