use chrono::Utc;

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

/// Parse comma-separated seeds, rejecting anything that is not a `u64`.
///
/// # Errors
///
/// Returns an error naming the first token that fails to parse.
pub fn parse_seeds(s: &str) -> anyhow::Result<Vec<u64>> {
    split_csv(s)
        .iter()
        .map(|token| {
            token
                .parse::<u64>()
                .map_err(|err| anyhow::anyhow!("invalid seed {token:?}: {err}"))
        })
        .collect()
}

pub fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
