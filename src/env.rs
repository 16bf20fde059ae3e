use std::path::PathBuf;

use tracing::warn;

pub const CHROME_PATH_ENV: &str = "DISTILLER_CHROME_PATH";
pub const RENDER_CONCURRENCY_ENV: &str = "DISTILLER_RENDER_CONCURRENCY";

/// Environment-sourced overrides applied on top of CLI flags.
#[derive(Debug, Default, PartialEq)]
pub struct EnvOverrides {
    pub chrome_path: Option<PathBuf>,
    pub render_concurrency: Option<usize>,
}

/// Load `.env` from the working directory (if present) and read overrides.
pub fn load() -> EnvOverrides {
    dotenvy::dotenv().ok();
    overrides_from(|key| std::env::var(key).ok())
}

fn overrides_from<F>(get: F) -> EnvOverrides
where
    F: Fn(&str) -> Option<String>,
{
    let chrome_path = get(CHROME_PATH_ENV)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from);

    let render_concurrency = get(RENDER_CONCURRENCY_ENV).and_then(|value| {
        match value.trim().parse::<usize>() {
            Ok(parsed) if parsed >= 1 => Some(parsed),
            Ok(_) | Err(_) => {
                warn!("Ignoring invalid {}={}", RENDER_CONCURRENCY_ENV, value);
                None
            }
        }
    });

    EnvOverrides {
        chrome_path,
        render_concurrency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(map: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn empty_env_yields_no_overrides() {
        let map = HashMap::new();
        assert_eq!(overrides_from(lookup(&map)), EnvOverrides::default());
    }

    #[test]
    fn reads_chrome_path_and_concurrency() {
        let mut map = HashMap::new();
        map.insert(CHROME_PATH_ENV, "/usr/bin/chromium");
        map.insert(RENDER_CONCURRENCY_ENV, "4");
        let overrides = overrides_from(lookup(&map));
        assert_eq!(overrides.chrome_path, Some(PathBuf::from("/usr/bin/chromium")));
        assert_eq!(overrides.render_concurrency, Some(4));
    }

    #[test]
    fn rejects_zero_and_garbage_concurrency() {
        for bad in ["0", "-3", "lots"] {
            let mut map = HashMap::new();
            map.insert(RENDER_CONCURRENCY_ENV, bad);
            assert_eq!(overrides_from(lookup(&map)).render_concurrency, None);
        }
    }

    #[test]
    fn blank_chrome_path_ignored() {
        let mut map = HashMap::new();
        map.insert(CHROME_PATH_ENV, "   ");
        assert_eq!(overrides_from(lookup(&map)).chrome_path, None);
    }
}
