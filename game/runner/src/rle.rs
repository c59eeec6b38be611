use lifecore::geometry::Vector;
use lifecore::pattern::Pattern;
use lifecore::presets::Presets;
use slog::{debug, warn, Logger};
use std::fs;
use std::path::Path;

/// Scan `path` for `*.rle` files and parse each into a pattern. A missing
/// or unreadable directory is not fatal: the game proceeds with an empty
/// pattern set. Files are taken in name order so every peer pointed at the
/// same directory derives the same preset indices.
pub fn load_presets(path: &Path, log: &Logger) -> Presets {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(log, "presets directory is not readable";
                  "path" => %path.display(), "error" => %err);
            return Presets::empty();
        }
    };

    let mut files: Vec<_> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|file| file.extension().map_or(false, |ext| ext == "rle"))
        .collect();
    files.sort();

    let mut patterns = Vec::new();

    for file in files {
        let contents = match fs::read_to_string(&file) {
            Ok(contents) => contents,
            Err(err) => {
                warn!(log, "skipping unreadable pattern file";
                      "path" => %file.display(), "error" => %err);
                continue;
            }
        };

        let fallback = file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        match parse_rle(&contents, &fallback) {
            Some(pattern) => {
                debug!(log, "pattern loaded";
                       "name" => pattern.name(), "units" => pattern.size());
                patterns.push(pattern);
            }
            None => {
                warn!(log, "skipping malformed pattern file"; "path" => %file.display());
            }
        }
    }

    Presets::new(patterns)
}

/// Parse one standard Life RLE document: optional `#N name` comment lines,
/// an `x = W, y = H` header, then runs of `b` (dead) and `o` (live) cells
/// with `$` row breaks, terminated by `!`. Offsets come out with the grid's
/// top row mapped to the highest Y (the world's Y axis grows upward) and
/// centered on the pattern's middle.
pub fn parse_rle(contents: &str, fallback_name: &str) -> Option<Pattern> {
    let mut name = String::new();
    let mut size = Vector::ZERO;

    let mut lines = contents.lines();

    for line in &mut lines {
        let line = line.trim_end_matches('\r');

        if let Some(rest) = line.strip_prefix("#N").or_else(|| line.strip_prefix("#n")) {
            name = rest.trim().to_string();
        } else if line.starts_with('#') {
            continue;
        } else if line.trim_start().starts_with('x') {
            size = parse_header(line)?;
            break;
        }
    }

    if size.x <= 0 || size.y <= 0 {
        return None;
    }

    if name.is_empty() {
        name = fallback_name.to_string();
    }

    let half = Vector::new(size.x / 2, size.y / 2);
    let mut units = Vec::new();
    let mut pos = Vector::ZERO;
    let mut run = 0i32;

    for line in lines {
        for symbol in line.trim_end_matches('\r').chars() {
            match symbol {
                '!' => return Some(Pattern::new(name, units)),
                '0'..='9' => {
                    run = run * 10 + (symbol as i32 - '0' as i32);
                }
                '$' => {
                    pos.x = 0;
                    pos.y += run.max(1);
                    run = 0;
                }
                'b' | 'B' => {
                    pos.x += run.max(1);
                    run = 0;
                }
                'o' | 'O' => {
                    for _ in 0..run.max(1) {
                        units.push(Vector::new(pos.x, size.y - 1 - pos.y) - half);
                        pos.x += 1;
                    }
                    run = 0;
                }
                _ => {}
            }
        }
    }

    // Ran off the end without the `!` terminator.
    None
}

fn parse_header(line: &str) -> Option<Vector> {
    let mut x = None;
    let mut y = None;

    for clause in line.split(',') {
        let mut parts = clause.splitn(2, '=');
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();

        match key {
            "x" => x = value.parse().ok(),
            "y" => y = value.parse().ok(),
            _ => {}
        }
    }

    Some(Vector::new(x?, y?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::{o, Discard, Logger};

    const GLIDER: &str = "#N Glider\n#C canonical spaceship\nx = 3, y = 3, rule = B3/S23\nbob$2bo$3o!\n";

    #[test]
    fn test_parse_glider() {
        let pattern = parse_rle(GLIDER, "fallback").unwrap();

        assert_eq!(pattern.name(), "Glider");
        assert_eq!(
            pattern.units(),
            &[
                Vector::new(0, 1),
                Vector::new(1, 0),
                Vector::new(-1, -1),
                Vector::new(0, -1),
                Vector::new(1, -1),
            ]
        );
    }

    #[test]
    fn test_fallback_name() {
        let pattern = parse_rle("x = 1, y = 1\no!", "lonely").unwrap();
        assert_eq!(pattern.name(), "lonely");
        assert_eq!(pattern.units(), &[Vector::ZERO]);
    }

    #[test]
    fn test_multi_digit_runs() {
        let pattern = parse_rle("x = 12, y = 1\n10b2o!", "strip").unwrap();
        assert_eq!(
            pattern.units(),
            &[Vector::new(4, 0), Vector::new(5, 0)]
        );
    }

    #[test]
    fn test_multi_row_skip() {
        // A dot, two blank rows, a dot.
        let pattern = parse_rle("x = 1, y = 3\no2$o!", "dots").unwrap();
        assert_eq!(pattern.units(), &[Vector::new(0, 1), Vector::new(0, -1)]);
    }

    #[test]
    fn test_missing_terminator_is_rejected() {
        assert!(parse_rle("x = 2, y = 1\n2o", "oops").is_none());
    }

    #[test]
    fn test_missing_header_is_rejected() {
        assert!(parse_rle("#N headless\n3o!", "oops").is_none());
    }

    #[test]
    fn test_crlf_lines() {
        let pattern = parse_rle("#N Pair\r\nx = 2, y = 1\r\n2o!\r\n", "pair").unwrap();
        assert_eq!(pattern.name(), "Pair");
        assert_eq!(pattern.size(), 2);
    }

    #[test]
    fn test_missing_directory_yields_empty_set() {
        let log = Logger::root(Discard, o!());
        let presets = load_presets(Path::new("/nonexistent/patterns"), &log);
        assert_eq!(presets.count(), 0);
    }
}
