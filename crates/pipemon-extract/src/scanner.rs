use regex::Regex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Block size for the backward tail read.
const TAIL_BLOCK: u64 = 64 * 1024;

/// Read at most the last `max_lines` lines of a file, oldest first.
///
/// The file is read backward in fixed-size blocks so arbitrarily large logs
/// are never loaded whole. The read is strictly read-only and tolerates a
/// concurrent writer appending to the file. A missing or unreadable file is
/// not an error: it yields an empty vec and a `debug`-level log line.
pub fn tail_lines(path: &Path, max_lines: usize) -> Vec<String> {
    if max_lines == 0 {
        return Vec::new();
    }
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "log file unavailable, treating as empty");
            return Vec::new();
        }
    };
    let len = match file.metadata() {
        Ok(m) => m.len(),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "log file unreadable, treating as empty");
            return Vec::new();
        }
    };

    let mut buf: Vec<u8> = Vec::new();
    let mut pos = len;
    while pos > 0 {
        let read_len = TAIL_BLOCK.min(pos);
        pos -= read_len;
        let mut block = vec![0u8; read_len as usize];
        let ok = file
            .seek(SeekFrom::Start(pos))
            .and_then(|_| file.read_exact(&mut block));
        if let Err(e) = ok {
            // Concurrent rotation/truncation; keep whatever we already have.
            tracing::debug!(path = %path.display(), error = %e, "partial tail read");
            break;
        }
        block.extend_from_slice(&buf);
        buf = block;
        if count_newlines(&buf) > max_lines {
            break;
        }
    }

    let text = String::from_utf8_lossy(&buf);
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    if lines.len() > max_lines {
        // The first collected line may also be a partial one cut mid-file.
        lines.drain(..lines.len() - max_lines);
    }
    lines
}

fn count_newlines(buf: &[u8]) -> usize {
    buf.iter().filter(|&&b| b == b'\n').count()
}

/// Scan the bounded tail of a log file for lines matching a regex family,
/// preserving file order (oldest to newest).
pub fn scan(path: &Path, pattern: &Regex, max_lines: usize) -> Vec<String> {
    tail_lines(path, max_lines)
        .into_iter()
        .filter(|line| pattern.is_match(line))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_log(dir: &TempDir, name: &str, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        path
    }

    #[test]
    fn missing_file_yields_empty() {
        let dir = TempDir::new().unwrap();
        let lines = tail_lines(&dir.path().join("nope.log"), 100);
        assert!(lines.is_empty());
    }

    #[test]
    fn tail_is_bounded_and_ordered() {
        let dir = TempDir::new().unwrap();
        let all: Vec<String> = (0..500).map(|i| format!("line {i}")).collect();
        let refs: Vec<&str> = all.iter().map(String::as_str).collect();
        let path = write_log(&dir, "big.log", &refs);

        let lines = tail_lines(&path, 10);
        assert_eq!(lines.len(), 10);
        assert_eq!(lines.first().unwrap(), "line 490");
        assert_eq!(lines.last().unwrap(), "line 499");
    }

    #[test]
    fn tail_shorter_than_limit_returns_everything() {
        let dir = TempDir::new().unwrap();
        let path = write_log(&dir, "small.log", &["a", "b", "c"]);
        assert_eq!(tail_lines(&path, 100), vec!["a", "b", "c"]);
    }

    #[test]
    fn tail_crosses_block_boundaries() {
        let dir = TempDir::new().unwrap();
        // Lines long enough that the requested tail spans several 64 KiB blocks.
        let long = "x".repeat(8000);
        let all: Vec<String> = (0..100).map(|i| format!("{i} {long}")).collect();
        let refs: Vec<&str> = all.iter().map(String::as_str).collect();
        let path = write_log(&dir, "wide.log", &refs);

        let lines = tail_lines(&path, 50);
        assert_eq!(lines.len(), 50);
        assert!(lines.first().unwrap().starts_with("50 "));
        assert!(lines.last().unwrap().starts_with("99 "));
    }

    #[test]
    fn scan_filters_by_pattern_keeping_order() {
        let dir = TempDir::new().unwrap();
        let path = write_log(
            &dir,
            "daemon.log",
            &[
                "Cycle 1 completed successfully in 30 seconds",
                "noise",
                "Cycle 2 completed successfully in 25 seconds",
            ],
        );
        let re = Regex::new(r"Cycle \d+ completed").unwrap();
        let lines = scan(&path, &re, 100);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Cycle 1"));
        assert!(lines[1].contains("Cycle 2"));
    }
}
