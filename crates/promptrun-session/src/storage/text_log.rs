//! Human-readable, append-only history log.
//!
//! ```text
//! SESSION:<id>
//! User: <first prompt line>
//! <prompt continuation>
//! Assistant: <first artifact line>
//! <artifact continuation>
//! Output: <first output line>
//! <output continuation>
//! ---
//! ```
//!
//! Continuation lines that would read as structure (`---`, a section marker,
//! a `SESSION:` header) or that start with `\` are written with one extra
//! leading `\`, which is stripped again when reading.
//!
//! A header is written whenever the last header in the log names another
//! session, and reads join every segment under a matching header in file
//! order. Logs from writers that only emit a header on a session's first
//! append are read differently: exchanges written after another session's
//! header belong to that header, not to the first matching segment.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use promptrun_core::{Exchange, HistoryStore, SessionId, traits::StorageError};
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};

pub const SESSION_HEADER: &str = "SESSION:";
pub const USER_MARKER: &str = "User: ";
pub const ASSISTANT_MARKER: &str = "Assistant: ";
pub const OUTPUT_MARKER: &str = "Output: ";
pub const SEPARATOR: &str = "---";

const ESCAPE: char = '\\';
const RESERVED_PREFIXES: [&str; 4] =
    [SESSION_HEADER, USER_MARKER, ASSISTANT_MARKER, OUTPUT_MARKER];

/// History store backed by a single text log shared by all sessions.
pub struct TextLogStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TextLogStore {
    /// Create a store for the log at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Log file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryStore for TextLogStore {
    async fn append(&self, session: &SessionId, exchange: &Exchange) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let existing = match fs::read(&self.path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let mut record = String::new();
        if !existing.is_empty() && !existing.ends_with('\n') {
            record.push('\n');
        }
        if last_header(&existing) != Some(session.as_str()) {
            record.push_str(SESSION_HEADER);
            record.push_str(session.as_str());
            record.push('\n');
        }
        record.push_str(&encode_exchange(exchange));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(record.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn recent(&self, session: &SessionId, n: usize) -> Result<Vec<Exchange>, StorageError> {
        let log = {
            let _guard = self.lock.lock().await;
            match fs::read(&self.path).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), "Failed to read history log: {e}");
                    return Ok(Vec::new());
                }
            }
        };

        let mut exchanges = parse_session(&log, session);
        let keep_from = exchanges.len().saturating_sub(n);
        Ok(exchanges.split_off(keep_from))
    }
}

fn last_header(log: &str) -> Option<&str> {
    log.lines()
        .rev()
        .find_map(|line| line.strip_prefix(SESSION_HEADER))
}

/// Encode one exchange, separator included.
#[must_use]
pub fn encode_exchange(exchange: &Exchange) -> String {
    let mut out = String::new();
    write_section(&mut out, USER_MARKER, &exchange.prompt);
    write_section(&mut out, ASSISTANT_MARKER, &exchange.artifact);
    write_section(&mut out, OUTPUT_MARKER, &exchange.output);
    out.push_str(SEPARATOR);
    out.push('\n');
    out
}

fn write_section(out: &mut String, marker: &str, content: &str) {
    let mut lines = content.split('\n');
    out.push_str(marker);
    out.push_str(lines.next().unwrap_or_default());
    out.push('\n');
    for line in lines {
        if needs_escape(line) {
            out.push(ESCAPE);
        }
        out.push_str(line);
        out.push('\n');
    }
}

fn needs_escape(line: &str) -> bool {
    line == SEPARATOR
        || line.starts_with(ESCAPE)
        || RESERVED_PREFIXES.iter().any(|p| line.starts_with(p))
}

/// Parse every exchange recorded under `session`, in file order.
///
/// Duplicate headers for the same session are tolerated; their segments
/// are read in sequence.
#[must_use]
pub fn parse_session(log: &str, session: &SessionId) -> Vec<Exchange> {
    let body = log.strip_suffix('\n').unwrap_or(log);
    let mut exchanges = Vec::new();
    let mut block = BlockParser::default();
    let mut in_session = false;

    for line in body.split('\n') {
        if let Some(id) = line.strip_prefix(SESSION_HEADER) {
            if in_session {
                exchanges.extend(block.finish());
            }
            block = BlockParser::default();
            in_session = id == session.as_str();
            continue;
        }
        if !in_session {
            continue;
        }
        if line == SEPARATOR {
            exchanges.extend(block.finish());
        } else {
            block.push(line);
        }
    }
    if in_session {
        exchanges.extend(block.finish());
    }

    exchanges
}

#[derive(Debug, Clone, Copy)]
enum Section {
    User,
    Assistant,
    Output,
}

#[derive(Default)]
struct BlockParser<'a> {
    section: Option<Section>,
    prompt: Vec<&'a str>,
    artifact: Vec<&'a str>,
    output: Vec<&'a str>,
}

impl<'a> BlockParser<'a> {
    fn push(&mut self, line: &'a str) {
        let started = [
            (USER_MARKER, Section::User),
            (ASSISTANT_MARKER, Section::Assistant),
            (OUTPUT_MARKER, Section::Output),
        ]
        .into_iter()
        .find_map(|(marker, section)| line.strip_prefix(marker).map(|rest| (section, rest)));

        if let Some((section, first)) = started {
            self.section = Some(section);
            let lines = self.lines_mut(section);
            lines.clear();
            lines.push(first);
            return;
        }

        // Lines before any marker are dropped.
        if let Some(section) = self.section {
            let line = line.strip_prefix(ESCAPE).unwrap_or(line);
            self.lines_mut(section).push(line);
        }
    }

    fn lines_mut(&mut self, section: Section) -> &mut Vec<&'a str> {
        match section {
            Section::User => &mut self.prompt,
            Section::Assistant => &mut self.artifact,
            Section::Output => &mut self.output,
        }
    }

    fn finish(&mut self) -> Option<Exchange> {
        let block = std::mem::take(self);
        block.section?;
        Some(Exchange::new(
            block.prompt.join("\n"),
            block.artifact.join("\n"),
            block.output.join("\n"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> TextLogStore {
        TextLogStore::new(dir.path().join("logs").join("history.log"))
    }

    fn ex(i: usize) -> Exchange {
        Exchange::new(format!("prompt {i}"), format!("print({i})\n"), format!("{i}\n"))
    }

    #[tokio::test]
    async fn test_round_trip_multiline() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let session = SessionId::new("100");
        let exchange = Exchange::new(
            "list files\nsorted by size",
            "import os\nfor f in os.listdir('.'):\n    print(f)\n",
            "a.txt\nb.txt\n",
        );

        store.append(&session, &exchange).await.unwrap();
        let loaded = store.recent(&session, 3).await.unwrap();
        assert_eq!(loaded, vec![exchange]);
    }

    #[tokio::test]
    async fn test_on_disk_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let session = SessionId::new("100");

        store
            .append(&session, &Exchange::new("say two", "print(2)", "2"))
            .await
            .unwrap();
        store
            .append(&session, &Exchange::new("again", "print(3)", "3"))
            .await
            .unwrap();

        let log = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(
            log,
            "SESSION:100\n\
             User: say two\nAssistant: print(2)\nOutput: 2\n---\n\
             User: again\nAssistant: print(3)\nOutput: 3\n---\n"
        );
    }

    #[tokio::test]
    async fn test_bounded_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let session = SessionId::new("100");
        for i in 1..=4 {
            store.append(&session, &ex(i)).await.unwrap();
        }

        let loaded = store.recent(&session, 3).await.unwrap();
        assert_eq!(loaded, vec![ex(2), ex(3), ex(4)]);

        let entries = store.load_recent(&session, 3).await.unwrap();
        assert_eq!(entries.len(), 9);
        assert_eq!(entries[0].content, "prompt 2");
        assert_eq!(entries[8].content, "4\n");
    }

    #[tokio::test]
    async fn test_session_isolation_with_interleaving() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let a = SessionId::new("A");
        let b = SessionId::new("B");

        store.append(&a, &ex(1)).await.unwrap();
        store.append(&b, &ex(2)).await.unwrap();
        store.append(&a, &ex(3)).await.unwrap();

        assert_eq!(store.recent(&a, 5).await.unwrap(), vec![ex(1), ex(3)]);
        assert_eq!(store.recent(&b, 5).await.unwrap(), vec![ex(2)]);
    }

    #[tokio::test]
    async fn test_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let loaded = tokio_test::assert_ok!(store.recent(&SessionId::new("100"), 3).await);
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.append(&SessionId::new("100"), &ex(1)).await.unwrap();
        assert!(store.recent(&SessionId::new("1000"), 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_structural_lines_in_content_survive() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let session = SessionId::new("7");
        let exchange = Exchange::new(
            "print a separator",
            "print('---')\nprint('Output: x')",
            "header\n---\nOutput: x\nSESSION:9\n\\already escaped\n",
        );

        store.append(&session, &exchange).await.unwrap();
        store.append(&SessionId::new("9"), &ex(1)).await.unwrap();

        assert_eq!(store.recent(&session, 3).await.unwrap(), vec![exchange]);
        assert_eq!(store.recent(&SessionId::new("9"), 3).await.unwrap(), vec![ex(1)]);
    }

    #[test]
    fn test_parse_tolerates_duplicate_headers_and_noise() {
        let log = "garbage before anything\n\
                   SESSION:1\n\
                   stray line\n\
                   User: a\nAssistant: b\nOutput: c\n---\n\
                   SESSION:2\n\
                   User: x\nAssistant: y\nOutput: z\n---\n\
                   SESSION:1\n\
                   User: d\nAssistant: e\nOutput: f\n---\n\n";
        let parsed = parse_session(log, &SessionId::new("1"));
        assert_eq!(
            parsed,
            vec![Exchange::new("a", "b", "c"), Exchange::new("d", "e", "f")]
        );
    }

    #[test]
    fn test_parse_keeps_unterminated_tail_block() {
        let log = "SESSION:1\nUser: a\nAssistant: b\nOutput: partial";
        let parsed = parse_session(log, &SessionId::new("1"));
        assert_eq!(parsed, vec![Exchange::new("a", "b", "partial")]);
    }

    #[test]
    fn test_first_header_only_log_attributes_by_latest_header() {
        // Session 1 appended again after session 2 without a new header.
        let log = "SESSION:1\n\
                   User: a\nAssistant: b\nOutput: c\n---\n\
                   SESSION:2\n\
                   User: x\nAssistant: y\nOutput: z\n---\n\
                   User: d\nAssistant: e\nOutput: f\n---\n";
        assert_eq!(
            parse_session(log, &SessionId::new("1")),
            vec![Exchange::new("a", "b", "c")]
        );
        assert_eq!(
            parse_session(log, &SessionId::new("2")),
            vec![Exchange::new("x", "y", "z"), Exchange::new("d", "e", "f")]
        );
    }

    #[test]
    fn test_header_requires_exact_id() {
        let log = "SESSION:100\nUser: a\nAssistant: b\nOutput: c\n---\n";
        assert!(parse_session(log, &SessionId::new("10")).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_stay_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(TextLogStore::new(dir.path().join("history.log")));
        let mut tasks = tokio::task::JoinSet::new();

        for s in 0..8 {
            for i in 0..20 {
                let store = std::sync::Arc::clone(&store);
                tasks.spawn(async move {
                    let exchange = Exchange::new(
                        format!("prompt {s}-{i}"),
                        format!("echo {s}\necho {i}"),
                        format!("{s}-{i}\n"),
                    );
                    store.append(&SessionId::new(format!("s{s}")), &exchange).await
                });
            }
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap().unwrap();
        }

        for s in 0..8 {
            let loaded = store
                .recent(&SessionId::new(format!("s{s}")), 100)
                .await
                .unwrap();
            assert_eq!(loaded.len(), 20, "session s{s}");

            let mut seen: Vec<usize> = loaded
                .iter()
                .map(|exchange| {
                    let i = exchange
                        .prompt
                        .strip_prefix(&format!("prompt {s}-"))
                        .unwrap()
                        .parse::<usize>()
                        .unwrap();
                    assert_eq!(exchange.artifact, format!("echo {s}\necho {i}"));
                    assert_eq!(exchange.output, format!("{s}-{i}\n"));
                    i
                })
                .collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..20).collect::<Vec<_>>());
        }
    }
}
