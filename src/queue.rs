//! Serialized write queue for the log file
//!
//! All file operations for one target go through a single worker thread that
//! drains an unbounded channel strictly in arrival order. Each append runs its
//! own open / write / close span to completion before the next operation is
//! taken, so lines never interleave. Call sites only enqueue and never block.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::LogError;

/// Line terminator written after every record
pub const LINE_ENDING: &str = "\r\n";

/// How the log file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create if missing, write at the end
    Append,
    /// Create if missing, discard existing content
    Truncate,
}

/// File-system capability used by the write queue
#[async_trait]
pub trait LogFileSystem: Send + Sync + 'static {
    /// Checked once before the writer starts; an error keeps persistence off
    fn preflight(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    async fn open(&self, path: &Path, mode: OpenMode) -> io::Result<Box<dyn LogFile>>;
}

/// An open log file handle
#[async_trait]
pub trait LogFile: Send {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
    async fn close(self: Box<Self>) -> io::Result<()>;
}

/// [`LogFileSystem`] backed by `tokio::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioFileSystem;

struct TokioFile(tokio::fs::File);

#[async_trait]
impl LogFileSystem for TokioFileSystem {
    async fn open(&self, path: &Path, mode: OpenMode) -> io::Result<Box<dyn LogFile>> {
        let mut options = tokio::fs::OpenOptions::new();
        match mode {
            OpenMode::Append => options.create(true).append(true),
            OpenMode::Truncate => options.create(true).write(true).truncate(true),
        };
        let file = options.open(path).await?;
        Ok(Box::new(TokioFile(file)))
    }
}

#[async_trait]
impl LogFile for TokioFile {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.0.write_all(bytes).await
    }

    async fn close(self: Box<Self>) -> io::Result<()> {
        let TokioFile(mut file) = *self;
        file.flush().await
    }
}

/// Callback receiving persistence failures
pub type ErrorReporter = Arc<dyn Fn(LogError) + Send + Sync>;

enum WriteOp {
    Append(String),
    Truncate,
    Flush(oneshot::Sender<()>),
    /// Stop after everything queued before it
    Close,
}

/// Single-writer queue of file operations against one log file
pub struct WriteQueue {
    sender: mpsc::UnboundedSender<WriteOp>,
    path: PathBuf,
    report: ErrorReporter,
    /// Taken by the first `close`
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl std::fmt::Debug for WriteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteQueue")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl WriteQueue {
    /// Start the worker for `path`
    ///
    /// The worker owns a current-thread tokio runtime, so the queue works
    /// whether or not the caller runs inside a runtime.
    pub fn spawn(
        fs: Arc<dyn LogFileSystem>,
        path: PathBuf,
        report: ErrorReporter,
    ) -> io::Result<Self> {
        fs.preflight(&path)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let worker_path = path.clone();
        let worker_report = Arc::clone(&report);
        let worker = thread::Builder::new()
            .name("logtap-writer".to_string())
            .spawn(move || {
                runtime.block_on(drain(receiver, fs, worker_path, worker_report));
            })?;

        debug!(target: "logtap", path = %path.display(), "write queue started");

        Ok(Self {
            sender,
            path,
            report,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Target file of this queue
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue `line` followed by CRLF
    pub fn append(&self, line: impl Into<String>) {
        self.enqueue(WriteOp::Append(line.into()));
    }

    /// Queue a truncation of the file
    pub fn truncate(&self) {
        self.enqueue(WriteOp::Truncate);
    }

    /// Resolve once every operation queued before this call has finished
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(WriteOp::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// Blocking variant of [`flush`](Self::flush)
    ///
    /// Must not be called from inside an async context.
    pub fn flush_blocking(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(WriteOp::Flush(done)).is_ok() {
            let _ = wait.blocking_recv();
        }
    }

    /// Drain what is queued, stop the worker and join it
    ///
    /// Operations queued afterwards are reported as failures. Calling it again
    /// is a no-op.
    pub fn close(&self) {
        let worker = match self.worker.lock() {
            Ok(mut worker) => worker.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(worker) = worker else {
            return;
        };
        if self.sender.send(WriteOp::Close).is_ok() {
            let _ = worker.join();
        }
        debug!(target: "logtap", path = %self.path.display(), "write queue closed");
    }

    /// Check whether `close` has run
    pub fn is_closed(&self) -> bool {
        self.worker.lock().map(|w| w.is_none()).unwrap_or(true)
    }

    fn enqueue(&self, op: WriteOp) {
        if self.sender.send(op).is_err() {
            (self.report)(LogError::Persistence {
                op: "queue",
                path: self.path.clone(),
                source: io::Error::new(io::ErrorKind::BrokenPipe, "write queue worker stopped"),
            });
        }
    }
}

async fn drain(
    mut receiver: mpsc::UnboundedReceiver<WriteOp>,
    fs: Arc<dyn LogFileSystem>,
    path: PathBuf,
    report: ErrorReporter,
) {
    while let Some(op) = receiver.recv().await {
        let result = match op {
            WriteOp::Append(mut line) => {
                line.push_str(LINE_ENDING);
                write_once(fs.as_ref(), &path, OpenMode::Append, line.as_bytes()).await
            }
            WriteOp::Truncate => write_once(fs.as_ref(), &path, OpenMode::Truncate, &[]).await,
            WriteOp::Flush(done) => {
                let _ = done.send(());
                Ok(())
            }
            WriteOp::Close => break,
        };
        if let Err(e) = result {
            report(e);
        }
    }
    debug!(target: "logtap", path = %path.display(), "write queue drained");
}

/// One open / write / close span
async fn write_once(
    fs: &dyn LogFileSystem,
    path: &Path,
    mode: OpenMode,
    bytes: &[u8],
) -> Result<(), LogError> {
    let failed = |op: &'static str| {
        move |source: io::Error| LogError::Persistence {
            op,
            path: path.to_path_buf(),
            source,
        }
    };

    let mut file = fs.open(path, mode).await.map_err(failed("open"))?;
    let written = file.write(bytes).await.map_err(failed("write"));
    let closed = file.close().await.map_err(failed("close"));
    written.and(closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    fn collecting_reporter() -> (ErrorReporter, Arc<Mutex<Vec<String>>>) {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let report: ErrorReporter = Arc::new(move |e: LogError| {
            sink.lock().unwrap().push(e.to_string());
        });
        (report, errors)
    }

    /// In-memory file system whose writes yield mid-operation
    #[derive(Default)]
    struct SlowMemoryFs {
        content: Arc<Mutex<Vec<u8>>>,
    }

    struct SlowMemoryFile {
        content: Arc<Mutex<Vec<u8>>>,
    }

    #[async_trait]
    impl LogFileSystem for SlowMemoryFs {
        async fn open(&self, _path: &Path, mode: OpenMode) -> io::Result<Box<dyn LogFile>> {
            tokio::time::sleep(Duration::from_millis(1)).await;
            if mode == OpenMode::Truncate {
                self.content.lock().unwrap().clear();
            }
            Ok(Box::new(SlowMemoryFile {
                content: Arc::clone(&self.content),
            }))
        }
    }

    #[async_trait]
    impl LogFile for SlowMemoryFile {
        async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            // Byte-at-a-time with yields: any concurrent writer would interleave
            for b in bytes {
                self.content.lock().unwrap().push(*b);
                tokio::task::yield_now().await;
            }
            Ok(())
        }

        async fn close(self: Box<Self>) -> io::Result<()> {
            Ok(())
        }
    }

    struct DeniedFs;

    #[async_trait]
    impl LogFileSystem for DeniedFs {
        async fn open(&self, _path: &Path, _mode: OpenMode) -> io::Result<Box<dyn LogFile>> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only volume"))
        }
    }

    #[tokio::test]
    async fn test_append_writes_crlf_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let (report, errors) = collecting_reporter();
        let queue = WriteQueue::spawn(Arc::new(TokioFileSystem), path.clone(), report).unwrap();

        queue.append("first");
        queue.append("second");
        queue.append("");
        queue.flush().await;

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\r\nsecond\r\n\r\n");
        assert!(errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_keeps_existing_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "old\r\n").unwrap();
        let (report, _) = collecting_reporter();
        let queue = WriteQueue::spawn(Arc::new(TokioFileSystem), path.clone(), report).unwrap();

        queue.append("new");
        queue.flush().await;

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old\r\nnew\r\n");
    }

    #[tokio::test]
    async fn test_truncate_is_ordered_with_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "stale\r\n").unwrap();
        let (report, _) = collecting_reporter();
        let queue = WriteQueue::spawn(Arc::new(TokioFileSystem), path.clone(), report).unwrap();

        queue.append("dropped");
        queue.truncate();
        queue.append("kept");
        queue.flush().await;

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "kept\r\n");
    }

    #[tokio::test]
    async fn test_slow_writes_never_interleave() {
        let fs = SlowMemoryFs::default();
        let content = Arc::clone(&fs.content);
        let (report, _) = collecting_reporter();
        let queue = WriteQueue::spawn(Arc::new(fs), PathBuf::from("/mem/app.log"), report).unwrap();

        let expected: Vec<String> = (0..50).map(|i| format!("line number {}", i)).collect();
        for line in &expected {
            queue.append(line.clone());
        }
        queue.flush().await;

        let text = String::from_utf8(content.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = text.split_terminator(LINE_ENDING).collect();
        assert_eq!(lines, expected);
    }

    #[tokio::test]
    async fn test_failures_are_reported_and_queue_keeps_running() {
        let (report, errors) = collecting_reporter();
        let queue =
            WriteQueue::spawn(Arc::new(DeniedFs), PathBuf::from("/locked/app.log"), report).unwrap();

        queue.append("one");
        queue.append("two");
        queue.flush().await;

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("open /locked/app.log failed: permission denied"));
    }

    #[test]
    fn test_flush_blocking_outside_runtime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let (report, _) = collecting_reporter();
        let queue = WriteQueue::spawn(Arc::new(TokioFileSystem), path.clone(), report).unwrap();

        queue.append("sync");
        queue.flush_blocking();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "sync\r\n");
    }

    #[test]
    fn test_close_drains_pending_operations() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let (report, _) = collecting_reporter();
        let queue = WriteQueue::spawn(Arc::new(TokioFileSystem), path.clone(), report).unwrap();

        for i in 0..10 {
            queue.append(format!("{}", i));
        }
        queue.close();
        assert!(queue.is_closed());

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 10);
    }

    #[test]
    fn test_append_after_close_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let (report, errors) = collecting_reporter();
        let queue = WriteQueue::spawn(Arc::new(TokioFileSystem), path.clone(), report).unwrap();

        queue.append("before");
        queue.close();
        queue.close();
        queue.append("after");
        queue.flush_blocking();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "before\r\n");
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("queue "));
    }
}
